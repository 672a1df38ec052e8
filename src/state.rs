//! Local mirror of device state.
//!
//! The [`StateStore`] is the authoritative local copy of the mixer's boolean
//! parameters: per-channel flags and the global bypass. It is fed from two
//! directions — decoded inbound messages (snapshot merges and parameter
//! deltas) and optimistic local writes from the command path — and read by
//! the host to render feedback.
//!
//! Every attribute is tracked as an explicit tri-state [`Flag`]: a channel
//! the device has never described is `Unknown`, which is distinct from
//! `Inactive`. The toggle commands lean on that distinction to apply
//! per-attribute defaults the first time an attribute is touched.

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::message::value_is_active;

/// Tri-state boolean parameter.
///
/// `Unknown` means the attribute has never been observed or written this
/// session; it is a first-class state, not an absent map entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flag {
    /// Never observed and never optimistically written.
    #[default]
    Unknown,
    /// Known off.
    Inactive,
    /// Known on.
    Active,
}

impl Flag {
    /// Lift a known boolean into a flag.
    pub fn from_bool(active: bool) -> Self {
        if active {
            Flag::Active
        } else {
            Flag::Inactive
        }
    }

    /// The known value, or `None` while unknown.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Flag::Unknown => None,
            Flag::Inactive => Some(false),
            Flag::Active => Some(true),
        }
    }

    /// Whether the flag is known active.
    pub fn is_active(self) -> bool {
        self == Flag::Active
    }
}

/// A per-channel boolean attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelAttr {
    /// Channel mute.
    Mute,
    /// Channel solo.
    Solo,
    /// 48V phantom power.
    Phantom,
    /// High-pass filter.
    Hpf,
    /// Input pad.
    Pad,
}

impl ChannelAttr {
    /// All attributes, in wire-name order.
    pub const ALL: [ChannelAttr; 5] = [
        ChannelAttr::Mute,
        ChannelAttr::Solo,
        ChannelAttr::Phantom,
        ChannelAttr::Hpf,
        ChannelAttr::Pad,
    ];

    /// The path segment used on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            ChannelAttr::Mute => "mute",
            ChannelAttr::Solo => "solo",
            ChannelAttr::Phantom => "48v",
            ChannelAttr::Hpf => "hpf",
            ChannelAttr::Pad => "pad",
        }
    }

    /// Parse a wire path segment.
    pub fn from_wire_name(segment: &str) -> Option<Self> {
        match segment {
            "mute" => Some(ChannelAttr::Mute),
            "solo" => Some(ChannelAttr::Solo),
            "48v" => Some(ChannelAttr::Phantom),
            "hpf" => Some(ChannelAttr::Hpf),
            "pad" => Some(ChannelAttr::Pad),
            _ => None,
        }
    }

    /// The value a toggle sends when the current state is unknown.
    ///
    /// Mute and solo engage on first toggle; phantom, HPF and pad disengage.
    pub fn toggle_default(self) -> bool {
        matches!(self, ChannelAttr::Mute | ChannelAttr::Solo)
    }
}

/// A recognized parameter path.
///
/// Two shapes exist: the literal `global/mixerBypass`, and
/// `line/ch<N>/<attr>` with a positive 1-based channel index. The protocol
/// layer enforces no upper channel bound; that is a host concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPath {
    /// `global/mixerBypass`.
    GlobalBypass,
    /// `line/ch<N>/<attr>`.
    Channel {
        /// 1-based channel index.
        channel: u32,
        /// The addressed attribute.
        attr: ChannelAttr,
    },
}

impl ParamPath {
    /// Shorthand for a channel path.
    pub fn channel(channel: u32, attr: ChannelAttr) -> Self {
        ParamPath::Channel { channel, attr }
    }

    /// Parse a slash-delimited parameter name.
    ///
    /// Returns `None` for anything unrecognized; unknown parameters are
    /// ignored upstream, never treated as errors.
    pub fn parse(name: &str) -> Option<Self> {
        let mut segments = name.split('/');
        let path = match (segments.next()?, segments.next()?, segments.next()) {
            ("global", "mixerBypass", None) => ParamPath::GlobalBypass,
            ("line", channel, Some(attr)) => {
                if segments.next().is_some() {
                    return None;
                }
                let channel: u32 = channel.strip_prefix("ch")?.parse().ok()?;
                if channel == 0 {
                    return None;
                }
                ParamPath::Channel {
                    channel,
                    attr: ChannelAttr::from_wire_name(attr)?,
                }
            }
            _ => return None,
        };
        Some(path)
    }
}

impl std::fmt::Display for ParamPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamPath::GlobalBypass => f.write_str("global/mixerBypass"),
            ParamPath::Channel { channel, attr } => {
                write!(f, "line/ch{channel}/{}", attr.wire_name())
            }
        }
    }
}

/// The known flags of one channel. Fields stay `Unknown` until observed.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelFlags {
    mute: Flag,
    solo: Flag,
    phantom: Flag,
    hpf: Flag,
    pad: Flag,
}

impl ChannelFlags {
    fn get(&self, attr: ChannelAttr) -> Flag {
        match attr {
            ChannelAttr::Mute => self.mute,
            ChannelAttr::Solo => self.solo,
            ChannelAttr::Phantom => self.phantom,
            ChannelAttr::Hpf => self.hpf,
            ChannelAttr::Pad => self.pad,
        }
    }

    fn set(&mut self, attr: ChannelAttr, flag: Flag) {
        match attr {
            ChannelAttr::Mute => self.mute = flag,
            ChannelAttr::Solo => self.solo = flag,
            ChannelAttr::Phantom => self.phantom = flag,
            ChannelAttr::Hpf => self.hpf = flag,
            ChannelAttr::Pad => self.pad = flag,
        }
    }
}

/// The local mirror of device parameters.
///
/// Channel records are created lazily on first observation or first
/// optimistic write and live for the whole session. Updates from any source
/// are last-write-wins.
#[derive(Debug, Default)]
pub struct StateStore {
    channels: HashMap<u32, ChannelFlags>,
    mixer_bypass: Flag,
}

impl StateStore {
    /// Create an empty store; everything starts `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single-parameter delta from a PV message.
    pub fn apply_delta(&mut self, path: ParamPath, value: f32) {
        self.set(path, Flag::from_bool(value_is_active(value)));
    }

    /// Record an optimistic local write from the command path.
    pub fn record(&mut self, path: ParamPath, active: bool) {
        self.set(path, Flag::from_bool(active));
    }

    fn set(&mut self, path: ParamPath, flag: Flag) {
        match path {
            ParamPath::GlobalBypass => self.mixer_bypass = flag,
            ParamPath::Channel { channel, attr } => {
                self.channels.entry(channel).or_default().set(attr, flag);
            }
        }
    }

    /// Merge a decompressed ZM snapshot tree.
    ///
    /// Walks `children.line.children.ch<N>.values` for the five channel
    /// flags and `children.global.values.mixerBypass` for the bypass. Only
    /// keys present in the document are touched; everything else keeps its
    /// prior value, known or unknown.
    pub fn apply_snapshot(&mut self, tree: &Value) {
        if let Some(value) = tree
            .pointer("/children/global/values/mixerBypass")
            .and_then(json_active)
        {
            self.mixer_bypass = Flag::from_bool(value);
        }

        let Some(channels) = tree
            .pointer("/children/line/children")
            .and_then(Value::as_object)
        else {
            return;
        };

        for (key, node) in channels {
            let Some(channel) = key.strip_prefix("ch").and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if channel == 0 {
                continue;
            }
            let Some(values) = node.get("values").and_then(Value::as_object) else {
                continue;
            };

            let flags = self.channels.entry(channel).or_default();
            for attr in ChannelAttr::ALL {
                if let Some(active) = values.get(attr.wire_name()).and_then(json_active) {
                    flags.set(attr, Flag::from_bool(active));
                }
            }
        }
    }

    /// Tri-state read of one channel attribute.
    pub fn channel_flag(&self, channel: u32, attr: ChannelAttr) -> Flag {
        self.channels
            .get(&channel)
            .map(|flags| flags.get(attr))
            .unwrap_or_default()
    }

    /// Tri-state read of the global mixer bypass.
    pub fn mixer_bypass(&self) -> Flag {
        self.mixer_bypass
    }

    /// Iterate the channel indices observed so far, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }
}

/// Read a snapshot leaf as a boolean parameter.
///
/// Snapshot values carry the same float-encoded booleans as PV bodies;
/// some firmware emits literal JSON booleans instead.
fn json_active(value: &Value) -> Option<bool> {
    value
        .as_f64()
        .map(|v| v > 0.0)
        .or_else(|| value.as_bool())
}
