//! Session lifecycle and command orchestration.
//!
//! A [`Session`] owns the TCP control connection and the UDP side channel
//! and drives the connect → subscribe → heartbeat lifecycle:
//!
//! 1. Open the control connection (remote port 49162 by default)
//! 2. Bind a UDP socket to an OS-assigned port
//! 3. Send UM announcing that port, then JM to subscribe
//! 4. Read frames and route them into the [`StateStore`]
//! 5. Send KA keepalives on a fixed period until the transport drops
//!
//! There is no automatic reconnection: a transport error or close surfaces
//! as [`ConnectionStatus::Disconnected`] through the status watch, and the
//! host decides when to call [`Session::connect`] or
//! [`Session::reconfigure`] again.
//!
//! Commands issue a PV frame and optimistically mirror the sent value into
//! the state store before the device confirms it; a later inbound PV or
//! snapshot for the same parameter simply overwrites it (last write wins).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, trace, warn};

use crate::error::{Result, UcnetError};
use crate::protocol::{decode_frame, decompress_snapshot, message, FrameBuffer, Message, MessageType};
use crate::state::{ChannelAttr, Flag, ParamPath, StateStore};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Remote TCP port of the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 49162;

/// Keepalive cadence. The device's tolerance window is undocumented, so
/// this default is not stretched.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(2);

/// Client name announced in the subscribe document.
pub const DEFAULT_CLIENT_NAME: &str = "ucnet-client";

/// Socket read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection status of a session, observable through [`Session::watch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection attempt is in flight.
    Connecting,
    /// Subscribed and exchanging frames.
    Connected,
    /// No transport; the initial state, and the terminal state after any
    /// transport error or close.
    Disconnected,
    /// The last connection attempt failed outright.
    ConnectionFailed,
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device host name or address.
    pub host: String,
    /// Remote TCP control port.
    pub port: u16,
    /// Keepalive period.
    pub heartbeat_period: Duration,
    /// Client name for the subscribe document.
    pub client_name: String,
}

impl SessionConfig {
    /// Configuration for a device at `host` with default port, heartbeat
    /// and client name.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_CONTROL_PORT,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }

    /// Override the remote control port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the keepalive period.
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Override the announced client name.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

/// State shared with the spawned I/O tasks.
struct Shared {
    state: Mutex<StateStore>,
    status: watch::Sender<ConnectionStatus>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, StateStore> {
        // A poisoned lock means a panic already tore the session down;
        // the store itself is plain data and stays usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(?previous, ?status, "session status changed");
        }
    }

    /// Route one decoded message into the state store.
    ///
    /// Only ZM and PV produce state changes; every other type is accepted
    /// and dropped.
    fn dispatch(&self, message: &Message) {
        match message.kind() {
            MessageType::ZM => match decompress_snapshot(message.body()) {
                Ok(tree) => {
                    self.state().apply_snapshot(&tree);
                    debug!("snapshot merged");
                }
                Err(e) => warn!("dropping snapshot: {e}"),
            },
            MessageType::PV => match message.parameter_value() {
                Ok((name, value)) => match ParamPath::parse(&name) {
                    Some(path) => self.state().apply_delta(path, value),
                    None => trace!(%name, "ignoring unknown parameter"),
                },
                Err(e) => warn!("dropping parameter push: {e}"),
            },
            other => trace!(kind = %other, "no state change for message"),
        }
    }
}

/// Live transports of a connected session.
struct Link {
    writer: WriterHandle,
    udp_port: u16,
    tasks: Vec<JoinHandle<()>>,
    writer_task: JoinHandle<Result<()>>,
}

/// A client session against one device.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
    status_rx: watch::Receiver<ConnectionStatus>,
    link: Option<Link>,
}

impl Session {
    /// Create a disconnected session. Call [`connect`](Self::connect) to
    /// enter the lifecycle.
    pub fn new(config: SessionConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(StateStore::new()),
                status: status_tx,
            }),
            status_rx,
            link: None,
        }
    }

    /// Connect and subscribe.
    ///
    /// Tears down any existing transports first, then opens the control
    /// connection, announces the UDP port (UM), subscribes (JM), and starts
    /// the read loops and the heartbeat. No timeout is applied; a device
    /// that never answers is only noticed through transport errors.
    pub async fn connect(&mut self) -> Result<()> {
        self.teardown();
        self.shared.set_status(ConnectionStatus::Connecting);

        match self.establish().await {
            Ok(link) => {
                self.link = Some(link);
                self.shared.set_status(ConnectionStatus::Connected);
                Ok(())
            }
            Err(e) => {
                self.shared.set_status(ConnectionStatus::ConnectionFailed);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Link> {
        // 1. Control connection.
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        debug!(host = %self.config.host, port = self.config.port, "control connection open");

        // 2. Side channel on an OS-assigned port.
        let udp = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let udp_port = udp.local_addr()?.port();

        // 3. Single-owner writer task over the write half.
        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half);

        // 4. Handshake: announce the UDP port, then subscribe.
        writer
            .send(OutboundFrame::new(message::announce_udp_port(udp_port)))
            .await?;
        writer
            .send(OutboundFrame::new(message::subscribe(
                &self.config.client_name,
            )?))
            .await?;

        // 5. Inbound loops and the heartbeat.
        let tasks = vec![
            tokio::spawn(tcp_read_loop(read_half, self.shared.clone())),
            tokio::spawn(udp_read_loop(udp, self.shared.clone())),
            tokio::spawn(heartbeat_loop(
                writer.clone(),
                self.config.heartbeat_period,
                self.shared.status.subscribe(),
            )),
        ];

        Ok(Link {
            writer,
            udp_port,
            tasks,
            writer_task,
        })
    }

    /// Point the session at a different host and reconnect.
    ///
    /// Forces a hard Disconnected → Connecting transition regardless of the
    /// current state, recreating both transports.
    pub async fn reconfigure(&mut self, host: impl Into<String>) -> Result<()> {
        self.config.host = host.into();
        self.connect().await
    }

    /// Tear the session down: stop the heartbeat and close both sockets.
    /// In-flight writes are not awaited.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            for task in &link.tasks {
                task.abort();
            }
            link.writer_task.abort();
            self.shared.set_status(ConnectionStatus::Disconnected);
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// The local UDP port announced to the device, while connected.
    pub fn udp_port(&self) -> Option<u16> {
        self.link.as_ref().map(|link| link.udp_port)
    }

    /// Tri-state read of one channel attribute, for feedback rendering.
    pub fn channel_flag(&self, channel: u32, attr: ChannelAttr) -> Flag {
        self.shared.state().channel_flag(channel, attr)
    }

    /// Tri-state read of the global mixer bypass.
    pub fn mixer_bypass(&self) -> Flag {
        self.shared.state().mixer_bypass()
    }

    /// Channel indices the mirror knows about.
    pub fn known_channels(&self) -> Vec<u32> {
        self.shared.state().channels().collect()
    }

    /// Set one channel attribute to an explicit value.
    pub async fn set_channel(&self, channel: u32, attr: ChannelAttr, active: bool) -> Result<()> {
        self.send_parameter(ParamPath::channel(channel, attr), active)
            .await
    }

    /// Set the global mixer bypass to an explicit value.
    pub async fn set_mixer_bypass(&self, active: bool) -> Result<()> {
        self.send_parameter(ParamPath::GlobalBypass, active).await
    }

    /// Toggle one channel attribute and return the value sent.
    ///
    /// A known value is negated. An unknown one gets the attribute's
    /// documented default: mute and solo engage, 48V/HPF/pad disengage.
    pub async fn toggle_channel(&self, channel: u32, attr: ChannelAttr) -> Result<bool> {
        let target = match self.channel_flag(channel, attr).as_bool() {
            Some(current) => !current,
            None => attr.toggle_default(),
        };
        self.send_parameter(ParamPath::channel(channel, attr), target)
            .await?;
        Ok(target)
    }

    /// Toggle the global mixer bypass and return the value sent.
    /// A never-observed bypass is treated as inactive.
    pub async fn toggle_mixer_bypass(&self) -> Result<bool> {
        let target = !self.mixer_bypass().is_active();
        self.send_parameter(ParamPath::GlobalBypass, target).await?;
        Ok(target)
    }

    /// Encode and send one PV command, then mirror it optimistically.
    ///
    /// While not connected this is a reported no-op: the error comes back,
    /// nothing is queued, and the mirror is left untouched.
    async fn send_parameter(&self, path: ParamPath, active: bool) -> Result<()> {
        if self.status() != ConnectionStatus::Connected {
            return Err(UcnetError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(UcnetError::NotConnected)?;

        let frame = message::parameter_value(&path.to_string(), message::bool_value(active));
        link.writer.send(OutboundFrame::new(frame)).await?;

        self.shared.state().record(path, active);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Read the control stream, reassemble frames, dispatch them.
///
/// Ends on EOF or a read error; either way the session goes Disconnected
/// and stays there until the host reconnects.
async fn tcp_read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("control connection closed by device");
                break;
            }
            Ok(n) => {
                for message in frames.push(&buf[..n]) {
                    shared.dispatch(&message);
                }
            }
            Err(e) => {
                error!("control connection read failed: {e}");
                break;
            }
        }
    }

    shared.set_status(ConnectionStatus::Disconnected);
}

/// Receive side-channel datagrams and dispatch them.
///
/// A datagram holds exactly one frame; anything that fails the
/// magic/version check is dropped silently.
async fn udp_read_loop(socket: UdpSocket, shared: Arc<Shared>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, _)) => match decode_frame(&buf[..n]) {
                Ok(message) => shared.dispatch(&message),
                Err(_) => trace!("ignoring malformed datagram"),
            },
            Err(e) => {
                debug!("side channel receive failed: {e}");
                break;
            }
        }
    }
}

/// Send KA on a fixed period until the writer dies or the session leaves
/// the connected states.
async fn heartbeat_loop(
    writer: WriterHandle,
    period: Duration,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    let mut ticker = time::interval(period);
    ticker.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if writer
                    .send(OutboundFrame::new(message::keep_alive()))
                    .await
                    .is_err()
                {
                    debug!("writer gone, stopping keepalive");
                    break;
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                match *status.borrow_and_update() {
                    ConnectionStatus::Connecting | ConnectionStatus::Connected => {}
                    ConnectionStatus::Disconnected | ConnectionStatus::ConnectionFailed => {
                        debug!("session down, stopping keepalive");
                        break;
                    }
                }
            }
        }
    }
}
