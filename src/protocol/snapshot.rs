//! Snapshot (ZM) body decompression.
//!
//! A ZM body carries the device's full parameter tree as raw-deflate
//! compressed JSON, behind two prefixes of unrecovered meaning:
//!
//! ```text
//! ┌───────────┬───────────┬──────────────────────────────┐
//! │ 4 bytes   │ 2 bytes   │ raw deflate stream           │
//! │ LE value, │ reserved, │ inflates to a UTF-8 JSON tree│
//! │ skipped   │ skipped   │                              │
//! └───────────┴───────────┴──────────────────────────────┘
//! ```
//!
//! Both prefixes are skipped without validation. They are not assumed to be
//! zero; observed firmware populates them, and their semantics are unknown.

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::error::{Result, UcnetError};

/// Bytes skipped at the front of the body before the compressed blob.
const BODY_PREFIX_SIZE: usize = 4;

/// Reserved bytes skipped at the front of the compressed blob.
const BLOB_PREFIX_SIZE: usize = 2;

/// Decompress a ZM body into its JSON parameter tree.
///
/// Fails with [`UcnetError::Decompression`] on a truncated body or corrupt
/// deflate stream, and with [`UcnetError::Json`] when the inflated text is
/// not valid JSON. Callers drop the snapshot on failure; cached state is
/// never touched by a bad one.
pub fn decompress_snapshot(body: &[u8]) -> Result<serde_json::Value> {
    let skip = BODY_PREFIX_SIZE + BLOB_PREFIX_SIZE;
    if body.len() < skip {
        return Err(UcnetError::Decompression(format!(
            "body of {} bytes is shorter than its prefixes",
            body.len()
        )));
    }

    let mut decoder = DeflateDecoder::new(&body[skip..]);
    let mut text = Vec::new();
    decoder
        .read_to_end(&mut text)
        .map_err(|e| UcnetError::Decompression(e.to_string()))?;

    Ok(serde_json::from_slice(&text)?)
}
