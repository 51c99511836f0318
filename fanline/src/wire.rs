//! The three-frame message codec.
//!
//! Every published message is exactly three frames, in order: the channel
//! (UTF-8, no trailing NUL), the body (serialized document bytes), and the
//! timestamp (8 bytes, little-endian u64, publisher clock at send). A
//! receiver observes all three or reports a protocol error.

use bytes::Bytes;

use crate::error::{PubSubError, Result};
use fanline_core::message::{frame_str, Multipart};

/// A decoded wire message, body still in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub channel: String,
    pub body: Bytes,
    pub timestamp: u64,
}

/// Build the three frames for a publish.
#[must_use]
pub fn encode(channel: &str, body: Bytes, timestamp: u64) -> Multipart {
    vec![
        Bytes::copy_from_slice(channel.as_bytes()),
        body,
        Bytes::copy_from_slice(&timestamp.to_le_bytes()),
    ]
}

/// Decode a received message, enforcing three-frame atomicity.
///
/// # Errors
///
/// Returns a protocol error for a wrong frame count, a non-UTF-8 channel,
/// or a malformed timestamp frame.
pub fn decode(frames: &Multipart) -> Result<WireMessage> {
    if frames.len() != 3 {
        return Err(PubSubError::protocol(format!(
            "expected 3 frames, got {}",
            frames.len()
        )));
    }

    let channel = frame_str(frames, 0)
        .map_err(|_| PubSubError::protocol("channel is not valid UTF-8"))?
        .to_string();

    let timestamp_bytes: [u8; 8] = frames[2]
        .as_ref()
        .try_into()
        .map_err(|_| PubSubError::protocol("timestamp frame must be 8 bytes"))?;

    Ok(WireMessage {
        channel,
        body: frames[1].clone(),
        timestamp: u64::from_le_bytes(timestamp_bytes),
    })
}
