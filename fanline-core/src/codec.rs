//! TCP wire framing.
//!
//! Each frame is `[flags: u8][len: u32 LE][payload]`; flag bit 0 (MORE) set
//! means another frame of the same message follows. A multipart message is a
//! frame run ending with MORE clear. Reserved flag bits must be zero and
//! frames are size-capped, both protocol violations otherwise.

use bytes::Bytes;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::message::Multipart;

/// MORE flag: another frame of this message follows.
pub const FLAG_MORE: u8 = 0x01;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Framing protocol errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Protocol violation: reserved flag bits set")]
    ReservedBits,

    #[error("Protocol violation: frame of {0} bytes exceeds cap")]
    SizeTooLarge(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            other => Self::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Write a multipart message to a stream.
///
/// Writing an empty message is a no-op; the peer cannot represent it.
///
/// # Errors
///
/// Returns an error on oversized frames or any underlying IO failure.
pub fn write_multipart<W: Write>(w: &mut W, frames: &Multipart) -> Result<(), CodecError> {
    for (i, frame) in frames.iter().enumerate() {
        if frame.len() > MAX_FRAME_LEN {
            return Err(CodecError::SizeTooLarge(frame.len()));
        }
        let flags = if i + 1 < frames.len() { FLAG_MORE } else { 0 };
        w.write_all(&[flags])?;
        w.write_all(&(frame.len() as u32).to_le_bytes())?;
        w.write_all(frame)?;
    }
    w.flush()?;
    Ok(())
}

/// Read one complete multipart message from a stream.
///
/// Blocks until the final frame (MORE clear) has been read, so a message is
/// observed atomically or not at all.
///
/// # Errors
///
/// Returns an error on protocol violations or any underlying IO failure,
/// including EOF mid-message.
pub fn read_multipart<R: Read>(r: &mut R) -> Result<Multipart, CodecError> {
    let mut frames = Vec::new();
    loop {
        let mut header = [0u8; 5];
        r.read_exact(&mut header)?;

        let flags = header[0];
        if flags & !FLAG_MORE != 0 {
            return Err(CodecError::ReservedBits);
        }

        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::SizeTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        r.read_exact(&mut payload)?;
        frames.push(Bytes::from(payload));

        if flags & FLAG_MORE == 0 {
            return Ok(frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let msg: Multipart = vec![
            Bytes::from_static(b"chat.room1"),
            Bytes::from_static(b"{\"u\":\"a\"}"),
            Bytes::from_static(&[100, 0, 0, 0, 0, 0, 0, 0]),
        ];

        let mut buf = Vec::new();
        write_multipart(&mut buf, &msg).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_multipart(&mut cursor).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn two_messages_back_to_back() {
        let first: Multipart = vec![Bytes::from_static(b"a"), Bytes::from_static(b"1")];
        let second: Multipart = vec![Bytes::from_static(b"b")];

        let mut buf = Vec::new();
        write_multipart(&mut buf, &first).unwrap();
        write_multipart(&mut buf, &second).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_multipart(&mut cursor).unwrap(), first);
        assert_eq!(read_multipart(&mut cursor).unwrap(), second);
    }

    #[test]
    fn empty_frame_is_representable() {
        let msg: Multipart = vec![Bytes::new(), Bytes::from_static(b"tail")];
        let mut buf = Vec::new();
        write_multipart(&mut buf, &msg).unwrap();
        let decoded = read_multipart(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn reserved_bits_rejected() {
        let buf = vec![0x80, 0, 0, 0, 0];
        let err = read_multipart(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::ReservedBits));
    }

    #[test]
    fn truncated_message_is_an_error() {
        let msg: Multipart = vec![Bytes::from_static(b"payload")];
        let mut buf = Vec::new();
        write_multipart(&mut buf, &msg).unwrap();
        buf.truncate(buf.len() - 2);

        assert!(read_multipart(&mut Cursor::new(buf)).is_err());
    }
}
