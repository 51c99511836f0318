//! Multipart message helpers.
//!
//! A message on the wire is an ordered run of frames; the kernel moves them
//! around as `Vec<Bytes>` so fanout is a cheap refcount bump per frame.

use bytes::Bytes;
use std::io;

/// A multipart message: one or more frames.
pub type Multipart = Vec<Bytes>;

/// Build a multipart message from anything convertible to frames.
pub fn multipart<I, B>(frames: I) -> Multipart
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    frames.into_iter().map(Into::into).collect()
}

/// Parse a frame as a UTF-8 string.
///
/// # Errors
///
/// Returns an error if the frame doesn't exist or isn't valid UTF-8.
pub fn frame_str(frames: &Multipart, index: usize) -> io::Result<&str> {
    let frame = frames
        .get(index)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame index out of bounds"))?;

    std::str::from_utf8(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_read_frames() {
        let msg = multipart([&b"topic"[..], &b"payload"[..]]);
        assert_eq!(msg.len(), 2);
        assert_eq!(frame_str(&msg, 0).unwrap(), "topic");
        assert!(frame_str(&msg, 2).is_err());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let msg = multipart([&[0xff, 0xfe][..]]);
        assert!(frame_str(&msg, 0).is_err());
    }
}
