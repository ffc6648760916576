//! Length-prefixed framing over an ordered byte stream.
//!
//! Each frame is a 4-byte big-endian unsigned length followed by that many
//! payload bytes. [`frame`] prepends the prefix; [`FrameBuffer`] reassembles
//! complete frames from arbitrarily chunked reads, keeping partial trailing
//! bytes until more data arrives.

use super::codec::ProtocolError;

/// Upper bound on a declared frame length. A peer announcing more than this
/// is either corrupt or hostile; the connection should be dropped.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prepends the 4-byte big-endian length prefix to `payload`.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Reassembly buffer for inbound frames.
///
/// Feed raw stream bytes with [`extend`](FrameBuffer::extend), then drain
/// every complete frame with [`drain_frames`](FrameBuffer::drain_frames).
/// An incomplete trailing frame is not an error; it stays buffered for the
/// next read.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read stream bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed as frames.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Consumes as many complete frames as the buffer holds, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] when a length prefix exceeds
    /// [`MAX_FRAME_LEN`]; the buffer is left untouched so the caller can tear
    /// the connection down.
    pub fn drain_frames(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut frames = Vec::new();
        let mut offset = 0usize;

        while self.buf.len() - offset >= 4 {
            let header: [u8; 4] = self.buf[offset..offset + 4].try_into().unwrap();
            let len = u32::from_be_bytes(header) as usize;
            if len > MAX_FRAME_LEN {
                return Err(ProtocolError::FrameTooLarge {
                    declared: len,
                    limit: MAX_FRAME_LEN,
                });
            }
            if self.buf.len() - offset - 4 < len {
                break; // partial frame; wait for more bytes
            }
            frames.push(self.buf[offset + 4..offset + 4 + len].to_vec());
            offset += 4 + len;
        }

        self.buf.drain(..offset);
        Ok(frames)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_prepends_big_endian_length() {
        let framed = frame(b"abc");
        assert_eq!(framed, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_frame_of_empty_payload_is_just_the_prefix() {
        assert_eq!(frame(b""), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_round_trip_of_two_frames_leaves_empty_buffer() {
        let mut buf = FrameBuffer::new();
        let mut wire = frame(b"first");
        wire.extend_from_slice(&frame(b"second"));
        buf.extend(&wire);

        let frames = buf.drain_frames().unwrap();
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut buf = FrameBuffer::new();
        let wire = frame(b"hello world");
        buf.extend(&wire[..7]); // length prefix + 3 payload bytes

        assert!(buf.drain_frames().unwrap().is_empty());
        assert_eq!(buf.pending_len(), 7);

        buf.extend(&wire[7..]);
        let frames = buf.drain_frames().unwrap();
        assert_eq!(frames, vec![b"hello world".to_vec()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_partial_length_prefix_stays_buffered() {
        let mut buf = FrameBuffer::new();
        buf.extend(&[0, 0]); // half a length prefix
        assert!(buf.drain_frames().unwrap().is_empty());
        assert_eq!(buf.pending_len(), 2);
    }

    #[test]
    fn test_complete_frame_followed_by_partial_drains_only_the_complete_one() {
        let mut buf = FrameBuffer::new();
        let mut wire = frame(b"done");
        let second = frame(b"pending");
        wire.extend_from_slice(&second[..5]);
        buf.extend(&wire);

        let frames = buf.drain_frames().unwrap();
        assert_eq!(frames, vec![b"done".to_vec()]);
        assert_eq!(buf.pending_len(), 5);
    }

    #[test]
    fn test_oversized_declared_length_is_rejected() {
        let mut buf = FrameBuffer::new();
        buf.extend(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        buf.extend(&[0u8; 16]);

        let result = buf.drain_frames();
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_many_small_frames_drain_in_order() {
        let mut buf = FrameBuffer::new();
        for i in 0u8..50 {
            buf.extend(&frame(&[i]));
        }
        let frames = buf.drain_frames().unwrap();
        assert_eq!(frames.len(), 50);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f, &vec![i as u8]);
        }
    }
}
