//! I420 frame wire format.
//!
//! ## Wire format
//!
//! ```text
//! width:    u32 LE            (4)
//! height:   u32 LE            (4)
//! Y plane:  width * height    bytes
//! U plane:  (w/2) * (h/2)     bytes
//! V plane:  (w/2) * (h/2)     bytes
//! ```
//!
//! Trailing bytes after the V plane are ignored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Size of the width/height header.
pub const FRAME_HEADER_SIZE: usize = 8;

// ── PlaneLayout ──────────────────────────────────────────────────

/// Byte sizes of the three planes for a given resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub luma: usize,
    pub chroma: usize,
}

impl PlaneLayout {
    /// Compute plane sizes, rejecting dimensions a 4:2:0 frame cannot have.
    pub fn for_dimensions(width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::OddDimensions { width, height });
        }
        let overflow = FrameError::SizeOverflow { width, height };
        let luma = (width as usize)
            .checked_mul(height as usize)
            .ok_or(overflow.clone())?;
        let chroma = (width as usize / 2) * (height as usize / 2);
        // header + Y + U + V must be addressable
        chroma
            .checked_mul(2)
            .and_then(|c| c.checked_add(luma))
            .and_then(|n| n.checked_add(FRAME_HEADER_SIZE))
            .ok_or(overflow)?;
        Ok(Self { luma, chroma })
    }

    /// Minimum message length: header plus all three planes.
    pub fn message_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.luma + 2 * self.chroma
    }
}

// ── DecodedFrame ─────────────────────────────────────────────────

/// A validated frame whose planes are zero-copy views of the message.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub y: Bytes,
    pub u: Bytes,
    pub v: Bytes,
}

impl DecodedFrame {
    /// Chroma plane width in pixels.
    pub fn chroma_width(&self) -> u32 {
        self.width / 2
    }

    /// Chroma plane height in pixels.
    pub fn chroma_height(&self) -> u32 {
        self.height / 2
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Stateless parser for raw frame messages.
pub struct FrameCodec;

impl FrameCodec {
    /// Read the `(width, height)` header without validating the planes.
    pub fn peek_dimensions(msg: &[u8]) -> Result<(u32, u32), FrameError> {
        if msg.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::HeaderTooShort { actual: msg.len() });
        }
        let width = u32::from_le_bytes([msg[0], msg[1], msg[2], msg[3]]);
        let height = u32::from_le_bytes([msg[4], msg[5], msg[6], msg[7]]);
        Ok((width, height))
    }

    /// Validate `msg` and slice it into Y/U/V planes.
    pub fn decode(msg: &Bytes) -> Result<DecodedFrame, FrameError> {
        let (width, height) = Self::peek_dimensions(msg)?;
        let layout = PlaneLayout::for_dimensions(width, height)?;
        let expected = layout.message_len();
        if msg.len() < expected {
            return Err(FrameError::Truncated {
                width,
                height,
                expected,
                actual: msg.len(),
            });
        }

        let y_start = FRAME_HEADER_SIZE;
        let u_start = y_start + layout.luma;
        let v_start = u_start + layout.chroma;

        Ok(DecodedFrame {
            width,
            height,
            y: msg.slice(y_start..u_start),
            u: msg.slice(u_start..v_start),
            v: msg.slice(v_start..v_start + layout.chroma),
        })
    }

    /// Build a raw frame message from its planes.
    pub fn encode(width: u32, height: u32, y: &[u8], u: &[u8], v: &[u8]) -> Result<Bytes, FrameError> {
        let layout = PlaneLayout::for_dimensions(width, height)?;
        let expected = layout.message_len();
        if y.len() != layout.luma || u.len() != layout.chroma || v.len() != layout.chroma {
            return Err(FrameError::Truncated {
                width,
                height,
                expected,
                actual: FRAME_HEADER_SIZE + y.len() + u.len() + v.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(expected);
        buf.put_u32_le(width);
        buf.put_u32_le(height);
        buf.put_slice(y);
        buf.put_slice(u);
        buf.put_slice(v);
        Ok(buf.freeze())
    }
}

/// Convenience wrapper around [`FrameCodec::encode`].
pub fn encode_frame(width: u32, height: u32, y: &[u8], u: &[u8], v: &[u8]) -> Result<Bytes, FrameError> {
    FrameCodec::encode(width, height, y, u, v)
}

/// A flat-colour frame, handy for producers that just need a valid message.
pub fn solid_frame(width: u32, height: u32, y: u8, u: u8, v: u8) -> Result<Bytes, FrameError> {
    let layout = PlaneLayout::for_dimensions(width, height)?;
    FrameCodec::encode(
        width,
        height,
        &vec![y; layout.luma],
        &vec![u; layout.chroma],
        &vec![v; layout.chroma],
    )
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_len(width: u32, height: u32, len: usize) -> Bytes {
        let mut buf = vec![0u8; len];
        buf[0..4].copy_from_slice(&width.to_le_bytes());
        buf[4..8].copy_from_slice(&height.to_le_bytes());
        Bytes::from(buf)
    }

    #[test]
    fn plane_sizes_for_even_dimensions() {
        for (w, h) in [(2, 2), (4, 8), (320, 240), (1280, 720), (1918, 1080)] {
            let layout = PlaneLayout::for_dimensions(w, h).unwrap();
            assert_eq!(layout.luma, (w * h) as usize);
            assert_eq!(layout.chroma, ((w / 2) * (h / 2)) as usize);

            let msg = message_with_len(w, h, layout.message_len());
            let frame = FrameCodec::decode(&msg).unwrap();
            assert_eq!(frame.y.len(), layout.luma);
            assert_eq!(frame.u.len(), layout.chroma);
            assert_eq!(frame.v.len(), layout.chroma);
        }
    }

    #[test]
    fn vga_frame_decodes() {
        let msg = message_with_len(640, 480, 8 + 640 * 480 + 2 * (320 * 240));
        let frame = FrameCodec::decode(&msg).unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.y.len(), 307_200);
        assert_eq!(frame.u.len(), 76_800);
        assert_eq!(frame.v.len(), 76_800);
    }

    #[test]
    fn truncated_vga_frame_rejected() {
        let msg = message_with_len(640, 480, 400_000);
        let err = FrameCodec::decode(&msg).unwrap_err();
        assert_eq!(
            err,
            FrameError::Truncated {
                width: 640,
                height: 480,
                expected: 460_808,
                actual: 400_000,
            }
        );
    }

    #[test]
    fn one_byte_short_rejected() {
        let layout = PlaneLayout::for_dimensions(16, 16).unwrap();
        let msg = message_with_len(16, 16, layout.message_len() - 1);
        assert!(matches!(
            FrameCodec::decode(&msg),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn header_too_short() {
        let msg = Bytes::from_static(&[1, 0, 0, 0, 2]);
        assert_eq!(
            FrameCodec::decode(&msg).unwrap_err(),
            FrameError::HeaderTooShort { actual: 5 }
        );
    }

    #[test]
    fn odd_and_zero_dimensions_rejected() {
        let msg = message_with_len(3, 2, 64);
        assert!(matches!(
            FrameCodec::decode(&msg),
            Err(FrameError::OddDimensions { width: 3, height: 2 })
        ));

        let msg = message_with_len(0, 2, 64);
        assert_eq!(FrameCodec::decode(&msg).unwrap_err(), FrameError::ZeroDimensions);
    }

    #[test]
    fn huge_header_does_not_overflow() {
        let msg = message_with_len(u32::MAX - 1, u32::MAX - 1, 64);
        assert!(FrameCodec::decode(&msg).is_err());
    }

    #[test]
    fn planes_are_sliced_in_order() {
        let y: Vec<u8> = (0..16).collect();
        let u = [100u8; 4];
        let v = [200u8; 4];
        let msg = encode_frame(4, 4, &y, &u, &v).unwrap();
        assert_eq!(msg.len(), 8 + 16 + 8);

        let frame = FrameCodec::decode(&msg).unwrap();
        assert_eq!(&frame.y[..], &y[..]);
        assert!(frame.u.iter().all(|&b| b == 100));
        assert!(frame.v.iter().all(|&b| b == 200));
        assert_eq!(frame.chroma_width(), 2);
        assert_eq!(frame.chroma_height(), 2);
    }

    #[test]
    fn trailing_bytes_ignored() {
        let mut raw = solid_frame(2, 2, 1, 2, 3).unwrap().to_vec();
        raw.extend_from_slice(&[9, 9, 9]);
        let frame = FrameCodec::decode(&Bytes::from(raw)).unwrap();
        assert_eq!(&frame.v[..], &[3]);
    }

    #[test]
    fn encode_rejects_wrong_plane_sizes() {
        assert!(encode_frame(4, 4, &[0; 15], &[0; 4], &[0; 4]).is_err());
    }
}
