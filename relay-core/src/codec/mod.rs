//! Stream framing for raw frame messages.
//!
//! A socket stream has no message boundaries, so every raw frame
//! message travels behind a `u32` little-endian length prefix. The
//! payload itself is the I420 wire format parsed by [`frame::FrameCodec`].

pub mod frame;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::RelayError;

/// Largest message accepted on the socket (covers 4K I420 with headroom).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Length-prefixed framing used by the frame transport.
pub struct RelayCodec {
    inner: LengthDelimitedCodec,
}

impl RelayCodec {
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .little_endian()
            .length_field_length(4)
            .max_frame_length(max)
            .new_codec();
        Self { inner }
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayCodec {
    type Item = Bytes;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }
}

impl Encoder<Bytes> for RelayCodec {
    type Error = RelayError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let mut codec = RelayCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"abc"), &mut buf).unwrap();
        assert_eq!(&buf[..], &[3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn partial_message_waits_for_more() {
        let mut codec = RelayCodec::new();
        let mut buf = BytesMut::from(&[5u8, 0, 0, 0, 1, 2][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[3, 4, 5]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&msg[..], &[1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_message_is_an_error() {
        let mut codec = RelayCodec::with_max_message_size(4);
        let mut buf = BytesMut::from(&[16u8, 0, 0, 0][..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
