use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::{Error, ErrorKind};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Kafka's outermost framing: a signed 32-bit big-endian length prefix in
/// front of every request and response.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        FrameCodec { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let size = BigEndian::read_i32(&src[..4]);
        if size < 0 {
            bail!(ErrorKind::CodecError(format!("negative frame size {}", size)));
        }
        let size = size as usize;
        if size > self.max_frame_size {
            // a fatal desync; the connection is torn down
            bail!(ErrorKind::FrameTooLarge(size, self.max_frame_size));
        }

        if src.len() < 4 + size {
            src.reserve(4 + size - src.len());
            return Ok(None);
        }

        src.advance(4);
        Ok(Some(src.split_to(size)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Error> {
        if item.len() > self.max_frame_size {
            bail!(ErrorKind::FrameTooLarge(item.len(), self.max_frame_size));
        }
        dst.reserve(4 + item.len());
        dst.put_i32(item.len() as i32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_partial_then_whole() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0, 0, 0, 5]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"hell");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"o");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 1, b'a', 0, 0, 0, 1, b'b']);

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"a");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"b");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 1, 0]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_round_trip() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"payload"), &mut buf).unwrap();
        assert_eq!(&buf[..4], [0, 0, 0, 7]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"payload");
    }
}
