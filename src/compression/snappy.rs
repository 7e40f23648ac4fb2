use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::errors::{ErrorKind, Result};

/// Header of the xerial framing some JVM producers wrap around raw snappy
/// blocks: the magic, two version ints, then `(len, block)` pairs.
const XERIAL_MAGIC: &[u8] = &[0x82, b'S', b'N', b'A', b'P', b'P', b'Y', 0];
const XERIAL_HEADER_LEN: usize = 16;

pub fn compress(src: &[u8]) -> Result<Bytes> {
    let compressed = snap::raw::Encoder::new()
        .compress_vec(src)
        .map_err(|err| ErrorKind::CodecError(format!("snappy compress: {}", err)))?;
    Ok(Bytes::from(compressed))
}

pub fn decompress(src: &[u8]) -> Result<Bytes> {
    if src.len() > XERIAL_HEADER_LEN && src.starts_with(XERIAL_MAGIC) {
        decompress_xerial(&src[XERIAL_HEADER_LEN..])
    } else {
        let decompressed = snap::raw::Decoder::new()
            .decompress_vec(src)
            .map_err(|err| ErrorKind::CodecError(format!("snappy decompress: {}", err)))?;
        Ok(Bytes::from(decompressed))
    }
}

fn decompress_xerial(mut src: &[u8]) -> Result<Bytes> {
    let mut decoder = snap::raw::Decoder::new();
    let mut buf = Vec::with_capacity(src.len() * 2);

    while !src.is_empty() {
        if src.len() < 4 {
            bail!(ErrorKind::CodecError("truncated xerial snappy block".into()));
        }
        let block_len = BigEndian::read_i32(src) as usize;
        src = &src[4..];
        if src.len() < block_len {
            bail!(ErrorKind::CodecError("truncated xerial snappy block".into()));
        }
        let block = decoder
            .decompress_vec(&src[..block_len])
            .map_err(|err| ErrorKind::CodecError(format!("snappy decompress: {}", err)))?;
        buf.extend_from_slice(&block);
        src = &src[block_len..];
    }

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xerial_framed_round_trip() {
        let data = b"xerial framed snappy payload".repeat(8);
        let block = snap::raw::Encoder::new().compress_vec(&data).unwrap();

        let mut framed = Vec::new();
        framed.extend_from_slice(XERIAL_MAGIC);
        framed.extend_from_slice(&[0, 0, 0, 1]); // version
        framed.extend_from_slice(&[0, 0, 0, 1]); // compatible version
        framed.extend_from_slice(&(block.len() as i32).to_be_bytes());
        framed.extend_from_slice(&block);

        assert_eq!(&decompress(&framed).unwrap()[..], &data[..]);
    }
}
