use bytes::Bytes;

use crate::errors::{ErrorKind, Result};

pub fn compress(src: &[u8]) -> Result<Bytes> {
    let buf = ::zstd::stream::encode_all(src, 0)
        .map_err(|err| ErrorKind::CodecError(format!("zstd compress: {}", err)))?;
    Ok(Bytes::from(buf))
}

pub fn decompress(src: &[u8]) -> Result<Bytes> {
    let buf = ::zstd::stream::decode_all(src)
        .map_err(|err| ErrorKind::CodecError(format!("zstd decompress: {}", err)))?;
    Ok(Bytes::from(buf))
}
