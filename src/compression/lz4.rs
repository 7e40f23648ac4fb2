use std::io::prelude::*;

use bytes::Bytes;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::errors::{ErrorKind, Result};

pub fn compress(src: &[u8]) -> Result<Bytes> {
    let mut encoder = FrameEncoder::new(Vec::with_capacity(src.len() / 2 + 16));
    encoder.write_all(src)?;
    let buf = encoder
        .finish()
        .map_err(|err| ErrorKind::CodecError(format!("lz4 compress: {}", err)))?;
    Ok(Bytes::from(buf))
}

pub fn decompress(src: &[u8]) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(src.len() * 2);
    FrameDecoder::new(src)
        .read_to_end(&mut buf)
        .map_err(|err| ErrorKind::CodecError(format!("lz4 decompress: {}", err)))?;
    Ok(Bytes::from(buf))
}
