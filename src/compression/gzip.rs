use std::io::prelude::*;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as Level;

use crate::errors::Result;

pub fn compress(src: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(src.len() / 2 + 16), Level::default());
    encoder.write_all(src)?;
    Ok(Bytes::from(encoder.finish()?))
}

pub fn decompress(src: &[u8]) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(src.len() * 2);
    GzDecoder::new(src).read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}
