use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::errors::{ErrorKind, Result};

#[cfg(feature = "gzip")]
mod gzip;
#[cfg(feature = "lz4")]
mod lz4;
#[cfg(feature = "snappy")]
mod snappy;
#[cfg(feature = "zstd")]
mod zstd;

/// The compression codec applied to a whole record batch body,
/// carried in bits 0..2 of the batch attributes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum Compression {
    #[default]
    None = 0,
    GZIP = 1,
    Snappy = 2,
    LZ4 = 3,
    Zstd = 4,
}

impl From<i8> for Compression {
    fn from(v: i8) -> Self {
        match v {
            1 => Compression::GZIP,
            2 => Compression::Snappy,
            3 => Compression::LZ4,
            4 => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

impl FromStr for Compression {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::GZIP),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::LZ4),
            "zstd" => Ok(Compression::Zstd),
            _ => bail!(ErrorKind::ParseError(format!("unknown compression: {}", s))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Compression::None => "none",
            Compression::GZIP => "gzip",
            Compression::Snappy => "snappy",
            Compression::LZ4 => "lz4",
            Compression::Zstd => "zstd",
        })
    }
}

impl Compression {
    /// Compress a contiguous byte region.
    ///
    /// A codec that is not compiled in surfaces `UnsupportedCompression`
    /// instead of a panic.
    pub fn compress(self, src: &[u8]) -> Result<Bytes> {
        match self {
            Compression::None => Ok(Bytes::copy_from_slice(src)),
            #[cfg(feature = "gzip")]
            Compression::GZIP => gzip::compress(src),
            #[cfg(feature = "snappy")]
            Compression::Snappy => snappy::compress(src),
            #[cfg(feature = "lz4")]
            Compression::LZ4 => lz4::compress(src),
            #[cfg(feature = "zstd")]
            Compression::Zstd => zstd::compress(src),
            #[allow(unreachable_patterns)]
            other => bail!(ErrorKind::UnsupportedCompression(other as i8)),
        }
    }

    /// Decompress a contiguous byte region.
    pub fn decompress(self, src: &[u8]) -> Result<Bytes> {
        match self {
            Compression::None => Ok(Bytes::copy_from_slice(src)),
            #[cfg(feature = "gzip")]
            Compression::GZIP => gzip::decompress(src),
            #[cfg(feature = "snappy")]
            Compression::Snappy => snappy::decompress(src),
            #[cfg(feature = "lz4")]
            Compression::LZ4 => lz4::decompress(src),
            #[cfg(feature = "zstd")]
            Compression::Zstd => zstd::decompress(src),
            #[allow(unreachable_patterns)]
            other => bail!(ErrorKind::UnsupportedCompression(other as i8)),
        }
    }

    /// Compress a multi-chunk byte region as one stream.
    pub fn compress_chunks(self, chunks: &[&[u8]]) -> Result<Bytes> {
        match chunks {
            [single] => self.compress(single),
            _ => {
                let total = chunks.iter().map(|chunk| chunk.len()).sum();
                let mut joined = Vec::with_capacity(total);
                for chunk in chunks {
                    joined.extend_from_slice(chunk);
                }
                self.compress(&joined)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        // compressible payload with some entropy at the tail
        let mut data = b"the quick brown fox jumps over the lazy dog ".repeat(64);
        data.extend((0..=255u8).cycle().take(512));
        data
    }

    #[test]
    fn test_none_round_trip() {
        let data = sample();
        let compressed = Compression::None.compress(&data).unwrap();
        assert_eq!(&compressed[..], &data[..]);
        assert_eq!(&Compression::None.decompress(&compressed).unwrap()[..], &data[..]);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_gzip_round_trip() {
        let data = sample();
        let compressed = Compression::GZIP.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(&Compression::GZIP.decompress(&compressed).unwrap()[..], &data[..]);
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_snappy_round_trip() {
        let data = sample();
        let compressed = Compression::Snappy.compress(&data).unwrap();
        assert_eq!(&Compression::Snappy.decompress(&compressed).unwrap()[..], &data[..]);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_round_trip() {
        let data = sample();
        let compressed = Compression::LZ4.compress(&data).unwrap();
        assert_eq!(&Compression::LZ4.decompress(&compressed).unwrap()[..], &data[..]);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd_round_trip() {
        let data = sample();
        let compressed = Compression::Zstd.compress(&data).unwrap();
        assert_eq!(&Compression::Zstd.decompress(&compressed).unwrap()[..], &data[..]);
    }

    #[test]
    fn test_chunked_equals_contiguous() {
        let data = sample();
        let (head, tail) = data.split_at(data.len() / 3);
        let chunked = Compression::None.compress_chunks(&[head, tail]).unwrap();
        assert_eq!(&chunked[..], &data[..]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("gzip".parse::<Compression>().unwrap(), Compression::GZIP);
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("brotli".parse::<Compression>().is_err());
    }
}
