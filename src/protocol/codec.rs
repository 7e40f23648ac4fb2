//! Primitive readers and writers for the Kafka wire format.
//!
//! The writer side is an extension trait over a growing `BytesMut`; the
//! reader side is a set of nom parsers over byte slices. Both understand the
//! two generations of the protocol encoding: the legacy fixed-length
//! prefixes and the compact (unsigned-varint, length + 1) prefixes used by
//! flexible API versions, selected by a caller parameter.

use bytes::{BufMut, Bytes, BytesMut};
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind as NomErrorKind};
use nom::number::complete::be_u8;
use uuid::Uuid;

use crate::errors::{ErrorKind, Result};

pub type ParseResult<'a, T> = nom::IResult<&'a [u8], T>;

fn reject<T>(i: &[u8]) -> ParseResult<T> {
    Err(nom::Err::Error(NomError::new(i, NomErrorKind::Verify)))
}

/// An opaque numbered extension field carried after a flexible message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedField {
    pub tag: u32,
    pub data: Bytes,
}

/// The ordered tag → bytes mapping at the tail of flexible messages.
/// Unknown tags are preserved verbatim so pass-through re-encoding is
/// byte-exact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedFields {
    pub fields: Vec<TaggedField>,
}

impl TaggedFields {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|field| field.tag == tag)
            .map(|field| &field.data)
    }
}

/// The number of bytes `put_unsigned_varint` emits for `v`.
pub fn uvarint_len(mut v: u64) -> usize {
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// The number of bytes `put_varint` emits for `v`.
pub fn varint_len(v: i32) -> usize {
    varlong_len(i64::from(v))
}

/// The number of bytes `put_varlong` emits for `v`.
pub fn varlong_len(v: i64) -> usize {
    uvarint_len((v.wrapping_shl(1) ^ (v >> 63)) as u64)
}

/// Append-only writer over `BytesMut` for every primitive the protocol
/// uses. Fixed-width integers are big-endian; `compact` parameters switch
/// string/bytes/array length prefixes between the legacy and the
/// unsigned-varint encodings.
pub trait WriteExt {
    fn put_unsigned_varint(&mut self, v: u64);

    /// ZigZag-encoded 32-bit varint.
    fn put_varint(&mut self, v: i32) {
        self.put_varlong(i64::from(v));
    }

    /// ZigZag-encoded 64-bit varint.
    fn put_varlong(&mut self, v: i64) {
        self.put_unsigned_varint((v.wrapping_shl(1) ^ (v >> 63)) as u64);
    }

    fn put_opt_str(&mut self, compact: bool, s: Option<&str>) -> Result<()>;

    fn put_str(&mut self, compact: bool, s: &str) -> Result<()> {
        self.put_opt_str(compact, Some(s))
    }

    fn put_opt_bytes(&mut self, compact: bool, data: Option<&[u8]>) -> Result<()>;

    fn put_bytes(&mut self, compact: bool, data: &[u8]) -> Result<()> {
        self.put_opt_bytes(compact, Some(data))
    }

    fn put_uuid(&mut self, uuid: Uuid);

    fn put_array<T, F>(&mut self, compact: bool, items: &[T], f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>;

    fn put_nullable_array<T, F>(&mut self, compact: bool, items: Option<&[T]>, f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>;

    /// The tagged-fields block; flexible messages always carry one, even
    /// when empty.
    fn put_tagged_fields(&mut self, fields: &TaggedFields);
}

impl WriteExt for BytesMut {
    fn put_unsigned_varint(&mut self, mut v: u64) {
        loop {
            let mut b = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                b |= 0x80;
            }
            self.put_u8(b);
            if v == 0 {
                break;
            }
        }
    }

    fn put_opt_str(&mut self, compact: bool, s: Option<&str>) -> Result<()> {
        if compact {
            match s {
                Some(s) => {
                    self.put_unsigned_varint(s.len() as u64 + 1);
                    self.put_slice(s.as_bytes());
                }
                None => self.put_unsigned_varint(0),
            }
        } else {
            match s {
                Some(s) => {
                    if s.len() > i16::MAX as usize {
                        bail!(ErrorKind::CodecError(format!(
                            "string of {} bytes exceeds the legacy length prefix",
                            s.len()
                        )));
                    }
                    self.put_i16(s.len() as i16);
                    self.put_slice(s.as_bytes());
                }
                None => self.put_i16(-1),
            }
        }
        Ok(())
    }

    fn put_opt_bytes(&mut self, compact: bool, data: Option<&[u8]>) -> Result<()> {
        if compact {
            match data {
                Some(data) => {
                    self.put_unsigned_varint(data.len() as u64 + 1);
                    self.put_slice(data);
                }
                None => self.put_unsigned_varint(0),
            }
        } else {
            match data {
                Some(data) => {
                    if data.len() > i32::MAX as usize {
                        bail!(ErrorKind::CodecError(format!(
                            "{} bytes exceed the legacy length prefix",
                            data.len()
                        )));
                    }
                    self.put_i32(data.len() as i32);
                    self.put_slice(data);
                }
                None => self.put_i32(-1),
            }
        }
        Ok(())
    }

    fn put_uuid(&mut self, uuid: Uuid) {
        self.put_slice(uuid.as_bytes());
    }

    fn put_array<T, F>(&mut self, compact: bool, items: &[T], mut f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        if compact {
            self.put_unsigned_varint(items.len() as u64 + 1);
        } else {
            self.put_i32(items.len() as i32);
        }
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }

    fn put_nullable_array<T, F>(&mut self, compact: bool, items: Option<&[T]>, f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        match items {
            Some(items) => self.put_array(compact, items, f),
            None if compact => {
                self.put_unsigned_varint(0);
                Ok(())
            }
            None => {
                self.put_i32(-1);
                Ok(())
            }
        }
    }

    fn put_tagged_fields(&mut self, fields: &TaggedFields) {
        self.put_unsigned_varint(fields.fields.len() as u64);
        for field in &fields.fields {
            self.put_unsigned_varint(u64::from(field.tag));
            self.put_unsigned_varint(field.data.len() as u64);
            self.put_slice(&field.data);
        }
    }
}

/// LEB128 unsigned varint, at most ten bytes.
pub fn parse_unsigned_varint(i: &[u8]) -> ParseResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut rest = i;

    loop {
        let (r, byte) = be_u8(rest)?;
        rest = r;
        if shift > 63 {
            return reject(i);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((rest, value));
        }
        shift += 7;
    }
}

/// ZigZag 32-bit varint.
pub fn parse_varint(i: &[u8]) -> ParseResult<i32> {
    let (rest, v) = parse_varlong(i)?;
    if v < i64::from(i32::MIN) || v > i64::from(i32::MAX) {
        return reject(i);
    }
    Ok((rest, v as i32))
}

/// ZigZag 64-bit varint.
pub fn parse_varlong(i: &[u8]) -> ParseResult<i64> {
    let (rest, v) = parse_unsigned_varint(i)?;
    Ok((rest, ((v >> 1) as i64) ^ -((v & 1) as i64)))
}

/// Nullable string in either encoding.
pub fn parse_opt_str(i: &[u8], compact: bool) -> ParseResult<Option<String>> {
    let (rest, len) = if compact {
        let (rest, n) = parse_unsigned_varint(i)?;
        match n {
            0 => return Ok((rest, None)),
            n => (rest, (n - 1) as usize),
        }
    } else {
        let (rest, n) = nom::number::complete::be_i16(i)?;
        if n < 0 {
            return Ok((rest, None));
        }
        (rest, n as usize)
    };

    let (rest, raw) = take(len)(rest)?;
    match std::str::from_utf8(raw) {
        Ok(s) => Ok((rest, Some(s.to_owned()))),
        Err(_) => reject(i),
    }
}

/// Non-nullable view; a null sentinel decodes as the empty string.
pub fn parse_str(i: &[u8], compact: bool) -> ParseResult<String> {
    let (rest, s) = parse_opt_str(i, compact)?;
    Ok((rest, s.unwrap_or_default()))
}

pub fn parse_string(i: &[u8]) -> ParseResult<String> {
    parse_str(i, false)
}

pub fn parse_compact_str(i: &[u8]) -> ParseResult<String> {
    parse_str(i, true)
}

/// Nullable byte blob in either encoding.
pub fn parse_opt_bytes(i: &[u8], compact: bool) -> ParseResult<Option<Bytes>> {
    let (rest, len) = if compact {
        let (rest, n) = parse_unsigned_varint(i)?;
        match n {
            0 => return Ok((rest, None)),
            n => (rest, (n - 1) as usize),
        }
    } else {
        let (rest, n) = nom::number::complete::be_i32(i)?;
        if n < 0 {
            return Ok((rest, None));
        }
        (rest, n as usize)
    };

    let (rest, raw) = take(len)(rest)?;
    Ok((rest, Some(Bytes::copy_from_slice(raw))))
}

pub fn parse_bytes(i: &[u8], compact: bool) -> ParseResult<Bytes> {
    let (rest, data) = parse_opt_bytes(i, compact)?;
    Ok((rest, data.unwrap_or_default()))
}

/// Array in either encoding; the null sentinel decodes as `None`.
pub fn parse_nullable_array<'a, T, F>(
    i: &'a [u8],
    compact: bool,
    mut f: F,
) -> ParseResult<'a, Option<Vec<T>>>
where
    F: FnMut(&'a [u8]) -> ParseResult<'a, T>,
{
    let (mut rest, count) = if compact {
        let (rest, n) = parse_unsigned_varint(i)?;
        match n {
            0 => return Ok((rest, None)),
            n => (rest, (n - 1) as usize),
        }
    } else {
        let (rest, n) = nom::number::complete::be_i32(i)?;
        if n < 0 {
            return Ok((rest, None));
        }
        (rest, n as usize)
    };

    // every element takes at least one byte, so a count beyond the
    // remaining input is corrupt
    if count > rest.len() {
        return reject(i);
    }

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let (r, item) = f(rest)?;
        rest = r;
        items.push(item);
    }
    Ok((rest, Some(items)))
}

/// Non-nullable view; a null sentinel decodes as an empty vector.
pub fn parse_array<'a, T, F>(i: &'a [u8], compact: bool, f: F) -> ParseResult<'a, Vec<T>>
where
    F: FnMut(&'a [u8]) -> ParseResult<'a, T>,
{
    let (rest, items) = parse_nullable_array(i, compact, f)?;
    Ok((rest, items.unwrap_or_default()))
}

pub fn parse_uuid(i: &[u8]) -> ParseResult<Uuid> {
    let (rest, raw) = take(16usize)(i)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(raw);
    Ok((rest, Uuid::from_bytes(bytes)))
}

/// Tagged-fields block of a flexible message. When `flexible` is false the
/// message has no such block and nothing is consumed.
pub fn parse_tagged_fields(i: &[u8], flexible: bool) -> ParseResult<TaggedFields> {
    if !flexible {
        return Ok((i, TaggedFields::default()));
    }

    let (mut rest, count) = parse_unsigned_varint(i)?;
    if count as usize > rest.len() {
        return reject(i);
    }

    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (r, tag) = parse_unsigned_varint(rest)?;
        let (r, len) = parse_unsigned_varint(r)?;
        let (r, data) = take(len as usize)(r)?;
        rest = r;
        fields.push(TaggedField {
            tag: tag as u32,
            data: Bytes::copy_from_slice(data),
        });
    }
    Ok((rest, TaggedFields { fields }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_uvarint(v: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_unsigned_varint(v);
        buf.to_vec()
    }

    fn encode_varlong(v: i64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_varlong(v);
        buf.to_vec()
    }

    #[test]
    fn test_unsigned_varint() {
        assert_eq!(encode_uvarint(0), vec![0]);
        assert_eq!(encode_uvarint(1), vec![1]);
        assert_eq!(encode_uvarint(127), vec![0x7f]);
        assert_eq!(encode_uvarint(128), vec![0x80, 0x01]);
        assert_eq!(encode_uvarint(300), vec![0xac, 0x02]);

        for v in [0u64, 1, 127, 128, 300, 16383, 16384, u64::from(u32::MAX), u64::MAX] {
            let encoded = encode_uvarint(v);
            assert_eq!(encoded.len(), uvarint_len(v));
            let (rest, decoded) = parse_unsigned_varint(&encoded).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn test_zigzag_round_trip() {
        assert_eq!(encode_varlong(0), vec![0]);
        assert_eq!(encode_varlong(-1), vec![1]);
        assert_eq!(encode_varlong(1), vec![2]);
        assert_eq!(encode_varlong(-2), vec![3]);

        for v in [
            0i64,
            -1,
            1,
            63,
            -64,
            64,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::MAX,
            i64::MIN,
        ] {
            let encoded = encode_varlong(v);
            assert_eq!(encoded.len(), varlong_len(v));
            let (rest, decoded) = parse_varlong(&encoded).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn test_varint_range_check() {
        let mut buf = BytesMut::new();
        buf.put_varlong(i64::from(i32::MAX) + 1);
        assert!(parse_varint(&buf).is_err());
    }

    #[test]
    fn test_overlong_varint_rejected() {
        let overlong = [0xffu8; 11];
        assert!(parse_unsigned_varint(&overlong).is_err());
    }

    #[test]
    fn test_str_encodings() {
        let mut buf = BytesMut::new();
        buf.put_opt_str(false, Some("test")).unwrap();
        assert_eq!(&buf[..], b"\x00\x04test");
        assert_eq!(parse_opt_str(&buf, false).unwrap().1, Some("test".to_owned()));

        let mut buf = BytesMut::new();
        buf.put_opt_str(false, None).unwrap();
        assert_eq!(&buf[..], b"\xff\xff");
        assert_eq!(parse_opt_str(&buf, false).unwrap().1, None);

        let mut buf = BytesMut::new();
        buf.put_opt_str(true, Some("test")).unwrap();
        assert_eq!(&buf[..], b"\x05test");
        assert_eq!(parse_opt_str(&buf, true).unwrap().1, Some("test".to_owned()));

        let mut buf = BytesMut::new();
        buf.put_opt_str(true, None).unwrap();
        assert_eq!(&buf[..], b"\x00");
        assert_eq!(parse_opt_str(&buf, true).unwrap().1, None);

        // empty and null are distinct
        let mut buf = BytesMut::new();
        buf.put_opt_str(true, Some("")).unwrap();
        assert_eq!(&buf[..], b"\x01");
        assert_eq!(parse_opt_str(&buf, true).unwrap().1, Some(String::new()));
    }

    #[test]
    fn test_compact_int32_array() {
        let mut buf = BytesMut::new();
        buf.put_array(true, &[1i32, 2, 3], |buf, v| {
            buf.put_i32(*v);
            Ok(())
        })
        .unwrap();

        assert_eq!(
            &buf[..],
            [0x04, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]
        );

        let (rest, parsed) = parse_array(&buf, true, nom::number::complete::be_i32).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn test_nullable_array() {
        let mut buf = BytesMut::new();
        buf.put_nullable_array::<i32, _>(false, None, |buf, v| {
            buf.put_i32(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(&buf[..], [0xff, 0xff, 0xff, 0xff]);
        let (_, parsed) =
            parse_nullable_array(&buf, false, nom::number::complete::be_i32).unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_uuid_round_trip() {
        let uuid = Uuid::from_bytes(*b"0123456789abcdef");
        let mut buf = BytesMut::new();
        buf.put_uuid(uuid);
        assert_eq!(buf.len(), 16);
        assert_eq!(parse_uuid(&buf).unwrap().1, uuid);
    }

    #[test]
    fn test_tagged_fields_round_trip() {
        let fields = TaggedFields {
            fields: vec![
                TaggedField {
                    tag: 0,
                    data: Bytes::from_static(b"zero"),
                },
                TaggedField {
                    tag: 7,
                    data: Bytes::from_static(b"seven"),
                },
            ],
        };

        let mut buf = BytesMut::new();
        buf.put_tagged_fields(&fields);
        let (rest, parsed) = parse_tagged_fields(&buf, true).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, fields);
        assert_eq!(parsed.get(7), Some(&Bytes::from_static(b"seven")));

        // non-flexible parses consume nothing
        let (rest, parsed) = parse_tagged_fields(&buf, false).unwrap();
        assert_eq!(rest.len(), buf.len());
        assert!(parsed.is_empty());
    }
}
