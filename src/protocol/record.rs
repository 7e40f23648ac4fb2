//! The v2 (magic byte 2) record batch format, the unit of storage and
//! transfer for Produce and Fetch.
//!
//! A batch is a 61-byte header followed by a records section that may be
//! compressed as a whole. The CRC32C covers everything from the attributes
//! field to the end of the batch; readers verify it before trusting any
//! field behind it and skip to the next length-delimited boundary when it
//! does not match.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_32_ISCSI};
use nom::bytes::complete::take;

use crate::compression::Compression;
use crate::errors::{Error, ErrorKind, Result};
use crate::protocol::codec::{parse_varint, parse_varlong, ParseResult, WriteExt};
use crate::protocol::{Offset, ProducerEpoch, ProducerId, Timestamp};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Bytes of batch header in front of the records section.
pub const RECORD_BATCH_OVERHEAD: usize = 61;
/// `baseOffset` + `batchLength`; the length field counts everything behind
/// these two.
const LOG_OVERHEAD: usize = 12;
/// Offset of the crc field, counted from `baseOffset`.
const CRC_OFFSET: usize = 17;
/// Offset of the attributes field, the start of the CRC-protected range.
const ATTRIBUTES_OFFSET: usize = 21;

pub const ATTR_COMPRESSION_MASK: i16 = 0x07;
pub const ATTR_TIMESTAMP_TYPE: i16 = 1 << 3;
pub const ATTR_TRANSACTIONAL: i16 = 1 << 4;
pub const ATTR_CONTROL: i16 = 1 << 5;

pub const NO_PRODUCER_ID: ProducerId = -1;
pub const NO_PRODUCER_EPOCH: ProducerEpoch = -1;
pub const NO_SEQUENCE: i32 = -1;
pub const NO_PARTITION_LEADER_EPOCH: i32 = -1;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Bytes>,
}

/// A single record with the batch-relative deltas already resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub offset: Offset,
    pub timestamp: Timestamp,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordBatch {
    pub base_offset: Offset,
    pub partition_leader_epoch: i32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub first_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub base_sequence: i32,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn compression(&self) -> Compression {
        Compression::from((self.attributes & ATTR_COMPRESSION_MASK) as i8)
    }

    pub fn is_transactional(&self) -> bool {
        self.attributes & ATTR_TRANSACTIONAL != 0
    }

    pub fn is_control(&self) -> bool {
        self.attributes & ATTR_CONTROL != 0
    }

    /// The offset right after this batch, derived from the header so that
    /// even empty (compacted-away) batches advance the fetch position.
    pub fn next_offset(&self) -> Offset {
        self.base_offset + i64::from(self.last_offset_delta) + 1
    }
}

fn parse_record<'a>(
    base_offset: Offset,
    first_timestamp: Timestamp,
    i: &'a [u8],
) -> ParseResult<'a, Record> {
    let (i, length) = parse_varint(i)?;
    let (i, body) = take(length.max(0) as usize)(i)?;

    let (body, _attributes) = nom::number::complete::be_i8(body)?;
    let (body, timestamp_delta) = parse_varlong(body)?;
    let (body, offset_delta) = parse_varint(body)?;
    let (body, key) = parse_record_blob(body)?;
    let (body, value) = parse_record_blob(body)?;
    let (mut body, headers_count) = parse_varint(body)?;

    let mut headers = Vec::with_capacity(headers_count.max(0) as usize);
    for _ in 0..headers_count {
        let (rest, key) = parse_record_blob(body)?;
        let (rest, value) = parse_record_blob(rest)?;
        body = rest;
        let key = key.unwrap_or_default();
        headers.push(RecordHeader {
            key: String::from_utf8_lossy(&key).into_owned(),
            value,
        });
    }

    Ok((
        i,
        Record {
            offset: base_offset + i64::from(offset_delta),
            timestamp: first_timestamp + timestamp_delta,
            key,
            value,
            headers,
        },
    ))
}

/// Record-level key/value/header blob: varint length with -1 as null.
fn parse_record_blob(i: &[u8]) -> ParseResult<'_, Option<Bytes>> {
    let (i, len) = parse_varint(i)?;
    if len < 0 {
        return Ok((i, None));
    }
    let (i, raw) = take(len as usize)(i)?;
    Ok((i, Some(Bytes::copy_from_slice(raw))))
}

/// Parse a stream of record batches out of a Fetch partition payload.
///
/// Batches whose CRC32C does not match are skipped by advancing over their
/// declared length; a truncated batch at the tail (the broker cuts the
/// payload at `max_bytes`) ends the stream silently.
pub fn parse_record_batches(src: &[u8]) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    let mut rest = src;

    while rest.len() >= LOG_OVERHEAD {
        let base_offset = BigEndian::read_i64(rest);
        let batch_length = BigEndian::read_i32(&rest[8..]);
        if batch_length < 0 {
            bail!(ErrorKind::CodecError(format!(
                "negative record batch length {}",
                batch_length
            )));
        }

        let batch_end = LOG_OVERHEAD + batch_length as usize;
        if rest.len() < batch_end {
            // truncated tail
            break;
        }

        let body = &rest[LOG_OVERHEAD..batch_end];
        rest = &rest[batch_end..];

        match parse_record_batch(base_offset, body)? {
            Some(batch) => batches.push(batch),
            None => continue,
        }
    }

    Ok(batches)
}

/// `body` covers `partitionLeaderEpoch` to the end of the batch. `None`
/// means the batch failed its checksum and was skipped.
fn parse_record_batch(base_offset: Offset, body: &[u8]) -> Result<Option<RecordBatch>> {
    if body.len() < RECORD_BATCH_OVERHEAD - LOG_OVERHEAD {
        bail!(ErrorKind::CodecError("record batch header truncated".into()));
    }

    let partition_leader_epoch = BigEndian::read_i32(body);
    let magic = body[4] as i8;
    if magic != 2 {
        bail!(ErrorKind::CodecError(format!(
            "unsupported record batch magic {}",
            magic
        )));
    }

    let crc = BigEndian::read_u32(&body[5..]);
    let computed = CASTAGNOLI.checksum(&body[ATTRIBUTES_OFFSET - LOG_OVERHEAD..]);
    if computed != crc {
        warn!(
            "dropping record batch @ offset {} with mismatched checksum, expected {:#x}, got {:#x}",
            base_offset, computed, crc
        );
        return Ok(None);
    }

    let attributes = BigEndian::read_i16(&body[9..]);
    let last_offset_delta = BigEndian::read_i32(&body[11..]);
    let first_timestamp = BigEndian::read_i64(&body[15..]);
    let max_timestamp = BigEndian::read_i64(&body[23..]);
    let producer_id = BigEndian::read_i64(&body[31..]);
    let producer_epoch = BigEndian::read_i16(&body[39..]);
    let base_sequence = BigEndian::read_i32(&body[41..]);
    let records_count = BigEndian::read_i32(&body[45..]);
    let payload = &body[49..];

    if records_count < 0 {
        bail!(ErrorKind::CodecError(format!(
            "negative record count {}",
            records_count
        )));
    }

    let compression = Compression::from((attributes & ATTR_COMPRESSION_MASK) as i8);
    let decompressed: Bytes;
    let mut records_bytes: &[u8] = if compression == Compression::None {
        payload
    } else {
        decompressed = compression.decompress(payload)?;
        &decompressed[..]
    };

    let mut records = Vec::with_capacity(records_count as usize);
    for _ in 0..records_count {
        let (rest, record) = parse_record(base_offset, first_timestamp, records_bytes)
            .map_err(|_| Error::from(ErrorKind::CodecError("malformed record".into())))?;
        records_bytes = rest;
        records.push(record);
    }

    Ok(Some(RecordBatch {
        base_offset,
        partition_leader_epoch,
        attributes,
        last_offset_delta,
        first_timestamp,
        max_timestamp,
        producer_id,
        producer_epoch,
        base_sequence,
        records,
    }))
}

/// Write-side batch under construction, one per `(topic, partition)` group
/// of a Produce request.
#[derive(Debug)]
pub struct MutableRecordBatch {
    compression: Compression,
    first_timestamp: Option<Timestamp>,
    max_timestamp: Timestamp,
    records: BytesMut,
    record_count: i32,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub base_sequence: i32,
    pub transactional: bool,
}

impl MutableRecordBatch {
    pub fn new(compression: Compression) -> Self {
        MutableRecordBatch {
            compression,
            first_timestamp: None,
            max_timestamp: 0,
            records: BytesMut::with_capacity(4096),
            record_count: 0,
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            base_sequence: NO_SEQUENCE,
            transactional: false,
        }
    }

    pub fn record_count(&self) -> i32 {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Upper bound of the wire size if the batch were built right now;
    /// compression can only shrink it.
    pub fn size_estimate(&self) -> usize {
        RECORD_BATCH_OVERHEAD + self.records.len()
    }

    /// Append one record; the relative offset is the running record count.
    pub fn append(
        &mut self,
        timestamp: Timestamp,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        headers: &[RecordHeader],
    ) -> Result<()> {
        let first_timestamp = *self.first_timestamp.get_or_insert(timestamp);
        if timestamp > self.max_timestamp {
            self.max_timestamp = timestamp;
        }

        let mut body = BytesMut::with_capacity(
            64 + key.map(<[u8]>::len).unwrap_or_default()
                + value.map(<[u8]>::len).unwrap_or_default(),
        );
        body.put_i8(0); // record attributes are unused
        body.put_varlong(timestamp - first_timestamp);
        body.put_varint(self.record_count);
        put_record_blob(&mut body, key);
        put_record_blob(&mut body, value);
        body.put_varint(headers.len() as i32);
        for header in headers {
            put_record_blob(&mut body, Some(header.key.as_bytes()));
            put_record_blob(&mut body, header.value.as_deref());
        }

        self.records.put_varint(body.len() as i32);
        self.records.extend_from_slice(&body);
        self.record_count += 1;
        Ok(())
    }

    /// Serialize the batch, compressing the records section and patching in
    /// the length and checksum.
    pub fn build(&self, base_offset: Offset) -> Result<Bytes> {
        let payload = if self.compression == Compression::None {
            Bytes::copy_from_slice(&self.records)
        } else {
            self.compression.compress(&self.records)?
        };

        let mut buf = BytesMut::with_capacity(RECORD_BATCH_OVERHEAD + payload.len());
        buf.put_i64(base_offset);
        buf.put_i32((RECORD_BATCH_OVERHEAD - LOG_OVERHEAD + payload.len()) as i32);
        buf.put_i32(NO_PARTITION_LEADER_EPOCH);
        buf.put_i8(2); // magic
        buf.put_u32(0); // crc, patched below

        let mut attributes = self.compression as i16 & ATTR_COMPRESSION_MASK;
        if self.transactional {
            attributes |= ATTR_TRANSACTIONAL;
        }
        buf.put_i16(attributes);
        buf.put_i32(self.record_count - 1); // last offset delta
        buf.put_i64(self.first_timestamp.unwrap_or_default());
        buf.put_i64(self.max_timestamp);
        buf.put_i64(self.producer_id);
        buf.put_i16(self.producer_epoch);
        buf.put_i32(self.base_sequence);
        buf.put_i32(self.record_count);
        buf.extend_from_slice(&payload);

        let crc = CASTAGNOLI.checksum(&buf[ATTRIBUTES_OFFSET..]);
        BigEndian::write_u32(&mut buf[CRC_OFFSET..], crc);

        Ok(buf.freeze())
    }
}

fn put_record_blob(buf: &mut BytesMut, data: Option<&[u8]>) {
    match data {
        Some(data) => {
            buf.put_varint(data.len() as i32);
            buf.put_slice(data);
        }
        None => buf.put_varint(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_batch(compression: Compression) -> Bytes {
        let mut batch = MutableRecordBatch::new(compression);
        batch
            .append(1_600_000_000_000, Some(b"k1"), Some(b"v1"), &[])
            .unwrap();
        batch
            .append(
                1_600_000_000_100,
                None,
                Some(b"v2"),
                &[RecordHeader {
                    key: "h".into(),
                    value: Some(Bytes::from_static(b"hv")),
                }],
            )
            .unwrap();
        batch.build(0).unwrap()
    }

    #[test]
    fn test_round_trip_uncompressed() {
        let built = build_batch(Compression::None);
        let batches = parse_record_batches(&built).unwrap();
        assert_eq!(batches.len(), 1);

        let batch = &batches[0];
        assert_eq!(batch.base_offset, 0);
        assert_eq!(batch.last_offset_delta, 1);
        assert_eq!(batch.compression(), Compression::None);
        assert_eq!(batch.records.len(), 2);

        assert_eq!(batch.records[0].offset, 0);
        assert_eq!(batch.records[0].timestamp, 1_600_000_000_000);
        assert_eq!(batch.records[0].key.as_deref(), Some(&b"k1"[..]));
        assert_eq!(batch.records[0].value.as_deref(), Some(&b"v1"[..]));

        assert_eq!(batch.records[1].offset, 1);
        assert_eq!(batch.records[1].timestamp, 1_600_000_000_100);
        assert_eq!(batch.records[1].key, None);
        assert_eq!(batch.records[1].headers.len(), 1);
        assert_eq!(batch.records[1].headers[0].key, "h");

        assert_eq!(batch.next_offset(), 2);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_round_trip_gzip() {
        let built = build_batch(Compression::GZIP);
        let batches = parse_record_batches(&built).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].compression(), Compression::GZIP);
        assert_eq!(batches[0].records.len(), 2);
        assert_eq!(batches[0].records[1].value.as_deref(), Some(&b"v2"[..]));
    }

    #[test]
    fn test_corrupt_batch_skipped() {
        let good = build_batch(Compression::None);

        let mut corrupt = BytesMut::from(&good[..]);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;

        // corrupted batch first, intact batch behind it
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&corrupt);
        stream.extend_from_slice(&good);

        let batches = parse_record_batches(&stream).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 2);
    }

    #[test]
    fn test_truncated_tail_ignored() {
        let built = build_batch(Compression::None);
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&built);
        stream.extend_from_slice(&built[..built.len() / 2]);

        let batches = parse_record_batches(&stream).unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_crc_protects_attributes_range() {
        let built = build_batch(Compression::None);
        // flip a bit inside the attributes field
        let mut corrupt = BytesMut::from(&built[..]);
        corrupt[ATTRIBUTES_OFFSET] ^= 0x10;

        let batches = parse_record_batches(&corrupt).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_sequence_and_txn_flags() {
        let mut batch = MutableRecordBatch::new(Compression::None);
        batch.producer_id = 9000;
        batch.producer_epoch = 3;
        batch.base_sequence = 42;
        batch.transactional = true;
        batch.append(1, Some(b"k"), Some(b"v"), &[]).unwrap();

        let built = batch.build(0).unwrap();
        let parsed = parse_record_batches(&built).unwrap().remove(0);

        assert_eq!(parsed.producer_id, 9000);
        assert_eq!(parsed.producer_epoch, 3);
        assert_eq!(parsed.base_sequence, 42);
        assert!(parsed.is_transactional());
        assert!(!parsed.is_control());
    }
}
