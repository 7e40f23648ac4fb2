use bytes::Bytes;

use crate::protocol::{Offset, PartitionId, RecordHeader, Timestamp};

/// A record to be published: where it goes and what it carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProducerRecord {
    pub topic_name: String,
    /// Explicit partition; otherwise the partitioner decides.
    pub partition: Option<PartitionId>,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
    /// Defaults to the wall clock at append time.
    pub timestamp: Option<Timestamp>,
}

impl ProducerRecord {
    pub fn from_value<S, V>(topic_name: S, value: V) -> Self
    where
        S: Into<String>,
        V: Into<Bytes>,
    {
        ProducerRecord {
            topic_name: topic_name.into(),
            value: Some(value.into()),
            ..ProducerRecord::default()
        }
    }

    pub fn from_key_value<S, K, V>(topic_name: S, key: K, value: V) -> Self
    where
        S: Into<String>,
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        ProducerRecord {
            topic_name: topic_name.into(),
            key: Some(key.into()),
            value: Some(value.into()),
            ..ProducerRecord::default()
        }
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_key<K: Into<Bytes>>(mut self, key: K) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header<S: Into<String>, V: Into<Bytes>>(mut self, key: S, value: V) -> Self {
        self.headers.push(RecordHeader {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// What the broker acknowledged for one record.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordMetadata {
    pub topic_name: String,
    pub partition: PartitionId,
    /// -1 when produced with `acks=0`.
    pub offset: Offset,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builders() {
        let record = ProducerRecord::from_key_value("t", "k", "v")
            .with_partition(2)
            .with_header("h", "hv")
            .with_timestamp(42);

        assert_eq!(record.topic_name, "t");
        assert_eq!(record.partition, Some(2));
        assert_eq!(record.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(record.value.as_deref(), Some(&b"v"[..]));
        assert_eq!(record.headers.len(), 1);
        assert_eq!(record.timestamp, Some(42));
    }
}
