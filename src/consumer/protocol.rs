//! The embedded consumer protocol: the Subscription and Assignment blobs
//! carried opaquely inside JoinGroup/SyncGroup. Both use the legacy
//! encodings regardless of the outer API version.

use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i32};

use crate::errors::{Error, ErrorKind, Result};
use crate::network::TopicPartition;
use crate::protocol::{
    parse_array, parse_opt_bytes, parse_str, ParseResult, WriteExt,
};

pub const CONSUMER_PROTOCOL: &str = "consumer";
const VERSION: i16 = 0;

/// What a member wants to consume, sent with JoinGroup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subscription {
    pub topics: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl Subscription {
    pub fn new(topics: Vec<String>) -> Self {
        Subscription {
            topics,
            user_data: None,
        }
    }

    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_i16(VERSION);
        buf.put_array(false, &self.topics, |buf, topic| buf.put_str(false, topic))?;
        buf.put_opt_bytes(false, self.user_data.as_deref())?;
        Ok(buf.freeze())
    }

    pub fn parse(src: &[u8]) -> Result<Subscription> {
        fn inner(i: &[u8]) -> ParseResult<'_, Subscription> {
            let (i, _version) = be_i16(i)?;
            let (i, topics) = parse_array(i, false, |i| parse_str(i, false))?;
            let (i, user_data) = parse_opt_bytes(i, false)?;
            Ok((i, Subscription { topics, user_data }))
        }

        inner(src)
            .map(|(_, subscription)| subscription)
            .map_err(|_| Error::from(ErrorKind::ParseError("consumer subscription".into())))
    }
}

/// What the leader handed a member, returned from SyncGroup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    pub partitions: Vec<TopicPartition>,
    pub user_data: Option<Bytes>,
}

impl Assignment {
    pub fn new(partitions: Vec<TopicPartition>) -> Self {
        Assignment {
            partitions,
            user_data: None,
        }
    }

    pub fn serialize(&self) -> Result<Bytes> {
        // group partitions per topic, ordered for determinism
        let mut partitions = self.partitions.clone();
        partitions.sort();

        let mut topics: Vec<(String, Vec<i32>)> = Vec::new();
        for tp in partitions {
            match topics.last_mut() {
                Some((topic_name, partitions)) if *topic_name == tp.topic_name => {
                    partitions.push(tp.partition)
                }
                _ => topics.push((tp.topic_name, vec![tp.partition])),
            }
        }

        let mut buf = BytesMut::with_capacity(64);
        buf.put_i16(VERSION);
        buf.put_array(false, &topics, |buf, (topic_name, partitions)| {
            buf.put_str(false, topic_name)?;
            buf.put_array(false, partitions, |buf, partition| {
                buf.put_i32(*partition);
                Ok(())
            })
        })?;
        buf.put_opt_bytes(false, self.user_data.as_deref())?;
        Ok(buf.freeze())
    }

    pub fn parse(src: &[u8]) -> Result<Assignment> {
        fn inner(i: &[u8]) -> ParseResult<'_, Assignment> {
            let (i, _version) = be_i16(i)?;
            let (i, topics) = parse_array(i, false, |i| {
                let (i, topic_name) = parse_str(i, false)?;
                let (i, partitions) = parse_array(i, false, be_i32)?;
                Ok((i, (topic_name, partitions)))
            })?;
            let (i, user_data) = parse_opt_bytes(i, false)?;

            let partitions = topics
                .into_iter()
                .flat_map(|(topic_name, partitions)| {
                    partitions
                        .into_iter()
                        .map(move |partition| TopicPartition::new(topic_name.clone(), partition))
                })
                .collect();
            Ok((i, Assignment {
                partitions,
                user_data,
            }))
        }

        inner(src)
            .map(|(_, assignment)| assignment)
            .map_err(|_| Error::from(ErrorKind::ParseError("consumer assignment".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_round_trip() {
        let subscription = Subscription::new(vec!["a".into(), "b".into()]);
        let wire = subscription.serialize().unwrap();

        assert_eq!(
            &wire[..],
            [
                0, 0, // version
                0, 0, 0, 2, // 2 topics
                0, 1, b'a', 0, 1, b'b', // names
                0xff, 0xff, 0xff, 0xff, // user data = null
            ]
        );
        assert_eq!(Subscription::parse(&wire).unwrap(), subscription);
    }

    #[test]
    fn test_assignment_round_trip() {
        let assignment = Assignment::new(vec![
            TopicPartition::new("t2", 0),
            TopicPartition::new("t1", 1),
            TopicPartition::new("t1", 0),
        ]);
        let wire = assignment.serialize().unwrap();
        let parsed = Assignment::parse(&wire).unwrap();

        // serialization groups and orders
        assert_eq!(
            parsed.partitions,
            vec![
                TopicPartition::new("t1", 0),
                TopicPartition::new("t1", 1),
                TopicPartition::new("t2", 0),
            ]
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(Assignment::parse(&[1, 2]).is_err());
    }
}
