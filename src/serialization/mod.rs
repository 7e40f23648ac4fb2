//! Typed adapters between application values and the raw key/value bytes
//! the producer and consumer operate on.

use std::marker::PhantomData;
use std::string::FromUtf8Error;

use bytes::{Buf, BufMut, Bytes};

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use self::json::{JsonDeserializer, JsonSerializer};

/// A trait for serializing type to Kafka record
pub trait Serializer {
    /// The type of value that this serializer will serialize.
    type Item;
    /// The type of error that this serializer will return if it fails.
    type Error;

    /// Serialize data of topic to the given buffer
    fn serialize_to<B: BufMut>(
        &self,
        topic_name: &str,
        data: Self::Item,
        buf: &mut B,
    ) -> Result<(), Self::Error>;

    /// Serialize data of topic as `Bytes`
    fn serialize(&self, topic_name: &str, data: Self::Item) -> Result<Bytes, Self::Error> {
        let mut buf = Vec::with_capacity(16);
        self.serialize_to(topic_name, data, &mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// A trait for deserializing type from Kafka record
pub trait Deserializer {
    /// The type of value that this deserializer will deserialize.
    type Item;
    /// The type of error that this deserializer will return if it fails.
    type Error;

    /// Deserialize data of topic from the given buffer
    fn deserialize<B: Buf>(&self, topic_name: &str, buf: &mut B) -> Result<Self::Item, Self::Error>;
}

/// Serialize nothing; for keyless records.
#[derive(Clone, Debug)]
pub struct NoopSerializer<T> {
    phantom: PhantomData<T>,
}

impl<T> Default for NoopSerializer<T> {
    fn default() -> Self {
        NoopSerializer {
            phantom: PhantomData,
        }
    }
}

impl<T> Serializer for NoopSerializer<T> {
    type Item = T;
    type Error = ();

    fn serialize_to<B: BufMut>(&self, _topic_name: &str, _data: T, _buf: &mut B) -> Result<(), ()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct NoopDeserializer<T> {
    phantom: PhantomData<T>,
}

impl<T> Default for NoopDeserializer<T> {
    fn default() -> Self {
        NoopDeserializer {
            phantom: PhantomData,
        }
    }
}

impl<T: Default> Deserializer for NoopDeserializer<T> {
    type Item = T;
    type Error = ();

    fn deserialize<B: Buf>(&self, _topic_name: &str, _buf: &mut B) -> Result<T, ()> {
        Ok(T::default())
    }
}

/// Pass `Bytes` through untouched.
#[derive(Clone, Debug, Default)]
pub struct BytesSerializer;

impl Serializer for BytesSerializer {
    type Item = Bytes;
    type Error = ();

    fn serialize_to<B: BufMut>(&self, _topic_name: &str, data: Bytes, buf: &mut B) -> Result<(), ()> {
        buf.put_slice(&data);
        Ok(())
    }

    fn serialize(&self, _topic_name: &str, data: Bytes) -> Result<Bytes, ()> {
        Ok(data)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BytesDeserializer;

impl Deserializer for BytesDeserializer {
    type Item = Bytes;
    type Error = ();

    fn deserialize<B: Buf>(&self, _topic_name: &str, buf: &mut B) -> Result<Bytes, ()> {
        Ok(buf.copy_to_bytes(buf.remaining()))
    }
}

/// UTF-8 strings.
#[derive(Clone, Debug, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    type Item = String;
    type Error = ();

    fn serialize_to<B: BufMut>(
        &self,
        _topic_name: &str,
        data: String,
        buf: &mut B,
    ) -> Result<(), ()> {
        buf.put_slice(data.as_bytes());
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StringDeserializer;

impl Deserializer for StringDeserializer {
    type Item = String;
    type Error = FromUtf8Error;

    fn deserialize<B: Buf>(&self, _topic_name: &str, buf: &mut B) -> Result<String, FromUtf8Error> {
        let raw = buf.copy_to_bytes(buf.remaining());
        String::from_utf8(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let data = Bytes::from_static(b"payload");
        let serialized = BytesSerializer.serialize("t", data.clone()).unwrap();
        assert_eq!(serialized, data);

        let mut buf = &serialized[..];
        assert_eq!(BytesDeserializer.deserialize("t", &mut buf).unwrap(), data);
    }

    #[test]
    fn test_string_round_trip() {
        let serialized = StringSerializer.serialize("t", "héllo".to_owned()).unwrap();
        let mut buf = &serialized[..];
        assert_eq!(
            StringDeserializer.deserialize("t", &mut buf).unwrap(),
            "héllo"
        );
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let mut buf = &[0xffu8, 0xfe][..];
        assert!(StringDeserializer.deserialize("t", &mut buf).is_err());
    }

    #[test]
    fn test_noop() {
        let serialized = NoopSerializer::<String>::default()
            .serialize("t", "ignored".to_owned())
            .unwrap();
        assert!(serialized.is_empty());
    }
}
