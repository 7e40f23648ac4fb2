use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::serialization::{Deserializer, Serializer};

/// Serialize any `serde`-serializable value as JSON.
#[derive(Clone, Debug)]
pub struct JsonSerializer<T> {
    pretty: bool,
    phantom: PhantomData<T>,
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        JsonSerializer {
            pretty: false,
            phantom: PhantomData,
        }
    }
}

impl<T> JsonSerializer<T> {
    pub fn pretty() -> Self {
        JsonSerializer {
            pretty: true,
            phantom: PhantomData,
        }
    }
}

impl<T: Serialize> Serializer for JsonSerializer<T> {
    type Item = T;
    type Error = serde_json::Error;

    fn serialize_to<B: BufMut>(
        &self,
        _topic_name: &str,
        data: T,
        buf: &mut B,
    ) -> Result<(), Self::Error> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(&data)?
        } else {
            serde_json::to_vec(&data)?
        };
        buf.put_slice(&encoded);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct JsonDeserializer<T> {
    phantom: PhantomData<T>,
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        JsonDeserializer {
            phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Deserializer for JsonDeserializer<T> {
    type Item = T;
    type Error = serde_json::Error;

    fn deserialize<B: Buf>(&self, _topic_name: &str, buf: &mut B) -> Result<T, Self::Error> {
        let raw: Bytes = buf.copy_to_bytes(buf.remaining());
        serde_json::from_slice(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_json_round_trip() {
        let mut value = HashMap::new();
        value.insert("answer".to_owned(), 42u32);

        let serialized = JsonSerializer::default().serialize("t", value.clone()).unwrap();
        let mut buf = &serialized[..];
        let decoded: HashMap<String, u32> =
            JsonDeserializer::default().deserialize("t", &mut buf).unwrap();
        assert_eq!(decoded, value);
    }
}
