//! Serialization protocol for checkpoint state blobs

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for turning checkpoint state into stored bytes and back
///
/// A backend never inspects the bytes it stores; it only requires that
/// `loads(dumps(x)) == x` for every value the store accepts.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};
    use crate::error::CheckpointError;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_roundtrip() {
        let serializer = JsonSerializer::new();
        let checkpoint = Checkpoint::empty()
            .with_channel_value(
                "messages",
                json!([
                    {"type": "human", "content": "hello", "additional_kwargs": {}},
                    {"type": "ai", "content": [{"type": "text", "text": "hi"}]}
                ]),
            )
            .with_updated_channels(vec!["messages".to_string()]);

        let bytes = serializer.dumps(&checkpoint).unwrap();
        let restored: Checkpoint = serializer.loads(&bytes).unwrap();

        assert_eq!(checkpoint, restored);
    }

    #[test]
    fn test_metadata_extra_fields_survive() {
        let serializer = JsonSerializer::new();
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_step(4)
            .with_extra("user", json!({"name": "alice"}));

        let bytes = serializer.dumps(&metadata).unwrap();
        let restored: CheckpointMetadata = serializer.loads(&bytes).unwrap();

        assert_eq!(metadata, restored);
    }

    #[test]
    fn test_corrupt_bytes_are_codec_errors() {
        let serializer = JsonSerializer::new();
        let err = serializer.loads::<Checkpoint>(b"{\"v\":1,").unwrap_err();
        assert!(matches!(err, CheckpointError::Codec(_)));
    }

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 _\\-]{0,24}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::from),
                prop::collection::hash_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_channel_values_roundtrip(value in arb_json()) {
            let serializer = JsonSerializer::new();
            let checkpoint = Checkpoint::empty().with_channel_value("state", value);
            let bytes = serializer.dumps(&checkpoint).unwrap();
            let restored: Checkpoint = serializer.loads(&bytes).unwrap();
            prop_assert_eq!(checkpoint, restored);
        }
    }
}
