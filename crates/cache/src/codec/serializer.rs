//! Payload serializers

use crate::config::SerializerKind;
use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use crate::value::Value;

/// Serialize `value` for `key` with the given serializer
pub fn serialize(kind: SerializerKind, key: &str, value: &Value) -> Result<Vec<u8>> {
    let result = match kind {
        SerializerKind::Native => bincode::serialize(value).map_err(|e| e as BoxError),
        SerializerKind::Json => serde_json::to_vec(&value.to_json()).map_err(|e| Box::new(e) as BoxError),
    };

    result.map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        operation: SerializationOp::Encode,
        source,
        recovery_hint: RecoveryHint::NoRecovery,
    })
}

/// Deserialize a payload; failures are corruption since the header vouched for it
pub fn deserialize(kind: SerializerKind, key: &str, bytes: &[u8]) -> Result<Value> {
    match kind {
        SerializerKind::Native => bincode::deserialize(bytes)
            .map_err(|e| CacheError::corruption(key, format!("native payload: {e}"))),
        SerializerKind::Json => serde_json::from_slice::<serde_json::Value>(bytes)
            .map(Value::from_json)
            .map_err(|e| CacheError::corruption(key, format!("json payload: {e}"))),
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;
