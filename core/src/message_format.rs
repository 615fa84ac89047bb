// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Strategy for moving a message value to and from its wire form
///
/// Must round-trip exactly for every value the algorithm can produce.
/// Stateless or statically configured.
pub trait MessageFormat<M>: Send + Sync {
    /// Serialize a message value into a wire value
    fn wrap_value(&self, value: &M) -> Value;

    /// Deserialize a wire value back into a message value
    fn unwrap_value(&self, wire: &Value) -> Result<M, ProtocolError>;
}

/// Format for any serde-serializable message type
pub struct JsonFormat<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonFormat<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonFormat<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageFormat<M> for JsonFormat<M>
where
    M: Serialize + DeserializeOwned + Send + Sync,
{
    fn wrap_value(&self, value: &M) -> Value {
        // Message values are plain data (scalars or small structs), so
        // serialization cannot fail for legal values
        serde_json::to_value(value).unwrap_or(Value::Null)
    }

    fn unwrap_value(&self, wire: &Value) -> Result<M, ProtocolError> {
        serde_json::from_value(wire.clone())
            .map_err(|e| ProtocolError::BadParameter(format!("unreadable message value: {}", e)))
    }
}
