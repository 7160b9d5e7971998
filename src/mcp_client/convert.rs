//! Structural schema transcoding through JSON.
//!
//! Provider schemas, the common [`ParameterSchema`](crate::tool::ParameterSchema)
//! and Ollama's tool declaration are independently defined but structurally
//! compatible. Instead of mapping them field by field, values are serialized
//! to JSON text and deserialized into the target shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure to transcode a value between two shapes.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to marshal from type {from}: {reason}")]
    Marshal {
        from: &'static str,
        reason: String,
    },

    #[error("failed to unmarshal to type {to}: {reason}")]
    Unmarshal {
        to: &'static str,
        reason: String,
    },
}

/// Transcode `from` into a `T` via its JSON encoding.
pub fn convert_via_json<S, T>(from: &S) -> Result<T, ConversionError>
where
    S: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let data = serde_json::to_string(from).map_err(|e| ConversionError::Marshal {
        from: std::any::type_name::<S>(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&data).map_err(|e| ConversionError::Unmarshal {
        to: std::any::type_name::<T>(),
        reason: e.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
