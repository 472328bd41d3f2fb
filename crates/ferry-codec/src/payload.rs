//! Byte-level payload decoding and the inbound validator.

use std::fmt;
use std::marker::PhantomData;

use ferry_core::{DataReceiveError, PayloadValidator, RawMessage};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::value::{FromJson, Validated};

/// Errors produced when decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not JSON.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The payload is `null` or carries none of the expected fields.
    #[error("payload is missing")]
    Missing,

    /// The payload is present but violates its declared bounds.
    #[error("payload is invalid: {0}")]
    Invalid(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Parses `bytes` as JSON and builds a validated `T` from it.
///
/// ```rust,ignore
/// let volume: Volume = validate_payload(br#"{"level": 7}"#)?;
/// ```
pub fn validate_payload<T: FromJson + Validated>(bytes: &[u8]) -> CodecResult<T> {
    let json: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let value = T::from_json(&json);
    if !value.is_initialized() {
        return Err(CodecError::Missing);
    }
    if !value.is_valid() {
        return Err(CodecError::Invalid(json.to_string()));
    }
    Ok(value)
}

/// Serializes a value to JSON bytes.
pub fn encode_payload<T: Validated>(value: &T) -> Vec<u8> {
    value.to_json().to_string().into_bytes()
}

/// A [`PayloadValidator`] accepting payloads that decode as a valid `T`.
pub struct JsonPayloadValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonPayloadValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonPayloadValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonPayloadValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonPayloadValidator")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: FromJson + Validated> PayloadValidator for JsonPayloadValidator<T> {
    fn validate(&self, message: &RawMessage) -> Result<(), DataReceiveError> {
        validate_payload::<T>(message.data()).map(drop).map_err(|e| {
            debug!(
                device = %message.device(),
                app = %message.app(),
                error = %e,
                "Payload rejected"
            );
            DataReceiveError::new(e.to_string())
        })
    }
}
