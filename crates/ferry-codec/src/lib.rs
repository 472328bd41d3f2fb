//! # Ferry Codec
//!
//! Validated JSON values for application payloads carried by the transport
//! manager.
//!
//! | Type | JSON | Valid when |
//! |------|------|------------|
//! | [`Boolean`] | `true` / `false` | always |
//! | [`Integer<T, MIN, MAX>`](Integer) | integer | fits `T` and lies in `MIN..=MAX` |
//! | [`Float<MIN, MAX>`](Float) | number | lies in `MIN..=MAX` |
//! | [`BoundedString<MIN, MAX>`](BoundedString) | string | character count in `MIN..=MAX` |
//! | [`Enum<E>`](Enum) | string | names a value of `E` |
//! | [`Array<T, MIN, MAX>`](Array) | array | size in range and every element valid |
//! | [`Map<T, MIN, MAX>`](Map) | object | size in range and every value valid |
//! | [`Optional<T>`](Optional) | any / absent | absent, or the inner value is valid |
//!
//! Structs of these types derive [`Validated`](derive@Validated) (with the
//! `derive` feature) and decode with [`validate_payload`]:
//!
//! ```rust,ignore
//! use ferry_codec::{Integer, Optional, BoundedString, Validated, validate_payload};
//!
//! #[derive(Debug, Validated)]
//! struct SetVolume {
//!     level: Integer<u8, 0, 100>,
//!     label: Optional<BoundedString<1, 32>>,
//! }
//!
//! let cmd: SetVolume = validate_payload(br#"{"level": 40}"#)?;
//! ```

extern crate self as ferry_codec;

pub mod collection;
pub mod payload;
pub mod scalar;
pub mod value;

pub use collection::{Array, Map, Optional};
pub use payload::{CodecError, CodecResult, JsonPayloadValidator, encode_payload, validate_payload};
pub use scalar::{Boolean, BoundedString, Enum, EnumValue, Float, Integer, IntegerRepr};
pub use value::{FromJson, Validated, ValueState};

#[cfg(feature = "derive")]
pub use ferry_macros::Validated;

/// Reads `key` from a JSON object. Absent keys read as `null`.
pub fn field<T: FromJson>(object: &serde_json::Map<String, serde_json::Value>, key: &str) -> T {
    T::from_json(object.get(key).unwrap_or(&serde_json::Value::Null))
}

#[doc(hidden)]
pub mod __private {
    pub use serde_json::{Map, Value};
}
