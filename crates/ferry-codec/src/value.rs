//! The validated value contract.
//!
//! Every value type in this crate is built from a [`serde_json::Value`] and
//! ends up in one of three states:
//!
//! | State | Meaning |
//! |-------|---------|
//! | [`ValueState::Uninitialized`] | absent or `null` |
//! | [`ValueState::Invalid`] | present, but of the wrong type or out of bounds |
//! | [`ValueState::Valid`] | present and within bounds |
//!
//! Building a value never fails; callers inspect the state afterwards.

use serde_json::Value;

/// Lifecycle of a validated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueState {
    #[default]
    Uninitialized,
    Invalid,
    Valid,
}

impl ValueState {
    /// Maps a bounds check on a present value to a state.
    pub fn checked(valid: bool) -> Self {
        if valid { Self::Valid } else { Self::Invalid }
    }
}

/// Construction from JSON.
pub trait FromJson: Sized {
    /// Builds the value from JSON. `null` yields an uninitialized value.
    fn from_json(value: &Value) -> Self;

    /// Builds an initialized but invalid value.
    ///
    /// Used when an enclosing object had the wrong JSON type, so that each
    /// field is reported as present-but-invalid rather than missing.
    fn mismatched() -> Self;
}

/// State inspection and serialization.
pub trait Validated {
    /// Returns true if a value was supplied.
    fn is_initialized(&self) -> bool;

    /// Returns true if the value satisfies its declared bounds.
    fn is_valid(&self) -> bool;

    /// Serializes the value back to JSON. Uninitialized values map to `null`.
    fn to_json(&self) -> Value;
}
