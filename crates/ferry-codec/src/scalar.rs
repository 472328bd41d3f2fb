//! Scalar validated values: booleans, bounded numbers, strings and enums.

use std::fmt;

use serde_json::Value;

use crate::value::{FromJson, Validated, ValueState};

// ============================================================================
// Shared plumbing
// ============================================================================

/// Implements the state accessors every scalar shares.
macro_rules! scalar_common {
    () => {
        /// Returns the lifecycle state.
        pub fn state(&self) -> ValueState {
            self.state
        }

        fn invalid() -> Self {
            Self {
                state: ValueState::Invalid,
                value: None,
            }
        }
    };
}

// ============================================================================
// Boolean
// ============================================================================

/// A JSON boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Boolean {
    state: ValueState,
    value: Option<bool>,
}

impl Boolean {
    pub fn new(value: bool) -> Self {
        Self {
            state: ValueState::Valid,
            value: Some(value),
        }
    }

    pub fn get(&self) -> Option<bool> {
        self.value
    }

    scalar_common!();
}

impl FromJson for Boolean {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Bool(b) => Self::new(*b),
            _ => Self::invalid(),
        }
    }

    fn mismatched() -> Self {
        Self::invalid()
    }
}

impl Validated for Boolean {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        self.value.map_or(Value::Null, Value::Bool)
    }
}

impl PartialEq<bool> for Boolean {
    fn eq(&self, other: &bool) -> bool {
        self.value == Some(*other)
    }
}

// ============================================================================
// Integer
// ============================================================================

/// Primitive integers usable as [`Integer`] storage.
pub trait IntegerRepr: Copy + fmt::Debug + PartialEq + TryFrom<i64> + Into<i64> {}

impl IntegerRepr for i8 {}
impl IntegerRepr for i16 {}
impl IntegerRepr for i32 {}
impl IntegerRepr for i64 {}
impl IntegerRepr for u8 {}
impl IntegerRepr for u16 {}
impl IntegerRepr for u32 {}

/// An integer stored as `T` and bounded to `MIN..=MAX`.
///
/// Floats, strings and numbers that do not fit in `T` are initialized but
/// invalid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integer<T, const MIN: i64, const MAX: i64> {
    state: ValueState,
    value: Option<T>,
}

impl<T: IntegerRepr, const MIN: i64, const MAX: i64> Integer<T, MIN, MAX> {
    /// Wraps a value, checking it against the bounds.
    pub fn new(value: T) -> Self {
        Self {
            state: ValueState::checked((MIN..=MAX).contains(&Into::<i64>::into(value))),
            value: Some(value),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.value
    }

    scalar_common!();
}

impl<T, const MIN: i64, const MAX: i64> Default for Integer<T, MIN, MAX> {
    fn default() -> Self {
        Self {
            state: ValueState::Uninitialized,
            value: None,
        }
    }
}

impl<T: IntegerRepr, const MIN: i64, const MAX: i64> FromJson for Integer<T, MIN, MAX> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Number(n) => n
                .as_i64()
                .filter(|v| (MIN..=MAX).contains(v))
                .and_then(|v| T::try_from(v).ok())
                .map_or_else(Self::invalid, Self::new),
            _ => Self::invalid(),
        }
    }

    fn mismatched() -> Self {
        Self::invalid()
    }
}

impl<T: IntegerRepr, const MIN: i64, const MAX: i64> Validated for Integer<T, MIN, MAX> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        self.value
            .map_or(Value::Null, |v| Value::from(Into::<i64>::into(v)))
    }
}

impl<T: IntegerRepr, const MIN: i64, const MAX: i64> PartialEq<T> for Integer<T, MIN, MAX> {
    fn eq(&self, other: &T) -> bool {
        self.value == Some(*other)
    }
}

// ============================================================================
// Float
// ============================================================================

/// A number stored as `f64` and bounded to `MIN..=MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Float<const MIN: i64, const MAX: i64> {
    state: ValueState,
    value: Option<f64>,
}

impl<const MIN: i64, const MAX: i64> Float<MIN, MAX> {
    pub fn new(value: f64) -> Self {
        Self {
            state: ValueState::checked((MIN as f64..=MAX as f64).contains(&value)),
            value: Some(value),
        }
    }

    pub fn get(&self) -> Option<f64> {
        self.value
    }

    scalar_common!();
}

impl<const MIN: i64, const MAX: i64> FromJson for Float<MIN, MAX> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Number(n) => n.as_f64().map_or_else(Self::invalid, Self::new),
            _ => Self::invalid(),
        }
    }

    fn mismatched() -> Self {
        Self::invalid()
    }
}

impl<const MIN: i64, const MAX: i64> Validated for Float<MIN, MAX> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        self.value
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

// ============================================================================
// BoundedString
// ============================================================================

/// A string whose length in characters lies in `MIN..=MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedString<const MIN: usize, const MAX: usize> {
    state: ValueState,
    value: Option<String>,
}

impl<const MIN: usize, const MAX: usize> BoundedString<MIN, MAX> {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            state: ValueState::checked((MIN..=MAX).contains(&value.chars().count())),
            value: Some(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }

    scalar_common!();
}

impl<const MIN: usize, const MAX: usize> FromJson for BoundedString<MIN, MAX> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::String(s) => Self::new(s.as_str()),
            _ => Self::invalid(),
        }
    }

    fn mismatched() -> Self {
        Self::invalid()
    }
}

impl<const MIN: usize, const MAX: usize> Validated for BoundedString<MIN, MAX> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        self.value.clone().map_or(Value::Null, Value::String)
    }
}

impl<const MIN: usize, const MAX: usize> PartialEq<&str> for BoundedString<MIN, MAX> {
    fn eq(&self, other: &&str) -> bool {
        self.value.as_deref() == Some(*other)
    }
}

// ============================================================================
// Enum
// ============================================================================

/// A closed set of values with a string representation on the wire.
///
/// ```rust,ignore
/// #[derive(Clone, Copy)]
/// enum Mode { Idle, Active }
///
/// impl EnumValue for Mode {
///     fn from_json_str(s: &str) -> Option<Self> {
///         match s {
///             "IDLE" => Some(Self::Idle),
///             "ACTIVE" => Some(Self::Active),
///             _ => None,
///         }
///     }
///
///     fn as_json_str(self) -> &'static str {
///         match self {
///             Self::Idle => "IDLE",
///             Self::Active => "ACTIVE",
///         }
///     }
/// }
/// ```
pub trait EnumValue: Copy {
    fn from_json_str(s: &str) -> Option<Self>;
    fn as_json_str(self) -> &'static str;
}

/// A JSON string restricted to the values of `E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enum<E> {
    state: ValueState,
    value: Option<E>,
}

impl<E: EnumValue> Enum<E> {
    pub fn new(value: E) -> Self {
        Self {
            state: ValueState::Valid,
            value: Some(value),
        }
    }

    pub fn get(&self) -> Option<E> {
        self.value
    }

    scalar_common!();
}

impl<E> Default for Enum<E> {
    fn default() -> Self {
        Self {
            state: ValueState::Uninitialized,
            value: None,
        }
    }
}

impl<E: EnumValue> FromJson for Enum<E> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::String(s) => E::from_json_str(s).map_or_else(Self::invalid, Self::new),
            _ => Self::invalid(),
        }
    }

    fn mismatched() -> Self {
        Self::invalid()
    }
}

impl<E: EnumValue> Validated for Enum<E> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        self.value
            .map_or(Value::Null, |e| Value::String(e.as_json_str().to_owned()))
    }
}
