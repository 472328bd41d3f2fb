//! Composite validated values: arrays, maps and optional fields.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::Value;

use crate::value::{FromJson, Validated, ValueState};

// ============================================================================
// Array
// ============================================================================

/// A JSON array of `T` with `MIN..=MAX` elements.
///
/// The array is invalid when the size is out of range or any element is not
/// valid. [`Array::len`] always reflects the input size, even when invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T, const MIN: usize, const MAX: usize> {
    state: ValueState,
    items: Vec<T>,
}

impl<T: Validated, const MIN: usize, const MAX: usize> Array<T, MIN, MAX> {
    pub fn new(items: Vec<T>) -> Self {
        let valid = (MIN..=MAX).contains(&items.len()) && items.iter().all(Validated::is_valid);
        Self {
            state: ValueState::checked(valid),
            items,
        }
    }

    pub fn state(&self) -> ValueState {
        self.state
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

impl<T, const MIN: usize, const MAX: usize> Default for Array<T, MIN, MAX> {
    fn default() -> Self {
        Self {
            state: ValueState::Uninitialized,
            items: Vec::new(),
        }
    }
}

impl<T, const MIN: usize, const MAX: usize> Deref for Array<T, MIN, MAX> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: FromJson + Validated, const MIN: usize, const MAX: usize> FromJson for Array<T, MIN, MAX> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Array(items) => Self::new(items.iter().map(T::from_json).collect()),
            _ => Self::mismatched(),
        }
    }

    fn mismatched() -> Self {
        Self {
            state: ValueState::Invalid,
            items: Vec::new(),
        }
    }
}

impl<T: Validated, const MIN: usize, const MAX: usize> Validated for Array<T, MIN, MAX> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        match self.state {
            ValueState::Uninitialized => Value::Null,
            _ => Value::Array(self.items.iter().map(Validated::to_json).collect()),
        }
    }
}

// ============================================================================
// Map
// ============================================================================

/// A JSON object with arbitrary keys, `MIN..=MAX` entries, and values of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Map<T, const MIN: usize, const MAX: usize> {
    state: ValueState,
    entries: BTreeMap<String, T>,
}

impl<T: Validated, const MIN: usize, const MAX: usize> Map<T, MIN, MAX> {
    pub fn new(entries: BTreeMap<String, T>) -> Self {
        let valid =
            (MIN..=MAX).contains(&entries.len()) && entries.values().all(Validated::is_valid);
        Self {
            state: ValueState::checked(valid),
            entries,
        }
    }

    pub fn state(&self) -> ValueState {
        self.state
    }
}

impl<T, const MIN: usize, const MAX: usize> Default for Map<T, MIN, MAX> {
    fn default() -> Self {
        Self {
            state: ValueState::Uninitialized,
            entries: BTreeMap::new(),
        }
    }
}

impl<T, const MIN: usize, const MAX: usize> Deref for Map<T, MIN, MAX> {
    type Target = BTreeMap<String, T>;

    fn deref(&self) -> &BTreeMap<String, T> {
        &self.entries
    }
}

impl<T: FromJson + Validated, const MIN: usize, const MAX: usize> FromJson for Map<T, MIN, MAX> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::Object(object) => Self::new(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), T::from_json(v)))
                    .collect(),
            ),
            _ => Self::mismatched(),
        }
    }

    fn mismatched() -> Self {
        Self {
            state: ValueState::Invalid,
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Validated, const MIN: usize, const MAX: usize> Validated for Map<T, MIN, MAX> {
    fn is_initialized(&self) -> bool {
        self.state != ValueState::Uninitialized
    }

    fn is_valid(&self) -> bool {
        self.state == ValueState::Valid
    }

    fn to_json(&self) -> Value {
        match self.state {
            ValueState::Uninitialized => Value::Null,
            _ => Value::Object(
                self.entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

// ============================================================================
// Optional
// ============================================================================

/// A field that may be absent.
///
/// Absent is valid. A present value is valid exactly when the inner value
/// is.
#[derive(Debug, Clone, PartialEq)]
pub struct Optional<T>(Option<T>);

impl<T> Optional<T> {
    pub fn some(value: T) -> Self {
        Self(Some(value))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T: Default> Optional<T> {
    /// Returns the inner value, inserting a default one when absent.
    pub fn get_or_insert_default(&mut self) -> &mut T {
        self.0.get_or_insert_with(T::default)
    }
}

impl<T> Default for Optional<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> From<T> for Optional<T> {
    fn from(value: T) -> Self {
        Self(Some(value))
    }
}

impl<T: FromJson> FromJson for Optional<T> {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self(None),
            v => Self(Some(T::from_json(v))),
        }
    }

    fn mismatched() -> Self {
        Self(Some(T::mismatched()))
    }
}

impl<T: Validated> Validated for Optional<T> {
    fn is_initialized(&self) -> bool {
        self.0.as_ref().is_some_and(Validated::is_initialized)
    }

    fn is_valid(&self) -> bool {
        !self.is_initialized() || self.0.as_ref().is_some_and(Validated::is_valid)
    }

    fn to_json(&self) -> Value {
        self.0.as_ref().map_or(Value::Null, Validated::to_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::{Boolean, BoundedString, Integer};
    use serde_json::json;

    #[test]
    fn test_array_valid() {
        let input = json!(["haha", "hoho"]);
        let arr = Array::<BoundedString<0, 32>, 2, 5>::from_json(&input);
        assert!(arr.is_initialized());
        assert!(arr.is_valid());
        assert_eq!(arr.to_json(), input);
    }

    #[test]
    fn test_array_invalid_elements_keep_size() {
        let arr = Array::<Integer<i8, 0, 32>, 2, 4>::from_json(&json!(["Hello", "World"]));
        assert!(arr.is_initialized());
        assert!(!arr.is_valid());
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn test_array_size_bounds() {
        let arr = Array::<Boolean, 2, 3>::from_json(&json!([true]));
        assert!(!arr.is_valid());
        assert_eq!(arr.len(), 1);

        let arr = Array::<Boolean, 0, 3>::from_json(&json!([]));
        assert!(arr.is_valid());
    }

    #[test]
    fn test_array_null_element_is_invalid() {
        let arr = Array::<Boolean, 0, 3>::from_json(&json!([true, null]));
        assert!(!arr.is_valid());
    }

    #[test]
    fn test_array_wrong_type() {
        let arr = Array::<Boolean, 0, 3>::from_json(&json!("not an array"));
        assert!(arr.is_initialized());
        assert!(!arr.is_valid());
        assert!(arr.is_empty());
    }

    #[test]
    fn test_map() {
        let map = Map::<Integer<u8, 0, 10>, 1, 4>::from_json(&json!({"a": 1, "b": 2}));
        assert!(map.is_valid());
        assert_eq!(map.get("b").and_then(Integer::get), Some(2));

        let map = Map::<Integer<u8, 0, 10>, 1, 4>::from_json(&json!({"a": 11}));
        assert!(!map.is_valid());
    }

    #[test]
    fn test_optional_absent_is_valid() {
        let opt = Optional::<Boolean>::from_json(&Value::Null);
        assert!(!opt.is_initialized());
        assert!(opt.is_valid());
        assert_eq!(opt.to_json(), Value::Null);
    }

    #[test]
    fn test_optional_assigned() {
        let mut opt = Optional::<Boolean>::default();
        *opt.get_or_insert_default() = Boolean::from_json(&json!(true));
        assert!(opt.is_initialized());
        assert!(opt.is_valid());
        assert_eq!(opt.to_json(), json!(true));

        let mut opt = Optional::<Integer<i64, 42, 43>>::default();
        opt.set(Integer::from_json(&json!(42)));
        assert!(opt.is_valid());
        assert_eq!(opt.to_json(), json!(42));
    }

    #[test]
    fn test_optional_present_invalid() {
        let opt = Optional::<Integer<i64, 42, 43>>::from_json(&json!(7));
        assert!(opt.is_initialized());
        assert!(!opt.is_valid());
    }
}
