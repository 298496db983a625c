//! The host dynamic value

use std::rc::{Rc, Weak};

use serde_json::Value as JsonValue;

use crate::array::{ArrayKey, HostArray, WeakHostArray};
use crate::function::{HostFunction, WeakHostFunction};
use crate::object::{HostObject, HostObjectRef};

/// A value from the host's dynamic type system
///
/// Composite variants are reference-counted; cloning a `HostValue` never
/// copies an array or object.
#[derive(Clone, Debug, Default)]
pub enum HostValue {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered array
    Array(HostArray),
    /// Object with dynamic members
    Object(HostObjectRef),
    /// Callable
    Callable(HostFunction),
}

impl HostValue {
    /// Wrap a host object implementation
    pub fn object<T: HostObject>(object: T) -> Self {
        Self::Object(Rc::new(object))
    }

    /// Type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Callable(_) => "callable",
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if the value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Check if the value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Check if the value is callable
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_))
    }

    /// Get as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an array
    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Get as an object
    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Get as a callable
    pub fn as_callable(&self) -> Option<&HostFunction> {
        match self {
            Self::Callable(function) => Some(function),
            _ => None,
        }
    }

    /// Downcast an object value to its implementation type
    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        self.as_object()
            .and_then(|object| object.as_any().downcast_ref::<T>())
    }

    /// Identity comparison
    ///
    /// Composites are the same only when they share storage; primitives compare by value and kind.
    pub fn same(&self, other: &HostValue) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => a.same(b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.same(b),
            (Self::Array(_) | Self::Object(_) | Self::Callable(_), _)
            | (_, Self::Array(_) | Self::Object(_) | Self::Callable(_)) => false,
            (Self::Int(_), Self::Float(_)) | (Self::Float(_), Self::Int(_)) => false,
            _ => self == other,
        }
    }

    /// Create a weak reference wrapper; primitives have none
    pub fn downgrade(&self) -> Option<WeakHostValue> {
        match self {
            Self::Array(array) => Some(WeakHostValue::Array(array.downgrade())),
            Self::Object(object) => Some(WeakHostValue::Object(Rc::downgrade(object))),
            Self::Callable(function) => Some(WeakHostValue::Callable(function.downgrade())),
            _ => None,
        }
    }

    /// Loose string form, as used for keys and string contexts
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "1".to_string(),
            Self::Bool(false) => String::new(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(_) => "Array".to_string(),
            Self::Object(object) => {
                if object.has_string_conversion() {
                    object.to_host_string().unwrap_or_default()
                } else {
                    object.class_name().to_string()
                }
            }
            Self::Callable(_) => "Closure".to_string(),
        }
    }

    /// Serialize to JSON
    ///
    /// Arrays keyed `0..n` become JSON arrays, other arrays and objects become
    /// JSON objects; callables become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null | Self::Callable(_) => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(array) => {
                let entries = array.entries();
                let is_list = entries
                    .iter()
                    .enumerate()
                    .all(|(index, (key, _))| key.as_int() == Some(index as i64));
                if is_list {
                    JsonValue::Array(entries.iter().map(|(_, value)| value.to_json()).collect())
                } else {
                    entries_to_json(entries)
                }
            }
            Self::Object(object) => entries_to_json(object.properties()),
        }
    }
}

fn entries_to_json(entries: Vec<(ArrayKey, HostValue)>) -> JsonValue {
    JsonValue::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_json()))
            .collect(),
    )
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            // Numbers compare by value across representations.
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<HostArray> for HostValue {
    fn from(array: HostArray) -> Self {
        Self::Array(array)
    }
}

impl From<HostFunction> for HostValue {
    fn from(function: HostFunction) -> Self {
        Self::Callable(function)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(values: Vec<HostValue>) -> Self {
        Self::Array(HostArray::from_values(values))
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<JsonValue> for HostValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => {
                Self::Array(HostArray::from_values(items.into_iter().map(Self::from)))
            }
            JsonValue::Object(map) => Self::Array(HostArray::from_entries(
                map.into_iter().map(|(key, value)| (key, Self::from(value))),
            )),
        }
    }
}

/// Weak reference wrapper around a composite [`HostValue`]
#[derive(Clone, Debug)]
pub enum WeakHostValue {
    /// Weak array handle
    Array(WeakHostArray),
    /// Weak object handle
    Object(Weak<dyn HostObject>),
    /// Weak callable handle
    Callable(WeakHostFunction),
}

impl WeakHostValue {
    /// Resolve the reference; `None` once the value was released
    pub fn upgrade(&self) -> Option<HostValue> {
        match self {
            Self::Array(array) => array.upgrade().map(HostValue::Array),
            Self::Object(object) => object.upgrade().map(HostValue::Object),
            Self::Callable(function) => function.upgrade().map(HostValue::Callable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Plain;

    impl HostObject for Plain {
        fn class_name(&self) -> &str {
            "Plain"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_type_names() {
        assert_eq!(HostValue::Null.type_name(), "null");
        assert_eq!(HostValue::from(1).type_name(), "int");
        assert_eq!(HostValue::from(1.5).type_name(), "float");
        assert_eq!(HostValue::from("x").type_name(), "string");
        assert_eq!(HostValue::object(Plain).type_name(), "object");
    }

    #[test]
    fn test_same_uses_identity_for_objects() {
        let a = HostValue::object(Plain);
        let b = a.clone();
        let c = HostValue::object(Plain);
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert!(HostValue::from(3).same(&HostValue::from(3)));
        assert!(!HostValue::from(3).same(&HostValue::from(3.0)));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(HostValue::Int(2), HostValue::Float(2.0));
        assert_eq!(HostValue::Float(4_294_967_296.0), HostValue::Int(4_294_967_296));
        assert_ne!(HostValue::Int(2), HostValue::Float(2.5));
        assert_ne!(HostValue::Int(1), HostValue::from("1"));
    }

    #[test]
    fn test_weak_object_reference() {
        let value = HostValue::object(Plain);
        let weak = value.downgrade().unwrap();
        assert!(weak.upgrade().unwrap().same(&value));
        drop(value);
        assert!(weak.upgrade().is_none());
        assert!(HostValue::from(1).downgrade().is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let json = json!({"name": "otter", "tags": [1, 2.5, true, null]});
        let value = HostValue::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_sparse_array_serializes_as_object() {
        let array = HostArray::from_entries([(0_i64, HostValue::from(1)), (5, HostValue::from(2))]);
        assert_eq!(HostValue::Array(array).to_json(), json!({"0": 1, "5": 2}));
    }
}
