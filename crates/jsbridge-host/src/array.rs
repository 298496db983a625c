//! Ordered host arrays
//!
//! A host array is an insertion-ordered map whose keys are either integers or
//! strings. Integer-looking string keys are normalized to integers, so `"5"`
//! and `5` address the same slot.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::HostValue;

/// Key of a host array slot or of an object property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    /// Integer key
    Int(i64),
    /// String key
    Str(String),
}

impl ArrayKey {
    /// Create a key from a string, normalizing canonical integers
    pub fn string(key: impl Into<String>) -> Self {
        let key = key.into();
        match key.parse::<i64>() {
            Ok(index) if index.to_string() == key => Self::Int(index),
            _ => Self::Str(key),
        }
    }

    /// Check if this is an integer key
    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// Get the integer value of the key
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(index) => Some(*index),
            Self::Str(_) => None,
        }
    }

    /// Convert the key into a host value
    pub fn to_host(&self) -> HostValue {
        match self {
            Self::Int(index) => HostValue::Int(*index),
            Self::Str(key) => HostValue::String(key.clone()),
        }
    }

    /// Derive a key from a host value, if the value can act as one
    pub fn from_host(value: &HostValue) -> Option<Self> {
        match value {
            HostValue::Int(index) => Some(Self::Int(*index)),
            HostValue::Bool(b) => Some(Self::Int(i64::from(*b))),
            HostValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(Self::Int(*f as i64)),
            HostValue::String(key) => Some(Self::string(key.as_str())),
            HostValue::Null => Some(Self::Str(String::new())),
            _ => None,
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(index) => write!(f, "{index}"),
            Self::Str(key) => f.write_str(key),
        }
    }
}

impl From<&str> for ArrayKey {
    fn from(key: &str) -> Self {
        Self::string(key)
    }
}

impl From<String> for ArrayKey {
    fn from(key: String) -> Self {
        Self::string(key)
    }
}

impl From<&ArrayKey> for ArrayKey {
    fn from(key: &ArrayKey) -> Self {
        key.clone()
    }
}

impl From<i64> for ArrayKey {
    fn from(index: i64) -> Self {
        Self::Int(index)
    }
}

impl From<u32> for ArrayKey {
    fn from(index: u32) -> Self {
        Self::Int(i64::from(index))
    }
}

impl From<usize> for ArrayKey {
    fn from(index: usize) -> Self {
        Self::Int(index as i64)
    }
}

type Slots = IndexMap<ArrayKey, HostValue>;

/// Reference-counted ordered array
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct HostArray {
    slots: Rc<RefCell<Slots>>,
}

impl HostArray {
    /// Create an empty array
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list-style array with keys `0..n`
    pub fn from_values(values: impl IntoIterator<Item = HostValue>) -> Self {
        let slots = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| (ArrayKey::from(index), value))
            .collect();
        Self {
            slots: Rc::new(RefCell::new(slots)),
        }
    }

    /// Create an array from explicit key/value pairs
    pub fn from_entries<K: Into<ArrayKey>>(
        entries: impl IntoIterator<Item = (K, HostValue)>,
    ) -> Self {
        let array = Self::new();
        for (key, value) in entries {
            array.set(key, value);
        }
        array
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: impl Into<ArrayKey>) -> Option<HostValue> {
        self.slots.borrow().get(&key.into()).cloned()
    }

    /// Store a value under `key`, keeping the original position of existing keys
    pub fn set(&self, key: impl Into<ArrayKey>, value: HostValue) {
        self.slots.borrow_mut().insert(key.into(), value);
    }

    /// Append a value under the next free integer key
    pub fn push(&self, value: HostValue) -> i64 {
        let index = self.next_index();
        self.slots.borrow_mut().insert(ArrayKey::Int(index), value);
        index
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: impl Into<ArrayKey>) -> bool {
        self.slots.borrow().contains_key(&key.into())
    }

    /// Remove a key, preserving the order of the remaining slots
    pub fn remove(&self, key: impl Into<ArrayKey>) -> Option<HostValue> {
        self.slots.borrow_mut().shift_remove(&key.into())
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Check if the array has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Highest integer key plus one, or 0 when there is no integer key
    ///
    /// This is the script-visible `length` of the array, so `{0, 1, 5}` yields 6.
    pub fn next_index(&self) -> i64 {
        self.slots
            .borrow()
            .keys()
            .filter_map(ArrayKey::as_int)
            .max()
            .map_or(0, |max| max.saturating_add(1).max(0))
    }

    /// Snapshot of the keys in order
    pub fn keys(&self) -> Vec<ArrayKey> {
        self.slots.borrow().keys().cloned().collect()
    }

    /// Snapshot of the entries in order
    pub fn entries(&self) -> Vec<(ArrayKey, HostValue)> {
        self.slots
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Check if both handles share the same storage
    pub fn same(&self, other: &HostArray) -> bool {
        Rc::ptr_eq(&self.slots, &other.slots)
    }

    /// Create a weak handle to this array
    pub fn downgrade(&self) -> WeakHostArray {
        WeakHostArray {
            slots: Rc::downgrade(&self.slots),
        }
    }
}

impl PartialEq for HostArray {
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || *self.slots.borrow() == *other.slots.borrow()
    }
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slots.try_borrow() {
            Ok(slots) => f.debug_map().entries(slots.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}

/// Weak handle to a [`HostArray`]
#[derive(Clone, Debug)]
pub struct WeakHostArray {
    slots: Weak<RefCell<Slots>>,
}

impl WeakHostArray {
    /// Upgrade to a strong handle if the array is still alive
    pub fn upgrade(&self) -> Option<HostArray> {
        self.slots.upgrade().map(|slots| HostArray { slots })
    }
}
