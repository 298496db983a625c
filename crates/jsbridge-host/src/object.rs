//! Dynamic host object protocol
//!
//! Host objects expose three kinds of members that the bridge has to tell apart
//! when a script touches a name:
//!
//! - declared methods (`has_method`)
//! - plain or magic properties (`has_property`)
//! - a catch-all call handler that accepts any method name (`has_call_handler`)
//!
//! On top of that an object may opt into protocols: array-style indexing,
//! counting, default invocation, string conversion and iteration.

use std::any::Any;
use std::rc::Rc;

use crate::array::ArrayKey;
use crate::error::{HostError, HostResult};
use crate::iter::HostIterator;
use crate::value::HostValue;

/// Shared reference to a host object
pub type HostObjectRef = Rc<dyn HostObject>;

/// Array-style indexing protocol (`$obj[$key]`)
pub trait ArrayAccess {
    /// Check if an offset exists
    fn offset_exists(&self, key: &ArrayKey) -> HostResult<bool>;

    /// Read an offset
    fn offset_get(&self, key: &ArrayKey) -> HostResult<HostValue>;

    /// Write an offset; `None` appends
    fn offset_set(&self, key: Option<&ArrayKey>, value: HostValue) -> HostResult<()>;

    /// Remove an offset
    fn offset_unset(&self, key: &ArrayKey) -> HostResult<()>;
}

/// A host object with dynamic properties and magic dispatch
///
/// Every method has a conservative default so implementors only describe the
/// members and protocols they actually support.
pub trait HostObject: Any {
    /// Class name used in diagnostics
    fn class_name(&self) -> &str;

    /// Check if a method with this name is declared on the class
    fn has_method(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Check if the object accepts calls to undeclared method names
    fn has_call_handler(&self) -> bool {
        false
    }

    /// Check if a property with this name is set
    fn has_property(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Check if `name` can be invoked as a method, declared or not
    fn is_callable(&self, name: &str) -> bool {
        self.has_method(name) || self.has_call_handler()
    }

    /// Read a property
    fn get_property(&self, name: &str) -> HostResult<HostValue> {
        let _ = name;
        Ok(HostValue::Null)
    }

    /// Write a property
    fn set_property(&self, name: &str, value: HostValue) -> HostResult<()> {
        let _ = value;
        Err(HostError::read_only(self.class_name(), name))
    }

    /// Call a method by name
    fn call_method(&self, name: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
        let _ = args;
        Err(HostError::no_such_method(name))
    }

    /// Own properties with their keys, in declaration order
    fn properties(&self) -> Vec<(ArrayKey, HostValue)> {
        Vec::new()
    }

    /// Array-style indexing, if supported
    fn array_access(&self) -> Option<&dyn ArrayAccess> {
        None
    }

    /// Element count, if the object is countable
    fn count(&self) -> Option<HostResult<i64>> {
        None
    }

    /// Check if the object itself can be invoked
    fn is_invokable(&self) -> bool {
        false
    }

    /// Default invocation (`$obj(...)`)
    fn invoke(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        let _ = args;
        Err(HostError::new(format!(
            "Object of class {} is not invokable",
            self.class_name()
        )))
    }

    /// Check if the object converts to a string
    fn has_string_conversion(&self) -> bool {
        false
    }

    /// String conversion (`__toString`)
    fn to_host_string(&self) -> HostResult<String> {
        Err(HostError::new(format!(
            "Object of class {} could not be converted to string",
            self.class_name()
        )))
    }

    /// Check if the object can be iterated
    fn is_traversable(&self) -> bool {
        false
    }

    /// Obtain an iterator
    ///
    /// An object that is its own iterator returns a cursor over itself, an
    /// iterator aggregate returns a fresh iterator.
    fn iterate(&self) -> HostResult<Box<dyn HostIterator>> {
        Err(HostError::new(format!(
            "Object of class {} is not traversable",
            self.class_name()
        )))
    }

    /// Downcasting support
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn HostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {{ .. }}", self.class_name())
    }
}
