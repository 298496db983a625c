//! A configurable host object
//!
//! [`DynamicObject`] covers the common shapes of host classes without a
//! hand-written [`HostObject`] impl: declared methods, public properties,
//! `__get`/`__call` style magic, string conversion, default invocation,
//! array-style offsets, counting and iteration.
//!
//! ```
//! use jsbridge_host::{DynamicObject, HostValue};
//!
//! let point = DynamicObject::builder("Point")
//!     .property("x", 1)
//!     .property("y", 2)
//!     .method("sum", |this, _args| {
//!         let x = this.property("x").and_then(|v| v.as_int()).unwrap_or(0);
//!         let y = this.property("y").and_then(|v| v.as_int()).unwrap_or(0);
//!         Ok(HostValue::Int(x + y))
//!     })
//!     .build_value();
//!
//! let object = point.as_object().unwrap();
//! assert_eq!(object.call_method("sum", vec![]).unwrap(), HostValue::Int(3));
//! ```

use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

use crate::array::{ArrayKey, HostArray};
use crate::error::{HostError, HostResult};
use crate::iter::{ArrayIterator, HostIterator};
use crate::object::{ArrayAccess, HostObject};
use crate::value::HostValue;

type Method = Rc<dyn Fn(&DynamicObject, Vec<HostValue>) -> HostResult<HostValue>>;
type CallHandler = Rc<dyn Fn(&DynamicObject, &str, Vec<HostValue>) -> HostResult<HostValue>>;
type Getter = Rc<dyn Fn(&DynamicObject, &str) -> Option<HostValue>>;
type Stringify = Rc<dyn Fn(&DynamicObject) -> HostResult<String>>;
type Invoke = Rc<dyn Fn(&DynamicObject, Vec<HostValue>) -> HostResult<HostValue>>;
type IterFactory = Rc<dyn Fn(&DynamicObject) -> HostResult<Box<dyn HostIterator>>>;

/// Host object assembled from closures
pub struct DynamicObject {
    class: String,
    methods: IndexMap<String, Method>,
    properties: RefCell<IndexMap<String, HostValue>>,
    getter: Option<Getter>,
    call_handler: Option<CallHandler>,
    stringify: Option<Stringify>,
    invoke: Option<Invoke>,
    offsets: Option<Offsets>,
    countable: bool,
    iterator: Option<IterFactory>,
}

impl DynamicObject {
    /// Start building an object of the given class
    pub fn builder(class: impl Into<String>) -> DynamicObjectBuilder {
        DynamicObjectBuilder {
            object: DynamicObject {
                class: class.into(),
                methods: IndexMap::new(),
                properties: RefCell::new(IndexMap::new()),
                getter: None,
                call_handler: None,
                stringify: None,
                invoke: None,
                offsets: None,
                countable: false,
                iterator: None,
            },
        }
    }

    /// Read a declared property directly
    pub fn property(&self, name: &str) -> Option<HostValue> {
        self.properties.borrow().get(name).cloned()
    }

    /// Offset storage, if the object supports array access
    pub fn offsets(&self) -> Option<&HostArray> {
        self.offsets.as_ref().map(|offsets| &offsets.slots)
    }
}

impl HostObject for DynamicObject {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn has_call_handler(&self) -> bool {
        self.call_handler.is_some()
    }

    fn has_property(&self, name: &str) -> bool {
        if self.properties.borrow().contains_key(name) {
            return true;
        }
        self.getter
            .as_ref()
            .is_some_and(|getter| getter(self, name).is_some())
    }

    fn get_property(&self, name: &str) -> HostResult<HostValue> {
        if let Some(value) = self.property(name) {
            return Ok(value);
        }
        Ok(self
            .getter
            .as_ref()
            .and_then(|getter| getter(self, name))
            .unwrap_or(HostValue::Null))
    }

    fn set_property(&self, name: &str, value: HostValue) -> HostResult<()> {
        self.properties.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
        if let Some(method) = self.methods.get(name) {
            return method(self, args);
        }
        match &self.call_handler {
            Some(handler) => {
                trace!(class = %self.class, method = name, "dispatching to call handler");
                handler(self, name, args)
            }
            None => Err(HostError::no_such_method(name)),
        }
    }

    fn properties(&self) -> Vec<(ArrayKey, HostValue)> {
        self.properties
            .borrow()
            .iter()
            .map(|(name, value)| (ArrayKey::string(name.as_str()), value.clone()))
            .collect()
    }

    fn array_access(&self) -> Option<&dyn ArrayAccess> {
        self.offsets.as_ref().map(|offsets| offsets as &dyn ArrayAccess)
    }

    fn count(&self) -> Option<HostResult<i64>> {
        if !self.countable {
            return None;
        }
        let count = match &self.offsets {
            Some(offsets) => offsets.slots.len(),
            None => self.properties.borrow().len(),
        };
        Some(Ok(count as i64))
    }

    fn is_invokable(&self) -> bool {
        self.invoke.is_some()
    }

    fn invoke(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        match &self.invoke {
            Some(invoke) => invoke(self, args),
            None => Err(HostError::new(format!(
                "Object of class {} is not invokable",
                self.class
            ))),
        }
    }

    fn has_string_conversion(&self) -> bool {
        self.stringify.is_some()
    }

    fn to_host_string(&self) -> HostResult<String> {
        match &self.stringify {
            Some(stringify) => stringify(self),
            None => Err(HostError::new(format!(
                "Object of class {} could not be converted to string",
                self.class
            ))),
        }
    }

    fn is_traversable(&self) -> bool {
        self.iterator.is_some()
    }

    fn iterate(&self) -> HostResult<Box<dyn HostIterator>> {
        match &self.iterator {
            Some(factory) => factory(self),
            None => Err(HostError::new(format!(
                "Object of class {} is not traversable",
                self.class
            ))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Offset storage backing [`ArrayAccess`] on a [`DynamicObject`]
struct Offsets {
    slots: HostArray,
}

impl ArrayAccess for Offsets {
    fn offset_exists(&self, key: &ArrayKey) -> HostResult<bool> {
        Ok(self.slots.contains_key(key))
    }

    fn offset_get(&self, key: &ArrayKey) -> HostResult<HostValue> {
        Ok(self.slots.get(key).unwrap_or(HostValue::Null))
    }

    fn offset_set(&self, key: Option<&ArrayKey>, value: HostValue) -> HostResult<()> {
        match key {
            Some(key) => self.slots.set(key, value),
            None => {
                self.slots.push(value);
            }
        }
        Ok(())
    }

    fn offset_unset(&self, key: &ArrayKey) -> HostResult<()> {
        self.slots.remove(key);
        Ok(())
    }
}

/// Builder for [`DynamicObject`]
pub struct DynamicObjectBuilder {
    object: DynamicObject,
}

impl DynamicObjectBuilder {
    /// Declare a method
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&DynamicObject, Vec<HostValue>) -> HostResult<HostValue> + 'static,
    {
        self.object.methods.insert(name.into(), Rc::new(method));
        self
    }

    /// Declare a public property
    pub fn property(self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.object
            .properties
            .borrow_mut()
            .insert(name.into(), value.into());
        self
    }

    /// Fallback for undeclared property reads (`__get`/`__isset`)
    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&DynamicObject, &str) -> Option<HostValue> + 'static,
    {
        self.object.getter = Some(Rc::new(getter));
        self
    }

    /// Catch-all for undeclared method calls (`__call`)
    pub fn call_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DynamicObject, &str, Vec<HostValue>) -> HostResult<HostValue> + 'static,
    {
        self.object.call_handler = Some(Rc::new(handler));
        self
    }

    /// String conversion (`__toString`)
    pub fn to_string_with<F>(mut self, stringify: F) -> Self
    where
        F: Fn(&DynamicObject) -> HostResult<String> + 'static,
    {
        self.object.stringify = Some(Rc::new(stringify));
        self
    }

    /// Default invocation (`__invoke`)
    pub fn invokable<F>(mut self, invoke: F) -> Self
    where
        F: Fn(&DynamicObject, Vec<HostValue>) -> HostResult<HostValue> + 'static,
    {
        self.object.invoke = Some(Rc::new(invoke));
        self
    }

    /// Enable array-style offsets backed by internal storage
    pub fn array_access(mut self) -> Self {
        self.object.offsets = Some(Offsets {
            slots: HostArray::new(),
        });
        self
    }

    /// Store an initial offset, enabling array access
    pub fn offset(mut self, key: impl Into<ArrayKey>, value: impl Into<HostValue>) -> Self {
        if self.object.offsets.is_none() {
            self = self.array_access();
        }
        if let Some(offsets) = &self.object.offsets {
            offsets.slots.set(key, value.into());
        }
        self
    }

    /// Report a count (offsets when array access is enabled, properties otherwise)
    pub fn countable(mut self) -> Self {
        self.object.countable = true;
        self
    }

    /// Make the object traversable through a custom iterator factory
    pub fn iterator<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DynamicObject) -> HostResult<Box<dyn HostIterator>> + 'static,
    {
        self.object.iterator = Some(Rc::new(factory));
        self
    }

    /// Make the object traversable over a fixed list of values
    pub fn iterate_values(self, values: Vec<HostValue>) -> Self {
        self.iterator(move |_| Ok(Box::new(ArrayIterator::from_values(values.clone()))))
    }

    /// Finish building
    pub fn build(self) -> DynamicObject {
        self.object
    }

    /// Finish building and wrap into a [`HostValue`]
    pub fn build_value(self) -> HostValue {
        HostValue::object(self.object)
    }
}
