//! Host callables (closures and foreign functions)

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::HostResult;
use crate::value::HostValue;

/// Something the host can call with a list of arguments
pub trait HostCallable: Any {
    /// Invoke with the given arguments
    fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue>;

    /// Downcasting support
    fn as_any(&self) -> &dyn Any;
}

struct Closure<F>(F);

impl<F> HostCallable for Closure<F>
where
    F: Fn(Vec<HostValue>) -> HostResult<HostValue> + 'static,
{
    fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        (self.0)(args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reference-counted host callable
#[derive(Clone)]
pub struct HostFunction(Rc<dyn HostCallable>);

impl HostFunction {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> HostResult<HostValue> + 'static,
    {
        Self(Rc::new(Closure(f)))
    }

    /// Wrap an existing callable implementation
    pub fn from_callable(callable: Rc<dyn HostCallable>) -> Self {
        Self(callable)
    }

    /// Invoke the callable
    pub fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        self.0.call(args)
    }

    /// Access the callable implementation
    pub fn callable(&self) -> &dyn HostCallable {
        &*self.0
    }

    /// Downcast the callable implementation
    pub fn downcast_ref<T: HostCallable>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Check if both handles refer to the same callable
    pub fn same(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Create a weak handle
    pub fn downgrade(&self) -> WeakHostFunction {
        WeakHostFunction(Rc::downgrade(&self.0))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({:p})", Rc::as_ptr(&self.0))
    }
}

/// Weak handle to a [`HostFunction`]
#[derive(Clone)]
pub struct WeakHostFunction(Weak<dyn HostCallable>);

impl WeakHostFunction {
    /// Upgrade if the callable is still alive
    pub fn upgrade(&self) -> Option<HostFunction> {
        self.0.upgrade().map(HostFunction)
    }
}

impl fmt::Debug for WeakHostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakHostFunction")
    }
}
