//! Host-side wrappers over script values
//!
//! [`ScriptObjectProxy`] implements the host object protocol for a script
//! object and [`ScriptFunction`] the host callable protocol for a script
//! function. Both keep the engine alive while they exist and re-enter its
//! scope for every operation.

use crate::context::Core;
use crate::convert::ValueConverter;
use crate::error::{BridgeError, BridgeResult, capture};
use crate::iterator::ScriptKeyIterator;
use crate::scope;
use jsbridge_host::{
    ArrayKey, HostCallable, HostError, HostIterator, HostObject, HostResult, HostValue,
};
use rquickjs::function::Args;
use rquickjs::{Coerced, Context, Ctx, Filter, Function, Object, Persistent, Value};
use std::any::Any;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Class name reported for script objects
pub const SCRIPT_OBJECT_CLASS: &str = "ScriptObject";

/// Host object backed by a script object
pub struct ScriptObjectProxy {
    object: Persistent<Object<'static>>,
    core: Weak<Core>,
    context: Context,
}

impl ScriptObjectProxy {
    pub(crate) fn new<'js>(converter: &ValueConverter<'_, 'js>, object: Object<'js>) -> Self {
        let core = converter.core();
        Self {
            object: Persistent::save(converter.ctx(), object),
            core: Rc::downgrade(core),
            context: core.context.clone(),
        }
    }

    /// The wrapped object, when `core` is the context it came from
    pub(crate) fn object_in<'js>(
        &self,
        ctx: &Ctx<'js>,
        core: &Rc<Core>,
    ) -> BridgeResult<Option<Object<'js>>> {
        if !std::ptr::eq(self.core.as_ptr(), Rc::as_ptr(core)) {
            return Ok(None);
        }
        Ok(Some(self.object.clone().restore(ctx)?))
    }

    /// Read a property; missing properties read as `Null`
    pub fn get(&self, name: &str) -> BridgeResult<HostValue> {
        self.enter(|converter, object| {
            let value: Value = object.get(name)?;
            converter.to_host(&value)
        })
    }

    /// Write a property
    pub fn set(&self, name: &str, value: &HostValue) -> BridgeResult<()> {
        self.enter(|converter, object| {
            let value = converter.to_script(value)?;
            object.set(name, value)?;
            Ok(())
        })
    }

    /// Check if a property exists, including the prototype chain
    pub fn isset(&self, name: &str) -> BridgeResult<bool> {
        self.enter(|_, object| Ok(object.contains_key(name)?))
    }

    /// Remove an own property
    pub fn unset(&self, name: &str) -> BridgeResult<()> {
        self.enter(|_, object| Ok(object.remove(name)?))
    }

    /// Call a method by name with the object as receiver
    pub fn call(&self, name: &str, args: Vec<HostValue>) -> BridgeResult<HostValue> {
        self.enter(|converter, object| {
            let member: Value = object.get(name)?;
            if member.is_undefined() {
                return Err(HostError::no_such_method(name).into());
            }
            let Some(function) = member.as_function() else {
                return Err(HostError::new(format!("{name} is not a method")).into());
            };
            trace!(method = name, argc = args.len(), "calling script method");
            invoke(converter, function, object.clone().into_value(), &args)
        })
    }

    /// String form of the object as script would produce it
    pub fn to_display_string(&self) -> BridgeResult<String> {
        self.enter(|_, object| {
            let Coerced(text) = object.as_value().get::<Coerced<String>>()?;
            Ok(text)
        })
    }

    /// Own enumerable properties in key order
    pub fn own_properties(&self) -> BridgeResult<Vec<(ArrayKey, HostValue)>> {
        self.enter(|converter, object| {
            let keys = object
                .own_keys::<String>(Filter::new().string().enum_only())
                .collect::<rquickjs::Result<Vec<_>>>()?;
            keys.into_iter()
                .map(|key| {
                    let value: Value = object.get(key.as_str())?;
                    Ok((ArrayKey::string(key), converter.to_host(&value)?))
                })
                .collect()
        })
    }

    /// Key iterator over a snapshot of the own enumerable keys
    pub fn keys(&self) -> BridgeResult<ScriptKeyIterator> {
        self.enter(|converter, object| ScriptKeyIterator::new(converter, object.clone()))
    }

    /// Run `f` in the object's scope.
    ///
    /// Script exceptions raised inside are captured with their diagnostics.
    fn enter<R>(
        &self,
        f: impl for<'a, 'js> FnOnce(&ValueConverter<'a, 'js>, &Object<'js>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let core = self.core.upgrade().ok_or_else(released)?;
        scope::enter(&self.context, |ctx| {
            let converter = ValueConverter::new(&ctx, &core);
            let object = self.object.clone().restore(&ctx)?;
            f(&converter, &object).map_err(|err| recover(&ctx, err))
        })
    }
}

impl HostObject for ScriptObjectProxy {
    fn class_name(&self) -> &str {
        SCRIPT_OBJECT_CLASS
    }

    fn has_method(&self, name: &str) -> bool {
        self.enter(|_, object| {
            let member: Value = object.get(name)?;
            Ok(member.is_function())
        })
        .unwrap_or(false)
    }

    fn has_property(&self, name: &str) -> bool {
        self.isset(name).unwrap_or(false)
    }

    fn get_property(&self, name: &str) -> HostResult<HostValue> {
        Ok(self.get(name)?)
    }

    fn set_property(&self, name: &str, value: HostValue) -> HostResult<()> {
        Ok(self.set(name, &value)?)
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
        Ok(self.call(name, args)?)
    }

    fn properties(&self) -> Vec<(ArrayKey, HostValue)> {
        self.own_properties().unwrap_or_default()
    }

    fn has_string_conversion(&self) -> bool {
        true
    }

    fn to_host_string(&self) -> HostResult<String> {
        Ok(self.to_display_string()?)
    }

    fn is_traversable(&self) -> bool {
        true
    }

    fn iterate(&self) -> HostResult<Box<dyn HostIterator>> {
        Ok(Box::new(self.keys()?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Host callable backed by a script function
pub struct ScriptFunction {
    function: Persistent<Function<'static>>,
    core: Weak<Core>,
    context: Context,
}

impl ScriptFunction {
    pub(crate) fn new<'js>(converter: &ValueConverter<'_, 'js>, function: Function<'js>) -> Self {
        let core = converter.core();
        Self {
            function: Persistent::save(converter.ctx(), function),
            core: Rc::downgrade(core),
            context: core.context.clone(),
        }
    }

    /// The wrapped function, when `core` is the context it came from
    pub(crate) fn function_in<'js>(
        &self,
        ctx: &Ctx<'js>,
        core: &Rc<Core>,
    ) -> BridgeResult<Option<Function<'js>>> {
        if !std::ptr::eq(self.core.as_ptr(), Rc::as_ptr(core)) {
            return Ok(None);
        }
        Ok(Some(self.function.clone().restore(ctx)?))
    }

    /// Call with an `undefined` receiver
    pub fn invoke(&self, args: &[HostValue]) -> BridgeResult<HostValue> {
        let core = self.core.upgrade().ok_or_else(released)?;
        scope::enter(&self.context, |ctx| {
            let converter = ValueConverter::new(&ctx, &core);
            let function = self.function.clone().restore(&ctx)?;
            invoke(&converter, &function, Value::new_undefined(ctx.clone()), args)
                .map_err(|err| recover(&ctx, err))
        })
    }
}

impl HostCallable for ScriptFunction {
    fn call(&self, args: Vec<HostValue>) -> HostResult<HostValue> {
        Ok(self.invoke(&args)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn invoke<'js>(
    converter: &ValueConverter<'_, 'js>,
    function: &Function<'js>,
    this: Value<'js>,
    args: &[HostValue],
) -> BridgeResult<HostValue> {
    let args = converter.args_to_script(args)?;
    let mut call = Args::new(converter.ctx().clone(), args.len());
    call.this(this)?;
    call.push_args(args)?;
    let result: Value = function.call_arg(call)?;
    converter.to_host(&result)
}

/// Take a pending script exception out of the engine
fn recover(ctx: &Ctx<'_>, err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Engine(err) => capture(ctx, err),
        other => other,
    }
}

fn released() -> BridgeError {
    BridgeError::internal("script context has been released")
}
