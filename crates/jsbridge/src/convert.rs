//! Value marshaling between host and script
//!
//! ```text
//! host                      script
//! ────────────────────────  ──────────────────────────────────
//! Null                 <->  null (undefined, symbols, bigints -> Null)
//! Bool / Int / Float   <->  boolean / number
//! String               <->  string (UTF-8)
//! Callable             <->  function
//! Array                 ->  Proxy over [] (copied back by own keys)
//! Object                ->  Proxy linked to the host object
//! ScriptObjectProxy    <-   any other object
//! ```

use crate::context::Core;
use crate::error::{BridgeError, BridgeResult};
use crate::linker::IdentityLinker;
use crate::proxy::{ScriptFunction, ScriptObjectProxy};
use crate::scope;
use crate::template::{DynamicObjectTemplate, Signature};
use jsbridge_host::{ArrayKey, HostArray, HostFunction, HostValue};
use rquickjs::function::{Rest, This};
use rquickjs::{Coerced, Ctx, Exception, Filter, Function, Object, Value};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Converts values in both directions inside one engine scope
pub struct ValueConverter<'a, 'js> {
    ctx: &'a Ctx<'js>,
    core: &'a Rc<Core>,
}

impl<'a, 'js> ValueConverter<'a, 'js> {
    pub(crate) fn new(ctx: &'a Ctx<'js>, core: &'a Rc<Core>) -> Self {
        Self { ctx, core }
    }

    /// Engine scope this converter works in
    pub fn ctx(&self) -> &'a Ctx<'js> {
        self.ctx
    }

    pub(crate) fn core(&self) -> &'a Rc<Core> {
        self.core
    }

    /// Identity linker of this context
    pub fn linker(&self) -> IdentityLinker<'a, 'js> {
        IdentityLinker::new(self.ctx, &self.core.links, self.core.config.link_mode)
    }

    /// Convert a host value into a script value
    pub fn to_script(&self, value: &HostValue) -> BridgeResult<Value<'js>> {
        let ctx = self.ctx.clone();
        Ok(match value {
            HostValue::Null => Value::new_null(ctx),
            HostValue::Bool(b) => Value::new_bool(ctx, *b),
            HostValue::Int(i) => match i32::try_from(*i) {
                Ok(small) => Value::new_int(ctx, small),
                Err(_) => Value::new_float(ctx, *i as f64),
            },
            HostValue::Float(f) => Value::new_float(ctx, *f),
            HostValue::String(s) => rquickjs::String::from_str(ctx, s)?.into_value(),
            HostValue::Callable(function) => self.function_to_script(function)?,
            HostValue::Array(_) | HostValue::Object(_) => self.object_to_script(value)?,
        })
    }

    /// Convert a script value into a host value
    pub fn to_host(&self, value: &Value<'js>) -> BridgeResult<HostValue> {
        if let Some(b) = value.as_bool() {
            return Ok(HostValue::Bool(b));
        }
        if let Some(i) = value.as_int() {
            return Ok(HostValue::Int(i64::from(i)));
        }
        if let Some(f) = value.as_float() {
            return Ok(number_to_host(f));
        }
        if let Some(s) = value.as_string() {
            return Ok(HostValue::String(s.to_string()?));
        }
        match value.as_object() {
            Some(object) => self.object_to_host(object),
            None => Ok(HostValue::Null),
        }
    }

    /// Convert call arguments into host values
    pub fn args_to_host(&self, args: &[Value<'js>]) -> BridgeResult<Vec<HostValue>> {
        args.iter().map(|arg| self.to_host(arg)).collect()
    }

    /// Convert host values into call arguments
    pub fn args_to_script(&self, args: &[HostValue]) -> BridgeResult<Vec<Value<'js>>> {
        args.iter().map(|arg| self.to_script(arg)).collect()
    }

    /// Script iterator object driving the host iterator of `value`
    pub fn iterator(&self, value: &HostValue) -> BridgeResult<Value<'js>> {
        crate::iterator::create_script_iterator(self, value)
    }

    /// Template for a signature, created on first use
    pub fn template(&self, signature: Signature) -> BridgeResult<Rc<DynamicObjectTemplate>> {
        let cached = self.core.templates.borrow().get(&signature).cloned();
        if let Some(template) = cached {
            return Ok(template);
        }
        let template = Rc::new(DynamicObjectTemplate::new(self.ctx, self.core, signature)?);
        self.core
            .templates
            .borrow_mut()
            .insert(signature, Rc::clone(&template));
        Ok(template)
    }

    fn object_to_script(&self, value: &HostValue) -> BridgeResult<Value<'js>> {
        if let Some(proxy) = value.downcast_ref::<ScriptObjectProxy>() {
            if let Some(object) = proxy.object_in(self.ctx, self.core)? {
                trace!("script object returned to its own context");
                return Ok(object.into_value());
            }
        }
        let Some(signature) = Signature::of(value) else {
            return Ok(Value::new_null(self.ctx.clone()));
        };
        self.template(signature)?.apply(self, value)
    }

    fn function_to_script(&self, function: &HostFunction) -> BridgeResult<Value<'js>> {
        if let Some(script) = function.downcast_ref::<ScriptFunction>() {
            if let Some(original) = script.function_in(self.ctx, self.core)? {
                return Ok(original.into_value());
            }
        }

        let core = Rc::downgrade(self.core);
        let function = function.clone();
        let wrapper = Function::new(
            self.ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &core, |converter| {
                    let args = converter.args_to_host(&args.0)?;
                    let result = function.call(args)?;
                    converter.to_script(&result)
                })
            },
        )?;
        Ok(wrapper.into_value())
    }

    fn object_to_host(&self, object: &Object<'js>) -> BridgeResult<HostValue> {
        let linker = self.linker();
        if let Some(linked) = linker.lookup(object)? {
            return Ok(linked);
        }
        if self.is_array(object)? {
            return self.array_to_host(object);
        }
        if let Some(function) = object.as_value().as_function() {
            let callable = ScriptFunction::new(self, function.clone());
            return Ok(HostValue::Callable(HostFunction::from_callable(Rc::new(callable))));
        }
        if let Some(primitive) = self.unbox(object)? {
            return Ok(primitive);
        }

        trace!("wrapping script object");
        let proxy = ScriptObjectProxy::new(self, object.clone());
        linker.attach(object, HostValue::object(proxy))
    }

    /// Array check that sees through proxies
    fn is_array(&self, object: &Object<'js>) -> BridgeResult<bool> {
        if object.is_array() {
            return Ok(true);
        }
        let array: Object = self.ctx.globals().get("Array")?;
        let is_array: Function = array.get("isArray")?;
        Ok(is_array.call((object.clone(),))?)
    }

    /// Copy own string-keyed properties, skipping `length`
    fn array_to_host(&self, object: &Object<'js>) -> BridgeResult<HostValue> {
        let array = HostArray::new();
        for key in object.own_keys::<String>(Filter::new().string()) {
            let key = key?;
            if key == "length" {
                continue;
            }
            let element: Value = object.get(key.as_str())?;
            array.set(ArrayKey::string(key), self.to_host(&element)?);
        }
        Ok(HostValue::Array(array))
    }

    /// Unwrap `Boolean`/`Number`/`String` objects and stringify regular expressions
    fn unbox(&self, object: &Object<'js>) -> BridgeResult<Option<HostValue>> {
        let globals = self.ctx.globals();
        for name in ["Boolean", "Number", "String"] {
            let class: Value = globals.get(name)?;
            if object.is_instance_of(&class) {
                let value_of: Function = object.get("valueOf")?;
                let primitive: Value = value_of.call((This(object.clone()),))?;
                return self.to_host(&primitive).map(Some);
            }
        }

        let regexp: Value = globals.get("RegExp")?;
        if object.is_instance_of(&regexp) {
            let Coerced(source) = object.as_value().get::<Coerced<String>>()?;
            return Ok(Some(HostValue::String(source)));
        }
        Ok(None)
    }
}

/// Map a script double to a host number.
///
/// Integral doubles outside the 32-bit range come back as `Int`, which undoes
/// the widening `to_script` applies to large integers.
pub(crate) fn number_to_host(value: f64) -> HostValue {
    let integral = value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER;
    let outside_i32 = value < f64::from(i32::MIN) || value > f64::from(i32::MAX);
    if integral && outside_i32 {
        HostValue::Int(value as i64)
    } else {
        HostValue::Float(value)
    }
}

/// Run an engine callback with a converter for its context.
///
/// Establishes the execution scope and turns bridge errors into script
/// exceptions; nothing else is allowed to unwind into the engine.
pub(crate) fn callback<'js, R, F>(ctx: &Ctx<'js>, core: &Weak<Core>, f: F) -> rquickjs::Result<R>
where
    F: FnOnce(&ValueConverter<'_, 'js>) -> BridgeResult<R>,
{
    let _scope = scope::establish(ctx);
    let Some(core) = core.upgrade() else {
        return Err(Exception::throw_internal(ctx, "script context has been released"));
    };
    let converter = ValueConverter::new(ctx, &core);
    f(&converter).map_err(|err| throw(ctx, err))
}

/// Raise a bridge error as a script exception
pub(crate) fn throw(ctx: &Ctx<'_>, err: BridgeError) -> rquickjs::Error {
    match err {
        // Already pending in the engine.
        BridgeError::Engine(err) => err,
        BridgeError::Host(err) => {
            debug!(message = err.message(), "host exception raised into script");
            Exception::throw_message(ctx, err.message())
        }
        other => Exception::throw_message(ctx, &other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_integral_double_stays_float() {
        assert_eq!(number_to_host(3.0), HostValue::Float(3.0));
        assert_eq!(number_to_host(-2.5), HostValue::Float(-2.5));
    }

    #[test]
    fn test_large_integral_double_becomes_int() {
        assert_eq!(number_to_host(4_294_967_296.0), HostValue::Int(4_294_967_296));
        assert_eq!(number_to_host(-3_000_000_000.0), HostValue::Int(-3_000_000_000));
    }

    #[test]
    fn test_unsafe_double_stays_float() {
        let huge = 1.0e20;
        assert_eq!(number_to_host(huge), HostValue::Float(huge));
        assert!(matches!(number_to_host(f64::NAN), HostValue::Float(f) if f.is_nan()));
        assert_eq!(number_to_host(f64::INFINITY), HostValue::Float(f64::INFINITY));
    }
}
