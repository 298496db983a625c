//! Proxy templates for host values
//!
//! A template is a shared `Proxy` handler. All host values with the same
//! capability [`Signature`] reuse one handler; the per-value state lives in
//! the proxy target's private slot, so traps only need the target to find the
//! host value they serve.
//!
//! Traps answer what the host value handles and leave everything else to the
//! target. Array proxies therefore still see `Array.prototype`.

use crate::context::Core;
use crate::convert::{ValueConverter, callback};
use crate::error::BridgeResult;
use crate::iterator;
use crate::linker::Slot;
use jsbridge_host::{ArrayKey, HostArray, HostObjectRef, HostValue};
use rquickjs::atom::PredefinedAtom;
use rquickjs::function::Rest;
use rquickjs::{Array, Atom, Ctx, Function, Object, Persistent, Value};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, trace};

/// Capability triple selecting a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub is_array: bool,
    pub is_array_access: bool,
    pub is_invokable: bool,
}

impl Signature {
    /// Signature of a host value; only arrays and objects have one
    pub fn of(value: &HostValue) -> Option<Self> {
        match value {
            HostValue::Array(_) => Some(Self {
                is_array: true,
                is_array_access: false,
                is_invokable: false,
            }),
            HostValue::Object(object) => Some(Self {
                is_array: false,
                is_array_access: object.array_access().is_some(),
                is_invokable: object.is_invokable(),
            }),
            _ => None,
        }
    }

    /// Check if integer keys get index semantics
    pub fn is_indexed(&self) -> bool {
        self.is_array || self.is_array_access
    }
}

/// Reusable proxy handler for one capability signature
pub struct DynamicObjectTemplate {
    signature: Signature,
    handler: Persistent<Object<'static>>,
}

impl DynamicObjectTemplate {
    pub(crate) fn new<'js>(
        ctx: &Ctx<'js>,
        core: &Rc<Core>,
        signature: Signature,
    ) -> BridgeResult<Self> {
        debug!(?signature, "creating object template");
        let core = Rc::downgrade(core);
        let handler = Object::new(ctx.clone())?;

        let trap_core = core.clone();
        let get = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  target: Object<'js>,
                  key: Value<'js>|
                  -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.get(&key)
                })
            },
        )?;
        handler.set("get", get)?;

        let trap_core = core.clone();
        let set = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  target: Object<'js>,
                  key: Value<'js>,
                  value: Value<'js>|
                  -> rquickjs::Result<bool> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.set(&key, &value)
                })
            },
        )?;
        handler.set("set", set)?;

        let trap_core = core.clone();
        let has = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| -> rquickjs::Result<bool> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.has(&key)
                })
            },
        )?;
        handler.set("has", has)?;

        let trap_core = core.clone();
        let delete = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| -> rquickjs::Result<bool> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.delete(&key)
                })
            },
        )?;
        handler.set("deleteProperty", delete)?;

        let trap_core = core.clone();
        let own_keys = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, target: Object<'js>| -> rquickjs::Result<Vec<String>> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.own_keys()
                })
            },
        )?;
        handler.set("ownKeys", own_keys)?;

        let trap_core = core.clone();
        let descriptor = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  target: Object<'js>,
                  key: Value<'js>|
                  -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &trap_core, |converter| {
                    Traps::new(converter, target, signature)?.own_property(&key)
                })
            },
        )?;
        handler.set("getOwnPropertyDescriptor", descriptor)?;

        if signature.is_invokable {
            let trap_core = core;
            let apply = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>,
                      target: Object<'js>,
                      _this: Value<'js>,
                      args: Array<'js>|
                      -> rquickjs::Result<Value<'js>> {
                    callback(&ctx, &trap_core, |converter| {
                        Traps::new(converter, target, signature)?.apply(&args)
                    })
                },
            )?;
            handler.set("apply", apply)?;
        }

        Ok(Self {
            signature,
            handler: Persistent::save(ctx, handler),
        })
    }

    /// Signature this template serves
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Check if `value` has this template's signature
    pub fn matches(&self, value: &HostValue) -> bool {
        Signature::of(value) == Some(self.signature)
    }

    /// Mint a proxy for `value`.
    ///
    /// Object proxies are linked back to `value`; array proxies are not, since
    /// arrays come back to the host as copies. A value with another signature
    /// yields `null`.
    pub fn apply<'js>(
        &self,
        converter: &ValueConverter<'_, 'js>,
        value: &HostValue,
    ) -> BridgeResult<Value<'js>> {
        let ctx = converter.ctx();
        if !self.matches(value) {
            debug!(
                signature = ?self.signature,
                kind = value.type_name(),
                "template does not match value"
            );
            return Ok(Value::new_null(ctx.clone()));
        }

        let core = converter.core();
        let target = self.new_target(ctx)?;
        core.internals
            .store(ctx, &target, Slot::Backing(value.clone()))?;

        let handler = self.handler.clone().restore(ctx)?;
        let constructor = core.proxy.clone().restore(ctx)?;
        let proxy: Object = constructor.construct((target, handler))?;

        if !self.signature.is_array {
            converter.linker().attach(&proxy, value.clone())?;
        }
        trace!(signature = ?self.signature, "proxy minted");
        Ok(proxy.into_value())
    }

    fn new_target<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Object<'js>> {
        Ok(if self.signature.is_array {
            Array::new(ctx.clone())?.into_object()
        } else if self.signature.is_invokable {
            Function::new(ctx.clone(), || ())?.into_inner()
        } else {
            Object::new(ctx.clone())?
        })
    }
}

/// Trap implementations for one proxy target
struct Traps<'c, 'a, 'js> {
    converter: &'c ValueConverter<'a, 'js>,
    target: Object<'js>,
    backing: HostValue,
    signature: Signature,
}

impl<'c, 'a, 'js> Traps<'c, 'a, 'js> {
    fn new(
        converter: &'c ValueConverter<'a, 'js>,
        target: Object<'js>,
        signature: Signature,
    ) -> BridgeResult<Self> {
        let backing = match converter.core().internals.load(converter.ctx(), &target)? {
            Some(instance) => {
                let slot = instance.try_borrow()?;
                match &slot.slot {
                    Slot::Backing(value) => value.clone(),
                    _ => HostValue::Null,
                }
            }
            None => HostValue::Null,
        };
        Ok(Self {
            converter,
            target,
            backing,
            signature,
        })
    }

    fn ctx(&self) -> &'a Ctx<'js> {
        self.converter.ctx()
    }

    fn get(&self, key: &Value<'js>) -> BridgeResult<Value<'js>> {
        let handled = match key_name(key)? {
            None => self.get_symbol(key)?,
            Some(name) => match &self.backing {
                HostValue::Array(array) => self.array_get(array, &name)?,
                HostValue::Object(object) => self.object_get(object, &name)?,
                _ => None,
            },
        };
        match handled {
            Some(value) => Ok(value),
            None => Ok(self.target.get(key.clone())?),
        }
    }

    fn get_symbol(&self, key: &Value<'js>) -> BridgeResult<Option<Value<'js>>> {
        if is_symbol(self.ctx(), key, PredefinedAtom::SymbolIterator)? {
            let iterable = match &self.backing {
                HostValue::Array(_) => true,
                HostValue::Object(object) => object.is_traversable(),
                _ => false,
            };
            if iterable {
                return self.iterator_function().map(Some);
            }
        } else if is_symbol(self.ctx(), key, PredefinedAtom::SymbolToStringTag)? {
            if let HostValue::Object(object) = &self.backing {
                if object.has_string_conversion() {
                    let text = object.to_host_string()?;
                    return self.converter.to_script(&HostValue::String(text)).map(Some);
                }
            }
        }
        Ok(None)
    }

    fn array_get(&self, array: &HostArray, name: &str) -> BridgeResult<Option<Value<'js>>> {
        if let Some(element) = array.get(ArrayKey::string(name)) {
            return self.converter.to_script(&element).map(Some);
        }
        if name == "length" {
            let length = HostValue::Int(array.next_index());
            return self.converter.to_script(&length).map(Some);
        }
        Ok(None)
    }

    fn object_get(&self, object: &HostObjectRef, name: &str) -> BridgeResult<Option<Value<'js>>> {
        let key = ArrayKey::string(name);
        if self.signature.is_indexed() && key.is_int() {
            return self.offset_get(object, &key);
        }

        if !object.has_method(name) && object.has_property(name) {
            let value = object.get_property(name)?;
            return self.converter.to_script(&value).map(Some);
        }
        if name == "length" {
            if let Some(count) = object.count() {
                return self.converter.to_script(&HostValue::Int(count?)).map(Some);
            }
        }
        if let Some(value) = self.offset_get(object, &key)? {
            return Ok(Some(value));
        }
        if matches!(name, "toString" | "valueOf") && object.has_string_conversion() {
            return self.string_function(object).map(Some);
        }
        if object.is_callable(name) {
            return self.method_function(object, name).map(Some);
        }
        Ok(None)
    }

    fn offset_get(
        &self,
        object: &HostObjectRef,
        key: &ArrayKey,
    ) -> BridgeResult<Option<Value<'js>>> {
        match self.offset_value(object, key)? {
            Some(value) => self.converter.to_script(&value).map(Some),
            None => Ok(None),
        }
    }

    fn offset_value(
        &self,
        object: &HostObjectRef,
        key: &ArrayKey,
    ) -> BridgeResult<Option<HostValue>> {
        let Some(access) = object.array_access() else {
            return Ok(None);
        };
        if !access.offset_exists(key)? {
            return Ok(None);
        }
        Ok(Some(access.offset_get(key)?))
    }

    fn set(&self, key: &Value<'js>, value: &Value<'js>) -> BridgeResult<bool> {
        let Some(name) = key_name(key)? else {
            self.target.set(key.clone(), value.clone())?;
            return Ok(true);
        };
        let key_kind = ArrayKey::string(name.as_str());

        match &self.backing {
            HostValue::Array(array) => {
                let host = self.converter.to_host(value)?;
                if name == "length" {
                    truncate(array, &host);
                } else {
                    array.set(key_kind, host);
                }
            }
            HostValue::Object(object) => match object.array_access() {
                Some(access) if key_kind.is_int() || !object.has_property(&name) => {
                    let host = self.converter.to_host(value)?;
                    access.offset_set(Some(&key_kind), host)?;
                }
                _ => {
                    let host = self.converter.to_host(value)?;
                    object.set_property(&name, host)?;
                }
            },
            _ => self.target.set(key.clone(), value.clone())?,
        }
        Ok(true)
    }

    fn has(&self, key: &Value<'js>) -> BridgeResult<bool> {
        let found = match (key_name(key)?, &self.backing) {
            (Some(name), HostValue::Array(array)) => {
                name == "length" || array.contains_key(ArrayKey::string(name.as_str()))
            }
            (Some(name), HostValue::Object(object)) => {
                let key_kind = ArrayKey::string(name.as_str());
                if self.signature.is_indexed() && key_kind.is_int() {
                    self.offset_exists(object, &key_kind)?
                } else {
                    object.has_property(&name)
                        || object.has_method(&name)
                        || self.offset_exists(object, &key_kind)?
                }
            }
            _ => false,
        };
        Ok(found || self.target.contains_key(key.clone())?)
    }

    fn offset_exists(&self, object: &HostObjectRef, key: &ArrayKey) -> BridgeResult<bool> {
        match object.array_access() {
            Some(access) => Ok(access.offset_exists(key)?),
            None => Ok(false),
        }
    }

    fn delete(&self, key: &Value<'js>) -> BridgeResult<bool> {
        let Some(name) = key_name(key)? else {
            self.target.remove(key.clone())?;
            return Ok(true);
        };
        let key_kind = ArrayKey::string(name.as_str());
        match &self.backing {
            HostValue::Array(array) => {
                array.remove(key_kind);
            }
            HostValue::Object(object) => {
                if let Some(access) = object.array_access() {
                    if access.offset_exists(&key_kind)? {
                        access.offset_unset(&key_kind)?;
                    }
                }
            }
            _ => self.target.remove(key.clone())?,
        }
        Ok(true)
    }

    fn own_keys(&self) -> BridgeResult<Vec<String>> {
        let keys: Vec<ArrayKey> = match &self.backing {
            HostValue::Array(array) => {
                let mut keys = array.keys();
                keys.push(ArrayKey::string("length"));
                keys
            }
            HostValue::Object(object) => {
                object.properties().into_iter().map(|(key, _)| key).collect()
            }
            _ => Vec::new(),
        };

        let mut seen = HashSet::new();
        Ok(keys
            .into_iter()
            .map(|key| key.to_string())
            .filter(|key| seen.insert(key.clone()))
            .collect())
    }

    fn own_property(&self, key: &Value<'js>) -> BridgeResult<Value<'js>> {
        let ctx = self.ctx();
        let Some(name) = key_name(key)? else {
            return Ok(Value::new_undefined(ctx.clone()));
        };
        let key_kind = ArrayKey::string(name.as_str());

        let found = match &self.backing {
            HostValue::Array(array) => match array.get(&key_kind) {
                Some(element) => Some(element),
                None if name == "length" => {
                    let length = self.converter.to_script(&HostValue::Int(array.next_index()))?;
                    return Ok(descriptor(ctx, length, false, false)?.into_value());
                }
                None => None,
            },
            HostValue::Object(object) => {
                if self.signature.is_indexed() && key_kind.is_int() {
                    self.offset_value(object, &key_kind)?
                } else if !object.has_method(&name) && object.has_property(&name) {
                    Some(object.get_property(&name)?)
                } else {
                    self.offset_value(object, &key_kind)?
                }
            }
            _ => None,
        };

        match found {
            Some(value) => {
                let value = self.converter.to_script(&value)?;
                Ok(descriptor(ctx, value, true, true)?.into_value())
            }
            None => Ok(Value::new_undefined(ctx.clone())),
        }
    }

    fn apply(&self, args: &Array<'js>) -> BridgeResult<Value<'js>> {
        let HostValue::Object(object) = &self.backing else {
            return Ok(Value::new_undefined(self.ctx().clone()));
        };
        let args = args.iter::<Value>().collect::<rquickjs::Result<Vec<_>>>()?;
        let args = self.converter.args_to_host(&args)?;
        let result = object.invoke(args)?;
        self.converter.to_script(&result)
    }

    /// Function calling `name` on the host object with converted arguments
    fn method_function(&self, object: &HostObjectRef, name: &str) -> BridgeResult<Value<'js>> {
        let core = Rc::downgrade(self.converter.core());
        let receiver = Rc::clone(object);
        let method = name.to_string();
        let function = Function::new(
            self.ctx().clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &core, |converter| {
                    let args = converter.args_to_host(&args.0)?;
                    trace!(method = %method, argc = args.len(), "calling host method");
                    let result = receiver.call_method(&method, args)?;
                    converter.to_script(&result)
                })
            },
        )?
        .with_name(name)?;
        Ok(function.into_value())
    }

    /// `toString`/`valueOf` alias for host string conversion
    fn string_function(&self, object: &HostObjectRef) -> BridgeResult<Value<'js>> {
        let core = Rc::downgrade(self.converter.core());
        let receiver = Rc::clone(object);
        let function = Function::new(
            self.ctx().clone(),
            move |ctx: Ctx<'js>| -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &core, |converter| {
                    let text = receiver.to_host_string()?;
                    converter.to_script(&HostValue::String(text))
                })
            },
        )?;
        Ok(function.into_value())
    }

    /// `[Symbol.iterator]` returning a fresh bridge iterator
    fn iterator_function(&self) -> BridgeResult<Value<'js>> {
        let core = Rc::downgrade(self.converter.core());
        let iterable = self.backing.clone();
        let function = Function::new(
            self.ctx().clone(),
            move |ctx: Ctx<'js>| -> rquickjs::Result<Value<'js>> {
                callback(&ctx, &core, |converter| {
                    iterator::create_script_iterator(converter, &iterable)
                })
            },
        )?;
        Ok(function.into_value())
    }
}

fn key_name(key: &Value<'_>) -> BridgeResult<Option<String>> {
    match key.as_string() {
        Some(name) => Ok(Some(name.to_string()?)),
        None => Ok(None),
    }
}

fn is_symbol<'js>(ctx: &Ctx<'js>, key: &Value<'js>, symbol: PredefinedAtom) -> BridgeResult<bool> {
    if !key.is_symbol() {
        return Ok(false);
    }
    let atom = Atom::from_value(ctx.clone(), key)?;
    Ok(atom == Atom::from_predefined(ctx.clone(), symbol))
}

fn descriptor<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
    enumerable: bool,
    configurable: bool,
) -> BridgeResult<Object<'js>> {
    let descriptor = Object::new(ctx.clone())?;
    descriptor.set("value", value)?;
    descriptor.set("writable", true)?;
    descriptor.set("enumerable", enumerable)?;
    descriptor.set("configurable", configurable)?;
    Ok(descriptor)
}

/// Drop integer keys at or above a new `length`
fn truncate(array: &HostArray, length: &HostValue) {
    let Some(length) = length.as_float() else {
        return;
    };
    let length = length as i64;
    for key in array.keys() {
        if key.as_int().is_some_and(|index| index >= length) {
            array.remove(key);
        }
    }
}
