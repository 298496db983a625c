//! Iteration across the boundary
//!
//! Host iterables show up in script as iterator objects whose `next()` drives
//! the host iterator. Script objects show up on the host as a [`HostIterator`]
//! over a snapshot of their own enumerable keys.

use crate::context::Core;
use crate::convert::{ValueConverter, callback};
use crate::error::{BridgeError, BridgeResult};
use crate::linker::Slot;
use crate::scope;
use jsbridge_host::{ArrayIterator, ArrayKey, HostError, HostIterator, HostResult, HostValue};
use rquickjs::atom::PredefinedAtom;
use rquickjs::function::{Opt, This};
use rquickjs::{Context, Ctx, Filter, Function, Object, Persistent, Value};
use std::rc::{Rc, Weak};
use tracing::trace;

/// Host iterator state behind a script iterator object
pub(crate) struct IteratorState {
    inner: Option<Box<dyn HostIterator>>,
}

impl IteratorState {
    fn new(iter: Box<dyn HostIterator>) -> Self {
        Self { inner: Some(iter) }
    }

    /// Produce the next value, `None` once exhausted
    fn advance(&mut self) -> HostResult<Option<HostValue>> {
        let Some(iter) = self.inner.as_mut() else {
            return Ok(None);
        };
        if !iter.valid()? {
            self.dispose();
            return Ok(None);
        }
        let value = iter.current()?;
        iter.next()?;
        Ok(Some(value))
    }

    fn dispose(&mut self) {
        if self.inner.take().is_some() {
            trace!("host iterator disposed");
        }
    }
}

/// Host iterator for a value, if it can be iterated
fn host_iterator(value: &HostValue) -> HostResult<Option<Box<dyn HostIterator>>> {
    match value {
        HostValue::Array(array) => Ok(Some(Box::new(ArrayIterator::new(array)))),
        HostValue::Object(object) if object.is_traversable() => object.iterate().map(Some),
        _ => Ok(None),
    }
}

/// Build a script iterator object driving the host iterator of `value`
pub(crate) fn create_script_iterator<'js>(
    converter: &ValueConverter<'_, 'js>,
    value: &HostValue,
) -> BridgeResult<Value<'js>> {
    let ctx = converter.ctx();
    let Some(mut iter) = host_iterator(value)? else {
        return Err(HostError::new(format!("{} is not iterable", value.type_name())).into());
    };
    iter.rewind()?;

    let object = Object::new(ctx.clone())?;
    object.set_prototype(Some(&iterator_prototype(converter)?))?;
    converter
        .core()
        .internals
        .store(ctx, &object, Slot::Iterator(IteratorState::new(iter)))?;
    trace!(kind = value.type_name(), "script iterator created");
    Ok(object.into_value())
}

/// Shared prototype carrying `next`, `return` and `[Symbol.iterator]`
fn iterator_prototype<'js>(converter: &ValueConverter<'_, 'js>) -> BridgeResult<Object<'js>> {
    let ctx = converter.ctx();
    let core = converter.core();
    let cached = core.iterator_proto.borrow().clone();
    if let Some(proto) = cached {
        return Ok(proto.restore(ctx)?);
    }

    let proto = Object::new(ctx.clone())?;
    let weak = Rc::downgrade(core);

    let next_core = weak.clone();
    let next = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Object<'js>>| -> rquickjs::Result<Object<'js>> {
            callback(&ctx, &next_core, |converter| {
                let value = with_state(converter, &this.0, IteratorState::advance)?;
                match value {
                    Some(value) => step(converter, converter.to_script(&value)?, false),
                    None => step(converter, Value::new_undefined(ctx.clone()), true),
                }
            })
        },
    )?
    .with_name("next")?;
    proto.set("next", next)?;

    let return_core = weak;
    let finish = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>,
              this: This<Object<'js>>,
              value: Opt<Value<'js>>|
              -> rquickjs::Result<Object<'js>> {
            callback(&ctx, &return_core, |converter| {
                with_state(converter, &this.0, |state| {
                    state.dispose();
                    Ok(())
                })?;
                let value = value.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
                step(converter, value, true)
            })
        },
    )?
    .with_name("return")?;
    proto.set("return", finish)?;

    let itself = Function::new(ctx.clone(), |this: This<Value<'js>>| this.0)?
        .with_name("[Symbol.iterator]")?;
    proto.set(PredefinedAtom::SymbolIterator, itself)?;

    *core.iterator_proto.borrow_mut() = Some(Persistent::save(ctx, proto.clone()));
    Ok(proto)
}

/// Run `f` on the iterator state stored for `object`
fn with_state<'js, R>(
    converter: &ValueConverter<'_, 'js>,
    object: &Object<'js>,
    f: impl FnOnce(&mut IteratorState) -> HostResult<R>,
) -> BridgeResult<R> {
    let instance = converter
        .core()
        .internals
        .load(converter.ctx(), object)?
        .ok_or_else(|| BridgeError::internal("not a bridge iterator"))?;
    let mut slot = instance.try_borrow_mut()?;
    match &mut slot.slot {
        Slot::Iterator(state) => Ok(f(state)?),
        _ => Err(BridgeError::internal("not a bridge iterator")),
    }
}

fn step<'js>(
    converter: &ValueConverter<'_, 'js>,
    value: Value<'js>,
    done: bool,
) -> BridgeResult<Object<'js>> {
    let result = Object::new(converter.ctx().clone())?;
    result.set("value", value)?;
    result.set("done", done)?;
    Ok(result)
}

/// Host iterator over a snapshot of a script object's own enumerable keys.
///
/// Keys are captured once; later additions or removals on the script object
/// do not change the walk, though values are read live.
pub struct ScriptKeyIterator {
    object: Persistent<Object<'static>>,
    core: Weak<Core>,
    context: Context,
    keys: Vec<String>,
    position: usize,
}

impl ScriptKeyIterator {
    pub(crate) fn new<'js>(
        converter: &ValueConverter<'_, 'js>,
        object: Object<'js>,
    ) -> BridgeResult<Self> {
        let keys = object
            .own_keys::<String>(Filter::new().string().enum_only())
            .collect::<rquickjs::Result<Vec<_>>>()?;
        let core = converter.core();
        Ok(Self {
            object: Persistent::save(converter.ctx(), object),
            core: Rc::downgrade(core),
            context: core.context.clone(),
            keys,
            position: 0,
        })
    }

    /// Number of keys in the snapshot
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn current_key(&self) -> HostResult<&str> {
        self.keys
            .get(self.position)
            .map(String::as_str)
            .ok_or_else(|| HostError::new("Iterator is past its end"))
    }
}

impl HostIterator for ScriptKeyIterator {
    fn rewind(&mut self) -> HostResult<()> {
        self.position = 0;
        Ok(())
    }

    fn valid(&mut self) -> HostResult<bool> {
        Ok(self.position < self.keys.len())
    }

    fn current(&mut self) -> HostResult<HostValue> {
        let key = self.current_key()?;
        let core = self
            .core
            .upgrade()
            .ok_or_else(|| HostError::new("script context has been released"))?;
        let object = &self.object;
        scope::enter(&self.context, |ctx| {
            let converter = ValueConverter::new(&ctx, &core);
            let object = object.clone().restore(&ctx).map_err(BridgeError::from)?;
            let value: Value = object.get(key).map_err(|err| crate::error::capture(&ctx, err))?;
            converter.to_host(&value)
        })
        .map_err(HostError::from)
    }

    fn key(&mut self) -> HostResult<HostValue> {
        Ok(ArrayKey::string(self.current_key()?).to_host())
    }

    fn next(&mut self) -> HostResult<()> {
        self.position += 1;
        Ok(())
    }
}
