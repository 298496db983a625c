//! Identity links between script objects and host values
//!
//! Every script object can carry one private slot. Slots live in a per-context
//! `WeakMap` that scripts never see, so an entry dies together with its key
//! object and dropping the native slot instance is the finalization hook.

use crate::config::LinkMode;
use crate::error::BridgeResult;
use crate::iterator::IteratorState;
use jsbridge_host::{HostValue, WeakHostValue};
use rquickjs::class::{JsClass, Trace, Tracer, Writable};
use rquickjs::function::{Constructor, This};
use rquickjs::{Class, Ctx, Function, JsLifetime, Object, Persistent, Value};
use tracing::trace;

/// What a private slot holds
pub(crate) enum Slot {
    /// Identity link from a script object to the host value it stands for
    Link(Link),
    /// Host value backing a proxy target; always held strongly
    Backing(HostValue),
    /// State of a host iterator exposed to script
    Iterator(IteratorState),
}

/// Host-side half of an identity link
pub(crate) enum Link {
    Strong(HostValue),
    Weak(WeakHostValue),
}

impl Link {
    /// Build a link in the given mode.
    ///
    /// Primitives cannot be held weakly and always produce a strong link.
    pub(crate) fn new(value: &HostValue, mode: LinkMode) -> Self {
        match (mode, value.downgrade()) {
            (LinkMode::Weak, Some(weak)) => Link::Weak(weak),
            _ => Link::Strong(value.clone()),
        }
    }

    /// Resolve the linked host value, `None` once a weak target is gone
    pub(crate) fn resolve(&self) -> Option<HostValue> {
        match self {
            Link::Strong(value) => Some(value.clone()),
            Link::Weak(weak) => weak.upgrade(),
        }
    }

    fn is_weak(&self) -> bool {
        matches!(self, Link::Weak(_))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        trace!(weak = self.is_weak(), "identity link released");
    }
}

/// Native class instance stored as a `WeakMap` value
pub(crate) struct PrivateSlot {
    pub(crate) slot: Slot,
}

unsafe impl<'js> JsLifetime<'js> for PrivateSlot {
    type Changed<'to> = PrivateSlot;
}

impl<'js> Trace<'js> for PrivateSlot {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl<'js> JsClass<'js> for PrivateSlot {
    const NAME: &'static str = "PrivateSlot";

    type Mutable = Writable;

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}

/// A hidden `WeakMap` from script objects to private slots.
///
/// The map methods are captured when the map is created so scripts that patch
/// `WeakMap.prototype` cannot observe or redirect slot access.
pub(crate) struct PrivateSlots {
    map: Persistent<Object<'static>>,
    get: Persistent<Function<'static>>,
    set: Persistent<Function<'static>>,
    delete: Persistent<Function<'static>>,
}

impl PrivateSlots {
    pub(crate) fn new(ctx: &Ctx<'_>) -> rquickjs::Result<Self> {
        let ctor: Constructor = ctx.globals().get("WeakMap")?;
        let map: Object = ctor.construct(())?;
        let proto: Object = ctor.get("prototype")?;
        let get: Function = proto.get("get")?;
        let set: Function = proto.get("set")?;
        let delete: Function = proto.get("delete")?;

        Ok(Self {
            map: Persistent::save(ctx, map),
            get: Persistent::save(ctx, get),
            set: Persistent::save(ctx, set),
            delete: Persistent::save(ctx, delete),
        })
    }

    /// Store `slot` for `object`, replacing any previous slot
    pub(crate) fn store<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
        slot: Slot,
    ) -> rquickjs::Result<()> {
        let instance = Class::instance(ctx.clone(), PrivateSlot { slot })?;
        let map = self.map.clone().restore(ctx)?;
        let set = self.set.clone().restore(ctx)?;
        set.call::<_, Value>((This(map), object.clone(), instance))?;
        Ok(())
    }

    /// Load the slot instance of `object`, if any
    pub(crate) fn load<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
    ) -> rquickjs::Result<Option<Class<'js, PrivateSlot>>> {
        let map = self.map.clone().restore(ctx)?;
        let get = self.get.clone().restore(ctx)?;
        let value: Value = get.call((This(map), object.clone()))?;
        Ok(Class::<PrivateSlot>::from_value(&value).ok())
    }

    /// Drop the slot of `object`; returns whether one existed
    pub(crate) fn remove<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
    ) -> rquickjs::Result<bool> {
        let map = self.map.clone().restore(ctx)?;
        let delete = self.delete.clone().restore(ctx)?;
        delete.call((This(map), object.clone()))
    }
}

/// Identity-preserving association between script objects and host values.
///
/// Links are stored per object, so no central table or lock exists. All
/// operations need the engine scope they were created in.
pub struct IdentityLinker<'a, 'js> {
    ctx: &'a Ctx<'js>,
    slots: &'a PrivateSlots,
    mode: LinkMode,
}

impl<'a, 'js> IdentityLinker<'a, 'js> {
    pub(crate) fn new(ctx: &'a Ctx<'js>, slots: &'a PrivateSlots, mode: LinkMode) -> Self {
        Self { ctx, slots, mode }
    }

    /// Default link mode used by [`attach`](Self::attach)
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Link `object` to `value` using the default mode
    pub fn attach(&self, object: &Object<'js>, value: HostValue) -> BridgeResult<HostValue> {
        self.attach_with(object, value, self.mode)
    }

    /// Link `object` to `value`, detaching any previous link first
    pub fn attach_with(
        &self,
        object: &Object<'js>,
        value: HostValue,
        mode: LinkMode,
    ) -> BridgeResult<HostValue> {
        self.detach(object)?;
        let link = Link::new(&value, mode);
        trace!(weak = link.is_weak(), kind = value.type_name(), "identity link attached");
        self.slots.store(self.ctx, object, Slot::Link(link))?;
        Ok(value)
    }

    /// Remove the link of `object`, if any
    pub fn detach(&self, object: &Object<'js>) -> BridgeResult<()> {
        if self.slots.remove(self.ctx, object)? {
            trace!("identity link detached");
        }
        Ok(())
    }

    /// Find the host value linked to `object`.
    ///
    /// A weak link whose host value is already gone resolves to `None`.
    pub fn lookup(&self, object: &Object<'js>) -> BridgeResult<Option<HostValue>> {
        let Some(instance) = self.slots.load(self.ctx, object)? else {
            return Ok(None);
        };
        let slot = instance.try_borrow()?;
        Ok(match &slot.slot {
            Slot::Link(link) => link.resolve(),
            _ => None,
        })
    }

    /// Check if `object` carries a link
    pub fn is_linked(&self, object: &Object<'js>) -> BridgeResult<bool> {
        let Some(instance) = self.slots.load(self.ctx, object)? else {
            return Ok(false);
        };
        let slot = instance.try_borrow()?;
        Ok(matches!(slot.slot, Slot::Link(_)))
    }
}
