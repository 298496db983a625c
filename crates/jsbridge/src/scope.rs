//! Re-entrant execution scope
//!
//! `rquickjs::Context::with` locks the runtime and cannot be nested. Host code
//! that runs while a script is executing (a proxy trap calling into a host
//! method that touches another script object) still needs a `Ctx`, so the
//! active context is recorded per thread and re-entered from that record.

use rquickjs::{Context, Ctx, qjs};
use std::cell::Cell;
use std::ptr::NonNull;

thread_local! {
    static ACTIVE: Cell<Option<NonNull<qjs::JSContext>>> = const { Cell::new(None) };
}

/// Run `f` inside an execution scope for `context`
///
/// Enters the engine lock when no scope is active on this thread, otherwise
/// reuses the active one.
pub(crate) fn enter<F, R>(context: &Context, f: F) -> R
where
    F: for<'js> FnOnce(Ctx<'js>) -> R,
{
    let raw = context.as_raw();
    if ACTIVE.get() == Some(raw) {
        // SAFETY: ACTIVE only holds a pointer while the runtime lock for that
        // context is held further up this thread's stack.
        let ctx = unsafe { Ctx::from_raw(raw) };
        return f(ctx);
    }

    context.with(|ctx| {
        let _guard = establish(&ctx);
        f(ctx)
    })
}

/// Record `ctx` as the active scope until the guard drops
///
/// Engine callbacks receive a `Ctx` directly; establishing it makes nested
/// bridge calls from host code resolve to the same scope.
pub(crate) fn establish(ctx: &Ctx<'_>) -> impl Drop + use<> {
    let previous = ACTIVE.replace(Some(ctx.as_raw()));
    scopeguard::guard(previous, |previous| ACTIVE.set(previous))
}

