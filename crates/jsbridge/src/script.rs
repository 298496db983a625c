//! Compilation and deadline-bound execution
//!
//! Scripts are compiled to bytecode once and can be run any number of times.
//! A run with a positive timeout is guarded by a [`Watchdog`]; when it fires,
//! the runtime's interrupt handler aborts the script at its next interruption
//! point with an exception scripts cannot catch.

use crate::context::Core;
use crate::convert::ValueConverter;
use crate::error::{BridgeError, BridgeResult, capture};
use crate::scope;
use crate::timeout::Watchdog;
use jsbridge_host::HostValue;
use rquickjs::{Context, Ctx, Persistent, Runtime, Value, qjs};
use std::ffi::CString;
use std::ptr;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// A compiled script, runnable in the context that compiled it
pub struct CompiledScript {
    function: Persistent<Value<'static>>,
    name: String,
    context: Context,
}

impl CompiledScript {
    /// File name reported in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Compiles and runs scripts under an optional wall-clock deadline
pub struct ExecutionController {
    interrupt: Arc<AtomicBool>,
}

impl ExecutionController {
    /// Install the interrupt handler on `runtime`.
    ///
    /// The handler is installed once; it only polls the shared flag.
    pub(crate) fn new(runtime: &Runtime) -> Self {
        let interrupt = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::SeqCst))));
        Self { interrupt }
    }

    /// Flag polled by the engine; raising it aborts the running script
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Compile `source` without running it
    pub(crate) fn compile(
        &self,
        core: &Core,
        source: &str,
        name: &str,
    ) -> BridgeResult<CompiledScript> {
        let strict = core.config.strict;
        scope::enter(&core.context, |ctx| {
            debug!(script = name, strict, "compiling script");
            let function = compile_bytecode(&ctx, source, name, strict)?;
            Ok(CompiledScript {
                function: Persistent::save(&ctx, function),
                name: name.to_string(),
                context: core.context.clone(),
            })
        })
    }

    /// Run a compiled script; a zero `timeout` means no deadline
    pub(crate) fn execute(
        &self,
        core: &Rc<Core>,
        script: &CompiledScript,
        timeout: Duration,
    ) -> BridgeResult<HostValue> {
        self.interrupt.store(false, Ordering::SeqCst);

        scope::enter(&core.context, |ctx| {
            let function = script.function.clone().restore(&ctx)?;
            debug!(script = %script.name, ?timeout, "executing script");

            let watchdog = if timeout > Duration::ZERO {
                Some(Watchdog::start(timeout, Arc::clone(&self.interrupt))?)
            } else {
                None
            };
            let outcome = run_bytecode(&ctx, &function)
                .and_then(|value| drain_jobs(&ctx).map(|()| value));
            if let Some(watchdog) = watchdog {
                watchdog.finish();
            }
            let timed_out = self.interrupt.swap(false, Ordering::SeqCst);

            match outcome {
                Ok(value) => {
                    let converter = ValueConverter::new(&ctx, core);
                    converter
                        .to_host(&value)
                        .map_err(|err| match err {
                            BridgeError::Engine(err) => capture(&ctx, err),
                            other => other,
                        })
                }
                Err(_) if timed_out => {
                    // Discard the termination exception without reading it.
                    drop(ctx.catch());
                    warn!(script = %script.name, ?timeout, "script terminated by deadline");
                    Err(BridgeError::Timeout)
                }
                Err(err) => Err(capture(&ctx, err)),
            }
        })
    }
}

fn compile_bytecode<'js>(
    ctx: &Ctx<'js>,
    source: &str,
    name: &str,
    strict: bool,
) -> BridgeResult<Value<'js>> {
    let source = CString::new(source)
        .map_err(|_| BridgeError::syntax_error("source contains a NUL byte"))?;
    let name = CString::new(name)
        .map_err(|_| BridgeError::internal("script name contains a NUL byte"))?;

    let mut flags = qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_COMPILE_ONLY;
    if strict {
        flags |= qjs::JS_EVAL_FLAG_STRICT;
    }

    let raw = ctx.as_raw().as_ptr();
    // SAFETY: `source` is NUL terminated at `len` and the scope is held.
    let compiled = unsafe {
        qjs::JS_Eval(
            raw,
            source.as_ptr(),
            source.as_bytes().len() as _,
            name.as_ptr(),
            flags as i32,
        )
    };
    if unsafe { qjs::JS_IsException(compiled) } {
        return Err(capture(ctx, rquickjs::Error::Exception).into_syntax_error());
    }
    // SAFETY: JS_Eval returned an owned value of this context.
    Ok(unsafe { Value::from_raw(ctx.clone(), compiled) })
}

fn run_bytecode<'js>(ctx: &Ctx<'js>, function: &Value<'js>) -> rquickjs::Result<Value<'js>> {
    let raw = ctx.as_raw().as_ptr();
    // SAFETY: JS_EvalFunction consumes one reference, taken here with
    // JS_DupValue so `function` stays runnable.
    unsafe {
        let result = qjs::JS_EvalFunction(raw, qjs::JS_DupValue(raw, function.as_raw()));
        if qjs::JS_IsException(result) {
            return Err(rquickjs::Error::Exception);
        }
        Ok(Value::from_raw(ctx.clone(), result))
    }
}

/// Run queued promise jobs until the queue is empty
fn drain_jobs(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    // SAFETY: the runtime lock is held for the whole scope.
    let runtime = unsafe { qjs::JS_GetRuntime(ctx.as_raw().as_ptr()) };
    loop {
        let mut job_ctx = ptr::null_mut();
        match unsafe { qjs::JS_ExecutePendingJob(runtime, &mut job_ctx) } {
            0 => return Ok(()),
            status if status < 0 => return Err(rquickjs::Error::Exception),
            _ => {}
        }
    }
}
