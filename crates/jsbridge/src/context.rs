//! Bridge context
//!
//! [`JsContext`] owns one engine runtime and context together with the
//! bridge state hung off it: the hidden slot maps, the template cache and the
//! execution controller.

use crate::config::{BridgeConfig, PropertyAttributes};
use crate::convert::ValueConverter;
use crate::error::{BridgeError, BridgeResult, capture};
use crate::linker::PrivateSlots;
use crate::scope;
use crate::script::{CompiledScript, ExecutionController};
use crate::template::{DynamicObjectTemplate, Signature};
use jsbridge_host::HostValue;
use rquickjs::function::Constructor;
use rquickjs::{Context, Function, Object, Persistent, Runtime, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{debug, info};

/// Per-context bridge state shared with traps and host-side proxies
pub(crate) struct Core {
    /// Identity links from script objects to host values
    pub(crate) links: PrivateSlots,
    /// Proxy backings and iterator states
    pub(crate) internals: PrivateSlots,
    /// The global `Proxy` constructor
    pub(crate) proxy: Persistent<Constructor<'static>>,
    pub(crate) templates: RefCell<HashMap<Signature, Rc<DynamicObjectTemplate>>>,
    pub(crate) iterator_proto: RefCell<Option<Persistent<Object<'static>>>>,
    pub(crate) config: BridgeConfig,
    // Dropped last so the persistents above are released first.
    pub(crate) context: Context,
}

/// A script context bridged to the host
pub struct JsContext {
    core: Rc<Core>,
    controller: ExecutionController,
    runtime: Runtime,
}

impl JsContext {
    /// Create a context with the default configuration
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a context with the given configuration
    pub fn with_config(config: BridgeConfig) -> BridgeResult<Self> {
        let runtime = Runtime::new().map_err(|e| BridgeError::ContextCreation {
            message: e.to_string(),
        })?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = config.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let controller = ExecutionController::new(&runtime);

        let context = Context::full(&runtime).map_err(|e| BridgeError::ContextCreation {
            message: e.to_string(),
        })?;
        let core = context
            .with(|ctx| -> rquickjs::Result<Core> {
                let proxy: Constructor = ctx.globals().get("Proxy")?;
                Ok(Core {
                    links: PrivateSlots::new(&ctx)?,
                    internals: PrivateSlots::new(&ctx)?,
                    proxy: Persistent::save(&ctx, proxy),
                    templates: RefCell::new(HashMap::new()),
                    iterator_proto: RefCell::new(None),
                    config: config.clone(),
                    context: context.clone(),
                })
            })
            .map_err(|e| BridgeError::ContextCreation {
                message: e.to_string(),
            })?;

        info!(
            memory_limit = ?config.memory_limit,
            link_mode = ?config.link_mode,
            "bridge context created"
        );
        Ok(Self {
            core: Rc::new(core),
            controller,
            runtime,
        })
    }

    /// Configuration this context was created with
    pub fn config(&self) -> &BridgeConfig {
        &self.core.config
    }

    /// Bind a host value to a global name as a plain data property
    pub fn assign(&self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        self.assign_with(name, value, PropertyAttributes::data())
    }

    /// Bind a host value to a global name with explicit attributes
    pub fn assign_with(
        &self,
        name: &str,
        value: impl Into<HostValue>,
        attributes: PropertyAttributes,
    ) -> BridgeResult<()> {
        let value = value.into();
        debug!(name, kind = value.type_name(), ?attributes, "assigning global");
        self.with_converter(|converter| {
            let ctx = converter.ctx();
            let globals = ctx.globals();
            let script_value = converter.to_script(&value)?;
            if attributes.is_plain() {
                globals.set(name, script_value)?;
                return Ok(());
            }

            let descriptor = Object::new(ctx.clone())?;
            descriptor.set("value", script_value)?;
            descriptor.set("writable", attributes.writable)?;
            descriptor.set("enumerable", attributes.enumerable)?;
            descriptor.set("configurable", attributes.configurable)?;
            let object: Object = globals.get("Object")?;
            let define: Function = object.get("defineProperty")?;
            define.call::<_, Value>((globals, name, descriptor))?;
            Ok(())
        })
    }

    /// Read a global as a host value; missing globals read as `Null`
    pub fn global(&self, name: &str) -> BridgeResult<HostValue> {
        self.with_converter(|converter| {
            let value: Value = converter.ctx().globals().get(name)?;
            converter.to_host(&value)
        })
    }

    /// Compile a script under the configured file name
    pub fn compile(&self, source: &str) -> BridgeResult<CompiledScript> {
        self.controller
            .compile(&self.core, source, &self.core.config.script_name)
    }

    /// Compile a script under the given file name
    pub fn compile_named(&self, source: &str, name: &str) -> BridgeResult<CompiledScript> {
        self.controller.compile(&self.core, source, name)
    }

    /// Run a compiled script. A zero `timeout` means no deadline.
    ///
    /// A run that hits its deadline fails with [`BridgeError::Timeout`]; the
    /// context stays usable afterwards.
    pub fn execute(&self, script: &CompiledScript, timeout: Duration) -> BridgeResult<HostValue> {
        self.controller.execute(&self.core, script, timeout)
    }

    /// Compile and run `source` under the configured default deadline
    pub fn evaluate(&self, source: &str) -> BridgeResult<HostValue> {
        self.evaluate_with_timeout(source, self.core.config.default_timeout)
    }

    /// Compile and run `source` under `timeout`
    pub fn evaluate_with_timeout(
        &self,
        source: &str,
        timeout: Duration,
    ) -> BridgeResult<HostValue> {
        let script = self.compile(source)?;
        self.execute(&script, timeout)
    }

    /// Run `f` with a converter for this context.
    ///
    /// Script exceptions raised inside are captured with their diagnostics.
    pub fn with_converter<R>(
        &self,
        f: impl for<'a, 'js> FnOnce(&ValueConverter<'a, 'js>) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let core = &self.core;
        scope::enter(&core.context, |ctx| {
            let converter = ValueConverter::new(&ctx, core);
            f(&converter).map_err(|err| match err {
                BridgeError::Engine(err) => capture(&ctx, err),
                other => other,
            })
        })
    }

    /// Flag polled by the engine; raising it from any thread aborts the
    /// running script, which then reports a timeout
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.controller.interrupt_flag()
    }

    /// Run a garbage collection pass
    pub fn gc(&self) {
        scope::enter(&self.core.context, |ctx| ctx.run_gc());
    }

    /// Bytes currently allocated by the engine
    pub fn memory_used(&self) -> i64 {
        self.runtime.memory_usage().memory_used_size
    }
}

impl std::fmt::Debug for JsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsContext")
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}
