//! jsbridge - dynamic object bridge between a host runtime and QuickJS.
//!
//! Host values become script values and back. Host objects show up in script
//! as proxies that route every property touch, index access, call and
//! iteration to the host object; script objects show up on the host as
//! [`ScriptObjectProxy`] values implementing the host object protocol.
//!
//! # Features
//!
//! - **Identity**: a host object crossing into script and back comes back as
//!   the same host object
//! - **Dynamic dispatch**: declared methods, magic getters, array access and
//!   invokable objects are all reachable from script
//! - **Deadlines**: each run can carry a wall-clock timeout that aborts the
//!   script with an uncatchable exception
//! - **Iteration**: host iterables drive `for..of`; script objects walk as host
//!   iterators over their keys
//!
//! # Example
//!
//! ```no_run
//! use jsbridge::{DynamicObject, HostValue, JsContext};
//! use std::time::Duration;
//!
//! let context = JsContext::new().unwrap();
//! let greeter = DynamicObject::builder("Greeter")
//!     .method("greet", |_, args| {
//!         let name = args.first().and_then(HostValue::as_str).unwrap_or("world");
//!         Ok(HostValue::from(format!("hello {name}")))
//!     })
//!     .build_value();
//! context.assign("greeter", greeter).unwrap();
//!
//! let result = context
//!     .evaluate_with_timeout("greeter.greet('script')", Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(result.as_str(), Some("hello script"));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        JsContext                             │
//! │   assign / global / compile / execute / evaluate             │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                  │
//!          ↓                                  ↓
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │ ExecutionController  │        │        ValueConverter         │
//! │  compile, run, drain │        │  host <-> script marshaling   │
//! │  jobs, Watchdog      │        └──────────────────────────────┘
//! └──────────────────────┘             │            │          │
//!                                      ↓            ↓          ↓
//!                          ┌──────────────┐ ┌────────────┐ ┌──────────┐
//!                          │IdentityLinker│ │ Dynamic    │ │ Iterator │
//!                          │ (WeakMap     │ │ Object     │ │ bridge   │
//!                          │  slots)      │ │ Template   │ │          │
//!                          └──────────────┘ └────────────┘ └──────────┘
//! ```

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod iterator;
pub mod linker;
pub mod proxy;
mod scope;
pub mod script;
pub mod template;
mod timeout;

pub use config::{BridgeConfig, LinkMode, PropertyAttributes};
pub use context::JsContext;
pub use convert::ValueConverter;
pub use error::{BridgeError, BridgeResult, TIMEOUT_MESSAGE};
pub use iterator::ScriptKeyIterator;
pub use linker::IdentityLinker;
pub use proxy::{SCRIPT_OBJECT_CLASS, ScriptFunction, ScriptObjectProxy};
pub use script::{CompiledScript, ExecutionController};
pub use template::{DynamicObjectTemplate, Signature};

pub use jsbridge_host::{
    ArrayAccess, ArrayIterator, ArrayKey, DynamicObject, HostArray, HostCallable, HostError,
    HostFunction, HostIterator, HostObject, HostResult, HostValue,
};

/// Common imports for embedding code
pub mod prelude {
    pub use crate::config::{BridgeConfig, LinkMode, PropertyAttributes};
    pub use crate::context::JsContext;
    pub use crate::error::{BridgeError, BridgeResult};
    pub use crate::proxy::ScriptObjectProxy;
    pub use jsbridge_host::{DynamicObject, HostArray, HostError, HostObject, HostValue};
}
