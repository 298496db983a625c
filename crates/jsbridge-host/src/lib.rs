//! jsbridge-host - the host side of the script bridge.
//!
//! This crate models the dynamic values of an embedding application: nulls,
//! scalars, UTF-8 strings, ordered arrays, objects with magic dispatch and
//! callables. The bridge in `jsbridge` consumes exactly this surface; it never
//! needs to know what a concrete host class looks like.
//!
//! # Example
//!
//! ```
//! use jsbridge_host::{HostArray, HostValue};
//!
//! let list = HostArray::from_values([HostValue::from(1), HostValue::from("two")]);
//! let value = HostValue::from(list.clone());
//!
//! list.push(HostValue::Null);
//! assert_eq!(value.as_array().unwrap().len(), 3);
//! ```

pub mod array;
pub mod dynamic;
pub mod error;
pub mod function;
pub mod iter;
pub mod object;
pub mod value;

pub use array::{ArrayKey, HostArray, WeakHostArray};
pub use dynamic::{DynamicObject, DynamicObjectBuilder};
pub use error::{HostError, HostResult};
pub use function::{HostCallable, HostFunction, WeakHostFunction};
pub use iter::{ArrayIterator, HostIterator, collect_entries};
pub use object::{ArrayAccess, HostObject, HostObjectRef};
pub use value::{HostValue, WeakHostValue};
