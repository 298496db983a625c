//! Configuration types for a bridge context.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How an identity link holds on to its host value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Store a weak reference; lookups return nothing once the host value is gone
    #[default]
    Weak,
    /// Keep the host value alive for as long as the script object lives
    Strong,
}

/// Bridge context configuration.
///
/// Controls engine limits and the defaults used by script execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Engine heap limit in bytes.
    /// Default: None (unlimited)
    pub memory_limit: Option<usize>,

    /// Maximum native stack size in bytes.
    /// Default: None (engine default)
    pub max_stack_size: Option<usize>,

    /// Allocation threshold that triggers a collection.
    /// Default: None (engine default)
    pub gc_threshold: Option<usize>,

    /// Deadline applied by `evaluate` when none is given. Zero means no deadline.
    /// Default: 0
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,

    /// Link mode used when script objects are linked to host values.
    /// Default: weak
    pub link_mode: LinkMode,

    /// File name reported in script diagnostics.
    /// Default: "script.js"
    pub script_name: String,

    /// Compile scripts in strict mode.
    /// Default: false
    pub strict: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
            default_timeout: Duration::ZERO,
            link_mode: LinkMode::Weak,
            script_name: "script.js".to_string(),
            strict: false,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine heap limit.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set the maximum native stack size.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    /// Set the collection threshold.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    /// Set the default deadline.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the identity link mode.
    pub fn link_mode(mut self, mode: LinkMode) -> Self {
        self.link_mode = mode;
        self
    }

    /// Set the file name used in diagnostics.
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Enable or disable strict mode.
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }
}

/// Attributes of a property assigned from the host.
///
/// The default is a plain writable, enumerable, configurable data property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable (deletable)
    pub configurable: bool,
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

impl PropertyAttributes {
    /// Writable, enumerable, configurable
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Clear the writable flag
    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Clear the enumerable flag
    pub const fn dont_enum(mut self) -> Self {
        self.enumerable = false;
        self
    }

    /// Clear the configurable flag
    pub const fn dont_delete(mut self) -> Self {
        self.configurable = false;
        self
    }

    /// Check if these are plain data attributes
    pub fn is_plain(&self) -> bool {
        *self == Self::data()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
