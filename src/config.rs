//! Engine configuration.
//!
//! Everything the pipeline needs to know about the collector's naming scheme
//! lives in [`Conventions`]; [`EngineConfig`] adds the knobs that change how a
//! tick is built. `EngineConfig::from_env()` reads the same settings from the
//! environment:
//!
//! - `HEAPSCOPE_STRATEGY` = `computed` | `trust` (default `computed`)
//! - `HEAPSCOPE_LAYOUT_HINTS` = `0|1|true|false|on|off|yes|no` (default on)
//! - `HEAPSCOPE_WALK_LIST` (default `allchunks`)
//! - `HEAPSCOPE_WALK_HEAD` (default `allchunkshead`)
//! - `HEAPSCOPE_CACHED_MARKER` (default `tcache`)

use std::{env, fmt, str::FromStr};

use serde::Serialize;

pub const DEFAULT_WALK_LIST: &str = "allchunks";
pub const DEFAULT_WALK_HEAD: &str = "allchunkshead";
pub const DEFAULT_CACHED_MARKER: &str = "tcache";
/// Cached lists link through the data area, which starts after the
/// `prev_size` and `size` words.
pub const DEFAULT_CACHED_OFFSET: u64 = 16;

/// How walk entries are sorted into "allocated" and "free".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStrategy {
    /// Cross-reference every walk entry against every free-list entry.
    #[default]
    Computed,
    /// Believe the collector's per-chunk `allocated` flag. Entries that don't
    /// carry one are matched as in [`ReconcileStrategy::Computed`].
    Trust,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown reconcile strategy {0:?} (expected `computed` or `trust`)")]
    UnknownStrategy(String),
    #[error("{var}: expected a boolean, got {value:?}")]
    NotABool {
        var: &'static str,
        value: String,
    },
}

impl FromStr for ReconcileStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "computed" | "compute" => Ok(Self::Computed),
            "trust" | "trusted" => Ok(Self::Trust),
            _ => Err(ConfigError::UnknownStrategy(s.to_owned())),
        }
    }
}

impl fmt::Display for ReconcileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Computed => "computed",
            Self::Trust => "trust",
        })
    }
}

/// The collector's reserved names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conventions {
    /// The list holding the unfiltered walk of every chunk on the heap
    pub walk_list: String,
    /// The head that belongs to `walk_list`; consumed, never displayed
    pub walk_head: String,
    /// Any list whose name contains this is a cached (tcache-style) list
    pub cached_marker: String,
    /// How far past the chunk start a cached list's recorded addresses sit
    pub cached_offset: u64,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            walk_list: DEFAULT_WALK_LIST.to_owned(),
            walk_head: DEFAULT_WALK_HEAD.to_owned(),
            cached_marker: DEFAULT_CACHED_MARKER.to_owned(),
            cached_offset: DEFAULT_CACHED_OFFSET,
        }
    }
}

impl Conventions {
    pub fn is_walk_list(&self, list: &str) -> bool {
        list == self.walk_list
    }

    /// Test if `list` uses the cached-list addressing (offset matching and
    /// `fdPtr`-anchored incoming edges).
    pub fn is_cached(&self, list: &str) -> bool {
        !self.cached_marker.is_empty() && list.contains(&self.cached_marker)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub strategy: ReconcileStrategy,
    /// Emit invisible edges grouping same-size allocated chunks
    pub layout_hints: bool,
    pub conventions: Conventions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: ReconcileStrategy::Computed,
            layout_hints: true,
            conventions: Conventions::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by whatever `HEAPSCOPE_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("HEAPSCOPE_STRATEGY") {
            config.strategy = v.parse()?;
        }
        if let Some(v) = lookup("HEAPSCOPE_LAYOUT_HINTS") {
            config.layout_hints = parse_bool("HEAPSCOPE_LAYOUT_HINTS", &v)?;
        }
        if let Some(v) = lookup("HEAPSCOPE_WALK_LIST") {
            config.conventions.walk_list = v;
        }
        if let Some(v) = lookup("HEAPSCOPE_WALK_HEAD") {
            config.conventions.walk_head = v;
        }
        if let Some(v) = lookup("HEAPSCOPE_CACHED_MARKER") {
            config.conventions.cached_marker = v;
        }
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_layout_hints(mut self, layout_hints: bool) -> Self {
        self.layout_hints = layout_hints;
        self
    }

    pub fn with_conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::NotABool {
            var,
            value: value.to_owned(),
        }),
    }
}
