use serde::{Deserialize, Serialize};

/// Tunables for the correlator. The library reads no file itself — this
/// struct just mirrors the shape an embedding binary deserializes from its
/// own configuration, with `#[serde(default = ...)]` per field so a partial
/// TOML fragment is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Maximum number of unmatched pending entries kept across all three
    /// join maps. `None` means unbounded (the default — matches §4.3/A1).
    #[serde(default = "default_pending_cap")]
    pub pending_cap: Option<usize>,

    /// Rendering-hint grace interval for the depth assigner, in
    /// nanoseconds. `0` means strict interval packing (default).
    #[serde(default = "default_depth_grace_ns")]
    pub depth_grace_ns: u64,

    /// Log level an embedding binary should configure `env_logger` with
    /// when this crate is the dominant source of log traffic.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            pending_cap: default_pending_cap(),
            depth_grace_ns: default_depth_grace_ns(),
            log_level: default_log_level(),
        }
    }
}

fn default_pending_cap() -> Option<usize> {
    None
}

fn default_depth_grace_ns() -> u64 {
    0
}

fn default_log_level() -> String {
    "info".to_string()
}
