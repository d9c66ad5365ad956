//! Writer and display configuration

use serde::{Deserialize, Serialize};

/// Where log output goes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[non_exhaustive]
pub enum WriterConfig {
    /// Write to stderr
    #[default]
    Stderr,
    /// Write to stdout
    Stdout,
    /// Write to a file through a background worker
    #[cfg(feature = "file")]
    File {
        /// Log file; with rolling enabled this is the file name prefix
        path: std::path::PathBuf,
        #[serde(default)]
        rolling: Rolling,
    },
}

/// File rolling strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolling {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Display options shared by every format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show timestamps
    pub time: bool,
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show target module
    pub target: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Use ANSI colors
    pub colors: bool,
    /// Include the span list in JSON output
    pub span_list: bool,
    /// Put event fields at the top level of JSON output
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            source: cfg!(debug_assertions),
            target: true,
            thread_ids: false,
            colors: cfg!(feature = "ansi") && std::io::IsTerminal::is_terminal(&std::io::stderr()),
            span_list: true,
            flatten: true,
        }
    }
}

impl DisplayConfig {
    /// Apply `ROTATOR_LOG_TIME`, `ROTATOR_LOG_SOURCE` and `ROTATOR_LOG_COLORS`.
    pub(super) fn apply_vars(&mut self, var: &impl Fn(&str) -> Option<String>) {
        let flag = |name: &str| var(name).map(|v| v != "0" && !v.eq_ignore_ascii_case("false"));
        if let Some(on) = flag("ROTATOR_LOG_TIME") {
            self.time = on;
        }
        if let Some(on) = flag("ROTATOR_LOG_SOURCE") {
            self.source = on;
        }
        if let Some(on) = flag("ROTATOR_LOG_COLORS") {
            self.colors = on;
        }
    }
}
