/*!
 * Default Handler Configuration
 *
 * Runtime knobs for the built-in table, overridable from the environment
 */

use crate::core::limits::HUGEPAGE_THRESHOLD;
use crate::core::types::Size;

/// Configuration of the built-in `default_allocator` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultHandlerConfig {
    /// Park freed small blocks for reuse
    pub small_block_cache: bool,
    /// Advise the kernel to back large buffers (plain or zeroed) with hugepages
    pub madvise_hugepage: bool,
    /// Minimum allocation size, plain or zeroed, that gets hugepage advice
    pub hugepage_threshold: Size,
    /// Report every operation to the process-wide allocation tracker
    pub report_to_tracker: bool,
}

impl Default for DefaultHandlerConfig {
    fn default() -> Self {
        Self {
            small_block_cache: true,
            madvise_hugepage: cfg!(target_os = "linux"),
            hugepage_threshold: HUGEPAGE_THRESHOLD,
            report_to_tracker: true,
        }
    }
}

impl DefaultHandlerConfig {
    /// Plain pass-through to the platform allocator
    pub const fn passthrough() -> Self {
        Self {
            small_block_cache: false,
            madvise_hugepage: false,
            hugepage_threshold: HUGEPAGE_THRESHOLD,
            report_to_tracker: false,
        }
    }

    /// Defaults overridden by the environment
    ///
    /// Environment variables:
    /// - DATAMEM_SMALL_CACHE: small-block cache (default: 1)
    /// - DATAMEM_MADVISE_HUGEPAGE: hugepage advice (default: 1 on Linux)
    /// - DATAMEM_TRACK: tracker reporting (default: 1)
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("DATAMEM_SMALL_CACHE").and_then(|v| parse_flag(&v)) {
            self.small_block_cache = v;
        }
        if let Some(v) = lookup("DATAMEM_MADVISE_HUGEPAGE").and_then(|v| parse_flag(&v)) {
            self.madvise_hugepage = v && cfg!(target_os = "linux");
        }
        if let Some(v) = lookup("DATAMEM_TRACK").and_then(|v| parse_flag(&v)) {
            self.report_to_tracker = v;
        }
        self
    }

    pub fn with_small_block_cache(mut self, enabled: bool) -> Self {
        self.small_block_cache = enabled;
        self
    }

    pub fn with_hugepage(mut self, enabled: bool) -> Self {
        self.madvise_hugepage = enabled;
        self
    }

    pub fn with_hugepage_threshold(mut self, threshold: Size) -> Self {
        self.hugepage_threshold = threshold;
        self
    }

    pub fn with_tracker_reporting(mut self, enabled: bool) -> Self {
        self.report_to_tracker = enabled;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
