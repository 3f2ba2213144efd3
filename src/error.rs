//! Error Module - Registry Error Types
//!
//! There is exactly one condition the registry reports to its callers:
//! allocation failure while (re)building the descriptor table, which is fatal
//! to the registry (no partial or degraded mode exists). Invariant violations
//! caused by collaborators — unregistering a frametable that was never
//! registered, using the global registry before `init` — are programming
//! errors and trap immediately via panics instead of surfacing as `Err`.

use thiserror::Error;

/// Main error type for all registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Out of memory - slot-array allocation failed
    ///
    /// **When returned:** Allocating the descriptor table's slot array during
    /// initial construction or a capacity-growth rebuild failed.
    ///
    /// **Recovery strategy:** None within the registry; the embedding runtime
    /// must treat this as a fatal out-of-memory condition.
    #[error("out of memory: failed to allocate a descriptor table of {requested} slots")]
    OutOfMemory { requested: usize },

    /// Configuration error
    ///
    /// **When returned:** A [`RegistryConfig`](crate::config::RegistryConfig)
    /// failed validation before the registry was built.
    ///
    /// **Recovery strategy:** Fix the configuration; nothing was constructed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RegistryError {
    /// Check if this error indicates a bug in the embedding runtime
    pub fn is_bug(&self) -> bool {
        matches!(self, RegistryError::Configuration(_))
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
