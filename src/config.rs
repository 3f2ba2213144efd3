//! Configuration Module - Registry Tuning Parameters

use crate::error::{RegistryError, Result};

/// Configuration for a [`FrameRegistry`](crate::registry::FrameRegistry)
///
/// # Examples
///
/// ```rust
/// use frame_registry::RegistryConfig;
///
/// let config = RegistryConfig::default();
/// assert!(config.validate().is_ok());
///
/// let config = RegistryConfig { min_capacity: 256 };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Smallest slot-array capacity the registry will allocate.
    ///
    /// Must be a power of two and at least 4. The table keeps
    /// `record_count * 2 <= capacity`, so a larger floor avoids early
    /// rebuilds for embedders that know their record count up front.
    ///
    /// Default: 4
    pub min_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { min_capacity: 4 }
    }
}

impl RegistryConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.min_capacity < 4 || !self.min_capacity.is_power_of_two() {
            return Err(RegistryError::Configuration(format!(
                "min_capacity must be a power of two >= 4, got {}",
                self.min_capacity
            )));
        }
        Ok(())
    }
}
