use crate::error::{Error, Result};

pub const MIN_TABLE_SIZE: usize = 512;
/// Allocation granularity: a region is 512 consecutive payload slots.
pub const REGION_SLOTS: usize = 512;

/// Every tunable named throughout the design, gathered into one value
/// validated up front by `create`, mirroring the constructor-validates-
/// then-allocates style this codebase's mmap-backed arenas already use.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub initial_size: usize,
    pub max_size: usize,
    /// Power-of-two indexing (`hash & (size-1)`) vs. modulo (`hash % size`).
    pub mask_mode: bool,
    /// Probe budget override. `None` derives `2*log2(table_size)` at `create` time.
    pub threshold: Option<usize>,
    /// Words per cache line for the bounded linear probe. 8 words * 8 bytes = 64-byte line.
    pub cache_line_words: usize,
    /// Advisory hint passed to the memory provider; ignored by providers that don't support it.
    pub numa_interleave_directory: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_size: MIN_TABLE_SIZE,
            max_size: 1 << 20,
            mask_mode: true,
            threshold: None,
            cache_line_words: 8,
            numa_interleave_directory: false,
        }
    }
}

impl TableConfig {
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size,
            max_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_size < MIN_TABLE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "initial_size {} is below the minimum of {}",
                self.initial_size, MIN_TABLE_SIZE
            )));
        }
        if self.initial_size > self.max_size {
            return Err(Error::InvalidConfig(format!(
                "initial_size {} exceeds max_size {}",
                self.initial_size, self.max_size
            )));
        }
        if self.mask_mode {
            if !self.initial_size.is_power_of_two() {
                return Err(Error::InvalidConfig(format!(
                    "mask_mode requires a power-of-two initial_size, got {}",
                    self.initial_size
                )));
            }
            if !self.max_size.is_power_of_two() {
                return Err(Error::InvalidConfig(format!(
                    "mask_mode requires a power-of-two max_size, got {}",
                    self.max_size
                )));
            }
        }
        if self.cache_line_words == 0 || !self.cache_line_words.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "cache_line_words must be a power of two, got {}",
                self.cache_line_words
            )));
        }
        Ok(())
    }

    /// Probe budget: the explicit override, or `2*log2(table_size)` derived
    /// from the *current* logical table size.
    pub fn threshold_for(&self, table_size: u64) -> usize {
        self.threshold.unwrap_or_else(|| {
            let bits = 64 - table_size.max(2).leading_zeros();
            (2 * bits as usize).max(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_below_minimum_size() {
        let cfg = TableConfig::new(16, 1024);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_in_mask_mode() {
        let mut cfg = TableConfig::new(600, 4096);
        cfg.mask_mode = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_modulo_mode_non_power_of_two() {
        let mut cfg = TableConfig::new(600, 4096);
        cfg.mask_mode = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_initial_over_max() {
        let cfg = TableConfig::new(4096, 2048);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_threshold_scales_with_log2() {
        let cfg = TableConfig::default();
        assert_eq!(cfg.threshold_for(512), 2 * 10);
        assert_eq!(cfg.threshold_for(1 << 20), 2 * 21);
    }
}
