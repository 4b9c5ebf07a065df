use crate::config::CleanerConfig;

/// Maps raw cell values to valid measurements.
///
/// A value is invalid when it equals the no-data sentinel, is not finite, or
/// exceeds the upper bound. The sentinel is checked first, so a sentinel above
/// the bound is still reported as no-data rather than clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellCleaner {
    no_data: f64,
    max_valid: f64,
}

impl CellCleaner {
    pub fn new(no_data: f64, max_valid: f64) -> Self {
        Self { no_data, max_valid }
    }

    #[inline]
    pub fn clean(&self, raw: f64) -> Option<f64> {
        if raw == self.no_data || !raw.is_finite() || raw > self.max_valid {
            None
        } else {
            Some(raw)
        }
    }
}

impl From<&CleanerConfig> for CellCleaner {
    fn from(config: &CleanerConfig) -> Self {
        Self::new(config.no_data_sentinel, config.max_valid_threshold)
    }
}
