//! Run configuration: cleaning bounds, coverage policy and unit conversion.
//!
//! Values come from an optional JSON file ([`ZonalConfigFile`]) merged with
//! command-line overrides, then validated into a [`ZonalConfig`]. Nothing is
//! read from process-wide state.

use std::{fs, path::Path};

use gridcover::CoveragePolicy;
use serde::{Deserialize, Serialize};

use crate::{error::{Result, ZonalError}, zonal::UnitConverter};

/// Bounds used by the cell-value cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Raw value marking a cell with no measurement.
    pub no_data_sentinel: f64,
    /// Largest raw value accepted as a real measurement (inclusive).
    pub max_valid_threshold: f64,
}

/// Validated configuration for one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalConfig {
    #[serde(flatten)]
    pub cleaner: CleanerConfig,
    pub coverage_policy: CoveragePolicy,
    /// Multiplier from the summed raster unit to the reported unit.
    pub conversion_factor: f64,
    /// Aggregate zones on the rayon worker pool.
    pub parallel: bool,
    /// Upper bound on cells decoded per raster read.
    pub max_window_cells: usize,
}

impl ZonalConfig {
    /// 16 Mi cells, i.e. 128 MiB of `f64` per band read.
    pub const DEFAULT_MAX_WINDOW_CELLS: usize = 1 << 24;

    pub fn new(no_data_sentinel: f64, max_valid_threshold: f64, conversion_factor: f64) -> Result<Self> {
        let config = Self {
            cleaner: CleanerConfig { no_data_sentinel, max_valid_threshold },
            coverage_policy: CoveragePolicy::default(),
            conversion_factor,
            parallel: true,
            max_window_cells: Self::DEFAULT_MAX_WINDOW_CELLS,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: CoveragePolicy) -> Self {
        self.coverage_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_window_cells(mut self, max_window_cells: usize) -> Self {
        self.max_window_cells = max_window_cells;
        self
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        ZonalConfigFile::read(path)?.resolve()
    }

    pub fn validate(&self) -> Result<()> {
        // A NaN sentinel is allowed: NaN cells are rejected by the cleaner anyway.
        if self.cleaner.no_data_sentinel.is_infinite() {
            return Err(invalid("no_data_sentinel must be finite"));
        }
        if !self.cleaner.max_valid_threshold.is_finite() {
            return Err(invalid("max_valid_threshold must be a finite number"));
        }
        if !self.conversion_factor.is_finite() {
            return Err(invalid("conversion_factor must be a finite number"));
        }
        if self.max_window_cells == 0 {
            return Err(invalid("max_window_cells must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ZonalError {
    ZonalError::InvalidConfiguration(msg.into())
}

/// Unvalidated configuration as it appears in a JSON file or on the command line.
///
/// ```json
/// {
///   "no_data_sentinel": 65535,
///   "max_valid_threshold": 173,
///   "coverage_policy": "center-in",
///   "pixel_area_m2": 900
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZonalConfigFile {
    pub no_data_sentinel: Option<f64>,
    pub max_valid_threshold: Option<f64>,
    pub coverage_policy: Option<CoveragePolicy>,
    pub conversion_factor: Option<f64>,
    /// Cell area in square metres; derives the CO2e-per-acre to carbon factor
    /// when `conversion_factor` is not given.
    pub pixel_area_m2: Option<f64>,
    pub parallel: Option<bool>,
    pub max_window_cells: Option<usize>,
}

impl ZonalConfigFile {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ZonalError::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|e| invalid(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| invalid(e.to_string()))
    }

    /// Fields set in `overrides` replace the ones in `self`.
    pub fn merge(self, overrides: ZonalConfigFile) -> Self {
        Self {
            no_data_sentinel: overrides.no_data_sentinel.or(self.no_data_sentinel),
            max_valid_threshold: overrides.max_valid_threshold.or(self.max_valid_threshold),
            coverage_policy: overrides.coverage_policy.or(self.coverage_policy),
            conversion_factor: overrides.conversion_factor.or(self.conversion_factor),
            pixel_area_m2: overrides.pixel_area_m2.or(self.pixel_area_m2),
            parallel: overrides.parallel.or(self.parallel),
            max_window_cells: overrides.max_window_cells.or(self.max_window_cells),
        }
    }

    pub fn resolve(&self) -> Result<ZonalConfig> {
        let no_data = self.no_data_sentinel.ok_or_else(|| invalid("missing no_data_sentinel"))?;
        let max_valid = self.max_valid_threshold.ok_or_else(|| invalid("missing max_valid_threshold"))?;
        let factor = match (self.conversion_factor, self.pixel_area_m2) {
            (Some(factor), _) => factor,
            (None, Some(area)) if area.is_finite() && area > 0.0 => {
                UnitConverter::co2e_per_acre_to_carbon(area).factor()
            }
            (None, Some(area)) => return Err(invalid(format!("pixel_area_m2 must be positive, got {area}"))),
            (None, None) => return Err(invalid("missing conversion_factor (or pixel_area_m2)")),
        };

        let config = ZonalConfig::new(no_data, max_valid, factor)?
            .with_policy(self.coverage_policy.unwrap_or_default())
            .with_parallel(self.parallel.unwrap_or(true))
            .with_max_window_cells(self.max_window_cells.unwrap_or(ZonalConfig::DEFAULT_MAX_WINDOW_CELLS));
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_complete_file() {
        let file = ZonalConfigFile::from_json_str(
            r#"{"no_data_sentinel": 65535, "max_valid_threshold": 173, "conversion_factor": 0.5, "coverage_policy": "all-touched"}"#,
        ).unwrap();
        let config = file.resolve().unwrap();
        assert_eq!(config.cleaner.no_data_sentinel, 65535.0);
        assert_eq!(config.cleaner.max_valid_threshold, 173.0);
        assert_eq!(config.conversion_factor, 0.5);
        assert_eq!(config.coverage_policy, CoveragePolicy::AllTouched);
        assert!(config.parallel);
    }

    #[test]
    fn policy_defaults_to_center_in() {
        let file = ZonalConfigFile {
            no_data_sentinel: Some(0.0),
            max_valid_threshold: Some(1.0),
            conversion_factor: Some(1.0),
            ..Default::default()
        };
        assert_eq!(file.resolve().unwrap().coverage_policy, CoveragePolicy::CenterIn);
    }

    #[test]
    fn factor_derived_from_pixel_area() {
        let file = ZonalConfigFile::from_json_str(
            r#"{"no_data_sentinel": 65535, "max_valid_threshold": 173, "pixel_area_m2": 900}"#,
        ).unwrap();
        let factor = file.resolve().unwrap().conversion_factor;
        assert!((factor - (900.0 / 4046.86) * (12.0 / 44.0)).abs() < 1e-12);
    }

    #[test]
    fn missing_fields_are_invalid() {
        for json in [
            r#"{"max_valid_threshold": 173, "conversion_factor": 1}"#,
            r#"{"no_data_sentinel": 65535, "conversion_factor": 1}"#,
            r#"{"no_data_sentinel": 65535, "max_valid_threshold": 173}"#,
        ] {
            let err = ZonalConfigFile::from_json_str(json).unwrap().resolve().unwrap_err();
            assert!(matches!(err, ZonalError::InvalidConfiguration(_)), "{json}");
        }
    }

    #[test]
    fn non_numeric_values_are_invalid() {
        let err = ZonalConfigFile::from_json_str(r#"{"no_data_sentinel": "lots"}"#).unwrap_err();
        assert!(matches!(err, ZonalError::InvalidConfiguration(_)));
    }

    #[test]
    fn unknown_keys_are_invalid() {
        let err = ZonalConfigFile::from_json_str(r#"{"nodata": 0}"#).unwrap_err();
        assert!(matches!(err, ZonalError::InvalidConfiguration(_)));
    }

    #[test]
    fn overrides_win_over_file() {
        let file = ZonalConfigFile { no_data_sentinel: Some(1.0), max_valid_threshold: Some(2.0), ..Default::default() };
        let cli = ZonalConfigFile { no_data_sentinel: Some(9.0), conversion_factor: Some(3.0), ..Default::default() };
        let merged = file.merge(cli);
        assert_eq!(merged.no_data_sentinel, Some(9.0));
        assert_eq!(merged.max_valid_threshold, Some(2.0));
        assert_eq!(merged.conversion_factor, Some(3.0));
    }

    #[test]
    fn zero_window_budget_is_invalid() {
        let config = ZonalConfig::new(0.0, 1.0, 1.0).unwrap().with_max_window_cells(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ZonalConfigFile::read(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ZonalError::FileNotFound(_)));
    }
}
