//! Detection configuration.
//!
//! Layering follows file, then environment, then sanitization:
//! - `MILL_CONFIG` names the file when no explicit path is given (JSON, or TOML by extension)
//! - `MILL_PX_PER_MM` overrides the calibration scale
//! - invalid calibration or bins fall back to safe values and are reported as warnings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{MillError, Result};

const DEFAULT_PX_PER_MM: f64 = 1.0;
const DEFAULT_HOUGH_PARAM1: f64 = 50.0;
const DEFAULT_HOUGH_PARAM2: f64 = 20.0;
const DEFAULT_MIN_DIST_PX: f64 = 15.0;
const DEFAULT_MIN_CIRCULARITY: f64 = 0.65;

pub const ENV_CONFIG_PATH: &str = "MILL_CONFIG";
pub const ENV_PX_PER_MM: &str = "MILL_PX_PER_MM";

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    calibration: Option<CalibrationConfigFile>,
    vision: Option<VisionConfigFile>,
    bins_mm: Option<Vec<SizeBin>>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    px_per_mm: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    hough_param1: Option<f64>,
    hough_param2: Option<f64>,
    min_dist_px: Option<f64>,
    min_circularity: Option<f64>,
}

/// Half-open diameter interval `[min, max)` in millimeters mapped to a class label.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeBin {
    pub label: i32,
    pub min: f64,
    pub max: f64,
}

impl SizeBin {
    pub fn new(label: i32, min: f64, max: f64) -> Self {
        Self { label, min, max }
    }

    pub fn contains(&self, diameter_mm: f64) -> bool {
        self.min <= diameter_mm && diameter_mm < self.max
    }
}

/// Circle-detector tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisionSettings {
    /// Upper edge threshold for the pile detector (lower is half of it).
    pub hough_param1: f64,
    /// Accumulator votes required for a pile-detector center.
    pub hough_param2: f64,
    pub min_dist_px: f64,
    pub min_circularity: f64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            hough_param1: DEFAULT_HOUGH_PARAM1,
            hough_param2: DEFAULT_HOUGH_PARAM2,
            min_dist_px: DEFAULT_MIN_DIST_PX,
            min_circularity: DEFAULT_MIN_CIRCULARITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionConfig {
    pub px_per_mm: f64,
    pub vision: VisionSettings,
    /// Evaluated in configured order; the first matching bin wins.
    pub bins: Vec<SizeBin>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            px_per_mm: DEFAULT_PX_PER_MM,
            vision: VisionSettings::default(),
            bins: Vec::new(),
        }
    }
}

/// A configuration value that was replaced by a safe fallback.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigWarning {
    InvalidScale { value: f64 },
    InvalidBin { bin: SizeBin },
    NoBins,
    InvalidVision { field: &'static str, value: f64 },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScale { value } => write!(
                f,
                "px_per_mm {value} is not a positive number; using {DEFAULT_PX_PER_MM}"
            ),
            Self::InvalidBin { bin } => write!(
                f,
                "bin label {} has invalid bounds [{}, {}); ignoring it",
                bin.label, bin.min, bin.max
            ),
            Self::NoBins => write!(f, "no size bins configured; every detection will be dropped"),
            Self::InvalidVision { field, value } => {
                write!(f, "vision.{field} = {value} is invalid; using default")
            }
        }
    }
}

impl DetectionConfig {
    /// Load from `path`, or from `MILL_CONFIG`, or defaults; then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(ENV_CONFIG_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty());
        let file_cfg = match (path, env_path.as_deref()) {
            (Some(path), _) => read_config_file(path)?,
            (None, Some(env_path)) => read_config_file(Path::new(env_path))?,
            (None, None) => DetectionConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Parse a JSON document with the configuration schema.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: DetectionConfigFile = serde_json::from_str(raw)
            .map_err(|e| MillError::Config(format!("invalid JSON config: {e}")))?;
        Ok(Self::from_file(file))
    }

    /// Parse a TOML document with the configuration schema.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: DetectionConfigFile = toml::from_str(raw)
            .map_err(|e| MillError::Config(format!("invalid TOML config: {e}")))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: DetectionConfigFile) -> Self {
        let defaults = VisionSettings::default();
        let vision = file.vision.unwrap_or_default();
        Self {
            px_per_mm: file
                .calibration
                .and_then(|c| c.px_per_mm)
                .unwrap_or(DEFAULT_PX_PER_MM),
            vision: VisionSettings {
                hough_param1: vision.hough_param1.unwrap_or(defaults.hough_param1),
                hough_param2: vision.hough_param2.unwrap_or(defaults.hough_param2),
                min_dist_px: vision.min_dist_px.unwrap_or(defaults.min_dist_px),
                min_circularity: vision.min_circularity.unwrap_or(defaults.min_circularity),
            },
            bins: file.bins_mm.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_PX_PER_MM) {
            if !raw.trim().is_empty() {
                self.px_per_mm = raw.trim().parse().map_err(|_| {
                    MillError::Config(format!("{ENV_PX_PER_MM} must be a number, got '{raw}'"))
                })?;
            }
        }
        Ok(())
    }

    /// Replace invalid values with safe fallbacks. Never fails.
    pub fn sanitized(&self) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();
        let mut cfg = self.clone();

        if !(cfg.px_per_mm.is_finite() && cfg.px_per_mm > 0.0) {
            warnings.push(ConfigWarning::InvalidScale {
                value: cfg.px_per_mm,
            });
            cfg.px_per_mm = DEFAULT_PX_PER_MM;
        }

        let defaults = VisionSettings::default();
        let vision = &mut cfg.vision;
        for (field, value, fallback) in [
            ("hough_param1", &mut vision.hough_param1, defaults.hough_param1),
            ("hough_param2", &mut vision.hough_param2, defaults.hough_param2),
            ("min_dist_px", &mut vision.min_dist_px, defaults.min_dist_px),
        ] {
            if !(value.is_finite() && *value > 0.0) {
                warnings.push(ConfigWarning::InvalidVision {
                    field,
                    value: *value,
                });
                *value = fallback;
            }
        }
        if !(vision.min_circularity.is_finite() && vision.min_circularity >= 0.0) {
            warnings.push(ConfigWarning::InvalidVision {
                field: "min_circularity",
                value: vision.min_circularity,
            });
            vision.min_circularity = defaults.min_circularity;
        }

        cfg.bins.retain(|bin| {
            let valid = bin.min.is_finite() && bin.max.is_finite() && bin.min < bin.max;
            if !valid {
                warnings.push(ConfigWarning::InvalidBin { bin: *bin });
            }
            valid
        });
        if cfg.bins.is_empty() {
            warnings.push(ConfigWarning::NoBins);
        }

        (cfg, warnings)
    }
}

fn read_config_file(path: &Path) -> Result<DetectionConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        MillError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw)
            .map_err(|e| MillError::Config(format!("invalid config file {}: {}", path.display(), e)))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| MillError::Config(format!("invalid config file {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_schema_round_trips_into_config() {
        let cfg = DetectionConfig::from_json_str(
            r#"{
                "calibration": {"px_per_mm": 2.5},
                "vision": {"hough_param1": 60, "hough_param2": 25, "min_dist_px": 12, "min_circularity": 0.7},
                "bins_mm": [{"label": 4, "min": 3.0, "max": 5.0}, {"label": 6, "min": 5.0, "max": 7.0}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.px_per_mm, 2.5);
        assert_eq!(cfg.vision.hough_param1, 60.0);
        assert_eq!(cfg.vision.hough_param2, 25.0);
        assert_eq!(cfg.vision.min_dist_px, 12.0);
        assert_eq!(cfg.vision.min_circularity, 0.7);
        assert_eq!(cfg.bins, vec![SizeBin::new(4, 3.0, 5.0), SizeBin::new(6, 5.0, 7.0)]);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg = DetectionConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, DetectionConfig::default());
    }

    #[test]
    fn toml_is_accepted() {
        let cfg = DetectionConfig::from_toml_str(
            r#"
            [calibration]
            px_per_mm = 10.0

            [[bins_mm]]
            label = 8
            min = 7.0
            max = 9.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.px_per_mm, 10.0);
        assert_eq!(cfg.bins, vec![SizeBin::new(8, 7.0, 9.0)]);
    }

    #[test]
    fn sanitize_replaces_bad_scale_and_bins() {
        let cfg = DetectionConfig {
            px_per_mm: 0.0,
            bins: vec![SizeBin::new(1, 5.0, 3.0), SizeBin::new(2, 1.0, 2.0)],
            ..DetectionConfig::default()
        };
        let (clean, warnings) = cfg.sanitized();
        assert_eq!(clean.px_per_mm, 1.0);
        assert_eq!(clean.bins, vec![SizeBin::new(2, 1.0, 2.0)]);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], ConfigWarning::InvalidScale { .. }));
        assert!(matches!(warnings[1], ConfigWarning::InvalidBin { .. }));
    }

    #[test]
    fn sanitize_flags_empty_bins_and_bad_vision() {
        let mut cfg = DetectionConfig::default();
        cfg.vision.hough_param2 = -3.0;
        cfg.vision.min_circularity = f64::NAN;
        let (clean, warnings) = cfg.sanitized();
        assert_eq!(clean.vision.hough_param2, DEFAULT_HOUGH_PARAM2);
        assert_eq!(clean.vision.min_circularity, DEFAULT_MIN_CIRCULARITY);
        assert!(warnings.contains(&ConfigWarning::NoBins));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn bin_bounds_are_half_open() {
        let bin = SizeBin::new(4, 3.0, 5.0);
        assert!(bin.contains(3.0));
        assert!(bin.contains(4.999));
        assert!(!bin.contains(5.0));
        assert!(!bin.contains(2.999));
    }
}
