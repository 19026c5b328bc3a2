//! Harness configuration.
//!
//! Loaded from TOML; every table has defaults, so an empty file (or no file)
//! describes a runnable harness: model reference vs fixed-point target over
//! a uniform distribution, exact comparison after flooring the reference.
//!
//! ```toml
//! [run]
//! default_count = 1000
//! workers = 1
//! timeout_ms = 5000
//!
//! [distribution]
//! seed = 42
//! integral = true
//!
//! [distribution.shape]
//! kind = "uniform"
//! low = 1.0
//! high = 500000.0
//!
//! [tolerance]
//! kind = "exact"
//! rounding = "floor"
//!
//! [curve]
//! alpha = 1000000
//! beta = 1
//! scale = 1000
//!
//! [reference]
//! engine = "model"
//!
//! [target]
//! engine = "process"
//! program = "/usr/local/bin/n2r-call"
//! args = ["--rpc", "http://127.0.0.1:8545"]
//! ```

use crate::adapter::{CurveParams, EngineSpec};
use crate::compare::{RoundingRule, TolerancePolicy};
use crate::error::{HarnessError, HarnessResult};
use crate::generator::DistributionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Sample count used when none is supplied.
pub const DEFAULT_SAMPLE_COUNT: i64 = 1000;

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Sample count when neither the CLI nor stdin supplies one.
    pub default_count: i64,
    /// Comparison threads.
    pub workers: usize,
    /// Per-call budget for the target engine, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_SAMPLE_COUNT,
            workers: 1,
            timeout_ms: None,
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Run-level settings.
    pub run: RunSettings,
    /// Input distribution.
    pub distribution: DistributionConfig,
    /// Equality rule.
    pub tolerance: TolerancePolicy,
    /// Coefficients for the built-in curve engines.
    pub curve: CurveParams,
    /// Trusted baseline engine.
    pub reference: EngineSpec,
    /// Engine under test.
    pub target: EngineSpec,
}

impl Default for HarnessConfig {
    // The fixed-point target truncates, so the real-valued reference is
    // floored before an exact comparison.
    fn default() -> Self {
        Self {
            run: RunSettings::default(),
            distribution: DistributionConfig::default(),
            tolerance: TolerancePolicy::exact().with_rounding(RoundingRule::Floor),
            curve: CurveParams::default(),
            reference: EngineSpec::Model,
            target: EngineSpec::FixedPoint,
        }
    }
}

impl HarnessConfig {
    /// Load and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> HarnessResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| HarnessError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| HarnessError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> HarnessResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Check every section.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.run.workers == 0 {
            return Err(HarnessError::invalid("run.workers must be at least 1"));
        }
        if self.run.timeout_ms == Some(0) {
            return Err(HarnessError::invalid("run.timeout_ms must be positive"));
        }
        self.distribution.validate()?;
        self.tolerance.validate()?;
        self.curve.validate()?;
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ToleranceKind;
    use crate::generator::DistributionKind;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run.default_count, 1000);
        assert_eq!(config.tolerance.rounding, RoundingRule::Floor);
        assert_eq!(config.reference, EngineSpec::Model);
        assert_eq!(config.target, EngineSpec::FixedPoint);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: HarnessConfig = toml::from_str("").unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_shipped_harness_toml_matches_defaults() {
        let config: HarnessConfig = toml::from_str(include_str!("../harness.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[run]
default_count = 250
workers = 2
timeout_ms = 1500

[distribution]
seed = 7
integral = false

[distribution.shape]
kind = "exponential"
lambda = 0.001

[tolerance]
kind = "relative"
epsilon = 1e-9
rounding = "nearest"

[target]
engine = "model"
"#
        )
        .unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.run.default_count, 250);
        assert_eq!(config.run.workers, 2);
        assert_eq!(config.run.timeout_ms, Some(1500));
        assert_eq!(config.distribution.seed, Some(7));
        assert!(!config.distribution.integral);
        assert_eq!(
            config.distribution.shape,
            DistributionKind::Exponential {
                lambda: 0.001,
                offset: 0.0
            }
        );
        assert_eq!(config.tolerance.kind, ToleranceKind::Relative);
        assert_eq!(config.tolerance.rounding, RoundingRule::Nearest);
        assert_eq!(config.target, EngineSpec::Model);
        // untouched sections keep defaults
        assert_eq!(config.curve, CurveParams::default());
        assert_eq!(config.reference, EngineSpec::Model);
    }

    #[test]
    fn test_process_engine_section() {
        let config: HarnessConfig = toml::from_str(
            r#"
[target]
engine = "process"
program = "/usr/local/bin/n2r-call"
args = ["--rpc", "http://127.0.0.1:8545"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.target,
            EngineSpec::Process {
                program: PathBuf::from("/usr/local/bin/n2r-call"),
                args: vec!["--rpc".to_string(), "http://127.0.0.1:8545".to_string()],
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[distribution.shape]\nkind = \"uniform\"\nlow = 5.0\nhigh = 1.0\n").unwrap();
        let err = HarnessConfig::load(file.path()).unwrap_err();
        assert!(err.is_invalid_configuration());

        let mut config = HarnessConfig::default();
        config.run.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[run\nworkers = ").unwrap();
        match HarnessConfig::load(file.path()) {
            Err(HarnessError::ConfigParse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = HarnessConfig::load("/nonexistent/harness.toml").unwrap_err();
        assert!(matches!(err, HarnessError::ConfigLoad { .. }));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = HarnessConfig::default();
        config.distribution.seed = Some(11);
        config.run.timeout_ms = Some(250);
        let rendered = config.to_toml().unwrap();
        let parsed: HarnessConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
