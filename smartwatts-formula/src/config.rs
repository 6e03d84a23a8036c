//! Per-engine configuration.
//!
//! One [`EngineConfig`] is shared by every (scope, socket) engine instance
//! built from the same sensor. It is plain data, deserializable with
//! `serde`/`toml` the way every alumet plugin config is, and is validated
//! eagerly by [`EngineConfig::validate`] — invalid configuration is a
//! construction-time [`ConfigError`](crate::error::ConfigError), never a
//! runtime surprise.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// RAPL domain being modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Cpu,
    Dram,
}

impl Scope {
    /// The RAPL reference event conventionally used for this scope.
    ///
    /// Several historical revisions of the original implementation mixed up
    /// `cpu-rapl-ref-event`/`dram-rapl-ref-event`; this crate keeps the two
    /// independent, with DRAM defaulting to `RAPL_ENERGY_DRAM`.
    pub fn default_rapl_event(self) -> &'static str {
        match self {
            Scope::Cpu => "RAPL_ENERGY_PKG",
            Scope::Dram => "RAPL_ENERGY_DRAM",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Cpu => "cpu",
            Scope::Dram => "dram",
        }
    }
}

/// Summarization method applied to the error history to decide whether to refit.
///
/// The window-summarized (default: median) error is specified here rather
/// than the instantaneous error used by earlier revisions, because a single
/// tick's spike should not trigger a refit on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorWindowMethod {
    #[default]
    Median,
    Mean,
}

/// Configuration of one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scope: Scope,

    /// Name of the reference RAPL counter. Defaults to [`Scope::default_rapl_event`].
    pub rapl_event: String,

    /// Denominator for the energy -> power conversion.
    #[serde(with = "humantime_serde")]
    pub reports_frequency: Duration,

    /// Watts; triggers a refit when the window-summarized error exceeds it.
    pub error_threshold_w: f64,

    /// Lower bound on history length before any fit is attempted.
    pub min_samples_required: usize,

    /// Capacity of the sample history.
    pub history_window_size: usize,

    /// Capacity of the error history.
    pub error_window_size: usize,

    #[serde(default)]
    pub error_window_method: ErrorWindowMethod,

    /// `false` => delay window of 5 ticks; `true` => 2 ticks.
    #[serde(default)]
    pub real_time_mode: bool,

    pub cpu_tdp_w: f64,
    pub cpu_base_clock_mhz: u32,
    pub ratio_min: u32,
    pub ratio_base: u32,
    pub ratio_max: u32,
}

impl EngineConfig {
    /// A config with the defaults the original implementation shipped with
    /// (`REPORT_FREQ`, `ERROR_THRESHOLD`, `MIN_SAMPLES_REQUIRED`,
    /// `HISTORY_WINDOW_SIZE`, `CPU_TDP`, `BASE_CLOCK`), for the given scope.
    pub fn defaults_for(scope: Scope) -> Self {
        Self {
            scope,
            rapl_event: scope.default_rapl_event().to_owned(),
            reports_frequency: Duration::from_millis(1000),
            error_threshold_w: 2.0,
            min_samples_required: 10,
            history_window_size: 60,
            error_window_size: 15,
            error_window_method: ErrorWindowMethod::Median,
            real_time_mode: false,
            cpu_tdp_w: 125.0,
            cpu_base_clock_mhz: 100,
            ratio_min: 4,
            ratio_base: 20,
            ratio_max: 42,
        }
    }

    /// Number of newer ticks that must be buffered before the oldest one is processed.
    pub fn delay_window(&self) -> usize {
        if self.real_time_mode { 2 } else { 5 }
    }

    /// Parses and validates a config from a TOML source string. The
    /// boundary most callers go through: reading a `[engine]` table out of
    /// an application-level config file.
    pub fn from_toml(src: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(src).context("failed to parse engine configuration")?;
        config.validate().context("invalid engine configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reports_frequency.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "reports_frequency",
                value: 0.0,
            });
        }
        if self.error_threshold_w <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "error_threshold_w",
                value: self.error_threshold_w,
            });
        }
        if self.cpu_tdp_w <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "cpu_tdp_w",
                value: self.cpu_tdp_w,
            });
        }
        if self.min_samples_required == 0 {
            return Err(ConfigError::TooSmall {
                field: "min_samples_required",
                value: 0,
            });
        }
        if self.history_window_size == 0 {
            return Err(ConfigError::TooSmall {
                field: "history_window_size",
                value: 0,
            });
        }
        if self.error_window_size == 0 {
            return Err(ConfigError::TooSmall {
                field: "error_window_size",
                value: 0,
            });
        }
        if self.ratio_min > self.ratio_max {
            return Err(ConfigError::EmptyFrequencySet {
                ratio_min: self.ratio_min,
                ratio_max: self.ratio_max,
            });
        }
        if self.ratio_base < self.ratio_min || self.ratio_base > self.ratio_max {
            return Err(ConfigError::BaseRatioOutOfRange {
                ratio_min: self.ratio_min,
                ratio_base: self.ratio_base,
                ratio_max: self.ratio_max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_rapl_event_is_per_scope() {
        assert_eq!(Scope::Cpu.default_rapl_event(), "RAPL_ENERGY_PKG");
        assert_eq!(Scope::Dram.default_rapl_event(), "RAPL_ENERGY_DRAM");
    }

    #[test]
    fn delay_window_depends_on_real_time_mode() {
        let mut cfg = EngineConfig::defaults_for(Scope::Cpu);
        assert_eq!(cfg.delay_window(), 5);
        cfg.real_time_mode = true;
        assert_eq!(cfg.delay_window(), 2);
    }

    #[test]
    fn rejects_non_positive_error_threshold() {
        let mut cfg = EngineConfig::defaults_for(Scope::Cpu);
        cfg.error_threshold_w = 0.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                field: "error_threshold_w",
                value: 0.0
            })
        );
    }

    #[test]
    fn rejects_empty_frequency_set() {
        let mut cfg = EngineConfig::defaults_for(Scope::Cpu);
        cfg.ratio_min = 50;
        cfg.ratio_max = 10;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyFrequencySet {
                ratio_min: 50,
                ratio_max: 10
            })
        );
    }

    #[test]
    fn deserializes_from_toml() {
        let toml_src = r#"
            scope = "cpu"
            rapl_event = "RAPL_ENERGY_PKG"
            reports_frequency = "1s"
            error_threshold_w = 2.0
            min_samples_required = 10
            history_window_size = 60
            error_window_size = 15
            error_window_method = "median"
            real_time_mode = false
            cpu_tdp_w = 125.0
            cpu_base_clock_mhz = 100
            ratio_min = 4
            ratio_base = 20
            ratio_max = 42
        "#;
        let cfg: EngineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.scope, Scope::Cpu);
        assert_eq!(cfg.reports_frequency, Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn from_toml_parses_and_validates() {
        let toml_src = r#"
            scope = "dram"
            rapl_event = "RAPL_ENERGY_DRAM"
            reports_frequency = "1s"
            error_threshold_w = 2.0
            min_samples_required = 10
            history_window_size = 60
            error_window_size = 15
            real_time_mode = true
            cpu_tdp_w = 125.0
            cpu_base_clock_mhz = 100
            ratio_min = 4
            ratio_base = 20
            ratio_max = 42
        "#;
        let cfg = EngineConfig::from_toml(toml_src).unwrap();
        assert_eq!(cfg.scope, Scope::Dram);
        assert_eq!(cfg.delay_window(), 2);
    }

    #[test]
    fn from_toml_rejects_invalid_configuration() {
        let toml_src = r#"
            scope = "cpu"
            rapl_event = "RAPL_ENERGY_PKG"
            reports_frequency = "1s"
            error_threshold_w = -1.0
            min_samples_required = 10
            history_window_size = 60
            error_window_size = 15
            cpu_tdp_w = 125.0
            cpu_base_clock_mhz = 100
            ratio_min = 4
            ratio_base = 20
            ratio_max = 42
        "#;
        assert!(EngineConfig::from_toml(toml_src).is_err());
    }
}
