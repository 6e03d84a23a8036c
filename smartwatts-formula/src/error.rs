//! Error taxonomy.
//!
//! Only construction-time errors ([`ConfigError`]) are meant to propagate out
//! of this crate. Everything that can go wrong while processing a stream —
//! a missing `"all"` target, a zero `MPERF`, an unfitted model, a rejected
//! fit — is recovered at tick granularity and never raised; see
//! [`crate::engine`] for where each of these is handled.

use thiserror::Error;

/// Refused at construction: the engine will not be built.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be at least 1, got {value}")]
    TooSmall { field: &'static str, value: usize },

    #[error("CPU topology yields an empty set of supported frequencies (ratio_min={ratio_min} > ratio_max={ratio_max})")]
    EmptyFrequencySet { ratio_min: u32, ratio_max: u32 },

    #[error("ratio_base ({ratio_base}) must be within [ratio_min, ratio_max] = [{ratio_min}, {ratio_max}]")]
    BaseRatioOutOfRange {
        ratio_min: u32,
        ratio_base: u32,
        ratio_max: u32,
    },
}

/// Failure to extract an event group or an event from a [`crate::report::HwpcReport`].
///
/// Recovered by the caller (the tick is skipped and logged); never propagated
/// past [`crate::engine::Engine::ingest`].
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("missing {0} group for this socket")]
    MissingGroup(&'static str),

    #[error("missing event {0:?} in group")]
    MissingEvent(String),

    #[error("division by zero while computing package frequency (MPERF == 0)")]
    ZeroMperf,
}

/// Failure to use a [`crate::model::PowerModel`].
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("power model has not been fitted yet")]
    NotFitted,

    #[error("feature vector has {got} components, model expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}
