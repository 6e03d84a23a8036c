//! Output types produced by [`crate::engine::Engine`].
//!
//! Grounded in the `PowerReport`/`ControlReport`-style split the RAPL and
//! energy-attribution plugins use (`plugins/rapl/src/total.rs`,
//! `plugins/energy-attribution/src/formula/transform.rs`): one measurement
//! report per target, plus a separate diagnostic report describing the
//! formula's own internal state for the tick.

use rustc_hash::FxHashMap;

use crate::config::Scope;
use crate::report::Timestamp;

/// A metadata value attached to a report. Kept as a small closed enum rather
/// than `Box<dyn Any>`, the way alumet's `AttributeValue` does it, so
/// downstream consumers can match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Str(String),
    F64(f64),
    U64(u64),
    I64(i64),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_owned())
    }
}
impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::F64(v)
    }
}
impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        MetadataValue::U64(v)
    }
}
impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::U64(v as u64)
    }
}

pub type Metadata = FxHashMap<String, MetadataValue>;

/// A per-target (or global) power estimate for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: String,
    pub socket: u32,
    pub scope: Scope,
    pub power_w: f64,
    pub metadata: Metadata,
}

/// Diagnostic summary of the formula's internal state at one tick: the
/// selected frequency layer, the model it used, and whether it refit.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub socket: u32,
    pub scope: Scope,
    pub model_hash: String,
    pub package_frequency_mhz: u32,
    pub layer_frequency_mhz: u32,
    /// History length backing the model that produced this tick's estimates.
    pub samples: usize,
    /// Model generation id (`crate::model::PowerModel::generation`).
    pub id: u64,
    /// Instantaneous `|rapl_power - raw_global|` for this tick.
    pub error_w: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub refit_triggered: bool,
    pub metadata: Metadata,
}

/// Anything an [`crate::engine::Engine`] tick may emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Power(PowerReport),
    Formula(FormulaReport),
}

impl From<PowerReport> for Report {
    fn from(r: PowerReport) -> Self {
        Report::Power(r)
    }
}
impl From<FormulaReport> for Report {
    fn from(r: FormulaReport) -> Self {
        Report::Formula(r)
    }
}
