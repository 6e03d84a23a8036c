//! A self-calibrating per-socket power estimation engine.
//!
//! SmartWatts turns a stream of Hardware Performance Counter (HWPC) reports
//! into, for every measurement tick, a [`PowerReport`](output::PowerReport)
//! per software target plus one diagnostic [`FormulaReport`](output::FormulaReport).
//! RAPL energy counters are only available per socket, not per target; this
//! crate closes that gap by fitting a per-frequency linear regression from
//! hardware events to RAPL power and attributing socket power to targets in
//! proportion to their share of the events that best predict it.
//!
//! One [`Engine`] exists per (scope, socket id) pair. Feeding it reports is
//! the only interaction surface: [`Engine::ingest`], [`Engine::flush`] and
//! [`Engine::shutdown`]. Everything else — transports, publication, actor
//! supervision, CLI/config-file parsing, Kubernetes metadata — is the job of
//! the surrounding application.

pub mod config;
pub mod elastic_net;
pub mod engine;
pub mod error;
pub mod history;
pub mod layer;
pub mod model;
pub mod output;
pub mod report;
pub mod tick;
pub mod topology;

pub use config::{EngineConfig, ErrorWindowMethod, Scope};
pub use engine::Engine;
pub use error::ConfigError;
pub use output::{FormulaReport, MetadataValue, PowerReport, Report};
pub use report::{CpuEvents, EventGroup, Groups, HwpcReport, SocketEvents, Timestamp, GLOBAL_TARGET};
pub use topology::CpuTopology;
