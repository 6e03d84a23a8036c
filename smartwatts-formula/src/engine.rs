//! The engine facade: one instance per (scope, socket) pair.
//!
//! `ingest`/`flush`/`shutdown` are the only entry points, mirroring the
//! narrow `Transform::apply` surface the teacher's pipeline elements expose
//! (`core/alumet/src/pipeline/elements/transform/interface.rs`). Everything
//! below `process_tick` implements the 12-step estimation pipeline, grounded
//! line-for-line against `_process_oldest_tick` in
//! `src/smartwatts/handler/hwpc_report.py` (original_source).

use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::config::{EngineConfig, Scope};
use crate::error::ConfigError;
use crate::layer::FrequencyLayer;
use crate::output::{FormulaReport, MetadataValue, PowerReport, Report};
use crate::report::{self, EventGroup, HwpcReport, Timestamp, GLOBAL_TARGET};
use crate::tick::{TickBuffer, TickReports};
use crate::topology::CpuTopology;

pub struct Engine {
    sensor: String,
    socket: u32,
    scope: Scope,
    topology: CpuTopology,
    config: EngineConfig,
    layers: BTreeMap<u32, FrequencyLayer>,
    ticks: TickBuffer,
}

impl Engine {
    pub fn new(sensor: impl Into<String>, socket: u32, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let topology = CpuTopology::from_config(&config);
        let mut layers = BTreeMap::new();
        for frequency_mhz in topology.supported_frequencies() {
            layers.insert(
                frequency_mhz,
                FrequencyLayer::new(frequency_mhz, config.history_window_size, config.error_window_size),
            );
        }
        let delay_window = config.delay_window();
        Ok(Self {
            sensor: sensor.into(),
            socket,
            scope: config.scope,
            topology,
            config,
            layers,
            ticks: TickBuffer::new(delay_window),
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn socket(&self) -> u32 {
        self.socket
    }

    /// Number of ticks currently buffered, awaiting the delay window to pass.
    pub fn pending_ticks(&self) -> usize {
        self.ticks.len()
    }

    /// Buffers `report` and processes every tick that becomes ready as a
    /// result. Usually returns zero or one tick's worth of reports; can
    /// return more if several ticks become ready in a row.
    pub fn ingest(&mut self, report: HwpcReport) -> Vec<Report> {
        self.ticks.ingest(report);
        let mut out = Vec::new();
        while let Some((timestamp, reports)) = self.ticks.pop_ready() {
            out.extend(self.process_tick(timestamp, reports));
        }
        out
    }

    /// Processes every buffered tick in timestamp order without waiting for
    /// the delay window, without discarding them. Use between bursts of
    /// input when latency matters more than delay-window robustness.
    pub fn flush(&mut self) -> Vec<Report> {
        let mut out = Vec::new();
        for (timestamp, reports) in self.ticks.drain_all() {
            out.extend(self.process_tick(timestamp, reports));
        }
        out
    }

    /// Drains and processes every remaining buffered tick, in timestamp
    /// order. Identical to [`Self::flush`]; kept as a distinct name for the
    /// caller's shutdown path.
    pub fn shutdown(&mut self) -> Vec<Report> {
        self.flush()
    }

    /// The layer with the greatest frequency key `<=` `package_frequency_mhz`,
    /// or the lowest layer if none qualifies.
    fn nearest_layer_key(&self, package_frequency_mhz: u32) -> u32 {
        self.layers
            .range(..=package_frequency_mhz)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or_else(|| *self.layers.keys().next().expect("topology yields at least one layer"))
    }

    fn process_tick(&mut self, timestamp: Timestamp, mut reports: TickReports) -> Vec<Report> {
        let mut out = Vec::new();

        // Step 1: split off the "all" target.
        let Some(global) = reports.remove(GLOBAL_TARGET) else {
            warn!(
                "socket {} scope {:?}: tick {timestamp:?} has no {GLOBAL_TARGET:?} target, dropping",
                self.socket, self.scope
            );
            return out;
        };

        // Step 2-3: RAPL reference report, always emitted when `global` is present.
        let rapl = match report::gen_rapl(&global, self.socket, &self.config.rapl_event, self.config.reports_frequency) {
            Ok(rapl) => rapl,
            Err(err) => {
                warn!("socket {} scope {:?}: {err}, dropping tick", self.socket, self.scope);
                return out;
            }
        };
        let rapl_power = rapl[&self.config.rapl_event];
        out.push(
            PowerReport {
                timestamp,
                sensor: self.sensor.clone(),
                target: "rapl".to_owned(),
                socket: self.socket,
                scope: self.scope,
                power_w: rapl_power,
                metadata: build_metadata(self.scope, self.socket, &self.config.rapl_event, rapl_power, 1.0, &global),
            }
            .into(),
        );

        if reports.is_empty() {
            return out;
        }

        // Step 4: package frequency from the MSR average group.
        let avg_msr = match report::gen_msr_avg(&global, self.socket) {
            Ok(avg) => avg,
            Err(err) => {
                warn!("socket {} scope {:?}: {err}, dropping tick after RAPL report", self.socket, self.scope);
                return out;
            }
        };
        let Some(package_frequency_mhz) = package_frequency(&avg_msr, self.topology.base_frequency()) else {
            warn!(
                "socket {} scope {:?}: MPERF == 0, dropping tick after RAPL report",
                self.socket, self.scope
            );
            return out;
        };

        // Step 5: nearest-layer-at-or-below selection.
        let layer_frequency_mhz = self.nearest_layer_key(package_frequency_mhz);
        trace!(
            "socket {} scope {:?}: pkg_freq={package_frequency_mhz}MHz -> layer={layer_frequency_mhz}MHz",
            self.socket, self.scope
        );

        // Step 6: aggregate core events across every currently-running target.
        let global_core = report::gen_agg_core(reports.values(), self.socket);
        let xg = report::feature_vector(&global_core);

        let layer = self.layers.get_mut(&layer_frequency_mhz).expect("key came from self.layers");

        // Step 7: predict the socket-wide power from the aggregate feature vector.
        let raw_global = match layer.model.predict(&xg) {
            Ok(v) => v,
            Err(_) => {
                debug!(
                    "socket {} scope {:?}: layer {layer_frequency_mhz}MHz not fitted yet, feeding a calibration sample",
                    self.socket, self.scope
                );
                layer.store_sample(rapl_power, xg);
                layer.update_model(0.0, self.topology.tdp_w, self.config.min_samples_required);
                return out;
            }
        };

        // Step 8: emit the model's own socket-wide estimate.
        out.push(
            PowerReport {
                timestamp,
                sensor: self.sensor.clone(),
                target: "global".to_owned(),
                socket: self.socket,
                scope: self.scope,
                power_w: raw_global,
                metadata: build_metadata(self.scope, self.socket, layer.model.hash(), raw_global, 1.0, &global),
            }
            .into(),
        );

        // Step 9: per-target attribution, deterministic ascending target-name order.
        let mut target_names: Vec<&String> = reports.keys().collect();
        target_names.sort();
        for name in target_names {
            let r = &reports[name];
            let xt = report::feature_vector(&report::gen_core(r, self.socket));
            let raw_t = match layer.model.predict(&xt) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let (power, ratio) = layer.model.cap(raw_t, raw_global);
            out.push(
                PowerReport {
                    timestamp,
                    sensor: self.sensor.clone(),
                    target: name.clone(),
                    socket: self.socket,
                    scope: self.scope,
                    power_w: power,
                    metadata: build_metadata(self.scope, self.socket, layer.model.hash(), raw_t, ratio, r),
                }
                .into(),
            );
        }

        // Step 10: feed this tick's calibration sample and error.
        let error_w = (rapl_power - raw_global).abs();
        layer.store_sample(rapl_power, xg);
        layer.store_error(error_w);

        // Step 11: window-smoothed refit gate.
        let error_summary = layer.errors.summary(self.config.error_window_method);
        let refit_triggered = error_summary > self.config.error_threshold_w;
        if refit_triggered {
            layer.update_model(0.0, self.topology.tdp_w, self.config.min_samples_required);
        }

        // Step 12: one diagnostic report for the tick.
        out.push(
            FormulaReport {
                timestamp,
                sensor: self.sensor.clone(),
                socket: self.socket,
                scope: self.scope,
                model_hash: layer.model.hash().to_owned(),
                package_frequency_mhz,
                layer_frequency_mhz,
                samples: layer.samples.len(),
                id: layer.model.generation(),
                error_w,
                intercept: layer.model.intercept(),
                coefficients: layer.model.coefficients().to_vec(),
                refit_triggered,
                metadata: build_metadata(self.scope, self.socket, layer.model.hash(), raw_global, 1.0, &global),
            }
            .into(),
        );

        out
    }
}

/// Builds a report's metadata map: the source report's own metadata,
/// passed through unchanged, plus the fields every `PowerReport`/
/// `FormulaReport` carries per `spec.md` §6.
///
/// A free function rather than an `&self` method: callers hold a `&mut
/// FrequencyLayer` borrowed from `self.layers` at the point they need this,
/// and a `&self` method would conflict with that borrow.
fn build_metadata(scope: Scope, socket: u32, formula: &str, predict: f64, ratio: f64, source: &HwpcReport) -> crate::output::Metadata {
    let mut metadata: crate::output::Metadata = source
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), MetadataValue::Str(v.clone())))
        .collect();
    metadata.insert("scope".to_owned(), MetadataValue::Str(scope.as_str().to_owned()));
    metadata.insert("socket".to_owned(), MetadataValue::from(socket));
    metadata.insert("formula".to_owned(), MetadataValue::Str(formula.to_owned()));
    metadata.insert("predict".to_owned(), MetadataValue::from(predict));
    metadata.insert("ratio".to_owned(), MetadataValue::from(ratio));
    metadata
}

/// `floor(base_freq * APERF / MPERF)`. `None` if `MPERF == 0`.
fn package_frequency(avg_msr: &EventGroup, base_frequency_mhz: u32) -> Option<u32> {
    let aperf = avg_msr.get("APERF").copied().unwrap_or(0.0);
    let mperf = avg_msr.get("MPERF").copied().unwrap_or(0.0);
    if mperf == 0.0 {
        return None;
    }
    Some((base_frequency_mhz as f64 * aperf / mperf).floor() as u32)
}
