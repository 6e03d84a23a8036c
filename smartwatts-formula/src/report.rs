//! HWPC reports and the pure functions that project them into event groups
//! and feature vectors.
//!
//! Grounded in `src/smartwatts/handler/hwpc_report.py` of the original
//! `powerapi-ng/smartwatts-formula` implementation: `_gen_rapl_events_group`,
//! `_gen_msr_events_group`, `_gen_core_events_group` and
//! `_gen_agg_core_report_from_running_targets` become
//! [`gen_rapl`], [`gen_msr_avg`], [`gen_core`] and [`gen_agg_core`] below.

use std::time::{Duration, SystemTime};

use rustc_hash::FxHashMap;

use crate::error::ReportError;

/// Distinguished target name carrying the RAPL/MSR reference groups.
pub const GLOBAL_TARGET: &str = "all";

/// A bucket key. Wraps [`SystemTime`] so it can be used as a `BTreeMap` key
/// without exposing `std::time` details at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(SystemTime);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(SystemTime::now())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        Timestamp(t)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}

/// Event name -> numeric value. Ordering is imposed by the caller via
/// [`feature_vector`]; the map itself is insertion-order agnostic.
pub type EventGroup = FxHashMap<String, f64>;

/// cpu id -> event group, for one socket.
pub type CpuEvents = FxHashMap<u32, EventGroup>;

/// socket id -> cpu events.
pub type SocketEvents = FxHashMap<u32, CpuEvents>;

/// The three event groups an HWPC report may carry.
///
/// By convention only the `"all"` target carries `rapl` and `msr`;
/// per-target reports carry only `core`. A report may carry any subset.
#[derive(Debug, Clone, Default)]
pub struct Groups {
    pub rapl: Option<SocketEvents>,
    pub msr: Option<SocketEvents>,
    pub core: Option<SocketEvents>,
}

/// One HWPC report: all the events a sensor observed for one target at one timestamp.
#[derive(Debug, Clone)]
pub struct HwpcReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: String,
    pub groups: Groups,
    pub metadata: FxHashMap<String, String>,
}

impl HwpcReport {
    pub fn new(timestamp: Timestamp, sensor: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            timestamp,
            sensor: sensor.into(),
            target: target.into(),
            groups: Groups::default(),
            metadata: FxHashMap::default(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.target == GLOBAL_TARGET
    }
}

/// Sorts `events` by event name and emits the corresponding sequence of
/// values. This ordering is the feature-space contract between history
/// samples, fits and predictions: any change to it invalidates existing fits.
pub fn feature_vector(events: &EventGroup) -> Vec<f64> {
    let mut sorted: Vec<(&str, f64)> = events.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
    sorted.into_iter().map(|(_, v)| v).collect()
}

fn ignores_time_prefix(name: &str) -> bool {
    name.starts_with("time_")
}

fn first_cpu_events(events: &SocketEvents, socket: u32) -> Option<&EventGroup> {
    events.get(&socket).and_then(|cpus| {
        // Deterministic choice of "first" CPU: the one with the smallest id.
        cpus.iter().min_by_key(|(cpu_id, _)| **cpu_id).map(|(_, g)| g)
    })
}

/// Converts the raw RAPL energy counter of `global` into Watts for `rapl_event`.
///
/// `energy_watts = raw_counter * 2^-32 * (1000 / reports_frequency_ms)`.
pub fn gen_rapl(
    global: &HwpcReport,
    socket: u32,
    rapl_event: &str,
    reports_frequency: Duration,
) -> Result<EventGroup, ReportError> {
    let rapl = global.groups.rapl.as_ref().ok_or(ReportError::MissingGroup("rapl"))?;
    let cpu_events = first_cpu_events(rapl, socket).ok_or(ReportError::MissingGroup("rapl"))?;
    let raw = cpu_events
        .get(rapl_event)
        .copied()
        .ok_or_else(|| ReportError::MissingEvent(rapl_event.to_owned()))?;

    let reports_frequency_ms = reports_frequency.as_secs_f64() * 1000.0;
    let energy_watts = raw * 2f64.powi(-32) * (1000.0 / reports_frequency_ms);

    let mut group = EventGroup::default();
    group.insert(rapl_event.to_owned(), energy_watts);
    Ok(group)
}

/// Per-CPU average of each MSR event (APERF/MPERF/TSC, ...) over all CPUs of `socket`,
/// ignoring any event name starting with `"time_"`.
pub fn gen_msr_avg(global: &HwpcReport, socket: u32) -> Result<EventGroup, ReportError> {
    let msr = global.groups.msr.as_ref().ok_or(ReportError::MissingGroup("msr"))?;
    let cpus = msr.get(&socket).ok_or(ReportError::MissingGroup("msr"))?;

    let mut sums: EventGroup = EventGroup::default();
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();
    for events in cpus.values() {
        for (name, value) in events {
            if ignores_time_prefix(name) {
                continue;
            }
            *sums.entry(name.clone()).or_insert(0.0) += value;
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    let mut avg = EventGroup::default();
    for (name, sum) in sums {
        let count = counts[&name] as f64;
        avg.insert(name, sum / count);
    }
    Ok(avg)
}

/// Per-event sum over all CPUs of `socket` for `report`'s `core` group,
/// ignoring `"time_*"` events. Missing group/socket yields an empty group
/// rather than an error: a target with no core counters just contributes
/// a zero feature vector.
pub fn gen_core(report: &HwpcReport, socket: u32) -> EventGroup {
    let mut sums = EventGroup::default();
    let Some(core) = report.groups.core.as_ref() else {
        return sums;
    };
    let Some(cpus) = core.get(&socket) else {
        return sums;
    };
    for events in cpus.values() {
        for (name, value) in events {
            if ignores_time_prefix(name) {
                continue;
            }
            *sums.entry(name.clone()).or_insert(0.0) += value;
        }
    }
    sums
}

/// Per-event sum of [`gen_core`] across every running target, for `socket`.
pub fn gen_agg_core<'a>(targets: impl IntoIterator<Item = &'a HwpcReport>, socket: u32) -> EventGroup {
    let mut agg = EventGroup::default();
    for target in targets {
        for (name, value) in gen_core(target, socket) {
            *agg.entry(name).or_insert(0.0) += value;
        }
    }
    agg
}
