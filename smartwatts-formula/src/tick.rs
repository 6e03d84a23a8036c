//! The tick buffer: absorbs out-of-order arrivals by delaying processing of
//! the oldest tick until enough newer ticks have been seen.
//!
//! Grounded in `HwPCReportHandler.handle`/`_process_oldest_tick` of
//! `src/smartwatts/handler/hwpc_report.py`, which keeps an
//! `OrderedDict[datetime, Dict[str, HWPCReport]]` and pops the oldest entry
//! once more than `5` ticks are buffered. `BTreeMap::pop_first` gives the
//! same "oldest timestamp first" behavior without depending on insertion
//! order.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::report::{HwpcReport, Timestamp};

/// All reports received for one timestamp, keyed by target name.
pub type TickReports = FxHashMap<String, HwpcReport>;

pub struct TickBuffer {
    ticks: BTreeMap<Timestamp, TickReports>,
    delay_window: usize,
}

impl TickBuffer {
    pub fn new(delay_window: usize) -> Self {
        Self {
            ticks: BTreeMap::new(),
            delay_window,
        }
    }

    /// Number of ticks currently buffered.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Inserts `report` under its timestamp and target, overwriting any
    /// report previously stored for the same (timestamp, target) pair.
    pub fn ingest(&mut self, report: HwpcReport) {
        self.ticks
            .entry(report.timestamp)
            .or_default()
            .insert(report.target.clone(), report);
    }

    /// Pops and returns the oldest tick if more than `delay_window` ticks are
    /// buffered. Call in a loop: more than one tick may become ready at once.
    pub fn pop_ready(&mut self) -> Option<(Timestamp, TickReports)> {
        if self.ticks.len() > self.delay_window {
            self.ticks.pop_first()
        } else {
            None
        }
    }

    /// Pops every buffered tick, oldest first, regardless of the delay window.
    pub fn drain_all(&mut self) -> Vec<(Timestamp, TickReports)> {
        std::mem::take(&mut self.ticks).into_iter().collect()
    }
}
