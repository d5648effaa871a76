use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::floating_type_mod::FT;

#[derive(Clone, Debug)]
pub struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}

impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }

    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Counter<FT> {
    pub fn avg(&self) -> FT {
        if self.values.is_empty() {
            return 0.;
        }
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }

    pub fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::INFINITY, FT::min)
    }

    pub fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::NEG_INFINITY, FT::max)
    }
}

impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    pub fn avg(&self) -> Duration {
        if self.values.is_empty() {
            return Duration::ZERO;
        }
        self.sum() / self.values.len() as u32
    }

    pub fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

/// Per-step samples of scalar quantities, e.g. the maximum particle speed.
#[derive(Debug)]
pub struct ValueCounters {
    counters: BTreeMap<String, Counter<FT>>,
    enabled: bool,
}

impl ValueCounters {
    pub fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: BTreeMap::new(),
            enabled,
        }
    }

    pub fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Counter<FT>> {
        self.counters.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Counter<FT>)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/**
 * Wall clock time of the solver stages. Every `begin(id)` has to be matched by an `end(id)`.
 */
#[derive(Debug)]
pub struct PerformanceCounters {
    counters: BTreeMap<String, Counter<Duration>>,
    enabled: bool,
}

impl PerformanceCounters {
    pub fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: BTreeMap::new(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    pub fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            } else {
                debug_assert!(false, "performance counter `{}` ended without begin", id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Counter<Duration>> {
        self.counters.get(id)
    }

    /// Counters sorted by label.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Counter<Duration>)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counters_record_nothing() {
        let mut pcounters = PerformanceCounters::new(false);
        pcounters.begin("grid-update");
        pcounters.end("grid-update");
        assert!(pcounters.get("grid-update").is_none());

        let mut vcounters = ValueCounters::new(false);
        vcounters.add_value("max-speed", 1.);
        assert!(vcounters.get("max-speed").is_none());
    }

    #[test]
    fn performance_counters_collect_one_sample_per_stage_run() {
        let mut pcounters = PerformanceCounters::new(true);
        for _ in 0..3 {
            pcounters.begin("force-update");
            pcounters.end("force-update");
        }
        pcounters.begin("integrate");
        pcounters.end("integrate");

        assert_eq!(pcounters.get("force-update").map(|c| c.len()), Some(3));
        let labels: Vec<&str> = pcounters.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["force-update", "integrate"]);
    }

    #[test]
    fn value_counter_statistics() {
        let mut vcounters = ValueCounters::new(true);
        for v in [2., 4., 9.] {
            vcounters.add_value("max-speed", v);
        }
        let counter = vcounters.get("max-speed").unwrap();
        assert_eq!(counter.min(), 2.);
        assert_eq!(counter.max(), 9.);
        assert_eq!(counter.avg(), 5.);
    }
}
