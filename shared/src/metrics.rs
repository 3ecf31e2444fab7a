//! Metrics sink handed to each component at construction time.
//!
//! Components never talk to a process-wide recorder. The binary builds one
//! recorder (statsd in production) and passes a `Metrics` handle down; tests
//! pass a `CapturingRecorder` and read the recorded values back.

use crate::metrics_defs::{MetricDef, MetricType};
use ::metrics::{
    Counter, CounterFn, Gauge, Histogram, HistogramFn, Key, KeyName, Label, Level, Metadata,
    NoopRecorder, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
pub struct Metrics {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl Metrics {
    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Metrics {
            recorder: Arc::new(recorder),
        }
    }

    pub fn from_arc(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Metrics { recorder }
    }

    /// A handle that discards everything.
    pub fn noop() -> Self {
        Metrics::new(NoopRecorder)
    }

    /// Registers descriptions for a component's metric definitions.
    pub fn describe(&self, defs: &[MetricDef]) {
        for def in defs {
            let description = SharedString::from(def.description);
            match def.metric_type {
                MetricType::Counter => {
                    self.recorder
                        .describe_counter(KeyName::from(def.name), None, description)
                }
                MetricType::Histogram => self.recorder.describe_histogram(
                    KeyName::from(def.name),
                    Some(Unit::Seconds),
                    description,
                ),
            }
        }
    }

    pub fn counter(&self, def: &MetricDef, labels: &[(&'static str, &str)]) -> Counter {
        debug_assert_eq!(
            def.metric_type,
            MetricType::Counter,
            "{} is not a {}",
            def.name,
            MetricType::Counter.as_str()
        );
        self.recorder
            .register_counter(&metric_key(def, labels), &metadata())
    }

    pub fn histogram(&self, def: &MetricDef, labels: &[(&'static str, &str)]) -> Histogram {
        debug_assert_eq!(
            def.metric_type,
            MetricType::Histogram,
            "{} is not a {}",
            def.name,
            MetricType::Histogram.as_str()
        );
        self.recorder
            .register_histogram(&metric_key(def, labels), &metadata())
    }
}

fn metric_key(def: &MetricDef, labels: &[(&'static str, &str)]) -> Key {
    debug_assert!(
        labels.iter().map(|(key, _)| *key).eq(def.labels.iter().copied()),
        "{} expects labels {:?}",
        def.name,
        def.labels
    );
    let labels: Vec<Label> = labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.to_string()))
        .collect();
    Key::from_parts(def.name, labels)
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

struct CapturedCounter(AtomicU64);

impl CounterFn for CapturedCounter {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

struct CapturedHistogram(Mutex<Vec<f64>>);

impl HistogramFn for CapturedHistogram {
    fn record(&self, value: f64) {
        self.0.lock().push(value);
    }
}

/// In-process recorder that keeps every counter and histogram sample so they
/// can be asserted on. Cloning shares the underlying storage.
#[derive(Clone, Default)]
pub struct CapturingRecorder {
    counters: Arc<Mutex<HashMap<Key, Arc<CapturedCounter>>>>,
    histograms: Arc<Mutex<HashMap<Key, Arc<CapturedHistogram>>>>,
}

impl CapturingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Metrics {
        Metrics::new(self.clone())
    }

    pub fn counter_value(&self, def: &MetricDef, labels: &[(&'static str, &str)]) -> u64 {
        self.counters
            .lock()
            .get(&metric_key(def, labels))
            .map(|counter| counter.0.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn histogram_samples(&self, def: &MetricDef, labels: &[(&'static str, &str)]) -> Vec<f64> {
        self.histograms
            .lock()
            .get(&metric_key(def, labels))
            .map(|histogram| histogram.0.lock().clone())
            .unwrap_or_default()
    }

    /// Total of a counter across every label combination.
    pub fn counter_total(&self, def: &MetricDef) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(key, _)| key.name() == def.name)
            .map(|(_, counter)| counter.0.load(Ordering::Relaxed))
            .sum()
    }

    /// Number of samples of a histogram across every label combination.
    pub fn histogram_count(&self, def: &MetricDef) -> usize {
        self.histograms
            .lock()
            .iter()
            .filter(|(key, _)| key.name() == def.name)
            .map(|(_, histogram)| histogram.0.lock().len())
            .sum()
    }
}

impl Recorder for CapturingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let counter = self
            .counters
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CapturedCounter(AtomicU64::new(0))))
            .clone();
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let histogram = self
            .histograms
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CapturedHistogram(Mutex::new(Vec::new()))))
            .clone();
        Histogram::from_arc(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTS: MetricDef = MetricDef {
        name: "test.requests",
        metric_type: MetricType::Counter,
        description: "Requests",
        labels: &["result"],
    };

    const LATENCY: MetricDef = MetricDef {
        name: "test.latency",
        metric_type: MetricType::Histogram,
        description: "Latency",
        labels: &["op"],
    };

    #[test]
    fn test_capturing_recorder_counts_per_label_set() {
        let recorder = CapturingRecorder::new();
        let metrics = recorder.handle();

        metrics.counter(&REQUESTS, &[("result", "ok")]).increment(1);
        metrics.counter(&REQUESTS, &[("result", "ok")]).increment(2);
        metrics.counter(&REQUESTS, &[("result", "err")]).increment(1);

        assert_eq!(recorder.counter_value(&REQUESTS, &[("result", "ok")]), 3);
        assert_eq!(recorder.counter_value(&REQUESTS, &[("result", "err")]), 1);
        assert_eq!(recorder.counter_value(&REQUESTS, &[("result", "other")]), 0);
        assert_eq!(recorder.counter_total(&REQUESTS), 4);
    }

    #[test]
    fn test_capturing_recorder_histograms() {
        let recorder = CapturingRecorder::new();
        let metrics = recorder.handle();

        metrics.histogram(&LATENCY, &[("op", "a")]).record(0.5);
        metrics.histogram(&LATENCY, &[("op", "b")]).record(1.5);

        assert_eq!(recorder.histogram_samples(&LATENCY, &[("op", "a")]), vec![0.5]);
        assert_eq!(recorder.histogram_count(&LATENCY), 2);
    }

    #[test]
    fn test_noop_handle_accepts_everything() {
        let metrics = Metrics::noop();
        metrics.describe(&[REQUESTS, LATENCY]);
        metrics.counter(&REQUESTS, &[("result", "ok")]).increment(1);
        metrics.histogram(&LATENCY, &[("op", "a")]).record(1.0);
    }
}
