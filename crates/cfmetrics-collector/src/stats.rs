use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::Duration,
};

use cfmetrics_common::error::ExporterError;
use cfmetrics_exposition::{
    MetricFamilies, MetricFamily, MetricSeries, MetricType, MetricValue, encode,
};

use crate::aggregator::CollectionResult;

#[derive(Default)]
pub struct CollectorStats {
    cycles_succeeded: AtomicU64,
    cycles_failed: AtomicU64,
    fetch_failures: AtomicU64,
    parse_failures: AtomicU64,
    family_conflicts: AtomicU64,
    last_cycle_duration_ms: AtomicU64,
    last_success_unix_ms: AtomicI64,
    last_generation: AtomicU64,
    instances_resolved: AtomicU64,
    instances_collected: AtomicU64,
    scrapes: AtomicU64,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, result: &CollectionResult) {
        self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_instance_errors(&result.errors);
        self.family_conflicts
            .fetch_add(result.conflicts.len() as u64, Ordering::Relaxed);
        self.record_duration(result.duration);
        self.instances_resolved
            .store(u64::from(result.instance_count), Ordering::Relaxed);
        self.instances_collected
            .store(result.succeeded.len() as u64, Ordering::Relaxed);
        if let Some(generation) = result.generation {
            self.last_generation.store(generation, Ordering::Relaxed);
        }
        self.last_success_unix_ms
            .store(cfmetrics_common::time::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_failure(&self, errors: &[(u32, ExporterError)], duration: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.record_instance_errors(errors);
        self.record_duration(duration);
        self.instances_collected.store(0, Ordering::Relaxed);
    }

    pub fn record_scrape(&self) {
        self.scrapes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_succeeded(&self) -> u64 {
        self.cycles_succeeded.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn scrapes(&self) -> u64 {
        self.scrapes.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut families = MetricFamilies::new();
        let mut add = |family: MetricFamily| {
            families.insert(family.name.clone(), family);
        };

        add(MetricFamily::new(
            "cfmetrics_collection_cycles_total",
            "Completed collection cycles by outcome.",
            MetricType::Counter,
        )
        .with_series(outcome_series("success", self.cycles_succeeded()))
        .with_series(outcome_series("failure", self.cycles_failed())));

        add(MetricFamily::new(
            "cfmetrics_instance_failures_total",
            "Per-instance collection failures by kind.",
            MetricType::Counter,
        )
        .with_series(kind_series("fetch", self.fetch_failures.load(Ordering::Relaxed)))
        .with_series(kind_series("parse", self.parse_failures.load(Ordering::Relaxed))));

        add(counter(
            "cfmetrics_family_conflicts_total",
            "Metric families dropped from an instance because their type disagreed with another instance.",
            self.family_conflicts.load(Ordering::Relaxed),
        ));
        add(gauge(
            "cfmetrics_last_cycle_duration_seconds",
            "Duration of the most recent collection cycle.",
            self.last_cycle_duration_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        ));
        add(gauge(
            "cfmetrics_last_success_timestamp_seconds",
            "Unix time of the most recent published snapshot.",
            self.last_success_unix_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        ));
        add(gauge(
            "cfmetrics_snapshot_generation",
            "Generation of the most recent published snapshot.",
            self.last_generation.load(Ordering::Relaxed) as f64,
        ));
        add(gauge(
            "cfmetrics_instances_resolved",
            "Instance count reported by the platform in the last successful cycle.",
            self.instances_resolved.load(Ordering::Relaxed) as f64,
        ));
        add(gauge(
            "cfmetrics_instances_collected",
            "Instances whose metrics made it into the last cycle.",
            self.instances_collected.load(Ordering::Relaxed) as f64,
        ));
        add(counter(
            "cfmetrics_scrapes_total",
            "Snapshot scrapes served.",
            self.scrapes(),
        ));

        encode(&families)
    }

    fn record_instance_errors(&self, errors: &[(u32, ExporterError)]) {
        for (_, err) in errors {
            let counter = match err.kind() {
                "parse" => &self.parse_failures,
                _ => &self.fetch_failures,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_duration(&self, duration: Duration) {
        self.last_cycle_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }
}

fn outcome_series(outcome: &str, value: u64) -> MetricSeries {
    MetricSeries::new(
        vec![("outcome".to_string(), outcome.to_string())],
        MetricValue::Counter(value as f64),
    )
}

fn kind_series(kind: &str, value: u64) -> MetricSeries {
    MetricSeries::new(
        vec![("kind".to_string(), kind.to_string())],
        MetricValue::Counter(value as f64),
    )
}

fn counter(name: &str, help: &str, value: u64) -> MetricFamily {
    MetricFamily::new(name, help, MetricType::Counter)
        .with_series(MetricSeries::new(Vec::new(), MetricValue::Counter(value as f64)))
}

fn gauge(name: &str, help: &str, value: f64) -> MetricFamily {
    MetricFamily::new(name, help, MetricType::Gauge)
        .with_series(MetricSeries::new(Vec::new(), MetricValue::Gauge(value)))
}
