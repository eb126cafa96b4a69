use std::{
    collections::btree_map::Entry,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use cfmetrics_common::{
    error::{ExporterError, Result},
    identity::IdentityContext,
};
use cfmetrics_exposition::{MetricFamilies, decode, encode};
use cfmetrics_platform::{AppInstances, InstanceFetcher, InstanceResolver};
use futures::{StreamExt, stream};
use tokio::time::{timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::{
    relabel::relabel,
    snapshot::{Snapshot, SnapshotStore},
    stats::CollectorStats,
};

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub app_guid: String,
    pub org_name: String,
    pub space_name: String,
    pub max_concurrent_fetches: usize,
    pub cycle_timeout: Duration,
    pub resolve_timeout: Duration,
}

impl AggregatorSettings {
    pub fn new(
        app_guid: impl Into<String>,
        org_name: impl Into<String>,
        space_name: impl Into<String>,
    ) -> Self {
        Self {
            app_guid: app_guid.into(),
            org_name: org_name.into(),
            space_name: space_name.into(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub generation: Option<u64>,
    pub app_name: String,
    pub instance_count: u32,
    pub succeeded: Vec<u32>,
    pub errors: Vec<(u32, ExporterError)>,
    pub conflicts: Vec<String>,
    pub duration: Duration,
}

pub struct Aggregator {
    resolver: Arc<dyn InstanceResolver>,
    fetcher: Arc<dyn InstanceFetcher>,
    store: Arc<SnapshotStore>,
    stats: Arc<CollectorStats>,
    settings: AggregatorSettings,
    generation: AtomicU64,
}

impl Aggregator {
    pub fn new(
        resolver: Arc<dyn InstanceResolver>,
        fetcher: Arc<dyn InstanceFetcher>,
        store: Arc<SnapshotStore>,
        stats: Arc<CollectorStats>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            store,
            stats,
            settings,
            generation: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> Arc<CollectorStats> {
        Arc::clone(&self.stats)
    }

    pub async fn run_cycle(&self) -> Result<CollectionResult> {
        let started = Instant::now();

        let app = match self.resolve().await {
            Ok(app) => app,
            Err(err) => {
                error!(
                    app_guid = %self.settings.app_guid,
                    error = %err,
                    "failed to resolve application instances"
                );
                self.stats.record_failure(&[], started.elapsed());
                return Err(err);
            }
        };
        debug!(
            app = %app.app_name,
            instances = app.instance_count,
            "resolved application instances"
        );

        let outcomes = self.fetch_all(&app).await;

        let mut succeeded = Vec::new();
        let mut errors = Vec::new();
        let mut collected = Vec::new();
        for (instance, outcome) in outcomes {
            match outcome {
                Ok(families) => {
                    succeeded.push(instance);
                    collected.push((instance, families));
                }
                Err(err) => {
                    warn!(
                        app = %app.app_name,
                        instance = err.instance(),
                        error = %err,
                        "instance metrics collection failed"
                    );
                    errors.push((instance, err));
                }
            }
        }

        if collected.is_empty() {
            let reason = if app.instance_count == 0 {
                format!("application {} reports no instances", app.app_name)
            } else {
                format!("all {} instances failed", app.instance_count)
            };
            error!(
                app = %app.app_name,
                %reason,
                "collection cycle failed, keeping previous snapshot"
            );
            self.stats.record_failure(&errors, started.elapsed());
            return Err(ExporterError::CycleFailed { reason });
        }

        let mut conflicts = Vec::new();
        let merged = merge(collected, &mut conflicts);
        let body = Bytes::from(encode(&merged));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let published = self.store.publish(Snapshot {
            generation,
            collected_at: cfmetrics_common::time::now(),
            instances_total: app.instance_count,
            instances_succeeded: succeeded.len() as u32,
            body,
        });

        let result = CollectionResult {
            generation: published.then_some(generation),
            app_name: app.app_name,
            instance_count: app.instance_count,
            succeeded,
            errors,
            conflicts,
            duration: started.elapsed(),
        };
        self.stats.record_success(&result);

        info!(
            generation,
            app = %result.app_name,
            instances = result.instance_count,
            succeeded = result.succeeded.len(),
            failed = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "collection cycle completed"
        );

        Ok(result)
    }

    async fn resolve(&self) -> Result<AppInstances> {
        let resolve_timeout = self.settings.resolve_timeout;
        match timeout(resolve_timeout, self.resolver.resolve(&self.settings.app_guid)).await {
            Ok(resolved) => resolved,
            Err(_) => Err(ExporterError::ResolveFailed(format!(
                "application {} not resolved within {}ms",
                self.settings.app_guid,
                resolve_timeout.as_millis()
            ))),
        }
    }

    async fn fetch_all(&self, app: &AppInstances) -> Vec<(u32, Result<MetricFamilies>)> {
        let deadline = tokio::time::Instant::now() + self.settings.cycle_timeout;

        let mut outcomes = stream::iter(0..app.instance_count)
            .map(|instance| self.collect_instance(&app.app_name, instance, deadline))
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect::<Vec<_>>()
            .await;

        outcomes.sort_by_key(|(instance, _)| *instance);
        outcomes
    }

    async fn collect_instance(
        &self,
        app_name: &str,
        instance: u32,
        deadline: tokio::time::Instant,
    ) -> (u32, Result<MetricFamilies>) {
        let identity = IdentityContext::new(
            self.settings.org_name.as_str(),
            self.settings.space_name.as_str(),
            app_name,
            &self.settings.app_guid,
            instance,
        );

        let fetch = self.fetcher.fetch(&self.settings.app_guid, instance);
        let fetched = timeout_at(deadline, fetch).await;
        let outcome = match fetched {
            Err(_) => Err(ExporterError::FetchFailed {
                instance,
                cause: "cycle deadline elapsed".to_string(),
            }),
            Ok(Err(err)) => Err(err),
            Ok(Ok(body)) => decode(&body)
                .map(|families| relabel(&families, &identity))
                .map_err(|err| ExporterError::ParseFailed {
                    instance,
                    cause: err.to_string(),
                }),
        };

        (instance, outcome)
    }
}

fn merge(per_instance: Vec<(u32, MetricFamilies)>, conflicts: &mut Vec<String>) -> MetricFamilies {
    let mut merged = MetricFamilies::new();

    for (instance, families) in per_instance {
        for (name, family) in families {
            match merged.entry(name) {
                Entry::Vacant(slot) => {
                    slot.insert(family);
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if existing.metric_type != family.metric_type {
                        warn!(
                            family = %existing.name,
                            instance,
                            expected = existing.metric_type.as_prometheus_type(),
                            found = family.metric_type.as_prometheus_type(),
                            "metric type differs across instances, dropping series"
                        );
                        if !conflicts.contains(&existing.name) {
                            conflicts.push(existing.name.clone());
                        }
                        continue;
                    }
                    if existing.help != family.help {
                        warn!(
                            family = %existing.name,
                            instance,
                            "help text differs across instances, keeping first"
                        );
                    }
                    existing.series.extend(family.series);
                }
            }
        }
    }

    merged
}
