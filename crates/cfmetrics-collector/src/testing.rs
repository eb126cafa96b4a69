use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use cfmetrics_common::error::{ExporterError, Result};
use cfmetrics_platform::{AppInstances, InstanceFetcher, InstanceResolver};

use crate::{
    aggregator::{Aggregator, AggregatorSettings},
    snapshot::SnapshotStore,
    stats::CollectorStats,
};

#[derive(Clone, Copy)]
pub(crate) enum ResolveBehavior {
    Instances(u32),
    Fail,
    Hang,
}

pub(crate) struct FakeResolver {
    behavior: Mutex<ResolveBehavior>,
}

impl FakeResolver {
    pub(crate) fn instances(count: u32) -> Arc<Self> {
        Self::with_behavior(ResolveBehavior::Instances(count))
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::with_behavior(ResolveBehavior::Fail)
    }

    fn with_behavior(behavior: ResolveBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
        })
    }

    pub(crate) fn set_behavior(&self, behavior: ResolveBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

#[async_trait]
impl InstanceResolver for FakeResolver {
    async fn resolve(&self, app_guid: &str) -> Result<AppInstances> {
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            ResolveBehavior::Instances(instance_count) => Ok(AppInstances {
                instance_count,
                app_name: "orders-api".to_string(),
            }),
            ResolveBehavior::Fail => Err(ExporterError::ResolveFailed(format!(
                "platform api unreachable while resolving {app_guid}"
            ))),
            ResolveBehavior::Hang => std::future::pending().await,
        }
    }
}

pub(crate) enum FetchBehavior {
    Body(String),
    Delayed(Duration, String),
    Fail,
    Hang,
}

type BehaviorFn = Box<dyn Fn(u32) -> FetchBehavior + Send + Sync>;

pub(crate) struct FakeFetcher {
    behavior: Mutex<BehaviorFn>,
    attempts: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn new<F>(behavior: F) -> Arc<Self>
    where
        F: Fn(u32) -> FetchBehavior + Send + Sync + 'static,
    {
        Arc::new(Self {
            behavior: Mutex::new(Box::new(behavior)),
            attempts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set_behavior<F>(&self, behavior: F)
    where
        F: Fn(u32) -> FetchBehavior + Send + Sync + 'static,
    {
        *self.behavior.lock().unwrap() = Box::new(behavior);
    }

    pub(crate) fn attempts(&self) -> Vec<u32> {
        let mut attempts = self.attempts.lock().unwrap().clone();
        attempts.sort_unstable();
        attempts
    }
}

#[async_trait]
impl InstanceFetcher for FakeFetcher {
    async fn fetch(&self, _app_guid: &str, instance: u32) -> Result<Bytes> {
        self.attempts.lock().unwrap().push(instance);
        let behavior = (self.behavior.lock().unwrap())(instance);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let outcome = match behavior {
            FetchBehavior::Body(body) => Ok(Bytes::from(body)),
            FetchBehavior::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(Bytes::from(body))
            }
            FetchBehavior::Fail => Err(ExporterError::FetchFailed {
                instance,
                cause: "connection refused".to_string(),
            }),
            FetchBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExporterError::FetchFailed {
                    instance,
                    cause: "hung".to_string(),
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub(crate) fn aggregator_with(
    resolver: Arc<FakeResolver>,
    fetcher: Arc<FakeFetcher>,
    settings: AggregatorSettings,
) -> Aggregator {
    Aggregator::new(
        resolver,
        fetcher,
        Arc::new(SnapshotStore::new()),
        Arc::new(CollectorStats::new()),
        settings,
    )
}
