use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Notify, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info};

use crate::aggregator::Aggregator;

#[derive(Clone)]
pub struct CollectionScheduler {
    aggregator: Arc<Aggregator>,
    interval: Duration,
    trigger: Arc<Notify>,
}

impl CollectionScheduler {
    pub fn new(aggregator: Arc<Aggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
            trigger: Arc::new(Notify::new()),
        }
    }

    pub fn trigger_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "collection scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    debug!("on-demand collection requested");
                    ticker.reset();
                }
                _ = shutdown.changed() => {
                    info!("collection scheduler shutting down");
                    break;
                }
            }

            if let Err(err) = self.aggregator.run_cycle().await {
                debug!(error = %err, "scheduled collection cycle ended without a snapshot");
            }
        }
    }
}
