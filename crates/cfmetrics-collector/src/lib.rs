pub mod aggregator;
pub mod relabel;
pub mod scheduler;
pub mod snapshot;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{Aggregator, AggregatorSettings, CollectionResult};
pub use relabel::relabel;
pub use scheduler::CollectionScheduler;
pub use snapshot::{Snapshot, SnapshotStore};
pub use stats::CollectorStats;
