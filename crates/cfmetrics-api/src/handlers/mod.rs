pub mod collect;
pub mod health;
pub mod metrics;
pub mod snapshot;
