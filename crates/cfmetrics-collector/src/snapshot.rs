use std::sync::{Arc, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generation: u64,
    pub collected_at: DateTime<Utc>,
    pub instances_total: u32,
    pub instances_succeeded: u32,
    pub body: Bytes,
}

pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) -> bool {
        let snapshot = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(existing) = guard.as_ref()
            && existing.generation >= snapshot.generation
        {
            warn!(
                current = existing.generation,
                rejected = snapshot.generation,
                "refusing to publish stale snapshot"
            );
            return false;
        }

        *guard = Some(snapshot);
        true
    }

    pub fn generation(&self) -> Option<u64> {
        self.current().map(|snapshot| snapshot.generation)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
