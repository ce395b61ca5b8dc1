use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use nooterra_core::types::StreamId;

/// Per-stream write locks, keyed lazily. Holding a stream's lock for the
/// duration of validation + append is what guarantees monotonic
/// `prevChainHash` under concurrent writers (§4.2, §5).
#[derive(Default)]
pub struct StreamLocks {
    locks: RwLock<HashMap<StreamId, Arc<Mutex<()>>>>,
}

impl StreamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, stream_id: &StreamId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(stream_id) {
            return lock.clone();
        }
        let mut write = self.locks.write();
        write
            .entry(stream_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire `stream_id`'s lock, blocking the caller until available.
    /// Returns a guard that releases it on drop.
    pub fn acquire(&self, stream_id: &StreamId) -> StreamLockGuard {
        let lock = self.lock_for(stream_id);
        StreamLockGuard::new(lock)
    }
}

pub struct StreamLockGuard {
    lock: Arc<Mutex<()>>,
}

impl StreamLockGuard {
    fn new(lock: Arc<Mutex<()>>) -> Self {
        Self { lock }
    }

    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard: MutexGuard<'_, ()> = self.lock.lock();
        f()
    }
}
