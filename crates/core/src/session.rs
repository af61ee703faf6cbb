use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Cooperative cancellation flag checked between ingest chunks. Cloning
/// shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Session-scoped slot holding the current dataset (or dataset+index
/// bundle). Readers take immutable snapshots; an upload publishes a fully
/// built replacement atomically, so no partially-visible state is observed
/// and the old value drops once the last snapshot goes away.
#[derive(Debug, Default)]
pub struct SessionSlot<T> {
    current: RwLock<Option<Arc<T>>>,
}

impl<T> SessionSlot<T> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn publish(&self, value: T) -> Arc<T> {
        let arc = Arc::new(value);
        *self.current.write() = Some(arc.clone());
        arc
    }

    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_replacement() {
        let slot = SessionSlot::new();
        let first = slot.publish(1u32);
        slot.publish(2u32);
        assert_eq!(*first, 1);
        assert_eq!(*slot.snapshot().unwrap(), 2);
    }

    #[test]
    fn clear_empties_the_slot() {
        let slot = SessionSlot::new();
        slot.publish("data".to_string());
        slot.clear();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
