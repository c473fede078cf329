//! Per-collection mutual exclusion.
//!
//! A sync and an eviction for the same collection never overlap. Waiting on
//! the lock coalesces concurrent syncs: the second caller runs after the
//! first has committed and then finds a fresh snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::CollectionId;

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<CollectionId, Weak<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn slot(&self, id: &CollectionId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.strong_count() > 0);
        if let Some(existing) = slots.get(id).and_then(Weak::upgrade) {
            return existing;
        }
        let slot = Arc::new(Mutex::new(()));
        slots.insert(id.clone(), Arc::downgrade(&slot));
        slot
    }

    /// Wait for exclusive access to `id`.
    pub(crate) async fn acquire(&self, id: &CollectionId) -> OwnedMutexGuard<()> {
        self.slot(id).await.lock_owned().await
    }

    /// Exclusive access to `id` if nobody holds it right now.
    pub(crate) async fn try_acquire(&self, id: &CollectionId) -> Option<OwnedMutexGuard<()>> {
        self.slot(id).await.try_lock_owned().ok()
    }

    pub(crate) async fn is_held(&self, id: &CollectionId) -> bool {
        self.try_acquire(id).await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CollectionKey;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::default();
        let id = CollectionId::for_key(&CollectionKey::new("T1"));

        let guard = locks.acquire(&id).await;
        assert!(locks.try_acquire(&id).await.is_none());
        drop(guard);
        assert!(locks.try_acquire(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let locks = KeyedLocks::default();
        let a = CollectionId::for_key(&CollectionKey::new("A"));
        let b = CollectionId::for_key(&CollectionKey::new("B"));

        let _a = locks.acquire(&a).await;
        assert!(locks.try_acquire(&b).await.is_some());
    }

    #[tokio::test]
    async fn test_released_slots_are_pruned() {
        let locks = KeyedLocks::default();
        for key in ["A", "B", "C"] {
            let _guard = locks.acquire(&CollectionId::for_key(&CollectionKey::new(key))).await;
        }
        let _held = locks.acquire(&CollectionId::for_key(&CollectionKey::new("D"))).await;
        assert_eq!(locks.slots.lock().await.len(), 1);
    }
}
