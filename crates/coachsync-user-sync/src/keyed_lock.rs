//! Per-key async locks for inbound deliveries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per key. An entry lives only while a caller holds or
/// waits on it.
#[derive(Debug, Default)]
pub(crate) struct KeyedLock {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLock {
    /// Waits until no other caller holds `key`.
    pub(crate) async fn lock(&self, key: String) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyGuard {
            owner: self,
            key,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a key until dropped.
pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyedLock,
    key: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard are the only holders: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_key_waits_for_the_holder() {
        // Arrange
        let locks = KeyedLock::default();
        let first = locks.lock("evt-1".into()).await;

        // Act
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.lock("evt-1".into())).await;
        drop(first);
        let acquired = tokio::time::timeout(Duration::from_millis(20), locks.lock("evt-1".into())).await;

        // Assert
        assert!(blocked.is_err());
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_other_keys_do_not_block() {
        // Arrange
        let locks = KeyedLock::default();
        let _first = locks.lock("evt-1".into()).await;

        // Act
        let other = tokio::time::timeout(Duration::from_millis(20), locks.lock("evt-2".into())).await;

        // Assert
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        // Arrange
        let locks = KeyedLock::default();

        // Act
        drop(locks.lock("evt-1".into()).await);
        drop(locks.lock("evt-2".into()).await);

        // Assert
        assert_eq!(locks.len(), 0);
    }
}
