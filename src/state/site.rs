use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::errors::{SiteError, StoreError};
use crate::persistence::{Store, StoredMessage};

/// Visit counter and guestbook slot.
///
/// Each value has its own lock; a counter bump never waits on a message post.
/// A lock is held across the durable write and any callback run on success,
/// so writes of one kind are applied and announced in a single order.
pub struct SharedState {
    count: Mutex<u64>,
    message: Mutex<Option<StoredMessage>>,
    store: Arc<dyn Store>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedState {
    /// Seed the in-memory values from the store's latest records.
    ///
    /// No record yet means count 0 and no message.
    pub fn load(store: Arc<dyn Store>) -> Result<Self, StoreError> {
        let count = store.latest_count()?.unwrap_or(0);
        let message = store.latest_message()?;

        Ok(Self {
            count: Mutex::new(count),
            message: Mutex::new(message),
            store,
        })
    }

    pub fn read_count(&self) -> u64 {
        *lock(&self.count)
    }

    pub fn increment_count(&self) -> Result<u64, SiteError> {
        self.increment_count_then(|_| {})
    }

    /// Increment, persist, then run `on_change` with the new value before
    /// the lock is released.
    ///
    /// If the store rejects the write, the counter keeps its old value and
    /// `on_change` is not called.
    pub fn increment_count_then(&self, on_change: impl FnOnce(u64)) -> Result<u64, SiteError> {
        let mut count = lock(&self.count);
        let next = *count + 1;

        self.store.append_count(next)?;
        *count = next;

        on_change(next);
        Ok(next)
    }

    pub fn read_last_message(&self) -> Option<StoredMessage> {
        lock(&self.message).clone()
    }

    /// Rendered form of the last message, empty when nothing was posted yet.
    pub fn rendered_last_message(&self) -> String {
        self.read_last_message()
            .map(|m| m.render())
            .unwrap_or_default()
    }

    pub fn post_message(&self, text: impl Into<String>) -> Result<StoredMessage, SiteError> {
        self.post_message_then(text, |_| {})
    }

    /// Same contract as [`increment_count_then`](Self::increment_count_then),
    /// for the guestbook slot. Empty text is accepted.
    pub fn post_message_then(
        &self,
        text: impl Into<String>,
        on_change: impl FnOnce(&StoredMessage),
    ) -> Result<StoredMessage, SiteError> {
        let mut slot = lock(&self.message);
        let message = StoredMessage::now(text);

        self.store.append_message(&message)?;
        *slot = Some(message.clone());

        on_change(&message);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    /// Store whose writes always fail.
    struct BrokenStore;

    impl Store for BrokenStore {
        fn append_count(&self, _value: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }

        fn append_message(&self, _message: &StoredMessage) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }

        fn latest_count(&self) -> Result<Option<u64>, StoreError> {
            Ok(Some(10))
        }

        fn latest_message(&self) -> Result<Option<StoredMessage>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn starts_from_store_values() {
        let store = Arc::new(MemoryStore::new());
        store.append_count(41).unwrap();
        store.append_message(&StoredMessage::now("hey")).unwrap();

        let state = SharedState::load(store).unwrap();
        assert_eq!(state.read_count(), 41);
        assert_eq!(state.increment_count().unwrap(), 42);
        assert!(state.rendered_last_message().ends_with(": hey"));
    }

    #[test]
    fn empty_store_means_zero_and_no_message() {
        let state = SharedState::load(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(state.read_count(), 0);
        assert_eq!(state.read_last_message(), None);
        assert_eq!(state.rendered_last_message(), "");
    }

    #[test]
    fn concurrent_increments_lose_nothing() {
        let state = Arc::new(SharedState::load(Arc::new(MemoryStore::new())).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        state.increment_count().unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(state.read_count(), 2000);
    }

    #[test]
    fn failed_write_keeps_old_count_and_skips_callback() {
        let state = SharedState::load(Arc::new(BrokenStore)).unwrap();
        let mut called = false;

        let result = state.increment_count_then(|_| called = true);

        assert!(matches!(result, Err(SiteError::Persistence(_))));
        assert_eq!(state.read_count(), 10);
        assert!(!called);
    }

    #[test]
    fn failed_post_keeps_old_message() {
        let state = SharedState::load(Arc::new(BrokenStore)).unwrap();
        let mut called = false;

        let result = state.post_message_then("lost", |_| called = true);

        assert!(result.is_err());
        assert_eq!(state.read_last_message(), None);
        assert!(!called);
    }

    #[test]
    fn empty_message_is_accepted() {
        let state = SharedState::load(Arc::new(MemoryStore::new())).unwrap();
        let stored = state.post_message("").unwrap();
        assert_eq!(stored.text, "");
        assert_eq!(state.read_last_message(), Some(stored));
    }
}
