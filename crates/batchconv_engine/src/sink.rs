use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use batchconv_core::{Observers, SinkKey, Subscription};

/// Addressable text store that publishes in-progress and finished output.
///
/// Every `set` replaces the full text under the key.
pub trait Sink: Send + Sync {
    fn set(&self, key: &SinkKey, text: String);
    fn clear(&self, key: &SinkKey);
    /// Stored text, or an empty string when the key is absent.
    fn get(&self, key: &SinkKey) -> String;
}

/// In-memory sink; observers receive the changed key after each write.
#[derive(Default)]
pub struct MemorySink {
    store: Mutex<HashMap<SinkKey, String>>,
    observers: Observers<SinkKey>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SinkKey) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn contains(&self, key: &SinkKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<SinkKey> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SinkKey, String>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sink for MemorySink {
    fn set(&self, key: &SinkKey, text: String) {
        self.lock().insert(key.clone(), text);
        self.observers.notify(key);
    }

    fn clear(&self, key: &SinkKey) {
        self.lock().remove(key);
        self.observers.notify(key);
    }

    fn get(&self, key: &SinkKey) -> String {
        self.lock().get(key).cloned().unwrap_or_default()
    }
}
