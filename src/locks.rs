//! Keyed mutual exclusion for long-running folder work.
//!
//! One mutex per normalized mounted-folder path. A second scan of the same
//! folder waits for the first; scans of different folders never contend.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default, Clone)]
pub struct ScanLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ScanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        self.with_all(&[key], f)
    }

    /// Run `f` while holding every lock in `keys`.
    ///
    /// Keys are deduplicated and taken in sorted order, so two callers with
    /// overlapping key sets cannot deadlock.
    pub fn with_all<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let slots: Vec<Arc<Mutex<()>>> = keys.iter().map(|k| self.slot(k)).collect();
        let _guards: Vec<_> = slots
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();
        f()
    }

    /// Number of distinct keys ever locked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
