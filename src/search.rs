//! Debouncing for the table typeahead search.
//!
//! The query editor fires a search on every keystroke; to bound request
//! volume the plugin collapses calls arriving within the debounce window to
//! a single network call, with the most recent search text winning.
//! Superseded calls never reach the network.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::time::Duration;

/// The minimum quiet period before a search is allowed out.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Debounce state: the latest requested text plus a generation counter that
/// identifies the call currently allowed to fire.
#[derive(Debug)]
pub struct DebouncedSearch {
    window: Duration,
    generation: AtomicU64,
    latest: Mutex<String>,
}

impl Default for DebouncedSearch {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl DebouncedSearch {
    /// Create a debouncer with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: AtomicU64::new(0),
            latest: Mutex::new(String::new()),
        }
    }

    /// Wait out the debounce window.
    ///
    /// Returns the winning search text if no newer call arrived in the
    /// meantime, or `None` if this call was superseded and must not issue
    /// a request.
    pub async fn debounce(&self, text: &str) -> Option<String> {
        let generation = {
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            text.clone_into(&mut *latest);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        tokio::time::sleep(self.window).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return None;
        }
        Some(self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Debouncers keyed by datasource instance UID.
///
/// Debounce state is per datasource instance, so typeahead searches
/// against one datasource never supersede searches against another.
#[derive(Debug, Default)]
pub struct DebouncerRegistry {
    inner: Mutex<HashMap<String, Arc<DebouncedSearch>>>,
}

impl DebouncerRegistry {
    /// The debouncer for one datasource instance, created on first use.
    pub fn get(&self, uid: &str) -> Arc<DebouncedSearch> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(inner.entry(uid.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rapid_calls_collapse_to_the_last_text() {
        let search = DebouncedSearch::default();
        let calls = (0..10).map(|i| {
            let search = &search;
            async move { search.debounce(&format!("table{i}")).await }
        });
        let results = join_all(calls).await;
        let fired: Vec<_> = results.into_iter().flatten().collect();
        assert_eq!(fired, vec!["table9".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_outside_the_window_fire_separately() {
        let search = DebouncedSearch::default();
        assert_eq!(search.debounce("first").await.as_deref(), Some("first"));
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(search.debounce("second").await.as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_call_never_fires() {
        let search = DebouncedSearch::new(Duration::from_millis(500));
        let first = search.debounce("old");
        let second = async {
            // Arrives halfway through the first call's window.
            tokio::time::sleep(Duration::from_millis(250)).await;
            search.debounce("new").await
        };
        let (first, second) = futures::join!(first, second);
        assert_eq!(first, None);
        assert_eq!(second.as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn instances_debounce_independently() {
        let registry = DebouncerRegistry::default();
        let a = registry.get("uid-a");
        let b = registry.get("uid-b");
        // Concurrent searches against different datasources both fire.
        let (a_text, b_text) = futures::join!(a.debounce("alpha"), b.debounce("beta"));
        assert_eq!(a_text.as_deref(), Some("alpha"));
        assert_eq!(b_text.as_deref(), Some("beta"));
        // The same instance keeps sharing one debouncer.
        assert!(Arc::ptr_eq(&a, &registry.get("uid-a")));
    }
}
