use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::adapter::TutorAdapter;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CAPACITY: usize = 32;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct ParkedEntry {
    adapter: Arc<TutorAdapter>,
    deadline: Instant,
}

/// Holds tutor adapters for sessions whose client has disconnected but whose
/// session hasn't been explicitly ended, so a reconnect within the TTL can
/// reuse the live subprocess instead of paying spawn cost and losing the
/// backend's own short-term context.
///
/// All four operations take the single mutex and complete their mutation
/// under it; `reclaim` is a single lookup-and-remove so two callers racing
/// for the same session id can never both receive the adapter.
pub struct TutorRegistry {
    entries: Mutex<HashMap<String, ParkedEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl TutorRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    pub async fn park(&self, session_id: String, adapter: Arc<TutorAdapter>) {
        let deadline = Instant::now() + self.ttl;
        let mut entries = self.entries.lock().await;

        if entries.len() >= self.capacity && !entries.contains_key(&session_id) {
            if let Some(evict_id) = entries
                .iter()
                .min_by_key(|(_, e)| e.deadline)
                .map(|(id, _)| id.clone())
            {
                if let Some(evicted) = entries.remove(&evict_id) {
                    tracing::info!(session_id = %evict_id, "evicting parked tutor adapter at capacity");
                    evicted.adapter.end().await;
                }
            }
        }

        entries.insert(session_id, ParkedEntry { adapter, deadline });
    }

    pub async fn reclaim(&self, session_id: &str) -> Option<Arc<TutorAdapter>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(session_id)?;
        if entry.deadline < Instant::now() || !entry.adapter.is_alive() {
            tracing::info!(session_id, "parked tutor adapter expired before reclaim");
            drop(entries);
            entry.adapter.end().await;
            return None;
        }
        Some(entry.adapter)
    }

    pub async fn kill(&self, session_id: &str) {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(session_id)
        };
        if let Some(entry) = entry {
            entry.adapter.end().await;
        }
    }

    /// Removes and terminates every entry whose deadline has passed. Each
    /// termination is caught individually so one misbehaving adapter can't
    /// stop the rest of the sweep from running.
    pub async fn sweep(&self) {
        let expired: Vec<(String, Arc<TutorAdapter>)> = {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            let expired_ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.deadline < now)
                .map(|(id, _)| id.clone())
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| entries.remove(&id).map(|e| (id, e.adapter)))
                .collect()
        };

        for (session_id, adapter) in expired {
            // Each termination runs in its own task so a panic inside it
            // can't unwind through the sweep loop and stop the rest of the
            // batch from being processed.
            let result = tokio::spawn(async move { adapter.end().await }).await;
            if result.is_err() {
                tracing::error!(session_id, "tutor adapter termination panicked during sweep");
            } else {
                tracing::debug!(session_id, "swept expired parked tutor adapter");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for TutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `sweep` on a fixed interval for the life of the process, restarting
/// the loop if it ever exits unexpectedly (it shouldn't — `sweep` itself
/// already isolates per-adapter failures — but this is the outer backstop).
pub fn spawn_sweeper(registry: Arc<TutorRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let registry = Arc::clone(&registry);
            let result = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    registry.sweep().await;
                }
            })
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "tutor registry sweep loop exited, restarting");
            }
        }
    })
}

pub fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake_adapter(id: &str) -> Arc<TutorAdapter> {
        Arc::new(
            TutorAdapter::start(id.to_string(), PathBuf::from("/tmp"), "cat", &[])
                .expect("spawning `cat` as a stand-in backend should succeed"),
        )
    }

    #[tokio::test]
    async fn park_then_reclaim_round_trips() {
        let registry = TutorRegistry::new();
        let adapter = fake_adapter("0123456789abcdef");
        registry.park("0123456789abcdef".to_string(), adapter).await;
        assert_eq!(registry.len().await, 1);
        let reclaimed = registry.reclaim("0123456789abcdef").await;
        assert!(reclaimed.is_some());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn reclaim_is_a_single_pop_no_double_reclaim() {
        let registry = TutorRegistry::new();
        let adapter = fake_adapter("0123456789abcdef");
        registry.park("0123456789abcdef".to_string(), adapter).await;
        let first = registry.reclaim("0123456789abcdef").await;
        let second = registry.reclaim("0123456789abcdef").await;
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn reclaim_past_ttl_returns_none_and_terminates() {
        let registry = TutorRegistry::with_limits(Duration::from_millis(1), DEFAULT_CAPACITY);
        let adapter = fake_adapter("0123456789abcdef");
        registry.park("0123456789abcdef".to_string(), adapter).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reclaimed = registry.reclaim("0123456789abcdef").await;
        assert!(reclaimed.is_none());
    }

    #[tokio::test]
    async fn park_at_capacity_evicts_earliest_deadline() {
        let registry = TutorRegistry::with_limits(DEFAULT_TTL, 1);
        registry.park("0000000000000000".to_string(), fake_adapter("0000000000000000")).await;
        registry.park("1111111111111111".to_string(), fake_adapter("1111111111111111")).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.reclaim("0000000000000000").await.is_none());
        assert!(registry.reclaim("1111111111111111").await.is_some());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let registry = TutorRegistry::with_limits(Duration::from_millis(1), DEFAULT_CAPACITY);
        registry.park("0000000000000000".to_string(), fake_adapter("0000000000000000")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.sweep().await;
        assert_eq!(registry.len().await, 0);
    }
}
