use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::atomic::write_json_atomic;
use crate::error::StoreError;
use crate::paths::counters_file_path;
use crate::paths::validate_problem_id;

/// Per-problem attempt/solve tallies, aggregated across every session ever
/// run against that problem. Persisted as a single shared file rather than
/// one file per problem since it's small and always read in full.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProblemCounters {
    pub attempts: u64,
    pub solves: u64,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_solve_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub first_solve_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct CountersFile {
    #[serde(flatten)]
    by_problem: std::collections::HashMap<String, ProblemCounters>,
}

/// Guards the single counters file with a mutex wrapping every
/// read-modify-write cycle, the same discipline `SessionStore` uses for
/// per-session files.
pub struct CounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        let path = counters_file_path(&data_dir)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub async fn record_attempt(&self, problem_id: &str) -> Result<(), StoreError> {
        validate_problem_id(problem_id)?;
        self.mutate(problem_id, |c| {
            c.attempts += 1;
            c.last_attempt_at = Some(Utc::now());
        })
        .await
    }

    pub async fn record_solve(&self, problem_id: &str) -> Result<(), StoreError> {
        validate_problem_id(problem_id)?;
        self.mutate(problem_id, |c| {
            let now = Utc::now();
            c.solves += 1;
            c.last_solve_at = Some(now);
            c.first_solve_at.get_or_insert(now);
        })
        .await
    }

    pub async fn get_counters(&self, problem_id: &str) -> Result<ProblemCounters, StoreError> {
        validate_problem_id(problem_id)?;
        let _guard = self.lock.lock().await;
        let file = self.read().await;
        Ok(file.by_problem.get(problem_id).cloned().unwrap_or_default())
    }

    async fn mutate(
        &self,
        problem_id: &str,
        f: impl FnOnce(&mut ProblemCounters),
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await;
        let entry = file.by_problem.entry(problem_id.to_string()).or_default();
        f(entry);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_json_atomic(&path, &file))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))??;
        Ok(())
    }

    async fn read(&self) -> CountersFile {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt counters file, starting fresh");
                CountersFile::default()
            }),
            Err(_) => CountersFile::default(),
        }
    }
}
