//! Background job registry
//!
//! Status of batches started with `MonteCarloEngine::spawn_batch`, polled by
//! opaque id. Finished entries expire after a TTL and the registry never holds
//! more than `capacity` finished entries; running jobs are never evicted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::monte_carlo::SimulationResults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed { results: Box<SimulationResults> },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self.state, JobState::Running)
    }
}

pub trait JobRegistry: Send + Sync {
    fn insert_running(&self, id: JobId);
    fn complete(&self, id: JobId, results: SimulationResults);
    fn fail(&self, id: JobId, message: String);
    fn status(&self, id: JobId) -> Option<JobStatus>;
    /// Drop finished entries older than the TTL; returns how many were removed.
    fn evict_expired(&self) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemoryJobRegistry {
    entries: RwLock<HashMap<JobId, JobStatus>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new(Duration::hours(1), 256)
    }
}

impl InMemoryJobRegistry {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl, capacity: capacity.max(1) }
    }

    fn finish(&self, id: JobId, state: JobState) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let entry = entries.entry(id).or_insert_with(|| JobStatus {
            id,
            state: JobState::Running,
            submitted_at: now,
            finished_at: None,
        });
        entry.state = state;
        entry.finished_at = Some(now);
        Self::enforce_capacity(&mut entries, self.capacity);
    }

    /// Remove the oldest finished entries until at most `capacity` remain.
    fn enforce_capacity(entries: &mut HashMap<JobId, JobStatus>, capacity: usize) {
        let mut finished: Vec<(DateTime<Utc>, JobId)> = entries
            .values()
            .filter_map(|s| s.finished_at.map(|at| (at, s.id)))
            .collect();
        if finished.len() <= capacity {
            return;
        }
        finished.sort_by_key(|(at, _)| *at);
        let excess = finished.len() - capacity;
        for (_, id) in finished.into_iter().take(excess) {
            entries.remove(&id);
        }
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn insert_running(&self, id: JobId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            id,
            JobStatus { id, state: JobState::Running, submitted_at: Utc::now(), finished_at: None },
        );
    }

    fn complete(&self, id: JobId, results: SimulationResults) {
        self.finish(id, JobState::Completed { results: Box::new(results) });
    }

    fn fail(&self, id: JobId, message: String) {
        self.finish(id, JobState::Failed { message });
    }

    fn status(&self, id: JobId) -> Option<JobStatus> {
        self.evict_expired();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).cloned()
    }

    fn evict_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, s| s.finished_at.map_or(true, |at| at > cutoff));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("evicted {removed} expired job(s)");
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
