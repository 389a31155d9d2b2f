// crates/core/src/store.rs
//! In-memory source of truth for job existence and set membership.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::StoreError;
use crate::types::{Job, JobId, JobListing, NewJob, Outcome};

#[derive(Default)]
struct Sets {
    active: HashMap<JobId, Job>,
    /// Most-recent-first.
    completed: VecDeque<Job>,
}

impl Sets {
    fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.completed.iter().any(|j| j.id == id)
    }
}

/// Sizes of the two job sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub active: usize,
    pub completed: usize,
}

/// Holds every job known to the process, split into active and completed sets.
///
/// Both sets sit behind a single lock so a reader never sees a job in both
/// sets or in neither. The lock is never held across an `.await`.
#[derive(Default)]
pub struct JobStore {
    sets: RwLock<Sets>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Sets> {
        self.sets.read().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned reading job sets, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sets> {
        self.sets.write().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned writing job sets, recovering");
            poisoned.into_inner()
        })
    }

    /// Seed the completed set from a persisted snapshot (most-recent-first).
    pub fn hydrate(&self, completed: Vec<Job>) {
        let mut sets = self.write();
        sets.completed = completed.into_iter().collect();
    }

    /// Validate the request, allocate a fresh id and insert a running job.
    pub fn create(&self, req: NewJob) -> Result<Job, StoreError> {
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StoreError::Validation("name is required".to_string()))?;

        let mut sets = self.write();
        let id = loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string();
            if !sets.contains(&candidate) {
                break candidate;
            }
            tracing::warn!(job_id = %candidate, "job id collision, regenerating");
        };
        let job = Job::start(id.clone(), name, req.description, req.job_type);
        sets.active.insert(id, job.clone());
        Ok(job)
    }

    /// Look up a job, active set first.
    pub fn get(&self, id: &str) -> Option<Job> {
        let sets = self.read();
        sets.active
            .get(id)
            .cloned()
            .or_else(|| sets.completed.iter().find(|j| j.id == id).cloned())
    }

    pub fn list_all(&self) -> JobListing {
        let sets = self.read();
        let mut active: Vec<Job> = sets.active.values().cloned().collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        JobListing {
            active,
            completed: sets.completed.iter().cloned().collect(),
        }
    }

    pub fn completed(&self) -> Vec<Job> {
        self.read().completed.iter().cloned().collect()
    }

    pub fn counts(&self) -> JobCounts {
        let sets = self.read();
        JobCounts {
            active: sets.active.len(),
            completed: sets.completed.len(),
        }
    }

    /// Mutate an active job in place. Returns the updated copy, or `None`
    /// when the job is not (or no longer) active.
    pub fn update<F>(&self, id: &str, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut sets = self.write();
        let job = sets.active.get_mut(id)?;
        f(job);
        Some(job.clone())
    }

    /// Move a job from active to completed, replacing it with `finalized`.
    pub fn complete(&self, id: &str, finalized: Job) -> Result<(), StoreError> {
        debug_assert_eq!(id, finalized.id);
        let mut sets = self.write();
        if sets.active.remove(id).is_none() {
            return Err(StoreError::NotActive { id: id.to_string() });
        }
        sets.completed.push_front(finalized);
        Ok(())
    }

    /// Finish an active job with `outcome` and move it to the completed set in
    /// one step. Whoever gets here first wins; later callers get `NotActive`.
    pub fn finish(&self, id: &str, outcome: Outcome) -> Result<Job, StoreError> {
        let mut sets = self.write();
        let mut job = sets
            .active
            .remove(id)
            .ok_or_else(|| StoreError::NotActive { id: id.to_string() })?;
        job.finish(outcome, Utc::now());
        sets.completed.push_front(job.clone());
        Ok(job)
    }
}
