// crates/server/src/broadcast.rs
//! Fan-out of job events to connected observers.
//!
//! Two delivery scopes:
//! - global: lifecycle events go to every connected observer
//! - room: `job-log` lines go only to observers that joined the job's room
//!
//! Observers are plain `mpsc` receivers, so nothing here depends on the
//! WebSocket transport.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use jobwatch_core::{Job, JobEvent, JobId, JobLogLine};
use tokio::sync::mpsc;

/// Identifier of one connected observer.
pub type ObserverId = u64;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    observers: DashMap<ObserverId, mpsc::UnboundedSender<JobEvent>>,
    rooms: DashMap<JobId, HashSet<ObserverId>>,
    memberships: DashMap<ObserverId, HashSet<JobId>>,
}

/// Shared subscriber registry. Cheap to clone.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

/// A connected observer. Dropping it disconnects and discards room memberships.
pub struct Subscription {
    id: ObserverId,
    rx: mpsc::UnboundedReceiver<JobEvent>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.disconnect(self.id);
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    pub fn connect(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.observers.insert(id, tx);
        tracing::debug!(observer = id, "observer connected");
        Subscription {
            id,
            rx,
            broadcaster: self.clone(),
        }
    }

    /// Remove an observer and every room membership it held.
    pub fn disconnect(&self, observer: ObserverId) {
        if self.registry.observers.remove(&observer).is_none() {
            return;
        }
        if let Some((_, joined)) = self.registry.memberships.remove(&observer) {
            for job_id in joined {
                self.remove_from_room(&job_id, observer);
            }
        }
        tracing::debug!(observer, "observer disconnected");
    }

    /// Join `observer` to the room for `job_id`.
    ///
    /// `catch_up` events are delivered to the joining observer only, while the
    /// room is locked, so they always precede any line emitted to the room
    /// afterwards. Returns `false` if the observer is not connected.
    pub fn join(&self, observer: ObserverId, job_id: &str, catch_up: Vec<JobEvent>) -> bool {
        let Some(tx) = self.registry.observers.get(&observer).map(|tx| tx.clone()) else {
            return false;
        };
        {
            let mut room = self.registry.rooms.entry(job_id.to_string()).or_default();
            for event in catch_up {
                let _ = tx.send(event);
            }
            room.insert(observer);
        }
        self.registry
            .memberships
            .entry(observer)
            .or_default()
            .insert(job_id.to_string());
        // A disconnect that ran in between has already swept memberships.
        if !self.registry.observers.contains_key(&observer) {
            self.leave(observer, job_id);
            self.registry
                .memberships
                .remove_if(&observer, |_, joined| joined.is_empty());
            return false;
        }
        tracing::debug!(observer, job_id, "observer joined room");
        true
    }

    pub fn leave(&self, observer: ObserverId, job_id: &str) {
        if let Some(mut joined) = self.registry.memberships.get_mut(&observer) {
            joined.remove(job_id);
        }
        self.remove_from_room(job_id, observer);
        tracing::debug!(observer, job_id, "observer left room");
    }

    fn remove_from_room(&self, job_id: &str, observer: ObserverId) {
        if let Some(mut room) = self.registry.rooms.get_mut(job_id) {
            room.remove(&observer);
        }
        self.registry.rooms.remove_if(job_id, |_, members| members.is_empty());
    }

    /// Deliver to every connected observer.
    pub fn emit_global(&self, event: JobEvent) {
        let mut dead = Vec::new();
        for entry in self.registry.observers.iter() {
            if entry.value().send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for observer in dead {
            self.disconnect(observer);
        }
    }

    /// Deliver only to observers in the job's room.
    pub fn emit_room(&self, job_id: &str, event: JobEvent) {
        let Some(room) = self.registry.rooms.get(job_id) else {
            return;
        };
        for observer in room.iter() {
            if let Some(tx) = self.registry.observers.get(observer) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Convenience for the common room event.
    pub fn log(&self, line: JobLogLine) {
        let job_id = line.job_id.clone();
        self.emit_room(&job_id, JobEvent::JobLog(line));
    }

    pub fn observer_count(&self) -> usize {
        self.registry.observers.len()
    }

    pub fn room_size(&self, job_id: &str) -> usize {
        self.registry.rooms.get(job_id).map_or(0, |room| room.len())
    }

    #[cfg(test)]
    fn membership_count(&self) -> usize {
        self.registry.memberships.len()
    }
}

/// Point-in-time catch-up for an observer joining a job's room: a line
/// describing the job and, once it has started moving, its current progress.
pub fn catch_up_lines(job: Option<&Job>) -> Vec<JobEvent> {
    let Some(job) = job else {
        return Vec::new();
    };
    let mut lines = vec![JobEvent::JobLog(JobLogLine::info(
        &job.id,
        format!(
            "Job \"{}\" ({}) is {}: {}",
            job.name,
            job.job_type,
            job.status.as_str(),
            job.description
        ),
    ))];
    if job.progress > 0 {
        lines.push(JobEvent::JobLog(JobLogLine::info(
            &job.id,
            format!("Current progress: {}%", job.progress),
        )));
    }
    lines
}
