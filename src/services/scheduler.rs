//! Bounded-concurrency admission for hardening runs.
//!
//! At most `capacity` runs execute at once. Admission is first come, first
//! served (the semaphore is fair), and every run gets a child of the
//! scheduler's root cancellation token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task {0} is already scheduled")]
    AlreadyScheduled(Uuid),
    #[error("Run for task {task_id} panicked or was aborted: {reason}")]
    Join { task_id: Uuid, reason: String },
}

/// Handle to one submitted run.
pub struct RunHandle<R> {
    task_id: Uuid,
    token: CancellationToken,
    handle: JoinHandle<R>,
}

impl<R> RunHandle<R> {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Request a cooperative stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> Result<R, SchedulerError> {
        self.handle.await.map_err(|e| SchedulerError::Join {
            task_id: self.task_id,
            reason: e.to_string(),
        })
    }
}

type RunTable = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

fn lock(runs: &RunTable) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a task in the run table until the run ends, however it ends.
struct TrackedRun {
    task_id: Uuid,
    runs: RunTable,
}

impl Drop for TrackedRun {
    fn drop(&mut self) {
        lock(&self.runs).remove(&self.task_id);
    }
}

pub struct ExecutionScheduler {
    permits: Arc<Semaphore>,
    capacity: usize,
    root: CancellationToken,
    runs: RunTable,
}

impl ExecutionScheduler {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            root: CancellationToken::new(),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Runs submitted and not yet finished, admitted or waiting.
    pub async fn tracked(&self) -> usize {
        lock(&self.runs).len()
    }

    pub async fn is_tracked(&self, task_id: Uuid) -> bool {
        lock(&self.runs).contains_key(&task_id)
    }

    /// Wait for a free slot, then spawn `job` with the run's token.
    ///
    /// If the run is cancelled while still waiting, the job is spawned
    /// without a slot and sees an already-cancelled token.
    pub async fn submit<F, Fut, R>(&self, task_id: Uuid, job: F) -> Result<RunHandle<R>, SchedulerError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let token = {
            let mut runs = lock(&self.runs);
            if runs.contains_key(&task_id) {
                return Err(SchedulerError::AlreadyScheduled(task_id));
            }
            let token = self.root.child_token();
            runs.insert(task_id, token.clone());
            token
        };
        let tracked = TrackedRun { task_id, runs: Arc::clone(&self.runs) };

        tracing::debug!(task_id = %task_id, in_flight = self.in_flight(), "Waiting for admission");
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit.ok(),
            () = token.cancelled() => None,
        };
        if permit.is_some() {
            tracing::info!(task_id = %task_id, in_flight = self.in_flight(), capacity = self.capacity, "Run admitted");
        } else {
            tracing::info!(task_id = %task_id, "Run cancelled before admission");
        }

        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            // Released on return and on unwind
            let _tracked = tracked;
            let _permit = permit;
            job(run_token).await
        });

        Ok(RunHandle { task_id, token, handle })
    }

    /// Cancel one run. Returns whether the task was tracked.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        match lock(&self.runs).get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every run, admitted or waiting.
    pub fn shutdown(&self) {
        tracing::info!(in_flight = self.in_flight(), "Scheduler shutting down");
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}
