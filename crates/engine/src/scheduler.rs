// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool with at most one in-flight run per job id.

use crate::plugin::PluginError;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("job {0} is already running")]
    Conflict(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Outcome delivered exactly once per admitted submission.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The run completed and the task returned.
    Executed { job_id: String },
    /// The run raised.
    Error { job_id: String, error: PluginError },
    /// The pool was torn down before the run could start. Admitted work is
    /// always drained on shutdown, so this indicates a scheduler bug.
    Missed { job_id: String },
}

impl ExecutionOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Executed { job_id } | Self::Error { job_id, .. } | Self::Missed { job_id } => {
                job_id
            }
        }
    }
}

/// Fixed pool of worker slots plus a set of in-flight job ids.
///
/// A submission is admitted only if its id is not already in flight;
/// concurrent triggers for one id therefore collapse to a single run.
/// There is no firing window: admitted work runs as soon as a slot frees
/// up, and every admitted run reports exactly one [`ExecutionOutcome`].
pub struct Scheduler {
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    tracker: TaskTracker,
    outcome_tx: mpsc::Sender<ExecutionOutcome>,
}

impl Scheduler {
    pub fn new(workers: usize, outcome_tx: mpsc::Sender<ExecutionOutcome>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            outcome_tx,
        }
    }

    /// Number of runs currently admitted (queued or executing).
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Admit one run for the given job id.
    pub fn submit<F>(&self, job_id: &str, task: F) -> Result<(), SubmitError>
    where
        F: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(SubmitError::ShuttingDown);
        }
        if !self.in_flight.lock().insert(job_id.to_string()) {
            return Err(SubmitError::Conflict(job_id.to_string()));
        }

        let job_id = job_id.to_string();
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let outcome_tx = self.outcome_tx.clone();
        self.tracker.spawn(async move {
            let outcome = match permits.acquire().await {
                Ok(_permit) => match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(())) => ExecutionOutcome::Executed { job_id: job_id.clone() },
                    Ok(Err(error)) => ExecutionOutcome::Error { job_id: job_id.clone(), error },
                    Err(payload) => ExecutionOutcome::Error {
                        job_id: job_id.clone(),
                        error: PluginError::new(panic_message(payload.as_ref())),
                    },
                },
                Err(_closed) => ExecutionOutcome::Missed { job_id: job_id.clone() },
            };
            // Clear the in-flight mark before reporting so a follow-up
            // message for this id is schedulable again the moment the
            // outcome is processed.
            in_flight.lock().remove(&job_id);
            // The receiver may already be gone during shutdown.
            let _ = outcome_tx.send(outcome).await;
        });
        Ok(())
    }

    /// Stop admitting work and wait for every admitted run, queued or
    /// executing, to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin panicked".to_string()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
