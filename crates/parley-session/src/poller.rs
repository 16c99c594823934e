// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background polling of long-running job status.
//!
//! [`JobPoller::spawn`] starts one repeating task per job. The task ends, and
//! releases its source, on the first of: a terminal status, too many
//! consecutive errors, [`PollHandle::cancel`], or the handle being dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// Fraction done, 0.0 to 1.0, when the backend reports it.
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Where job status comes from.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ParleyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Give up after this many failed polls in a row.
    pub max_consecutive_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_errors: 5,
        }
    }
}

/// How a polling task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job reached `completed` or `failed`.
    Finished(JobStatus),
    /// Stopped by the consumer.
    Cancelled,
    /// The source kept failing.
    GaveUp(String),
}

pub struct JobPoller;

impl JobPoller {
    pub fn spawn(
        source: Arc<dyn JobStatusSource>,
        job_id: impl Into<String>,
        settings: PollSettings,
    ) -> PollHandle {
        let job_id = job_id.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(poll_loop(source, job_id.clone(), settings, tx, cancel.clone()));

        PollHandle {
            job_id,
            status: rx,
            cancel: cancel.clone(),
            task,
            _guard: cancel.drop_guard(),
        }
    }
}

async fn poll_loop(
    source: Arc<dyn JobStatusSource>,
    job_id: String,
    settings: PollSettings,
    tx: watch::Sender<Option<JobStatus>>,
    cancel: CancellationToken,
) -> PollOutcome {
    let mut interval = tokio::time::interval(settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%job_id, "job polling cancelled");
                return PollOutcome::Cancelled;
            }
            _ = interval.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%job_id, "job polling cancelled");
                return PollOutcome::Cancelled;
            }
            polled = source.job_status(&job_id) => polled,
        };

        match polled {
            Ok(status) => {
                failures = 0;
                let terminal = status.state.is_terminal();
                debug!(%job_id, state = %status.state, progress = ?status.progress, "job status polled");
                tx.send_replace(Some(status.clone()));
                if terminal {
                    info!(%job_id, state = %status.state, "job finished, polling stopped");
                    return PollOutcome::Finished(status);
                }
            }
            Err(e) => {
                failures += 1;
                warn!(%job_id, error = %e, failures, "job status poll failed");
                if failures >= settings.max_consecutive_errors {
                    return PollOutcome::GaveUp(e.to_string());
                }
            }
        }
    }
}

/// Owner of a polling task. Dropping it stops the task.
pub struct PollHandle {
    job_id: String,
    status: watch::Receiver<Option<JobStatus>>,
    cancel: CancellationToken,
    task: JoinHandle<PollOutcome>,
    _guard: DropGuard,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Latest polled status, if any poll has succeeded yet.
    pub fn status(&self) -> Option<JobStatus> {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status update.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobStatus>> {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that stops the task when cancelled, for use from other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task to end.
    pub async fn wait(self) -> PollOutcome {
        let PollHandle { task, _guard: guard, .. } = self;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PollOutcome::Cancelled,
            Err(e) => PollOutcome::GaveUp(format!("polling task panicked: {e}")),
        };
        drop(guard);
        outcome
    }
}
