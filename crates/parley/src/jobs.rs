// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley job`: follows a background job until it settles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use parley_config::ParleyConfig;
use parley_core::ParleyError;
use parley_session::{JobPoller, JobState, JobStatus, JobStatusSource, PollOutcome};
use tracing::debug;

use crate::engine;

/// Reads job status from `GET <jobs_url>/<job_id>`.
#[derive(Debug, Clone)]
pub struct HttpJobSource {
    client: reqwest::Client,
    jobs_url: String,
}

impl HttpJobSource {
    pub fn new(jobs_url: &str, timeout: Duration) -> Result<Self, ParleyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            jobs_url: jobs_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl JobStatusSource for HttpJobSource {
    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ParleyError> {
        let url = format!("{}/{job_id}", self.jobs_url);
        let response = self.client.get(&url).send().await.map_err(|e| ParleyError::Transport {
            message: format!("HTTP request failed: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(%job_id, %status, "job status response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::transport(
                format!("API returned {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        response
            .json::<JobStatus>()
            .await
            .map_err(|e| ParleyError::Protocol(format!("unexpected job status payload: {e}")))
    }
}

pub async fn run_job(config: &ParleyConfig, job_id: &str) -> Result<(), ParleyError> {
    let source = HttpJobSource::new(
        &config.session.jobs_url,
        Duration::from_secs(config.subscription.request_timeout_secs),
    )?;
    let handle = JobPoller::spawn(Arc::new(source), job_id, engine::poll_settings(config));

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            if let Some(status) = updates.borrow_and_update().clone() {
                println!("{}", progress_line(&status).dimmed());
            }
        }
    });

    let token = handle.cancel_token();
    let cancel_on_interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = handle.wait().await;
    cancel_on_interrupt.abort();
    // The watch sender is gone once the task ends, so the printer drains and exits.
    let _ = printer.await;

    match outcome {
        PollOutcome::Finished(status) if status.state == JobState::Completed => {
            println!("{} {}", "completed".green().bold(), status.job_id);
            Ok(())
        }
        PollOutcome::Finished(status) => Err(ParleyError::Internal(format!(
            "job {} failed: {}",
            status.job_id,
            status.error.as_deref().unwrap_or("no reason given")
        ))),
        PollOutcome::Cancelled => {
            println!("{}", "stopped polling".dimmed());
            Ok(())
        }
        PollOutcome::GaveUp(error) => Err(ParleyError::Internal(format!(
            "gave up polling job {job_id}: {error}"
        ))),
    }
}

fn progress_line(status: &JobStatus) -> String {
    match status.progress {
        Some(p) => format!("{}: {} ({:.0}%)", status.job_id, status.state, p * 100.0),
        None => format!("{}: {}", status.job_id, status.state),
    }
}
