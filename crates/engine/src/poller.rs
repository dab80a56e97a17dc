//! Status polling for worker jobs.
//!
//! The poller is stateless: the session's [`Job`] is the only record of an
//! in-flight job, so clearing it is enough to stop polling.

use std::time::Duration;

use toolkit_types::{JobResult, JobStatus};
use tracing::{debug, info, warn};

use crate::backend::ActionBackend;
use crate::error::{StepError, StepErrorKind};
use crate::session::Job;

pub const UNKNOWN_JOB_ERROR: &str = "An unknown job error occurred.";
pub const POLL_FAILED_ERROR: &str = "Failed to get run status.";

/// What one status check observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Not terminal yet; keep polling.
    Pending(JobStatus),
    Completed(JobResult),
    /// The job failed with this message.
    Failed(String),
    /// The status request itself failed; polling stops without retry.
    Errored(StepError),
}

#[derive(Debug, Clone, Copy)]
pub struct JobPoller {
    interval: Duration,
}

impl JobPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Performs a single status check for `job`.
    pub async fn poll_once<B: ActionBackend + ?Sized>(&self, backend: &B, job: &Job) -> PollOutcome {
        let record = match backend.fetch_run(&job.run_id).await {
            Ok(record) => record,
            Err(error) => {
                warn!(run_id = %job.run_id, action_id = %job.action_id, %error, "job status poll failed");
                return PollOutcome::Errored(StepError::new(StepErrorKind::Transport, POLL_FAILED_ERROR));
            }
        };

        let report = record.job_report(&job.action_id);
        match report.status {
            JobStatus::Completed => {
                info!(run_id = %job.run_id, action_id = %job.action_id, "job completed");
                PollOutcome::Completed(report.result.unwrap_or_default())
            }
            JobStatus::Failed => {
                let message = report
                    .error
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_JOB_ERROR.to_string());
                warn!(run_id = %job.run_id, action_id = %job.action_id, error = %message, "job failed");
                PollOutcome::Failed(message)
            }
            status => {
                debug!(run_id = %job.run_id, action_id = %job.action_id, ?status, "job still running");
                PollOutcome::Pending(status)
            }
        }
    }
}
