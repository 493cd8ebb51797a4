//! IBM Quantum Runtime job management
//!
//! Provides functionality to:
//! - Submit primitive jobs
//! - Monitor job status until a terminal state
//! - Retrieve raw results

use crate::backend::RuntimeService;
use crate::error::{ChshError, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Job is being validated or initialized
    Initializing,

    /// Job is queued
    Queued,

    /// Job is running
    Running,

    /// Job completed successfully
    Completed,

    /// Job failed
    Failed,

    /// Job was cancelled
    Cancelled,

    /// Unknown status
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Parse a status string, ignoring case and trailing detail
    ///
    /// The service reports values like `"Completed"` or
    /// `"Cancelled - Ran too long"`.
    pub fn parse(status: &str) -> Self {
        let head = status
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match head.as_str() {
            "INITIALIZING" | "VALIDATING" => JobStatus::Initializing,
            "QUEUED" => JobStatus::Queued,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" | "DONE" => JobStatus::Completed,
            "FAILED" | "ERROR" => JobStatus::Failed,
            "CANCELLED" | "CANCELED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }

    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if job succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// Status plus the service's reason text, if any
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub status: JobStatus,
    pub reason: Option<String>,
}

impl JobState {
    /// Read `state.status` / `state.reason`, falling back to a top-level `status`
    pub fn from_response(resp: &serde_json::Value) -> Self {
        let state = resp.get("state");
        let status = state
            .and_then(|s| s.get("status"))
            .or_else(|| resp.get("status"))
            .and_then(|s| s.as_str())
            .map(JobStatus::parse)
            .unwrap_or(JobStatus::Unknown);
        let reason = state
            .and_then(|s| s.get("reason"))
            .and_then(|r| r.as_str())
            .map(str::to_string);

        Self { status, reason }
    }

    /// Map a terminal failure state to an error
    pub fn into_result(self, job_id: &str) -> Result<JobStatus> {
        match self.status {
            JobStatus::Failed => Err(ChshError::JobFailed(
                job_id.to_string(),
                self.reason.unwrap_or_else(|| "Job execution failed".into()),
            )),
            JobStatus::Cancelled => Err(ChshError::JobCancelled(job_id.to_string())),
            status => Ok(status),
        }
    }
}

/// Job handle for tracking submitted jobs
#[derive(Debug, Clone)]
pub struct Job {
    /// Job ID
    pub id: String,

    /// Backend name
    pub backend: String,

    /// Runtime program (primitive) name
    pub program_id: String,

    /// Current status
    pub status: JobStatus,

    /// Creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Job {
    /// Create a new job handle
    pub fn new(id: String, backend: String, program_id: String) -> Self {
        Self {
            id,
            backend,
            program_id,
            status: JobStatus::Queued,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Job submission request
#[derive(Debug, Serialize)]
struct JobSubmitRequest<'a, P: Serialize> {
    program_id: &'a str,
    backend: &'a str,
    params: &'a P,
}

/// Polling limits for [`JobManager::wait_for_completion`]
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

/// Job manager for submitting and monitoring jobs
pub struct JobManager;

impl JobManager {
    /// Submit a Runtime program job
    pub async fn submit<P: Serialize>(
        service: &RuntimeService,
        backend: &str,
        program_id: &str,
        params: &P,
    ) -> Result<Job> {
        let request = JobSubmitRequest {
            program_id,
            backend,
            params,
        };

        let response = service
            .request(Method::POST, "/jobs")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ChshError::JobSubmissionFailed(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        let resp: serde_json::Value = response.json().await?;
        let id = resp
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChshError::InvalidResponse("No job ID in response".into()))?;

        info!(job_id = id, backend, program_id, "job submitted");
        Ok(Job::new(id.to_string(), backend.to_string(), program_id.to_string()))
    }

    /// Get job status and reason
    pub async fn status(service: &RuntimeService, job_id: &str) -> Result<JobState> {
        let path = format!("/jobs/{}", job_id);
        let response = service.request(Method::GET, &path).send().await?;
        let resp: serde_json::Value = RuntimeService::check(response).await?.json().await?;
        Ok(JobState::from_response(&resp))
    }

    /// Poll until the job reaches a terminal state
    ///
    /// Failure and cancellation become errors; exceeding `max_wait`
    /// is a timeout. There is no retry.
    pub async fn wait_for_completion(
        service: &RuntimeService,
        job: &mut Job,
        poll: PollSettings,
    ) -> Result<()> {
        let start = Instant::now();

        loop {
            if start.elapsed() > poll.max_wait {
                warn!(job_id = %job.id, waited_secs = poll.max_wait.as_secs(), "job timed out");
                return Err(ChshError::JobTimeout(job.id.clone(), poll.max_wait.as_secs()));
            }

            let state = Self::status(service, &job.id).await?;
            if state.status != job.status {
                info!(job_id = %job.id, status = ?state.status, "job status changed");
            }
            job.status = state.status;

            if state.status.is_terminal() {
                state.into_result(&job.id)?;
                return Ok(());
            }

            debug!(job_id = %job.id, elapsed_secs = start.elapsed().as_secs(), "polling job");
            sleep(poll.interval).await;
        }
    }

    /// Raw result body of a completed job
    pub async fn results(service: &RuntimeService, job: &Job) -> Result<String> {
        if !job.status.is_success() {
            return Err(ChshError::InvalidResponse(format!(
                "Job is not completed. Status: {:?}",
                job.status
            )));
        }

        let path = format!("/jobs/{}/results", job.id);
        let response = service.request(Method::GET, &path).send().await?;
        Ok(RuntimeService::check(response).await?.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Initializing.is_terminal());
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!(JobStatus::parse("Completed"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("QUEUED"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("running"), JobStatus::Running);
        assert_eq!(
            JobStatus::parse("Cancelled - Ran too long"),
            JobStatus::Cancelled
        );
        assert_eq!(JobStatus::parse("mystery"), JobStatus::Unknown);
    }

    #[test]
    fn test_state_from_response() {
        let resp = serde_json::json!({
            "id": "d1abc",
            "state": {"status": "Failed", "reason": "Error code 1517"}
        });
        let state = JobState::from_response(&resp);
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.reason.as_deref(), Some("Error code 1517"));

        let flat = serde_json::json!({"id": "d1abc", "status": "Running"});
        assert_eq!(JobState::from_response(&flat).status, JobStatus::Running);
    }

    #[test]
    fn test_state_into_result() {
        let failed = JobState {
            status: JobStatus::Failed,
            reason: Some("calibration".into()),
        };
        match failed.into_result("d1abc") {
            Err(ChshError::JobFailed(id, reason)) => {
                assert_eq!(id, "d1abc");
                assert_eq!(reason, "calibration");
            }
            other => panic!("unexpected {:?}", other),
        }

        let cancelled = JobState {
            status: JobStatus::Cancelled,
            reason: None,
        };
        assert!(matches!(
            cancelled.into_result("d1abc"),
            Err(ChshError::JobCancelled(_))
        ));

        let done = JobState {
            status: JobStatus::Completed,
            reason: None,
        };
        assert_eq!(done.into_result("d1abc").unwrap(), JobStatus::Completed);
    }

    #[test]
    fn test_job_new() {
        let job = Job::new("d1abc".into(), "ibm_torino".into(), "estimator".into());
        assert_eq!(job.id, "d1abc");
        assert_eq!(job.backend, "ibm_torino");
        assert_eq!(job.program_id, "estimator");
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_submit_request_shape() {
        let params = serde_json::json!({"version": 2});
        let request = JobSubmitRequest {
            program_id: "estimator",
            backend: "ibm_torino",
            params: &params,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["program_id"], "estimator");
        assert_eq!(json["backend"], "ibm_torino");
        assert_eq!(json["params"]["version"], 2);
    }
}
