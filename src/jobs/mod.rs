//! Generation job tracking
//!
//! Records each generation request as a job whose status only ever moves
//! forward: `Pending -> Processing -> Completed | Failed`.

pub mod memory;

pub use memory::InMemoryJobStore;

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether a job may move from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub prompt: String,
    pub sref_url: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome attached to a status change.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub result_image_url: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn submit_job(&self, prompt: &str, sref_url: &str) -> Result<Job>;
    async fn get_job_status(&self, id: &str) -> Result<Job>;
    async fn update_status(&self, id: &str, status: JobStatus, update: JobUpdate) -> Result<Job>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_job_serialization() {
        let job = Job {
            id: "job_1".to_string(),
            prompt: "a fox".to_string(),
            sref_url: "https://a.com/x.png".to_string(),
            status: JobStatus::Pending,
            result_image_url: None,
            error: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"srefUrl\":\"https://a.com/x.png\""));
        assert!(json.contains("\"status\":\"Pending\""));
        assert!(!json.contains("resultImageUrl"));

        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
