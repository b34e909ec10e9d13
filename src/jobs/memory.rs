use super::{Job, JobRepository, JobStatus, JobUpdate};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Process-local job store. Clones share the same jobs.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        // A poisoned map still holds consistent jobs; each update is a single insert.
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobStore {
    async fn submit_job(&self, prompt: &str, sref_url: &str) -> Result<Job> {
        let job = Job {
            id: format!("job_{}", Uuid::new_v4().simple()),
            prompt: prompt.to_string(),
            sref_url: sref_url.to_string(),
            status: JobStatus::Pending,
            result_image_url: None,
            error: None,
            created_at: Utc::now(),
        };

        self.lock().insert(job.id.clone(), job.clone());
        tracing::debug!("Submitted job {}", job.id);
        Ok(job)
    }

    async fn get_job_status(&self, id: &str) -> Result<Job> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    async fn update_status(&self, id: &str, status: JobStatus, update: JobUpdate) -> Result<Job> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: job.status.to_string(),
                to: status.to_string(),
            });
        }

        tracing::debug!("Job {}: {} -> {}", id, job.status, status);
        job.status = status;
        if update.result_image_url.is_some() {
            job.result_image_url = update.result_image_url;
        }
        if update.error.is_some() {
            job.error = update.error;
        }
        Ok(job.clone())
    }
}
