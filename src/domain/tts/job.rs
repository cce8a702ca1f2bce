use super::voice::AudioEncoding;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// Snapshot of an asynchronous synthesis job.
///
/// Only the pipeline task that owns the session writes new snapshots;
/// everyone else reads clones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub session_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub completed: usize,
    pub total: usize,
    pub failed: Vec<usize>,
    /// Object key of the merged audio once the job is done
    pub result_ref: Option<String>,
    pub result_url: Option<String>,
    pub encoding: Option<AudioEncoding>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn queued(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            completed: 0,
            total: 0,
            failed: Vec::new(),
            result_ref: None,
            result_url: None,
            encoding: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn running(mut self, total: usize) -> Self {
        self.status = JobStatus::Running;
        self.total = total;
        self.updated_at = Utc::now();
        self
    }

    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        self.completed = completed;
        self.total = total;
        self.progress = progress_percent(completed, total);
        self.updated_at = Utc::now();
        self
    }

    pub fn done(mut self, result_ref: String, result_url: String, encoding: AudioEncoding, failed: Vec<usize>) -> Self {
        self.status = JobStatus::Done;
        self.progress = 100;
        self.completed = self.total;
        self.result_ref = Some(result_ref);
        self.result_url = Some(result_url);
        self.encoding = Some(encoding);
        self.failed = failed;
        self.updated_at = Utc::now();
        self
    }

    pub fn failed(mut self, message: String, failed: Vec<usize>) -> Self {
        self.status = JobStatus::Error;
        self.error_message = Some(message);
        self.failed = failed;
        self.updated_at = Utc::now();
        self
    }
}

pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) * 100) / total) as u8
}

#[derive(Debug, thiserror::Error)]
#[error("a job for session {0} is already in progress")]
pub struct JobConflict(pub String);

/// Session-keyed job snapshots with TTL eviction
pub struct JobStore {
    jobs: Cache<String, Job>,
    create_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
            create_lock: Mutex::new(()),
        }
    }

    /// Register a queued job, refusing if one is still active for the session
    pub async fn create(&self, session_id: &str) -> Result<Job, JobConflict> {
        let _guard = self.create_lock.lock().await;

        if let Some(existing) = self.jobs.get(session_id).await {
            if existing.status.is_active() {
                return Err(JobConflict(session_id.to_string()));
            }
        }

        let job = Job::queued(session_id);
        self.jobs.insert(session_id.to_string(), job.clone()).await;
        Ok(job)
    }

    pub async fn get(&self, session_id: &str) -> Option<Job> {
        self.jobs.get(session_id).await
    }

    pub async fn update(&self, job: Job) {
        self.jobs.insert(job.session_id.clone(), job).await;
    }

    pub fn len(&self) -> u64 {
        self.jobs.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
