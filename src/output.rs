//! Result types returned by the batch drivers.

use crate::error::{GradexError, JobError};
use crate::pool::{JobOutcome, TaskResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How one script ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Done,
    Skipped,
    Failed,
}

/// Per-script line of the batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Input file name, relative to the input directory.
    pub input: String,
    /// Output document (overlay) or descriptor (export).
    pub output: PathBuf,
    pub status: JobStatus,
    /// Pages processed; 0 unless `status` is `Done`.
    pub pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub duration_ms: u64,
}

impl JobReport {
    pub(crate) fn from_task(input: String, output: PathBuf, task: TaskResult) -> Self {
        let pages = task.page_count();
        let (status, error) = match task.result {
            Ok(JobOutcome::Done { .. }) => (JobStatus::Done, None),
            Ok(JobOutcome::Skipped) => (JobStatus::Skipped, None),
            Err(e) => (JobStatus::Failed, Some(e)),
        };
        Self {
            input,
            output,
            status,
            pages,
            error,
            duration_ms: task.duration_ms,
        }
    }
}

/// Aggregate numbers for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_jobs: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_pages: usize,
    /// Largest page count seen by the scanner (export batches only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    pub workers: usize,
    pub total_duration_ms: u64,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub(crate) fn new(
        jobs: Vec<JobReport>,
        workers: usize,
        max_pages: Option<usize>,
        total_duration_ms: u64,
    ) -> Self {
        let count = |s: JobStatus| jobs.iter().filter(|j| j.status == s).count();
        let stats = BatchStats {
            total_jobs: jobs.len(),
            done: count(JobStatus::Done),
            skipped: count(JobStatus::Skipped),
            failed: count(JobStatus::Failed),
            total_pages: jobs.iter().map(|j| j.pages).sum(),
            max_pages,
            workers,
            total_duration_ms,
        };
        Self { jobs, stats }
    }

    /// Number of scripts that failed.
    pub fn error_count(&self) -> usize {
        self.stats.failed
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Failed)
    }

    /// Treat any failed script as an error.
    pub fn into_result(self) -> Result<Self, GradexError> {
        if self.stats.failed > 0 {
            return Err(GradexError::PartialFailure {
                failed: self.stats.failed,
                total: self.stats.total_jobs,
            });
        }
        Ok(self)
    }
}
