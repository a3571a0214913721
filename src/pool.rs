//! Bounded task pool: run a fixed list of per-script tasks, at most
//! `workers` at a time, and collect exactly one result per task.
//!
//! Each task is spawned onto the tokio runtime when a slot frees up, so a
//! panicking task is caught at its `JoinHandle` and recorded as a failure
//! for that script alone. `run` only returns once every task has settled;
//! there is no cancellation. Results come back in submission order no
//! matter which order the tasks finished in.

use crate::error::JobError;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a script that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every page was processed.
    Done { pages: usize },
    /// The output already existed and redo was not requested.
    Skipped,
}

/// One unit of work: a label for reporting and the future that does it.
pub struct Task {
    label: String,
    work: BoxFuture<'static, Result<JobOutcome, JobError>>,
}

impl Task {
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = Result<JobOutcome, JobError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: Box::pin(work),
        }
    }
}

/// What one task produced. Written once, after the task settles.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub label: String,
    pub result: Result<JobOutcome, JobError>,
    pub duration_ms: u64,
}

impl TaskResult {
    /// Pages processed; 0 for skipped and failed scripts.
    pub fn page_count(&self) -> usize {
        match self.result {
            Ok(JobOutcome::Done { pages }) => pages,
            _ => 0,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        self.result.as_ref().err()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.result, Ok(JobOutcome::Skipped))
    }
}

/// Runs tasks with bounded concurrency.
pub struct TaskPool {
    workers: usize,
    observer: ProgressCallback,
}

impl TaskPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            observer: Arc::new(NoopProgressCallback),
        }
    }

    /// Report to `observer`; `None` keeps the no-op default.
    pub fn with_observer(mut self, observer: Option<ProgressCallback>) -> Self {
        if let Some(observer) = observer {
            self.observer = observer;
        }
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task to completion and return their results in
    /// submission order.
    pub async fn run(&self, tasks: Vec<Task>) -> Vec<TaskResult> {
        let total = tasks.len();
        info!("Running {} tasks on {} workers", total, self.workers);
        self.observer.on_batch_start(total);

        let mut results: Vec<(usize, TaskResult)> = stream::iter(tasks.into_iter().enumerate())
            .map(|(idx, task)| {
                let observer = Arc::clone(&self.observer);
                async move {
                    let label = task.label;
                    observer.on_job_start(&label);
                    let start = Instant::now();
                    let result = match tokio::spawn(task.work).await {
                        Ok(r) => r,
                        Err(join) => Err(JobError::Internal(format!("task panicked: {join}"))),
                    };
                    let duration_ms = start.elapsed().as_millis() as u64;

                    match &result {
                        Ok(JobOutcome::Done { pages }) => {
                            debug!("{}: done, {} pages in {}ms", label, pages, duration_ms);
                            observer.on_job_complete(&label, *pages);
                        }
                        Ok(JobOutcome::Skipped) => {
                            debug!("{}: skipped", label);
                            observer.on_job_skipped(&label);
                        }
                        Err(e) => {
                            warn!("{}: {}", label, e);
                            observer.on_job_error(&label, &e.to_string());
                        }
                    }

                    (
                        idx,
                        TaskResult {
                            label,
                            result,
                            duration_ms,
                        },
                    )
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        let results: Vec<TaskResult> = results.into_iter().map(|(_, r)| r).collect();

        let failed = results.iter().filter(|r| r.error().is_some()).count();
        self.observer.on_batch_complete(total, failed);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::progress::PageHistogram;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn done(pages: usize) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::Done { pages })
    }

    #[tokio::test]
    async fn every_task_runs_once_and_results_keep_order() {
        let runs = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..20)
            .map(|i| {
                let runs = Arc::clone(&runs);
                Task::new(format!("s{i}.pdf"), async move {
                    // Later tasks finish first.
                    tokio::time::sleep(Duration::from_millis(40 - 2 * i as u64)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                    done(i)
                })
            })
            .collect();

        let results = TaskPool::new(4).run(tasks).await;

        assert_eq!(runs.load(Ordering::SeqCst), 20);
        assert_eq!(results.len(), 20);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.label, format!("s{i}.pdf"));
            assert_eq!(r.page_count(), i);
        }
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_siblings() {
        let tasks = vec![
            Task::new("ok1.pdf", async { done(3) }),
            Task::new("bad.pdf", async {
                Err(JobError::Engine {
                    stage: Stage::Merge,
                    detail: "boom".into(),
                })
            }),
            Task::new("panics.pdf", async {
                let pages: Option<usize> = None;
                done(pages.expect("renderer bug"))
            }),
            Task::new("ok2.pdf", async { done(5) }),
            Task::new("skip.pdf", async { Ok(JobOutcome::Skipped) }),
        ];

        let results = TaskPool::new(2).run(tasks).await;

        assert_eq!(results[0].page_count(), 3);
        assert!(matches!(results[1].error(), Some(JobError::Engine { .. })));
        assert!(matches!(results[2].error(), Some(JobError::Internal(_))));
        assert_eq!(results[3].page_count(), 5);
        assert!(results[4].is_skipped());
        assert_eq!(results[4].page_count(), 0);
        assert_eq!(results.iter().filter(|r| r.error().is_some()).count(), 2);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..12)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                Task::new(format!("{i}"), async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    done(1)
                })
            })
            .collect();

        TaskPool::new(3).run(tasks).await;
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn observer_sees_every_completion() {
        let histogram = Arc::new(PageHistogram::new());
        let tasks = vec![
            Task::new("a", async { done(4) }),
            Task::new("b", async { done(4) }),
            Task::new("c", async { done(2) }),
            Task::new("d", async { Ok(JobOutcome::Skipped) }),
        ];

        TaskPool::new(2)
            .with_observer(Some(histogram.clone() as ProgressCallback))
            .run(tasks)
            .await;

        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.snapshot().get(&4), Some(&2));
    }

    #[test]
    fn empty_pool_returns_nothing() {
        let results = tokio_test::block_on(TaskPool::new(4).run(Vec::new()));
        assert!(results.is_empty());
    }
}
