use super::jobs::{JobOutcome, JobRunner};
use crate::domain::ports::JobSourceRef;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const IDLE_POLL: Duration = Duration::from_millis(500);

/// Tally of what a worker did with the jobs it took.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub completed: usize,
    pub cancelled: usize,
    pub abandoned: usize,
    pub failed: usize,
}

impl WorkerReport {
    pub fn total(&self) -> usize {
        self.completed + self.cancelled + self.abandoned + self.failed
    }
}

/// Pulls jobs from a source and runs them one at a time.
pub struct Worker {
    source: JobSourceRef,
    runner: Arc<JobRunner>,
    queue: Option<String>,
}

impl Worker {
    pub fn new(source: JobSourceRef, runner: Arc<JobRunner>) -> Self {
        Self {
            source,
            runner,
            queue: None,
        }
    }

    /// Restricts the worker to a single named queue.
    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Runs jobs until the source has nothing left for this worker.
    pub async fn run_until_idle(&self) -> WorkerReport {
        let mut report = WorkerReport::default();
        self.drain(&mut report).await;
        report
    }

    /// Runs jobs as they arrive until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerReport {
        let mut report = WorkerReport::default();
        tracing::info!(queue = ?self.queue, "worker started");
        loop {
            self.drain(&mut report).await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.source.wait_for_job() => {}
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
        }
        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            "worker stopped"
        );
        report
    }

    async fn drain(&self, report: &mut WorkerReport) {
        while let Some(job) = self.source.next_job(self.queue.as_deref()).await {
            let name = job.job.name();
            match self.runner.run(job).await {
                Ok(JobOutcome::Completed) => report.completed += 1,
                Ok(JobOutcome::Cancelled) => report.cancelled += 1,
                Ok(JobOutcome::Abandoned(_)) => report.abandoned += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(job = name, error = %e, "job failed");
                }
            }
        }
    }
}
