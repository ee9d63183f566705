use crate::domain::jobs::{Job, QueuedJob};
use crate::domain::ports::JobQueueRef;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hourly,
    Daily,
}

impl Cadence {
    pub fn period(&self) -> chrono::Duration {
        match self {
            Cadence::Hourly => chrono::Duration::hours(1),
            Cadence::Daily => chrono::Duration::days(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    cadence: Cadence,
    next_due: DateTime<Utc>,
}

/// The housekeeping jobs and how often they run.
pub fn default_schedule() -> Vec<(Job, Cadence)> {
    vec![
        (Job::ClearPendingOrders, Cadence::Hourly),
        (Job::RemoveInactiveUsers, Cadence::Daily),
        (Job::ReleaseExpiredInventoryReservations, Cadence::Hourly),
    ]
}

/// Enqueues recurring jobs when they fall due.
pub struct Scheduler {
    queue: JobQueueRef,
    entries: Vec<Entry>,
}

impl Scheduler {
    /// Schedules the default housekeeping jobs, each first due one period after `start`.
    pub fn new(queue: JobQueueRef, start: DateTime<Utc>) -> Self {
        Self::with_schedule(queue, start, default_schedule())
    }

    pub fn with_schedule(
        queue: JobQueueRef,
        start: DateTime<Utc>,
        schedule: Vec<(Job, Cadence)>,
    ) -> Self {
        let entries = schedule
            .into_iter()
            .map(|(job, cadence)| Entry {
                job,
                cadence,
                next_due: start + cadence.period(),
            })
            .collect();
        Self { queue, entries }
    }

    /// Enqueues every job due at `now` and returns how many were pushed.
    ///
    /// A job that missed several periods is enqueued once.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut pushed = 0;
        for entry in &mut self.entries {
            if entry.next_due > now {
                continue;
            }
            self.queue.push(QueuedJob::new(entry.job.clone())).await?;
            tracing::info!(job = entry.job.name(), "scheduled job enqueued");
            while entry.next_due <= now {
                entry.next_due += entry.cadence.period();
            }
            pushed += 1;
        }
        Ok(pushed)
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    self.tick(Utc::now()).await?;
                }
            }
        }
    }
}
