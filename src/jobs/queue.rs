//! Job queue backends.

use super::{BuildJob, JobQueue, QueueError};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A job in flight, with the number of failed attempts so far.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: BuildJob,
    pub attempt: u32,
}

impl QueuedJob {
    pub fn new(job: BuildJob) -> Self {
        Self { job, attempt: 0 }
    }
}

/// In-process queue backed by an unbounded tokio channel.
///
/// Delayed jobs are held by a spawned timer and delivered into the channel
/// when it fires, so `enqueue_in` must be called from within a runtime.
#[derive(Clone)]
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl TokioJobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver `queued` after `delay`, preserving its attempt count.
    pub fn schedule(&self, delay: Duration, queued: QueuedJob) -> Result<(), QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }
        if delay.is_zero() {
            return self.tx.send(queued).map_err(|_| QueueError::Closed);
        }

        let tx = self.tx.clone();
        debug!(
            "scheduling {} for container {} in {:?}",
            queued.job.name(),
            queued.job.container_id(),
            delay
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = tx.send(queued) {
                warn!("queue closed, dropping delayed job {}", err.0.job.name());
            }
        });
        Ok(())
    }
}

impl JobQueue for TokioJobQueue {
    fn enqueue(&self, job: BuildJob) -> Result<(), QueueError> {
        self.schedule(Duration::ZERO, QueuedJob::new(job))
    }

    fn enqueue_in(&self, delay: Duration, job: BuildJob) -> Result<(), QueueError> {
        self.schedule(delay, QueuedJob::new(job))
    }
}

/// A job recorded by [`MemoryJobQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job: BuildJob,
    /// `None` for immediate jobs.
    pub delay: Option<Duration>,
}

/// Queue that only records what was scheduled. Nothing ever runs.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<Vec<ScheduledJob>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    fn push(&self, job: ScheduledJob) -> Result<(), QueueError> {
        self.jobs
            .lock()
            .map_err(|_| QueueError::Closed)?
            .push(job);
        Ok(())
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: BuildJob) -> Result<(), QueueError> {
        self.push(ScheduledJob { job, delay: None })
    }

    fn enqueue_in(&self, delay: Duration, job: BuildJob) -> Result<(), QueueError> {
        self.push(ScheduledJob {
            job,
            delay: Some(delay),
        })
    }
}
