//! Background worker draining the in-process job queue.

use super::{JobRunner, QueuedJob, TokioJobQueue};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Exponential backoff applied to failed jobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `failures` (1 after the first failure).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

pub struct JobWorker {
    queue: TokioJobQueue,
    rx: mpsc::UnboundedReceiver<QueuedJob>,
    runner: JobRunner,
    policy: RetryPolicy,
}

impl JobWorker {
    /// `queue` must be the sender paired with `rx`; retries go back through it.
    pub fn new(
        queue: TokioJobQueue,
        rx: mpsc::UnboundedReceiver<QueuedJob>,
        runner: JobRunner,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            rx,
            runner,
            policy,
        }
    }

    pub async fn run(mut self) {
        info!("Job worker started, waiting for jobs...");
        while let Some(queued) = self.rx.recv().await {
            self.process(queued).await;
        }
        info!("Job queue closed, worker exiting");
    }

    async fn process(&self, queued: QueuedJob) {
        let name = queued.job.name();
        let container_id = queued.job.container_id();
        info!("Running {} for container {}", name, container_id);

        let err = match self.runner.run(&queued.job).await {
            Ok(()) => return,
            Err(err) => err,
        };

        let failures = queued.attempt + 1;
        if failures >= self.policy.max_attempts {
            error!(
                "{} for container {} failed after {} attempts, giving up: {:#}",
                name, container_id, failures, err
            );
            return;
        }

        let delay = self.policy.backoff(failures);
        warn!(
            "{} for container {} failed (attempt {}), retrying in {:?}: {:#}",
            name, container_id, failures, delay, err
        );
        let retry = QueuedJob {
            job: queued.job,
            attempt: failures,
        };
        if let Err(err) = self.queue.schedule(delay, retry) {
            error!("could not reschedule {}: {}", name, err);
        }
    }
}
