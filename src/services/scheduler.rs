//! Per-destination FIFO queues with at most one job in flight per destination.
//!
//! `enqueue` appends and starts a drain task when none is running. The drain
//! task owns the head of its queue: a retryable failure stays in flight for
//! the backoff delay, then goes back to the front, so later jobs never
//! overtake it. Distinct
//! jobs are spaced by a pacing delay computed from the destination's stats.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

use crate::models::dispatch::{DeliveryReceipt, FailureReason, JobReport};
use crate::models::health::{DestinationHealth, OverallHealth, SystemStatus};
use crate::models::job::{JobStatus, PrintJob};
use crate::services::breaker::CircuitState;
use crate::services::delivery::{AttemptOutcome, DeliveryExecutor};
use crate::services::stats::pacing_delay;

const COMPLETION_BUFFER: usize = 256;

struct QueuedJob {
    job: PrintJob,
    /// Set when the job is first picked up.
    deadline: Option<Instant>,
    reply: Option<oneshot::Sender<JobReport>>,
}

enum Step {
    Finish(Result<DeliveryReceipt, FailureReason>),
    /// Back off, then try the same job again before anything behind it.
    Retry(Duration),
}

#[derive(Default)]
struct DestinationQueue {
    jobs: VecDeque<QueuedJob>,
    draining: bool,
    in_flight: bool,
}

pub struct DispatchScheduler {
    executor: DeliveryExecutor,
    queues: Mutex<HashMap<String, DestinationQueue>>,
    completions: broadcast::Sender<JobReport>,
}

impl DispatchScheduler {
    pub fn new(executor: DeliveryExecutor) -> Self {
        let queues = executor
            .config()
            .destinations
            .iter()
            .map(|d| (d.id.clone(), DestinationQueue::default()))
            .collect();
        let (completions, _) = broadcast::channel(COMPLETION_BUFFER);
        Self {
            executor,
            queues: Mutex::new(queues),
            completions,
        }
    }

    pub fn executor(&self) -> &DeliveryExecutor {
        &self.executor
    }

    /// Every terminal job report, in completion order.
    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.completions.subscribe()
    }

    /// Append a job to its destination's queue. The receiver resolves exactly
    /// once, when the job reaches `completed` or `failed`.
    pub fn enqueue(self: &Arc<Self>, mut job: PrintJob) -> oneshot::Receiver<JobReport> {
        let (tx, rx) = oneshot::channel();
        let destination = job.destination_id.clone();

        if self.executor.config().destination(&destination).is_none() {
            tracing::error!(destination = %destination, job_id = %job.id, "Job for unknown destination");
            let reason = FailureReason::UnknownDestination {
                destination_id: destination,
            };
            self.finish(
                QueuedJob {
                    job,
                    deadline: None,
                    reply: Some(tx),
                },
                Err(reason),
            );
            return rx;
        }

        job.status = JobStatus::Queued;
        let job_id = job.id;
        let start_drain = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            let queue = queues.entry(destination.clone()).or_default();
            queue.jobs.push_back(QueuedJob {
                job,
                deadline: None,
                reply: Some(tx),
            });
            metrics::gauge!("receipt_queue_depth", "destination" => destination.clone())
                .set(queue.jobs.len() as f64);
            tracing::info!(
                destination = %destination,
                %job_id,
                position = queue.jobs.len(),
                "Print job queued"
            );
            !std::mem::replace(&mut queue.draining, true)
        };

        metrics::counter!("receipt_jobs_enqueued_total", "destination" => destination.clone())
            .increment(1);

        if start_drain {
            tokio::spawn(Arc::clone(self).drain(destination));
        }
        rx
    }

    async fn drain(self: Arc<Self>, destination: String) {
        tracing::debug!(destination = %destination, "Queue drain started");

        while let Some(mut entry) = self.pop_front(&destination) {
            let now = Instant::now();
            let deadline = *entry
                .deadline
                .get_or_insert(now + self.executor.config().retry.job_timeout);
            entry.job.status = JobStatus::Processing;
            entry.job.started_at.get_or_insert_with(Utc::now);

            // Each attempt runs on its own task so a panic fails this job
            // instead of wedging the queue.
            let worker = Arc::clone(&self);
            let job = entry.job.clone();
            let step = match tokio::spawn(async move { worker.process(job, deadline).await }).await {
                Ok((job, step)) => {
                    entry.job = job;
                    step
                }
                Err(e) => {
                    tracing::error!(
                        destination = %destination,
                        job_id = %entry.job.id,
                        error = %e,
                        "Print job task aborted"
                    );
                    Step::Finish(Err(FailureReason::Internal {
                        message: e.to_string(),
                    }))
                }
            };

            match step {
                Step::Retry(backoff) => {
                    entry.job.status = JobStatus::Retrying;
                    tracing::info!(
                        destination = %destination,
                        job_id = %entry.job.id,
                        next_attempt = entry.job.attempts + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying print job"
                    );
                    // Still in flight while backing off; flush cannot take it.
                    tokio::time::sleep(backoff).await;
                    self.push_front(&destination, entry);
                    continue;
                }
                Step::Finish(Ok(receipt)) => self.finish(entry, Ok(receipt)),
                Step::Finish(Err(reason)) => {
                    self.executor.report_failure(&entry.job, &reason).await;
                    self.finish(entry, Err(reason));
                }
            }

            if self.queue_length(&destination) > 0 {
                let delay = pacing_delay(
                    &self.executor.stats().get(&destination),
                    &self.executor.config().pacing,
                );
                tracing::debug!(destination = %destination, delay_ms = delay.as_millis() as u64, "Pacing before next job");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::debug!(destination = %destination, "Queue drain finished");
    }

    /// One attempt for the head job. Successes are reported here; failures
    /// are reported by the drain loop once the job is terminal.
    async fn process(&self, mut job: PrintJob, deadline: Instant) -> (PrintJob, Step) {
        let retry = &self.executor.config().retry;
        let now = Instant::now();
        let budget = deadline.saturating_duration_since(now);

        let outcome = if budget.is_zero() {
            AttemptOutcome::Failed {
                error: "job deadline elapsed".to_string(),
                retryable: false,
            }
        } else {
            self.executor.attempt_delivery(&mut job, budget).await
        };

        let step = match outcome {
            AttemptOutcome::Delivered(receipt) => {
                self.executor.report_success(&job, now.elapsed());
                Step::Finish(Ok(receipt))
            }
            AttemptOutcome::CircuitOpen => Step::Finish(Err(FailureReason::CircuitOpen)),
            AttemptOutcome::Failed { error, retryable } => {
                let backoff = retry.backoff(job.attempts);
                let can_retry = retryable
                    && job.attempts < retry.max_attempts
                    && Instant::now() + backoff < deadline;

                if can_retry {
                    Step::Retry(backoff)
                } else {
                    Step::Finish(Err(FailureReason::Exhausted {
                        attempts: job.attempts,
                        last_error: error,
                    }))
                }
            }
        };
        (job, step)
    }

    /// Take the head of the queue, or release the drain flag when empty.
    fn pop_front(&self, destination: &str) -> Option<QueuedJob> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(destination.to_string()).or_default();
        match queue.jobs.pop_front() {
            Some(entry) => {
                queue.in_flight = true;
                metrics::gauge!("receipt_queue_depth", "destination" => destination.to_string())
                    .set(queue.jobs.len() as f64);
                Some(entry)
            }
            None => {
                queue.draining = false;
                queue.in_flight = false;
                None
            }
        }
    }

    fn push_front(&self, destination: &str, entry: QueuedJob) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(destination.to_string()).or_default();
        queue.jobs.push_front(entry);
    }

    fn finish(&self, mut entry: QueuedJob, outcome: Result<DeliveryReceipt, FailureReason>) {
        let completed_at = Utc::now();
        entry.job.completed_at = Some(completed_at);

        {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(queue) = queues.get_mut(&entry.job.destination_id) {
                queue.in_flight = false;
            }
        }

        let (status, delivery, failure) = match outcome {
            Ok(receipt) => (JobStatus::Completed, Some(receipt), None),
            Err(reason) => (JobStatus::Failed, None, Some(reason)),
        };
        entry.job.status = status;

        match &failure {
            None => {
                metrics::counter!("receipt_jobs_completed_total", "destination" => entry.job.destination_id.clone())
                    .increment(1);
                tracing::info!(
                    destination = %entry.job.destination_id,
                    job_id = %entry.job.id,
                    attempts = entry.job.attempts,
                    "Print job completed"
                );
            }
            Some(reason) => {
                metrics::counter!(
                    "receipt_jobs_failed_total",
                    "destination" => entry.job.destination_id.clone(),
                    "reason" => reason.tag()
                )
                .increment(1);
                tracing::error!(
                    destination = %entry.job.destination_id,
                    job_id = %entry.job.id,
                    attempts = entry.job.attempts,
                    reason = %reason,
                    "Print job failed"
                );
            }
        }

        let report = JobReport {
            job_id: entry.job.id,
            destination_id: entry.job.destination_id.clone(),
            order_id: entry.job.slice.order_id.clone(),
            token_number: entry.job.slice.token_number.clone(),
            status,
            attempts: entry.job.attempts,
            delivery,
            failure,
            enqueued_at: entry.job.enqueued_at,
            started_at: entry.job.started_at,
            completed_at,
        };

        if let Some(reply) = entry.reply.take() {
            // The enqueuer may have stopped waiting.
            let _ = reply.send(report.clone());
        }
        let _ = self.completions.send(report);
    }

    pub fn queue_length(&self, destination: &str) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(destination).map_or(0, |q| q.jobs.len())
    }

    /// Drop every queued (not in-flight) job of one destination, or of all
    /// of them. Each dropped job fails with `flushed` and goes through the
    /// fallback alerts once.
    pub async fn flush(&self, destination: Option<&str>) -> usize {
        let flushed: Vec<QueuedJob> = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            queues
                .iter_mut()
                .filter(|(id, _)| destination.map_or(true, |d| d == id.as_str()))
                .flat_map(|(_, queue)| queue.jobs.drain(..).collect::<Vec<_>>())
                .collect()
        };

        let count = flushed.len();
        tracing::warn!(destination = destination.unwrap_or("all"), count, "Flushing print queues");

        for entry in flushed {
            let reason = FailureReason::Flushed;
            self.executor.report_failure(&entry.job, &reason).await;
            self.finish(entry, Err(reason));
        }
        count
    }

    /// Health of every configured destination, in configuration order.
    pub fn system_status(&self) -> SystemStatus {
        let config = self.executor.config();
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);

        let destinations: Vec<DestinationHealth> = config
            .destinations
            .iter()
            .map(|d| {
                let breaker = self.executor.breakers().snapshot(&d.id);
                let stats = self.executor.stats().get(&d.id);
                let queue = queues.get(&d.id);
                DestinationHealth {
                    destination_id: d.id.clone(),
                    name: d.name.clone(),
                    circuit_state: breaker.state,
                    queue_length: queue.map_or(0, |q| q.jobs.len()),
                    in_flight: queue.is_some_and(|q| q.in_flight),
                    consecutive_failures: breaker.consecutive_failures,
                    success_rate: stats.success_rate_percent(),
                    avg_response_ms: stats.avg_duration_ms.round() as u64,
                    last_failure_at: breaker.last_failure_at,
                }
            })
            .collect();

        let closed = destinations
            .iter()
            .filter(|d| d.circuit_state == CircuitState::Closed)
            .count();

        SystemStatus {
            timestamp: Utc::now(),
            overall: OverallHealth::from_counts(closed, destinations.len()),
            healthy_destinations: closed,
            total_destinations: destinations.len(),
            total_queue_length: destinations.iter().map(|d| d.queue_length).sum(),
            destinations,
        }
    }
}
