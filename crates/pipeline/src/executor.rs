//! Bounded worker pool for the persistence stage.
//!
//! A fixed number of workers pull jobs from a bounded queue. When the queue
//! is full, [`BoundedExecutor::submit`] waits, which keeps the backup reader
//! from racing ahead of the store.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Called with the panic message when a job panics.
pub type PanicHandler = Arc<dyn Fn(String) + Send + Sync>;

pub struct BoundedExecutor {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl BoundedExecutor {
    /// Start `pool_size` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(pool_size: usize, queue_capacity: usize, on_panic: Option<PanicHandler>) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = (0..pool_size.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let cancel = cancel.clone();
                let on_panic = on_panic.clone();
                tokio::spawn(async move {
                    loop {
                        let job = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            job = async { receiver.lock().await.recv().await } => job,
                        };
                        let Some(job) = job else { break };
                        if let Err(payload) = AssertUnwindSafe(job).catch_unwind().await {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(worker, panic = %message, "Import task panicked");
                            if let Some(handler) = &on_panic {
                                handler(message);
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            cancel,
        }
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(ExecutorError::ShutDown)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutorError::ShutDown),
            sent = sender.send(Box::pin(job)) => sent.map_err(|_| ExecutorError::ShutDown),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.is_none() || self.cancel.is_cancelled()
    }

    /// Stop accepting jobs and wait until every queued job has run.
    pub async fn shutdown_and_wait(mut self) {
        self.sender.take();
        self.join_workers().await;
    }

    /// Stop accepting jobs, drop the queue and wait only for running jobs.
    pub async fn shutdown_and_ignore_queue(mut self) {
        self.cancel.cancel();
        self.sender.take();
        self.join_workers().await;
    }

    async fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "Import worker ended abnormally");
            }
        }
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn runs_every_queued_job_before_shutdown_completes() {
        let executor = BoundedExecutor::new(3, 2, None);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = Arc::clone(&done);
            executor
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        executor.shutdown_and_wait().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn never_runs_more_jobs_than_workers() {
        let executor = BoundedExecutor::new(2, 4, None);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            executor
                .submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        executor.shutdown_and_wait().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_kill_its_worker() {
        let panics = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&panics);
        let handler: PanicHandler = Arc::new(move |message| {
            assert!(message.contains("boom"));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let executor = BoundedExecutor::new(1, 1, Some(handler));
        let done = Arc::new(AtomicUsize::new(0));

        executor.submit(async { panic!("boom"); }).await.unwrap();
        let after = Arc::clone(&done);
        executor
            .submit(async move {
                after.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        executor.shutdown_and_wait().await;

        assert_eq!(panics.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignoring_the_queue_drops_pending_jobs() {
        let executor = BoundedExecutor::new(1, 8, None);
        let done = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Notify::new());

        let release = Arc::clone(&gate);
        let first = Arc::clone(&done);
        executor
            .submit(async move {
                let _ = started_tx.send(());
                release.notified().await;
                first.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        for _ in 0..5 {
            let done = Arc::clone(&done);
            executor
                .submit(async move {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        started_rx.await.unwrap();

        let shutdown = tokio::spawn(executor.shutdown_and_ignore_queue());
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.notify_one();
        shutdown.await.unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_after_cancel_is_rejected() {
        let executor = BoundedExecutor::new(1, 1, None);
        executor.cancel.cancel();
        assert_eq!(executor.submit(async {}).await, Err(ExecutorError::ShutDown));
        assert!(executor.is_shut_down());
    }
}
