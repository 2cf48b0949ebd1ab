//! In-process message topic with a worker pool.
//!
//! Messages are delivered at least once: a handler error requeues the message
//! after a delay until it has been attempted `max_attempts` times.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Disposition;
use crate::error::{Error, Result};

/// Default number of deliveries before a failing message is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before a failed message is redelivered.
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_millis(500);

/// One message as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Identifier assigned at publish time.
    pub id: u64,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Number of times this message has been delivered, including this one.
    pub attempts: u32,
}

/// Processes delivered messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one delivery.
    ///
    /// # Errors
    ///
    /// An error requeues the message.
    async fn handle(&self, delivery: &Delivery) -> Result<Disposition>;
}

/// Create a topic buffering up to `capacity` messages.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn channel(capacity: usize) -> (Publisher, Consumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let requeue = tx.downgrade();
    let publisher = Publisher {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let consumer = Consumer {
        rx,
        requeue,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        requeue_delay: DEFAULT_REQUEUE_DELAY,
    };
    (publisher, consumer)
}

/// Sending half of a topic. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Delivery>,
    next_id: Arc<AtomicU64>,
}

impl Publisher {
    /// Publish `body`, waiting for buffer space if the topic is full.
    ///
    /// Returns the message id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the consumer has gone away.
    pub async fn publish(&self, body: Vec<u8>) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Delivery {
                id,
                body,
                attempts: 0,
            })
            .await
            .map_err(|_| Error::QueueClosed)?;
        debug!(message_id = id, "Published message");
        Ok(id)
    }
}

/// Receiving half of a topic.
#[derive(Debug)]
pub struct Consumer {
    rx: mpsc::Receiver<Delivery>,
    requeue: mpsc::WeakSender<Delivery>,
    max_attempts: u32,
    requeue_delay: Duration,
}

impl Consumer {
    /// Set how often a failing message is attempted and how long to wait
    /// between attempts.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, requeue_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.requeue_delay = requeue_delay;
        self
    }

    /// Deliver messages to `handler` from `workers` concurrent tasks.
    ///
    /// Returns once every publisher has been dropped and the topic is
    /// drained, pending redeliveries included. Cancelling `token` is a hard
    /// stop: messages being handled finish, everything still buffered is
    /// dropped and logged.
    ///
    /// Returns the number of buffered messages dropped by a hard stop.
    pub async fn run<H: MessageHandler>(
        self,
        handler: Arc<H>,
        workers: usize,
        token: CancellationToken,
    ) -> usize {
        let Self {
            rx,
            requeue,
            max_attempts,
            requeue_delay,
        } = self;
        let rx = Arc::new(Mutex::new(rx));
        let retry = Arc::new(Retry {
            requeue,
            max_attempts,
            requeue_delay,
            token: token.clone(),
        });

        let mut tasks = JoinSet::new();
        for worker in 0..workers.max(1) {
            tasks.spawn(worker_loop(
                worker,
                rx.clone(),
                handler.clone(),
                retry.clone(),
                token.clone(),
            ));
        }
        info!(workers = workers.max(1), "Consumer started");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Consumer worker panicked");
            }
        }

        let mut rx = rx.lock().await;
        rx.close();
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Consumer stopped with undelivered messages");
        } else {
            info!("Consumer stopped");
        }
        dropped
    }
}

#[derive(Debug)]
struct Retry {
    requeue: mpsc::WeakSender<Delivery>,
    max_attempts: u32,
    requeue_delay: Duration,
    token: CancellationToken,
}

/// Where a failed delivery goes next.
enum Redelivery {
    /// Back on the topic after the delay, or given up on.
    Scheduled,
    /// The topic has no publishers left; the worker retries it itself.
    Local(Delivery),
}

impl Retry {
    fn schedule(&self, delivery: Delivery) -> Redelivery {
        if delivery.attempts >= self.max_attempts {
            error!(
                message_id = delivery.id,
                attempts = delivery.attempts,
                "Giving up on message"
            );
            return Redelivery::Scheduled;
        }

        // The upgraded sender keeps the topic open until the message is back.
        let Some(tx) = self.requeue.upgrade() else {
            return Redelivery::Local(delivery);
        };
        let delay = self.requeue_delay;
        let token = self.token.clone();
        tokio::spawn(async move {
            let id = delivery.id;
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    warn!(message_id = id, "Consumer stopped, dropping failed message");
                }
                () = tokio::time::sleep(delay) => {
                    if tx.send(delivery).await.is_err() {
                        warn!(message_id = id, "Consumer gone, dropping failed message");
                    }
                }
            }
        });
        Redelivery::Scheduled
    }

    /// Wait out the requeue delay; `false` if the consumer was stopped.
    async fn wait(&self) -> bool {
        tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(self.requeue_delay) => true,
        }
    }
}

async fn worker_loop<H: MessageHandler>(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    handler: Arc<H>,
    retry: Arc<Retry>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = async { rx.lock().await.recv().await } => next,
        };
        let Some(delivery) = next else {
            break;
        };
        deliver(worker, delivery, handler.as_ref(), &retry).await;
    }
    debug!(worker, "Worker stopped");
}

async fn deliver<H: MessageHandler>(
    worker: usize,
    mut delivery: Delivery,
    handler: &H,
    retry: &Retry,
) {
    loop {
        delivery.attempts += 1;
        debug!(
            worker,
            message_id = delivery.id,
            attempts = delivery.attempts,
            body = %String::from_utf8_lossy(&delivery.body),
            "Received a new message"
        );

        match handler.handle(&delivery).await {
            Ok(Disposition::Applied) => {
                debug!(worker, message_id = delivery.id, "Message processed");
                return;
            }
            Ok(Disposition::Discarded(reason)) => {
                info!(worker, message_id = delivery.id, %reason, "Message discarded");
                return;
            }
            Err(e) => {
                warn!(
                    worker,
                    message_id = delivery.id,
                    attempts = delivery.attempts,
                    error = %e,
                    "Message handling failed"
                );
            }
        }

        match retry.schedule(delivery) {
            Redelivery::Scheduled => return,
            Redelivery::Local(failed) => {
                if !retry.wait().await {
                    warn!(
                        worker,
                        message_id = failed.id,
                        "Consumer stopped, dropping failed message"
                    );
                    return;
                }
                delivery = failed;
            }
        }
    }
}
