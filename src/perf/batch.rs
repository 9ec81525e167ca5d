//! Request coalescing: many single-key loads issued within a short window
//! become one grouped fetch.
//!
//! A cache miss on a point read would otherwise fan out into one downstream
//! query per caller. The loader trades a few milliseconds of added latency
//! (the batching window) for collapsing that storm into a single call.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

/// How long enqueued loads wait for more company before flushing.
const BATCH_WINDOW: Duration = Duration::from_millis(10);

/// Grouped fetch: receives the queued keys, must return one value per key
/// in the same order.
pub type BatchFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, anyhow::Result<Vec<V>>> + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    /// The grouped fetch failed; every caller in the batch gets this error.
    #[error("batch load failed: {0}")]
    Failed(Arc<anyhow::Error>),
    /// The batch function broke the one-result-per-key contract.
    #[error("batch function returned {returned} results for {requested} keys")]
    ShapeMismatch { requested: usize, returned: usize },
    /// The loader was dropped before delivering a result.
    #[error("batch loader dropped before delivering a result")]
    Dropped,
}

struct Pending<K, V> {
    key: K,
    tx: oneshot::Sender<Result<V, BatchError>>,
}

struct Queue<K, V> {
    pending: Vec<Pending<K, V>>,
    timer_armed: bool,
    /// Incremented on every flush. A window timer only flushes if the
    /// generation it was armed for is still current, so a size-triggered
    /// flush can never be followed by a premature flush of the next queue.
    generation: u64,
}

enum Enqueued<K, V> {
    FlushNow(Vec<Pending<K, V>>),
    ArmTimer(u64),
    Queued,
}

/// Coalesces concurrent `load(key)` calls into batched fetches.
///
/// A load that fills the queue to `max_batch_size` flushes within the same
/// call; otherwise the first load of a cycle arms a window timer. Loads
/// arriving during an in-flight flush start a fresh queue/timer cycle.
pub struct BatchLoader<K, V> {
    inner: Arc<Mutex<Queue<K, V>>>,
    batch_fn: BatchFn<K, V>,
    max_batch_size: usize,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            batch_fn: Arc::clone(&self.batch_fn),
            max_batch_size: self.max_batch_size,
        }
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub fn new<F>(max_batch_size: usize, batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> BoxFuture<'static, anyhow::Result<Vec<V>>> + Send + Sync + 'static,
    {
        assert!(max_batch_size > 0, "max_batch_size must be positive");
        Self {
            inner: Arc::new(Mutex::new(Queue {
                pending: Vec::new(),
                timer_armed: false,
                generation: 0,
            })),
            batch_fn: Arc::new(batch_fn),
            max_batch_size,
        }
    }

    /// Enqueue a key and wait for its value from the next flush.
    pub async fn load(&self, key: K) -> Result<V, BatchError> {
        let (tx, rx) = oneshot::channel();
        let enqueued = {
            let mut queue = self.inner.lock().unwrap();
            queue.pending.push(Pending { key, tx });
            if queue.pending.len() >= self.max_batch_size {
                queue.timer_armed = false;
                queue.generation += 1;
                Enqueued::FlushNow(std::mem::take(&mut queue.pending))
            } else if !queue.timer_armed {
                queue.timer_armed = true;
                Enqueued::ArmTimer(queue.generation)
            } else {
                Enqueued::Queued
            }
        };

        match enqueued {
            // The bound was hit: this caller drives the flush itself.
            Enqueued::FlushNow(batch) => self.run_batch(batch).await,
            Enqueued::ArmTimer(generation) => {
                let loader = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(BATCH_WINDOW).await;
                    loader.flush_generation(generation).await;
                });
            }
            Enqueued::Queued => {}
        }

        rx.await.unwrap_or(Err(BatchError::Dropped))
    }

    /// Flush the queue the window timer was armed for, unless a
    /// size-triggered flush already took it.
    async fn flush_generation(&self, generation: u64) {
        let batch = {
            let mut queue = self.inner.lock().unwrap();
            if queue.generation != generation {
                return;
            }
            queue.timer_armed = false;
            queue.generation += 1;
            std::mem::take(&mut queue.pending)
        };
        self.run_batch(batch).await;
    }

    async fn run_batch(&self, batch: Vec<Pending<K, V>>) {
        if batch.is_empty() {
            return;
        }
        let requested = batch.len();
        trace!(keys = requested, "flushing batch");

        let (keys, txs): (Vec<K>, Vec<_>) =
            batch.into_iter().map(|p| (p.key, p.tx)).unzip();

        match (self.batch_fn)(keys).await {
            Ok(values) if values.len() == requested => {
                for (tx, value) in txs.into_iter().zip(values) {
                    let _ = tx.send(Ok(value));
                }
            }
            Ok(values) => {
                let err = BatchError::ShapeMismatch {
                    requested,
                    returned: values.len(),
                };
                for tx in txs {
                    let _ = tx.send(Err(err.clone()));
                }
            }
            // One shared error for every caller in the batch.
            Err(e) => {
                let shared = Arc::new(e);
                for tx in txs {
                    let _ = tx.send(Err(BatchError::Failed(Arc::clone(&shared))));
                }
            }
        }
    }
}
