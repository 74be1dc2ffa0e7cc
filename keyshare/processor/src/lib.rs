//! Work processor for the keyshare daemon.
//!
//! Every block fans out into one derivation and one submission per managed validator. Rather
//! than spawning those directly, listeners hand [`WorkItem`]s to the processor through
//! [`Sender`]s. Derivations are CPU bound and go through the `key_derivation` queue, which needs a
//! permit per running item so that a burst of blocks cannot saturate the blocking thread pool.
//! Submissions and share fetches mostly wait on the network and go through the `permitless`
//! queue, which spawns immediately.

mod metrics;

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use task_executor::TaskExecutor;
use tokio::select;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{error, warn};

/// Capacity of each queue
const QUEUE_LENGTH: usize = 1000;

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Configuration for a processor. Provided to [spawn].
pub struct Config {
    /// The maximum amount of concurrent derivation workers. Work submitted via
    /// [Senders::permitless] does not count towards this limit. By default, this is the number of
    /// logical CPUs.
    pub max_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sender {
    tx: mpsc::Sender<WorkItem>,
}

impl Sender {
    /// Convenience method creating an async [`WorkItem`] and sending it.
    pub fn send_async<F: Future<Output = ()> + Send + 'static>(
        &self,
        future: F,
        name: &'static str,
    ) -> Result<(), TrySendError<WorkItem>> {
        self.send_work_item(WorkItem::new_async(name, future))
    }

    /// Convenience method creating a blocking [`WorkItem`] and sending it.
    pub fn send_blocking<F: FnOnce() + Send + 'static>(
        &self,
        func: F,
        name: &'static str,
    ) -> Result<(), TrySendError<WorkItem>> {
        self.send_work_item(WorkItem::new_blocking(name, func))
    }

    /// Sends a [`WorkItem`] into the queue, non-blocking, returning an error if the queue is full.
    /// Handles metrics and logging for you.
    pub fn send_work_item(&self, item: WorkItem) -> Result<(), TrySendError<WorkItem>> {
        let name = item.name;
        let result = self.tx.try_send(item);
        if let Err(err) = &result {
            metrics::inc_counter_vec(&metrics::KEYSHARE_PROCESSOR_SEND_ERROR_PER_WORK_TYPE, &[name]);
            match err {
                TrySendError::Full(_) => {
                    warn!(task = name, "Processor queue full")
                }
                TrySendError::Closed(_) => {
                    error!("Processor queue closed unexpectedly")
                }
            }
        } else {
            metrics::inc_counter_vec(
                &metrics::KEYSHARE_PROCESSOR_WORK_EVENTS_SUBMITTED_COUNT,
                &[name],
            );
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The queues of the keyshare daemon.
#[derive(Clone, Debug)]
pub struct Senders {
    /// Network bound tasks: keyshare submissions and share fetches. Launched immediately and
    /// not counted against [`Config::max_workers`].
    pub permitless: Sender,
    /// Key derivations, run on the blocking pool, at most [`Config::max_workers`] at a time.
    pub key_derivation: Sender,
}

struct Receivers {
    permitless_rx: mpsc::Receiver<WorkItem>,
    key_derivation_rx: mpsc::Receiver<WorkItem>,
}

pub type AsyncFn = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type BlockingFn = Box<dyn FnOnce() + Send>;

enum WorkKind {
    Async(AsyncFn),
    Blocking(BlockingFn),
}

impl Debug for WorkKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkKind::Async(_) => f.write_str("Async"),
            WorkKind::Blocking(_) => f.write_str("Blocking"),
        }
    }
}

#[derive(Debug)]
pub struct WorkItem {
    func: WorkKind,
    name: &'static str,
}

impl WorkItem {
    /// Create an async work task. Will be spawned on the Tokio runtime.
    pub fn new_async<F: Future<Output = ()> + Send + 'static>(name: &'static str, func: F) -> Self {
        Self {
            name,
            func: WorkKind::Async(Box::pin(func)),
        }
    }

    /// Create a blocking work task. Will be spawned on the Tokio runtime using `spawn_blocking`.
    pub fn new_blocking<F: FnOnce() + Send + 'static>(name: &'static str, func: F) -> Self {
        Self {
            name,
            func: WorkKind::Blocking(Box::new(func)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Refunds the permit and updates metrics on drop.
#[derive(Debug)]
struct DropOnFinish {
    permit: Option<OwnedSemaphorePermit>,
    _work_timer: Option<metrics::HistogramTimer>,
}

impl Drop for DropOnFinish {
    fn drop(&mut self) {
        metrics::dec_gauge(&metrics::KEYSHARE_PROCESSOR_WORKERS_ACTIVE_TOTAL);
        if self.permit.is_some() {
            metrics::dec_gauge(&metrics::KEYSHARE_PROCESSOR_PERMIT_WORKERS_ACTIVE_TOTAL);
        }
    }
}

/// Create a new processor and spawn it with the given executor. Returns the queue senders.
pub fn spawn(config: Config, executor: TaskExecutor) -> Senders {
    let (permitless_tx, permitless_rx) = mpsc::channel(QUEUE_LENGTH);
    let (key_derivation_tx, key_derivation_rx) = mpsc::channel(QUEUE_LENGTH);

    let senders = Senders {
        permitless: Sender { tx: permitless_tx },
        key_derivation: Sender {
            tx: key_derivation_tx,
        },
    };
    let receivers = Receivers {
        permitless_rx,
        key_derivation_rx,
    };

    executor.spawn(processor(config, receivers, executor.clone()), "processor");
    senders
}

async fn processor(config: Config, mut receivers: Receivers, executor: TaskExecutor) {
    let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));

    loop {
        // Try to get the next work item. work_item will only be None when the queues are closed.
        // Permit will be None when the item was received from permitless_rx.
        let (permit, work_item) = select! {
            biased;
            Some(w) = receivers.permitless_rx.recv() => (None, Some(w)),
            Ok(permit) = semaphore.clone().acquire_owned() => {
                select! {
                    biased;
                    Some(w) = receivers.key_derivation_rx.recv() => (Some(permit), Some(w)),

                    // we hold a permit, but submissions must not wait behind derivations
                    Some(w) = receivers.permitless_rx.recv() => (None, Some(w)),
                    else => (None, None),
                }
            }
            else => (None, None),
        };
        let Some(work_item) = work_item else {
            error!("Processor queues closed unexpectedly");
            break;
        };

        metrics::inc_gauge(&metrics::KEYSHARE_PROCESSOR_WORKERS_ACTIVE_TOTAL);
        if permit.is_some() {
            metrics::inc_gauge(&metrics::KEYSHARE_PROCESSOR_PERMIT_WORKERS_ACTIVE_TOTAL);
        }
        metrics::inc_counter_vec(
            &metrics::KEYSHARE_PROCESSOR_WORK_EVENTS_STARTED_COUNT,
            &[work_item.name],
        );
        let drop_on_finish = DropOnFinish {
            permit,
            _work_timer: metrics::start_timer_vec(
                &metrics::KEYSHARE_PROCESSOR_WORKER_TIME,
                &[work_item.name],
            ),
        };

        match work_item.func {
            WorkKind::Async(async_fn) => executor.spawn(
                async move {
                    async_fn.await;
                    drop(drop_on_finish);
                },
                work_item.name,
            ),
            WorkKind::Blocking(blocking_fn) => {
                executor.spawn_blocking(
                    move || {
                        blocking_fn();
                        drop(drop_on_finish);
                    },
                    work_item.name,
                );
            }
        }
    }
}
