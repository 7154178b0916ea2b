pub mod pipeline;

pub use pipeline::Pipeline;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::pr::{PrActivity, PullRequestMetadata, RepoRef};

/// How long in-flight tasks may keep running after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// One accepted pull-request event, owned by the task that processes it.
#[derive(Debug, Clone)]
pub struct DispatchTask {
    pub repo: RepoRef,
    pub metadata: PullRequestMetadata,
    /// What the author did, taken from the webhook action
    pub activity: PrActivity,
    pub delivery: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatcher is not accepting events")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub accepting: bool,
    pub in_flight: usize,
    pub queued: usize,
    pub completed: u64,
}

/// Hands accepted events to background processing.
///
/// `dispatch` must return without waiting on any network work.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, task: DispatchTask) -> Result<(), DispatchError>;

    fn status(&self) -> DispatcherStatus;
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
}

/// Decrements `in_flight` when a task ends, including by panic.
struct InFlight(Arc<Counters>);

impl InFlight {
    fn enter(counters: &Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(counters.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded queue drained by one worker loop that runs at most
/// `max_concurrent` pipelines at a time.
pub struct Dispatcher {
    sender: Mutex<Option<mpsc::Sender<DispatchTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Spawn the worker loop. Must be called inside a Tokio runtime.
    pub fn start(pipeline: Arc<Pipeline>, max_concurrent: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(
            receiver,
            pipeline,
            max_concurrent.max(1),
            counters.clone(),
        ));
        info!(max_concurrent, queue_depth, "dispatcher started");

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Stop accepting events. Queued and running tasks still finish.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            info!("dispatcher closed to new events");
        }
    }

    /// Close, then wait up to `grace` for queued and running tasks.
    pub async fn shutdown(&self, grace: Duration) {
        self.close();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        match tokio::time::timeout(grace, worker).await {
            Ok(Ok(())) => info!("all dispatch tasks finished"),
            Ok(Err(e)) => error!(error = %e, "dispatch worker failed"),
            Err(_) => {
                let status = self.status();
                warn!(
                    in_flight = status.in_flight,
                    queued = status.queued,
                    grace_secs = grace.as_secs(),
                    "abandoning unfinished dispatch tasks"
                );
            }
        }
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, task: DispatchTask) -> Result<(), DispatchError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(DispatchError::Closed)?;

        // Count before sending so the worker never decrements below zero.
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        sender.try_send(task).map_err(|e| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            }
        })
    }

    fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            accepting: self
                .sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<DispatchTask>,
    pipeline: Arc<Pipeline>,
    max_concurrent: usize,
    counters: Arc<Counters>,
) {
    let limit = Arc::new(Semaphore::new(max_concurrent));
    let mut tasks = JoinSet::new();

    loop {
        // Take a slot before pulling from the queue so waiting events stay
        // counted as queued.
        let permit = tokio::select! {
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            Some(joined) = tasks.join_next() => {
                reap(joined);
                continue;
            }
        };
        let task = tokio::select! {
            received = receiver.recv() => match received {
                Some(task) => task,
                None => break,
            },
            Some(joined) = tasks.join_next() => {
                reap(joined);
                continue;
            }
        };
        let in_flight = InFlight::enter(&counters);
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        let span = info_span!(
            "dispatch",
            owner = %task.repo.owner,
            repo = %task.repo.name,
            pr = task.metadata.number,
            activity = %task.activity,
            delivery = task.delivery.as_deref().unwrap_or("-"),
        );
        let pipeline = pipeline.clone();
        let counters = counters.clone();
        tasks.spawn(
            async move {
                let _permit = permit;
                let _in_flight = in_flight;
                let outcome = pipeline.run(task).await;
                counters.completed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    files_fetched = outcome.files_fetched,
                    origin = ?outcome.origin,
                    published = outcome.published,
                    "dispatch task finished"
                );
            }
            .instrument(span),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        reap(joined);
    }
    debug!("dispatch worker stopped");
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "dispatch task panicked");
        } else {
            warn!(error = %e, "dispatch task cancelled");
        }
    }
}
