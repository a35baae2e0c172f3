//! Bounded work queue and the worker pool draining it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::models::InFlightIds;
use domain::SyncError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::middleware::metrics::record_enqueue_rejected;
use crate::services::{DeployService, MetadataFetchService};

/// A unit of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Fetch { job_id: i64 },
    Deploy { deploy_job_id: i64 },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Fetch { .. } => "fetch",
            Task::Deploy { .. } => "deploy",
        }
    }
}

/// Tasks accepted by the queue that no worker has finished yet.
///
/// Shared between the queue, the workers and the stale-job sweep.
#[derive(Clone, Default)]
pub struct InFlight {
    tasks: Arc<StdMutex<HashSet<Task>>>,
}

impl InFlight {
    fn insert(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task);
    }

    fn remove(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task);
    }

    pub fn ids(&self) -> InFlightIds {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids = InFlightIds::default();
        for task in tasks.iter() {
            match *task {
                Task::Fetch { job_id } => ids.jobs.push(job_id),
                Task::Deploy { deploy_job_id } => ids.deploy_jobs.push(deploy_job_id),
            }
        }
        ids
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    in_flight: InFlight,
}

/// Consumer side of the queue, handed to the worker pool.
pub struct TaskReceiver {
    receiver: mpsc::Receiver<Task>,
    in_flight: InFlight,
}

impl TaskReceiver {
    pub async fn recv(&mut self) -> Option<Task> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Task, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl TaskQueue {
    pub fn new(capacity: usize) -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        let in_flight = InFlight::default();
        (
            Self {
                sender,
                in_flight: in_flight.clone(),
            },
            TaskReceiver {
                receiver,
                in_flight,
            },
        )
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Hands a task to the workers without waiting for room.
    ///
    /// The task counts as in flight from here until a worker finishes it.
    pub fn enqueue(&self, task: Task) -> Result<(), SyncError> {
        self.in_flight.insert(task);
        self.sender.try_send(task).map_err(|err| {
            self.in_flight.remove(task);
            record_enqueue_rejected(task.kind());
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "work queue is full",
                mpsc::error::TrySendError::Closed(_) => "work queue is shut down",
            };
            warn!(?task, reason, "Task rejected");
            SyncError::QueueUnavailable(reason.to_string())
        })?;
        debug!(?task, "Task enqueued");
        Ok(())
    }
}

/// Executes tasks taken off the queue.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task);
}

/// Dispatches tasks to the fetch and deploy services.
pub struct TaskRunner {
    fetch: MetadataFetchService,
    deploy: DeployService,
}

impl TaskRunner {
    pub fn new(fetch: MetadataFetchService, deploy: DeployService) -> Self {
        Self { fetch, deploy }
    }
}

#[async_trait]
impl TaskHandler for TaskRunner {
    async fn handle(&self, task: Task) {
        match task {
            Task::Fetch { job_id } => self.fetch.run(job_id).await,
            Task::Deploy { deploy_job_id } => self.deploy.run(deploy_job_id).await,
        }
    }
}

/// Fixed set of workers sharing one receiver.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        concurrency: usize,
        receiver: TaskReceiver,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight = receiver.in_flight.clone();
        let receiver = Arc::new(Mutex::new(receiver));

        info!(concurrency, "Starting worker pool");

        let handles = (0..concurrency)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                let in_flight = in_flight.clone();
                let mut shutdown_rx = shutdown_rx.clone();

                tokio::spawn(async move {
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => None,
                            task = async { receiver.lock().await.recv().await } => task,
                        };
                        let Some(task) = next else {
                            break;
                        };

                        debug!(worker, ?task, "Task received");
                        let handler = Arc::clone(&handler);
                        if let Err(e) = tokio::spawn(async move { handler.handle(task).await }).await
                        {
                            error!(worker, ?task, error = %e, "Task panicked");
                        }
                        in_flight.remove(task);
                    }
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Stops workers from taking new tasks. In-flight tasks keep running.
    pub fn shutdown(&self) {
        info!("Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits up to `timeout` for in-flight tasks to finish.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let drain = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Worker panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => info!("All workers stopped"),
            Err(_) => warn!(
                "Worker shutdown timed out after {:?}; unfinished jobs will be failed by the stale-job sweep",
                timeout
            ),
        }
    }
}
