//! Background work: the task queue and periodic maintenance jobs.

mod job_cleanup;
mod queue;
mod scheduler;
mod stale_jobs;

pub use job_cleanup::ExpiredJobCleanupJob;
pub use queue::{InFlight, Task, TaskHandler, TaskQueue, TaskReceiver, TaskRunner, WorkerPool};
pub use scheduler::{JobFrequency, JobScheduler, PeriodicJob};
pub use stale_jobs::{StaleJobSweepJob, STALE_JOB_MESSAGE};
