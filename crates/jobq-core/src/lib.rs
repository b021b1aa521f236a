pub mod clock;
mod config;
mod error;
mod job;
mod store;
mod workers;

pub use error::QueueError;
pub use job::{
    DlqEntry, DlqPayload, Job, JobId, JobState, NewJob, QueueStatus, WorkerRow, generate_id,
    truncate_chars,
};
pub use store::{LEASE_SECS, MAX_ERROR_CHARS, SqliteStore};
pub use workers::ACTIVE_WINDOW_SECS;
