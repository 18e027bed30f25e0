//! Worker supervision and event routing.
//!
//! The supervisor owns every pipe: it spawns workers with piped
//! stdin/stdout, runs one reader task per worker feeding a single dispatch
//! queue, and consults the declarative wiring table under a short critical
//! section to forward events between workers. Per-worker failures are
//! contained; the rest of the dashboard keeps running.

pub mod outbound;
pub mod supervisor;
pub mod wiring;
pub mod worker;

pub use outbound::{OutboundQueue, PushOutcome};
pub use supervisor::{Supervisor, SupervisorOptions};
pub use wiring::{WiringRule, WiringTable};
pub use worker::{WorkerCommand, WorkerDescriptor};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("failed to spawn worker '{id}': {source}")]
    Spawn {
        id: String,
        source: std::io::Error,
    },
    #[error("workers not ready within {timeout_ms} ms: {missing:?}")]
    ReadyTimeout {
        timeout_ms: u64,
        missing: Vec<String>,
    },
    #[error("unknown worker '{0}'")]
    UnknownWorker(String),
    #[error("worker '{0}' is no longer accepting frames")]
    WorkerGone(String),
    #[error("instance directory: {0}")]
    InstanceDir(std::io::Error),
    #[error("duplicate worker id '{0}'")]
    DuplicateWorker(String),
}
