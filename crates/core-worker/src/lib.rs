//! Worker-side runtime: the half of the frame protocol that lives inside
//! each panel process.
//!
//! A worker reads framed messages from stdin, decodes them into the typed
//! [`InboundMessage`] union, and feeds them to its [`Panel`]. The runtime
//! owns the contract obligations so panels cannot get them wrong: READY
//! after startup, PONG for PING with payload and seq echoed, prompt clean
//! exit on SHUTDOWN, and unknown types ignored rather than fatal.

pub mod rpc;
pub mod runtime;

pub use rpc::{RpcError, RpcHandler, spawn_socket_endpoint};
pub use runtime::{InboundMessage, Outbox, Panel, run_with_io};

use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("WORKER_ID not set")]
    MissingId,
    #[error("WORKER_OPTIONS is not valid JSON: {0}")]
    BadOptions(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identity and configuration passed by the supervisor through the
/// environment. Unknown variables are ignored by construction — only the
/// three contract variables are read.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub id: String,
    pub options: Value,
    pub instance_dir: Option<PathBuf>,
}

impl WorkerContext {
    pub fn from_env() -> Result<Self, WorkerError> {
        let id = std::env::var("WORKER_ID").map_err(|_| WorkerError::MissingId)?;
        let options = match std::env::var("WORKER_OPTIONS") {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => Value::Null,
        };
        let instance_dir = std::env::var_os("INSTANCE_DIR").map(PathBuf::from);
        Ok(Self {
            id,
            options,
            instance_dir,
        })
    }

    /// Path of this worker's optional Unix-socket endpoint.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.instance_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.sock", self.id)))
    }
}
