//! Optional per-worker Unix-socket endpoint: line-delimited JSON-RPC 2.0.
//!
//! External programs connect to `{INSTANCE_DIR}/{WORKER_ID}.sock` and send
//! one request object per line. Requests carrying an `id` get exactly one
//! response line (`result` or `error`); notifications (no `id`) trigger
//! the handler and produce no reply. Methods themselves are worker-defined
//! through the handler closure.

use crate::WorkerContext;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Internal(String),
}

impl RpcError {
    fn code(&self) -> i32 {
        match self {
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::Internal(_) => -32603,
        }
    }
}

/// Worker-defined method table.
pub type RpcHandler =
    Arc<dyn Fn(&str, Option<Value>) -> Result<Value, RpcError> + Send + Sync + 'static>;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<i64>,
}

fn respond(id: i64, result: Result<Value, RpcError>) -> String {
    let body = match result {
        Ok(value) => json!({"jsonrpc": "2.0", "id": id, "result": value}),
        Err(err) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": err.code(), "message": err.to_string()}
        }),
    };
    body.to_string()
}

/// Process one request line; `None` means no reply (notification or
/// unparseable garbage, which JSON-RPC says to ignore for notifications
/// and which we drop rather than guess an id for).
fn handle_line(line: &str, handler: &RpcHandler) -> Option<String> {
    let request: RpcRequest = serde_json::from_str(line).ok()?;
    let result = handler(&request.method, request.params);
    match request.id {
        Some(id) => Some(respond(id, result)),
        None => None,
    }
}

/// Listen on this worker's socket, serving each connection on its own
/// task. Returns `None` when the context has no instance directory (the
/// endpoint is optional). The socket file is removed on a previous stale
/// run's leftover before binding.
#[cfg(unix)]
pub fn spawn_socket_endpoint(
    ctx: &WorkerContext,
    handler: RpcHandler,
) -> std::io::Result<Option<JoinHandle<()>>> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;
    use tracing::{debug, warn};

    let Some(path) = ctx.socket_path() else {
        return Ok(None);
    };
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let worker_id = ctx.id.clone();
    debug!(target: "worker.rpc", id = %worker_id, path = %path.display(), "rpc endpoint listening");

    let task = tokio::spawn(async move {
        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(target: "worker.rpc", id = %worker_id, %err, "accept failed");
                    continue;
                }
            };
            let handler = handler.clone();
            let worker_id = worker_id.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(reply) = handle_line(&line, &handler) {
                        if write_half.write_all(reply.as_bytes()).await.is_err()
                            || write_half.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                }
                debug!(target: "worker.rpc", id = %worker_id, "rpc connection closed");
            });
        }
    });
    Ok(Some(task))
}

#[cfg(not(unix))]
pub fn spawn_socket_endpoint(
    _ctx: &WorkerContext,
    _handler: RpcHandler,
) -> std::io::Result<Option<JoinHandle<()>>> {
    Ok(None)
}
