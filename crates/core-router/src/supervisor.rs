//! The supervisor: spawns workers, runs the ready handshake, dispatches
//! inbound frames through the wiring table, and shuts everything down.
//!
//! Concurrency model: one reader task per worker feeds a single dispatch
//! queue; the dispatch loop is the only consumer. The wiring table and
//! worker map live behind one mutex with short critical sections —
//! lookups copy out the queue handles and push after unlocking, and
//! registered handlers run outside the lock. Each worker's stdin has
//! exactly one writer (its writer task); its stdout exactly one reader.

use crate::outbound::{OutboundQueue, PushOutcome};
use crate::wiring::{WILDCARD_TARGET, WiringTable};
use crate::worker::{Inbound, WorkerCommand, WorkerDescriptor, spawn_reader_task, spawn_writer_task};
use crate::RouterError;
use ahash::AHashMap;
use core_proto::{Frame, FrameFlags, FrameHeader, MessageType};
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    pub ready_timeout: Duration,
    pub shutdown_grace: Duration,
    pub outbound_queue: usize,
    pub max_payload: u32,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(2),
            outbound_queue: 256,
            max_payload: 16 * 1024 * 1024,
        }
    }
}

impl From<&core_config::RouterSettings> for SupervisorOptions {
    fn from(s: &core_config::RouterSettings) -> Self {
        Self {
            ready_timeout: Duration::from_millis(s.ready_timeout_ms),
            shutdown_grace: Duration::from_millis(s.shutdown_grace_ms),
            outbound_queue: s.outbound_queue,
            max_payload: s.max_payload_bytes,
        }
    }
}

type Handler = Arc<dyn Fn(&str, &Frame) + Send + Sync + 'static>;

struct WorkerEntry {
    kind: String,
    queue: Arc<OutboundQueue>,
    ready: bool,
    failed: bool,
}

struct State {
    wiring: WiringTable,
    workers: AHashMap<String, WorkerEntry>,
    handlers: AHashMap<(String, u8), Handler>,
}

struct Shared {
    state: Mutex<State>,
    ready_changed: Notify,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("supervisor state lock")
    }
}

pub struct Supervisor {
    shared: Arc<Shared>,
    dispatch_tx: mpsc::Sender<Inbound>,
    dispatch_task: JoinHandle<()>,
    pipe_tasks: Vec<JoinHandle<()>>,
    children: Vec<(String, Child)>,
    instance_dir: Option<TempDir>,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(wiring: WiringTable, options: SupervisorOptions) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                wiring,
                workers: AHashMap::new(),
                handlers: AHashMap::new(),
            }),
            ready_changed: Notify::new(),
        });
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1024);
        let dispatch_task = tokio::spawn(dispatch_loop(shared.clone(), dispatch_rx));
        Self {
            shared,
            dispatch_tx,
            dispatch_task,
            pipe_tasks: Vec::new(),
            children: Vec::new(),
            instance_dir: None,
            options,
        }
    }

    /// Working directory for this supervisor instance, hosting worker-owned
    /// auxiliary endpoints. Created on first use, removed at shutdown.
    pub fn instance_dir(&mut self) -> Result<&Path, RouterError> {
        if self.instance_dir.is_none() {
            let dir = TempDir::with_prefix("marigraph-").map_err(RouterError::InstanceDir)?;
            info!(target: "router.supervisor", path = %dir.path().display(), "instance dir created");
            self.instance_dir = Some(dir);
        }
        Ok(self.instance_dir.as_ref().expect("just created").path())
    }

    /// Register a worker over arbitrary byte streams. This is the seam the
    /// process spawner and the in-memory tests share.
    pub fn attach_worker<R, W>(
        &mut self,
        id: &str,
        kind: &str,
        stdout: R,
        stdin: W,
    ) -> Result<(), RouterError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let queue = Arc::new(OutboundQueue::new(self.options.outbound_queue));
        {
            let mut state = self.shared.lock();
            if state.workers.contains_key(id) {
                return Err(RouterError::DuplicateWorker(id.to_string()));
            }
            state.workers.insert(
                id.to_string(),
                WorkerEntry {
                    kind: kind.to_string(),
                    queue: queue.clone(),
                    ready: false,
                    failed: false,
                },
            );
        }
        self.pipe_tasks.push(spawn_reader_task(
            id.to_string(),
            stdout,
            self.dispatch_tx.clone(),
            self.options.max_payload,
        ));
        self.pipe_tasks.push(spawn_writer_task(
            id.to_string(),
            stdin,
            queue,
            self.dispatch_tx.clone(),
        ));
        debug!(target: "router.supervisor", worker = id, kind, "worker attached");
        Ok(())
    }

    /// Spawn one worker process with piped stdin/stdout and identity in
    /// the environment, then attach its pipes.
    pub fn spawn_worker(
        &mut self,
        desc: &WorkerDescriptor,
        cmd: &WorkerCommand,
    ) -> Result<(), RouterError> {
        let instance_dir = self.instance_dir()?.to_path_buf();
        let options_json = desc.options.to_string();
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .env("WORKER_ID", &desc.id)
            .env("WORKER_OPTIONS", &options_json)
            .env("INSTANCE_DIR", &instance_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RouterError::Spawn {
                id: desc.id.clone(),
                source,
            })?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        self.attach_worker(&desc.id, &desc.kind, stdout, stdin)?;
        self.children.push((desc.id.clone(), child));
        info!(target: "router.supervisor", worker = %desc.id, kind = %desc.kind, "worker spawned");
        Ok(())
    }

    /// Wait until every attached worker has emitted READY, or fail with
    /// the list of stragglers after the configured timeout.
    pub async fn wait_ready(&self) -> Result<(), RouterError> {
        let deadline = tokio::time::Instant::now() + self.options.ready_timeout;
        loop {
            let notified = self.shared.ready_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let missing: Vec<String> = {
                let state = self.shared.lock();
                state
                    .workers
                    .iter()
                    .filter(|(_, w)| !w.ready && !w.failed)
                    .map(|(id, _)| id.clone())
                    .collect()
            };
            if missing.is_empty() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(RouterError::ReadyTimeout {
                    timeout_ms: self.options.ready_timeout.as_millis() as u64,
                    missing,
                });
            }
        }
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.shared
            .lock()
            .workers
            .get(id)
            .is_some_and(|w| w.ready)
    }

    pub fn worker_kind(&self, id: &str) -> Option<String> {
        self.shared.lock().workers.get(id).map(|w| w.kind.clone())
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.shared.lock().workers.keys().cloned().collect()
    }

    /// Replace the wiring table atomically with respect to dispatch.
    pub fn update_wiring(&self, table: WiringTable) {
        self.shared.lock().wiring = table;
        info!(target: "router.wiring", "wiring table replaced");
    }

    /// Register a callback for frames of `msg_type` from `worker` that are
    /// not consumed by the built-in dispatch (READY, ERROR, events).
    pub fn on_frame<F>(&self, worker: &str, msg_type: MessageType, handler: F)
    where
        F: Fn(&str, &Frame) + Send + Sync + 'static,
    {
        self.shared
            .lock()
            .handlers
            .insert((worker.to_string(), msg_type as u8), Arc::new(handler));
    }

    /// Encode and enqueue one frame toward a worker.
    pub fn send_to_column(
        &self,
        id: &str,
        msg_type: MessageType,
        payload: &[u8],
        flags: FrameFlags,
        seq: u16,
    ) -> Result<PushOutcome, RouterError> {
        let queue = {
            let state = self.shared.lock();
            let entry = state
                .workers
                .get(id)
                .ok_or_else(|| RouterError::UnknownWorker(id.to_string()))?;
            if entry.failed {
                return Err(RouterError::WorkerGone(id.to_string()));
            }
            entry.queue.clone()
        };
        let frame = Frame {
            header: FrameHeader {
                length: payload.len() as u32,
                msg_type: msg_type as u8,
                flags,
                seq,
            },
            payload: payload.to_vec(),
        };
        Ok(queue.push(frame))
    }

    /// Send to every live worker.
    pub fn broadcast(&self, msg_type: MessageType, payload: &[u8], seq: u16) {
        let queues: Vec<(String, Arc<OutboundQueue>)> = {
            let state = self.shared.lock();
            state
                .workers
                .iter()
                .filter(|(_, w)| !w.failed)
                .map(|(id, w)| (id.clone(), w.queue.clone()))
                .collect()
        };
        for (id, queue) in queues {
            let outcome = queue.push(Frame {
                header: FrameHeader {
                    length: payload.len() as u32,
                    msg_type: msg_type as u8,
                    flags: FrameFlags::BROADCAST,
                    seq,
                },
                payload: payload.to_vec(),
            });
            if outcome != PushOutcome::Enqueued {
                warn!(target: "router.supervisor", worker = %id, ?outcome, "broadcast push degraded");
            }
        }
    }

    /// Cooperative shutdown: SHUTDOWN broadcast, bounded wait for exits,
    /// kill stragglers, drop the instance directory.
    pub async fn shutdown(mut self) -> Result<(), RouterError> {
        info!(target: "router.supervisor", "shutdown initiated");
        let reason = serde_json::json!({"reason": "shutdown"}).to_string();
        self.broadcast(MessageType::Shutdown, reason.as_bytes(), 0);

        // Close queues so writer tasks drain what is pending and then EOF
        // the workers' stdin.
        let queues: Vec<Arc<OutboundQueue>> = {
            let state = self.shared.lock();
            state.workers.values().map(|w| w.queue.clone()).collect()
        };
        for queue in queues {
            queue.close();
        }

        for (id, mut child) in self.children.drain(..) {
            match tokio::time::timeout(self.options.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(target: "router.supervisor", worker = %id, %status, "worker exited");
                }
                Ok(Err(err)) => {
                    warn!(target: "router.supervisor", worker = %id, %err, "wait failed");
                }
                Err(_) => {
                    warn!(target: "router.supervisor", worker = %id, "grace expired, killing");
                    let _ = child.kill().await;
                }
            }
        }

        self.dispatch_task.abort();
        for task in self.pipe_tasks.drain(..) {
            task.abort();
        }
        // TempDir drop removes the instance directory.
        self.instance_dir.take();
        Ok(())
    }
}

/// The single consumer of every worker's inbound frames.
async fn dispatch_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<Inbound>) {
    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Frame { worker, frame } => handle_frame(&shared, &worker, frame),
            Inbound::Disconnected { worker, reason } => {
                // Per-worker failure containment: mark and continue.
                error!(target: "router.dispatch", worker = %worker, %reason, "worker disconnected");
                let mut state = shared.lock();
                if let Some(entry) = state.workers.get_mut(&worker) {
                    entry.failed = true;
                    entry.queue.close();
                }
                drop(state);
                shared.ready_changed.notify_waiters();
            }
        }
    }
}

fn handle_frame(shared: &Arc<Shared>, worker: &str, frame: Frame) {
    match frame.message_type() {
        Some(MessageType::Ready) => {
            {
                let mut state = shared.lock();
                if let Some(entry) = state.workers.get_mut(worker) {
                    entry.ready = true;
                }
            }
            info!(target: "router.dispatch", worker, "ready");
            shared.ready_changed.notify_waiters();
        }
        Some(MessageType::Error) => {
            let detail = String::from_utf8_lossy(&frame.payload).to_string();
            warn!(target: "router.dispatch", worker, detail = %detail, "worker error report");
        }
        Some(MessageType::WiringUpdate) => match WiringTable::from_update_json(&frame.payload) {
            Ok(table) => {
                shared.lock().wiring = table;
                info!(target: "router.wiring", worker, "wiring table updated");
            }
            Err(err) => {
                warn!(target: "router.wiring", worker, %err, "rejected wiring update");
            }
        },
        Some(event) if event.is_event() => route_event(shared, worker, event, &frame),
        other => {
            // Registered handler or drop; unknown types are no-ops by
            // contract.
            let handler = {
                let state = shared.lock();
                state
                    .handlers
                    .get(&(worker.to_string(), frame.header.msg_type))
                    .cloned()
            };
            match handler {
                Some(h) => h(worker, &frame),
                None => {
                    debug!(
                        target: "router.dispatch",
                        worker,
                        msg_type = frame.header.msg_type,
                        known = other.is_some(),
                        "frame dropped (no handler)"
                    );
                }
            }
        }
    }
}

/// Wiring evaluation for one inbound event. Rules fire in table order;
/// `(target, action)` duplicates are suppressed; `"*"` fans out to every
/// worker except the source.
fn route_event(shared: &Arc<Shared>, source: &str, event: MessageType, frame: &Frame) {
    let sends: Vec<(String, Arc<OutboundQueue>, MessageType)> = {
        let state = shared.lock();
        let mut seen: HashSet<(String, u8)> = HashSet::new();
        let mut out = Vec::new();
        for rule in state.wiring.matching(source, event) {
            let targets: Vec<&str> = if rule.target == WILDCARD_TARGET {
                state
                    .workers
                    .keys()
                    .map(String::as_str)
                    .filter(|id| *id != source)
                    .collect()
            } else {
                vec![rule.target.as_str()]
            };
            for target in targets {
                if !seen.insert((target.to_string(), rule.action as u8)) {
                    continue;
                }
                if let Some(entry) = state.workers.get(target) {
                    if !entry.failed {
                        out.push((target.to_string(), entry.queue.clone(), rule.action));
                    }
                } else {
                    warn!(target: "router.dispatch", rule_target = target, "wiring target unknown");
                }
            }
        }
        out
    };

    for (target, queue, action) in sends {
        debug!(
            target: "router.dispatch",
            source,
            event = event.name(),
            action = action.name(),
            to = %target,
            "routing event"
        );
        queue.push(Frame {
            header: FrameHeader {
                length: frame.payload.len() as u32,
                msg_type: action as u8,
                flags: FrameFlags::empty(),
                seq: frame.header.seq,
            },
            payload: frame.payload.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_settings() {
        let settings = core_config::RouterSettings::default();
        let opts = SupervisorOptions::from(&settings);
        assert_eq!(opts.ready_timeout, Duration::from_secs(10));
        assert_eq!(opts.shutdown_grace, Duration::from_secs(2));
        assert_eq!(opts.outbound_queue, 256);
        assert_eq!(opts.max_payload, 16 * 1024 * 1024);
    }
}
