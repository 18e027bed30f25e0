//! Worker descriptors, process spawning glue, and the per-worker pipe
//! tasks.
//!
//! Each worker gets two tasks: a reader that feeds the shared dispatch
//! queue from the worker's stdout, and a writer that drains the worker's
//! bounded outbound queue into its stdin. The tasks are generic over the
//! stream types so tests can run workers over in-memory duplex pipes with
//! no subprocess involved.

use crate::outbound::OutboundQueue;
use core_proto::{Frame, FrameReader, ProtoError, encode_frame_raw};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One template column to launch.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerDescriptor {
    pub id: String,
    pub kind: String,
    pub options: serde_json::Value,
}

/// How to launch a worker process. The supervisor passes identity and
/// configuration through the environment, so the command line itself is
/// uniform across workers.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Re-exec the current binary with the given args (the usual setup:
    /// one executable serving both supervisor and worker roles).
    pub fn current_exe(args: Vec<String>) -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args,
        })
    }
}

/// Everything the dispatch loop can receive from the pipe tasks.
#[derive(Debug)]
pub(crate) enum Inbound {
    Frame { worker: String, frame: Frame },
    Disconnected { worker: String, reason: String },
}

/// Read frames from a worker's stdout until EOF or a fatal read error.
/// Protocol errors (oversize frames) are logged and skipped; the stream
/// itself continues at the next header boundary.
pub(crate) fn spawn_reader_task<R>(
    worker: String,
    mut stream: R,
    dispatch: mpsc::Sender<Inbound>,
    max_payload: u32,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = FrameReader::with_max_payload(max_payload);
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    debug!(target: "router.reader", worker = %worker, "eof");
                    let _ = dispatch
                        .send(Inbound::Disconnected {
                            worker,
                            reason: "eof".to_string(),
                        })
                        .await;
                    return;
                }
                Ok(n) => {
                    reader.append(&buf[..n]);
                    loop {
                        match reader.read() {
                            Ok(Some(frame)) => {
                                if dispatch
                                    .send(Inbound::Frame {
                                        worker: worker.clone(),
                                        frame,
                                    })
                                    .await
                                    .is_err()
                                {
                                    // Dispatch loop gone; stop reading.
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(ProtoError::OversizeFrame { length, max }) => {
                                warn!(
                                    target: "router.reader",
                                    worker = %worker,
                                    length,
                                    max,
                                    "discarded oversize frame"
                                );
                            }
                            Err(err) => {
                                warn!(target: "router.reader", worker = %worker, %err, "frame error");
                            }
                        }
                    }
                }
                Err(err) => {
                    let _ = dispatch
                        .send(Inbound::Disconnected {
                            worker,
                            reason: format!("read error: {err}"),
                        })
                        .await;
                    return;
                }
            }
        }
    })
}

/// Drain the outbound queue into the worker's stdin, flushing per frame.
/// A write failure reports the worker as disconnected; remaining queued
/// frames are dropped with it.
pub(crate) fn spawn_writer_task<W>(
    worker: String,
    mut stream: W,
    queue: Arc<OutboundQueue>,
    dispatch: mpsc::Sender<Inbound>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = queue.pop().await {
            let bytes = encode_frame_raw(
                frame.header.msg_type,
                &frame.payload,
                frame.header.flags,
                frame.header.seq,
            );
            let result = async {
                stream.write_all(&bytes).await?;
                stream.flush().await
            }
            .await;
            if let Err(err) = result {
                queue.close();
                let _ = dispatch
                    .send(Inbound::Disconnected {
                        worker: worker.clone(),
                        reason: format!("write error: {err}"),
                    })
                    .await;
                return;
            }
        }
        // Queue closed cleanly; shut the pipe so the worker sees EOF.
        let _ = stream.shutdown().await;
    })
}
