//! The worker frame loop and the typed inbound message union.

use crate::WorkerContext;
use anyhow::Result;
use core_proto::{
    Frame, FrameFlags, FrameReader, MessageType, decode_surface, decode_surface_delta,
    encode_frame_raw,
};
use core_surface::Surface;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Closed union of the messages a panel can receive. Decoding happens in
/// one place so panels and wiring stay statically checkable; messages the
/// runtime has no decoder for are carried as [`InboundMessage::Other`]
/// rather than dropped, which keeps forwarding panels possible.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Init { options: Value },
    SurfaceFull(Surface),
    SurfaceDelta { indices: Vec<u32>, values: Vec<f64> },
    SetData(Value),
    AppendData(Value),
    Clear,
    Scroll(Value),
    Focus,
    Resize { cols: u16, rows: u16 },
    SetTitle(String),
    RenderRequest,
    ConfigUpdate(Value),
    Other { msg_type: u8, payload: Vec<u8> },
}

fn json_payload(payload: &[u8]) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(payload).unwrap_or(Value::Null)
}

impl InboundMessage {
    /// Decode a frame. `None` means the payload was malformed for its
    /// declared type; the caller logs and skips (a corrupt frame is a
    /// local protocol error, not a crash).
    pub fn decode(frame: &Frame) -> Option<InboundMessage> {
        let msg = match frame.message_type() {
            Some(MessageType::Init) => InboundMessage::Init {
                options: json_payload(&frame.payload),
            },
            Some(MessageType::SurfaceFull) => {
                InboundMessage::SurfaceFull(decode_surface(&frame.payload).ok()?)
            }
            Some(MessageType::SurfaceDelta) => {
                let (indices, values) = decode_surface_delta(&frame.payload).ok()?;
                InboundMessage::SurfaceDelta { indices, values }
            }
            Some(MessageType::SetData) => InboundMessage::SetData(json_payload(&frame.payload)),
            Some(MessageType::AppendData) => {
                InboundMessage::AppendData(json_payload(&frame.payload))
            }
            Some(MessageType::Clear) => InboundMessage::Clear,
            Some(MessageType::Scroll) => InboundMessage::Scroll(json_payload(&frame.payload)),
            Some(MessageType::Focus) => InboundMessage::Focus,
            Some(MessageType::Resize) => {
                let v = json_payload(&frame.payload);
                InboundMessage::Resize {
                    cols: v.get("cols").and_then(Value::as_u64).unwrap_or(80) as u16,
                    rows: v.get("rows").and_then(Value::as_u64).unwrap_or(24) as u16,
                }
            }
            Some(MessageType::SetTitle) => InboundMessage::SetTitle(
                String::from_utf8_lossy(&frame.payload).into_owned(),
            ),
            Some(MessageType::RenderRequest) => InboundMessage::RenderRequest,
            Some(MessageType::ConfigUpdate) => {
                InboundMessage::ConfigUpdate(json_payload(&frame.payload))
            }
            _ => InboundMessage::Other {
                msg_type: frame.header.msg_type,
                payload: frame.payload.clone(),
            },
        };
        Some(msg)
    }
}

/// Frames a panel wants written back to the supervisor. Drained and
/// flushed by the runtime after every `handle` call.
#[derive(Debug)]
pub struct Outbox {
    worker_id: String,
    frames: Vec<Frame>,
}

impl Outbox {
    /// Standalone outbox; the runtime builds its own, panel unit tests
    /// build theirs.
    pub fn new(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            frames: Vec::new(),
        }
    }

    /// Queue a raw frame.
    pub fn send(&mut self, msg_type: MessageType, payload: Vec<u8>, flags: FrameFlags, seq: u16) {
        self.frames.push(Frame {
            header: core_proto::FrameHeader {
                length: payload.len() as u32,
                msg_type: msg_type as u8,
                flags,
                seq,
            },
            payload,
        });
    }

    /// Queue an event with a JSON payload. The worker's own id is always
    /// included, per the worker contract.
    pub fn event(&mut self, event: MessageType, mut payload: Value) {
        if let Value::Object(map) = &mut payload {
            map.insert("id".to_string(), Value::String(self.worker_id.clone()));
        } else if payload.is_null() {
            payload = serde_json::json!({"id": self.worker_id});
        }
        let bytes = payload.to_string().into_bytes();
        self.send(event, bytes, FrameFlags::empty(), 0);
    }

    /// Remove and return everything queued so far.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

/// The embedding seam for widget implementations: each panel owns its
/// state and reacts to typed messages, queueing responses in the outbox.
pub trait Panel: Send {
    fn handle(&mut self, msg: InboundMessage, out: &mut Outbox) -> Result<()>;
}

impl<P: Panel + ?Sized> Panel for Box<P> {
    fn handle(&mut self, msg: InboundMessage, out: &mut Outbox) -> Result<()> {
        (**self).handle(msg, out)
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(out: &mut W, frames: Vec<Frame>) -> Result<()> {
    for frame in frames {
        let bytes = encode_frame_raw(
            frame.header.msg_type,
            &frame.payload,
            frame.header.flags,
            frame.header.seq,
        );
        out.write_all(&bytes).await?;
    }
    out.flush().await?;
    Ok(())
}

/// Run the worker loop over arbitrary streams (stdin/stdout in
/// production, duplex pipes in tests). Returns when SHUTDOWN arrives or
/// the supervisor closes the pipe.
pub async fn run_with_io<R, W, P>(
    ctx: &WorkerContext,
    panel: &mut P,
    mut input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: Panel,
{
    let mut outbox = Outbox::new(&ctx.id);

    // Announce readiness before touching any input.
    outbox.event(MessageType::Ready, Value::Null);
    write_frames(&mut output, outbox.take_frames()).await?;
    debug!(target: "worker.runtime", id = %ctx.id, "ready emitted");

    let mut reader = FrameReader::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            debug!(target: "worker.runtime", id = %ctx.id, "supervisor closed stdin");
            return Ok(());
        }
        reader.append(&buf[..n]);
        loop {
            let frame = match reader.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    warn!(target: "worker.runtime", id = %ctx.id, %err, "discarded bad frame");
                    continue;
                }
            };
            match frame.message_type() {
                Some(MessageType::Shutdown) => {
                    debug!(target: "worker.runtime", id = %ctx.id, "shutdown");
                    return Ok(());
                }
                Some(MessageType::Ping) => {
                    outbox.send(
                        MessageType::Pong,
                        frame.payload.clone(),
                        FrameFlags::RESPONSE,
                        frame.header.seq,
                    );
                }
                _ => match InboundMessage::decode(&frame) {
                    Some(msg) => {
                        if let Err(err) = panel.handle(msg, &mut outbox) {
                            // Panel errors are reported upstream, not fatal.
                            warn!(target: "worker.runtime", id = %ctx.id, %err, "panel error");
                            outbox.send(
                                MessageType::Error,
                                err.to_string().into_bytes(),
                                FrameFlags::empty(),
                                frame.header.seq,
                            );
                        }
                    }
                    None => {
                        trace!(
                            target: "worker.runtime",
                            id = %ctx.id,
                            msg_type = frame.header.msg_type,
                            "malformed payload skipped"
                        );
                    }
                },
            }
            write_frames(&mut output, outbox.take_frames()).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_proto::encode_frame;
    use core_surface::AxisLabels;

    struct RecordingPanel {
        seen: Vec<InboundMessage>,
        emit_on_set_data: bool,
    }

    impl Panel for RecordingPanel {
        fn handle(&mut self, msg: InboundMessage, out: &mut Outbox) -> Result<()> {
            if self.emit_on_set_data && matches!(msg, InboundMessage::SetData(_)) {
                out.event(MessageType::Selected, serde_json::json!({"idx": 3}));
            }
            self.seen.push(msg);
            Ok(())
        }
    }

    fn ctx() -> WorkerContext {
        WorkerContext {
            id: "w1".to_string(),
            options: Value::Null,
            instance_dir: None,
        }
    }

    async fn drive(frames: Vec<Vec<u8>>, panel: &mut RecordingPanel) -> Vec<Frame> {
        let (mut sup_write, worker_read) = tokio::io::duplex(64 * 1024);
        let (worker_write, mut sup_read) = tokio::io::duplex(64 * 1024);
        let context = ctx();
        let worker = async {
            run_with_io(&context, panel, worker_read, worker_write)
                .await
                .unwrap();
        };
        let feeder = async {
            for bytes in frames {
                sup_write.write_all(&bytes).await.unwrap();
            }
            sup_write
                .write_all(&encode_frame(
                    MessageType::Shutdown,
                    b"{}",
                    FrameFlags::empty(),
                    0,
                ))
                .await
                .unwrap();
        };
        tokio::join!(worker, feeder);
        let mut collected = Vec::new();
        let mut raw = Vec::new();
        sup_read.read_to_end(&mut raw).await.unwrap();
        let mut reader = FrameReader::new();
        reader.append(&raw);
        collected.extend(reader.read_all());
        collected
    }

    #[tokio::test]
    async fn ready_is_first_frame_and_includes_id() {
        let mut panel = RecordingPanel {
            seen: vec![],
            emit_on_set_data: false,
        };
        let out = drive(vec![], &mut panel).await;
        assert!(!out.is_empty());
        assert_eq!(out[0].message_type(), Some(MessageType::Ready));
        let v: Value = serde_json::from_slice(&out[0].payload).unwrap();
        assert_eq!(v["id"], "w1");
    }

    #[tokio::test]
    async fn ping_echoes_payload_and_seq() {
        let mut panel = RecordingPanel {
            seen: vec![],
            emit_on_set_data: false,
        };
        let out = drive(
            vec![encode_frame(
                MessageType::Ping,
                b"probe",
                FrameFlags::REQUEST,
                555,
            )],
            &mut panel,
        )
        .await;
        let pong = out
            .iter()
            .find(|f| f.message_type() == Some(MessageType::Pong))
            .expect("pong");
        assert_eq!(pong.payload, b"probe");
        assert_eq!(pong.header.seq, 555);
        assert!(pong.header.flags.contains(FrameFlags::RESPONSE));
    }

    #[tokio::test]
    async fn unknown_type_is_carried_not_fatal() {
        let mut panel = RecordingPanel {
            seen: vec![],
            emit_on_set_data: false,
        };
        let _ = drive(
            vec![core_proto::encode_frame_raw(
                0x7E,
                b"mystery",
                FrameFlags::empty(),
                0,
            )],
            &mut panel,
        )
        .await;
        assert_eq!(
            panel.seen,
            vec![InboundMessage::Other {
                msg_type: 0x7E,
                payload: b"mystery".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn events_carry_worker_id() {
        let mut panel = RecordingPanel {
            seen: vec![],
            emit_on_set_data: true,
        };
        let out = drive(
            vec![encode_frame(
                MessageType::SetData,
                br#"{"rows":[1]}"#,
                FrameFlags::empty(),
                0,
            )],
            &mut panel,
        )
        .await;
        let event = out
            .iter()
            .find(|f| f.message_type() == Some(MessageType::Selected))
            .expect("selected event");
        let v: Value = serde_json::from_slice(&event.payload).unwrap();
        assert_eq!(v["id"], "w1");
        assert_eq!(v["idx"], 3);
    }

    #[tokio::test]
    async fn surface_full_decodes_to_typed_message() {
        let surface = Surface::from_fn(
            vec![0.5, 1.0],
            vec![90.0, 100.0],
            AxisLabels::default(),
            |_, _| 0.2,
        )
        .unwrap();
        let payload = core_proto::encode_surface(&surface);
        let mut panel = RecordingPanel {
            seen: vec![],
            emit_on_set_data: false,
        };
        let _ = drive(
            vec![encode_frame(
                MessageType::SurfaceFull,
                &payload,
                FrameFlags::empty(),
                0,
            )],
            &mut panel,
        )
        .await;
        match &panel.seen[0] {
            InboundMessage::SurfaceFull(s) => {
                assert_eq!(s.nx(), 2);
                assert_eq!(s.ny(), 2);
            }
            other => panic!("expected surface, got {other:?}"),
        }
    }
}
