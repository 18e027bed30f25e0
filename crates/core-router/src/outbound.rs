//! Bounded per-worker outbound queue.
//!
//! Writes to a worker's stdin are serviced by one writer task pulling from
//! this queue, so the dispatch loop never blocks on a slow pipe. Under
//! sustained overload the queue sheds load by dropping the oldest queued
//! frame of the same type when that type is droppable (events and widget
//! data, which are superseded by newer ones); control frames are never
//! dropped and instead displace nothing — the push is rejected and the
//! caller decides. Frames are dropped whole or delivered whole, never
//! split.

use core_proto::{Frame, MessageType};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// An older same-type frame was discarded to make room.
    DroppedOlder,
    /// The queue is full of non-droppable traffic; this frame was refused.
    Rejected,
    /// The worker side is gone.
    Closed,
}

/// Types whose older instances may be superseded by newer ones.
fn droppable(msg_type: u8) -> bool {
    match MessageType::from_u8(msg_type) {
        Some(t) => t.is_event() || matches!(t, MessageType::SetData | MessageType::AppendData),
        // Unknown types are forwarded data; treat as droppable.
        None => true,
    }
}

#[derive(Debug)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, frame: Frame) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock().expect("outbound lock");
            if state.closed {
                return PushOutcome::Closed;
            }
            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                PushOutcome::Enqueued
            } else if droppable(frame.header.msg_type) {
                // Shed the oldest frame of the same type, or the new one
                // if none is queued.
                let victim = state
                    .frames
                    .iter()
                    .position(|f| f.header.msg_type == frame.header.msg_type);
                match victim {
                    Some(i) => {
                        state.frames.remove(i);
                        state.frames.push_back(frame);
                        PushOutcome::DroppedOlder
                    }
                    None => PushOutcome::Rejected,
                }
            } else {
                PushOutcome::Rejected
            }
        };
        match outcome {
            PushOutcome::Enqueued | PushOutcome::DroppedOlder => self.notify.notify_one(),
            PushOutcome::Rejected => {
                warn!(target: "router.outbound", "outbound queue full, frame refused");
            }
            PushOutcome::Closed => {}
        }
        outcome
    }

    /// Next frame to write; waits for one. `None` means the queue was
    /// closed and fully drained.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            {
                let mut state = self.state.lock().expect("outbound lock");
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; queued frames still drain.
    pub fn close(&self) {
        self.state.lock().expect("outbound lock").closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("outbound lock").frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
