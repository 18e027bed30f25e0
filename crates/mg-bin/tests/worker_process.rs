//! Spawns the actual binary in worker mode and runs the handshake,
//! request/response, and shutdown over real process pipes.

use core_proto::{FrameFlags, MessageType};
use core_router::{Supervisor, SupervisorOptions, WiringTable, WorkerCommand, WorkerDescriptor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn worker_command(kind: &str) -> WorkerCommand {
    WorkerCommand {
        program: PathBuf::from(env!("CARGO_BIN_EXE_marigraph")),
        args: vec!["--worker".to_string(), kind.to_string()],
    }
}

fn descriptor(id: &str, kind: &str, options: serde_json::Value) -> WorkerDescriptor {
    WorkerDescriptor {
        id: id.to_string(),
        kind: kind.to_string(),
        options,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn spawned_workers_handshake_render_and_shutdown() {
    let options = SupervisorOptions {
        ready_timeout: Duration::from_secs(5),
        ..SupervisorOptions::default()
    };
    let mut sup = Supervisor::new(WiringTable::default(), options);
    sup.spawn_worker(
        &descriptor("s1", "surface3d", serde_json::json!({"demo": true})),
        &worker_command("surface3d"),
    )
    .expect("spawn surface worker");
    sup.spawn_worker(
        &descriptor("m1", "metrics", serde_json::json!({"demo": true})),
        &worker_command("metrics"),
    )
    .expect("spawn metrics worker");

    sup.wait_ready().await.expect("both workers emit READY");
    assert!(sup.is_ready("s1"));
    assert!(sup.is_ready("m1"));

    // PONG correlation across a real pipe.
    let pong_seq = Arc::new(Mutex::new(None));
    let sink = pong_seq.clone();
    sup.on_frame("s1", MessageType::Pong, move |_, frame| {
        *sink.lock().unwrap() = Some(frame.header.seq);
    });
    sup.send_to_column("s1", MessageType::Ping, b"hb", FrameFlags::REQUEST, 21)
        .unwrap();

    // A render request against the demo surface produces a frame.
    let renders: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = renders.clone();
    sup.on_frame("s1", MessageType::RenderResult, move |_, frame| {
        sink.lock().unwrap().push(frame.payload.clone());
    });
    sup.send_to_column("s1", MessageType::RenderRequest, b"", FrameFlags::REQUEST, 22)
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let done = pong_seq.lock().unwrap().is_some() && !renders.lock().unwrap().is_empty();
        if done {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker responses did not arrive"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(*pong_seq.lock().unwrap(), Some(21));
    let renders = renders.lock().unwrap();
    let text = String::from_utf8_lossy(&renders[0]);
    assert!(text.contains('\u{1b}'), "render output carries SGR codes");

    drop(renders);
    sup.shutdown().await.expect("cooperative shutdown");
}
