//! Marigraph entrypoint.
//!
//! One executable, two roles: the supervisor (default) loads a template,
//! spawns one worker process per column, and drives the display; the
//! hidden worker mode (`--worker <kind>`) serves a single panel over
//! framed stdin/stdout, as spawned by the supervisor.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use core_config::{Settings, Template, load_settings, load_template};
use core_proto::{FrameFlags, MessageType};
use core_router::{Supervisor, SupervisorOptions, WiringTable, WorkerCommand, WorkerDescriptor};
use core_terminal::ScreenClaim;
use core_worker::{RpcHandler, WorkerContext, run_with_io};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod panels;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "marigraph", version, about = "Volatility surface terminal dashboard")]
struct Args {
    /// Dashboard template (JSON). A builtin demo template is used when
    /// omitted.
    pub template: Option<PathBuf>,
    /// Settings file path (overrides discovery of `marigraph.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Supervise workers without a display.
    #[arg(long)]
    pub headless: bool,
    /// Internal: serve one panel worker of the given kind.
    #[arg(long = "worker", hide = true)]
    pub worker_kind: Option<String>,
}

/// Supervisor logging goes to a file so stdout stays owned by the
/// display; the guard must live for the process lifetime.
fn configure_file_logging() -> WorkerGuard {
    let dir = std::env::var_os("MARIGRAPH_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let appender = tracing_appender::rolling::never(dir, "marigraph.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

/// Workers log to stderr: the frame protocol owns their stdout, stderr is
/// line-oriented diagnostics by contract.
fn configure_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(target: "runtime", %info, "panic");
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let result = if let Some(kind) = args.worker_kind.clone() {
        run_worker(&kind).await
    } else {
        run_supervisor(args).await
    };
    if let Err(err) = result {
        eprintln!("marigraph: {err:#}");
        std::process::exit(1);
    }
}

fn describe_handler(ctx: &WorkerContext) -> RpcHandler {
    let id = ctx.id.clone();
    let options = ctx.options.clone();
    Arc::new(move |method, _params| match method {
        "describe" => Ok(serde_json::json!({"id": id, "options": options})),
        "ping" => Ok(serde_json::json!("pong")),
        other => Err(core_worker::RpcError::MethodNotFound(other.to_string())),
    })
}

async fn run_worker(kind: &str) -> Result<()> {
    configure_stderr_logging();
    let ctx = WorkerContext::from_env().context("worker environment")?;
    let mut panel = panels::panel_for_kind(kind, &ctx.options)
        .ok_or_else(|| anyhow!("unknown panel kind '{kind}'"))?;
    info!(target: "runtime", id = %ctx.id, kind, "worker starting");
    let rpc = core_worker::spawn_socket_endpoint(&ctx, describe_handler(&ctx))?;
    let outcome = run_with_io(&ctx, &mut panel, tokio::io::stdin(), tokio::io::stdout()).await;
    if let Some(task) = rpc {
        task.abort();
    }
    outcome
}

/// Demo dashboard when no template is supplied: a rotating surface wired
/// to a metrics column.
fn builtin_template() -> Template {
    Template::parse(
        r#"{
            "name": "demo",
            "columns": [
                {"id": "surface", "type": "surface3d", "options": {"demo": true}},
                {"id": "metrics", "type": "metrics", "options": {"demo": true}}
            ],
            "wiring": [
                {"on": {"column": "surface", "event": "SELECTED"},
                 "do": {"column": "metrics", "action": "SET_DATA"}}
            ]
        }"#,
    )
    .expect("builtin template is valid")
}

async fn run_supervisor(args: Args) -> Result<()> {
    let _log_guard = configure_file_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let settings = load_settings(args.config.clone())?;
    let template = match &args.template {
        Some(path) => load_template(path)?,
        None => builtin_template(),
    };
    for column in &template.columns {
        if !panels::KNOWN_KINDS.contains(&column.kind.as_str()) {
            bail!(
                "template '{}': unknown column type '{}' (column '{}')",
                template.name,
                column.kind,
                column.id
            );
        }
    }

    let wiring = WiringTable::from_template(&template);
    let mut sup = Supervisor::new(wiring, SupervisorOptions::from(&settings.router));
    for column in &template.columns {
        let descriptor = WorkerDescriptor {
            id: column.id.clone(),
            kind: column.kind.clone(),
            options: column.options.clone(),
        };
        let command =
            WorkerCommand::current_exe(vec!["--worker".to_string(), column.kind.clone()])?;
        sup.spawn_worker(&descriptor, &command)?;
    }
    sup.wait_ready().await?;
    info!(target: "runtime", template = %template.name, workers = template.columns.len(), "dashboard ready");

    if args.headless {
        tokio::signal::ctrl_c().await?;
        info!(target: "runtime", "interrupt received");
    } else {
        run_display(&sup, &template, &settings).await?;
    }

    sup.shutdown().await?;
    info!(target: "runtime", "shutdown complete");
    Ok(())
}

/// Minimal display loop: the first surface column owns the screen; the
/// auto-rotate ticker nudges its camera and requests frames, and its
/// RENDER_RESULT payloads are written straight through.
async fn run_display(sup: &Supervisor, template: &Template, settings: &Settings) -> Result<()> {
    let display_id = template
        .columns
        .iter()
        .find(|c| c.kind == "surface3d")
        .map(|c| c.id.clone())
        .ok_or_else(|| anyhow!("template has no surface3d column to display"))?;

    let mut screen = ScreenClaim::acquire("Marigraph")?;
    let (cols, rows) = screen.viewport();

    sup.on_frame(&display_id, MessageType::RenderResult, |_, frame| {
        let mut out = std::io::stdout();
        let _ = crossterm::execute!(out, crossterm::cursor::MoveTo(0, 0));
        let _ = out.write_all(&frame.payload);
        let _ = out.flush();
    });

    let resize = serde_json::json!({"cols": cols, "rows": rows.saturating_sub(1)});
    sup.send_to_column(
        &display_id,
        MessageType::Resize,
        resize.to_string().as_bytes(),
        FrameFlags::empty(),
        0,
    )?;

    let rotate = serde_json::json!({"rotate_azimuth": settings.render.rotate_step_degrees});
    let rotate_payload = rotate.to_string();
    let mut ticker =
        tokio::time::interval(Duration::from_millis(settings.render.rotate_interval_ms.max(16)));
    let mut seq: u16 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: "runtime", "interrupt received");
                screen.release()?;
                return Ok(());
            }
            _ = ticker.tick() => {
                seq = seq.wrapping_add(1);
                let _ = sup.send_to_column(
                    &display_id,
                    MessageType::ConfigUpdate,
                    rotate_payload.as_bytes(),
                    FrameFlags::empty(),
                    seq,
                );
                let _ = sup.send_to_column(
                    &display_id,
                    MessageType::RenderRequest,
                    b"",
                    FrameFlags::REQUEST,
                    seq,
                );
            }
        }
    }
}
