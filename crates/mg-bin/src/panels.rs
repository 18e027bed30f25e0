//! Builtin panel kinds served by the worker mode.
//!
//! `surface3d` owns a volatility surface and renders it through the 3D
//! pipeline on request; `metrics` derives risk analytics from the same
//! surface stream and renders a text summary. Both speak only through the
//! typed worker runtime, so any richer widget catalog can slot in beside
//! them.

use anyhow::Result;
use core_analytics::{
    ArbOptions, SviParams, analyze_smile, check_all, compute_risk_metrics, default_indices,
};
use core_proto::{FrameFlags, MessageType};
use core_render::{Projection, SceneOptions, render_surface, to_ansi_string};
use core_surface::{AxisLabels, Surface};
use core_worker::{InboundMessage, Outbox, Panel};
use serde_json::Value;
use tracing::debug;

/// Synthetic smile surface used when a column asks for demo data: an SVI
/// slice per expiry with wings tightening as expiry grows.
pub fn demo_surface() -> Surface {
    let expiries = vec![0.25, 0.5, 1.0, 1.5, 2.0];
    let strikes: Vec<f64> = (0..9).map(|i| 70.0 + 7.5 * i as f64).collect();
    let forward = 100.0;
    Surface::from_fn(
        expiries,
        strikes,
        AxisLabels {
            x: "expiry".to_string(),
            y: "strike".to_string(),
            z: "iv".to_string(),
        },
        |t, strike| {
            let params = SviParams {
                a: 0.02 + 0.01 * t,
                b: 0.25 / (1.0 + t),
                rho: -0.35,
                m: 0.0,
                sigma: 0.2,
            };
            params.implied_vol((strike / forward).ln(), t)
        },
    )
    .expect("demo surface axes are valid")
}

fn apply_camera_update(projection: &mut Projection, update: &Value) {
    if let Some(d) = update.get("rotate_azimuth").and_then(Value::as_f64) {
        projection.rotate(d, 0.0);
    }
    if let Some(d) = update.get("rotate_elevation").and_then(Value::as_f64) {
        projection.rotate(0.0, d);
    }
    if let Some(f) = update.get("zoom").and_then(Value::as_f64) {
        projection.zoom_by(f);
    }
}

/// The 3D wireframe column.
pub struct SurfacePanel {
    surface: Option<Surface>,
    projection: Projection,
    scene: SceneOptions,
    cols: u16,
    rows: u16,
}

impl SurfacePanel {
    pub fn new(options: &Value) -> Self {
        let mut panel = Self {
            surface: None,
            projection: Projection::default(),
            scene: SceneOptions::default(),
            cols: 80,
            rows: 24,
        };
        panel.configure(options);
        panel
    }

    fn configure(&mut self, options: &Value) {
        if options
            .get("demo")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            self.surface = Some(demo_surface());
        }
        if let Some(lighting) = options.get("lighting").and_then(Value::as_bool) {
            self.scene.lighting = lighting;
        }
        if let Some(div) = options.get("grid_divisions").and_then(Value::as_u64) {
            self.scene.grid_divisions = div as usize;
        }
    }

    fn render(&self, out: &mut Outbox) {
        let Some(surface) = &self.surface else {
            return;
        };
        let buffer = render_surface(
            surface,
            &self.projection,
            &self.scene,
            self.cols as usize,
            self.rows as usize,
        );
        out.send(
            MessageType::RenderResult,
            to_ansi_string(&buffer).into_bytes(),
            FrameFlags::RESPONSE,
            0,
        );
    }
}

impl Panel for SurfacePanel {
    fn handle(&mut self, msg: InboundMessage, out: &mut Outbox) -> Result<()> {
        match msg {
            InboundMessage::Init { options } => self.configure(&options),
            InboundMessage::SurfaceFull(surface) => {
                debug!(target: "panel.surface3d", nx = surface.nx(), ny = surface.ny(), "surface replaced");
                self.surface = Some(surface);
            }
            InboundMessage::SurfaceDelta { indices, values } => {
                if let Some(surface) = &mut self.surface {
                    let skipped = surface.apply_delta(&indices, &values);
                    if skipped > 0 {
                        debug!(target: "panel.surface3d", skipped, "delta indices out of range");
                    }
                }
            }
            InboundMessage::Resize { cols, rows } => {
                self.cols = cols;
                self.rows = rows;
            }
            InboundMessage::ConfigUpdate(update) => {
                apply_camera_update(&mut self.projection, &update);
            }
            InboundMessage::Clear => self.surface = None,
            InboundMessage::RenderRequest => self.render(out),
            _ => {}
        }
        Ok(())
    }
}

/// The risk analytics column.
pub struct MetricsPanel {
    surface: Option<Surface>,
}

impl MetricsPanel {
    pub fn new(options: &Value) -> Self {
        let surface = options
            .get("demo")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            .then(demo_surface);
        Self { surface }
    }

    fn summary(&self) -> String {
        let Some(surface) = &self.surface else {
            return "waiting for surface data".to_string();
        };
        let field = surface.slope();
        let risk = compute_risk_metrics(&field);
        let arb = check_all(surface, &ArbOptions::default());
        let smile = analyze_smile(surface, &default_indices(surface.nx(), 3));
        format!(
            "risk score {:.3}\nmax slope {:.4}  avg {:.4}\nterm steepness {:+.4}  smile {:.4}\n\
             arbitrage: {} calendar / {} butterfly\nskew {:?}  fly spread {:+.4}\nhot zones {}",
            risk.risk_score,
            risk.max_slope,
            risk.avg_slope,
            risk.term_structure_steepness,
            risk.smile_steepness,
            arb.calendar_count,
            arb.butterfly_count,
            smile.skew_direction,
            smile.butterfly_spread,
            risk.high_risk_zones.len(),
        )
    }
}

impl Panel for MetricsPanel {
    fn handle(&mut self, msg: InboundMessage, out: &mut Outbox) -> Result<()> {
        match msg {
            InboundMessage::SurfaceFull(surface) => self.surface = Some(surface),
            InboundMessage::SurfaceDelta { indices, values } => {
                if let Some(surface) = &mut self.surface {
                    surface.apply_delta(&indices, &values);
                }
            }
            InboundMessage::Clear => self.surface = None,
            InboundMessage::RenderRequest | InboundMessage::SetData(_) => {
                out.send(
                    MessageType::RenderResult,
                    self.summary().into_bytes(),
                    FrameFlags::RESPONSE,
                    0,
                );
            }
            _ => {}
        }
        Ok(())
    }
}

/// Instantiate a panel by template column kind.
pub fn panel_for_kind(kind: &str, options: &Value) -> Option<Box<dyn Panel>> {
    match kind {
        "surface3d" => Some(Box::new(SurfacePanel::new(options))),
        "metrics" => Some(Box::new(MetricsPanel::new(options))),
        _ => None,
    }
}

/// Kinds the worker mode can serve; checked supervisor-side before spawn
/// so an unknown column type fails startup instead of a worker.
pub const KNOWN_KINDS: [&str; 2] = ["surface3d", "metrics"];
