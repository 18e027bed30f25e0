//! Scene assembly: turn a surface into depth-taggable 3D line work, then
//! project it into an ordered 2D frame.
//!
//! The scene lives in normalized `[-1, 1]^3` space: each surface axis is
//! min/max scaled independently so the mesh always fills the cube and the
//! wireframe/axes/grid are surface-independent. Painter's ordering happens
//! at projection time: lines are sorted ascending by depth (stable, so
//! equal depths keep emission order), labels ride `+1` above their anchor
//! depth and are painted after every line.

use crate::projection::{Point3, Projection};
use crate::style::LineStyle;
use core_surface::Surface;
use tracing::trace;

/// Lighting constants for the optional surface shading pass.
const LIGHT_DIR: Point3 = Point3::new(2.0, -2.0, 3.0);
const AMBIENT: f64 = 0.15;
const SPECULAR_STRENGTH: f64 = 0.4;
const SHININESS: i32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneLine {
    pub a: Point3,
    pub b: Point3,
    pub style: LineStyle,
    /// Normalized height in [-1, 1]; meaningful for surface lines only.
    pub z_value: f64,
    /// Optional Lambert + specular intensity; never affects depth order.
    pub intensity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneLabel {
    pub pos: Point3,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub lines: Vec<SceneLine>,
    pub labels: Vec<SceneLabel>,
}

#[derive(Debug, Clone, Copy)]
pub struct SceneOptions {
    /// Bottom grid line count per direction is `divisions + 1`.
    pub grid_divisions: usize,
    pub lighting: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            grid_divisions: 4,
            lighting: false,
        }
    }
}

fn norm(v: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    if span <= 0.0 || !span.is_finite() {
        return 0.0;
    }
    (v - lo) / span * 2.0 - 1.0
}

fn normalize_dir(p: Point3) -> Point3 {
    let len = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
    if len == 0.0 {
        return Point3::new(0.0, 0.0, 1.0);
    }
    Point3::new(p.x / len, p.y / len, p.z / len)
}

fn dot(a: Point3, b: Point3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Lambert + Blinn-free specular against the fixed light; view direction
/// is the +y camera axis.
fn shade(normal: Point3) -> f64 {
    let l = normalize_dir(LIGHT_DIR);
    let n = normalize_dir(normal);
    let lambert = dot(n, l).max(0.0);
    // r = 2(n.l)n - l, viewed from +y.
    let ndl = dot(n, l);
    let r = Point3::new(
        2.0 * ndl * n.x - l.x,
        2.0 * ndl * n.y - l.y,
        2.0 * ndl * n.z - l.z,
    );
    let view = Point3::new(0.0, 1.0, 0.0);
    let spec = dot(normalize_dir(r), view).max(0.0).powi(SHININESS);
    (AMBIENT + (1.0 - AMBIENT) * lambert + SPECULAR_STRENGTH * spec).min(2.0)
}

/// The 12 edges of the unit cube.
fn cube_edges() -> Vec<(Point3, Point3)> {
    let c = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
    vec![
        // Bottom face.
        (c(-1.0, -1.0, -1.0), c(1.0, -1.0, -1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, 1.0, -1.0)),
        (c(1.0, 1.0, -1.0), c(-1.0, 1.0, -1.0)),
        (c(-1.0, 1.0, -1.0), c(-1.0, -1.0, -1.0)),
        // Top face.
        (c(-1.0, -1.0, 1.0), c(1.0, -1.0, 1.0)),
        (c(1.0, -1.0, 1.0), c(1.0, 1.0, 1.0)),
        (c(1.0, 1.0, 1.0), c(-1.0, 1.0, 1.0)),
        (c(-1.0, 1.0, 1.0), c(-1.0, -1.0, 1.0)),
        // Verticals.
        (c(-1.0, -1.0, -1.0), c(-1.0, -1.0, 1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, -1.0, 1.0)),
        (c(1.0, 1.0, -1.0), c(1.0, 1.0, 1.0)),
        (c(-1.0, 1.0, -1.0), c(-1.0, 1.0, 1.0)),
    ]
}

/// Build the full scene for one surface: cube wireframe, labeled axes,
/// bottom reference grid, and the surface mesh.
pub fn build_scene(surface: &Surface, opts: &SceneOptions) -> Scene {
    let mut scene = Scene::default();

    for (a, b) in cube_edges() {
        scene.lines.push(SceneLine {
            a,
            b,
            style: LineStyle::Wireframe,
            z_value: 0.0,
            intensity: None,
        });
    }

    // Axes from the back-bottom-left corner, labels slightly past the end.
    let origin = Point3::new(-1.0, -1.0, -1.0);
    let axes = [
        (Point3::new(1.0, -1.0, -1.0), Point3::new(1.15, -1.0, -1.0)),
        (Point3::new(-1.0, 1.0, -1.0), Point3::new(-1.0, 1.15, -1.0)),
        (Point3::new(-1.0, -1.0, 1.0), Point3::new(-1.0, -1.0, 1.15)),
    ];
    let labels = surface.labels();
    for ((end, label_pos), text) in axes
        .into_iter()
        .zip([&labels.x, &labels.y, &labels.z])
    {
        scene.lines.push(SceneLine {
            a: origin,
            b: end,
            style: LineStyle::Axis,
            z_value: 0.0,
            intensity: None,
        });
        scene.labels.push(SceneLabel {
            pos: label_pos,
            text: text.clone(),
        });
    }

    // Bottom grid at z = -1.
    let div = opts.grid_divisions.max(1);
    for i in 0..=div {
        let t = -1.0 + 2.0 * i as f64 / div as f64;
        scene.lines.push(SceneLine {
            a: Point3::new(t, -1.0, -1.0),
            b: Point3::new(t, 1.0, -1.0),
            style: LineStyle::Grid,
            z_value: 0.0,
            intensity: None,
        });
        scene.lines.push(SceneLine {
            a: Point3::new(-1.0, t, -1.0),
            b: Point3::new(1.0, t, -1.0),
            style: LineStyle::Grid,
            z_value: 0.0,
            intensity: None,
        });
    }

    // Normalized surface points.
    let nx = surface.nx();
    let ny = surface.ny();
    let [x_lo, x_hi] = surface.meta().domains.x;
    let [y_lo, y_hi] = surface.meta().domains.y;
    let [z_lo, z_hi] = surface.meta().domains.z;
    let point = |xi: usize, yi: usize| {
        Point3::new(
            norm(surface.x()[xi], x_lo, x_hi),
            norm(surface.y()[yi], y_lo, y_hi),
            norm(surface.at(xi, yi), z_lo, z_hi),
        )
    };
    // Per-vertex normal from neighbor differences in normalized space.
    let normal = |xi: usize, yi: usize| {
        let xm = xi.saturating_sub(1);
        let xp = (xi + 1).min(nx - 1);
        let ym = yi.saturating_sub(1);
        let yp = (yi + 1).min(ny - 1);
        let (pxm, pxp) = (point(xm, yi), point(xp, yi));
        let (pym, pyp) = (point(xi, ym), point(xi, yp));
        let dzdx = if pxp.x > pxm.x {
            (pxp.z - pxm.z) / (pxp.x - pxm.x)
        } else {
            0.0
        };
        let dzdy = if pyp.y > pym.y {
            (pyp.z - pym.z) / (pyp.y - pym.y)
        } else {
            0.0
        };
        Point3::new(-dzdx, -dzdy, 1.0)
    };
    let mut push_mesh = |scene: &mut Scene, a_idx: (usize, usize), b_idx: (usize, usize)| {
        let a = point(a_idx.0, a_idx.1);
        let b = point(b_idx.0, b_idx.1);
        let intensity = opts.lighting.then(|| {
            let na = normal(a_idx.0, a_idx.1);
            let nb = normal(b_idx.0, b_idx.1);
            shade(Point3::new(
                (na.x + nb.x) / 2.0,
                (na.y + nb.y) / 2.0,
                (na.z + nb.z) / 2.0,
            ))
        });
        scene.lines.push(SceneLine {
            a,
            b,
            style: LineStyle::Surface,
            z_value: (a.z + b.z) / 2.0,
            intensity,
        });
    };
    // Horizontal segments (varying expiry), then vertical (varying strike);
    // emission order within the style is part of the tie-break contract.
    for yi in 0..ny {
        for xi in 0..nx.saturating_sub(1) {
            push_mesh(&mut scene, (xi, yi), (xi + 1, yi));
        }
    }
    for xi in 0..nx {
        for yi in 0..ny.saturating_sub(1) {
            push_mesh(&mut scene, (xi, yi), (xi, yi + 1));
        }
    }

    trace!(
        target: "render.scene",
        lines = scene.lines.len(),
        labels = scene.labels.len(),
        "scene built"
    );
    scene
}

/// One projected line, ready for rasterization.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLine {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub depth: f64,
    pub style: LineStyle,
    pub z_value: f64,
    pub intensity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameLabel {
    pub x: f64,
    pub y: f64,
    pub depth: f64,
    pub text: String,
}

/// Projected, depth-ordered frame: lines back to front, labels afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub lines: Vec<FrameLine>,
    pub labels: Vec<FrameLabel>,
}

/// Project the scene and sort for the painter's pass. The sort is stable:
/// equal depths resolve by scene emission order.
pub fn project_scene(scene: &Scene, proj: &Projection) -> RenderFrame {
    let mut lines: Vec<FrameLine> = scene
        .lines
        .iter()
        .map(|line| {
            let a = proj.project(line.a);
            let b = proj.project(line.b);
            FrameLine {
                x0: a.x,
                y0: a.y,
                x1: b.x,
                y1: b.y,
                depth: (a.depth + b.depth) / 2.0,
                style: line.style,
                z_value: line.z_value,
                intensity: line.intensity,
            }
        })
        .collect();
    lines.sort_by(|a, b| a.depth.partial_cmp(&b.depth).unwrap_or(std::cmp::Ordering::Equal));

    let labels = scene
        .labels
        .iter()
        .map(|label| {
            let p = proj.project(label.pos);
            FrameLabel {
                x: p.x,
                y: p.y,
                depth: p.depth + 1.0,
                text: label.text.clone(),
            }
        })
        .collect();

    RenderFrame { lines, labels }
}
