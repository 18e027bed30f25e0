//! Depth-tested character rasterization.
//!
//! The buffer holds `(char, color, depth)` cells with depth `-inf` for
//! unpainted. Lines are drawn with Bresenham stepping; a pixel is written
//! when its depth is `>=` the stored depth, so within the painter's
//! back-to-front order a later equal-depth draw wins. Labels are stamped
//! after all lines at their own (higher) depth.
//!
//! Rasterization is a pure function of its inputs: no clocks, no
//! randomness, no global state.

use crate::projection::Projection;
use crate::scene::{FrameLabel, RenderFrame};
use crate::style::{ColorTag, LineStyle, angle_glyph, surface_band};

/// Margin reserved around the drawable area: 2 columns each side, 1 row
/// top and bottom.
const MARGIN_X: usize = 4;
const MARGIN_Y: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub color: ColorTag,
    pub depth: f64,
}

impl Cell {
    const EMPTY: Cell = Cell {
        ch: ' ',
        color: ColorTag::White,
        depth: f64::NEG_INFINITY,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl RasterBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::EMPTY; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.cells[y * self.width + x]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width)
    }

    /// Depth-tested write; out-of-bounds coordinates are ignored.
    pub fn plot(&mut self, x: i64, y: i64, ch: char, color: ColorTag, depth: f64) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let cell = &mut self.cells[y as usize * self.width + x as usize];
        if depth >= cell.depth {
            *cell = Cell { ch, color, depth };
        }
    }

    /// Count of painted cells (depth above the sentinel).
    pub fn painted(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.depth > f64::NEG_INFINITY)
            .count()
    }
}

/// A label after scene scaling, in buffer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub x: i64,
    pub y: i64,
    pub depth: f64,
    pub text: String,
}

/// Map frame coordinates into the usable buffer area, preserving aspect.
/// The scene's logical extent is `2*center_x` by `2*center_y`.
struct ScenePlacement {
    scale: f64,
    center_x: f64,
    center_y: f64,
    half_w: f64,
    half_h: f64,
}

impl ScenePlacement {
    fn new(proj: &Projection, width: usize, height: usize) -> Self {
        let usable_w = width.saturating_sub(MARGIN_X).max(1) as f64;
        let usable_h = height.saturating_sub(MARGIN_Y).max(1) as f64;
        let logical_w = (2.0 * proj.center_x).max(f64::EPSILON);
        let logical_h = (2.0 * proj.center_y).max(f64::EPSILON);
        let scale = (usable_w / logical_w).min(usable_h / logical_h);
        Self {
            scale,
            center_x: proj.center_x,
            center_y: proj.center_y,
            half_w: width as f64 / 2.0,
            half_h: height as f64 / 2.0,
        }
    }

    fn map(&self, x: f64, y: f64) -> (i64, i64) {
        let px = (x - self.center_x) * self.scale + self.half_w;
        let py = (y - self.center_y) * self.scale + self.half_h;
        (px.round() as i64, py.round() as i64)
    }
}

/// Bresenham between two integer points, invoking `plot` per pixel.
fn bresenham(x0: i64, y0: i64, x1: i64, y1: i64, mut plot: impl FnMut(i64, i64)) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        plot(x, y);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Rasterize a projected frame into a `width x height` buffer. Returns the
/// line raster and the scaled labels; [`composite_labels`] stamps the
/// latter on top.
pub fn rasterize(
    frame: &RenderFrame,
    proj: &Projection,
    width: usize,
    height: usize,
) -> (RasterBuffer, Vec<PlacedLabel>) {
    let mut buf = RasterBuffer::new(width, height);
    let placement = ScenePlacement::new(proj, width, height);

    for line in &frame.lines {
        let (x0, y0) = placement.map(line.x0, line.y0);
        let (x1, y1) = placement.map(line.x1, line.y1);
        let (ch, color) = match line.style {
            LineStyle::Surface => surface_band(line.z_value),
            style => (
                angle_glyph(style, (x1 - x0) as f64, (y1 - y0) as f64),
                style.fixed_color(),
            ),
        };
        let depth = line.depth;
        bresenham(x0, y0, x1, y1, |x, y| buf.plot(x, y, ch, color, depth));
    }

    let labels = frame
        .labels
        .iter()
        .map(|label: &FrameLabel| {
            let (x, y) = placement.map(label.x, label.y);
            PlacedLabel {
                x,
                y,
                depth: label.depth,
                text: label.text.clone(),
            }
        })
        .collect();

    (buf, labels)
}

/// Stamp labels into the buffer, one char per cell, depth-tested at the
/// label's own depth.
pub fn composite_labels(buf: &mut RasterBuffer, labels: &[PlacedLabel]) {
    for label in labels {
        for (i, ch) in label.text.chars().enumerate() {
            buf.plot(label.x + i as i64, label.y, ch, ColorTag::White, label.depth);
        }
    }
}
