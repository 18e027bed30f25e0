//! 3D surface rendering: projection, scene assembly, depth-sorted
//! rasterization, and terminal emission.
//!
//! Pipeline:
//! 1. `scene::build_scene` turns a surface into normalized line work
//!    (cube wireframe, labeled axes, bottom grid, surface mesh).
//! 2. `scene::project_scene` applies the camera ([`Projection`]) and sorts
//!    lines back-to-front for the painter's pass.
//! 3. `raster::rasterize` draws Bresenham lines into a depth-tested
//!    `(char, color, depth)` buffer and scales labels alongside.
//! 4. `writer` maps the buffer to ANSI / crossterm output through the
//!    [`RenderSink`] contract.
//!
//! Steps 1-3 are pure: identical inputs produce identical buffers, which
//! the determinism tests rely on.

pub mod projection;
pub mod raster;
pub mod scene;
pub mod style;
pub mod writer;

pub use projection::{Point3, Projected, Projection};
pub use raster::{Cell, PlacedLabel, RasterBuffer, composite_labels, rasterize};
pub use scene::{
    FrameLabel, FrameLine, RenderFrame, Scene, SceneLabel, SceneLine, SceneOptions, build_scene,
    project_scene,
};
pub use style::{ColorTag, LineStyle, angle_glyph, surface_band};
pub use writer::{RenderSink, TerminalSink, to_ansi_string};

use core_surface::Surface;

/// Full pipeline convenience: surface to composited raster in one call.
pub fn render_surface(
    surface: &Surface,
    proj: &Projection,
    opts: &SceneOptions,
    width: usize,
    height: usize,
) -> RasterBuffer {
    let scene = build_scene(surface, opts);
    let frame = project_scene(&scene, proj);
    let (mut buf, labels) = rasterize(&frame, proj, width, height);
    composite_labels(&mut buf, &labels);
    buf
}
