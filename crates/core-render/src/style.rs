//! Glyph and color selection for rasterized lines.
//!
//! Design invariants:
//! * The height-band table is part of the visual contract: band bounds,
//!   glyphs, and color tags must stay in sync across sinks, so they live
//!   in one place here.
//! * Non-surface styles have a fixed color; their glyph still follows the
//!   segment angle so cube edges and axes read as lines rather than
//!   character soup.

/// Terminal color tags. The display layer maps these to basic ANSI SGR
/// codes; no RGB is assumed anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorTag {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Gray,
}

impl ColorTag {
    /// ANSI SGR foreground code.
    pub fn sgr_code(self) -> u8 {
        match self {
            ColorTag::Black => 30,
            ColorTag::Red => 31,
            ColorTag::Green => 32,
            ColorTag::Yellow => 33,
            ColorTag::Blue => 34,
            ColorTag::Magenta => 35,
            ColorTag::Cyan => 36,
            ColorTag::White => 37,
            ColorTag::Gray => 90,
        }
    }
}

/// Which pass of the scene a line belongs to. Surface lines additionally
/// carry a normalized height used for banding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineStyle {
    Wireframe,
    Axis,
    Grid,
    Surface,
}

impl LineStyle {
    /// Fixed color for the non-surface styles. Surface lines derive their
    /// color from the height band instead.
    pub fn fixed_color(self) -> ColorTag {
        match self {
            LineStyle::Wireframe => ColorTag::White,
            LineStyle::Axis => ColorTag::Yellow,
            LineStyle::Grid => ColorTag::Gray,
            LineStyle::Surface => ColorTag::White,
        }
    }
}

/// Height bands over `z' = (z_value + 1) / 2`, upper-bound exclusive
/// except the last. Order matters: lookup scans front to back.
const HEIGHT_BANDS: [(f64, char, ColorTag); 8] = [
    (0.08, '·', ColorTag::Gray),
    (0.20, '∙', ColorTag::Blue),
    (0.35, ':', ColorTag::Cyan),
    (0.50, '░', ColorTag::Green),
    (0.65, '▒', ColorTag::Yellow),
    (0.80, '▓', ColorTag::Magenta),
    (0.95, '█', ColorTag::Red),
    (1.0, '▀', ColorTag::White),
];

/// Glyph and color for a surface segment with normalized height
/// `z_value` in [-1, 1]. Out-of-range values clamp into the band table.
pub fn surface_band(z_value: f64) -> (char, ColorTag) {
    let z = ((z_value + 1.0) / 2.0).clamp(0.0, 1.0);
    for &(bound, glyph, color) in &HEIGHT_BANDS[..HEIGHT_BANDS.len() - 1] {
        if z < bound {
            return (glyph, color);
        }
    }
    let (_, glyph, color) = HEIGHT_BANDS[HEIGHT_BANDS.len() - 1];
    (glyph, color)
}

/// Angle-based glyph for the non-surface styles, from the screen-space
/// deltas of the segment. Heavy strokes for axes, light for the rest.
pub fn angle_glyph(style: LineStyle, dx: f64, dy: f64) -> char {
    let heavy = matches!(style, LineStyle::Axis);
    let adx = dx.abs();
    let ady = dy.abs();
    if adx >= 2.0 * ady {
        if heavy { '━' } else { '─' }
    } else if ady >= 2.0 * adx {
        if heavy { '┃' } else { '│' }
    } else if (dx > 0.0) == (dy > 0.0) {
        // Screen y grows downward: equal signs slope down-right.
        '╲'
    } else {
        '╱'
    }
}
