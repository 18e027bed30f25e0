//! Regular-grid surface model: the shared data structure between producers,
//! analytics, the renderer, and the wire codecs.
//!
//! A [`Surface`] samples `z = f(x, y)` on a rectilinear grid with strictly
//! increasing axes and row-major storage (`z[xi * ny + yi]`). Metadata caches
//! the per-axis domains; every mutator recomputes the affected domain so the
//! cache is never stale (the alternative — marking stale and recomputing on
//! read — pushes branches into every analytics loop).
//!
//! Invariants:
//! * `x.len() == nx >= 1`, `y.len() == ny >= 1`, `z.len() == nx * ny`.
//! * `x` and `y` strictly increasing.
//! * `meta.x_domain/y_domain/z_domain` equal the current min/max of the
//!   backing buffers (NaN holes excluded from the scan).
//!
//! NaN values in `z` are tolerated as sentinels; derived results involving
//! them propagate naturally.

use core_grid::{MinMax, is_strictly_increasing, minmax};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod interp;
pub mod slope;

pub use interp::{InterpMethod, SliceCurve};
pub use slope::SlopeField;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("axis '{axis}' is empty")]
    EmptyAxis { axis: &'static str },
    #[error("axis '{axis}' is not strictly increasing")]
    AxisNotIncreasing { axis: &'static str },
    #[error("z length {actual} does not match nx*ny = {expected}")]
    DataLength { expected: usize, actual: usize },
    #[error("grid index ({xi}, {yi}) out of bounds for {nx}x{ny} surface")]
    IndexOutOfBounds {
        xi: usize,
        yi: usize,
        nx: usize,
        ny: usize,
    },
}

/// Axis and value labels carried through serialization and into rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLabels {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl Default for AxisLabels {
    fn default() -> Self {
        Self {
            x: "x".to_string(),
            y: "y".to_string(),
            z: "z".to_string(),
        }
    }
}

/// Cached `[min, max]` per axis plus for `z`. Serialized as part of the
/// surface wire metadata; unknown sibling keys from newer peers are ignored
/// on decode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domains {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMeta {
    pub labels: AxisLabels,
    pub domains: Domains,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn domain_of(v: &[f64]) -> [f64; 2] {
    let mm = minmax(v);
    [mm.min, mm.max]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    nx: usize,
    ny: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    meta: SurfaceMeta,
}

impl Surface {
    /// Build a surface from axes and row-major values, validating the length
    /// and monotonicity invariants. Domains are computed here; `timestamp`
    /// is the construction instant.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        labels: AxisLabels,
    ) -> Result<Self, SurfaceError> {
        if x.is_empty() {
            return Err(SurfaceError::EmptyAxis { axis: "x" });
        }
        if y.is_empty() {
            return Err(SurfaceError::EmptyAxis { axis: "y" });
        }
        if x.len() > 1 && !is_strictly_increasing(&x) {
            return Err(SurfaceError::AxisNotIncreasing { axis: "x" });
        }
        if y.len() > 1 && !is_strictly_increasing(&y) {
            return Err(SurfaceError::AxisNotIncreasing { axis: "y" });
        }
        let expected = x.len() * y.len();
        if z.len() != expected {
            return Err(SurfaceError::DataLength {
                expected,
                actual: z.len(),
            });
        }
        let meta = SurfaceMeta {
            labels,
            domains: Domains {
                x: domain_of(&x),
                y: domain_of(&y),
                z: domain_of(&z),
            },
            timestamp: now_millis(),
        };
        Ok(Self {
            nx: x.len(),
            ny: y.len(),
            x,
            y,
            z,
            meta,
        })
    }

    /// Convenience constructor sampling `f` on the axis product.
    pub fn from_fn(
        x: Vec<f64>,
        y: Vec<f64>,
        labels: AxisLabels,
        mut f: impl FnMut(f64, f64) -> f64,
    ) -> Result<Self, SurfaceError> {
        let mut z = Vec::with_capacity(x.len() * y.len());
        for &xv in &x {
            for &yv in &y {
                z.push(f(xv, yv));
            }
        }
        Self::new(x, y, z, labels)
    }

    /// Rebuild from pre-validated wire parts. Axes and lengths are still
    /// checked (a malformed peer must not be able to construct a broken
    /// surface), but metadata travels through: the received timestamp and
    /// labels are kept while domains are recomputed from the actual data.
    pub fn from_wire_parts(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        labels: AxisLabels,
        timestamp: u64,
    ) -> Result<Self, SurfaceError> {
        let mut s = Self::new(x, y, z, labels)?;
        s.meta.timestamp = timestamp;
        Ok(s)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn meta(&self) -> &SurfaceMeta {
        &self.meta
    }

    pub fn labels(&self) -> &AxisLabels {
        &self.meta.labels
    }

    #[inline]
    pub fn flat_index(&self, xi: usize, yi: usize) -> usize {
        xi * self.ny + yi
    }

    /// Value at grid point `(xi, yi)`; callers index within bounds.
    #[inline]
    pub fn at(&self, xi: usize, yi: usize) -> f64 {
        self.z[xi * self.ny + yi]
    }

    /// Clamped variant used by the interpolators near boundaries.
    #[inline]
    pub fn at_clamped(&self, xi: isize, yi: isize) -> f64 {
        let xi = xi.clamp(0, self.nx as isize - 1) as usize;
        let yi = yi.clamp(0, self.ny as isize - 1) as usize;
        self.z[xi * self.ny + yi]
    }

    /// Write one grid point and recompute the z domain.
    pub fn set(&mut self, xi: usize, yi: usize, v: f64) -> Result<(), SurfaceError> {
        if xi >= self.nx || yi >= self.ny {
            return Err(SurfaceError::IndexOutOfBounds {
                xi,
                yi,
                nx: self.nx,
                ny: self.ny,
            });
        }
        self.z[xi * self.ny + yi] = v;
        self.recompute_z_domain();
        Ok(())
    }

    /// Batched in-place update by flat index: the shape a SURFACE_DELTA
    /// payload arrives in. Out-of-range indices are skipped and reported in
    /// the returned count so the caller can log once per frame rather than
    /// failing the whole delta. The z domain is recomputed once at the end.
    pub fn apply_delta(&mut self, indices: &[u32], values: &[f64]) -> usize {
        let mut skipped = 0usize;
        for (&idx, &v) in indices.iter().zip(values) {
            match self.z.get_mut(idx as usize) {
                Some(slot) => *slot = v,
                None => skipped += 1,
            }
        }
        self.recompute_z_domain();
        skipped
    }

    /// Replace the whole z buffer (same shape) and recompute the domain.
    pub fn replace_z(&mut self, z: Vec<f64>) -> Result<(), SurfaceError> {
        if z.len() != self.nx * self.ny {
            return Err(SurfaceError::DataLength {
                expected: self.nx * self.ny,
                actual: z.len(),
            });
        }
        self.z = z;
        self.recompute_z_domain();
        Ok(())
    }

    fn recompute_z_domain(&mut self) {
        self.meta.domains.z = domain_of(&self.z);
    }

    pub fn z_minmax(&self) -> MinMax {
        MinMax {
            min: self.meta.domains.z[0],
            max: self.meta.domains.z[1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn small_surface() -> Surface {
        // z = x + 10y on a 3x2 grid.
        Surface::from_fn(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            AxisLabels::default(),
            |x, y| x + 10.0 * y,
        )
        .unwrap()
    }

    #[test]
    fn construction_validates_shape() {
        assert_eq!(
            Surface::new(vec![], vec![0.0], vec![], AxisLabels::default()),
            Err(SurfaceError::EmptyAxis { axis: "x" })
        );
        assert_eq!(
            Surface::new(
                vec![0.0, 0.0],
                vec![0.0],
                vec![1.0, 2.0],
                AxisLabels::default()
            ),
            Err(SurfaceError::AxisNotIncreasing { axis: "x" })
        );
        assert_eq!(
            Surface::new(
                vec![0.0, 1.0],
                vec![0.0],
                vec![1.0],
                AxisLabels::default()
            ),
            Err(SurfaceError::DataLength {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn row_major_layout() {
        let s = small_surface();
        assert_eq!(s.nx(), 3);
        assert_eq!(s.ny(), 2);
        // z[xi * ny + yi]
        assert_eq!(s.at(0, 0), 0.0);
        assert_eq!(s.at(0, 1), 10.0);
        assert_eq!(s.at(2, 0), 2.0);
        assert_eq!(s.at(2, 1), 12.0);
        assert_eq!(s.flat_index(2, 1), 5);
    }

    #[test]
    fn domains_cached_at_creation() {
        let s = small_surface();
        assert_eq!(s.meta().domains.x, [0.0, 2.0]);
        assert_eq!(s.meta().domains.y, [0.0, 1.0]);
        assert_eq!(s.meta().domains.z, [0.0, 12.0]);
    }

    #[test]
    fn set_recomputes_domain() {
        let mut s = small_surface();
        s.set(1, 1, 99.0).unwrap();
        assert_eq!(s.meta().domains.z, [0.0, 99.0]);
        s.set(1, 1, -5.0).unwrap();
        assert_eq!(s.meta().domains.z, [-5.0, 12.0]);
        assert!(s.set(3, 0, 0.0).is_err());
    }

    #[test]
    fn apply_delta_skips_out_of_range() {
        let mut s = small_surface();
        let skipped = s.apply_delta(&[0, 5, 100], &[50.0, -7.0, 1.0]);
        assert_eq!(skipped, 1);
        assert_eq!(s.at(0, 0), 50.0);
        assert_eq!(s.at(2, 1), -7.0);
        assert_eq!(s.meta().domains.z, [-7.0, 50.0]);
    }

    #[test]
    fn meta_json_round_trip_ignores_unknown_keys() {
        let s = small_surface();
        let json = serde_json::to_string(s.meta()).unwrap();
        let with_extra = json.replacen('{', "{\"future_field\":42,", 1);
        let back: SurfaceMeta = serde_json::from_str(&with_extra).unwrap();
        assert_eq!(&back, s.meta());
    }

    #[test]
    fn nan_tolerated_in_domain_scan() {
        let mut s = small_surface();
        s.set(0, 0, f64::NAN).unwrap();
        // NaN excluded from the scan; remaining values drive the domain.
        assert_eq!(s.meta().domains.z, [1.0, 12.0]);
    }
}
