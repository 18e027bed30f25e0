//! Per-cell gradient of a surface: central differences on the interior,
//! one-sided first-order differences at the boundaries, both divided by the
//! actual axis spacing (axes may be non-uniform).

use crate::Surface;

/// Dual of [`Surface`]: per-cell partial derivatives plus derived magnitude
/// and direction, all `nx * ny` long in the same row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeField {
    pub nx: usize,
    pub ny: usize,
    pub dz_dx: Vec<f64>,
    pub dz_dy: Vec<f64>,
    pub magnitude: Vec<f64>,
    pub angle: Vec<f64>,
}

impl SlopeField {
    #[inline]
    pub fn flat_index(&self, xi: usize, yi: usize) -> usize {
        xi * self.ny + yi
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Surface {
    /// Compute the slope field. Degenerate axes (length 1) produce a zero
    /// derivative along that direction.
    pub fn slope(&self) -> SlopeField {
        let nx = self.nx();
        let ny = self.ny();
        let x = self.x();
        let y = self.y();
        let n = nx * ny;
        let mut dz_dx = vec![0.0; n];
        let mut dz_dy = vec![0.0; n];

        for xi in 0..nx {
            for yi in 0..ny {
                let i = xi * ny + yi;
                if nx > 1 {
                    dz_dx[i] = if xi == 0 {
                        (self.at(1, yi) - self.at(0, yi)) / (x[1] - x[0])
                    } else if xi == nx - 1 {
                        (self.at(nx - 1, yi) - self.at(nx - 2, yi)) / (x[nx - 1] - x[nx - 2])
                    } else {
                        (self.at(xi + 1, yi) - self.at(xi - 1, yi)) / (x[xi + 1] - x[xi - 1])
                    };
                }
                if ny > 1 {
                    dz_dy[i] = if yi == 0 {
                        (self.at(xi, 1) - self.at(xi, 0)) / (y[1] - y[0])
                    } else if yi == ny - 1 {
                        (self.at(xi, ny - 1) - self.at(xi, ny - 2)) / (y[ny - 1] - y[ny - 2])
                    } else {
                        (self.at(xi, yi + 1) - self.at(xi, yi - 1)) / (y[yi + 1] - y[yi - 1])
                    };
                }
            }
        }

        let mut magnitude = vec![0.0; n];
        let mut angle = vec![0.0; n];
        for i in 0..n {
            magnitude[i] = (dz_dx[i] * dz_dx[i] + dz_dy[i] * dz_dy[i]).sqrt();
            angle[i] = dz_dy[i].atan2(dz_dx[i]);
        }

        SlopeField {
            nx,
            ny,
            dz_dx,
            dz_dy,
            magnitude,
            angle,
        }
    }
}
