//! Summary risk metrics derived from a slope field.

use core_grid::{mean, variance};
use core_surface::SlopeField;

/// One grid cell flagged by the zone scans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridZone {
    pub xi: usize,
    pub yi: usize,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskMetrics {
    pub max_slope: f64,
    pub avg_slope: f64,
    pub slope_variance: f64,
    /// Fraction of cells with positive strike-direction slope, in [0, 1].
    pub upward_bias: f64,
    /// Mean expiry-direction slope, signed.
    pub term_structure_steepness: f64,
    /// Mean absolute strike-direction slope.
    pub smile_steepness: f64,
    /// Cells at >= 70% of the max magnitude, sorted descending, at most 10.
    pub high_risk_zones: Vec<GridZone>,
    /// Cells at <= 10% of the max magnitude, at most 10.
    pub flat_zones: Vec<GridZone>,
    /// Composite score in [0, 1].
    pub risk_score: f64,
}

const MAX_ZONES: usize = 10;
const HIGH_RISK_FRACTION: f64 = 0.7;
const FLAT_FRACTION: f64 = 0.1;

/// Derive summary metrics from a slope field. An empty field yields all
/// zeros.
pub fn compute_risk_metrics(field: &SlopeField) -> RiskMetrics {
    let n = field.len();
    if n == 0 {
        return RiskMetrics {
            max_slope: 0.0,
            avg_slope: 0.0,
            slope_variance: 0.0,
            upward_bias: 0.0,
            term_structure_steepness: 0.0,
            smile_steepness: 0.0,
            high_risk_zones: Vec::new(),
            flat_zones: Vec::new(),
            risk_score: 0.0,
        };
    }

    let max_slope = field
        .magnitude
        .iter()
        .copied()
        .fold(0.0f64, |acc, m| if m > acc { m } else { acc });
    let avg_slope = mean(&field.magnitude);
    let slope_variance = variance(&field.magnitude);
    let upward = field.dz_dy.iter().filter(|&&d| d > 0.0).count();
    let upward_bias = upward as f64 / n as f64;
    let term_structure_steepness = mean(&field.dz_dx);
    let smile_steepness = field.dz_dy.iter().map(|d| d.abs()).sum::<f64>() / n as f64;

    let mut high_risk_zones = Vec::new();
    let mut flat_zones = Vec::new();
    if max_slope > 0.0 {
        let high_cut = HIGH_RISK_FRACTION * max_slope;
        let flat_cut = FLAT_FRACTION * max_slope;
        for xi in 0..field.nx {
            for yi in 0..field.ny {
                let m = field.magnitude[field.flat_index(xi, yi)];
                if m >= high_cut {
                    high_risk_zones.push(GridZone {
                        xi,
                        yi,
                        magnitude: m,
                    });
                } else if m <= flat_cut && flat_zones.len() < MAX_ZONES {
                    flat_zones.push(GridZone {
                        xi,
                        yi,
                        magnitude: m,
                    });
                }
            }
        }
        high_risk_zones.sort_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        high_risk_zones.truncate(MAX_ZONES);
    }

    let risk_score = (0.4 * (max_slope / 2.0).min(1.0)
        + 0.3 * (slope_variance.sqrt() / 0.5).min(1.0)
        + 0.3 * (term_structure_steepness.abs() / 0.5).min(1.0))
    .clamp(0.0, 1.0);

    RiskMetrics {
        max_slope,
        avg_slope,
        slope_variance,
        upward_bias,
        term_structure_steepness,
        smile_steepness,
        high_risk_zones,
        flat_zones,
        risk_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_surface::{AxisLabels, Surface};

    fn field_of(f: impl FnMut(f64, f64) -> f64, n: usize) -> SlopeField {
        let axis: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Surface::from_fn(axis.clone(), axis, AxisLabels::default(), f)
            .unwrap()
            .slope()
    }

    #[test]
    fn zero_field_scores_zero() {
        let f = field_of(|_, _| 1.5, 4);
        let m = compute_risk_metrics(&f);
        assert_eq!(m.risk_score, 0.0);
        assert_eq!(m.max_slope, 0.0);
        assert_eq!(m.upward_bias, 0.0);
        assert!(m.high_risk_zones.is_empty());
        assert!(m.flat_zones.is_empty());
    }

    #[test]
    fn score_stays_in_unit_interval() {
        // Steep surface: the weighted terms individually saturate at 1.
        let f = field_of(|x, y| 100.0 * x - 50.0 * y, 6);
        let m = compute_risk_metrics(&f);
        assert!(m.risk_score > 0.9);
        assert!(m.risk_score <= 1.0);
    }

    #[test]
    fn upward_bias_counts_positive_strike_slope() {
        // z = y: dz_dy = 1 everywhere.
        let f = field_of(|_, y| y, 4);
        let m = compute_risk_metrics(&f);
        assert_eq!(m.upward_bias, 1.0);
        assert!((m.smile_steepness - 1.0).abs() < 1e-12);
        // Term-structure direction is flat for z = y.
        assert!(m.term_structure_steepness.abs() < 1e-12);
    }

    #[test]
    fn zones_are_capped_and_sorted() {
        // A bump in the middle produces a spread of magnitudes.
        let f = field_of(|x, y| ((x - 3.0).powi(2) + (y - 3.0).powi(2)).sqrt(), 8);
        let m = compute_risk_metrics(&f);
        assert!(m.high_risk_zones.len() <= 10);
        assert!(m.flat_zones.len() <= 10);
        for pair in m.high_risk_zones.windows(2) {
            assert!(pair[0].magnitude >= pair[1].magnitude);
        }
        for z in &m.high_risk_zones {
            assert!(z.magnitude >= 0.7 * m.max_slope - 1e-12);
        }
        for z in &m.flat_zones {
            assert!(z.magnitude <= 0.1 * m.max_slope + 1e-12);
        }
    }

    #[test]
    fn empty_field_is_all_zero() {
        let f = SlopeField {
            nx: 0,
            ny: 0,
            dz_dx: vec![],
            dz_dy: vec![],
            magnitude: vec![],
            angle: vec![],
        };
        let m = compute_risk_metrics(&f);
        assert_eq!(m.risk_score, 0.0);
        assert_eq!(m.avg_slope, 0.0);
    }
}
