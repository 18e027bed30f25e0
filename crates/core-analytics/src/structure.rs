//! Term-structure and smile shape analysis.
//!
//! Both analyses extract a family of curves from the surface (term
//! structure: IV against expiry at selected strikes; smile: IV against
//! strike at selected expiries) and classify the central curve's shape.

use core_surface::Surface;

/// Evenly spread `count` indices across `0..len`, always including both
/// ends, deduplicated and ordered. Used when the caller has no preferred
/// strikes/expiries.
pub fn default_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    if count <= 1 || len == 1 {
        return vec![len / 2];
    }
    let count = count.min(len);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let idx = (i as f64 / (count - 1) as f64 * (len - 1) as f64).round() as usize;
        if out.last() != Some(&idx) {
            out.push(idx);
        }
    }
    out
}

/// IV against expiry at one fixed strike.
#[derive(Debug, Clone, PartialEq)]
pub struct TermCurve {
    pub strike_index: usize,
    pub strike: f64,
    pub expiries: Vec<f64>,
    pub ivs: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermStructureAnalysis {
    pub curves: Vec<TermCurve>,
    /// Near IV below far IV on the central curve.
    pub contango: bool,
    pub backwardation: bool,
    /// `1 - |near - far| / max(near, far)`; 1.0 for a flat or degenerate
    /// curve.
    pub flatness: f64,
    /// Expiry indices on the central curve where the discrete second
    /// derivative changes sign.
    pub inflections: Vec<usize>,
}

/// IV against strike at one fixed expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct SmileCurve {
    pub expiry_index: usize,
    pub expiry: f64,
    pub strikes: Vec<f64>,
    pub ivs: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewDirection {
    Put,
    Call,
    Neutral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmileAnalysis {
    pub curves: Vec<SmileCurve>,
    /// Wing comparison on the central curve with 0.01 hysteresis.
    pub skew_direction: SkewDirection,
    /// `(left_wing + right_wing) / 2 - atm` on the central curve.
    pub butterfly_spread: f64,
}

/// Sign-change positions of the discrete second derivative along `values`.
/// Returned indices are curve positions (1-based interior points).
fn inflection_points(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    let second: Vec<f64> = values
        .windows(3)
        .map(|w| w[2] - 2.0 * w[1] + w[0])
        .collect();
    let mut out = Vec::new();
    for i in 1..second.len() {
        if second[i - 1] != 0.0 && second[i] != 0.0 && second[i - 1].signum() != second[i].signum()
        {
            // Interior grid index where the curvature flips.
            out.push(i + 1);
        }
    }
    out
}

/// Term-structure analysis at the given strike indices (out-of-range
/// indices are skipped). The central curve is the middle of the kept set.
pub fn analyze_term_structure(surface: &Surface, strike_indices: &[usize]) -> TermStructureAnalysis {
    let curves: Vec<TermCurve> = strike_indices
        .iter()
        .copied()
        .filter(|&yi| yi < surface.ny())
        .map(|yi| TermCurve {
            strike_index: yi,
            strike: surface.y()[yi],
            expiries: surface.x().to_vec(),
            ivs: (0..surface.nx()).map(|xi| surface.at(xi, yi)).collect(),
        })
        .collect();

    let (contango, backwardation, flatness, inflections) = match curves.get(curves.len() / 2) {
        Some(central) if central.ivs.len() >= 2 => {
            let near = central.ivs[0];
            let far = central.ivs[central.ivs.len() - 1];
            let peak = near.max(far);
            let flatness = if peak > 0.0 {
                1.0 - (near - far).abs() / peak
            } else {
                1.0
            };
            (
                near < far,
                near > far,
                flatness,
                inflection_points(&central.ivs),
            )
        }
        _ => (false, false, 1.0, Vec::new()),
    };

    TermStructureAnalysis {
        curves,
        contango,
        backwardation,
        flatness,
        inflections,
    }
}

const SKEW_HYSTERESIS: f64 = 0.01;

/// Smile analysis at the given expiry indices (out-of-range indices are
/// skipped). The central curve is the middle of the kept set.
pub fn analyze_smile(surface: &Surface, expiry_indices: &[usize]) -> SmileAnalysis {
    let curves: Vec<SmileCurve> = expiry_indices
        .iter()
        .copied()
        .filter(|&xi| xi < surface.nx())
        .map(|xi| SmileCurve {
            expiry_index: xi,
            expiry: surface.x()[xi],
            strikes: surface.y().to_vec(),
            ivs: (0..surface.ny()).map(|yi| surface.at(xi, yi)).collect(),
        })
        .collect();

    let (skew_direction, butterfly_spread) = match curves.get(curves.len() / 2) {
        Some(central) if central.ivs.len() >= 2 => {
            let left = central.ivs[0];
            let right = central.ivs[central.ivs.len() - 1];
            let atm = central.ivs[central.ivs.len() / 2];
            let skew = if left > right + SKEW_HYSTERESIS {
                SkewDirection::Put
            } else if right > left + SKEW_HYSTERESIS {
                SkewDirection::Call
            } else {
                SkewDirection::Neutral
            };
            (skew, (left + right) / 2.0 - atm)
        }
        _ => (SkewDirection::Neutral, 0.0),
    };

    SmileAnalysis {
        curves,
        skew_direction,
        butterfly_spread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_surface::AxisLabels;

    fn surface(f: impl FnMut(f64, f64) -> f64) -> Surface {
        Surface::from_fn(
            vec![0.25, 0.5, 1.0, 2.0],
            vec![80.0, 90.0, 100.0, 110.0, 120.0],
            AxisLabels::default(),
            f,
        )
        .unwrap()
    }

    #[test]
    fn default_indices_spread() {
        assert_eq!(default_indices(5, 3), vec![0, 2, 4]);
        assert_eq!(default_indices(10, 2), vec![0, 9]);
        assert_eq!(default_indices(1, 3), vec![0]);
        assert_eq!(default_indices(0, 3), Vec::<usize>::new());
        assert_eq!(default_indices(3, 10), vec![0, 1, 2]);
    }

    #[test]
    fn contango_when_far_iv_higher() {
        // IV rises with expiry at every strike.
        let s = surface(|t, _| 0.2 + 0.05 * t);
        let a = analyze_term_structure(&s, &default_indices(s.ny(), 3));
        assert!(a.contango);
        assert!(!a.backwardation);
        assert!(a.flatness < 1.0);
        assert_eq!(a.curves.len(), 3);
    }

    #[test]
    fn backwardation_when_near_iv_higher() {
        let s = surface(|t, _| 0.4 - 0.05 * t);
        let a = analyze_term_structure(&s, &[2]);
        assert!(!a.contango);
        assert!(a.backwardation);
    }

    #[test]
    fn flat_curve_has_unit_flatness() {
        let s = surface(|_, _| 0.3);
        let a = analyze_term_structure(&s, &[0, 2, 4]);
        assert!(!a.contango);
        assert!(!a.backwardation);
        assert_eq!(a.flatness, 1.0);
        assert!(a.inflections.is_empty());
    }

    #[test]
    fn inflection_detected_on_curvature_flip() {
        // Logistic-style rise: convex early, concave late.
        let flip = super::inflection_points(&[0.0, 0.1, 0.5, 0.95, 1.0]);
        assert_eq!(flip, vec![3]);
        // Uniform curvature has no flips.
        assert!(super::inflection_points(&[0.0, 1.0, 4.0, 9.0]).is_empty());
        assert!(super::inflection_points(&[1.0, 1.0]).is_empty());
    }

    #[test]
    fn put_skew_detected() {
        // IV falls with strike: left wing above right wing.
        let s = surface(|_, k| 0.5 - 0.002 * k);
        let a = analyze_smile(&s, &default_indices(s.nx(), 3));
        assert_eq!(a.skew_direction, SkewDirection::Put);
    }

    #[test]
    fn call_skew_detected() {
        let s = surface(|_, k| 0.1 + 0.002 * k);
        let a = analyze_smile(&s, &[1]);
        assert_eq!(a.skew_direction, SkewDirection::Call);
    }

    #[test]
    fn hysteresis_keeps_near_flat_smile_neutral() {
        // Wing difference below 0.01 stays neutral.
        let s = surface(|_, k| 0.2 + 0.0001 * k);
        let a = analyze_smile(&s, &[1]);
        assert_eq!(a.skew_direction, SkewDirection::Neutral);
    }

    #[test]
    fn butterfly_spread_positive_for_convex_smile() {
        let s = surface(|_, k| 0.2 + 0.0001 * (k - 100.0).powi(2));
        let a = analyze_smile(&s, &[2]);
        assert!(a.butterfly_spread > 0.0);
    }
}
