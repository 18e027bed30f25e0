//! Static no-arbitrage checks over an IV surface and the iterative repair
//! loop that removes detected violations.
//!
//! Conventions: `x` axis is expiry `T` in years, `y` axis is strike `K`,
//! cells hold implied vol. Calendar checks compare total variance
//! `w = iv^2 * T` along expiries at a fixed strike; butterfly checks smile
//! convexity across strikes at a fixed expiry; the vertical check bounds
//! the slope of `w` against log-moneyness `k = ln(K/F)` when a forward
//! price is available.

use crate::total_variance;
use core_surface::Surface;
use tracing::debug;

pub const CALENDAR_TOLERANCE: f64 = 0.001;
pub const BUTTERFLY_TOLERANCE: f64 = 0.001;
pub const VERTICAL_SLOPE_LIMIT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbCategory {
    Calendar,
    Butterfly,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    /// Bucket a violation magnitude by the per-category thresholds.
    fn classify(category: ArbCategory, magnitude: f64) -> Severity {
        let (moderate, severe) = match category {
            ArbCategory::Calendar => (0.005, 0.01),
            ArbCategory::Butterfly => (0.01, 0.02),
            ArbCategory::Vertical => (0.5, 1.0),
        };
        if magnitude >= severe {
            Severity::Severe
        } else if magnitude >= moderate {
            Severity::Moderate
        } else {
            Severity::Minor
        }
    }
}

/// One detected violation, anchored to the grid cell(s) involved.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub category: ArbCategory,
    pub severity: Severity,
    /// Expiry index; for calendar violations the far (later) expiry.
    pub expiry_index: usize,
    pub strike_index: usize,
    pub expiry: f64,
    pub strike: f64,
    /// How far past the tolerance the constraint is broken, in the
    /// category's native units (variance for calendar, vol for butterfly,
    /// slope excess for vertical).
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ArbOptions {
    pub calendar_tolerance: f64,
    pub butterfly_tolerance: f64,
    pub vertical_slope_limit: f64,
    /// Forward price; enables the vertical check.
    pub forward: Option<f64>,
}

impl Default for ArbOptions {
    fn default() -> Self {
        Self {
            calendar_tolerance: CALENDAR_TOLERANCE,
            butterfly_tolerance: BUTTERFLY_TOLERANCE,
            vertical_slope_limit: VERTICAL_SLOPE_LIMIT,
            forward: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbitrageReport {
    pub calendar_count: usize,
    pub butterfly_count: usize,
    pub vertical_count: usize,
    /// Unsorted; callers order as they need.
    pub violations: Vec<Violation>,
}

impl ArbitrageReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn total(&self) -> usize {
        self.violations.len()
    }
}

/// Calendar check: for each strike column, total variance must not decrease
/// by more than `tolerance` between consecutive expiries.
pub fn check_calendar(surface: &Surface, tolerance: f64) -> Vec<Violation> {
    let mut out = Vec::new();
    let x = surface.x();
    for yi in 0..surface.ny() {
        for xi in 0..surface.nx().saturating_sub(1) {
            let w_near = total_variance(surface.at(xi, yi), x[xi]);
            let w_far = total_variance(surface.at(xi + 1, yi), x[xi + 1]);
            let decrease = w_near - w_far;
            if decrease > tolerance {
                out.push(Violation {
                    category: ArbCategory::Calendar,
                    severity: Severity::classify(ArbCategory::Calendar, decrease),
                    expiry_index: xi + 1,
                    strike_index: yi,
                    expiry: x[xi + 1],
                    strike: surface.y()[yi],
                    magnitude: decrease,
                });
            }
        }
    }
    out
}

/// Butterfly check: at each expiry, the smile must be convex across each
/// interior strike within `tolerance`.
pub fn check_butterfly(surface: &Surface, tolerance: f64) -> Vec<Violation> {
    let mut out = Vec::new();
    for xi in 0..surface.nx() {
        for yi in 1..surface.ny().saturating_sub(1) {
            let mid = surface.at(xi, yi);
            let convexity = (surface.at(xi, yi - 1) + surface.at(xi, yi + 1)) / 2.0 - mid;
            if convexity < -tolerance {
                let magnitude = -convexity;
                out.push(Violation {
                    category: ArbCategory::Butterfly,
                    severity: Severity::classify(ArbCategory::Butterfly, magnitude),
                    expiry_index: xi,
                    strike_index: yi,
                    expiry: surface.x()[xi],
                    strike: surface.y()[yi],
                    magnitude,
                });
            }
        }
    }
    out
}

/// Vertical check: with a forward price, the slope of total variance
/// against log-moneyness between consecutive strikes must stay within
/// `[-limit, limit]`. Strikes at or below zero are skipped (log-moneyness
/// undefined).
pub fn check_vertical(surface: &Surface, forward: f64, limit: f64) -> Vec<Violation> {
    let mut out = Vec::new();
    if forward <= 0.0 {
        return out;
    }
    let y = surface.y();
    for xi in 0..surface.nx() {
        let t = surface.x()[xi];
        for yi in 0..surface.ny().saturating_sub(1) {
            let (k_lo, k_hi) = (y[yi], y[yi + 1]);
            if k_lo <= 0.0 || k_hi <= 0.0 {
                continue;
            }
            let lm_lo = (k_lo / forward).ln();
            let lm_hi = (k_hi / forward).ln();
            let dk = lm_hi - lm_lo;
            if dk == 0.0 {
                continue;
            }
            let slope = (total_variance(surface.at(xi, yi + 1), t)
                - total_variance(surface.at(xi, yi), t))
                / dk;
            let excess = slope.abs() - limit;
            if excess > 0.0 {
                out.push(Violation {
                    category: ArbCategory::Vertical,
                    severity: Severity::classify(ArbCategory::Vertical, excess),
                    expiry_index: xi,
                    strike_index: yi + 1,
                    expiry: t,
                    strike: k_hi,
                    magnitude: excess,
                });
            }
        }
    }
    out
}

/// Run all applicable checks and aggregate the counts. The vertical check
/// only runs when `opts.forward` is supplied.
pub fn check_all(surface: &Surface, opts: &ArbOptions) -> ArbitrageReport {
    let calendar = check_calendar(surface, opts.calendar_tolerance);
    let butterfly = check_butterfly(surface, opts.butterfly_tolerance);
    let vertical = match opts.forward {
        Some(f) => check_vertical(surface, f, opts.vertical_slope_limit),
        None => Vec::new(),
    };
    let mut report = ArbitrageReport {
        calendar_count: calendar.len(),
        butterfly_count: butterfly.len(),
        vertical_count: vertical.len(),
        violations: Vec::with_capacity(calendar.len() + butterfly.len() + vertical.len()),
    };
    report.violations.extend(calendar);
    report.violations.extend(butterfly);
    report.violations.extend(vertical);
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementOutcome {
    pub iterations: usize,
    pub converged: bool,
}

/// Iteratively repair calendar and butterfly violations in place.
///
/// Each pass nudges the far-dated point of every calendar violation upward
/// by `sqrt(violation / T_far) / 2` in vol units and replaces every
/// butterfly violation's mid point with the mean of its strike neighbors,
/// then re-checks. Stops as soon as both checks come back clean or after
/// `max_iter` passes.
pub fn enforce_arbitrage_free(
    surface: &mut Surface,
    max_iter: usize,
    tolerance: f64,
) -> EnforcementOutcome {
    for pass in 1..=max_iter {
        let calendar = check_calendar(surface, tolerance);
        let butterfly = check_butterfly(surface, tolerance);
        if calendar.is_empty() && butterfly.is_empty() {
            debug!(target: "analytics.arbitrage", pass, "surface clean");
            return EnforcementOutcome {
                iterations: pass - 1,
                converged: true,
            };
        }
        for v in &calendar {
            let (xi, yi) = (v.expiry_index, v.strike_index);
            let t_far = surface.x()[xi];
            if t_far <= 0.0 {
                continue;
            }
            let bump = (v.magnitude / t_far).sqrt() / 2.0;
            let cur = surface.at(xi, yi);
            let _ = surface.set(xi, yi, cur + bump);
        }
        for v in &butterfly {
            let (xi, yi) = (v.expiry_index, v.strike_index);
            let avg = (surface.at(xi, yi - 1) + surface.at(xi, yi + 1)) / 2.0;
            let _ = surface.set(xi, yi, avg);
        }
        debug!(
            target: "analytics.arbitrage",
            pass,
            calendar = calendar.len(),
            butterfly = butterfly.len(),
            "repair pass applied"
        );
    }
    let clean = check_calendar(surface, tolerance).is_empty()
        && check_butterfly(surface, tolerance).is_empty();
    EnforcementOutcome {
        iterations: max_iter,
        converged: clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_surface::AxisLabels;

    fn flat_surface(iv: f64) -> Surface {
        Surface::from_fn(
            vec![0.5, 1.0, 1.5, 2.0],
            vec![80.0, 90.0, 100.0, 110.0, 120.0],
            AxisLabels::default(),
            |_, _| iv,
        )
        .unwrap()
    }

    #[test]
    fn flat_surface_is_calendar_clean() {
        // Constant vol: w = iv^2 * T strictly increases with T.
        let s = flat_surface(0.2);
        assert!(check_calendar(&s, CALENDAR_TOLERANCE).is_empty());
    }

    #[test]
    fn calendar_detects_decreasing_total_variance() {
        // Strike column with w(1) = 0.16, w(2) = 0.02: a strong decrease.
        let mut s = Surface::from_fn(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            AxisLabels::default(),
            |_, _| 0.2,
        )
        .unwrap();
        for yi in 0..3 {
            s.set(0, yi, 0.4).unwrap();
            s.set(1, yi, 0.1).unwrap();
        }
        let violations = check_calendar(&s, CALENDAR_TOLERANCE);
        assert_eq!(violations.len(), 3);
        let v = &violations[0];
        assert_eq!(v.category, ArbCategory::Calendar);
        assert_eq!(v.expiry_index, 1);
        // w_near - w_far = 0.16 - 0.02 = 0.14 >= 0.01 -> severe.
        assert!((v.magnitude - 0.14).abs() < 1e-12);
        assert_eq!(v.severity, Severity::Severe);
    }

    #[test]
    fn butterfly_detects_concave_smile() {
        let mut s = flat_surface(0.2);
        // Spike the middle strike at one expiry: neighbors average 0.2,
        // mid 0.3 -> convexity -0.1.
        s.set(1, 2, 0.3).unwrap();
        let violations = check_butterfly(&s, BUTTERFLY_TOLERANCE);
        assert!(!violations.is_empty());
        let v = violations
            .iter()
            .find(|v| v.expiry_index == 1 && v.strike_index == 2)
            .expect("spiked cell flagged");
        assert!((v.magnitude - 0.1).abs() < 1e-12);
        assert_eq!(v.severity, Severity::Severe);
    }

    #[test]
    fn butterfly_severity_buckets() {
        assert_eq!(
            Severity::classify(ArbCategory::Butterfly, 0.005),
            Severity::Minor
        );
        assert_eq!(
            Severity::classify(ArbCategory::Butterfly, 0.015),
            Severity::Moderate
        );
        assert_eq!(
            Severity::classify(ArbCategory::Butterfly, 0.02),
            Severity::Severe
        );
    }

    #[test]
    fn vertical_requires_forward() {
        let s = flat_surface(0.2);
        let report = check_all(&s, &ArbOptions::default());
        assert_eq!(report.vertical_count, 0);
        // Flat vol has dw/dk = 0 within each expiry, clean with a forward.
        let with_fwd = ArbOptions {
            forward: Some(100.0),
            ..ArbOptions::default()
        };
        let report = check_all(&s, &with_fwd);
        assert_eq!(report.vertical_count, 0);
    }

    #[test]
    fn vertical_detects_steep_variance_slope() {
        let mut s = flat_surface(0.2);
        // Push one strike's vol far up at one expiry; the w-vs-k slope to
        // its neighbor breaks the +/-2 band.
        s.set(0, 4, 2.0).unwrap();
        let violations = check_vertical(&s, 100.0, VERTICAL_SLOPE_LIMIT);
        assert!(!violations.is_empty());
        assert!(violations.iter().all(|v| v.category == ArbCategory::Vertical));
    }

    #[test]
    fn check_all_aggregates_counts() {
        let mut s = flat_surface(0.2);
        s.set(0, 2, 0.5).unwrap(); // butterfly break at expiry 0
        let report = check_all(&s, &ArbOptions::default());
        assert_eq!(report.total(), report.violations.len());
        assert_eq!(
            report.total(),
            report.calendar_count + report.butterfly_count + report.vertical_count
        );
        assert!(report.butterfly_count > 0);
    }

    #[test]
    fn enforcement_reaches_clean_state() {
        let mut s = flat_surface(0.2);
        // Seed both violation kinds.
        for yi in 0..5 {
            s.set(0, yi, 0.45).unwrap(); // near expiry too hot -> calendar
        }
        s.set(2, 2, 0.35).unwrap(); // concave smile point
        let outcome = enforce_arbitrage_free(&mut s, 200, CALENDAR_TOLERANCE);
        assert!(outcome.converged, "not converged after {} passes", outcome.iterations);
        let report = check_all(&s, &ArbOptions::default());
        assert_eq!(report.calendar_count, 0);
        assert_eq!(report.butterfly_count, 0);
    }

    #[test]
    fn enforcement_is_idempotent_on_clean_surface() {
        let mut s = flat_surface(0.2);
        let before = s.z().to_vec();
        let outcome = enforce_arbitrage_free(&mut s, 10, CALENDAR_TOLERANCE);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(s.z(), &before[..]);
    }
}
