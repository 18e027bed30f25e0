//! Lenient arbitrage-opportunity scan, distinct from the strict no-arb
//! checks: these thresholds flag tradeable-looking dislocations rather
//! than hard constraint violations.
//!
//! Calendar: near IV more than 10% above far IV at the same strike.
//! Butterfly: smile convexity negative by more than 0.01.

use core_surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityKind {
    Calendar,
    Butterfly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub expiry_index: usize,
    pub strike_index: usize,
    pub expiry: f64,
    pub strike: f64,
    /// IV-unit edge captured by the structure.
    pub profit: f64,
    /// Heuristic confidence in (0, 1]; grows with the size of the
    /// dislocation past its trigger threshold.
    pub confidence: f64,
}

const CALENDAR_RATIO: f64 = 1.1;
const BUTTERFLY_CONVEXITY: f64 = 0.01;

/// Map threshold excess to confidence: 0.5 at the trigger, saturating at
/// 1.0 as the excess reaches `scale` past it.
fn confidence(excess: f64, scale: f64) -> f64 {
    (0.5 + 0.5 * (excess / scale)).clamp(0.5, 1.0)
}

/// Scan the surface for lenient calendar and butterfly dislocations,
/// sorted by profit descending.
pub fn scan_opportunities(surface: &Surface) -> Vec<Opportunity> {
    let mut out = Vec::new();
    let x = surface.x();
    let y = surface.y();

    // Calendar: consecutive expiries per strike.
    for yi in 0..surface.ny() {
        for xi in 0..surface.nx().saturating_sub(1) {
            let near = surface.at(xi, yi);
            let far = surface.at(xi + 1, yi);
            if far > 0.0 && near > CALENDAR_RATIO * far {
                let profit = near - far;
                out.push(Opportunity {
                    kind: OpportunityKind::Calendar,
                    expiry_index: xi,
                    strike_index: yi,
                    expiry: x[xi],
                    strike: y[yi],
                    profit,
                    confidence: confidence(near / far - CALENDAR_RATIO, 0.4),
                });
            }
        }
    }

    // Butterfly: interior strikes per expiry.
    for xi in 0..surface.nx() {
        for yi in 1..surface.ny().saturating_sub(1) {
            let convexity =
                (surface.at(xi, yi - 1) + surface.at(xi, yi + 1)) / 2.0 - surface.at(xi, yi);
            if convexity < -BUTTERFLY_CONVEXITY {
                let profit = -convexity;
                out.push(Opportunity {
                    kind: OpportunityKind::Butterfly,
                    expiry_index: xi,
                    strike_index: yi,
                    expiry: x[xi],
                    strike: y[yi],
                    profit,
                    confidence: confidence(profit - BUTTERFLY_CONVEXITY, 0.1),
                });
            }
        }
    }

    out.sort_by(|a, b| {
        b.profit
            .partial_cmp(&a.profit)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}
