//! Analytics over a volatility surface: SVI smile model, arbitrage
//! detection and repair, slope-derived risk metrics, and term-structure /
//! smile shape analysis.
//!
//! Surface axis convention throughout this crate: `x` is time to expiry in
//! years (`T`), `y` is strike (`K`), `z` is implied volatility. Total
//! variance is `w = iv^2 * T`.
//!
//! Arbitrage violations are data, not errors: the check functions return
//! them through their reports and never fail on "bad" surfaces. NaN cells
//! propagate into the derived values naturally.

pub mod arbitrage;
pub mod opportunity;
pub mod risk;
pub mod structure;
pub mod svi;

pub use arbitrage::{
    ArbCategory, ArbOptions, ArbitrageReport, EnforcementOutcome, Severity, Violation, check_all,
    check_butterfly, check_calendar, check_vertical, enforce_arbitrage_free,
};
pub use opportunity::{Opportunity, OpportunityKind, scan_opportunities};
pub use risk::{GridZone, RiskMetrics, compute_risk_metrics};
pub use structure::{
    SkewDirection, SmileAnalysis, SmileCurve, TermCurve, TermStructureAnalysis, analyze_smile,
    analyze_term_structure, default_indices,
};
pub use svi::{
    CalibrationError, CalibrationOptions, CalibrationResult, SviParams, SviSample, calibrate,
};

/// Total variance at one grid point, `iv^2 * T`.
#[inline]
pub(crate) fn total_variance(iv: f64, t: f64) -> f64 {
    iv * iv * t
}
