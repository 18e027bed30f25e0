//! SVI raw parameterization of the implied-volatility smile.
//!
//! Total variance as a function of log-moneyness `k`:
//!
//! ```text
//! w(k; a, b, rho, m, sigma) = a + b * (rho * (k - m) + sqrt((k - m)^2 + sigma^2))
//! ```
//!
//! Calibration minimizes the weighted squared variance error over `(k, iv,
//! weight)` samples with fixed-rate numerical gradient descent under the
//! parameter constraints `rho in (-0.99, 0.99)`, `b >= 0.001`,
//! `sigma >= 0.001`, stopping early when the relative RMSE improvement
//! drops below the tolerance.

use thiserror::Error;
use tracing::debug;

pub const RHO_BOUND: f64 = 0.99;
pub const B_FLOOR: f64 = 0.001;
pub const SIGMA_FLOOR: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SviParams {
    pub a: f64,
    pub b: f64,
    pub rho: f64,
    pub m: f64,
    pub sigma: f64,
}

impl Default for SviParams {
    fn default() -> Self {
        Self {
            a: 0.04,
            b: 0.1,
            rho: 0.0,
            m: 0.0,
            sigma: 0.1,
        }
    }
}

impl SviParams {
    /// Total variance `w(k)`.
    pub fn total_variance(&self, k: f64) -> f64 {
        let d = k - self.m;
        self.a + self.b * (self.rho * d + (d * d + self.sigma * self.sigma).sqrt())
    }

    /// Implied volatility `sqrt(w/T)`; zero when `T <= 0` or `w < 0`.
    pub fn implied_vol(&self, k: f64, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let w = self.total_variance(k);
        if w < 0.0 { 0.0 } else { (w / t).sqrt() }
    }

    /// First derivative `dw/dk` in closed form.
    pub fn dw_dk(&self, k: f64) -> f64 {
        let d = k - self.m;
        let root = (d * d + self.sigma * self.sigma).sqrt();
        self.b * (self.rho + d / root)
    }

    /// Second derivative `d2w/dk2` in closed form.
    pub fn d2w_dk2(&self, k: f64) -> f64 {
        let d = k - self.m;
        let s2 = self.sigma * self.sigma;
        let root = (d * d + s2).sqrt();
        self.b * s2 / (root * root * root)
    }

    /// Project onto the calibration constraint set.
    pub fn clamped(mut self) -> Self {
        self.rho = self.rho.clamp(-RHO_BOUND, RHO_BOUND);
        self.b = self.b.max(B_FLOOR);
        self.sigma = self.sigma.max(SIGMA_FLOOR);
        self
    }

    fn to_array(self) -> [f64; 5] {
        [self.a, self.b, self.rho, self.m, self.sigma]
    }

    fn from_array(p: [f64; 5]) -> Self {
        Self {
            a: p[0],
            b: p[1],
            rho: p[2],
            m: p[3],
            sigma: p[4],
        }
    }
}

/// One observed smile point: log-moneyness, implied vol, and fit weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SviSample {
    pub k: f64,
    pub iv: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationOptions {
    /// Time to expiry of the calibrated slice, years.
    pub t: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Early-stop threshold on relative RMSE improvement per iteration.
    pub tolerance: f64,
    pub initial: SviParams,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            t: 1.0,
            learning_rate: 0.01,
            max_iter: 1000,
            tolerance: 1e-6,
            initial: SviParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub params: SviParams,
    /// Weighted RMSE in total-variance units at the returned parameters.
    pub rmse: f64,
    pub iterations: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no samples supplied")]
    NoSamples,
    #[error("non-positive expiry {0}")]
    BadExpiry(f64),
    #[error("total sample weight is zero")]
    ZeroWeight,
}

/// Weighted RMSE of the variance fit.
fn rmse(params: &SviParams, samples: &[SviSample], t: f64, total_weight: f64) -> f64 {
    let mut acc = 0.0;
    for s in samples {
        let target = s.iv * s.iv * t;
        let err = params.total_variance(s.k) - target;
        acc += s.weight * err * err;
    }
    (acc / total_weight).sqrt()
}

/// Fit SVI parameters to the samples by numerical gradient descent.
pub fn calibrate(
    samples: &[SviSample],
    opts: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    if samples.is_empty() {
        return Err(CalibrationError::NoSamples);
    }
    if opts.t <= 0.0 {
        return Err(CalibrationError::BadExpiry(opts.t));
    }
    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return Err(CalibrationError::ZeroWeight);
    }

    const EPS: f64 = 1e-6;
    let mut params = opts.initial.clamped();
    let mut prev_rmse = rmse(&params, samples, opts.t, total_weight);
    let mut iterations = 0;

    for iter in 1..=opts.max_iter {
        iterations = iter;
        let p = params.to_array();
        let mut grad = [0.0; 5];
        for (i, g) in grad.iter_mut().enumerate() {
            let mut lo = p;
            let mut hi = p;
            lo[i] -= EPS;
            hi[i] += EPS;
            let f_lo = rmse(
                &SviParams::from_array(lo).clamped(),
                samples,
                opts.t,
                total_weight,
            );
            let f_hi = rmse(
                &SviParams::from_array(hi).clamped(),
                samples,
                opts.t,
                total_weight,
            );
            *g = (f_hi - f_lo) / (2.0 * EPS);
        }

        let mut next = p;
        for i in 0..5 {
            next[i] -= opts.learning_rate * grad[i];
        }
        params = SviParams::from_array(next).clamped();

        let cur = rmse(&params, samples, opts.t, total_weight);
        let improvement = if prev_rmse > 0.0 {
            (prev_rmse - cur) / prev_rmse
        } else {
            0.0
        };
        if iter % 100 == 0 {
            debug!(target: "analytics.svi", iter, rmse = cur, "calibration progress");
        }
        prev_rmse = cur;
        // A worsening step also stops: improvement < tolerance covers it.
        if improvement < opts.tolerance {
            break;
        }
    }

    Ok(CalibrationResult {
        params,
        rmse: prev_rmse,
        iterations,
    })
}
