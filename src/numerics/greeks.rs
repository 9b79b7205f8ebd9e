// Black-Scholes Greeks and implied-volatility solver.
//
// European, continuous-dividend-free Black-Scholes. Theta is reported
// per calendar day (annual theta / 365); vega is reported per one
// volatility point (annual vega / 100) — both to match how option
// desks actually read a Greeks ticket, not the textbook annualized form.

use crate::error::EngineError;
use crate::symbol::Right;

const FRAC_1_SQRT_2PI: f64 = 0.39894228040143267793994605993439;

fn norm_pdf(x: f64) -> f64 {
    FRAC_1_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Abramowitz-Stegun rational approximation to the standard normal CDF.
fn norm_cdf(x: f64) -> f64 {
    if x >= 0.0 {
        let t = 1.0 / (1.0 + 0.2316419 * x);
        let poly = t
            * (0.319381530
                + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
        1.0 - norm_pdf(x) * poly
    } else {
        1.0 - norm_cdf(-x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day (annual theta / 365).
    pub theta: f64,
    /// Per one volatility point (annual vega / 100).
    pub vega: f64,
}

/// Price and Greeks for a European option. `t` is year-fraction time to
/// expiry, `r` the continuously-compounded risk-free rate (default 0.05),
/// `sigma` the annualized volatility.
pub fn greeks(s: f64, k: f64, t: f64, r: f64, sigma: f64, right: Right) -> Greeks {
    if t <= 0.0 || sigma <= 0.0 {
        let intrinsic = match right {
            Right::Call => (s - k).max(0.0),
            Right::Put => (k - s).max(0.0),
        };
        let delta = match right {
            Right::Call => if s > k { 1.0 } else { 0.0 },
            Right::Put => if s < k { -1.0 } else { 0.0 },
        };
        return Greeks { price: intrinsic, delta, gamma: 0.0, theta: 0.0, vega: 0.0 };
    }

    let sqrt_t = t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;
    let e_rt = (-r * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let annual_vega = s * sqrt_t * pdf_d1;
    let gamma = pdf_d1 / (s * sigma * sqrt_t);

    match right {
        Right::Call => {
            let nd1 = norm_cdf(d1);
            let nd2 = norm_cdf(d2);
            let price = s * nd1 - k * e_rt * nd2;
            let annual_theta = -(s * pdf_d1 * sigma) / (2.0 * sqrt_t) - r * k * e_rt * nd2;
            Greeks {
                price,
                delta: nd1,
                gamma,
                theta: annual_theta / 365.0,
                vega: annual_vega / 100.0,
            }
        }
        Right::Put => {
            let nd1_neg = norm_cdf(-d1);
            let nd2_neg = norm_cdf(-d2);
            let price = k * e_rt * nd2_neg - s * nd1_neg;
            let annual_theta = -(s * pdf_d1 * sigma) / (2.0 * sqrt_t) + r * k * e_rt * nd2_neg;
            Greeks {
                price,
                delta: -nd1_neg,
                gamma,
                theta: annual_theta / 365.0,
                vega: annual_vega / 100.0,
            }
        }
    }
}

pub fn price(s: f64, k: f64, t: f64, r: f64, sigma: f64, right: Right) -> f64 {
    greeks(s, k, t, r, sigma, right).price
}

fn intrinsic_value(s: f64, k: f64, right: Right) -> f64 {
    match right {
        Right::Call => (s - k).max(0.0),
        Right::Put => (k - s).max(0.0),
    }
}

const IV_SEED: f64 = 0.5;
const IV_LOWER: f64 = 1e-4;
const IV_UPPER: f64 = 5.0;
const IV_TOLERANCE: f64 = 1e-6;
const IV_MAX_ITERATIONS: usize = 50;

/// Solve for implied volatility by Newton-Raphson seeded at 0.5, falling
/// back to bisection on `[1e-4, 5.0]` when Newton's vega term vanishes or
/// fails to converge within the iteration budget. Fails with
/// `IVNotConverged` when the bracket cannot straddle the target price
/// because the quote is inconsistent with intrinsic value (e.g. ask below
/// intrinsic).
pub fn implied_volatility(
    symbol: &str,
    target_price: f64,
    s: f64,
    k: f64,
    t: f64,
    r: f64,
    right: Right,
) -> Result<f64, EngineError> {
    if target_price < intrinsic_value(s, k, right) {
        return Err(EngineError::IVNotConverged { symbol: symbol.to_string() });
    }

    let mut sigma = IV_SEED;
    for _ in 0..IV_MAX_ITERATIONS {
        let g = greeks(s, k, t, r, sigma, right);
        let diff = g.price - target_price;
        if diff.abs() <= IV_TOLERANCE {
            return Ok(sigma);
        }
        let annual_vega = g.vega * 100.0;
        if annual_vega.abs() < 1e-10 {
            break;
        }
        let next = sigma - diff / annual_vega;
        if !next.is_finite() || next <= IV_LOWER || next >= IV_UPPER {
            break;
        }
        sigma = next;
    }

    log::debug!("IV Newton-Raphson fell back to bisection for {symbol}");
    bisect_iv(symbol, target_price, s, k, t, r, right)
}

fn bisect_iv(
    symbol: &str,
    target_price: f64,
    s: f64,
    k: f64,
    t: f64,
    r: f64,
    right: Right,
) -> Result<f64, EngineError> {
    let mut lo = IV_LOWER;
    let mut hi = IV_UPPER;
    let f_lo = price(s, k, t, r, lo, right) - target_price;
    let f_hi = price(s, k, t, r, hi, right) - target_price;
    if f_lo.signum() == f_hi.signum() {
        return Err(EngineError::IVNotConverged { symbol: symbol.to_string() });
    }

    for _ in 0..IV_MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = price(s, k, t, r, mid, right) - target_price;
        if f_mid.abs() <= IV_TOLERANCE {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}
