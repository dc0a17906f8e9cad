//! Deep per-horizon profile of a signal against its forward returns.
//!
//! Where [`crate::metrics`] finalizes streaming moments, this module works
//! on the materialized pair vectors of one day and computes the slower
//! diagnostics: rank IC, regression, PnL-stream ratios, drawdown, decay,
//! and a leakage sanity check against shuffled returns.

use crate::quality::{autocorrelation, correlation, mean, std_dev};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonProfile {
    /// Rank (Spearman) IC.
    pub ic_spearman: f64,
    /// Regression intercept, returns space.
    pub alpha: f64,
    /// Regression slope signal -> return.
    pub beta: f64,
    /// t-stat of the regression slope.
    pub t_stat_beta: f64,
    /// Top-minus-bottom decile mean return, bps.
    pub decile_spread_bps: f64,
    /// Fraction of pairs with |ret| above half a bp (a crude fill proxy).
    pub fill_rate_est: f64,

    /// Per-pair Sharpe scaled by sqrt(n).
    pub sharpe_sqrt_n: f64,
    /// Sharpe shrunk by lag-1 autocorrelation of the pnl stream.
    pub hac_sharpe: f64,
    /// P(SR > 0) under the adjusted distribution of the SR estimator.
    pub prob_sharpe: f64,
    pub sortino_sqrt_n: f64,
    /// Total pnl over max drawdown of the cumulative stream.
    pub calmar: f64,

    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win_loss: f64,

    /// Signal decay half-life in bars, from the log-ACF slope.
    pub half_life_bars: f64,
    /// Mean/std of IC over non-overlapping windows.
    pub ic_rolling_mean: f64,
    pub ic_rolling_std: f64,
    /// IC against deterministically shuffled returns; should sit near 0.
    pub shuffled_ic: f64,
}

/// Minimum pairs for a stable profile; below this everything reads 0.
const MIN_PAIRS: usize = 200;
const ROLLING_IC_WINDOW: usize = 2_000;

impl HorizonProfile {
    pub fn compute(sig: &[f64], ret: &[f64]) -> Self {
        let n = sig.len();
        let mut p = Self::default();
        if n < MIN_PAIRS || n != ret.len() {
            return p;
        }
        let nf = n as f64;

        p.ic_spearman = spearman(sig, ret);

        // OLS and its slope t-stat.
        let (alpha, beta) = simple_ols(sig, ret);
        p.alpha = alpha;
        p.beta = beta;
        let mx = mean(sig);
        let mut rss = 0.0;
        let mut sx = 0.0;
        for i in 0..n {
            let resid = ret[i] - (alpha + beta * sig[i]);
            rss += resid * resid;
            let d = sig[i] - mx;
            sx += d * d;
        }
        if sx > 0.0 {
            let std_err = (rss / (nf - 2.0)).sqrt();
            if std_err > 0.0 {
                p.t_stat_beta = beta / (std_err / sx.sqrt());
            }
        }

        p.decile_spread_bps = quantile_spread(sig, ret, 10) * 1e4;

        // PnL stream pass.
        let mut pnl = Vec::with_capacity(n);
        let mut gross_win = 0.0;
        let mut gross_loss = 0.0;
        let mut wins = 0.0;
        let mut losses = 0.0;
        let mut downside_sq = 0.0;
        let mut cum: f64 = 0.0;
        let mut peak: f64 = 0.0;
        let mut max_dd: f64 = 0.0;
        let mut filled = 0usize;
        for i in 0..n {
            if ret[i].abs() > 0.000_05 {
                filled += 1;
            }
            let v = sig[i] * ret[i];
            pnl.push(v);
            if v > 0.0 {
                gross_win += v;
                wins += 1.0;
            } else if v < 0.0 {
                gross_loss += -v;
                losses += 1.0;
                downside_sq += v * v;
            }
            cum += v;
            peak = peak.max(cum);
            max_dd = max_dd.max(peak - cum);
        }
        p.fill_rate_est = filled as f64 / nf;

        let total: f64 = cum;
        if wins + losses > 0.0 {
            p.win_rate = wins / (wins + losses);
        }
        if gross_loss > 0.0 {
            p.profit_factor = gross_win / gross_loss;
            if wins > 0.0 && losses > 0.0 {
                let avg_win = gross_win / wins;
                let avg_loss = gross_loss / losses;
                if avg_loss > 0.0 {
                    p.avg_win_loss = avg_win / avg_loss;
                }
            }
        } else if gross_win > 0.0 {
            p.profit_factor = 100.0;
        }

        let mean_pnl = total / nf;
        let var_pnl = pnl.iter().map(|v| v * v).sum::<f64>() / nf - mean_pnl * mean_pnl;
        if var_pnl > 0.0 {
            let sr = mean_pnl / var_pnl.sqrt();
            p.sharpe_sqrt_n = sr * nf.sqrt();

            let rho = autocorrelation(&pnl, 1);
            let adj = if rho.abs() < 1.0 {
                (1.0 - rho * rho).sqrt()
            } else {
                1.0
            };
            p.hac_sharpe = p.sharpe_sqrt_n * adj;

            if downside_sq > 0.0 {
                let downside_dev = (downside_sq / nf).sqrt();
                p.sortino_sqrt_n = (mean_pnl / downside_dev) * nf.sqrt();
            }

            // Probabilistic SR with skew/kurtosis correction.
            let (skew, kurt) = higher_moments(&pnl);
            let denom = (1.0 - skew * sr + ((kurt - 1.0) / 4.0) * sr * sr).max(0.0);
            if denom > 0.0 {
                let z = sr * (nf - 1.0).sqrt() / denom.sqrt();
                p.prob_sharpe = normal_cdf(z);
            }
        }
        if max_dd > 0.0 {
            p.calmar = total / max_dd;
        }

        p.half_life_bars = half_life_bars(sig);

        let (m_ic, s_ic) = rolling_ic(sig, ret, ROLLING_IC_WINDOW);
        p.ic_rolling_mean = m_ic;
        p.ic_rolling_std = s_ic;

        p.shuffled_ic = shuffled_ic(sig, ret);
        p
    }
}

fn simple_ols(x: &[f64], y: &[f64]) -> (f64, f64) {
    if x.is_empty() || x.len() != y.len() {
        return (0.0, 0.0);
    }
    let (mx, my) = (mean(x), mean(y));
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..x.len() {
        let dx = x[i] - mx;
        num += dx * (y[i] - my);
        den += dx * dx;
    }
    if den == 0.0 {
        return (0.0, 0.0);
    }
    let beta = num / den;
    (my - beta * mx, beta)
}

fn ranks(v: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..v.len()).collect();
    order.sort_by(|&a, &b| v[a].partial_cmp(&v[b]).unwrap_or(std::cmp::Ordering::Equal));
    let mut out = vec![0.0; v.len()];
    for (rank, &idx) in order.iter().enumerate() {
        out[idx] = (rank + 1) as f64;
    }
    out
}

fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.is_empty() || x.len() != y.len() {
        return 0.0;
    }
    correlation(&ranks(x), &ranks(y))
}

/// Mean return of the top bucket minus the bottom bucket when pairs are
/// ranked by signal.
fn quantile_spread(sig: &[f64], ret: &[f64], buckets: usize) -> f64 {
    let n = sig.len();
    if n == 0 || buckets <= 1 {
        return 0.0;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        sig[a]
            .partial_cmp(&sig[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let sz = n / buckets;
    if sz == 0 {
        return 0.0;
    }
    let bottom: f64 = order[..sz].iter().map(|&i| ret[i]).sum();
    let top: f64 = order[n - sz..].iter().map(|&i| ret[i]).sum();
    (top - bottom) / sz as f64
}

fn higher_moments(x: &[f64]) -> (f64, f64) {
    let n = x.len();
    if n < 3 {
        return (0.0, 0.0);
    }
    let m = mean(x);
    let s = std_dev(x, m);
    if s == 0.0 {
        return (0.0, 0.0);
    }
    let mut sum3 = 0.0;
    let mut sum4 = 0.0;
    for &v in x {
        let d = (v - m) / s;
        sum3 += d * d * d;
        sum4 += d * d * d * d;
    }
    (sum3 / n as f64, sum4 / n as f64 - 3.0)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz-Stegun 7.1.26 rational approximation, |err| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Half-life in bars from the slope of log-ACF against lag 1..=5.
fn half_life_bars(sig: &[f64]) -> f64 {
    if sig.len() < 8 {
        return 0.0;
    }
    let lags: Vec<f64> = (1..=5).map(|l| l as f64).collect();
    let log_ac: Vec<f64> = (1..=5)
        .map(|l| autocorrelation(sig, l).max(0.0001).ln())
        .collect();
    let (_, slope) = simple_ols(&lags, &log_ac);
    if slope < 0.0 {
        -std::f64::consts::LN_2 / slope
    } else {
        0.0
    }
}

/// Mean and sample std of IC over non-overlapping windows.
fn rolling_ic(sig: &[f64], ret: &[f64], window: usize) -> (f64, f64) {
    let n = sig.len();
    if window == 0 || n < window * 2 {
        return (0.0, 0.0);
    }
    let mut ics = Vec::new();
    let mut i = 0;
    while i + window <= n {
        ics.push(correlation(&sig[i..i + window], &ret[i..i + window]));
        i += window;
    }
    if ics.len() < 2 {
        return (0.0, 0.0);
    }
    let m = mean(&ics);
    (m, std_dev(&ics, m))
}

/// IC of the signal against a deterministically shuffled copy of the
/// returns. A materially non-zero value means the alignment leaks.
fn shuffled_ic(sig: &[f64], ret: &[f64]) -> f64 {
    let n = ret.len();
    let mut shuffled = ret.to_vec();
    // Fisher-Yates driven by a splitmix64 stream seeded from the length,
    // so reruns are bit-identical.
    let mut state = n as u64 * 7919 + 1_234_567;
    let mut next = move || {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    };
    for i in (1..n).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        shuffled.swap(i, j);
    }
    correlation(sig, &shuffled)
}
