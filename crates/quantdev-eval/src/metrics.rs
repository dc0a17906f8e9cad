//! Finalization of accumulated moments into reportable metrics.
//!
//! Every formula degrades to 0 (never NaN/inf) on zero variance or an
//! empty divisor; a degenerate day is "no measurement", not an outlier.

use crate::moments::Moments;
use serde::{Deserialize, Serialize};

/// Finalized per-(signal, horizon) metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMetrics {
    /// Pearson IC over all aligned pairs.
    pub ic: f64,
    /// t-stat of the daily IC series.
    pub t_stat: f64,
    /// Per-pair Sharpe of the mark-to-mid pnl stream.
    pub sharpe: f64,
    /// P(sign agreement | both non-zero).
    pub hit_rate: f64,
    /// Gross alpha per unit one-sided turnover, in bps.
    pub break_even_bps: f64,
    pub auto_corr_lag1: f64,
    pub avg_seg_len: f64,
    pub max_seg_len: u64,
    pub pairs: u64,
}

/// Collapse merged moments plus the per-day IC series into final metrics.
pub fn finalize(m: &Moments, daily_ics: &[f64]) -> HorizonMetrics {
    let mut out = HorizonMetrics {
        pairs: m.count,
        max_seg_len: m.seg_len_max,
        ..Default::default()
    };
    if m.count == 0 {
        return out;
    }
    let n = m.count as f64;

    out.ic = m.ic();

    let mean_pnl = m.sum_pnl / n;
    let var_pnl = m.sum_sq_pnl / n - mean_pnl * mean_pnl;
    if var_pnl > 0.0 {
        out.sharpe = mean_pnl / var_pnl.sqrt();
    }

    if m.valid_hits > 0 {
        out.hit_rate = m.hits as f64 / m.valid_hits as f64;
    }

    if m.sum_abs_delta_sig > 0.0 {
        out.break_even_bps = 1e4 * m.sum_pnl / m.sum_abs_delta_sig;
    }

    let mean_sig = m.sum_sig / n;
    let var_sig = m.sum_sq_sig / n - mean_sig * mean_sig;
    if var_sig > 0.0 {
        out.auto_corr_lag1 = (m.sum_prod_lag / n - mean_sig * mean_sig) / var_sig;
    }

    if m.seg_count > 0 {
        out.avg_seg_len = m.seg_len_total as f64 / m.seg_count as f64;
    }

    out.t_stat = daily_ic_tstat(daily_ics);
    out
}

/// `mean(daily ICs) / (stdev / sqrt(days))`; 0 below two days or on a
/// degenerate spread.
pub fn daily_ic_tstat(daily_ics: &[f64]) -> f64 {
    let k = daily_ics.len();
    if k < 2 {
        return 0.0;
    }
    let n = k as f64;
    let mean = daily_ics.iter().sum::<f64>() / n;
    let ss: f64 = daily_ics.iter().map(|v| (v - mean) * (v - mean)).sum();
    let sd = (ss / (n - 1.0)).sqrt();
    if sd > 0.0 {
        mean / (sd / n.sqrt())
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moments::DayAccumulator;

    #[test]
    fn zero_returns_zero_everything() {
        let mut acc = DayAccumulator::new();
        for i in 0..100 {
            acc.push((i % 5) as f64 - 2.0, 0.0);
        }
        let m = finalize(&acc.finish(), &[]);
        assert_eq!(m.ic, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.break_even_bps, 0.0);
        assert_eq!(m.hit_rate, 0.0);
    }

    #[test]
    fn constant_signal_has_zero_breakeven_not_infinity() {
        let mut acc = DayAccumulator::new();
        for i in 0..50 {
            acc.push(1.0, (i % 3) as f64 * 0.001 - 0.001);
        }
        let m = finalize(&acc.finish(), &[]);
        assert_eq!(m.break_even_bps, 0.0);
        assert!(m.break_even_bps.is_finite());
    }

    #[test]
    fn random_signal_ic_is_small() {
        // Independent deterministic streams; IC should sit well inside the
        // 3/sqrt(n) band.
        let mut acc = DayAccumulator::new();
        let n = 50_000u64;
        for i in 0..n {
            let a = i.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            let b = i.wrapping_mul(0xc2b2_ae3d_27d4_eb4f).rotate_left(17);
            let s = (a % 2_001) as f64 / 1_000.0 - 1.0;
            let r = ((b % 2_001) as f64 / 1_000.0 - 1.0) * 1e-4;
            acc.push(s, r);
        }
        let m = finalize(&acc.finish(), &[]);
        assert!(m.ic.abs() < 3.0 / (n as f64).sqrt(), "ic = {}", m.ic);
    }

    #[test]
    fn tstat_tracks_consistency() {
        let strong = daily_ic_tstat(&[0.05, 0.06, 0.055, 0.052, 0.058]);
        let noisy = daily_ic_tstat(&[0.05, -0.06, 0.01, -0.02, 0.02]);
        assert!(strong > 10.0);
        assert!(noisy.abs() < 2.0);
        assert_eq!(daily_ic_tstat(&[0.5]), 0.0);
        assert_eq!(daily_ic_tstat(&[0.5, 0.5]), 0.0); // zero spread
    }

    #[test]
    fn autocorr_of_persistent_signal_is_positive() {
        let mut acc = DayAccumulator::new();
        for i in 0..2_000 {
            // Slow square wave: long same-sign runs.
            let s = if (i / 100) % 2 == 0 { 1.0 } else { -1.0 };
            acc.push(s + (i % 7) as f64 * 0.01, 0.0);
        }
        let m = finalize(&acc.finish(), &[]);
        assert!(m.auto_corr_lag1 > 0.9);
        assert!(m.avg_seg_len > 50.0);
    }
}
