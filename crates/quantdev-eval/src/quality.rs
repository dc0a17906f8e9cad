//! Distributional health of a raw signal series, no horizon involved.
//!
//! A feature can show a flattering IC and still be untradeable: all mass in
//! a handful of outliers, near-constant output, or turnover so high the
//! signal churns every tick. These statistics catch that early.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    pub mean: f64,
    pub std_dev: f64,
    pub skew: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
    /// Fraction of samples beyond 3 standard deviations.
    pub pct_outliers: f64,
    pub autocorr_lag1: f64,
    /// Mean |s_t - s_{t-1}| per bar.
    pub turnover_per_bar: f64,
    pub pct_zero: f64,
    /// R/S-based proxy over the full series; 0.5 is diffusive.
    pub hurst: f64,
    /// Shannon entropy in bits over a fixed 50-bin histogram.
    pub entropy_bits: f64,
}

impl SignalQuality {
    pub fn compute(sig: &[f64]) -> Self {
        let n = sig.len();
        let mut q = Self::default();
        if n == 0 {
            return q;
        }

        q.mean = mean(sig);
        q.std_dev = std_dev(sig, q.mean);
        if q.std_dev == 0.0 {
            // Constant series: everything else is definitionally zero.
            return q;
        }

        let mut outliers = 0usize;
        let mut zeros = 0usize;
        let mut sum_diff = 0.0;
        let mut sum3 = 0.0;
        let mut sum4 = 0.0;
        for (i, &v) in sig.iter().enumerate() {
            let d = (v - q.mean) / q.std_dev;
            if d.abs() > 3.0 {
                outliers += 1;
            }
            if v.abs() < 1e-9 {
                zeros += 1;
            }
            if i > 0 {
                sum_diff += (v - sig[i - 1]).abs();
            }
            sum3 += d * d * d;
            sum4 += d * d * d * d;
        }

        let nf = n as f64;
        q.pct_outliers = outliers as f64 / nf;
        q.pct_zero = zeros as f64 / nf;
        q.turnover_per_bar = sum_diff / nf;
        q.skew = sum3 / nf;
        q.kurtosis = sum4 / nf - 3.0;
        q.autocorr_lag1 = autocorrelation(sig, 1);
        q.hurst = hurst_rs(sig);
        q.entropy_bits = binned_entropy(sig, 50);
        q
    }
}

pub(crate) fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Sample standard deviation; 0 below two samples.
pub(crate) fn std_dev(vals: &[f64], mean: f64) -> f64 {
    if vals.len() < 2 {
        return 0.0;
    }
    let ss: f64 = vals.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (vals.len() - 1) as f64).sqrt()
}

/// Pearson correlation; 0 on any degenerate input.
pub(crate) fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n == 0 || n != y.len() {
        return 0.0;
    }
    let (mx, my) = (mean(x), mean(y));
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    sxy / (sxx * syy).sqrt()
}

pub(crate) fn autocorrelation(x: &[f64], lag: usize) -> f64 {
    let n = x.len();
    if lag == 0 || lag >= n {
        return 0.0;
    }
    correlation(&x[..n - lag], &x[lag..])
}

/// Rescaled-range Hurst proxy over the whole series.
fn hurst_rs(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 10 {
        return 0.5;
    }
    let m = mean(x);
    let mut cum = 0.0;
    let mut max_cum = f64::NEG_INFINITY;
    let mut min_cum = f64::INFINITY;
    let mut ss = 0.0;
    for &v in x {
        let dev = v - m;
        cum += dev;
        max_cum = max_cum.max(cum);
        min_cum = min_cum.min(cum);
        ss += dev * dev;
    }
    let std = (ss / n as f64).sqrt();
    if std == 0.0 {
        return 0.5;
    }
    ((max_cum - min_cum) / std).ln() / (n as f64).ln()
}

/// Shannon entropy over a fixed uniform binning of the value range.
fn binned_entropy(x: &[f64], bins: usize) -> f64 {
    let n = x.len();
    if n == 0 || bins <= 1 {
        return 0.0;
    }
    let (mut lo, mut hi) = (x[0], x[0]);
    for &v in x {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo == hi {
        return 0.0;
    }
    let mut hist = vec![0usize; bins];
    let range = hi - lo;
    for &v in x {
        let idx = (((v - lo) / range) * bins as f64) as usize;
        hist[idx.min(bins - 1)] += 1;
    }
    let mut entropy = 0.0;
    for &c in &hist {
        if c > 0 {
            let p = c as f64 / n as f64;
            entropy -= p * p.log2();
        }
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_series_is_degenerate() {
        let q = SignalQuality::compute(&[2.5; 100]);
        assert_eq!(q.mean, 2.5);
        assert_eq!(q.std_dev, 0.0);
        assert_eq!(q.entropy_bits, 0.0);
    }

    #[test]
    fn uniform_series_has_high_entropy_low_kurtosis() {
        let sig: Vec<f64> = (0..10_000)
            .map(|i| ((i * 761) % 1000) as f64 / 1000.0)
            .collect();
        let q = SignalQuality::compute(&sig);
        assert!(q.entropy_bits > 5.0, "entropy {}", q.entropy_bits);
        assert!(q.kurtosis < 0.0); // platykurtic
        assert!(q.pct_outliers == 0.0);
    }

    #[test]
    fn trending_series_has_high_hurst() {
        let trend: Vec<f64> = (0..1_000).map(|i| i as f64).collect();
        let q = SignalQuality::compute(&trend);
        assert!(q.hurst > 0.85, "hurst {}", q.hurst);
        assert!(q.autocorr_lag1 > 0.99);
    }

    #[test]
    fn zero_fraction_counts_exact_zeros() {
        let sig = [0.0, 1.0, 0.0, -1.0, 0.0, 2.0, 1.0, -2.0];
        let q = SignalQuality::compute(&sig);
        assert!((q.pct_zero - 3.0 / 8.0).abs() < 1e-12);
    }
}
