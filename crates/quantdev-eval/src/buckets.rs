//! Monotonicity buckets: rank pairs by signal, split into equal-count
//! buckets, and report mean forward return per bucket in bps.
//!
//! Sorting may run on a stride-sampled subset as a performance tier; the
//! stride is uniform, so bucket means stay unbiased.

use serde::{Deserialize, Serialize};

/// Cross-day aggregate for one bucket, weighted by pair count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketAgg {
    pub count: u64,
    pub sum_ret: f64,
}

impl BucketAgg {
    pub fn add(&mut self, o: &BucketAgg) {
        self.count += o.count;
        self.sum_ret += o.sum_ret;
    }

    /// Mean return in bps; empty buckets report 0.
    pub fn avg_ret_bps(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        1e4 * self.sum_ret / self.count as f64
    }
}

/// Bucket one day's aligned pairs. Returns exactly `num_buckets` entries,
/// lowest-signal bucket first. Days too small to fill every bucket report
/// all-empty buckets.
pub fn day_buckets(
    sigs: &[f64],
    rets: &[f64],
    num_buckets: usize,
    stride: usize,
) -> Vec<BucketAgg> {
    debug_assert_eq!(sigs.len(), rets.len());
    let mut out = vec![BucketAgg::default(); num_buckets];
    if num_buckets == 0 {
        return out;
    }
    let stride = stride.max(1);

    let mut sampled: Vec<(f64, f64)> = sigs
        .iter()
        .zip(rets.iter())
        .step_by(stride)
        .map(|(s, r)| (*s, *r))
        .collect();

    let per_bucket = sampled.len() / num_buckets;
    if per_bucket == 0 {
        return out;
    }

    sampled.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    for (b, chunk) in sampled.chunks_exact(per_bucket).take(num_buckets).enumerate() {
        out[b].count = chunk.len() as u64;
        out[b].sum_ret = chunk.iter().map(|(_, r)| r).sum();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotone_signal_produces_monotone_buckets() {
        // Return is a noisy increasing function of the signal.
        let n = 5_000;
        let sigs: Vec<f64> = (0..n).map(|i| (i as f64 / n as f64) * 2.0 - 1.0).collect();
        let rets: Vec<f64> = sigs
            .iter()
            .enumerate()
            .map(|(i, s)| s * 0.001 + ((i * 31 % 17) as f64 - 8.0) * 1e-5)
            .collect();

        let buckets = day_buckets(&sigs, &rets, 5, 1);
        let means: Vec<f64> = buckets.iter().map(|b| b.avg_ret_bps()).collect();
        for w in means.windows(2) {
            assert!(w[1] > w[0], "non-monotone: {means:?}");
        }
    }

    #[test]
    fn stride_keeps_bucket_counts_uniform() {
        let sigs: Vec<f64> = (0..1_000).map(|i| (i % 997) as f64).collect();
        let rets = vec![0.0; 1_000];
        let buckets = day_buckets(&sigs, &rets, 5, 10);
        // 100 samples -> 20 per bucket.
        assert!(buckets.iter().all(|b| b.count == 20));
    }

    #[test]
    fn tiny_day_reports_empty_buckets() {
        let buckets = day_buckets(&[1.0, 2.0], &[0.0, 0.0], 5, 1);
        assert_eq!(buckets.len(), 5);
        assert!(buckets.iter().all(|b| b.count == 0));
        assert!(buckets.iter().all(|b| b.avg_ret_bps() == 0.0));
    }

    #[test]
    fn aggregation_is_count_weighted() {
        let mut a = BucketAgg {
            count: 10,
            sum_ret: 0.010,
        };
        let b = BucketAgg {
            count: 30,
            sum_ret: -0.006,
        };
        a.add(&b);
        assert_eq!(a.count, 40);
        assert!((a.avg_ret_bps() - 1e4 * 0.004 / 40.0).abs() < 1e-9);
    }
}
