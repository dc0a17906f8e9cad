//! Streaming moments over aligned `(signal, return)` pairs.
//!
//! `Moments` is a pure bag of sums: additive over disjoint partitions, so
//! per-day results merge into IS/OOS aggregates without revisiting pairs.
//! The transient pass state (previous signal, open sign segment) lives in
//! `DayAccumulator` and is folded in when the day finishes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub count: u64,
    pub sum_sig: f64,
    pub sum_ret: f64,
    pub sum_prod: f64,
    pub sum_sq_sig: f64,
    pub sum_sq_ret: f64,
    pub sum_pnl: f64,
    pub sum_sq_pnl: f64,
    /// Pairs where signal and return are both non-zero and agree in sign.
    pub hits: u64,
    /// Pairs where signal and return are both non-zero.
    pub valid_hits: u64,
    /// One-sided turnover: sum of |s_t - s_{t-1}|.
    pub sum_abs_delta_sig: f64,
    pub sum_prod_lag: f64,
    pub sum_abs_sig: f64,
    pub sum_abs_prod_lag: f64,
    /// Closed same-sign signal segments.
    pub seg_count: u64,
    pub seg_len_total: u64,
    pub seg_len_max: u64,
}

impl Moments {
    /// Fold another partition into this one.
    pub fn merge(&mut self, o: &Moments) {
        self.count += o.count;
        self.sum_sig += o.sum_sig;
        self.sum_ret += o.sum_ret;
        self.sum_prod += o.sum_prod;
        self.sum_sq_sig += o.sum_sq_sig;
        self.sum_sq_ret += o.sum_sq_ret;
        self.sum_pnl += o.sum_pnl;
        self.sum_sq_pnl += o.sum_sq_pnl;
        self.hits += o.hits;
        self.valid_hits += o.valid_hits;
        self.sum_abs_delta_sig += o.sum_abs_delta_sig;
        self.sum_prod_lag += o.sum_prod_lag;
        self.sum_abs_sig += o.sum_abs_sig;
        self.sum_abs_prod_lag += o.sum_abs_prod_lag;
        self.seg_count += o.seg_count;
        self.seg_len_total += o.seg_len_total;
        self.seg_len_max = self.seg_len_max.max(o.seg_len_max);
    }

    /// Pearson correlation of signal vs return from the raw sums.
    /// Degenerate variance reports 0, never NaN.
    pub fn ic(&self) -> f64 {
        let n = self.count as f64;
        if self.count == 0 {
            return 0.0;
        }
        let num = n * self.sum_prod - self.sum_sig * self.sum_ret;
        let den_x = n * self.sum_sq_sig - self.sum_sig * self.sum_sig;
        let den_y = n * self.sum_sq_ret - self.sum_ret * self.sum_ret;
        let den = den_x * den_y;
        if den > 0.0 {
            num / den.sqrt()
        } else {
            0.0
        }
    }
}

/// One day's streaming pass over aligned pairs.
#[derive(Debug, Clone, Default)]
pub struct DayAccumulator {
    m: Moments,
    prev_sig: f64,
    has_prev: bool,
    cur_seg_len: u64,
    cur_seg_sign: i8,
}

impl DayAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: f64, r: f64) {
        let m = &mut self.m;
        m.count += 1;
        m.sum_sig += s;
        m.sum_ret += r;
        m.sum_prod += s * r;
        m.sum_sq_sig += s * s;
        m.sum_sq_ret += r * r;
        let pnl = s * r;
        m.sum_pnl += pnl;
        m.sum_sq_pnl += pnl * pnl;
        m.sum_abs_sig += s.abs();

        if s != 0.0 && r != 0.0 {
            m.valid_hits += 1;
            if pnl > 0.0 {
                m.hits += 1;
            }
        }

        if self.has_prev {
            m.sum_abs_delta_sig += (s - self.prev_sig).abs();
            m.sum_prod_lag += s * self.prev_sig;
            m.sum_abs_prod_lag += (s * self.prev_sig).abs();
        }
        self.prev_sig = s;
        self.has_prev = true;

        let sgn: i8 = if s > 0.0 {
            1
        } else if s < 0.0 {
            -1
        } else {
            0
        };
        if sgn == 0 {
            self.close_segment();
        } else if sgn == self.cur_seg_sign {
            self.cur_seg_len += 1;
        } else {
            self.close_segment();
            self.cur_seg_sign = sgn;
            self.cur_seg_len = 1;
        }
    }

    fn close_segment(&mut self) {
        if self.cur_seg_len > 0 {
            self.m.seg_count += 1;
            self.m.seg_len_total += self.cur_seg_len;
            self.m.seg_len_max = self.m.seg_len_max.max(self.cur_seg_len);
        }
        self.cur_seg_len = 0;
        self.cur_seg_sign = 0;
    }

    /// Close the open segment and yield the day's moments.
    pub fn finish(mut self) -> Moments {
        self.close_segment();
        self.m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulate(pairs: &[(f64, f64)]) -> Moments {
        let mut acc = DayAccumulator::new();
        for (s, r) in pairs {
            acc.push(*s, *r);
        }
        acc.finish()
    }

    #[test]
    fn perfectly_correlated_signal_has_unit_ic() {
        let pairs: Vec<(f64, f64)> = (0..100)
            .map(|i| {
                let s = (i as f64 - 50.0) / 10.0;
                (s, s * 0.001)
            })
            .collect();
        let m = accumulate(&pairs);
        assert!((m.ic() - 1.0).abs() < 1e-9);
        assert_eq!(m.hits, m.valid_hits);
    }

    #[test]
    fn constant_signal_reports_zero_ic() {
        let pairs: Vec<(f64, f64)> = (0..50).map(|i| (1.0, (i % 3) as f64 - 1.0)).collect();
        let m = accumulate(&pairs);
        assert_eq!(m.ic(), 0.0);
        assert_eq!(m.sum_abs_delta_sig, 0.0);
    }

    #[test]
    fn segments_close_on_flip_and_zero() {
        //  + + + | - - | 0 | + : three closed segments plus the tail.
        let m = accumulate(&[
            (1.0, 0.0),
            (0.5, 0.0),
            (2.0, 0.0),
            (-1.0, 0.0),
            (-0.1, 0.0),
            (0.0, 0.0),
            (3.0, 0.0),
        ]);
        assert_eq!(m.seg_count, 3);
        assert_eq!(m.seg_len_total, 6);
        assert_eq!(m.seg_len_max, 3);
    }

    #[test]
    fn merge_equals_single_pass() {
        let pairs: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let s = ((i * 37) % 19) as f64 - 9.0;
                let r = ((i * 11) % 7) as f64 / 100.0 - 0.03;
                (s, r)
            })
            .collect();

        let whole = accumulate(&pairs);
        let mut merged = accumulate(&pairs[..90]);
        merged.merge(&accumulate(&pairs[90..]));

        // Sums are exactly additive; only segment counters may differ at
        // the cut (a segment spanning the boundary closes twice).
        assert_eq!(merged.count, whole.count);
        assert!((merged.sum_prod - whole.sum_prod).abs() < 1e-12);
        assert!((merged.sum_pnl - whole.sum_pnl).abs() < 1e-12);
        assert_eq!(merged.hits, whole.hits);
        assert_eq!(merged.seg_len_total, whole.seg_len_total);
    }

    #[test]
    fn hit_accounting_ignores_zero_pairs() {
        let m = accumulate(&[(1.0, 0.01), (1.0, -0.01), (0.0, 0.05), (-1.0, 0.0)]);
        assert_eq!(m.valid_hits, 2);
        assert_eq!(m.hits, 1);
    }
}
