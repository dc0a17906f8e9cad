//! Regime weights and the five feature kernels.
//!
//! Each tick, the two window snapshots plus the fast-window coherence are
//! normalized against slow-adapting EW statistics, composed into [0, 1]
//! regime weights, and folded into five bounded kernels:
//!
//! - K1: coherence-weighted fast trend
//! - K2: tail burst with price confirmation
//! - K3: multi-scale alignment
//! - K4: price/flow breakout
//! - K5: overstretch mean-reversion (hard-capped)

use crate::ring::WindowSnapshot;
use crate::stats::{EwQuantile, EwStat, EwVar, EPSILON};
use serde::{Deserialize, Serialize};

/// Kernel hyperparameters. Variants share one parameter set; only the
/// window configuration differs between them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelParams {
    pub alpha_coh: f64,
    pub alpha_align: f64,
    pub alpha_slow: f64,
    pub alpha_r: f64,
    pub alpha_flow: f64,
    pub alpha_elast: f64,
    pub alpha_flat_slow: f64,
    pub alpha_act_trend: f64,
    pub alpha_act_tail: f64,
    pub v_mid: f64,
    pub z0_mid: f64,
    pub z_hi0: f64,
    pub v_hi: f64,
    pub z_e0: f64,
    pub s1: f64,
    pub s3: f64,
    pub s4: f64,
    pub s5: f64,
    pub beta2: f64,
    pub beta4: f64,
    pub k_max: f64,
    /// Decay for the second-level regime statistics.
    pub alpha_second_level: f64,
    /// Robbins-Monro step for the |Z| quantile trackers.
    pub quantile_step: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            alpha_coh: 0.7,
            alpha_align: 0.3,
            alpha_slow: 0.7,
            alpha_r: 0.7,
            alpha_flow: 0.5,
            alpha_elast: 0.7,
            alpha_flat_slow: 0.7,
            alpha_act_trend: 0.7,
            alpha_act_tail: 1.0,
            v_mid: 1.5,
            z0_mid: 0.75,
            z_hi0: 0.5,
            v_hi: 1.5,
            z_e0: 1.0,
            s1: 3.0,
            s3: 3.0,
            s4: 3.0,
            s5: 2.0,
            beta2: 1.5,
            beta4: 1.0,
            k_max: 0.4,
            alpha_second_level: 0.01,
            quantile_step: 0.005,
        }
    }
}

/// Per-symbol kernel state: second-level EW statistics plus the |Z|
/// quantile pair. Mutated in place each tick.
pub struct KernelState {
    p: KernelParams,
    ew_var_r: EwVar,
    vol_stat: EwStat,
    act_stat: EwStat,
    coh_stat: EwStat,
    elast_stat: EwStat,
    q80: EwQuantile,
    q98: EwQuantile,
}

#[inline]
fn softstep(x: f64, k: f64) -> f64 {
    0.5 + 0.5 * (k * x).tanh()
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl KernelState {
    pub fn new(p: KernelParams) -> Self {
        Self {
            p,
            ew_var_r: EwVar::new(p.alpha_second_level),
            vol_stat: EwStat::new(p.alpha_second_level),
            act_stat: EwStat::new(p.alpha_second_level),
            coh_stat: EwStat::new(p.alpha_second_level),
            elast_stat: EwStat::new(p.alpha_second_level),
            q80: EwQuantile::new(0.80, p.quantile_step),
            q98: EwQuantile::new(0.98, p.quantile_step),
        }
    }

    /// Compute K1..K5 for one tick. `var_bf` / `var_bs` are the ring's EW
    /// variances of the window imbalances, already updated for this tick.
    pub fn update(
        &mut self,
        fast: &WindowSnapshot,
        slow: &WindowSnapshot,
        coherence: f64,
        var_bf: f64,
        var_bs: f64,
    ) -> [f64; 5] {
        let p = self.p;

        let z_fast = fast.b / (var_bf.sqrt() + EPSILON);
        let z_slow = slow.b / (var_bs.sqrt() + EPSILON);

        // Fast-window return, normalized by its own EW volatility.
        let r_fast = if fast.price_first > 0.0 {
            (fast.price_last - fast.price_first) / fast.price_first
        } else {
            0.0
        };
        self.ew_var_r.update(r_fast);
        let sigma = self.ew_var_r.std();
        let r_fast_z = r_fast / (sigma + EPSILON);

        // Regime z-scores.
        let z_vol = self.vol_stat.update_z(sigma.max(EPSILON).ln());
        let z_act = self.act_stat.update_z((fast.count as f64).ln());
        let c_z = self.coh_stat.update_z(coherence);

        // Elasticity is unmeasured while the window price is flat; feed the
        // reference distribution only on real moves.
        let e_mag = (fast.price_last - fast.price_first).abs() / (fast.b.abs() + EPSILON);
        let z_elast = if e_mag > 0.0 {
            self.elast_stat.update_z(e_mag.ln())
        } else {
            0.0
        };

        self.q80.update(z_fast.abs());
        self.q98.update(z_fast.abs());
        let q80 = self.q80.value();
        let q98 = self.q98.value().max(q80 + 0.5);

        // Weight library.
        let w_coherence = softstep(c_z, p.alpha_coh).clamp(0.05, 0.99);
        let mid_excess = (z_vol.abs() - p.z0_mid).max(0.0);
        let w_vol_mid = 1.0 / (1.0 + (mid_excess / p.v_mid).powi(2));
        let hi_excess = (z_vol - p.z_hi0).max(0.0);
        let w_vol_hi = 1.0 - 1.0 / (1.0 + (hi_excess / p.v_hi).powi(2));
        let w_act_trend = (0.3 + 0.7 * softstep(z_act, p.alpha_act_trend)).clamp(0.3, 1.0);
        let w_act_tail = softstep(z_act, p.alpha_act_tail);
        let w_noise = (1.0 - w_coherence).clamp(0.0, 0.95);
        let w_flow = (p.alpha_flow * z_fast.abs()).tanh();

        // K1: coherence-weighted fast trend.
        let k1 = (w_coherence * w_act_trend * w_vol_mid * z_fast / p.s1).clamp(-1.0, 1.0);

        // K2: tail burst, gated on price confirmation.
        let excess = (z_fast.abs() - q80).max(0.0);
        let tail_frac = (excess / (q98 - q80 + EPSILON)).clamp(0.0, 1.0);
        let mut g2 = sign(z_fast) * tail_frac;
        if z_fast * r_fast_z <= 0.0 {
            g2 = 0.0;
        }
        let k2 = (p.beta2 * w_coherence * w_act_tail * g2).tanh();

        // K3: multi-scale alignment.
        let corr_like = (p.alpha_align * z_slow * z_fast).tanh();
        let w_slow_dir = corr_like * (p.alpha_slow * z_slow.abs()).tanh();
        let alignment = (1.0 + w_slow_dir) / 2.0;
        let k3 = (w_coherence * w_vol_mid * alignment * z_fast / p.s3).clamp(-1.0, 1.0);

        // K4: price/flow breakout on the weaker of the two magnitudes.
        let g4 = if z_fast * r_fast_z > 0.0 {
            sign(z_fast) * z_fast.abs().min(r_fast_z.abs())
        } else {
            0.0
        };
        let w_imp = (p.alpha_r * r_fast_z.abs()).tanh() * w_vol_hi * w_act_tail * w_coherence;
        let k4 = (p.beta4 * w_imp * g4 / p.s4).tanh();

        // K5: overstretch mean-reversion, hard-capped.
        let w_over = (p.alpha_elast * (z_elast - p.z_e0).max(0.0)).tanh();
        let w_flat = 1.0 - (p.alpha_flat_slow * z_slow.abs()).tanh();
        let k5 = (w_over * w_flat * w_noise * w_flow * (-z_fast) / p.s5)
            .clamp(-p.k_max, p.k_max);

        [k1, k2, k3, k4, k5]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(b: f64, count: usize, p_first: f64, p_last: f64) -> WindowSnapshot {
        WindowSnapshot {
            start: 0,
            count,
            b,
            price_first: p_first,
            price_last: p_last,
        }
    }

    #[test]
    fn softstep_is_centered_and_bounded() {
        assert!((softstep(0.0, 0.7) - 0.5).abs() < 1e-12);
        assert!(softstep(50.0, 0.7) <= 1.0);
        assert!(softstep(-50.0, 0.7) >= 0.0);
        assert!((softstep(2.0, 0.7) + softstep(-2.0, 0.7) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flat_price_silences_confirmation_kernels() {
        let mut ks = KernelState::new(KernelParams::default());
        let k = ks.update(&snap(1.0, 1, 100.0, 100.0), &snap(1.0, 1, 100.0, 100.0), 0.0, 1.0, 1.0);
        assert!(k.iter().all(|v| v.is_finite()));
        assert_eq!(k[1], 0.0);
        assert_eq!(k[3], 0.0);
    }

    #[test]
    fn outputs_respect_bounds_under_stress() {
        let mut ks = KernelState::new(KernelParams::default());
        for i in 0..20_000u64 {
            let h = i.wrapping_mul(0x2545_f491_4f6c_dd1d);
            let b = ((h % 2001) as f64 - 1000.0) / 10.0;
            let bs = ((h >> 17 & 0x7ff) as f64 - 1024.0) / 5.0;
            let p0 = 100.0 + (h % 97) as f64;
            let p1 = p0 + ((h >> 3) % 41) as f64 - 20.0;
            let c = ((h >> 23) % 100) as f64 / 100.0;
            let k = ks.update(
                &snap(b, 1 + (h % 50) as usize, p0, p1),
                &snap(bs, 60 + (h % 100) as usize, p0 - 1.0, p1),
                c,
                0.5 + (h % 7) as f64,
                0.5 + (h % 11) as f64,
            );
            for (dim, v) in k.iter().enumerate() {
                assert!(v.is_finite(), "dim {dim} not finite");
                assert!((-1.0..=1.0).contains(v), "dim {dim}: {v}");
            }
            assert!(k[4].abs() <= 0.4);
        }
    }

    #[test]
    fn q98_floor_keeps_tail_band_open() {
        let mut ks = KernelState::new(KernelParams::default());
        // A constant |Z| stream collapses both quantile estimates toward the
        // same value; the floor keeps the denominator at least 0.5 wide.
        for _ in 0..5_000 {
            ks.update(&snap(1.0, 5, 100.0, 100.1), &snap(1.0, 50, 100.0, 100.1), 0.5, 1.0, 1.0);
        }
        let q80 = ks.q80.value();
        let q98 = ks.q98.value().max(q80 + 0.5);
        assert!(q98 - q80 >= 0.5 - 1e-12);
    }
}
