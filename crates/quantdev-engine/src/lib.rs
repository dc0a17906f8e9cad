//! # quantdev engine
//!
//! Stateful, single-pass feature computation over one day of ticks.
//!
//! The engine reparameterizes time: each trade advances an information clock
//! by `sqrt(qty)`, so windows are sized in economic activity rather than
//! wall-clock. Two sliding windows (fast, slow) feed a kernel state that
//! composes five nonlinear outputs per tick. Every update is O(1).
//!
//! Components:
//! - [`stats`] - exponential-weighted mean/variance, Robbins-Monro quantile,
//!   variance-only track. No rolling-window primitives; everything decays.
//! - [`ring`] - fixed-capacity information-time ring with two monotone
//!   window cursors and incremental window sums.
//! - [`kernel`] - regime weights and the K1..K5 feature kernels.
//! - [`build`] - per-day feature file writer (20 bytes per tick).

pub mod build;
pub mod kernel;
pub mod ring;
pub mod stats;

use serde::{Deserialize, Serialize};

pub use kernel::{KernelParams, KernelState};
pub use ring::{InfoRing, RingConfig, SnapPair, Tick, WindowSnapshot};

/// One feature-set variant: a configuration tuple over the shared engine,
/// not a distinct type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    pub id: String,
    pub ring_capacity: usize,
    pub l_fast: f64,
    pub l_slow: f64,
}

/// Per-symbol streaming engine: ring and kernel state held as peers.
pub struct FeatureEngine {
    ring: InfoRing,
    kernel: KernelState,
}

impl FeatureEngine {
    pub fn new(ring_cfg: RingConfig, params: KernelParams) -> Self {
        Self {
            ring: InfoRing::new(ring_cfg),
            kernel: KernelState::new(params),
        }
    }

    /// Feed one tick and produce the five-kernel feature vector.
    /// Deterministic in the input sequence.
    pub fn update(&mut self, tick: &Tick) -> [f64; 5] {
        let snaps = self.ring.push(tick);
        if snaps.fast.count == 0 || snaps.slow.count == 0 {
            return [0.0; 5];
        }
        let coherence = self.ring.coherence();
        self.kernel.update(
            &snaps.fast,
            &snaps.slow,
            coherence,
            self.ring.var_bf(),
            self.ring.var_bs(),
        )
    }

    /// Whether the ring overwrote a live slow-window slot this day.
    pub fn oversubscribed(&self) -> bool {
        self.ring.oversubscribed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FeatureEngine {
        FeatureEngine::new(
            RingConfig {
                capacity: 1024,
                l_fast: 2.0,
                l_slow: 300.0,
                alpha_var_b: 0.001,
            },
            KernelParams::default(),
        )
    }

    fn tick(side: f64, qty: f64, price: f64, ts: i64) -> Tick {
        Tick {
            side,
            qty,
            price,
            ts,
        }
    }

    #[test]
    fn single_tick_is_finite_and_quiet() {
        let mut e = engine();
        let k = e.update(&tick(1.0, 1.0, 1.0, 1_000_000));
        assert!(k.iter().all(|v| v.is_finite()));
        // No price move yet: the price-confirmation kernels stay flat.
        assert_eq!(k[1], 0.0);
        assert_eq!(k[3], 0.0);
    }

    #[test]
    fn two_tick_trend_fires_breakout() {
        let mut e = engine();
        e.update(&tick(1.0, 1.0, 100.0, 0));
        let k = e.update(&tick(1.0, 1.0, 101.0, 1));
        // Flow and price agree: K4 positive, K5 silent.
        assert!(k[3] > 0.0, "K4 = {}", k[3]);
        assert_eq!(k[4], 0.0);
    }

    #[test]
    fn kernels_stay_bounded() {
        let mut e = engine();
        let mut price = 2000.0;
        for i in 0..5_000i64 {
            // Deterministic pseudo-random walk with bursts.
            let h = (i.wrapping_mul(2654435761) >> 7) as u64;
            let side = if h % 2 == 0 { 1.0 } else { -1.0 };
            let qty = 0.01 + (h % 997) as f64 / 100.0;
            price += side * ((h % 13) as f64) * 0.01;
            let k = e.update(&tick(side, qty, price, i * 37));
            for (dim, v) in k.iter().enumerate() {
                assert!(v.is_finite());
                assert!(
                    (-1.0..=1.0).contains(v),
                    "dim {dim} out of range: {v} at tick {i}"
                );
            }
            assert!(k[4].abs() <= 0.4 + 1e-12, "K5 over cap: {}", k[4]);
        }
    }

    #[test]
    fn side_negation_flips_odd_kernels() {
        let ticks: Vec<Tick> = (0..2_000i64)
            .map(|i| {
                let h = (i.wrapping_mul(0x9e3779b9) >> 5) as u64;
                tick(
                    if h % 3 == 0 { -1.0 } else { 1.0 },
                    0.05 + (h % 101) as f64 / 50.0,
                    1500.0 + ((h % 701) as f64 - 350.0) * 0.01,
                    i * 41,
                )
            })
            .collect();

        let mut a = engine();
        let mut b = engine();
        for t in &ticks {
            let ka = a.update(t);
            let mirrored = Tick {
                side: -t.side,
                ..*t
            };
            let kb = b.update(&mirrored);

            // K1, K3, K5 negate exactly; K2/K4 either negate or gate to zero.
            assert!((ka[0] + kb[0]).abs() < 1e-9);
            assert!((ka[2] + kb[2]).abs() < 1e-9);
            assert!((ka[4] + kb[4]).abs() < 1e-9);
            for dim in [1usize, 3] {
                let negated = (ka[dim] + kb[dim]).abs() < 1e-9;
                let gated = ka[dim] == 0.0 || kb[dim] == 0.0;
                assert!(negated || gated, "dim {dim}: {} vs {}", ka[dim], kb[dim]);
            }
        }
    }
}
