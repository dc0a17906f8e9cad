//! Fixed-capacity information-time ring with two sliding windows.
//!
//! The information clock advances by `sqrt(qty)` per trade; the signed
//! increment `u = side * sqrt(qty)` is what the windows sum. Window cursors
//! live in absolute counter space and only ever move forward; window sums
//! are maintained incrementally and rebuilt exactly from ring slots every
//! `capacity` pushes to cap floating-point drift.

use crate::stats::{EwVar, EPSILON};

/// Ring configuration.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Slot count. Must exceed the expected slow-window footprint.
    pub capacity: usize,
    /// Fast window length in information time.
    pub l_fast: f64,
    /// Slow window length in information time. `l_fast <= l_slow`.
    pub l_slow: f64,
    /// Decay for the EW variance of each window imbalance.
    pub alpha_var_b: f64,
}

/// One parsed trade as the engine consumes it.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Taker side: +1.0 buy, -1.0 sell.
    pub side: f64,
    pub qty: f64,
    pub price: f64,
    pub ts: i64,
}

/// State of one window immediately after a push.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowSnapshot {
    /// Absolute index of the window's first tick.
    pub start: u64,
    pub count: usize,
    /// Sum of signed info units over the window.
    pub b: f64,
    pub price_first: f64,
    pub price_last: f64,
}

/// Fast and slow snapshots for one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapPair {
    pub fast: WindowSnapshot,
    pub slow: WindowSnapshot,
}

pub struct InfoRing {
    cap: usize,
    l_fast: f64,
    l_slow: f64,

    // SoA slot storage.
    u: Vec<f64>,
    side: Vec<f64>,
    qty: Vec<f64>,
    price: Vec<f64>,
    ts: Vec<i64>,
    info_cum: Vec<f64>,

    /// Ticks pushed so far; the current tick has absolute index `head - 1`.
    head: u64,

    start_fast: u64,
    start_slow: u64,
    accum_bf: f64,
    accum_bs: f64,
    count_fast: usize,
    count_slow: usize,

    ew_var_bf: EwVar,
    ew_var_bs: EwVar,

    // Sign-transition counts over consecutive pairs in the fast window.
    npp: u64,
    npm: u64,
    nmp: u64,
    nmm: u64,

    oversubscribed: bool,
}

impl InfoRing {
    pub fn new(cfg: RingConfig) -> Self {
        assert!(cfg.capacity > 1, "ring capacity must exceed 1");
        assert!(
            cfg.l_fast <= cfg.l_slow,
            "fast window must not exceed slow window"
        );
        Self {
            cap: cfg.capacity,
            l_fast: cfg.l_fast,
            l_slow: cfg.l_slow,
            u: vec![0.0; cfg.capacity],
            side: vec![0.0; cfg.capacity],
            qty: vec![0.0; cfg.capacity],
            price: vec![0.0; cfg.capacity],
            ts: vec![0; cfg.capacity],
            info_cum: vec![0.0; cfg.capacity],
            head: 0,
            start_fast: 0,
            start_slow: 0,
            accum_bf: 0.0,
            accum_bs: 0.0,
            count_fast: 0,
            count_slow: 0,
            ew_var_bf: EwVar::new(cfg.alpha_var_b),
            ew_var_bs: EwVar::new(cfg.alpha_var_b),
            npp: 0,
            npm: 0,
            nmp: 0,
            nmm: 0,
            oversubscribed: false,
        }
    }

    #[inline]
    fn slot(&self, abs: u64) -> usize {
        (abs % self.cap as u64) as usize
    }

    /// Cumulative info time just before tick `abs`.
    #[inline]
    fn cum_before(&self, abs: u64) -> f64 {
        if abs == 0 {
            0.0
        } else {
            self.info_cum[self.slot(abs - 1)]
        }
    }

    /// Push one tick and return both window snapshots.
    pub fn push(&mut self, t: &Tick) -> SnapPair {
        let h = self.head;
        let slot = self.slot(h);

        // Overwriting a slot still inside the slow window means the ring is
        // undersized for this day; keep going with stale boundary data.
        if h >= self.cap as u64 && self.start_slow <= h - self.cap as u64 {
            self.oversubscribed = true;
        }

        let u = t.side * t.qty.sqrt();
        let info_now = self.cum_before(h) + u.abs();

        self.u[slot] = u;
        self.side[slot] = t.side;
        self.qty[slot] = t.qty;
        self.price[slot] = t.price;
        self.ts[slot] = t.ts;
        self.info_cum[slot] = info_now;
        self.head = h + 1;

        self.accum_bf += u;
        self.accum_bs += u;
        self.count_fast += 1;
        self.count_slow += 1;

        // The new tick extends the fast window by one pair.
        if h > 0 {
            let prev_side = self.side[self.slot(h - 1)];
            self.bump_pair(prev_side, t.side, 1);
        }

        // Two-pointer shrink: drop ticks whose inclusive info distance to
        // now exceeds the window length. The current tick always stays.
        while self.start_fast < h
            && info_now - self.cum_before(self.start_fast) > self.l_fast
        {
            let s = self.start_fast;
            self.accum_bf -= self.u[self.slot(s)];
            self.count_fast -= 1;
            let a = self.side[self.slot(s)];
            let b = self.side[self.slot(s + 1)];
            self.bump_pair(a, b, -1);
            self.start_fast += 1;
        }
        while self.start_slow < h
            && info_now - self.cum_before(self.start_slow) > self.l_slow
        {
            let s = self.start_slow;
            self.accum_bs -= self.u[self.slot(s)];
            self.count_slow -= 1;
            self.start_slow += 1;
        }

        // Cap accumulated float drift with an exact periodic rebuild.
        if self.head % self.cap as u64 == 0 {
            self.rebuild();
        }

        let fast = WindowSnapshot {
            start: self.start_fast,
            count: self.count_fast,
            b: self.accum_bf,
            price_first: self.price[self.slot(self.start_fast)],
            price_last: t.price,
        };
        let slow = WindowSnapshot {
            start: self.start_slow,
            count: self.count_slow,
            b: self.accum_bs,
            price_first: self.price[self.slot(self.start_slow)],
            price_last: t.price,
        };

        self.ew_var_bf.update(fast.b);
        self.ew_var_bs.update(slow.b);

        SnapPair { fast, slow }
    }

    fn bump_pair(&mut self, from: f64, to: f64, delta: i64) {
        let counter = match (from > 0.0, to > 0.0) {
            (true, true) => &mut self.npp,
            (true, false) => &mut self.npm,
            (false, true) => &mut self.nmp,
            (false, false) => &mut self.nmm,
        };
        if delta > 0 {
            *counter += 1;
        } else {
            // Saturate rather than panic: an oversubscribed day can desync
            // the counts until the next rebuild.
            *counter = counter.saturating_sub(1);
        }
    }

    /// Recompute window sums and transition counts exactly from live slots.
    fn rebuild(&mut self) {
        let last = self.head - 1;
        self.accum_bf = 0.0;
        self.accum_bs = 0.0;
        self.npp = 0;
        self.npm = 0;
        self.nmp = 0;
        self.nmm = 0;
        for i in self.start_slow..=last {
            self.accum_bs += self.u[self.slot(i)];
        }
        for i in self.start_fast..=last {
            self.accum_bf += self.u[self.slot(i)];
            if i > self.start_fast {
                self.bump_pair(self.side[self.slot(i - 1)], self.side[self.slot(i)], 1);
            }
        }
    }

    /// Directional coherence of the fast window: one minus the conditional
    /// entropy (base 2) of its first-order sign Markov chain, in [0, 1].
    /// Returns 0 with fewer than 3 ticks in the window.
    pub fn coherence(&self) -> f64 {
        if self.count_fast < 3 {
            return 0.0;
        }
        let npp = self.npp as f64;
        let npm = self.npm as f64;
        let nmp = self.nmp as f64;
        let nmm = self.nmm as f64;
        let pairs = (self.count_fast - 1) as f64;

        let p_pp = npp / (npp + npm + EPSILON);
        let p_pm = 1.0 - p_pp;
        let p_mp = nmp / (nmp + nmm + EPSILON);
        let p_mm = 1.0 - p_mp;
        let pi_p = (npp + npm) / (pairs + EPSILON);
        let pi_m = 1.0 - pi_p;

        let mut entropy = 0.0;
        for (pi, p) in [
            (pi_p, p_pp),
            (pi_p, p_pm),
            (pi_m, p_mp),
            (pi_m, p_mm),
        ] {
            if p > 1e-9 {
                entropy -= pi * p * p.log2();
            }
        }
        (1.0 - entropy).clamp(0.0, 1.0)
    }

    pub fn var_bf(&self) -> f64 {
        self.ew_var_bf.var()
    }

    pub fn var_bs(&self) -> f64 {
        self.ew_var_bs.var()
    }

    pub fn start_fast(&self) -> u64 {
        self.start_fast
    }

    pub fn start_slow(&self) -> u64 {
        self.start_slow
    }

    pub fn count_fast(&self) -> usize {
        self.count_fast
    }

    pub fn count_slow(&self) -> usize {
        self.count_slow
    }

    pub fn oversubscribed(&self) -> bool {
        self.oversubscribed
    }

    /// Exact fast-window sum recomputed from slots (test support).
    #[cfg(test)]
    fn exact_bf(&self) -> f64 {
        (self.start_fast..self.head)
            .map(|i| self.u[self.slot(i)])
            .sum()
    }

    /// Brute-force transition counts from a rescan of the fast window
    /// (test support).
    #[cfg(test)]
    fn transitions_rescan(&self) -> (u64, u64, u64, u64) {
        let mut counts = [0u64; 4];
        if self.count_fast >= 2 {
            for i in self.start_fast..self.head - 1 {
                let a = self.side[self.slot(i)] > 0.0;
                let b = self.side[self.slot(i + 1)] > 0.0;
                let idx = match (a, b) {
                    (true, true) => 0,
                    (true, false) => 1,
                    (false, true) => 2,
                    (false, false) => 3,
                };
                counts[idx] += 1;
            }
        }
        (counts[0], counts[1], counts[2], counts[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(l_fast: f64, l_slow: f64, cap: usize) -> InfoRing {
        InfoRing::new(RingConfig {
            capacity: cap,
            l_fast,
            l_slow,
            alpha_var_b: 0.001,
        })
    }

    fn tick(side: f64, qty: f64, price: f64, ts: i64) -> Tick {
        Tick {
            side,
            qty,
            price,
            ts,
        }
    }

    fn pseudo(i: i64) -> u64 {
        (i.wrapping_mul(0x9e37_79b9_7f4a_7c15u64 as i64) as u64) >> 11
    }

    #[test]
    fn single_tick_window() {
        let mut r = ring(2.0, 300.0, 64);
        let snaps = r.push(&tick(1.0, 1.0, 1.0, 1_000_000));
        assert_eq!(snaps.fast.count, 1);
        assert_eq!(snaps.slow.count, 1);
        assert_eq!(snaps.fast.b, 1.0);
        assert_eq!(snaps.fast.price_first, snaps.fast.price_last);
        assert_eq!(r.coherence(), 0.0);
    }

    #[test]
    fn fast_window_shrinks_by_info_length() {
        // Unit quantities: each tick adds exactly 1.0 of info time, so a
        // fast length of 2.0 holds exactly the last two ticks.
        let mut r = ring(2.0, 10.0, 64);
        for i in 0..8 {
            let snaps = r.push(&tick(1.0, 1.0, 100.0 + i as f64, i));
            let expect = (i as usize + 1).min(2);
            assert_eq!(snaps.fast.count, expect, "tick {i}");
        }
        // B_fast of two buys at unit qty is 2.
        assert!((r.accum_bf - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cursors_are_ordered_and_monotone() {
        let mut r = ring(1.5, 12.0, 256);
        let mut last_fast = 0;
        let mut last_slow = 0;
        for i in 0..3_000i64 {
            let h = pseudo(i);
            let side = if h % 3 == 0 { -1.0 } else { 1.0 };
            let qty = 0.05 + (h % 400) as f64 / 100.0;
            r.push(&tick(side, qty, 100.0, i));

            assert!(r.start_fast() >= r.start_slow());
            assert!(r.count_fast() <= r.count_slow());
            assert!(r.start_fast() >= last_fast);
            assert!(r.start_slow() >= last_slow);
            last_fast = r.start_fast();
            last_slow = r.start_slow();
        }
    }

    #[test]
    fn incremental_sum_matches_exact_rebuild() {
        let mut r = ring(3.0, 40.0, 512);
        let mut max_u: f64 = 0.0;
        for i in 0..10_000i64 {
            let h = pseudo(i);
            let side = if h % 2 == 0 { 1.0 } else { -1.0 };
            let qty = 0.01 + (h % 900) as f64 / 300.0;
            max_u = max_u.max(qty.sqrt());
            r.push(&tick(side, qty, 100.0, i));

            let drift = (r.accum_bf - r.exact_bf()).abs();
            let bound = f64::EPSILON * r.count_fast() as f64 * max_u * 8.0;
            assert!(drift <= bound.max(1e-9), "drift {drift} at tick {i}");
        }
    }

    #[test]
    fn transition_counts_match_rescan() {
        let mut r = ring(4.0, 25.0, 512);
        for i in 0..5_000i64 {
            let h = pseudo(i);
            let side = if h % 5 < 2 { -1.0 } else { 1.0 };
            let qty = 0.1 + (h % 300) as f64 / 150.0;
            r.push(&tick(side, qty, 50.0, i));
            assert_eq!(
                (r.npp, r.npm, r.nmp, r.nmm),
                r.transitions_rescan(),
                "tick {i}"
            );
        }
    }

    #[test]
    fn predictable_flow_is_coherent_random_flow_is_not() {
        // One-sided flow and strict alternation are both fully predictable
        // sign chains (zero conditional entropy); a fair coin is not.
        let mut persistent = ring(200.0, 400.0, 512);
        let mut alternating = ring(200.0, 400.0, 512);
        let mut random = ring(200.0, 400.0, 512);
        for i in 0..400i64 {
            persistent.push(&tick(1.0, 1.0, 10.0, i));
            let alt = if i % 2 == 0 { 1.0 } else { -1.0 };
            alternating.push(&tick(alt, 1.0, 10.0, i));
            let coin = if pseudo(i).count_ones() % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            random.push(&tick(coin, 1.0, 10.0, i));
        }
        assert!(persistent.coherence() > 0.9);
        assert!(alternating.coherence() > 0.9);
        assert!(random.coherence() < 0.2, "got {}", random.coherence());
    }

    #[test]
    fn wrap_without_oversubscription() {
        // Slow window footprint (~24 unit ticks) is far below capacity.
        let mut r = ring(2.0, 24.0, 32);
        for i in 0..500i64 {
            r.push(&tick(1.0, 1.0, 10.0, i));
        }
        assert!(!r.oversubscribed());
        assert_eq!(r.count_slow(), 24);
    }

    #[test]
    fn undersized_ring_flags_oversubscription() {
        let mut r = ring(2.0, 1000.0, 16);
        for i in 0..64i64 {
            r.push(&tick(1.0, 1.0, 10.0, i));
        }
        assert!(r.oversubscribed());
    }
}
