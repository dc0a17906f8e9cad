//! Forward-return alignment.
//!
//! For each tick `i`, the matching exit is the first tick `j >= i` with
//! `time[j] >= time[i] + horizon_ms`. Both cursors only move forward, so a
//! full day aligns in one O(n) sweep. Pairs with a non-positive entry or
//! exit price are dropped.

/// Stream `(signal, forward_return)` pairs into `emit`.
///
/// `times` must be non-decreasing (file order). The sweep stops once the
/// exit cursor runs off the end of the day.
pub fn align_pairs(
    sig: &[f64],
    prices: &[f64],
    times: &[i64],
    horizon_ms: i64,
    mut emit: impl FnMut(f64, f64),
) {
    let n = sig.len();
    debug_assert_eq!(prices.len(), n);
    debug_assert_eq!(times.len(), n);

    let mut j = 0usize;
    for i in 0..n {
        let target = times[i] + horizon_ms;
        if j < i {
            j = i;
        }
        while j < n && times[j] < target {
            j += 1;
        }
        if j >= n {
            break;
        }
        let entry = prices[i];
        let exit = prices[j];
        if entry > 0.0 && exit > 0.0 {
            emit(sig[i], (exit - entry) / entry);
        }
    }
}
