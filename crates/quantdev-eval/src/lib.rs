//! # quantdev eval
//!
//! Pure evaluation of a feature series against forward returns: no I/O in
//! the numeric paths, deterministic, and additive over day partitions so
//! that workers can evaluate days independently and a single merge step
//! produces run-level metrics.
//!
//! - [`align`] - two-pointer wall-clock alignment of `(signal, return)`.
//! - [`moments`] - streaming moment accumulation with sign-segment stats.
//! - [`metrics`] - finalization into IC / Sharpe / hit-rate / break-even.
//! - [`quality`] - distributional health of the raw signal.
//! - [`profile`] - per-horizon regression / PnL-stream / decay profile.
//! - [`buckets`] - stride-sampled monotonicity buckets.
//! - [`report`] - serialized per-label metric records.

pub mod align;
pub mod buckets;
pub mod metrics;
pub mod moments;
pub mod profile;
pub mod quality;
pub mod report;

pub use align::align_pairs;
pub use buckets::{day_buckets, BucketAgg};
pub use metrics::{finalize, HorizonMetrics};
pub use moments::{DayAccumulator, Moments};
pub use profile::HorizonProfile;
pub use quality::SignalQuality;
pub use report::{load_report, save_report, HorizonReport, ReportEntry};
