//! Percentile computation over in-memory latency samples.
//!
//! Linear interpolation on the sorted sample vector: for quantile `q` in
//! percent, `h = (n - 1) * q / 100` and the result interpolates between
//! the samples at `floor(h)` and `ceil(h)`. One day of traffic per group
//! fits in memory at the intended scale; if that ever stops holding, a
//! streaming sketch can replace this behind the same aggregation call.

/// Percentile of an ascending-sorted slice. `q` is in percent (50, 95,
/// 99). Returns 0.0 for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let h = (sorted.len() - 1) as f64 * (q / 100.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
