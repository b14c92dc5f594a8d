//! Local-maximum detection.

/// Indices of every strict local maximum of `curve`, in order.
///
/// A sample is a peak when it is strictly greater than both neighbours, so
/// the first and last samples are never reported and flat tops are skipped.
/// NaN samples compare false and never form or neighbour a peak.
pub fn find_peaks(curve: &[f64]) -> Vec<usize> {
    if curve.len() < 3 {
        return Vec::new();
    }
    (1..curve.len() - 1)
        .filter(|&i| curve[i] > curve[i - 1] && curve[i] > curve[i + 1])
        .collect()
}

/// Index of the peak in `peaks` closest to `target`; the first one wins ties.
pub fn nearest_peak(peaks: &[usize], target: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for &p in peaks {
        match best {
            Some(b) if p.abs_diff(target) >= b.abs_diff(target) => {}
            _ => best = Some(p),
        }
    }
    best
}
