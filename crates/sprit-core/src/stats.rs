//! Small numeric helpers shared by the processing stages.
//!
//! All statistics ignore NaN entries, since NaN marks data that was never
//! computed (gap windows) rather than a measurement.

/// Arithmetic mean of the finite values, or NaN if there are none.
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Population standard deviation (ddof = 0) of the non-NaN values.
///
/// Deviations are taken relative to the first value before averaging, so a
/// set of identical values yields exactly `0.0` rather than rounding noise.
pub fn nanstd(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let shift = finite[0];
    let n = finite.len() as f64;
    let mean_shifted = finite.iter().map(|v| v - shift).sum::<f64>() / n;
    let var = finite
        .iter()
        .map(|v| {
            let d = (v - shift) - mean_shifted;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Median of the non-NaN values, or NaN if there are none.
pub fn nanmedian(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in percent (0-100). Matches the default interpolation used by most
/// numerical packages: rank = q/100 * (n - 1).
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Column-wise reduction over equally long rows.
pub fn column_reduce(rows: &[&[f64]], reduce: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let mut column = Vec::with_capacity(rows.len());
    (0..first.len())
        .map(|j| {
            column.clear();
            column.extend(rows.iter().map(|r| r[j]));
            reduce(&column)
        })
        .collect()
}

/// `num` logarithmically spaced points between `start` and `stop` inclusive.
pub fn logspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let (a, b) = (start.log10(), stop.log10());
            let step = (b - a) / (num - 1) as f64;
            (0..num)
                .map(|i| {
                    if i == num - 1 {
                        stop
                    } else {
                        10f64.powf(a + step * i as f64)
                    }
                })
                .collect()
        }
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be increasing. Values outside the range are clamped to the
/// end points.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    let last = xp.len() - 1;
    if x >= xp[last] {
        return fp[last];
    }
    // first index with xp[i] > x
    let hi = xp.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[lo];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (x - xp[lo]) / span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_of_identical_values_is_exactly_zero() {
        let values = vec![0.1 + 0.2; 7];
        assert_eq!(nanstd(&values), 0.0);
    }

    #[test]
    fn std_matches_population_definition() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((nanstd(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nan_entries_are_ignored() {
        let values = [1.0, f64::NAN, 3.0];
        assert_eq!(nanmean(&values), 2.0);
        assert_eq!(nanmedian(&values), 2.0);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert!((percentile(&values, 98.0) - 4.92).abs() < 1e-12);
        assert_eq!(percentile(&values, 100.0), 5.0);
    }

    #[test]
    fn logspace_hits_both_ends() {
        let pts = logspace(0.1, 10.0, 3);
        assert!((pts[0] - 0.1).abs() < 1e-12);
        assert!((pts[1] - 1.0).abs() < 1e-12);
        assert_eq!(pts[2], 10.0);
    }

    #[test]
    fn interp_clamps_and_interpolates() {
        let xp = [1.0, 2.0, 4.0];
        let fp = [10.0, 20.0, 40.0];
        assert_eq!(interp(0.0, &xp, &fp), 10.0);
        assert_eq!(interp(3.0, &xp, &fp), 30.0);
        assert_eq!(interp(9.0, &xp, &fp), 40.0);
    }
}
