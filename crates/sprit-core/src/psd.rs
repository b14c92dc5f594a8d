//! Per-component PSD estimation and window-table construction.
//!
//! The estimator is a boundary: anything implementing [`PsdEstimator`] can
//! supply the time-indexed PSD matrices. [`WelchEstimator`] is the built-in
//! one, an overlapped-segment estimator binned on a log-period axis in the
//! manner of a probabilistic PSD. [`aggregate`] reconciles the three matrices
//! into a [`WindowTable`].

use crate::error::{HvsrError, Result};
use crate::response::InstrumentResponse;
use crate::signal::{Component, SeismicRecord, ThreeComponent};
use crate::table::{FrequencyAxis, WindowRow, WindowTable};
use crate::window::ExclusionSet;
use rustfft::{FftPlanner, num_complex::Complex64};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Smallest linear power kept before conversion to dB.
const POWER_FLOOR: f64 = 1e-300;

/// PSD estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsdParams {
    /// Analysis window length in seconds.
    pub window_length: f64,
    /// Fractional overlap of consecutive analysis windows, in `[0, 1)`.
    pub overlap: f64,
    /// Step between period bins, in octaves.
    pub period_step_octaves: f64,
    /// Width of each period bin, in octaves.
    pub period_smoothing_width_octaves: f64,
    /// `[shortest, longest]` bin-center periods in seconds. Defaults to the
    /// Nyquist period and the longest resolvable period.
    pub period_limits: Option<[f64; 2]>,
    /// Skip windows that contain gap samples.
    pub skip_on_gaps: bool,
}

impl Default for PsdParams {
    fn default() -> Self {
        Self {
            window_length: 60.0,
            overlap: 0.5,
            period_step_octaves: 0.03125,
            period_smoothing_width_octaves: 1.0,
            period_limits: None,
            skip_on_gaps: true,
        }
    }
}

impl PsdParams {
    /// Check every parameter, failing on the first problem.
    pub fn validate(&self) -> Result<()> {
        if !(self.window_length > 0.0) {
            return Err(HvsrError::invalid(
                "psd.window_length",
                format!("must be positive, got {}", self.window_length),
            ));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(HvsrError::invalid(
                "psd.overlap",
                format!("must be in [0, 1), got {}", self.overlap),
            ));
        }
        if !(self.period_step_octaves > 0.0) {
            return Err(HvsrError::invalid(
                "psd.period_step_octaves",
                format!("must be positive, got {}", self.period_step_octaves),
            ));
        }
        if !(self.period_smoothing_width_octaves > 0.0) {
            return Err(HvsrError::invalid(
                "psd.period_smoothing_width_octaves",
                format!("must be positive, got {}", self.period_smoothing_width_octaves),
            ));
        }
        if let Some([lo, hi]) = self.period_limits {
            if !(lo > 0.0 && hi > lo) {
                return Err(HvsrError::invalid(
                    "psd.period_limits",
                    format!("need 0 < shortest < longest, got [{lo}, {hi}]"),
                ));
            }
        }
        Ok(())
    }

    /// Seconds between consecutive analysis-window starts.
    pub fn window_step(&self) -> f64 {
        self.window_length * (1.0 - self.overlap)
    }
}

/// Time-indexed PSDs of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdMatrix {
    /// Bin-center periods in seconds, increasing.
    pub period_bin_centers: Vec<f64>,
    /// `(left, right)` period edges of each bin.
    pub period_bin_edges: Vec<(f64, f64)>,
    /// Start offset in seconds of each analysis window.
    pub window_starts: Vec<f64>,
    /// PSD in dB re 1 (m/s²)²/Hz per window, aligned to `period_bin_centers`.
    /// `None` marks a window skipped because of gaps.
    pub psd_values: Vec<Option<Vec<f64>>>,
}

impl PsdMatrix {
    /// Number of analysis windows, skipped ones included.
    pub fn num_windows(&self) -> usize {
        self.window_starts.len()
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.period_bin_centers.len()
    }
}

/// Source of per-component PSD matrices.
pub trait PsdEstimator {
    /// Estimate the PSD matrix of one component.
    fn estimate(
        &self,
        samples: &[f64],
        sample_rate: f64,
        response: &InstrumentResponse,
        params: &PsdParams,
    ) -> Result<PsdMatrix>;
}

/// Log-period binning in the manner of a probabilistic PSD.
///
/// Returns `(centers, edges)`. The first center sits on the shortest period
/// limit; bins step by `step_octaves` until the longest limit is reached.
pub fn period_bins(
    limits: [f64; 2],
    step_octaves: f64,
    width_octaves: f64,
) -> (Vec<f64>, Vec<(f64, f64)>) {
    let step = 2f64.powf(step_octaves);
    let width = 2f64.powf(width_octaves);
    let mut left = limits[0] / 2f64.powf(0.5 * width_octaves);
    let mut centers = Vec::new();
    let mut edges = Vec::new();
    loop {
        let right = left * width;
        let center = (left * right).sqrt();
        centers.push(center);
        edges.push((left, right));
        if center >= limits[1] {
            break;
        }
        left *= step;
    }
    (centers, edges)
}

/// Overlapped-segment (Welch) PSD estimator.
///
/// Each analysis window is split into segments of the largest power of two
/// not exceeding a quarter of the window, overlapping by 75%. Segments are
/// linearly detrended and cosine tapered (10% total), their one-sided
/// periodograms averaged, the instrument response removed to acceleration,
/// and the result averaged over period bins and converted to dB.
#[derive(Debug, Clone, Copy, Default)]
pub struct WelchEstimator;

/// Largest power of two not above `n`.
pub fn prev_power_of_two(n: usize) -> usize {
    if n == 0 { 0 } else { 1 << (usize::BITS - 1 - n.leading_zeros()) }
}

/// Tukey (cosine-tapered) window tapering `fraction` of the samples in total.
pub fn cosine_taper(len: usize, fraction: f64) -> Vec<f64> {
    let m = fraction * (len.saturating_sub(1)) as f64 / 2.0;
    (0..len)
        .map(|i| {
            let i = i as f64;
            let from_edge = i.min((len - 1) as f64 - i);
            if m > 0.0 && from_edge < m {
                0.5 * (1.0 - (PI * from_edge / m).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Remove the least-squares line from `data` in place.
pub fn detrend_linear(data: &mut [f64]) {
    let n = data.len();
    if n < 2 {
        if let Some(v) = data.first_mut() {
            *v = 0.0;
        }
        return;
    }
    let xm = (n - 1) as f64 / 2.0;
    let ym = data.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in data.iter().enumerate() {
        let dx = i as f64 - xm;
        sxy += dx * (y - ym);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    for (i, y) in data.iter_mut().enumerate() {
        *y -= ym + slope * (i as f64 - xm);
    }
}

struct Periodogram {
    fft: Arc<dyn rustfft::Fft<f64>>,
    taper: Vec<f64>,
    scale: f64,
    nfft: usize,
}

impl Periodogram {
    fn new(nfft: usize, sample_rate: f64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(nfft);
        let taper = cosine_taper(nfft, 0.1);
        let power: f64 = taper.iter().map(|w| w * w).sum();
        Self {
            fft,
            taper,
            scale: 1.0 / (sample_rate * power),
            nfft,
        }
    }

    /// Averaged one-sided PSD of `window` for bins `1..=nfft/2`.
    fn averaged(&self, window: &[f64]) -> Vec<f64> {
        let nfft = self.nfft;
        let step = nfft - 3 * nfft / 4;
        let half = nfft / 2;
        let mut acc = vec![0.0; half];
        let mut segments = 0usize;
        let mut buffer = vec![Complex64::new(0.0, 0.0); nfft];
        let mut seg = vec![0.0; nfft];

        let mut start = 0;
        while start + nfft <= window.len() {
            seg.copy_from_slice(&window[start..start + nfft]);
            detrend_linear(&mut seg);
            for ((b, s), w) in buffer.iter_mut().zip(&seg).zip(&self.taper) {
                *b = Complex64::new(s * w, 0.0);
            }
            self.fft.process(&mut buffer);
            for (k, a) in acc.iter_mut().enumerate() {
                let bin = k + 1;
                let one_sided = if bin == half && nfft % 2 == 0 { 1.0 } else { 2.0 };
                *a += buffer[bin].norm_sqr() * self.scale * one_sided;
            }
            segments += 1;
            start += step;
        }
        if segments > 0 {
            acc.iter_mut().for_each(|a| *a /= segments as f64);
        }
        acc
    }
}

impl PsdEstimator for WelchEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        sample_rate: f64,
        response: &InstrumentResponse,
        params: &PsdParams,
    ) -> Result<PsdMatrix> {
        params.validate()?;
        response.validate()?;

        let window_samples = (params.window_length * sample_rate).round() as usize;
        let step_samples = ((params.window_step() * sample_rate).round() as usize).max(1);
        let nfft = prev_power_of_two(window_samples / 4);
        if nfft < 16 {
            return Err(HvsrError::InsufficientData(format!(
                "a {} s window at {sample_rate} Hz is too short for spectral estimation",
                params.window_length
            )));
        }

        let freqs: Vec<f64> = (1..=nfft / 2)
            .map(|k| k as f64 * sample_rate / nfft as f64)
            .collect();
        let spectrum_periods: Vec<f64> = freqs.iter().map(|f| 1.0 / f).collect();
        let response_power: Vec<f64> = freqs
            .iter()
            .map(|&f| {
                let p = response.acceleration_power(f);
                if p.is_finite() && p > 0.0 { p } else { POWER_FLOOR }
            })
            .collect();

        let limits = params
            .period_limits
            .unwrap_or([2.0 / sample_rate, nfft as f64 / sample_rate]);
        let (centers, edges) = period_bins(
            limits,
            params.period_step_octaves,
            params.period_smoothing_width_octaves,
        );

        // spectrum indices falling in each bin, or the nearest one for empty bins
        let members: Vec<Vec<usize>> = edges
            .iter()
            .zip(&centers)
            .map(|(&(left, right), &center)| {
                let inside: Vec<usize> = spectrum_periods
                    .iter()
                    .enumerate()
                    .filter(|&(_, &p)| p >= left && p <= right)
                    .map(|(i, _)| i)
                    .collect();
                if inside.is_empty() {
                    let nearest = spectrum_periods
                        .iter()
                        .enumerate()
                        .min_by(|a, b| (a.1 - center).abs().total_cmp(&(b.1 - center).abs()))
                        .map_or(0, |(i, _)| i);
                    vec![nearest]
                } else {
                    inside
                }
            })
            .collect();

        let periodogram = Periodogram::new(nfft, sample_rate);
        let mut window_starts = Vec::new();
        let mut psd_values = Vec::new();
        let mut start = 0usize;
        let mut buffer = vec![0.0; window_samples];
        while window_samples > 0 && start + window_samples <= samples.len() {
            let slice = &samples[start..start + window_samples];
            window_starts.push(start as f64 / sample_rate);
            let has_gap = slice.iter().any(|v| v.is_nan());
            if has_gap && params.skip_on_gaps {
                psd_values.push(None);
            } else {
                for (b, &v) in buffer.iter_mut().zip(slice) {
                    *b = if v.is_nan() { 0.0 } else { v };
                }
                let raw = periodogram.averaged(&buffer);
                let accel: Vec<f64> = raw
                    .iter()
                    .zip(&response_power)
                    .map(|(p, r)| p / r)
                    .collect();
                let binned = members
                    .iter()
                    .map(|idx| {
                        let mean = idx.iter().map(|&i| accel[i]).sum::<f64>() / idx.len() as f64;
                        10.0 * mean.max(POWER_FLOOR).log10()
                    })
                    .collect();
                psd_values.push(Some(binned));
            }
            start += step_samples;
        }

        Ok(PsdMatrix {
            period_bin_centers: centers,
            period_bin_edges: edges,
            window_starts,
            psd_values,
        })
    }
}

/// Reconcile three PSD matrices into a [`WindowTable`].
///
/// Bin counts must match exactly. Window counts may differ slightly; the
/// longer matrices are trimmed to the shortest with a warning when the
/// difference exceeds 5%. Windows skipped for gaps, or overlapping an
/// exclusion window, start with `use = false`.
pub fn table_from_matrices(
    record_start: f64,
    window_length: f64,
    matrices: ThreeComponent<PsdMatrix>,
    exclusions: &ExclusionSet,
) -> Result<WindowTable> {
    let expected = matrices.z.num_bins();
    for (c, m) in matrices.iter() {
        if m.num_bins() != expected {
            return Err(HvsrError::AxisMismatch {
                component: c,
                expected,
                found: m.num_bins(),
            });
        }
        if m.psd_values.len() != m.window_starts.len() {
            return Err(HvsrError::InsufficientData(format!(
                "{c} PSD matrix has {} rows for {} windows",
                m.psd_values.len(),
                m.window_starts.len()
            )));
        }
    }

    let counts: Vec<usize> = Component::ALL
        .iter()
        .map(|&c| matrices[c].num_windows())
        .collect();
    let common = counts.iter().copied().min().unwrap_or(0);
    let longest = counts.iter().copied().max().unwrap_or(0);
    if common == 0 {
        return Err(HvsrError::NoCommonWindows);
    }
    if longest != common {
        let discrepancy = (longest - common) as f64 / longest as f64;
        if discrepancy > 0.05 {
            tracing::warn!(
                z = counts[0],
                n = counts[1],
                e = counts[2],
                common,
                "component window counts differ by more than 5%; trimming to shortest"
            );
        } else {
            tracing::debug!(
                z = counts[0],
                n = counts[1],
                e = counts[2],
                common,
                "trimming window counts"
            );
        }
    }

    let mut freqs: Vec<f64> = matrices.z.period_bin_centers.iter().map(|p| 1.0 / p).collect();
    freqs.reverse();
    let axis = FrequencyAxis::from_freqs(freqs)?;

    let ThreeComponent { z, n, e } = matrices;
    let mut rows = Vec::with_capacity(common);
    let mut values = (
        z.psd_values.into_iter(),
        n.psd_values.into_iter(),
        e.psd_values.into_iter(),
    );
    for &start in z.window_starts.iter().take(common) {
        let end = start + window_length;
        let triple = (
            values.0.next().flatten(),
            values.1.next().flatten(),
            values.2.next().flatten(),
        );
        let (psd, complete) = match triple {
            (Some(mut zv), Some(mut nv), Some(mut ev)) => {
                zv.reverse();
                nv.reverse();
                ev.reverse();
                (ThreeComponent::new(zv, nv, ev), true)
            }
            _ => {
                let gap = vec![f64::NAN; expected];
                (ThreeComponent::new(gap.clone(), gap.clone(), gap), false)
            }
        };
        let in_use = complete && !exclusions.overlaps_span(start, end);
        rows.push(WindowRow::new(start, end, psd, in_use));
    }

    let table = WindowTable::new(record_start, window_length, axis, rows)?;
    tracing::info!(
        windows = table.len(),
        used = table.num_used(),
        bins = table.axis().len(),
        "built window table"
    );
    Ok(table)
}

/// Estimate all three components and build the window table.
pub fn aggregate(
    record: &SeismicRecord,
    responses: &ThreeComponent<InstrumentResponse>,
    params: &PsdParams,
    exclusions: &ExclusionSet,
    estimator: &dyn PsdEstimator,
) -> Result<WindowTable> {
    params.validate()?;
    let mut matrices = Vec::with_capacity(3);
    for c in Component::ALL {
        let m = estimator.estimate(record.channel(c), record.sample_rate(), &responses[c], params)?;
        tracing::debug!(
            component = %c,
            windows = m.num_windows(),
            skipped = m.psd_values.iter().filter(|v| v.is_none()).count(),
            "estimated PSDs"
        );
        matrices.push(m);
    }
    let mut it = matrices.into_iter();
    let (Some(z), Some(n), Some(e)) = (it.next(), it.next(), it.next()) else {
        return Err(HvsrError::NoCommonWindows);
    };
    table_from_matrices(
        record.start_time(),
        params.window_length,
        ThreeComponent::new(z, n, e),
        exclusions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;

    fn matrix(windows: usize, bins: usize) -> PsdMatrix {
        let centers: Vec<f64> = (1..=bins).map(|i| i as f64 * 0.1).collect();
        PsdMatrix {
            period_bin_edges: centers.iter().map(|&c| (c * 0.7, c * 1.4)).collect(),
            period_bin_centers: centers,
            window_starts: (0..windows).map(|i| i as f64 * 30.0).collect(),
            psd_values: (0..windows).map(|i| Some(vec![-100.0 - i as f64; bins])).collect(),
        }
    }

    #[test]
    fn power_of_two_helper() {
        assert_eq!(prev_power_of_two(1500), 1024);
        assert_eq!(prev_power_of_two(1024), 1024);
        assert_eq!(prev_power_of_two(1), 1);
    }

    #[test]
    fn taper_is_flat_in_the_middle() {
        let w = cosine_taper(100, 0.1);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[50], 1.0);
        assert_eq!(w[99], 0.0);
        assert!(w[2] > 0.0 && w[2] < 1.0);
    }

    #[test]
    fn detrend_removes_line() {
        let mut data: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        detrend_linear(&mut data);
        assert!(data.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn period_bins_start_on_lower_limit() {
        let (centers, edges) = period_bins([0.02, 10.0], 0.125, 1.0);
        assert!((centers[0] - 0.02).abs() < 1e-12);
        assert!(*centers.last().unwrap() >= 10.0);
        for (c, (l, r)) in centers.iter().zip(&edges) {
            assert!((r / l - 2.0).abs() < 1e-12);
            assert!(l < c && c < r);
        }
    }

    #[test]
    fn welch_recovers_white_noise_level() {
        // deterministic white noise with unit variance at 100 Hz: PSD = 2 / fs
        let fs = 100.0;
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        let samples: Vec<f64> = (0..fs as usize * 180)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 12f64.sqrt()
            })
            .collect();
        let params = PsdParams::default();
        let m = WelchEstimator
            .estimate(&samples, fs, &InstrumentResponse::flat(), &params)
            .unwrap();
        assert_eq!(m.num_windows(), 5);
        let expected = 10.0 * (2.0 / fs).log10();
        let row = m.psd_values[0].as_ref().unwrap();
        let mid = row[row.len() / 2];
        assert!((mid - expected).abs() < 2.0, "mid bin {mid} dB vs {expected} dB");
    }

    #[test]
    fn gap_windows_are_skipped() {
        let fs = 50.0;
        let mut samples: Vec<f64> =
            (0..(fs as usize * 120)).map(|i| (i as f64 * 0.3).sin()).collect();
        samples[100] = f64::NAN;
        let m = WelchEstimator
            .estimate(&samples, fs, &InstrumentResponse::flat(), &PsdParams::default())
            .unwrap();
        assert_eq!(m.num_windows(), 3);
        assert!(m.psd_values[0].is_none());
        assert!(m.psd_values[1].is_some());
    }

    #[test]
    fn mismatched_window_counts_are_trimmed() {
        let matrices = ThreeComponent::new(matrix(20, 8), matrix(19, 8), matrix(20, 8));
        let table = table_from_matrices(0.0, 60.0, matrices, &ExclusionSet::default()).unwrap();
        assert_eq!(table.len(), 19);
        assert_eq!(table.num_used(), 19);
        // ascending frequency, so the longest period comes first
        assert!((table.axis().freqs()[0] - 1.0 / 0.8).abs() < 1e-12);
    }

    #[test]
    fn mismatched_bins_fail() {
        let matrices = ThreeComponent::new(matrix(5, 8), matrix(5, 8), matrix(5, 7));
        let err = table_from_matrices(0.0, 60.0, matrices, &ExclusionSet::default()).unwrap_err();
        assert!(matches!(err, HvsrError::AxisMismatch { component: Component::E, .. }));
    }

    #[test]
    fn zero_common_windows_fail() {
        let matrices = ThreeComponent::new(matrix(5, 8), matrix(0, 8), matrix(5, 8));
        let err = table_from_matrices(0.0, 60.0, matrices, &ExclusionSet::default()).unwrap_err();
        assert!(matches!(err, HvsrError::NoCommonWindows));
    }

    #[test]
    fn excluded_and_gap_windows_start_unused() {
        let mut z = matrix(6, 8);
        z.psd_values[4] = None;
        let matrices = ThreeComponent::new(z, matrix(6, 8), matrix(6, 8));
        let exclusions = ExclusionSet::from_windows(&[TimeWindow { start: 35.0, end: 40.0 }]);
        let table = table_from_matrices(0.0, 60.0, matrices, &exclusions).unwrap();
        // rows start at 0, 30, 60, ... and last 60 s
        assert_eq!(table.use_flags(), vec![false, false, true, true, false, true]);
        assert!(table.rows()[4].psd.n.iter().all(|v| v.is_nan()));
    }
}
