//! Frequency-domain smoothing of PSD curves.
//!
//! Every smoother maps a curve onto one of identical length. Konno-Ohmachi
//! works on log-frequency distance and pads both ends; the triangular
//! kernels work on bin distance and truncate at the edges instead.

use crate::error::{HvsrError, Result};
use crate::signal::Component;
use crate::table::WindowTable;
use serde::{Deserialize, Serialize};

/// Frequency smoothing applied to every PSD row before combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FreqSmoothing {
    /// Leave curves untouched.
    None,
    /// Konno-Ohmachi log-frequency kernel; smaller bandwidth smooths more.
    KonnoOhmachi {
        /// Kernel bandwidth coefficient `b`.
        bandwidth: f64,
    },
    /// Triangular kernel `width` bins wide.
    Constant {
        /// Full kernel width in bins.
        width: usize,
    },
    /// Triangular kernel whose half-width is a share of the bin count:
    /// a percentage if above 1, a fraction otherwise.
    Proportional {
        /// Half-width as percent or fraction of the number of bins.
        width: f64,
    },
}

impl Default for FreqSmoothing {
    fn default() -> Self {
        FreqSmoothing::KonnoOhmachi { bandwidth: 40.0 }
    }
}

impl FreqSmoothing {
    /// Reject non-positive widths.
    pub fn validate(&self) -> Result<()> {
        match *self {
            FreqSmoothing::KonnoOhmachi { bandwidth } if !(bandwidth > 0.0) => {
                Err(HvsrError::invalid(
                    "process.freq_smoothing.bandwidth",
                    format!("must be > 0, got {bandwidth}"),
                ))
            }
            FreqSmoothing::Proportional { width } if !(width > 0.0 && width <= 100.0) => {
                Err(HvsrError::invalid(
                    "process.freq_smoothing.width",
                    format!("must be in (0, 100], got {width}"),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Build a reusable smoother for curves sampled at `freqs`.
    pub fn smoother(&self, freqs: &[f64]) -> Result<Smoother> {
        self.validate()?;
        let n = freqs.len();
        Ok(match *self {
            FreqSmoothing::None => Smoother::Identity,
            FreqSmoothing::KonnoOhmachi { bandwidth } => {
                Smoother::KonnoOhmachi(KonnoOhmachi::new(freqs, bandwidth))
            }
            FreqSmoothing::Constant { width } => Smoother::Triangular(width / 2),
            FreqSmoothing::Proportional { width } => {
                let share = if width > 1.0 { width / 100.0 } else { width };
                Smoother::Triangular((share * n as f64) as usize)
            }
        })
    }
}

/// A smoother bound to one frequency axis.
#[derive(Debug, Clone)]
pub enum Smoother {
    /// No-op.
    Identity,
    /// Precomputed Konno-Ohmachi weights.
    KonnoOhmachi(KonnoOhmachi),
    /// Triangular kernel with the given half-width in bins.
    Triangular(usize),
}

impl Smoother {
    /// Smooth one curve. A Konno-Ohmachi smoother rejects curves whose
    /// length differs from the axis it was built for.
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        match self {
            Smoother::Identity => Ok(values.to_vec()),
            Smoother::KonnoOhmachi(ko) => ko.apply(values),
            Smoother::Triangular(half) => Ok(triangular_smooth(values, *half)),
        }
    }
}

/// Konno-Ohmachi smoother with edge padding.
///
/// Each side is padded with `min(bandwidth, n)` bins at log-extrapolated
/// frequencies, valued at the mean of the first (last) that many bins.
#[derive(Debug, Clone)]
pub struct KonnoOhmachi {
    pad: usize,
    // weights[i] applies to the padded curve and is normalised to unit sum
    weights: Vec<Vec<f64>>,
}

/// Konno-Ohmachi window value for frequency `f` around center `fc`.
pub fn konno_ohmachi_weight(f: f64, fc: f64, bandwidth: f64) -> f64 {
    if f <= 0.0 || fc <= 0.0 {
        return 0.0;
    }
    if f == fc {
        return 1.0;
    }
    let x = bandwidth * (f / fc).log10();
    let w = x.sin() / x;
    w * w * w * w
}

impl KonnoOhmachi {
    /// Precompute the weight matrix for `freqs`.
    pub fn new(freqs: &[f64], bandwidth: f64) -> Self {
        let n = freqs.len();
        let pad = if n < 2 { 0 } else { (bandwidth.ceil() as usize).min(n) };

        let mut padded = Vec::with_capacity(n + 2 * pad);
        if pad > 0 {
            let low_ratio = freqs[1] / freqs[0];
            padded.extend((1..=pad).rev().map(|k| freqs[0] / low_ratio.powi(k as i32)));
        }
        padded.extend_from_slice(freqs);
        if pad > 0 {
            let high_ratio = freqs[n - 1] / freqs[n - 2];
            padded.extend((1..=pad).map(|k| freqs[n - 1] * high_ratio.powi(k as i32)));
        }

        let weights = freqs
            .iter()
            .map(|&fc| {
                let mut row: Vec<f64> = padded
                    .iter()
                    .map(|&f| konno_ohmachi_weight(f, fc, bandwidth))
                    .collect();
                let sum: f64 = row.iter().sum();
                if sum > 0.0 {
                    row.iter_mut().for_each(|w| *w /= sum);
                }
                row
            })
            .collect();

        Self { pad, weights }
    }

    /// Number of bins on the axis the weights were built for.
    pub fn bins(&self) -> usize {
        self.weights.len()
    }

    /// Smooth one curve sampled on the smoother's axis.
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        let n = values.len();
        if n != self.weights.len() {
            return Err(HvsrError::CurveLength {
                expected: self.weights.len(),
                found: n,
            });
        }
        let pad = self.pad;
        let mut padded = Vec::with_capacity(n + 2 * pad);
        if pad > 0 {
            let head = values[..pad].iter().sum::<f64>() / pad as f64;
            let tail = values[n - pad..].iter().sum::<f64>() / pad as f64;
            padded.extend(std::iter::repeat_n(head, pad));
            padded.extend_from_slice(values);
            padded.extend(std::iter::repeat_n(tail, pad));
        } else {
            padded.extend_from_slice(values);
        }
        Ok(self
            .weights
            .iter()
            .map(|row| row.iter().zip(&padded).map(|(w, v)| w * v).sum())
            .collect())
    }
}

/// Triangular smoothing with weights `1 - |d| / (half + 1)`.
///
/// Near the edges the kernel is cut at the array boundary and renormalised,
/// so the result stays one-sided rather than padded. `half = 0` is the
/// identity.
pub fn triangular_smooth(values: &[f64], half: usize) -> Vec<f64> {
    if half == 0 {
        return values.to_vec();
    }
    let n = values.len();
    let denom = (half + 1) as f64;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let (mut acc, mut norm) = (0.0, 0.0);
            for (j, v) in values.iter().enumerate().take(hi + 1).skip(lo) {
                let w = 1.0 - i.abs_diff(j) as f64 / denom;
                acc += w * v;
                norm += w;
            }
            acc / norm
        })
        .collect()
}

/// Smooth every component of every row in place.
pub fn smooth_table(table: &mut WindowTable, smoothing: &FreqSmoothing) -> Result<()> {
    if matches!(smoothing, FreqSmoothing::None) {
        return Ok(());
    }
    let smoother = smoothing.smoother(table.axis().freqs())?;
    for row in table.rows_mut() {
        for c in Component::ALL {
            row.psd[c] = smoother.apply(&row.psd[c])?;
        }
    }
    tracing::debug!(?smoothing, rows = table.len(), "smoothed PSD rows");
    table.validate_axis()
}

/// Least-squares polynomial fit of `ys` at `xs`, evaluated at `at`.
///
/// `xs` are rescaled to `[-1, 1]` before the normal equations are built.
fn polyfit_eval(xs: &[f64], ys: &[f64], order: usize, at: &[f64]) -> Vec<f64> {
    let (lo, hi) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(l, h), &x| (l.min(x), h.max(x)));
    let mid = (lo + hi) / 2.0;
    let scale = if hi > lo { (hi - lo) / 2.0 } else { 1.0 };
    let k = order + 1;

    let mut ata = vec![vec![0.0; k]; k];
    let mut aty = vec![0.0; k];
    for (&x, &y) in xs.iter().zip(ys) {
        let t = (x - mid) / scale;
        let powers: Vec<f64> = (0..k).map(|p| t.powi(p as i32)).collect();
        for r in 0..k {
            aty[r] += powers[r] * y;
            for c in 0..k {
                ata[r][c] += powers[r] * powers[c];
            }
        }
    }
    let coeffs = solve(ata, aty);
    at.iter()
        .map(|&x| {
            let t = (x - mid) / scale;
            coeffs
                .iter()
                .enumerate()
                .map(|(p, c)| c * t.powi(p as i32))
                .sum()
        })
        .collect()
}

/// Gaussian elimination with partial pivoting on a small dense system.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);
        let p = a[col][col];
        if p == 0.0 {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / p;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = if a[row][row] == 0.0 {
            0.0
        } else {
            (b[row] - tail) / a[row][row]
        };
    }
    x
}

/// Savitzky-Golay filter.
///
/// Interior points use the centered least-squares polynomial of `order`
/// over `window` points. The first and last `window / 2` points are taken
/// from a polynomial fitted to the first and last `window` samples. Even
/// windows are widened by one. Curves shorter than the window, or windows
/// not wider than `order`, come back unchanged.
pub fn savgol_filter(values: &[f64], window: usize, order: usize) -> Vec<f64> {
    let window = if window % 2 == 0 { window + 1 } else { window };
    let n = values.len();
    if window <= order || window > n {
        return values.to_vec();
    }
    let half = window / 2;

    let positions: Vec<f64> = (0..window).map(|i| i as f64 - half as f64).collect();
    // convolution coefficients: polynomial value at 0 as a linear map of the window
    let coeffs: Vec<f64> = (0..window)
        .map(|i| {
            let mut unit = vec![0.0; window];
            unit[i] = 1.0;
            polyfit_eval(&positions, &unit, order, &[0.0])[0]
        })
        .collect();

    let mut out = values.to_vec();
    for i in half..n - half {
        out[i] = coeffs
            .iter()
            .zip(&values[i - half..=i + half])
            .map(|(c, v)| c * v)
            .sum();
    }

    let idx: Vec<f64> = (0..window).map(|i| i as f64).collect();
    let head_at: Vec<f64> = (0..half).map(|i| i as f64).collect();
    let head = polyfit_eval(&idx, &values[..window], order, &head_at);
    out[..half].copy_from_slice(&head);

    let tail_at: Vec<f64> = (window - half..window).map(|i| i as f64).collect();
    let tail = polyfit_eval(&idx, &values[n - window..], order, &tail_at);
    out[n - half..].copy_from_slice(&tail);

    out
}
