//! SESAME (2004) reliability and clarity grading of H/V peaks.
//!
//! Every candidate peak of the aggregate curve is run through the same nine
//! tests. Three judge the curve as a whole, six judge the peak itself. A
//! peak passes when all three curve tests pass and at least five of the six
//! peak tests do. The best peak is the first one with the highest score.

use crate::curve::{AggregateCurve, Envelope};
use crate::error::{HvsrError, Result};
use crate::peaks::{find_peaks, nearest_peak};
use crate::stats::nanstd;
use crate::table::WindowTable;
use serde::{Deserialize, Serialize};
use std::fmt;

const PASS: char = '✔';
const FAIL: char = '✘';

fn mark(pass: bool) -> char {
    if pass { PASS } else { FAIL }
}

/// One of the nine SESAME criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SesameTest {
    /// `f0 > 10 / Lw`
    WindowLengthFreq,
    /// `Lw * nw * f0 > 200`
    SignificantCycles,
    /// log-amplitude spread below 2 (3 under 0.5 Hz) over `[f0/2, 2 f0)`
    LowCurveStd,
    /// some `f-` in `[f0/4, f0)` with `A0 / A(f-) > 2`
    ClarityBelow,
    /// some `f+` in `(f0, 4 f0]` with `A0 / A(f+) > 2`
    ClarityAbove,
    /// `A0 > 2`
    AmplitudeClarity,
    /// peak reappears within ±5% on both envelope curves
    FreqStability,
    /// `σf < ε(f0) * f0`
    FreqStd,
    /// `σA < θ(f0)`
    AmpStd,
}

impl SesameTest {
    /// All tests in report order.
    pub const ALL: [SesameTest; 9] = [
        SesameTest::WindowLengthFreq,
        SesameTest::SignificantCycles,
        SesameTest::LowCurveStd,
        SesameTest::ClarityBelow,
        SesameTest::ClarityAbove,
        SesameTest::AmplitudeClarity,
        SesameTest::FreqStability,
        SesameTest::FreqStd,
        SesameTest::AmpStd,
    ];

    /// Position in [`ALL`](Self::ALL).
    pub fn position(self) -> usize {
        self as usize
    }

    /// Column / display name.
    pub fn name(self) -> &'static str {
        match self {
            SesameTest::WindowLengthFreq => "Window Length Freq.",
            SesameTest::SignificantCycles => "Significant Cycles",
            SesameTest::LowCurveStd => "Low Curve StDev. over time",
            SesameTest::ClarityBelow => "Peak Freq. Clarity Below",
            SesameTest::ClarityAbove => "Peak Freq. Clarity Above",
            SesameTest::AmplitudeClarity => "Peak Amp. Clarity",
            SesameTest::FreqStability => "Freq. Stability",
            SesameTest::FreqStd => "Peak Stability (freq. std)",
            SesameTest::AmpStd => "Peak Stability (amp. std)",
        }
    }

    /// Look a test up by its display name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name.trim())
    }

    /// Curve-reliability test (as opposed to a peak-clarity test).
    pub fn is_curve_test(self) -> bool {
        matches!(
            self,
            SesameTest::WindowLengthFreq | SesameTest::SignificantCycles | SesameTest::LowCurveStd
        )
    }
}

impl fmt::Display for SesameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of the nine tests, indexed by [`SesameTest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PassList([bool; 9]);

impl PassList {
    /// Build from booleans in [`SesameTest::ALL`] order.
    pub fn from_array(values: [bool; 9]) -> Self {
        Self(values)
    }

    /// Result of one test.
    pub fn get(&self, test: SesameTest) -> bool {
        self.0[test.position()]
    }

    /// Record the result of one test.
    pub fn set(&mut self, test: SesameTest, pass: bool) {
        self.0[test.position()] = pass;
    }

    /// `(test, passed)` in report order.
    pub fn iter(&self) -> impl Iterator<Item = (SesameTest, bool)> + '_ {
        SesameTest::ALL.into_iter().map(|t| (t, self.get(t)))
    }

    /// Number of passed tests.
    pub fn count(&self) -> u32 {
        self.0.iter().filter(|&&p| p).count() as u32
    }

    /// Passed curve-reliability tests (0-3).
    pub fn curve_passed(&self) -> u32 {
        self.iter().filter(|&(t, p)| p && t.is_curve_test()).count() as u32
    }

    /// Passed peak-clarity tests (0-6).
    pub fn peak_passed(&self) -> u32 {
        self.iter().filter(|&(t, p)| p && !t.is_curve_test()).count() as u32
    }

    /// All three curve tests and at least five of the six peak tests.
    pub fn peak_passes(&self) -> bool {
        self.curve_passed() == 3 && self.peak_passed() >= 5
    }

    /// Booleans in report order.
    pub fn as_array(&self) -> [bool; 9] {
        self.0
    }
}

/// Frequency-stability threshold factor ε(f0).
pub fn epsilon(f0: f64) -> f64 {
    if f0 < 0.2 {
        0.25
    } else if f0 < 0.5 {
        0.20
    } else if f0 < 1.0 {
        0.15
    } else if f0 <= 2.0 {
        0.10
    } else {
        0.05
    }
}

/// Amplitude-stability threshold θ(f0) on the log10 standard deviation.
pub fn theta(f0: f64) -> f64 {
    if f0 < 0.2 {
        0.48
    } else if f0 < 0.5 {
        0.40
    } else if f0 < 1.0 {
        0.30
    } else if f0 <= 2.0 {
        0.25
    } else {
        0.20
    }
}

/// Peak-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakParams {
    /// Frequencies analysed, in Hz.
    pub hvsr_band: [f64; 2],
    /// Sub-range searched for peaks. Defaults to `hvsr_band`.
    pub peak_freq_range: Option<[f64; 2]>,
    /// Minimum H/V amplitude of a candidate peak.
    pub peak_water_level: f64,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            hvsr_band: [0.4, 40.0],
            peak_freq_range: None,
            peak_water_level: 1.8,
        }
    }
}

impl PeakParams {
    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        let [lo, hi] = self.hvsr_band;
        if !(lo > 0.0 && hi > lo && hi.is_finite()) {
            return Err(HvsrError::invalid(
                "peaks.hvsr_band",
                format!("must be positive and increasing, got [{lo}, {hi}]"),
            ));
        }
        if let Some([a, b]) = self.peak_freq_range {
            if !(a >= 0.0 && b > a) {
                return Err(HvsrError::invalid(
                    "peaks.peak_freq_range",
                    format!("must be non-negative and increasing, got [{a}, {b}]"),
                ));
            }
        }
        if !self.peak_water_level.is_finite() {
            return Err(HvsrError::invalid(
                "peaks.peak_water_level",
                "must be finite",
            ));
        }
        Ok(())
    }

    /// Inclusive frequency range a candidate must fall in.
    pub fn search_range(&self) -> [f64; 2] {
        match self.peak_freq_range {
            Some([a, b]) => [a.max(self.hvsr_band[0]), b.min(self.hvsr_band[1])],
            None => self.hvsr_band,
        }
    }
}

/// One graded candidate peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    /// Index on the aggregate curve.
    pub index: usize,
    /// Peak frequency in Hz.
    pub f0: f64,
    /// Peak amplitude.
    pub a0: f64,
    /// Frequency that satisfied the below-clarity test.
    pub f_minus: Option<f64>,
    /// Frequency that satisfied the above-clarity test.
    pub f_plus: Option<f64>,
    /// Standard deviation of the peak frequency across windows.
    pub sigma_f: f64,
    /// log10 amplitude standard deviation at the peak.
    pub sigma_a: f64,
    /// Number of passed tests.
    pub score: u32,
    /// Per-test outcome.
    pub pass_list: PassList,
    /// Per-test explanation, in [`SesameTest::ALL`] order.
    pub report: Vec<String>,
    /// All curve tests and at least five peak tests passed.
    pub peak_passes: bool,
}

impl Peak {
    fn candidate(index: usize, f0: f64, a0: f64) -> Self {
        Self {
            index,
            f0,
            a0,
            f_minus: None,
            f_plus: None,
            sigma_f: f64::NAN,
            sigma_a: f64::NAN,
            score: 0,
            pass_list: PassList::default(),
            report: vec![String::new(); SesameTest::ALL.len()],
            peak_passes: false,
        }
    }

    fn record(&mut self, test: SesameTest, pass: bool, report: String) {
        self.pass_list.set(test, pass);
        self.report[test.position()] = report;
    }

    fn finish(&mut self) {
        self.score = self.pass_list.count();
        self.peak_passes = self.pass_list.peak_passes();
    }

    /// Explanation for one test.
    pub fn report_for(&self, test: SesameTest) -> &str {
        &self.report[test.position()]
    }
}

/// Graded peaks of one site.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PeakReport {
    /// Every candidate peak, in increasing frequency.
    pub peaks: Vec<Peak>,
    /// Position of the best peak in `peaks`.
    pub best: Option<usize>,
}

impl PeakReport {
    /// The best peak, if any candidate was found.
    pub fn best_peak(&self) -> Option<&Peak> {
        self.best.and_then(|i| self.peaks.get(i))
    }
}

/// Indices of `curve` peaks above the water level inside `range`.
///
/// NaN bins are skipped: they never form a peak, and a finite maximum
/// next to one is not reported either.
fn candidates(
    curve: &[f64],
    freqs: &[f64],
    water_level: impl Fn(usize) -> f64,
    range: [f64; 2],
) -> Vec<usize> {
    let nan_bins = curve.iter().filter(|v| v.is_nan()).count();
    if nan_bins > 0 {
        tracing::warn!(nan_bins, bins = curve.len(), "skipping NaN bins in peak search");
    }
    find_peaks(curve)
        .into_iter()
        .filter(|&i| curve[i] > water_level(i) && range[0] <= freqs[i] && freqs[i] <= range[1])
        .collect()
}

fn check_curve_reliability(peak: &mut Peak, curve: &AggregateCurve) {
    let f0 = peak.f0;
    let lw = curve.window_length;

    let t1 = f0 > 10.0 / lw;
    peak.record(
        SesameTest::WindowLengthFreq,
        t1,
        format!("{f0:.3} > 10 / {}  {}", lw as i64, mark(t1)),
    );

    let nc = lw * curve.num_windows_used as f64 * f0;
    let t2 = nc > 200.0;
    peak.record(
        SesameTest::SignificantCycles,
        t2,
        format!("{nc:.0} > 200  {}", mark(t2)),
    );

    let limit = if f0 >= 0.5 { 2.0 } else { 3.0 };
    let (half, double) = (f0 / 2.0, f0 * 2.0);
    let t3 = !curve
        .freqs
        .iter()
        .zip(&curve.log_std)
        .any(|(&f, &s)| f >= half && f < double && s >= limit);
    peak.record(
        SesameTest::LowCurveStd,
        t3,
        format!("σ_A for all freqs {half:.3}-{double:.3} < {limit}  {}", mark(t3)),
    );
}

/// Below, above and amplitude clarity on one curve.
fn check_clarity(peak: &mut Peak, freqs: &[f64], curve: &[f64]) {
    let (f0, a0) = (peak.f0, peak.a0);

    let below = (0..curve.len())
        .rev()
        .find(|&j| f0 / 4.0 <= freqs[j] && freqs[j] < f0 && a0 / curve[j] > 2.0);
    peak.f_minus = below.map(|j| freqs[j]);
    let report = match below {
        Some(j) => format!("A({:.3}): {:.3} < {:.3}  {PASS}", freqs[j], curve[j], a0 / 2.0),
        None => format!("No A_h/v in freqs {:.3}-{f0:.3} < {:.3}  {FAIL}", f0 / 4.0, a0 / 2.0),
    };
    peak.record(SesameTest::ClarityBelow, below.is_some(), report);

    let above =
        (0..curve.len()).find(|&j| f0 < freqs[j] && freqs[j] <= 4.0 * f0 && a0 / curve[j] > 2.0);
    peak.f_plus = above.map(|j| freqs[j]);
    let report = match above {
        Some(j) => format!("A({:.3}): {:.3} < {:.3}  {PASS}", freqs[j], curve[j], a0 / 2.0),
        None => format!("No A_h/v in freqs {f0:.3}-{:.3} < {:.3}  {FAIL}", 4.0 * f0, a0 / 2.0),
    };
    peak.record(SesameTest::ClarityAbove, above.is_some(), report);

    let t6 = a0 > 2.0;
    peak.record(
        SesameTest::AmplitudeClarity,
        t6,
        format!("{a0:.2} > 2.0 {}", mark(t6)),
    );
}

/// First envelope peak within ±5% of `f0`, else the nearest one.
fn match_envelope(f0: f64, envelope_freqs: &[f64]) -> (bool, Option<f64>) {
    if let Some(&f) = envelope_freqs
        .iter()
        .find(|&&f| f0 * 0.95 <= f && f <= f0 * 1.05)
    {
        return (true, Some(f));
    }
    let nearest = envelope_freqs
        .iter()
        .copied()
        .fold(None, |best: Option<f64>, f| match best {
            Some(b) if (f - f0).abs() >= (b - f0).abs() => Some(b),
            _ => Some(f),
        });
    (false, nearest)
}

/// The plus-curve match only counts when the minus-curve match succeeded.
fn check_freq_stability(peak: &mut Peak, minus_freqs: &[f64], plus_freqs: &[f64]) {
    let f0 = peak.f0;
    let (found_m, fm) = match_envelope(f0, minus_freqs);
    let (found_p, fp) = match_envelope(f0, plus_freqs);
    let pass = found_m && found_p;
    let describe = |f: Option<f64>, ok: bool| match f {
        Some(f) => format!("{f:.3} within ±5% of {f0:.3} {}", mark(ok)),
        None => format!("no peak within ±5% of {f0:.3} {FAIL}"),
    };
    let report = format!(
        "P-: {}; P+: {}",
        describe(fm, found_m),
        describe(fp, pass)
    );
    peak.record(SesameTest::FreqStability, pass, report);
}

/// Standard deviation of the peak frequency across the used windows.
///
/// Each window contributes its peak nearest to `index`; the aggregate
/// peak itself is included once.
pub fn peak_freq_std(table: &WindowTable, index: usize) -> f64 {
    let freqs = table.axis().hv_freqs();
    let mut points: Vec<f64> = table
        .used_rows()
        .filter_map(|r| nearest_peak(&r.peak_indices, index))
        .map(|i| freqs[i])
        .collect();
    points.push(freqs[index]);
    nanstd(&points)
}

fn check_stability(peak: &mut Peak, sigma_f: f64, sigma_a: f64) {
    let f0 = peak.f0;
    peak.sigma_f = sigma_f;
    peak.sigma_a = sigma_a;

    let e = epsilon(f0);
    let t8 = sigma_f < e * f0;
    peak.record(
        SesameTest::FreqStd,
        t8,
        format!("{sigma_f:.4} < {e:.2} * {f0:.3} {}", mark(t8)),
    );

    let t = theta(f0);
    let t9 = sigma_a < t;
    peak.record(
        SesameTest::AmpStd,
        t9,
        format!("{sigma_a:.4} < {t:.2} {}", mark(t9)),
    );
}

/// Position of the highest-scoring peak. Ties keep the earlier peak.
pub fn best_peak_index(peaks: &[Peak]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, p) in peaks.iter().enumerate() {
        if best.is_none_or(|b| p.score > peaks[b].score) {
            best = Some(i);
        }
    }
    best
}

/// Grade every candidate peak of `curve`.
///
/// Per-window peak indices must already be annotated on `table`. Finding no
/// candidate is not an error: the report is simply empty.
pub fn check_peaks(
    curve: &AggregateCurve,
    table: &WindowTable,
    params: &PeakParams,
    envelope: Envelope,
) -> Result<PeakReport> {
    params.validate()?;
    let freqs = &curve.freqs;
    let range = params.search_range();
    let wl = params.peak_water_level;

    let (minus, plus) = curve.envelope(envelope);
    let minus_freqs: Vec<f64> = candidates(minus, freqs, |i| wl - curve.std_dev[i], range)
        .into_iter()
        .map(|i| freqs[i])
        .collect();
    let plus_freqs: Vec<f64> = candidates(plus, freqs, |i| wl + curve.std_dev[i], range)
        .into_iter()
        .map(|i| freqs[i])
        .collect();

    let mut peaks = Vec::new();
    for i in candidates(&curve.hvsr, freqs, |_| wl, range) {
        let mut peak = Peak::candidate(i, freqs[i], curve.hvsr[i]);
        check_curve_reliability(&mut peak, curve);
        check_clarity(&mut peak, freqs, &curve.hvsr);
        check_freq_stability(&mut peak, &minus_freqs, &plus_freqs);
        check_stability(&mut peak, peak_freq_std(table, i), curve.log_std[i]);
        peak.finish();
        peaks.push(peak);
    }

    let best = best_peak_index(&peaks);
    match best.map(|b| &peaks[b]) {
        Some(p) => tracing::info!(
            f0 = p.f0,
            a0 = p.a0,
            score = p.score,
            passes = p.peak_passes,
            candidates = peaks.len(),
            "best peak"
        ),
        None => tracing::warn!(?range, "no best peak identified"),
    }

    Ok(PeakReport { peaks, best })
}
