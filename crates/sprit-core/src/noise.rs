//! Noise-window curation.
//!
//! Automated detectors look for intervals that should not contribute to the
//! HVSR estimate and return them as [`TimeWindow`]s. [`curate`] runs the
//! detectors selected by [`NoiseParams::method`], merges their output with any
//! manually selected windows, and marks the excluded samples as gaps.
//!
//! Detectors run in sequence and each sees the gaps left by the previous
//! ones, so a saturated burst already removed by the noise threshold does not
//! set the saturation level.

use crate::error::{HvsrError, Result};
use crate::signal::{Component, SeismicRecord};
use crate::window::{ExclusionSet, TimeWindow, check_manual_windows};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which noise-removal rules to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseRemovalMethod {
    /// Noise threshold, STA/LTA antitrigger, saturation and warmup/cooldown in sequence.
    #[default]
    Auto,
    /// Only the manually selected windows.
    Manual,
    /// STA/LTA antitrigger only.
    AntiTrigger,
    /// Amplitude saturation threshold only.
    SaturationThreshold,
    /// Long-term-average noise threshold only.
    NoiseThreshold,
    /// Warmup/cooldown trimming only.
    WarmupCooldown,
}

impl fmt::Display for NoiseRemovalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::AntiTrigger => "anti_trigger",
            Self::SaturationThreshold => "saturation_threshold",
            Self::NoiseThreshold => "noise_threshold",
            Self::WarmupCooldown => "warmup_cooldown",
        };
        f.write_str(s)
    }
}

impl FromStr for NoiseRemovalMethod {
    type Err = HvsrError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "auto" | "automatic" | "all" | "a" => Ok(Self::Auto),
            "manual" | "man" | "m" | "window" | "windows" | "w" => Ok(Self::Manual),
            "stalta" | "anti" | "antitrigger" | "anti_trigger" | "trigger" | "at" => {
                Ok(Self::AntiTrigger)
            }
            "saturation_threshold" | "saturation" | "sat" | "s" => Ok(Self::SaturationThreshold),
            "noise_threshold" | "noise" | "threshold" | "n" => Ok(Self::NoiseThreshold),
            "warmup" | "cooldown" | "warm" | "cool" | "buffer" | "warmup_cooldown" | "wc"
            | "warm_cool" => Ok(Self::WarmupCooldown),
            _ => Err(HvsrError::invalid(
                "noise.method",
                format!(
                    "'{s}' is not one of auto, manual, anti_trigger, \
                     saturation_threshold, noise_threshold, warmup_cooldown"
                ),
            )),
        }
    }
}

/// Parameters for noise-window curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    /// Rules to apply.
    pub method: NoiseRemovalMethod,
    /// Saturation level as a fraction of the maximum absolute amplitude.
    /// Values above 1 are read as percentages.
    pub sat_percent: f64,
    /// Noise level as a fraction of the maximum long-term average.
    /// Values above 1 are read as percentages.
    pub noise_percent: f64,
    /// Short-term average window in seconds.
    pub sta: f64,
    /// Long-term average window in seconds.
    pub lta: f64,
    /// Antitrigger `[detrigger, trigger]` thresholds on the STA/LTA ratio.
    pub stalta_thresh: [f64; 2],
    /// Seconds excluded at the start of the record.
    pub warmup_time: f64,
    /// Seconds excluded at the end of the record.
    pub cooldown_time: f64,
    /// Minimum run length in seconds for threshold detectors.
    pub min_win_size: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            method: NoiseRemovalMethod::Auto,
            sat_percent: 0.995,
            noise_percent: 0.80,
            sta: 2.0,
            lta: 30.0,
            stalta_thresh: [0.5, 5.0],
            warmup_time: 0.0,
            cooldown_time: 0.0,
            min_win_size: 1.0,
        }
    }
}

/// Read values above 1 as percentages.
pub(crate) fn as_fraction(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

impl NoiseParams {
    /// Saturation fraction in `(0, 1]`.
    pub fn sat_fraction(&self) -> f64 {
        as_fraction(self.sat_percent)
    }

    /// Noise fraction in `(0, 1]`.
    pub fn noise_fraction(&self) -> f64 {
        as_fraction(self.noise_percent)
    }

    /// Check every parameter, failing on the first problem.
    pub fn validate(&self) -> Result<()> {
        let sat = self.sat_fraction();
        if !(sat > 0.0 && sat <= 1.0) {
            return Err(HvsrError::invalid(
                "noise.sat_percent",
                format!("must be in (0, 100], got {}", self.sat_percent),
            ));
        }
        let noise = self.noise_fraction();
        if !(noise > 0.0 && noise <= 1.0) {
            return Err(HvsrError::invalid(
                "noise.noise_percent",
                format!("must be in (0, 100], got {}", self.noise_percent),
            ));
        }
        if !(self.sta > 0.0) {
            return Err(HvsrError::invalid(
                "noise.sta",
                format!("must be positive, got {}", self.sta),
            ));
        }
        if !(self.lta > self.sta) {
            return Err(HvsrError::invalid(
                "noise.lta",
                format!("must exceed sta ({}), got {}", self.sta, self.lta),
            ));
        }
        let [low, high] = self.stalta_thresh;
        if !(low > 0.0 && high > low) {
            return Err(HvsrError::invalid(
                "noise.stalta_thresh",
                format!("need 0 < low < high, got [{low}, {high}]"),
            ));
        }
        if !(self.warmup_time >= 0.0) || !(self.cooldown_time >= 0.0) {
            return Err(HvsrError::invalid(
                "noise.warmup_time",
                "warmup and cooldown times must be non-negative",
            ));
        }
        if !(self.min_win_size >= 0.0) {
            return Err(HvsrError::invalid(
                "noise.min_win_size",
                format!("must be non-negative, got {}", self.min_win_size),
            ));
        }
        Ok(())
    }
}

/// Result of noise curation.
#[derive(Debug, Clone)]
pub struct Curation {
    /// Merged exclusion windows, automated and manual.
    pub exclusions: ExclusionSet,
    /// The input record with every excluded sample marked as a gap.
    pub record: SeismicRecord,
}

/// Run the configured detectors and merge in `manual` windows.
///
/// Manual windows are checked for overlap first; an overlapping pair is an
/// input error. Finding nothing to exclude is not an error.
pub fn curate(
    record: &SeismicRecord,
    params: &NoiseParams,
    manual: &[TimeWindow],
) -> Result<Curation> {
    params.validate()?;
    let manual = check_manual_windows(manual)?;

    let mut exclusions = ExclusionSet::from_windows(&manual);
    let mut current = if manual.is_empty() {
        record.clone()
    } else {
        record.with_gaps(&manual)
    };

    for detector in Detector::for_method(params.method) {
        let found = detector.run(&current, params);
        tracing::debug!(
            detector = detector.name(),
            windows = found.len(),
            "noise detector finished"
        );
        if !found.is_empty() {
            current = current.with_gaps(&found);
            exclusions.extend(&found);
        }
    }

    tracing::info!(
        method = %params.method,
        windows = exclusions.len(),
        excluded_seconds = exclusions.total_duration(),
        "noise curation complete"
    );

    Ok(Curation {
        exclusions,
        record: current,
    })
}

#[derive(Debug, Clone, Copy)]
enum Detector {
    NoiseThreshold,
    AntiTrigger,
    Saturation,
    WarmupCooldown,
}

impl Detector {
    fn for_method(method: NoiseRemovalMethod) -> &'static [Detector] {
        match method {
            NoiseRemovalMethod::Auto => &[
                Detector::NoiseThreshold,
                Detector::AntiTrigger,
                Detector::Saturation,
                Detector::WarmupCooldown,
            ],
            NoiseRemovalMethod::Manual => &[],
            NoiseRemovalMethod::AntiTrigger => &[Detector::AntiTrigger],
            NoiseRemovalMethod::SaturationThreshold => &[Detector::Saturation],
            NoiseRemovalMethod::NoiseThreshold => &[Detector::NoiseThreshold],
            NoiseRemovalMethod::WarmupCooldown => &[Detector::WarmupCooldown],
        }
    }

    fn name(self) -> &'static str {
        match self {
            Detector::NoiseThreshold => "noise_threshold",
            Detector::AntiTrigger => "anti_trigger",
            Detector::Saturation => "saturation_threshold",
            Detector::WarmupCooldown => "warmup_cooldown",
        }
    }

    fn run(self, record: &SeismicRecord, p: &NoiseParams) -> Vec<TimeWindow> {
        match self {
            Detector::NoiseThreshold => {
                noise_threshold_windows(record, p.noise_fraction(), p.lta, p.min_win_size)
            }
            Detector::AntiTrigger => antitrigger_windows(record, p.sta, p.lta, p.stalta_thresh),
            Detector::Saturation => saturation_windows(record, p.sat_fraction(), p.min_win_size),
            Detector::WarmupCooldown => {
                warmup_cooldown_windows(record, p.warmup_time, p.cooldown_time)
            }
        }
    }
}

/// Classic STA/LTA characteristic function on signal energy.
///
/// Gap samples contribute zero energy. The first `nlta - 1` values are zero.
pub fn classic_sta_lta(data: &[f64], nsta: usize, nlta: usize) -> Vec<f64> {
    let n = data.len();
    let nsta = nsta.max(1);
    let nlta = nlta.max(1);

    let mut cumsum = Vec::with_capacity(n);
    let mut acc = 0.0;
    for &x in data {
        if !x.is_nan() {
            acc += x * x;
        }
        cumsum.push(acc);
    }

    let windowed = |i: usize, len: usize| {
        if i >= len {
            (cumsum[i] - cumsum[i - len]) / len as f64
        } else {
            cumsum[i] / len as f64
        }
    };

    (0..n)
        .map(|i| {
            if i + 1 < nlta {
                return 0.0;
            }
            let sta = windowed(i, nsta);
            let lta = windowed(i, nlta).max(f64::MIN_POSITIVE);
            sta / lta
        })
        .collect()
}

/// Trigger on/off sample pairs.
///
/// A trigger starts where `cf` rises above `on` and ends at the last sample
/// before it falls below `off`. A trigger still active at the end of the
/// data is closed at the last sample.
pub fn trigger_onset(cf: &[f64], on: f64, off: f64) -> Vec<(usize, usize)> {
    let mut events = Vec::new();
    let mut start = None;
    for (i, &v) in cf.iter().enumerate() {
        match start {
            None if v > on => start = Some(i),
            Some(s) if v < off => {
                events.push((s, i.saturating_sub(1).max(s)));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        events.push((s, cf.len() - 1));
    }
    events
}

/// STA/LTA antitrigger windows, unioned over the three components.
///
/// Both trigger boundaries move back by `sta` seconds to account for trigger
/// lag, unless that would put them before the record start.
pub fn antitrigger_windows(
    record: &SeismicRecord,
    sta: f64,
    lta: f64,
    [low, high]: [f64; 2],
) -> Vec<TimeWindow> {
    let fs = record.sample_rate();
    let nsta = (sta * fs) as usize;
    let nlta = (lta * fs) as usize;
    let shift = |sample: usize| {
        let t = sample as f64 / fs;
        if sta > t { t } else { t - sta }
    };

    let mut windows = Vec::new();
    for c in Component::ALL {
        let cf = classic_sta_lta(record.channel(c), nsta, nlta);
        for (on, off) in trigger_onset(&cf, high, low) {
            windows.push(TimeWindow {
                start: shift(on),
                end: shift(off),
            });
        }
    }
    windows
}

/// Contiguous runs of `true` at least `min_samples + 1` samples long,
/// as inclusive index pairs. A run reaching the end of the mask is kept.
fn flagged_runs(mask: &[bool], min_samples: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &flag) in mask.iter().enumerate() {
        match (flag, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - 1 - s >= min_samples {
                    runs.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        let end = mask.len() - 1;
        if end - s >= min_samples {
            runs.push((s, end));
        }
    }
    runs
}

fn runs_to_windows(runs: &[(usize, usize)], fs: f64) -> Vec<TimeWindow> {
    runs.iter()
        .map(|&(s, e)| TimeWindow {
            start: s as f64 / fs,
            end: e as f64 / fs,
        })
        .collect()
}

/// Runs where any component's absolute amplitude exceeds `fraction` of the
/// largest absolute amplitude on any component.
pub fn saturation_windows(
    record: &SeismicRecord,
    fraction: f64,
    min_win_size: f64,
) -> Vec<TimeWindow> {
    let max_amp = Component::ALL
        .iter()
        .flat_map(|&c| record.channel(c).iter())
        .filter(|v| !v.is_nan())
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_amp == 0.0 {
        return Vec::new();
    }
    let threshold = max_amp * fraction;

    let mut mask = vec![false; record.len()];
    for c in Component::ALL {
        for (flag, v) in mask.iter_mut().zip(record.channel(c)) {
            *flag |= v.abs() > threshold;
        }
    }

    let min_samples = (min_win_size * record.sample_rate()) as usize;
    runs_to_windows(&flagged_runs(&mask, min_samples), record.sample_rate())
}

/// Centered moving average over `width` samples.
///
/// Matches a `'same'`-mode convolution with a boxcar of `width` ones divided
/// by `width`: samples beyond the edges count as zero. Gaps count as zero.
pub fn moving_average(data: &[f64], width: usize) -> Vec<f64> {
    let n = data.len();
    let width = width.max(1);
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in data {
        if !x.is_nan() {
            acc += x;
        }
        prefix.push(acc);
    }
    let lead = (width - 1) / 2;
    (0..n)
        .map(|i| {
            let hi = (i + lead + 1).min(n);
            let lo = (i + lead + 1).saturating_sub(width);
            (prefix[hi] - prefix[lo]) / width as f64
        })
        .collect()
}

/// Runs where the magnitude of a component's long-term average exceeds
/// `fraction` of the largest such magnitude on that component.
///
/// The average is taken over signed samples, so zero-mean background noise
/// stays low and only sustained offsets or long-period drift are flagged.
pub fn noise_threshold_windows(
    record: &SeismicRecord,
    fraction: f64,
    lta: f64,
    min_win_size: f64,
) -> Vec<TimeWindow> {
    let width = (lta * record.sample_rate()) as usize;
    let mut mask = vec![false; record.len()];
    for c in Component::ALL {
        let avg: Vec<f64> = moving_average(record.channel(c), width)
            .into_iter()
            .map(f64::abs)
            .collect();
        let max_avg = avg.iter().copied().fold(0.0_f64, f64::max);
        if max_avg == 0.0 {
            continue;
        }
        let threshold = fraction * max_avg;
        for (flag, v) in mask.iter_mut().zip(&avg) {
            *flag |= *v > threshold;
        }
    }
    let min_samples = (min_win_size * record.sample_rate()) as usize;
    runs_to_windows(&flagged_runs(&mask, min_samples), record.sample_rate())
}

/// `[0, warmup]` and `[duration - cooldown, duration]`, skipping zero lengths.
pub fn warmup_cooldown_windows(
    record: &SeismicRecord,
    warmup_time: f64,
    cooldown_time: f64,
) -> Vec<TimeWindow> {
    let duration = record.duration();
    let mut windows = Vec::new();
    if warmup_time > 0.0 {
        windows.push(TimeWindow {
            start: 0.0,
            end: warmup_time.min(duration),
        });
    }
    if cooldown_time > 0.0 {
        windows.push(TimeWindow {
            start: (duration - cooldown_time).max(0.0),
            end: duration,
        });
    }
    windows
}
