//! Validation of parameter sets and site lists.
//!
//! The processing core stops at the first bad parameter. Configuration files
//! are checked here instead so that every problem in a file is reported in
//! one pass, wrapped in [`ValidationError::Multiple`] when there is more than
//! one.
//!
//! # Example
//!
//! ```rust
//! use sprit_config::validate_params;
//! use sprit_core::HvsrParams;
//!
//! let mut params = HvsrParams::default();
//! params.noise.sta = -1.0;
//! params.peaks.hvsr_band = [10.0, 1.0];
//! let err = validate_params(&params).unwrap_err();
//! assert_eq!(err.errors().len(), 2);
//! ```

use sprit_core::noise::NoiseParams;
use sprit_core::{DepthModel, HvsrParams, PeakParams, ProcessParams, PsdParams};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Parameter value out of range or inconsistent with another one.
    #[error("invalid parameter '{param}': {reason}")]
    Invalid {
        /// Dotted parameter path, e.g. `noise.sta`.
        param: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two sites share a name.
    #[error("duplicate site name: {0}")]
    DuplicateSite(String),

    /// A site has an empty name.
    #[error("site #{0} has an empty name")]
    EmptySiteName(usize),

    /// A batch lists no sites.
    #[error("batch contains no sites")]
    NoSites,

    /// Multiple validation errors.
    #[error(
        "multiple validation errors: {}",
        .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
    )]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Every individual error, flattening [`ValidationError::Multiple`].
    pub fn errors(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Multiple(all) => all.iter().flat_map(|e| e.errors()).collect(),
            other => vec![other],
        }
    }

    fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Accumulates violations instead of stopping at the first.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    errors: Vec<ValidationError>,
    prefix: String,
}

impl Collector {
    pub(crate) fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            prefix: prefix.into(),
        }
    }

    fn check(&mut self, ok: bool, param: &str, reason: impl FnOnce() -> String) {
        if !ok {
            let param = if self.prefix.is_empty() {
                param.to_string()
            } else {
                format!("{}.{param}", self.prefix)
            };
            self.errors.push(ValidationError::invalid(param, reason()));
        }
    }

    pub(crate) fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    pub(crate) fn absorb(&mut self, result: ValidationResult<()>) {
        if let Err(e) = result {
            self.errors.extend(e.errors().into_iter().cloned());
        }
    }

    pub(crate) fn finish(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ValidationError::Multiple(self.errors)),
        }
    }
}

fn noise(c: &mut Collector, p: &NoiseParams) {
    let sat = p.sat_fraction();
    c.check(sat > 0.0 && sat <= 1.0, "noise.sat_percent", || {
        format!("must be in (0, 100], got {}", p.sat_percent)
    });
    let level = p.noise_fraction();
    c.check(level > 0.0 && level <= 1.0, "noise.noise_percent", || {
        format!("must be in (0, 100], got {}", p.noise_percent)
    });
    c.check(p.sta > 0.0, "noise.sta", || format!("must be positive, got {}", p.sta));
    c.check(p.lta > p.sta, "noise.lta", || {
        format!("must exceed sta ({}), got {}", p.sta, p.lta)
    });
    let [low, high] = p.stalta_thresh;
    c.check(low > 0.0 && high > low, "noise.stalta_thresh", || {
        format!("need 0 < low < high, got [{low}, {high}]")
    });
    c.check(p.warmup_time >= 0.0, "noise.warmup_time", || {
        format!("must be non-negative, got {}", p.warmup_time)
    });
    c.check(p.cooldown_time >= 0.0, "noise.cooldown_time", || {
        format!("must be non-negative, got {}", p.cooldown_time)
    });
    c.check(p.min_win_size >= 0.0, "noise.min_win_size", || {
        format!("must be non-negative, got {}", p.min_win_size)
    });
}

fn psd(c: &mut Collector, p: &PsdParams) {
    c.check(p.window_length > 0.0, "psd.window_length", || {
        format!("must be positive, got {}", p.window_length)
    });
    c.check((0.0..1.0).contains(&p.overlap), "psd.overlap", || {
        format!("must be in [0, 1), got {}", p.overlap)
    });
    c.check(p.period_step_octaves > 0.0, "psd.period_step_octaves", || {
        format!("must be positive, got {}", p.period_step_octaves)
    });
    c.check(
        p.period_smoothing_width_octaves > 0.0,
        "psd.period_smoothing_width_octaves",
        || format!("must be positive, got {}", p.period_smoothing_width_octaves),
    );
    if let Some([lo, hi]) = p.period_limits {
        c.check(lo > 0.0 && hi > lo, "psd.period_limits", || {
            format!("need 0 < shortest < longest, got [{lo}, {hi}]")
        });
    }
}

fn process(c: &mut Collector, p: &ProcessParams) {
    if let Some(n) = p.resample {
        c.check(n >= 2, "process.resample", || format!("need at least 2 points, got {n}"));
    }
    c.check(p.savgol_window != Some(0), "process.savgol_window", || {
        "must be positive".to_string()
    });
    if let Some(k) = p.psd_outlier_std {
        c.check(k > 0.0, "process.psd_outlier_std", || format!("must be positive, got {k}"));
    }
    for result in [p.freq_smoothing.validate(), p.outlier.validate()] {
        if let Err(sprit_core::HvsrError::InvalidParameter { param, reason }) = result {
            c.check(false, param, || reason);
        }
    }
}

fn peaks(c: &mut Collector, p: &PeakParams) {
    let [lo, hi] = p.hvsr_band;
    c.check(lo > 0.0 && hi > lo && hi.is_finite(), "peaks.hvsr_band", || {
        format!("must be positive and increasing, got [{lo}, {hi}]")
    });
    if let Some([a, b]) = p.peak_freq_range {
        c.check(a >= 0.0 && b > a, "peaks.peak_freq_range", || {
            format!("must be non-negative and increasing, got [{a}, {b}]")
        });
    }
    c.check(p.peak_water_level.is_finite(), "peaks.peak_water_level", || {
        "must be finite".to_string()
    });
}

fn calibration(c: &mut Collector, model: Option<&DepthModel>) {
    if let Some(Err(sprit_core::HvsrError::InvalidParameter { param, reason })) =
        model.map(DepthModel::validate)
    {
        c.check(false, param, || reason);
    }
}

/// Check every parameter, reporting all violations.
pub fn validate_params(params: &HvsrParams) -> ValidationResult<()> {
    validate_params_in(params, "")
}

/// Like [`validate_params`], with every parameter path prefixed by `prefix`.
pub fn validate_params_in(params: &HvsrParams, prefix: &str) -> ValidationResult<()> {
    let mut c = Collector::with_prefix(prefix);
    noise(&mut c, &params.noise);
    psd(&mut c, &params.psd);
    process(&mut c, &params.process);
    peaks(&mut c, &params.peaks);
    calibration(&mut c, params.calibration.as_ref());
    c.finish()
}

/// Check that site names are present and unique.
pub fn validate_site_names<'a>(names: impl IntoIterator<Item = &'a str>) -> ValidationResult<()> {
    let mut c = Collector::default();
    let mut seen = HashSet::new();
    let mut count = 0;
    for (i, name) in names.into_iter().enumerate() {
        count += 1;
        if name.trim().is_empty() {
            c.push(ValidationError::EmptySiteName(i + 1));
        } else if !seen.insert(name) {
            c.push(ValidationError::DuplicateSite(name.to_string()));
        }
    }
    if count == 0 {
        c.push(ValidationError::NoSites);
    }
    c.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprit_core::{FreqSmoothing, OutlierRule, RmseThreshold};

    #[test]
    fn defaults_pass() {
        validate_params(&HvsrParams::default()).unwrap();
    }

    #[test]
    fn single_violation_is_not_wrapped() {
        let mut p = HvsrParams::default();
        p.psd.overlap = 1.0;
        let err = validate_params(&p).unwrap_err();
        assert!(
            matches!(err, ValidationError::Invalid { ref param, .. } if param == "psd.overlap"),
            "{err:?}"
        );
    }

    #[test]
    fn every_violation_is_reported() {
        let mut p = HvsrParams::default();
        p.noise.sat_percent = 150.0;
        p.noise.stalta_thresh = [5.0, 0.5];
        p.process.resample = Some(1);
        p.process.freq_smoothing = FreqSmoothing::KonnoOhmachi { bandwidth: 0.0 };
        p.process.outlier = OutlierRule::Rmse {
            threshold: RmseThreshold::Percentile(0.0),
            reference: Default::default(),
            source: Default::default(),
        };
        p.peaks.hvsr_band = [0.0, 40.0];
        p.calibration = Some(DepthModel::QuarterWavelength { vs: -1.0 });
        let err = validate_params(&p).unwrap_err();
        let params: Vec<String> = err
            .errors()
            .iter()
            .filter_map(|e| match e {
                ValidationError::Invalid { param, .. } => Some(param.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            params,
            vec![
                "noise.sat_percent",
                "noise.stalta_thresh",
                "process.resample",
                "process.freq_smoothing.bandwidth",
                "process.outlier.threshold",
                "peaks.hvsr_band",
                "calibration.vs",
            ]
        );
        assert!(err.to_string().starts_with("multiple validation errors"));
    }

    #[test]
    fn percent_inputs_are_accepted() {
        let mut p = HvsrParams::default();
        p.noise.sat_percent = 99.5;
        p.noise.noise_percent = 80.0;
        validate_params(&p).unwrap();
    }

    #[test]
    fn prefix_is_applied() {
        let mut p = HvsrParams::default();
        p.noise.sta = 0.0;
        let err = validate_params_in(&p, "sites.KS-01").unwrap_err();
        assert!(err.to_string().contains("sites.KS-01.noise.sta"), "{err}");
    }

    #[test]
    fn site_names_must_be_unique_and_present() {
        validate_site_names(["a", "b"]).unwrap();
        let err = validate_site_names(["a", "", "a"]).unwrap_err();
        assert_eq!(
            err.errors(),
            vec![
                &ValidationError::EmptySiteName(2),
                &ValidationError::DuplicateSite("a".into())
            ]
        );
        assert_eq!(
            validate_site_names(std::iter::empty()).unwrap_err(),
            ValidationError::NoSites
        );
    }
}
