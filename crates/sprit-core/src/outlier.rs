//! Outlier window rejection.
//!
//! Rules only ever clear the `use` flag. Rows already out of use are not
//! considered when building the reference statistics.

use crate::error::{HvsrError, Result};
use crate::signal::Component;
use crate::stats::{column_reduce, nanmean, nanmedian, nanstd, percentile};
use crate::table::WindowTable;
use serde::{Deserialize, Serialize};

/// Which curves an outlier rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveSource {
    /// Per-component PSD curves; a window is dropped if any component is an outlier.
    #[default]
    Psd,
    /// Per-window H/V curves.
    Hvsr,
}

/// Reference curve for RMSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// Column-wise median.
    #[default]
    Median,
    /// Column-wise mean.
    Mean,
}

/// RMSE cut-off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RmseThreshold {
    /// Percentile of the observed RMSE values. Values below 1 are fractions.
    Percentile(f64),
    /// Absolute RMSE value.
    Value(f64),
}

impl Default for RmseThreshold {
    fn default() -> Self {
        RmseThreshold::Percentile(98.0)
    }
}

impl RmseThreshold {
    /// Percentile in `[0, 100]`, if this is a percentile threshold.
    pub fn percentile(self) -> Option<f64> {
        match self {
            RmseThreshold::Percentile(q) if q < 1.0 => Some(q * 100.0),
            RmseThreshold::Percentile(q) => Some(q),
            RmseThreshold::Value(_) => None,
        }
    }
}

/// Outlier rejection rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum OutlierRule {
    /// Keep every window.
    None,
    /// Drop curves whose RMSE against the reference curve exceeds the threshold.
    Rmse {
        /// Cut-off.
        #[serde(default)]
        threshold: RmseThreshold,
        /// Reference curve.
        #[serde(default)]
        reference: Reference,
        /// Curves to inspect.
        #[serde(default)]
        source: CurveSource,
    },
    /// Drop curves whose mean amplitude lies more than `multiplier`
    /// standard deviations from the mean of all curve means.
    AmplitudeStd {
        /// Standard-deviation multiplier.
        multiplier: f64,
        /// Curves to inspect.
        #[serde(default)]
        source: CurveSource,
    },
}

impl Default for OutlierRule {
    fn default() -> Self {
        OutlierRule::Rmse {
            threshold: RmseThreshold::default(),
            reference: Reference::default(),
            source: CurveSource::default(),
        }
    }
}

impl OutlierRule {
    /// Amplitude-stdev rule on per-window H/V curves with the usual
    /// multiplier of 1.75.
    pub fn hv_curve_std() -> Self {
        OutlierRule::AmplitudeStd {
            multiplier: 1.75,
            source: CurveSource::Hvsr,
        }
    }

    /// Amplitude-stdev rule on PSD curves.
    pub fn psd_std(multiplier: f64) -> Self {
        OutlierRule::AmplitudeStd {
            multiplier,
            source: CurveSource::Psd,
        }
    }

    /// Curves the rule inspects, or `None` for [`OutlierRule::None`].
    pub fn source(&self) -> Option<CurveSource> {
        match *self {
            OutlierRule::None => None,
            OutlierRule::Rmse { source, .. } | OutlierRule::AmplitudeStd { source, .. } => {
                Some(source)
            }
        }
    }

    /// Reject out-of-range thresholds.
    pub fn validate(&self) -> Result<()> {
        match *self {
            OutlierRule::Rmse { threshold, .. } => match threshold {
                RmseThreshold::Percentile(_) => {
                    let q = threshold.percentile().unwrap_or(f64::NAN);
                    if !(q > 0.0 && q <= 100.0) {
                        return Err(HvsrError::invalid(
                            "process.outlier.threshold",
                            format!("percentile must be in (0, 100], got {q}"),
                        ));
                    }
                    Ok(())
                }
                RmseThreshold::Value(v) if !(v >= 0.0) => Err(HvsrError::invalid(
                    "process.outlier.threshold",
                    format!("RMSE value must be non-negative, got {v}"),
                )),
                RmseThreshold::Value(_) => Ok(()),
            },
            OutlierRule::AmplitudeStd { multiplier, .. } if !(multiplier > 0.0) => {
                Err(HvsrError::invalid(
                    "process.outlier.multiplier",
                    format!("must be positive, got {multiplier}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Root-mean-square error of one curve against a reference, ignoring NaN bins.
pub fn rmse(curve: &[f64], reference: &[f64]) -> f64 {
    let sq: Vec<f64> = curve
        .iter()
        .zip(reference)
        .map(|(c, r)| (c - r) * (c - r))
        .collect();
    nanmean(&sq).sqrt()
}

/// Flags curves whose RMSE against the reference curve exceeds the threshold.
pub fn rmse_outliers(
    curves: &[&[f64]],
    threshold: RmseThreshold,
    reference: Reference,
) -> Vec<bool> {
    if curves.len() < 2 {
        return vec![false; curves.len()];
    }
    let reference_curve = match reference {
        Reference::Median => column_reduce(curves, nanmedian),
        Reference::Mean => column_reduce(curves, nanmean),
    };
    let errors: Vec<f64> = curves.iter().map(|c| rmse(c, &reference_curve)).collect();
    let cutoff = match threshold {
        RmseThreshold::Value(v) => v,
        RmseThreshold::Percentile(_) => {
            percentile(&errors, threshold.percentile().unwrap_or(100.0))
        }
    };
    errors.iter().map(|&e| e > cutoff).collect()
}

/// Flags curves whose mean lies outside `mean ± multiplier * std` of all
/// curve means.
pub fn amplitude_std_outliers(curves: &[&[f64]], multiplier: f64) -> Vec<bool> {
    let means: Vec<f64> = curves.iter().map(|c| nanmean(c)).collect();
    let total = nanmean(&means);
    let spread = nanstd(&means) * multiplier;
    means
        .iter()
        .map(|&m| m > total + spread || m < total - spread)
        .collect()
}

fn flag_curves(curves: &[&[f64]], rule: &OutlierRule) -> Vec<bool> {
    match *rule {
        OutlierRule::None => vec![false; curves.len()],
        OutlierRule::Rmse {
            threshold,
            reference,
            ..
        } => rmse_outliers(curves, threshold, reference),
        OutlierRule::AmplitudeStd { multiplier, .. } => amplitude_std_outliers(curves, multiplier),
    }
}

/// Apply `rule` to the rows still in use, excluding the outliers.
///
/// Returns the indices of the newly excluded rows. With `verbose`, the start
/// time of each one is logged.
pub fn reject_outliers(
    table: &mut WindowTable,
    rule: &OutlierRule,
    verbose: bool,
) -> Result<Vec<usize>> {
    rule.validate()?;
    let Some(source) = rule.source() else {
        return Ok(Vec::new());
    };

    let used = table.used_indices();
    let mut flagged = vec![false; used.len()];
    match source {
        CurveSource::Psd => {
            for c in Component::ALL {
                let curves: Vec<&[f64]> = used
                    .iter()
                    .map(|&i| table.rows()[i].psd[c].as_slice())
                    .collect();
                for (f, hit) in flagged.iter_mut().zip(flag_curves(&curves, rule)) {
                    *f |= hit;
                }
            }
        }
        CurveSource::Hvsr => {
            let curves: Vec<&[f64]> = used
                .iter()
                .map(|&i| table.rows()[i].hv_curve.as_slice())
                .collect();
            if curves.iter().any(|c| c.is_empty()) {
                return Err(HvsrError::InsufficientData(
                    "H/V curves must be computed before H/V outlier rejection".into(),
                ));
            }
            flagged = flag_curves(&curves, rule);
        }
    }

    let removed: Vec<usize> = used
        .iter()
        .zip(&flagged)
        .filter(|&(_, &hit)| hit)
        .map(|(&i, _)| i)
        .collect();
    for &i in &removed {
        table.exclude(i);
        if verbose {
            tracing::info!(
                window = i,
                start = table.absolute_start(i),
                offset_s = table.rows()[i].start,
                "excluded outlier window"
            );
        }
    }
    tracing::debug!(
        ?rule,
        removed = removed.len(),
        remaining = table.num_used(),
        "outlier rejection"
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ThreeComponent;
    use crate::table::{FrequencyAxis, WindowRow};

    fn table_with(levels: &[f64]) -> WindowTable {
        let axis = FrequencyAxis::from_freqs(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let rows = levels
            .iter()
            .enumerate()
            .map(|(i, &l)| {
                let v = vec![l; 4];
                let psd = ThreeComponent::new(v.clone(), v.clone(), v);
                WindowRow::new(i as f64 * 60.0, i as f64 * 60.0 + 60.0, psd, true)
            })
            .collect();
        WindowTable::new(1000.0, 60.0, axis, rows).unwrap()
    }

    #[test]
    fn percentile_fraction_is_scaled() {
        assert_eq!(RmseThreshold::Percentile(0.98).percentile(), Some(98.0));
        assert_eq!(RmseThreshold::Percentile(95.0).percentile(), Some(95.0));
        assert_eq!(RmseThreshold::Value(1.0).percentile(), None);
    }

    #[test]
    fn rmse_against_constant_reference() {
        assert!((rmse(&[1.0, 3.0], &[2.0, 2.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rmse_rule_drops_aberrant_curve() {
        let mut levels = vec![-100.0; 20];
        levels[7] = -60.0;
        let mut table = table_with(&levels);
        let rule = OutlierRule::Rmse {
            threshold: RmseThreshold::Value(5.0),
            reference: Reference::Median,
            source: CurveSource::Psd,
        };
        let removed = reject_outliers(&mut table, &rule, true).unwrap();
        assert_eq!(removed, vec![7]);
        assert_eq!(table.num_used(), 19);
    }

    #[test]
    fn percentile_threshold_keeps_values_at_cutoff() {
        let flat = [0.0_f64; 3];
        let shifted: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64; 3]).collect();
        let mut curves: Vec<&[f64]> = shifted.iter().map(Vec::as_slice).collect();
        curves.push(&flat);
        // rmse vs median (2.0 with 0 counted twice: median of 0,0,1,2,3,4 = 1.5)
        let flags = rmse_outliers(&curves, RmseThreshold::Percentile(100.0), Reference::Median);
        assert!(flags.iter().all(|f| !f));
    }

    #[test]
    fn excluded_rows_are_ignored_and_stay_excluded() {
        let mut levels = vec![-100.0; 10];
        levels[3] = -10.0;
        let mut table = table_with(&levels);
        table.exclude(3);
        let rule = OutlierRule::AmplitudeStd {
            multiplier: 3.0,
            source: CurveSource::Psd,
        };
        let removed = reject_outliers(&mut table, &rule, false).unwrap();
        assert!(removed.is_empty());
        assert!(!table.rows()[3].in_use());
    }

    #[test]
    fn amplitude_std_rule_flags_far_means() {
        let a = [1.0, 1.0];
        let b = [1.1, 1.1];
        let c = [0.9, 0.9];
        let d = [10.0, 10.0];
        let curves: Vec<&[f64]> = vec![&a, &b, &c, &a, &b, &c, &a, &b, &c, &d];
        let flags = amplitude_std_outliers(&curves, 2.0);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert!(flags[9]);
    }

    #[test]
    fn hvsr_source_requires_curves() {
        let mut table = table_with(&[-100.0, -101.0]);
        let rule = OutlierRule::Rmse {
            threshold: RmseThreshold::default(),
            reference: Reference::Mean,
            source: CurveSource::Hvsr,
        };
        assert!(reject_outliers(&mut table, &rule, false).is_err());
    }

    #[test]
    fn rule_parses_from_toml() {
        let rule: OutlierRule = toml::from_str(
            r#"
            rule = "rmse"
            threshold = { percentile = 95.0 }
            source = "hvsr"
            "#,
        )
        .unwrap();
        assert_eq!(
            rule,
            OutlierRule::Rmse {
                threshold: RmseThreshold::Percentile(95.0),
                reference: Reference::Median,
                source: CurveSource::Hvsr,
            }
        );
    }
}
