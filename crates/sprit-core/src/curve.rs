//! Time-averaged H/V curve and its envelopes.

use crate::combine::{CombinationMethod, hvsr_curve};
use crate::error::{HvsrError, Result};
use crate::peaks::find_peaks;
use crate::signal::{Component, ThreeComponent};
use crate::stats::{column_reduce, nanmean, nanstd};
use crate::table::WindowTable;
use serde::{Deserialize, Serialize};

/// Which ±1 standard deviation curves the peak-stability test compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// `hvsr * exp(log_std)` and `hvsr / exp(log_std)`.
    #[default]
    Log,
    /// `hvsr + std_dev` and `hvsr - std_dev`.
    Arithmetic,
}

/// Aggregate statistics over the windows still in use.
///
/// Every H/V vector here is aligned to [`freqs`](Self::freqs), the left edge
/// of each bin pair of the table axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateCurve {
    /// H/V frequencies in Hz.
    pub freqs: Vec<f64>,
    /// Time-averaged PSD per component, on the full table axis.
    pub psd_mean: ThreeComponent<Vec<f64>>,
    /// Standard deviation of the PSD across windows per component.
    pub psd_std: ThreeComponent<Vec<f64>>,
    /// H/V ratio of the time-averaged PSDs.
    pub hvsr: Vec<f64>,
    /// Standard deviation of the per-window H/V curves.
    pub std_dev: Vec<f64>,
    /// Standard deviation of `log10` of the per-window H/V curves.
    pub log_std: Vec<f64>,
    /// `hvsr + std_dev`.
    pub hvsr_plus: Vec<f64>,
    /// `hvsr - std_dev`.
    pub hvsr_minus: Vec<f64>,
    /// `hvsr * exp(log_std)`.
    pub hvsr_log_plus: Vec<f64>,
    /// `hvsr / exp(log_std)`.
    pub hvsr_log_minus: Vec<f64>,
    /// Minimum amplitude of a candidate peak on `hvsr`.
    pub water_level: f64,
    /// `water_level + std_dev`.
    pub water_level_plus: Vec<f64>,
    /// `water_level - std_dev`.
    pub water_level_minus: Vec<f64>,
    /// Local maxima of `hvsr`.
    pub peak_indices: Vec<usize>,
    /// Frequencies of `peak_indices`.
    pub peak_freqs: Vec<f64>,
    /// Number of windows that contributed.
    pub num_windows_used: usize,
    /// Analysis window length in seconds.
    pub window_length: f64,
}

impl AggregateCurve {
    /// Build the aggregate from the used rows of a combined table.
    ///
    /// Per-window H/V curves must already be filled in.
    pub fn from_table(
        table: &WindowTable,
        method: CombinationMethod,
        water_level: f64,
    ) -> Result<Self> {
        let used: Vec<_> = table.used_rows().collect();
        if used.is_empty() {
            return Err(HvsrError::InsufficientData(
                "no analysis windows left in use".into(),
            ));
        }
        if used.iter().any(|r| r.hv_curve.is_empty()) {
            return Err(HvsrError::InsufficientData(
                "per-window H/V curves have not been computed".into(),
            ));
        }

        let psd_stat = |c: Component, reduce: fn(&[f64]) -> f64| {
            let curves: Vec<&[f64]> = used.iter().map(|r| r.psd[c].as_slice()).collect();
            column_reduce(&curves, reduce)
        };
        let psd_mean = ThreeComponent::from_fn(|c| psd_stat(c, nanmean));
        let psd_std = ThreeComponent::from_fn(|c| psd_stat(c, nanstd));

        let freqs = table.axis().freqs();
        let hvsr = hvsr_curve(freqs, psd_mean.each_ref().map(Vec::as_slice), method)?;

        let hv_curves: Vec<&[f64]> = used.iter().map(|r| r.hv_curve.as_slice()).collect();
        let std_dev = column_reduce(&hv_curves, nanstd);
        let log_curves: Vec<Vec<f64>> = hv_curves
            .iter()
            .map(|c| c.iter().map(|v| v.log10()).collect())
            .collect();
        let log_refs: Vec<&[f64]> = log_curves.iter().map(Vec::as_slice).collect();
        let log_std = column_reduce(&log_refs, nanstd);

        let zip = |a: &[f64], b: &[f64], f: fn(f64, f64) -> f64| -> Vec<f64> {
            a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
        };
        let hvsr_plus = zip(&hvsr, &std_dev, |h, s| h + s);
        let hvsr_minus = zip(&hvsr, &std_dev, |h, s| h - s);
        let hvsr_log_plus = zip(&hvsr, &log_std, |h, s| h * s.exp());
        let hvsr_log_minus = zip(&hvsr, &log_std, |h, s| h / s.exp());
        let water_level_plus = std_dev.iter().map(|s| water_level + s).collect();
        let water_level_minus = std_dev.iter().map(|s| water_level - s).collect();

        let hv_freqs = table.axis().hv_freqs().to_vec();
        let peak_indices = find_peaks(&hvsr);
        let peak_freqs = peak_indices.iter().map(|&i| hv_freqs[i]).collect();

        tracing::debug!(
            windows = used.len(),
            peaks = peak_indices.len(),
            "aggregate H/V curve"
        );

        Ok(Self {
            freqs: hv_freqs,
            psd_mean,
            psd_std,
            hvsr,
            std_dev,
            log_std,
            hvsr_plus,
            hvsr_minus,
            hvsr_log_plus,
            hvsr_log_minus,
            water_level,
            water_level_plus,
            water_level_minus,
            peak_indices,
            peak_freqs,
            num_windows_used: used.len(),
            window_length: table.window_length,
        })
    }

    /// `(minus, plus)` curves of the chosen envelope.
    pub fn envelope(&self, envelope: Envelope) -> (&[f64], &[f64]) {
        match envelope {
            Envelope::Log => (&self.hvsr_log_minus, &self.hvsr_log_plus),
            Envelope::Arithmetic => (&self.hvsr_minus, &self.hvsr_plus),
        }
    }
}

/// Fill `peak_indices` and `peak_freqs` on every row from its H/V curve.
pub fn annotate_window_peaks(table: &mut WindowTable) {
    let hv_freqs = table.axis().hv_freqs().to_vec();
    for row in table.rows_mut() {
        row.peak_indices = find_peaks(&row.hv_curve);
        row.peak_freqs = row.peak_indices.iter().map(|&i| hv_freqs[i]).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::combine_table;
    use crate::table::{FrequencyAxis, WindowRow};

    fn table(rows: Vec<ThreeComponent<Vec<f64>>>) -> WindowTable {
        let n = rows[0].z.len();
        let axis = FrequencyAxis::from_freqs((1..=n).map(|i| i as f64).collect()).unwrap();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, psd)| WindowRow::new(i as f64 * 60.0, (i + 1) as f64 * 60.0, psd, true))
            .collect();
        WindowTable::new(0.0, 60.0, axis, rows).unwrap()
    }

    #[test]
    fn identical_windows_have_zero_spread() {
        let psd = ThreeComponent::new(vec![-120.0; 8], vec![-110.0; 8], vec![-110.0; 8]);
        let mut t = table(vec![psd; 5]);
        combine_table(&mut t, CombinationMethod::GeometricMean).unwrap();
        let agg = AggregateCurve::from_table(&t, CombinationMethod::GeometricMean, 1.8).unwrap();
        assert_eq!(agg.hvsr.len(), 7);
        assert_eq!(agg.freqs.len(), 7);
        assert!(agg.std_dev.iter().all(|&s| s == 0.0));
        assert!(agg.log_std.iter().all(|&s| s == 0.0));
        assert_eq!(agg.hvsr_log_plus, agg.hvsr);
        assert_eq!(agg.water_level_plus, vec![1.8; 7]);
        assert_eq!(agg.num_windows_used, 5);
    }

    #[test]
    fn excluded_windows_do_not_contribute() {
        let quiet = ThreeComponent::new(vec![-120.0; 6], vec![-110.0; 6], vec![-110.0; 6]);
        let loud = ThreeComponent::new(vec![-120.0; 6], vec![-60.0; 6], vec![-60.0; 6]);
        let mut t = table(vec![quiet.clone(), loud, quiet]);
        t.exclude(1);
        combine_table(&mut t, CombinationMethod::GeometricMean).unwrap();
        let agg = AggregateCurve::from_table(&t, CombinationMethod::GeometricMean, 1.8).unwrap();
        assert_eq!(agg.num_windows_used, 2);
        for v in &agg.hvsr {
            assert!((v - 10f64.sqrt()).abs() < 1e-9);
        }
    }

    #[test]
    fn no_used_windows_is_an_error() {
        let psd = ThreeComponent::new(vec![-120.0; 4], vec![-110.0; 4], vec![-110.0; 4]);
        let mut t = table(vec![psd]);
        combine_table(&mut t, CombinationMethod::GeometricMean).unwrap();
        t.exclude(0);
        assert!(matches!(
            AggregateCurve::from_table(&t, CombinationMethod::GeometricMean, 1.8),
            Err(HvsrError::InsufficientData(_))
        ));
    }

    #[test]
    fn window_peaks_follow_curves() {
        let mut n = vec![-110.0; 7];
        n[3] = -90.0;
        let psd = ThreeComponent::new(vec![-120.0; 7], n.clone(), n);
        let mut t = table(vec![psd]);
        combine_table(&mut t, CombinationMethod::GeometricMean).unwrap();
        annotate_window_peaks(&mut t);
        let row = &t.rows()[0];
        assert_eq!(row.peak_indices.len(), row.peak_freqs.len());
        assert!(!row.peak_indices.is_empty());
        for &i in &row.peak_indices {
            assert!(i > 0 && i < row.hv_curve.len() - 1);
        }
    }

    #[test]
    fn envelope_selects_curves() {
        let psd = ThreeComponent::new(vec![-120.0; 4], vec![-110.0; 4], vec![-100.0; 4]);
        let psd2 = ThreeComponent::new(vec![-121.0; 4], vec![-111.0; 4], vec![-99.0; 4]);
        let mut t = table(vec![psd, psd2]);
        combine_table(&mut t, CombinationMethod::ArithmeticMean).unwrap();
        let agg = AggregateCurve::from_table(&t, CombinationMethod::ArithmeticMean, 1.8).unwrap();
        let (lo, hi) = agg.envelope(Envelope::Log);
        assert_eq!(hi, agg.hvsr_log_plus.as_slice());
        assert!(lo.iter().zip(hi).all(|(l, h)| l <= h));
        let (lo, _) = agg.envelope(Envelope::Arithmetic);
        assert_eq!(lo, agg.hvsr_minus.as_slice());
    }
}
