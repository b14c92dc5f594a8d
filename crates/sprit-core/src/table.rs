//! Per-window record shared by every processing stage.
//!
//! A [`WindowTable`] is created once from the PSD matrices and then mutated
//! in place. Its row count never changes afterwards: stages that want to drop
//! a window call [`WindowRow::exclude`], and nothing can set the flag back.

use crate::error::{HvsrError, Result};
use crate::signal::{Component, ThreeComponent};
use crate::smoothing::savgol_filter;
use crate::stats::{interp, logspace};
use serde::Serialize;

/// Shared, strictly increasing frequency axis with its reciprocal periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyAxis {
    freqs: Vec<f64>,
    periods: Vec<f64>,
}

impl FrequencyAxis {
    /// Build from increasing, positive frequencies.
    pub fn from_freqs(freqs: Vec<f64>) -> Result<Self> {
        if freqs.len() < 2 {
            return Err(HvsrError::InsufficientData(format!(
                "frequency axis needs at least 2 bins, got {}",
                freqs.len()
            )));
        }
        if freqs.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
            return Err(HvsrError::invalid(
                "frequency_axis",
                "frequencies must be finite and positive",
            ));
        }
        if freqs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HvsrError::invalid(
                "frequency_axis",
                "frequencies must be strictly increasing",
            ));
        }
        let periods = freqs.iter().map(|f| 1.0 / f).collect();
        Ok(Self { freqs, periods })
    }

    /// Frequencies in Hz, increasing.
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Periods in seconds, aligned with [`freqs`](Self::freqs) (so decreasing).
    pub fn periods(&self) -> &[f64] {
        &self.periods
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    /// Always false for a constructed axis.
    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Frequencies of an H/V curve built on this axis: the left edge of
    /// each adjacent bin pair.
    pub fn hv_freqs(&self) -> &[f64] {
        &self.freqs[..self.freqs.len() - 1]
    }

    /// Axis of `num` points evenly spaced in log period over the same range.
    pub fn log_resampled(&self, num: usize) -> Result<Self> {
        let (pmin, pmax) = (self.periods[self.len() - 1], self.periods[0]);
        let mut periods = logspace(pmin, pmax, num);
        periods.reverse();
        Self::from_freqs(periods.iter().map(|p| 1.0 / p).collect())
    }
}

/// One analysis time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRow {
    /// Start offset in seconds from the record start.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    /// PSD in dB per component, aligned to the table axis. NaN for gap windows.
    pub psd: ThreeComponent<Vec<f64>>,
    /// H/V curve, one value per [`FrequencyAxis::hv_freqs`] entry.
    pub hv_curve: Vec<f64>,
    /// Local maxima of `hv_curve`.
    pub peak_indices: Vec<usize>,
    /// Frequencies of `peak_indices`.
    pub peak_freqs: Vec<f64>,
    #[serde(rename = "use")]
    in_use: bool,
}

impl WindowRow {
    /// New row.
    pub fn new(start: f64, end: f64, psd: ThreeComponent<Vec<f64>>, in_use: bool) -> Self {
        Self {
            start,
            end,
            psd,
            hv_curve: Vec::new(),
            peak_indices: Vec::new(),
            peak_freqs: Vec::new(),
            in_use,
        }
    }

    /// Whether the window contributes to aggregate statistics.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Drop the window from aggregate statistics. There is no inverse.
    pub fn exclude(&mut self) {
        self.in_use = false;
    }
}

/// All analysis windows of one site on one frequency axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowTable {
    /// Record start in seconds since the Unix epoch.
    pub record_start: f64,
    /// Analysis window length in seconds.
    pub window_length: f64,
    axis: FrequencyAxis,
    rows: Vec<WindowRow>,
}

impl WindowTable {
    /// Build a table, checking that every row is aligned to `axis`.
    pub fn new(
        record_start: f64,
        window_length: f64,
        axis: FrequencyAxis,
        rows: Vec<WindowRow>,
    ) -> Result<Self> {
        let table = Self {
            record_start,
            window_length,
            axis,
            rows,
        };
        table.validate_axis()?;
        Ok(table)
    }

    /// Shared frequency axis.
    pub fn axis(&self) -> &FrequencyAxis {
        &self.axis
    }

    /// All rows, in time order.
    pub fn rows(&self) -> &[WindowRow] {
        &self.rows
    }

    /// Mutable rows. The slice cannot grow or shrink.
    pub fn rows_mut(&mut self) -> &mut [WindowRow] {
        &mut self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with `use = true`.
    pub fn num_used(&self) -> usize {
        self.rows.iter().filter(|r| r.in_use).count()
    }

    /// Indices of rows with `use = true`.
    pub fn used_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.in_use)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows with `use = true`.
    pub fn used_rows(&self) -> impl Iterator<Item = &WindowRow> {
        self.rows.iter().filter(|r| r.in_use)
    }

    /// `use` flags in row order.
    pub fn use_flags(&self) -> Vec<bool> {
        self.rows.iter().map(|r| r.in_use).collect()
    }

    /// Exclude row `index`. Out-of-range indices are ignored.
    pub fn exclude(&mut self, index: usize) {
        if let Some(row) = self.rows.get_mut(index) {
            row.exclude();
        }
    }

    /// Absolute start time of row `index` in seconds since the Unix epoch.
    pub fn absolute_start(&self, index: usize) -> f64 {
        self.record_start + self.rows[index].start
    }

    /// Check every component of every row against the axis length.
    pub fn validate_axis(&self) -> Result<()> {
        let expected = self.axis.len();
        for row in &self.rows {
            for (c, psd) in row.psd.iter() {
                if psd.len() != expected {
                    return Err(HvsrError::AxisMismatch {
                        component: c,
                        expected,
                        found: psd.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reinterpolate every PSD onto `num` points evenly spaced in log period.
    ///
    /// Interpolation is linear in period. When `savgol_window` is set and
    /// shorter than `num`, each resampled curve is then passed through an
    /// order-3 Savitzky-Golay filter.
    pub fn resample(&mut self, num: usize, savgol_window: Option<usize>) -> Result<()> {
        let new_axis = self.axis.log_resampled(num)?;

        // interpolation needs increasing x, so work in ascending period
        let mut xp: Vec<f64> = self.axis.periods().to_vec();
        xp.reverse();
        let mut targets: Vec<f64> = new_axis.periods().to_vec();
        targets.reverse();

        let window = savgol_window.filter(|&w| w > 3 && w < num);
        for row in &mut self.rows {
            for c in Component::ALL {
                let mut fp = std::mem::take(&mut row.psd[c]);
                fp.reverse();
                let mut resampled: Vec<f64> =
                    targets.iter().map(|&p| interp(p, &xp, &fp)).collect();
                if let Some(w) = window {
                    resampled = savgol_filter(&resampled, w, 3);
                }
                resampled.reverse();
                row.psd[c] = resampled;
            }
        }
        self.axis = new_axis;
        tracing::debug!(bins = num, savgol = ?window, "resampled PSDs onto log-period grid");
        self.validate_axis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(bins: usize, rows: usize) -> WindowTable {
        let freqs: Vec<f64> = (1..=bins).map(|i| i as f64).collect();
        let axis = FrequencyAxis::from_freqs(freqs.clone()).unwrap();
        let rows = (0..rows)
            .map(|i| {
                let psd = ThreeComponent::new(freqs.clone(), freqs.clone(), freqs.clone());
                WindowRow::new(i as f64 * 30.0, i as f64 * 30.0 + 60.0, psd, true)
            })
            .collect();
        WindowTable::new(0.0, 60.0, axis, rows).unwrap()
    }

    #[test]
    fn axis_rejects_unsorted_frequencies() {
        assert!(FrequencyAxis::from_freqs(vec![1.0, 3.0, 2.0]).is_err());
        assert!(FrequencyAxis::from_freqs(vec![0.0, 1.0]).is_err());
        assert!(FrequencyAxis::from_freqs(vec![1.0]).is_err());
    }

    #[test]
    fn exclusion_is_one_way() {
        let mut t = table(10, 4);
        t.exclude(2);
        t.exclude(2);
        t.exclude(99);
        assert_eq!(t.use_flags(), vec![true, true, false, true]);
        assert_eq!(t.num_used(), 3);
        assert_eq!(t.used_indices(), vec![0, 1, 3]);
    }

    #[test]
    fn misaligned_row_is_rejected() {
        let axis = FrequencyAxis::from_freqs(vec![1.0, 2.0, 3.0]).unwrap();
        let psd = ThreeComponent::new(vec![0.0; 3], vec![0.0; 2], vec![0.0; 3]);
        let err = WindowTable::new(0.0, 60.0, axis, vec![WindowRow::new(0.0, 60.0, psd, true)])
            .unwrap_err();
        assert!(matches!(
            err,
            HvsrError::AxisMismatch {
                component: Component::N,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn resample_keeps_range_and_aligns_components() {
        let mut t = table(20, 3);
        t.resample(100, None).unwrap();
        assert_eq!(t.axis().len(), 100);
        assert!((t.axis().freqs()[0] - 1.0).abs() < 1e-9);
        assert!((t.axis().freqs()[99] - 20.0).abs() < 1e-9);
        for row in t.rows() {
            assert_eq!(row.psd.z.len(), 100);
            assert_eq!(row.psd.e.len(), 100);
        }
    }

    #[test]
    fn resample_of_constant_curve_stays_constant() {
        let freqs: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let axis = FrequencyAxis::from_freqs(freqs).unwrap();
        let psd = ThreeComponent::new(vec![-120.0; 30], vec![-110.0; 30], vec![-110.0; 30]);
        let rows = vec![WindowRow::new(0.0, 60.0, psd, true)];
        let mut t = WindowTable::new(0.0, 60.0, axis, rows).unwrap();
        t.resample(200, Some(51)).unwrap();
        for v in &t.rows()[0].psd.z {
            assert!((v + 120.0).abs() < 1e-9);
        }
    }
}
