//! Single-site HVSR pipeline.
//!
//! Stages run in a fixed order: noise curation, PSD aggregation, PSD
//! outlier screening, resampling and smoothing, H/V combination, outlier
//! rejection, aggregation and peak grading. Each stage takes ownership of the
//! window table only long enough to mutate it; the finished table and every
//! derived curve end up in [`HvsrResult`].

use crate::calibration::DepthModel;
use crate::combine::{CombinationMethod, combine_table};
use crate::curve::{AggregateCurve, Envelope, annotate_window_peaks};
use crate::error::{HvsrError, Result, Stage};
use crate::noise::{NoiseParams, curate};
use crate::outlier::{OutlierRule, reject_outliers};
use crate::psd::{PsdEstimator, PsdParams, WelchEstimator, aggregate};
use crate::report::{SiteMetadata, SummaryRow, text_report};
use crate::response::InstrumentResponse;
use crate::sesame::{Peak, PeakParams, PeakReport, check_peaks};
use crate::signal::{SeismicRecord, ThreeComponent};
use crate::smoothing::{FreqSmoothing, smooth_table};
use crate::table::WindowTable;
use crate::window::{ExclusionSet, TimeWindow};
use serde::{Deserialize, Serialize};

/// Curve processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    /// Horizontal combination method (index 2-6).
    pub method: CombinationMethod,
    /// Resample PSDs onto this many log-period points. `0` in TOML disables.
    #[serde(with = "zero_disables")]
    pub resample: Option<usize>,
    /// Savitzky-Golay window applied while resampling. `0` in TOML disables.
    #[serde(with = "zero_disables")]
    pub savgol_window: Option<usize>,
    /// Frequency smoothing of the PSDs before combination.
    pub freq_smoothing: FreqSmoothing,
    /// Outlier rule applied after combination.
    pub outlier: OutlierRule,
    /// Amplitude-stdev multiplier for screening PSD curves right after
    /// aggregation. `0` in TOML disables.
    #[serde(with = "zero_disables")]
    pub psd_outlier_std: Option<f64>,
    /// Envelope used by the frequency-stability test.
    pub envelope: Envelope,
    /// Log every window dropped as an outlier.
    pub verbose: bool,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            method: CombinationMethod::default(),
            resample: Some(1000),
            savgol_window: Some(51),
            freq_smoothing: FreqSmoothing::default(),
            outlier: OutlierRule::default(),
            psd_outlier_std: Some(3.0),
            envelope: Envelope::default(),
            verbose: false,
        }
    }
}

/// TOML has no null, so optional stages are written as zero when off.
mod zero_disables {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize + Default,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => T::default().serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de> + Default + PartialEq,
        D: Deserializer<'de>,
    {
        let v = T::deserialize(deserializer)?;
        Ok((v != T::default()).then_some(v))
    }
}

impl ProcessParams {
    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.resample {
            if n < 2 {
                return Err(HvsrError::invalid(
                    "process.resample",
                    format!("need at least 2 points, got {n}"),
                ));
            }
        }
        if self.savgol_window == Some(0) {
            return Err(HvsrError::invalid(
                "process.savgol_window",
                "must be positive",
            ));
        }
        if let Some(k) = self.psd_outlier_std {
            if !(k > 0.0) {
                return Err(HvsrError::invalid(
                    "process.psd_outlier_std",
                    format!("must be positive, got {k}"),
                ));
            }
        }
        self.freq_smoothing.validate()?;
        self.outlier.validate()
    }
}

/// Every parameter of a site run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HvsrParams {
    /// Noise curation.
    pub noise: NoiseParams,
    /// PSD estimation.
    pub psd: PsdParams,
    /// Curve processing.
    pub process: ProcessParams,
    /// Peak search and grading.
    pub peaks: PeakParams,
    /// Depth model applied to the best peak; no depth without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<DepthModel>,
}

impl HvsrParams {
    /// Validate every group, failing on the first problem.
    pub fn validate(&self) -> Result<()> {
        self.noise.validate()?;
        self.psd.validate()?;
        self.process.validate()?;
        self.peaks.validate()?;
        match &self.calibration {
            Some(model) => model.validate(),
            None => Ok(()),
        }
    }
}

/// Completion flag per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// Parameters validated.
    pub params: bool,
    /// Waveform and responses available.
    pub fetch_data: bool,
    /// Noise curation done.
    pub remove_noise: bool,
    /// PSDs estimated.
    pub generate_psds: bool,
    /// Outlier rejection done.
    pub remove_outliers: bool,
    /// Curves processed and combined.
    pub process_hvsr: bool,
    /// Peaks graded.
    pub check_peaks: bool,
    /// Every stage completed.
    pub overall: bool,
}

impl ProcessingStatus {
    /// Status of a run that completed every stage.
    pub fn completed() -> Self {
        let mut status = Self::default();
        for stage in Stage::ALL {
            status.set(stage, true);
        }
        status.overall = true;
        status
    }

    /// Status of a run that failed at `stage`: every earlier stage is done.
    pub fn failed_at(stage: Stage) -> Self {
        let mut status = Self::default();
        for s in Stage::ALL.into_iter().take_while(|&s| s != stage) {
            status.set(s, true);
        }
        status
    }

    /// Flag of one stage.
    pub fn get(&self, stage: Stage) -> bool {
        match stage {
            Stage::Params => self.params,
            Stage::FetchData => self.fetch_data,
            Stage::RemoveNoise => self.remove_noise,
            Stage::GeneratePsds => self.generate_psds,
            Stage::RemoveOutliers => self.remove_outliers,
            Stage::ProcessHvsr => self.process_hvsr,
            Stage::CheckPeaks => self.check_peaks,
        }
    }

    fn set(&mut self, stage: Stage, done: bool) {
        let flag = match stage {
            Stage::Params => &mut self.params,
            Stage::FetchData => &mut self.fetch_data,
            Stage::RemoveNoise => &mut self.remove_noise,
            Stage::GeneratePsds => &mut self.generate_psds,
            Stage::RemoveOutliers => &mut self.remove_outliers,
            Stage::ProcessHvsr => &mut self.process_hvsr,
            Stage::CheckPeaks => &mut self.check_peaks,
        };
        *flag = done;
    }

    /// First stage that did not complete.
    pub fn failed_stage(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|&s| !self.get(s))
    }
}

/// Everything needed to process one site.
#[derive(Debug, Clone)]
pub struct SiteInput {
    /// Site description.
    pub metadata: SiteMetadata,
    /// Three-component recording.
    pub record: SeismicRecord,
    /// Instrument response per component.
    pub responses: ThreeComponent<InstrumentResponse>,
    /// Operator-selected exclusion windows, in seconds from the record start.
    pub manual_windows: Vec<TimeWindow>,
}

impl SiteInput {
    /// Input with flat responses and no manual windows.
    pub fn new(metadata: SiteMetadata, record: SeismicRecord) -> Self {
        Self {
            metadata,
            record,
            responses: ThreeComponent::default(),
            manual_windows: Vec::new(),
        }
    }
}

/// Output of a successful site run.
#[derive(Debug, Clone, Serialize)]
pub struct HvsrResult {
    /// Site description.
    pub metadata: SiteMetadata,
    /// Combination method used.
    pub method: CombinationMethod,
    /// Merged exclusion windows.
    pub exclusions: ExclusionSet,
    /// Per-window data with final `use` flags.
    pub table: WindowTable,
    /// Aggregate curve and envelopes.
    pub curve: AggregateCurve,
    /// Graded peaks.
    pub peaks: PeakReport,
    /// Depth to bedrock from the best peak, when a depth model is set.
    pub depth: Option<f64>,
    /// Stage flags.
    pub status: ProcessingStatus,
}

impl HvsrResult {
    /// Best peak, if any.
    pub fn best_peak(&self) -> Option<&Peak> {
        self.peaks.best_peak()
    }

    /// Row for the batch summary table.
    pub fn summary_row(&self) -> SummaryRow {
        SummaryRow {
            depth: self.depth,
            ..SummaryRow::from_report(self.metadata.clone(), &self.peaks)
        }
    }

    /// Human-readable report.
    pub fn text_report(&self) -> String {
        let mut report = text_report(&self.metadata, &self.curve, &self.peaks, self.table.len());
        if let Some(depth) = self.depth {
            report.push_str(&format!("\nEstimated depth to bedrock: {depth:.1} m\n"));
        }
        report
    }
}

/// Process one site with the default Welch estimator.
pub fn process_site(input: &SiteInput, params: &HvsrParams) -> Result<HvsrResult> {
    process_site_with(input, params, &WelchEstimator)
}

/// Process one site.
///
/// Any failure is wrapped in [`HvsrError::Site`] naming the site and stage.
pub fn process_site_with(
    input: &SiteInput,
    params: &HvsrParams,
    estimator: &dyn PsdEstimator,
) -> Result<HvsrResult> {
    let site = input.metadata.site.as_str();
    let at = |stage: Stage| move |e: HvsrError| e.at(site, stage);

    params.validate().map_err(at(Stage::Params))?;
    for (_, response) in input.responses.iter() {
        response.validate().map_err(at(Stage::FetchData))?;
    }

    let curation = curate(&input.record, &params.noise, &input.manual_windows)
        .map_err(at(Stage::RemoveNoise))?;

    let mut table = aggregate(
        &curation.record,
        &input.responses,
        &params.psd,
        &curation.exclusions,
        estimator,
    )
    .map_err(at(Stage::GeneratePsds))?;

    let process = &params.process;
    if let Some(k) = process.psd_outlier_std {
        reject_outliers(&mut table, &OutlierRule::psd_std(k), process.verbose)
            .map_err(at(Stage::RemoveOutliers))?;
    }

    prepare_curves(&mut table, process).map_err(at(Stage::ProcessHvsr))?;

    reject_outliers(&mut table, &process.outlier, process.verbose)
        .map_err(at(Stage::RemoveOutliers))?;

    annotate_window_peaks(&mut table);
    let curve = AggregateCurve::from_table(&table, process.method, params.peaks.peak_water_level)
        .map_err(at(Stage::ProcessHvsr))?;

    let peaks = check_peaks(&curve, &table, &params.peaks, process.envelope)
        .map_err(at(Stage::CheckPeaks))?;

    let depth = match (&params.calibration, peaks.best_peak()) {
        (Some(model), Some(best)) => model.depth(best.f0),
        _ => None,
    };

    tracing::info!(
        site,
        windows = table.len(),
        used = table.num_used(),
        best_f0 = peaks.best_peak().map(|p| p.f0),
        depth,
        "site processed"
    );

    Ok(HvsrResult {
        metadata: input.metadata.clone(),
        method: process.method,
        exclusions: curation.exclusions,
        table,
        curve,
        peaks,
        depth,
        status: ProcessingStatus::completed(),
    })
}

/// Resample, smooth and combine every window.
fn prepare_curves(table: &mut WindowTable, process: &ProcessParams) -> Result<()> {
    if let Some(n) = process.resample {
        table.resample(n, process.savgol_window)?;
    }
    smooth_table(table, &process.freq_smoothing)?;
    table.validate_axis()?;
    combine_table(table, process.method)
}
