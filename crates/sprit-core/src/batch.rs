//! Sequential multi-site processing.
//!
//! Sites share nothing. A failure in one site, including a loader failure
//! or a panic, is recorded in that site's outcome and the loop moves on.

use crate::error::{HvsrError, Result, Stage};
use crate::pipeline::{HvsrParams, HvsrResult, ProcessingStatus, SiteInput, process_site_with};
use crate::psd::{PsdEstimator, WelchEstimator};
use crate::report::{SiteMetadata, SummaryRow};
use crate::response::InstrumentResponse;
use crate::signal::{SeismicRecord, ThreeComponent};
use crate::window::TimeWindow;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Waveform and, if the source carries it, instrument response of one site.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Three-component recording.
    pub record: SeismicRecord,
    /// Per-component response read alongside the data.
    pub responses: Option<ThreeComponent<InstrumentResponse>>,
}

/// Source of three-component waveforms.
///
/// Implementations report failures as [`HvsrError::Load`]; the batch runner
/// adds the site and stage.
pub trait WaveformLoader {
    /// Description of where one site's data lives (a path, a query, ...).
    type Source;

    /// Load one site.
    fn load(&self, source: &Self::Source) -> Result<Waveform>;
}

/// One site of a batch.
#[derive(Debug, Clone)]
pub struct BatchSite<S> {
    /// Site description.
    pub metadata: SiteMetadata,
    /// Where to load the waveform from.
    pub source: S,
    /// Responses used when the loader does not supply any.
    pub responses: ThreeComponent<InstrumentResponse>,
    /// Operator-selected exclusion windows.
    pub manual_windows: Vec<TimeWindow>,
    /// Per-site parameters replacing the batch defaults.
    pub params: Option<HvsrParams>,
}

impl<S> BatchSite<S> {
    /// Site with flat responses, no manual windows and default parameters.
    pub fn new(metadata: SiteMetadata, source: S) -> Self {
        Self {
            metadata,
            source,
            responses: ThreeComponent::default(),
            manual_windows: Vec::new(),
            params: None,
        }
    }
}

/// Result of one site.
#[derive(Debug)]
pub struct SiteOutcome {
    /// Site description.
    pub metadata: SiteMetadata,
    /// Stage flags; `overall` is false for failed sites.
    pub status: ProcessingStatus,
    /// The processed site or the error that stopped it.
    pub result: std::result::Result<HvsrResult, HvsrError>,
}

impl SiteOutcome {
    /// Outcome of a site rejected before it could run, failed at
    /// [`Stage::Params`].
    pub fn rejected(metadata: SiteMetadata, error: HvsrError) -> Self {
        let error = error.at(&metadata.site, Stage::Params);
        Self {
            metadata,
            status: ProcessingStatus::failed_at(Stage::Params),
            result: Err(error),
        }
    }

    /// Whether every stage completed.
    pub fn succeeded(&self) -> bool {
        self.status.overall
    }

    /// Summary row; failed sites get an all-false row.
    pub fn summary_row(&self) -> SummaryRow {
        match &self.result {
            Ok(r) => r.summary_row(),
            Err(_) => SummaryRow::failed(self.metadata.clone()),
        }
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// One entry per input site.
    pub outcomes: Vec<SiteOutcome>,
}

impl BatchResult {
    /// Sites that completed.
    pub fn succeeded(&self) -> impl Iterator<Item = &SiteOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    /// Sites that failed.
    pub fn failed(&self) -> impl Iterator<Item = &SiteOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// `(site, status)` for every site.
    pub fn statuses(&self) -> Vec<(&str, ProcessingStatus)> {
        self.outcomes
            .iter()
            .map(|o| (o.metadata.site.as_str(), o.status))
            .collect()
    }

    /// Summary table rows in input order.
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        self.outcomes.iter().map(SiteOutcome::summary_row).collect()
    }

    /// True if at least one site was given and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded().next().is_none()
    }
}

/// Process every site with the default estimator.
pub fn run_batch<L: WaveformLoader>(
    loader: &L,
    sites: &[BatchSite<L::Source>],
    defaults: &HvsrParams,
    progress: impl FnMut(usize, &SiteOutcome),
) -> BatchResult {
    run_batch_with(loader, sites, defaults, &WelchEstimator, progress)
}

/// Process every site, calling `progress` after each one.
pub fn run_batch_with<L: WaveformLoader>(
    loader: &L,
    sites: &[BatchSite<L::Source>],
    defaults: &HvsrParams,
    estimator: &dyn PsdEstimator,
    mut progress: impl FnMut(usize, &SiteOutcome),
) -> BatchResult {
    let mut outcomes = Vec::with_capacity(sites.len());
    for (i, site) in sites.iter().enumerate() {
        let result = run_site(loader, site, defaults, estimator);
        let status = match &result {
            Ok(r) => r.status,
            Err(e) => {
                tracing::warn!(site = %site.metadata.site, error = %e, "site failed");
                ProcessingStatus::failed_at(e.stage().unwrap_or(Stage::Params))
            }
        };
        let outcome = SiteOutcome {
            metadata: site.metadata.clone(),
            status,
            result,
        };
        progress(i, &outcome);
        outcomes.push(outcome);
    }

    let batch = BatchResult { outcomes };
    tracing::info!(
        sites = sites.len(),
        succeeded = batch.succeeded().count(),
        failed = batch.failed().count(),
        "batch complete"
    );
    batch
}

fn run_site<L: WaveformLoader>(
    loader: &L,
    site: &BatchSite<L::Source>,
    defaults: &HvsrParams,
    estimator: &dyn PsdEstimator,
) -> Result<HvsrResult> {
    let name = site.metadata.site.as_str();
    let params = site.params.as_ref().unwrap_or(defaults);
    params.validate().map_err(|e| e.at(name, Stage::Params))?;
    let waveform = guarded(|| loader.load(&site.source))
        .map_err(|e| e.at(name, Stage::FetchData))?;
    let input = SiteInput {
        metadata: site.metadata.clone(),
        record: waveform.record,
        responses: waveform.responses.unwrap_or_else(|| site.responses.clone()),
        manual_windows: site.manual_windows.clone(),
    };
    // a panic past this point is charged to the first processing stage
    guarded(|| process_site_with(&input, params, estimator))
        .map_err(|e| e.at(name, Stage::RemoveNoise))
}

/// Run `f`, turning a panic into [`HvsrError::Panic`].
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(HvsrError::Panic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
