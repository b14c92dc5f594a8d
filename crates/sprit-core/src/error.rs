//! Error types for HVSR processing.

use crate::signal::Component;
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Processing stage of a single-site pipeline run.
///
/// Used to report where a site failed and to derive the per-stage
/// [`ProcessingStatus`](crate::ProcessingStatus) flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Parameter validation before any data is touched.
    Params,
    /// Loading the three-component waveform and instrument response.
    FetchData,
    /// Noise-window curation.
    RemoveNoise,
    /// Per-component PSD estimation and window-table construction.
    GeneratePsds,
    /// Outlier window rejection.
    RemoveOutliers,
    /// Resampling, smoothing and H/V combination.
    ProcessHvsr,
    /// SESAME peak grading.
    CheckPeaks,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 7] = [
        Stage::Params,
        Stage::FetchData,
        Stage::RemoveNoise,
        Stage::GeneratePsds,
        Stage::RemoveOutliers,
        Stage::ProcessHvsr,
        Stage::CheckPeaks,
    ];

    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Params => "parameter validation",
            Stage::FetchData => "fetch data",
            Stage::RemoveNoise => "remove noise",
            Stage::GeneratePsds => "generate PSDs",
            Stage::RemoveOutliers => "remove outlier curves",
            Stage::ProcessHvsr => "process HVSR",
            Stage::CheckPeaks => "check peaks",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by the HVSR processing stages.
#[derive(Debug, Error)]
pub enum HvsrError {
    /// A parameter is out of range or inconsistent with another one.
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        param: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two user-specified exclusion windows overlap.
    #[error("overlapping exclusion windows: {first} ends after {second} starts")]
    OverlappingWindows {
        /// The earlier window.
        first: TimeWindow,
        /// The later window it overlaps.
        second: TimeWindow,
    },

    /// A required component trace is missing or empty.
    #[error("missing {0} component trace")]
    MissingComponent(Component),

    /// Component spectra do not share one frequency axis.
    #[error("frequency axis mismatch on {component}: expected {expected} bins, found {found}")]
    AxisMismatch {
        /// Component whose axis differs.
        component: Component,
        /// Number of bins on the shared axis.
        expected: usize,
        /// Number of bins found.
        found: usize,
    },

    /// Window reconciliation left nothing to analyse.
    #[error("no common analysis windows across components")]
    NoCommonWindows,

    /// A curve does not match the frequency axis a smoother was built for.
    #[error("curve has {found} bins but the smoothing axis has {expected}")]
    CurveLength {
        /// Bins on the smoother's axis.
        expected: usize,
        /// Bins in the curve.
        found: usize,
    },

    /// Not enough usable data for the requested computation.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The requested horizontal combination method is not implemented.
    #[error(
        "combination method {0} is not supported \
         (diffuse field assumption is not implemented)"
    )]
    UnsupportedMethod(u8),

    /// The external waveform loader failed.
    #[error("failed to load waveform data: {0}")]
    Load(String),

    /// The site's own configuration was rejected before processing.
    #[error("site configuration rejected: {0}")]
    Rejected(String),

    /// Processing code panicked; the message is the panic payload.
    #[error("panic during processing: {0}")]
    Panic(String),

    /// A stage failed while processing a named site.
    #[error("site '{site}' failed during {stage}: {source}")]
    Site {
        /// Site name.
        site: String,
        /// Stage that raised the error.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: Box<HvsrError>,
    },
}

impl HvsrError {
    /// Create an invalid parameter error.
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        HvsrError::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    /// Attach site and stage context. Already-contextualised errors are
    /// returned unchanged.
    pub fn at(self, site: &str, stage: Stage) -> Self {
        match self {
            err @ HvsrError::Site { .. } => err,
            other => HvsrError::Site {
                site: site.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage at which a site-level error occurred, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            HvsrError::Site { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for HVSR processing.
pub type Result<T> = std::result::Result<T, HvsrError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn invalid_parameter_display() {
        let err = HvsrError::invalid("sta", "must be positive");
        assert_eq!(err.to_string(), "invalid parameter 'sta': must be positive");
    }

    #[test]
    fn site_context_names_site_stage_and_cause() {
        let err = HvsrError::invalid("lta", "must exceed sta").at("Site A", Stage::RemoveNoise);
        let msg = err.to_string();
        assert!(msg.contains("Site A"), "got: {msg}");
        assert!(msg.contains("remove noise"), "got: {msg}");
        assert!(msg.contains("lta"), "got: {msg}");
        assert!(err.source().is_some());
        assert_eq!(err.stage(), Some(Stage::RemoveNoise));
    }

    #[test]
    fn site_context_is_not_nested_twice() {
        let err = HvsrError::NoCommonWindows
            .at("inner", Stage::GeneratePsds)
            .at("outer", Stage::CheckPeaks);
        assert!(matches!(
            err,
            HvsrError::Site { ref site, stage: Stage::GeneratePsds, .. } if site == "inner"
        ));
    }

    #[test]
    fn overlapping_windows_names_both() {
        let err = HvsrError::OverlappingWindows {
            first: TimeWindow { start: 1.0, end: 5.0 },
            second: TimeWindow { start: 4.0, end: 6.0 },
        };
        let msg = err.to_string();
        assert!(msg.contains("1.000"), "got: {msg}");
        assert!(msg.contains("4.000"), "got: {msg}");
    }
}
