//! SpRIT Core - Horizontal-to-vertical spectral ratio processing
//!
//! This crate turns a three-component ambient seismic recording into an HVSR
//! curve and grades its peaks against the SESAME (2004) reliability and
//! clarity criteria.
//!
//! # Pipeline
//!
//! - [`noise`] - Noise-window curation (STA/LTA antitrigger, saturation,
//!   long-term-average threshold, warmup/cooldown, manual windows)
//! - [`psd`] - Welch PSD estimation per analysis window into a [`WindowTable`]
//! - [`smoothing`] - Savitzky-Golay and frequency-domain smoothing
//! - [`combine`] - Horizontal combination methods and H/V ratios
//! - [`outlier`] - Window rejection by RMSE or amplitude spread
//! - [`curve`] - The site's [`AggregateCurve`] with its envelopes
//! - [`sesame`] - Peak candidates and the nine SESAME tests
//! - [`pipeline`] - [`process_site`] runs every stage for one site
//! - [`batch`] - [`run_batch`] processes many sites in isolation
//! - [`calibration`] - Depth to bedrock from the best peak frequency
//!
//! # Supporting Modules
//!
//! - [`signal`] - [`SeismicRecord`] and the [`ThreeComponent`] container
//! - [`window`] - Time windows and exclusion sets
//! - [`table`] - Per-window rows and the shared frequency axis
//! - [`response`] - Instrument response correction
//! - [`report`] - Summary tables and plain-text reports
//! - [`synthetic`] - Deterministic synthetic recordings for testing
//! - [`stats`], [`peaks`] - NaN-aware statistics and peak picking
//!
//! # Example
//!
//! ```rust,ignore
//! use sprit_core::{HvsrParams, SiteInput, SiteMetadata, process_site};
//!
//! let input = SiteInput::new(SiteMetadata::named("MY-SITE"), record);
//! let result = process_site(&input, &HvsrParams::default())?;
//!
//! if let Some(peak) = result.best_peak() {
//!     println!("f0 = {:.2} Hz ({}/9 tests)", peak.f0, peak.score);
//! }
//! ```

pub mod batch;
pub mod calibration;
pub mod combine;
pub mod curve;
pub mod error;
pub mod noise;
pub mod outlier;
pub mod peaks;
pub mod pipeline;
pub mod psd;
pub mod report;
pub mod response;
pub mod sesame;
pub mod signal;
pub mod smoothing;
pub mod stats;
pub mod synthetic;
pub mod table;
pub mod window;

pub use batch::{
    BatchResult, BatchSite, SiteOutcome, Waveform, WaveformLoader, run_batch, run_batch_with,
};
pub use calibration::{DepthModel, PowerLaw};
pub use combine::{CombinationMethod, hv_ratio, hvsr_curve};
pub use curve::{AggregateCurve, Envelope};
pub use error::{HvsrError, Result, Stage};
pub use noise::{Curation, NoiseParams, NoiseRemovalMethod, curate};
pub use outlier::{CurveSource, OutlierRule, Reference, RmseThreshold};
pub use pipeline::{
    HvsrParams, HvsrResult, ProcessParams, ProcessingStatus, SiteInput, process_site,
    process_site_with,
};
pub use psd::{PsdEstimator, PsdParams, WelchEstimator};
pub use report::{SiteMetadata, SummaryRow};
pub use response::{GroundMotion, InstrumentResponse};
pub use sesame::{PassList, Peak, PeakParams, PeakReport, SesameTest, check_peaks};
pub use signal::{Component, SeismicRecord, ThreeComponent};
pub use smoothing::FreqSmoothing;
pub use synthetic::{Resonance, SyntheticParams, Transient};
pub use table::{FrequencyAxis, WindowRow, WindowTable};
pub use window::{ExclusionSet, TimeWindow};
