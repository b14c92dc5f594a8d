//! Waveform I/O for SpRIT.
//!
//! This crate provides:
//!
//! - **WAV recordings**: [`read_record`] and [`write_record`] map the channels
//!   of a three-channel WAV file onto Z/N/E through a [`ChannelOrder`]
//! - **Batch loading**: [`WavLoader`] implements the core's
//!   [`WaveformLoader`](sprit_core::WaveformLoader) so [`sprit_core::run_batch`]
//!   can read sites straight from disk
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sprit_io::{ChannelOrder, read_record};
//! use sprit_core::{HvsrParams, SiteInput, SiteMetadata, process_site};
//!
//! let record = read_record("site.wav", ChannelOrder::default(), 1_686_700_800.0)?;
//! let input = SiteInput::new(SiteMetadata::named("SITE"), record);
//! let result = process_site(&input, &HvsrParams::default())?;
//! ```

mod loader;
mod wav;

pub use loader::{WavLoader, WavSource};
pub use wav::{ChannelOrder, WavFormat, WavInfo, read_record, read_wav_info, write_record};

/// Error types for waveform I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// The file does not carry three channels.
    #[error("expected 3 channels, found {0}")]
    ChannelCount(u16),

    /// A channel-order string is not a permutation of Z, N and E.
    #[error("invalid channel order '{0}': expected a permutation of Z, N and E")]
    ChannelOrder(String),

    /// The decoded samples do not form a valid record.
    #[error("invalid record: {0}")]
    Record(#[from] sprit_core::HvsrError),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for waveform I/O.
pub type Result<T> = std::result::Result<T, Error>;
