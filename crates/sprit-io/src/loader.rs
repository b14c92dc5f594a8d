//! [`WaveformLoader`] over WAV files on disk.

use crate::wav::{ChannelOrder, read_record};
use sprit_core::{HvsrError, Waveform, WaveformLoader};
use std::path::{Path, PathBuf};

/// Location of one site's recording.
#[derive(Debug, Clone, PartialEq)]
pub struct WavSource {
    /// WAV file; relative paths resolve against the loader's base directory.
    pub path: PathBuf,
    /// Component stored in each WAV channel.
    pub channel_order: ChannelOrder,
    /// Start time in seconds since the Unix epoch.
    pub start_time: f64,
}

impl WavSource {
    /// Source with Z, N, E channel order starting at the epoch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel_order: ChannelOrder::default(),
            start_time: 0.0,
        }
    }
}

/// Loads sites from three-channel WAV files.
///
/// WAV files carry no instrument response, so loaded waveforms leave the
/// response to the site configuration.
#[derive(Debug, Clone, Default)]
pub struct WavLoader {
    base_dir: Option<PathBuf>,
}

impl WavLoader {
    /// Loader resolving paths as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader resolving relative paths against `dir`.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    /// Full path of `path` under this loader.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl WaveformLoader for WavLoader {
    type Source = WavSource;

    fn load(&self, source: &WavSource) -> sprit_core::Result<Waveform> {
        let path = self.resolve(&source.path);
        let record = read_record(&path, source.channel_order, source.start_time)
            .map_err(|e| HvsrError::Load(format!("{}: {e}", path.display())))?;
        tracing::info!(
            path = %path.display(),
            samples = record.len(),
            sample_rate = record.sample_rate(),
            "loaded waveform"
        );
        Ok(Waveform {
            record,
            responses: None,
        })
    }
}
