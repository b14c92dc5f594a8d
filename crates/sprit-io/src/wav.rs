//! Three-channel WAV recordings.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use sprit_core::{Component, SeismicRecord, ThreeComponent};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// WAV sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Samples per channel.
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Sample encoding.
    pub format: WavFormat,
}

/// Read WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let num_frames = u64::from(reader.len()) / u64::from(spec.channels.max(1));
    let duration_secs = num_frames as f64 / f64::from(spec.sample_rate);

    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs,
        format,
    })
}

/// Component stored in each of the three WAV channels.
///
/// Parsed from strings such as `"ZNE"` or `"E,N,Z"`; SEED-style codes
/// (`"EHZ,EHN,EHE"`) work too since only the last letter of each entry
/// counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOrder([Component; 3]);

impl Default for ChannelOrder {
    fn default() -> Self {
        Self(Component::ALL)
    }
}

impl ChannelOrder {
    /// Order from three distinct components.
    pub fn new(order: [Component; 3]) -> Result<Self> {
        let distinct = Component::ALL.iter().all(|c| order.contains(c));
        if distinct {
            Ok(Self(order))
        } else {
            let text: String = order.iter().map(ToString::to_string).collect();
            Err(Error::ChannelOrder(text))
        }
    }

    /// Component of WAV channel `index`.
    pub fn component(&self, index: usize) -> Component {
        self.0[index]
    }

    /// WAV channel holding `component`.
    pub fn channel_of(&self, component: Component) -> usize {
        self.0.iter().position(|&c| c == component).unwrap_or(0)
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0 {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for ChannelOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = if s.contains(',') {
            s.split(',').map(str::trim).collect()
        } else {
            s.trim()
                .char_indices()
                .map(|(i, ch)| &s.trim()[i..i + ch.len_utf8()])
                .collect()
        };
        let bad = || Error::ChannelOrder(s.to_string());
        let [a, b, c] = parts.as_slice() else {
            return Err(bad());
        };
        let parse = |p: &str| p.parse::<Component>().map_err(|_| bad());
        Self::new([parse(a)?, parse(b)?, parse(c)?]).map_err(|_| bad())
    }
}

/// Read a three-channel WAV file as a seismic record.
///
/// Integer samples are kept as raw counts; float samples are widened to
/// `f64`. WAV carries no absolute time, so the caller supplies `start_time`
/// in seconds since the Unix epoch.
pub fn read_record<P: AsRef<Path>>(
    path: P,
    order: ChannelOrder,
    start_time: f64,
) -> Result<SeismicRecord> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels != 3 {
        return Err(Error::ChannelCount(spec.channels));
    }

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    let frames = interleaved.len() / 3;
    let mut channels: ThreeComponent<Vec<f64>> =
        ThreeComponent::from_fn(|_| Vec::with_capacity(frames));
    for frame in interleaved.chunks_exact(3) {
        for (i, &v) in frame.iter().enumerate() {
            channels[order.component(i)].push(v);
        }
    }

    tracing::debug!(
        path = %path.display(),
        frames,
        sample_rate = spec.sample_rate,
        %order,
        "read WAV record"
    );
    Ok(SeismicRecord::new(
        start_time,
        f64::from(spec.sample_rate),
        channels,
    )?)
}

/// Write a record as a 32-bit float, three-channel WAV file.
///
/// The sample rate is rounded to whole Hz. Gap samples are written as 0.
pub fn write_record<P: AsRef<Path>>(
    path: P,
    record: &SeismicRecord,
    order: ChannelOrder,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 3,
        sample_rate: record.sample_rate().round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let columns = [
        record.channel(order.component(0)),
        record.channel(order.component(1)),
        record.channel(order.component(2)),
    ];
    for i in 0..record.len() {
        for column in &columns {
            let v = column[i];
            writer.write_sample(if v.is_nan() { 0.0 } else { v as f32 })?;
        }
    }
    writer.finalize()?;
    Ok(())
}
