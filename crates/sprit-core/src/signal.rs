//! Three-component seismic records.

use crate::error::{HvsrError, Result};
use crate::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Ground-motion component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    /// Vertical.
    Z,
    /// North (first horizontal).
    N,
    /// East (second horizontal).
    E,
}

impl Component {
    /// All components in Z, N, E order.
    pub const ALL: [Component; 3] = [Component::Z, Component::N, Component::E];
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Z => "Z",
            Component::N => "N",
            Component::E => "E",
        };
        f.write_str(s)
    }
}

impl FromStr for Component {
    type Err = HvsrError;

    /// Accepts bare component letters and SEED channel codes (`EHZ`, `HHN`, ...)
    /// by looking at the last character.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().chars().last().map(|c| c.to_ascii_uppercase()) {
            Some('Z') => Ok(Component::Z),
            Some('N' | '1') => Ok(Component::N),
            Some('E' | '2') => Ok(Component::E),
            _ => Err(HvsrError::invalid(
                "component",
                format!("'{s}' is not a Z, N or E channel"),
            )),
        }
    }
}

/// One value per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeComponent<T> {
    /// Vertical.
    pub z: T,
    /// North.
    pub n: T,
    /// East.
    pub e: T,
}

impl<T> ThreeComponent<T> {
    /// Build from the three values.
    pub fn new(z: T, n: T, e: T) -> Self {
        Self { z, n, e }
    }

    /// Build by evaluating `f` for each component.
    pub fn from_fn(mut f: impl FnMut(Component) -> T) -> Self {
        Self {
            z: f(Component::Z),
            n: f(Component::N),
            e: f(Component::E),
        }
    }

    /// Apply `f` to every component value.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ThreeComponent<U> {
        ThreeComponent {
            z: f(self.z),
            n: f(self.n),
            e: f(self.e),
        }
    }

    /// Borrow every value.
    pub fn each_ref(&self) -> ThreeComponent<&T> {
        ThreeComponent {
            z: &self.z,
            n: &self.n,
            e: &self.e,
        }
    }

    /// Iterate `(component, value)` pairs in Z, N, E order.
    pub fn iter(&self) -> impl Iterator<Item = (Component, &T)> {
        [
            (Component::Z, &self.z),
            (Component::N, &self.n),
            (Component::E, &self.e),
        ]
        .into_iter()
    }
}

impl<T> Index<Component> for ThreeComponent<T> {
    type Output = T;

    fn index(&self, c: Component) -> &T {
        match c {
            Component::Z => &self.z,
            Component::N => &self.n,
            Component::E => &self.e,
        }
    }
}

impl<T> IndexMut<Component> for ThreeComponent<T> {
    fn index_mut(&mut self, c: Component) -> &mut T {
        match c {
            Component::Z => &mut self.z,
            Component::N => &mut self.n,
            Component::E => &mut self.e,
        }
    }
}

/// Uniformly sampled three-component recording.
///
/// All channels share a start time and sample rate. Excluded samples are
/// stored as NaN ("gaps"); they are never removed, so sample indices keep
/// mapping to the same instants through every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SeismicRecord {
    start_time: f64,
    sample_rate: f64,
    channels: ThreeComponent<Vec<f64>>,
}

impl SeismicRecord {
    /// Create a record.
    ///
    /// `start_time` is in seconds since the Unix epoch. Channels of unequal
    /// length are trimmed to the shortest one; an empty channel is a
    /// data-integrity error.
    pub fn new(
        start_time: f64,
        sample_rate: f64,
        mut channels: ThreeComponent<Vec<f64>>,
    ) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(HvsrError::invalid(
                "sample_rate",
                format!("must be positive, got {sample_rate}"),
            ));
        }
        for (c, data) in channels.iter() {
            if data.is_empty() {
                return Err(HvsrError::MissingComponent(c));
            }
        }
        let shortest = Component::ALL
            .iter()
            .map(|&c| channels[c].len())
            .min()
            .unwrap_or(0);
        for c in Component::ALL {
            if channels[c].len() != shortest {
                tracing::warn!(
                    component = %c,
                    samples = channels[c].len(),
                    shortest,
                    "trimming channel to common length"
                );
                channels[c].truncate(shortest);
            }
        }
        Ok(Self {
            start_time,
            sample_rate,
            channels,
        })
    }

    /// Build from optional channels, failing on the first missing one.
    pub fn from_optional(
        start_time: f64,
        sample_rate: f64,
        z: Option<Vec<f64>>,
        n: Option<Vec<f64>>,
        e: Option<Vec<f64>>,
    ) -> Result<Self> {
        let z = z.ok_or(HvsrError::MissingComponent(Component::Z))?;
        let n = n.ok_or(HvsrError::MissingComponent(Component::N))?;
        let e = e.ok_or(HvsrError::MissingComponent(Component::E))?;
        Self::new(start_time, sample_rate, ThreeComponent::new(z, n, e))
    }

    /// Start time in seconds since the Unix epoch.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Sample interval in seconds.
    pub fn delta(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.z.len()
    }

    /// True if the record holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds, measured between the first and last sample.
    pub fn duration(&self) -> f64 {
        self.len().saturating_sub(1) as f64 / self.sample_rate
    }

    /// Samples of one component.
    pub fn channel(&self, c: Component) -> &[f64] {
        &self.channels[c]
    }

    /// All channels.
    pub fn channels(&self) -> &ThreeComponent<Vec<f64>> {
        &self.channels
    }

    /// Number of gap (NaN) samples in a component.
    pub fn gap_count(&self, c: Component) -> usize {
        self.channels[c].iter().filter(|v| v.is_nan()).count()
    }

    /// Sample index nearest to `offset` seconds after the start, clamped to the record.
    pub fn index_at(&self, offset: f64) -> usize {
        let idx = (offset * self.sample_rate).round().max(0.0) as usize;
        idx.min(self.len().saturating_sub(1))
    }

    /// Copy of the record with every sample inside `windows` replaced by a gap.
    pub fn with_gaps(&self, windows: &[TimeWindow]) -> SeismicRecord {
        let mut out = self.clone();
        for w in windows {
            let first = (w.start * self.sample_rate).ceil().max(0.0) as usize;
            let last = (w.end * self.sample_rate).floor();
            if last < 0.0 || first >= self.len() {
                continue;
            }
            let last = (last as usize).min(self.len() - 1);
            if first > last {
                continue;
            }
            for c in Component::ALL {
                out.channels[c][first..=last].fill(f64::NAN);
            }
        }
        out
    }
}
