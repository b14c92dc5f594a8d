//! Frequency-to-depth calibration.
//!
//! The resonance frequency of a soft layer over bedrock falls with layer
//! thickness. Regional studies express this as a power law
//! `depth = a · f0^-b` (depth in metres, `f0` in Hz). A model is either one
//! of the published coefficient pairs, a pair fitted from sites of known
//! depth with [`PowerLaw::fit`], or the quarter-wavelength rule
//! `depth = vs / (4 · f0)`.
//!
//! # Example
//!
//! ```rust
//! use sprit_core::calibration::{DepthModel, PowerLaw};
//!
//! let model = DepthModel::Published { name: "Ibsvon_A".into() };
//! let depth = model.depth(1.0).unwrap();
//! assert!((depth - 96.0).abs() < 1e-9);
//!
//! let fitted = PowerLaw::fit(&[(1.0, 100.0), (10.0, 10.0)]).unwrap();
//! assert!((fitted.b - 1.0).abs() < 1e-9);
//! ```

use crate::error::{HvsrError, Result};
use crate::report::split_csv_line;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead};

/// Published `(name, a, b)` coefficients for `depth = a · f0^-b`.
pub const PUBLISHED_MODELS: [(&str, f64, f64); 28] = [
    ("ISGS_All", 141.81, 1.582),
    ("ISGS_North", 142.95, 1.312),
    ("ISGS_Central", 119.17, 1.21),
    ("ISGS_Southeast", 67.973, 1.166),
    ("ISGS_Southwest", 61.238, 1.003),
    ("ISGS_North_Central", 117.44, 1.095),
    ("ISGS_SW_SE", 62.62, 1.039),
    ("Minnesota_All", 121.0, 1.323),
    ("Minnesota_Twin_Cities", 129.0, 1.295),
    ("Minnesota_South_Central", 135.0, 1.248),
    ("Minnesota_River_Valleys", 83.0, 1.232),
    ("Rhine_Graben", 96.0, 1.388),
    ("Ibsvon_A", 96.0, 1.388),
    ("Ibsvon_B", 146.0, 1.375),
    ("Delgado_A", 55.11, 1.256),
    ("Delgado_B", 55.64, 1.268),
    ("Parolai", 108.0, 1.551),
    ("Hinzen", 137.0, 1.19),
    ("Birgoren", 150.99, 1.153),
    ("Ozalaybey", 141.0, 1.270),
    ("Harutoonian", 73.0, 1.170),
    ("Fairchild", 90.53, 1.0),
    ("DelMonaco", 53.461, 1.01),
    ("Tun", 136.0, 1.357),
    ("Thabet_A", 117.13, 1.197),
    ("Thabet_B", 105.14, 0.899),
    ("Thabet_C", 132.67, 1.084),
    ("Thabet_D", 116.62, 1.169),
];

/// Shear-wave velocity assumed by the quarter-wavelength rule, in m/s.
pub const DEFAULT_SHEAR_VELOCITY: f64 = 563.0;

/// Power law `depth = a · f0^-b`. The sign of `b` is ignored, so both
/// `-1.388` and `1.388` describe the same decreasing curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    /// Depth at 1 Hz, in metres.
    pub a: f64,
    /// Magnitude of the frequency exponent.
    pub b: f64,
}

impl PowerLaw {
    /// Power law with the exponent magnitude `|b|`.
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b: b.abs() }
    }

    /// Published model by case-insensitive name. `"all"` averages every
    /// published pair.
    pub fn published(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("all") {
            return Some(Self::mean_of_published());
        }
        PUBLISHED_MODELS
            .iter()
            .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, a, b)| Self::new(a, b))
    }

    /// Mean `a` and mean `b` over [`PUBLISHED_MODELS`].
    pub fn mean_of_published() -> Self {
        let n = PUBLISHED_MODELS.len() as f64;
        let (a, b) = PUBLISHED_MODELS
            .iter()
            .fold((0.0, 0.0), |(sa, sb), &(_, a, b)| (sa + a, sb + b));
        Self::new(a / n, b / n)
    }

    /// Depth for resonance frequency `f0`.
    pub fn depth(&self, f0: f64) -> f64 {
        self.a * f0.powf(-self.b.abs())
    }

    /// Least-squares fit of `ln depth = ln a - b · ln f0` to
    /// `(f0, depth)` pairs.
    ///
    /// Pairs with a non-positive or non-finite value are skipped. At least
    /// two usable pairs at distinct frequencies are required.
    pub fn fit(pairs: &[(f64, f64)]) -> Result<Self> {
        let usable: Vec<(f64, f64)> = pairs
            .iter()
            .filter(|(f, d)| f.is_finite() && d.is_finite() && *f > 0.0 && *d > 0.0)
            .map(|(f, d)| (f.ln(), d.ln()))
            .collect();
        if usable.len() < pairs.len() {
            tracing::warn!(
                skipped = pairs.len() - usable.len(),
                "skipping non-positive calibration pairs"
            );
        }
        if usable.len() < 2 {
            return Err(HvsrError::InsufficientData(format!(
                "calibration needs at least 2 positive (f0, depth) pairs, got {}",
                usable.len()
            )));
        }

        let n = usable.len() as f64;
        let mean_x = usable.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = usable.iter().map(|(_, y)| y).sum::<f64>() / n;
        let (sxy, sxx) = usable.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });
        if sxx == 0.0 {
            return Err(HvsrError::InsufficientData(
                "calibration frequencies are all equal".to_string(),
            ));
        }
        let slope = sxy / sxx;
        let law = Self {
            a: (mean_y - slope * mean_x).exp(),
            b: -slope,
        };
        tracing::info!(a = law.a, b = law.b, pairs = usable.len(), "fitted depth model");
        Ok(law)
    }

    /// Reject non-positive `a` and zero or non-finite `b`.
    pub fn validate(&self) -> Result<()> {
        if !(self.a > 0.0 && self.a.is_finite()) {
            return Err(HvsrError::invalid(
                "calibration.a",
                format!("must be positive, got {}", self.a),
            ));
        }
        if !(self.b.is_finite() && self.b != 0.0) {
            return Err(HvsrError::invalid(
                "calibration.b",
                format!("must be finite and non-zero, got {}", self.b),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PowerLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} * f0^-{}", self.a, self.b.abs())
    }
}

fn default_shear_velocity() -> f64 {
    DEFAULT_SHEAR_VELOCITY
}

/// Relation used to turn a site's best peak frequency into a depth.
///
/// ```toml
/// [calibration]
/// kind = "published"
/// name = "ISGS_All"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepthModel {
    /// Entry of [`PUBLISHED_MODELS`], or `"all"` for their mean.
    Published {
        /// Model name, matched case-insensitively.
        name: String,
    },
    /// Explicit coefficients.
    PowerLaw(PowerLaw),
    /// `depth = vs / (4 · f0)`.
    QuarterWavelength {
        /// Average shear-wave velocity above bedrock, in m/s.
        #[serde(default = "default_shear_velocity")]
        vs: f64,
    },
}

impl DepthModel {
    /// Reject unknown names and out-of-range coefficients.
    pub fn validate(&self) -> Result<()> {
        match self {
            DepthModel::Published { name } => match PowerLaw::published(name) {
                Some(_) => Ok(()),
                None => Err(HvsrError::invalid(
                    "calibration.name",
                    format!("unknown depth model '{name}'"),
                )),
            },
            DepthModel::PowerLaw(law) => law.validate(),
            DepthModel::QuarterWavelength { vs } if !(*vs > 0.0 && vs.is_finite()) => Err(
                HvsrError::invalid("calibration.vs", format!("must be positive, got {vs}")),
            ),
            DepthModel::QuarterWavelength { .. } => Ok(()),
        }
    }

    /// The power law behind this model, if it is one.
    pub fn power_law(&self) -> Option<PowerLaw> {
        match self {
            DepthModel::Published { name } => PowerLaw::published(name),
            DepthModel::PowerLaw(law) => Some(PowerLaw::new(law.a, law.b)),
            DepthModel::QuarterWavelength { .. } => None,
        }
    }

    /// Depth in metres for resonance frequency `f0`. `None` for a
    /// non-positive frequency or an unknown model name.
    pub fn depth(&self, f0: f64) -> Option<f64> {
        if !(f0 > 0.0 && f0.is_finite()) {
            return None;
        }
        match self {
            DepthModel::QuarterWavelength { vs } => Some(vs / (4.0 * f0)),
            other => other.power_law().map(|law| law.depth(f0)),
        }
    }
}

impl fmt::Display for DepthModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepthModel::Published { name } => match PowerLaw::published(name) {
                Some(law) => write!(f, "{name} ({law})"),
                None => write!(f, "{name} (unknown)"),
            },
            DepthModel::PowerLaw(law) => write!(f, "{law}"),
            DepthModel::QuarterWavelength { vs } => write!(f, "{vs} / (4 * f0)"),
        }
    }
}

/// Read `(f0, depth)` pairs from a CSV table with a header line.
///
/// Columns are found by name. Rows where either cell is empty are skipped.
pub fn read_calibration_csv<R: BufRead>(
    input: R,
    freq_column: &str,
    depth_column: &str,
) -> io::Result<Vec<(f64, f64)>> {
    let invalid = |line: usize, msg: String| {
        io::Error::new(io::ErrorKind::InvalidData, format!("line {line}: {msg}"))
    };
    let mut lines = input.lines();
    let header = match lines.next() {
        Some(line) => split_csv_line(&line?),
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| invalid(1, format!("missing column '{name}'")))
    };
    let freq_col = column(freq_column)?;
    let depth_col = column(depth_column)?;

    let mut pairs = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let lineno = n + 2;
        let fields = split_csv_line(&line);
        let cell = |col: usize| fields.get(col).map(|s| s.trim()).unwrap_or("");
        let (f, d) = (cell(freq_col), cell(depth_col));
        if f.is_empty() || d.is_empty() {
            continue;
        }
        let number = |text: &str| {
            text.parse::<f64>()
                .map_err(|_| invalid(lineno, format!("'{text}' is not a number")))
        };
        pairs.push((number(f)?, number(d)?));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_coefficients() {
        let law = PowerLaw::published("isgs_all").unwrap();
        assert_eq!((law.a, law.b), (141.81, 1.582));
        let ibs = PowerLaw::published("Ibsvon_A").unwrap();
        // 96 · 2^-1.388
        assert!((ibs.depth(2.0) - 36.681).abs() < 1e-3, "{}", ibs.depth(2.0));
        assert!(PowerLaw::published("Atlantis").is_none());
    }

    #[test]
    fn mean_of_published_averages_both_coefficients() {
        let mean = PowerLaw::published("ALL").unwrap();
        let a: f64 = PUBLISHED_MODELS.iter().map(|m| m.1).sum::<f64>() / 28.0;
        assert!((mean.a - a).abs() < 1e-9);
        assert!(mean.b > 0.899 && mean.b < 1.582);
    }

    #[test]
    fn negative_exponent_means_the_same_curve() {
        let law = PowerLaw::new(96.0, -1.388);
        assert_eq!(law.b, 1.388);
        let model = DepthModel::PowerLaw(PowerLaw { a: 96.0, b: -1.388 });
        let named = DepthModel::Published { name: "Rhine_Graben".into() };
        assert_eq!(model.depth(3.0), named.depth(3.0));
    }

    #[test]
    fn fit_recovers_known_coefficients() {
        let truth = PowerLaw::new(141.81, 1.582);
        let pairs: Vec<(f64, f64)> = [0.3, 0.8, 1.5, 4.0, 12.0]
            .iter()
            .map(|&f| (f, truth.depth(f)))
            .collect();
        let fitted = PowerLaw::fit(&pairs).unwrap();
        assert!((fitted.a - 141.81).abs() < 1e-6, "a = {}", fitted.a);
        assert!((fitted.b - 1.582).abs() < 1e-9, "b = {}", fitted.b);
    }

    #[test]
    fn fit_skips_unusable_pairs_and_needs_two() {
        let fitted = PowerLaw::fit(&[(1.0, 50.0), (0.0, 10.0), (2.0, 25.0), (4.0, -1.0)]).unwrap();
        assert!((fitted.a - 50.0).abs() < 1e-9);
        assert!((fitted.b - 1.0).abs() < 1e-9);
        assert!(PowerLaw::fit(&[(1.0, 50.0)]).is_err());
        assert!(PowerLaw::fit(&[(2.0, 50.0), (2.0, 40.0)]).is_err());
    }

    #[test]
    fn quarter_wavelength() {
        let model = DepthModel::QuarterWavelength { vs: 400.0 };
        assert_eq!(model.depth(2.0), Some(50.0));
        assert_eq!(model.depth(0.0), None);
        assert!(DepthModel::QuarterWavelength { vs: 0.0 }.validate().is_err());
    }

    #[test]
    fn unknown_name_is_invalid() {
        let model = DepthModel::Published { name: "nowhere".into() };
        assert!(matches!(
            model.validate(),
            Err(HvsrError::InvalidParameter { param: "calibration.name", .. })
        ));
        assert_eq!(model.depth(1.0), None);
        assert!(DepthModel::PowerLaw(PowerLaw { a: 10.0, b: 0.0 }).validate().is_err());
    }

    #[test]
    fn toml_forms() {
        let model: DepthModel = toml::from_str("kind = \"quarter_wavelength\"").unwrap();
        assert_eq!(model, DepthModel::QuarterWavelength { vs: DEFAULT_SHEAR_VELOCITY });
        let model: DepthModel = toml::from_str("kind = \"power_law\"\na = 90.0\nb = 1.2").unwrap();
        assert_eq!(model, DepthModel::PowerLaw(PowerLaw { a: 90.0, b: 1.2 }));
        assert_eq!(model.to_string(), "90 * f0^-1.2");
    }

    #[test]
    fn calibration_csv_by_column_name() {
        let text = "Site,Depth,Freq\nA,100,1.0\nB,,2.0\nC,10,10.0\n";
        let pairs = read_calibration_csv(text.as_bytes(), "Freq", "Depth").unwrap();
        assert_eq!(pairs, vec![(1.0, 100.0), (10.0, 10.0)]);
        assert!(read_calibration_csv(text.as_bytes(), "PeakFrequency", "Depth").is_err());
        let bad = "Freq,Depth\n1.0,deep\n";
        assert!(read_calibration_csv(bad.as_bytes(), "Freq", "Depth").is_err());
    }
}
