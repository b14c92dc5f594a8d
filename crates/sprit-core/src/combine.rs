//! Horizontal/vertical combination of PSD curves.

use crate::error::{HvsrError, Result};
use crate::signal::ThreeComponent;
use crate::table::WindowTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value substituted for a right-edge linear power of exactly zero.
pub const ZERO_POWER_SUBSTITUTE: f64 = 1e-300;

/// How the two horizontal amplitudes are combined before dividing by the
/// vertical amplitude.
///
/// Serialised as the integer index used throughout HVSR literature (2-6).
/// Index 1, the diffuse field assumption, is not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CombinationMethod {
    /// `(H1 + H2) / 2`
    ArithmeticMean,
    /// `sqrt(H1 * H2)`
    #[default]
    GeometricMean,
    /// `sqrt(P1 + P2)`
    VectorSum,
    /// `sqrt((P1 + P2) / 2)`
    QuadraticMean,
    /// `max(H1, H2)`
    MaxHorizontal,
}

impl CombinationMethod {
    /// All implemented methods, by index.
    pub const ALL: [CombinationMethod; 5] = [
        CombinationMethod::ArithmeticMean,
        CombinationMethod::GeometricMean,
        CombinationMethod::VectorSum,
        CombinationMethod::QuadraticMean,
        CombinationMethod::MaxHorizontal,
    ];

    /// Look up a method by its index.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            2 => Ok(Self::ArithmeticMean),
            3 => Ok(Self::GeometricMean),
            4 => Ok(Self::VectorSum),
            5 => Ok(Self::QuadraticMean),
            6 => Ok(Self::MaxHorizontal),
            other => Err(HvsrError::UnsupportedMethod(other)),
        }
    }

    /// Index of this method.
    pub fn index(self) -> u8 {
        match self {
            Self::ArithmeticMean => 2,
            Self::GeometricMean => 3,
            Self::VectorSum => 4,
            Self::QuadraticMean => 5,
            Self::MaxHorizontal => 6,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ArithmeticMean => "Arithmetic Mean",
            Self::GeometricMean => "Geometric Mean",
            Self::VectorSum => "Vector Summation",
            Self::QuadraticMean => "Quadratic Mean",
            Self::MaxHorizontal => "Maximum Horizontal Value",
        }
    }

    /// Combined horizontal amplitude from two horizontal powers.
    pub fn horizontal(self, p1: f64, p2: f64) -> f64 {
        let (h1, h2) = (p1.sqrt(), p2.sqrt());
        match self {
            Self::ArithmeticMean => (h1 + h2) / 2.0,
            Self::GeometricMean => (h1 * h2).sqrt(),
            Self::VectorSum => (p1 + p2).sqrt(),
            Self::QuadraticMean => ((p1 + p2) / 2.0).sqrt(),
            Self::MaxHorizontal => h1.max(h2),
        }
    }
}

impl TryFrom<u8> for CombinationMethod {
    type Error = HvsrError;

    fn try_from(index: u8) -> Result<Self> {
        Self::from_index(index)
    }
}

impl From<CombinationMethod> for u8 {
    fn from(method: CombinationMethod) -> u8 {
        method.index()
    }
}

impl fmt::Display for CombinationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.index())
    }
}

/// Linear power of one bin pair: mean of the two linear values times the
/// bin width.
pub fn db_to_power(db: [f64; 2], freqs: [f64; 2]) -> f64 {
    let left = 10f64.powf(db[0] / 10.0);
    let mut right = 10f64.powf(db[1] / 10.0);
    if right == 0.0 {
        right = ZERO_POWER_SUBSTITUTE;
    }
    (left + right) / 2.0 * (freqs[1] - freqs[0]).abs()
}

/// H/V ratio for one bin pair.
pub fn hv_ratio(
    z: [f64; 2],
    h1: [f64; 2],
    h2: [f64; 2],
    freqs: [f64; 2],
    method: CombinationMethod,
) -> f64 {
    let pz = db_to_power(z, freqs);
    let p1 = db_to_power(h1, freqs);
    let p2 = db_to_power(h2, freqs);
    method.horizontal(p1, p2) / pz.sqrt()
}

/// H/V curve over every adjacent bin pair: one value shorter than `freqs`.
pub fn hvsr_curve(
    freqs: &[f64],
    psd: ThreeComponent<&[f64]>,
    method: CombinationMethod,
) -> Result<Vec<f64>> {
    for (c, values) in psd.iter() {
        if values.len() != freqs.len() {
            return Err(HvsrError::AxisMismatch {
                component: c,
                expected: freqs.len(),
                found: values.len(),
            });
        }
    }
    Ok((0..freqs.len().saturating_sub(1))
        .map(|j| {
            let pair = |v: &[f64]| [v[j], v[j + 1]];
            hv_ratio(
                pair(psd.z),
                pair(psd.n),
                pair(psd.e),
                [freqs[j], freqs[j + 1]],
                method,
            )
        })
        .collect())
}

/// Fill `hv_curve` on every row of the table.
pub fn combine_table(table: &mut WindowTable, method: CombinationMethod) -> Result<()> {
    let freqs = table.axis().freqs().to_vec();
    for row in table.rows_mut() {
        row.hv_curve = hvsr_curve(&freqs, row.psd.each_ref().map(Vec::as_slice), method)?;
    }
    tracing::debug!(%method, rows = table.len(), "combined per-window H/V curves");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: [f64; 2] = [1.0, 1.1];

    #[test]
    fn index_one_is_unsupported() {
        assert!(matches!(
            CombinationMethod::from_index(1),
            Err(HvsrError::UnsupportedMethod(1))
        ));
        assert!(CombinationMethod::from_index(7).is_err());
        for m in CombinationMethod::ALL {
            assert_eq!(CombinationMethod::from_index(m.index()).unwrap(), m);
        }
    }

    #[test]
    fn equal_horizontals_converge_for_amplitude_rules() {
        let z = [-140.0, -140.0];
        let h = [-120.0, -120.0];
        let expected = 10f64.powf(20.0 / 20.0);
        for m in [
            CombinationMethod::ArithmeticMean,
            CombinationMethod::GeometricMean,
            CombinationMethod::QuadraticMean,
            CombinationMethod::MaxHorizontal,
        ] {
            let hv = hv_ratio(z, h, h, F, m);
            assert!((hv - expected).abs() < 1e-9, "{m}: {hv}");
        }
        // vector summation adds the two powers
        let hv = hv_ratio(z, h, h, F, CombinationMethod::VectorSum);
        assert!((hv - expected * 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn max_dominates_geometric_mean() {
        let z = [-140.0, -141.0];
        let h1 = [-120.0, -118.0];
        let h2 = [-125.0, -126.0];
        let max = hv_ratio(z, h1, h2, F, CombinationMethod::MaxHorizontal);
        let geo = hv_ratio(z, h1, h2, F, CombinationMethod::GeometricMean);
        let arith = hv_ratio(z, h1, h2, F, CombinationMethod::ArithmeticMean);
        assert!(max > geo);
        assert!(arith > geo);
    }

    #[test]
    fn zero_right_edge_power_is_substituted() {
        let p = db_to_power([0.0, f64::NEG_INFINITY], [1.0, 2.0]);
        assert!((p - (1.0 + ZERO_POWER_SUBSTITUTE) / 2.0).abs() < 1e-15);
    }

    #[test]
    fn curve_is_one_shorter_than_axis() {
        let freqs = [1.0, 2.0, 3.0, 4.0];
        let z = [-100.0; 4];
        let h = [-90.0; 4];
        let curve = hvsr_curve(
            &freqs,
            ThreeComponent::new(&z[..], &h[..], &h[..]),
            CombinationMethod::GeometricMean,
        )
        .unwrap();
        assert_eq!(curve.len(), 3);
        for v in curve {
            assert!((v - 10f64.sqrt()).abs() < 1e-9);
        }
    }

    #[test]
    fn method_serialises_as_index() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            method: CombinationMethod,
        }
        let w: Wrapper = toml::from_str("method = 4").unwrap();
        assert_eq!(w.method, CombinationMethod::VectorSum);
        assert!(toml::from_str::<Wrapper>("method = 1").is_err());
    }
}
