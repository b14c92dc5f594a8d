//! Property-based tests for sprit-core numerics.
//!
//! Tests combination ordering, smoother shape guarantees, peak picking and
//! the one-way nature of window exclusion using proptest for randomized
//! input generation.

use proptest::prelude::*;
use sprit_core::outlier::reject_outliers;
use sprit_core::peaks::find_peaks;
use sprit_core::smoothing::{savgol_filter, triangular_smooth};
use sprit_core::stats::percentile;
use sprit_core::{
    CombinationMethod, FrequencyAxis, OutlierRule, ThreeComponent, WindowRow, WindowTable,
};

/// Table with one constant-level PSD row per entry of `levels`.
fn level_table(levels: &[f64], excluded: &[bool]) -> WindowTable {
    let freqs: Vec<f64> = (1..=16).map(|i| i as f64 * 0.5).collect();
    let axis = FrequencyAxis::from_freqs(freqs.clone()).unwrap();
    let rows = levels
        .iter()
        .zip(excluded)
        .enumerate()
        .map(|(i, (&db, &skip))| {
            let psd = ThreeComponent::new(
                vec![db - 10.0; freqs.len()],
                vec![db; freqs.len()],
                vec![db; freqs.len()],
            );
            WindowRow::new(i as f64 * 30.0, i as f64 * 30.0 + 60.0, psd, !skip)
        })
        .collect();
    WindowTable::new(0.0, 60.0, axis, rows).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// For any two horizontal powers, max >= vector sum / sqrt(2) >= mean >=
    /// geometric mean, and the quadratic mean sits between mean and max.
    #[test]
    fn horizontal_combination_ordering(p1 in 1e-6f64..1e6, p2 in 1e-6f64..1e6) {
        let h = |m: CombinationMethod| m.horizontal(p1, p2);
        let geo = h(CombinationMethod::GeometricMean);
        let arith = h(CombinationMethod::ArithmeticMean);
        let quad = h(CombinationMethod::QuadraticMean);
        let max = h(CombinationMethod::MaxHorizontal);
        let vector = h(CombinationMethod::VectorSum);
        let tol = 1e-9 * max;

        prop_assert!(max + tol >= quad, "max {} < quadratic {}", max, quad);
        prop_assert!(quad + tol >= arith, "quadratic {} < arithmetic {}", quad, arith);
        prop_assert!(arith + tol >= geo, "arithmetic {} < geometric {}", arith, geo);
        prop_assert!((vector - quad * 2f64.sqrt()).abs() <= 1e-9 * vector);
    }

    /// Savitzky-Golay keeps the curve length and reproduces cubics exactly.
    #[test]
    fn savgol_preserves_length_and_cubics(
        len in 25usize..120,
        half in 2usize..10,
        coeffs in prop::array::uniform4(-1.0f64..1.0),
    ) {
        let window = 2 * half + 1;
        let x0 = len as f64 / 2.0;
        let curve: Vec<f64> = (0..len)
            .map(|i| {
                let x = (i as f64 - x0) / len as f64;
                coeffs[0] + coeffs[1] * x + coeffs[2] * x * x + coeffs[3] * x * x * x
            })
            .collect();
        let smoothed = savgol_filter(&curve, window, 3);
        prop_assert_eq!(smoothed.len(), curve.len());
        for (a, b) in smoothed.iter().zip(&curve) {
            prop_assert!((a - b).abs() < 1e-7, "{} vs {}", a, b);
        }
    }

    /// Triangular smoothing keeps the length and never leaves the data range.
    #[test]
    fn triangular_smoothing_is_bounded(
        values in prop::collection::vec(-100.0f64..100.0, 1..200),
        half in 0usize..20,
    ) {
        let out = triangular_smooth(&values, half);
        prop_assert_eq!(out.len(), values.len());
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for v in out {
            prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
        }
    }

    /// Peaks are interior strict local maxima.
    #[test]
    fn peaks_are_interior_maxima(values in prop::collection::vec(0.0f64..10.0, 0..300)) {
        for i in find_peaks(&values) {
            prop_assert!(i > 0 && i + 1 < values.len());
            prop_assert!(values[i] > values[i - 1] && values[i] > values[i + 1]);
        }
    }

    /// A strictly unimodal curve has exactly one peak, at its maximum.
    #[test]
    fn unimodal_curve_has_one_peak(
        rise in prop::collection::vec(0.01f64..1.0, 1..50),
        fall in prop::collection::vec(0.01f64..1.0, 1..50),
    ) {
        let mut curve = vec![0.0];
        for step in &rise {
            let last = curve[curve.len() - 1];
            curve.push(last + step);
        }
        let top = curve.len() - 1;
        for step in &fall {
            let last = curve[curve.len() - 1];
            curve.push(last - step);
        }
        prop_assert_eq!(find_peaks(&curve), vec![top]);
    }

    /// Percentiles stay within the data range.
    #[test]
    fn percentile_is_bounded(
        values in prop::collection::vec(-1e3f64..1e3, 1..100),
        q in 0.0f64..100.0,
    ) {
        let p = percentile(&values, q);
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(p >= lo - 1e-9 && p <= hi + 1e-9);
    }

    /// Outlier rejection only ever clears use flags.
    #[test]
    fn exclusion_is_one_way(
        rows in prop::collection::vec((-150.0f64..-90.0, any::<bool>()), 3..30),
        k in 0.5f64..4.0,
    ) {
        let (levels, excluded): (Vec<f64>, Vec<bool>) = rows.into_iter().unzip();
        let mut table = level_table(&levels, &excluded);
        let before = table.use_flags();
        let rejected = reject_outliers(&mut table, &OutlierRule::psd_std(k), false).unwrap();
        let after = table.use_flags();

        prop_assert_eq!(after.len(), before.len());
        for (b, a) in before.iter().zip(&after) {
            prop_assert!(*b || !*a, "an excluded window came back");
        }
        for i in rejected {
            prop_assert!(before[i] && !after[i]);
        }
    }
}
