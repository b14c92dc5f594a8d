//! Criterion benchmarks for sprit-core pipeline stages
//!
//! Run with: cargo bench -p sprit-core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sprit_core::noise::curate;
use sprit_core::psd::aggregate;
use sprit_core::smoothing::{KonnoOhmachi, savgol_filter};
use sprit_core::synthetic::generate;
use sprit_core::{
    ExclusionSet, HvsrParams, InstrumentResponse, NoiseParams, NoiseRemovalMethod, PsdParams,
    Resonance, SeismicRecord, SiteInput, SiteMetadata, SyntheticParams, ThreeComponent,
    WelchEstimator, process_site,
};

fn record(duration: f64) -> SeismicRecord {
    generate(&SyntheticParams {
        duration,
        resonance: Some(Resonance::at(2.0)),
        ..SyntheticParams::default()
    })
    .unwrap()
}

// ============================================================================
// Stage benchmarks
// ============================================================================

fn bench_curation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Curation");
    let rec = record(600.0);

    for method in [
        NoiseRemovalMethod::AntiTrigger,
        NoiseRemovalMethod::NoiseThreshold,
        NoiseRemovalMethod::Auto,
    ] {
        let params = NoiseParams {
            method,
            ..NoiseParams::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(method), &params, |b, p| {
            b.iter(|| black_box(curate(black_box(&rec), p, &[]).unwrap()))
        });
    }

    group.finish();
}

fn bench_psd(c: &mut Criterion) {
    let mut group = c.benchmark_group("WelchPsd");
    let responses: ThreeComponent<InstrumentResponse> = ThreeComponent::default();
    let exclusions = ExclusionSet::default();

    for &duration in &[300.0, 600.0, 1800.0] {
        let rec = record(duration);
        let params = PsdParams::default();
        group.bench_with_input(BenchmarkId::from_parameter(duration as u32), &rec, |b, r| {
            b.iter(|| {
                black_box(aggregate(r, &responses, &params, &exclusions, &WelchEstimator).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Smoothing");
    let freqs: Vec<f64> = (0..1000).map(|i| 0.1 * 1.005f64.powi(i)).collect();
    let curve: Vec<f64> = freqs.iter().map(|f| (f.ln() * 3.0).sin()).collect();

    group.bench_function("SavitzkyGolay_51", |b| {
        b.iter(|| black_box(savgol_filter(black_box(&curve), 51, 3)))
    });

    let ko = KonnoOhmachi::new(&freqs, 40.0);
    group.bench_function("KonnoOhmachi_40", |b| {
        b.iter(|| black_box(ko.apply(black_box(&curve))))
    });

    group.finish();
}

// ============================================================================
// End-to-end
// ============================================================================

fn bench_process_site(c: &mut Criterion) {
    let mut group = c.benchmark_group("ProcessSite");
    group.sample_size(10);

    let input = SiteInput::new(SiteMetadata::named("BENCH"), record(600.0));
    let mut params = HvsrParams::default();
    params.noise.method = NoiseRemovalMethod::AntiTrigger;
    group.bench_function("anti_trigger_600s", |b| {
        b.iter(|| black_box(process_site(black_box(&input), &params).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_curation,
    bench_psd,
    bench_smoothing,
    bench_process_site
);
criterion_main!(benches);
