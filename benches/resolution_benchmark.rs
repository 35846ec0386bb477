use catalink::cluster::prepare_records;
use catalink::index::{BlockingConfig, BlockingIndex};
use catalink::normalize::{normalize_title, YearBounds};
use catalink::similarity::{token_set_ratio, Scorer, ScoringParams};
use catalink::test_support::{generate_catalog, generate_catalogs};
use catalink::{MatchProfile, Resolver, ResolverConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

fn benchmark_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    let a = normalize_title("De revolutionibus orbium coelestium libri VI");
    let b = normalize_title("DE REVOLVTIONIBVS ORBIVM COELESTIVM, LIBRI SEX");

    group.bench_function("normalize_title", |bench| {
        bench.iter(|| normalize_title(black_box("Theologia Platonica de immortalitate animorum")))
    });
    group.bench_function("token_set_ratio", |bench| {
        bench.iter(|| token_set_ratio(black_box(&a), black_box(&b)))
    });

    let data = generate_catalog(200, 0.3, 42);
    let prepared = prepare_records(&data.records, YearBounds::default());
    let scorer = Scorer::fuzzy(ScoringParams::default());
    group.throughput(Throughput::Elements(prepared.len() as u64 - 1));
    group.bench_function("compare_row", |bench| {
        bench.iter(|| {
            prepared
                .windows(2)
                .map(|pair| scorer.score(&pair[0], &pair[1]))
                .count()
        })
    });
    group.finish();
}

fn benchmark_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking");
    group.sample_size(20);

    for count in [1_000u32, 10_000] {
        let data = generate_catalog(count, 0.2, 7);
        let prepared = prepare_records(&data.records, YearBounds::default());
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("build", count), &prepared, |bench, prepared| {
            bench.iter(|| BlockingIndex::build(black_box(prepared), BlockingConfig::default()))
        });

        let index = BlockingIndex::build(&prepared, BlockingConfig::default());
        group.bench_with_input(BenchmarkId::new("candidate_pairs", count), &index, |bench, index| {
            bench.iter(|| index.candidate_pairs().len())
        });
    }
    group.finish();
}

fn benchmark_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for count in [1_000u32, 5_000] {
        group.throughput(Throughput::Elements(count as u64));

        let data = generate_catalog(count, 0.25, 11);
        let resolver = Resolver::new(ResolverConfig::for_profile(MatchProfile::SameCatalog))
            .expect("valid config");
        group.bench_with_input(BenchmarkId::new("dedupe", count), &data.records, |bench, records| {
            bench.iter(|| resolver.dedupe(black_box(records)).expect("dedupe"))
        });

        let data = generate_catalogs(count, 0.5, 13);
        let resolver = Resolver::new(ResolverConfig::default()).expect("valid config");
        let matcher = resolver.matcher();
        group.bench_with_input(BenchmarkId::new("match", count), &data, |bench, data| {
            bench.iter(|| {
                matcher
                    .match_records(black_box(&data.sources), black_box(&data.targets), None)
                    .expect("match")
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_similarity,
    benchmark_blocking,
    benchmark_resolution
);
criterion_main!(benches);
