mod support;

use catalink::cluster::prepare_records;
use catalink::evaluate::{blocking_recall, evaluate_clusters};
use catalink::index::BlockingConfig;
use catalink::normalize::YearBounds;
use catalink::similarity::{Scorer, ScoringParams};
use catalink::test_support::generate_catalog;
use catalink::{MatchProfile, Record, RecordId, Resolver, ResolverConfig};

fn resolver() -> Resolver {
    Resolver::new(ResolverConfig::for_profile(MatchProfile::SameCatalog)).expect("valid config")
}

#[test]
fn transcription_variants_share_a_cluster() -> anyhow::Result<()> {
    let (mut a, mut b) = support::copernicus_pair();
    a.source_catalog = b.source_catalog.clone();
    b.id = RecordId::new("ustc-8");
    a.id = RecordId::new("ustc-9");

    let outcome = resolver().dedupe(&[a.clone(), b.clone()])?;
    assert_eq!(outcome.clusters.len(), 1);
    // More populated fields wins
    assert_eq!(outcome.mapping.canonical_of(&b.id), Some(&a.id));
    assert_eq!(outcome.mapping.canonical_of(&a.id), Some(&a.id));
    Ok(())
}

#[test]
fn canonical_prefers_longer_description_on_equal_fields() -> anyhow::Result<()> {
    let records = vec![
        Record::new("u-2", "ustc", "DE REVOLVTIONIBVS ORBIVM COELESTIVM")
            .with_author("N. Copernicus")
            .with_year(1543),
        Record::new("u-1", "ustc", "De revolutionibus orbium coelestium")
            .with_author("Copernicus, Nicolaus")
            .with_year(1543),
    ];
    let outcome = resolver().dedupe(&records)?;
    assert_eq!(outcome.clusters.len(), 1);
    assert_eq!(outcome.clusters[0].canonical, RecordId::new("u-1"));
    assert_eq!(outcome.mapping.duplicates(), 1);
    Ok(())
}

#[test]
fn untitled_undated_record_stays_singleton() -> anyhow::Result<()> {
    let records = vec![
        Record::new("x-1", "bph", "").with_author("Anonymous"),
        Record::new("x-2", "bph", "Anonymous epistolae").with_author("Anonymous"),
        Record::new("x-3", "bph", "Anonymous epistolae").with_author("Anonymous"),
    ];
    let outcome = resolver().dedupe(&records)?;
    assert_eq!(outcome.blocking.records_skipped, 1);
    assert_eq!(
        outcome.mapping.canonical_of(&RecordId::new("x-1")),
        Some(&RecordId::new("x-1"))
    );
    assert_eq!(outcome.duplicate_groups().count(), 1);
    Ok(())
}

#[test]
fn records_from_other_catalogs_are_not_clustered() -> anyhow::Result<()> {
    let (a, b) = support::copernicus_pair();
    let outcome = resolver().dedupe(&[a, b])?;
    assert!(outcome.mapping.is_identity());
    assert_eq!(outcome.clusters.len(), 2);
    Ok(())
}

#[test]
fn deduplicating_canonicals_is_identity() -> anyhow::Result<()> {
    let data = generate_catalog(150, 0.3, 42);
    let resolver = resolver();
    let first = resolver.dedupe(&data.records)?;

    let canonicals: Vec<Record> = data
        .records
        .iter()
        .filter(|record| first.mapping.canonical_of(&record.id) == Some(&record.id))
        .cloned()
        .collect();
    assert_eq!(canonicals.len(), first.clusters.len());

    let second = resolver.dedupe(&canonicals)?;
    assert!(second.mapping.is_identity());
    assert_eq!(second.stats.merges, 0);
    Ok(())
}

#[test]
fn raising_threshold_never_adds_merges() -> anyhow::Result<()> {
    let data = generate_catalog(150, 0.4, 9);
    let mut previous = usize::MAX;
    for threshold in [60.0, 75.0, 85.0, 95.0, 100.0] {
        let mut config = ResolverConfig::for_profile(MatchProfile::SameCatalog);
        config.similarity_threshold = threshold;
        let merges = Resolver::new(config)?.dedupe(&data.records)?.stats.merges;
        assert!(merges <= previous, "threshold {threshold}: {merges} > {previous}");
        previous = merges;
    }
    Ok(())
}

#[test]
fn generated_duplicates_are_found() -> anyhow::Result<()> {
    let data = generate_catalog(150, 0.3, 3);
    let outcome = resolver().dedupe(&data.records)?;
    let evaluation = evaluate_clusters(&outcome.mapping, &data.true_pairs);
    assert_eq!(evaluation.false_negatives, 0, "{evaluation:?}");
    assert!(evaluation.precision >= 0.75, "{evaluation:?}");
    Ok(())
}

#[test]
fn blocking_covers_every_generated_duplicate() {
    let data = generate_catalog(180, 0.3, 21);
    let config = ResolverConfig::default();
    let recall = blocking_recall(
        &data.records,
        &data.true_pairs,
        BlockingConfig::from(&config),
        YearBounds::default(),
    );
    assert_eq!(recall.covered, recall.true_pairs);
    assert!((recall.recall - 1.0).abs() < f64::EPSILON);
}

#[test]
fn scores_are_symmetric() {
    let data = generate_catalog(60, 0.5, 5);
    let prepared = prepare_records(&data.records, YearBounds::default());
    let scorer = Scorer::fuzzy(ScoringParams::default());
    for a in &prepared {
        for b in prepared.iter().take(20) {
            assert_eq!(scorer.compare(a, b), scorer.compare(b, a));
            assert_eq!(scorer.score(a, b), scorer.score(b, a));
        }
    }
}
