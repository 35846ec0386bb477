use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use catalink::config::CheckpointOverrides;
use catalink::{ConfigOverrides, EmbeddingStore, MatchProfile, Record, Resolver, ResolverConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"catalink - bibliographic entity resolution

USAGE:
    catalink dedupe --input <FILE> [OPTIONS]
    catalink match --sources <FILE> --targets <FILE> [OPTIONS]

COMMANDS:
    dedupe      Cluster duplicate records of one catalog; writes record_id -> canonical_id
    match       Match source records against a target catalog; writes match results

OPTIONS:
    -c, --config <FILE>         Path to config file (TOML)
        --input <FILE>          Records to deduplicate (JSON Lines)
        --sources <FILE>        Source records (JSON Lines)
        --targets <FILE>        Target records (JSON Lines)
    -o, --output <FILE>         Output file (JSON Lines) [default: stdout]
        --profile <NAME>        same-catalog | cross-catalog | reprints
        --threshold <N>         Dedup similarity threshold (0-100)
        --year-tolerance <N>    Cross-catalog year window
        --max-candidates <N>    Blocking fan-out cap
        --embeddings <FILE>     Title embeddings ({{"source_catalog", "id", "vector"}} JSON Lines)
        --checkpoint <FILE>     Checkpoint file for resumable matching
        --checkpoint-every <N>  Sources between checkpoint flushes
        --arbitrate             Escalate ambiguous pairs to the arbitration oracle
    -h, --help                  Print help

ENVIRONMENT:
    CATALINK_CONFIG             Path to config file
    CATALINK_<KEY>              Any config key, `__` between nesting levels
    ANTHROPIC_API_KEY           API key of the arbitration oracle
    RUST_LOG                    Log filter [default: info]
"#
    );
}

fn parse_profile(value: &str) -> anyhow::Result<MatchProfile> {
    match value {
        "same-catalog" => Ok(MatchProfile::SameCatalog),
        "cross-catalog" => Ok(MatchProfile::CrossCatalog),
        "reprints" => Ok(MatchProfile::Reprints),
        other => bail!("unknown profile: {other}"),
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_arg(flag)
        .map(|value| value.parse::<T>().with_context(|| format!("invalid value for {flag}: {value}")))
        .transpose()
}

fn build_overrides() -> anyhow::Result<ConfigOverrides> {
    let mut overrides = ConfigOverrides {
        profile: parse_arg("--profile").as_deref().map(parse_profile).transpose()?,
        similarity_threshold: parse_number("--threshold")?,
        year_tolerance: parse_number("--year-tolerance")?,
        max_candidates_per_record: parse_number("--max-candidates")?,
        ..ConfigOverrides::default()
    };
    if has_flag("--arbitrate") {
        overrides.use_arbitration = Some(true);
    }
    let checkpoint = CheckpointOverrides {
        path: parse_arg("--checkpoint").map(PathBuf::from),
        every: parse_number("--checkpoint-every")?,
    };
    if checkpoint.path.is_some() || checkpoint.every.is_some() {
        overrides.checkpoint = Some(checkpoint);
    }
    Ok(overrides)
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn write_lines<T: Serialize>(output: Option<&str>, items: impl IntoIterator<Item = T>) -> anyhow::Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("cannot create {path}"))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn required(flag: &str) -> anyhow::Result<PathBuf> {
    match parse_arg(flag) {
        Some(value) => Ok(PathBuf::from(value)),
        None => bail!("missing required option {flag}"),
    }
}

#[derive(Serialize)]
struct CanonicalLine<'a> {
    record_id: &'a str,
    canonical_id: &'a str,
}

fn run_dedupe(resolver: &Resolver, output: Option<&str>) -> anyhow::Result<()> {
    let records = read_records(&required("--input")?)?;
    let outcome = resolver.dedupe(&records)?;

    eprintln!(
        "{} records, {} clusters ({} with duplicates), {} merges",
        outcome.stats.records,
        outcome.stats.clusters,
        outcome.duplicate_groups().count(),
        outcome.stats.merges
    );
    write_lines(
        output,
        outcome.mapping.iter().map(|(record, canonical)| CanonicalLine {
            record_id: record.as_str(),
            canonical_id: canonical.as_str(),
        }),
    )
}

async fn run_match(resolver: Resolver, output: Option<&str>) -> anyhow::Result<()> {
    let sources = read_records(&required("--sources")?)?;
    let targets = read_records(&required("--targets")?)?;

    let resolver = match parse_arg("--embeddings") {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("cannot open {path}"))?;
            let store = EmbeddingStore::from_jsonl(BufReader::new(file))?;
            eprintln!("Loaded {} embeddings", store.len());
            resolver.with_embeddings(Arc::new(store))
        }
        None => resolver,
    };

    let outcome = resolver.match_catalogs(sources, targets).await?;
    let stats = &outcome.stats;
    eprintln!(
        "{} sources ({} resumed): {}",
        stats.sources,
        stats.resumed,
        stats
            .by_tier
            .iter()
            .map(|(tier, count)| format!("{tier}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    );
    if stats.arbitration_disabled {
        eprintln!("Arbitration was requested but no oracle was available; ambiguous pairs are Low");
    }
    if !stats.collisions.is_empty() {
        eprintln!("{} targets accepted by several sources", stats.collisions.len());
    }
    write_lines(output, &outcome.results)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let command = std::env::args().nth(1);
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("CATALINK_CONFIG").ok())
        .map(PathBuf::from);
    let config = ResolverConfig::load(config_path.as_deref(), build_overrides()?)?;
    let output = parse_arg("--output").or_else(|| parse_arg("-o"));
    let resolver = Resolver::new(config)?;

    match command.as_deref() {
        Some("dedupe") => run_dedupe(&resolver, output.as_deref()),
        Some("match") => run_match(resolver, output.as_deref()).await,
        _ => {
            print_help();
            bail!("expected a command: dedupe or match");
        }
    }
}
