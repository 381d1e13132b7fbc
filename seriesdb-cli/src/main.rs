//! SeriesDB CLI
//!
//! Command-line interface for SeriesDB snapshots:
//! - Simulate multi-key ingestion traffic
//! - Inspect series info and ranges
//! - Query the label index

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use seriesdb_core::index::LabelFilter;
use seriesdb_core::storage::{Engine, EngineConfig, SharedEngine};
use seriesdb_core::{AggregationType, Label, Sample};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "seriesdb")]
#[command(version = seriesdb_core::VERSION)]
#[command(about = "Embedded time-series storage with compaction rules")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Snapshot file
    #[arg(short, long, default_value = "seriesdb.sdb", global = true)]
    pub snapshot: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest generated traffic into many keys, then write a snapshot
    Simulate {
        /// Number of source keys
        #[arg(long, default_value_t = 50)]
        key_count: usize,
        /// Samples per key
        #[arg(long, default_value_t = 2000)]
        samples: u64,
        /// Writer threads
        #[arg(long, default_value_t = 20)]
        workers: usize,
        /// Create avg/10, avg/60 and count/10 destinations for every key
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        with_compaction: bool,
        /// Timestamp of the first sample
        #[arg(long, default_value_t = 1551347864)]
        start_timestamp: u64,
        /// Key name pattern, `{index}` is replaced by the key number
        #[arg(long, default_value = "test{index}")]
        key_format: String,
        /// Use random values instead of the sample index
        #[arg(long)]
        random: bool,
        /// Verify an existing snapshot instead of writing one
        #[arg(long)]
        check_only: bool,
    },

    /// Show series metadata
    Info {
        key: String,
    },

    /// Print samples of a series
    Range {
        key: String,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = u64::MAX)]
        end: u64,
        /// Aggregation applied per bucket (avg, sum, min, max, range, count, first, last)
        #[arg(short, long, requires = "bucket")]
        aggregation: Option<AggregationType>,
        /// Bucket size in seconds
        #[arg(short, long, requires = "aggregation")]
        bucket: Option<u64>,
    },

    /// List series whose labels match every filter (k=v, k!=v, k=, k!=)
    QueryIndex {
        #[arg(required = true)]
        filters: Vec<String>,
    },

    /// List all series keys
    Keys,

    /// List every label key in the index
    Labels,
}

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            key_count,
            samples,
            workers,
            with_compaction,
            start_timestamp,
            key_format,
            random,
            check_only,
        } => {
            let plan = Simulation {
                key_count,
                samples,
                workers: workers.max(1),
                with_compaction,
                start_timestamp,
                key_format,
                random,
            };
            if check_only {
                let engine = Engine::open(EngineConfig::default(), &cli.snapshot)?;
                check(&engine, &plan)?;
            } else {
                simulate(&plan, &cli.snapshot)?;
            }
        }

        Commands::Info { key } => {
            let engine = open(&cli.snapshot)?;
            let info = engine.info(&key)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
                OutputFormat::Table => {
                    println!("Key:              {}", info.key);
                    println!("Total samples:    {}", info.total_samples);
                    println!("Chunks:           {}", info.chunk_count);
                    println!("Last timestamp:   {}", info.last_timestamp);
                    println!("Retention (s):    {}", info.retention_secs);
                    println!("Chunk size:       {}", info.max_samples_per_chunk);
                    println!("Labels:");
                    for (k, v) in &info.labels {
                        println!("  {}={}", k, v);
                    }
                    println!("Rules:");
                    for rule in &info.rules {
                        println!(
                            "  -> {} ({} every {}s)",
                            rule.dest_key, rule.aggregation, rule.bucket_secs
                        );
                    }
                }
            }
        }

        Commands::Range {
            key,
            start,
            end,
            aggregation,
            bucket,
        } => {
            let engine = open(&cli.snapshot)?;
            let samples: Vec<Sample> = match (aggregation, bucket) {
                (Some(agg), Some(bucket)) => engine.query_aggregated(&key, start, end, agg, bucket)?,
                _ => engine.query(&key, start, end)?.collect(),
            };
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&samples)?),
                OutputFormat::Table => {
                    println!("{:<15} {}", "Timestamp", "Value");
                    println!("{}", "-".repeat(30));
                    for sample in &samples {
                        println!("{:<15} {}", sample.timestamp, sample.value);
                    }
                    println!();
                    println!("{} samples", samples.len());
                }
            }
        }

        Commands::QueryIndex { filters } => {
            let engine = open(&cli.snapshot)?;
            let filters = LabelFilter::parse_all(filters.as_slice())?;
            let keys = engine.query_index(&filters)?;
            print_keys(&keys, cli.format)?;
        }

        Commands::Keys => {
            let engine = open(&cli.snapshot)?;
            print_keys(&engine.keys(), cli.format)?;
        }

        Commands::Labels => {
            let engine = open(&cli.snapshot)?;
            print_keys(&engine.index().label_keys(), cli.format)?;
        }
    }

    Ok(())
}

/// Parameters of a traffic simulation
struct Simulation {
    key_count: usize,
    samples: u64,
    workers: usize,
    with_compaction: bool,
    start_timestamp: u64,
    key_format: String,
    random: bool,
}

impl Simulation {
    fn key(&self, index: usize) -> String {
        self.key_format.replace("{index}", &index.to_string())
    }
}

fn open(path: &Path) -> anyhow::Result<Engine> {
    if !path.exists() {
        bail!("Snapshot not found: {:?}", path);
    }
    Engine::open(EngineConfig::default(), path)
        .with_context(|| format!("Failed to load snapshot {:?}", path))
}

fn print_keys(keys: &[String], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(keys)?),
        OutputFormat::Table => {
            if keys.is_empty() {
                println!("No matching series.");
            }
            for key in keys {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

fn simulate(plan: &Simulation, snapshot: &Path) -> anyhow::Result<()> {
    info!(
        "Simulating from {} to {}",
        plan.start_timestamp,
        plan.start_timestamp + plan.samples
    );

    let engine = SharedEngine::new(EngineConfig::default());
    for index in 0..plan.key_count {
        let key = plan.key(index);
        let labels = vec![Label::new("index", index.to_string())];
        engine.create_series(&key, labels)?;
        if plan.with_compaction {
            for (agg, bucket) in [
                (AggregationType::Avg, 10),
                (AggregationType::Avg, 60),
                (AggregationType::Count, 10),
            ] {
                create_compacted_key(&engine, index, &key, agg, bucket)?;
            }
        }
    }

    let started = Instant::now();
    let mut handles = Vec::with_capacity(plan.workers);
    for worker in 0..plan.workers {
        let engine = engine.clone();
        let keys: Vec<String> = (worker..plan.key_count)
            .step_by(plan.workers)
            .map(|index| plan.key(index))
            .collect();
        let (start, samples, random) = (plan.start_timestamp, plan.samples, plan.random);

        handles.push(thread::spawn(move || -> seriesdb_core::Result<u64> {
            let mut rng = rand::thread_rng();
            let mut inserted = 0;
            for key in &keys {
                for i in 0..samples {
                    let value = if random { rng.gen_range(0.0..100.0) } else { i as f64 };
                    engine.add_sample(key, start + i, value)?;
                    inserted += 1;
                }
            }
            Ok(inserted)
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        match handle.join() {
            Ok(result) => inserted += result?,
            Err(_) => bail!("Writer thread panicked"),
        }
    }
    let elapsed = started.elapsed();

    println!("# items inserted: {}", inserted);
    println!(
        "took {:.3}s to insert, average insert time {:.4}ms",
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / inserted.max(1) as f64
    );

    engine.read().persist(snapshot)?;
    Ok(())
}

fn create_compacted_key(
    engine: &SharedEngine,
    index: usize,
    source: &str,
    agg: AggregationType,
    bucket: u64,
) -> anyhow::Result<()> {
    let dest = format!("{}_{}_{}", source, agg.name().to_lowercase(), bucket);
    let labels = vec![
        Label::new("index", index.to_string()),
        Label::new("aggregation", agg.name().to_lowercase()),
        Label::new("bucket", bucket.to_string()),
    ];
    engine.create_series(&dest, labels)?;
    engine.create_rule(source, &dest, bucket, agg)?;
    Ok(())
}

fn check(engine: &Engine, plan: &Simulation) -> anyhow::Result<()> {
    if plan.random {
        warn!("Random values cannot be verified, checking timestamps only");
    }

    let end = plan.start_timestamp + plan.samples;
    let mut failed = 0;
    for index in 0..plan.key_count {
        let key = plan.key(index);
        let samples: Vec<Sample> = match engine.query(&key, 0, end) {
            Ok(iter) => iter.collect(),
            Err(e) => {
                warn!("{}: {}", key, e);
                failed += 1;
                continue;
            }
        };

        let intact = samples.len() as u64 == plan.samples
            && samples.iter().zip(0..).all(|(sample, i)| {
                sample.timestamp == plan.start_timestamp + i
                    && (plan.random || sample.value == i as f64)
            });
        if !intact {
            warn!("{}: samples do not match the simulated traffic", key);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} keys are missing or incomplete", failed);
    }
    println!("# pass, all items exist in the database");
    Ok(())
}
