//! Cloud control tool
//!
//! Runs an in-process universe through a store/load cycle, inspects file
//! archives and prints the type registry.

use anyhow::{bail, Context};
use archive_cloud::core::archive::load_cookie;
use archive_cloud::{
    registry, Cloud, CloudConfig, CloudStats, FileInputArchive, InputArchive, LocalUniverse,
    ObjectRef, Recordlist, Tensor, World,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cloudctl")]
#[command(about = "Typed archives and the record cloud")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store sample values in a universe and load them back in sub-worlds
    Demo {
        /// Ranks in the universe
        #[arg(short = 'n', long, default_value = "4")]
        ranks: usize,

        /// Number of sub-worlds to load in
        #[arg(short = 'g', long, default_value = "2")]
        groups: usize,

        /// Cloud configuration (TOML)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },

    /// Validate a file archive and show its first value's cookie
    Inspect {
        /// Path to the archive
        file: PathBuf,
    },

    /// Print the type registry
    Types,
}

#[derive(Serialize)]
struct DemoReport {
    ranks: usize,
    groups: usize,
    records: usize,
    recordlist: Recordlist,
    cloud: CloudStats,
}

/// One basis function of the demo: shared, never copied
#[derive(Debug)]
struct Shell {
    exponent: f64,
}

type Sample = (usize, f64, String, Vec<f64>, Tensor<f64>);

fn sample() -> archive_cloud::Result<Sample> {
    let grid: Vec<f64> = (0..64).map(|i| i as f64 / 8.0).collect();
    let tensor = Tensor::from_vec(&[2, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])?;
    Ok((7, std::f64::consts::PI, "water".to_string(), grid, tensor))
}

/// The per-rank body of `demo`
fn demo_rank(
    world: archive_cloud::ThreadWorld,
    config: &CloudConfig,
    universe: &LocalUniverse,
    groups: usize,
) -> archive_cloud::Result<Option<(Recordlist, CloudStats)>> {
    let mut cloud = Cloud::with_config(universe.container(), config.clone())?;

    let value = sample()?;
    let records = cloud.store(&world, &value)?;

    let shells = (1..=3)
        .map(|i| ObjectRef::share(&world, || Shell { exponent: i as f64 * 0.5 }))
        .collect::<archive_cloud::Result<Vec<_>>>()?;
    let shell_records = cloud.store(&world, &shells)?;

    let sub = world.split(groups)?;
    let loaded: Sample = cloud.load(&sub, &records)?;
    let reloaded: Sample = cloud.load(&sub, &records)?;
    if loaded != value || reloaded != value {
        return Err(archive_cloud::CloudError::InvalidValue(format!(
            "rank {} loaded a different value",
            world.rank()
        )));
    }

    let loaded_shells: Vec<ObjectRef<Shell>> = cloud.load(&sub, &shell_records)?;
    if !loaded_shells.iter().zip(&shells).all(|(a, b)| a.ptr_eq(b)) {
        return Err(archive_cloud::CloudError::InvalidValue(format!(
            "rank {} resolved different shells",
            world.rank()
        )));
    }
    let exponents: f64 = loaded_shells
        .iter()
        .filter_map(|s| s.get())
        .map(|s| s.exponent)
        .sum();

    info!(
        "Rank {} (rank {} of {}) loaded {} records, shell exponents sum to {}",
        world.rank(),
        sub.rank(),
        sub.id(),
        records.len() + shell_records.len(),
        exponents
    );

    cloud.clear_cache(&sub);
    let stats = cloud.report(&world);

    let mut all = records;
    all.append(shell_records);
    Ok((world.rank() == 0).then_some((all, stats)))
}

fn demo(ranks: usize, groups: usize, config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => CloudConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CloudConfig::default(),
    };
    if groups == 0 || groups > ranks {
        bail!("groups must lie in 1..={}", ranks);
    }

    info!("Starting universe of {} ranks, {} sub-worlds", ranks, groups);
    let universe = LocalUniverse::new(ranks);
    let results = universe.run(|world| demo_rank(world, &config, &universe, groups));

    let mut summary = None;
    for (rank, result) in results.into_iter().enumerate() {
        if let Some(found) = result.with_context(|| format!("Rank {} failed", rank))? {
            summary = Some(found);
        }
    }
    let (recordlist, cloud) = summary.context("Rank 0 produced no report")?;

    let report = DemoReport {
        ranks,
        groups,
        records: universe.container().len(),
        recordlist,
        cloud,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn inspect(file: PathBuf) -> anyhow::Result<()> {
    let mut archive = FileInputArchive::open(&file)
        .with_context(|| format!("Failed to open archive {}", file.display()))?;
    let payload = archive.remaining().unwrap_or(0);

    println!("{}: valid archive, {} payload bytes", file.display(), payload);
    if payload > 0 {
        let cookie = load_cookie(&mut archive)?;
        println!("first value: cookie {} ({})", cookie, registry().name_of(cookie));
    }
    Ok(())
}

fn types() {
    let registry = registry();
    for (cookie, name) in registry.entries() {
        println!("{:>3}  {}", cookie, name);
    }
    for name in registry.callable_names() {
        println!("fn   {}", name);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Demo {
            ranks,
            groups,
            config,
        } => demo(ranks, groups, config),
        Command::Inspect { file } => inspect(file),
        Command::Types => {
            types();
            Ok(())
        }
    }
}
