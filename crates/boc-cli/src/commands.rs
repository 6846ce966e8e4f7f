use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use boc_cache::{BitemporalCache, CacheConfig, CacheStatistics, InMemoryMetrics};
use boc_types::{Interval, VersionedId};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::cli::*;

/// Valid-time length of one synthetic version: a day in milliseconds.
const VALID_SPAN: i64 = 86_400_000;
/// Database-time gap between successive versions: an hour.
const DB_STEP: i64 = 3_600_000;

type Cache = BitemporalCache<VersionedId, String>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Bench(args) => cmd_bench(args, cli.format),
        Command::Stats(args) => cmd_stats(args, cli.format),
    }
}

#[derive(Serialize)]
struct BenchReport {
    objects: usize,
    versions: usize,
    readers: usize,
    reads: usize,
    hits: u64,
    misses: u64,
    populate_ms: f64,
    read_ms: f64,
    statistics: CacheStatistics,
}

#[derive(Serialize)]
struct StatsReport {
    deleted: usize,
    before: CacheStatistics,
    after: CacheStatistics,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("loading cache config from {}", path.display())),
        None => Ok(CacheConfig::default()),
    }
}

/// Write `versions` successive versions of each object. Each version is
/// valid for one span and becomes known one step after its predecessor;
/// the newest stays open-ended.
fn populate(cache: &Cache, objects: usize, versions: usize) -> anyhow::Result<Vec<VersionedId>> {
    let mut ids = Vec::with_capacity(objects * versions);
    for o in 0..objects {
        let name = format!("object-{o}");
        let mut previous: Option<VersionedId> = None;
        for v in 0..versions {
            let known_at = v as i64 * DB_STEP;
            let valid_from = v as i64 * VALID_SPAN;
            let id = VersionedId::versioned(&name, format!("v{v}")).with_db(known_at);
            if let Some(previous) = &previous {
                cache.supersede(previous, valid_from)?;
            }
            cache.put(
                id.clone(),
                Interval::open(valid_from),
                Interval::open(known_at),
                format!("{name}@v{v}"),
            )?;
            previous = Some(id.clone());
            ids.push(id);
        }
    }
    Ok(ids)
}

fn cmd_bench(args: BenchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let workload = &args.workload;
    anyhow::ensure!(workload.objects > 0, "--objects must be at least 1");
    anyhow::ensure!(workload.versions > 0, "--versions must be at least 1");

    let config = load_config(workload.config.as_deref())?;
    let metrics = Arc::new(InMemoryMetrics::new());
    let cache = Cache::new(&config)?.with_metrics(metrics.clone());

    let started = Instant::now();
    populate(&cache, workload.objects, workload.versions)?;
    let populate_ms = started.elapsed().as_secs_f64() * 1_000.0;

    let valid_range = workload.versions as i64 * VALID_SPAN;
    let db_range = workload.versions as i64 * DB_STEP;
    let started = Instant::now();
    thread::scope(|s| {
        for reader in 0..args.readers {
            let cache = &cache;
            let seed = workload.seed.wrapping_add(reader as u64);
            let (objects, reads) = (workload.objects, args.reads);
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..reads {
                    let lookup = VersionedId::object(format!("object-{}", rng.gen_range(0..objects)));
                    cache.get(&lookup, rng.gen_range(0..valid_range), rng.gen_range(0..db_range));
                }
            });
        }
    });
    let read_ms = started.elapsed().as_secs_f64() * 1_000.0;

    let report = BenchReport {
        objects: workload.objects,
        versions: workload.versions,
        readers: args.readers,
        reads: args.readers * args.reads,
        hits: metrics.counter("cache.hit"),
        misses: metrics.counter("cache.miss"),
        populate_ms,
        read_ms,
        statistics: cache.statistics()?,
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Populated {} objects x {} versions in {:.1} ms",
        "✓".green().bold(),
        report.objects.to_string().bold(),
        report.versions.to_string().bold(),
        report.populate_ms
    );
    let per_sec = if report.read_ms > 0.0 {
        report.reads as f64 / (report.read_ms / 1_000.0)
    } else {
        0.0
    };
    println!(
        "{} {} reads on {} threads in {:.1} ms ({:.0} reads/s)",
        "✓".green().bold(),
        report.reads,
        report.readers,
        report.read_ms,
        per_sec
    );
    println!(
        "  Hits: {}  Misses: {}",
        report.hits.to_string().green(),
        report.misses.to_string().yellow()
    );
    print_statistics("Statistics", &report.statistics);
    Ok(())
}

fn cmd_stats(args: StatsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let workload = &args.workload;
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.deletes),
        "--deletes must be a fraction between 0 and 1, got {}",
        args.deletes
    );

    let config = load_config(workload.config.as_deref())?;
    let cache = Cache::new(&config)?;
    let ids = populate(&cache, workload.objects, workload.versions)?;

    let count = (ids.len() as f64 * args.deletes).round() as usize;
    let mut rng = StdRng::seed_from_u64(workload.seed);
    let mut deleted = 0;
    for id in ids.choose_multiple(&mut rng, count) {
        if cache.delete(id)? {
            deleted += 1;
        }
    }

    let before = cache.statistics()?;
    let after = cache.rebuild()?;
    let report = StatsReport {
        deleted,
        before,
        after,
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Deleted {} of {} versions",
        report.deleted.to_string().bold(),
        ids.len()
    );
    print_statistics("Before rebuild", &report.before);
    print_statistics("After rebuild", &report.after);
    Ok(())
}

fn print_statistics(label: &str, stats: &CacheStatistics) {
    println!("{}", label.bold());
    for (name, index) in [("valid", &stats.valid), ("db", &stats.db)] {
        println!(
            "  {:<5} {} entries, {} leaves, depth {}, {} tombstones, fragmentation {}",
            name.cyan(),
            index.live_entries,
            index.leaf_count,
            index.max_depth,
            index.tombstones,
            format!("{:.2}%", index.fragmentation_percent()).yellow()
        );
        if index.overflow_entries > 0 {
            println!("        {} overflow entries at the depth limit", index.overflow_entries);
        }
        if index.stray_entries > 0 {
            println!(
                "        {} {} entries outside their leaf triangle",
                "✗".red().bold(),
                index.stray_entries
            );
        }
    }
    println!(
        "  {:<5} {} ({} direct)",
        "values".cyan(),
        stats.values,
        stats.direct_values
    );
}
