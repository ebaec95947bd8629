//! Replays CSV bar files through one engine graph per symbol.
//!
//! Each file is one symbol's base stream. Files are replayed in parallel and
//! reported in the order given: every confirmed signal, then a structure
//! summary per frequency.
//!
//! Usage: chan-replay [--config chan.toml] [--symbol SYM] [--exchange EX] [--json] <file.csv>...

mod settings;

use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chan_config::Config;
use chan_core::Frequency;
use chan_data::{CsvLoader, DataSource};
use chan_ta::{ChanGraph, EngineSnapshot, RecordingHandler, SignalEvent};
use rayon::prelude::*;
use serde::Serialize;

struct Args {
    config: Option<PathBuf>,
    symbol: Option<String>,
    exchange: Option<String>,
    json: bool,
    files: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        config: None,
        symbol: None,
        exchange: None,
        json: false,
        files: Vec::new(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => { parsed.config = Some(PathBuf::from(&args[i + 1])); i += 2; }
            "--symbol" if i + 1 < args.len() => { parsed.symbol = Some(args[i + 1].clone()); i += 2; }
            "--exchange" if i + 1 < args.len() => { parsed.exchange = Some(args[i + 1].clone()); i += 2; }
            "--json" => { parsed.json = true; i += 1; }
            flag if flag.starts_with("--") => bail!("unknown or incomplete option `{}`", flag),
            file => { parsed.files.push(PathBuf::from(file)); i += 1; }
        }
    }

    if parsed.files.is_empty() {
        bail!("usage: chan-replay [--config chan.toml] [--symbol SYM] [--exchange EX] [--json] <file.csv>...");
    }
    if parsed.symbol.is_some() && parsed.files.len() > 1 {
        bail!("--symbol only applies to a single file");
    }
    Ok(parsed)
}

/// Everything one symbol's replay produced.
#[derive(Serialize)]
struct Report {
    symbol: String,
    bars: usize,
    #[serde(skip)]
    events: Vec<SignalEvent>,
    snapshots: Vec<EngineSnapshot>,
}

fn symbol_for(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn replay(config: &Config, path: &Path, symbol: &str) -> Result<Report> {
    let graph_config = settings::graph_config(config, symbol)?;
    let base = graph_config
        .levels
        .last()
        .map(|level| level.frequency)
        .unwrap_or(Frequency::Min1);

    let source = CsvLoader::new(path, symbol, &graph_config.exchange).with_frequency(base);
    let bars = source.load()?;
    let mut graph = ChanGraph::with_handler(graph_config, RecordingHandler::new())?;
    for bar in &bars {
        graph
            .on_bar(bar)
            .with_context(|| format!("{} at {}", symbol, bar.timestamp))?;
    }
    graph.finish()?;

    let snapshots = graph.snapshots();
    Ok(Report {
        symbol: symbol.to_string(),
        bars: bars.len(),
        events: graph.into_handler().events,
        snapshots,
    })
}

fn print_report(report: &Report) {
    println!("\n=== {} ({} bars) ===", report.symbol, report.bars);

    for event in &report.events {
        println!(
            "  {:<4} {:>5} price {:>10.3} volume {:.0}",
            format!("{:?}", event.side).to_uppercase(),
            event.frequency.label(),
            event.price,
            event.volume
        );
    }

    println!();
    println!("  freq   candles  strokes  segments  pivots  trends  buys  sells");
    for snap in &report.snapshots {
        let valid_buys = snap.buys.iter().filter(|s| s.valid).count();
        let valid_sells = snap.sells.iter().filter(|s| s.valid).count();
        println!(
            "  {:<5} {:>8} {:>8} {:>9} {:>7} {:>7} {:>5} {:>6}",
            snap.frequency.label(),
            snap.candles.len(),
            snap.strokes.len(),
            snap.segments.len(),
            snap.pivots.len(),
            snap.trends.len(),
            valid_buys,
            valid_sells
        );
    }
    for snap in &report.snapshots {
        for signal in snap.buys.iter().chain(snap.sells.iter()) {
            println!(
                "  {} {} at {} price {:.3}{}",
                snap.frequency,
                signal.kind,
                signal.timestamp,
                signal.price,
                if signal.valid { "" } else { " (invalidated)" }
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let start = Instant::now();
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(exchange) = &args.exchange {
        config.general.exchange = exchange.clone();
    }

    let jobs: Vec<(PathBuf, String)> = args
        .files
        .iter()
        .map(|path| {
            let symbol = args
                .symbol
                .clone()
                .unwrap_or_else(|| symbol_for(path, &config.general.default_symbol));
            (path.clone(), symbol)
        })
        .collect();

    log::info!("replaying {} file(s)", jobs.len());
    let reports: Vec<Result<Report>> = jobs
        .par_iter()
        .map(|(path, symbol)| {
            replay(&config, path, symbol).with_context(|| format!("replay of {} failed", path.display()))
        })
        .collect();

    let mut failed = 0;
    for report in reports {
        match report {
            Ok(report) if args.json => println!("{}", serde_json::to_string_pretty(&report)?),
            Ok(report) => print_report(&report),
            Err(err) => {
                failed += 1;
                eprintln!("error: {:#}", err);
            }
        }
    }

    if !args.json {
        println!("\nDone in {:.2?}", start.elapsed());
    }
    if failed > 0 {
        bail!("{} of {} replays failed", failed, jobs.len());
    }
    Ok(())
}
