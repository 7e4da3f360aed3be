//! Sampleflow - command line front end
//!
//! Loads delimited files, runs the realtime generator and pushes stores
//! through transform chains.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sampleflow::source::{FileOptions, ParseCounters};
use sampleflow::transform::builtin;
use sampleflow::{
    ChainEngine, CsvExport, CustomSource, FileSource, ParamValue, ParseConfig, RealtimeConfig,
    RealtimeSource, SampleStore, Source, StoreStatistics, WaveformMode,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sampleflow",
    version,
    about = "Multi-field sample acquisition, transformation chains and CSV export"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print statistics as JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load a delimited file and print its statistics
    Load(LoadArgs),
    /// Load a file with a custom parse configuration
    Custom(CustomArgs),
    /// Run the realtime generator
    Generate(GenerateArgs),
    /// Run a transform chain over a loaded file
    Chain(ChainArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// Input file
    file: PathBuf,

    /// Column delimiter (auto-detected when omitted; accepts tab, space, ...)
    #[arg(long)]
    delimiter: Option<String>,

    /// The first line is data, not a header
    #[arg(long, default_value_t = false)]
    no_header: bool,

    /// Lines to skip before reading
    #[arg(long, default_value_t = 0)]
    skip: usize,
}

#[derive(Args)]
struct CustomArgs {
    /// Input file
    file: PathBuf,

    /// Parse configuration, e.g. "delimiter=semicolon;columns=0:time,1:temp;min=-50"
    #[arg(long, default_value = "")]
    config: String,
}

#[derive(Args)]
struct GenerateArgs {
    /// Waveform: sine, square, triangle, noise, ramp, custom
    #[arg(long, default_value = "sine")]
    mode: WaveformMode,

    /// Samples per second (up to 1000)
    #[arg(long, default_value_t = 10.0)]
    rate: f64,

    #[arg(long, default_value_t = 1.0)]
    amplitude: f64,

    #[arg(long, default_value_t = 1.0)]
    frequency: f64,

    /// Standard deviation of additive noise
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    /// How long to run
    #[arg(long, default_value = "5", value_parser = parse_seconds)]
    seconds: Duration,

    /// Retained samples
    #[arg(long, default_value_t = 1000)]
    buffer: usize,

    /// Write the retained samples as CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ChainArgs {
    /// Input file
    file: PathBuf,

    /// Stage as name[:key=value,...], e.g. movavg:window_size=3 (repeatable)
    #[arg(long = "stage", required = true)]
    stages: Vec<String>,

    /// Write the chain result as CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Machine-readable output of `load`
#[derive(Serialize)]
struct LoadReport {
    path: PathBuf,
    counters: ParseCounters,
    statistics: StoreStatistics,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sampleflow=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !cli.json {
        println!(
            "Sampleflow v{} (built {})",
            sampleflow::VERSION,
            sampleflow::BUILD_DATE
        );
        println!();
    }

    match cli.command {
        Command::Load(args) => run_load(args, cli.json),
        Command::Custom(args) => run_custom(args, cli.json),
        Command::Generate(args) => run_generate(args, cli.json),
        Command::Chain(args) => run_chain(args, cli.json),
    }
}

fn run_load(args: LoadArgs, json: bool) -> Result<()> {
    let delimiter = args
        .delimiter
        .as_deref()
        .map(|d| sampleflow::config::parse_char("delimiter", d))
        .transpose()?;
    let mut source = FileSource::with_options(FileOptions {
        path: args.file,
        delimiter,
        has_header: !args.no_header,
        skip_lines: args.skip,
    });
    source.start()?;

    let counters = source.counters();
    let stats = source.store().calculate_statistics();
    if json {
        let report = LoadReport {
            path: source.options().path.clone(),
            counters,
            statistics: stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Lines: {} total, {} valid, {} skipped, {} comments",
            counters.total_lines,
            counters.valid_lines,
            counters.skipped_lines,
            counters.comment_lines
        );
        print_store_summary(source.store());
    }
    Ok(())
}

fn run_custom(args: CustomArgs, json: bool) -> Result<()> {
    let mut source = CustomSource::with_path(&args.file);
    if !args.config.trim().is_empty() {
        let pairs = sampleflow::config::parse_pairs(&args.config)?;
        source.set_parse_config(ParseConfig::from_pairs(&pairs)?);
    }
    source.start()?;

    let stats = source.statistics();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Points: {} total, {} valid, {} skipped",
            stats.total_points, stats.valid_points, stats.skipped_points
        );
        print_store_summary(source.store());
    }
    Ok(())
}

fn run_generate(args: GenerateArgs, json: bool) -> Result<()> {
    let config = RealtimeConfig {
        mode: args.mode,
        sample_rate_hz: args.rate,
        amplitude: args.amplitude,
        frequency_hz: args.frequency,
        noise_level: args.noise,
        buffer_size: args.buffer,
        ..RealtimeConfig::default()
    };
    let max_rate = sampleflow::realtime::MAX_SAMPLE_RATE_HZ;
    if !(config.sample_rate_hz > 0.0 && config.sample_rate_hz <= max_rate) {
        bail!("--rate must be in (0, {}], got {}", max_rate, config.sample_rate_hz);
    }
    if config.buffer_size == 0 {
        bail!("--buffer must be greater than zero");
    }
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }

    let mut source = RealtimeSource::new(config);
    let events = source.subscribe();
    source.start()?;
    info!(
        mode = %args.mode,
        rate = args.rate,
        seconds = args.seconds.as_secs_f64(),
        "Generating"
    );

    // Unrepresentable deadlines run until Ctrl+C
    let deadline = Instant::now().checked_add(args.seconds);
    let mut notifications = 0u64;
    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        if events.recv_timeout(Duration::from_millis(100)).is_ok() {
            notifications += 1;
        }
    }

    let stats = source.statistics();
    let snapshot = source.snapshot();
    source.stop();

    if let Some(path) = &args.output {
        write_csv(path, &snapshot)?;
    }

    if json {
        let report = serde_json::json!({
            "finished_at": chrono::Utc::now().to_rfc3339(),
            "statistics": stats,
            "notifications": notifications,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Elapsed:   {:.2} s", stats.elapsed_secs);
        println!(
            "Samples:   {} generated, {} retained",
            stats.generated_samples, stats.total_samples
        );
        println!(
            "Values:    min {:.4}, max {:.4}, avg {:.4}, last {:.4}",
            stats.min_value, stats.max_value, stats.average_value, stats.current_value
        );
    }
    Ok(())
}

fn run_chain(args: ChainArgs, json: bool) -> Result<()> {
    let mut source = FileSource::with_path(&args.file);
    source.start()?;
    let input = source.take_store();

    let mut engine = ChainEngine::new();
    let mut names = Vec::with_capacity(args.stages.len());
    for stage in &args.stages {
        let (name, params) = parse_stage(stage)?;
        if !engine.contains(&name) {
            let transform = builtin(&name).ok_or_else(|| anyhow!("unknown transform: {}", name))?;
            engine.register(&name, transform)?;
        }
        for (key, value) in params {
            engine.set_parameter(&name, &key, value)?;
        }
        names.push(name);
    }

    let mut output = SampleStore::new();
    engine.run_chain(&names, &input, &mut output)?;

    if let Some(path) = &args.output {
        write_csv(path, &output)?;
    }

    if json {
        let report = serde_json::json!({
            "finished_at": chrono::Utc::now().to_rfc3339(),
            "stages": engine.all_stats(),
            "output": output.calculate_statistics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (name, stats) in engine.all_stats() {
            println!(
                "{:<10} runs {}  points {}  {:.3} ms",
                name, stats.run_count, stats.total_processed_count, stats.total_processing_time_ms
            );
        }
        println!();
        print_store_summary(&output);
    }
    Ok(())
}

/// Split `name[:key=value,...]` into a name and typed parameters
fn parse_stage(stage: &str) -> Result<(String, Vec<(String, ParamValue)>)> {
    let (name, rest) = stage.split_once(':').unwrap_or((stage, ""));
    let name = name.trim();
    if name.is_empty() {
        bail!("empty stage name in {:?}", stage);
    }

    let mut params = Vec::new();
    for entry in rest.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("expected key=value in stage {:?}, got {:?}", stage, entry))?;
        params.push((key.trim().to_string(), ParamValue::parse(value)));
    }
    Ok((name.to_string(), params))
}

fn write_csv(path: &Path, store: &SampleStore) -> Result<()> {
    let mut export = CsvExport::new();
    export.export_to_file(path, store)?;
    println!("Wrote {} rows to {}", store.len(), path.display());
    Ok(())
}

fn print_store_summary(store: &SampleStore) {
    let stats = store.calculate_statistics();
    println!(
        "Store:     {} fields, {} points ({} valid)",
        store.field_count(),
        stats.total_points,
        stats.valid_points
    );
    for name in store.field_names() {
        match (stats.ranges.get(name), stats.averages.get(name)) {
            (Some((min, max)), Some(avg)) => {
                println!("  {:<12} min {:>12.4}  max {:>12.4}  avg {:>12.4}", name, min, max, avg)
            }
            _ => println!("  {:<12} (no finite values)", name),
        }
    }
}

/// Run length for `generate`: a non-negative, finite number of seconds
fn parse_seconds(text: &str) -> Result<Duration, String> {
    let secs: f64 = text
        .trim()
        .parse()
        .map_err(|_| format!("not a number: {}", text))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {}: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_with_params() {
        let (name, params) = parse_stage("movavg:window_size=3,cutoff_frequency=0.5").unwrap();
        assert_eq!(name, "movavg");
        assert_eq!(
            params,
            vec![
                ("window_size".to_string(), ParamValue::Int(3)),
                ("cutoff_frequency".to_string(), ParamValue::Float(0.5)),
            ]
        );
    }

    #[test]
    fn test_parse_stage_bare_name() {
        let (name, params) = parse_stage("csv").unwrap();
        assert_eq!(name, "csv");
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_stage_errors() {
        assert!(parse_stage(":window_size=3").is_err());
        assert!(parse_stage("movavg:window_size").is_err());
    }

    #[test]
    fn test_seconds_rejects_unrepresentable_values() {
        assert_eq!(parse_seconds("1.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_seconds("0").unwrap(), Duration::ZERO);
        for bad in ["-1", "NaN", "inf", "1e300", "soon"] {
            assert!(parse_seconds(bad).is_err(), "{} accepted", bad);
        }
        assert!(Cli::try_parse_from(["sampleflow", "generate", "--seconds=1e300"]).is_err());
        assert!(Cli::try_parse_from(["sampleflow", "generate", "--seconds=-2"]).is_err());
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "sampleflow", "generate", "--mode", "square", "--rate", "100", "--buffer", "50",
        ])
        .unwrap();
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.mode, WaveformMode::SquareWave);
                assert_eq!(args.buffer, 50);
            }
            _ => panic!("expected generate"),
        }
    }
}
