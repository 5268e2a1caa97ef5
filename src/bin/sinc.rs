//! CLI entrypoint: parses flags, layers them over `config.toml`/env, and
//! runs the mining pipeline to completion (or until interrupted).

use std::process::ExitCode;

use clap::Parser;

use sinc::config::{CliOverrides, KbLocation};
use sinc::driver;
use sinc::logging;
use sinc::logging::Transcripts;

/// Mines a relational knowledge base into a compact rule hypothesis.
#[derive(Debug, Parser)]
#[command(name = "sinc")]
#[command(about = "Compresses a relational knowledge base by mining Horn rules")]
struct Cli {
    /// Input KB directory and name, as `path,name`.
    #[arg(short = 'I')]
    input: String,

    /// Output KB directory and name, as `path,name` (defaults to `.,<in>_comp`).
    #[arg(short = 'O')]
    output: Option<String>,

    /// Negative-KB directory and name; supplying this turns on negative sampling.
    #[arg(short = 'N')]
    neg_kb: Option<String>,

    /// Budget factor for negative sampling.
    #[arg(short = 'g')]
    neg_budget_factor: Option<f64>,

    /// Weight negative samples.
    #[arg(short = 'w')]
    weight_negatives: bool,

    /// Thread count. Accepted and validated but not read by the mining core.
    #[arg(short = 't')]
    threads: Option<usize>,

    /// Validate the compressed KB by decompression (unimplemented; warns and continues).
    #[arg(short = 'v')]
    validate: bool,

    /// Mine only the first n relations (0 = all).
    #[arg(short = 'r')]
    max_relations: Option<usize>,

    /// Beam width.
    #[arg(short = 'b')]
    beam_width: Option<usize>,

    /// Eval metric symbol: `τ` (compression ratio), `δ` (compression capacity), `h` (information gain).
    #[arg(short = 'e')]
    eval_metric: Option<String>,

    /// Minimum fact coverage in [0, 1].
    #[arg(short = 'f')]
    min_fact_coverage: Option<f64>,

    /// Minimum constant coverage in [0, 1].
    #[arg(short = 'c')]
    min_constant_coverage: Option<f64>,

    /// Stopping compression ratio per rule, in [0, 1].
    #[arg(short = 'p')]
    stop_compression_ratio: Option<f64>,

    /// Observation ratio (>=1.0 enables the estimation variant).
    #[arg(short = 'o')]
    observation_ratio: Option<f64>,

    /// Watch stdin for a bare `stop` line as an additional interrupt source.
    #[arg(long)]
    watch_stdin: bool,
}

fn parse_location(flag: &'static str, raw: &Option<String>) -> Result<Option<KbLocation>, sinc::errors::ConfigError> {
    raw.as_deref().map(|s| KbLocation::parse(flag, s)).transpose()
}

fn build_overrides(cli: &Cli) -> Result<CliOverrides, sinc::errors::ConfigError> {
    Ok(CliOverrides {
        input: Some(KbLocation::parse("-I", &cli.input)?),
        output: parse_location("-O", &cli.output)?,
        neg_kb: parse_location("-N", &cli.neg_kb)?,
        neg_budget_factor: cli.neg_budget_factor,
        weight_negatives: cli.weight_negatives.then_some(true),
        threads: cli.threads,
        validate: cli.validate.then_some(true),
        max_relations: cli.max_relations,
        beam_width: cli.beam_width,
        eval_metric: cli.eval_metric.clone(),
        min_fact_coverage: cli.min_fact_coverage,
        min_constant_coverage: cli.min_constant_coverage,
        stop_compression_ratio: cli.stop_compression_ratio,
        observation_ratio: cli.observation_ratio,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let watch_stdin = cli.watch_stdin;

    let overrides = match build_overrides(&cli) {
        Ok(o) => o,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = match sinc::config::load(overrides) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let output = config.resolved_output();
    let log_dir = output.path.join(&output.name);
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        eprintln!("failed to create output directory {}: {err}", log_dir.display());
        return ExitCode::FAILURE;
    }

    let mut transcripts = match Transcripts::open(&log_dir) {
        Ok(t) => Some(t),
        Err(err) => {
            eprintln!("failed to open run transcripts: {err}");
            None
        }
    };

    let _guard = match logging::init(&config.logging.level, config.logging.format, &log_dir.join("log.meta")) {
        Ok(guard) => Some(guard),
        Err(err) => {
            report_stderr(&mut transcripts, &format!("failed to initialize logging: {err}"));
            None
        }
    };

    report_stdout(&mut transcripts, &format!("sinc: compressing {} -> {}", config.input.name, output.name));

    let interrupt = driver::install_interrupt_handler(watch_stdin);

    match driver::run(&config, &interrupt) {
        Ok(_) => {
            report_stdout(&mut transcripts, "sinc: done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_stderr(&mut transcripts, &format!("sinc failed: {err}"));
            ExitCode::FAILURE
        }
    }
}

/// Prints to stdout and, if the run's transcripts opened successfully,
/// appends the same line to `stdout.meta`.
fn report_stdout(transcripts: &mut Option<Transcripts>, line: &str) {
    println!("{line}");
    if let Some(t) = transcripts {
        let _ = t.stdout.write_line(line);
    }
}

/// Prints to stderr and, if the run's transcripts opened successfully,
/// appends the same line to `stderr.meta`.
fn report_stderr(transcripts: &mut Option<Transcripts>, line: &str) {
    eprintln!("{line}");
    if let Some(t) = transcripts {
        let _ = t.stderr.write_line(line);
    }
}
