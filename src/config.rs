//! Hierarchical configuration loading: compiled defaults, then
//! `config.toml`, then `config.local.toml`, then `SINC_`-prefixed
//! environment variables, then CLI flags as the final override layer.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::eval::EvalMetric;

/// A `path,name` pair as accepted by `-I`/`-O`/`-N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbLocation {
    pub path: PathBuf,
    pub name: String,
}

impl KbLocation {
    pub fn parse(flag: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let (path, name) = raw.split_once(',').ok_or(ConfigError::InvalidFlag {
            flag,
            value: raw.to_string(),
            reason: "expected `path,name`",
        })?;
        if name.is_empty() {
            return Err(ConfigError::InvalidFlag {
                flag,
                value: raw.to_string(),
                reason: "name must not be empty",
            });
        }
        Ok(KbLocation {
            path: PathBuf::from(path),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

/// Everything figment can source from `config.toml`/`config.local.toml`/env;
/// every field is optional here because CLI flags (parsed separately in
/// `bin/sinc.rs`) take final precedence and fill in whatever this layer
/// left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub neg_budget_factor: Option<f64>,
    pub weight_negatives: Option<bool>,
    pub threads: Option<usize>,
    pub validate: Option<bool>,
    pub max_relations: Option<usize>,
    pub beam_width: Option<usize>,
    pub eval_metric: Option<String>,
    pub min_fact_coverage: Option<f64>,
    pub min_constant_coverage: Option<f64>,
    pub stop_compression_ratio: Option<f64>,
    pub observation_ratio: Option<f64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RawConfig {
    fn load() -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("SINC_").split("__"))
            .extract()
            .map_err(ConfigError::from)
    }
}

/// CLI-flag overrides, built by `bin/sinc.rs` from `clap` matches. `None`
/// means "flag not given, defer to the figment layer or its own default".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input: Option<KbLocation>,
    pub output: Option<KbLocation>,
    pub neg_kb: Option<KbLocation>,
    pub neg_budget_factor: Option<f64>,
    pub weight_negatives: Option<bool>,
    pub threads: Option<usize>,
    pub validate: Option<bool>,
    pub max_relations: Option<usize>,
    pub beam_width: Option<usize>,
    pub eval_metric: Option<String>,
    pub min_fact_coverage: Option<f64>,
    pub min_constant_coverage: Option<f64>,
    pub stop_compression_ratio: Option<f64>,
    pub observation_ratio: Option<f64>,
}

/// Fully resolved, validated configuration the driver runs against.
#[derive(Debug, Clone)]
pub struct SincConfig {
    pub input: KbLocation,
    pub output: KbLocation,
    pub neg_kb: Option<KbLocation>,
    pub neg_budget_factor: f64,
    pub weight_negatives: bool,
    pub threads: usize,
    pub validate: bool,
    pub max_relations: usize,
    pub beam_width: usize,
    pub eval_metric: EvalMetric,
    pub min_fact_coverage: f64,
    pub min_constant_coverage: f64,
    pub stop_compression_ratio: f64,
    pub observation_ratio: f64,
    pub logging: LoggingConfig,
}

impl SincConfig {
    /// Output directory defaulting to `<input_dir>/../<input_name>_comp`
    /// when `-O` was never given a name, matching the original's default.
    pub fn resolved_output(&self) -> KbLocation {
        if self.output.name.is_empty() {
            KbLocation {
                path: self.output.path.clone(),
                name: format!("{}_comp", self.input.name),
            }
        } else {
            self.output.clone()
        }
    }
}

/// Merges the figment layer with CLI overrides and validates every field,
/// matching the original's `gflags` validators (`validatePositiveInt`,
/// `validateNormalizedDouble`, `validateEvalMetric`, ...) but returning
/// `ConfigError` instead of exiting the process from inside the validator.
pub fn load(cli: CliOverrides) -> Result<SincConfig, ConfigError> {
    let raw = RawConfig::load()?;

    let input = cli.input.ok_or(ConfigError::MissingInput)?;
    let output = cli.output.unwrap_or(KbLocation {
        path: PathBuf::from("."),
        name: String::new(),
    });

    let threads = positive_int("-t", cli.threads.or(raw.threads).unwrap_or(1))?;
    let beam_width = positive_int("-b", cli.beam_width.or(raw.beam_width).unwrap_or(5))?;
    let max_relations = cli.max_relations.or(raw.max_relations).unwrap_or(0);

    let min_fact_coverage = normalized("-f", cli.min_fact_coverage.or(raw.min_fact_coverage).unwrap_or(0.05))?;
    let min_constant_coverage = normalized(
        "-c",
        cli.min_constant_coverage.or(raw.min_constant_coverage).unwrap_or(0.25),
    )?;
    let stop_compression_ratio = normalized(
        "-p",
        cli.stop_compression_ratio.or(raw.stop_compression_ratio).unwrap_or(1.0),
    )?;
    let observation_ratio = non_negative(
        "-o",
        cli.observation_ratio.or(raw.observation_ratio).unwrap_or(0.0),
    )?;
    let neg_budget_factor = non_negative(
        "-g",
        cli.neg_budget_factor.or(raw.neg_budget_factor).unwrap_or(2.0),
    )?;

    let eval_metric_symbol = cli.eval_metric.or(raw.eval_metric).unwrap_or_else(|| "τ".to_string());
    let eval_metric = EvalMetric::from_symbol(&eval_metric_symbol).ok_or(ConfigError::InvalidFlag {
        flag: "-e",
        value: eval_metric_symbol,
        reason: "expected one of τ, δ, h",
    })?;

    Ok(SincConfig {
        input,
        output,
        neg_kb: cli.neg_kb,
        neg_budget_factor,
        weight_negatives: cli.weight_negatives.or(raw.weight_negatives).unwrap_or(false),
        threads,
        validate: cli.validate.or(raw.validate).unwrap_or(false),
        max_relations,
        beam_width,
        eval_metric,
        min_fact_coverage,
        min_constant_coverage,
        stop_compression_ratio,
        observation_ratio,
        logging: raw.logging,
    })
}

fn positive_int(flag: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidFlag {
            flag,
            value: value.to_string(),
            reason: "must be > 0",
        })
    } else {
        Ok(value)
    }
}

fn normalized(flag: &'static str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidFlag {
            flag,
            value: value.to_string(),
            reason: "must be within [0, 1]",
        })
    }
}

fn non_negative(flag: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidFlag {
            flag,
            value: value.to_string(),
            reason: "must be >= 0",
        })
    }
}
