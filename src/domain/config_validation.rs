//! Settings validation.
//!
//! Every field is checked before any data is loaded; builders assume a
//! validated config and apply documented defaults for absent keys. A key that
//! is present but does not parse is an error, never a default.

use std::time::Duration;

use crate::domain::error::EvotraderError;
use crate::domain::frame::{MINUTES_PER_DAY, parse_timeframe};
use crate::domain::optimizer::OptimizerConfig;
use crate::domain::optimizer::operators::{
    CrossoverOperator, MutationOperator, SelectionOperator,
};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_BALANCE: f64 = 1000.0;
pub const DEFAULT_TIMEFRAME: usize = 5;
pub const DEFAULT_POPULATION: usize = 6;
pub const DEFAULT_GENERATIONS: usize = 10;
pub const DEFAULT_TOURNAMENT_SIZE: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: i64 = 1000;
pub const DEFAULT_PATIENCE: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub initial_balance: f64,
    pub timeframe: usize,
    pub balance_interval: usize,
    pub delimiter: u8,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EvotraderError {
    EvotraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Shape a numeric setting's text must have.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    /// Non-negative integer.
    Count,
    Integer,
    /// Finite decimal.
    Real,
}

const BACKTEST_NUMERIC_KEYS: &[(&str, &str, Numeric)] = &[
    ("backtest", "initial_balance", Numeric::Real),
    ("backtest", "balance_interval", Numeric::Count),
];

const OPTIMIZER_NUMERIC_KEYS: &[(&str, &str, Numeric)] = &[
    ("optimizer", "population", Numeric::Count),
    ("optimizer", "workers", Numeric::Count),
    ("optimizer", "generations", Numeric::Count),
    ("optimizer", "crossover_rate", Numeric::Real),
    ("optimizer", "mutation_rate", Numeric::Real),
    ("optimizer", "tournament_size", Numeric::Count),
    ("optimizer", "generation_timeout_secs", Numeric::Integer),
    ("optimizer", "generation_retries", Numeric::Count),
    ("optimizer", "seed", Numeric::Count),
    ("validation", "interval", Numeric::Count),
    ("validation", "patience", Numeric::Count),
];

fn validate_numeric_keys(
    config: &dyn ConfigPort,
    keys: &[(&str, &str, Numeric)],
) -> Result<(), EvotraderError> {
    for &(section, key, shape) in keys {
        let Some(raw) = config.get_string(section, key) else {
            continue;
        };
        let text = raw.trim();
        let parses = match shape {
            Numeric::Count => text.parse::<u64>().is_ok_and(|v| usize::try_from(v).is_ok()),
            Numeric::Integer => text.parse::<i64>().is_ok(),
            Numeric::Real => text.parse::<f64>().is_ok_and(f64::is_finite),
        };
        if !parses {
            let expected = match shape {
                Numeric::Count => "a non-negative integer",
                Numeric::Integer => "an integer",
                Numeric::Real => "a finite number",
            };
            return Err(invalid(
                section,
                key,
                format!("'{text}' is not {expected}"),
            ));
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    validate_numeric_keys(config, BACKTEST_NUMERIC_KEYS)?;
    validate_initial_balance(config)?;
    validate_timeframe(config)?;
    validate_balance_interval(config)?;
    validate_delimiter(config)?;
    Ok(())
}

pub fn validate_optimizer_config(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    validate_strategy(config)?;
    validate_numeric_keys(config, OPTIMIZER_NUMERIC_KEYS)?;
    validate_population(config)?;
    validate_workers(config)?;
    validate_rate(config, "crossover_rate")?;
    validate_rate(config, "mutation_rate")?;
    validate_operators(config)?;
    validate_timeout(config)?;
    validate_validation_section(config)?;
    Ok(())
}

fn validate_initial_balance(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    let value = config.get_double("backtest", "initial_balance", DEFAULT_INITIAL_BALANCE);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_balance",
            "initial_balance must be positive",
        ));
    }
    Ok(())
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    match config.get_string("backtest", "timeframe") {
        None => Ok(()),
        Some(raw) => parse_timeframe(&raw).map(|_| ()).ok_or_else(|| {
            invalid(
                "backtest",
                "timeframe",
                format!("'{raw}' is neither a positive minute count nor a flag like 15m"),
            )
        }),
    }
}

fn validate_balance_interval(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    if config.get_int("backtest", "balance_interval", MINUTES_PER_DAY as i64) < 1 {
        return Err(invalid(
            "backtest",
            "balance_interval",
            "balance_interval must be at least 1",
        ));
    }
    Ok(())
}

fn validate_delimiter(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    match config.get_string("backtest", "delimiter") {
        Some(raw) if parse_delimiter(&raw).is_none() => Err(invalid(
            "backtest",
            "delimiter",
            "delimiter must be a single ASCII character or 'tab'",
        )),
        _ => Ok(()),
    }
}

/// `tab` or a single ASCII character.
pub fn parse_delimiter(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("tab") {
        return Some(b'\t');
    }
    match raw.as_bytes() {
        [byte] if byte.is_ascii() => Some(*byte),
        _ => None,
    }
}

fn validate_strategy(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    if config.has_key("optimizer", "strategy") {
        Ok(())
    } else {
        Err(EvotraderError::ConfigMissing {
            section: "optimizer".into(),
            key: "strategy".into(),
        })
    }
}

fn validate_population(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    let value = config.get_int("optimizer", "population", DEFAULT_POPULATION as i64);
    if value < 2 {
        return Err(invalid(
            "optimizer",
            "population",
            "population must be at least 2",
        ));
    }
    Ok(())
}

fn validate_workers(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    if config.has_key("optimizer", "workers") && config.get_int("optimizer", "workers", 0) < 1 {
        return Err(invalid("optimizer", "workers", "workers must be at least 1"));
    }
    Ok(())
}

fn validate_rate(config: &dyn ConfigPort, key: &str) -> Result<(), EvotraderError> {
    let value = config.get_double("optimizer", key, 0.0);
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(
            "optimizer",
            key,
            format!("{key} must be between 0 and 1"),
        ));
    }
    Ok(())
}

fn validate_operators(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    if let Some(name) = config.get_string("optimizer", "crossover") {
        name.parse::<CrossoverOperator>()?;
    }
    if let Some(name) = config.get_string("optimizer", "mutation") {
        name.parse::<MutationOperator>()?;
    }
    if let Some(name) = config.get_string("optimizer", "selection") {
        SelectionOperator::parse(&name, DEFAULT_TOURNAMENT_SIZE)?;
    }
    Ok(())
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    let secs = config.get_int("optimizer", "generation_timeout_secs", DEFAULT_TIMEOUT_SECS);
    if secs <= 0 {
        return Err(invalid(
            "optimizer",
            "generation_timeout_secs",
            "generation_timeout_secs must be positive",
        ));
    }
    Ok(())
}

fn validate_validation_section(config: &dyn ConfigPort) -> Result<(), EvotraderError> {
    if config.has_key("validation", "interval") && config.get_int("validation", "interval", 0) < 1
    {
        return Err(invalid("validation", "interval", "interval must be at least 1"));
    }
    if config.get_int("validation", "patience", DEFAULT_PATIENCE as i64) < 1 {
        return Err(invalid("validation", "patience", "patience must be at least 1"));
    }
    Ok(())
}

/// Backtest settings; `timeframe_override` (minutes or flag) wins over the file.
pub fn build_backtest_settings(
    config: &dyn ConfigPort,
    timeframe_override: Option<&str>,
) -> Result<BacktestSettings, EvotraderError> {
    validate_backtest_config(config)?;
    let timeframe = match timeframe_override {
        Some(raw) => parse_timeframe(raw).ok_or_else(|| {
            invalid("backtest", "timeframe", format!("'{raw}' is not a valid timeframe"))
        })?,
        None => config
            .get_string("backtest", "timeframe")
            .and_then(|raw| parse_timeframe(&raw))
            .unwrap_or(DEFAULT_TIMEFRAME),
    };
    let delimiter = config
        .get_string("backtest", "delimiter")
        .and_then(|d| parse_delimiter(&d))
        .unwrap_or(b',');
    Ok(BacktestSettings {
        initial_balance: config.get_double(
            "backtest",
            "initial_balance",
            DEFAULT_INITIAL_BALANCE,
        ),
        timeframe,
        balance_interval: config.get_usize("backtest", "balance_interval", MINUTES_PER_DAY),
        delimiter,
    })
}

/// Optimizer settings. `available_cpus` caps the default worker count.
pub fn build_optimizer_config(
    config: &dyn ConfigPort,
    backtest: &BacktestSettings,
    available_cpus: usize,
) -> Result<OptimizerConfig, EvotraderError> {
    validate_optimizer_config(config)?;

    let strategy = config
        .get_string("optimizer", "strategy")
        .ok_or_else(|| EvotraderError::ConfigMissing {
            section: "optimizer".into(),
            key: "strategy".into(),
        })?;
    let population = config.get_usize("optimizer", "population", DEFAULT_POPULATION);
    let default_workers = population.min(available_cpus.max(1));
    let max_generations = config.get_usize("optimizer", "generations", DEFAULT_GENERATIONS);
    let defaults = OptimizerConfig::default();

    let crossover = match config.get_string("optimizer", "crossover") {
        Some(name) => name.parse()?,
        None => defaults.crossover,
    };
    let mutation = match config.get_string("optimizer", "mutation") {
        Some(name) => name.parse()?,
        None => defaults.mutation,
    };
    let tournament_size =
        config.get_usize("optimizer", "tournament_size", DEFAULT_TOURNAMENT_SIZE);
    let selection = match config.get_string("optimizer", "selection") {
        Some(name) => SelectionOperator::parse(&name, tournament_size)?,
        None => defaults.selection,
    };
    let timeout_secs =
        config.get_int("optimizer", "generation_timeout_secs", DEFAULT_TIMEOUT_SECS);

    Ok(OptimizerConfig {
        strategy,
        population,
        workers: config.get_usize("optimizer", "workers", default_workers),
        max_generations,
        crossover_rate: config.get_double("optimizer", "crossover_rate", defaults.crossover_rate),
        crossover,
        mutation_rate: config.get_double("optimizer", "mutation_rate", defaults.mutation_rate),
        mutation,
        selection,
        timeframe: backtest.timeframe,
        initial_balance: backtest.initial_balance,
        balance_sample_interval: backtest.balance_interval,
        validation_interval: config.get_usize("validation", "interval", max_generations.max(1)),
        validation_patience: config.get_usize("validation", "patience", DEFAULT_PATIENCE),
        stop_on_validation_drift: config.get_bool("validation", "stop_on_drift", false),
        generation_timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
        generation_retries: config.get_usize(
            "optimizer",
            "generation_retries",
            defaults.generation_retries,
        ),
        seed: config
            .get_string("optimizer", "seed")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0),
        show_progress: false,
    })
}
