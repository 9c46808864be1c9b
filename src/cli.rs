//! CLI definition and dispatch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::genome_json_adapter::GenomeJsonAdapter;
use crate::adapters::json_checkpoint_adapter::JsonCheckpointAdapter;
use crate::domain::config_validation::{build_backtest_settings, build_optimizer_config};
use crate::domain::error::EvotraderError;
use crate::domain::evaluator::{BacktestEvaluator, EvaluationHooks, EvaluationResult, Outcome};
use crate::domain::frame::timeframe_flag;
use crate::domain::genome::Genome;
use crate::domain::optimizer::fitness::RatioFitness;
use crate::domain::optimizer::{GeneticOptimizer, Termination};
use crate::domain::strategies::StrategyRegistry;
use crate::domain::wallet::TestWallet;
use crate::ports::data_port::DataPort;
use crate::ports::genome_port::GenomePort;

#[derive(Parser, Debug)]
#[command(name = "evotrader", about = "Strategy backtester and genetic parameter optimizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest one genome against one or more price series
    Evaluate {
        #[arg(short, long)]
        strategy: String,
        /// Genome specification (JSON); genes without a value use their midpoint
        #[arg(short, long)]
        genome: PathBuf,
        #[arg(short, long, required = true, num_args = 1..)]
        data: Vec<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Minutes or a flag such as 15m, 1h, 1d
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(long)]
        balance: Option<f64>,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Search strategy parameters with the genetic optimizer
    Train {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        genome: PathBuf,
        #[arg(short, long, required = true, num_args = 1..)]
        data: Vec<PathBuf>,
        /// Held-out series for drift detection
        #[arg(long, num_args = 1..)]
        validation: Vec<PathBuf>,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(long)]
        progress: bool,
    },
    /// List registered strategies and their parameters
    Strategies,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Evaluate {
            strategy,
            genome,
            data,
            config,
            timeframe,
            balance,
            verbose,
        } => run_evaluate(&EvaluateArgs {
            strategy: &strategy,
            genome: &genome,
            data: &data,
            config: config.as_deref(),
            timeframe: timeframe.as_deref(),
            balance,
            verbose,
        }),
        Command::Train {
            config,
            genome,
            data,
            validation,
            output,
            timeframe,
            progress,
        } => run_train(&TrainArgs {
            config: &config,
            genome: &genome,
            data: &data,
            validation: &validation,
            output: &output,
            timeframe: timeframe.as_deref(),
            progress,
        }),
        Command::Strategies => {
            print!("{}", strategy_listing(&StrategyRegistry::with_defaults()));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, EvotraderError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            FileConfigAdapter::from_file(path)
        }
        None => Ok(FileConfigAdapter::empty()),
    }
}

pub fn strategy_listing(registry: &StrategyRegistry) -> String {
    registry
        .entries()
        .map(|entry| {
            format!(
                "{} (max positions {}): {}\n",
                entry.name,
                entry.max_positions,
                entry.parameters.join(", ")
            )
        })
        .collect()
}

struct EvaluateArgs<'a> {
    strategy: &'a str,
    genome: &'a Path,
    data: &'a [PathBuf],
    config: Option<&'a Path>,
    timeframe: Option<&'a str>,
    balance: Option<f64>,
    verbose: bool,
}

#[derive(Debug, Serialize)]
pub struct EvaluationReport {
    pub strategy: String,
    pub timeframe: String,
    pub genome: Genome,
    /// Results keyed by dataset name.
    pub evaluation_result: BTreeMap<String, EvaluationResult>,
}

fn run_evaluate(args: &EvaluateArgs<'_>) -> Result<(), EvotraderError> {
    let config = load_config(args.config)?;
    let settings = build_backtest_settings(&config, args.timeframe)?;
    let initial_balance = args.balance.unwrap_or(settings.initial_balance);
    if !initial_balance.is_finite() || initial_balance <= 0.0 {
        return Err(EvotraderError::ConfigInvalid {
            section: "backtest".into(),
            key: "initial_balance".into(),
            reason: format!("{initial_balance} is not a positive amount"),
        });
    }

    let specs = GenomeJsonAdapter::new().load_genome(args.genome)?;
    let genome = Genome::fixed(&specs)?;
    let datasets = CsvAdapter::new(settings.delimiter).load_all(args.data)?;
    let registry = StrategyRegistry::with_defaults();
    let evaluator = BacktestEvaluator::new(settings.timeframe)?
        .with_balance_sample_interval(settings.balance_interval)
        .with_verbose(args.verbose);

    let mut evaluation_result = BTreeMap::new();
    for dataset in &datasets {
        let mut strategy = registry.build(
            args.strategy,
            &genome,
            Box::new(TestWallet::new(initial_balance)),
        )?;
        let evaluation = evaluator.evaluate(
            strategy.as_mut(),
            initial_balance,
            dataset,
            EvaluationHooks::default(),
            0,
        )?;
        if let Outcome::Completed(result) = evaluation.outcome {
            info!(
                dataset = %dataset.name,
                final_balance = result.final_balance,
                win_ratio = result.win_ratio,
                estimated_apy = result.estimated_apy,
                "evaluation complete"
            );
            evaluation_result.insert(dataset.name.clone(), result);
        }
    }

    let report = EvaluationReport {
        strategy: args.strategy.to_string(),
        timeframe: timeframe_flag(settings.timeframe),
        genome,
        evaluation_result,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

struct TrainArgs<'a> {
    config: &'a Path,
    genome: &'a Path,
    data: &'a [PathBuf],
    validation: &'a [PathBuf],
    output: &'a Path,
    timeframe: Option<&'a str>,
    progress: bool,
}

fn run_train(args: &TrainArgs<'_>) -> Result<(), EvotraderError> {
    let config = load_config(Some(args.config))?;
    let settings = build_backtest_settings(&config, args.timeframe)?;
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mut optimizer_config = build_optimizer_config(&config, &settings, cpus)?;
    optimizer_config.show_progress = args.progress;

    let specs = GenomeJsonAdapter::new().load_genome(args.genome)?;
    let data_port = CsvAdapter::new(settings.delimiter);
    let training = data_port.load_all(args.data)?;
    let validation = data_port.load_all(args.validation)?;
    info!(
        training = training.len(),
        validation = validation.len(),
        genes = specs.len(),
        "datasets loaded"
    );

    let mut checkpoint = JsonCheckpointAdapter::new(args.output)?;
    let mut optimizer = GeneticOptimizer::new(
        optimizer_config,
        specs,
        StrategyRegistry::with_defaults(),
        training,
        validation,
        Arc::new(RatioFitness::default()),
    )?;

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel));

    let summary = optimizer.run(&mut checkpoint, &cancel)?;
    match summary.termination {
        Termination::GenerationLimit => info!(
            generations = summary.generations_completed,
            "training finished"
        ),
        Termination::Cancelled => warn!(
            generations = summary.generations_completed,
            "training interrupted"
        ),
        Termination::ValidationDrift => warn!(
            generations = summary.generations_completed,
            "training stopped on validation drift"
        ),
    }
    match &summary.champion {
        Some(champion) => println!("{}", serde_json::to_string_pretty(champion)?),
        None => warn!("no champion was produced"),
    }
    Ok(())
}

/// Flip `cancel` on Ctrl-C. The listener runs on its own thread so the
/// optimizer thread never blocks on signal delivery.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("evotrader-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("interrupt handler unavailable: {e}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, draining in-flight evaluations");
                    cancel.store(true, Ordering::Relaxed);
                }
            });
        });
    if let Err(e) = spawned {
        warn!("interrupt handler unavailable: {e}");
    }
}
