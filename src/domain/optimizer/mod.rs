//! Genetic search over strategy parameters.
//!
//! Each generation is scored in parallel by the [`pool`], ranked, reported,
//! and bred into the next. The best individual ever seen is checkpointed
//! whenever it improves, and can be periodically re-scored on held-out data
//! to detect drift.

pub mod fitness;
pub mod operators;
pub mod pool;
pub mod report;
pub mod validation;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::domain::error::EvotraderError;
use crate::domain::evaluator::{BacktestEvaluator, EvaluationHooks, EvaluationResult};
use crate::domain::frame::{Dataset, timeframe_flag};
use crate::domain::genome::{GeneSpec, Genome};
use crate::domain::strategies::StrategyRegistry;
use crate::ports::checkpoint_port::CheckpointPort;

use self::fitness::FitnessFunction;
use self::operators::{CrossoverOperator, MutationOperator, SelectionOperator};
use self::pool::{BatchOutcome, EvaluationContext, JobOutcome, WorkerPool};
use self::report::{ChampionRecord, GenerationStats};
use self::validation::{ValidationTracker, ValidationVerdict};

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub strategy: String,
    pub population: usize,
    pub workers: usize,
    pub max_generations: usize,
    pub crossover_rate: f64,
    pub crossover: CrossoverOperator,
    pub mutation_rate: f64,
    pub mutation: MutationOperator,
    pub selection: SelectionOperator,
    /// Minutes per frame.
    pub timeframe: usize,
    pub initial_balance: f64,
    pub balance_sample_interval: usize,
    /// Generations between validation checks.
    pub validation_interval: usize,
    pub validation_patience: usize,
    pub stop_on_validation_drift: bool,
    pub generation_timeout: Duration,
    pub generation_retries: usize,
    pub seed: u64,
    pub show_progress: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            strategy: String::new(),
            population: 6,
            workers: 6,
            max_generations: 10,
            crossover_rate: 0.85,
            crossover: CrossoverOperator::Uniform,
            mutation_rate: 0.1,
            mutation: MutationOperator::Uniform,
            selection: SelectionOperator::Truncation,
            timeframe: 5,
            initial_balance: 1000.0,
            balance_sample_interval: 1440,
            validation_interval: 10,
            validation_patience: 3,
            stop_on_validation_drift: false,
            generation_timeout: Duration::from_secs(1000),
            generation_retries: 1,
            seed: 0,
            show_progress: false,
        }
    }
}

/// Produces the next generation's genomes from a scored one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breeder {
    pub selection: SelectionOperator,
    pub crossover: CrossoverOperator,
    pub crossover_rate: f64,
    pub mutation: MutationOperator,
    pub mutation_rate: f64,
}

impl Breeder {
    /// Children before mutation, one per member of `population`.
    pub fn offspring<R: Rng + ?Sized>(
        &self,
        population: &[Genome],
        fitness: &[f64],
        rng: &mut R,
    ) -> Vec<Genome> {
        if population.is_empty() {
            return Vec::new();
        }
        let ranked = rank(fitness);
        (0..population.len())
            .map(|_| {
                let (a, b) = self.selection.pick(&ranked, fitness, rng);
                let (first, second) = (&population[a], &population[b]);
                if rng.gen_range(0.0..1.0) < self.crossover_rate {
                    self.crossover.apply(first, second, rng)
                } else if rng.gen_bool(0.5) {
                    first.clone()
                } else {
                    second.clone()
                }
            })
            .collect()
    }

    pub fn mutate<R: Rng + ?Sized>(&self, children: &mut [Genome], rng: &mut R) {
        for child in children {
            self.mutation.apply(child, self.mutation_rate, rng);
        }
    }

    pub fn breed<R: Rng + ?Sized>(
        &self,
        population: &[Genome],
        fitness: &[f64],
        rng: &mut R,
    ) -> Vec<Genome> {
        let mut children = self.offspring(population, fitness, rng);
        self.mutate(&mut children, rng);
        children
    }
}

/// Indices sorted by descending fitness; ties keep population order.
pub fn rank(fitness: &[f64]) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..fitness.len()).collect();
    ranked.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]));
    ranked
}

#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub genome: Genome,
    pub fitness: f64,
    pub results: Vec<EvaluationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    GenerationLimit,
    Cancelled,
    ValidationDrift,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub termination: Termination,
    pub generations_completed: usize,
    pub champion: Option<ChampionRecord>,
    pub validation_champion: Option<ChampionRecord>,
}

pub struct GeneticOptimizer {
    config: OptimizerConfig,
    specs: Vec<GeneSpec>,
    breeder: Breeder,
    training: Arc<EvaluationContext>,
    validation: Option<Arc<EvaluationContext>>,
    pool: WorkerPool,
    rng: StdRng,
}

impl GeneticOptimizer {
    pub fn new(
        config: OptimizerConfig,
        specs: Vec<GeneSpec>,
        registry: StrategyRegistry,
        training: Vec<Dataset>,
        validation: Vec<Dataset>,
        fitness: Arc<dyn FitnessFunction>,
    ) -> Result<Self, EvotraderError> {
        registry.get(&config.strategy)?;
        for spec in &specs {
            spec.validate()?;
        }
        if training.is_empty() {
            return Err(EvotraderError::Data {
                reason: "at least one training dataset is required".into(),
            });
        }
        for dataset in training.iter().chain(&validation) {
            dataset.ensure_not_empty()?;
        }
        if config.population < 2 {
            return Err(EvotraderError::ConfigInvalid {
                section: "optimizer".into(),
                key: "population".into(),
                reason: format!("{} is below the minimum of 2", config.population),
            });
        }

        let evaluator = BacktestEvaluator::new(config.timeframe)?
            .with_balance_sample_interval(config.balance_sample_interval);
        let context = |datasets: Vec<Dataset>| {
            Arc::new(EvaluationContext {
                registry: registry.clone(),
                strategy: config.strategy.clone(),
                datasets,
                evaluator: evaluator.clone(),
                initial_balance: config.initial_balance,
                fitness: Arc::clone(&fitness),
            })
        };
        let training = context(training);
        let validation = (!validation.is_empty()).then(|| context(validation));

        let breeder = Breeder {
            selection: config.selection,
            crossover: config.crossover,
            crossover_rate: config.crossover_rate,
            mutation: config.mutation,
            mutation_rate: config.mutation_rate,
        };
        let pool = WorkerPool::new(config.workers)?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(GeneticOptimizer {
            config,
            specs,
            breeder,
            training,
            validation,
            pool,
            rng,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run until the generation limit, cancellation, or (if enabled) validation drift.
    pub fn run(
        &mut self,
        checkpoint: &mut dyn CheckpointPort,
        cancel: &Arc<AtomicBool>,
    ) -> Result<TrainingSummary, EvotraderError> {
        let mut population = (0..self.config.population)
            .map(|_| Genome::sample(&self.specs, &mut self.rng))
            .collect::<Result<Vec<_>, _>>()?;

        let progress = self.progress_bar();
        let mut tracker = ValidationTracker::new(self.config.validation_patience);
        let mut summary = TrainingSummary {
            termination: Termination::GenerationLimit,
            generations_completed: 0,
            champion: None,
            validation_champion: None,
        };

        info!(
            strategy = %self.config.strategy,
            population = self.config.population,
            workers = self.pool.workers(),
            generations = self.config.max_generations,
            crossover = %self.config.crossover,
            mutation = %self.config.mutation,
            selection = %self.config.selection,
            "starting genetic optimization"
        );

        for generation in 0..self.config.max_generations {
            if cancel.load(Ordering::Relaxed) {
                summary.termination = Termination::Cancelled;
                break;
            }

            progress.reset();
            progress.set_message(format!("generation {}", generation + 1));
            let Some(outcomes) = self.score_generation(generation, &population, cancel, &progress)?
            else {
                summary.termination = Termination::Cancelled;
                break;
            };

            let individuals = collect_individuals(generation, population, outcomes);
            let fitness: Vec<f64> = individuals.iter().map(|i| i.fitness).collect();
            let stats = GenerationStats::from_fitness(generation, &fitness);
            checkpoint.append_generation_stats(&stats)?;
            info!(
                generation,
                best = stats.best,
                average = stats.average,
                worst = stats.worst,
                "generation scored"
            );

            if let Some(best) = rank(&fitness).first().map(|&i| &individuals[i]) {
                let beats_champion = summary
                    .champion
                    .as_ref()
                    .is_none_or(|champion| best.fitness > champion.fitness);
                if best.fitness.is_finite() && beats_champion {
                    let record = self.champion_record(generation, best, &self.training);
                    checkpoint.write_champion(&record)?;
                    info!(generation, fitness = best.fitness, "new champion");
                    summary.champion = Some(record);
                }
            }
            summary.generations_completed = generation + 1;

            if self.validation_due(generation) {
                match self.validate(generation, &summary, &mut tracker, checkpoint, cancel)? {
                    ValidationStep::Continue(Some(record)) => {
                        summary.validation_champion = Some(record)
                    }
                    ValidationStep::Continue(None) => {}
                    ValidationStep::Stop(termination) => {
                        summary.termination = termination;
                        break;
                    }
                }
            }

            if generation + 1 < self.config.max_generations {
                let genomes: Vec<Genome> =
                    individuals.into_iter().map(|i| i.genome).collect();
                population = self.breeder.breed(&genomes, &fitness, &mut self.rng);
            } else {
                break;
            }
        }

        progress.finish_and_clear();
        info!(
            termination = ?summary.termination,
            generations = summary.generations_completed,
            champion_fitness = summary.champion.as_ref().map(|c| c.fitness),
            "optimization finished"
        );
        Ok(summary)
    }

    /// Score a generation, retrying timed-out attempts. `None` when cancelled.
    fn score_generation(
        &self,
        generation: usize,
        population: &[Genome],
        cancel: &Arc<AtomicBool>,
        progress: &ProgressBar,
    ) -> Result<Option<Vec<JobOutcome>>, EvotraderError> {
        for attempt in 0..=self.config.generation_retries {
            let outcome = self.pool.run_generation(
                &self.training,
                population,
                self.config.generation_timeout,
                cancel,
                progress,
            );
            match outcome {
                BatchOutcome::Complete(outcomes) => return Ok(Some(outcomes)),
                BatchOutcome::Cancelled => return Ok(None),
                BatchOutcome::TimedOut { completed } => {
                    warn!(
                        generation,
                        attempt,
                        completed,
                        timeout_secs = self.config.generation_timeout.as_secs(),
                        "generation timed out"
                    );
                    progress.reset();
                }
            }
        }
        Err(EvotraderError::GenerationTimeout {
            generation,
            seconds: self.config.generation_timeout.as_secs(),
        })
    }

    fn validation_due(&self, generation: usize) -> bool {
        self.validation.is_some()
            && self.config.validation_interval > 0
            && (generation + 1) % self.config.validation_interval == 0
    }

    fn validate(
        &self,
        generation: usize,
        summary: &TrainingSummary,
        tracker: &mut ValidationTracker,
        checkpoint: &mut dyn CheckpointPort,
        cancel: &Arc<AtomicBool>,
    ) -> Result<ValidationStep, EvotraderError> {
        let (Some(context), Some(champion)) = (&self.validation, &summary.champion) else {
            return Ok(ValidationStep::Continue(None));
        };

        let stop = || cancel.load(Ordering::Relaxed);
        let hooks = EvaluationHooks {
            progress: None,
            cancel: Some(&stop),
        };
        let outcome = context.score(&champion.genome, hooks, 0);
        if outcome == JobOutcome::Cancelled {
            return Ok(ValidationStep::Stop(Termination::Cancelled));
        }
        if let JobOutcome::Failed { reason } = &outcome {
            warn!(generation, %reason, "validation run failed");
        }

        let fitness = outcome.fitness();
        match tracker.record(fitness) {
            ValidationVerdict::Improved => {
                let results = match outcome {
                    JobOutcome::Scored { results, .. } => results,
                    _ => Vec::new(),
                };
                let individual = Individual {
                    genome: champion.genome.clone(),
                    fitness,
                    results,
                };
                let record = self.champion_record(generation, &individual, context);
                checkpoint.write_validation_champion(&record)?;
                info!(generation, fitness, "validation improved");
                Ok(ValidationStep::Continue(Some(record)))
            }
            ValidationVerdict::Regressed { streak } => {
                info!(generation, fitness, streak, "validation did not improve");
                Ok(ValidationStep::Continue(None))
            }
            ValidationVerdict::Drifted { streak } => {
                warn!(generation, fitness, streak, "validation drift detected");
                if self.config.stop_on_validation_drift {
                    Ok(ValidationStep::Stop(Termination::ValidationDrift))
                } else {
                    Ok(ValidationStep::Continue(None))
                }
            }
        }
    }

    fn champion_record(
        &self,
        generation: usize,
        individual: &Individual,
        context: &EvaluationContext,
    ) -> ChampionRecord {
        ChampionRecord::new(
            &self.config.strategy,
            timeframe_flag(self.config.timeframe),
            generation,
            individual.fitness,
            individual.genome.clone(),
            context.dataset_names(),
            &individual.results,
        )
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let total = self.training.total_rows() * self.config.population as u64;
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

enum ValidationStep {
    Continue(Option<ChampionRecord>),
    Stop(Termination),
}

fn collect_individuals(
    generation: usize,
    population: Vec<Genome>,
    outcomes: Vec<JobOutcome>,
) -> Vec<Individual> {
    population
        .into_iter()
        .zip(outcomes)
        .enumerate()
        .map(|(index, (genome, outcome))| {
            let fitness = outcome.fitness();
            let results = match outcome {
                JobOutcome::Scored { results, .. } => results,
                JobOutcome::Failed { reason } => {
                    warn!(generation, index, %reason, "individual failed");
                    Vec::new()
                }
                JobOutcome::Cancelled => Vec::new(),
            };
            Individual {
                genome,
                fitness,
                results,
            }
        })
        .collect()
}
