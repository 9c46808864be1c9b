//! Bounded worker pool that scores one generation at a time.
//!
//! Every individual is an independent job on a rayon thread pool. Jobs share
//! only read-only context; results travel back over a channel. A panicking or
//! failing job scores as the worst fitness without disturbing its siblings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tracing::{debug, warn};

use crate::domain::error::EvotraderError;
use crate::domain::evaluator::{BacktestEvaluator, EvaluationHooks, EvaluationResult, Outcome};
use crate::domain::frame::Dataset;
use crate::domain::genome::Genome;
use crate::domain::optimizer::fitness::FitnessFunction;
use crate::domain::strategies::StrategyRegistry;
use crate::domain::wallet::TestWallet;

/// How often the collector wakes to check the cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for aborted jobs to wind down.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Scored {
        fitness: f64,
        results: Vec<EvaluationResult>,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl JobOutcome {
    /// Fitness used for ranking; anything but a finite score ranks last.
    pub fn fitness(&self) -> f64 {
        match self {
            JobOutcome::Scored { fitness, .. } if fitness.is_finite() => *fitness,
            _ => f64::NEG_INFINITY,
        }
    }
}

#[derive(Debug)]
pub enum BatchOutcome {
    /// One outcome per submitted genome, in submission order.
    Complete(Vec<JobOutcome>),
    TimedOut { completed: usize },
    Cancelled,
}

/// Read-only state every job needs to score a genome.
pub struct EvaluationContext {
    pub registry: StrategyRegistry,
    pub strategy: String,
    pub datasets: Vec<Dataset>,
    pub evaluator: BacktestEvaluator,
    pub initial_balance: f64,
    pub fitness: Arc<dyn FitnessFunction>,
}

impl EvaluationContext {
    pub fn total_rows(&self) -> u64 {
        self.datasets.iter().map(|d| d.len() as u64).sum()
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.name.as_str())
    }

    /// Backtest `genome` on every dataset with a fresh strategy and wallet each.
    ///
    /// Returns `None` if cancelled part-way.
    pub fn evaluate(
        &self,
        genome: &Genome,
        hooks: EvaluationHooks<'_>,
        worker_index: usize,
    ) -> Result<Option<Vec<EvaluationResult>>, EvotraderError> {
        let mut results = Vec::with_capacity(self.datasets.len());
        for dataset in &self.datasets {
            let wallet = Box::new(TestWallet::new(self.initial_balance));
            let mut trader = self.registry.build(&self.strategy, genome, wallet)?;
            let evaluation = self.evaluator.evaluate(
                trader.as_mut(),
                self.initial_balance,
                dataset,
                hooks,
                worker_index,
            )?;
            match evaluation.outcome {
                Outcome::Completed(result) => results.push(result),
                Outcome::Cancelled => return Ok(None),
            }
        }
        Ok(Some(results))
    }

    pub fn score(
        &self,
        genome: &Genome,
        hooks: EvaluationHooks<'_>,
        worker_index: usize,
    ) -> JobOutcome {
        match self.evaluate(genome, hooks, worker_index) {
            Ok(Some(results)) => JobOutcome::Scored {
                fitness: self.fitness.fitness(&results),
                results,
            },
            Ok(None) => JobOutcome::Cancelled,
            Err(err) => JobOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, EvotraderError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("evotrader-worker-{i}"))
            .build()
            .map_err(|e| EvotraderError::Io(std::io::Error::other(e)))?;
        Ok(WorkerPool { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Score `genomes` and block until every job reports, the deadline
    /// passes, or `cancel` is raised.
    ///
    /// Aborted jobs are signalled and given a short grace period to finish
    /// before this returns.
    pub fn run_generation(
        &self,
        context: &Arc<EvaluationContext>,
        genomes: &[Genome],
        deadline: Duration,
        cancel: &Arc<AtomicBool>,
        progress: &ProgressBar,
    ) -> BatchOutcome {
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(usize, JobOutcome)>();

        for (index, genome) in genomes.iter().cloned().enumerate() {
            let tx = tx.clone();
            let context = Arc::clone(context);
            let abort = Arc::clone(&abort);
            let cancel = Arc::clone(cancel);
            let progress = progress.clone();
            self.pool.spawn(move || {
                let worker_index = rayon::current_thread_index().unwrap_or(0);
                let stop = || abort.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed);
                let tick = |rows: u64| progress.inc(rows);
                let hooks = EvaluationHooks {
                    progress: Some(&tick),
                    cancel: Some(&stop),
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    context.score(&genome, hooks, worker_index)
                }))
                .unwrap_or_else(|payload| JobOutcome::Failed {
                    reason: panic_message(payload.as_ref()),
                });
                // The collector may have given up on this generation.
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);

        let started = Instant::now();
        let mut outcomes: Vec<Option<JobOutcome>> = genomes.iter().map(|_| None).collect();
        let mut received = 0;

        while received < genomes.len() {
            if cancel.load(Ordering::Relaxed) {
                abort.store(true, Ordering::Relaxed);
                drain(&rx, genomes.len() - received);
                return BatchOutcome::Cancelled;
            }
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                abort.store(true, Ordering::Relaxed);
                drain(&rx, genomes.len() - received);
                return BatchOutcome::TimedOut {
                    completed: received,
                };
            }
            match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok((index, outcome)) => {
                    if let Some(slot) = outcomes.get_mut(index) {
                        *slot = Some(outcome);
                        received += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        BatchOutcome::Complete(
            outcomes
                .into_iter()
                .map(|outcome| {
                    outcome.unwrap_or_else(|| JobOutcome::Failed {
                        reason: "worker exited without reporting".into(),
                    })
                })
                .collect(),
        )
    }
}

/// Wait for up to `outstanding` aborted jobs to report.
fn drain(rx: &Receiver<(usize, JobOutcome)>, outstanding: usize) {
    let until = Instant::now() + DRAIN_GRACE;
    let mut left = outstanding;
    while left > 0 {
        let remaining = until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(_) => left -= 1,
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                warn!(outstanding = left, "workers still running after abort");
                return;
            }
        }
    }
    debug!(outstanding, "aborted jobs drained");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
