//! Deterministic backtest replay.
//!
//! [`BacktestEvaluator::evaluate`] resamples one-minute rows into frames of the
//! configured timeframe, drives a [`Trader`] once per row, and derives an
//! [`EvaluationResult`] from the final wallet and position books.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::EvotraderError;
use crate::domain::frame::{Dataset, Frame, MINUTES_PER_DAY, OhlcvRow};
use crate::domain::position::Position;
use crate::domain::strategy::Trader;

/// Rows between two progress callbacks.
pub const PROGRESS_SPAN: usize = 10_000;

/// Optional callbacks injected by the caller.
#[derive(Default, Clone, Copy)]
pub struct EvaluationHooks<'a> {
    /// Receives the number of rows processed since the previous call.
    pub progress: Option<&'a (dyn Fn(u64) + Sync)>,
    /// Polled once per row; `true` stops the replay.
    pub cancel: Option<&'a (dyn Fn() -> bool + Sync)>,
}

impl EvaluationHooks<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|cancel| cancel())
    }

    fn report(&self, rows: usize) {
        if rows == 0 {
            return;
        }
        if let Some(progress) = self.progress {
            progress(rows as u64);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(EvaluationResult),
    /// Stopped by the cancel hook. Open positions are left unsettled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub balance_trend: Vec<f64>,
    pub worker_index: usize,
}

impl Evaluation {
    pub fn result(&self) -> Option<&EvaluationResult> {
        match &self.outcome {
            Outcome::Completed(result) => Some(result),
            Outcome::Cancelled => None,
        }
    }
}

/// Aggregate performance of one completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub days: f64,
    pub minutes: u64,
    pub timeframe_minutes: u64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_profit: f64,
    pub win_ratio: f64,
    pub estimated_apy: f64,
    pub closed_position_count: usize,
    pub opened_position_count: usize,
    pub average_result_percentage: f64,
    pub result_ratio: f64,
}

impl EvaluationResult {
    /// Derive metrics; zero denominators yield zero rather than NaN.
    pub fn compute(
        minutes: u64,
        timeframe_minutes: u64,
        initial_balance: f64,
        final_balance: f64,
        closed: &[Position],
        opened_position_count: usize,
    ) -> Self {
        let days = minutes as f64 / MINUTES_PER_DAY as f64;
        let total_profit: f64 = closed.iter().map(Position::profit).sum();
        let won = closed.iter().filter(|p| p.won()).count();

        let (win_ratio, average_result_percentage) = if closed.is_empty() {
            (0.0, 0.0)
        } else {
            let n = closed.len() as f64;
            let result_sum: f64 = closed.iter().map(Position::result_percentage).sum();
            (won as f64 / n, result_sum / n)
        };

        let result_ratio = if initial_balance > 0.0 {
            final_balance / initial_balance
        } else {
            0.0
        };

        let estimated_apy = if days > 0.0 && initial_balance > 0.0 {
            if result_ratio > 0.0 {
                (result_ratio.powf(365.0 / days) - 1.0) * 100.0
            } else {
                -100.0
            }
        } else {
            0.0
        };

        EvaluationResult {
            days,
            minutes,
            timeframe_minutes,
            initial_balance,
            final_balance,
            total_profit,
            win_ratio,
            estimated_apy,
            closed_position_count: closed.len(),
            opened_position_count,
            average_result_percentage,
            result_ratio,
        }
    }
}

/// Running state of the candle being built.
#[derive(Debug, Clone, Copy)]
struct CandleWindow {
    start_time: i64,
    open: f64,
    high: f64,
    low: f64,
}

impl CandleWindow {
    fn start(row: &OhlcvRow) -> Self {
        CandleWindow {
            start_time: row.open_time,
            open: row.open,
            high: row.high,
            low: row.low,
        }
    }

    fn extend(&mut self, row: &OhlcvRow) {
        self.high = self.high.max(row.high);
        self.low = self.low.min(row.low);
    }

    fn frame(&self, symbol: &Arc<str>, row: &OhlcvRow, is_closed: bool) -> Frame {
        Frame {
            symbol: Arc::clone(symbol),
            start_time: self.start_time,
            close_time: row.close_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: row.close,
            is_closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestEvaluator {
    timeframe: usize,
    balance_sample_interval: usize,
    verbose: bool,
}

impl BacktestEvaluator {
    pub fn new(timeframe: usize) -> Result<Self, EvotraderError> {
        if timeframe == 0 {
            return Err(EvotraderError::ConfigInvalid {
                section: "backtest".into(),
                key: "timeframe".into(),
                reason: "must be at least 1 minute".into(),
            });
        }
        Ok(BacktestEvaluator {
            timeframe,
            balance_sample_interval: MINUTES_PER_DAY,
            verbose: false,
        })
    }

    /// Rows between balance samples; clamped to at least 1.
    pub fn with_balance_sample_interval(mut self, interval: usize) -> Self {
        self.balance_sample_interval = interval.max(1);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timeframe(&self) -> usize {
        self.timeframe
    }

    /// Replay `dataset` through `strategy`.
    ///
    /// The strategy must own a simulated wallet funded with `initial_balance`.
    pub fn evaluate(
        &self,
        strategy: &mut dyn Trader,
        initial_balance: f64,
        dataset: &Dataset,
        hooks: EvaluationHooks<'_>,
        worker_index: usize,
    ) -> Result<Evaluation, EvotraderError> {
        if !strategy.wallet().is_simulated() {
            return Err(EvotraderError::SimulatedWalletRequired);
        }
        dataset.ensure_not_empty()?;

        let symbol: Arc<str> = Arc::from(dataset.symbol.as_str());
        let mut window: Option<CandleWindow> = None;
        let mut balance_trend = Vec::new();
        let mut unreported = 0;

        for (i, row) in dataset.rows.iter().enumerate() {
            if hooks.cancelled() {
                hooks.report(unreported);
                debug!(worker_index, rows = i, dataset = %dataset.name, "evaluation cancelled");
                return Ok(Evaluation {
                    outcome: Outcome::Cancelled,
                    balance_trend,
                    worker_index,
                });
            }

            let candle = match window {
                Some(mut candle) => {
                    candle.extend(row);
                    candle
                }
                None => CandleWindow::start(row),
            };
            let is_closed = (i + 1) % self.timeframe == 0;
            let frame = candle.frame(&symbol, row, is_closed);
            window = (!is_closed).then_some(candle);

            strategy.update_state(&frame, self.verbose)?;

            if i % self.balance_sample_interval == 0 {
                balance_trend.push(strategy.wallet().total_balance());
            }
            unreported += 1;
            if unreported >= PROGRESS_SPAN {
                hooks.report(unreported);
                unreported = 0;
            }
        }
        hooks.report(unreported);

        strategy.release_open_positions();
        let final_balance = strategy.wallet().balance();
        balance_trend.push(final_balance);

        let opened = strategy.closed_positions().len() + strategy.open_positions().len();
        let result = EvaluationResult::compute(
            dataset.rows.len() as u64,
            self.timeframe as u64,
            initial_balance,
            final_balance,
            strategy.closed_positions(),
            opened,
        );
        debug!(
            worker_index,
            dataset = %dataset.name,
            final_balance = result.final_balance,
            closed = result.closed_position_count,
            "evaluation completed"
        );

        Ok(Evaluation {
            outcome: Outcome::Completed(result),
            balance_trend,
            worker_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Side;
    use crate::domain::wallet::{TestWallet, Wallet};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Records every frame it receives and never trades.
    struct Recorder {
        wallet: Box<dyn Wallet>,
        frames: Vec<Frame>,
    }

    impl Recorder {
        fn simulated() -> Self {
            Recorder {
                wallet: Box::new(TestWallet::new(1000.0)),
                frames: Vec::new(),
            }
        }
    }

    impl Trader for Recorder {
        fn update_state(&mut self, frame: &Frame, _verbose: bool) -> Result<(), EvotraderError> {
            frame.validate()?;
            self.frames.push(frame.clone());
            Ok(())
        }

        fn wallet(&self) -> &dyn Wallet {
            self.wallet.as_ref()
        }

        fn open_positions(&self) -> &[Position] {
            &[]
        }

        fn closed_positions(&self) -> &[Position] {
            &[]
        }

        fn release_open_positions(&mut self) -> f64 {
            0.0
        }
    }

    struct LiveWallet;

    impl Wallet for LiveWallet {
        fn balance(&self) -> f64 {
            1000.0
        }
    }

    fn rows(n: usize) -> Vec<OhlcvRow> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                OhlcvRow {
                    open_time: i as i64 * 60_000,
                    open: base,
                    high: base + 2.0 + (i % 3) as f64,
                    low: base - 1.0,
                    close: base + 0.5,
                    close_time: i as i64 * 60_000 + 59_999,
                }
            })
            .collect()
    }

    fn dataset(n: usize) -> Dataset {
        Dataset::new("train", "TEST", rows(n))
    }

    #[test]
    fn ten_rows_at_five_minutes_give_two_closed_frames() {
        let evaluator = BacktestEvaluator::new(5).unwrap();
        let mut recorder = Recorder::simulated();
        let ds = dataset(10);
        evaluator
            .evaluate(&mut recorder, 1000.0, &ds, EvaluationHooks::default(), 0)
            .unwrap();

        assert_eq!(recorder.frames.len(), 10);
        let closed: Vec<&Frame> = recorder.frames.iter().filter(|f| f.is_closed).collect();
        assert_eq!(closed.len(), 2);

        let first = closed[0];
        assert_eq!(first.start_time, ds.rows[0].open_time);
        assert_eq!(first.close_time, ds.rows[4].close_time);
        assert_relative_eq!(first.open, ds.rows[0].open);
        assert_relative_eq!(first.close, ds.rows[4].close);
        let high = ds.rows[..5].iter().map(|r| r.high).fold(f64::MIN, f64::max);
        assert_relative_eq!(first.high, high);
        assert_relative_eq!(first.low, ds.rows[0].low);

        assert_eq!(closed[1].start_time, ds.rows[5].open_time);
    }

    #[test]
    fn intra_frames_carry_running_extremes() {
        let evaluator = BacktestEvaluator::new(5).unwrap();
        let mut recorder = Recorder::simulated();
        evaluator
            .evaluate(&mut recorder, 1000.0, &dataset(5), EvaluationHooks::default(), 0)
            .unwrap();
        let third = &recorder.frames[2];
        assert!(!third.is_closed);
        assert_eq!(third.start_time, 0);
        assert_relative_eq!(third.high, 106.0);
        assert_relative_eq!(third.close, 102.5);
    }

    #[test]
    fn live_wallet_is_rejected() {
        let evaluator = BacktestEvaluator::new(5).unwrap();
        let mut recorder = Recorder {
            wallet: Box::new(LiveWallet),
            frames: Vec::new(),
        };
        let err = evaluator
            .evaluate(&mut recorder, 1000.0, &dataset(10), EvaluationHooks::default(), 0)
            .unwrap_err();
        assert!(matches!(err, EvotraderError::SimulatedWalletRequired));
        assert!(recorder.frames.is_empty());
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let evaluator = BacktestEvaluator::new(5).unwrap();
        let err = evaluator
            .evaluate(
                &mut Recorder::simulated(),
                1000.0,
                &dataset(0),
                EvaluationHooks::default(),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, EvotraderError::EmptyDataset { .. }));
    }

    #[test]
    fn zero_timeframe_is_rejected() {
        assert!(BacktestEvaluator::new(0).is_err());
    }

    #[test]
    fn cancellation_returns_partial_trend() {
        let evaluator = BacktestEvaluator::new(5)
            .unwrap()
            .with_balance_sample_interval(2);
        let polls = AtomicU64::new(0);
        let cancel = || polls.fetch_add(1, Ordering::Relaxed) >= 6;
        let hooks = EvaluationHooks {
            progress: None,
            cancel: Some(&cancel),
        };
        let mut recorder = Recorder::simulated();
        let evaluation = evaluator
            .evaluate(&mut recorder, 1000.0, &dataset(20), hooks, 3)
            .unwrap();

        assert_eq!(evaluation.outcome, Outcome::Cancelled);
        assert!(evaluation.result().is_none());
        assert_eq!(evaluation.worker_index, 3);
        assert_eq!(recorder.frames.len(), 6);
        // Samples at rows 0, 2, 4.
        assert_eq!(evaluation.balance_trend.len(), 3);
    }

    #[test]
    fn progress_totals_row_count() {
        let evaluator = BacktestEvaluator::new(1).unwrap();
        let total = AtomicU64::new(0);
        let calls = AtomicU64::new(0);
        let progress = |n: u64| {
            total.fetch_add(n, Ordering::Relaxed);
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let hooks = EvaluationHooks {
            progress: Some(&progress),
            cancel: None,
        };
        let ds = dataset(PROGRESS_SPAN + 5);
        evaluator
            .evaluate(&mut Recorder::simulated(), 1000.0, &ds, hooks, 0)
            .unwrap();
        assert_eq!(total.load(Ordering::Relaxed), ds.len() as u64);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn malformed_row_aborts_replay() {
        let mut data = rows(5);
        data[2].close = f64::NAN;
        let ds = Dataset::new("bad", "TEST", data);
        let evaluator = BacktestEvaluator::new(5).unwrap();
        let err = evaluator
            .evaluate(&mut Recorder::simulated(), 1000.0, &ds, EvaluationHooks::default(), 0)
            .unwrap_err();
        assert!(matches!(err, EvotraderError::MalformedFrame { .. }));
    }

    #[test]
    fn no_positions_and_no_days_give_zero_metrics() {
        let result = EvaluationResult::compute(0, 5, 1000.0, 1000.0, &[], 0);
        assert_relative_eq!(result.win_ratio, 0.0);
        assert_relative_eq!(result.estimated_apy, 0.0);
        assert_relative_eq!(result.average_result_percentage, 0.0);
        assert_relative_eq!(result.result_ratio, 1.0);
    }

    #[test]
    fn metrics_from_closed_positions() {
        let mut win = Position::open(Side::Long, 0, 100.0, 110.0, 90.0, 100.0);
        win.close(true, 110.0);
        let mut loss = Position::open(Side::Short, 0, 100.0, 90.0, 110.0, 100.0);
        loss.close(false, 125.0);

        let result = EvaluationResult::compute(
            MINUTES_PER_DAY as u64 * 365,
            5,
            1000.0,
            990.0,
            &[win, loss],
            3,
        );
        assert_relative_eq!(result.days, 365.0);
        assert_relative_eq!(result.win_ratio, 0.5);
        assert_relative_eq!(result.total_profit, -10.0, epsilon = 1e-9);
        assert_relative_eq!(result.average_result_percentage, -5.0, epsilon = 1e-9);
        assert_relative_eq!(result.estimated_apy, -1.0, epsilon = 1e-9);
        assert_eq!(result.closed_position_count, 2);
        assert_eq!(result.opened_position_count, 3);
    }

    #[test]
    fn wiped_out_balance_reports_total_loss() {
        let result = EvaluationResult::compute(1440, 5, 1000.0, 0.0, &[], 0);
        assert_relative_eq!(result.estimated_apy, -100.0);
    }

    #[test]
    fn cancel_before_first_row_yields_empty_trend() {
        let cancel = || true;
        let hooks = EvaluationHooks {
            progress: None,
            cancel: Some(&cancel),
        };
        let evaluation = BacktestEvaluator::new(5)
            .unwrap()
            .evaluate(&mut Recorder::simulated(), 1000.0, &dataset(5), hooks, 0)
            .unwrap();
        assert_eq!(evaluation.outcome, Outcome::Cancelled);
        assert!(evaluation.balance_trend.is_empty());
    }
}
