mod common;

use approx::assert_relative_eq;
use common::*;
use evotrader::domain::error::EvotraderError;
use evotrader::domain::evaluator::{BacktestEvaluator, EvaluationHooks, EvaluationResult, Outcome};
use evotrader::domain::frame::Frame;
use evotrader::domain::genome::{GeneSpec, Genome};
use evotrader::domain::position::{Position, Side};
use evotrader::domain::strategies::StrategyRegistry;
use evotrader::domain::strategy::{Strategy, Trader};
use evotrader::domain::wallet::{TestWallet, Wallet};

fn completed(
    evaluator: &BacktestEvaluator,
    trader: &mut dyn Trader,
    initial_balance: f64,
    closes: &[f64],
) -> (EvaluationResult, Vec<f64>) {
    let evaluation = evaluator
        .evaluate(
            trader,
            initial_balance,
            &dataset("synthetic", closes),
            EvaluationHooks::default(),
            0,
        )
        .unwrap();
    match evaluation.outcome {
        Outcome::Completed(result) => (result, evaluation.balance_trend),
        Outcome::Cancelled => panic!("evaluation was cancelled"),
    }
}

/// Counts closed frames and otherwise defers to an always-long strategy.
struct FrameCounter {
    inner: Strategy<AlwaysLong>,
    closed_frames: Vec<Frame>,
}

impl Trader for FrameCounter {
    fn update_state(&mut self, frame: &Frame, verbose: bool) -> Result<(), EvotraderError> {
        if frame.is_closed {
            self.closed_frames.push(frame.clone());
        }
        self.inner.update_state(frame, verbose)
    }

    fn wallet(&self) -> &dyn Wallet {
        self.inner.wallet()
    }

    fn open_positions(&self) -> &[Position] {
        self.inner.open_positions()
    }

    fn closed_positions(&self) -> &[Position] {
        self.inner.closed_positions()
    }

    fn release_open_positions(&mut self) -> f64 {
        self.inner.release_open_positions()
    }
}

#[test]
fn ten_rows_at_five_minutes_open_a_single_long() {
    let evaluator = BacktestEvaluator::new(5).unwrap();
    let mut trader = FrameCounter {
        inner: always_long(1000.0, 0.25, 0.1, 1),
        closed_frames: Vec::new(),
    };

    let (result, _) = completed(&evaluator, &mut trader, 1000.0, &flat_closes(10, 100.0));

    assert_eq!(trader.closed_frames.len(), 2);
    assert_eq!(trader.closed_frames[0].start_time, 0);
    assert_eq!(trader.closed_frames[1].start_time, 5 * 60_000);

    let open = trader.open_positions();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].side(), Side::Long);
    assert_eq!(open[0].open_time(), 0);
    assert_eq!(result.opened_position_count, 1);
    assert_eq!(result.closed_position_count, 0);
    // Unclosed margin is returned at the end of the run.
    assert_relative_eq!(result.final_balance, 1000.0);
}

#[test]
fn winning_position_returns_margin_plus_profit() {
    let evaluator = BacktestEvaluator::new(5).unwrap();
    let mut strategy = always_long(1000.0, 0.25, 0.05, 1);

    let mut closes = flat_closes(5, 100.0);
    closes.push(110.0);
    let (result, _) = completed(&evaluator, &mut strategy, 1000.0, &closes);

    let closed = strategy.closed_positions();
    assert_eq!(closed.len(), 1);
    assert!(closed[0].won());
    assert_relative_eq!(closed[0].investment(), 250.0);
    assert_relative_eq!(closed[0].result_percentage(), 10.0, epsilon = 1e-9);
    assert_relative_eq!(closed[0].profit(), 25.0, epsilon = 1e-9);
    // 750 after the debit, then 275 back.
    assert_relative_eq!(result.final_balance, 1025.0, epsilon = 1e-9);
    assert_relative_eq!(result.total_profit, 25.0, epsilon = 1e-9);
    assert_relative_eq!(result.win_ratio, 1.0);
    assert_relative_eq!(result.result_ratio, 1.025, epsilon = 1e-12);
}

#[test]
fn losing_position_reduces_balance() {
    let evaluator = BacktestEvaluator::new(5).unwrap();
    let mut strategy = always_long(1000.0, 0.5, 0.05, 1);

    let mut closes = flat_closes(5, 100.0);
    closes.push(90.0);
    let (result, _) = completed(&evaluator, &mut strategy, 1000.0, &closes);

    assert_eq!(result.closed_position_count, 1);
    assert_relative_eq!(result.win_ratio, 0.0);
    assert_relative_eq!(result.final_balance, 950.0, epsilon = 1e-9);
    assert!(result.estimated_apy < 0.0);
}

#[test]
fn capacity_caps_concurrent_positions() {
    let evaluator = BacktestEvaluator::new(5).unwrap();
    let mut strategy = always_long(1000.0, 0.1, 0.5, 3);

    completed(&evaluator, &mut strategy, 1000.0, &flat_closes(60, 100.0));

    assert_eq!(strategy.open_positions().len(), 3);
    assert!(strategy.closed_positions().is_empty());
}

#[test]
fn live_wallet_is_rejected() {
    let evaluator = BacktestEvaluator::new(5).unwrap();
    let mut strategy = Strategy::new(
        AlwaysLong {
            investment_ratio: 0.25,
            exit_pct: 0.1,
        },
        Box::new(LiveWallet),
        1,
    );
    let err = evaluator
        .evaluate(
            &mut strategy,
            1000.0,
            &dataset("live", &flat_closes(10, 100.0)),
            EvaluationHooks::default(),
            0,
        )
        .unwrap_err();
    assert!(matches!(err, EvotraderError::SimulatedWalletRequired));
}

fn ema_macd_specs() -> Vec<GeneSpec> {
    [
        ("risk_reward_ratio", 1.0, 3.0),
        ("atr_factor", 0.5, 3.0),
        ("investment_ratio", 0.05, 0.5),
        ("interval_tolerance", 1.0, 5.0),
    ]
    .into_iter()
    .map(|(name, lower_bound, upper_bound)| GeneSpec {
        name: name.into(),
        lower_bound,
        upper_bound,
        value: None,
    })
    .collect()
}

fn stoch_rsi_macd_specs() -> Vec<GeneSpec> {
    [
        ("risk_reward_ratio", 1.0, 3.0),
        ("atr_factor", 0.5, 3.0),
        ("intervals_tolerance", 1.0, 8.0),
        ("investment_rate", 0.05, 0.5),
        ("stoch_overbought", 70.0, 90.0),
        ("stoch_oversold", 10.0, 30.0),
    ]
    .into_iter()
    .map(|(name, lower_bound, upper_bound)| GeneSpec {
        name: name.into(),
        lower_bound,
        upper_bound,
        value: None,
    })
    .collect()
}

fn run_registered(name: &str, genome: &Genome, closes: &[f64]) -> (EvaluationResult, Vec<f64>) {
    let registry = StrategyRegistry::with_defaults();
    let evaluator = BacktestEvaluator::new(5)
        .unwrap()
        .with_balance_sample_interval(1440);
    let mut trader = registry
        .build(name, genome, Box::new(TestWallet::new(1000.0)))
        .unwrap();
    completed(&evaluator, trader.as_mut(), 1000.0, closes)
}

#[test]
fn registered_strategies_are_deterministic() {
    let closes = wave_closes(20_000, 100.0, 8.0, 600);
    let cases = [
        ("ema_macd", Genome::fixed(&ema_macd_specs()).unwrap()),
        ("stoch_rsi_macd", Genome::fixed(&stoch_rsi_macd_specs()).unwrap()),
    ];

    for (name, genome) in cases {
        let (first, first_trend) = run_registered(name, &genome, &closes);
        let (second, second_trend) = run_registered(name, &genome, &closes);
        assert_eq!(first, second, "{name} results differ between runs");
        assert_eq!(first_trend, second_trend, "{name} balance trends differ");

        assert!(first.final_balance.is_finite() && first.final_balance > 0.0);
        assert!(first.opened_position_count >= first.closed_position_count);
        assert_relative_eq!(first.days, 20_000.0 / 1440.0, epsilon = 1e-12);
        // One sample per day of rows plus the final balance.
        assert_eq!(first_trend.len(), 20_000 / 1440 + 2);
    }
}

#[test]
fn unknown_strategy_is_an_error() {
    let registry = StrategyRegistry::with_defaults();
    let err = registry
        .build(
            "buy_and_pray",
            &Genome::new(Vec::new()),
            Box::new(TestWallet::new(1000.0)),
        )
        .err()
        .unwrap();
    assert!(matches!(err, EvotraderError::UnknownStrategy { .. }));
}

#[test]
fn missing_gene_is_reported_by_name() {
    let registry = StrategyRegistry::with_defaults();
    let specs: Vec<GeneSpec> = ema_macd_specs()
        .into_iter()
        .filter(|s| s.name != "atr_factor")
        .collect();
    let err = registry
        .build(
            "ema_macd",
            &Genome::fixed(&specs).unwrap(),
            Box::new(TestWallet::new(1000.0)),
        )
        .err()
        .unwrap();
    match err {
        EvotraderError::MissingParameter { parameter, .. } => assert_eq!(parameter, "atr_factor"),
        other => panic!("unexpected error: {other}"),
    }
}
