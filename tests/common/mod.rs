#![allow(dead_code)]

use evotrader::domain::condition::StrategyCondition;
use evotrader::domain::error::EvotraderError;
use evotrader::domain::frame::{Dataset, Frame, OhlcvRow};
use evotrader::domain::genome::Genome;
use evotrader::domain::optimizer::report::{ChampionRecord, GenerationStats};
use evotrader::domain::position::Side;
use evotrader::domain::strategies::{StrategyEntry, StrategyRegistry};
use evotrader::domain::strategy::{Strategy, StrategyLogic, Trader};
use evotrader::domain::wallet::{TestWallet, Wallet};
use evotrader::ports::checkpoint_port::CheckpointPort;

const MINUTE_MS: i64 = 60_000;

/// One-minute rows whose closes follow `closes`; each row opens at the previous close.
pub fn rows_from_closes(closes: &[f64]) -> Vec<OhlcvRow> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let open_time = i as i64 * MINUTE_MS;
            OhlcvRow {
                open_time,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                close_time: open_time + MINUTE_MS - 1,
            }
        })
        .collect()
}

pub fn dataset(name: &str, closes: &[f64]) -> Dataset {
    Dataset::new(name, "TESTUSDT", rows_from_closes(closes))
}

pub fn flat_closes(rows: usize, price: f64) -> Vec<f64> {
    vec![price; rows]
}

/// Closes rising by `step` per row.
pub fn ramp_closes(rows: usize, start: f64, step: f64) -> Vec<f64> {
    (0..rows).map(|i| start + step * i as f64).collect()
}

/// Sine wave around `base`; exercises both crossings of any oscillator.
pub fn wave_closes(rows: usize, base: f64, amplitude: f64, period: usize) -> Vec<f64> {
    (0..rows)
        .map(|i| {
            let phase = i as f64 / period as f64 * std::f64::consts::TAU;
            base + amplitude * phase.sin() + 0.001 * i as f64
        })
        .collect()
}

/// Goes long on every closed frame with a fixed share of the balance.
pub struct AlwaysLong {
    pub investment_ratio: f64,
    pub exit_pct: f64,
}

fn always(_: &AlwaysLong, _: &Frame) -> bool {
    true
}

fn never(_: &AlwaysLong, _: &Frame) -> bool {
    false
}

impl StrategyLogic for AlwaysLong {
    fn compute_indicators_step(&mut self, _frame: &Frame) {}

    fn stop_loss(&self, open_price: f64, side: Side) -> f64 {
        match side {
            Side::Long => open_price * (1.0 - self.exit_pct),
            Side::Short => open_price * (1.0 + self.exit_pct),
        }
    }

    fn take_profit(&self, open_price: f64, side: Side) -> f64 {
        match side {
            Side::Long => open_price * (1.0 + self.exit_pct),
            Side::Short => open_price * (1.0 - self.exit_pct),
        }
    }

    fn margin_investment(&self, balance: f64) -> f64 {
        balance * self.investment_ratio
    }

    fn long_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![StrategyCondition::perpetual(always)]
    }

    fn short_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![StrategyCondition::perpetual(never)]
    }
}

pub fn always_long(
    initial_balance: f64,
    investment_ratio: f64,
    exit_pct: f64,
    max_positions: usize,
) -> Strategy<AlwaysLong> {
    Strategy::new(
        AlwaysLong {
            investment_ratio,
            exit_pct,
        },
        Box::new(TestWallet::new(initial_balance)),
        max_positions,
    )
}

pub const RAMP_LONG: &str = "ramp_long";

/// Registry factory: always long, sized by the `investment_ratio` gene, 1% exits.
fn build_ramp_long(
    genome: &Genome,
    wallet: Box<dyn Wallet>,
) -> Result<Box<dyn Trader>, EvotraderError> {
    let investment_ratio = genome.require(RAMP_LONG, "investment_ratio")?;
    Ok(Box::new(Strategy::new(
        AlwaysLong {
            investment_ratio,
            exit_pct: 0.01,
        },
        wallet,
        1,
    )))
}

pub const RAMP_LONG_ENTRY: StrategyEntry = StrategyEntry {
    name: RAMP_LONG,
    parameters: &["investment_ratio"],
    max_positions: 1,
    factory: build_ramp_long,
};

pub fn registry_with_ramp() -> StrategyRegistry {
    let mut registry = StrategyRegistry::with_defaults();
    registry.register(RAMP_LONG_ENTRY);
    registry
}

/// A wallet backed by an exchange; the evaluator must refuse it.
pub struct LiveWallet;

impl Wallet for LiveWallet {
    fn balance(&self) -> f64 {
        1000.0
    }
}

/// Keeps every artifact in memory.
#[derive(Default)]
pub struct InMemoryCheckpoint {
    pub champions: Vec<ChampionRecord>,
    pub validation_champions: Vec<ChampionRecord>,
    pub generations: Vec<GenerationStats>,
}

impl CheckpointPort for InMemoryCheckpoint {
    fn write_champion(&mut self, record: &ChampionRecord) -> Result<(), EvotraderError> {
        self.champions.push(record.clone());
        Ok(())
    }

    fn write_validation_champion(
        &mut self,
        record: &ChampionRecord,
    ) -> Result<(), EvotraderError> {
        self.validation_champions.push(record.clone());
        Ok(())
    }

    fn append_generation_stats(&mut self, stats: &GenerationStats) -> Result<(), EvotraderError> {
        self.generations.push(*stats);
        Ok(())
    }
}
