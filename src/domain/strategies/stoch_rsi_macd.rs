//! Mean-reversion entries: a stochastic extreme arms the setup, RSI confirms the
//! side of 50, and a MACD line/signal cross triggers.

use crate::domain::condition::StrategyCondition;
use crate::domain::error::EvotraderError;
use crate::domain::frame::Frame;
use crate::domain::genome::Genome;
use crate::domain::indicator::{Atr, Macd, MacdValue, Rsi, Stochastic, StochasticValue};
use crate::domain::position::Side;
use crate::domain::strategies::{AtrExits, StrategyEntry, tolerance};
use crate::domain::strategy::{Strategy, StrategyLogic, Trader};
use crate::domain::wallet::Wallet;

pub const NAME: &str = "stoch_rsi_macd";
pub const MAX_POSITIONS: usize = 4;

pub const ENTRY: StrategyEntry = StrategyEntry {
    name: NAME,
    parameters: &[
        "risk_reward_ratio",
        "atr_factor",
        "intervals_tolerance",
        "investment_rate",
        "stoch_overbought",
        "stoch_oversold",
    ],
    max_positions: MAX_POSITIONS,
    factory: build,
};

pub fn build(genome: &Genome, wallet: Box<dyn Wallet>) -> Result<Box<dyn Trader>, EvotraderError> {
    let logic = StochRsiMacd::from_genome(genome)?;
    Ok(Box::new(Strategy::new(logic, wallet, MAX_POSITIONS)))
}

#[derive(Debug, Clone)]
pub struct StochRsiMacd {
    exits: AtrExits,
    intervals_tolerance: u32,
    investment_rate: f64,
    overbought: f64,
    oversold: f64,
    stochastic: Stochastic,
    rsi: Rsi,
    macd: Macd,
    atr: Atr,
    stoch: Option<StochasticValue>,
    rsi_value: Option<f64>,
    macd_value: Option<MacdValue>,
    prev_macd: Option<MacdValue>,
}

impl StochRsiMacd {
    pub fn from_genome(genome: &Genome) -> Result<Self, EvotraderError> {
        Ok(StochRsiMacd {
            exits: AtrExits {
                risk_reward_ratio: genome.require(NAME, "risk_reward_ratio")?,
                atr_factor: genome.require(NAME, "atr_factor")?,
            },
            intervals_tolerance: tolerance(genome.require(NAME, "intervals_tolerance")?),
            investment_rate: genome.require(NAME, "investment_rate")?,
            overbought: genome.require(NAME, "stoch_overbought")?,
            oversold: genome.require(NAME, "stoch_oversold")?,
            stochastic: Stochastic::new(14, 1, 3),
            rsi: Rsi::new(14),
            macd: Macd::default(),
            atr: Atr::new(14),
            stoch: None,
            rsi_value: None,
            macd_value: None,
            prev_macd: None,
        })
    }

    fn atr(&self) -> f64 {
        self.atr.value().unwrap_or(0.0)
    }
}

fn stoch_oversold(s: &StochRsiMacd, _: &Frame) -> bool {
    s.stoch.is_some_and(|v| v.k < s.oversold && v.d < s.oversold)
}

fn stoch_overbought(s: &StochRsiMacd, _: &Frame) -> bool {
    s.stoch.is_some_and(|v| v.k > s.overbought && v.d > s.overbought)
}

fn stoch_leaves_oversold(s: &StochRsiMacd, _: &Frame) -> bool {
    s.stoch.is_some_and(|v| v.k > s.overbought || v.d > s.overbought)
}

fn stoch_leaves_overbought(s: &StochRsiMacd, _: &Frame) -> bool {
    s.stoch.is_some_and(|v| v.k < s.oversold || v.d < s.oversold)
}

fn rsi_bullish(s: &StochRsiMacd, _: &Frame) -> bool {
    s.atr.value().is_some() && s.rsi_value.is_some_and(|rsi| rsi > 50.0)
}

fn rsi_bearish(s: &StochRsiMacd, _: &Frame) -> bool {
    s.atr.value().is_some() && s.rsi_value.is_some_and(|rsi| rsi < 50.0)
}

fn macd_crossed_up(s: &StochRsiMacd, _: &Frame) -> bool {
    matches!((s.prev_macd, s.macd_value), (Some(prev), Some(cur))
        if prev.line <= prev.signal && cur.line > cur.signal)
}

fn macd_crossed_down(s: &StochRsiMacd, _: &Frame) -> bool {
    matches!((s.prev_macd, s.macd_value), (Some(prev), Some(cur))
        if prev.line >= prev.signal && cur.line < cur.signal)
}

impl StrategyLogic for StochRsiMacd {
    fn compute_indicators_step(&mut self, frame: &Frame) {
        self.stoch = self.stochastic.next_frame(frame);
        self.rsi_value = self.rsi.next(frame.close);
        self.atr.next_frame(frame);
        self.prev_macd = self.macd_value;
        self.macd_value = self.macd.next(frame.close);
    }

    fn stop_loss(&self, open_price: f64, side: Side) -> f64 {
        self.exits.stop_loss(open_price, side, self.atr())
    }

    fn take_profit(&self, open_price: f64, side: Side) -> f64 {
        self.exits.take_profit(open_price, side, self.atr())
    }

    fn margin_investment(&self, balance: f64) -> f64 {
        balance * self.investment_rate
    }

    fn long_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![
            StrategyCondition::bounded(
                stoch_oversold,
                stoch_leaves_oversold,
                self.intervals_tolerance,
            ),
            StrategyCondition::perpetual(rsi_bullish),
            StrategyCondition::event(macd_crossed_up, self.intervals_tolerance),
        ]
    }

    fn short_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![
            StrategyCondition::bounded(
                stoch_overbought,
                stoch_leaves_overbought,
                self.intervals_tolerance,
            ),
            StrategyCondition::perpetual(rsi_bearish),
            StrategyCondition::event(macd_crossed_down, self.intervals_tolerance),
        ]
    }
}
