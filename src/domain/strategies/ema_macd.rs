//! Trend-following: trade MACD histogram zero-crosses in the direction of EMA(200).

use crate::domain::condition::StrategyCondition;
use crate::domain::error::EvotraderError;
use crate::domain::frame::Frame;
use crate::domain::genome::Genome;
use crate::domain::indicator::{Atr, Ema, Macd};
use crate::domain::position::Side;
use crate::domain::strategies::{AtrExits, StrategyEntry, tolerance};
use crate::domain::strategy::{Strategy, StrategyLogic, Trader};
use crate::domain::wallet::Wallet;

pub const NAME: &str = "ema_macd";
pub const MAX_POSITIONS: usize = 5;
pub const TREND_PERIOD: usize = 200;
pub const ATR_PERIOD: usize = 14;

pub const ENTRY: StrategyEntry = StrategyEntry {
    name: NAME,
    parameters: &[
        "risk_reward_ratio",
        "atr_factor",
        "investment_ratio",
        "interval_tolerance",
    ],
    max_positions: MAX_POSITIONS,
    factory: build,
};

pub fn build(genome: &Genome, wallet: Box<dyn Wallet>) -> Result<Box<dyn Trader>, EvotraderError> {
    let logic = EmaMacd::from_genome(genome)?;
    Ok(Box::new(Strategy::new(logic, wallet, MAX_POSITIONS)))
}

#[derive(Debug, Clone)]
pub struct EmaMacd {
    exits: AtrExits,
    investment_ratio: f64,
    interval_tolerance: u32,
    trend: Ema,
    macd: Macd,
    atr: Atr,
    close: f64,
    histogram: Option<f64>,
    prev_histogram: Option<f64>,
}

impl EmaMacd {
    pub fn from_genome(genome: &Genome) -> Result<Self, EvotraderError> {
        Ok(EmaMacd {
            exits: AtrExits {
                risk_reward_ratio: genome.require(NAME, "risk_reward_ratio")?,
                atr_factor: genome.require(NAME, "atr_factor")?,
            },
            investment_ratio: genome.require(NAME, "investment_ratio")?,
            interval_tolerance: tolerance(genome.require(NAME, "interval_tolerance")?),
            trend: Ema::new(TREND_PERIOD),
            macd: Macd::default(),
            atr: Atr::new(ATR_PERIOD),
            close: 0.0,
            histogram: None,
            prev_histogram: None,
        })
    }

    fn ready(&self) -> bool {
        self.trend.value().is_some() && self.atr.value().is_some()
    }

    fn atr(&self) -> f64 {
        self.atr.value().unwrap_or(0.0)
    }
}

fn above_trend(s: &EmaMacd, _: &Frame) -> bool {
    s.ready() && s.trend.value().is_some_and(|ema| s.close > ema)
}

fn below_trend(s: &EmaMacd, _: &Frame) -> bool {
    s.ready() && s.trend.value().is_some_and(|ema| s.close < ema)
}

fn histogram_crossed_up(s: &EmaMacd, _: &Frame) -> bool {
    matches!((s.prev_histogram, s.histogram), (Some(prev), Some(cur)) if prev <= 0.0 && cur > 0.0)
}

fn histogram_crossed_down(s: &EmaMacd, _: &Frame) -> bool {
    matches!((s.prev_histogram, s.histogram), (Some(prev), Some(cur)) if prev >= 0.0 && cur < 0.0)
}

impl StrategyLogic for EmaMacd {
    fn compute_indicators_step(&mut self, frame: &Frame) {
        self.close = frame.close;
        self.trend.next(frame.close);
        self.atr.next_frame(frame);
        self.prev_histogram = self.histogram;
        self.histogram = self.macd.next(frame.close).map(|v| v.histogram);
    }

    fn stop_loss(&self, open_price: f64, side: Side) -> f64 {
        self.exits.stop_loss(open_price, side, self.atr())
    }

    fn take_profit(&self, open_price: f64, side: Side) -> f64 {
        self.exits.take_profit(open_price, side, self.atr())
    }

    fn margin_investment(&self, balance: f64) -> f64 {
        balance * self.investment_ratio
    }

    fn long_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![
            StrategyCondition::perpetual(above_trend),
            StrategyCondition::event(histogram_crossed_up, self.interval_tolerance),
        ]
    }

    fn short_conditions(&self) -> Vec<StrategyCondition<Self>> {
        vec![
            StrategyCondition::perpetual(below_trend),
            StrategyCondition::event(histogram_crossed_down, self.interval_tolerance),
        ]
    }
}
