//! Concrete strategies and the name-keyed registry that builds them from genomes.

pub mod ema_macd;
pub mod stoch_rsi_macd;

use std::collections::BTreeMap;

use crate::domain::error::EvotraderError;
use crate::domain::genome::Genome;
use crate::domain::position::Side;
use crate::domain::strategy::Trader;
use crate::domain::wallet::Wallet;

pub type StrategyFactory =
    fn(&Genome, Box<dyn Wallet>) -> Result<Box<dyn Trader>, EvotraderError>;

/// Registry record for one strategy.
#[derive(Debug, Clone, Copy)]
pub struct StrategyEntry {
    pub name: &'static str,
    /// Genome parameter names the strategy reads.
    pub parameters: &'static [&'static str],
    pub max_positions: usize,
    pub factory: StrategyFactory,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<&'static str, StrategyEntry>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ema_macd::ENTRY);
        registry.register(stoch_rsi_macd::ENTRY);
        registry
    }

    pub fn register(&mut self, entry: StrategyEntry) {
        self.entries.insert(entry.name, entry);
    }

    pub fn get(&self, name: &str) -> Result<&StrategyEntry, EvotraderError> {
        self.entries
            .get(name)
            .ok_or_else(|| EvotraderError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    pub fn build(
        &self,
        name: &str,
        genome: &Genome,
        wallet: Box<dyn Wallet>,
    ) -> Result<Box<dyn Trader>, EvotraderError> {
        let entry = self.get(name)?;
        (entry.factory)(genome, wallet)
    }

    pub fn entries(&self) -> impl Iterator<Item = &StrategyEntry> {
        self.entries.values()
    }
}

/// ATR-scaled exit levels shared by the built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrExits {
    pub risk_reward_ratio: f64,
    pub atr_factor: f64,
}

impl AtrExits {
    pub fn stop_loss(&self, open_price: f64, side: Side, atr: f64) -> f64 {
        let distance = self.atr_factor * atr;
        match side {
            Side::Long => open_price - distance,
            Side::Short => open_price + distance,
        }
    }

    pub fn take_profit(&self, open_price: f64, side: Side, atr: f64) -> f64 {
        let distance = self.risk_reward_ratio * self.atr_factor * atr;
        match side {
            Side::Long => open_price + distance,
            Side::Short => open_price - distance,
        }
    }
}

/// Tick count from a real-valued gene.
pub(crate) fn tolerance(value: f64) -> u32 {
    value.round().max(0.0) as u32
}
