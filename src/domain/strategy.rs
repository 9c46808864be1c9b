//! Strategy engine: position lifecycle, condition ticking, and wallet accounting.
//!
//! A concrete strategy supplies a [`StrategyLogic`] (indicators, exit levels,
//! sizing, and its long/short condition lists). [`Strategy`] wraps it with the
//! shared state machine; the evaluator drives it through the object-safe
//! [`Trader`] trait.

use tracing::{Level, event};

use crate::domain::condition::StrategyCondition;
use crate::domain::error::EvotraderError;
use crate::domain::frame::{Frame, format_millis};
use crate::domain::position::{Position, Side};
use crate::domain::wallet::Wallet;

/// Capabilities a concrete strategy provides to the engine.
pub trait StrategyLogic: Sized {
    /// Advance indicators by one closed frame.
    fn compute_indicators_step(&mut self, frame: &Frame);

    fn stop_loss(&self, open_price: f64, side: Side) -> f64;

    fn take_profit(&self, open_price: f64, side: Side) -> f64;

    /// Capital to commit to a new position given the spendable balance.
    fn margin_investment(&self, balance: f64) -> f64;

    fn long_conditions(&self) -> Vec<StrategyCondition<Self>>;

    fn short_conditions(&self) -> Vec<StrategyCondition<Self>>;
}

/// Object-safe view of a running strategy.
pub trait Trader {
    /// Close positions whose exit levels are crossed, then on closed frames
    /// tick conditions and open new positions.
    fn update_state(&mut self, frame: &Frame, verbose: bool) -> Result<(), EvotraderError>;

    fn wallet(&self) -> &dyn Wallet;

    fn open_positions(&self) -> &[Position];

    fn closed_positions(&self) -> &[Position];

    /// Unwind still-open positions, returning their margin to a simulated wallet.
    ///
    /// Returns the total margin released.
    fn release_open_positions(&mut self) -> f64;
}

pub struct Strategy<L: StrategyLogic> {
    logic: L,
    wallet: Box<dyn Wallet>,
    max_positions: usize,
    long_conditions: Vec<StrategyCondition<L>>,
    short_conditions: Vec<StrategyCondition<L>>,
    open_positions: Vec<Position>,
    closed_positions: Vec<Position>,
}

impl<L: StrategyLogic> Strategy<L> {
    /// Condition lists are built once here and reused for every tick.
    pub fn new(logic: L, wallet: Box<dyn Wallet>, max_positions: usize) -> Self {
        let long_conditions = logic.long_conditions();
        let short_conditions = logic.short_conditions();
        Strategy {
            logic,
            wallet,
            max_positions,
            long_conditions,
            short_conditions,
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
        }
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    fn has_capacity(&self) -> bool {
        self.open_positions.len() < self.max_positions && self.wallet.balance() > 0.0
    }

    fn close_triggered(&mut self, price: f64, verbose: bool) {
        let (triggered, still_open): (Vec<Position>, Vec<Position>) =
            std::mem::take(&mut self.open_positions)
                .into_iter()
                .partition(|p| p.should_close(price).0);
        self.open_positions = still_open;

        for mut position in triggered {
            let (_, won) = position.should_close(price);
            position.close(won, price);
            if let Some(wallet) = self.wallet.as_simulated_mut() {
                wallet.settle(position.investment(), position.profit());
            }
            log_position(verbose, "closed position", &position);
            self.closed_positions.push(position);
        }
    }

    fn try_open(&mut self, side: Side, frame: &Frame, verbose: bool) {
        let conditions = match side {
            Side::Long => &self.long_conditions,
            Side::Short => &self.short_conditions,
        };
        if conditions.is_empty() || !conditions.iter().all(StrategyCondition::is_satisfied) {
            return;
        }

        let balance = self.wallet.balance();
        let investment = self.logic.margin_investment(balance);
        if !investment.is_finite() || investment <= 0.0 || investment > balance {
            event!(
                Level::DEBUG,
                ?side,
                investment,
                balance,
                "skipping entry with unusable margin"
            );
            return;
        }

        let price = frame.close;
        let position = Position::open(
            side,
            frame.start_time,
            price,
            self.logic.take_profit(price, side),
            self.logic.stop_loss(price, side),
            investment,
        );
        if let Some(wallet) = self.wallet.as_simulated_mut() {
            wallet.debit(investment);
        }
        log_position(verbose, "opened position", &position);
        self.open_positions.push(position);

        let conditions = match side {
            Side::Long => &mut self.long_conditions,
            Side::Short => &mut self.short_conditions,
        };
        conditions.iter_mut().for_each(StrategyCondition::reset);
    }
}

fn log_position(verbose: bool, message: &str, position: &Position) {
    let opened_at = format_millis(position.open_time());
    if verbose {
        event!(Level::INFO, side = ?position.side(), open_price = position.open_price(),
            opened_at, result_pct = position.result_percentage(), profit = position.profit(), "{message}");
    } else {
        event!(Level::TRACE, side = ?position.side(), open_price = position.open_price(),
            opened_at, result_pct = position.result_percentage(), profit = position.profit(), "{message}");
    }
}

impl<L: StrategyLogic> Trader for Strategy<L> {
    fn update_state(&mut self, frame: &Frame, verbose: bool) -> Result<(), EvotraderError> {
        frame.validate()?;
        self.close_triggered(frame.close, verbose);

        if !frame.is_closed {
            return Ok(());
        }

        self.logic.compute_indicators_step(frame);
        // Every condition ticks before any is read.
        for condition in &mut self.long_conditions {
            condition.tick(&self.logic, frame);
        }
        for condition in &mut self.short_conditions {
            condition.tick(&self.logic, frame);
        }

        if self.has_capacity() {
            self.try_open(Side::Long, frame, verbose);
        }
        if self.has_capacity() {
            self.try_open(Side::Short, frame, verbose);
        }
        Ok(())
    }

    fn wallet(&self) -> &dyn Wallet {
        self.wallet.as_ref()
    }

    fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    fn closed_positions(&self) -> &[Position] {
        &self.closed_positions
    }

    fn release_open_positions(&mut self) -> f64 {
        let released: f64 = self.open_positions.iter().map(Position::investment).sum();
        if let Some(wallet) = self.wallet.as_simulated_mut() {
            wallet.release(released);
        }
        released
    }
}
