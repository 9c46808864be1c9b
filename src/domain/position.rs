//! Directional positions with fixed take-profit and stop-loss levels.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

/// A single directional trade.
///
/// `take_profit` and `stop_loss` are fixed when the position is opened; the
/// result fields are only written once, by [`Position::close`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    side: Side,
    open_time: i64,
    open_price: f64,
    take_profit: f64,
    stop_loss: f64,
    investment: f64,
    closed: bool,
    won: bool,
    close_price: f64,
    result_percentage: f64,
    profit: f64,
}

impl Position {
    pub fn open(
        side: Side,
        open_time: i64,
        open_price: f64,
        take_profit: f64,
        stop_loss: f64,
        investment: f64,
    ) -> Self {
        Position {
            side,
            open_time,
            open_price,
            take_profit,
            stop_loss,
            investment,
            closed: false,
            won: false,
            close_price: 0.0,
            result_percentage: 0.0,
            profit: 0.0,
        }
    }

    /// Test both exit levels against `current_price`.
    ///
    /// Returns `(should_close, won)`. Take-profit is checked before stop-loss,
    /// so a price satisfying both levels counts as a win.
    pub fn should_close(&self, current_price: f64) -> (bool, bool) {
        match self.side {
            Side::Long => {
                if current_price >= self.take_profit {
                    (true, true)
                } else if current_price <= self.stop_loss {
                    (true, false)
                } else {
                    (false, false)
                }
            }
            Side::Short => {
                if current_price <= self.take_profit {
                    (true, true)
                } else if current_price >= self.stop_loss {
                    (true, false)
                } else {
                    (false, false)
                }
            }
        }
    }

    /// Settle the position at the observed `close_price`.
    ///
    /// Realized P&L uses the crossing price, not the exit level that triggered it.
    pub fn close(&mut self, won: bool, close_price: f64) {
        self.won = won;
        self.closed = true;
        self.close_price = close_price;
        self.result_percentage = match self.side {
            Side::Long => (close_price / self.open_price - 1.0) * 100.0,
            Side::Short => (self.open_price / close_price - 1.0) * 100.0,
        };
        self.profit = self.investment * self.result_percentage / 100.0;
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn open_time(&self) -> i64 {
        self.open_time
    }

    pub fn open_price(&self) -> f64 {
        self.open_price
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn investment(&self) -> f64 {
        self.investment
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn won(&self) -> bool {
        self.won
    }

    pub fn close_price(&self) -> f64 {
        self.close_price
    }

    pub fn result_percentage(&self) -> f64 {
        self.result_percentage
    }

    pub fn profit(&self) -> f64 {
        self.profit
    }
}
