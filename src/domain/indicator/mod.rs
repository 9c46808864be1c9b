//! Streaming technical indicators.
//!
//! Every indicator is stateful and consumes one closed frame at a time in O(1)
//! (the stochastic oscillator is O(period) over a bounded window). `next`
//! returns `None` while the indicator is still warming up.
//!
//! - [`Ema`]: exponential moving average seeded with the SMA of the first `n` closes
//! - [`Rsi`]: Wilder-smoothed relative strength index
//! - [`Atr`]: Wilder-smoothed average true range
//! - [`Macd`]: EMA(fast) - EMA(slow), signal EMA, histogram
//! - [`Stochastic`]: %K over a high/low window, %D as SMA of %K

pub mod ema;
pub mod rsi;
pub mod atr;
pub mod macd;
pub mod stochastic;

pub use atr::Atr;
pub use ema::Ema;
pub use macd::{Macd, MacdValue};
pub use rsi::Rsi;
pub use stochastic::{Stochastic, StochasticValue};
