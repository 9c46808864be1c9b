//! Stochastic oscillator.
//!
//! %K = 100 * (close - lowest_low(k)) / (highest_high(k) - lowest_low(k)),
//! smoothed over `smooth` values; %D = SMA(d) of %K. A flat window yields %K = 50.

use std::collections::VecDeque;

use crate::domain::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    smooth: usize,
    d_period: usize,
    window: VecDeque<(f64, f64)>,
    raw_k: VecDeque<f64>,
    k_values: VecDeque<f64>,
    value: Option<StochasticValue>,
}

impl Stochastic {
    pub fn new(k_period: usize, smooth: usize, d_period: usize) -> Self {
        Stochastic {
            k_period: k_period.max(1),
            smooth: smooth.max(1),
            d_period: d_period.max(1),
            window: VecDeque::with_capacity(k_period.max(1)),
            raw_k: VecDeque::with_capacity(smooth.max(1)),
            k_values: VecDeque::with_capacity(d_period.max(1)),
            value: None,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> Option<StochasticValue> {
        push_bounded(&mut self.window, (high, low), self.k_period);
        if self.window.len() < self.k_period {
            return None;
        }
        let highest = self.window.iter().map(|w| w.0).fold(f64::MIN, f64::max);
        let lowest = self.window.iter().map(|w| w.1).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let raw = if range > 0.0 {
            100.0 * (close - lowest) / range
        } else {
            50.0
        };

        push_bounded(&mut self.raw_k, raw, self.smooth);
        if self.raw_k.len() < self.smooth {
            return None;
        }
        let k = mean(&self.raw_k);

        push_bounded(&mut self.k_values, k, self.d_period);
        if self.k_values.len() < self.d_period {
            return None;
        }
        self.value = Some(StochasticValue {
            k,
            d: mean(&self.k_values),
        });
        self.value
    }

    pub fn next_frame(&mut self, frame: &Frame) -> Option<StochasticValue> {
        self.next(frame.high, frame.low, frame.close)
    }

    pub fn value(&self) -> Option<StochasticValue> {
        self.value
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.raw_k.clear();
        self.k_values.clear();
        self.value = None;
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(item);
}

fn mean(values: &VecDeque<f64>) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stochastic_warmup() {
        let mut st = Stochastic::new(3, 1, 2);
        assert!(st.next(10.0, 8.0, 9.0).is_none());
        assert!(st.next(11.0, 9.0, 10.0).is_none());
        assert!(st.next(12.0, 10.0, 11.0).is_none());
        assert!(st.next(13.0, 11.0, 12.0).is_some());
    }

    #[test]
    fn stochastic_close_at_high_is_100() {
        let mut st = Stochastic::new(2, 1, 1);
        st.next(10.0, 5.0, 7.0);
        let v = st.next(12.0, 6.0, 12.0).unwrap();
        assert_relative_eq!(v.k, 100.0);
        assert_relative_eq!(v.d, 100.0);
    }

    #[test]
    fn stochastic_flat_window_is_50() {
        let mut st = Stochastic::new(2, 1, 1);
        st.next(5.0, 5.0, 5.0);
        assert_relative_eq!(st.next(5.0, 5.0, 5.0).unwrap().k, 50.0);
    }

    #[test]
    fn stochastic_d_averages_k() {
        let mut st = Stochastic::new(1, 1, 2);
        st.next(10.0, 0.0, 10.0); // k = 100
        let v = st.next(10.0, 0.0, 0.0).unwrap(); // k = 0
        assert_relative_eq!(v.k, 0.0);
        assert_relative_eq!(v.d, 50.0);
    }
}
