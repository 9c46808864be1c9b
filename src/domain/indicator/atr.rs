//! Average True Range with Wilder's smoothing.
//!
//! TR = max(high - low, |high - prev_close|, |low - prev_close|); the first
//! bar uses high - low. ATR seeds with the mean of the first n true ranges.

use crate::domain::frame::Frame;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    count: usize,
    sum: f64,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Atr {
            period: period.max(1),
            prev_close: None,
            count: 0,
            sum: 0.0,
            value: None,
        }
    }

    pub fn next(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let tr = match self.prev_close {
            Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
            None => high - low,
        };
        self.prev_close = Some(close);

        let n = self.period as f64;
        self.value = match self.value {
            Some(prev) => Some((prev * (n - 1.0) + tr) / n),
            None => {
                self.count += 1;
                self.sum += tr;
                (self.count == self.period).then(|| self.sum / n)
            }
        };
        self.value
    }

    pub fn next_frame(&mut self, frame: &Frame) -> Option<f64> {
        self.next(frame.high, frame.low, frame.close)
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        *self = Atr::new(self.period);
    }
}
