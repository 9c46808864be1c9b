//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values return `None`.

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    count: usize,
    sum: f64,
    value: Option<f64>,
}

impl Ema {
    /// A zero period is treated as 1 (the EMA then tracks its input).
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Ema {
            period,
            k: 2.0 / (period as f64 + 1.0),
            count: 0,
            sum: 0.0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn next(&mut self, input: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(input * self.k + prev * (1.0 - self.k)),
            None => {
                self.count += 1;
                self.sum += input;
                (self.count == self.period).then(|| self.sum / self.period as f64)
            }
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.sum = 0.0;
        self.value = None;
    }
}
