//! Held-out validation of the training champion.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationVerdict {
    /// New best validation fitness.
    Improved,
    /// No improvement; `streak` consecutive checks without one.
    Regressed { streak: usize },
    /// The streak reached the configured patience.
    Drifted { streak: usize },
}

/// Tracks consecutive validation checks that fail to beat the best score.
#[derive(Debug, Clone)]
pub struct ValidationTracker {
    patience: usize,
    best: Option<f64>,
    streak: usize,
}

impl ValidationTracker {
    pub fn new(patience: usize) -> Self {
        ValidationTracker {
            patience: patience.max(1),
            best: None,
            streak: 0,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn record(&mut self, fitness: f64) -> ValidationVerdict {
        let improved = fitness.is_finite() && self.best.is_none_or(|best| fitness > best);
        if improved {
            self.best = Some(fitness);
            self.streak = 0;
            return ValidationVerdict::Improved;
        }
        self.streak += 1;
        if self.streak >= self.patience {
            ValidationVerdict::Drifted {
                streak: self.streak,
            }
        } else {
            ValidationVerdict::Regressed {
                streak: self.streak,
            }
        }
    }
}
