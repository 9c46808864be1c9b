//! Scalar fitness over one individual's per-dataset results.

use crate::domain::evaluator::EvaluationResult;

pub trait FitnessFunction: Send + Sync {
    /// Higher is better. Non-finite scores are treated as the worst possible.
    fn fitness(&self, results: &[EvaluationResult]) -> f64;
}

/// Return-ratio and win-ratio blend with convex penalties below break-even.
///
/// Per dataset, with return ratio `r` and win ratio `w`:
///
/// ```text
/// fit = P(r)·(r + 1)^α + Q(w)·(w + 1)^(1 − α) + β·tanh(avg_result_pct / 100)
/// P(r) = r^γ if r < 1 else 1
/// Q(w) = (w + 0.5)^δ if w < 0.5 else 1
/// ```
///
/// Each dataset contributes `365 · fit / days`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioFitness {
    pub alpha: f64,
    pub gamma: f64,
    pub delta: f64,
    pub position_weight: f64,
}

impl Default for RatioFitness {
    fn default() -> Self {
        RatioFitness {
            alpha: 0.65,
            gamma: 3.75,
            delta: 1.75,
            position_weight: 0.1,
        }
    }
}

impl RatioFitness {
    fn dataset_fitness(&self, result: &EvaluationResult) -> f64 {
        let r = result.result_ratio.max(0.0);
        let w = result.win_ratio.clamp(0.0, 1.0);

        let return_penalty = if r < 1.0 { r.powf(self.gamma) } else { 1.0 };
        let win_penalty = if w < 0.5 { (w + 0.5).powf(self.delta) } else { 1.0 };

        return_penalty * (r + 1.0).powf(self.alpha)
            + win_penalty * (w + 1.0).powf(1.0 - self.alpha)
            + self.position_weight * (result.average_result_percentage / 100.0).tanh()
    }
}

impl FitnessFunction for RatioFitness {
    fn fitness(&self, results: &[EvaluationResult]) -> f64 {
        let total: f64 = results
            .iter()
            .filter(|result| result.days > 0.0)
            .map(|result| 365.0 * self.dataset_fitness(result) / result.days)
            .sum();
        if total.is_finite() {
            total
        } else {
            f64::NEG_INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn result(ratio: f64, win_ratio: f64, days: f64) -> EvaluationResult {
        EvaluationResult {
            days,
            minutes: (days * 1440.0) as u64,
            timeframe_minutes: 5,
            initial_balance: 1000.0,
            final_balance: 1000.0 * ratio,
            total_profit: 1000.0 * (ratio - 1.0),
            win_ratio,
            estimated_apy: 0.0,
            closed_position_count: 10,
            opened_position_count: 10,
            average_result_percentage: 0.0,
            result_ratio: ratio,
        }
    }

    #[test]
    fn break_even_coin_flip() {
        let f = RatioFitness::default();
        // r = 1, w = 0.5: 2^0.65 + 1.5^0.35
        let expected = 2f64.powf(0.65) + 1.5f64.powf(0.35);
        assert_relative_eq!(f.fitness(&[result(1.0, 0.5, 365.0)]), expected, epsilon = 1e-12);
    }

    #[test]
    fn losing_is_dominated_by_underperforming() {
        let f = RatioFitness::default();
        let flat = f.fitness(&[result(1.0, 0.5, 30.0)]);
        let losing = f.fitness(&[result(0.8, 0.5, 30.0)]);
        let winning = f.fitness(&[result(1.2, 0.5, 30.0)]);
        assert!(losing < flat);
        assert!(flat < winning);
        // The convex penalty makes a 20% loss cost far more than a 20% gain earns.
        assert!(flat - losing > winning - flat);
    }

    #[test]
    fn datasets_are_summed_and_scaled_by_days() {
        let f = RatioFitness::default();
        let single = f.fitness(&[result(1.1, 0.6, 365.0)]);
        let doubled = f.fitness(&[result(1.1, 0.6, 365.0), result(1.1, 0.6, 365.0)]);
        assert_relative_eq!(doubled, 2.0 * single, epsilon = 1e-12);
        let half_year = f.fitness(&[result(1.1, 0.6, 182.5)]);
        assert_relative_eq!(half_year, 2.0 * single, epsilon = 1e-12);
    }

    #[test]
    fn zero_day_results_are_ignored() {
        let f = RatioFitness::default();
        assert_relative_eq!(f.fitness(&[result(2.0, 1.0, 0.0)]), 0.0);
    }

    #[test]
    fn wiped_out_account_is_finite() {
        let f = RatioFitness::default();
        let score = f.fitness(&[result(0.0, 0.0, 10.0)]);
        assert!(score.is_finite());
    }
}
