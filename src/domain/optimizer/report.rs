//! Training artifacts: champion snapshots and per-generation statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::evaluator::EvaluationResult;
use crate::domain::genome::Genome;

/// Serialized champion. Field names are a stable contract for external tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChampionRecord {
    pub strategy: String,
    pub timeframe: String,
    pub generation: usize,
    pub fitness: f64,
    pub genome: Genome,
    /// Results keyed by dataset name.
    pub evaluation_result: BTreeMap<String, EvaluationResult>,
}

impl ChampionRecord {
    pub fn new<'a>(
        strategy: &str,
        timeframe: String,
        generation: usize,
        fitness: f64,
        genome: Genome,
        datasets: impl Iterator<Item = &'a str>,
        results: &[EvaluationResult],
    ) -> Self {
        ChampionRecord {
            strategy: strategy.to_string(),
            timeframe,
            generation,
            fitness,
            genome,
            evaluation_result: datasets
                .zip(results.iter().cloned())
                .map(|(name, result)| (name.to_string(), result))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub average: f64,
    pub best: f64,
    pub worst: f64,
}

impl GenerationStats {
    /// Summary over the finite scores; all-failed generations report -inf throughout.
    pub fn from_fitness(generation: usize, fitness: &[f64]) -> Self {
        let finite: Vec<f64> = fitness.iter().copied().filter(|f| f.is_finite()).collect();
        if finite.is_empty() {
            return GenerationStats {
                generation,
                average: f64::NEG_INFINITY,
                best: f64::NEG_INFINITY,
                worst: f64::NEG_INFINITY,
            };
        }
        let best = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let worst = finite.iter().copied().fold(f64::INFINITY, f64::min);
        GenerationStats {
            generation,
            average: finite.iter().sum::<f64>() / finite.len() as f64,
            best,
            worst,
        }
    }
}
