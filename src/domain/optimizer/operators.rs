//! Selection, crossover, and mutation operators, selectable by name.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::domain::error::EvotraderError;
use crate::domain::genome::Genome;

fn unknown(kind: &str, name: &str) -> EvotraderError {
    EvotraderError::UnknownOperator {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossoverOperator {
    /// Per-gene coin flip between the parents.
    #[default]
    Uniform,
    /// Arithmetic mean of both parents per gene.
    Average,
    /// Head from the first parent, tail from the second.
    SinglePoint,
}

impl FromStr for CrossoverOperator {
    type Err = EvotraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(CrossoverOperator::Uniform),
            "average" => Ok(CrossoverOperator::Average),
            "single-point" | "s-point" => Ok(CrossoverOperator::SinglePoint),
            other => Err(unknown("crossover", other)),
        }
    }
}

impl fmt::Display for CrossoverOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrossoverOperator::Uniform => "uniform",
            CrossoverOperator::Average => "average",
            CrossoverOperator::SinglePoint => "single-point",
        };
        f.write_str(name)
    }
}

impl CrossoverOperator {
    /// Child genome from two parents with identical gene layouts.
    pub fn apply<R: Rng + ?Sized>(&self, first: &Genome, second: &Genome, rng: &mut R) -> Genome {
        let mut child = first.clone();
        let genes = child.genes_mut();
        let other = second.genes();
        match self {
            CrossoverOperator::Uniform => {
                for (gene, theirs) in genes.iter_mut().zip(other) {
                    if rng.gen_bool(0.5) {
                        gene.set_value(theirs.value());
                    }
                }
            }
            CrossoverOperator::Average => {
                for (gene, theirs) in genes.iter_mut().zip(other) {
                    gene.set_value((gene.value() + theirs.value()) / 2.0);
                }
            }
            CrossoverOperator::SinglePoint => {
                if genes.len() > 1 {
                    let point = rng.gen_range(1..genes.len());
                    for (gene, theirs) in genes.iter_mut().zip(other).skip(point) {
                        gene.set_value(theirs.value());
                    }
                }
            }
        }
        child
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationOperator {
    /// Redraw the gene uniformly within its bounds.
    #[default]
    Uniform,
    /// Add zero-mean noise with sigma = range / 6, then clamp.
    Gaussian,
}

impl FromStr for MutationOperator {
    type Err = EvotraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(MutationOperator::Uniform),
            "gaussian" | "average" => Ok(MutationOperator::Gaussian),
            other => Err(unknown("mutation", other)),
        }
    }
}

impl fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationOperator::Uniform => "uniform",
            MutationOperator::Gaussian => "gaussian",
        })
    }
}

impl MutationOperator {
    /// Mutate each gene independently with probability `rate`.
    pub fn apply<R: Rng + ?Sized>(&self, genome: &mut Genome, rate: f64, rng: &mut R) {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        for gene in genome.genes_mut() {
            if !rng.gen_bool(rate) {
                continue;
            }
            match self {
                MutationOperator::Uniform => gene.randomize(rng),
                MutationOperator::Gaussian => {
                    let sigma = gene.range() / 6.0;
                    // Normal::new only fails on a non-finite or negative sigma.
                    if let Ok(noise) = Normal::new(0.0, sigma) {
                        let value = gene.value() + noise.sample(rng);
                        gene.set_value(value);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionOperator {
    /// The two fittest individuals parent the whole next generation.
    #[default]
    Truncation,
    /// Each parent is the fittest of `size` randomly drawn individuals.
    Tournament { size: usize },
}

impl fmt::Display for SelectionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionOperator::Truncation => f.write_str("truncation"),
            SelectionOperator::Tournament { size } => write!(f, "tournament({size})"),
        }
    }
}

impl SelectionOperator {
    pub fn parse(name: &str, tournament_size: usize) -> Result<Self, EvotraderError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "truncation" | "elitist" => Ok(SelectionOperator::Truncation),
            "tournament" => Ok(SelectionOperator::Tournament {
                size: tournament_size.max(1),
            }),
            other => Err(unknown("selection", other)),
        }
    }

    /// Indices into `fitness` of a parent pair for one child.
    ///
    /// `ranked` holds indices sorted by descending fitness.
    pub fn pick<R: Rng + ?Sized>(
        &self,
        ranked: &[usize],
        fitness: &[f64],
        rng: &mut R,
    ) -> (usize, usize) {
        match *self {
            SelectionOperator::Truncation => {
                let first = ranked.first().copied().unwrap_or(0);
                let second = ranked.get(1).copied().unwrap_or(first);
                (first, second)
            }
            SelectionOperator::Tournament { size } => (
                tournament(fitness, size, rng),
                tournament(fitness, size, rng),
            ),
        }
    }
}

fn tournament<R: Rng + ?Sized>(fitness: &[f64], size: usize, rng: &mut R) -> usize {
    if fitness.is_empty() {
        return 0;
    }
    let mut best = rng.gen_range(0..fitness.len());
    for _ in 1..size {
        let challenger = rng.gen_range(0..fitness.len());
        if fitness[challenger] > fitness[best] {
            best = challenger;
        }
    }
    best
}
