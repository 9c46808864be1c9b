//! Bounded strategy parameters and the genomes built from them.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::EvotraderError;

/// Widest `upper_bound - lower_bound` a gene accepts; uniform sampling
/// scales the span up slightly and must stay finite.
pub const MAX_SPAN: f64 = f64::MAX / 2.0;

/// One entry of a genome specification, as loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSpec {
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl GeneSpec {
    /// Bounds must be finite and ordered, at most [`MAX_SPAN`] apart.
    pub fn validate(&self) -> Result<(), EvotraderError> {
        let invalid = |reason: String| EvotraderError::InvalidGene {
            name: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("gene name is empty".into()));
        }
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(invalid(format!(
                "bounds [{}, {}] must be finite",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.lower_bound > self.upper_bound {
            return Err(invalid(format!(
                "lower bound {} exceeds upper bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.upper_bound - self.lower_bound > MAX_SPAN {
            return Err(invalid(format!(
                "span of bounds [{}, {}] is too wide to sample",
                self.lower_bound, self.upper_bound
            )));
        }
        Ok(())
    }

    /// Gene with the configured value, or a uniform draw within bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Gene, EvotraderError> {
        let mut gene = Gene::new(&self.name, self.lower_bound, self.upper_bound)?;
        match self.value {
            Some(value) => gene.set_value(value),
            None => gene.randomize(rng),
        }
        Ok(gene)
    }

    /// Gene with the configured value, or the midpoint of its bounds.
    pub fn fixed(&self) -> Result<Gene, EvotraderError> {
        let mut gene = Gene::new(&self.name, self.lower_bound, self.upper_bound)?;
        if let Some(value) = self.value {
            gene.set_value(value);
        }
        Ok(gene)
    }
}

/// A named scalar that always lies within `[lower_bound, upper_bound]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gene {
    name: String,
    lower_bound: f64,
    upper_bound: f64,
    value: f64,
}

impl Gene {
    /// New gene at the midpoint of its bounds.
    pub fn new(name: &str, lower_bound: f64, upper_bound: f64) -> Result<Self, EvotraderError> {
        GeneSpec {
            name: name.to_string(),
            lower_bound,
            upper_bound,
            value: None,
        }
        .validate()?;
        Ok(Gene {
            name: name.to_string(),
            lower_bound,
            upper_bound,
            value: lower_bound + (upper_bound - lower_bound) / 2.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn range(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Assign with saturating clamp; NaN falls back to the lower bound.
    pub fn set_value(&mut self, value: f64) {
        self.value = if value.is_nan() {
            self.lower_bound
        } else {
            value.clamp(self.lower_bound, self.upper_bound)
        };
    }

    /// Redraw uniformly within bounds.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let value = if self.lower_bound < self.upper_bound {
            rng.gen_range(self.lower_bound..=self.upper_bound)
        } else {
            self.lower_bound
        };
        self.set_value(value);
    }
}

/// Ordered parameter set defining one strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Genome {
    genes: Vec<Gene>,
}

impl Genome {
    pub fn new(genes: Vec<Gene>) -> Self {
        Genome { genes }
    }

    /// Random individual: configured values are kept, the rest drawn uniformly.
    pub fn sample<R: Rng + ?Sized>(specs: &[GeneSpec], rng: &mut R) -> Result<Self, EvotraderError> {
        specs
            .iter()
            .map(|spec| spec.sample(rng))
            .collect::<Result<Vec<_>, _>>()
            .map(Genome::new)
    }

    /// Deterministic genome for a single evaluation run.
    pub fn fixed(specs: &[GeneSpec]) -> Result<Self, EvotraderError> {
        specs
            .iter()
            .map(GeneSpec::fixed)
            .collect::<Result<Vec<_>, _>>()
            .map(Genome::new)
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn genes_mut(&mut self) -> &mut [Gene] {
        &mut self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.genes.iter().find(|g| g.name == name).map(Gene::value)
    }

    /// Value of a parameter a strategy cannot run without.
    pub fn require(&self, strategy: &str, name: &str) -> Result<f64, EvotraderError> {
        self.value(name)
            .ok_or_else(|| EvotraderError::MissingParameter {
                strategy: strategy.to_string(),
                parameter: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn spec(name: &str, lb: f64, ub: f64, value: Option<f64>) -> GeneSpec {
        GeneSpec {
            name: name.into(),
            lower_bound: lb,
            upper_bound: ub,
            value,
        }
    }

    #[test]
    fn clamps_infinities() {
        let mut gene = Gene::new("atr_factor", 0.5, 4.0).unwrap();
        gene.set_value(f64::INFINITY);
        assert_relative_eq!(gene.value(), 4.0);
        gene.set_value(f64::NEG_INFINITY);
        assert_relative_eq!(gene.value(), 0.5);
        gene.set_value(f64::NAN);
        assert_relative_eq!(gene.value(), 0.5);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = Gene::new("x", 2.0, 1.0).unwrap_err();
        assert!(matches!(err, EvotraderError::InvalidGene { .. }));
    }

    #[test]
    fn rejects_infinite_bounds() {
        assert!(spec("x", 0.0, f64::INFINITY, None).validate().is_err());
        assert!(spec("x", f64::NAN, 1.0, None).validate().is_err());
    }

    #[test]
    fn rejects_bounds_whose_span_overflows() {
        let wide = spec("leverage", -1e308, 1e308, None);
        assert!(matches!(
            wide.validate(),
            Err(EvotraderError::InvalidGene { .. })
        ));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(wide.sample(&mut rng).is_err());
        assert!(Gene::new("leverage", f64::MIN, f64::MAX).is_err());
        assert!(spec("leverage", -f64::MAX / 2.0, f64::MAX / 2.0, None).validate().is_err());

        let widest = spec("leverage", -MAX_SPAN / 2.0, MAX_SPAN / 2.0, None);
        for _ in 0..32 {
            let gene = widest.sample(&mut rng).unwrap();
            assert!(gene.value().is_finite());
        }
    }

    #[test]
    fn degenerate_bounds_are_allowed() {
        let mut rng = StdRng::seed_from_u64(1);
        let gene = spec("x", 3.0, 3.0, None).sample(&mut rng).unwrap();
        assert_relative_eq!(gene.value(), 3.0);
    }

    #[test]
    fn configured_value_is_kept_and_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let gene = spec("x", 0.0, 1.0, Some(5.0)).sample(&mut rng).unwrap();
        assert_relative_eq!(gene.value(), 1.0);
    }

    #[test]
    fn fixed_genome_uses_midpoint() {
        let genome = Genome::fixed(&[spec("a", 0.0, 10.0, None), spec("b", 0.0, 1.0, Some(0.2))])
            .unwrap();
        assert_relative_eq!(genome.value("a").unwrap(), 5.0);
        assert_relative_eq!(genome.value("b").unwrap(), 0.2);
        assert!(genome.value("c").is_none());
    }

    #[test]
    fn require_reports_missing_parameter() {
        let genome = Genome::new(Vec::new());
        let err = genome.require("ema_macd", "atr_factor").unwrap_err();
        assert!(matches!(err, EvotraderError::MissingParameter { .. }));
    }

    #[test]
    fn genome_serializes_as_gene_list() {
        let genome = Genome::fixed(&[spec("a", 0.0, 2.0, Some(1.5))]).unwrap();
        let json = serde_json::to_value(&genome).unwrap();
        assert_eq!(json[0]["name"], "a");
        assert_eq!(json[0]["value"], 1.5);
    }

    proptest! {
        #[test]
        fn value_always_within_bounds(
            lb in -1e6f64..1e6,
            width in 0.0f64..1e6,
            value in prop_oneof![
                any::<f64>(),
                Just(f64::INFINITY),
                Just(f64::NEG_INFINITY),
            ],
        ) {
            let mut gene = Gene::new("g", lb, lb + width).unwrap();
            gene.set_value(value);
            prop_assert!(gene.value() >= gene.lower_bound());
            prop_assert!(gene.value() <= gene.upper_bound());
        }

        #[test]
        fn sampled_values_within_bounds(seed in any::<u64>(), lb in -100.0f64..100.0, width in 0.0f64..50.0) {
            let mut rng = StdRng::seed_from_u64(seed);
            let gene = spec("g", lb, lb + width, None).sample(&mut rng).unwrap();
            prop_assert!(gene.value() >= lb && gene.value() <= lb + width);
        }
    }
}
