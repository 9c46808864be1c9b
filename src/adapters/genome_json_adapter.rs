//! JSON genome specification adapter.
//!
//! The file holds an array of `{name, lower_bound, upper_bound, value?}`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::domain::error::EvotraderError;
use crate::domain::genome::GeneSpec;
use crate::ports::genome_port::GenomePort;

#[derive(Debug, Default, Clone, Copy)]
pub struct GenomeJsonAdapter;

impl GenomeJsonAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(content: &str) -> Result<Vec<GeneSpec>, EvotraderError> {
        let specs: Vec<GeneSpec> = serde_json::from_str(content)?;
        let mut seen = HashSet::new();
        for spec in &specs {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(EvotraderError::InvalidGene {
                    name: spec.name.clone(),
                    reason: "gene is declared more than once".into(),
                });
            }
            if let Some(value) = spec.value {
                if !value.is_finite() {
                    return Err(EvotraderError::InvalidGene {
                        name: spec.name.clone(),
                        reason: format!("value {value} is not finite"),
                    });
                }
            }
        }
        Ok(specs)
    }
}

impl GenomePort for GenomeJsonAdapter {
    fn load_genome(&self, path: &Path) -> Result<Vec<GeneSpec>, EvotraderError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }
}
