//! Genome specification port trait.

use std::path::Path;

use crate::domain::error::EvotraderError;
use crate::domain::genome::GeneSpec;

pub trait GenomePort {
    /// Load and validate every gene specification in `path`.
    fn load_genome(&self, path: &Path) -> Result<Vec<GeneSpec>, EvotraderError>;
}
