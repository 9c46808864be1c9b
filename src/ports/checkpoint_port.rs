//! Training artifact port trait.

use crate::domain::error::EvotraderError;
use crate::domain::optimizer::report::{ChampionRecord, GenerationStats};

/// Port for persisting optimizer progress.
///
/// Champion writes must be atomic: a reader never observes a partially
/// written record.
pub trait CheckpointPort {
    fn write_champion(&mut self, record: &ChampionRecord) -> Result<(), EvotraderError>;

    fn write_validation_champion(&mut self, record: &ChampionRecord)
    -> Result<(), EvotraderError>;

    fn append_generation_stats(&mut self, stats: &GenerationStats) -> Result<(), EvotraderError>;
}

/// Discards everything. Used when a run should leave no artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCheckpoint;

impl CheckpointPort for NullCheckpoint {
    fn write_champion(&mut self, _record: &ChampionRecord) -> Result<(), EvotraderError> {
        Ok(())
    }

    fn write_validation_champion(
        &mut self,
        _record: &ChampionRecord,
    ) -> Result<(), EvotraderError> {
        Ok(())
    }

    fn append_generation_stats(&mut self, _stats: &GenerationStats) -> Result<(), EvotraderError> {
        Ok(())
    }
}
