//! On-disk training artifacts.
//!
//! `champion.json` and `validation_champion.json` are replaced atomically
//! (write to a sibling temp file, then rename). `generations.csv` is a
//! `;`-delimited log with one row per generation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::domain::error::EvotraderError;
use crate::domain::optimizer::report::{ChampionRecord, GenerationStats};
use crate::ports::checkpoint_port::CheckpointPort;

pub const CHAMPION_FILE: &str = "champion.json";
pub const VALIDATION_CHAMPION_FILE: &str = "validation_champion.json";
pub const GENERATIONS_FILE: &str = "generations.csv";

const GENERATIONS_HEADER: [&str; 4] = ["Generation", "Average", "Best", "Worst"];

pub struct JsonCheckpointAdapter {
    dir: PathBuf,
}

fn checkpoint_error(path: &Path, reason: impl ToString) -> EvotraderError {
    EvotraderError::Checkpoint {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl JsonCheckpointAdapter {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EvotraderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| checkpoint_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_atomic<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), EvotraderError> {
        let target = self.dir.join(file_name);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| checkpoint_error(&target, e))?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| checkpoint_error(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| checkpoint_error(&target, e.error))?;
        Ok(())
    }
}

impl CheckpointPort for JsonCheckpointAdapter {
    fn write_champion(&mut self, record: &ChampionRecord) -> Result<(), EvotraderError> {
        self.write_atomic(CHAMPION_FILE, record)
    }

    fn write_validation_champion(
        &mut self,
        record: &ChampionRecord,
    ) -> Result<(), EvotraderError> {
        self.write_atomic(VALIDATION_CHAMPION_FILE, record)
    }

    fn append_generation_stats(&mut self, stats: &GenerationStats) -> Result<(), EvotraderError> {
        let path = self.dir.join(GENERATIONS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| checkpoint_error(&path, e))?;
        let is_new = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(file);
        if is_new {
            wtr.write_record(GENERATIONS_HEADER)
                .map_err(|e| checkpoint_error(&path, e))?;
        }
        wtr.write_record([
            stats.generation.to_string(),
            stats.average.to_string(),
            stats.best.to_string(),
            stats.worst.to_string(),
        ])
        .map_err(|e| checkpoint_error(&path, e))?;
        wtr.flush().map_err(|e| checkpoint_error(&path, e))?;
        Ok(())
    }
}
