//! Price series port trait.

use std::path::Path;

use crate::domain::error::EvotraderError;
use crate::domain::frame::Dataset;

pub trait DataPort {
    /// Load one series of one-minute OHLC rows, named `name`.
    fn load_series(&self, path: &Path, name: &str) -> Result<Dataset, EvotraderError>;

    /// Load several series; dataset names are the file stems.
    fn load_all(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<Dataset>, EvotraderError>
    where
        Self: Sized,
    {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.load_series(path, &name)
            })
            .collect()
    }
}
