//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod genome_json_adapter;
pub mod json_checkpoint_adapter;
