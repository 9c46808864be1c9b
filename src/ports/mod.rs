//! Port traits at the I/O seams.

pub mod checkpoint_port;
pub mod config_port;
pub mod data_port;
pub mod genome_port;
