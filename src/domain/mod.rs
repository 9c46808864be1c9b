//! Core domain types and logic.

pub mod frame;
pub mod position;
pub mod wallet;
pub mod condition;
pub mod indicator;
pub mod strategy;
pub mod strategies;
pub mod evaluator;
pub mod genome;
pub mod optimizer;
pub mod config_validation;
pub mod error;
