//! Domain error types.

/// Top-level error type for evotrader.
#[derive(Debug, thiserror::Error)]
pub enum EvotraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("dataset {name} contains no rows")]
    EmptyDataset { name: String },

    #[error("malformed frame at {start_time}: {reason}")]
    MalformedFrame { start_time: i64, reason: String },

    #[error("invalid gene {name}: {reason}")]
    InvalidGene { name: String, reason: String },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("strategy {strategy} requires parameter {parameter}")]
    MissingParameter { strategy: String, parameter: String },

    #[error("unknown {kind} operator: {name}")]
    UnknownOperator { kind: String, name: String },

    #[error("the evaluator requires a simulated wallet")]
    SimulatedWalletRequired,

    #[error("generation {generation} did not complete within {seconds}s")]
    GenerationTimeout { generation: usize, seconds: u64 },

    #[error("checkpoint error for {path}: {reason}")]
    Checkpoint { path: String, reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EvotraderError> for std::process::ExitCode {
    fn from(err: &EvotraderError) -> Self {
        let code: u8 = match err {
            EvotraderError::Io(_) | EvotraderError::Checkpoint { .. } => 1,
            EvotraderError::ConfigParse { .. }
            | EvotraderError::ConfigMissing { .. }
            | EvotraderError::ConfigInvalid { .. }
            | EvotraderError::UnknownOperator { .. } => 2,
            EvotraderError::Data { .. }
            | EvotraderError::EmptyDataset { .. }
            | EvotraderError::MalformedFrame { .. } => 3,
            EvotraderError::InvalidGene { .. }
            | EvotraderError::UnknownStrategy { .. }
            | EvotraderError::MissingParameter { .. }
            | EvotraderError::Serialization(_) => 4,
            EvotraderError::SimulatedWalletRequired
            | EvotraderError::GenerationTimeout { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
