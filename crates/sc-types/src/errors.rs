use thiserror::Error;

/// Main error type for the SimCal system
#[derive(Error, Debug)]
pub enum ScError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Optimization error: {0}")]
    Optimization(#[from] OptimizationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while parsing a calibration configuration.
///
/// All of these are fatal at load time, before any trial runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown distribution type '{kind}' for parameter '{parameter}'")]
    UnknownDistribution { parameter: String, kind: String },

    #[error("Invalid {kind} shape for parameter '{parameter}': {message}")]
    InvalidShape {
        parameter: String,
        kind: String,
        message: String,
    },

    #[error("Unknown metric type: {kind}")]
    UnknownMetric { kind: String },

    #[error("Unknown optimization mode: {mode}")]
    UnknownMode { mode: String },

    #[error("Metric config arrays differ in length: {metrics} metrics, {params} params, {modes} modes")]
    LengthMismatch {
        metrics: usize,
        params: usize,
        modes: usize,
    },

    #[error("Duplicate optimization name: {name}")]
    DuplicateMetric { name: String },

    #[error("Unknown search strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("{message}")]
    Invalid { message: String },
}

/// Table loading and manipulation errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Column not found: {column}")]
    MissingColumn { column: String },

    #[error("Row {row} out of range for table with {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },
}

/// Failures of a single simulator invocation.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Failed to launch simulator: {message}")]
    Launch { message: String },

    #[error("Simulator exited with status {status}")]
    NonZeroExit { status: String },

    #[error("Expected output file not found: {path}")]
    MissingOutput { path: String },
}

/// Errors raised while comparing simulator output to ground truth
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Ground truth has no column '{column}'")]
    MissingGroundColumn { column: String },

    #[error("Simulator output has no column '{column}' required by metric '{metric}'")]
    MissingOutputColumn { metric: String, column: String },

    #[error("Metric '{metric}': ground row {row} has no matching output row ({rows} rows)")]
    Alignment {
        metric: String,
        row: usize,
        rows: usize,
    },
}

/// Errors raised while running the search or selecting results.
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("No trials were recorded")]
    NoTrials,

    #[error("No trial has a valid score for metric '{metric}'")]
    NoValidTrial { metric: String },

    #[error("Worker failed: {message}")]
    Worker { message: String },
}

/// Result type alias for SimCal operations
pub type ScResult<T> = Result<T, ScError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::ScError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ConfigError::Invalid { message: format!($($arg)*) }
    };
}
