use thiserror::Error;

/// Main error type for the LoadCast system
#[derive(Error, Debug)]
pub enum LcError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Tuning error: {0}")]
    Tuning(#[from] TuningError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl LcError {
    /// Configuration errors describe a caller contract violation. They are
    /// never retried and abort a tuning run instead of failing one trial.
    pub fn is_configuration(&self) -> bool {
        match self {
            LcError::Config(_) | LcError::Validation(_) => true,
            LcError::Tuning(err) => !matches!(err, TuningError::NonFiniteLoss { .. }),
            LcError::Metric(MetricError::Unknown { .. }) => true,
            _ => false,
        }
    }
}

/// Data-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Duplicate column: {column}")]
    DuplicateColumn { column: String },

    #[error("Column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Time index is not strictly increasing at position {position}")]
    UnorderedIndex { position: usize },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },
}

/// Errors raised while turning a search space and dataset into a trial
#[derive(Error, Debug)]
pub enum TuningError {
    #[error("Unsupported declaration for '{key}': {reason}")]
    UnsupportedDeclaration { key: String, reason: String },

    #[error("Bounds for '{key}' must be two numbers (float/float, float/int, int/float or int/int), got {low} and {high}")]
    MixedBoundTypes {
        key: String,
        low: String,
        high: String,
    },

    #[error("Invalid bounds for '{key}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds { key: String, low: f64, high: f64 },

    #[error("Invalid log bounds for '{key}': low ({low}) must be positive for log scale")]
    InvalidLogBounds { key: String, low: f64 },

    #[error("Categorical choices for '{key}' cannot be empty")]
    EmptyChoices { key: String },

    #[error("Parameter '{key}' is declared more than once")]
    DuplicateParameter { key: String },

    #[error("Column order in train input data not as expected (first: {first}, last: {last}), could not train a model")]
    ColumnOrder { first: String, last: String },

    #[error("Invalid split fractions: {message}")]
    InvalidFraction { message: String },

    #[error("Metric {metric} produced a non-finite loss ({value})")]
    NonFiniteLoss { metric: String, value: f64 },

    #[error("Invalid tuning configuration: {message}")]
    InvalidConfig { message: String },
}

/// Regressor backend errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model is not fitted yet: call fit before predict")]
    NotFitted,

    #[error("Invalid model parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Feature mismatch: model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training failed: {message}")]
    TrainingFailed { message: String },
}

/// Metric resolution and evaluation errors
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("Unknown metric: {name}")]
    Unknown { name: String },

    #[error("Length mismatch: {expected} realised values but {actual} forecasts")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Result type alias for LoadCast operations
pub type LcResult<T> = Result<T, LcError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::LcError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::LcError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::LcError::Config(format!($($arg)*))
    };
}
