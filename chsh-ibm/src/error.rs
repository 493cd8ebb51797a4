//! Error types for the CHSH experiment
//!
//! Every failure is fatal to a run. Variants fall into three groups:
//! - Configuration errors (sweep size, parameters, config file, credentials)
//! - Remote service errors (device, submission, job execution, responses)
//! - Local I/O errors (image and CSV output)

use thiserror::Error;

/// Result type alias for CHSH experiment operations
pub type Result<T> = std::result::Result<T, ChshError>;

/// Broad failure class, used for exit codes and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid sweep size, malformed parameter, bad config or credentials
    Configuration,
    /// Device unavailable, job rejected or failed remotely
    RemoteService,
    /// Local file output failed
    LocalIo,
}

/// Error type for CHSH experiment operations
#[derive(Error, Debug)]
pub enum ChshError {
    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Sweep needs at least two points to span a closed interval
    #[error("Invalid sweep size {0}: at least 2 points are required")]
    InvalidSweepSize(usize),

    /// Parameter binding does not fit the circuit
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid circuit
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// Invalid observable
    #[error("Invalid observable: {0}")]
    InvalidObservable(String),

    /// Configuration file or value rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// API token not found
    #[error("API token not found. Set IBM_QUANTUM_TOKEN environment variable.")]
    TokenNotFound,

    /// Invalid API token
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    /// Stored account exists and overwrite was not requested
    #[error("Stored account '{0}' already exists; pass overwrite to replace it")]
    AccountExists(String),

    // ==========================================================================
    // Transpilation Errors
    // ==========================================================================
    /// Gate has no translation into the target basis
    #[error("Unsupported gate '{gate}' for target basis [{basis}]")]
    UnsupportedGate { gate: String, basis: String },

    /// Target cannot host the circuit
    #[error("Qubit count mismatch: circuit has {circuit} qubits, backend supports {backend}")]
    QubitCountMismatch { circuit: usize, backend: usize },

    /// No coupled physical pair available for a two-qubit gate
    #[error("No coupled qubit pair on backend '{0}'")]
    NoCoupledPair(String),

    // ==========================================================================
    // Remote Service Errors
    // ==========================================================================
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned error response
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// Invalid response format
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Backend not found
    #[error("Backend '{0}' not found")]
    BackendNotFound(String),

    /// Backend unavailable
    #[error("Backend '{0}' is currently unavailable: {1}")]
    BackendUnavailable(String, String),

    /// Job submission failed
    #[error("Job submission failed: {0}")]
    JobSubmissionFailed(String),

    /// Job failed remotely
    #[error("Job '{0}' failed: {1}")]
    JobFailed(String, String),

    /// Job cancelled
    #[error("Job '{0}' was cancelled")]
    JobCancelled(String),

    /// Job timeout
    #[error("Job '{0}' timed out after {1} seconds")]
    JobTimeout(String, u64),

    // ==========================================================================
    // Local Errors
    // ==========================================================================
    /// Rendering an image failed
    #[error("Plot error: {0}")]
    Plot(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChshError {
    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChshError::InvalidSweepSize(_)
            | ChshError::InvalidParameter(_)
            | ChshError::InvalidCircuit(_)
            | ChshError::InvalidObservable(_)
            | ChshError::InvalidConfig(_)
            | ChshError::TokenNotFound
            | ChshError::InvalidToken(_)
            | ChshError::AccountExists(_)
            | ChshError::UnsupportedGate { .. }
            | ChshError::QubitCountMismatch { .. }
            | ChshError::NoCoupledPair(_) => ErrorCategory::Configuration,

            ChshError::HttpError(_)
            | ChshError::ApiError { .. }
            | ChshError::InvalidResponse(_)
            | ChshError::BackendNotFound(_)
            | ChshError::BackendUnavailable(_, _)
            | ChshError::JobSubmissionFailed(_)
            | ChshError::JobFailed(_, _)
            | ChshError::JobCancelled(_)
            | ChshError::JobTimeout(_, _) => ErrorCategory::RemoteService,

            ChshError::Plot(_) | ChshError::JsonError(_) | ChshError::IoError(_) => {
                ErrorCategory::LocalIo
            }
        }
    }

    /// Process exit code for the binary
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::RemoteService => 3,
            ErrorCategory::LocalIo => 4,
        }
    }

    /// Wrap a plotters drawing error
    pub(crate) fn plot<E: std::fmt::Display>(err: E) -> Self {
        ChshError::Plot(err.to_string())
    }
}
