//! Custom error types for Elastisim.
//!
//! This module defines explicit enum error types.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.
//! Most of them are recovered inside the allocator and only ever reach logs.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ServerId;

/// Top-level error type for the allocator library.
#[derive(Debug, Error)]
pub enum AllocError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Server Lookup Errors
    // =========================================================================
    #[error("Server not found: {0}")]
    ServerNotFound(ServerId),

    // =========================================================================
    // Model Persistence Errors
    // =========================================================================
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    #[error("Allocator scheduler is not running")]
    SchedulerClosed,

    #[error("Status snapshot error: {message}")]
    StatusSnapshot { message: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors abort startup.
/// Used when configuration or input is invalid and cannot be used safely.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Threshold ordering violated: scale_down_threshold {lower} must be below scale_up_threshold {upper}")]
    ThresholdOrder { lower: f64, upper: f64 },

    #[error("Initial pool size {initial} outside 1..={max}")]
    InitialPoolOutOfBounds { initial: usize, max: usize },
}

/// Server lifecycle transition errors.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for server {server_id}")]
    InvalidTransition {
        server_id: ServerId,
        from: &'static str,
        to: &'static str,
    },
}

/// Reasons the predictor fell back to its default demand.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("Model has not been trained")]
    Untrained,

    #[error("Feature vector width mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model produced a non-finite demand: {value}")]
    NonFinite { value: f64 },
}

/// Scaling requests that hit a pool bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalingError {
    #[error("Pool already at maximum of {max} servers")]
    CapacityExhausted { max: usize },

    #[error("Pool already at minimum of 1 server")]
    FloorReached,
}

/// Dispatch failures for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Server {server_id} is still starting")]
    ServerStarting { server_id: ServerId },

    #[error("Worker for server {server_id} is no longer accepting jobs")]
    WorkerUnavailable { server_id: ServerId },

    #[error("Request requeued {requeues} times, limit is {limit}")]
    RequeueLimit { requeues: u32, limit: u32 },
}

/// Predictor training and persistence errors.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model has not been trained")]
    NotTrained,

    #[error("Training data is empty")]
    EmptyTrainingSet,

    #[error("Training data shape mismatch: {reason}")]
    ShapeMismatch { reason: String },

    #[error("Training data contains a non-finite value at row {row}")]
    NonFiniteInput { row: usize },

    #[error("Model file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Model file is malformed: {reason}")]
    Malformed { reason: String },

    #[error("Model checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Model IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using AllocError.
pub type AllocResult<T> = Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::ThresholdOrder {
            lower: 6.0,
            upper: 5.0,
        };
        assert!(err.to_string().contains("scale_down_threshold 6"));
        assert!(err.to_string().contains("scale_up_threshold 5"));
    }

    #[test]
    fn test_error_chain() {
        let err: AllocError = ModelError::NotTrained.into();
        assert!(matches!(err, AllocError::Model(ModelError::NotTrained)));
        assert!(err.to_string().contains("not been trained"));

        let err = DispatchError::ServerStarting {
            server_id: ServerId::new(0),
        };
        assert!(err.to_string().contains("still starting"));

        let err = ScalingError::CapacityExhausted { max: 5 };
        assert!(err.to_string().contains("maximum of 5"));
    }

    #[test]
    fn test_prediction_error_display() {
        let err = PredictionError::DimensionMismatch {
            expected: 4,
            actual: 7,
        };
        assert!(err.to_string().contains("expected 4"));
    }
}
