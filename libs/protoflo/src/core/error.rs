//! Error types for protoflo
//!
//! Defines the core error types used throughout the runtime. Each variant
//! corresponds to one of the failure domains of the control protocol, so the
//! dispatcher can map errors back onto the sub-protocol that caused them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("graph error: {0}")]
    Graph(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("component error: {0}")]
    Component(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type that uses FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
