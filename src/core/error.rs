//! Error types for the toolkit.
//!
//! Uses thiserror for structured errors with context. Kernel failures carry
//! shapes and paths so the host can display something actionable; node
//! failures add the node id on top.

use crate::core::types::PortType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum UtkError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Schema errors found before a node runs.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: PortType, got: PortType },

    #[error("Missing required input '{port}' on node {node_id}")]
    MissingRequiredInput { node_id: NodeId, port: String },

    #[error("Constraint violation on node {node_id}, parameter '{parameter}': {error}")]
    ConstraintViolation {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("Custom validation failed on node {node_id}: {error}")]
    CustomValidation { node_id: NodeId, error: String },

    #[error("Resource not found: {resource} (referenced by node {node_id})")]
    ResourceNotFound { node_id: NodeId, resource: String },
}

impl ValidationError {
    /// Get a suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ValidationError::MissingRequiredInput { port, .. } => {
                Some(format!("Connect an output to the '{}' input", port))
            }
            ValidationError::ResourceNotFound { resource, .. } => {
                Some(format!("Check that '{}' exists", resource))
            }
            ValidationError::ConstraintViolation { parameter, error, .. } => {
                Some(format!("Adjust '{}': {}", parameter, error))
            }
            _ => None,
        }
    }
}

/// Failures raised by the tensor kernels.
///
/// Kernels know nothing about nodes; [`ExecutionError`] wraps these with the
/// node id when they cross the operator boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Shape mismatch in {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        context: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to decode '{path}': {reason}")]
    Decoder { path: String, reason: String },

    #[error("Missing dependency '{name}': {guidance}")]
    DependencyMissing { name: String, guidance: String },
}

impl KernelError {
    /// Convenience constructor for shape mismatches.
    pub fn shape_mismatch(context: impl Into<String>, left: &[usize], right: &[usize]) -> Self {
        KernelError::ShapeMismatch {
            context: context.into(),
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}

/// Errors during node execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Node {node_id} execution failed: {error}")]
    NodeExecution { node_id: NodeId, error: String },

    #[error("Missing input '{port}' for node {node_id}")]
    MissingInput { node_id: NodeId, port: String },

    #[error("Missing parameter '{parameter}' for node {node_id}")]
    MissingParameter { node_id: NodeId, parameter: String },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ExecutionError::NodeExecution { node_id, .. }
            | ExecutionError::MissingInput { node_id, .. }
            | ExecutionError::MissingParameter { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }

    /// True for shape and schema problems, which are always surfaced to the user.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::Kernel(KernelError::ShapeMismatch { .. })
                | ExecutionError::Kernel(KernelError::MalformedInput(_))
                | ExecutionError::Validation(_)
                | ExecutionError::MissingInput { .. }
                | ExecutionError::MissingParameter { .. }
        )
    }
}

impl From<image::ImageError> for ExecutionError {
    fn from(e: image::ImageError) -> Self {
        ExecutionError::ImageProcessing(e.to_string())
    }
}

/// Errors from building the node registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Node identifier '{id}' registered twice (by '{first}' and '{second}')")]
    DuplicateIdentifier {
        id: String,
        first: String,
        second: String,
    },
}

/// Errors from the outbound HTTP clients.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Transport error calling {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Unexpected response from {provider}: {reason}")]
    Decode { provider: String, reason: String },

    #[error("{provider} requires an API key")]
    MissingKey { provider: String },

    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for ServiceError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, response) => {
                let url = response.get_url().to_string();
                let body = response.into_string().unwrap_or_default();
                ServiceError::Status { url, status, body }
            }
            ureq::Error::Transport(t) => ServiceError::Transport {
                url: t.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: t.to_string(),
            },
        }
    }
}

/// Result type alias for toolkit operations.
pub type UtkResult<T> = Result<T, UtkError>;

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_validation_error_suggestions() {
        let error = ValidationError::MissingRequiredInput {
            node_id: NodeId::new(),
            port: "image".to_string(),
        };
        assert!(error.suggested_fix().unwrap().contains("image"));
    }

    #[test]
    fn test_shape_mismatch_is_schema_error() {
        let err: ExecutionError = KernelError::shape_mismatch("mask and", &[2, 4, 4], &[2, 4, 5]).into();
        assert!(err.is_schema_error());
        assert!(err.to_string().contains("[2, 4, 5]"));
    }
}
