//! Core types and traits for the toolkit.
//!
//! - Value types and tensors (Image, Mask, Latent, Audio, ...)
//! - Port definitions and constraints
//! - Node trait and metadata
//! - Error types
//! - Execution and validation contexts
//! - Configuration

pub mod types;
pub mod tensor;
pub mod port;
pub mod error;
pub mod context;
pub mod node;
pub mod config;

// Re-export commonly used types
pub use types::{Value, PortType, Color};
pub use tensor::{AudioData, BBoxes, BoxFormat, CropBox, ImageTensor, Latent, LatentFamily, MaskTensor};
pub use port::{PortDefinition, PortDirection, ParameterDefinition, Constraint, UiHint};
pub use error::{UtkError, ValidationError, ExecutionError, KernelError, RegistryError, ServiceError, NodeId};
pub use context::{ValidationContext, ExecutionContext};
pub use node::{FilterNode, NodeMetadata, Category};
pub use config::ToolkitConfig;
