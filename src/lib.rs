//! # Universal Toolkit - Operator Nodes for Generative-Image Dataflow Hosts
//!
//! A library of image, mask, audio and text operators that a node-graph host
//! discovers through a registry and invokes one node at a time.
//!
//! ## Features
//!
//! - **Typed operators**: Every node declares its ports and parameters, and
//!   values are validated before the node runs
//! - **Tensor kernels**: Batched image and mask math on `ndarray`, kept apart
//!   from node plumbing
//! - **Remote services**: Translation, image generation and LoRA catalog
//!   lookups behind a swappable HTTP transport
//! - **Host registry**: Identifier and display-name tables in registration order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use universal_toolkit::prelude::*;
//!
//! let registry = FilterRegistry::with_builtins()?;
//! let node = registry.create("MaskAnd_UTK").unwrap();
//!
//! let outputs = Invocation::new(node.as_ref())
//!     .with_input("mask1", Value::Mask(MaskTensor::filled(1, 64, 64, 1.0)?))
//!     .with_input("mask2", Value::Mask(MaskTensor::zeros(1, 64, 64)?))
//!     .run()?;
//! let mask = outputs.mask("mask").unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Values, tensors, ports, the node trait, errors and configuration
//! - [`kernels`]: Pure tensor functions the operators are built on
//! - [`services`]: Blocking HTTP clients for remote providers
//! - [`presets`]: Static prompt data and planning helpers
//! - [`filters`]: The registry and the built-in operators
//! - [`execution`]: Single-node invocation and change signatures

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;
pub mod kernels;
pub mod presets;
pub mod services;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use universal_toolkit::prelude::*;
/// ```
pub mod prelude {
    // Values and tensors
    pub use crate::core::types::{Color, PortType, Value};
    pub use crate::core::tensor::{AudioData, BBoxes, BoxFormat, CropBox, ImageTensor, Latent, MaskTensor};

    // Node traits and types
    pub use crate::core::node::{Category, FilterNode, NodeMetadata};
    pub use crate::core::port::{Constraint, ParameterDefinition, PortDefinition, UiHint};
    pub use crate::core::context::{ExecutionContext, ValidationContext};

    // Errors
    pub use crate::core::error::{
        ExecutionError, KernelError, NodeId, RegistryError, ServiceError, UtkError, ValidationError,
    };

    // Configuration
    pub use crate::core::config::ToolkitConfig;

    // Execution
    pub use crate::execution::{change_signature, ChangeSignature, Invocation, NodeOutputs};

    // Registry
    pub use crate::filters::registry::{FilterFactory, FilterRegistry, RegistryEntry};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "universal_toolkit");
    }

    #[test]
    fn test_registry_node_runs_through_prelude() {
        let registry = FilterRegistry::with_builtins().unwrap();
        let node = registry.create("MaskAnd_UTK").unwrap();
        let outputs = Invocation::new(node.as_ref())
            .with_input("mask1", Value::Mask(MaskTensor::filled(1, 4, 4, 1.0).unwrap()))
            .with_input("mask2", Value::Mask(MaskTensor::zeros(1, 4, 4).unwrap()))
            .run()
            .unwrap();
        let mask = outputs.mask("mask").unwrap();
        assert_eq!(mask.value_range(), (0.0, 0.0));
    }

    #[test]
    fn test_every_node_declares_category_and_name() {
        let registry = FilterRegistry::with_builtins().unwrap();
        assert!(registry.len() > 50);
        for (id, name) in registry.display_name_mapping() {
            assert!(!name.is_empty(), "{} has no display name", id);
        }
    }
}
