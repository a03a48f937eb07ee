//! Pure tensor kernels used by the operator nodes.
//!
//! Nothing in here knows about nodes, ports or the registry: every function
//! takes arrays or tensors and returns new ones, failing with
//! [`KernelError`](crate::core::error::KernelError).

pub mod bridge;
pub mod geometry;
pub mod color;
pub mod mask;
pub mod compositor;
pub mod sequence;
pub mod audio;
