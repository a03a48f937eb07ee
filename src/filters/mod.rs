//! Operator nodes and the registry the host discovers them through.

pub mod registry;
pub mod builtin;

pub use registry::{FilterFactory, FilterRegistry, RegistryEntry};
