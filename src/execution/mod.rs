//! Node execution.
//!
//! The host owns the graph; this module only runs one node at a time and
//! computes the change signature it uses for cache invalidation.

pub mod invoke;
pub mod fingerprint;

pub use invoke::{Invocation, NodeOutputs};
pub use fingerprint::{change_signature, ChangeSignature};
