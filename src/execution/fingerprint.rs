//! Change signatures.
//!
//! The host re-runs a node only when its change signature differs from the
//! previous evaluation. Deterministic nodes hash their inputs; nodes that
//! touch the network or the clock always report a change.

use crate::core::node::FilterNode;
use crate::core::types::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Result of fingerprinting one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSignature {
    Stable(u64),
    AlwaysChanged,
}

impl ChangeSignature {
    /// True when the node has to run again given the previous signature.
    pub fn is_changed_from(&self, previous: Option<&ChangeSignature>) -> bool {
        match (self, previous) {
            (ChangeSignature::Stable(a), Some(ChangeSignature::Stable(b))) => a != b,
            _ => true,
        }
    }
}

/// Signature of a node invocation over its inputs and parameters.
pub fn change_signature(
    node: &dyn FilterNode,
    inputs: &HashMap<String, Value>,
    parameters: &HashMap<String, Value>,
) -> ChangeSignature {
    let metadata = node.metadata();
    if !metadata.deterministic {
        return ChangeSignature::AlwaysChanged;
    }
    let mut hasher = DefaultHasher::new();
    metadata.id.hash(&mut hasher);
    hash_map(inputs, &mut hasher);
    hash_map(parameters, &mut hasher);
    ChangeSignature::Stable(hasher.finish())
}

fn hash_map<H: Hasher>(map: &HashMap<String, Value>, hasher: &mut H) {
    // Sort keys for deterministic hashing
    let mut keys: Vec<_> = map.keys().collect();
    keys.sort();
    keys.len().hash(hasher);
    for key in keys {
        key.hash(hasher);
        if let Some(value) = map.get(key) {
            hash_value(value, hasher);
        }
    }
}

fn hash_floats<'a, H: Hasher>(shape: &[usize], data: impl Iterator<Item = &'a f32>, hasher: &mut H) {
    shape.hash(hasher);
    for v in data {
        v.to_bits().hash(hasher);
    }
}

/// Hash a value, tensors included element by element.
pub fn hash_value<H: Hasher>(value: &Value, hasher: &mut H) {
    std::mem::discriminant(value).hash(hasher);

    match value {
        Value::Image(img) => hash_floats(&img.shape(), img.array().iter(), hasher),
        Value::Mask(m) => hash_floats(&m.shape(), m.array().iter(), hasher),
        Value::Latent(l) => {
            hash_floats(&l.shape(), l.samples().iter(), hasher);
            l.batch_index.hash(hasher);
        }
        Value::Audio(a) => {
            a.sample_rate.hash(hasher);
            hash_floats(a.waveform().shape(), a.waveform().iter(), hasher);
        }
        Value::Box(b) => b.hash(hasher),
        Value::BBox(b) => {
            for list in &b.boxes {
                list.len().hash(hasher);
                for rect in list {
                    for v in rect {
                        v.to_bits().hash(hasher);
                    }
                }
            }
        }
        Value::Integer(i) => i.hash(hasher),
        Value::Float(f) => f.to_bits().hash(hasher),
        Value::String(s) => s.hash(hasher),
        Value::Boolean(b) => b.hash(hasher),
        Value::Color(c) => c.hash(hasher),
        Value::Array(arr) => {
            arr.len().hash(hasher);
            for v in arr {
                hash_value(v, hasher);
            }
        }
        Value::Map(map) => {
            // BTreeMap iterates in key order already
            map.len().hash(hasher);
            for (k, v) in map {
                k.hash(hasher);
                hash_value(v, hasher);
            }
        }
        Value::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ExecutionContext;
    use crate::core::error::ExecutionError;
    use crate::core::node::NodeMetadata;
    use crate::core::tensor::MaskTensor;

    #[derive(Clone)]
    struct Probe {
        deterministic: bool,
    }

    impl FilterNode for Probe {
        fn metadata(&self) -> NodeMetadata {
            let b = NodeMetadata::builder("Probe_Test", "Probe");
            if self.deterministic {
                b.build()
            } else {
                b.non_deterministic().build()
            }
        }

        fn execute(&self, _ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn FilterNode> {
            Box::new(self.clone())
        }
    }

    fn inputs(v: f32) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("mask".to_string(), Value::Mask(MaskTensor::filled(1, 2, 2, v).unwrap()));
        m
    }

    #[test]
    fn test_signature_tracks_tensor_content() {
        let node = Probe { deterministic: true };
        let params = HashMap::new();
        let a = change_signature(&node, &inputs(0.5), &params);
        let b = change_signature(&node, &inputs(0.5), &params);
        let c = change_signature(&node, &inputs(0.25), &params);
        assert_eq!(a, b);
        assert!(!a.is_changed_from(Some(&b)));
        assert!(a.is_changed_from(Some(&c)));
        assert!(a.is_changed_from(None));
    }

    #[test]
    fn test_non_deterministic_always_changes() {
        let node = Probe { deterministic: false };
        let sig = change_signature(&node, &inputs(0.5), &HashMap::new());
        assert_eq!(sig, ChangeSignature::AlwaysChanged);
        assert!(sig.is_changed_from(Some(&sig)));
    }
}
