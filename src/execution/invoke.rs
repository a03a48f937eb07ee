//! Single-node invocation.
//!
//! The host calls one operator at a time. An invocation resolves the node's
//! parameters (falling back to declared defaults), checks required inputs and
//! declared constraints, runs the node's own validation and finally executes
//! it. Outputs come back in declaration order.

use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::{ExecutionError, ExecutionResult, NodeId, ValidationError};
use crate::core::node::FilterNode;
use crate::core::tensor::{ImageTensor, MaskTensor};
use crate::core::types::Value;
use std::collections::HashMap;
use std::time::Instant;

/// One pending call of a node.
pub struct Invocation<'a> {
    node: &'a dyn FilterNode,
    node_id: NodeId,
    inputs: HashMap<String, Value>,
    parameters: HashMap<String, Value>,
}

impl<'a> Invocation<'a> {
    pub fn new(node: &'a dyn FilterNode) -> Self {
        Self {
            node,
            node_id: NodeId::new(),
            inputs: HashMap::new(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_inputs(mut self, inputs: HashMap<String, Value>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Resolve defaults and run schema validation without executing.
    pub fn prepare(self) -> Result<(&'a dyn FilterNode, ExecutionContext), ValidationError> {
        let metadata = self.node.metadata();
        let node_id = self.node_id;
        let mut ctx = ValidationContext::new(node_id);

        for param_def in &metadata.parameters {
            // A widget converted into an input socket arrives with the inputs.
            let value = self
                .parameters
                .get(&param_def.name)
                .or_else(|| self.inputs.get(&param_def.name).filter(|v| !v.is_none()))
                .cloned()
                .unwrap_or_else(|| param_def.default_value.clone());

            param_def
                .validate(&value)
                .map_err(|error| ValidationError::ConstraintViolation {
                    node_id,
                    parameter: param_def.name.clone(),
                    error,
                })?;
            ctx.add_parameter(param_def.name.clone(), value);
        }

        for port in &metadata.inputs {
            match self.inputs.get(&port.name).filter(|v| !v.is_none()) {
                Some(value) => {
                    port.validate(value)
                        .map_err(|error| ValidationError::ConstraintViolation {
                            node_id,
                            parameter: port.name.clone(),
                            error,
                        })?;
                    ctx.add_input(port.name.clone(), value.clone());
                }
                None if port.optional => {
                    if let Some(default) = &port.default_value {
                        ctx.add_input(port.name.clone(), default.clone());
                    }
                }
                None => {
                    return Err(ValidationError::MissingRequiredInput {
                        node_id,
                        port: port.name.clone(),
                    })
                }
            }
        }

        self.node.validate(&ctx)?;
        Ok((self.node, ctx.into()))
    }

    /// Validate and execute.
    pub fn run(self) -> ExecutionResult<NodeOutputs> {
        let node_id = self.node_id;
        let (node, mut ctx) = self.prepare()?;
        let metadata = node.metadata();

        let start = Instant::now();
        node.execute(&mut ctx)?;
        log::debug!("{} ({}) finished in {:?}", metadata.id, node_id, start.elapsed());

        let mut values = ctx.take_outputs();
        let mut outputs = Vec::with_capacity(metadata.outputs.len());
        for port in &metadata.outputs {
            let value = values.remove(&port.name).ok_or_else(|| ExecutionError::NodeExecution {
                node_id,
                error: format!("Node did not set output '{}'", port.name),
            })?;
            outputs.push((port.name.clone(), value));
        }
        Ok(NodeOutputs { outputs })
    }
}

/// Outputs of one invocation, in declaration order.
#[derive(Debug, Clone)]
pub struct NodeOutputs {
    outputs: Vec<(String, Value)>,
}

impl NodeOutputs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn image(&self, name: &str) -> Option<&ImageTensor> {
        self.get(name).and_then(|v| v.as_image())
    }

    pub fn mask(&self, name: &str) -> Option<&MaskTensor> {
        self.get(name).and_then(|v| v.as_mask())
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_string())
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_integer())
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_float())
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(n, _)| n.as_str())
    }

    /// The positional output tuple the host receives.
    pub fn into_tuple(self) -> Vec<Value> {
        self.outputs.into_iter().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{Category, NodeMetadata};
    use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
    use crate::core::types::PortType;

    #[derive(Clone)]
    struct Scale;

    impl FilterNode for Scale {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("Scale_Test", "Scale")
                .category(Category::Tools)
                .input(PortDefinition::input("value", PortType::Float))
                .input(PortDefinition::input("offset", PortType::Float).optional().with_default(Value::Float(0.5)))
                .parameter(ParameterDefinition::new("factor", PortType::Float, Value::Float(2.0)).with_range(0.0, 10.0))
                .parameter(ParameterDefinition::new("label", PortType::String, Value::string("x")).with_constraint(Constraint::NotEmpty))
                .output(PortDefinition::output("result", PortType::Float))
                .output(PortDefinition::output("label", PortType::String))
                .build()
        }

        fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
            let v = ctx.get_input("value")?.as_float().unwrap_or(0.0);
            let offset = ctx.get_float("offset")?;
            let factor = ctx.get_float("factor")?;
            let label = ctx.get_string("label")?.to_string();
            ctx.set_output("label", Value::String(label))?;
            ctx.set_output("result", Value::Float(v * factor + offset))
        }

        fn clone_box(&self) -> Box<dyn FilterNode> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_defaults_are_filled() {
        let out = Invocation::new(&Scale).with_input("value", Value::Float(3.0)).run().unwrap();
        assert_eq!(out.float("result"), Some(6.5));
        assert_eq!(out.names().collect::<Vec<_>>(), vec!["result", "label"]);
    }

    #[test]
    fn test_converted_widget_read_from_inputs() {
        let out = Invocation::new(&Scale)
            .with_input("value", Value::Integer(1))
            .with_input("factor", Value::Float(4.0))
            .run()
            .unwrap();
        assert_eq!(out.float("result"), Some(4.5));
    }

    #[test]
    fn test_constraint_violation_is_schema_error() {
        let err = Invocation::new(&Scale)
            .with_input("value", Value::Float(1.0))
            .with_parameter("factor", Value::Float(11.0))
            .run()
            .unwrap_err();
        assert!(err.is_schema_error());

        let err = Invocation::new(&Scale)
            .with_input("value", Value::Float(1.0))
            .with_parameter("label", Value::string(""))
            .run()
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Validation(ValidationError::ConstraintViolation { .. })));
    }

    #[test]
    fn test_missing_required_input() {
        let err = Invocation::new(&Scale).run().unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Validation(ValidationError::MissingRequiredInput { ref port, .. }) if port == "value"
        ));
    }
}
