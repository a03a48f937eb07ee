//! Execution and validation contexts.
//!
//! Contexts carry the inputs and parameters of one invocation and collect the
//! outputs. The host may convert any widget into an input socket, so scalar
//! getters look in the parameters first and fall back to the inputs.

use crate::core::error::{ExecutionError, NodeId, ValidationError};
use crate::core::tensor::{AudioData, BBoxes, CropBox, ImageTensor, Latent, MaskTensor};
use crate::core::types::{PortType, Value};
use std::collections::HashMap;

/// Context provided during node validation.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub node_id: NodeId,
    inputs: HashMap<String, Value>,
    parameters: HashMap<String, Value>,
}

impl ValidationContext {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
            parameters: HashMap::new(),
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.get(name).is_some_and(|v| !v.is_none())
    }

    fn lookup(&self, name: &str) -> Result<&Value, ValidationError> {
        self.parameters
            .get(name)
            .or_else(|| self.inputs.get(name))
            .ok_or_else(|| ValidationError::ConstraintViolation {
                node_id: self.node_id,
                parameter: name.to_string(),
                error: "Parameter not set".to_string(),
            })
    }

    fn mismatch(&self, expected: PortType, value: &Value) -> ValidationError {
        ValidationError::TypeMismatch {
            expected,
            got: value.get_type(),
        }
    }

    pub fn get_input_image(&self, name: &str) -> Result<&ImageTensor, ValidationError> {
        let value = self.inputs.get(name).ok_or_else(|| ValidationError::MissingRequiredInput {
            node_id: self.node_id,
            port: name.to_string(),
        })?;
        value.as_image().ok_or_else(|| self.mismatch(PortType::Image, value))
    }

    pub fn get_input_mask_optional(&self, name: &str) -> Option<&MaskTensor> {
        self.inputs.get(name).and_then(|v| v.as_mask())
    }

    pub fn get_integer(&self, name: &str) -> Result<i64, ValidationError> {
        let v = self.lookup(name)?;
        v.as_integer().ok_or_else(|| self.mismatch(PortType::Integer, v))
    }

    pub fn get_float(&self, name: &str) -> Result<f64, ValidationError> {
        let v = self.lookup(name)?;
        v.as_float().ok_or_else(|| self.mismatch(PortType::Float, v))
    }

    pub fn get_string(&self, name: &str) -> Result<&str, ValidationError> {
        let v = self.lookup(name)?;
        v.as_string().ok_or_else(|| self.mismatch(PortType::String, v))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ValidationError> {
        let v = self.lookup(name)?;
        v.as_bool().ok_or_else(|| self.mismatch(PortType::Boolean, v))
    }

    /// Error helper for node-specific validation.
    pub fn violation(&self, parameter: &str, error: impl Into<String>) -> ValidationError {
        ValidationError::ConstraintViolation {
            node_id: self.node_id,
            parameter: parameter.to_string(),
            error: error.into(),
        }
    }
}

/// Context provided during node execution.
///
/// Holds the resolved inputs and parameters and collects the outputs the
/// node sets.
#[derive(Debug)]
pub struct ExecutionContext {
    pub node_id: NodeId,
    inputs: HashMap<String, Value>,
    parameters: HashMap<String, Value>,
    outputs: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            inputs: HashMap::new(),
            parameters: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }

    pub fn outputs(&self) -> &HashMap<String, Value> {
        &self.outputs
    }

    /// Take ownership of all outputs.
    pub fn take_outputs(self) -> HashMap<String, Value> {
        self.outputs
    }

    // ========================================================================
    // Input Getters
    // ========================================================================

    /// Get an input value by name. `Value::None` counts as missing.
    pub fn get_input(&self, name: &str) -> Result<&Value, ExecutionError> {
        self.input_optional(name).ok_or_else(|| ExecutionError::MissingInput {
            node_id: self.node_id,
            port: name.to_string(),
        })
    }

    /// Connected input, if any.
    pub fn input_optional(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).filter(|v| !v.is_none())
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input_optional(name).is_some()
    }

    /// Take ownership of an input value.
    pub fn take_input(&mut self, name: &str) -> Result<Value, ExecutionError> {
        match self.inputs.remove(name) {
            Some(v) if !v.is_none() => Ok(v),
            _ => Err(ExecutionError::MissingInput {
                node_id: self.node_id,
                port: name.to_string(),
            }),
        }
    }

    fn wrong_type(&self, name: &str, expected: PortType) -> ExecutionError {
        let got = self
            .inputs
            .get(name)
            .or_else(|| self.parameters.get(name))
            .map(|v| v.get_type())
            .unwrap_or(PortType::Any);
        ExecutionError::NodeExecution {
            node_id: self.node_id,
            error: format!("Input '{}' is not {} (got {})", name, expected, got),
        }
    }

    pub fn get_input_image(&self, name: &str) -> Result<&ImageTensor, ExecutionError> {
        self.get_input(name)?
            .as_image()
            .ok_or_else(|| self.wrong_type(name, PortType::Image))
    }

    /// Returns None if the input is absent; a present input of the wrong type is an error.
    pub fn get_input_image_optional(&self, name: &str) -> Result<Option<&ImageTensor>, ExecutionError> {
        match self.input_optional(name) {
            None => Ok(None),
            Some(v) => v.as_image().map(Some).ok_or_else(|| self.wrong_type(name, PortType::Image)),
        }
    }

    pub fn get_input_mask(&self, name: &str) -> Result<&MaskTensor, ExecutionError> {
        self.get_input(name)?
            .as_mask()
            .ok_or_else(|| self.wrong_type(name, PortType::Mask))
    }

    pub fn get_input_mask_optional(&self, name: &str) -> Result<Option<&MaskTensor>, ExecutionError> {
        match self.input_optional(name) {
            None => Ok(None),
            Some(v) => v.as_mask().map(Some).ok_or_else(|| self.wrong_type(name, PortType::Mask)),
        }
    }

    pub fn get_input_latent(&self, name: &str) -> Result<&Latent, ExecutionError> {
        self.get_input(name)?
            .as_latent()
            .ok_or_else(|| self.wrong_type(name, PortType::Latent))
    }

    pub fn get_input_audio(&self, name: &str) -> Result<&AudioData, ExecutionError> {
        self.get_input(name)?
            .as_audio()
            .ok_or_else(|| self.wrong_type(name, PortType::Audio))
    }

    pub fn get_input_box(&self, name: &str) -> Result<CropBox, ExecutionError> {
        self.get_input(name)?
            .as_box()
            .ok_or_else(|| self.wrong_type(name, PortType::Box))
    }

    pub fn get_input_bboxes(&self, name: &str) -> Result<&BBoxes, ExecutionError> {
        self.get_input(name)?
            .as_bboxes()
            .ok_or_else(|| self.wrong_type(name, PortType::BBox))
    }

    // ========================================================================
    // Parameter Getters
    // ========================================================================

    /// Widget value by name; converted widgets arrive as inputs.
    pub fn get_parameter(&self, name: &str) -> Result<&Value, ExecutionError> {
        self.parameters
            .get(name)
            .or_else(|| self.inputs.get(name))
            .ok_or_else(|| ExecutionError::MissingParameter {
                node_id: self.node_id,
                parameter: name.to_string(),
            })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || self.inputs.contains_key(name)
    }

    pub fn get_integer(&self, name: &str) -> Result<i64, ExecutionError> {
        self.get_parameter(name)?
            .as_integer()
            .ok_or_else(|| self.wrong_type(name, PortType::Integer))
    }

    pub fn get_float(&self, name: &str) -> Result<f64, ExecutionError> {
        self.get_parameter(name)?
            .as_float()
            .ok_or_else(|| self.wrong_type(name, PortType::Float))
    }

    pub fn get_string(&self, name: &str) -> Result<&str, ExecutionError> {
        self.get_parameter(name)?
            .as_string()
            .ok_or_else(|| self.wrong_type(name, PortType::String))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ExecutionError> {
        self.get_parameter(name)?
            .as_bool()
            .ok_or_else(|| self.wrong_type(name, PortType::Boolean))
    }

    /// String parameter that may be absent.
    pub fn get_string_optional(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .or_else(|| self.inputs.get(name))
            .and_then(|v| v.as_string())
    }

    // ========================================================================
    // Output Setters
    // ========================================================================

    pub fn set_output(&mut self, name: impl Into<String>, value: Value) -> Result<(), ExecutionError> {
        self.outputs.insert(name.into(), value);
        Ok(())
    }

    pub fn set_output_image(&mut self, name: impl Into<String>, image: ImageTensor) -> Result<(), ExecutionError> {
        self.set_output(name, Value::Image(image))
    }

    pub fn set_output_mask(&mut self, name: impl Into<String>, mask: MaskTensor) -> Result<(), ExecutionError> {
        self.set_output(name, Value::Mask(mask))
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Wrap a free-form failure with this node's id.
    pub fn fail(&self, error: impl Into<String>) -> ExecutionError {
        ExecutionError::NodeExecution {
            node_id: self.node_id,
            error: error.into(),
        }
    }
}

impl From<ValidationContext> for ExecutionContext {
    fn from(val_ctx: ValidationContext) -> Self {
        Self {
            node_id: val_ctx.node_id,
            inputs: val_ctx.inputs,
            parameters: val_ctx.parameters,
            outputs: HashMap::new(),
        }
    }
}

impl From<&ExecutionContext> for ValidationContext {
    fn from(ctx: &ExecutionContext) -> Self {
        Self {
            node_id: ctx.node_id,
            inputs: ctx.inputs.clone(),
            parameters: ctx.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_getters_fall_back_to_inputs() {
        let mut ctx = ExecutionContext::new(NodeId::new());
        ctx.add_input("width", Value::Integer(512));
        ctx.add_parameter("scale", Value::Float(2.0));

        assert_eq!(ctx.get_integer("width").unwrap(), 512);
        assert_eq!(ctx.get_float("scale").unwrap(), 2.0);
        assert!(ctx.get_bool("missing").is_err());
    }

    #[test]
    fn test_none_input_counts_as_missing() {
        let mut ctx = ExecutionContext::new(NodeId::new());
        ctx.add_input("mask", Value::None);
        assert!(!ctx.has_input("mask"));
        assert!(ctx.get_input_mask_optional("mask").unwrap().is_none());
        assert!(matches!(ctx.get_input("mask"), Err(ExecutionError::MissingInput { .. })));
    }

    #[test]
    fn test_optional_input_wrong_type_is_error() {
        let mut ctx = ExecutionContext::new(NodeId::new());
        ctx.add_input("image", Value::Integer(1));
        assert!(ctx.get_input_image_optional("image").is_err());
    }

    #[test]
    fn test_execution_context_outputs() {
        let mut ctx = ExecutionContext::new(NodeId::new());
        ctx.set_output("result", Value::Integer(100)).unwrap();

        assert!(ctx.has_output("result"));
        let outputs = ctx.take_outputs();
        assert_eq!(outputs.get("result"), Some(&Value::Integer(100)));
    }

    #[test]
    fn test_validation_context_lookup() {
        let mut ctx = ValidationContext::new(NodeId::new());
        ctx.add_parameter("radius", Value::Float(5.0));
        assert_eq!(ctx.get_float("radius").unwrap(), 5.0);
        assert!(ctx.get_string("radius").is_err());
    }
}
