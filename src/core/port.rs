//! Port definitions and constraints for node inputs/outputs.
//!
//! Inputs come in two flavours. Ports carry tensors or other node outputs and
//! are wired by the host; parameters are widget-backed values with a default.
//! Both end up in the host input schema as `(type-name, {constraints})` pairs.

use crate::core::types::{PortType, Value};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

/// Direction of a port (input or output).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// Definition of a node port (input or output).
#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    /// Unique name within the node
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Type of data this port accepts/produces
    pub port_type: PortType,
    pub direction: PortDirection,
    /// Value used when an optional input is left unconnected
    pub default_value: Option<Value>,
    pub optional: bool,
    pub description: String,
    pub constraints: Vec<Constraint>,
}

/// UI hints for parameter display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "widget", content = "options")]
pub enum UiHint {
    /// Default input widget based on type
    #[default]
    Default,
    Slider,
    /// Combo box; the option list doubles as the host type name
    Dropdown { options: Vec<String> },
    TextInput {
        multiline: bool,
        placeholder: Option<String>,
    },
    Checkbox,
    SpinBox,
}

/// Definition of a node parameter (widget-backed input).
#[derive(Debug, Clone, Serialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub display_name: String,
    pub param_type: PortType,
    /// Default value (required for parameters)
    pub default_value: Value,
    pub description: String,
    pub constraints: Vec<Constraint>,
    pub ui_hint: UiHint,
    /// Parameters marked optional land in the `optional` half of the schema.
    pub optional: bool,
}

/// Constraints that can be applied to port/parameter values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Numeric value must be within range [min, max]
    Range { min: f64, max: f64 },
    MinValue(f64),
    /// Numeric value must be a multiple of step (offset from the range minimum, if any)
    Step(f64),
    NotEmpty,
    /// String must be one of the listed options
    OneOf(Vec<String>),
}

impl PortDefinition {
    /// Create a new input port definition.
    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        Self::with_direction(name.into(), port_type, PortDirection::Input)
    }

    /// Create a new output port definition.
    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        Self::with_direction(name.into(), port_type, PortDirection::Output)
    }

    fn with_direction(name: String, port_type: PortType, direction: PortDirection) -> Self {
        Self {
            display_name: name_to_display(&name),
            name,
            port_type,
            direction,
            default_value: None,
            optional: false,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark this port as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate a value against this port's type and constraints.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.port_type.matches(value) {
            return Err(format!(
                "Type mismatch for port '{}': expected {}, got {}",
                self.name,
                self.port_type,
                value.get_type()
            ));
        }
        for constraint in &self.constraints {
            constraint.validate(value)?;
        }
        Ok(())
    }

    /// Host schema entry: `[TYPE, {tooltip, ...}]`.
    pub fn schema_entry(&self) -> JsonValue {
        let mut opts = JsonMap::new();
        if !self.description.is_empty() {
            opts.insert("tooltip".into(), json!(self.description));
        }
        if let Some(default) = &self.default_value {
            if let Some(d) = scalar_json(default) {
                opts.insert("default".into(), d);
            }
        }
        json!([self.port_type.type_code(), opts])
    }
}

impl ParameterDefinition {
    /// Create a new parameter definition.
    pub fn new(name: impl Into<String>, param_type: PortType, default_value: Value) -> Self {
        let name = name.into();
        let ui_hint = match param_type {
            PortType::Boolean => UiHint::Checkbox,
            PortType::Integer => UiHint::SpinBox,
            _ => UiHint::Default,
        };
        Self {
            display_name: name_to_display(&name),
            name,
            param_type,
            default_value,
            description: String::new(),
            constraints: Vec::new(),
            ui_hint,
            optional: false,
        }
    }

    /// String parameter backed by a dropdown; the default must be one of the options.
    pub fn choice(name: impl Into<String>, options: &[&str], default: &str) -> Self {
        let options: Vec<String> = options.iter().map(|s| s.to_string()).collect();
        Self::new(name, PortType::String, Value::string(default))
            .with_constraint(Constraint::OneOf(options.clone()))
            .with_ui_hint(UiHint::Dropdown { options })
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a range constraint and switch numeric widgets to a slider.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        if matches!(self.ui_hint, UiHint::Default) {
            self.ui_hint = UiHint::Slider;
        }
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.constraints.push(Constraint::Step(step));
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_ui_hint(mut self, ui_hint: UiHint) -> Self {
        self.ui_hint = ui_hint;
        self
    }

    /// Multiline text box.
    pub fn multiline(mut self) -> Self {
        self.ui_hint = UiHint::TextInput {
            multiline: true,
            placeholder: None,
        };
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Validate a value against this parameter's type and constraints.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.param_type.matches(value) {
            return Err(format!(
                "Type mismatch for parameter '{}': expected {}, got {}",
                self.name,
                self.param_type,
                value.get_type()
            ));
        }
        let range_min = self.constraints.iter().find_map(|c| match c {
            Constraint::Range { min, .. } => Some(*min),
            _ => None,
        });
        for constraint in &self.constraints {
            match constraint {
                Constraint::Step(step) => check_step(value, *step, range_min.unwrap_or(0.0))?,
                other => other.validate(value)?,
            }
        }
        Ok(())
    }

    /// Host schema entry. Dropdowns use their option list as the type name;
    /// numeric entries carry `{default, min, max, step}`, strings carry
    /// `{default, multiline, tooltip}`.
    pub fn schema_entry(&self) -> JsonValue {
        let mut opts = JsonMap::new();
        if let Some(d) = scalar_json(&self.default_value) {
            opts.insert("default".into(), d);
        }
        for c in &self.constraints {
            match c {
                Constraint::Range { min, max } => {
                    opts.insert("min".into(), number_json(self.param_type, *min));
                    opts.insert("max".into(), number_json(self.param_type, *max));
                }
                Constraint::MinValue(min) => {
                    opts.insert("min".into(), number_json(self.param_type, *min));
                }
                Constraint::Step(step) => {
                    opts.insert("step".into(), number_json(self.param_type, *step));
                }
                _ => {}
            }
        }
        if let UiHint::TextInput { multiline, .. } = &self.ui_hint {
            opts.insert("multiline".into(), json!(multiline));
        }
        if !self.description.is_empty() {
            opts.insert("tooltip".into(), json!(self.description));
        }
        let type_name = match &self.ui_hint {
            UiHint::Dropdown { options } => json!(options),
            _ => json!(self.param_type.type_code()),
        };
        json!([type_name, opts])
    }
}

impl Constraint {
    /// Validate a value against this constraint.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::Range { min, max } => {
                if let Some(num) = value.as_float() {
                    if num < *min || num > *max {
                        return Err(format!("Value {} is out of range [{}, {}]", num, min, max));
                    }
                }
            }
            Constraint::MinValue(min) => {
                if let Some(num) = value.as_float() {
                    if num < *min {
                        return Err(format!("Value {} is below minimum {}", num, min));
                    }
                }
            }
            Constraint::Step(step) => check_step(value, *step, 0.0)?,
            Constraint::NotEmpty => {
                let is_empty = match value {
                    Value::String(s) => s.is_empty(),
                    Value::Array(arr) => arr.is_empty(),
                    Value::Map(map) => map.is_empty(),
                    _ => false,
                };
                if is_empty {
                    return Err("Value cannot be empty".to_string());
                }
            }
            Constraint::OneOf(options) => {
                if let Some(s) = value.as_string() {
                    if !options.iter().any(|o| o == s) {
                        return Err(format!("'{}' is not one of {:?}", s, options));
                    }
                }
            }
        }
        Ok(())
    }
}

// Float steps such as 0.01 never divide exactly, so compare against a tolerance.
fn check_step(value: &Value, step: f64, origin: f64) -> Result<(), String> {
    if step <= 0.0 {
        return Ok(());
    }
    if let Some(num) = value.as_float() {
        let q = (num - origin) / step;
        if (q - q.round()).abs() > 1e-6 {
            return Err(format!("Value {} must be a multiple of {}", num, step));
        }
    }
    Ok(())
}

fn number_json(ty: PortType, v: f64) -> JsonValue {
    if ty == PortType::Integer {
        json!(v as i64)
    } else {
        json!(v)
    }
}

fn scalar_json(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Integer(i) => Some(json!(i)),
        Value::Float(f) => Some(json!(f)),
        Value::String(s) => Some(json!(s)),
        Value::Boolean(b) => Some(json!(b)),
        Value::Color(c) => Some(json!(c.to_hex())),
        _ => None,
    }
}

/// Convert snake_case name to Title Case display name.
pub(crate) fn name_to_display(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_definition_builder() {
        let port = PortDefinition::input("mask", PortType::Mask)
            .with_description("Optional mask")
            .optional();

        assert_eq!(port.name, "mask");
        assert_eq!(port.display_name, "Mask");
        assert!(port.optional);
        assert!(matches!(port.direction, PortDirection::Input));
    }

    #[test]
    fn test_constraint_range_validation() {
        let constraint = Constraint::Range { min: 0.0, max: 100.0 };

        assert!(constraint.validate(&Value::Float(50.0)).is_ok());
        assert!(constraint.validate(&Value::Integer(100)).is_ok());
        assert!(constraint.validate(&Value::Float(-1.0)).is_err());
        assert!(constraint.validate(&Value::Float(101.0)).is_err());
    }

    #[test]
    fn test_min_value_and_not_empty() {
        let offset = ParameterDefinition::new("offset_seconds", PortType::Float, Value::Float(0.0))
            .with_constraint(Constraint::MinValue(0.0));
        assert!(offset.validate(&Value::Float(1e300)).is_ok());
        assert!(offset.validate(&Value::Float(-0.5)).is_err());
        assert_eq!(offset.schema_entry()[1]["min"], 0.0);

        assert!(Constraint::NotEmpty.validate(&Value::string("")).is_err());
        assert!(Constraint::NotEmpty.validate(&Value::string("x")).is_ok());
    }

    #[test]
    fn test_step_relative_to_range_min() {
        let p = ParameterDefinition::new("mask_blur", PortType::Integer, Value::Integer(1))
            .with_range(1.0, 127.0)
            .with_step(2.0);
        assert!(p.validate(&Value::Integer(5)).is_ok());
        assert!(p.validate(&Value::Integer(4)).is_err());

        let f = ParameterDefinition::new("strength", PortType::Float, Value::Float(1.0)).with_step(0.01);
        assert!(f.validate(&Value::Float(0.07)).is_ok());
    }

    #[test]
    fn test_choice_rejects_unknown_option() {
        let p = ParameterDefinition::choice("mode", &["area", "box"], "area");
        assert!(p.validate(&Value::string("box")).is_ok());
        assert!(p.validate(&Value::string("circle")).is_err());
    }

    #[test]
    fn test_schema_entries() {
        let p = ParameterDefinition::new("divisor", PortType::Integer, Value::Integer(8))
            .with_range(1.0, 64.0)
            .with_step(1.0);
        let entry = p.schema_entry();
        assert_eq!(entry[0], "INT");
        assert_eq!(entry[1]["default"], 8);
        assert_eq!(entry[1]["max"], 64);

        let c = ParameterDefinition::choice("fit", &["letterbox", "crop"], "crop");
        assert_eq!(c.schema_entry()[0][1], "crop");

        let t = ParameterDefinition::new("text", PortType::String, Value::string("")).multiline();
        assert_eq!(t.schema_entry()[1]["multiline"], true);
    }

    #[test]
    fn test_name_to_display() {
        assert_eq!(name_to_display("blur_radius"), "Blur Radius");
        assert_eq!(name_to_display("image"), "Image");
    }
}
