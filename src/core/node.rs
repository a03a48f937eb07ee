//! FilterNode trait and node metadata.
//!
//! Every operator is a `FilterNode`: static metadata (the host-facing schema)
//! plus a two-phase validate/execute pair. Operators hold no state between
//! invocations.

use crate::core::context::{ExecutionContext, ValidationContext};
use crate::core::error::{ExecutionError, ValidationError};
use crate::core::port::{ParameterDefinition, PortDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

/// Prefix of every host category path.
pub const CATEGORY_ROOT: &str = "UniversalToolkit";

/// Subpackage a node belongs to; doubles as the host grouping string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Image,
    Mask,
    Audio,
    #[default]
    Tools,
}

impl Category {
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Image => "Image",
            Category::Mask => "Mask",
            Category::Audio => "Audio",
            Category::Tools => "Tools",
        }
    }

    /// Host category path, e.g. `UniversalToolkit/Image`.
    pub fn path(&self) -> String {
        format!("{}/{}", CATEGORY_ROOT, self.display_name())
    }

    /// All categories in registration order.
    pub fn all() -> &'static [Category] {
        &[Category::Image, Category::Mask, Category::Audio, Category::Tools]
    }
}

/// Metadata describing a node.
///
/// This is everything the host needs to list the node, draw its widgets and
/// decide how to treat its outputs.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    /// Registry identifier (e.g. "MaskAnd_UTK")
    pub id: String,
    /// Human-readable name (e.g. "Mask And (UTK)")
    pub name: String,
    pub category: Category,
    pub description: String,
    pub version: String,
    pub author: String,

    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
    pub parameters: Vec<ParameterDefinition>,

    /// Searchable tags
    pub tags: Vec<String>,
    /// Entry point name reported to the host
    pub entry_point: String,
    /// Output node: the host runs it even when nothing consumes its outputs
    pub output_node: bool,
    /// Produces a preview image for the host UI
    pub preview: bool,
    /// Accepts whole lists instead of being mapped over them
    pub batched_input: bool,
    /// Same inputs always give same outputs
    pub deterministic: bool,
}

impl NodeMetadata {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeMetadataBuilder {
        NodeMetadataBuilder::new(id, name)
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get_input(&self, name: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn get_output(&self, name: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Output type codes, parallel to [`NodeMetadata::output_names`].
    pub fn output_types(&self) -> Vec<&'static str> {
        self.outputs.iter().map(|p| p.port_type.type_code()).collect()
    }

    /// Host input schema: `{"required": {...}, "optional": {...}}`.
    ///
    /// Parameters are listed before ports, in declaration order; the
    /// `optional` key is omitted when nothing is optional.
    pub fn input_schema(&self) -> JsonValue {
        let mut required = JsonMap::new();
        let mut optional = JsonMap::new();
        for p in &self.parameters {
            let target = if p.optional { &mut optional } else { &mut required };
            target.insert(p.name.clone(), p.schema_entry());
        }
        for p in &self.inputs {
            let target = if p.optional { &mut optional } else { &mut required };
            target.insert(p.name.clone(), p.schema_entry());
        }
        let mut schema = JsonMap::new();
        schema.insert("required".into(), JsonValue::Object(required));
        if !optional.is_empty() {
            schema.insert("optional".into(), JsonValue::Object(optional));
        }
        JsonValue::Object(schema)
    }

    /// Full host descriptor: schema, outputs, category and flags.
    pub fn host_descriptor(&self) -> JsonValue {
        json!({
            "input": self.input_schema(),
            "output": self.output_types(),
            "output_name": self.output_names(),
            "name": self.id,
            "display_name": self.name,
            "description": self.description,
            "category": self.category.path(),
            "function": self.entry_point,
            "output_node": self.output_node,
            "preview": self.preview,
            "input_is_list": self.batched_input,
        })
    }
}

/// Builder for NodeMetadata.
pub struct NodeMetadataBuilder {
    metadata: NodeMetadata,
}

impl NodeMetadataBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: NodeMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::default(),
                description: String::new(),
                version: crate::VERSION.to_string(),
                author: "Universal Toolkit".to_string(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                parameters: Vec::new(),
                tags: Vec::new(),
                entry_point: "execute".to_string(),
                output_node: false,
                preview: false,
                batched_input: false,
                deterministic: true,
            },
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = version.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.metadata.author = author.into();
        self
    }

    pub fn input(mut self, port: PortDefinition) -> Self {
        self.metadata.inputs.push(port);
        self
    }

    pub fn output(mut self, port: PortDefinition) -> Self {
        self.metadata.outputs.push(port);
        self
    }

    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.metadata.parameters.push(param);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.metadata.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.metadata.entry_point = name.into();
        self
    }

    pub fn output_node(mut self) -> Self {
        self.metadata.output_node = true;
        self
    }

    pub fn preview(mut self) -> Self {
        self.metadata.preview = true;
        self
    }

    pub fn batched_input(mut self) -> Self {
        self.metadata.batched_input = true;
        self
    }

    /// Mark as non-deterministic; the host re-runs it on every evaluation.
    pub fn non_deterministic(mut self) -> Self {
        self.metadata.deterministic = false;
        self
    }

    pub fn build(self) -> NodeMetadata {
        self.metadata
    }
}

/// The core trait for operator nodes.
///
/// 1. **Validation** (`validate`): called after defaults are filled and the
///    declared constraints have passed. Nodes add cross-field checks here.
/// 2. **Execution** (`execute`): reads inputs from the context, runs the
///    kernels and sets every declared output.
///
/// `Send + Sync` lets the registry hand factories to any worker thread.
pub trait FilterNode: Send + Sync {
    /// Static metadata; must return the same value on every call.
    fn metadata(&self) -> NodeMetadata;

    /// Node-specific validation. Default accepts everything.
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError>;

    /// Clone this node into a boxed trait object.
    fn clone_box(&self) -> Box<dyn FilterNode>;
}

impl Clone for Box<dyn FilterNode> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
