//! Flow-control operators.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};

/// Pick one of two values with a boolean.
#[derive(Debug, Clone)]
pub struct LazySwitchKJ;

impl FilterNode for LazySwitchKJ {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("LazySwitchKJ_UTK", "Lazy Switch KJ (UTK)")
            .category(Category::Tools)
            .description("Return on_true or on_false depending on switch; only the chosen branch is needed")
            .parameter(
                ParameterDefinition::new("switch", PortType::Boolean, Value::Boolean(false))
                    .with_description("Boolean value to control which input is returned"),
            )
            .input(PortDefinition::input("on_false", PortType::Any).optional())
            .input(PortDefinition::input("on_true", PortType::Any).optional())
            .output(PortDefinition::output("output", PortType::Any))
            .tags(["switch", "flow"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let branch = if ctx.get_bool("switch")? { "on_true" } else { "on_false" };
        let value = match ctx.take_input(branch) {
            Ok(v) => v,
            Err(_) => {
                log::warn!("LazySwitchKJ_UTK: {} is not connected", branch);
                Value::None
            }
        };
        ctx.set_output("output", value)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Passthrough that marks a point where cached model memory may be freed.
///
/// Tensors here live in host memory and are dropped as soon as nothing
/// references them, so the node only records the request.
#[derive(Debug, Clone)]
pub struct PurgeVRAM;

impl FilterNode for PurgeVRAM {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("PurgeVRAM_UTK", "Purge VRAM (UTK)")
            .category(Category::Tools)
            .description("Request a cache and model purge, passing the input through")
            .input(PortDefinition::input("anything", PortType::Any))
            .parameter(ParameterDefinition::new("purge_cache", PortType::Boolean, Value::Boolean(true)))
            .parameter(ParameterDefinition::new("purge_models", PortType::Boolean, Value::Boolean(true)))
            .output(PortDefinition::output("anything", PortType::Any))
            .tags(["memory", "flow"])
            .output_node()
            .non_deterministic()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let cache = ctx.get_bool("purge_cache")?;
        let models = ctx.get_bool("purge_models")?;
        log::info!("Purge requested (cache: {}, models: {})", cache, models);
        let value = ctx.take_input("anything")?;
        ctx.set_output("anything", value)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::invoke::Invocation;

    #[test]
    fn test_switch_selects_branch() {
        let run = |switch: bool| {
            Invocation::new(&LazySwitchKJ)
                .with_input("on_false", Value::string("no"))
                .with_input("on_true", Value::Integer(1))
                .with_parameter("switch", Value::Boolean(switch))
                .run()
                .unwrap()
        };
        assert_eq!(run(true).integer("output"), Some(1));
        assert_eq!(run(false).string("output"), Some("no"));
    }

    #[test]
    fn test_switch_without_selected_branch_is_empty() {
        let out = Invocation::new(&LazySwitchKJ)
            .with_input("on_false", Value::string("no"))
            .with_parameter("switch", Value::Boolean(true))
            .run()
            .unwrap();
        assert!(out.get("output").unwrap().is_none());
    }

    #[test]
    fn test_purge_passes_through() {
        let out = Invocation::new(&PurgeVRAM)
            .with_input("anything", Value::Float(0.5))
            .run()
            .unwrap();
        assert_eq!(out.float("anything"), Some(0.5));
    }
}
