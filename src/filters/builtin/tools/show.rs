//! Display operators. Each one logs what it receives and passes it on.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::PortDefinition;
use crate::core::types::{PortType, Value};
use serde_json::{json, Value as Json};

macro_rules! show_node {
    ($(#[$doc:meta])* $name:ident, $id:literal, $display:literal, $port:literal, $ty:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name;

        impl FilterNode for $name {
            fn metadata(&self) -> NodeMetadata {
                NodeMetadata::builder($id, $display)
                    .category(Category::Tools)
                    .description(concat!("Show the ", $port, " value and pass it through"))
                    .input(PortDefinition::input($port, $ty))
                    .output(PortDefinition::output($port, $ty))
                    .tags(["debug", "show"])
                    .output_node()
                    .preview()
                    .build()
            }

            fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
                let value = ctx.take_input($port)?;
                log::info!("{}: {}", $id, value);
                ctx.set_output($port, value)
            }

            fn clone_box(&self) -> Box<dyn FilterNode> {
                Box::new(self.clone())
            }
        }
    };
}

show_node!(ShowInt, "ShowInt_UTK", "Show Int (UTK)", "int_val", PortType::Integer);
show_node!(ShowFloat, "ShowFloat_UTK", "Show Float (UTK)", "float_val", PortType::Float);
show_node!(ShowText, "ShowText_UTK", "Show Text (UTK)", "text", PortType::String);
show_node!(ShowList, "ShowList_UTK", "Show List (UTK)", "list_val", PortType::List);
show_node!(
    /// Pass a mask through with a preview.
    PreviewMask,
    "PreviewMask_UTK",
    "Preview Mask (UTK)",
    "mask",
    PortType::Mask
);

// JSON view used for lists and maps; tensors appear as their summary.
fn to_json(value: &Value) -> Json {
    match value {
        Value::None => Json::Null,
        Value::Integer(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Boolean(b) => json!(b),
        Value::String(s) => json!(s),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
        other => json!(other.to_string()),
    }
}

fn tensor_stats(kind: &str, shape: &[usize], range: Option<(f32, f32)>) -> String {
    let numel: usize = shape.iter().product();
    let mut text = format!("Type: {}\nShape: {:?}\nDtype: float32", kind, shape);
    if let Some((min, max)) = range {
        text.push_str(&format!("\nMin: {:.6}\nMax: {:.6}", min, max));
    }
    text.push_str(&format!("\nNumel: {}", numel));
    text
}

/// Human-readable description of any value, one formatter per variant.
pub fn describe(value: &Value) -> String {
    match value {
        Value::None => "Type: NoneType\nValue: None".to_string(),
        Value::String(s) => format!("Type: string\nValue: {}", s),
        Value::Integer(i) => format!("Type: int\nValue: {}", i),
        Value::Float(f) => format!("Type: float\nValue: {}", f),
        Value::Boolean(b) => format!("Type: boolean\nValue: {}", b),
        Value::Array(items) => {
            let body = serde_json::to_string_pretty(&to_json(value)).unwrap_or_default();
            format!("Type: list\nLength: {}\nValue:\n{}", items.len(), body)
        }
        Value::Map(map) => {
            let body = serde_json::to_string_pretty(&to_json(value)).unwrap_or_default();
            format!("Type: dict\nKeys: {}\nValue:\n{}", map.len(), body)
        }
        Value::Image(img) => tensor_stats("image", &img.shape(), Some(img.value_range())),
        Value::Mask(mask) => tensor_stats("mask", &mask.shape(), Some(mask.value_range())),
        Value::Latent(latent) => tensor_stats("latent", &latent.shape(), None),
        Value::Audio(audio) => format!(
            "Type: audio\nSample rate: {}\nChannels: {}\nSamples: {}",
            audio.sample_rate,
            audio.channels(),
            audio.samples()
        ),
        Value::Box(_) | Value::BBox(_) | Value::Color(_) => {
            format!("Type: {}\nValue: {}", value.get_type().type_code().to_lowercase(), value)
        }
    }
}

/// Show any value and pass it through unchanged.
#[derive(Debug, Clone)]
pub struct ShowAny;

impl FilterNode for ShowAny {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ShowAny_UTK", "Show Any (UTK)")
            .category(Category::Tools)
            .description("Display any input with its type, shape and value")
            .input(PortDefinition::input("data", PortType::Any).optional())
            .output(PortDefinition::output("data", PortType::Any))
            .tags(["debug", "show"])
            .output_node()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let value = ctx.input_optional("data").cloned().unwrap_or(Value::None);
        log::info!("ShowAny_UTK\n{}", describe(&value));
        ctx.set_output("data", value)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

const ROUTES: [(&str, PortType); 7] = [
    ("string", PortType::String),
    ("int", PortType::Integer),
    ("float", PortType::Float),
    ("list", PortType::List),
    ("mask", PortType::Mask),
    ("image", PortType::Image),
    ("latent", PortType::Latent),
];

/// Route the input to the output slot of its own type; the others stay empty.
#[derive(Debug, Clone)]
pub struct Show;

impl FilterNode for Show {
    fn metadata(&self) -> NodeMetadata {
        let mut builder = NodeMetadata::builder("Show_UTK", "Show (UTK)")
            .category(Category::Tools)
            .description("Show a value and forward it on the output matching its type")
            .input(PortDefinition::input("input", PortType::Any));
        for (name, ty) in ROUTES {
            builder = builder.output(PortDefinition::output(name, ty));
        }
        builder.tags(["debug", "show"]).preview().build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let value = ctx.take_input("input")?;
        log::info!("Show_UTK: {}", value);
        let slot = ROUTES.iter().position(|(_, ty)| *ty == value.get_type());
        if slot.is_none() {
            log::warn!("Show_UTK has no output for {} values", value.get_type());
        }
        let mut value = Some(value);
        for (i, (name, _)) in ROUTES.iter().enumerate() {
            let out = if Some(i) == slot { value.take() } else { None };
            ctx.set_output(*name, out.unwrap_or(Value::None))?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::{ImageTensor, MaskTensor};
    use crate::execution::invoke::Invocation;

    #[test]
    fn test_show_int_passthrough() {
        let out = Invocation::new(&ShowInt)
            .with_input("int_val", Value::Integer(7))
            .run()
            .unwrap();
        assert_eq!(out.integer("int_val"), Some(7));
        assert!(ShowInt.metadata().output_node);
    }

    #[test]
    fn test_preview_mask_requires_mask() {
        assert!(Invocation::new(&PreviewMask).run().is_err());
        let mask = MaskTensor::zeros(1, 2, 2).unwrap();
        let out = Invocation::new(&PreviewMask).with_input("mask", Value::Mask(mask)).run().unwrap();
        assert!(out.mask("mask").is_some());
    }

    #[test]
    fn test_describe_variants() {
        assert_eq!(describe(&Value::string("hi")), "Type: string\nValue: hi");
        assert_eq!(describe(&Value::None), "Type: NoneType\nValue: None");

        let list = describe(&Value::Array(vec![Value::Integer(1), Value::string("a")]));
        assert!(list.starts_with("Type: list\nLength: 2\nValue:\n["));

        let image = ImageTensor::filled(1, 2, 3, &[0.25, 0.5, 0.75]).unwrap();
        let text = describe(&Value::Image(image));
        assert!(text.contains("Shape: [1, 2, 3, 3]"));
        assert!(text.contains("Min: 0.250000"));
        assert!(text.ends_with("Numel: 18"));
    }

    #[test]
    fn test_show_any_passes_through() {
        let out = Invocation::new(&ShowAny).with_input("data", Value::Float(1.5)).run().unwrap();
        assert_eq!(out.float("data"), Some(1.5));
        let empty = Invocation::new(&ShowAny).run().unwrap();
        assert!(empty.get("data").unwrap().is_none());
    }

    #[test]
    fn test_show_routes_by_type() {
        let out = Invocation::new(&Show).with_input("input", Value::string("x")).run().unwrap();
        assert_eq!(out.string("string"), Some("x"));
        assert!(out.get("image").unwrap().is_none());

        let mask = MaskTensor::zeros(1, 2, 2).unwrap();
        let out = Invocation::new(&Show).with_input("input", Value::Mask(mask)).run().unwrap();
        assert!(out.mask("mask").is_some());
        assert!(out.get("string").unwrap().is_none());
    }
}
