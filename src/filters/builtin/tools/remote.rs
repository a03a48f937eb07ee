//! Operators backed by remote services: image generation and LoRA catalog
//! lookups.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::ImageTensor;
use crate::core::types::{PortType, Value};
use crate::services::image_gen::{
    ControlNet, GenerationParams, ImageGateway, ImageProvider, CONTROLNET_TYPES, MODELS, PROVIDERS, SCHEDULERS,
};
use crate::services::lora::LoraInfoService;
use std::fmt;
use std::sync::Arc;

/// Generate an image through a remote provider.
///
/// Provider failures do not fail the node: the input image (or a gray
/// canvas) comes back and `api_url` carries the error text.
#[derive(Clone, Default)]
pub struct ApiImageGenerator {
    gateway: Option<Arc<ImageGateway>>,
}

impl ApiImageGenerator {
    pub fn with_gateway(gateway: ImageGateway) -> Self {
        Self {
            gateway: Some(Arc::new(gateway)),
        }
    }
}

impl fmt::Debug for ApiImageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiImageGenerator")
            .field("custom_gateway", &self.gateway.is_some())
            .finish()
    }
}

impl FilterNode for ApiImageGenerator {
    fn metadata(&self) -> NodeMetadata {
        let side = |name: &str| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(1024))
                .with_range(256.0, 2048.0)
                .with_step(64.0)
        };
        NodeMetadata::builder("APIImageGenerator_UTK", "API Image Generator (UTK)")
            .category(Category::Tools)
            .description("Text-to-image or image-to-image through a remote generation API")
            .input(PortDefinition::input("image", PortType::Image).optional())
            .input(PortDefinition::input("controlnet_image", PortType::Image).optional())
            .parameter(ParameterDefinition::choice("provider", &PROVIDERS, PROVIDERS[0]))
            .parameter(
                ParameterDefinition::new("api_key", PortType::String, Value::string(""))
                    .with_description("Provider API key; the placeholder provider needs none"),
            )
            .parameter(
                ParameterDefinition::new("prompt", PortType::String, Value::string("Generate a beautiful image"))
                    .multiline(),
            )
            .parameter(ParameterDefinition::new("negative_prompt", PortType::String, Value::string("")).multiline())
            .parameter(side("width"))
            .parameter(side("height"))
            .parameter(ParameterDefinition::new("steps", PortType::Integer, Value::Integer(20)).with_range(1.0, 100.0))
            .parameter(
                ParameterDefinition::new("cfg_scale", PortType::Float, Value::Float(7.0))
                    .with_range(1.0, 20.0)
                    .with_step(0.1),
            )
            .parameter(
                ParameterDefinition::new("seed", PortType::Integer, Value::Integer(-1))
                    .with_range(-1.0, 2147483647.0)
                    .with_description("-1 lets the provider pick"),
            )
            .parameter(ParameterDefinition::choice("scheduler", &SCHEDULERS, SCHEDULERS[0]))
            .parameter(ParameterDefinition::choice("model", &MODELS, MODELS[0]))
            .parameter(ParameterDefinition::choice("controlnet_type", &CONTROLNET_TYPES, "none").optional())
            .parameter(
                ParameterDefinition::new("controlnet_strength", PortType::Float, Value::Float(1.0))
                    .with_range(0.0, 2.0)
                    .with_step(0.1)
                    .optional(),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("api_url", PortType::String))
            .tags(["generate", "network", "api"])
            .non_deterministic()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let provider = ImageProvider::parse(ctx.get_string("provider")?);
        let api_key = ctx.get_string("api_key")?.trim().to_string();
        let params = GenerationParams {
            prompt: ctx.get_string("prompt")?.to_string(),
            negative_prompt: ctx.get_string("negative_prompt")?.to_string(),
            width: ctx.get_integer("width")?.max(1) as usize,
            height: ctx.get_integer("height")?.max(1) as usize,
            steps: ctx.get_integer("steps")?.clamp(1, 100) as u32,
            cfg_scale: ctx.get_float("cfg_scale")?,
            seed: ctx.get_integer("seed")?,
            scheduler: ctx.get_string("scheduler")?.to_string(),
            model: ctx.get_string("model")?.to_string(),
        };

        let kind = ctx.get_string_optional("controlnet_type").unwrap_or("none").to_string();
        let controlnet = match ctx.get_input_image_optional("controlnet_image")? {
            Some(image) if kind != "none" => Some(ControlNet {
                kind,
                strength: ctx.get_float("controlnet_strength").unwrap_or(1.0),
                image: image.frame(0).to_owned(),
            }),
            _ => None,
        };
        let source = ctx.get_input_image_optional("image")?.map(|img| img.frame(0).to_owned());
        log::info!(
            "Generating {}x{} image via {:?} (seed {})",
            params.width,
            params.height,
            provider,
            params.seed
        );

        let gateway = match &self.gateway {
            Some(g) => g.clone(),
            None => Arc::new(ImageGateway::from_global()),
        };
        let (frame, url) = gateway.generate(
            &provider,
            &api_key,
            &params,
            source.as_ref().map(|f| f.view()),
            controlnet.as_ref(),
        );
        ctx.set_output_image("image", ImageTensor::from_frames(vec![frame])?)?;
        ctx.set_output("api_url", Value::String(url))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Trigger words and example prompts for a LoRA file, from the catalog.
#[derive(Clone, Default)]
pub struct LoraInfo {
    service: Option<Arc<LoraInfoService>>,
}

impl LoraInfo {
    pub fn with_service(service: LoraInfoService) -> Self {
        Self {
            service: Some(Arc::new(service)),
        }
    }
}

impl fmt::Debug for LoraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoraInfo")
            .field("custom_service", &self.service.is_some())
            .finish()
    }
}

impl FilterNode for LoraInfo {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("LoraInfo_UTK", "Lora Info (UTK)")
            .category(Category::Tools)
            .description("Look up a LoRA by file hash; results are cached next to the LoRA directory")
            .parameter(
                ParameterDefinition::new("lora_name", PortType::String, Value::string(""))
                    .with_description("File name inside the LoRA directory, or a full path"),
            )
            .output(PortDefinition::output("lora_name", PortType::String))
            .output(PortDefinition::output("civitai_trigger", PortType::String))
            .output(PortDefinition::output("example_prompt", PortType::String))
            .output(PortDefinition::output("civitai_info", PortType::String))
            .tags(["lora", "network", "info"])
            .output_node()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let name = ctx.get_string("lora_name")?.trim().to_string();
        if name.is_empty() {
            return Err(ctx.fail("lora_name is empty"));
        }
        let service = match &self.service {
            Some(s) => s.clone(),
            None => Arc::new(LoraInfoService::from_global()),
        };
        let record = service.lookup(&name)?;
        let summary = record.summary(&name);
        ctx.set_output("lora_name", Value::String(name))?;
        ctx.set_output("civitai_trigger", Value::String(record.trained_words))?;
        ctx.set_output("example_prompt", Value::String(record.example_prompt.unwrap_or_default()))?;
        ctx.set_output("civitai_info", Value::String(summary))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{HttpConfig, LoraConfig};
    use crate::execution::invoke::Invocation;
    use crate::kernels::bridge::from_u8;
    use crate::services::http::fake::{ok_json, status, FakeTransport};
    use crate::services::image_gen::PLACEHOLDER_URL;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_placeholder_returns_gray() {
        let gateway = ImageGateway::new(Arc::new(FakeTransport::new(|r| status(&r.url, 500))), HttpConfig::default());
        let node = ApiImageGenerator::with_gateway(gateway);
        let out = Invocation::new(&node)
            .with_parameter("width", Value::Integer(256))
            .with_parameter("height", Value::Integer(320))
            .run()
            .unwrap();
        let image = out.image("image").unwrap();
        assert_eq!(image.shape(), vec![1, 320, 256, 3]);
        assert!((image.frame(0)[[0, 0, 0]] - from_u8(128)).abs() < 1e-6);
        assert_eq!(out.string("api_url"), Some(PLACEHOLDER_URL));
    }

    fn write_lora(dir: &Path, name: &str) {
        let header = json!({ "__metadata__": {} }).to_string();
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    fn lora_service(dir: &Path) -> LoraInfoService {
        let fake = FakeTransport::new(|r| {
            ok_json(
                &r.url,
                json!({
                    "modelId": 7,
                    "trainedWords": ["ink", "sketch"],
                    "baseModel": "SD 1.5",
                    "images": [{"url": "https://img/7.png", "meta": {"prompt": "ink sketch of a fox"}}]
                }),
            )
        });
        let lora = LoraConfig {
            database_path: dir.join("lora_info.json"),
            catalog_base_url: "https://catalog.test/api/v1".into(),
            lora_dir: Some(dir.to_path_buf()),
        };
        LoraInfoService::new(Arc::new(fake), HttpConfig::default(), lora)
    }

    #[test]
    fn test_lora_info_outputs() {
        let dir = tempfile::tempdir().unwrap();
        write_lora(dir.path(), "ink.safetensors");
        let node = LoraInfo::with_service(lora_service(dir.path()));
        let out = Invocation::new(&node)
            .with_parameter("lora_name", Value::string("ink.safetensors"))
            .run()
            .unwrap();
        assert_eq!(out.string("lora_name"), Some("ink.safetensors"));
        assert_eq!(out.string("civitai_trigger"), Some("ink,sketch"));
        assert_eq!(out.string("example_prompt"), Some("ink sketch of a fox"));
        assert!(out.string("civitai_info").unwrap().starts_with("LoRA: ink.safetensors\n"));
    }

    #[test]
    fn test_lora_info_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let node = LoraInfo::with_service(lora_service(dir.path()));
        let result = Invocation::new(&node)
            .with_parameter("lora_name", Value::string("absent.safetensors"))
            .run();
        assert!(result.is_err());
    }
}
