//! Prompt builders and sampling planners.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use crate::filters::builtin::choice;
use crate::presets::context_window::best_window;
use crate::presets::kontext;
use crate::presets::video_prompt::{self, Language, PromptFormat, CATEGORIES};
use indexmap::IndexMap;

const FORMAT_LABELS_ZH: [&str; 3] = ["专业", "简洁", "详细"];

/// System prompt for an image-editing VLM, built from a named preset.
#[derive(Debug, Clone)]
pub struct LoadKontextPresets;

impl FilterNode for LoadKontextPresets {
    fn metadata(&self) -> NodeMetadata {
        let names = kontext::names();
        let default = names.first().copied().unwrap_or("");
        NodeMetadata::builder("LoadKontextPresets_UTK", "Kontext VLM System Presets (UTK)")
            .category(Category::Tools)
            .description("Compose a transformation instruction from a preset and an optional request")
            .parameter(ParameterDefinition::choice("preset", &names, default))
            .parameter(
                ParameterDefinition::new("user_prompt", PortType::String, Value::string(""))
                    .multiline()
                    .optional()
                    .with_description("Replaces the preset's placeholder; empty uses a generic request"),
            )
            .output(PortDefinition::output("Prompt", PortType::String))
            .tags(["prompt", "kontext", "vlm"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let preset = ctx.get_string("preset")?;
        let user_prompt = ctx.get_string_optional("user_prompt").unwrap_or("");
        let prompt = kontext::compose(preset, user_prompt);
        ctx.set_output("Prompt", Value::String(prompt))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

// Labels of both languages, none entries first, without repeats.
fn bilingual_choices(cat: &video_prompt::VideoCategory) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for label in cat.choices(Language::Zh).into_iter().chain(cat.choices(Language::En)) {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

/// Assemble a cinematic video prompt from dropdown selections.
#[derive(Debug, Clone)]
pub struct VideoPromptHelper;

impl FilterNode for VideoPromptHelper {
    fn metadata(&self) -> NodeMetadata {
        let mut builder = NodeMetadata::builder("Video_Prompt_Helper", "Video Prompt Helper")
            .category(Category::Tools)
            .description("Combine a subject with shot, lighting, camera and style terms in Chinese or English")
            .parameter(ParameterDefinition::choice("language", &Language::NAMES, "zh"))
            .parameter(
                ParameterDefinition::new("user_prompt", PortType::String, Value::string(""))
                    .multiline()
                    .with_description("Subject of the shot; empty uses a default scene"),
            );
        for cat in CATEGORIES {
            let choices = bilingual_choices(cat);
            builder = builder.parameter(
                ParameterDefinition::choice(cat.key, &choices, Language::Zh.none_label())
                    .with_description(format!("{} / {}", cat.label_en, cat.label_zh)),
            );
        }
        let formats: Vec<&str> = PromptFormat::NAMES.iter().chain(FORMAT_LABELS_ZH.iter()).copied().collect();
        builder
            .parameter(ParameterDefinition::choice("prompt_format", &formats, "professional"))
            .output(PortDefinition::output("generated_prompt", PortType::String))
            .tags(["prompt", "video"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let language = choice(ctx, "language", Language::parse)?;
        let format = choice(ctx, "prompt_format", PromptFormat::parse)?;
        let user_prompt = ctx.get_string("user_prompt")?;

        let mut selections = IndexMap::new();
        for cat in CATEGORIES {
            let value = ctx.get_string(cat.key)?;
            if value == Language::Zh.none_label() || value == Language::En.none_label() {
                continue;
            }
            selections.insert(cat.key.to_string(), value.to_string());
        }
        let prompt = video_prompt::generate(language, user_prompt, &selections, format);
        log::info!("Generated video prompt from {} selections", selections.len());
        ctx.set_output("generated_prompt", Value::String(prompt))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Pick the `4n + 1` context window that pads a clip the least.
#[derive(Debug, Clone)]
pub struct BestContextWindow;

impl FilterNode for BestContextWindow {
    fn metadata(&self) -> NodeMetadata {
        let int = |name: &str, default: i64, min: f64| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(default)).with_range(min, 10000.0)
        };
        NodeMetadata::builder("BestContextWindow_UTK", "Best Context Window (UTK)")
            .category(Category::Tools)
            .description("Choose a window length of 4n+1 frames that minimises padding over the clip")
            .parameter(int("total_frames", 1, 0.0))
            .parameter(int("min_window_frames", 61, 1.0))
            .parameter(int("max_window_frames", 81, 1.0))
            .output(PortDefinition::output("best_window", PortType::Integer))
            .output(PortDefinition::output("padding", PortType::Integer))
            .output(PortDefinition::output("padded_total", PortType::Integer))
            .output(PortDefinition::output("segments", PortType::Integer))
            .tags(["video", "context", "planning"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let plan = best_window(
            ctx.get_integer("total_frames")?,
            ctx.get_integer("min_window_frames")?,
            ctx.get_integer("max_window_frames")?,
        );
        log::debug!("Context window plan: {:?}", plan);
        ctx.set_output("best_window", Value::Integer(plan.window as i64))?;
        ctx.set_output("padding", Value::Integer(plan.padding as i64))?;
        ctx.set_output("padded_total", Value::Integer(plan.padded_total as i64))?;
        ctx.set_output("segments", Value::Integer(plan.segments as i64))
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
    fn test_kontext_preset_prompt() {
        let out = Invocation::new(&LoadKontextPresets)
            .with_parameter("preset", Value::string("Relighting (重新布光)"))
            .with_parameter("user_prompt", Value::string("golden hour"))
            .run()
            .unwrap();
        let prompt = out.string("Prompt").unwrap();
        assert!(prompt.starts_with(kontext::PREFIX));
        assert!(prompt.contains("golden hour"));
    }

    #[test]
    fn test_kontext_rejects_unknown_preset() {
        let result = Invocation::new(&LoadKontextPresets)
            .with_parameter("preset", Value::string("not a preset"))
            .run();
        assert!(result.is_err());
    }

    #[test]
    fn test_video_prompt_mixed_language_labels() {
        let out = Invocation::new(&VideoPromptHelper)
            .with_parameter("language", Value::string("en"))
            .with_parameter("user_prompt", Value::string("A cat"))
            .with_parameter("shot_size", Value::string("特写镜头"))
            .with_parameter("prompt_format", Value::string("简洁"))
            .run()
            .unwrap();
        assert_eq!(out.string("generated_prompt"), Some("A cat, close-up shot"));
    }

    #[test]
    fn test_video_prompt_defaults() {
        let out = Invocation::new(&VideoPromptHelper).run().unwrap();
        assert_eq!(
            out.string("generated_prompt"),
            Some(video_prompt::generate(Language::Zh, "", &IndexMap::new(), PromptFormat::Professional).as_str())
        );
    }

    #[test]
    fn test_best_context_window_node() {
        let out = Invocation::new(&BestContextWindow)
            .with_parameter("total_frames", Value::Integer(200))
            .run()
            .unwrap();
        assert_eq!(out.integer("best_window"), Some(69));
        assert_eq!(out.integer("padding"), Some(7));
        assert_eq!(out.integer("padded_total"), Some(207));
        assert_eq!(out.integer("segments"), Some(3));
    }
}
