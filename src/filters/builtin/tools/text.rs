//! Text operators: concatenation, reasoning-trace removal, text boxes and
//! translation.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use crate::services::translator::{Translator, LANGUAGES};
use std::fmt;
use std::sync::Arc;

const THINK_CLOSE: &str = "</think>";

/// Join up to four optional texts with a delimiter, skipping empty ones.
#[derive(Debug, Clone)]
pub struct TextConcatenate;

impl FilterNode for TextConcatenate {
    fn metadata(&self) -> NodeMetadata {
        let mut builder = NodeMetadata::builder("TextConcatenate_UTK", "Text Concatenate (UTK)")
            .category(Category::Tools)
            .description("Concatenate strings with a custom delimiter; \\n in the delimiter means a newline")
            .parameter(ParameterDefinition::new("delimiter", PortType::String, Value::string(", ")))
            .parameter(ParameterDefinition::choice("clean_whitespace", &["true", "false"], "true"));
        for name in ["text_a", "text_b", "text_c", "text_d"] {
            builder = builder.input(PortDefinition::input(name, PortType::String).optional());
        }
        builder
            .output(PortDefinition::output("text", PortType::String))
            .tags(["text", "join"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let delimiter = match ctx.get_string("delimiter")? {
            "\n" | "\\n" => "\n",
            other => other,
        };
        let clean = ctx.get_string("clean_whitespace")? == "true";

        let parts: Vec<&str> = ["text_a", "text_b", "text_c", "text_d"]
            .iter()
            .filter_map(|name| ctx.input_optional(name).and_then(Value::as_string))
            .map(|s| if clean { s.trim() } else { s })
            .filter(|s| !s.is_empty())
            .collect();
        let joined = parts.join(delimiter);
        ctx.set_output("text", Value::String(joined))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

// Byte offset of `needle` in `haystack`, ignoring ASCII case.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Split model output at the first closing think tag.
///
/// Returns `(cleared, think)`; without a closing tag both are the input.
pub fn split_think(text: &str) -> (String, String) {
    match find_ignore_ascii_case(text, THINK_CLOSE) {
        Some(start) => {
            let end = start + THINK_CLOSE.len();
            (text[end..].trim().to_string(), text[..end].trim().to_string())
        }
        None => (text.to_string(), text.to_string()),
    }
}

/// Separate a reasoning trace from the answer that follows it.
#[derive(Debug, Clone)]
pub struct ThinkRemover;

impl FilterNode for ThinkRemover {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ThinkRemover_UTK", "Think Remover (UTK)")
            .category(Category::Tools)
            .description("Split text into the <think> section and the remaining content")
            .input(PortDefinition::input("text", PortType::String))
            .output(PortDefinition::output("cleared_content", PortType::String))
            .output(PortDefinition::output("think_content", PortType::String))
            .tags(["text", "llm"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let text = ctx
            .get_input("text")?
            .as_string()
            .ok_or_else(|| ctx.fail("text must be a string"))?;
        let (cleared, think) = split_think(text);
        ctx.set_output("cleared_content", Value::String(cleared))?;
        ctx.set_output("think_content", Value::String(think))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// A multiline text parameter exposed as an output.
#[derive(Debug, Clone)]
pub struct TextBoxNode;

impl FilterNode for TextBoxNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("TextBoxNode_UTK", "TextBox (UTK)")
            .category(Category::Tools)
            .description("Multiline text box used as a text parameter in a workflow")
            .parameter(ParameterDefinition::new("text", PortType::String, Value::string("text")).multiline())
            .output(PortDefinition::output("text", PortType::String))
            .tags(["text", "prompt"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let text = ctx.get_string("text")?.to_string();
        ctx.set_output("text", Value::String(text))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

const PROVIDER_CHOICES: [&str; 6] = [
    "auto",
    "Google Translate (Free)",
    "LibreTranslate (Free)",
    "MyMemory (Free)",
    "DeepL (Paid)",
    "Azure Translator (Paid)",
];

/// Translate text through the first working web provider.
#[derive(Clone, Default)]
pub struct TextTranslator {
    translator: Option<Arc<Translator>>,
}

impl TextTranslator {
    /// Use `translator` instead of the globally configured providers.
    pub fn with_translator(translator: Translator) -> Self {
        Self {
            translator: Some(Arc::new(translator)),
        }
    }
}

impl fmt::Debug for TextTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextTranslator")
            .field("custom_translator", &self.translator.is_some())
            .finish()
    }
}

// A list input translates only its first entry.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(text_of),
        Value::None => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        other => Some(other.to_string()),
    }
}

impl FilterNode for TextTranslator {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("TextTranslator_UTK", "Text Translator (UTK)")
            .category(Category::Tools)
            .description("Translate text; auto mode tries free providers first, then keyed ones")
            .input(
                PortDefinition::input("text", PortType::Any)
                    .optional()
                    .with_default(Value::string("Hello, world!"))
                    .with_description("A string, or a list whose first entry is translated"),
            )
            .parameter(ParameterDefinition::choice("target_language", LANGUAGES, "zh"))
            .parameter(ParameterDefinition::choice("source_language", LANGUAGES, "auto"))
            .parameter(ParameterDefinition::choice("provider", &PROVIDER_CHOICES, "auto"))
            .parameter(
                ParameterDefinition::new("api_key", PortType::String, Value::string(""))
                    .optional()
                    .with_description("API key (required for paid services)"),
            )
            .output(PortDefinition::output("translated_text", PortType::String))
            .output(PortDefinition::output("provider_used", PortType::String))
            .output(PortDefinition::output("status_message", PortType::String))
            .tags(["text", "translate", "network"])
            .non_deterministic()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let text = ctx.input_optional("text").and_then(text_of).unwrap_or_default();
        let target = ctx.get_string("target_language")?.to_string();
        let source = ctx.get_string("source_language")?.to_string();
        let provider = ctx.get_string("provider")?.to_string();
        let api_key = ctx.get_string_optional("api_key").map(str::trim).filter(|k| !k.is_empty()).map(str::to_string);
        log::info!("Translating {} characters to {} via {}", text.chars().count(), target, provider);

        let translator = match &self.translator {
            Some(t) => t.clone(),
            None => Arc::new(Translator::from_global()),
        };
        let (translated, used, status) =
            match translator.translate(&text, &source, &target, &provider, api_key.as_deref()) {
                Ok(t) => (t.text, t.provider, t.status),
                Err(e) => {
                    log::error!("Translation failed: {}", e);
                    (String::new(), String::new(), format!("Error: {}", e))
                }
            };
        ctx.set_output("translated_text", Value::String(translated))?;
        ctx.set_output("provider_used", Value::String(used))?;
        ctx.set_output("status_message", Value::String(status))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{HttpConfig, TranslatorConfig};
    use crate::execution::invoke::Invocation;
    use crate::services::http::fake::{ok_json, status, FakeTransport};
    use serde_json::json;

    #[test]
    fn test_concatenate_skips_empty_and_honours_newline() {
        let out = Invocation::new(&TextConcatenate)
            .with_input("text_a", Value::string("  one "))
            .with_input("text_b", Value::string("   "))
            .with_input("text_d", Value::string("two"))
            .with_parameter("delimiter", Value::string("\\n"))
            .run()
            .unwrap();
        assert_eq!(out.string("text"), Some("one\ntwo"));
    }

    #[test]
    fn test_concatenate_keeps_whitespace_when_asked() {
        let out = Invocation::new(&TextConcatenate)
            .with_input("text_a", Value::string(" a "))
            .with_input("text_c", Value::string("b"))
            .with_parameter("clean_whitespace", Value::string("false"))
            .run()
            .unwrap();
        assert_eq!(out.string("text"), Some(" a , b"));
    }

    #[test]
    fn test_think_split() {
        let (cleared, think) = split_think("<think>plan</THINK>\n answer ");
        assert_eq!(cleared, "answer");
        assert_eq!(think, "<think>plan</THINK>");

        let (cleared, think) = split_think("no trace");
        assert_eq!(cleared, "no trace");
        assert_eq!(think, "no trace");
    }

    #[test]
    fn test_think_split_after_multibyte_text() {
        let (cleared, think) = split_think("思考</think>答案");
        assert_eq!(cleared, "答案");
        assert_eq!(think, "思考</think>");
    }

    #[test]
    fn test_textbox_passthrough() {
        let out = Invocation::new(&TextBoxNode)
            .with_parameter("text", Value::string("a\nb"))
            .run()
            .unwrap();
        assert_eq!(out.string("text"), Some("a\nb"));
    }

    fn fake_translator() -> Translator {
        let fake = FakeTransport::new(|r| {
            if r.url.contains("deepl") {
                ok_json(&r.url, json!({"translations": [{"text": "你好"}]}))
            } else {
                status(&r.url, 503)
            }
        });
        Translator::new(Arc::new(fake), &HttpConfig::default(), TranslatorConfig::default())
    }

    #[test]
    fn test_translator_uses_first_list_entry() {
        let node = TextTranslator::with_translator(fake_translator());
        let out = Invocation::new(&node)
            .with_input("text", Value::Array(vec![Value::string("hello"), Value::string("ignored")]))
            .with_parameter("api_key", Value::string("secret"))
            .run()
            .unwrap();
        assert_eq!(out.string("translated_text"), Some("你好"));
        assert_eq!(out.string("provider_used"), Some("DeepL (Paid)"));
    }

    #[test]
    fn test_translator_reports_failure_in_status() {
        let node = TextTranslator::with_translator(fake_translator());
        let out = Invocation::new(&node)
            .with_input("text", Value::string("hello"))
            .run()
            .unwrap();
        assert_eq!(out.string("translated_text"), Some(""));
        assert!(out.string("status_message").unwrap().starts_with("Error:"));
    }
}
