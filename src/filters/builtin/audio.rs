//! Audio operators: load from a path, or crop and process an audio value.

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, RegistryError};
use crate::core::node::{Category, FilterNode, NodeMetadata, NodeMetadataBuilder};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::tensor::AudioData;
use crate::core::types::{PortType, Value};
use crate::filters::registry::FilterRegistry;
use crate::kernels::audio::{load_audio, process_audio, AudioEdit};

const SOURCE: &str = "audio";

/// Register audio operators.
pub fn register(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry.register(SOURCE, || Box::new(LoadAudioPlusFromPath))?;
    registry.register(SOURCE, || Box::new(AudioCropProcess))?;
    Ok(())
}

// Parameters and outputs shared by both operators.
fn with_edit_schema(builder: NodeMetadataBuilder) -> NodeMetadataBuilder {
    builder
        .category(Category::Audio)
        .parameter(
            ParameterDefinition::new("gain_db", PortType::Float, Value::Float(0.0))
                .with_range(-100.0, 100.0)
                .with_description("Gain in decibels"),
        )
        .parameter(
            ParameterDefinition::new("offset_seconds", PortType::Float, Value::Float(0.0))
                .with_constraint(Constraint::MinValue(0.0)),
        )
        .parameter(
            ParameterDefinition::new("duration_seconds", PortType::Float, Value::Float(0.0))
                .with_constraint(Constraint::MinValue(0.0))
                .with_description("0 keeps everything after the offset"),
        )
        .parameter(
            ParameterDefinition::new("resample_to_hz", PortType::Float, Value::Float(0.0))
                .with_constraint(Constraint::MinValue(0.0))
                .with_description("0 keeps the source rate"),
        )
        .parameter(ParameterDefinition::new("make_stereo", PortType::Boolean, Value::Boolean(true)))
        .output(PortDefinition::output("audio", PortType::Audio))
        .output(PortDefinition::output("sample_rate", PortType::Integer))
        .output(PortDefinition::output("channels", PortType::Integer))
        .output(PortDefinition::output("duration", PortType::Float))
        .tags(["audio"])
}

fn read_edit(ctx: &ExecutionContext) -> Result<AudioEdit, ExecutionError> {
    Ok(AudioEdit::from_params(
        ctx.get_float("gain_db")?,
        ctx.get_float("offset_seconds")?,
        ctx.get_float("duration_seconds")?,
        ctx.get_float("resample_to_hz")?,
        ctx.get_bool("make_stereo")?,
    ))
}

fn emit(ctx: &mut ExecutionContext, audio: AudioData) -> Result<(), ExecutionError> {
    ctx.set_output("sample_rate", Value::Integer(audio.sample_rate as i64))?;
    ctx.set_output("channels", Value::Integer(audio.channels() as i64))?;
    ctx.set_output("duration", Value::Float(audio.duration_secs()))?;
    ctx.set_output("audio", Value::Audio(audio))
}

/// Load an audio file and apply crop, resample, gain and stereo edits.
#[derive(Debug, Clone)]
pub struct LoadAudioPlusFromPath;

impl FilterNode for LoadAudioPlusFromPath {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("LoadAudioPlusFromPath_UTK", "Load Audio Plus From Path (UTK)")
            .description("Load audio from a path; quoted and backslash-separated paths are accepted")
            .parameter(ParameterDefinition::new("path", PortType::String, Value::string("./audio.mp3")));
        // the file may change on disk under the same path
        with_edit_schema(builder).tags(["load", "file"]).non_deterministic().build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let path = ctx.get_string("path")?.to_string();
        let edit = read_edit(ctx)?;
        let audio = load_audio(&path, &edit)?;
        log::info!(
            "Loaded {} ({} Hz, {} channel(s), {:.2}s)",
            path.trim(),
            audio.sample_rate,
            audio.channels(),
            audio.duration_secs()
        );
        emit(ctx, audio)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Same edits as [`LoadAudioPlusFromPath`] applied to an audio value.
#[derive(Debug, Clone)]
pub struct AudioCropProcess;

impl FilterNode for AudioCropProcess {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("AudioCropProcessUTK", "Audio Crop Process (UTK)")
            .description("Crop, resample, amplify and stereo-normalize audio")
            .input(PortDefinition::input("audio", PortType::Audio));
        with_edit_schema(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let edit = read_edit(ctx)?;
        let audio = process_audio(ctx.get_input_audio("audio")?, &edit)?;
        emit(ctx, audio)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
