//! Sequence operators: overlap extension and image concatenation.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata, NodeMetadataBuilder};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::sequence::{
    concatenate_multi, concatenate_pair, extend_with_overlap, Background, ConcatOptions, Direction, Grid, OverlapMode,
    OverlapSide,
};

/// Join two frame sequences with a transition over the overlapping frames.
#[derive(Debug, Clone)]
pub struct ImageBatchExtendWithOverlap;

impl FilterNode for ImageBatchExtendWithOverlap {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageBatchExtendWithOverlap_UTK", "Image Batch Extend With Overlap (UTK)")
            .category(Category::Image)
            .description("Extend a frame sequence with new frames, blending across the overlap")
            .input(PortDefinition::input("source_images", PortType::Image).with_description("The frames to extend"))
            .input(PortDefinition::input("new_images", PortType::Image).optional())
            .parameter(
                ParameterDefinition::new("overlap", PortType::Integer, Value::Integer(13))
                    .with_range(1.0, 4096.0)
                    .with_description("Number of frames shared by both sequences"),
            )
            .parameter(ParameterDefinition::choice("overlap_side", &OverlapSide::NAMES, "source"))
            .parameter(ParameterDefinition::choice("overlap_mode", &OverlapMode::NAMES, "linear_blend"))
            .output(PortDefinition::output("source_images", PortType::Image))
            .output(PortDefinition::output("start_images", PortType::Image))
            .output(PortDefinition::output("extended_images", PortType::Image))
            .tags(["video", "batch", "crossfade"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let source = ctx.get_input_image("source_images")?;
        let new_images = ctx.get_input_image_optional("new_images")?;
        let overlap = get_usize(ctx, "overlap")?;
        let side = choice(ctx, "overlap_side", OverlapSide::parse)?;
        let mode = choice(ctx, "overlap_mode", OverlapMode::parse)?;

        let ext = extend_with_overlap(source, new_images, overlap, side, mode)?;
        log::debug!("Extended {} frame(s) to {}", source.batch(), ext.extended.batch());
        ctx.set_output_image("source_images", ext.source)?;
        ctx.set_output_image("start_images", ext.start)?;
        ctx.set_output_image("extended_images", ext.extended)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

fn with_concat_schema(builder: NodeMetadataBuilder) -> NodeMetadataBuilder {
    builder
        .category(Category::Image)
        .parameter(ParameterDefinition::choice("direction", &Direction::NAMES, "auto"))
        .parameter(ParameterDefinition::new("match_image_size", PortType::Boolean, Value::Boolean(true)))
        .parameter(
            ParameterDefinition::new("max_size", PortType::Integer, Value::Integer(4096))
                .with_range(64.0, 8192.0)
                .with_step(64.0),
        )
        .parameter(ParameterDefinition::choice("background_color", &Background::NAMES, "black"))
        .parameter(
            ParameterDefinition::new("gap", PortType::Integer, Value::Integer(0))
                .with_range(0.0, 1024.0)
                .optional()
                .with_description("Pixels between neighbouring images"),
        )
        .output(PortDefinition::output("image", PortType::Image))
        .tags(["concatenate", "layout"])
}

fn read_concat_options(ctx: &ExecutionContext) -> Result<ConcatOptions, ExecutionError> {
    Ok(ConcatOptions {
        direction: choice(ctx, "direction", Direction::parse)?,
        match_size: ctx.get_bool("match_image_size")?,
        max_size: get_usize(ctx, "max_size")?,
        gap: get_usize(ctx, "gap")?,
        background: choice(ctx, "background_color", Background::parse)?,
    })
}

/// Place two images next to each other.
#[derive(Debug, Clone)]
pub struct ImageConcatenate;

impl FilterNode for ImageConcatenate {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("ImageConcatenate_UTK", "Image Concatenate")
            .description("Concatenate two images; shorter batches repeat their last frame")
            .input(PortDefinition::input("image1", PortType::Image))
            .input(PortDefinition::input("image2", PortType::Image));
        with_concat_schema(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let first = ctx.get_input_image("image1")?;
        let second = ctx.get_input_image("image2")?;
        let opts = read_concat_options(ctx)?;
        let out = concatenate_pair(first, second, &opts)?;
        ctx.set_output_image("image", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Lay every frame of a batch out in a row, column or square grid.
#[derive(Debug, Clone)]
pub struct ImageConcatenateMulti;

impl FilterNode for ImageConcatenateMulti {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("ImageConcatenateMulti_UTK", "Image Concatenate Multi (UTK)")
            .description("Concatenate all images of a batch into one image")
            .input(PortDefinition::input("images", PortType::Image))
            .parameter(ParameterDefinition::choice("grid_size", &Grid::NAMES, "auto"));
        with_concat_schema(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let images = ctx.get_input_image("images")?;
        let grid = choice(ctx, "grid_size", Grid::parse)?;
        let opts = read_concat_options(ctx)?;
        let out = concatenate_multi(images, grid, &opts)?;
        ctx.set_output_image("image", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
