//! Compositing operators: masked paste, layer blending, outpaint padding
//! and masked-area fill.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::ImageTensor;
use crate::core::types::{Color, PortType, Value};
use crate::filters::builtin::image::crop::MAX_RESOLUTION;
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::compositor::{blend_advance, composite_masked, pad_for_outpaint, BlendMode, BlendOptions, Mirror, PadUnit};
use crate::kernels::geometry::{resize_plane, Sampler};
use crate::kernels::mask::{fill_masked_area, FillMode};

/// Paste `source` onto `destination` at an offset, optionally through a mask.
#[derive(Debug, Clone)]
pub struct ImageCompositeMasked;

impl FilterNode for ImageCompositeMasked {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageCompositeMasked_UTK", "Image Composite Masked (UTK)")
            .category(Category::Image)
            .description("Paste the source image onto the destination at (x, y); the mask is used as alpha")
            .input(PortDefinition::input("destination", PortType::Image))
            .input(PortDefinition::input("source", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(
                ParameterDefinition::new("x", PortType::Integer, Value::Integer(0))
                    .with_range(-MAX_RESOLUTION, MAX_RESOLUTION),
            )
            .parameter(
                ParameterDefinition::new("y", PortType::Integer, Value::Integer(0))
                    .with_range(-MAX_RESOLUTION, MAX_RESOLUTION),
            )
            .parameter(ParameterDefinition::new("resize_source", PortType::Boolean, Value::Boolean(false)))
            .output(PortDefinition::output("image", PortType::Image))
            .tags(["composite", "paste", "mask"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let destination = ctx.get_input_image("destination")?;
        let source = ctx.get_input_image("source")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let out = composite_masked(
            destination,
            source,
            ctx.get_integer("x")?,
            ctx.get_integer("y")?,
            ctx.get_bool("resize_source")?,
            mask,
        )?;
        ctx.set_output_image("image", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Transform a layer, place it on a background and blend it there.
#[derive(Debug, Clone)]
pub struct ImageBlendAdvance;

impl FilterNode for ImageBlendAdvance {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageBlendAdvance_UTK", "Image Blend Advance (UTK)")
            .category(Category::Image)
            .description("Scale, mirror, rotate and position a layer, then blend it over the background")
            .input(PortDefinition::input("layer_image", PortType::Image))
            .input(PortDefinition::input("background_image", PortType::Image).optional())
            .input(PortDefinition::input("layer_mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::new("invert_mask", PortType::Boolean, Value::Boolean(true)))
            .parameter(
                ParameterDefinition::new("blend_mode", PortType::String, Value::string("normal"))
                    .with_ui_hint(crate::core::port::UiHint::Dropdown {
                        options: BlendMode::NAMES.iter().map(|s| s.to_string()).collect(),
                    })
                    .with_description("Unknown modes blend as normal"),
            )
            .parameter(
                ParameterDefinition::new("opacity", PortType::Integer, Value::Integer(100))
                    .with_range(0.0, 100.0),
            )
            .parameter(
                ParameterDefinition::new("x_percent", PortType::Float, Value::Float(50.0))
                    .with_range(-999.0, 999.0),
            )
            .parameter(
                ParameterDefinition::new("y_percent", PortType::Float, Value::Float(50.0))
                    .with_range(-999.0, 999.0),
            )
            .parameter(ParameterDefinition::choice("mirror", &Mirror::NAMES, "None"))
            .parameter(
                ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0))
                    .with_range(0.01, 100.0),
            )
            .parameter(
                ParameterDefinition::new("aspect_ratio", PortType::Float, Value::Float(1.0))
                    .with_range(0.01, 100.0),
            )
            .parameter(
                ParameterDefinition::new("rotate", PortType::Float, Value::Float(0.0))
                    .with_range(-999999.0, 999999.0),
            )
            .parameter(ParameterDefinition::choice("transform_method", &Sampler::PIL_NAMES, "lanczos"))
            .parameter(
                ParameterDefinition::new("anti_aliasing", PortType::Integer, Value::Integer(0))
                    .with_range(0.0, 16.0)
                    .with_description("Accepted for workflow compatibility; rotation resamples with transform_method"),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["blend", "layer", "transform", "composite"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let layer = ctx.get_input_image("layer_image")?;
        let background = ctx.get_input_image_optional("background_image")?;
        let layer_mask = ctx.get_input_mask_optional("layer_mask")?;

        let mode_name = ctx.get_string("blend_mode")?;
        let mode = BlendMode::parse(mode_name).unwrap_or_else(|| {
            log::warn!("Unknown blend mode '{}', using normal", mode_name);
            BlendMode::Normal
        });
        let opts = BlendOptions {
            mode,
            opacity: ctx.get_integer("opacity")? as f32 / 100.0,
            invert_mask: ctx.get_bool("invert_mask")?,
            x_percent: ctx.get_float("x_percent")?,
            y_percent: ctx.get_float("y_percent")?,
            mirror: choice(ctx, "mirror", Mirror::parse)?,
            scale: ctx.get_float("scale")?,
            aspect_ratio: ctx.get_float("aspect_ratio")?,
            rotate: ctx.get_float("rotate")?,
            sampler: choice(ctx, "transform_method", Sampler::parse)?,
        };

        let (image, mask) = blend_advance(background, layer, layer_mask, &opts)?;
        ctx.set_output_image("image", image)?;
        ctx.set_output_mask("mask", mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

const PAD_COLORS: [&str; 9] = ["gray", "white", "black", "red", "green", "blue", "yellow", "cyan", "magenta"];

/// Grow an image for outpainting and emit the feathered inpaint mask.
#[derive(Debug, Clone)]
pub struct ImagePadForOutpaintMasked;

impl FilterNode for ImagePadForOutpaintMasked {
    fn metadata(&self) -> NodeMetadata {
        let side = |name: &str| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(0)).with_range(0.0, 1000.0)
        };
        NodeMetadata::builder("ImagePadForOutpaintMasked_UTK", "Image Pad For Outpaint Masked (UTK)")
            .category(Category::Image)
            .description("Pad an image for outpainting; the mask covers the new area and feathers into the original")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::choice("data_mode", &PadUnit::NAMES, "pixel"))
            .parameter(side("left"))
            .parameter(side("top"))
            .parameter(side("right"))
            .parameter(side("bottom"))
            .parameter(
                ParameterDefinition::new("feathering", PortType::Integer, Value::Integer(0))
                    .with_range(0.0, MAX_RESOLUTION),
            )
            .parameter(ParameterDefinition::choice("background_color", &PAD_COLORS, "gray"))
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["outpaint", "pad", "mask"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let unit = choice(ctx, "data_mode", PadUnit::parse)?;
        let amounts = [
            ctx.get_float("left")?,
            ctx.get_float("top")?,
            ctx.get_float("right")?,
            ctx.get_float("bottom")?,
        ];
        let padding = unit.resolve(amounts, image.width(), image.height());
        let feathering = get_usize(ctx, "feathering")?;
        let background = choice(ctx, "background_color", Color::from_name)?.to_unit_rgb();

        let (image, mask) = pad_for_outpaint(image, mask, padding, feathering, background)?;
        ctx.set_output_image("image", image)?;
        ctx.set_output_mask("mask", mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Replace the masked area with a neutral plate or an inpainted fill.
#[derive(Debug, Clone)]
pub struct FillMaskedArea;

impl FilterNode for FillMaskedArea {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("FillMaskedArea_UTK", "Fill Masked Area (UTK)")
            .category(Category::Image)
            .description("Fill the masked area (neutral gray, Telea or Navier-Stokes) with a feathered edge")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask))
            .parameter(ParameterDefinition::choice("fill_mode", &FillMode::NAMES, "neutral"))
            .parameter(
                ParameterDefinition::new("feathering", PortType::Integer, Value::Integer(0))
                    .with_range(0.0, 100.0),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .tags(["inpaint", "fill", "mask"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask("mask")?;
        let mode = choice(ctx, "fill_mode", FillMode::parse)?;
        let feathering = get_usize(ctx, "feathering")?;
        let (h, w) = (image.height(), image.width());

        let frames = (0..image.batch())
            .map(|i| {
                let plane = mask.frame_clamped(i);
                if plane.dim() == (h, w) {
                    fill_masked_area(image.frame(i), plane, mode, feathering)
                } else {
                    let resized = resize_plane(plane, w, h, Sampler::Bilinear);
                    fill_masked_area(image.frame(i), resized.view(), mode, feathering)
                }
            })
            .collect();
        ctx.set_output_image("image", ImageTensor::from_frames(frames)?)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::MaskTensor;
    use crate::execution::invoke::Invocation;
    use ndarray::Array3;

    #[test]
    fn test_composite_at_offset() {
        let dest = ImageTensor::filled(1, 8, 8, &[0.0, 0.0, 0.0]).unwrap();
        let src = ImageTensor::filled(1, 4, 4, &[1.0, 1.0, 1.0]).unwrap();
        let out = Invocation::new(&ImageCompositeMasked)
            .with_input("destination", Value::Image(dest))
            .with_input("source", Value::Image(src))
            .with_parameter("x", Value::Integer(6))
            .with_parameter("y", Value::Integer(-2))
            .run()
            .unwrap();
        let frame = out.image("image").unwrap().frame(0).to_owned();
        assert_eq!(frame[[0, 6, 0]], 1.0);
        assert_eq!(frame[[1, 7, 0]], 1.0);
        assert_eq!(frame[[2, 6, 0]], 0.0);
        assert_eq!(frame[[0, 5, 0]], 0.0);
    }

    #[test]
    fn test_blend_unknown_mode_falls_back_to_normal() {
        let bg = ImageTensor::filled(1, 16, 16, &[0.0, 0.0, 0.0]).unwrap();
        let layer = ImageTensor::filled(1, 16, 16, &[1.0, 1.0, 1.0]).unwrap();
        let run = |mode: &str| {
            Invocation::new(&ImageBlendAdvance)
                .with_input("layer_image", Value::Image(layer.clone()))
                .with_input("background_image", Value::Image(bg.clone()))
                .with_parameter("blend_mode", Value::string(mode))
                .with_parameter("opacity", Value::Integer(50))
                .run()
                .unwrap()
        };
        let normal = run("normal");
        let unknown = run("vivid_light");
        assert_eq!(normal.image("image").unwrap().array(), unknown.image("image").unwrap().array());
        let center = normal.image("image").unwrap().frame(0)[[8, 8, 0]];
        assert!((center - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_outpaint_percent_padding() {
        let image = ImageTensor::filled(1, 20, 40, &[0.2, 0.4, 0.6]).unwrap();
        let out = Invocation::new(&ImagePadForOutpaintMasked)
            .with_input("image", Value::Image(image))
            .with_parameter("data_mode", Value::string("percent"))
            .with_parameter("left", Value::Integer(25))
            .with_parameter("bottom", Value::Integer(50))
            .with_parameter("background_color", Value::string("white"))
            .run()
            .unwrap();
        let image = out.image("image").unwrap();
        assert_eq!((image.height(), image.width()), (30, 50));
        assert_eq!(image.frame(0)[[0, 0, 0]], 1.0);
        let mask = out.mask("mask").unwrap();
        assert_eq!(mask.frame(0)[[0, 0]], 1.0);
        assert_eq!(mask.frame(0)[[5, 30]], 0.0);
    }

    #[test]
    fn test_fill_neutral_paints_gray() {
        let image = ImageTensor::filled(1, 8, 8, &[1.0, 0.0, 0.0]).unwrap();
        let mask = MaskTensor::new(Array3::from_shape_fn((1, 8, 8), |(_, _, x)| if x < 4 { 1.0 } else { 0.0 })).unwrap();
        let out = Invocation::new(&FillMaskedArea)
            .with_input("image", Value::Image(image))
            .with_input("mask", Value::Mask(mask))
            .run()
            .unwrap();
        let frame = out.image("image").unwrap().frame(0).to_owned();
        assert!((frame[[2, 1, 1]] - 0.5).abs() < 0.01);
        assert_eq!(frame[[2, 6, 0]], 1.0);
        assert!(frame.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
