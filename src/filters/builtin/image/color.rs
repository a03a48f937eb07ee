//! Color operators: hue imitation, statistical color matching, depth blur
//! and film grain.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::{ImageTensor, MaskTensor};
use crate::core::types::{PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::bridge::with_channels;
use crate::kernels::color::{
    add_grain, color_match_batch, depth_blur, imitation_hue, DepthBlurParams, GrainParams, MatchMethod,
    TransferOptions,
};

fn unit_slider(name: &str, default: f64, min: f64) -> ParameterDefinition {
    ParameterDefinition::new(name, PortType::Float, Value::Float(default))
        .with_range(min, 1.0)
        .with_step(0.1)
}

/// Borrow the color mood of one image and apply it to another.
#[derive(Debug, Clone)]
pub struct ImitationHueNode;

impl FilterNode for ImitationHueNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImitationHueNode_UTK", "Imitation Hue Node (UTK)")
            .category(Category::Image)
            .description("Color transfer between images with skin protection and optional auto adjustments")
            .input(PortDefinition::input("imitation_image", PortType::Image))
            .input(PortDefinition::input("target_image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(unit_slider("strength", 1.0, 0.1))
            .parameter(unit_slider("skin_protection", 0.2, 0.0))
            .parameter(ParameterDefinition::new("auto_brightness", PortType::Boolean, Value::Boolean(true)))
            .parameter(unit_slider("brightness_range", 0.5, 0.1))
            .parameter(ParameterDefinition::new("auto_contrast", PortType::Boolean, Value::Boolean(false)))
            .parameter(unit_slider("contrast_range", 0.5, 0.1))
            .parameter(ParameterDefinition::new("auto_saturation", PortType::Boolean, Value::Boolean(false)))
            .parameter(unit_slider("saturation_range", 0.5, 0.1))
            .parameter(ParameterDefinition::new("auto_tone", PortType::Boolean, Value::Boolean(false)))
            .parameter(unit_slider("tone_strength", 0.5, 0.1))
            .output(PortDefinition::output("image", PortType::Image))
            .tags(["color", "transfer", "lab"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let source = ctx.get_input_image("imitation_image")?;
        let target = ctx.get_input_image("target_image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let opts = TransferOptions {
            strength: ctx.get_float("strength")? as f32,
            skin_protection: ctx.get_float("skin_protection")? as f32,
            auto_brightness: ctx.get_bool("auto_brightness")?,
            brightness_range: ctx.get_float("brightness_range")? as f32,
            auto_contrast: ctx.get_bool("auto_contrast")?,
            contrast_range: ctx.get_float("contrast_range")? as f32,
            auto_saturation: ctx.get_bool("auto_saturation")?,
            saturation_range: ctx.get_float("saturation_range")? as f32,
            auto_tone: ctx.get_bool("auto_tone")?,
            tone_strength: ctx.get_float("tone_strength")? as f32,
        };

        let frames = (0..target.batch())
            .map(|i| {
                let src = with_channels(source.frame_clamped(i), 3);
                let tgt = with_channels(target.frame(i), 3);
                imitation_hue(src.view(), tgt.view(), mask.map(|m| m.frame_clamped(i)), &opts)
            })
            .collect();
        ctx.set_output_image("image", ImageTensor::from_frames(frames)?)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Match the color distribution of a batch to a reference image.
#[derive(Debug, Clone)]
pub struct ColorMatch;

impl FilterNode for ColorMatch {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ColorMatch_UTK", "Color Match (UTK)")
            .category(Category::Image)
            .description("Transfer the color distribution of the reference onto the target images")
            .input(PortDefinition::input("image_target", PortType::Image).with_description("Images to recolor"))
            .input(PortDefinition::input("image_ref", PortType::Image).with_description("Reference colors"))
            .parameter(ParameterDefinition::choice("method", &MatchMethod::NAMES, "mkl"))
            .parameter(
                ParameterDefinition::new("strength", PortType::Float, Value::Float(1.0))
                    .with_range(0.0, 10.0)
                    .with_step(0.01)
                    .optional(),
            )
            .parameter(ParameterDefinition::new("multithread", PortType::Boolean, Value::Boolean(true)).optional())
            .output(PortDefinition::output("image", PortType::Image))
            .tags(["color", "match", "histogram"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let target = ctx.get_input_image("image_target")?;
        let reference = ctx.get_input_image("image_ref")?;
        let method = choice(ctx, "method", MatchMethod::parse)?;
        let strength = ctx.get_float("strength")? as f32;
        let multithread = ctx.get_bool("multithread")?;

        let out = color_match_batch(target, reference, &method, strength, multithread)?;
        ctx.set_output_image("image", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Blur an image away from a focal plane given by a depth map.
#[derive(Debug, Clone)]
pub struct DepthMapBlur;

impl FilterNode for DepthMapBlur {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("DepthMapBlur_UTK", "Depth Map Blur (UTK)")
            .category(Category::Image)
            .description("Depth-of-field blur: pixels far from the focal depth blend toward a blurred copy")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("depth_map", PortType::Image))
            .parameter(
                ParameterDefinition::new("blur_strength", PortType::Float, Value::Float(64.0))
                    .with_range(0.0, 256.0)
                    .with_step(1.0),
            )
            .parameter(
                ParameterDefinition::new("focal_depth", PortType::Float, Value::Float(1.0))
                    .with_range(0.0, 1.0)
                    .with_step(0.01),
            )
            .parameter(
                ParameterDefinition::new("focus_spread", PortType::Float, Value::Float(1.0))
                    .with_range(1.0, 8.0)
                    .with_step(0.1),
            )
            .parameter(
                ParameterDefinition::new("steps", PortType::Integer, Value::Integer(5))
                    .with_range(1.0, 32.0)
                    .with_description("Every step blurs the same frame, so the result does not depend on it"),
            )
            .parameter(
                ParameterDefinition::new("focal_range", PortType::Float, Value::Float(0.0))
                    .with_range(0.0, 1.0)
                    .with_step(0.01),
            )
            .parameter(
                ParameterDefinition::new("mask_blur", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 127.0)
                    .with_step(2.0),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["blur", "depth", "bokeh"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let depth = ctx.get_input_image("depth_map")?;
        let params = DepthBlurParams {
            blur_strength: ctx.get_float("blur_strength")? as f32,
            focal_depth: ctx.get_float("focal_depth")? as f32,
            focus_spread: ctx.get_float("focus_spread")? as f32,
            focal_range: ctx.get_float("focal_range")? as f32,
            mask_blur: get_usize(ctx, "mask_blur")?,
        };

        let (frames, weights): (Vec<_>, Vec<_>) = (0..image.batch())
            .map(|i| depth_blur(image.frame(i), depth.frame_clamped(i), &params))
            .unzip();
        ctx.set_output_image("image", ImageTensor::from_frames(frames)?)?;
        ctx.set_output_mask("mask", MaskTensor::from_frames(weights)?)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Seeded film grain.
#[derive(Debug, Clone)]
pub struct AddGrain;

impl FilterNode for AddGrain {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("AddGrain_UTK", "Add Grain (UTK)")
            .category(Category::Image)
            .description("Add Gaussian film grain; the same seed gives the same grain")
            .input(PortDefinition::input("image", PortType::Image))
            .parameter(
                ParameterDefinition::new("power", PortType::Float, Value::Float(0.25))
                    .with_range(0.0, 1.0)
                    .with_step(0.01),
            )
            .parameter(
                ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0))
                    .with_range(0.1, 10.0)
                    .with_step(0.1)
                    .with_description("Grain size in pixels"),
            )
            .parameter(
                ParameterDefinition::new("saturation", PortType::Float, Value::Float(0.5))
                    .with_range(0.0, 1.0)
                    .with_step(0.01),
            )
            .parameter(
                ParameterDefinition::new("toe", PortType::Float, Value::Float(0.0))
                    .with_range(-0.2, 0.5)
                    .with_step(0.001),
            )
            .parameter(
                ParameterDefinition::new("seed", PortType::Integer, Value::Integer(0))
                    .with_range(0.0, u32::MAX as f64),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .tags(["grain", "noise", "film"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let base = GrainParams {
            power: ctx.get_float("power")? as f32,
            scale: ctx.get_float("scale")? as f32,
            saturation: ctx.get_float("saturation")? as f32,
            toe: ctx.get_float("toe")? as f32,
            seed: ctx.get_integer("seed")? as u64,
        };
        // each frame gets its own grain, still reproducible from the seed
        let frames = (0..image.batch())
            .map(|i| {
                let params = GrainParams { seed: base.seed.wrapping_add(i as u64), ..base.clone() };
                add_grain(image.frame(i), &params)
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
    use crate::execution::invoke::Invocation;
    use ndarray::Array4;

    fn gradient(batch: usize, h: usize, w: usize) -> ImageTensor {
        ImageTensor::new(Array4::from_shape_fn((batch, h, w, 3), |(b, y, x, c)| {
            ((x + y + c + b) as f32 / (h + w + 3) as f32).min(1.0)
        }))
        .unwrap()
    }

    #[test]
    fn test_imitation_hue_keeps_target_size() {
        let source = ImageTensor::filled(1, 8, 8, &[0.8, 0.3, 0.2]).unwrap();
        let out = Invocation::new(&ImitationHueNode)
            .with_input("imitation_image", Value::Image(source))
            .with_input("target_image", Value::Image(gradient(2, 12, 10)))
            .run()
            .unwrap();
        let image = out.image("image").unwrap();
        assert_eq!(image.shape(), vec![2, 12, 10, 3]);
        let (lo, hi) = image.value_range();
        assert!(lo >= 0.0 && hi <= 1.0);
    }

    #[test]
    fn test_color_match_zero_strength_is_identity() {
        let target = gradient(2, 6, 6);
        let reference = ImageTensor::filled(1, 6, 6, &[0.9, 0.1, 0.1]).unwrap();
        let out = Invocation::new(&ColorMatch)
            .with_input("image_target", Value::Image(target.clone()))
            .with_input("image_ref", Value::Image(reference))
            .with_parameter("method", Value::string("reinhard"))
            .with_parameter("strength", Value::Float(0.0))
            .run()
            .unwrap();
        let image = out.image("image").unwrap();
        for (a, b) in image.array().iter().zip(target.array().iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_color_match_rejects_unknown_method() {
        let err = Invocation::new(&ColorMatch)
            .with_input("image_target", Value::Image(gradient(1, 4, 4)))
            .with_input("image_ref", Value::Image(gradient(1, 4, 4)))
            .with_parameter("method", Value::string("lut"))
            .run()
            .unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_depth_blur_in_focus_is_unchanged() {
        let image = gradient(1, 16, 16);
        // depth equals the focal depth everywhere
        let depth = ImageTensor::filled(1, 16, 16, &[1.0, 1.0, 1.0]).unwrap();
        let out = Invocation::new(&DepthMapBlur)
            .with_input("image", Value::Image(image.clone()))
            .with_input("depth_map", Value::Image(depth))
            .run()
            .unwrap();
        let mask = out.mask("mask").unwrap();
        assert!(mask.array().iter().all(|v| v.abs() < 1e-6));
        for (a, b) in out.image("image").unwrap().array().iter().zip(image.array().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_grain_is_seeded() {
        let image = ImageTensor::filled(1, 16, 16, &[0.5, 0.5, 0.5]).unwrap();
        let run = |seed: i64| {
            Invocation::new(&AddGrain)
                .with_input("image", Value::Image(image.clone()))
                .with_parameter("seed", Value::Integer(seed))
                .run()
                .unwrap()
                .image("image")
                .unwrap()
                .array()
                .clone()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }
}
