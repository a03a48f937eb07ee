//! Resizing operators built on the fit policies of the geometry kernel.

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, KernelError};
use crate::core::node::{Category, FilterNode, NodeMetadata, NodeMetadataBuilder};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::{CropBox, ImageTensor, MaskTensor};
use crate::core::types::{Color, PortType, Value};
use crate::filters::builtin::image::crop::MAX_RESOLUTION;
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::bridge::with_channels;
use crate::kernels::geometry::{
    aspect_target, apply_plan_frame, apply_plan_plane, crop_rect_for_aspect, fit_frame, fit_inside, fit_plane,
    floor_to_multiple, resize_frame, resize_plane, round_up_to_multiple, Anchor, Fit, FitPlan, Padding, Sampler,
    ScaleTo,
};

const KEEP_PROPORTION: [&str; 8] = [
    "stretch",
    "resize",
    "pad",
    "pad_edge",
    "pad_edge_pixel",
    "crop",
    "pillarbox_blur",
    "total_pixels",
];

const FIT_MODES: [&str; 3] = ["letterbox", "crop", "fill"];
const MULTIPLES: [&str; 8] = ["8", "16", "32", "64", "128", "256", "512", "None"];
const ASPECT_RATIOS: [&str; 9] = ["original", "custom", "1:1", "3:2", "4:3", "16:9", "2:3", "3:4", "9:16"];
const MIN_RESTORE_SIDE: usize = 4;

fn parse_multiple(name: &str) -> Option<Option<usize>> {
    match name {
        "None" | "none" => Some(None),
        n => n.parse::<usize>().ok().filter(|m| *m > 0).map(Some),
    }
}

/// Placement of a frame for the KJ-style resize: an optional source crop,
/// the resampled content size and the padding around it.
pub fn plan_kj_resize(
    src: (usize, usize),
    target: (usize, usize),
    keep_proportion: &str,
    anchor: Anchor,
    divisible_by: usize,
) -> (Fit, FitPlan) {
    let (src_w, src_h) = (src.0.max(1), src.1.max(1));
    let (width, height) = target;
    let total_pixels = keep_proportion == "total_pixels";
    let fit = if total_pixels { Fit::Resize } else { Fit::parse(keep_proportion).unwrap_or(Fit::Resize) };

    if fit == Fit::Resize || fit.pads() {
        let (w, h) = if total_pixels {
            let pixels = (width * height).max(1) as f64;
            let aspect = src_w as f64 / src_h as f64;
            ((pixels * aspect).sqrt() as usize, (pixels / aspect).sqrt() as usize)
        } else {
            match (width, height) {
                (0, 0) => (src_w, src_h),
                (0, h) => (((src_w * h) as f64 / src_h as f64).round() as usize, h),
                (w, 0) => (w, ((src_h * w) as f64 / src_w as f64).round() as usize),
                (w, h) => fit_inside(src_w, src_h, w, h),
            }
        };
        let mut padding = if fit.pads() {
            Padding::anchored((width.max(w), height.max(h)), (w, h), anchor)
        } else {
            Padding::default()
        };
        let (w, h) = (floor_to_multiple(w, divisible_by).max(1), floor_to_multiple(h, divisible_by).max(1));
        // padding absorbs whatever keeps the canvas off the divisor
        if fit.pads() && !padding.is_zero() && divisible_by > 1 {
            let (pw, ph) = padding.padded_size(w, h);
            padding.right += round_up_to_multiple(pw, divisible_by) - pw;
            padding.bottom += round_up_to_multiple(ph, divisible_by) - ph;
        }
        (fit, FitPlan { source_crop: None, scaled: (w, h), padding })
    } else {
        let w = if width == 0 { src_w } else { width };
        let h = if height == 0 { src_h } else { height };
        let (w, h) = (floor_to_multiple(w, divisible_by).max(1), floor_to_multiple(h, divisible_by).max(1));
        let source_crop = (fit == Fit::Crop).then(|| crop_rect_for_aspect(src_w, src_h, w, h, anchor));
        (fit, FitPlan { source_crop, scaled: (w, h), padding: Padding::default() })
    }
}

/// Resize with keep-proportion policies, divisibility and optional mask.
#[derive(Debug, Clone)]
pub struct ResizeImageVerKJ;

impl FilterNode for ResizeImageVerKJ {
    fn metadata(&self) -> NodeMetadata {
        let side = |name: &str| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(512))
                .with_range(0.0, MAX_RESOLUTION)
                .with_description("0 derives this side from the other")
        };
        NodeMetadata::builder("ResizeImageVerKJ_UTK", "Resize Image ver KJ (UTK)")
            .category(Category::Image)
            .description("Resize with stretch, fit, pad, crop, pillarbox or total-pixel policies")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(side("width"))
            .parameter(side("height"))
            .parameter(ParameterDefinition::choice("upscale_method", &Sampler::UPSCALE_NAMES, "nearest-exact"))
            .parameter(ParameterDefinition::choice("keep_proportion", &KEEP_PROPORTION, "resize"))
            .parameter(
                ParameterDefinition::new("pad_color", PortType::String, Value::string("0, 0, 0"))
                    .with_description("Comma-separated 0-255 components"),
            )
            .parameter(
                ParameterDefinition::new("crop_position", PortType::String, Value::string("center"))
                    .with_description("center, top, bottom, left or right"),
            )
            .parameter(
                ParameterDefinition::new("divisible_by", PortType::Integer, Value::Integer(2)).with_range(0.0, 512.0),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("width", PortType::Integer))
            .output(PortDefinition::output("height", PortType::Integer))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["resize", "scale", "pad", "crop"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let target = (get_usize(ctx, "width")?, get_usize(ctx, "height")?);
        let sampler = choice(ctx, "upscale_method", Sampler::parse)?;
        let keep = ctx.get_string("keep_proportion")?;
        let anchor = Anchor::parse(ctx.get_string("crop_position")?);
        let divisible_by = get_usize(ctx, "divisible_by")?;
        let pad_color = ctx.get_string("pad_color")?;
        let background = Color::from_rgb_list(pad_color)
            .unwrap_or_else(|e| {
                log::warn!("Invalid pad_color '{}' ({}), using black", pad_color, e);
                Color::BLACK
            })
            .to_unit_rgb();

        let (fit, plan) = plan_kj_resize((image.width(), image.height()), target, keep, anchor, divisible_by);
        let fill = fit.pad_fill(&[background[0], background[1], background[2], 0.0]);
        let frames = (0..image.batch())
            .map(|i| apply_plan_frame(image.frame(i), &plan, sampler, &fill))
            .collect();
        let out = ImageTensor::from_frames(frames)?;
        let out_mask = match mask {
            Some(m) => MaskTensor::from_frames(
                (0..m.batch())
                    .map(|i| apply_plan_plane(m.frame(i), &plan, sampler, fit.plane_pad()))
                    .collect(),
            )?,
            None => MaskTensor::zeros(1, 64, 64)?,
        };

        ctx.set_output("width", Value::Integer(out.width() as i64))?;
        ctx.set_output("height", Value::Integer(out.height() as i64))?;
        ctx.set_output_image("image", out)?;
        ctx.set_output_mask("mask", out_mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

// Size of the first present input, image before mask.
fn source_size(image: Option<&ImageTensor>, mask: Option<&MaskTensor>) -> Option<(usize, usize)> {
    image
        .map(|i| (i.width(), i.height()))
        .or_else(|| mask.map(|m| (m.width(), m.height())))
}

/// Fit an image and/or mask batch onto a `tw` × `th` canvas. A missing
/// side is synthesized blank with the batch size of the other.
fn fit_image_and_mask(
    image: Option<&ImageTensor>,
    mask: Option<&MaskTensor>,
    (tw, th): (usize, usize),
    fit: Fit,
    sampler: Sampler,
    background: &[f32],
) -> Result<(ImageTensor, MaskTensor), ExecutionError> {
    let image_out = match image {
        Some(img) => ImageTensor::from_frames(
            (0..img.batch())
                .map(|i| {
                    let rgb = with_channels(img.frame(i), 3);
                    fit_frame(rgb.view(), tw, th, fit, sampler, background, Anchor::Center)
                })
                .collect(),
        )?,
        None => ImageTensor::filled(mask.map_or(1, |m| m.batch()), th, tw, &[0.0, 0.0, 0.0])?,
    };
    let mask_out = match mask {
        Some(m) => MaskTensor::from_frames(
            (0..m.batch())
                .map(|i| fit_plane(m.frame(i), tw, th, fit, sampler, Anchor::Center))
                .collect(),
        )?,
        None => MaskTensor::zeros(image.map_or(1, |i| i.batch()), th, tw)?,
    };
    Ok((image_out, mask_out))
}

fn emit_scaled(
    ctx: &mut ExecutionContext,
    image: ImageTensor,
    mask: MaskTensor,
    original: (usize, usize),
    target: (usize, usize),
) -> Result<(), ExecutionError> {
    ctx.set_output_image("image", image)?;
    ctx.set_output_mask("mask", mask)?;
    ctx.set_output("original_size", Value::Box(CropBox::new(0, 0, original.0 as u32, original.1 as u32)))?;
    ctx.set_output("width", Value::Integer(target.0 as i64))?;
    ctx.set_output("height", Value::Integer(target.1 as i64))
}

fn scaled_outputs(builder: NodeMetadataBuilder) -> NodeMetadataBuilder {
    builder
        .output(PortDefinition::output("image", PortType::Image))
        .output(PortDefinition::output("mask", PortType::Mask))
        .output(PortDefinition::output("original_size", PortType::Box).with_description("Box whose size is the input size"))
        .output(PortDefinition::output("width", PortType::Integer))
        .output(PortDefinition::output("height", PortType::Integer))
}

fn parse_ratio(name: &str, original: (usize, usize), custom: (i64, i64)) -> Option<f64> {
    match name {
        "original" => Some(original.0 as f64 / original.1.max(1) as f64),
        "custom" => Some(custom.0.max(1) as f64 / custom.1.max(1) as f64),
        other => {
            let (w, h) = other.split_once(':')?;
            let (w, h) = (w.trim().parse::<f64>().ok()?, h.trim().parse::<f64>().ok()?);
            (w > 0.0 && h > 0.0).then_some(w / h)
        }
    }
}

/// Scale to an aspect ratio with letterbox, crop or fill.
#[derive(Debug, Clone)]
pub struct ImageScaleByAspectRatio;

impl FilterNode for ImageScaleByAspectRatio {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("ImageScaleByAspectRatio_UTK", "Image Scale By Aspect Ratio (UTK)")
            .category(Category::Image)
            .description("Scale an image and/or mask to an aspect ratio, sized by one side or total pixels")
            .input(PortDefinition::input("image", PortType::Image).optional())
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::choice("aspect_ratio", &ASPECT_RATIOS, "original"))
            .parameter(
                ParameterDefinition::new("proportional_width", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 1e8),
            )
            .parameter(
                ParameterDefinition::new("proportional_height", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 1e8),
            )
            .parameter(ParameterDefinition::choice("fit", &FIT_MODES, "letterbox"))
            .parameter(ParameterDefinition::choice("method", &Sampler::PIL_NAMES, "lanczos"))
            .parameter(ParameterDefinition::choice("round_to_multiple", &MULTIPLES, "8"))
            .parameter(ParameterDefinition::choice("scale_to_side", &ScaleTo::NAMES, "None"))
            .parameter(
                ParameterDefinition::new("scale_to_length", PortType::Integer, Value::Integer(1024))
                    .with_range(4.0, 1e8),
            )
            .parameter(ParameterDefinition::new("background_color", PortType::String, Value::string("#000000")))
            .tags(["resize", "aspect", "letterbox"]);
        scaled_outputs(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image_optional("image")?;
        let mask = ctx
            .get_input_mask_optional("mask")?
            .filter(|m| {
                let placeholder = m.height() == 64 && m.width() == 64 && m.array().iter().all(|v| *v == 0.0);
                if placeholder {
                    log::warn!("Input mask is an empty placeholder, ignoring it");
                }
                !placeholder
            });
        if let (Some(i), Some(m)) = (image, mask) {
            if (i.width(), i.height()) != (m.width(), m.height()) {
                return Err(KernelError::shape_mismatch(
                    "image and mask",
                    &[i.height(), i.width()],
                    &[m.height(), m.width()],
                )
                .into());
            }
        }
        let original = source_size(image, mask).ok_or_else(|| ctx.fail("An image or a mask is required"))?;

        let name = ctx.get_string("aspect_ratio")?;
        let custom = (ctx.get_integer("proportional_width")?, ctx.get_integer("proportional_height")?);
        let ratio = parse_ratio(name, original, custom).ok_or_else(|| ctx.fail(format!("Invalid aspect ratio '{}'", name)))?;
        let scale_to = choice(ctx, "scale_to_side", ScaleTo::parse)?;
        let multiple = choice(ctx, "round_to_multiple", parse_multiple)?;
        let length = get_usize(ctx, "scale_to_length")?;
        let (tw, th) = aspect_target(original.0, original.1, ratio, scale_to, length, multiple);
        let target = (tw.max(1), th.max(1));

        let fit = choice(ctx, "fit", Fit::parse)?;
        let sampler = choice(ctx, "method", Sampler::parse)?;
        let hex = ctx.get_string("background_color")?;
        let background = Color::from_hex(hex)
            .map_err(|e| ctx.fail(format!("Invalid background_color '{}': {}", hex, e)))?
            .to_unit_rgb();

        let (image_out, mask_out) = fit_image_and_mask(image, mask, target, fit, sampler, &background)?;
        log::info!("Scaled {} frame(s) to {}x{}", image_out.batch().max(mask_out.batch()), target.0, target.1);
        emit_scaled(ctx, image_out, mask_out, original, target)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Scale by a factor or to a side length, or restore a recorded size.
#[derive(Debug, Clone)]
pub struct ImageScaleRestore;

impl FilterNode for ImageScaleRestore {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("ImageScaleRestore_UTK", "Image Scale Restore (UTK)")
            .category(Category::Image)
            .description("Scale images, or restore them to original_size when it is connected")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .input(PortDefinition::input("original_size", PortType::Box).optional())
            .parameter(
                ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0))
                    .with_range(0.01, 100.0)
                    .with_step(0.01),
            )
            .parameter(ParameterDefinition::choice("method", &Sampler::PIL_NAMES, "lanczos"))
            .parameter(ParameterDefinition::choice("scale_to_side", &ScaleTo::NAMES, "None"))
            .parameter(
                ParameterDefinition::new("scale_to_length", PortType::Integer, Value::Integer(1024))
                    .with_range(4.0, 1e8),
            )
            .parameter(ParameterDefinition::choice("round_to_multiple", &MULTIPLES, "8"))
            .tags(["resize", "restore"]);
        scaled_outputs(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let restore = ctx.input_optional("original_size").and_then(Value::as_box);
        let sampler = choice(ctx, "method", Sampler::parse)?;
        let original = (image.width(), image.height());

        let (tw, th) = match restore {
            Some(b) => (b.width() as usize, b.height() as usize),
            None => {
                let multiple = choice(ctx, "round_to_multiple", parse_multiple)?;
                match choice(ctx, "scale_to_side", ScaleTo::parse)? {
                    ScaleTo::None => {
                        let scale = ctx.get_float("scale")?;
                        let w = (original.0 as f64 * scale) as usize;
                        let h = (original.1 as f64 * scale) as usize;
                        let m = multiple.unwrap_or(1);
                        (round_up_to_multiple(w, m), round_up_to_multiple(h, m))
                    }
                    side => {
                        let ratio = original.0 as f64 / original.1.max(1) as f64;
                        aspect_target(original.0, original.1, ratio, side, get_usize(ctx, "scale_to_length")?, multiple)
                    }
                }
            }
        };
        let target = (tw.max(MIN_RESTORE_SIDE), th.max(MIN_RESTORE_SIDE));

        let batch = image.batch().max(mask.map_or(0, |m| m.batch()));
        let frames = (0..batch)
            .map(|i| resize_frame(with_channels(image.frame_clamped(i), 3).view(), target.0, target.1, sampler))
            .collect();
        let image_out = ImageTensor::from_frames(frames)?;
        let mask_out = match mask {
            Some(m) => MaskTensor::from_frames(
                (0..batch)
                    .map(|i| resize_plane(m.frame_clamped(i), target.0, target.1, sampler))
                    .collect(),
            )?,
            None => MaskTensor::filled(batch, target.1, target.0, 1.0)?,
        };
        emit_scaled(ctx, image_out, mask_out, original, target)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Fit an image and/or mask to the size of a reference image.
#[derive(Debug, Clone)]
pub struct ImageMaskScaleAs;

impl FilterNode for ImageMaskScaleAs {
    fn metadata(&self) -> NodeMetadata {
        let builder = NodeMetadata::builder("ImageMaskScaleAs_UTK", "Image Mask Scale As (UTK)")
            .category(Category::Image)
            .description("Scale an image and/or mask to the size of scale_as")
            .input(PortDefinition::input("scale_as", PortType::Image))
            .input(PortDefinition::input("image", PortType::Image).optional())
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::choice("fit", &FIT_MODES, "letterbox"))
            .parameter(ParameterDefinition::choice("method", &Sampler::PIL_NAMES, "lanczos"))
            .tags(["resize", "match"]);
        scaled_outputs(builder).build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let reference = ctx.get_input_image("scale_as")?;
        let image = ctx.get_input_image_optional("image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        // the mask wins when both are connected
        let original = mask
            .map(|m| (m.width(), m.height()))
            .or_else(|| image.map(|i| (i.width(), i.height())))
            .ok_or_else(|| ctx.fail("An image or a mask is required"))?;
        let target = (reference.width(), reference.height());
        let fit = choice(ctx, "fit", Fit::parse)?;
        let sampler = choice(ctx, "method", Sampler::parse)?;

        let (image_out, mask_out) = fit_image_and_mask(image, mask, target, fit, sampler, &[0.0, 0.0, 0.0])?;
        emit_scaled(ctx, image_out, mask_out, original, target)
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
    fn test_kj_plan_resize_keeps_aspect() {
        let (fit, plan) = plan_kj_resize((1000, 500), (512, 512), "resize", Anchor::Center, 2);
        assert_eq!(fit, Fit::Resize);
        assert_eq!(plan.scaled, (512, 256));
        assert!(plan.padding.is_zero());
    }

    #[test]
    fn test_kj_plan_pad_is_divisible() {
        let (_, plan) = plan_kj_resize((1000, 500), (512, 300), "pad", Anchor::Center, 16);
        let (w, h) = plan.canvas();
        assert_eq!(w % 16, 0);
        assert_eq!(h % 16, 0);
        assert!(w >= 512 && h >= 300);
    }

    #[test]
    fn test_kj_plan_zero_side_follows_other() {
        let (_, plan) = plan_kj_resize((800, 400), (0, 200), "resize", Anchor::Center, 0);
        assert_eq!(plan.scaled, (400, 200));
        let (_, plan) = plan_kj_resize((800, 400), (0, 0), "stretch", Anchor::Center, 0);
        assert_eq!(plan.scaled, (800, 400));
    }

    #[test]
    fn test_kj_plan_total_pixels() {
        let (_, plan) = plan_kj_resize((1600, 900), (1024, 1024), "total_pixels", Anchor::Center, 0);
        let (w, h) = plan.scaled;
        let pixels = (w * h) as f64;
        assert!((pixels / (1024.0 * 1024.0) - 1.0).abs() < 0.01);
        assert!((w as f64 / h as f64 - 16.0 / 9.0).abs() < 0.01);
    }

    #[test]
    fn test_kj_crop_node() {
        let image = ImageTensor::filled(2, 100, 200, &[0.3, 0.3, 0.3]).unwrap();
        let out = Invocation::new(&ResizeImageVerKJ)
            .with_input("image", Value::Image(image))
            .with_parameter("width", Value::Integer(64))
            .with_parameter("height", Value::Integer(64))
            .with_parameter("keep_proportion", Value::string("crop"))
            .run()
            .unwrap();
        assert_eq!(out.image("image").unwrap().shape(), vec![2, 64, 64, 3]);
        assert_eq!(out.integer("width"), Some(64));
        assert_eq!(out.mask("mask").unwrap().shape(), vec![1, 64, 64]);
    }

    #[test]
    fn test_kj_pad_uses_pad_color() {
        let image = ImageTensor::filled(1, 50, 100, &[0.0, 0.0, 0.0]).unwrap();
        let out = Invocation::new(&ResizeImageVerKJ)
            .with_input("image", Value::Image(image))
            .with_parameter("width", Value::Integer(100))
            .with_parameter("height", Value::Integer(100))
            .with_parameter("keep_proportion", Value::string("pad"))
            .with_parameter("pad_color", Value::string("255, 0, 0"))
            .run()
            .unwrap();
        let image = out.image("image").unwrap();
        assert_eq!((image.height(), image.width()), (100, 100));
        assert_eq!(image.frame(0)[[0, 50, 0]], 1.0);
        assert_eq!(image.frame(0)[[50, 50, 0]], 0.0);
    }

    #[test]
    fn test_scale_by_aspect_ratio_letterbox() {
        let image = ImageTensor::filled(1, 300, 300, &[1.0, 1.0, 1.0]).unwrap();
        let out = Invocation::new(&ImageScaleByAspectRatio)
            .with_input("image", Value::Image(image))
            .with_parameter("aspect_ratio", Value::string("16:9"))
            .with_parameter("scale_to_side", Value::string("width"))
            .with_parameter("scale_to_length", Value::Integer(640))
            .with_parameter("background_color", Value::string("#FF0000"))
            .run()
            .unwrap();
        assert_eq!(out.integer("width"), Some(640));
        assert_eq!(out.integer("height"), Some(360));
        let image = out.image("image").unwrap();
        assert_eq!(image.frame(0)[[180, 5, 1]], 0.0);
        assert_eq!(image.frame(0)[[180, 5, 0]], 1.0);
        let original = out.get("original_size").and_then(Value::as_box).unwrap();
        assert_eq!((original.width(), original.height()), (300, 300));
    }

    #[test]
    fn test_scale_by_aspect_ratio_requires_input() {
        let err = Invocation::new(&ImageScaleByAspectRatio).run().unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_scale_restore_round_trip() {
        let image = ImageTensor::filled(1, 30, 50, &[0.5, 0.5, 0.5]).unwrap();
        let down = Invocation::new(&ImageScaleRestore)
            .with_input("image", Value::Image(image))
            .with_parameter("scale", Value::Float(0.5))
            .with_parameter("round_to_multiple", Value::string("None"))
            .run()
            .unwrap();
        assert_eq!((down.integer("width"), down.integer("height")), (Some(25), Some(15)));

        let restored = Invocation::new(&ImageScaleRestore)
            .with_input("image", down.get("image").cloned().unwrap())
            .with_input("original_size", down.get("original_size").cloned().unwrap())
            .run()
            .unwrap();
        assert_eq!(restored.image("image").unwrap().shape(), vec![1, 30, 50, 3]);
        assert!(restored.mask("mask").unwrap().array().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_scale_restore_minimum_side() {
        let image = ImageTensor::filled(1, 6, 6, &[0.5, 0.5, 0.5]).unwrap();
        let out = Invocation::new(&ImageScaleRestore)
            .with_input("image", Value::Image(image))
            .with_parameter("scale", Value::Float(0.1))
            .with_parameter("round_to_multiple", Value::string("None"))
            .run()
            .unwrap();
        assert_eq!((out.integer("width"), out.integer("height")), (Some(4), Some(4)));
    }

    #[test]
    fn test_mask_scale_as_reference() {
        let reference = ImageTensor::filled(1, 40, 80, &[0.0, 0.0, 0.0]).unwrap();
        let mask = MaskTensor::filled(2, 10, 10, 1.0).unwrap();
        let out = Invocation::new(&ImageMaskScaleAs)
            .with_input("scale_as", Value::Image(reference))
            .with_input("mask", Value::Mask(mask))
            .with_parameter("fit", Value::string("fill"))
            .run()
            .unwrap();
        assert_eq!(out.mask("mask").unwrap().shape(), vec![2, 40, 80]);
        assert_eq!(out.image("image").unwrap().shape(), vec![2, 40, 80, 3]);
        let original = out.get("original_size").and_then(Value::as_box).unwrap();
        assert_eq!((original.width(), original.height()), (10, 10));
    }
}
