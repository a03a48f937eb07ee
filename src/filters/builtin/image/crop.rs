//! Mask-driven cropping and paste-back.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::BBoxes;
use crate::core::types::{PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::compositor::{
    crop_by_mask, crop_by_mask_and_resize, paste_back, parse_unified_policy, UnifiedCrop, UNIFIED_POLICIES,
};
use crate::kernels::geometry::{BoxDetect, Sampler};

/// Largest side accepted by resolution parameters.
pub const MAX_RESOLUTION: f64 = 16384.0;

/// Detected sizes are rounded up to this before reserves apply.
const CROP_MULTIPLE: usize = 8;

/// Crop an image batch to the box its mask selects.
#[derive(Debug, Clone)]
pub struct CropByMask;

impl FilterNode for CropByMask {
    fn metadata(&self) -> NodeMetadata {
        let reserve = |name: &str| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(20))
                .with_range(-9999.0, 9999.0)
                .with_description("Pixels added on this side of the detected box")
        };
        NodeMetadata::builder("CropByMask_UTK", "Crop By Mask (UTK)")
            .category(Category::Image)
            .description("Crop to the mask's bounding box plus per-side reserves")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask_for_crop", PortType::Mask))
            .parameter(ParameterDefinition::new("invert_mask", PortType::Boolean, Value::Boolean(false)))
            .parameter(ParameterDefinition::choice("detect", &BoxDetect::NAMES, BoxDetect::NAMES[0]))
            .parameter(reserve("top_reserve"))
            .parameter(reserve("bottom_reserve"))
            .parameter(reserve("left_reserve"))
            .parameter(reserve("right_reserve"))
            .output(PortDefinition::output("croped_image", PortType::Image))
            .output(PortDefinition::output("croped_mask", PortType::Mask))
            .output(PortDefinition::output("crop_box", PortType::Box))
            .output(PortDefinition::output("box_preview", PortType::Image))
            .tags(["crop", "mask", "box"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask("mask_for_crop")?;
        if mask.batch() > image.batch() {
            log::warn!("More masks than images, using the first {}", image.batch());
        }
        let invert = ctx.get_bool("invert_mask")?;
        let detect = choice(ctx, "detect", BoxDetect::parse)?;
        let reserve = [
            ctx.get_integer("top_reserve")?,
            ctx.get_integer("bottom_reserve")?,
            ctx.get_integer("left_reserve")?,
            ctx.get_integer("right_reserve")?,
        ];

        let crop = crop_by_mask(image, mask, invert, detect, reserve, CROP_MULTIPLE)?;
        ctx.set_output_image("croped_image", crop.images)?;
        ctx.set_output_mask("croped_mask", crop.masks)?;
        ctx.set_output("crop_box", Value::Box(crop.crop_box))?;
        ctx.set_output_image("box_preview", crop.preview)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Crop a batch around its masks to one shared, 16-aligned size.
#[derive(Debug, Clone)]
pub struct ImageCropByMaskAndResize;

impl FilterNode for ImageCropByMaskAndResize {
    fn metadata(&self) -> NodeMetadata {
        let policies: Vec<&str> = UNIFIED_POLICIES.iter().map(|(n, _)| *n).collect();
        NodeMetadata::builder("ImageCropByMaskAndResize_UTK", "Image Crop By Mask And Resize (UTK)")
            .category(Category::Image)
            .description("Crop every image around its mask and resize all crops to one size divisible by 16")
            .input(PortDefinition::input("image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask))
            .parameter(
                ParameterDefinition::new("base_resolution", PortType::Integer, Value::Integer(512))
                    .with_range(64.0, MAX_RESOLUTION)
                    .with_step(16.0),
            )
            .parameter(
                ParameterDefinition::new("padding", PortType::Integer, Value::Integer(0))
                    .with_range(0.0, MAX_RESOLUTION),
            )
            .parameter(
                ParameterDefinition::new("min_crop_resolution", PortType::Integer, Value::Integer(128))
                    .with_range(64.0, MAX_RESOLUTION)
                    .with_step(16.0),
            )
            .parameter(
                ParameterDefinition::new("max_crop_resolution", PortType::Integer, Value::Integer(512))
                    .with_range(64.0, MAX_RESOLUTION)
                    .with_step(16.0),
            )
            .parameter(ParameterDefinition::choice("resize_policy", &policies, "fill"))
            .parameter(ParameterDefinition::choice("sampler", &Sampler::PIL_NAMES, "lanczos"))
            .output(PortDefinition::output("images", PortType::Image))
            .output(PortDefinition::output("masks", PortType::Mask))
            .output(PortDefinition::output("bbox", PortType::BBox))
            .tags(["crop", "mask", "batch"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let mask = ctx.get_input_mask("mask")?;
        let min_crop = get_usize(ctx, "min_crop_resolution")?;
        let max_crop = get_usize(ctx, "max_crop_resolution")?;
        let cfg = UnifiedCrop {
            base_resolution: get_usize(ctx, "base_resolution")?,
            padding: get_usize(ctx, "padding")?,
            min_width: min_crop,
            max_width: max_crop,
            min_height: min_crop,
            max_height: max_crop,
            policy: choice(ctx, "resize_policy", parse_unified_policy)?,
            sampler: choice(ctx, "sampler", Sampler::parse)?,
        };

        let (images, masks, boxes) = crop_by_mask_and_resize(image, mask, &cfg)?;
        let bbox = BBoxes::new(
            boxes
                .iter()
                .map(|b| vec![[b.x0 as f64, b.y0 as f64, b.x1 as f64, b.y1 as f64]])
                .collect(),
        );
        ctx.set_output_image("images", images)?;
        ctx.set_output_mask("masks", masks)?;
        ctx.set_output("bbox", Value::BBox(bbox))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Paste a crop back into its background at the crop box.
#[derive(Debug, Clone)]
pub struct RestoreCropBox;

impl FilterNode for RestoreCropBox {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("RestoreCropBox_UTK", "Restore Crop Box (UTK)")
            .category(Category::Image)
            .description("Paste a cropped image back at its box, using the crop mask as alpha")
            .input(PortDefinition::input("background_image", PortType::Image))
            .input(PortDefinition::input("croped_image", PortType::Image))
            .input(PortDefinition::input("crop_box", PortType::Box))
            .input(PortDefinition::input("croped_mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::new("invert_mask", PortType::Boolean, Value::Boolean(false)))
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["crop", "paste", "restore"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let background = ctx.get_input_image("background_image")?;
        let cropped = ctx.get_input_image("croped_image")?;
        let crop_box = ctx.get_input_box("crop_box")?;
        let mask = ctx.get_input_mask_optional("croped_mask")?;
        let invert = ctx.get_bool("invert_mask")?;

        let (image, mask) = paste_back(background, cropped, mask, invert, crop_box)?;
        ctx.set_output_image("image", image)?;
        ctx.set_output_mask("mask", mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::{CropBox, ImageTensor, MaskTensor};
    use crate::execution::invoke::Invocation;
    use ndarray::{Array3, Array4};

    fn gradient(batch: usize, h: usize, w: usize) -> ImageTensor {
        ImageTensor::new(Array4::from_shape_fn((batch, h, w, 3), |(b, y, x, c)| {
            ((b * 7 + y * 3 + x * 5 + c) % 17) as f32 / 16.0
        }))
        .unwrap()
    }

    fn block_mask(batch: usize, h: usize, w: usize, x0: usize, y0: usize, side: usize) -> MaskTensor {
        MaskTensor::new(Array3::from_shape_fn((batch, h, w), |(_, y, x)| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                1.0
            } else {
                0.0
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_crop_then_restore_is_identity() {
        let image = gradient(1, 64, 80);
        let out = Invocation::new(&CropByMask)
            .with_input("image", Value::Image(image.clone()))
            .with_input("mask_for_crop", Value::Mask(block_mask(1, 64, 80, 20, 10, 16)))
            .with_parameter("detect", Value::string("mask_area"))
            .run()
            .unwrap();
        let crop_box = out.get("crop_box").and_then(|v| v.as_box()).unwrap();
        let cropped = out.image("croped_image").unwrap().clone();
        assert_eq!(cropped.width() as u32, crop_box.width());
        assert_eq!(cropped.height() as u32, crop_box.height());

        let ones = MaskTensor::filled(1, cropped.height(), cropped.width(), 1.0).unwrap();
        let restored = Invocation::new(&RestoreCropBox)
            .with_input("background_image", Value::Image(image.clone()))
            .with_input("croped_image", Value::Image(cropped))
            .with_input("crop_box", Value::Box(crop_box))
            .with_input("croped_mask", Value::Mask(ones))
            .run()
            .unwrap();
        let restored = restored.image("image").unwrap();
        for (a, b) in restored.array().iter().zip(image.array().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_restore_mask_is_zero_outside_box() {
        let background = gradient(1, 32, 32);
        let patch = ImageTensor::filled(1, 8, 8, &[1.0, 0.0, 0.0]).unwrap();
        let out = Invocation::new(&RestoreCropBox)
            .with_input("background_image", Value::Image(background))
            .with_input("croped_image", Value::Image(patch))
            .with_input("crop_box", Value::Box(CropBox::new(4, 4, 12, 12)))
            .run()
            .unwrap();
        let mask = out.mask("mask").unwrap();
        assert_eq!(mask.frame(0)[[0, 0]], 0.0);
        assert_eq!(mask.frame(0)[[5, 5]], 1.0);
        assert_eq!(out.image("image").unwrap().frame(0)[[5, 5, 0]], 1.0);
    }

    #[test]
    fn test_unified_crop_sizes_are_shared_and_aligned() {
        let image = gradient(2, 200, 240);
        let mut planes = block_mask(2, 200, 240, 30, 30, 40).into_array();
        // second mask gets a wider region
        for y in 100..140 {
            for x in 100..200 {
                planes[[1, y, x]] = 1.0;
            }
        }
        let out = Invocation::new(&ImageCropByMaskAndResize)
            .with_input("image", Value::Image(image))
            .with_input("mask", Value::Mask(MaskTensor::new(planes).unwrap()))
            .with_parameter("min_crop_resolution", Value::Integer(64))
            .with_parameter("base_resolution", Value::Integer(256))
            .run()
            .unwrap();
        let images = out.image("images").unwrap();
        assert_eq!(images.batch(), 2);
        assert_eq!(images.height() % 16, 0);
        assert_eq!(images.width() % 16, 0);
        let masks = out.mask("masks").unwrap();
        assert_eq!((masks.height(), masks.width()), (images.height(), images.width()));
        let bbox = out.get("bbox").and_then(|v| v.as_bboxes()).unwrap();
        assert_eq!(bbox.boxes.len(), 2);
    }
}
