//! Preview and inspection operators.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::{BoxFormat, ImageTensor};
use crate::core::types::{Color, PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::geometry::{resize_plane, Sampler};
use crate::kernels::mask::{check_mask, mask_to_frame, overlay_mask};
use ndarray::{s, Array3};

const MASK_COLORS: [&str; 8] = ["red", "green", "blue", "yellow", "cyan", "magenta", "white", "black"];

/// Show an image with its mask painted over it.
#[derive(Debug, Clone)]
pub struct ImageAndMaskPreview;

impl FilterNode for ImageAndMaskPreview {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageAndMaskPreview_UTK", "Image And Mask Preview (UTK)")
            .category(Category::Image)
            .description("Preview an image, a mask, or the mask overlaid on the image in a color")
            .input(PortDefinition::input("image", PortType::Image).optional())
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(
                ParameterDefinition::new("mask_opacity", PortType::Float, Value::Float(1.0))
                    .with_range(0.0, 1.0)
                    .with_step(0.01),
            )
            .parameter(ParameterDefinition::choice("mask_color", &MASK_COLORS, "red"))
            .parameter(
                ParameterDefinition::new("pass_through", PortType::Boolean, Value::Boolean(false))
                    .with_description("Also return the composite for downstream nodes"),
            )
            .output(PortDefinition::output("composite", PortType::Image))
            .tags(["preview", "mask", "overlay"])
            .output_node()
            .preview()
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image_optional("image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let opacity = ctx.get_float("mask_opacity")?.clamp(0.0, 1.0) as f32;
        let color = choice(ctx, "mask_color", Color::from_name)?.to_unit_rgb();
        if ctx.get_bool("pass_through")? {
            log::debug!("Preview composite passed downstream");
        }

        let composite = match (image, mask) {
            (None, None) => return Err(ctx.fail("An image or a mask is required")),
            (Some(image), None) => image.clone(),
            (None, Some(mask)) => {
                ImageTensor::from_frames(mask.frames().iter().map(|p| mask_to_frame(p.view())).collect())?
            }
            (Some(image), Some(mask)) => {
                let batch = image.batch().max(mask.batch());
                let frames = (0..batch)
                    .map(|i| {
                        let frame = image.frame_clamped(i);
                        let (h, w, _) = frame.dim();
                        let plane = mask.frame_clamped(i);
                        let plane = if plane.dim() == (h, w) {
                            plane.to_owned()
                        } else {
                            resize_plane(plane, w, h, Sampler::Bilinear)
                        };
                        overlay_mask(frame, plane.view(), color, opacity)
                    })
                    .collect();
                ImageTensor::from_frames(frames)?
            }
        };
        ctx.set_output_image("composite", composite)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

// Paint `line` pixel wide red edges of one box into an RGB(A) frame.
fn draw_box(frame: &mut Array3<f32>, bbox: [f64; 4], format: BoxFormat, line: usize) {
    let (h, w, c) = frame.dim();
    let (x0, y0, bw, bh) = match format {
        BoxFormat::Xywh => (bbox[0], bbox[1], bbox[2], bbox[3]),
        BoxFormat::Xyxy => (bbox[0], bbox[1], bbox[2] - bbox[0], bbox[3] - bbox[1]),
    };
    if bw <= 0.0 || bh <= 0.0 {
        return;
    }
    let x0 = x0.max(0.0) as usize;
    let y0 = y0.max(0.0) as usize;
    let x1 = (x0 + bw as usize).min(w);
    let y1 = (y0 + bh as usize).min(h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    let red = [1.0, 0.0, 0.0];
    let mut paint = |ys: std::ops::Range<usize>, xs: std::ops::Range<usize>| {
        for ch in 0..c.min(3) {
            frame.slice_mut(s![ys.clone(), xs.clone(), ch]).fill(red[ch]);
        }
    };
    for k in 0..line {
        if y0 + k < y1 {
            paint(y0 + k..y0 + k + 1, x0..x1);
        }
        if y1 > k && y1 - 1 - k >= y0 {
            paint(y1 - 1 - k..y1 - k, x0..x1);
        }
        if x0 + k < x1 {
            paint(y0..y1, x0 + k..x0 + k + 1);
        }
        if x1 > k && x1 - 1 - k >= x0 {
            paint(y0..y1, x1 - 1 - k..x1 - k);
        }
    }
}

/// Draw bounding boxes on every frame.
#[derive(Debug, Clone)]
pub struct BboxVisualize;

impl FilterNode for BboxVisualize {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("BboxVisualize_UTK", "Bbox Visualize (UTK)")
            .category(Category::Image)
            .description("Visualize bounding boxes as red frames")
            .input(PortDefinition::input("images", PortType::Image))
            .input(PortDefinition::input("bboxes", PortType::BBox))
            .parameter(
                ParameterDefinition::new("line_width", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 10.0)
                    .with_step(1.0),
            )
            .parameter(ParameterDefinition::choice("bbox_format", &["xywh", "xyxy"], "xywh"))
            .output(PortDefinition::output("images", PortType::Image))
            .tags(["bbox", "debug"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let images = ctx.get_input_image("images")?;
        let bboxes = ctx.get_input_bboxes("bboxes")?;
        let line = get_usize(ctx, "line_width")?.max(1);
        let format = choice(ctx, "bbox_format", BoxFormat::parse)?;

        let frames = (0..images.batch())
            .map(|i| {
                let mut frame = images.frame(i).to_owned();
                for bbox in bboxes.for_image(i) {
                    draw_box(&mut frame, *bbox, format, line);
                }
                frame
            })
            .collect();
        ctx.set_output_image("images", ImageTensor::from_frames(frames)?)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Whether a mask has enough white area to be worth using.
#[derive(Debug, Clone)]
pub struct CheckMask;

impl FilterNode for CheckMask {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("CheckMask_UTK", "Check Mask (UTK)")
            .category(Category::Mask)
            .description("True when the share of pixels above white_point exceeds area_percent")
            .input(PortDefinition::input("mask", PortType::Mask))
            .parameter(
                ParameterDefinition::new("white_point", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 254.0)
                    .with_description("8-bit level a pixel must exceed to count as white"),
            )
            .parameter(
                ParameterDefinition::new("area_percent", PortType::Integer, Value::Integer(1)).with_range(1.0, 99.0),
            )
            .output(PortDefinition::output("bool", PortType::Boolean))
            .tags(["mask", "check"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let mask = ctx.get_input_mask("mask")?;
        let white_point = ctx.get_integer("white_point")?.clamp(0, 255) as u8;
        let area = ctx.get_integer("area_percent")? as f32;
        let valid = check_mask(mask, white_point, area);
        ctx.set_output("bool", Value::Boolean(valid))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::{BBoxes, MaskTensor};
    use crate::execution::invoke::Invocation;

    #[test]
    fn test_overlay_paints_masked_half() {
        let image = ImageTensor::filled(1, 4, 4, &[0.0, 0.0, 0.0]).unwrap();
        let mask = MaskTensor::new(Array3::from_shape_fn((1, 2, 2), |(_, _, x)| x as f32)).unwrap();
        let out = Invocation::new(&ImageAndMaskPreview)
            .with_input("image", Value::Image(image))
            .with_input("mask", Value::Mask(mask))
            .with_parameter("mask_color", Value::string("green"))
            .run()
            .unwrap();
        let composite = out.image("composite").unwrap();
        assert_eq!(composite.shape(), vec![1, 4, 4, 3]);
        assert_eq!(composite.frame(0)[[0, 3, 1]], 1.0);
        assert_eq!(composite.frame(0)[[0, 0, 1]], 0.0);
    }

    #[test]
    fn test_mask_only_preview_is_gray() {
        let mask = MaskTensor::filled(2, 3, 3, 0.25).unwrap();
        let out = Invocation::new(&ImageAndMaskPreview)
            .with_input("mask", Value::Mask(mask))
            .run()
            .unwrap();
        let composite = out.image("composite").unwrap();
        assert_eq!(composite.batch(), 2);
        assert_eq!(composite.frame(1)[[2, 2, 2]], 0.25);
    }

    #[test]
    fn test_preview_without_inputs_fails() {
        assert!(Invocation::new(&ImageAndMaskPreview).run().is_err());
    }

    #[test]
    fn test_bbox_frames_are_red() {
        let images = ImageTensor::filled(2, 10, 10, &[0.0, 0.0, 0.0]).unwrap();
        let boxes = BBoxes::new(vec![vec![[2.0, 2.0, 7.0, 7.0]]]);
        let out = Invocation::new(&BboxVisualize)
            .with_input("images", Value::Image(images))
            .with_input("bboxes", Value::BBox(boxes))
            .with_parameter("bbox_format", Value::string("xyxy"))
            .run()
            .unwrap();
        let images = out.image("images").unwrap();
        for i in 0..2 {
            let frame = images.frame(i);
            assert_eq!(frame[[2, 4, 0]], 1.0);
            assert_eq!(frame[[4, 2, 0]], 1.0);
            assert_eq!(frame[[6, 4, 0]], 1.0);
            assert_eq!(frame[[4, 4, 0]], 0.0);
            assert_eq!(frame[[0, 0, 0]], 0.0);
        }
    }

    #[test]
    fn test_check_mask_threshold() {
        let half = MaskTensor::new(Array3::from_shape_fn((1, 10, 10), |(_, y, _)| if y < 5 { 1.0 } else { 0.0 })).unwrap();
        let run = |area: i64| {
            Invocation::new(&CheckMask)
                .with_input("mask", Value::Mask(half.clone()))
                .with_parameter("area_percent", Value::Integer(area))
                .run()
                .unwrap()
                .boolean("bool")
                .unwrap()
        };
        assert!(run(40));
        assert!(!run(60));
    }
}
