//! Alpha channel operators.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::ImageTensor;
use crate::core::types::{Color, PortType, Value};
use crate::filters::builtin::choice;
use crate::kernels::bridge::with_channels;
use crate::kernels::geometry::{resize_plane, Sampler};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};

const BACKGROUNDS: [&str; 10] = [
    "black", "white", "gray", "red", "green", "blue", "yellow", "cyan", "magenta", "transparent",
];

// Mask plane sized to the frame.
fn plane_for(plane: ArrayView2<f32>, h: usize, w: usize) -> Array2<f32> {
    if plane.dim() == (h, w) {
        plane.to_owned()
    } else {
        resize_plane(plane, w, h, Sampler::Bilinear)
    }
}

/// Composite RGB over a solid background through `alpha`.
pub fn flatten_onto(frame: ArrayView3<f32>, alpha: ArrayView2<f32>, background: [f32; 3]) -> Array3<f32> {
    let (h, w, _) = frame.dim();
    let rgb = with_channels(frame, 3);
    let alpha = plane_for(alpha, h, w);
    Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
        let a = alpha[[y, x]].clamp(0.0, 1.0);
        rgb[[y, x, c]] * a + background[c] * (1.0 - a)
    })
}

/// Drop the alpha channel, optionally flattening onto a background first.
#[derive(Debug, Clone)]
pub struct ImageRemoveAlpha;

impl FilterNode for ImageRemoveAlpha {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageRemoveAlpha_UTK", "Image Remove Alpha (UTK)")
            .category(Category::Image)
            .description("Convert RGBA to RGB; with fill_background the alpha (or mask) blends onto a color")
            .input(PortDefinition::input("RGBA_image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask).optional())
            .parameter(ParameterDefinition::new("fill_background", PortType::Boolean, Value::Boolean(false)))
            .parameter(ParameterDefinition::choice("background_color", &BACKGROUNDS, "black"))
            .output(PortDefinition::output("RGB_image", PortType::Image))
            .tags(["alpha", "flatten"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("RGBA_image")?;
        let mask = ctx.get_input_mask_optional("mask")?;
        let fill = ctx.get_bool("fill_background")?;
        let background = choice(ctx, "background_color", Color::from_name)?;

        let strip = |img: &ImageTensor| -> Result<ImageTensor, ExecutionError> {
            Ok(ImageTensor::from_frames((0..img.batch()).map(|i| with_channels(img.frame(i), 3)).collect())?)
        };

        let out = if !fill || background == Color::TRANSPARENT {
            strip(image)?
        } else if mask.is_none() && image.channels() != 4 {
            log::error!("Image has no alpha channel and no mask is connected; returning it unchanged");
            strip(image)?
        } else {
            let bg = background.to_unit_rgb();
            let frames = (0..image.batch())
                .map(|i| {
                    let frame = image.frame(i);
                    match mask {
                        Some(m) => flatten_onto(frame, m.frame_clamped(i), bg),
                        None => flatten_onto(frame, frame.index_axis(Axis(2), 3), bg),
                    }
                })
                .collect();
            ImageTensor::from_frames(frames)?
        };
        ctx.set_output_image("RGB_image", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Attach a mask to an RGB image as its alpha channel.
#[derive(Debug, Clone)]
pub struct ImageCombineAlpha;

impl FilterNode for ImageCombineAlpha {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageCombineAlpha_UTK", "Image Combine Alpha (UTK)")
            .category(Category::Image)
            .description("Merge RGB and a mask into RGBA; the shorter batch repeats its last entry")
            .input(PortDefinition::input("RGB_image", PortType::Image))
            .input(PortDefinition::input("mask", PortType::Mask))
            .output(PortDefinition::output("RGBA_image", PortType::Image))
            .tags(["alpha", "merge"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("RGB_image")?;
        let mask = ctx.get_input_mask("mask")?;
        let (h, w) = (image.height(), image.width());
        let batch = image.batch().max(mask.batch());

        let frames = (0..batch)
            .map(|i| {
                let mut rgba = with_channels(image.frame_clamped(i), 4);
                let alpha = plane_for(mask.frame_clamped(i), h, w);
                rgba.slice_mut(s![.., .., 3]).assign(&alpha);
                rgba
            })
            .collect();
        ctx.set_output_image("RGBA_image", ImageTensor::from_frames(frames)?)
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

    #[test]
    fn test_combine_then_remove_onto_white() {
        let image = ImageTensor::filled(1, 4, 4, &[1.0, 0.0, 0.0]).unwrap();
        let mask = MaskTensor::new(Array3::from_shape_fn((2, 4, 4), |(b, _, _)| if b == 0 { 1.0 } else { 0.0 })).unwrap();
        let combined = Invocation::new(&ImageCombineAlpha)
            .with_input("RGB_image", Value::Image(image))
            .with_input("mask", Value::Mask(mask))
            .run()
            .unwrap();
        let rgba = combined.image("RGBA_image").unwrap();
        assert_eq!(rgba.shape(), vec![2, 4, 4, 4]);

        let flat = Invocation::new(&ImageRemoveAlpha)
            .with_input("RGBA_image", Value::Image(rgba.clone()))
            .with_parameter("fill_background", Value::Boolean(true))
            .with_parameter("background_color", Value::string("white"))
            .run()
            .unwrap();
        let flat = flat.image("RGB_image").unwrap();
        assert_eq!(flat.channels(), 3);
        // opaque frame keeps red, transparent frame shows the background
        assert_eq!(flat.frame(0)[[1, 1, 1]], 0.0);
        assert_eq!(flat.frame(1)[[1, 1, 1]], 1.0);
    }

    #[test]
    fn test_remove_without_fill_drops_channel() {
        let image = ImageTensor::filled(1, 2, 2, &[0.2, 0.4, 0.6, 0.0]).unwrap();
        let out = Invocation::new(&ImageRemoveAlpha)
            .with_input("RGBA_image", Value::Image(image))
            .run()
            .unwrap();
        let out = out.image("RGB_image").unwrap();
        assert_eq!(out.channels(), 3);
        assert!((out.frame(0)[[0, 0, 2]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_mask_overrides_alpha() {
        let image = ImageTensor::filled(1, 2, 2, &[0.0, 0.0, 0.0]).unwrap();
        let mask = MaskTensor::filled(1, 2, 2, 0.5).unwrap();
        let out = Invocation::new(&ImageRemoveAlpha)
            .with_input("RGBA_image", Value::Image(image))
            .with_input("mask", Value::Mask(mask))
            .with_parameter("fill_background", Value::Boolean(true))
            .with_parameter("background_color", Value::string("white"))
            .run()
            .unwrap();
        assert!((out.image("RGB_image").unwrap().frame(0)[[0, 0, 0]] - 0.5).abs() < 1e-6);
    }
}
