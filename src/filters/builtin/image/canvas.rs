//! Canvas generation and ratio inspection.

use crate::core::context::ExecutionContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::{ImageTensor, Latent, LatentFamily, MaskTensor};
use crate::core::types::{Color, PortType, Value};
use crate::filters::builtin::{choice, get_usize};

/// Named resolutions; every entry except `custom` ends in `WxH`.
pub const RATIO_PRESETS: [&str; 18] = [
    "custom",
    "SD1.5 - 1:1 square 512x512",
    "SD1.5 - 2:3 portrait 512x768",
    "SD1.5 - 3:4 portrait 512x682",
    "SD1.5 - 3:2 landscape 768x512",
    "SD1.5 - 4:3 landscape 682x512",
    "SD1.5 - 16:9 cinema 910x512",
    "SD1.5 - 1.85:1 cinema 952x512",
    "SD1.5 - 2:1 cinema 1024x512",
    "SDXL - 1:1 square 1024x1024",
    "SDXL - 3:4 portrait 896x1152",
    "SDXL - 5:8 portrait 832x1216",
    "SDXL - 9:16 portrait 768x1344",
    "SDXL - 9:21 portrait 640x1536",
    "SDXL - 4:3 landscape 1152x896",
    "SDXL - 3:2 landscape 1216x832",
    "SDXL - 16:9 landscape 1344x768",
    "SDXL - 21:9 landscape 1536x640",
];

const CANVAS_COLORS: [&str; 6] = ["white", "black", "gray", "red", "green", "blue"];

/// Pixel size encoded at the end of a preset label.
pub fn preset_size(label: &str) -> Option<(usize, usize)> {
    let last = label.rsplit(' ').next()?;
    let (w, h) = last.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// `⌊side · scale / divisor⌋ · divisor`, never below one divisor.
pub fn scaled_side(side: usize, scale: f64, divisor: usize) -> usize {
    let divisor = divisor.max(1);
    let scaled = (side as f64 * scale).max(0.0);
    let snapped = (scaled / divisor as f64).floor() as usize * divisor;
    snapped.max(divisor)
}

/// Solid image, mask and zero latent of one size.
#[derive(Debug, Clone)]
pub struct EmptyUnitGenerator;

impl FilterNode for EmptyUnitGenerator {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("EmptyUnitGenerator_UTK", "Empty Unit Generator (UTK)")
            .category(Category::Image)
            .description("Generate a solid image, a matching mask and an empty latent")
            .parameter(
                ParameterDefinition::new("width", PortType::Integer, Value::Integer(1024))
                    .with_range(64.0, 4096.0)
                    .with_step(8.0)
                    .with_description("Used when ratio is custom"),
            )
            .parameter(
                ParameterDefinition::new("height", PortType::Integer, Value::Integer(1024))
                    .with_range(64.0, 4096.0)
                    .with_step(8.0)
                    .with_description("Used when ratio is custom"),
            )
            .parameter(ParameterDefinition::choice("ratio", &RATIO_PRESETS, RATIO_PRESETS[9]))
            .parameter(
                ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0))
                    .with_range(0.1, 8.0),
            )
            .parameter(
                ParameterDefinition::new("divisor", PortType::Integer, Value::Integer(8))
                    .with_range(1.0, 512.0),
            )
            .parameter(ParameterDefinition::choice("image_color", &CANVAS_COLORS, "white"))
            .parameter(
                ParameterDefinition::new("batch", PortType::Integer, Value::Integer(1))
                    .with_range(1.0, 16.0),
            )
            .parameter(ParameterDefinition::choice("latent_type", &LatentFamily::NAMES, "standard"))
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .output(PortDefinition::output("latent", PortType::Latent))
            .output(PortDefinition::output("width", PortType::Integer))
            .output(PortDefinition::output("height", PortType::Integer))
            .tags(["generate", "canvas", "latent"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let ratio = ctx.get_string("ratio")?;
        let (w, h) = if ratio == "custom" {
            (get_usize(ctx, "width")?, get_usize(ctx, "height")?)
        } else {
            preset_size(ratio).unwrap_or((1024, 1024))
        };
        let scale = ctx.get_float("scale")?;
        let divisor = get_usize(ctx, "divisor")?;
        let (w, h) = (scaled_side(w, scale, divisor), scaled_side(h, scale, divisor));

        let color = choice(ctx, "image_color", Color::from_name)?.to_unit_rgb();
        let batch = get_usize(ctx, "batch")?;
        let family = choice(ctx, "latent_type", LatentFamily::parse)?;

        let image = ImageTensor::filled(batch, h, w, &color)?;
        let mask = MaskTensor::filled(batch, h, w, color[0])?.with_channel_axis();
        let latent = Latent::empty(batch, w, h, family);

        ctx.set_output_image("image", image)?;
        ctx.set_output_mask("mask", mask)?;
        ctx.set_output("latent", Value::Latent(latent))?;
        ctx.set_output("width", Value::Integer(w as i64))?;
        ctx.set_output("height", Value::Integer(h as i64))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

const STANDARD_RATIOS: [(&str, f64); 16] = [
    ("1:1", 1.0),
    ("16:9", 16.0 / 9.0),
    ("4:3", 4.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("2:3", 2.0 / 3.0),
    ("3:4", 3.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("5:4", 5.0 / 4.0),
    ("7:5", 7.0 / 5.0),
    ("21:9", 21.0 / 9.0),
    ("5:3", 5.0 / 3.0),
    ("3:1", 3.0),
    ("1:2", 0.5),
    ("2:1", 2.0),
    ("1:1.85", 1.0 / 1.85),
    ("1:2.35", 1.0 / 2.35),
];

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Reduced `w:h` and the closest standard ratio (first wins on ties).
pub fn ratio_strings(width: usize, height: usize) -> (String, String) {
    if width == 0 || height == 0 {
        return ("0:0".to_string(), "N/A".to_string());
    }
    let g = gcd(width, height);
    let exact = format!("{}:{}", width / g, height / g);
    let r = width as f64 / height as f64;
    let mut best = STANDARD_RATIOS[0];
    for candidate in STANDARD_RATIOS.iter().skip(1) {
        if (candidate.1 - r).abs() < (best.1 - r).abs() {
            best = *candidate;
        }
    }
    (exact, best.0.to_string())
}

/// Exact and approximate aspect ratio of the first image.
#[derive(Debug, Clone)]
pub struct ImageRatioDetector;

impl FilterNode for ImageRatioDetector {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("ImageRatioDetector_UTK", "Image Ratio Detector (UTK)")
            .category(Category::Image)
            .description("Report the reduced aspect ratio and the nearest standard ratio")
            .input(PortDefinition::input("image", PortType::Image))
            .output(PortDefinition::output("ratio_str", PortType::String))
            .output(PortDefinition::output("width", PortType::Integer))
            .output(PortDefinition::output("height", PortType::Integer))
            .output(PortDefinition::output("approx_ratio_str", PortType::String))
            .tags(["ratio", "size", "inspect"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let image = ctx.get_input_image("image")?;
        let (w, h) = (image.width(), image.height());
        let (exact, approx) = ratio_strings(w, h);
        ctx.set_output("ratio_str", Value::String(exact))?;
        ctx.set_output("width", Value::Integer(w as i64))?;
        ctx.set_output("height", Value::Integer(h as i64))?;
        ctx.set_output("approx_ratio_str", Value::String(approx))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::invoke::Invocation;
    use proptest::prelude::*;

    #[test]
    fn test_sdxl_square_unit() {
        let out = Invocation::new(&EmptyUnitGenerator).run().unwrap();

        let image = out.image("image").unwrap();
        assert_eq!(image.shape(), vec![1, 1024, 1024, 3]);
        assert!(image.array().iter().all(|v| *v == 1.0));

        let mask = out.mask("mask").unwrap();
        assert_eq!(mask.shape(), vec![1, 1, 1024, 1024]);
        assert!(mask.array().iter().all(|v| *v == 1.0));

        let latent = out.get("latent").and_then(|v| v.as_latent()).unwrap();
        assert_eq!(latent.shape(), vec![1, 4, 128, 128]);
        assert!(latent.samples().iter().all(|v| *v == 0.0));
        assert_eq!(out.integer("width"), Some(1024));
        assert_eq!(out.integer("height"), Some(1024));
    }

    #[test]
    fn test_custom_red_ltx() {
        let out = Invocation::new(&EmptyUnitGenerator)
            .with_parameter("ratio", Value::string("custom"))
            .with_parameter("width", Value::Integer(800))
            .with_parameter("height", Value::Integer(600))
            .with_parameter("scale", Value::Float(0.5))
            .with_parameter("divisor", Value::Integer(64))
            .with_parameter("image_color", Value::string("red"))
            .with_parameter("batch", Value::Integer(2))
            .with_parameter("latent_type", Value::string("ltx"))
            .run()
            .unwrap();
        // 400 -> 384, 300 -> 256
        assert_eq!(out.integer("width"), Some(384));
        assert_eq!(out.integer("height"), Some(256));
        assert_eq!(out.image("image").unwrap().frame(1)[[0, 0, 1]], 0.0);
        assert!(out.mask("mask").unwrap().array().iter().all(|v| *v == 1.0));
        assert_eq!(out.get("latent").and_then(|v| v.as_latent()).unwrap().shape(), vec![2, 16, 32, 48]);
    }

    #[test]
    fn test_preset_size() {
        assert_eq!(preset_size("SD1.5 - 16:9 cinema 910x512"), Some((910, 512)));
        assert_eq!(preset_size("custom"), None);
    }

    #[test]
    fn test_ratio_detector_hd() {
        let image = ImageTensor::filled(1, 720, 1280, &[0.0, 0.0, 0.0]).unwrap();
        let out = Invocation::new(&ImageRatioDetector)
            .with_input("image", Value::Image(image))
            .run()
            .unwrap();
        assert_eq!(out.string("ratio_str"), Some("16:9"));
        assert_eq!(out.integer("width"), Some(1280));
        assert_eq!(out.integer("height"), Some(720));
        assert_eq!(out.string("approx_ratio_str"), Some("16:9"));
    }

    #[test]
    fn test_ratio_strings_edge_cases() {
        assert_eq!(ratio_strings(0, 10), ("0:0".to_string(), "N/A".to_string()));
        assert_eq!(ratio_strings(1000, 1000).1, "1:1");
        // 952x512 is 1.859, closest to 16:9 (1.778) rather than 2:1
        assert_eq!(ratio_strings(952, 512), ("119:64".to_string(), "16:9".to_string()));
    }

    proptest! {
        #[test]
        fn prop_scaled_side_is_floored_multiple(side in 64usize..4096, scale in 0.1f64..8.0, divisor in 1usize..512) {
            let out = scaled_side(side, scale, divisor);
            prop_assert_eq!(out % divisor, 0);
            let floor = ((side as f64 * scale) / divisor as f64).floor() as usize * divisor;
            prop_assert_eq!(out, floor.max(divisor));
        }
    }
}
