//! Batch operators: slicing, frame sampling and color keying.

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, KernelError};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::tensor::{ImageTensor, MaskTensor};
use crate::core::types::{PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::kernels::audio::normalize_path;
use crate::kernels::bridge::rgb_to_frame;
use crate::kernels::color::color_to_mask;
use crate::kernels::geometry::{resize_frame, Sampler};
use crate::kernels::sequence::{sample_frame_indices, FrameSampling};
use ndarray::{s, Array3};
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "webp", "tif", "tiff"];

// Half-open batch range; -1 starts `count` from the end.
fn batch_range(len: usize, start: i64, count: usize, what: &str) -> Result<(usize, usize), String> {
    let start = if start == -1 {
        len.saturating_sub(count)
    } else {
        usize::try_from(start).map_err(|_| format!("{} start index {} is negative", what, start))?
    };
    if start >= len {
        return Err(format!("{} start index {} out of range [0, {}]", what, start, len as i64 - 1));
    }
    Ok((start, (start + count).min(len)))
}

/// Take a run of frames out of an image and/or mask batch.
#[derive(Debug, Clone)]
pub struct GetImageRangeFromBatch;

impl FilterNode for GetImageRangeFromBatch {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("GetImageRangeFromBatch_UTK", "Get Image or Mask Range From Batch (UTK)")
            .category(Category::Tools)
            .description("Slice num_frames entries from start_index; -1 counts from the end")
            .input(PortDefinition::input("images", PortType::Image).optional())
            .input(PortDefinition::input("masks", PortType::Mask).optional())
            .parameter(
                ParameterDefinition::new("start_index", PortType::Integer, Value::Integer(0))
                    .with_range(-1.0, 4096.0)
                    .with_description("First index, -1 to start from the end"),
            )
            .parameter(
                ParameterDefinition::new("num_frames", PortType::Integer, Value::Integer(1)).with_range(1.0, 4096.0),
            )
            .output(PortDefinition::output("image", PortType::Image))
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["batch", "slice"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let images = ctx.get_input_image_optional("images")?;
        let masks = ctx.get_input_mask_optional("masks")?;
        if images.is_none() && masks.is_none() {
            return Err(ctx.fail("An image or a mask batch is required"));
        }
        let start = ctx.get_integer("start_index")?;
        let count = get_usize(ctx, "num_frames")?;

        let image = match images {
            Some(images) => {
                let (a, b) = batch_range(images.batch(), start, count, "Image").map_err(|e| ctx.fail(e))?;
                log::debug!("Image range {}..{} of {}", a, b, images.batch());
                Value::Image(ImageTensor::new(images.array().slice(s![a..b, .., .., ..]).to_owned())?)
            }
            None => Value::None,
        };
        let mask = match masks {
            Some(masks) => {
                let (a, b) = batch_range(masks.batch(), start, count, "Mask").map_err(|e| ctx.fail(e))?;
                Value::Mask(MaskTensor::new(masks.array().slice(s![a..b, .., ..]).to_owned())?)
            }
            None => Value::None,
        };
        ctx.set_output("image", image)?;
        ctx.set_output("mask", mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

// Image files directly inside `dir`, by file name.
fn frame_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

// Frames whose size differs from the first one are resized to match.
fn load_frames(files: &[PathBuf], indices: &[usize]) -> Vec<Array3<f32>> {
    let mut frames: Vec<Array3<f32>> = Vec::with_capacity(indices.len());
    for &i in indices {
        let path = &files[i];
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping unreadable frame {}: {}", path.display(), e);
                continue;
            }
        };
        let frame = rgb_to_frame(&img.to_rgb8());
        let frame = match frames.first() {
            Some(first) if first.dim() != frame.dim() => {
                let (h, w, _) = first.dim();
                log::warn!("Resizing {} to {}x{}", path.display(), w, h);
                resize_frame(frame.view(), w, h, Sampler::Bilinear)
            }
            _ => frame,
        };
        frames.push(frame);
    }
    frames
}

/// Sample frames from an image batch or a folder of frame images.
#[derive(Debug, Clone)]
pub struct ExtractVideoFrames;

impl FilterNode for ExtractVideoFrames {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("Extract_Video_Frames_UTK", "Extract Video Frames (UTK)")
            .category(Category::Tools)
            .description("Pick target_frames frames, spread by mode, from an image batch or a frame folder")
            .input(
                PortDefinition::input("images", PortType::Image)
                    .optional()
                    .with_description("Frame sequence; used instead of video_path when connected"),
            )
            .parameter(
                ParameterDefinition::new("video_path", PortType::String, Value::string(""))
                    .with_description("Folder holding one image per frame"),
            )
            .parameter(
                ParameterDefinition::new("target_frames", PortType::Integer, Value::Integer(8))
                    .with_range(1.0, 1000.0)
                    .with_step(1.0),
            )
            .parameter(ParameterDefinition::choice("mode", &FrameSampling::NAMES, "average"))
            .output(PortDefinition::output("images", PortType::Image))
            .output(PortDefinition::output("frames_count", PortType::Integer))
            .tags(["video", "frames", "sampling"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let target = get_usize(ctx, "target_frames")?;
        let mode = choice(ctx, "mode", FrameSampling::parse)?;

        let frames = if let Some(images) = ctx.get_input_image_optional("images")? {
            let indices = sample_frame_indices(images.batch(), target, mode);
            log::info!("Sampling {} of {} frames ({:?}): {:?}", indices.len(), images.batch(), mode, indices);
            indices.iter().map(|&i| images.frame(i).to_owned()).collect()
        } else {
            let raw = ctx.get_string("video_path")?;
            if raw.trim().is_empty() {
                return Err(ctx.fail("A frame folder or an image sequence is required"));
            }
            let dir = normalize_path(raw);
            let decoder = |reason: &str| KernelError::Decoder {
                path: dir.display().to_string(),
                reason: reason.to_string(),
            };
            if !dir.exists() {
                return Err(decoder("path does not exist").into());
            }
            if !dir.is_dir() {
                return Err(decoder("video containers cannot be decoded; pass a folder of frames").into());
            }
            let files = frame_files(&dir);
            let indices = sample_frame_indices(files.len(), target, mode);
            log::info!("Sampling {} of {} frame files in {}", indices.len(), files.len(), dir.display());
            load_frames(&files, &indices)
        };

        if frames.is_empty() {
            return Err(ctx.fail("No frames could be loaded"));
        }
        let count = frames.len() as i64;
        let batch = ImageTensor::from_frames(frames)?;
        ctx.set_output_image("images", batch)?;
        ctx.set_output("frames_count", Value::Integer(count))
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Mask of the pixels close to a target color.
#[derive(Debug, Clone)]
pub struct ColorToMask;

impl FilterNode for ColorToMask {
    fn metadata(&self) -> NodeMetadata {
        let channel = |name: &str, description: &str| {
            ParameterDefinition::new(name, PortType::Integer, Value::Integer(0))
                .with_range(0.0, 255.0)
                .with_step(1.0)
                .with_description(description)
        };
        NodeMetadata::builder("ColorToMask_UTK", "Color To Mask (UTK)")
            .category(Category::Tools)
            .description("Mask pixels whose RGB distance to the target color is within threshold")
            .input(PortDefinition::input("images", PortType::Image))
            .parameter(channel("red", "Red component of target color"))
            .parameter(channel("green", "Green component of target color"))
            .parameter(channel("blue", "Blue component of target color"))
            .parameter(
                ParameterDefinition::new("threshold", PortType::Integer, Value::Integer(10))
                    .with_range(0.0, 255.0)
                    .with_description("Maximum color distance for inclusion in mask"),
            )
            .parameter(ParameterDefinition::new("invert", PortType::Boolean, Value::Boolean(false)))
            .parameter(
                ParameterDefinition::new("per_batch", PortType::Integer, Value::Integer(16))
                    .with_range(1.0, 4096.0)
                    .with_description("Number of images processed at once"),
            )
            .output(PortDefinition::output("mask", PortType::Mask))
            .tags(["mask", "color", "key"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let images = ctx.get_input_image("images")?;
        let rgb = [
            ctx.get_integer("red")?.clamp(0, 255) as u8,
            ctx.get_integer("green")?.clamp(0, 255) as u8,
            ctx.get_integer("blue")?.clamp(0, 255) as u8,
        ];
        let threshold = ctx.get_integer("threshold")? as f32;
        let invert = ctx.get_bool("invert")?;
        let per_batch = get_usize(ctx, "per_batch")?;
        let mask = color_to_mask(images, rgb, threshold, invert, per_batch)?;
        ctx.set_output_mask("mask", mask)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
