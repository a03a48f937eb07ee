//! Geometry kernel: resampling, padding, cropping, rotation, aspect-ratio
//! targets and mask-driven bounding boxes.
//!
//! Frames are (H, W, C) and planes are (H, W), both `f32` in [0, 1].
//! Resampling goes through `image::imageops` on `Luma<f32>` buffers, one
//! channel at a time.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::{CropBox, ImageTensor, MaskTensor};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;

/// Resampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sampler {
    Nearest,
    Box,
    Bilinear,
    /// Resolved to a triangle filter; `image` has no Hamming window.
    Hamming,
    Bicubic,
    Lanczos,
}

impl Sampler {
    pub const PIL_NAMES: [&'static str; 6] = ["lanczos", "bicubic", "hamming", "bilinear", "box", "nearest"];
    pub const UPSCALE_NAMES: [&'static str; 5] = ["nearest-exact", "bilinear", "area", "bicubic", "lanczos"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nearest" | "nearest-exact" => Some(Sampler::Nearest),
            "box" | "area" => Some(Sampler::Box),
            "bilinear" | "linear" => Some(Sampler::Bilinear),
            "hamming" => Some(Sampler::Hamming),
            "bicubic" => Some(Sampler::Bicubic),
            "lanczos" => Some(Sampler::Lanczos),
            _ => None,
        }
    }

    fn filter_type(self) -> Option<FilterType> {
        match self {
            Sampler::Nearest => Some(FilterType::Nearest),
            Sampler::Bilinear | Sampler::Hamming => Some(FilterType::Triangle),
            Sampler::Bicubic => Some(FilterType::CatmullRom),
            Sampler::Lanczos => Some(FilterType::Lanczos3),
            Sampler::Box => None,
        }
    }
}

/// Resample one plane to `width` × `height`.
pub fn resize_plane(plane: ArrayView2<f32>, width: usize, height: usize, sampler: Sampler) -> Array2<f32> {
    let (h, w) = plane.dim();
    let (width, height) = (width.max(1), height.max(1));
    if (h, w) == (height, width) {
        return plane.to_owned();
    }
    match sampler.filter_type() {
        Some(filter) => {
            let buf: ImageBuffer<Luma<f32>, Vec<f32>> =
                ImageBuffer::from_fn(w as u32, h as u32, |x, y| Luma([plane[[y as usize, x as usize]]]));
            let out = imageops::resize(&buf, width as u32, height as u32, filter);
            Array2::from_shape_fn((height, width), |(y, x)| out.get_pixel(x as u32, y as u32)[0])
        }
        None => resize_plane_area(plane, width, height),
    }
}

// Area-weighted average of the source pixels each output pixel covers.
fn resize_plane_area(plane: ArrayView2<f32>, width: usize, height: usize) -> Array2<f32> {
    let (h, w) = plane.dim();
    let sx = w as f64 / width as f64;
    let sy = h as f64 / height as f64;
    let spans = |out: usize, scale: f64, limit: usize| -> Vec<(usize, f64)> {
        let start = out as f64 * scale;
        let end = start + scale;
        let mut cells = Vec::new();
        let mut i = start.floor() as usize;
        while (i as f64) < end && i < limit {
            let lo = start.max(i as f64);
            let hi = end.min(i as f64 + 1.0);
            if hi > lo {
                cells.push((i, hi - lo));
            }
            i += 1;
        }
        cells
    };
    let cols: Vec<Vec<(usize, f64)>> = (0..width).map(|x| spans(x, sx, w)).collect();
    let rows: Vec<Vec<(usize, f64)>> = (0..height).map(|y| spans(y, sy, h)).collect();
    Array2::from_shape_fn((height, width), |(y, x)| {
        let mut acc = 0.0;
        let mut total = 0.0;
        for &(yy, wy) in &rows[y] {
            for &(xx, wx) in &cols[x] {
                acc += plane[[yy, xx]] as f64 * wy * wx;
                total += wy * wx;
            }
        }
        if total > 0.0 {
            (acc / total) as f32
        } else {
            0.0
        }
    })
}

/// Resample every channel of a frame.
pub fn resize_frame(frame: ArrayView3<f32>, width: usize, height: usize, sampler: Sampler) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    if (h, w) == (height, width) {
        return frame.to_owned();
    }
    let planes: Vec<Array2<f32>> = (0..c)
        .map(|ch| resize_plane(frame.index_axis(Axis(2), ch), width, height, sampler))
        .collect();
    stack_planes(&planes, height.max(1), width.max(1))
}

pub(crate) fn stack_planes(planes: &[Array2<f32>], height: usize, width: usize) -> Array3<f32> {
    Array3::from_shape_fn((height, width, planes.len()), |(y, x, c)| planes[c][[y, x]])
}

pub fn resize_image(image: &ImageTensor, width: usize, height: usize, sampler: Sampler) -> KernelResult<ImageTensor> {
    let views: Vec<ArrayView3<f32>> = image.array().outer_iter().collect();
    let frames: Vec<Array3<f32>> = views
        .into_par_iter()
        .map(|f| resize_frame(f, width, height, sampler))
        .collect();
    ImageTensor::from_frames(frames)
}

pub fn resize_mask(mask: &MaskTensor, width: usize, height: usize, sampler: Sampler) -> KernelResult<MaskTensor> {
    let views: Vec<ArrayView2<f32>> = mask.array().outer_iter().collect();
    let frames: Vec<Array2<f32>> = views
        .into_par_iter()
        .map(|m| resize_plane(m, width, height, sampler))
        .collect();
    MaskTensor::from_frames(frames)
}

/// Normalized 1-D Gaussian kernel of odd size `ceil(6σ) | 1`.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let size = ((sigma * 6.0).ceil() as usize) | 1;
    let half = (size / 2) as f32;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Sigma implied by an odd box size when only the size is given
/// (`0.3·((k−1)·0.5 − 1) + 0.8`).
pub fn sigma_for_kernel_size(size: usize) -> f32 {
    0.3 * ((size.max(1) as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Odd-sized kernel with the sigma implied by its size.
pub fn gaussian_kernel_sized(size: usize) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = sigma_for_kernel_size(size);
    let half = (size / 2) as f32;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Separable Gaussian blur with clamped borders.
pub fn gaussian_blur_plane(plane: ArrayView2<f32>, sigma: f32) -> Array2<f32> {
    convolve_separable(plane, &gaussian_kernel_1d(sigma))
}

/// Gaussian blur with an explicit odd kernel size.
pub fn gaussian_blur_plane_sized(plane: ArrayView2<f32>, size: usize) -> Array2<f32> {
    convolve_separable(plane, &gaussian_kernel_sized(size))
}

/// Apply the same 1-D kernel along rows, then columns. Rows run in parallel.
pub fn convolve_separable(plane: ArrayView2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (h, w) = plane.dim();
    if kernel.len() <= 1 || h == 0 || w == 0 {
        return plane.to_owned();
    }
    let half = (kernel.len() / 2) as isize;
    let src: Vec<f32> = plane.iter().copied().collect();

    let mut horizontal = vec![0f32; h * w];
    horizontal.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let line = &src[y * w..(y + 1) * w];
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, kv) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as usize;
                acc += line[sx] * kv;
            }
            *out = acc;
        }
    });

    let mut vertical = vec![0f32; h * w];
    vertical.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, kv) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
                acc += horizontal[sy * w + x] * kv;
            }
            *out = acc;
        }
    });

    Array2::from_shape_fn((h, w), |(y, x)| vertical[y * w + x])
}

pub fn gaussian_blur_frame(frame: ArrayView3<f32>, sigma: f32) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let planes: Vec<Array2<f32>> = (0..c)
        .map(|ch| gaussian_blur_plane(frame.index_axis(Axis(2), ch), sigma))
        .collect();
    stack_planes(&planes, h, w)
}

/// Round `value` up to the next multiple (no-op for multiples ≤ 1).
pub fn round_up_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

pub fn floor_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        return value;
    }
    value - value % multiple
}

/// Where content sits on a larger canvas, or which part of a larger source
/// a crop keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl Anchor {
    pub const NAMES: [&'static str; 5] = ["center", "top", "bottom", "left", "right"];

    /// Unknown names fall back to center.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "top" => Anchor::Top,
            "bottom" => Anchor::Bottom,
            "left" => Anchor::Left,
            "right" => Anchor::Right,
            _ => Anchor::Center,
        }
    }
}

/// Integer pixel rectangle as origin plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn to_crop_box(self) -> CropBox {
        CropBox::new(
            self.x as u32,
            self.y as u32,
            (self.x + self.width) as u32,
            (self.y + self.height) as u32,
        )
    }

    pub fn from_crop_box(b: CropBox) -> Self {
        Self::new(b.x0 as usize, b.y0 as usize, b.width() as usize, b.height() as usize)
    }

    /// Clip to a `width` × `height` canvas.
    pub fn clamp_to(self, width: usize, height: usize) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self::new(x, y, self.width.min(width - x), self.height.min(height - y))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Amount of padding added on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Padding {
    pub fn new(left: usize, right: usize, top: usize, bottom: usize) -> Self {
        Self { left, right, top, bottom }
    }

    /// Padding that places `content` on a `canvas` according to `anchor`.
    pub fn anchored(canvas: (usize, usize), content: (usize, usize), anchor: Anchor) -> Self {
        let (cw, ch) = canvas;
        let (w, h) = (content.0.min(cw), content.1.min(ch));
        let (dx, dy) = (cw - w, ch - h);
        let (left, top) = match anchor {
            Anchor::Center => (dx / 2, dy / 2),
            Anchor::Top => (dx / 2, 0),
            Anchor::Bottom => (dx / 2, dy),
            Anchor::Left => (0, dy / 2),
            Anchor::Right => (dx, dy / 2),
        };
        Self::new(left, dx - left, top, dy - top)
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    pub fn padded_size(&self, width: usize, height: usize) -> (usize, usize) {
        (width + self.left + self.right, height + self.top + self.bottom)
    }
}

/// How the pad region of a frame is filled.
#[derive(Debug, Clone, PartialEq)]
pub enum PadFill {
    /// One value per channel; channels beyond the list repeat the last value.
    Solid(Vec<f32>),
    /// Each stripe takes the mean color of the adjacent content edge.
    EdgeMean,
    /// Each stripe repeats the adjacent edge row or column; corners repeat
    /// the corner pixel.
    EdgePixel,
    /// A scaled, blurred, desaturated and dimmed copy of the content.
    Blur,
}

/// How the pad region of a plane is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanePad {
    Constant(f32),
    Replicate,
}

pub fn pad_plane(plane: ArrayView2<f32>, pad: Padding, mode: PlanePad) -> Array2<f32> {
    let (h, w) = plane.dim();
    let (pw, ph) = pad.padded_size(w, h);
    Array2::from_shape_fn((ph, pw), |(y, x)| {
        let inside = y >= pad.top && y < pad.top + h && x >= pad.left && x < pad.left + w;
        if inside {
            return plane[[y - pad.top, x - pad.left]];
        }
        match mode {
            PlanePad::Constant(v) => v,
            PlanePad::Replicate => {
                let sy = (y as isize - pad.top as isize).clamp(0, h as isize - 1) as usize;
                let sx = (x as isize - pad.left as isize).clamp(0, w as isize - 1) as usize;
                plane[[sy, sx]]
            }
        }
    })
}

pub fn pad_frame(frame: ArrayView3<f32>, pad: Padding, fill: &PadFill) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let (pw, ph) = pad.padded_size(w, h);
    if pad.is_zero() {
        return frame.to_owned();
    }
    let mut out = match fill {
        PadFill::Solid(color) => {
            let value = |ch: usize| color.get(ch).or(color.last()).copied().unwrap_or(0.0);
            Array3::from_shape_fn((ph, pw, c), |(_, _, ch)| value(ch))
        }
        PadFill::EdgePixel => {
            return Array3::from_shape_fn((ph, pw, c), |(y, x, ch)| {
                let sy = (y as isize - pad.top as isize).clamp(0, h as isize - 1) as usize;
                let sx = (x as isize - pad.left as isize).clamp(0, w as isize - 1) as usize;
                frame[[sy, sx, ch]]
            });
        }
        PadFill::EdgeMean => {
            let mean_of = |view: ArrayView2<f32>| -> Vec<f32> {
                view.mean_axis(Axis(0)).map(|m| m.to_vec()).unwrap_or_else(|| vec![0.0; c])
            };
            let top = mean_of(frame.index_axis(Axis(0), 0));
            let bottom = mean_of(frame.index_axis(Axis(0), h - 1));
            let left = mean_of(frame.index_axis(Axis(1), 0));
            let right = mean_of(frame.index_axis(Axis(1), w - 1));
            // Left and right stripes span the full height, so they own the corners.
            Array3::from_shape_fn((ph, pw, c), |(y, x, ch)| {
                if x < pad.left {
                    left[ch]
                } else if x >= pad.left + w {
                    right[ch]
                } else if y < pad.top {
                    top[ch]
                } else {
                    bottom[ch]
                }
            })
        }
        PadFill::Blur => blurred_backdrop(frame, pw, ph),
    };
    out.slice_mut(s![pad.top..pad.top + h, pad.left..pad.left + w, ..]).assign(&frame);
    out
}

const BACKDROP_SIGMA_FACTOR: f32 = 0.006;
const BACKDROP_DIM: f32 = 0.35;
const BACKDROP_DESATURATE: f32 = 0.2;

// Cover-scaled copy of the content used behind pillarbox bars.
fn blurred_backdrop(frame: ArrayView3<f32>, width: usize, height: usize) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let crop = crop_rect_for_aspect(w, h, width, height, Anchor::Center);
    let cropped = crop_frame(frame, crop);
    let scaled = resize_frame(cropped.view(), width, height, Sampler::Bilinear);
    let sigma = BACKDROP_SIGMA_FACTOR * width.min(height) as f32;
    let mut blurred = gaussian_blur_frame(scaled.view(), sigma.max(1.0));
    if c >= 3 {
        for mut px in blurred.lanes_mut(Axis(2)) {
            let lum = 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2];
            for ch in 0..3 {
                px[ch] += BACKDROP_DESATURATE * (lum - px[ch]);
            }
        }
    }
    let color_channels = c.min(3);
    blurred
        .slice_mut(s![.., .., ..color_channels])
        .mapv_inplace(|v| (v * (1.0 - BACKDROP_DIM)).clamp(0.0, 1.0));
    blurred
}

/// Copy of the pixels inside `rect` (clipped to the frame).
pub fn crop_frame(frame: ArrayView3<f32>, rect: Rect) -> Array3<f32> {
    let (h, w, _) = frame.dim();
    let r = rect.clamp_to(w, h);
    frame.slice(s![r.y..r.y + r.height, r.x..r.x + r.width, ..]).to_owned()
}

pub fn crop_plane(plane: ArrayView2<f32>, rect: Rect) -> Array2<f32> {
    let (h, w) = plane.dim();
    let r = rect.clamp_to(w, h);
    plane.slice(s![r.y..r.y + r.height, r.x..r.x + r.width]).to_owned()
}

/// Largest rectangle of the target aspect ratio inside a `src_w` × `src_h`
/// source, positioned by `anchor`.
pub fn crop_rect_for_aspect(src_w: usize, src_h: usize, target_w: usize, target_h: usize, anchor: Anchor) -> Rect {
    let old_aspect = src_w as f64 / src_h.max(1) as f64;
    let new_aspect = target_w.max(1) as f64 / target_h.max(1) as f64;
    let (cw, ch) = if old_aspect > new_aspect {
        ((src_h as f64 * new_aspect).round() as usize, src_h)
    } else {
        (src_w, (src_w as f64 / new_aspect).round() as usize)
    };
    let (cw, ch) = (cw.clamp(1, src_w.max(1)), ch.clamp(1, src_h.max(1)));
    let (dx, dy) = (src_w.saturating_sub(cw), src_h.saturating_sub(ch));
    let (x, y) = match anchor {
        Anchor::Center => (dx / 2, dy / 2),
        Anchor::Top => (dx / 2, 0),
        Anchor::Bottom => (dx / 2, dy),
        Anchor::Left => (0, dy / 2),
        Anchor::Right => (dx, dy / 2),
    };
    Rect::new(x, y, cw, ch)
}

/// Fit policy mapping a source onto a target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Stretch,
    Resize,
    Pad,
    PadEdge,
    PadEdgePixel,
    Crop,
    PillarboxBlur,
    Letterbox,
}

impl Fit {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stretch" | "fill" => Some(Fit::Stretch),
            "resize" => Some(Fit::Resize),
            "pad" => Some(Fit::Pad),
            "pad_edge" => Some(Fit::PadEdge),
            "pad_edge_pixel" => Some(Fit::PadEdgePixel),
            "crop" => Some(Fit::Crop),
            "pillarbox_blur" => Some(Fit::PillarboxBlur),
            "letterbox" => Some(Fit::Letterbox),
            _ => None,
        }
    }

    pub fn pads(self) -> bool {
        matches!(self, Fit::Pad | Fit::PadEdge | Fit::PadEdgePixel | Fit::PillarboxBlur | Fit::Letterbox)
    }

    /// Frame fill for the pad region given a solid background.
    pub fn pad_fill(self, background: &[f32]) -> PadFill {
        match self {
            Fit::PadEdge => PadFill::EdgeMean,
            Fit::PadEdgePixel => PadFill::EdgePixel,
            Fit::PillarboxBlur => PadFill::Blur,
            _ => PadFill::Solid(background.to_vec()),
        }
    }

    /// Mask padding matching [`Fit::pad_fill`]: edge modes replicate, the rest pad with zero.
    pub fn plane_pad(self) -> PlanePad {
        match self {
            Fit::PadEdge | Fit::PadEdgePixel => PlanePad::Replicate,
            _ => PlanePad::Constant(0.0),
        }
    }
}

/// Size of a `w` × `h` source scaled uniformly to fit inside the target.
pub fn fit_inside(w: usize, h: usize, target_w: usize, target_h: usize) -> (usize, usize) {
    let ratio = (target_w as f64 / w.max(1) as f64).min(target_h as f64 / h.max(1) as f64);
    (
        ((w as f64 * ratio).round() as usize).clamp(1, target_w.max(1)),
        ((h as f64 * ratio).round() as usize).clamp(1, target_h.max(1)),
    )
}

/// Resolved geometry of one fit: an optional source crop, the resampled
/// size, and the padding around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub source_crop: Option<Rect>,
    pub scaled: (usize, usize),
    pub padding: Padding,
}

impl FitPlan {
    pub fn canvas(&self) -> (usize, usize) {
        self.padding.padded_size(self.scaled.0, self.scaled.1)
    }
}

pub fn plan_fit(src_w: usize, src_h: usize, target_w: usize, target_h: usize, fit: Fit, anchor: Anchor) -> FitPlan {
    let (tw, th) = (target_w.max(1), target_h.max(1));
    match fit {
        Fit::Stretch => FitPlan { source_crop: None, scaled: (tw, th), padding: Padding::default() },
        Fit::Resize => FitPlan {
            source_crop: None,
            scaled: fit_inside(src_w, src_h, tw, th),
            padding: Padding::default(),
        },
        Fit::Crop => FitPlan {
            source_crop: Some(crop_rect_for_aspect(src_w, src_h, tw, th, anchor)),
            scaled: (tw, th),
            padding: Padding::default(),
        },
        _ => {
            let scaled = fit_inside(src_w, src_h, tw, th);
            FitPlan { source_crop: None, scaled, padding: Padding::anchored((tw, th), scaled, anchor) }
        }
    }
}

pub fn apply_plan_frame(frame: ArrayView3<f32>, plan: &FitPlan, sampler: Sampler, fill: &PadFill) -> Array3<f32> {
    let cropped;
    let source = match plan.source_crop {
        Some(rect) => {
            cropped = crop_frame(frame, rect);
            cropped.view()
        }
        None => frame.view(),
    };
    let scaled = resize_frame(source, plan.scaled.0, plan.scaled.1, sampler);
    pad_frame(scaled.view(), plan.padding, fill)
}

pub fn apply_plan_plane(plane: ArrayView2<f32>, plan: &FitPlan, sampler: Sampler, pad: PlanePad) -> Array2<f32> {
    let cropped;
    let source = match plan.source_crop {
        Some(rect) => {
            cropped = crop_plane(plane, rect);
            cropped.view()
        }
        None => plane.view(),
    };
    let scaled = resize_plane(source, plan.scaled.0, plan.scaled.1, sampler);
    pad_plane(scaled.view(), plan.padding, pad)
}

/// Fit a frame onto a `target_w` × `target_h` canvas.
pub fn fit_frame(
    frame: ArrayView3<f32>,
    target_w: usize,
    target_h: usize,
    fit: Fit,
    sampler: Sampler,
    background: &[f32],
    anchor: Anchor,
) -> Array3<f32> {
    let (h, w, _) = frame.dim();
    let plan = plan_fit(w, h, target_w, target_h, fit, anchor);
    apply_plan_frame(frame, &plan, sampler, &fit.pad_fill(background))
}

pub fn fit_plane(plane: ArrayView2<f32>, target_w: usize, target_h: usize, fit: Fit, sampler: Sampler, anchor: Anchor) -> Array2<f32> {
    let (h, w) = plane.dim();
    let plan = plan_fit(w, h, target_w, target_h, fit, anchor);
    apply_plan_plane(plane, &plan, sampler, fit.plane_pad())
}

/// Flip a frame horizontally and/or vertically.
pub fn mirror_frame(frame: ArrayView3<f32>, horizontal: bool, vertical: bool) -> Array3<f32> {
    match (horizontal, vertical) {
        (true, true) => frame.slice(s![..;-1, ..;-1, ..]).to_owned(),
        (true, false) => frame.slice(s![.., ..;-1, ..]).to_owned(),
        (false, true) => frame.slice(s![..;-1, .., ..]).to_owned(),
        (false, false) => frame.to_owned(),
    }
}

pub fn mirror_plane(plane: ArrayView2<f32>, horizontal: bool, vertical: bool) -> Array2<f32> {
    match (horizontal, vertical) {
        (true, true) => plane.slice(s![..;-1, ..;-1]).to_owned(),
        (true, false) => plane.slice(s![.., ..;-1]).to_owned(),
        (false, true) => plane.slice(s![..;-1, ..]).to_owned(),
        (false, false) => plane.to_owned(),
    }
}

/// Canvas size that holds a `w` × `h` rectangle rotated by `degrees`.
pub fn rotated_size(w: usize, h: usize, degrees: f64) -> (usize, usize) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let nw = (w as f64 * cos.abs() + h as f64 * sin.abs() - 1e-6).ceil().max(1.0);
    let nh = (w as f64 * sin.abs() + h as f64 * cos.abs() - 1e-6).ceil().max(1.0);
    (nw as usize, nh as usize)
}

/// Rotate a plane counter-clockwise by `degrees`, expanding the canvas.
/// Uncovered pixels take `fill`. Only nearest and bilinear sampling are
/// distinguished; every other sampler interpolates bilinearly.
pub fn rotate_plane(plane: ArrayView2<f32>, degrees: f64, sampler: Sampler, fill: f32) -> Array2<f32> {
    let (h, w) = plane.dim();
    if degrees.rem_euclid(360.0) == 0.0 {
        return plane.to_owned();
    }
    let (nw, nh) = rotated_size(w, h, degrees);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (ocx, ocy) = (nw as f64 / 2.0, nh as f64 / 2.0);
    Array2::from_shape_fn((nh, nw), |(y, x)| {
        let dx = x as f64 + 0.5 - ocx;
        let dy = y as f64 + 0.5 - ocy;
        let sx = dx * cos - dy * sin + cx - 0.5;
        let sy = dx * sin + dy * cos + cy - 0.5;
        sample(plane, sx, sy, sampler, fill)
    })
}

fn sample(plane: ArrayView2<f32>, sx: f64, sy: f64, sampler: Sampler, fill: f32) -> f32 {
    let (h, w) = plane.dim();
    if sx < -0.5 || sy < -0.5 || sx > w as f64 - 0.5 || sy > h as f64 - 0.5 {
        return fill;
    }
    if sampler == Sampler::Nearest {
        let x = (sx.round() as isize).clamp(0, w as isize - 1) as usize;
        let y = (sy.round() as isize).clamp(0, h as isize - 1) as usize;
        return plane[[y, x]];
    }
    let x0 = sx.floor();
    let y0 = sy.floor();
    let (fx, fy) = ((sx - x0) as f32, (sy - y0) as f32);
    let at = |x: f64, y: f64| {
        let xi = (x as isize).clamp(0, w as isize - 1) as usize;
        let yi = (y as isize).clamp(0, h as isize - 1) as usize;
        plane[[yi, xi]]
    };
    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1.0, y0) * fx;
    let bottom = at(x0, y0 + 1.0) * (1.0 - fx) + at(x0 + 1.0, y0 + 1.0) * fx;
    top * (1.0 - fy) + bottom * fy
}

pub fn rotate_frame(frame: ArrayView3<f32>, degrees: f64, sampler: Sampler, fill: &[f32]) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let (nw, nh) = rotated_size(w, h, degrees);
    if degrees.rem_euclid(360.0) == 0.0 {
        return frame.to_owned();
    }
    let planes: Vec<Array2<f32>> = (0..c)
        .map(|ch| {
            let f = fill.get(ch).or(fill.last()).copied().unwrap_or(0.0);
            rotate_plane(frame.index_axis(Axis(2), ch), degrees, sampler, f)
        })
        .collect();
    stack_planes(&planes, nh, nw)
}

/// Which side a scale-to length applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleTo {
    None,
    Longest,
    Shortest,
    Width,
    Height,
    /// Length is in kilopixels.
    TotalPixel,
}

impl ScaleTo {
    pub const NAMES: [&'static str; 6] = ["None", "longest", "shortest", "width", "height", "total_pixel(kilo pixel)"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "None" | "none" => Some(ScaleTo::None),
            "longest" => Some(ScaleTo::Longest),
            "shortest" => Some(ScaleTo::Shortest),
            "width" => Some(ScaleTo::Width),
            "height" => Some(ScaleTo::Height),
            "total_pixel(kilo pixel)" | "total_pixel" => Some(ScaleTo::TotalPixel),
            _ => None,
        }
    }
}

/// Target size for an aspect ratio `ratio` (width / height) under a
/// scale-to policy, each side optionally rounded up to `multiple`.
pub fn aspect_target(
    orig_w: usize,
    orig_h: usize,
    ratio: f64,
    scale_to: ScaleTo,
    length: usize,
    multiple: Option<usize>,
) -> (usize, usize) {
    let l = length as f64;
    let by_width = |w: f64| (w as usize, (w / ratio) as usize);
    let by_height = |h: f64| ((h * ratio) as usize, h as usize);
    let (tw, th) = match scale_to {
        ScaleTo::Width => by_width(l),
        ScaleTo::Height => by_height(l),
        ScaleTo::TotalPixel => {
            let w = (ratio * l * 1000.0).sqrt();
            (w as usize, (w / ratio) as usize)
        }
        ScaleTo::Longest if ratio > 1.0 => by_width(l),
        ScaleTo::Longest => by_height(l),
        ScaleTo::Shortest if ratio > 1.0 => by_height(l),
        ScaleTo::Shortest => by_width(l),
        ScaleTo::None if ratio > 1.0 => by_width(orig_w as f64),
        ScaleTo::None => by_height(orig_h as f64),
    };
    match multiple {
        Some(m) => (round_up_to_multiple(tw, m), round_up_to_multiple(th, m)),
        None => (tw, th),
    }
}

/// Box detection strategy over a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxDetect {
    /// Support of the Gaussian-blurred mask.
    MinBoundingRect,
    /// Largest axis-aligned rectangle fully inside the mask.
    MaxInscribedRect,
    /// Support of the mask as given.
    MaskArea,
}

impl BoxDetect {
    pub const NAMES: [&'static str; 3] = ["min_bounding_rect", "max_inscribed_rect", "mask_area"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "min_bounding_rect" => Some(BoxDetect::MinBoundingRect),
            "max_inscribed_rect" => Some(BoxDetect::MaxInscribedRect),
            "mask_area" => Some(BoxDetect::MaskArea),
            _ => None,
        }
    }
}

pub const DETECT_BLUR_SIGMA: f32 = 20.0;

// Smallest value that survives 8-bit quantization as non-zero.
const SUPPORT_EPSILON: f32 = 0.5 / 255.0;

/// Bounding rectangle of the non-zero support; the whole plane when empty.
pub fn mask_bbox(plane: ArrayView2<f32>) -> Rect {
    let (h, w) = plane.dim();
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((y, x), v) in plane.indexed_iter() {
        if *v > SUPPORT_EPSILON {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    match bounds {
        Some((x0, y0, x1, y1)) => Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1),
        None => Rect::new(0, 0, w, h),
    }
}

/// Largest axis-aligned rectangle whose pixels are all ≥ 0.5, found row by
/// row with the largest-rectangle-in-histogram reduction. Falls back to the
/// whole plane when no pixel is set.
pub fn max_inscribed_rect(plane: ArrayView2<f32>) -> Rect {
    let (h, w) = plane.dim();
    let mut heights = vec![0usize; w];
    let mut best = Rect::new(0, 0, 0, 0);
    let mut best_area = 0usize;
    for y in 0..h {
        for x in 0..w {
            heights[x] = if plane[[y, x]] >= 0.5 { heights[x] + 1 } else { 0 };
        }
        let mut stack: Vec<usize> = Vec::with_capacity(w);
        for x in 0..=w {
            let cur = if x < w { heights[x] } else { 0 };
            while let Some(&top) = stack.last() {
                if heights[top] <= cur {
                    break;
                }
                stack.pop();
                let height = heights[top];
                let left = stack.last().map(|&l| l + 1).unwrap_or(0);
                let width = x - left;
                if height * width > best_area {
                    best_area = height * width;
                    best = Rect::new(left, y + 1 - height, width, height);
                }
            }
            stack.push(x);
        }
    }
    if best_area == 0 {
        Rect::new(0, 0, w, h)
    } else {
        best
    }
}

pub fn detect_box(plane: ArrayView2<f32>, detect: BoxDetect) -> Rect {
    match detect {
        BoxDetect::MinBoundingRect => mask_bbox(gaussian_blur_plane(plane, DETECT_BLUR_SIGMA).view()),
        BoxDetect::MaxInscribedRect => max_inscribed_rect(plane),
        BoxDetect::MaskArea => mask_bbox(plane),
    }
}

/// Grow a detected rectangle by per-side reserves, rounding its size up to
/// `multiple` first, and clip to the canvas. Negative reserves shrink it.
pub fn reserve_box(
    rect: Rect,
    multiple: usize,
    reserve: [i64; 4],
    canvas_w: usize,
    canvas_h: usize,
) -> KernelResult<CropBox> {
    let [top, bottom, left, right] = reserve;
    let width = round_up_to_multiple(rect.width, multiple) as i64;
    let height = round_up_to_multiple(rect.height, multiple) as i64;
    let (x, y) = (rect.x as i64, rect.y as i64);
    let x0 = (x - left).max(0);
    let y0 = (y - top).max(0);
    let x1 = (x + width + right).min(canvas_w as i64);
    let y1 = (y + height + bottom).min(canvas_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return Err(KernelError::InvalidArgument(format!(
            "crop box ({}, {}, {}, {}) is empty after applying reserves",
            x0, y0, x1, y1
        )));
    }
    Ok(CropBox::new(x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| (y * w + x) as f32 / (h * w) as f32)
    }

    #[test]
    fn test_sampler_names() {
        assert_eq!(Sampler::parse("nearest-exact"), Some(Sampler::Nearest));
        assert_eq!(Sampler::parse("area"), Some(Sampler::Box));
        assert_eq!(Sampler::parse("LANCZOS"), Some(Sampler::Lanczos));
        assert_eq!(Sampler::parse("spline"), None);
    }

    #[test]
    fn test_area_downscale_averages() {
        let plane = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let out = resize_plane(plane.view(), 1, 1, Sampler::Box);
        assert!((out[[0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_resize_frame_shape() {
        let frame = Array3::<f32>::from_elem((10, 20, 3), 0.5);
        let out = resize_frame(frame.view(), 7, 5, Sampler::Lanczos);
        assert_eq!(out.dim(), (5, 7, 3));
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-3));
    }

    #[test]
    fn test_gaussian_kernel_normalized_and_odd() {
        let k = gaussian_kernel_1d(2.0);
        assert_eq!(k.len() % 2, 1);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(gaussian_kernel_1d(0.0), vec![1.0]);
    }

    #[test]
    fn test_sized_kernel() {
        let k = gaussian_kernel_sized(5);
        assert_eq!(k.len(), 5);
        assert!(k[2] > k[1] && k[1] > k[0]);
        assert_eq!(gaussian_kernel_sized(4).len(), 5);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let plane = Array2::<f32>::from_elem((9, 9), 0.3);
        let out = gaussian_blur_plane(plane.view(), 3.0);
        assert!(out.iter().all(|v| (v - 0.3).abs() < 1e-5));
    }

    #[test]
    fn test_anchored_padding() {
        assert_eq!(Padding::anchored((10, 10), (4, 6), Anchor::Center), Padding::new(3, 3, 2, 2));
        assert_eq!(Padding::anchored((10, 10), (4, 6), Anchor::Bottom), Padding::new(3, 3, 4, 0));
        assert_eq!(Padding::anchored((10, 10), (4, 6), Anchor::Right), Padding::new(6, 0, 2, 2));
    }

    #[test]
    fn test_pad_edge_pixel_replicates() {
        let frame = Array3::from_shape_fn((2, 2, 1), |(y, x, _)| (y * 2 + x) as f32);
        let out = pad_frame(frame.view(), Padding::new(1, 1, 1, 1), &PadFill::EdgePixel);
        assert_eq!(out.dim(), (4, 4, 1));
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[0, 3, 0]], 1.0);
        assert_eq!(out[[3, 0, 0]], 2.0);
        assert_eq!(out[[3, 3, 0]], 3.0);
    }

    #[test]
    fn test_pad_edge_mean_stripes() {
        let frame = Array3::from_shape_fn((2, 2, 1), |(y, x, _)| (y * 2 + x) as f32);
        let out = pad_frame(frame.view(), Padding::new(0, 0, 1, 1), &PadFill::EdgeMean);
        assert_eq!(out[[0, 0, 0]], 0.5);
        assert_eq!(out[[3, 1, 0]], 2.5);
    }

    #[test]
    fn test_pillarbox_blur_keeps_content() {
        let frame = Array3::<f32>::from_elem((4, 4, 3), 0.8);
        let out = fit_frame(frame.view(), 8, 4, Fit::PillarboxBlur, Sampler::Bilinear, &[0.0], Anchor::Center);
        assert_eq!(out.dim(), (4, 8, 3));
        assert!((out[[1, 3, 0]] - 0.8).abs() < 1e-4);
        // bars are dimmed copies
        assert!(out[[1, 0, 0]] < 0.8 && out[[1, 0, 0]] > 0.3);
    }

    #[test]
    fn test_crop_rect_for_aspect() {
        let r = crop_rect_for_aspect(200, 100, 100, 100, Anchor::Center);
        assert_eq!(r, Rect::new(50, 0, 100, 100));
        let r = crop_rect_for_aspect(200, 100, 100, 100, Anchor::Right);
        assert_eq!(r.x, 100);
    }

    #[test]
    fn test_plan_fit_pad_letterboxes() {
        let plan = plan_fit(200, 100, 100, 100, Fit::Pad, Anchor::Center);
        assert_eq!(plan.scaled, (100, 50));
        assert_eq!(plan.padding, Padding::new(0, 0, 25, 25));
        assert_eq!(plan.canvas(), (100, 100));
        let plan = plan_fit(200, 100, 100, 100, Fit::Resize, Anchor::Center);
        assert_eq!(plan.canvas(), (100, 50));
    }

    #[test]
    fn test_mirror_and_rotate() {
        let plane = ramp(2, 3);
        let m = mirror_plane(plane.view(), true, false);
        assert_eq!(m[[0, 0]], plane[[0, 2]]);

        assert_eq!(rotated_size(30, 10, 90.0), (10, 30));
        let frame = plane.clone().insert_axis(Axis(2));
        let r = rotate_frame(frame.view(), 90.0, Sampler::Nearest, &[0.0]);
        assert_eq!(r.dim(), (3, 2, 1));
        // counter-clockwise: top-right pixel moves to top-left
        assert_eq!(r[[0, 0, 0]], plane[[0, 2]]);
    }

    #[test]
    fn test_aspect_target_rules() {
        assert_eq!(aspect_target(1000, 800, 16.0 / 9.0, ScaleTo::Longest, 1024, None), (1024, 576));
        assert_eq!(aspect_target(1000, 800, 9.0 / 16.0, ScaleTo::Longest, 1024, None), (576, 1024));
        assert_eq!(aspect_target(1000, 800, 1.0, ScaleTo::TotalPixel, 1024, Some(8)), (1016, 1016));
        assert_eq!(aspect_target(1000, 800, 2.0, ScaleTo::None, 1024, None), (1000, 500));
        assert_eq!(aspect_target(1000, 800, 0.5, ScaleTo::None, 1024, Some(64)), (448, 832));
    }

    #[test]
    fn test_max_inscribed_rect() {
        let mut plane = Array2::<f32>::zeros((6, 6));
        plane.slice_mut(s![1..5, 1..3]).fill(1.0);
        plane.slice_mut(s![2..4, 1..6]).fill(1.0);
        // the 5x2 bar (area 10) beats the 2x4 column (area 8)
        assert_eq!(max_inscribed_rect(plane.view()), Rect::new(1, 2, 5, 2));
        assert_eq!(mask_bbox(plane.view()), Rect::new(1, 1, 5, 4));
    }

    #[test]
    fn test_reserve_box_clips() {
        let b = reserve_box(Rect::new(4, 4, 5, 5), 8, [2, 2, 2, 2], 12, 12).unwrap();
        assert_eq!(b, CropBox::new(2, 2, 12, 12));
        assert!(reserve_box(Rect::new(4, 4, 5, 5), 8, [0, -20, 0, 0], 12, 12).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_up_is_multiple(v in 0usize..10_000, m in 1usize..600) {
            let r = round_up_to_multiple(v, m);
            prop_assert!(r >= v);
            prop_assert_eq!(r % m, 0);
            prop_assert!(r - v < m);
        }

        #[test]
        fn prop_fit_inside_stays_inside(w in 1usize..500, h in 1usize..500, tw in 1usize..500, th in 1usize..500) {
            let (fw, fh) = fit_inside(w, h, tw, th);
            prop_assert!(fw <= tw && fh <= th);
            prop_assert!(fw == tw || fh == th || fw == 1 || fh == 1);
        }
    }
}
