//! Compositing kernel: masked paste, blend-and-transform, outpaint padding,
//! mask-driven cropping and paste-back.
//!
//! Every routine works frame by frame on [`ImageTensor`] / [`MaskTensor`]
//! batches. Where two batches of different length meet, the shorter one is
//! extended by repeating its last item.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::{CropBox, ImageTensor, MaskTensor};
use crate::kernels::bridge::{frame_to_rgb, rgb_to_frame, with_channels};
use crate::kernels::geometry::{
    crop_frame, crop_plane, detect_box, fit_frame, fit_plane, mirror_frame, mirror_plane, pad_frame,
    reserve_box, resize_frame, resize_plane, rotate_frame, rotate_plane, round_up_to_multiple, Anchor,
    BoxDetect, Fit, PadFill, Padding, Rect, Sampler,
};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};

// ============================================================================
// Masked composite
// ============================================================================

/// Batch length two operands broadcast to: equal, or one side is 1.
fn broadcast_batch(context: &str, left: usize, right: usize) -> KernelResult<usize> {
    match (left, right) {
        (l, r) if l == r => Ok(l),
        (1, r) => Ok(r),
        (l, 1) => Ok(l),
        (l, r) => Err(KernelError::shape_mismatch(context, &[l], &[r])),
    }
}

/// Paste `source` onto `destination` with its top-left corner at (x, y).
///
/// Negative offsets crop the source; the part falling outside the
/// destination is clipped. With `resize_source` the source is first scaled
/// to the destination size. The optional mask is scaled to the source and
/// used as alpha; without it the source replaces the destination pixels.
pub fn composite_masked(
    destination: &ImageTensor,
    source: &ImageTensor,
    x: i64,
    y: i64,
    resize_source: bool,
    mask: Option<&MaskTensor>,
) -> KernelResult<ImageTensor> {
    let batch = broadcast_batch("composite batch", destination.batch(), source.batch())?;
    let channels = destination.channels();
    let (dh, dw) = (destination.height(), destination.width());

    let mut frames = Vec::with_capacity(batch);
    for i in 0..batch {
        let mut src = with_channels(source.frame_clamped(i), channels);
        if resize_source {
            src = resize_frame(src.view(), dw, dh, Sampler::Bilinear);
        }
        let (sh, sw, _) = src.dim();
        let alpha = mask.map(|m| resize_plane(m.frame_clamped(i), sw, sh, Sampler::Bilinear));
        let mut out = destination.frame_clamped(i).to_owned();
        paste_region(&mut out, src.view(), alpha.as_ref().map(|a| a.view()), x, y);
        frames.push(out);
    }
    ImageTensor::from_frames(frames)
}

/// The overlap of a `sw` × `sh` layer placed at (x, y) with a `dw` × `dh`
/// canvas, as (canvas x, canvas y, layer x, layer y, width, height).
fn overlap(x: i64, y: i64, sw: usize, sh: usize, dw: usize, dh: usize) -> Option<(usize, usize, usize, usize, usize, usize)> {
    let left = x.max(0);
    let top = y.max(0);
    let sx = (-x).max(0);
    let sy = (-y).max(0);
    let width = (sw as i64 - sx).min(dw as i64 - left);
    let height = (sh as i64 - sy).min(dh as i64 - top);
    if width <= 0 || height <= 0 {
        return None;
    }
    Some((left as usize, top as usize, sx as usize, sy as usize, width as usize, height as usize))
}

fn paste_region(canvas: &mut Array3<f32>, layer: ArrayView3<f32>, alpha: Option<ArrayView2<f32>>, x: i64, y: i64) {
    let (dh, dw, channels) = canvas.dim();
    let (sh, sw, _) = layer.dim();
    let Some((cx, cy, lx, ly, w, h)) = overlap(x, y, sw, sh, dw, dh) else {
        return;
    };
    for yy in 0..h {
        for xx in 0..w {
            let a = alpha.map(|m| m[[ly + yy, lx + xx]]).unwrap_or(1.0);
            for c in 0..channels {
                let d = canvas[[cy + yy, cx + xx, c]];
                canvas[[cy + yy, cx + xx, c]] = d * (1.0 - a) + layer[[ly + yy, lx + xx, c]] * a;
            }
        }
    }
}

// ============================================================================
// Blend modes
// ============================================================================

/// Layer blend mode applied per pixel before alpha compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    ColorDodge,
    ColorBurn,
    Darken,
    Lighten,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Addition,
    Subtract,
}

impl BlendMode {
    pub const NAMES: [&'static str; 18] = [
        "normal",
        "multiply",
        "screen",
        "overlay",
        "soft_light",
        "hard_light",
        "color_dodge",
        "color_burn",
        "darken",
        "lighten",
        "difference",
        "exclusion",
        "hue",
        "saturation",
        "color",
        "luminosity",
        "addition",
        "subtract",
    ];

    const ALL: [BlendMode; 18] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
        BlendMode::Addition,
        BlendMode::Subtract,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase().replace([' ', '-'], "_");
        Self::NAMES.iter().position(|n| *n == key).map(|i| Self::ALL[i])
    }

    /// Blend a layer pixel `l` over a base pixel `b`, both unit RGB.
    pub fn apply(self, b: [f32; 3], l: [f32; 3]) -> [f32; 3] {
        let sep = |f: fn(f32, f32) -> f32| [f(b[0], l[0]), f(b[1], l[1]), f(b[2], l[2])];
        match self {
            BlendMode::Normal => l,
            BlendMode::Multiply => sep(|b, l| b * l),
            BlendMode::Screen => sep(|b, l| b + l - b * l),
            BlendMode::Overlay => sep(|b, l| hard_light(l, b)),
            BlendMode::HardLight => sep(hard_light),
            BlendMode::SoftLight => sep(soft_light),
            BlendMode::ColorDodge => sep(|b, l| if b <= 0.0 { 0.0 } else if l >= 1.0 { 1.0 } else { (b / (1.0 - l)).min(1.0) }),
            BlendMode::ColorBurn => sep(|b, l| if b >= 1.0 { 1.0 } else if l <= 0.0 { 0.0 } else { 1.0 - ((1.0 - b) / l).min(1.0) }),
            BlendMode::Darken => sep(f32::min),
            BlendMode::Lighten => sep(f32::max),
            BlendMode::Difference => sep(|b, l| (b - l).abs()),
            BlendMode::Exclusion => sep(|b, l| b + l - 2.0 * b * l),
            BlendMode::Addition => sep(|b, l| (b + l).min(1.0)),
            BlendMode::Subtract => sep(|b, l| (b - l).max(0.0)),
            BlendMode::Hue => set_lum(set_sat(l, sat(b)), lum(b)),
            BlendMode::Saturation => set_lum(set_sat(b, sat(l)), lum(b)),
            BlendMode::Color => set_lum(l, lum(b)),
            BlendMode::Luminosity => set_lum(b, lum(l)),
        }
    }
}

fn hard_light(b: f32, l: f32) -> f32 {
    if l <= 0.5 {
        b * 2.0 * l
    } else {
        let s = 2.0 * l - 1.0;
        b + s - b * s
    }
}

fn soft_light(b: f32, l: f32) -> f32 {
    if l <= 0.5 {
        b - (1.0 - 2.0 * l) * b * (1.0 - b)
    } else {
        let d = if b <= 0.25 { ((16.0 * b - 12.0) * b + 4.0) * b } else { b.sqrt() };
        b + (2.0 * l - 1.0) * (d - b)
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > f32::EPSILON {
        out = out.map(|v| l + (v - l) * l / (l - n));
    }
    if x > 1.0 && x - l > f32::EPSILON {
        out = out.map(|v| l + (v - l) * (1.0 - l) / (x - l));
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color(c.map(|v| v + d))
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    if max - min <= f32::EPSILON {
        return [0.0; 3];
    }
    c.map(|v| (v - min) * s / (max - min))
}

// ============================================================================
// Blend-and-transform
// ============================================================================

/// Layer mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirror {
    #[default]
    None,
    Horizontal,
    Vertical,
}

impl Mirror {
    pub const NAMES: [&'static str; 3] = ["None", "horizontal", "vertical"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "none" | "" => Some(Mirror::None),
            "horizontal" => Some(Mirror::Horizontal),
            "vertical" => Some(Mirror::Vertical),
            _ => None,
        }
    }
}

/// Placement and blending of a layer over a background.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendOptions {
    pub mode: BlendMode,
    /// Unit opacity.
    pub opacity: f32,
    pub invert_mask: bool,
    /// Layer center as a percentage of the canvas width and height.
    pub x_percent: f64,
    pub y_percent: f64,
    pub mirror: Mirror,
    pub scale: f64,
    pub aspect_ratio: f64,
    /// Counter-clockwise rotation in degrees.
    pub rotate: f64,
    pub sampler: Sampler,
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self {
            mode: BlendMode::Normal,
            opacity: 1.0,
            invert_mask: true,
            x_percent: 50.0,
            y_percent: 50.0,
            mirror: Mirror::None,
            scale: 1.0,
            aspect_ratio: 1.0,
            rotate: 0.0,
            sampler: Sampler::Lanczos,
        }
    }
}

/// Transform `layer`, place it on `background` and blend it there.
///
/// The layer mask comes from `layer_mask` (inverted when
/// `opts.invert_mask`), else from the layer's alpha channel, else it is
/// opaque. Without a background the canvas is a transparent RGBA frame of
/// the layer size and the result carries the placed mask as alpha.
/// Returns the composite and the placed mask.
pub fn blend_advance(
    background: Option<&ImageTensor>,
    layer: &ImageTensor,
    layer_mask: Option<&MaskTensor>,
    opts: &BlendOptions,
) -> KernelResult<(ImageTensor, MaskTensor)> {
    let batch = [
        Some(layer.batch()),
        background.map(|b| b.batch()),
        layer_mask.map(|m| m.batch()),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(1);
    let opacity = opts.opacity.clamp(0.0, 1.0);

    let mut images = Vec::with_capacity(batch);
    let mut masks = Vec::with_capacity(batch);
    for i in 0..batch {
        let layer_frame = layer.frame_clamped(i);
        let (lh, lw, lc) = layer_frame.dim();
        let mask = match layer_mask {
            Some(m) => {
                let plane = resize_plane(m.frame_clamped(i), lw, lh, Sampler::Bilinear);
                if opts.invert_mask {
                    plane.mapv(|v| 1.0 - v)
                } else {
                    plane
                }
            }
            None if lc == 4 => layer_frame.index_axis(Axis(2), 3).to_owned(),
            None => Array2::ones((lh, lw)),
        };
        let rgb = with_channels(layer_frame, 3);

        let tw = ((lw as f64 * opts.scale) as usize).max(1);
        let th = ((lh as f64 * opts.scale * opts.aspect_ratio) as usize).max(1);
        let (flip_h, flip_v) = (opts.mirror == Mirror::Horizontal, opts.mirror == Mirror::Vertical);
        let rgb = mirror_frame(rgb.view(), flip_h, flip_v);
        let mask = mirror_plane(mask.view(), flip_h, flip_v);
        let rgb = resize_frame(rgb.view(), tw, th, opts.sampler);
        let mask = resize_plane(mask.view(), tw, th, Sampler::Bilinear);
        let rgb = rotate_frame(rgb.view(), opts.rotate, opts.sampler, &[0.0]);
        let mask = rotate_plane(mask.view(), opts.rotate, Sampler::Bilinear, 0.0).mapv(|v| v.clamp(0.0, 1.0));

        let (canvas, transparent) = match background {
            Some(bg) => (with_channels(bg.frame_clamped(i), 3), false),
            None => (Array3::zeros((lh, lw, 3)), true),
        };
        let (ch, cw, _) = canvas.dim();
        let (rh, rw, _) = rgb.dim();
        let x = (cw as f64 * opts.x_percent / 100.0 - rw as f64 / 2.0) as i64;
        let y = (ch as f64 * opts.y_percent / 100.0 - rh as f64 / 2.0) as i64;

        let mut out = canvas;
        let mut placed = Array2::<f32>::zeros((ch, cw));
        if let Some((cx, cy, lx, ly, w, h)) = overlap(x, y, rw, rh, cw, ch) {
            for yy in 0..h {
                for xx in 0..w {
                    let (oy, ox) = (cy + yy, cx + xx);
                    let (sy, sx) = (ly + yy, lx + xx);
                    let a = mask[[sy, sx]];
                    placed[[oy, ox]] = a;
                    let b = [out[[oy, ox, 0]], out[[oy, ox, 1]], out[[oy, ox, 2]]];
                    let l = [rgb[[sy, sx, 0]], rgb[[sy, sx, 1]], rgb[[sy, sx, 2]]];
                    let blended = if transparent { l } else { opts.mode.apply(b, l) };
                    for c in 0..3 {
                        let mixed = blended[c] * opacity + b[c] * (1.0 - opacity);
                        out[[oy, ox, c]] = (b[c] * (1.0 - a) + mixed * a).clamp(0.0, 1.0);
                    }
                }
            }
        }
        if transparent {
            let mut rgba = with_channels(out.view(), 4);
            rgba.index_axis_mut(Axis(2), 3).assign(&placed.mapv(|v| v * opacity));
            out = rgba;
        }
        images.push(out);
        masks.push(placed);
    }
    Ok((ImageTensor::from_frames(images)?, MaskTensor::from_frames(masks)?))
}

// ============================================================================
// Outpaint padding
// ============================================================================

/// Unit of the outpaint pad amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadUnit {
    Pixel,
    Percent,
}

impl PadUnit {
    pub const NAMES: [&'static str; 2] = ["pixel", "percent"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "pixel" | "pixels" => Some(PadUnit::Pixel),
            "percent" | "percentage" => Some(PadUnit::Percent),
            _ => None,
        }
    }

    /// Resolve `[left, top, right, bottom]` amounts for a `width` × `height`
    /// image. Percentages of the horizontal sides are taken of the width,
    /// vertical sides of the height.
    pub fn resolve(self, amounts: [f64; 4], width: usize, height: usize) -> Padding {
        let [left, top, right, bottom] = amounts.map(|v| v.max(0.0));
        let px = |v: f64, extent: usize| match self {
            PadUnit::Pixel => v as usize,
            PadUnit::Percent => (extent as f64 * v / 100.0) as usize,
        };
        Padding::new(px(left, width), px(right, width), px(top, height), px(bottom, height))
    }
}

/// Feather weights for the original-image region of an outpaint canvas.
///
/// A pixel at distance `d` from the nearest padded edge gets
/// `((f − d) / f)²` when `d < f`, else 0. Edges that are not padded never
/// count. Disabled unless `2f` is below both image dimensions.
pub fn outpaint_feather(height: usize, width: usize, padding: Padding, feathering: usize) -> Array2<f32> {
    let mut t = Array2::<f32>::zeros((height, width));
    if feathering == 0 || feathering * 2 >= height || feathering * 2 >= width {
        return t;
    }
    let f = feathering as f32;
    for ((i, j), v) in t.indexed_iter_mut() {
        let dt = if padding.top != 0 { i } else { height };
        let db = if padding.bottom != 0 { height - i } else { height };
        let dl = if padding.left != 0 { j } else { width };
        let dr = if padding.right != 0 { width - j } else { width };
        let d = dt.min(db).min(dl).min(dr);
        if d < feathering {
            let w = (f - d as f32) / f;
            *v = w * w;
        }
    }
    t
}

/// Grow every frame by `padding`, filling the new area with `background`.
///
/// The mask is 1 over the pad region. Inside the original area it is the
/// feather weight, combined by maximum with the inverse of `mask` when a
/// non-empty mask is supplied.
pub fn pad_for_outpaint(
    image: &ImageTensor,
    mask: Option<&MaskTensor>,
    padding: Padding,
    feathering: usize,
    background: [f32; 3],
) -> KernelResult<(ImageTensor, MaskTensor)> {
    let (h, w) = (image.height(), image.width());
    let mask = mask.filter(|m| m.array().iter().any(|v| *v > 0.0));
    let feather = outpaint_feather(h, w, padding, feathering);
    let (pw, ph) = padding.padded_size(w, h);

    let mut fill = background.to_vec();
    if image.channels() == 4 {
        fill.push(1.0);
    }
    let mut frames = Vec::with_capacity(image.batch());
    let mut masks = Vec::with_capacity(image.batch());
    for i in 0..image.batch() {
        frames.push(pad_frame(image.frame(i), padding, &PadFill::Solid(fill.clone())));
        let interior = match mask {
            Some(m) => {
                let plane = resize_plane(m.frame_clamped(i), w, h, Sampler::Bilinear);
                ndarray::Zip::from(&plane).and(&feather).map_collect(|m, t| (1.0 - m).max(*t))
            }
            None => feather.clone(),
        };
        let mut plane = Array2::<f32>::ones((ph, pw));
        plane
            .slice_mut(s![padding.top..padding.top + h, padding.left..padding.left + w])
            .assign(&interior);
        masks.push(plane);
    }
    Ok((ImageTensor::from_frames(frames)?, MaskTensor::from_frames(masks)?))
}

// ============================================================================
// Crop by mask
// ============================================================================

/// Result of [`crop_by_mask`].
#[derive(Debug, Clone)]
pub struct MaskCrop {
    pub images: ImageTensor,
    pub masks: MaskTensor,
    /// Box detected on the first mask, reserves applied.
    pub crop_box: CropBox,
    /// First mask with the detected box in red and the reserved box in green.
    pub preview: ImageTensor,
}

/// Crop each image to the box its mask selects.
///
/// Detection sizes are rounded up to `multiple` before `reserve`
/// (`[top, bottom, left, right]`) is applied. Missing masks reuse the last
/// one. Crops whose size differs from the first one are resampled to it so
/// the batch stays rectangular.
pub fn crop_by_mask(
    image: &ImageTensor,
    mask: &MaskTensor,
    invert: bool,
    detect: BoxDetect,
    reserve: [i64; 4],
    multiple: usize,
) -> KernelResult<MaskCrop> {
    let (h, w) = (image.height(), image.width());
    let planes: Vec<Array2<f32>> = (0..image.batch())
        .map(|i| {
            let plane = resize_plane(mask.frame_clamped(i), w, h, Sampler::Bilinear);
            if invert {
                plane.mapv(|v| 1.0 - v)
            } else {
                plane
            }
        })
        .collect();

    let first_detected = detect_box(planes[0].view(), detect);
    let crop_box = reserve_box(first_detected, multiple, reserve, w, h)?;
    let preview = box_preview(planes[0].view(), first_detected, crop_box);

    let mut images = Vec::with_capacity(planes.len());
    let mut masks = Vec::with_capacity(planes.len());
    let (bw, bh) = (crop_box.width() as usize, crop_box.height() as usize);
    for (i, plane) in planes.iter().enumerate() {
        let rect = if i == 0 {
            Rect::from_crop_box(crop_box)
        } else {
            Rect::from_crop_box(reserve_box(detect_box(plane.view(), detect), multiple, reserve, w, h)?)
        };
        log::debug!("crop by mask: image {} box {:?}", i + 1, rect);
        let mut frame = crop_frame(image.frame(i), rect);
        let mut cropped = crop_plane(plane.view(), rect);
        if (rect.width, rect.height) != (bw, bh) {
            frame = resize_frame(frame.view(), bw, bh, Sampler::Bilinear);
            cropped = resize_plane(cropped.view(), bw, bh, Sampler::Bilinear);
        }
        images.push(frame);
        masks.push(cropped);
    }
    Ok(MaskCrop {
        images: ImageTensor::from_frames(images)?,
        masks: MaskTensor::from_frames(masks)?,
        crop_box,
        preview: ImageTensor::from_frames(vec![preview])?,
    })
}

fn box_preview(plane: ArrayView2<f32>, detected: Rect, reserved: CropBox) -> Array3<f32> {
    let (h, w) = plane.dim();
    let gray = Array3::from_shape_fn((h, w, 3), |(y, x, _)| plane[[y, x]]);
    let mut canvas = frame_to_rgb(gray.view());
    draw_frame(&mut canvas, detected, (w + h) / 100, Rgb([255, 0, 0]));
    draw_frame(&mut canvas, Rect::from_crop_box(reserved), (w + h) / 200, Rgb([0, 255, 0]));
    rgb_to_frame(&canvas)
}

// Hollow rectangle `line` pixels thick, growing inwards.
fn draw_frame(canvas: &mut image::RgbImage, rect: Rect, line: usize, color: Rgb<u8>) {
    for k in 0..line.max(1) {
        if rect.width <= 2 * k || rect.height <= 2 * k {
            break;
        }
        let r = imageproc::rect::Rect::at((rect.x + k) as i32, (rect.y + k) as i32)
            .of_size((rect.width - 2 * k) as u32, (rect.height - 2 * k) as u32);
        draw_hollow_rect_mut(canvas, r, color);
    }
}

// ============================================================================
// Crop by mask and resize
// ============================================================================

/// Settings for [`crop_by_mask_and_resize`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedCrop {
    /// Length of the longer output side before rounding to 16.
    pub base_resolution: usize,
    /// Pixels added on each side of every detected box.
    pub padding: usize,
    pub min_width: usize,
    pub max_width: usize,
    pub min_height: usize,
    pub max_height: usize,
    pub policy: Fit,
    pub sampler: Sampler,
}

impl Default for UnifiedCrop {
    fn default() -> Self {
        Self {
            base_resolution: 512,
            padding: 0,
            min_width: 128,
            max_width: 512,
            min_height: 128,
            max_height: 512,
            policy: Fit::PillarboxBlur,
            sampler: Sampler::Lanczos,
        }
    }
}

/// Unified-crop resize policies and the fit each maps to.
pub const UNIFIED_POLICIES: [(&str, Fit); 4] = [
    ("fill", Fit::PillarboxBlur),
    ("crop", Fit::Crop),
    ("letterbox", Fit::Letterbox),
    ("stretch", Fit::Stretch),
];

pub fn parse_unified_policy(name: &str) -> Option<Fit> {
    let key = name.trim().to_lowercase();
    UNIFIED_POLICIES.iter().find(|(n, _)| *n == key).map(|(_, f)| *f)
}

// Detector box of one mask: the rounded support's center, its size
// constrained by the limits, then padded and kept inside the plane.
fn padded_support_box(plane: ArrayView2<f32>, cfg: &UnifiedCrop) -> Rect {
    let (h, w) = plane.dim();
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((y, x), v) in plane.indexed_iter() {
        if v.round() >= 1.0 {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    let (xc, yc, bw, bh) = match bounds {
        Some((x0, y0, x1, y1)) => ((x0 + x1) as f64 / 2.0, (y0 + y1) as f64 / 2.0, x1 - x0, y1 - y0),
        None => (w as f64 / 2.0, h as f64 / 2.0, 0, 0),
    };
    let bw = bw.max(cfg.min_width).min(cfg.max_width.max(1));
    let bh = bh.max(cfg.min_height).min(cfg.max_height.max(1));
    let axis = |center: f64, size: usize, limit: usize| -> (usize, usize) {
        if limit <= size {
            return (0, limit);
        }
        let span = (size + 2 * cfg.padding).min(limit);
        let start = (center - size as f64 / 2.0 - cfg.padding as f64).max(0.0) as usize;
        (start.min(limit - span), span)
    };
    let (x0, cw) = axis(xc, bw, w);
    let (y0, ch) = axis(yc, bh, h);
    Rect::new(x0, y0, cw, ch)
}

/// Crop a batch around its masks with one shared crop size, then resize all
/// crops to one target size. Both output sides are multiples of 16.
///
/// Returns the images, the masks and the unified per-image boxes.
pub fn crop_by_mask_and_resize(
    image: &ImageTensor,
    mask: &MaskTensor,
    cfg: &UnifiedCrop,
) -> KernelResult<(ImageTensor, MaskTensor, Vec<CropBox>)> {
    let (h, w) = (image.height(), image.width());
    if mask.height() != h || mask.width() != w {
        return Err(KernelError::shape_mismatch(
            "crop by mask and resize",
            &[h, w],
            &[mask.height(), mask.width()],
        ));
    }
    let boxes: Vec<Rect> = (0..image.batch())
        .map(|i| padded_support_box(mask.frame_clamped(i), cfg))
        .collect();

    let max_w = round_up_to_multiple(boxes.iter().map(|r| r.width).max().unwrap_or(w), 16);
    let max_h = round_up_to_multiple(boxes.iter().map(|r| r.height).max().unwrap_or(h), 16);
    let aspect = boxes
        .iter()
        .map(|r| if r.height > 0 { r.width as f64 / r.height as f64 } else { 1.0 })
        .fold(f64::MIN, f64::max)
        .max(f64::MIN_POSITIVE);
    let base = cfg.base_resolution.max(1) as f64;
    let (tw, th) = if aspect > 1.0 {
        (base, base / aspect)
    } else {
        (base * aspect, base)
    };
    let tw = round_up_to_multiple((tw as usize).max(1), 16);
    let th = round_up_to_multiple((th as usize).max(1), 16);

    let mut frames = Vec::with_capacity(boxes.len());
    let mut planes = Vec::with_capacity(boxes.len());
    let mut unified = Vec::with_capacity(boxes.len());
    for (i, r) in boxes.iter().enumerate() {
        let xc = r.x as f64 + r.width as f64 / 2.0;
        let yc = r.y as f64 + r.height as f64 / 2.0;
        let x0 = (xc - max_w as f64 / 2.0).max(0.0) as usize;
        let y0 = (yc - max_h as f64 / 2.0).max(0.0) as usize;
        let x1 = (x0 + max_w).min(w);
        let y1 = (y0 + max_h).min(h);
        let rect = Rect::new(x1.saturating_sub(max_w), y1.saturating_sub(max_h), 0, 0);
        let rect = Rect::new(rect.x, rect.y, x1 - rect.x, y1 - rect.y);

        let frame = crop_frame(image.frame(i), rect);
        let plane = crop_plane(mask.frame_clamped(i), rect);
        frames.push(fit_frame(frame.view(), tw, th, cfg.policy, cfg.sampler, &[0.0], Anchor::Center));
        planes.push(fit_plane(plane.view(), tw, th, cfg.policy, Sampler::Bilinear, Anchor::Center));
        unified.push(rect.to_crop_box());
    }
    Ok((ImageTensor::from_frames(frames)?, MaskTensor::from_frames(planes)?, unified))
}

// ============================================================================
// Paste-back
// ============================================================================

/// Paste `cropped` into `background` at `crop_box`.
///
/// The alpha is `cropped_mask` (inverted when `invert`), else the crop's
/// alpha channel, else opaque. Crops whose size differs from the box are
/// resampled to it. Returns the composite and a full-size mask that is zero
/// outside the box and equal to the alpha inside.
pub fn paste_back(
    background: &ImageTensor,
    cropped: &ImageTensor,
    cropped_mask: Option<&MaskTensor>,
    invert: bool,
    crop_box: CropBox,
) -> KernelResult<(ImageTensor, MaskTensor)> {
    let (h, w) = (background.height(), background.width());
    if !crop_box.fits(w as u32, h as u32) {
        return Err(KernelError::InvalidArgument(format!(
            "crop box ({}, {}, {}, {}) does not fit a {}x{} background",
            crop_box.x0, crop_box.y0, crop_box.x1, crop_box.y1, w, h
        )));
    }
    let rect = Rect::from_crop_box(crop_box);
    let batch = [
        Some(background.batch()),
        Some(cropped.batch()),
        cropped_mask.map(|m| m.batch()),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(1);

    let channels = background.channels();
    let mut frames = Vec::with_capacity(batch);
    let mut masks = Vec::with_capacity(batch);
    for i in 0..batch {
        let layer_frame = cropped.frame_clamped(i);
        let (lh, lw, lc) = layer_frame.dim();
        let alpha = match cropped_mask {
            Some(m) => {
                let plane = m.frame_clamped(i).to_owned();
                if invert {
                    plane.mapv(|v| 1.0 - v)
                } else {
                    plane
                }
            }
            None if lc == 4 => layer_frame.index_axis(Axis(2), 3).to_owned(),
            None => Array2::ones((lh, lw)),
        };
        let mut layer = with_channels(layer_frame, channels);
        if (lw, lh) != (rect.width, rect.height) {
            log::debug!(
                "paste back: resampling {}x{} crop to {}x{} box",
                lw,
                lh,
                rect.width,
                rect.height
            );
            layer = resize_frame(layer.view(), rect.width, rect.height, Sampler::Bilinear);
        }
        let alpha = resize_plane(alpha.view(), rect.width, rect.height, Sampler::Bilinear);

        let mut canvas = background.frame_clamped(i).to_owned();
        paste_region(&mut canvas, layer.view(), Some(alpha.view()), rect.x as i64, rect.y as i64);
        let mut full = Array2::<f32>::zeros((h, w));
        full.slice_mut(s![rect.y..rect.y + rect.height, rect.x..rect.x + rect.width])
            .assign(&alpha);
        frames.push(canvas);
        masks.push(full);
    }
    Ok((ImageTensor::from_frames(frames)?, MaskTensor::from_frames(masks)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use proptest::prelude::*;

    fn ramp_image(batch: usize, h: usize, w: usize) -> ImageTensor {
        let data = Array4::from_shape_fn((batch, h, w, 3), |(b, y, x, c)| {
            ((b * 7 + y * w + x + c) % 97) as f32 / 96.0
        });
        ImageTensor::new(data).unwrap()
    }

    fn square_mask(h: usize, w: usize, rect: Rect) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let inside = x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height;
            if inside {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_composite_clips_negative_offset() {
        let dest = ImageTensor::filled(1, 4, 4, &[0.0, 0.0, 0.0]).unwrap();
        let src = ImageTensor::filled(1, 2, 2, &[1.0, 1.0, 1.0]).unwrap();
        let out = composite_masked(&dest, &src, -1, -1, false, None).unwrap();
        let f = out.frame(0);
        assert_eq!(f[[0, 0, 0]], 1.0);
        assert_eq!(f[[0, 1, 0]], 0.0);
        assert_eq!(f[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_composite_alpha_blends() {
        let dest = ImageTensor::filled(1, 2, 2, &[0.0, 0.0, 0.0]).unwrap();
        let src = ImageTensor::filled(1, 2, 2, &[1.0, 1.0, 1.0]).unwrap();
        let mask = MaskTensor::filled(1, 2, 2, 0.25).unwrap();
        let out = composite_masked(&dest, &src, 0, 0, false, Some(&mask)).unwrap();
        assert!(out.array().iter().all(|v| (*v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_composite_batch_mismatch() {
        let dest = ImageTensor::filled(2, 2, 2, &[0.0]).unwrap();
        let src = ImageTensor::filled(3, 2, 2, &[1.0]).unwrap();
        assert!(matches!(
            composite_masked(&dest, &src, 0, 0, false, None),
            Err(KernelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_blend_mode_formulas() {
        let b = [0.5, 0.2, 0.8];
        let l = [0.5, 0.5, 0.5];
        assert_eq!(BlendMode::Multiply.apply(b, l), [0.25, 0.1, 0.4]);
        assert_eq!(BlendMode::Darken.apply(b, l), [0.5, 0.2, 0.5]);
        assert_eq!(BlendMode::Difference.apply([1.0, 0.0, 0.5], l), [0.5, 0.5, 0.0]);
        let screen = BlendMode::Screen.apply([0.0, 1.0, 0.5], l);
        assert!((screen[2] - 0.75).abs() < 1e-6);
        let lumed = BlendMode::Luminosity.apply([0.2, 0.4, 0.6], [0.5, 0.5, 0.5]);
        assert!((lum(lumed) - 0.5).abs() < 1e-5);
        assert_eq!(BlendMode::parse("Soft Light"), Some(BlendMode::SoftLight));
        assert_eq!(BlendMode::parse("dissolve"), None);
    }

    #[test]
    fn test_blend_advance_places_center() {
        let bg = ImageTensor::filled(1, 10, 10, &[0.0, 0.0, 0.0]).unwrap();
        let layer = ImageTensor::filled(1, 2, 2, &[1.0, 1.0, 1.0]).unwrap();
        let opts = BlendOptions { sampler: Sampler::Nearest, ..Default::default() };
        let (img, mask) = blend_advance(Some(&bg), &layer, None, &opts).unwrap();
        let f = img.frame(0);
        assert_eq!(f[[4, 4, 0]], 1.0);
        assert_eq!(f[[5, 5, 0]], 1.0);
        assert_eq!(f[[3, 3, 0]], 0.0);
        assert_eq!(mask.array().sum(), 4.0);
    }

    #[test]
    fn test_blend_advance_without_background_is_rgba() {
        let layer = ImageTensor::filled(1, 4, 6, &[0.3, 0.6, 0.9]).unwrap();
        let (img, mask) = blend_advance(None, &layer, None, &BlendOptions::default()).unwrap();
        assert_eq!(img.shape(), vec![1, 4, 6, 4]);
        assert_eq!(mask.shape(), vec![1, 4, 6]);
        assert!((img.frame(0)[[1, 1, 3]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_outpaint_feather_profile() {
        let pad = Padding::new(4, 0, 0, 0);
        let t = outpaint_feather(10, 10, pad, 2);
        assert_eq!(t[[5, 0]], 1.0);
        assert_eq!(t[[5, 1]], 0.25);
        assert_eq!(t[[5, 2]], 0.0);
        assert_eq!(t[[5, 9]], 0.0);
        assert_eq!(outpaint_feather(3, 10, pad, 2).sum(), 0.0);
    }

    #[test]
    fn test_pad_for_outpaint_layout() {
        let image = ImageTensor::filled(1, 4, 4, &[1.0, 1.0, 1.0]).unwrap();
        let pad = PadUnit::Percent.resolve([50.0, 0.0, 0.0, 25.0], 4, 4);
        assert_eq!(pad, Padding::new(2, 0, 0, 1));
        let (out, mask) = pad_for_outpaint(&image, None, pad, 0, [0.5, 0.5, 0.5]).unwrap();
        assert_eq!(out.shape(), vec![1, 5, 6, 3]);
        assert_eq!(out.frame(0)[[0, 0, 0]], 0.5);
        assert_eq!(out.frame(0)[[0, 2, 0]], 1.0);
        assert_eq!(mask.frame(0)[[0, 0]], 1.0);
        assert_eq!(mask.frame(0)[[0, 2]], 0.0);
        assert_eq!(mask.frame(0)[[4, 3]], 1.0);
    }

    #[test]
    fn test_outpaint_uses_inverted_mask() {
        let image = ImageTensor::filled(1, 4, 4, &[1.0]).unwrap();
        let mut m = Array2::zeros((4, 4));
        m[[1, 1]] = 1.0;
        let mask = MaskTensor::from_frames(vec![m]).unwrap();
        let (_, out) = pad_for_outpaint(&image, Some(&mask), Padding::new(1, 0, 0, 0), 0, [0.0; 3]).unwrap();
        assert_eq!(out.frame(0)[[1, 2]], 0.0);
        assert_eq!(out.frame(0)[[0, 2]], 1.0);
    }

    #[test]
    fn test_crop_by_mask_reserves() {
        let image = ramp_image(1, 64, 64);
        let plane = square_mask(64, 64, Rect::new(20, 20, 8, 8));
        let mask = MaskTensor::from_frames(vec![plane]).unwrap();
        let crop = crop_by_mask(&image, &mask, false, BoxDetect::MaskArea, [4, 4, 4, 4], 8).unwrap();
        assert_eq!(crop.crop_box, CropBox::new(16, 16, 32, 32));
        assert_eq!(crop.images.shape(), vec![1, 16, 16, 3]);
        assert_eq!(crop.preview.shape(), vec![1, 64, 64, 3]);
        assert_eq!(crop.images.frame(0)[[0, 0, 1]], image.frame(0)[[16, 16, 1]]);
    }

    #[test]
    fn test_unified_crop_sizes_divisible_by_16() {
        let image = ramp_image(3, 200, 300);
        let planes = vec![
            square_mask(200, 300, Rect::new(10, 10, 40, 90)),
            square_mask(200, 300, Rect::new(150, 60, 120, 30)),
            Array2::zeros((200, 300)),
        ];
        let mask = MaskTensor::from_frames(planes).unwrap();
        let cfg = UnifiedCrop { base_resolution: 250, min_width: 32, min_height: 32, ..Default::default() };
        let (images, masks, boxes) = crop_by_mask_and_resize(&image, &mask, &cfg).unwrap();
        assert_eq!(images.batch(), 3);
        assert_eq!(images.height() % 16, 0);
        assert_eq!(images.width() % 16, 0);
        assert_eq!((masks.height(), masks.width()), (images.height(), images.width()));
        assert_eq!(boxes.len(), 3);
        for b in &boxes {
            assert!(b.fits(300, 200));
        }
    }

    #[test]
    fn test_paste_back_round_trip() {
        let image = ramp_image(2, 32, 40);
        let crop_box = CropBox::new(5, 7, 25, 30);
        let rect = Rect::from_crop_box(crop_box);
        let crops: Vec<_> = (0..2).map(|i| crop_frame(image.frame(i), rect)).collect();
        let cropped = ImageTensor::from_frames(crops).unwrap();
        let ones = MaskTensor::filled(1, rect.height, rect.width, 1.0).unwrap();
        let (restored, mask) = paste_back(&image, &cropped, Some(&ones), false, crop_box).unwrap();
        assert_eq!(restored, image);
        assert_eq!(mask.array().sum(), (2 * rect.width * rect.height) as f32);
        assert_eq!(mask.frame(0)[[0, 0]], 0.0);
    }

    #[test]
    fn test_paste_back_rejects_outside_box() {
        let image = ramp_image(1, 8, 8);
        let err = paste_back(&image, &image, None, false, CropBox::new(4, 4, 12, 12));
        assert!(matches!(err, Err(KernelError::InvalidArgument(_))));
    }

    proptest! {
        #[test]
        fn prop_crop_paste_identity(x0 in 0u32..10, y0 in 0u32..10, w in 1u32..10, h in 1u32..10) {
            let image = ramp_image(1, 20, 20);
            let crop_box = CropBox::new(x0, y0, x0 + w, y0 + h);
            let cropped = ImageTensor::from_frames(vec![crop_frame(image.frame(0), Rect::from_crop_box(crop_box))]).unwrap();
            let (restored, _) = paste_back(&image, &cropped, None, false, crop_box).unwrap();
            prop_assert_eq!(restored, image);
        }
    }
}
