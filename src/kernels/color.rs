//! Color & filter kernel.
//!
//! Color-space math follows the 8-bit conventions the rest of the image
//! pipeline expects: LAB with L scaled to 0..255 and a/b offset by 128, HSV
//! with hue in 0..180. Working buffers ("pixels") are (H, W, 3) `f32` frames
//! in 0..255 RGB order; kernels accept and return unit-range frames.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::{ImageTensor, MaskTensor};
use crate::kernels::bridge::{luminance, to_u8, with_channels};
use crate::kernels::geometry::{
    convolve_separable, gaussian_blur_plane_sized, gaussian_kernel_sized, resize_frame, resize_plane, stack_planes, Sampler,
};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use rayon::prelude::*;

const D65_X: f32 = 0.950456;
const D65_Z: f32 = 1.088754;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Unit RGB to CIE LAB (L in 0..100).
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| srgb_to_linear(c.clamp(0.0, 1.0)));
    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / D65_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / D65_Z;
    let f = |t: f32| if t > 0.008_856 { t.cbrt() } else { 7.787 * t + 16.0 / 116.0 };
    let l = if y > 0.008_856 { 116.0 * y.cbrt() - 16.0 } else { 903.3 * y };
    [l, 500.0 * (f(x) - f(y)), 200.0 * (f(y) - f(z))]
}

/// CIE LAB back to unit RGB, clamped.
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let inv = |f: f32| {
        let c = f * f * f;
        if c > 0.008_856 {
            c
        } else {
            (f - 16.0 / 116.0) / 7.787
        }
    };
    let y = if l > 7.9996 { fy * fy * fy } else { l / 903.3 };
    let x = inv(fx) * D65_X;
    let z = inv(fz) * D65_Z;
    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    [r, g, bl].map(|c| linear_to_srgb(c.clamp(0.0, 1.0)).clamp(0.0, 1.0))
}

/// 0..255 RGB to 8-bit-scaled LAB.
pub fn pixel_to_lab8(rgb: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = rgb_to_lab(rgb.map(|c| c / 255.0));
    [l * 255.0 / 100.0, a + 128.0, b + 128.0]
}

pub fn lab8_to_pixel(lab: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab;
    lab_to_rgb([l * 100.0 / 255.0, a - 128.0, b - 128.0]).map(|c| (c * 255.0).round())
}

/// 0..255 RGB to HSV with H in 0..180 and S, V in 0..255.
pub fn pixel_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;
    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    [h / 2.0, s, v]
}

pub fn hsv_to_pixel(hsv: [f32; 3]) -> [f32; 3] {
    let [h, s, v] = hsv;
    let s = s / 255.0;
    let h = (h * 2.0).rem_euclid(360.0) / 60.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Unit frame to 0..255 RGB pixels, rounded to integers.
pub fn to_pixels(frame: ArrayView3<f32>) -> Array3<f32> {
    let rgb = with_channels(frame, 3);
    rgb.mapv(|v| to_u8(v) as f32)
}

pub fn from_pixels(pixels: &Array3<f32>) -> Array3<f32> {
    pixels.mapv(|v| (v / 255.0).clamp(0.0, 1.0))
}

fn map_pixels(pixels: &Array3<f32>, f: impl Fn([f32; 3]) -> [f32; 3] + Sync) -> Array3<f32> {
    let mut out = pixels.clone();
    Zip::from(out.lanes_mut(Axis(2))).and(pixels.lanes(Axis(2))).par_for_each(|mut o, p| {
        let v = f([p[0], p[1], p[2]]);
        o[0] = v[0];
        o[1] = v[1];
        o[2] = v[2];
    });
    out
}

fn gray_plane(pixels: &Array3<f32>) -> Array2<f32> {
    pixels.map_axis(Axis(2), |p| 0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2])
}

fn mean_std<'a>(values: impl Iterator<Item = &'a f32>) -> (f32, f32) {
    let (mut n, mut sum, mut sq) = (0usize, 0f64, 0f64);
    for v in values {
        n += 1;
        sum += *v as f64;
        sq += (*v as f64) * (*v as f64);
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sq / n as f64 - mean * mean).max(0.0);
    (mean as f32, var.sqrt() as f32)
}

fn channel_stats(frame: &Array3<f32>, channel: usize) -> (f32, f32) {
    mean_std(frame.index_axis(Axis(2), channel).iter())
}

/// Heuristic skin/lip weight on 8-bit LAB values.
pub fn skin_or_lips_mask(lab8: &Array3<f32>) -> Array2<f32> {
    lab8.map_axis(Axis(2), |p| {
        let (l, a, b) = (p[0].floor(), p[1].floor(), p[2].floor());
        let skin = l > 20.0 && l < 250.0 && a > 120.0 && a < 180.0 && b > 120.0 && b < 190.0;
        let lips = l > 20.0 && l < 200.0 && a > 150.0 && b > 140.0;
        if skin || lips {
            1.0
        } else {
            0.0
        }
    })
}

/// Knobs of the imitation-hue transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub strength: f32,
    pub skin_protection: f32,
    pub auto_brightness: bool,
    pub brightness_range: f32,
    pub auto_contrast: bool,
    pub contrast_range: f32,
    pub auto_saturation: bool,
    pub saturation_range: f32,
    pub auto_tone: bool,
    pub tone_strength: f32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            strength: 1.0,
            skin_protection: 0.2,
            auto_brightness: true,
            brightness_range: 0.5,
            auto_contrast: false,
            contrast_range: 0.5,
            auto_saturation: false,
            saturation_range: 0.5,
            auto_tone: false,
            tone_strength: 0.5,
        }
    }
}

/// Transfer the a/b color statistics of `source` onto `target`, protecting
/// skin tones, then apply the optional automatic adjustments.
///
/// `mask` (target-sized or resized to it) restricts the effect; without it
/// the transfer is global. Returns a unit-range RGB frame of the target size.
pub fn imitation_hue(
    source: ArrayView3<f32>,
    target: ArrayView3<f32>,
    mask: Option<ArrayView2<f32>>,
    opts: &TransferOptions,
) -> Array3<f32> {
    let (th, tw, _) = target.dim();
    let src = to_pixels(source);
    let tgt = to_pixels(target);
    let src_lab = map_pixels(&src, pixel_to_lab8);
    let tgt_lab = map_pixels(&tgt, pixel_to_lab8);

    let skin = convolve_separable(skin_or_lips_mask(&tgt_lab).view(), &gaussian_kernel_sized(5));
    let mask = mask.map(|m| resize_plane(m, tw, th, Sampler::Bilinear));
    let p = opts.skin_protection;

    let mut result_lab = tgt_lab.clone();
    for ch in 1..3 {
        let (sm, ss) = channel_stats(&src_lab, ch);
        let (tm, ts) = channel_stats(&tgt_lab, ch);
        let scale = ss / (ts + 1e-6);
        for y in 0..th {
            for x in 0..tw {
                let t = tgt_lab[[y, x, ch]];
                let adjusted = ((t - tm) * scale + sm).clamp(0.0, 255.0);
                let k = skin[[y, x]];
                let blended = t * k * p + adjusted * k * (1.0 - p) + adjusted * (1.0 - k);
                result_lab[[y, x, ch]] = match &mask {
                    Some(m) => t * (1.0 - m[[y, x]]) + blended * m[[y, x]],
                    None => blended,
                };
            }
        }
    }
    let result_lab = result_lab.mapv(|v| v.clamp(0.0, 255.0).floor());
    let result = map_pixels(&result_lab, lab8_to_pixel);

    let strength = opts.strength;
    let mut out = Zip::from(&tgt)
        .and(&result)
        .map_collect(|t, r| (t * (1.0 - strength) + r * strength).round().clamp(0.0, 255.0));

    let selection = mask.as_ref();
    if opts.auto_brightness {
        let diff = gray_plane(&src).mean().unwrap_or(0.0) - gray_plane(&tgt).mean().unwrap_or(0.0);
        let range = opts.brightness_range;
        let factor = 1.0 + (diff / 255.0 * range).clamp(-range, range);
        out = adjust_brightness(&out, factor, selection);
    }
    if opts.auto_contrast {
        let (_, s_std) = mean_std(gray_plane(&src).iter());
        let (_, t_std) = mean_std(gray_plane(&tgt).iter());
        let range = opts.contrast_range;
        let factor = 1.0 + ((s_std - t_std) / 255.0).clamp(-range, range);
        out = adjust_contrast(&out, factor, selection);
    }
    if opts.auto_saturation {
        let s_sat = channel_stats(&map_pixels(&src, pixel_to_hsv), 1).0;
        let t_sat = channel_stats(&map_pixels(&tgt, pixel_to_hsv), 1).0;
        let range = opts.saturation_range;
        let factor = 1.0 + ((s_sat - t_sat) / 255.0).clamp(-range, range);
        out = adjust_saturation(&out, factor, selection);
    }
    if opts.auto_tone {
        let src_resized = to_pixels(resize_frame(source, tw, th, Sampler::Bilinear).view());
        out = adjust_tone(&src_resized, &out, opts.tone_strength, selection);
    }
    from_pixels(&out)
}

fn selected(mask: Option<&Array2<f32>>, y: usize, x: usize) -> bool {
    mask.map_or(true, |m| m[[y, x]] > 0.0)
}

fn adjust_hsv_channel(pixels: &Array3<f32>, channel: usize, factor: f32, mask: Option<&Array2<f32>>) -> Array3<f32> {
    let mut out = pixels.clone();
    for ((y, x), _) in pixels.index_axis(Axis(2), 0).indexed_iter() {
        if !selected(mask, y, x) {
            continue;
        }
        let mut hsv = pixel_to_hsv([pixels[[y, x, 0]], pixels[[y, x, 1]], pixels[[y, x, 2]]]);
        hsv[channel] = (hsv[channel] * factor).clamp(0.0, 255.0).floor();
        let rgb = hsv_to_pixel(hsv);
        for c in 0..3 {
            out[[y, x, c]] = rgb[c].round().clamp(0.0, 255.0);
        }
    }
    out
}

/// Scale HSV value by `factor` where the mask is positive.
pub fn adjust_brightness(pixels: &Array3<f32>, factor: f32, mask: Option<&Array2<f32>>) -> Array3<f32> {
    adjust_hsv_channel(pixels, 2, factor, mask)
}

/// Scale HSV saturation by `factor` where the mask is positive.
pub fn adjust_saturation(pixels: &Array3<f32>, factor: f32, mask: Option<&Array2<f32>>) -> Array3<f32> {
    adjust_hsv_channel(pixels, 1, factor, mask)
}

/// Stretch values around the global mean where the mask is positive.
pub fn adjust_contrast(pixels: &Array3<f32>, factor: f32, mask: Option<&Array2<f32>>) -> Array3<f32> {
    let mean = pixels.mean().unwrap_or(0.0);
    let mut out = pixels.clone();
    for ((y, x, _), v) in out.indexed_iter_mut() {
        if selected(mask, y, x) {
            *v = ((*v - mean) * factor + mean).clamp(0.0, 255.0).floor();
        }
    }
    out
}

/// Match the L statistics of `target` to `source` (same size), enhance with
/// CLAHE and a contrast boost, and mix by `tone_strength`.
pub fn adjust_tone(source: &Array3<f32>, target: &Array3<f32>, tone_strength: f32, mask: Option<&Array2<f32>>) -> Array3<f32> {
    let lab = map_pixels(target, pixel_to_lab8).mapv(|v| v.clamp(0.0, 255.0).floor());
    let src_lab = map_pixels(source, pixel_to_lab8).mapv(|v| v.clamp(0.0, 255.0).floor());
    let l = lab.index_axis(Axis(2), 0).to_owned();
    let l_src = src_lab.index_axis(Axis(2), 0);

    let pick = |plane: ArrayView2<f32>| -> Vec<f32> {
        plane.indexed_iter().filter(|((y, x), _)| selected(mask, *y, *x)).map(|(_, v)| *v).collect()
    };
    let (sm, ss) = mean_std(pick(l_src).iter());
    let (lm, ls) = mean_std(pick(l.view()).iter());

    let mut adjusted = l.clone();
    for ((y, x), v) in adjusted.indexed_iter_mut() {
        if selected(mask, y, x) {
            *v = ((*v - lm) * (ss / (ls + 1e-6)) * 0.7 + sm).clamp(0.0, 255.0);
        }
    }
    let enhanced = clahe(adjusted.mapv(f32::floor).view(), 2.5, 8);
    let mut new_l = l.clone();
    for ((y, x), v) in new_l.indexed_iter_mut() {
        if selected(mask, y, x) {
            let fin = (0.7 * adjusted[[y, x]] + 0.3 * enhanced[[y, x]]).clamp(0.0, 255.0);
            let contrast = (1.3 * fin - 20.0).clamp(0.0, 255.0);
            *v = *v * (1.0 - tone_strength) + contrast * tone_strength;
        }
    }
    let mut lab = lab;
    lab.slice_mut(s![.., .., 0]).assign(&new_l.mapv(|v| v.clamp(0.0, 255.0).floor()));
    map_pixels(&lab, lab8_to_pixel)
}

/// Contrast-limited adaptive histogram equalization on a 0..255 plane.
///
/// The plane is split into `grid` × `grid` tiles; each tile's histogram is
/// clipped at `clip_limit` times the uniform bin height, the excess is
/// redistributed, and per-pixel values interpolate bilinearly between the
/// four nearest tile mappings.
pub fn clahe(plane: ArrayView2<f32>, clip_limit: f32, grid: usize) -> Array2<f32> {
    let (h, w) = plane.dim();
    if h == 0 || w == 0 {
        return plane.to_owned();
    }
    let grid = grid.max(1);
    let tile_h = h.div_ceil(grid).max(1);
    let tile_w = w.div_ceil(grid).max(1);
    let tiles_y = h.div_ceil(tile_h);
    let tiles_x = w.div_ceil(tile_w);
    let bin = |v: f32| v.clamp(0.0, 255.0) as usize;

    let mut luts = vec![[0f32; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let tile = plane.slice(s![ty * tile_h..((ty + 1) * tile_h).min(h), tx * tile_w..((tx + 1) * tile_w).min(w)]);
            let mut hist = [0u32; 256];
            tile.iter().for_each(|v| hist[bin(*v)] += 1);
            let area = tile.len() as u32;
            let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            let mut clipped = 0u32;
            for hv in hist.iter_mut() {
                if *hv > limit {
                    clipped += *hv - limit;
                    *hv = limit;
                }
            }
            let per_bin = clipped / 256;
            let residual = (clipped % 256) as usize;
            hist.iter_mut().for_each(|hv| *hv += per_bin);
            if residual > 0 {
                let step = (256 / residual).max(1);
                for i in (0..256).step_by(step).take(residual) {
                    hist[i] += 1;
                }
            }
            let scale = 255.0 / area.max(1) as f32;
            let lut = &mut luts[ty * tiles_x + tx];
            let mut cdf = 0u32;
            for (i, hv) in hist.iter().enumerate() {
                cdf += hv;
                lut[i] = (cdf as f32 * scale).round().min(255.0);
            }
        }
    }

    let axis = |pos: usize, size: usize, count: usize| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / size as f32 - 0.5;
        let i0 = f.floor().clamp(0.0, (count - 1) as f32) as usize;
        let i1 = (i0 + 1).min(count - 1);
        let t = (f - i0 as f32).clamp(0.0, 1.0);
        (i0, i1, t)
    };
    Array2::from_shape_fn((h, w), |(y, x)| {
        let v = bin(plane[[y, x]]);
        let (y0, y1, fy) = axis(y, tile_h, tiles_y);
        let (x0, x1, fx) = axis(x, tile_w, tiles_x);
        let at = |ty: usize, tx: usize| luts[ty * tiles_x + tx][v];
        let top = at(y0, x0) * (1.0 - fx) + at(y0, x1) * fx;
        let bottom = at(y1, x0) * (1.0 - fx) + at(y1, x1) * fx;
        (top * (1.0 - fy) + bottom * fy).round()
    })
}

/// A color-matching backend: maps `target` so its color distribution follows
/// `reference`. Frames are unit-range (H, W, C).
pub trait ColorMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn transfer(&self, target: ArrayView3<f32>, reference: ArrayView3<f32>) -> KernelResult<Array3<f32>>;
}

/// Built-in matching methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// Monge-Kantorovich linearization.
    Mkl,
    /// Per-channel histogram matching.
    Hm,
    /// Per-channel mean/std transfer in LAB.
    Reinhard,
    /// Multivariate Gaussian transfer.
    Mvgd,
    HmMvgdHm,
    HmMklHm,
}

impl MatchMethod {
    pub const NAMES: [&'static str; 6] = ["mkl", "hm", "reinhard", "mvgd", "hm-mvgd-hm", "hm-mkl-hm"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "mkl" => Some(MatchMethod::Mkl),
            "hm" => Some(MatchMethod::Hm),
            "reinhard" => Some(MatchMethod::Reinhard),
            "mvgd" => Some(MatchMethod::Mvgd),
            "hm-mvgd-hm" => Some(MatchMethod::HmMvgdHm),
            "hm-mkl-hm" => Some(MatchMethod::HmMklHm),
            _ => None,
        }
    }
}

type Rgb64 = [f64; 3];
type Mat3 = [[f64; 3]; 3];

fn rgb_pixels(frame: ArrayView3<f32>) -> Vec<Rgb64> {
    let rgb = with_channels(frame, 3);
    rgb.lanes(Axis(2)).into_iter().map(|p| [p[0] as f64, p[1] as f64, p[2] as f64]).collect()
}

impl ColorMatcher for MatchMethod {
    fn name(&self) -> &str {
        match self {
            MatchMethod::Mkl => "mkl",
            MatchMethod::Hm => "hm",
            MatchMethod::Reinhard => "reinhard",
            MatchMethod::Mvgd => "mvgd",
            MatchMethod::HmMvgdHm => "hm-mvgd-hm",
            MatchMethod::HmMklHm => "hm-mkl-hm",
        }
    }

    fn transfer(&self, target: ArrayView3<f32>, reference: ArrayView3<f32>) -> KernelResult<Array3<f32>> {
        let (h, w, c) = target.dim();
        if target.is_empty() || reference.is_empty() {
            return Err(KernelError::MalformedInput("color matching needs non-empty frames".into()));
        }
        let reference = rgb_pixels(reference);
        let mut pixels = rgb_pixels(target);
        match self {
            MatchMethod::Hm => histogram_match(&mut pixels, &reference),
            MatchMethod::Reinhard => reinhard(&mut pixels, &reference),
            MatchMethod::Mkl => linear_transfer(&mut pixels, &reference, mkl_matrix),
            MatchMethod::Mvgd => linear_transfer(&mut pixels, &reference, mvgd_matrix),
            MatchMethod::HmMvgdHm | MatchMethod::HmMklHm => {
                let solve = if *self == MatchMethod::HmMvgdHm { mvgd_matrix } else { mkl_matrix };
                histogram_match(&mut pixels, &reference);
                linear_transfer(&mut pixels, &reference, solve);
                histogram_match(&mut pixels, &reference);
            }
        }
        let mut out = target.to_owned();
        for (i, p) in pixels.iter().enumerate() {
            let (y, x) = (i / w, i % w);
            for ch in 0..c.min(3) {
                out[[y, x, ch]] = p[ch] as f32;
            }
            if c == 1 {
                out[[y, x, 0]] = ((p[0] + p[1] + p[2]) / 3.0) as f32;
            }
        }
        debug_assert_eq!(pixels.len(), h * w);
        Ok(out)
    }
}

fn histogram_match(pixels: &mut [Rgb64], reference: &[Rgb64]) {
    let n = pixels.len();
    for ch in 0..3 {
        let mut ref_sorted: Vec<f64> = reference.iter().map(|p| p[ch]).collect();
        ref_sorted.sort_by(|a, b| a.total_cmp(b));
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| pixels[a][ch].total_cmp(&pixels[b][ch]));
        let m = ref_sorted.len();
        let mut rank = 0;
        while rank < n {
            // equal values share the quantile of their run's midpoint
            let value = pixels[order[rank]][ch];
            let mut end = rank;
            while end + 1 < n && pixels[order[end + 1]][ch] == value {
                end += 1;
            }
            let q = if n > 1 { (rank + end) as f64 / 2.0 / (n - 1) as f64 } else { 0.5 };
            let pos = q * (m - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(m - 1);
            let mapped = ref_sorted[lo] + (ref_sorted[hi] - ref_sorted[lo]) * (pos - lo as f64);
            for &idx in &order[rank..=end] {
                pixels[idx][ch] = mapped;
            }
            rank = end + 1;
        }
    }
}

fn reinhard(pixels: &mut [Rgb64], reference: &[Rgb64]) {
    let to_lab = |p: &Rgb64| rgb_to_lab([p[0] as f32, p[1] as f32, p[2] as f32]).map(|v| v as f64);
    let mut lab: Vec<Rgb64> = pixels.iter().map(to_lab).collect();
    let ref_lab: Vec<Rgb64> = reference.iter().map(to_lab).collect();
    let (tm, tc) = moments(&lab);
    let (rm, rc) = moments(&ref_lab);
    for p in lab.iter_mut() {
        for ch in 0..3 {
            let scale = rc[ch][ch].sqrt() / (tc[ch][ch].sqrt() + 1e-9);
            p[ch] = (p[ch] - tm[ch]) * scale + rm[ch];
        }
    }
    for (dst, src) in pixels.iter_mut().zip(lab) {
        let rgb = lab_to_rgb([src[0] as f32, src[1] as f32, src[2] as f32]);
        *dst = [rgb[0] as f64, rgb[1] as f64, rgb[2] as f64];
    }
}

fn linear_transfer(pixels: &mut [Rgb64], reference: &[Rgb64], solve: fn(&Mat3, &Mat3) -> Mat3) {
    let (tm, tc) = moments(pixels);
    let (rm, rc) = moments(reference);
    let t = solve(&tc, &rc);
    for p in pixels.iter_mut() {
        let d = [p[0] - tm[0], p[1] - tm[1], p[2] - tm[2]];
        for (row, out) in t.iter().zip(p.iter_mut().enumerate()) {
            *out.1 = row[0] * d[0] + row[1] * d[1] + row[2] * d[2] + rm[out.0];
        }
    }
}

fn moments(pixels: &[Rgb64]) -> (Rgb64, Mat3) {
    let n = pixels.len().max(1) as f64;
    let mut mean = [0.0; 3];
    for p in pixels {
        for ch in 0..3 {
            mean[ch] += p[ch] / n;
        }
    }
    let mut cov = [[0.0; 3]; 3];
    for p in pixels {
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] += (p[i] - mean[i]) * (p[j] - mean[j]) / n;
            }
        }
    }
    (mean, cov)
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Eigen-decomposition of a symmetric 3×3 matrix by cyclic Jacobi rotations.
/// Eigenvectors are the columns of the returned matrix.
fn sym_eigen(m: &Mat3) -> ([f64; 3], Mat3) {
    let mut a = *m;
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for _ in 0..64 {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off < 1e-22 {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if a[p][q].abs() < 1e-30 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;
            for k in 0..3 {
                let (akp, akq) = (a[k][p], a[k][q]);
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }
    ([a[0][0], a[1][1], a[2][2]], v)
}

/// `m^power` for a symmetric positive semi-definite matrix.
fn sym_pow(m: &Mat3, power: f64) -> Mat3 {
    let (vals, vecs) = sym_eigen(m);
    let d = vals.map(|l| l.max(1e-10).powf(power));
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| vecs[i][k] * d[k] * vecs[j][k]).sum();
        }
    }
    out
}

fn mkl_matrix(target_cov: &Mat3, reference_cov: &Mat3) -> Mat3 {
    let half = sym_pow(target_cov, 0.5);
    let inv_half = sym_pow(target_cov, -0.5);
    let inner = sym_pow(&mat_mul(&mat_mul(&half, reference_cov), &half), 0.5);
    mat_mul(&mat_mul(&inv_half, &inner), &inv_half)
}

fn mvgd_matrix(target_cov: &Mat3, reference_cov: &Mat3) -> Mat3 {
    mat_mul(&sym_pow(reference_cov, 0.5), &sym_pow(target_cov, -0.5))
}

/// Match every target frame against the reference (the last reference frame
/// is reused when the batch is shorter), blend by `strength` and clamp.
///
/// With `multithread`, frames run on a pool of `min(cpu count, batch)`
/// threads. A frame whose transfer fails is returned unchanged.
pub fn color_match_batch(
    target: &ImageTensor,
    reference: &ImageTensor,
    matcher: &dyn ColorMatcher,
    strength: f32,
    multithread: bool,
) -> KernelResult<ImageTensor> {
    let batch = target.batch();
    let process = |i: usize| -> Array3<f32> {
        let t = target.frame(i);
        match matcher.transfer(t, reference.frame_clamped(i)) {
            Ok(matched) => Zip::from(&t).and(&matched).map_collect(|a, b| (a + strength * (b - a)).clamp(0.0, 1.0)),
            Err(e) => {
                log::warn!("Color matching ({}) failed for image {}: {}", matcher.name(), i, e);
                t.to_owned()
            }
        }
    };

    let frames: Vec<Array3<f32>> = if multithread && batch > 1 {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        match rayon::ThreadPoolBuilder::new().num_threads(cpus.min(batch)).build() {
            Ok(pool) => pool.install(|| (0..batch).into_par_iter().map(&process).collect()),
            Err(e) => {
                log::warn!("Could not start color-match pool, running serially: {}", e);
                (0..batch).map(&process).collect()
            }
        }
    } else {
        (0..batch).map(&process).collect()
    };
    ImageTensor::from_frames(frames)
}

/// Parameters of the depth-driven blur.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBlurParams {
    /// Kernel size of the background blur (rounded to odd).
    pub blur_strength: f32,
    pub focal_depth: f32,
    /// Accepted for host compatibility; the weight ramp is linear.
    pub focus_spread: f32,
    pub focal_range: f32,
    /// Kernel size used to smooth the blur weights (rounded to odd).
    pub mask_blur: usize,
}

fn make_odd(x: f32) -> usize {
    let v = x.round().max(0.0) as usize;
    if v % 2 == 1 {
        v
    } else {
        v + 1
    }
}

/// Blend a frame with its blurred copy, weighted by distance from the focal
/// depth. Returns the blended frame and the weight plane.
pub fn depth_blur(frame: ArrayView3<f32>, depth: ArrayView3<f32>, params: &DepthBlurParams) -> (Array3<f32>, Array2<f32>) {
    let (h, w, c) = frame.dim();
    let depth_plane = resize_plane(luminance(depth).view(), w, h, Sampler::Bilinear);

    let mut weight = depth_plane.mapv(|d| (d - params.focal_depth).abs());
    let max = weight.fold(0f32, |m, v| m.max(*v));
    if max > 0.0 {
        weight.mapv_inplace(|v| (v / max).clamp(0.0, 1.0));
    }
    let range = params.focal_range;
    weight.mapv_inplace(|v| {
        if v < range || range >= 1.0 {
            0.0
        } else {
            (v - range) / (1.0 - range)
        }
    });
    let weight = gaussian_blur_plane_sized(weight.view(), make_odd(params.mask_blur as f32).max(1));

    let ksize = make_odd(params.blur_strength).max(1);
    let planes: Vec<Array2<f32>> = (0..c)
        .map(|ch| gaussian_blur_plane_sized(frame.index_axis(Axis(2), ch), ksize))
        .collect();
    let blurred = stack_planes(&planes, h, w);

    let out = Array3::from_shape_fn((h, w, c), |(y, x, ch)| {
        let k = weight[[y, x]];
        frame[[y, x, ch]] * (1.0 - k) + blurred[[y, x, ch]] * k
    });
    (out, weight)
}

/// MINSTD generator; deterministic for a given seed.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed.wrapping_add(1) }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(48271).wrapping_add(1) % 2_147_483_647;
        self.state as u32
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        self.next_u32() as f32 / 2_147_483_647.0
    }

    pub(crate) fn next_gaussian(&mut self) -> f32 {
        let u1 = self.next_f32().max(1e-10);
        let u2 = self.next_f32();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
    }
}

/// Film-grain parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainParams {
    /// Noise amplitude, 0..1.
    pub power: f32,
    /// Grain size in pixels.
    pub scale: f32,
    /// 0 gives monochrome grain, 1 fully independent per-channel grain.
    pub saturation: f32,
    /// Black-level lift (positive) or crush (negative) applied after the grain.
    pub toe: f32,
    pub seed: u64,
}

const GRAIN_AMPLITUDE: f32 = 0.15;

/// Add Gaussian film grain generated at `1/scale` resolution.
pub fn add_grain(frame: ArrayView3<f32>, params: &GrainParams) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let scale = params.scale.max(0.1);
    let gh = ((h as f32 / scale).round() as usize).max(1);
    let gw = ((w as f32 / scale).round() as usize).max(1);
    let mut rng = SimpleRng::new(params.seed);
    let mut noise_plane = || Array2::from_shape_fn((gh, gw), |_| rng.next_gaussian());
    let mono = noise_plane();
    let chroma: Vec<Array2<f32>> = (0..c.min(3)).map(|_| noise_plane()).collect();

    // nearest upsampling, then a blur of about half a grain to round the cells
    let upsample = |plane: &Array2<f32>| {
        let up = Array2::from_shape_fn((h, w), |(y, x)| plane[[(y * gh / h).min(gh - 1), (x * gw / w).min(gw - 1)]]);
        if scale > 1.0 {
            convolve_separable(up.view(), &crate::kernels::geometry::gaussian_kernel_1d(scale / 2.0))
        } else {
            up
        }
    };
    let mono = upsample(&mono);
    let chroma: Vec<Array2<f32>> = chroma.iter().map(upsample).collect();

    let sat = params.saturation.clamp(0.0, 1.0);
    let amplitude = params.power.clamp(0.0, 1.0) * GRAIN_AMPLITUDE;
    let toe = params.toe;
    Array3::from_shape_fn((h, w, c), |(y, x, ch)| {
        let v = frame[[y, x, ch]];
        if ch >= 3 {
            return v;
        }
        let grain = mono[[y, x]] * (1.0 - sat) + chroma[ch][[y, x]] * sat;
        let g = (v + grain * amplitude).clamp(0.0, 1.0);
        (g * (1.0 - toe) + toe).clamp(0.0, 1.0)
    })
}

/// 1 where the pixel is within `threshold` (Euclidean, 0..255 units) of
/// `rgb`, else 0; flipped with `invert`. Frames are processed `per_batch`
/// at a time.
pub fn color_to_mask(image: &ImageTensor, rgb: [u8; 3], threshold: f32, invert: bool, per_batch: usize) -> KernelResult<MaskTensor> {
    let target = rgb.map(|v| v as f32);
    let (hit, miss) = if invert { (0.0, 1.0) } else { (1.0, 0.0) };
    let frames = image.frames();
    let mut out = Vec::with_capacity(frames.len());
    for chunk in frames.chunks(per_batch.max(1)) {
        let masks: Vec<Array2<f32>> = chunk
            .par_iter()
            .map(|frame| {
                let rgb = with_channels(frame.view(), 3);
                rgb.map_axis(Axis(2), |p| {
                    let d: f32 = (0..3).map(|i| (p[i] * 255.0 - target[i]).powi(2)).sum::<f32>().sqrt();
                    // tolerance for float round-off at the boundary
                    if d <= threshold + 1e-3 {
                        hit
                    } else {
                        miss
                    }
                })
            })
            .collect();
        out.extend(masks);
    }
    MaskTensor::from_frames(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn frame_from(pixels: &[[f32; 3]], h: usize, w: usize) -> Array3<f32> {
        Array3::from_shape_fn((h, w, 3), |(y, x, c)| pixels[y * w + x][c])
    }

    #[test]
    fn test_lab_round_trip() {
        for rgb in [[0.2, 0.4, 0.6], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0], [0.9, 0.1, 0.3]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for c in 0..3 {
                assert!((back[c] - rgb[c]).abs() < 2e-3, "{:?} -> {:?}", rgb, back);
            }
        }
        let white = pixel_to_lab8([255.0, 255.0, 255.0]);
        assert!((white[0] - 255.0).abs() < 0.5);
        assert!((white[1] - 128.0).abs() < 0.5);
    }

    #[test]
    fn test_hsv_round_trip() {
        let px = [200.0, 40.0, 90.0];
        let hsv = pixel_to_hsv(px);
        assert_eq!(hsv[2], 200.0);
        let back = hsv_to_pixel(hsv);
        for c in 0..3 {
            assert!((back[c] - px[c]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_color_to_mask_threshold() {
        let frame = frame_from(
            &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [10.0 / 255.0, 0.0, 0.0], [0.0, 10.0 / 255.0, 0.0]],
            2,
            2,
        );
        let image = ImageTensor::from_frames(vec![frame]).unwrap();
        let mask = color_to_mask(&image, [0, 0, 0], 10.0, false, 16).unwrap();
        assert_eq!(mask.array().iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 1.0, 1.0]);
        let inverted = color_to_mask(&image, [0, 0, 0], 10.0, true, 1).unwrap();
        assert_eq!(inverted.array().iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_histogram_match_takes_reference_values() {
        let target = Array3::from_shape_fn((1, 4, 3), |(_, x, _)| x as f32 / 10.0);
        let reference = Array3::from_shape_fn((1, 4, 3), |(_, x, _)| 0.5 + x as f32 / 10.0);
        let out = MatchMethod::Hm.transfer(target.view(), reference.view()).unwrap();
        for x in 0..4 {
            assert!((out[[0, x, 0]] - reference[[0, x, 0]]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_linear_methods_match_mean() {
        let target = Array3::from_shape_fn((6, 6, 3), |(y, x, c)| ((y * 6 + x) as f32 / 36.0) * 0.5 + c as f32 * 0.05);
        let reference = Array3::from_shape_fn((6, 6, 3), |(y, x, c)| 0.3 + ((x * 6 + y) as f32 / 36.0) * 0.4 - c as f32 * 0.05);
        for method in [MatchMethod::Mkl, MatchMethod::Mvgd, MatchMethod::Reinhard] {
            let out = method.transfer(target.view(), reference.view()).unwrap();
            for c in 0..3 {
                let got = out.index_axis(Axis(2), c).mean().unwrap();
                let want = reference.index_axis(Axis(2), c).mean().unwrap();
                assert!((got - want).abs() < 0.02, "{} channel {}: {} vs {}", method.name(), c, got, want);
            }
        }
    }

    #[test]
    fn test_sym_pow_inverts() {
        let m: Mat3 = [[2.0, 0.5, 0.1], [0.5, 1.5, 0.2], [0.1, 0.2, 1.0]];
        let half = sym_pow(&m, 0.5);
        let back = mat_mul(&half, &half);
        for i in 0..3 {
            for j in 0..3 {
                assert!((back[i][j] - m[i][j]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_color_match_batch_zero_strength_is_identity() {
        let target = ImageTensor::new(Array4::from_shape_fn((2, 3, 3, 3), |(b, y, x, c)| {
            (b + y + x + c) as f32 / 12.0
        }))
        .unwrap();
        let reference = ImageTensor::filled(1, 3, 3, &[0.2, 0.4, 0.6]).unwrap();
        let out = color_match_batch(&target, &reference, &MatchMethod::Hm, 0.0, true).unwrap();
        assert_eq!(out, target);
    }

    #[test]
    fn test_clahe_keeps_range_and_spreads_flat_ramp() {
        let plane = Array2::from_shape_fn((32, 32), |(y, x)| (100 + (x + y) / 4) as f32);
        let out = clahe(plane.view(), 2.5, 8);
        assert!(out.iter().all(|v| (0.0..=255.0).contains(v)));
        let (lo, hi) = out.iter().fold((255f32, 0f32), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        assert!(hi - lo > 16.0);
    }

    #[test]
    fn test_imitation_hue_identity_when_same_image() {
        let frame = Array3::from_shape_fn((8, 8, 3), |(y, x, c)| 0.2 + 0.05 * ((x + y + c) % 5) as f32);
        let opts = TransferOptions { auto_brightness: false, ..TransferOptions::default() };
        let out = imitation_hue(frame.view(), frame.view(), None, &opts);
        assert_eq!(out.dim(), (8, 8, 3));
        for (a, b) in out.iter().zip(frame.iter()) {
            assert!((a - b).abs() < 0.03);
        }
    }

    #[test]
    fn test_depth_blur_keeps_focal_plane_sharp() {
        let frame = Array3::from_shape_fn((9, 9, 3), |(y, x, _)| if (x + y) % 2 == 0 { 1.0 } else { 0.0 });
        // left half at the focal depth, right half far away
        let depth = Array3::from_shape_fn((9, 9, 1), |(_, x, _)| if x < 4 { 1.0 } else { 0.0 });
        let params = DepthBlurParams { blur_strength: 9.0, focal_depth: 1.0, focus_spread: 1.0, focal_range: 0.0, mask_blur: 1 };
        let (out, weight) = depth_blur(frame.view(), depth.view(), &params);
        assert_eq!(weight[[4, 0]], 0.0);
        assert_eq!(out[[4, 0, 0]], frame[[4, 0, 0]]);
        assert!((out[[4, 8, 0]] - 0.5).abs() < 0.3);
    }

    #[test]
    fn test_depth_blur_weight_is_linear_in_distance() {
        let frame = Array3::<f32>::from_elem((1, 5, 3), 0.5);
        let depth = Array3::from_shape_fn((1, 5, 1), |(_, x, _)| x as f32 / 4.0);
        let base = DepthBlurParams { blur_strength: 1.0, focal_depth: 0.0, focus_spread: 1.0, focal_range: 0.5, mask_blur: 1 };
        let (_, weight) = depth_blur(frame.view(), depth.view(), &base);
        assert_eq!(weight[[0, 1]], 0.0);
        assert!((weight[[0, 3]] - 0.5).abs() < 1e-3);
        assert!((weight[[0, 4]] - 1.0).abs() < 1e-3);

        let (_, spread) = depth_blur(frame.view(), depth.view(), &DepthBlurParams { focus_spread: 4.0, ..base });
        assert_eq!(spread, weight);
    }

    #[test]
    fn test_grain_is_deterministic_per_seed() {
        let frame = Array3::<f32>::from_elem((16, 16, 3), 0.5);
        let params = GrainParams { power: 0.5, scale: 1.0, saturation: 0.5, toe: 0.0, seed: 7 };
        let a = add_grain(frame.view(), &params);
        let b = add_grain(frame.view(), &params);
        assert_eq!(a, b);
        assert!(a.iter().any(|v| (v - 0.5).abs() > 1e-3));
        let c = add_grain(frame.view(), &GrainParams { seed: 8, ..params });
        assert_ne!(a, c);
    }
}
