//! Mask kernel: arithmetic, morphology, feathered inpainting fills,
//! connected-component separation, block quantization and validity checks.
//!
//! Planes are (H, W) `f32` in [0, 1]; batched masks are [`MaskTensor`]s.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::MaskTensor;
use crate::kernels::geometry::gaussian_blur_plane;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use std::collections::{BTreeMap, VecDeque};

/// Element-wise binary mask operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOp {
    /// Product.
    And,
    /// `clamp(a − b, 0, 1)`.
    Subtract,
    /// `clamp(a + b, 0, 1)`.
    Add,
}

impl MaskOp {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            MaskOp::And => a * b,
            MaskOp::Subtract => (a - b).clamp(0.0, 1.0),
            MaskOp::Add => (a + b).clamp(0.0, 1.0),
        }
    }

    fn label(self) -> &'static str {
        match self {
            MaskOp::And => "mask and",
            MaskOp::Subtract => "mask subtract",
            MaskOp::Add => "mask add",
        }
    }
}

/// Combine two masks of identical shape.
pub fn combine_masks(a: &MaskTensor, b: &MaskTensor, op: MaskOp) -> KernelResult<MaskTensor> {
    if a.array().shape() != b.array().shape() {
        return Err(KernelError::shape_mismatch(op.label(), a.array().shape(), b.array().shape()));
    }
    let out = Zip::from(a.array()).and(b.array()).map_collect(|x, y| op.apply(*x, *y));
    MaskTensor::new(out)
}

/// 1 where the value exceeds `threshold`, else 0.
pub fn binarize(plane: ArrayView2<f32>, threshold: f32) -> Array2<f32> {
    plane.mapv(|v| if v > threshold { 1.0 } else { 0.0 })
}

/// Binary erosion with a `size` × `size` square, origin at `size / 2`.
/// Pixels whose window leaves the plane erode to 0.
pub fn erode(plane: ArrayView2<f32>, size: usize) -> Array2<f32> {
    let (h, w) = plane.dim();
    if size <= 1 {
        return binarize(plane, 0.5);
    }
    // summed-area table of set pixels
    let mut sat = vec![0u32; (h + 1) * (w + 1)];
    for y in 0..h {
        let mut row = 0u32;
        for x in 0..w {
            row += u32::from(plane[[y, x]] > 0.5);
            sat[(y + 1) * (w + 1) + x + 1] = sat[y * (w + 1) + x + 1] + row;
        }
    }
    let before = (size / 2) as isize;
    let full = (size * size) as u32;
    Array2::from_shape_fn((h, w), |(y, x)| {
        let y0 = y as isize - before;
        let x0 = x as isize - before;
        let (y1, x1) = (y0 + size as isize, x0 + size as isize);
        if y0 < 0 || x0 < 0 || y1 > h as isize || x1 > w as isize {
            return 0.0;
        }
        let (y0, x0, y1, x1) = (y0 as usize, x0 as usize, y1 as usize, x1 as usize);
        let count = sat[y1 * (w + 1) + x1] + sat[y0 * (w + 1) + x0] - sat[y0 * (w + 1) + x1] - sat[y1 * (w + 1) + x0];
        if count == full {
            1.0
        } else {
            0.0
        }
    })
}

/// Binarize at 0.5, erode by `feathering`, then blur with σ = feathering / 3.
pub fn feather(plane: ArrayView2<f32>, feathering: usize) -> Array2<f32> {
    let binary = binarize(plane, 0.5);
    if feathering == 0 {
        return binary;
    }
    let eroded = erode(binary.view(), feathering);
    gaussian_blur_plane(eroded.view(), feathering as f32 / 3.0).mapv(|v| v.clamp(0.0, 1.0))
}

/// How masked pixels are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Mid-gray plate.
    Neutral,
    /// Distance-ordered weighted average of known neighbours.
    Telea,
    /// Telea seed refined by harmonic diffusion.
    NavierStokes,
}

impl FillMode {
    pub const NAMES: [&'static str; 3] = ["neutral", "telea", "navier-stokes"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "neutral" => Some(FillMode::Neutral),
            "telea" => Some(FillMode::Telea),
            "navier-stokes" => Some(FillMode::NavierStokes),
            _ => None,
        }
    }
}

const INPAINT_RADIUS: isize = 3;
const DIFFUSION_ITERATIONS: usize = 200;

/// Fill the masked area of one frame and blend the fill over the original
/// with the feathered mask as alpha.
///
/// Inpainting modes work on an 8-bit copy, so the fill itself carries 8-bit
/// precision; unmasked pixels keep the original float values.
pub fn fill_masked_area(frame: ArrayView3<f32>, mask: ArrayView2<f32>, mode: FillMode, feathering: usize) -> Array3<f32> {
    let alpha = feather(mask, feathering);
    let (h, w, c) = frame.dim();
    let filled = match mode {
        FillMode::Neutral => Array3::from_elem((h, w, c), 0.5),
        FillMode::Telea | FillMode::NavierStokes => {
            let bytes = frame.mapv(|v| (v * 255.0).clamp(0.0, 255.0).floor());
            let hole = alpha.mapv(|a| a > 0.5);
            let mut out = inpaint_telea(bytes.view(), hole.view());
            if mode == FillMode::NavierStokes {
                diffuse(&mut out, hole.view(), DIFFUSION_ITERATIONS);
            }
            out.mapv(|v| v.round().clamp(0.0, 255.0) / 255.0)
        }
    };
    Array3::from_shape_fn((h, w, c), |(y, x, ch)| {
        let a = alpha[[y, x]];
        (frame[[y, x, ch]] * (1.0 - a) + filled[[y, x, ch]] * a).clamp(0.0, 1.0)
    })
}

/// Hole pixels in order of their 4-connected distance from known pixels.
fn fill_order(hole: ArrayView2<bool>) -> (Vec<(usize, usize)>, Array2<u32>) {
    let (h, w) = hole.dim();
    let mut dist = Array2::from_elem((h, w), u32::MAX);
    let mut queue = VecDeque::new();
    for ((y, x), is_hole) in hole.indexed_iter() {
        if !is_hole {
            dist[[y, x]] = 0;
            queue.push_back((y, x));
        }
    }
    let mut order = Vec::new();
    while let Some((y, x)) = queue.pop_front() {
        let d = dist[[y, x]];
        let neighbours = [(y.wrapping_sub(1), x), (y + 1, x), (y, x.wrapping_sub(1)), (y, x + 1)];
        for (ny, nx) in neighbours {
            if ny < h && nx < w && dist[[ny, nx]] == u32::MAX {
                dist[[ny, nx]] = d + 1;
                order.push((ny, nx));
                queue.push_back((ny, nx));
            }
        }
    }
    (order, dist)
}

/// Telea-style inpainting on 0..255 values: each hole pixel, nearest to the
/// boundary first, becomes the distance- and level-weighted mean of the known
/// pixels within a radius of 3.
pub fn inpaint_telea(pixels: ArrayView3<f32>, hole: ArrayView2<bool>) -> Array3<f32> {
    let (h, w, c) = pixels.dim();
    let mut out = pixels.to_owned();
    let (order, dist) = fill_order(hole);
    if order.is_empty() && hole.iter().any(|v| *v) {
        // nothing known to fill from
        return out;
    }
    let mut known = hole.mapv(|v| !v);
    for (y, x) in order {
        let mut acc = vec![0f32; c];
        let mut total = 0f32;
        for dy in -INPAINT_RADIUS..=INPAINT_RADIUS {
            for dx in -INPAINT_RADIUS..=INPAINT_RADIUS {
                let (qy, qx) = (y as isize + dy, x as isize + dx);
                if qy < 0 || qx < 0 || qy >= h as isize || qx >= w as isize || (dy == 0 && dx == 0) {
                    continue;
                }
                let (qy, qx) = (qy as usize, qx as usize);
                let r2 = (dy * dy + dx * dx) as f32;
                if !known[[qy, qx]] || r2 > (INPAINT_RADIUS * INPAINT_RADIUS) as f32 {
                    continue;
                }
                let level = 1.0 / (1.0 + (dist[[qy, qx]] as f32 - dist[[y, x]] as f32).abs());
                let weight = level / r2;
                for (ch, a) in acc.iter_mut().enumerate() {
                    *a += weight * out[[qy, qx, ch]];
                }
                total += weight;
            }
        }
        if total > 0.0 {
            for (ch, a) in acc.iter().enumerate() {
                out[[y, x, ch]] = a / total;
            }
        }
        known[[y, x]] = true;
    }
    out
}

/// Gauss-Seidel relaxation of the Laplace equation over the hole pixels;
/// known pixels act as boundary values.
fn diffuse(values: &mut Array3<f32>, hole: ArrayView2<bool>, iterations: usize) {
    let (h, w, c) = values.dim();
    let holes: Vec<(usize, usize)> = hole.indexed_iter().filter(|(_, v)| **v).map(|(p, _)| p).collect();
    for _ in 0..iterations {
        for &(y, x) in &holes {
            for ch in 0..c {
                let mut sum = 0.0;
                let mut n = 0.0;
                if y > 0 {
                    sum += values[[y - 1, x, ch]];
                    n += 1.0;
                }
                if y + 1 < h {
                    sum += values[[y + 1, x, ch]];
                    n += 1.0;
                }
                if x > 0 {
                    sum += values[[y, x - 1, ch]];
                    n += 1.0;
                }
                if x + 1 < w {
                    sum += values[[y, x + 1, ch]];
                    n += 1.0;
                }
                if n > 0.0 {
                    values[[y, x, ch]] = sum / n;
                }
            }
        }
    }
}

/// Shape emitted per separated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparateMode {
    Area,
    Box,
    ConvexPolygons,
}

impl SeparateMode {
    pub const NAMES: [&'static str; 3] = ["area", "box", "convex_polygons"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "area" => Some(SeparateMode::Area),
            "box" => Some(SeparateMode::Box),
            "convex_polygons" => Some(SeparateMode::ConvexPolygons),
            _ => None,
        }
    }
}

struct Component {
    pixels: Vec<(u32, u32)>,
    x_min: u32,
    x_max: u32,
    y_min: u32,
    y_max: u32,
}

/// 8-connected components of the rounded plane, in label order.
fn components(plane: ArrayView2<f32>) -> Vec<Component> {
    let (h, w) = plane.dim();
    let binary = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if plane[[y as usize, x as usize]].round() >= 1.0 { 255 } else { 0 }])
    });
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));
    let mut by_label: BTreeMap<u32, Component> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        if label[0] == 0 {
            continue;
        }
        let entry = by_label.entry(label[0]).or_insert(Component {
            pixels: Vec::new(),
            x_min: x,
            x_max: x,
            y_min: y,
            y_max: y,
        });
        entry.pixels.push((x, y));
        entry.x_min = entry.x_min.min(x);
        entry.x_max = entry.x_max.max(x);
        entry.y_min = entry.y_min.min(y);
        entry.y_max = entry.y_max.max(y);
    }
    by_label.into_values().collect()
}

/// Convex hull of the points, simplified to at most about `max_points`
/// vertices by bisecting the Douglas–Peucker tolerance.
pub fn convex_polygon(points: &[Point<i32>], max_points: usize) -> Vec<Point<i32>> {
    let hull = convex_hull(points.to_vec());
    if hull.len() <= max_points.max(3) {
        return hull;
    }
    let perimeter = arc_length(&hull, true);
    let (mut lo, mut hi) = (perimeter * 0.001, perimeter * 0.2);
    let mut best = hull.clone();
    let mut best_diff = usize::MAX;
    for _ in 0..20 {
        let eps = (lo + hi) / 2.0;
        let approx = approximate_polygon_dp(&hull, eps, true);
        let diff = approx.len().abs_diff(max_points);
        if diff < best_diff {
            best_diff = diff;
            best = approx.clone();
        }
        match approx.len().cmp(&max_points) {
            std::cmp::Ordering::Greater => lo = eps * 1.1,
            std::cmp::Ordering::Less => hi = eps * 0.9,
            std::cmp::Ordering::Equal => return approx,
        }
        if (hi - lo).abs() < perimeter * 1e-4 {
            break;
        }
    }
    best
}

/// Rasterize a convex polygon (edges included) onto an `h` × `w` plane.
pub fn fill_convex_polygon(polygon: &[Point<i32>], h: usize, w: usize) -> Array2<f32> {
    let mut out = Array2::zeros((h, w));
    if polygon.is_empty() {
        return out;
    }
    let x_min = polygon.iter().map(|p| p.x).min().unwrap_or(0).max(0) as usize;
    let x_max = (polygon.iter().map(|p| p.x).max().unwrap_or(0).max(0) as usize).min(w.saturating_sub(1));
    let y_min = polygon.iter().map(|p| p.y).min().unwrap_or(0).max(0) as usize;
    let y_max = (polygon.iter().map(|p| p.y).max().unwrap_or(0).max(0) as usize).min(h.saturating_sub(1));
    let n = polygon.len();
    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let (mut pos, mut neg) = (false, false);
            for i in 0..n {
                let a = polygon[i];
                let b = polygon[(i + 1) % n];
                let cross = (b.x - a.x) as i64 * (y as i64 - a.y as i64) - (b.y - a.y) as i64 * (x as i64 - a.x as i64);
                pos |= cross > 0;
                neg |= cross < 0;
            }
            if !(pos && neg) {
                out[[y, x]] = 1.0;
            }
        }
    }
    out
}

/// Split every mask of the batch into one mask per 8-connected component at
/// least `min_width` × `min_height` in size, ordered by bounding-box center x.
/// Returns a single empty mask when nothing survives.
pub fn separate_masks(
    mask: &MaskTensor,
    min_width: usize,
    min_height: usize,
    mode: SeparateMode,
    max_points: usize,
) -> KernelResult<MaskTensor> {
    let (h, w) = (mask.height(), mask.width());
    let mut separated: Vec<(f32, Array2<f32>)> = Vec::new();
    for plane in mask.array().outer_iter() {
        for comp in components(plane) {
            let width = (comp.x_max - comp.x_min + 1) as usize;
            let height = (comp.y_max - comp.y_min + 1) as usize;
            let centroid_x = (comp.x_min + comp.x_max) as f32 / 2.0;
            log::debug!("Component: width={}, height={}, x_pos={}", width, height, centroid_x);
            if width < min_width || height < min_height {
                continue;
            }
            let out = match mode {
                SeparateMode::Area => {
                    let mut m = Array2::zeros((h, w));
                    for &(x, y) in &comp.pixels {
                        m[[y as usize, x as usize]] = 1.0;
                    }
                    m
                }
                SeparateMode::Box => Array2::from_shape_fn((h, w), |(y, x)| {
                    let inside = (comp.x_min as usize..=comp.x_max as usize).contains(&x)
                        && (comp.y_min as usize..=comp.y_max as usize).contains(&y);
                    if inside {
                        1.0
                    } else {
                        0.0
                    }
                }),
                SeparateMode::ConvexPolygons => {
                    let points: Vec<Point<i32>> = comp.pixels.iter().map(|&(x, y)| Point::new(x as i32, y as i32)).collect();
                    fill_convex_polygon(&convex_polygon(&points, max_points), h, w)
                }
            };
            separated.push((centroid_x, out));
        }
    }
    if separated.is_empty() {
        return MaskTensor::zeros(1, h, w);
    }
    separated.sort_by(|a, b| a.0.total_cmp(&b.0));
    MaskTensor::from_frames(separated.into_iter().map(|(_, m)| m).collect())
}

/// Average-pool with a `block` window and stride (partial edge windows
/// average their in-bounds pixels), then nearest-upsample back. With
/// `threshold`, the result is rebinarized at `>= threshold`.
pub fn blockify(plane: ArrayView2<f32>, block: usize, threshold: Option<f32>) -> Array2<f32> {
    if block <= 1 {
        return plane.mapv(|v| v.clamp(0.0, 1.0));
    }
    let (h, w) = plane.dim();
    let (ph, pw) = (h.div_ceil(block), w.div_ceil(block));
    let pooled = Array2::from_shape_fn((ph, pw), |(by, bx)| {
        let ys = by * block..((by + 1) * block).min(h);
        let xs = bx * block..((bx + 1) * block).min(w);
        let n = (ys.len() * xs.len()).max(1) as f32;
        let mut sum = 0.0;
        for y in ys {
            for x in xs.clone() {
                sum += plane[[y, x]];
            }
        }
        sum / n
    });
    let (sy, sx) = (ph as f32 / h as f32, pw as f32 / w as f32);
    Array2::from_shape_fn((h, w), |(y, x)| {
        let v = pooled[[((y as f32 * sy) as usize).min(ph - 1), ((x as f32 * sx) as usize).min(pw - 1)]];
        let v = match threshold {
            Some(t) => {
                if v >= t {
                    1.0
                } else {
                    0.0
                }
            }
            None => v,
        };
        v.clamp(0.0, 1.0)
    })
}

pub fn blockify_mask(mask: &MaskTensor, block: usize, threshold: Option<f32>) -> KernelResult<MaskTensor> {
    MaskTensor::from_frames(mask.array().outer_iter().map(|p| blockify(p, block, threshold)).collect())
}

const CHECK_MAX_PIXELS: u32 = 512 * 512;

/// Fraction of 8-bit pixels strictly above `white_point`, measured on a copy
/// downscaled to 512 px wide when the plane exceeds 512×512 pixels.
pub fn white_fraction(plane: ArrayView2<f32>, white_point: u8) -> f32 {
    let (h, w) = plane.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }
    let bytes = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([(plane[[y as usize, x as usize]] * 255.0).clamp(0.0, 255.0) as u8])
    });
    let gray = if (w * h) as u32 > CHECK_MAX_PIXELS {
        let target_h = ((512 * h) / w).max(1) as u32;
        imageops::resize(&bytes, 512, target_h, FilterType::Lanczos3)
    } else {
        bytes
    };
    let total = gray.pixels().len();
    let white = gray.pixels().filter(|p| p[0] > white_point).count();
    white as f32 / total.max(1) as f32
}

/// True iff the first mask's white area exceeds `area_percent` percent.
pub fn check_mask(mask: &MaskTensor, white_point: u8, area_percent: f32) -> bool {
    if mask.batch() == 0 {
        return false;
    }
    white_fraction(mask.frame(0), white_point) * 100.0 > area_percent
}

/// Colored overlay of a mask on a frame at `opacity`.
pub fn overlay_mask(frame: ArrayView3<f32>, mask: ArrayView2<f32>, color: [f32; 3], opacity: f32) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    Array3::from_shape_fn((h, w, 3), |(y, x, ch)| {
        let base = frame[[y, x, ch.min(c - 1)]];
        let a = mask[[y.min(mask.nrows() - 1), x.min(mask.ncols() - 1)]] * opacity;
        base * (1.0 - a) + color[ch] * a
    })
}

/// Gray preview of a plane: the mask replicated into three channels.
pub fn mask_to_frame(plane: ArrayView2<f32>) -> Array3<f32> {
    let (h, w) = plane.dim();
    Array3::from_shape_fn((h, w, 3), |(y, x, _)| plane[[y, x]])
}

/// First channel of each frame as a mask.
pub fn frame_to_plane(frame: ArrayView3<f32>) -> Array2<f32> {
    frame.index_axis(Axis(2), 0).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mask_from(values: &[f32], b: usize, h: usize, w: usize) -> MaskTensor {
        MaskTensor::new(Array3::from_shape_vec((b, h, w), values.to_vec()).unwrap()).unwrap()
    }

    #[test]
    fn test_mask_and_multiplies() {
        let a = MaskTensor::filled(2, 4, 4, 0.5).unwrap();
        let b = MaskTensor::filled(2, 4, 4, 0.4).unwrap();
        let out = combine_masks(&a, &b, MaskOp::And).unwrap();
        assert_eq!(out.shape(), vec![2, 4, 4]);
        assert!(out.array().iter().all(|v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_mask_ops_reject_shape_mismatch() {
        let a = MaskTensor::filled(2, 4, 4, 0.5).unwrap();
        let b = MaskTensor::filled(2, 4, 5, 0.5).unwrap();
        let err = combine_masks(&a, &b, MaskOp::And).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
    }

    proptest! {
        #[test]
        fn prop_mask_ops_preserve_shape_and_range(
            values in proptest::collection::vec(0.0f32..=1.0, 18),
            others in proptest::collection::vec(0.0f32..=1.0, 18),
        ) {
            let a = mask_from(&values, 2, 3, 3);
            let b = mask_from(&others, 2, 3, 3);
            for op in [MaskOp::And, MaskOp::Subtract, MaskOp::Add] {
                let out = combine_masks(&a, &b, op).unwrap();
                prop_assert_eq!(out.shape(), a.shape());
                prop_assert!(out.array().iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn test_erode_square() {
        let plane = Array2::from_shape_fn((7, 7), |(y, x)| if (1..6).contains(&y) && (1..6).contains(&x) { 1.0 } else { 0.0 });
        let out = erode(plane.view(), 3);
        assert_eq!(out.sum(), 9.0);
        assert_eq!(out[[3, 3]], 1.0);
        assert_eq!(out[[1, 1]], 0.0);
    }

    #[test]
    fn test_neutral_fill_without_feathering() {
        let frame = Array3::<f32>::zeros((4, 4, 3));
        let mask = Array2::from_shape_fn((4, 4), |(_, x)| if x < 2 { 1.0 } else { 0.0 });
        let out = fill_masked_area(frame.view(), mask.view(), FillMode::Neutral, 0);
        assert_eq!(out[[0, 0, 0]], 0.5);
        assert_eq!(out[[0, 3, 0]], 0.0);
    }

    #[test]
    fn test_telea_fills_from_surroundings() {
        let frame = Array3::<f32>::from_elem((9, 9, 3), 0.8);
        let mut frame = frame;
        frame[[4, 4, 0]] = 0.0;
        let mask = Array2::from_shape_fn((9, 9), |(y, x)| if y == 4 && x == 4 { 1.0 } else { 0.0 });
        for mode in [FillMode::Telea, FillMode::NavierStokes] {
            let out = fill_masked_area(frame.view(), mask.view(), mode, 0);
            let expected = (0.8f32 * 255.0).floor() / 255.0;
            assert!((out[[4, 4, 0]] - expected).abs() < 1.0 / 255.0);
            assert_eq!(out[[0, 0, 0]], 0.8);
        }
    }

    #[test]
    fn test_separate_orders_by_x() {
        let mut plane = Array2::<f32>::zeros((6, 10));
        for y in 1..4 {
            plane[[y, 7]] = 1.0;
            plane[[y, 8]] = 1.0;
            plane[[y, 1]] = 1.0;
        }
        let mask = MaskTensor::from_frames(vec![plane]).unwrap();
        let out = separate_masks(&mask, 1, 1, SeparateMode::Area, 8).unwrap();
        assert_eq!(out.batch(), 2);
        assert_eq!(out.frame(0)[[2, 1]], 1.0);
        assert_eq!(out.frame(1)[[2, 8]], 1.0);

        let filtered = separate_masks(&mask, 2, 1, SeparateMode::Box, 8).unwrap();
        assert_eq!(filtered.batch(), 1);
        assert_eq!(filtered.frame(0).sum(), 6.0);
    }

    #[test]
    fn test_separate_empty_gives_blank() {
        let mask = MaskTensor::zeros(1, 5, 5).unwrap();
        let out = separate_masks(&mask, 0, 0, SeparateMode::Area, 8).unwrap();
        assert_eq!(out.shape(), vec![1, 5, 5]);
        assert_eq!(out.array().sum(), 0.0);
    }

    #[test]
    fn test_convex_polygon_covers_blob() {
        let points: Vec<Point<i32>> = (2..8).flat_map(|y| (2..8).map(move |x| Point::new(x, y))).collect();
        let poly = convex_polygon(&points, 4);
        let filled = fill_convex_polygon(&poly, 10, 10);
        assert_eq!(filled.sum(), 36.0);
    }

    #[test]
    fn test_blockify_edges() {
        let plane = Array2::from_shape_fn((5, 5), |(y, x)| if y < 2 && x < 2 { 1.0 } else { 0.0 });
        let out = blockify(plane.view(), 4, None);
        assert_eq!(out.dim(), (5, 5));
        assert!((out[[0, 0]] - 0.25).abs() < 1e-6);
        let bin = blockify(plane.view(), 2, Some(0.5));
        assert_eq!(bin[[1, 1]], 1.0);
        assert_eq!(bin[[3, 3]], 0.0);
    }

    #[test]
    fn test_check_mask_area() {
        let plane = Array2::from_shape_fn((10, 10), |(y, _)| if y < 2 { 1.0 } else { 0.0 });
        let mask = MaskTensor::from_frames(vec![plane]).unwrap();
        assert!(check_mask(&mask, 1, 10.0));
        assert!(!check_mask(&mask, 1, 20.0));
    }
}
