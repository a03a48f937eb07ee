//! Sequence kernel: extending a frame sequence with an overlapping
//! transition, and concatenating images side by side or in a grid.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::ImageTensor;
use crate::kernels::bridge::with_channels;
use crate::kernels::color::{lab_to_rgb, rgb_to_lab};
use crate::kernels::geometry::{resize_frame, Sampler};
use ndarray::{s, Array3, ArrayView3, Axis, Zip};

const FILMIC_GAMMA: f32 = 2.2;

/// Which sequence donates the frames on the far side of the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapSide {
    Source,
    NewImages,
}

impl OverlapSide {
    pub const NAMES: [&'static str; 2] = ["source", "new_images"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "source" => Some(OverlapSide::Source),
            "new_images" | "new" => Some(OverlapSide::NewImages),
            _ => None,
        }
    }
}

/// Transition used across the overlapping frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMode {
    Cut,
    LinearBlend,
    EaseInOut,
    FilmicCrossfade,
    PerceptualCrossfade,
}

impl OverlapMode {
    pub const NAMES: [&'static str; 5] = [
        "cut",
        "linear_blend",
        "ease_in_out",
        "filmic_crossfade",
        "perceptual_crossfade",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cut" => Some(OverlapMode::Cut),
            "linear_blend" => Some(OverlapMode::LinearBlend),
            "ease_in_out" => Some(OverlapMode::EaseInOut),
            "filmic_crossfade" => Some(OverlapMode::FilmicCrossfade),
            "perceptual_crossfade" => Some(OverlapMode::PerceptualCrossfade),
            _ => None,
        }
    }

    /// Mix `from` into `to` by `alpha`; `alpha` 0 keeps `from`.
    fn mix(self, from: ArrayView3<f32>, to: ArrayView3<f32>, alpha: f32) -> Array3<f32> {
        match self {
            OverlapMode::Cut | OverlapMode::LinearBlend => lerp(from, to, alpha),
            OverlapMode::EaseInOut => lerp(from, to, alpha * alpha * (3.0 - 2.0 * alpha)),
            OverlapMode::FilmicCrossfade => {
                let linear = |v: &f32| v.max(0.0).powf(FILMIC_GAMMA);
                let mixed = lerp(from.map(linear).view(), to.map(linear).view(), alpha);
                mixed.mapv(|v| v.max(0.0).powf(1.0 / FILMIC_GAMMA))
            }
            OverlapMode::PerceptualCrossfade => lab_mix(from, to, alpha),
        }
    }
}

fn lerp(from: ArrayView3<f32>, to: ArrayView3<f32>, alpha: f32) -> Array3<f32> {
    Zip::from(&from).and(&to).map_collect(|a, b| a * (1.0 - alpha) + b * alpha)
}

fn lab_mix(from: ArrayView3<f32>, to: ArrayView3<f32>, alpha: f32) -> Array3<f32> {
    if from.dim().2 < 3 {
        return lerp(from, to, alpha);
    }
    let mut out = lerp(from, to, alpha);
    Zip::from(out.lanes_mut(Axis(2)))
        .and(from.lanes(Axis(2)))
        .and(to.lanes(Axis(2)))
        .for_each(|mut o, a, b| {
            let la = rgb_to_lab([a[0], a[1], a[2]]);
            let lb = rgb_to_lab([b[0], b[1], b[2]]);
            let mixed = [0, 1, 2].map(|i| la[i] * (1.0 - alpha) + lb[i] * alpha);
            let rgb = lab_to_rgb(mixed);
            for c in 0..3 {
                o[c] = rgb[c].clamp(0.0, 1.0);
            }
        });
    out
}

/// Outputs of [`extend_with_overlap`].
#[derive(Debug, Clone)]
pub struct Extension {
    /// The source sequence, unchanged.
    pub source: ImageTensor,
    /// The last `overlap` source frames, the seed for generating new frames.
    pub start: ImageTensor,
    /// The joined sequence.
    pub extended: ImageTensor,
}

fn select(frames: &[Array3<f32>]) -> KernelResult<ImageTensor> {
    ImageTensor::from_frames(frames.to_vec())
}

/// Join `source` and `new_images` over `overlap` frames.
///
/// With `n` source and `m` new frames the result has `n + m − overlap`
/// frames. Blend weights are `(i + 1) / (overlap + 1)` so they stay strictly
/// inside (0, 1). When `overlap ≥ n` every output is the source. Without new
/// images the extended output is a single black 64×64 frame.
pub fn extend_with_overlap(
    source: &ImageTensor,
    new_images: Option<&ImageTensor>,
    overlap: usize,
    side: OverlapSide,
    mode: OverlapMode,
) -> KernelResult<Extension> {
    let n = source.batch();
    if overlap == 0 {
        return Err(KernelError::InvalidArgument("overlap must be at least 1".into()));
    }
    if overlap >= n {
        log::warn!("overlap {} is not shorter than the {}-frame source; passing it through", overlap, n);
        return Ok(Extension { source: source.clone(), start: source.clone(), extended: source.clone() });
    }
    let src = source.frames();
    let start = select(&src[n - overlap..])?;

    let Some(new_images) = new_images else {
        return Ok(Extension {
            source: source.clone(),
            start,
            extended: ImageTensor::filled(1, 64, 64, &[0.0, 0.0, 0.0])?,
        });
    };
    if (new_images.height(), new_images.width()) != (source.height(), source.width()) {
        return Err(KernelError::shape_mismatch(
            "sequence extension",
            &[source.height(), source.width()],
            &[new_images.height(), new_images.width()],
        ));
    }
    let new: Vec<Array3<f32>> = new_images
        .frames()
        .iter()
        .map(|f| with_channels(f.view(), source.channels()))
        .collect();
    let m = new.len();

    let mut out: Vec<Array3<f32>> = Vec::with_capacity(n + m.saturating_sub(overlap));
    if mode == OverlapMode::Cut {
        match side {
            OverlapSide::Source => {
                out.extend_from_slice(&src[..n - overlap]);
                out.extend_from_slice(&new);
            }
            OverlapSide::NewImages => {
                out.extend_from_slice(&src);
                out.extend_from_slice(&new[overlap.min(m)..]);
            }
        }
    } else {
        if m < overlap {
            return Err(KernelError::InvalidArgument(format!(
                "{} new frames cannot cover an overlap of {}",
                m, overlap
            )));
        }
        let (from, to) = match side {
            OverlapSide::Source => (&src[n - overlap..], &new[..overlap]),
            OverlapSide::NewImages => (&new[..overlap], &src[n - overlap..]),
        };
        out.extend_from_slice(&src[..n - overlap]);
        for (i, (a, b)) in from.iter().zip(to).enumerate() {
            let alpha = (i + 1) as f32 / (overlap + 1) as f32;
            out.push(mode.mix(a.view(), b.view(), alpha));
        }
        out.extend_from_slice(&new[overlap..]);
    }
    Ok(Extension { source: source.clone(), start, extended: select(&out)? })
}

// ============================================================================
// Concatenation
// ============================================================================

/// Where the second image goes relative to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Right,
    Down,
    Left,
    Up,
    Auto,
}

impl Direction {
    pub const NAMES: [&'static str; 5] = ["right", "down", "left", "up", "auto"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "right" => Some(Direction::Right),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "up" => Some(Direction::Up),
            "auto" => Some(Direction::Auto),
            _ => None,
        }
    }

    fn horizontal(self) -> bool {
        matches!(self, Direction::Right | Direction::Left | Direction::Auto)
    }

    fn reversed(self) -> bool {
        matches!(self, Direction::Left | Direction::Up)
    }
}

/// Canvas background behind concatenated images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Solid([f32; 3]),
    /// Produces an RGBA result with zero alpha outside the images.
    Transparent,
}

impl Background {
    pub const NAMES: [&'static str; 4] = ["black", "white", "gray", "transparent"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "black" => Some(Background::Solid([0.0; 3])),
            "white" => Some(Background::Solid([1.0; 3])),
            "gray" | "grey" => Some(Background::Solid([0.5; 3])),
            "transparent" => Some(Background::Transparent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcatOptions {
    pub direction: Direction,
    /// Scale images to a shared height (horizontal) or width (vertical).
    pub match_size: bool,
    /// Longest side of the result; larger canvases are scaled down.
    pub max_size: usize,
    /// Pixels between neighbours.
    pub gap: usize,
    pub background: Background,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Auto,
            match_size: true,
            max_size: 4096,
            gap: 0,
            background: Background::Solid([0.0; 3]),
        }
    }
}

// (width, height) of a line of images after optional size matching.
fn line_extent(sizes: &[(usize, usize)], horizontal: bool, match_size: bool, gap: usize) -> (usize, usize) {
    let gaps = gap * sizes.len().saturating_sub(1);
    if horizontal {
        let height = sizes.iter().map(|s| s.1).max().unwrap_or(0);
        let width: usize = sizes
            .iter()
            .map(|&(w, h)| if match_size && h > 0 { (w as f64 * height as f64 / h as f64) as usize } else { w })
            .sum();
        (width + gaps, height)
    } else {
        let width = sizes.iter().map(|s| s.0).max().unwrap_or(0);
        let height: usize = sizes
            .iter()
            .map(|&(w, h)| if match_size && w > 0 { (h as f64 * width as f64 / w as f64) as usize } else { h })
            .sum();
        (width, height + gaps)
    }
}

/// Pick the layout whose overall aspect ratio is closer to square; ties go
/// horizontal.
pub fn auto_direction(sizes: &[(usize, usize)], match_size: bool, gap: usize) -> Direction {
    let ratio = |(w, h): (usize, usize)| if h == 0 { f64::INFINITY } else { w as f64 / h as f64 };
    let horizontal = ratio(line_extent(sizes, true, match_size, gap));
    let vertical = ratio(line_extent(sizes, false, match_size, gap));
    if (horizontal - 1.0).abs() <= (vertical - 1.0).abs() {
        Direction::Right
    } else {
        Direction::Down
    }
}

fn canvas(height: usize, width: usize, channels: usize, background: Background) -> Array3<f32> {
    match background {
        Background::Solid(rgb) => Array3::from_shape_fn((height, width, channels), |(_, _, c)| {
            if c < 3 {
                rgb[c]
            } else {
                1.0
            }
        }),
        Background::Transparent => Array3::zeros((height, width, channels)),
    }
}

// Lay frames out in one row or column, centred across the other axis.
fn line_layout(frames: &[Array3<f32>], horizontal: bool, opts: &ConcatOptions, channels: usize) -> Array3<f32> {
    let matched: Vec<Array3<f32>> = if opts.match_size {
        let target = frames
            .iter()
            .map(|f| if horizontal { f.dim().0 } else { f.dim().1 })
            .max()
            .unwrap_or(1);
        frames
            .iter()
            .map(|f| {
                let (h, w, _) = f.dim();
                if horizontal && h < target {
                    let nw = ((w as f64 * target as f64 / h as f64) as usize).max(1);
                    resize_frame(f.view(), nw, target, Sampler::Bilinear)
                } else if !horizontal && w < target {
                    let nh = ((h as f64 * target as f64 / w as f64) as usize).max(1);
                    resize_frame(f.view(), target, nh, Sampler::Bilinear)
                } else {
                    f.clone()
                }
            })
            .collect()
    } else {
        frames.to_vec()
    };

    let gaps = opts.gap * matched.len().saturating_sub(1);
    let (width, height) = if horizontal {
        (
            matched.iter().map(|f| f.dim().1).sum::<usize>() + gaps,
            matched.iter().map(|f| f.dim().0).max().unwrap_or(1),
        )
    } else {
        (
            matched.iter().map(|f| f.dim().1).max().unwrap_or(1),
            matched.iter().map(|f| f.dim().0).sum::<usize>() + gaps,
        )
    };
    let mut out = canvas(height, width, channels, opts.background);
    let mut cursor = 0;
    for frame in &matched {
        let (h, w, _) = frame.dim();
        let frame = with_channels(frame.view(), channels);
        let (x, y) = if horizontal { (cursor, (height - h) / 2) } else { ((width - w) / 2, cursor) };
        out.slice_mut(s![y..y + h, x..x + w, ..]).assign(&frame);
        cursor += if horizontal { w } else { h } + opts.gap;
    }
    out
}

fn limit_size(frame: Array3<f32>, max_size: usize) -> Array3<f32> {
    let (h, w, _) = frame.dim();
    let longest = h.max(w);
    if max_size == 0 || longest <= max_size {
        return frame;
    }
    let scale = max_size as f64 / longest as f64;
    let nw = ((w as f64 * scale) as usize).max(1);
    let nh = ((h as f64 * scale) as usize).max(1);
    resize_frame(frame.view(), nw, nh, Sampler::Bilinear)
}

fn output_channels(sources: &[&ImageTensor], background: Background) -> usize {
    let widest = sources.iter().map(|t| t.channels()).max().unwrap_or(3);
    if background == Background::Transparent {
        4
    } else {
        widest.max(3)
    }
}

/// Join two image batches frame by frame. The shorter batch repeats its last
/// frame.
pub fn concatenate_pair(first: &ImageTensor, second: &ImageTensor, opts: &ConcatOptions) -> KernelResult<ImageTensor> {
    let batch = first.batch().max(second.batch());
    let channels = output_channels(&[first, second], opts.background);
    let mut frames = Vec::with_capacity(batch);
    for i in 0..batch {
        let a = first.frame_clamped(i).to_owned();
        let b = second.frame_clamped(i).to_owned();
        let sizes = [(a.dim().1, a.dim().0), (b.dim().1, b.dim().0)];
        let direction = match opts.direction {
            Direction::Auto => auto_direction(&sizes, opts.match_size, opts.gap),
            d => d,
        };
        let pair = if direction.reversed() { [b, a] } else { [a, b] };
        let joined = line_layout(&pair, direction.horizontal(), opts, channels);
        frames.push(limit_size(joined, opts.max_size));
    }
    if frames.windows(2).any(|w| w[0].dim() != w[1].dim()) {
        let (h, w, _) = frames[0].dim();
        frames = frames
            .into_iter()
            .map(|f| resize_frame(f.view(), w, h, Sampler::Bilinear))
            .collect();
    }
    ImageTensor::from_frames(frames)
}

/// Grid layout for [`concatenate_multi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grid {
    /// One row or column along the direction.
    Auto,
    /// `n` × `n` cells filled row by row; empty cells are black.
    Square(usize),
}

impl Grid {
    pub const NAMES: [&'static str; 5] = ["auto", "1x1", "2x2", "3x3", "4x4"];

    pub fn parse(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase();
        if key == "auto" {
            return Some(Grid::Auto);
        }
        let (rows, cols) = key.split_once('x')?;
        let (rows, cols) = (rows.parse::<usize>().ok()?, cols.parse::<usize>().ok()?);
        (rows == cols && rows > 0).then_some(Grid::Square(rows))
    }
}

/// Join every frame of a batch into one image.
pub fn concatenate_multi(images: &ImageTensor, grid: Grid, opts: &ConcatOptions) -> KernelResult<ImageTensor> {
    let channels = output_channels(&[images], opts.background);
    let mut frames = images.frames();
    let joined = match grid {
        Grid::Auto => {
            let sizes: Vec<(usize, usize)> = frames.iter().map(|f| (f.dim().1, f.dim().0)).collect();
            let direction = match opts.direction {
                Direction::Auto => auto_direction(&sizes, opts.match_size, opts.gap),
                d => d,
            };
            if direction.reversed() {
                frames.reverse();
            }
            line_layout(&frames, direction.horizontal(), opts, channels)
        }
        Grid::Square(n) => {
            if frames.len() > n * n {
                return Err(KernelError::InvalidArgument(format!(
                    "{} images do not fit a {}x{} grid",
                    frames.len(),
                    n,
                    n
                )));
            }
            let blank = Array3::zeros(images.frame(0).dim());
            frames.resize(n * n, blank);
            let rows: Vec<Array3<f32>> = frames
                .chunks(n)
                .map(|row| line_layout(row, true, opts, channels))
                .collect();
            line_layout(&rows, false, opts, channels)
        }
    };
    ImageTensor::from_frames(vec![limit_size(joined, opts.max_size)])
}

// ============================================================================
// Frame sampling
// ============================================================================

/// How sampled frame indices are spread over a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSampling {
    Average,
    /// 60% of the picks from the first half.
    FrontHeavy,
    /// 60% of the picks from the second half.
    BackHeavy,
    /// 20/60/20 over quarter, half, quarter.
    MiddleHeavy,
    /// 40/20/40 over thirds.
    EndsHeavy,
}

impl FrameSampling {
    pub const NAMES: [&'static str; 5] = ["average", "front_heavy", "back_heavy", "middle_heavy", "ends_heavy"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "average" => Some(FrameSampling::Average),
            "front_heavy" => Some(FrameSampling::FrontHeavy),
            "back_heavy" => Some(FrameSampling::BackHeavy),
            "middle_heavy" => Some(FrameSampling::MiddleHeavy),
            "ends_heavy" => Some(FrameSampling::EndsHeavy),
            _ => None,
        }
    }
}

// `count` evenly spaced picks over [start, end).
fn spread(start: usize, end: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let step = (end - start) as f64 / count as f64;
    (0..count).map(|i| start + (i as f64 * step) as usize).collect()
}

// Sections as (start, end, share of the picks); the last section takes the remainder.
fn sections(total: usize, target: usize, bounds: &[usize], shares: &[f64]) -> Vec<usize> {
    let mut picks = Vec::with_capacity(target);
    let mut left = target;
    for (i, window) in bounds.windows(2).enumerate() {
        let count = match shares.get(i) {
            Some(share) => ((target as f64 * share) as usize).min(left),
            None => left,
        };
        left -= count;
        picks.extend(spread(window[0], window[1].min(total), count));
    }
    picks
}

/// Indices of at most `target` frames out of `total`, sorted and unique.
///
/// Picks that collapse onto the same frame are replaced by splitting the
/// widest remaining gap, then by growing outwards from either end.
pub fn sample_frame_indices(total: usize, target: usize, mode: FrameSampling) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    if target >= total {
        return (0..total).collect();
    }

    let mut picks = match mode {
        FrameSampling::Average => {
            let mut picks = spread(0, total, target);
            if let Some(last) = picks.last_mut() {
                *last = (*last).min(total - 1);
            }
            picks
        }
        FrameSampling::FrontHeavy => sections(total, target, &[0, total / 2, total], &[0.6]),
        FrameSampling::BackHeavy => sections(total, target, &[0, total / 2, total], &[0.4]),
        FrameSampling::MiddleHeavy => {
            sections(total, target, &[0, total / 4, total * 3 / 4, total], &[0.2, 0.6])
        }
        FrameSampling::EndsHeavy => sections(total, target, &[0, total / 3, total * 2 / 3, total], &[0.4, 0.2]),
    };
    picks.retain(|&i| i < total);
    picks.sort_unstable();
    picks.dedup();

    while picks.len() < target && picks.len() < total {
        match picks.len() {
            0 => picks.push(0),
            1 if picks[0] < total - 1 => picks.push(total - 1),
            1 => break,
            _ => {
                let (pos, gap) = picks
                    .windows(2)
                    .enumerate()
                    .map(|(i, w)| (i + 1, w[1] - w[0]))
                    .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });
                if gap > 1 {
                    let mid = (picks[pos - 1] + picks[pos]) / 2;
                    picks.insert(pos, mid);
                } else if picks[0] > 0 {
                    picks.insert(0, picks[0] - 1);
                } else if picks[picks.len() - 1] < total - 1 {
                    picks.push(picks[picks.len() - 1] + 1);
                } else {
                    break;
                }
            }
        }
    }
    picks.truncate(target);
    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn numbered(count: usize, value_offset: f32) -> ImageTensor {
        let data = Array4::from_shape_fn((count, 4, 4, 3), |(b, _, _, _)| (b as f32 + value_offset) / 32.0);
        ImageTensor::new(data).unwrap()
    }

    #[test]
    fn test_linear_blend_scenario() {
        let a = numbered(10, 0.0);
        let b = numbered(10, 16.0);
        let ext = extend_with_overlap(&a, Some(&b), 3, OverlapSide::Source, OverlapMode::LinearBlend).unwrap();
        assert_eq!(ext.extended.batch(), 17);
        assert_eq!(ext.start.batch(), 3);
        let mut last_alpha = 0.0;
        for k in 0..3 {
            let got = ext.extended.frame(7 + k)[[0, 0, 0]];
            let x = a.frame(7 + k)[[0, 0, 0]];
            let y = b.frame(k)[[0, 0, 0]];
            let alpha = (got - x) / (y - x);
            assert!(alpha > last_alpha && alpha < 1.0);
            last_alpha = alpha;
        }
        assert_eq!(ext.extended.frame(10), b.frame(3));
    }

    #[test]
    fn test_cut_lengths() {
        let a = numbered(6, 0.0);
        let b = numbered(5, 10.0);
        for side in [OverlapSide::Source, OverlapSide::NewImages] {
            let ext = extend_with_overlap(&a, Some(&b), 2, side, OverlapMode::Cut).unwrap();
            assert_eq!(ext.extended.batch(), 9);
        }
        let ext = extend_with_overlap(&a, Some(&b), 2, OverlapSide::Source, OverlapMode::Cut).unwrap();
        assert_eq!(ext.extended.frame(4), b.frame(0));
    }

    #[test]
    fn test_blends_are_convex() {
        let a = numbered(5, 0.0);
        let b = numbered(4, 20.0);
        for mode in [OverlapMode::EaseInOut, OverlapMode::FilmicCrossfade, OverlapMode::PerceptualCrossfade] {
            let ext = extend_with_overlap(&a, Some(&b), 2, OverlapSide::NewImages, mode).unwrap();
            assert_eq!(ext.extended.batch(), 7);
            for k in 0..2 {
                let v = ext.extended.frame(3 + k)[[1, 1, 0]];
                let lo = a.frame(3 + k)[[0, 0, 0]].min(b.frame(k)[[0, 0, 0]]) - 5e-3;
                let hi = a.frame(3 + k)[[0, 0, 0]].max(b.frame(k)[[0, 0, 0]]) + 5e-3;
                assert!(v >= lo && v <= hi, "{:?} frame {} = {}", mode, k, v);
            }
        }
    }

    #[test]
    fn test_missing_new_images() {
        let a = numbered(4, 0.0);
        let ext = extend_with_overlap(&a, None, 2, OverlapSide::Source, OverlapMode::Cut).unwrap();
        assert_eq!(ext.extended.shape(), vec![1, 64, 64, 3]);
        assert_eq!(ext.start.frame(0), a.frame(2));
    }

    #[test]
    fn test_overlap_not_shorter_than_source() {
        let a = numbered(3, 0.0);
        let ext = extend_with_overlap(&a, None, 3, OverlapSide::Source, OverlapMode::Cut).unwrap();
        assert_eq!(ext.extended, a);
    }

    #[test]
    fn test_spatial_mismatch() {
        let a = numbered(4, 0.0);
        let b = ImageTensor::filled(2, 8, 8, &[0.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            extend_with_overlap(&a, Some(&b), 1, OverlapSide::Source, OverlapMode::Cut),
            Err(KernelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_auto_direction_prefers_square() {
        assert_eq!(auto_direction(&[(100, 200), (100, 200)], true, 0), Direction::Right);
        assert_eq!(auto_direction(&[(200, 100), (200, 100)], true, 0), Direction::Down);
    }

    #[test]
    fn test_concatenate_pair_with_gap() {
        let a = ImageTensor::filled(1, 10, 10, &[1.0, 1.0, 1.0]).unwrap();
        let b = ImageTensor::filled(2, 5, 5, &[0.5, 0.5, 0.5]).unwrap();
        let opts = ConcatOptions { direction: Direction::Right, gap: 4, ..Default::default() };
        let out = concatenate_pair(&a, &b, &opts).unwrap();
        assert_eq!(out.shape(), vec![2, 10, 24, 3]);
        assert_eq!(out.frame(0)[[5, 12, 0]], 0.0);
        assert!((out.frame(1)[[5, 20, 0]] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_concatenate_left_reverses_and_limits() {
        let a = ImageTensor::filled(1, 8, 8, &[1.0, 1.0, 1.0]).unwrap();
        let b = ImageTensor::filled(1, 8, 8, &[0.0, 0.0, 0.0]).unwrap();
        let opts = ConcatOptions { direction: Direction::Left, max_size: 8, ..Default::default() };
        let out = concatenate_pair(&a, &b, &opts).unwrap();
        assert_eq!(out.shape(), vec![1, 4, 8, 3]);
        assert!(out.frame(0)[[2, 1, 0]] < 0.01);
        assert!(out.frame(0)[[2, 6, 0]] > 0.99);
    }

    #[test]
    fn test_concatenate_multi_grid() {
        let images = ImageTensor::filled(3, 4, 4, &[1.0, 1.0, 1.0]).unwrap();
        let opts = ConcatOptions { background: Background::Transparent, ..Default::default() };
        let out = concatenate_multi(&images, Grid::Square(2), &opts).unwrap();
        assert_eq!(out.shape(), vec![1, 8, 8, 4]);
        assert_eq!(out.frame(0)[[6, 6, 0]], 0.0);
        assert_eq!(out.frame(0)[[1, 1, 3]], 1.0);
        assert!(concatenate_multi(&images, Grid::Square(1), &opts).is_err());
        assert_eq!(Grid::parse("3x3"), Some(Grid::Square(3)));
    }

    #[test]
    fn test_average_sampling() {
        assert_eq!(sample_frame_indices(100, 4, FrameSampling::Average), vec![0, 25, 50, 75]);
        assert_eq!(sample_frame_indices(3, 8, FrameSampling::Average), vec![0, 1, 2]);
        assert!(sample_frame_indices(0, 8, FrameSampling::Average).is_empty());
    }

    #[test]
    fn test_front_heavy_sampling() {
        // 3 picks over [0, 50), 2 over [50, 100)
        assert_eq!(sample_frame_indices(100, 5, FrameSampling::FrontHeavy), vec![0, 16, 33, 50, 75]);
    }

    #[test]
    fn test_sampling_fills_collapsed_picks() {
        for mode in [
            FrameSampling::Average,
            FrameSampling::FrontHeavy,
            FrameSampling::BackHeavy,
            FrameSampling::MiddleHeavy,
            FrameSampling::EndsHeavy,
        ] {
            let picks = sample_frame_indices(10, 9, mode);
            assert_eq!(picks.len(), 9, "{:?}", mode);
            assert!(picks.windows(2).all(|w| w[0] < w[1]));
            assert!(picks.iter().all(|&i| i < 10));
        }
    }
}
