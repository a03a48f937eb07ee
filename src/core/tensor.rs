//! Tensor-valued data kinds that flow between nodes.
//!
//! Every kind wraps an `ndarray` array behind an `Arc`, so cloning a value is
//! cheap and nodes produce new tensors instead of mutating their inputs.
//!
//! | Kind | Layout |
//! |------|--------|
//! | [`ImageTensor`] | batch × height × width × channels, channels ∈ {1,3,4} |
//! | [`MaskTensor`] | batch × height × width |
//! | [`Latent`] | batch × C × H/8 × W/8 |
//! | [`AudioData`] | batch × channels × samples |

use crate::core::error::{KernelError, KernelResult};
use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

/// A batch of images with values normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Arc<Array4<f32>>,
}

impl ImageTensor {
    /// Wrap a (B, H, W, C) array. Fails on empty dimensions or an unsupported channel count.
    pub fn new(data: Array4<f32>) -> KernelResult<Self> {
        let (b, h, w, c) = data.dim();
        if b == 0 || h == 0 || w == 0 {
            return Err(KernelError::MalformedInput(format!(
                "image tensor must have non-empty batch and spatial dims, got {:?}",
                data.shape()
            )));
        }
        if !matches!(c, 1 | 3 | 4) {
            return Err(KernelError::MalformedInput(format!(
                "image tensor must have 1, 3 or 4 channels, got {}",
                c
            )));
        }
        Ok(Self { data: Arc::new(data) })
    }

    /// A batch filled with one value per channel.
    pub fn filled(batch: usize, height: usize, width: usize, color: &[f32]) -> KernelResult<Self> {
        let mut data = Array4::<f32>::zeros((batch, height, width, color.len()));
        for (c, v) in color.iter().enumerate() {
            data.slice_mut(s![.., .., .., c]).fill(*v);
        }
        Self::new(data)
    }

    /// Stack per-frame (H, W, C) arrays into a batch. All frames must share a shape.
    pub fn from_frames(frames: Vec<Array3<f32>>) -> KernelResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| KernelError::MalformedInput("cannot stack an empty frame list".into()))?
            .dim();
        for f in &frames {
            if f.dim() != first {
                return Err(KernelError::shape_mismatch("frame stack", &[first.0, first.1, first.2], f.shape()));
            }
        }
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| KernelError::MalformedInput(e.to_string()))?;
        Self::new(stacked)
    }

    pub fn array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Take the array out, cloning only when it is shared.
    pub fn into_array(self) -> Array4<f32> {
        Arc::try_unwrap(self.data).unwrap_or_else(|arc| (*arc).clone())
    }

    pub fn batch(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn channels(&self) -> usize {
        self.data.dim().3
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.shape().to_vec()
    }

    /// View of one frame as (H, W, C).
    pub fn frame(&self, index: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    /// Frame at `index`, or the last frame when the batch is shorter.
    pub fn frame_clamped(&self, index: usize) -> ArrayView3<'_, f32> {
        self.frame(index.min(self.batch() - 1))
    }

    /// Owned copies of every frame.
    pub fn frames(&self) -> Vec<Array3<f32>> {
        self.data.outer_iter().map(|f| f.to_owned()).collect()
    }

    /// (min, max) over all values.
    pub fn value_range(&self) -> (f32, f32) {
        min_max(self.data.iter())
    }
}

impl PartialEq for ImageTensor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || *self.data == *other.data
    }
}

/// A batch of single-channel masks with values in [0, 1].
///
/// Masks produced for latent-style consumers carry an explicit singleton
/// channel axis (B, 1, H, W); the data is still stored as (B, H, W).
#[derive(Debug, Clone)]
pub struct MaskTensor {
    data: Arc<Array3<f32>>,
    channel_axis: bool,
}

impl MaskTensor {
    pub fn new(data: Array3<f32>) -> KernelResult<Self> {
        let (b, h, w) = data.dim();
        if b == 0 || h == 0 || w == 0 {
            return Err(KernelError::MalformedInput(format!(
                "mask tensor must have non-empty dims, got {:?}",
                data.shape()
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            channel_axis: false,
        })
    }

    pub fn filled(batch: usize, height: usize, width: usize, value: f32) -> KernelResult<Self> {
        Self::new(Array3::from_elem((batch, height, width), value))
    }

    pub fn zeros(batch: usize, height: usize, width: usize) -> KernelResult<Self> {
        Self::filled(batch, height, width, 0.0)
    }

    /// Stack per-frame (H, W) arrays into a batch.
    pub fn from_frames(frames: Vec<Array2<f32>>) -> KernelResult<Self> {
        let first = frames
            .first()
            .ok_or_else(|| KernelError::MalformedInput("cannot stack an empty mask list".into()))?
            .dim();
        for f in &frames {
            if f.dim() != first {
                return Err(KernelError::shape_mismatch("mask stack", &[first.0, first.1], f.shape()));
            }
        }
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| KernelError::MalformedInput(e.to_string()))?;
        Self::new(stacked)
    }

    /// Report the shape as (B, 1, H, W).
    pub fn with_channel_axis(mut self) -> Self {
        self.channel_axis = true;
        self
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array3<f32> {
        Arc::try_unwrap(self.data).unwrap_or_else(|arc| (*arc).clone())
    }

    pub fn batch(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Shape as the host sees it.
    pub fn shape(&self) -> Vec<usize> {
        let (b, h, w) = self.data.dim();
        if self.channel_axis {
            vec![b, 1, h, w]
        } else {
            vec![b, h, w]
        }
    }

    pub fn frame(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn frame_clamped(&self, index: usize) -> ArrayView2<'_, f32> {
        self.frame(index.min(self.batch() - 1))
    }

    pub fn frames(&self) -> Vec<Array2<f32>> {
        self.data.outer_iter().map(|f| f.to_owned()).collect()
    }

    pub fn value_range(&self) -> (f32, f32) {
        min_max(self.data.iter())
    }
}

impl PartialEq for MaskTensor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || *self.data == *other.data
    }
}

/// Latent family; decides the channel count of generated latents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatentFamily {
    Standard,
    Sd3,
    Hunyuan,
    Ltx,
}

impl LatentFamily {
    pub const NAMES: [&'static str; 4] = ["standard", "sd3", "hunyuan", "ltx"];

    pub fn channels(self) -> usize {
        match self {
            LatentFamily::Standard => 4,
            LatentFamily::Sd3 | LatentFamily::Hunyuan => 8,
            LatentFamily::Ltx => 16,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "standard" => Some(LatentFamily::Standard),
            "sd3" => Some(LatentFamily::Sd3),
            "hunyuan" => Some(LatentFamily::Hunyuan),
            "ltx" => Some(LatentFamily::Ltx),
            _ => None,
        }
    }
}

/// Opaque latent record: `samples` plus an optional batch-index list.
#[derive(Debug, Clone)]
pub struct Latent {
    samples: Arc<Array4<f32>>,
    pub batch_index: Option<Vec<usize>>,
}

impl Latent {
    pub fn new(samples: Array4<f32>) -> Self {
        Self {
            samples: Arc::new(samples),
            batch_index: None,
        }
    }

    /// Zero latent for an image of `width` × `height` pixels.
    pub fn empty(batch: usize, width: usize, height: usize, family: LatentFamily) -> Self {
        Self::new(Array4::zeros((batch, family.channels(), height / 8, width / 8)))
    }

    pub fn samples(&self) -> &Array4<f32> {
        &self.samples
    }

    pub fn shape(&self) -> Vec<usize> {
        self.samples.shape().to_vec()
    }
}

impl PartialEq for Latent {
    fn eq(&self, other: &Self) -> bool {
        self.batch_index == other.batch_index && *self.samples == *other.samples
    }
}

/// Decoded audio: a sample rate and a (batch, channels, samples) waveform.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub sample_rate: u32,
    waveform: Arc<Array3<f32>>,
}

impl AudioData {
    pub fn new(sample_rate: u32, waveform: Array3<f32>) -> KernelResult<Self> {
        if sample_rate == 0 {
            return Err(KernelError::InvalidArgument("sample rate must be positive".into()));
        }
        Ok(Self {
            sample_rate,
            waveform: Arc::new(waveform),
        })
    }

    pub fn waveform(&self) -> &Array3<f32> {
        &self.waveform
    }

    pub fn channels(&self) -> usize {
        self.waveform.dim().1
    }

    pub fn samples(&self) -> usize {
        self.waveform.dim().2
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples() as f64 / self.sample_rate as f64
    }
}

impl PartialEq for AudioData {
    fn eq(&self, other: &Self) -> bool {
        self.sample_rate == other.sample_rate && *self.waveform == *other.waveform
    }
}

/// Integer pixel rectangle (x0, y0, x1, y1), exclusive on the far edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl CropBox {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// True when the box is non-empty and lies inside a `width` × `height` canvas.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x0 < self.x1 && self.y0 < self.y1 && self.x1 <= width && self.y1 <= height
    }
}

/// How a [`BBoxes`] rectangle is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxFormat {
    Xywh,
    Xyxy,
}

impl BoxFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "xywh" => Some(BoxFormat::Xywh),
            "xyxy" => Some(BoxFormat::Xyxy),
            _ => None,
        }
    }
}

/// Per-image rectangles, one list per batch element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBoxes {
    pub boxes: Vec<Vec<[f64; 4]>>,
}

impl BBoxes {
    pub fn new(boxes: Vec<Vec<[f64; 4]>>) -> Self {
        Self { boxes }
    }

    /// Rectangles for batch element `index`; the last list is reused when short.
    pub fn for_image(&self, index: usize) -> &[[f64; 4]] {
        match self.boxes.len() {
            0 => &[],
            n => &self.boxes[index.min(n - 1)],
        }
    }
}

fn min_max<'a>(values: impl Iterator<Item = &'a f32>) -> (f32, f32) {
    values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

fn serialize_shape<S: Serializer>(serializer: S, kind: &str, shape: Vec<usize>) -> Result<S::Ok, S::Error> {
    let mut st = serializer.serialize_struct("Tensor", 2)?;
    st.serialize_field("kind", kind)?;
    st.serialize_field("shape", &shape)?;
    st.end()
}

// Tensors serialize as a shape summary; pixel data never goes over the wire.
impl Serialize for ImageTensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_shape(serializer, "IMAGE", self.shape())
    }
}

impl Serialize for MaskTensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_shape(serializer, "MASK", self.shape())
    }
}

impl Serialize for Latent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_shape(serializer, "LATENT", self.shape())
    }
}

impl Serialize for AudioData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_shape(serializer, "AUDIO", self.waveform.shape().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tensor_rejects_bad_channels() {
        assert!(ImageTensor::new(Array4::zeros((1, 4, 4, 2))).is_err());
        assert!(ImageTensor::new(Array4::zeros((0, 4, 4, 3))).is_err());
        assert!(ImageTensor::new(Array4::zeros((1, 4, 4, 3))).is_ok());
    }

    #[test]
    fn test_image_from_frames_shape_mismatch() {
        let a = Array3::<f32>::zeros((4, 4, 3));
        let b = Array3::<f32>::zeros((4, 5, 3));
        assert!(ImageTensor::from_frames(vec![a.clone(), b]).is_err());
        let img = ImageTensor::from_frames(vec![a.clone(), a]).unwrap();
        assert_eq!(img.shape(), vec![2, 4, 4, 3]);
    }

    #[test]
    fn test_mask_channel_axis_shape() {
        let mask = MaskTensor::filled(1, 8, 16, 1.0).unwrap().with_channel_axis();
        assert_eq!(mask.shape(), vec![1, 1, 8, 16]);
        assert_eq!(mask.array().dim(), (1, 8, 16));
    }

    #[test]
    fn test_latent_family_channels() {
        let latent = Latent::empty(2, 1024, 768, LatentFamily::Ltx);
        assert_eq!(latent.shape(), vec![2, 16, 96, 128]);
        assert_eq!(LatentFamily::parse("sd3").unwrap().channels(), 8);
        assert_eq!(LatentFamily::parse("hunyuan").unwrap().channels(), 8);
    }

    #[test]
    fn test_crop_box_fits() {
        let b = CropBox::new(2, 2, 10, 8);
        assert_eq!(b.width(), 8);
        assert_eq!(b.height(), 6);
        assert!(b.fits(10, 8));
        assert!(!b.fits(9, 8));
    }

    #[test]
    fn test_bboxes_reuse_last() {
        let boxes = BBoxes::new(vec![vec![[0.0, 0.0, 1.0, 1.0]], vec![[1.0, 1.0, 2.0, 2.0]]]);
        assert_eq!(boxes.for_image(5)[0][0], 1.0);
    }
}
