//! Conversions between the raster representations.
//!
//! - normalized `f32` tensors (H, W, C) or (B, H, W, C) in [0, 1]
//! - integer pixel arrays (`u8`), in RGB or BGR channel order
//! - `image` crate handles (`DynamicImage`, `GrayImage`, `RgbImage`)
//!
//! Float to integer conversion scales by 255, saturates and rounds to the
//! nearest integer.

use crate::core::error::{KernelError, KernelResult};
use crate::core::tensor::{ImageTensor, MaskTensor};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};

/// Float in [0, 1] to a saturated, rounded byte.
#[inline]
pub fn to_u8(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

#[inline]
pub fn from_u8(v: u8) -> f32 {
    v as f32 / 255.0
}

/// (H, W, C) float frame to a byte array of the same shape.
pub fn frame_to_u8(frame: ArrayView3<f32>) -> Array3<u8> {
    frame.mapv(to_u8)
}

pub fn u8_to_frame(pixels: ArrayView3<u8>) -> Array3<f32> {
    pixels.mapv(from_u8)
}

/// Swap the first and third channel (RGB ⇄ BGR). Other channels are kept.
pub fn swap_rb(pixels: ArrayView3<u8>) -> Array3<u8> {
    let mut out = pixels.to_owned();
    if pixels.dim().2 >= 3 {
        for ((y, x, c), v) in out.indexed_iter_mut() {
            match c {
                0 => *v = pixels[[y, x, 2]],
                2 => *v = pixels[[y, x, 0]],
                _ => {}
            }
        }
    }
    out
}

/// Normalize a tensor of any supported layout to a single (H, W, C) frame.
///
/// Accepted layouts: 2-axis grayscale, 3-axis channel-last (last axis ≤ 4),
/// 3-axis channel-first (first axis ≤ 4) and 4-axis batched (first frame).
pub fn normalize_layout(tensor: ArrayViewD<f32>) -> KernelResult<Array3<f32>> {
    let shape = tensor.shape().to_vec();
    let malformed = || KernelError::MalformedInput(format!("unsupported raster shape {:?}", shape));
    match shape.len() {
        2 => {
            let plane = tensor.into_dimensionality::<Ix2>().map_err(|_| malformed())?;
            Ok(plane.insert_axis(Axis(2)).to_owned())
        }
        3 => {
            let t = tensor.into_dimensionality::<Ix3>().map_err(|_| malformed())?;
            if shape[2] <= 4 {
                Ok(t.to_owned())
            } else if shape[0] <= 4 {
                Ok(t.permuted_axes([1, 2, 0]).to_owned())
            } else {
                Err(malformed())
            }
        }
        4 => {
            if shape[0] == 0 {
                return Err(malformed());
            }
            normalize_layout(tensor.index_axis_move(Axis(0), 0))
        }
        _ => Err(malformed()),
    }
}

/// (H, W, C) float frame to an image handle: grayscale for 1 channel, RGB
/// for 3, RGBA for 4.
pub fn frame_to_dynamic(frame: ArrayView3<f32>) -> KernelResult<DynamicImage> {
    let (h, w, c) = frame.dim();
    let bytes: Vec<u8> = frame.iter().map(|v| to_u8(*v)).collect();
    let bad = || KernelError::MalformedInput(format!("cannot wrap {}x{}x{} frame", h, w, c));
    let (w32, h32) = (w as u32, h as u32);
    match c {
        1 => GrayImage::from_raw(w32, h32, bytes).map(DynamicImage::ImageLuma8).ok_or_else(bad),
        3 => RgbImage::from_raw(w32, h32, bytes).map(DynamicImage::ImageRgb8).ok_or_else(bad),
        4 => RgbaImage::from_raw(w32, h32, bytes).map(DynamicImage::ImageRgba8).ok_or_else(bad),
        _ => Err(bad()),
    }
}

/// Any-layout tensor to an image handle.
pub fn tensor_to_dynamic(tensor: ArrayViewD<f32>) -> KernelResult<DynamicImage> {
    let frame = normalize_layout(tensor)?;
    frame_to_dynamic(frame.view())
}

/// Image handle back to an (H, W, C) float frame, keeping the channel count
/// of grayscale, RGB and RGBA handles.
pub fn dynamic_to_frame(img: &DynamicImage) -> Array3<f32> {
    match img {
        DynamicImage::ImageLuma8(g) => gray_to_plane(g).insert_axis(Axis(2)),
        DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            Array3::from_shape_fn((h as usize, w as usize, 4), |(y, x, c)| {
                from_u8(rgba.get_pixel(x as u32, y as u32)[c])
            })
        }
        _ => rgb_to_frame(&img.to_rgb8()),
    }
}

pub fn rgb_to_frame(rgb: &RgbImage) -> Array3<f32> {
    let (w, h) = rgb.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        from_u8(rgb.get_pixel(x as u32, y as u32)[c])
    })
}

/// First three channels of a frame as an RGB handle; grayscale is replicated.
pub fn frame_to_rgb(frame: ArrayView3<f32>) -> RgbImage {
    let (h, w, c) = frame.dim();
    ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let px = |ch: usize| to_u8(frame[[y, x, ch.min(c - 1)]]);
        Rgb([px(0), px(1), px(2)])
    })
}

pub fn frame_to_rgba(frame: ArrayView3<f32>) -> RgbaImage {
    let (h, w, c) = frame.dim();
    ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let px = |ch: usize| to_u8(frame[[y, x, ch.min(c - 1)]]);
        let a = if c == 4 { px(3) } else { 255 };
        Rgba([px(0), px(1), px(2), a])
    })
}

pub fn plane_to_gray(plane: ArrayView2<f32>) -> GrayImage {
    let (h, w) = plane.dim();
    ImageBuffer::from_fn(w as u32, h as u32, |x, y| Luma([to_u8(plane[[y as usize, x as usize]])]))
}

pub fn gray_to_plane(gray: &GrayImage) -> Array2<f32> {
    let (w, h) = gray.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| from_u8(gray.get_pixel(x as u32, y as u32)[0]))
}

/// Image handle to a unit-batch mask: a grayscale handle is reused, otherwise
/// the red channel of the RGB conversion is taken.
pub fn dynamic_to_mask(img: &DynamicImage) -> KernelResult<MaskTensor> {
    let plane = match img {
        DynamicImage::ImageLuma8(g) => gray_to_plane(g),
        other => {
            let rgb = other.to_rgb8();
            let (w, h) = rgb.dimensions();
            Array2::from_shape_fn((h as usize, w as usize), |(y, x)| from_u8(rgb.get_pixel(x as u32, y as u32)[0]))
        }
    };
    MaskTensor::from_frames(vec![plane])
}

/// Luminance of a frame (ITU-R BT.601 weights, as used for grayscale conversion).
pub fn luminance(frame: ArrayView3<f32>) -> Array2<f32> {
    let (h, w, c) = frame.dim();
    Array2::from_shape_fn((h, w), |(y, x)| {
        if c < 3 {
            frame[[y, x, 0]]
        } else {
            0.299 * frame[[y, x, 0]] + 0.587 * frame[[y, x, 1]] + 0.114 * frame[[y, x, 2]]
        }
    })
}

/// Drop or add channels so the frame has exactly `channels` channels.
/// Missing color channels replicate channel 0; a missing alpha is opaque.
pub fn with_channels(frame: ArrayView3<f32>, channels: usize) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    if c == channels {
        return frame.to_owned();
    }
    Array3::from_shape_fn((h, w, channels), |(y, x, ch)| {
        if ch < c && !(ch == 3 && c != 4) {
            frame[[y, x, ch]]
        } else if ch == 3 {
            1.0
        } else if c >= 3 {
            frame[[y, x, ch.min(2)]]
        } else {
            frame[[y, x, 0]]
        }
    })
}

/// Every frame of a batch as RGB handles.
pub fn image_to_rgb_frames(image: &ImageTensor) -> Vec<RgbImage> {
    image.array().outer_iter().map(frame_to_rgb).collect()
}

pub fn rgb_frames_to_image(frames: &[RgbImage]) -> KernelResult<ImageTensor> {
    ImageTensor::from_frames(frames.iter().map(rgb_to_frame).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, IxDyn};

    #[test]
    fn test_to_u8_saturates_and_rounds() {
        assert_eq!(to_u8(-0.5), 0);
        assert_eq!(to_u8(1.5), 255);
        assert_eq!(to_u8(0.5), 128);
        assert_eq!(to_u8(10.0 / 255.0), 10);
    }

    #[test]
    fn test_layout_detection() {
        let chw = ndarray::ArrayD::<f32>::zeros(IxDyn(&[3, 5, 7]));
        assert_eq!(normalize_layout(chw.view()).unwrap().dim(), (5, 7, 3));

        let hwc = ndarray::ArrayD::<f32>::zeros(IxDyn(&[5, 7, 4]));
        assert_eq!(normalize_layout(hwc.view()).unwrap().dim(), (5, 7, 4));

        let gray = ndarray::ArrayD::<f32>::zeros(IxDyn(&[5, 7]));
        assert_eq!(normalize_layout(gray.view()).unwrap().dim(), (5, 7, 1));

        let batched = Array4::<f32>::zeros((2, 5, 7, 3)).into_dyn();
        assert_eq!(normalize_layout(batched.view()).unwrap().dim(), (5, 7, 3));

        let bad = ndarray::ArrayD::<f32>::zeros(IxDyn(&[9, 5, 7]));
        assert!(matches!(normalize_layout(bad.view()), Err(KernelError::MalformedInput(_))));
        let bad = ndarray::ArrayD::<f32>::zeros(IxDyn(&[9]));
        assert!(normalize_layout(bad.view()).is_err());
    }

    #[test]
    fn test_dynamic_round_trip_keeps_channels() {
        let frame = Array3::from_shape_fn((2, 3, 3), |(y, x, c)| ((y * 3 + x) * 3 + c) as f32 / 20.0);
        let img = frame_to_dynamic(frame.view()).unwrap();
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
        let back = dynamic_to_frame(&img);
        assert_eq!(back.dim(), (2, 3, 3));
        for (a, b) in frame.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }

    #[test]
    fn test_swap_rb() {
        let px = Array3::from_shape_vec((1, 1, 3), vec![1u8, 2, 3]).unwrap();
        assert_eq!(swap_rb(px.view()).into_raw_vec_and_offset().0, vec![3, 2, 1]);
    }

    #[test]
    fn test_dynamic_to_mask_uses_red_channel() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let mask = dynamic_to_mask(&DynamicImage::ImageRgb8(rgb)).unwrap();
        assert_eq!(mask.shape(), vec![1, 2, 2]);
        assert!(mask.array().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_with_channels() {
        let gray = Array3::from_elem((1, 1, 1), 0.25f32);
        let rgba = with_channels(gray.view(), 4);
        assert_eq!(rgba.as_slice().unwrap(), &[0.25, 0.25, 0.25, 1.0]);
        let rgb = with_channels(rgba.view(), 3);
        assert_eq!(rgb.as_slice().unwrap(), &[0.25, 0.25, 0.25]);
    }
}
