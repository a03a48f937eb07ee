//! Image operators: canvases, crops, compositing, color, sequences, scaling.

mod alpha;
mod canvas;
mod color;
mod composite;
mod crop;
mod preview;
mod resize;
mod sequence;

use crate::core::error::RegistryError;
use crate::filters::registry::FilterRegistry;

pub use alpha::{flatten_onto, ImageCombineAlpha, ImageRemoveAlpha};
pub use canvas::{preset_size, ratio_strings, scaled_side, EmptyUnitGenerator, ImageRatioDetector, RATIO_PRESETS};
pub use color::{AddGrain, ColorMatch, DepthMapBlur, ImitationHueNode};
pub use composite::{FillMaskedArea, ImageBlendAdvance, ImageCompositeMasked, ImagePadForOutpaintMasked};
pub use crop::{CropByMask, ImageCropByMaskAndResize, RestoreCropBox, MAX_RESOLUTION};
pub use preview::{BboxVisualize, CheckMask, ImageAndMaskPreview};
pub use resize::{plan_kj_resize, ImageMaskScaleAs, ImageScaleByAspectRatio, ImageScaleRestore, ResizeImageVerKJ};
pub use sequence::{ImageBatchExtendWithOverlap, ImageConcatenate, ImageConcatenateMulti};

const SOURCE: &str = "image";

/// Register image operators.
pub fn register(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry.register(SOURCE, || Box::new(EmptyUnitGenerator))?;
    registry.register(SOURCE, || Box::new(ImageRatioDetector))?;
    registry.register(SOURCE, || Box::new(CropByMask))?;
    registry.register(SOURCE, || Box::new(ImageCropByMaskAndResize))?;
    registry.register(SOURCE, || Box::new(RestoreCropBox))?;

    registry.register(SOURCE, || Box::new(ImageCompositeMasked))?;
    registry.register(SOURCE, || Box::new(ImageBlendAdvance))?;
    registry.register(SOURCE, || Box::new(ImagePadForOutpaintMasked))?;
    registry.register(SOURCE, || Box::new(FillMaskedArea))?;

    registry.register(SOURCE, || Box::new(ImitationHueNode))?;
    registry.register(SOURCE, || Box::new(ColorMatch))?;
    registry.register(SOURCE, || Box::new(DepthMapBlur))?;
    registry.register(SOURCE, || Box::new(AddGrain))?;

    registry.register(SOURCE, || Box::new(ImageBatchExtendWithOverlap))?;
    registry.register(SOURCE, || Box::new(ImageConcatenate))?;
    registry.register(SOURCE, || Box::new(ImageConcatenateMulti))?;

    registry.register(SOURCE, || Box::new(ResizeImageVerKJ))?;
    registry.register(SOURCE, || Box::new(ImageScaleByAspectRatio))?;
    registry.register(SOURCE, || Box::new(ImageScaleRestore))?;
    registry.register(SOURCE, || Box::new(ImageMaskScaleAs))?;

    registry.register(SOURCE, || Box::new(ImageRemoveAlpha))?;
    registry.register(SOURCE, || Box::new(ImageCombineAlpha))?;

    registry.register(SOURCE, || Box::new(ImageAndMaskPreview))?;
    registry.register(SOURCE, || Box::new(BboxVisualize))?;
    registry.register(SOURCE, || Box::new(CheckMask))?;
    Ok(())
}
