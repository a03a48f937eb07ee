//! Built-in operators, one registration table per subpackage.
//!
//! Subpackages register in a fixed order (image, mask, audio, tools); a
//! collision between any two of them aborts registry construction.

pub mod image;
pub mod mask;
pub mod audio;
pub mod tools;

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, RegistryError};
use crate::filters::registry::FilterRegistry;

/// Register all built-in operators.
pub fn register_all(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    image::register(registry)?;
    mask::register(registry)?;
    audio::register(registry)?;
    tools::register(registry)?;
    Ok(())
}

/// Read a dropdown parameter and parse it into its kernel enum.
pub(crate) fn choice<T>(
    ctx: &ExecutionContext,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ExecutionError> {
    let raw = ctx.get_string(name)?;
    parse(raw).ok_or_else(|| ctx.fail(format!("Unknown {} '{}'", name, raw)))
}

/// Integer parameter that must be non-negative, as usize.
pub(crate) fn get_usize(ctx: &ExecutionContext, name: &str) -> Result<usize, ExecutionError> {
    let v = ctx.get_integer(name)?;
    usize::try_from(v).map_err(|_| ctx.fail(format!("{} must not be negative (got {})", name, v)))
}

pub use image::{
    AddGrain, BboxVisualize, CheckMask, ColorMatch, CropByMask, DepthMapBlur, EmptyUnitGenerator, FillMaskedArea,
    ImageAndMaskPreview, ImageBatchExtendWithOverlap, ImageBlendAdvance, ImageCombineAlpha, ImageCompositeMasked,
    ImageConcatenate, ImageConcatenateMulti, ImageCropByMaskAndResize, ImageMaskScaleAs, ImagePadForOutpaintMasked,
    ImageRatioDetector, ImageRemoveAlpha, ImageScaleByAspectRatio, ImageScaleRestore, ImitationHueNode,
    ResizeImageVerKJ, RestoreCropBox,
};
pub use mask::{BlockifyMask, MaskAdd, MaskAnd, MaskSub, SeparateMasks};
pub use audio::{AudioCropProcess, LoadAudioPlusFromPath};
pub use tools::{
    describe, split_think, ApiImageGenerator, BestContextWindow, ColorToMask, ExtractVideoFrames,
    GetImageRangeFromBatch, LazySwitchKJ, LoadKontextPresets, LoraInfo, PreviewMask, PurgeVRAM, Show, ShowAny,
    ShowFloat, ShowInt, ShowList, ShowText, TextBoxNode, TextConcatenate, TextTranslator, ThinkRemover,
    VideoPromptHelper,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FilterNode;

    #[test]
    fn test_reexported_nodes_are_registered() {
        let registry = FilterRegistry::with_builtins().unwrap();
        let nodes: Vec<Box<dyn FilterNode>> = vec![
            Box::new(ImageCompositeMasked),
            Box::new(MaskAnd),
            Box::new(AudioCropProcess),
            Box::new(VideoPromptHelper),
            Box::new(LoraInfo::default()),
        ];
        for node in nodes {
            let id = node.metadata().id;
            assert!(registry.create(&id).is_some(), "{} is not registered", id);
        }
    }
}
