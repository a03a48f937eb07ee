//! Utility operators: text, display, flow control, batches, prompts and
//! remote services.

mod batch;
mod flow;
mod prompt;
mod remote;
mod show;
mod text;

use crate::core::error::RegistryError;
use crate::filters::registry::FilterRegistry;

pub use batch::{ColorToMask, ExtractVideoFrames, GetImageRangeFromBatch};
pub use flow::{LazySwitchKJ, PurgeVRAM};
pub use prompt::{BestContextWindow, LoadKontextPresets, VideoPromptHelper};
pub use remote::{ApiImageGenerator, LoraInfo};
pub use show::{describe, PreviewMask, Show, ShowAny, ShowFloat, ShowInt, ShowList, ShowText};
pub use text::{split_think, TextBoxNode, TextConcatenate, TextTranslator, ThinkRemover};

const SOURCE: &str = "tools";

/// Register utility operators.
pub fn register(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry.register(SOURCE, || Box::new(TextConcatenate))?;
    registry.register(SOURCE, || Box::new(ThinkRemover))?;
    registry.register(SOURCE, || Box::new(TextBoxNode))?;
    registry.register(SOURCE, || Box::new(TextTranslator::default()))?;

    registry.register(SOURCE, || Box::new(ShowInt))?;
    registry.register(SOURCE, || Box::new(ShowFloat))?;
    registry.register(SOURCE, || Box::new(ShowText))?;
    registry.register(SOURCE, || Box::new(ShowList))?;
    registry.register(SOURCE, || Box::new(ShowAny))?;
    registry.register(SOURCE, || Box::new(Show))?;
    registry.register(SOURCE, || Box::new(PreviewMask))?;

    registry.register(SOURCE, || Box::new(LazySwitchKJ))?;
    registry.register(SOURCE, || Box::new(PurgeVRAM))?;

    registry.register(SOURCE, || Box::new(GetImageRangeFromBatch))?;
    registry.register(SOURCE, || Box::new(ExtractVideoFrames))?;
    registry.register(SOURCE, || Box::new(ColorToMask))?;

    registry.register(SOURCE, || Box::new(LoadKontextPresets))?;
    registry.register(SOURCE, || Box::new(VideoPromptHelper))?;
    registry.register(SOURCE, || Box::new(BestContextWindow))?;

    registry.register(SOURCE, || Box::new(ApiImageGenerator::default()))?;
    registry.register(SOURCE, || Box::new(LoraInfo::default()))?;
    Ok(())
}
