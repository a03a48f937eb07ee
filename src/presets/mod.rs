//! Static prompt data and small planning helpers used by the tool nodes.

pub mod kontext;
pub mod video_prompt;
pub mod context_window;
