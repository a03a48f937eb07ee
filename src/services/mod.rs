//! Blocking clients for the remote services some operators call.
//!
//! Every client talks through [`http::HttpTransport`], so tests run against
//! in-process fakes.

pub mod http;
pub mod translator;
pub mod image_gen;
pub mod lora;

pub use http::{HttpRequest, HttpResponse, HttpTransport, UreqTransport};
pub use image_gen::{ImageGateway, ImageProvider};
pub use lora::{LoraInfoService, LoraRecord, LoraStore};
pub use translator::{Translation, TranslationProvider, Translator};
