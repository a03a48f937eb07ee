//! Remote image-generation gateway.
//!
//! Failures never surface as errors: the gateway falls back to the input
//! image (or a neutral-gray canvas) and reports `Error: …` in place of the
//! URL so the graph keeps running.

use crate::core::config::{self, HttpConfig};
use crate::core::error::ServiceError;
use crate::kernels::bridge::{dynamic_to_frame, frame_to_rgb};
use crate::kernels::geometry::{resize_frame, Sampler};
use crate::services::http::{HttpRequest, HttpTransport, UreqTransport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use ndarray::{Array3, ArrayView3};
use serde_json::{json, Map, Value as Json};
use std::io::Cursor;
use std::sync::Arc;

pub const PLACEHOLDER_URL: &str = "https://api.placeholder.com/v1/images/generations";
pub const JIMENG4_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/seedream-4.0";

pub const PROVIDERS: [&str; 2] = ["placeholder", "jimeng4"];
pub const SCHEDULERS: [&str; 6] = ["DDIM", "DDPM", "DPM++ 2M", "DPM++ 2M Karras", "DPM++ SDE", "DPM++ SDE Karras"];
pub const MODELS: [&str; 3] = ["placeholder", "jimeng4-general", "jimeng4-portrait"];
pub const CONTROLNET_TYPES: [&str; 5] = ["none", "canny", "depth", "pose", "openpose"];

/// Image-to-image strength sent with an input image.
const IMG2IMG_STRENGTH: f64 = 0.8;
const DEFAULT_CFG: f64 = 7.0;
const DEFAULT_STEPS: u32 = 20;
const NEUTRAL_GRAY: f32 = 128.0 / 255.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageProvider {
    /// Local stand-in that echoes the input or returns gray.
    Placeholder,
    Jimeng4,
    /// Any other provider name; the request is composed but not sent.
    Generic(String),
}

impl ImageProvider {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "placeholder" => ImageProvider::Placeholder,
            "jimeng4" => ImageProvider::Jimeng4,
            other => ImageProvider::Generic(other.to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            ImageProvider::Placeholder => PLACEHOLDER_URL.to_string(),
            ImageProvider::Jimeng4 => JIMENG4_URL.to_string(),
            ImageProvider::Generic(name) => format!("https://api.{}.com/v1/images/generations", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: usize,
    pub height: usize,
    pub steps: u32,
    pub cfg_scale: f64,
    /// -1 lets the provider choose.
    pub seed: i64,
    pub scheduler: String,
    pub model: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: "Generate a beautiful image".to_string(),
            negative_prompt: String::new(),
            width: 1024,
            height: 1024,
            steps: DEFAULT_STEPS,
            cfg_scale: DEFAULT_CFG,
            seed: -1,
            scheduler: SCHEDULERS[0].to_string(),
            model: MODELS[0].to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlNet {
    pub kind: String,
    pub strength: f64,
    pub image: Array3<f32>,
}

/// PNG-encode a unit-range frame as base64.
pub fn encode_png_base64(frame: ArrayView3<f32>) -> Result<String, ServiceError> {
    let rgb = frame_to_rgb(frame);
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| ServiceError::Other(format!("PNG encoding failed: {}", e)))?;
    Ok(BASE64.encode(bytes.into_inner()))
}

/// Request body for the Seedream endpoint. Optional knobs are sent only
/// when they differ from the provider defaults.
pub fn jimeng_payload(params: &GenerationParams, image_base64: Option<&str>) -> Json {
    let mut body = Map::new();
    body.insert("prompt".into(), json!(params.prompt));
    body.insert("size".into(), json!(format!("{}x{}", params.width, params.height)));
    body.insert("response_format".into(), json!("url"));
    body.insert("model".into(), json!(params.model));
    body.insert("n".into(), json!(1));
    if !params.negative_prompt.is_empty() {
        body.insert("negative_prompt".into(), json!(params.negative_prompt));
    }
    if params.seed != -1 {
        body.insert("seed".into(), json!(params.seed));
    }
    if (params.cfg_scale - DEFAULT_CFG).abs() > f64::EPSILON {
        body.insert("guidance_scale".into(), json!(params.cfg_scale));
    }
    if params.steps != DEFAULT_STEPS {
        body.insert("num_inference_steps".into(), json!(params.steps));
    }
    if let Some(b64) = image_base64 {
        body.insert("image".into(), json!(b64));
        body.insert("strength".into(), json!(IMG2IMG_STRENGTH));
    }
    Json::Object(body)
}

/// Request body for providers without a dedicated client.
pub fn generic_payload(
    params: &GenerationParams,
    image_base64: Option<&str>,
    controlnet: Option<(&ControlNet, String)>,
) -> Json {
    let mut body = json!({
        "prompt": params.prompt,
        "negative_prompt": params.negative_prompt,
        "width": params.width,
        "height": params.height,
        "steps": params.steps,
        "cfg_scale": params.cfg_scale,
        "seed": if params.seed == -1 { Json::Null } else { json!(params.seed) },
        "scheduler": params.scheduler,
        "model": params.model,
    });
    if let Some(b64) = image_base64 {
        body["input_image"] = json!(b64);
    }
    if let Some((cn, b64)) = controlnet.filter(|(cn, _)| cn.kind != "none") {
        body["controlnet_type"] = json!(cn.kind);
        body["controlnet_strength"] = json!(cn.strength);
        body["controlnet_image"] = json!(b64);
    }
    body
}

pub struct ImageGateway {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
}

impl ImageGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, http: HttpConfig) -> Self {
        Self { transport, http }
    }

    pub fn from_global() -> Self {
        Self::new(Arc::new(UreqTransport::new()), config::global().http.clone())
    }

    fn gray(params: &GenerationParams) -> Array3<f32> {
        Array3::from_elem((params.height.max(1), params.width.max(1), 3), NEUTRAL_GRAY)
    }

    /// Generate one image. Returns the frame and the URL that was (or would
    /// have been) called, or `Error: …` on failure.
    pub fn generate(
        &self,
        provider: &ImageProvider,
        api_key: &str,
        params: &GenerationParams,
        image: Option<ArrayView3<f32>>,
        controlnet: Option<&ControlNet>,
    ) -> (Array3<f32>, String) {
        let result = match provider {
            ImageProvider::Placeholder => Ok(self.placeholder(params, image)),
            ImageProvider::Jimeng4 => self.jimeng4(api_key, params, image),
            ImageProvider::Generic(_) => self.generic(provider, params, image, controlnet),
        };
        match result {
            Ok(out) => out,
            Err(e) => {
                log::error!("Image generation via {:?} failed: {}", provider, e);
                let fallback = image.map(|i| i.to_owned()).unwrap_or_else(|| Self::gray(params));
                (fallback, format!("Error: {}", e))
            }
        }
    }

    fn placeholder(&self, params: &GenerationParams, image: Option<ArrayView3<f32>>) -> (Array3<f32>, String) {
        let frame = match image {
            Some(img) => resize_frame(img, params.width, params.height, Sampler::Lanczos),
            None => Self::gray(params),
        };
        (frame, PLACEHOLDER_URL.to_string())
    }

    fn jimeng4(
        &self,
        api_key: &str,
        params: &GenerationParams,
        image: Option<ArrayView3<f32>>,
    ) -> Result<(Array3<f32>, String), ServiceError> {
        let encoded = image.map(encode_png_base64).transpose()?;
        let request = HttpRequest::post(JIMENG4_URL, self.http.image_post_timeout())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(jimeng_payload(params, encoded.as_deref()));
        let body: Json = self.transport.send(&request)?.json("jimeng4")?;
        let url = body
            .pointer("/data/0/url")
            .and_then(Json::as_str)
            .ok_or_else(|| ServiceError::Decode {
                provider: "jimeng4".into(),
                reason: "no image data in response".into(),
            })?;
        let download = self
            .transport
            .send(&HttpRequest::get(url, self.http.image_download_timeout()))?;
        let decoded = image::load_from_memory(&download.body).map_err(|e| ServiceError::Decode {
            provider: "jimeng4".into(),
            reason: format!("downloaded image is unreadable: {}", e),
        })?;
        Ok((dynamic_to_frame(&DynamicImage::ImageRgb8(decoded.to_rgb8())), JIMENG4_URL.to_string()))
    }

    // Composes the request only; no provider is wired up behind this path.
    fn generic(
        &self,
        provider: &ImageProvider,
        params: &GenerationParams,
        image: Option<ArrayView3<f32>>,
        controlnet: Option<&ControlNet>,
    ) -> Result<(Array3<f32>, String), ServiceError> {
        let encoded = image.map(encode_png_base64).transpose()?;
        let cn = controlnet
            .map(|cn| encode_png_base64(cn.image.view()).map(|b64| (cn, b64)))
            .transpose()?;
        let payload = generic_payload(params, encoded.as_deref(), cn);
        log::debug!("Composed {} byte request for {:?}", payload.to_string().len(), provider);
        let frame = image.map(|i| i.to_owned()).unwrap_or_else(|| Self::gray(params));
        Ok((frame, provider.endpoint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::fake::{ok_json, status, FakeTransport};
    use crate::services::http::HttpResponse;
    use crate::kernels::bridge::from_u8;

    fn png_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn small_params() -> GenerationParams {
        GenerationParams { width: 8, height: 4, ..Default::default() }
    }

    #[test]
    fn test_placeholder_gray() {
        let gw = ImageGateway::new(Arc::new(FakeTransport::new(|r| status(&r.url, 500))), HttpConfig::default());
        let (frame, url) = gw.generate(&ImageProvider::Placeholder, "", &small_params(), None, None);
        assert_eq!(frame.dim(), (4, 8, 3));
        assert!((frame[[0, 0, 0]] - from_u8(128)).abs() < 1e-6);
        assert_eq!(url, PLACEHOLDER_URL);
    }

    #[test]
    fn test_jimeng_payload_conditional_fields() {
        let params = small_params();
        let body = jimeng_payload(&params, None);
        assert_eq!(body["size"], "8x4");
        assert!(body.get("seed").is_none());
        assert!(body.get("guidance_scale").is_none());

        let params = GenerationParams { seed: 42, cfg_scale: 5.0, negative_prompt: "blur".into(), ..small_params() };
        let body = jimeng_payload(&params, Some("AAAA"));
        assert_eq!(body["seed"], 42);
        assert_eq!(body["guidance_scale"], 5.0);
        assert_eq!(body["negative_prompt"], "blur");
        assert_eq!(body["strength"], 0.8);
    }

    #[test]
    fn test_jimeng_downloads_first_url() {
        let png = png_bytes(3, 2, [255, 0, 0]);
        let fake = FakeTransport::new(move |r| {
            if r.url == JIMENG4_URL {
                ok_json(&r.url, json!({"data": [{"url": "https://cdn.example/img.png"}]}))
            } else {
                Ok(HttpResponse { url: r.url.clone(), status: 200, body: png.clone() })
            }
        });
        let gw = ImageGateway::new(Arc::new(fake), HttpConfig::default());
        let (frame, url) = gw.generate(&ImageProvider::Jimeng4, "k", &small_params(), None, None);
        assert_eq!(url, JIMENG4_URL);
        assert_eq!(frame.dim(), (2, 3, 3));
        assert_eq!(frame[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_jimeng_failure_falls_back() {
        let gw = ImageGateway::new(Arc::new(FakeTransport::new(|r| status(&r.url, 401))), HttpConfig::default());
        let input = Array3::from_elem((2, 2, 3), 0.25f32);
        let (frame, url) = gw.generate(&ImageProvider::Jimeng4, "bad", &small_params(), Some(input.view()), None);
        assert!(url.starts_with("Error: "));
        assert_eq!(frame, input);
    }

    #[test]
    fn test_generic_composes_url() {
        let gw = ImageGateway::new(Arc::new(FakeTransport::new(|r| status(&r.url, 500))), HttpConfig::default());
        let provider = ImageProvider::parse("acme");
        let cn = ControlNet { kind: "canny".into(), strength: 1.0, image: Array3::zeros((2, 2, 3)) };
        let (_, url) = gw.generate(&provider, "", &small_params(), None, Some(&cn));
        assert_eq!(url, "https://api.acme.com/v1/images/generations");
        let body = generic_payload(&small_params(), None, Some((&cn, "B64".into())));
        assert_eq!(body["controlnet_type"], "canny");
        assert_eq!(body["seed"], Json::Null);
    }
}
