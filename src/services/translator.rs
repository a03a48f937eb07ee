//! Text translation across several web providers.
//!
//! Providers are tried one at a time. In auto mode they are walked in
//! priority order, skipping those that need a key nobody supplied, and the
//! first success wins. Each attempt is a single blocking request.

use crate::core::config::{self, HttpConfig, TranslatorConfig};
use crate::core::error::ServiceError;
use crate::services::http::{HttpRequest, HttpTransport, UreqTransport};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Language codes offered by the translator node.
pub const LANGUAGES: &[&str] = &[
    "auto", "en", "zh", "zh-cn", "zh-tw", "ja", "ko", "fr", "de", "es", "it", "pt", "ru", "ar", "hi", "th",
    "vi", "tr", "pl", "nl", "sv", "da", "no", "fi", "cs", "hu", "ro", "bg", "hr", "sk", "sl", "et", "lv",
    "lt", "el", "he", "fa", "ur", "bn", "ta", "te", "ml", "kn", "gu", "pa", "or", "as", "ne", "si", "my",
    "km", "lo", "ka", "am", "sw", "zu", "af", "sq", "eu", "be", "bs", "ca", "cy", "eo", "gl", "is", "mk",
    "mt", "sr", "uk", "uz",
];

/// One translation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub api_key: Option<&'a str>,
}

/// A translation web service.
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first in auto mode.
    fn priority(&self) -> u32;

    fn is_free(&self) -> bool;

    fn requires_key(&self) -> bool;

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError>;
}

/// Successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub provider: String,
    pub status: String,
}

fn decode_err(provider: &str, reason: &str) -> ServiceError {
    ServiceError::Decode {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

fn require_key<'a>(provider: &str, request: &TranslationRequest<'a>) -> Result<&'a str, ServiceError> {
    request
        .api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ServiceError::MissingKey {
            provider: provider.to_string(),
        })
}

// ============================================================================
// Providers
// ============================================================================

macro_rules! provider_identity {
    ($name:expr, $priority:expr, $free:expr, $key:expr) => {
        fn name(&self) -> &str {
            $name
        }
        fn priority(&self) -> u32 {
            $priority
        }
        fn is_free(&self) -> bool {
            $free
        }
        fn requires_key(&self) -> bool {
            $key
        }
    };
}

/// Google's unauthenticated web endpoint.
pub struct GoogleFree {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
}

impl TranslationProvider for GoogleFree {
    provider_identity!("Google Translate (Free)", 1, true, false);

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError> {
        let req = HttpRequest::get("https://translate.googleapis.com/translate_a/single", self.http.timeout())
            .query("client", "gtx")
            .query("sl", request.source)
            .query("tl", request.target)
            .query("dt", "t")
            .query("q", request.text);
        let body: Json = self.transport.send(&req)?.json(self.name())?;
        // [[["translated", "original", ...], ...], ...]
        let segments = body
            .get(0)
            .and_then(Json::as_array)
            .ok_or_else(|| decode_err(self.name(), "missing sentence list"))?;
        let text: String = segments
            .iter()
            .filter_map(|s| s.get(0).and_then(Json::as_str))
            .collect();
        if text.is_empty() {
            return Err(decode_err(self.name(), "empty translation"));
        }
        Ok(text)
    }
}

pub struct LibreTranslate {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
}

impl TranslationProvider for LibreTranslate {
    provider_identity!("LibreTranslate (Free)", 2, true, false);

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError> {
        // LibreTranslate has no auto-detection on this endpoint.
        let source = if request.source == "auto" { "en" } else { request.source };
        let req = HttpRequest::post("https://libretranslate.de/translate", self.http.timeout()).form(&[
            ("q", request.text),
            ("source", source),
            ("target", request.target),
            ("format", "text"),
        ]);
        let body: Json = self.transport.send(&req)?.json(self.name())?;
        body.get("translatedText")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode_err(self.name(), "missing translatedText"))
    }
}

pub struct MyMemory {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
}

impl TranslationProvider for MyMemory {
    provider_identity!("MyMemory (Free)", 3, true, false);

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError> {
        let req = HttpRequest::get("https://api.mymemory.translated.net/get", self.http.timeout())
            .query("q", request.text)
            .query("langpair", format!("{}|{}", request.source, request.target));
        let body: Json = self.transport.send(&req)?.json(self.name())?;
        if body.get("responseStatus").and_then(Json::as_i64) != Some(200) {
            return Err(decode_err(
                self.name(),
                &format!("responseStatus {}", body.get("responseStatus").unwrap_or(&Json::Null)),
            ));
        }
        body.pointer("/responseData/translatedText")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode_err(self.name(), "missing responseData.translatedText"))
    }
}

pub struct DeepL {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
}

impl TranslationProvider for DeepL {
    provider_identity!("DeepL (Paid)", 4, false, true);

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError> {
        let key = require_key(self.name(), request)?;
        let target = request.target.to_uppercase();
        let source = request.source.to_uppercase();
        let mut fields = vec![("auth_key", key), ("text", request.text), ("target_lang", target.as_str())];
        if request.source != "auto" {
            fields.push(("source_lang", source.as_str()));
        }
        let req = HttpRequest::post("https://api-free.deepl.com/v2/translate", self.http.timeout()).form(&fields);
        let body: Json = self.transport.send(&req)?.json(self.name())?;
        body.pointer("/translations/0/text")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode_err(self.name(), "missing translations[0].text"))
    }
}

pub struct Azure {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
    region: Option<String>,
}

impl TranslationProvider for Azure {
    provider_identity!("Azure Translator (Paid)", 5, false, true);

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, ServiceError> {
        let key = require_key(self.name(), request)?;
        let mut req = HttpRequest::post("https://api.cognitive.microsofttranslator.com/translate", self.http.timeout())
            .query("api-version", "3.0")
            .query("to", request.target)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/json")
            .json(json!([{ "text": request.text }]));
        if request.source != "auto" {
            req = req.query("from", request.source);
        }
        if let Some(region) = &self.region {
            req = req.header("Ocp-Apim-Subscription-Region", region.as_str());
        }
        let body: Json = self.transport.send(&req)?.json(self.name())?;
        body.pointer("/0/translations/0/text")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode_err(self.name(), "missing [0].translations[0].text"))
    }
}

// ============================================================================
// Translator
// ============================================================================

/// The provider set plus the credentials configured for it.
pub struct Translator {
    providers: Vec<Box<dyn TranslationProvider>>,
    keys: TranslatorConfig,
}

impl Translator {
    /// The five stock providers over `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>, http: &HttpConfig, keys: TranslatorConfig) -> Self {
        let providers: Vec<Box<dyn TranslationProvider>> = vec![
            Box::new(GoogleFree { transport: transport.clone(), http: http.clone() }),
            Box::new(LibreTranslate { transport: transport.clone(), http: http.clone() }),
            Box::new(MyMemory { transport: transport.clone(), http: http.clone() }),
            Box::new(DeepL { transport: transport.clone(), http: http.clone() }),
            Box::new(Azure { transport, http: http.clone(), region: keys.azure_region.clone() }),
        ];
        Self::with_providers(providers, keys)
    }

    /// Stock providers over a real HTTP client and the global configuration.
    pub fn from_global() -> Self {
        let cfg = config::global();
        Self::new(Arc::new(UreqTransport::new()), &cfg.http, cfg.translator.clone())
    }

    pub fn with_providers(mut providers: Vec<Box<dyn TranslationProvider>>, keys: TranslatorConfig) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self { providers, keys }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    // The node's key wins; otherwise the configured key for that provider.
    fn key_for<'a>(&'a self, provider: &dyn TranslationProvider, explicit: Option<&'a str>) -> Option<&'a str> {
        if let Some(k) = explicit.filter(|k| !k.trim().is_empty()) {
            return Some(k.trim());
        }
        let configured = match provider.name() {
            n if n.starts_with("DeepL") => self.keys.deepl_api_key.as_deref(),
            n if n.starts_with("Azure") => self.keys.azure_api_key.as_deref(),
            _ => None,
        };
        configured.filter(|k| !k.trim().is_empty())
    }

    fn attempt(
        &self,
        provider: &dyn TranslationProvider,
        text: &str,
        source: &str,
        target: &str,
        api_key: Option<&str>,
    ) -> Result<Translation, ServiceError> {
        let request = TranslationRequest {
            text,
            source,
            target,
            api_key: self.key_for(provider, api_key),
        };
        let translated = provider.translate(&request)?;
        Ok(Translation {
            text: translated,
            provider: provider.name().to_string(),
            status: format!("Successfully translated using {}", provider.name()),
        })
    }

    /// Translate with `provider` ("auto" walks every eligible provider).
    pub fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        provider: &str,
        api_key: Option<&str>,
    ) -> Result<Translation, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::Other("No text provided".into()));
        }
        if provider == "auto" {
            for (i, p) in self.providers.iter().enumerate() {
                if p.requires_key() && self.key_for(p.as_ref(), api_key).is_none() {
                    log::debug!("Skipping {}: no API key", p.name());
                    continue;
                }
                log::info!("Translation attempt {} with {}", i + 1, p.name());
                match self.attempt(p.as_ref(), text, source, target, api_key) {
                    Ok(t) => return Ok(t),
                    Err(e) => log::warn!("{} failed: {}", p.name(), e),
                }
            }
            return Err(ServiceError::Other("All translation providers failed".into()));
        }
        let p = self
            .providers
            .iter()
            .find(|p| p.name() == provider)
            .ok_or_else(|| ServiceError::Other(format!("Unknown provider '{}'", provider)))?;
        if p.requires_key() && self.key_for(p.as_ref(), api_key).is_none() {
            return Err(ServiceError::MissingKey {
                provider: p.name().to_string(),
            });
        }
        self.attempt(p.as_ref(), text, source, target, api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::fake::{ok_json, status, FakeTransport};

    fn translator(transport: FakeTransport, keys: TranslatorConfig) -> (Translator, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let t = Translator::new(transport.clone(), &HttpConfig::default(), keys);
        (t, transport)
    }

    #[test]
    fn test_priority_order() {
        let (t, _) = translator(FakeTransport::new(|r| status(&r.url, 500)), TranslatorConfig::default());
        assert_eq!(
            t.provider_names(),
            vec![
                "Google Translate (Free)",
                "LibreTranslate (Free)",
                "MyMemory (Free)",
                "DeepL (Paid)",
                "Azure Translator (Paid)"
            ]
        );
    }

    #[test]
    fn test_auto_falls_back_to_paid_provider() {
        let fake = FakeTransport::new(|r| {
            if r.url.contains("deepl") {
                assert_eq!(r.param("auth_key"), Some("secret"));
                assert_eq!(r.param("target_lang"), Some("ZH"));
                ok_json(&r.url, json!({"translations": [{"text": "你好"}]}))
            } else {
                status(&r.url, 503)
            }
        });
        let (t, transport) = translator(fake, TranslatorConfig::default());
        let out = t.translate("hello", "auto", "zh", "auto", Some("secret")).unwrap();
        assert_eq!(out.text, "你好");
        assert_eq!(out.provider, "DeepL (Paid)");
        assert_eq!(transport.urls().len(), 4);
    }

    #[test]
    fn test_auto_skips_keyless_paid_providers() {
        let (t, transport) = translator(FakeTransport::new(|r| status(&r.url, 500)), TranslatorConfig::default());
        let err = t.translate("hello", "auto", "zh", "auto", None).unwrap_err();
        assert!(err.to_string().contains("All translation providers failed"));
        assert_eq!(transport.urls().len(), 3);
    }

    #[test]
    fn test_configured_key_is_used() {
        let keys = TranslatorConfig {
            azure_api_key: Some("az".into()),
            ..Default::default()
        };
        let fake = FakeTransport::new(|r| {
            if r.url.contains("microsofttranslator") {
                ok_json(&r.url, json!([{"translations": [{"text": "bonjour", "to": "fr"}]}]))
            } else {
                status(&r.url, 500)
            }
        });
        let (t, _) = translator(fake, keys);
        let out = t.translate("hello", "en", "fr", "Azure Translator (Paid)", None).unwrap();
        assert_eq!(out.text, "bonjour");
        assert!(out.status.contains("Azure"));
    }

    #[test]
    fn test_explicit_provider_requires_key() {
        let (t, transport) = translator(FakeTransport::new(|r| status(&r.url, 500)), TranslatorConfig::default());
        assert!(matches!(
            t.translate("hello", "auto", "de", "DeepL (Paid)", None),
            Err(ServiceError::MissingKey { .. })
        ));
        assert!(transport.urls().is_empty());
    }

    #[test]
    fn test_google_segments_are_joined() {
        let fake = FakeTransport::new(|r| ok_json(&r.url, json!([[["Hallo ", "Hello "], ["Welt", "world"]], null, "en"])));
        let (t, _) = translator(fake, TranslatorConfig::default());
        let out = t.translate("Hello world", "auto", "de", "Google Translate (Free)", None).unwrap();
        assert_eq!(out.text, "Hallo Welt");
    }

    #[test]
    fn test_mymemory_status_checked() {
        let fake = FakeTransport::new(|r| {
            assert_eq!(r.param("langpair"), Some("en|it"));
            ok_json(&r.url, json!({"responseStatus": 403, "responseData": {"translatedText": "x"}}))
        });
        let (t, _) = translator(fake, TranslatorConfig::default());
        assert!(t.translate("hi", "en", "it", "MyMemory (Free)", None).is_err());
    }
}
