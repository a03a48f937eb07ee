//! LoRA information lookup with a JSON side-car cache.
//!
//! A lookup first consults the side-car keyed by file name. On a miss the
//! file is hashed, the remote catalog is asked for that hash, the embedded
//! safetensors metadata is read, and the combined record is written back.

use crate::core::config::{self, HttpConfig, LoraConfig};
use crate::core::error::{ExecutionResult, KernelError, ServiceError};
use crate::services::http::{HttpRequest, HttpTransport, UreqTransport};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Headers larger than this are treated as corrupt.
const MAX_HEADER_BYTES: u64 = 100 * 1024 * 1024;
const TOP_TAGS: usize = 10;

/// One cached side-car entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoraRecord {
    pub output: String,
    pub trained_words: String,
    pub example_prompt: Option<String>,
    pub base_model: String,
    /// Embedded training metadata plus the aggregated tag frequency.
    pub meta_info: Json,
}

impl LoraRecord {
    /// Most frequent training tags recorded in `meta_info`.
    pub fn top_tags(&self) -> Vec<String> {
        self.meta_info
            .get("tagFrequency")
            .and_then(Json::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.get(0).and_then(Json::as_str))
                    .take(TOP_TAGS)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Human-readable report shown by the LoRA info node.
    pub fn summary(&self, lora_name: &str) -> String {
        let mut text = format!("LoRA: {}\n", lora_name);
        if !self.base_model.is_empty() {
            text.push_str(&format!("Base Model: {}\n", self.base_model));
        }
        if !self.trained_words.is_empty() {
            text.push_str(&format!("Trigger Words: {}\n", self.trained_words));
        }
        if let Some(prompt) = self.example_prompt.as_deref().filter(|p| !p.is_empty()) {
            text.push_str(&format!("Example Prompt: {}\n", prompt));
        }
        let tags = self.top_tags();
        if !tags.is_empty() {
            text.push_str(&format!("Top Tags: {}\n", tags.join(", ")));
        }
        if !self.output.is_empty() {
            text.push_str(&format!("\nDetails:\n{}", self.output));
        }
        text
    }
}

/// Side-car file mapping LoRA file names to records.
#[derive(Debug, Clone)]
pub struct LoraStore {
    path: PathBuf,
}

impl LoraStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Raw entries keyed by file name; a missing file is empty, a malformed one is an error.
    fn read_raw(&self) -> io::Result<IndexMap<String, Json>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(IndexMap::new()),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Read the whole side-car. A missing or unreadable file is an empty cache.
    pub fn load(&self) -> IndexMap<String, LoraRecord> {
        let raw = match self.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Ignoring LoRA cache {}: {}", self.path.display(), e);
                return IndexMap::new();
            }
        };
        // Entries that fail to parse are skipped rather than poisoning the lookup.
        raw.into_iter()
            .filter_map(|(k, v)| serde_json::from_value(v).ok().map(|r| (k, r)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<LoraRecord> {
        self.load().shift_remove(name)
    }

    /// Insert one record and rewrite the side-car through a temp file and rename.
    /// A side-car that cannot be parsed is left untouched and reported.
    pub fn insert(&self, name: &str, record: LoraRecord) -> io::Result<()> {
        let mut all = self.read_raw()?;
        all.insert(name.to_string(), serde_json::to_value(record)?);
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &all)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// The `__metadata__` object of a safetensors header, or `Null` when absent.
pub fn read_safetensors_metadata(path: &Path) -> io::Result<Json> {
    let mut file = File::open(path)?;
    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_HEADER_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("header length {} is implausible", len),
        ));
    }
    let mut header = vec![0u8; len as usize];
    file.read_exact(&mut header)?;
    let header: Json = serde_json::from_slice(&header)?;
    Ok(header.get("__metadata__").cloned().unwrap_or(Json::Null))
}

/// Aggregate `ss_tag_frequency` across datasets, most frequent first.
/// The field is itself a JSON document encoded as a string.
pub fn tag_frequency(metadata: &Json) -> Vec<(String, u64)> {
    let parsed = match metadata.get("ss_tag_frequency") {
        Some(Json::String(s)) => serde_json::from_str::<Json>(s).unwrap_or(Json::Null),
        Some(other) => other.clone(),
        None => Json::Null,
    };
    let mut totals: IndexMap<String, u64> = IndexMap::new();
    if let Some(datasets) = parsed.as_object() {
        for tags in datasets.values().filter_map(Json::as_object) {
            for (tag, count) in tags {
                *totals.entry(tag.trim().to_string()).or_insert(0) += count.as_u64().unwrap_or(0);
            }
        }
    }
    let mut out: Vec<(String, u64)> = totals.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

/// Build a record from a catalog answer; `site` is the catalog's web root.
pub fn record_from_catalog(info: &Json, site: &str) -> LoraRecord {
    let trained_words = info
        .get("trainedWords")
        .and_then(Json::as_array)
        .map(|w| w.iter().filter_map(Json::as_str).collect::<Vec<_>>().join(","))
        .unwrap_or_default();
    let base_model = info
        .get("baseModel")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();

    let mut output = String::new();
    if let Some(id) = info.get("modelId").filter(|v| !v.is_null()) {
        output.push_str(&format!("URL: {}/models/{}\n", site, id));
    }
    if !trained_words.is_empty() {
        output.push_str(&format!("Triggers: {}\n", trained_words));
    }
    if !base_model.is_empty() {
        output.push_str(&format!("Base Model: {}\n", base_model));
    }

    let mut example_prompt = None;
    if let Some(images) = info.get("images").and_then(Json::as_array).filter(|i| !i.is_empty()) {
        output.push_str("\nExamples:\n");
        for image in images {
            let url = image.get("url").and_then(Json::as_str).unwrap_or_default();
            output.push_str(&format!("\nOutput: {}\n", url));
            if let Some(meta) = image.get("meta").and_then(Json::as_object) {
                for (key, value) in meta {
                    let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    if example_prompt.is_none() && key == "prompt" {
                        example_prompt = Some(shown.clone());
                    }
                    output.push_str(&format!("{}: {}\n", key, shown));
                }
            }
            output.push('\n');
        }
    }

    LoraRecord {
        output,
        trained_words,
        example_prompt,
        base_model,
        meta_info: Json::Null,
    }
}

pub struct LoraInfoService {
    transport: Arc<dyn HttpTransport>,
    http: HttpConfig,
    lora: LoraConfig,
    store: LoraStore,
}

impl LoraInfoService {
    pub fn new(transport: Arc<dyn HttpTransport>, http: HttpConfig, lora: LoraConfig) -> Self {
        let store = LoraStore::new(lora.database_path.clone());
        Self { transport, http, lora, store }
    }

    pub fn from_global() -> Self {
        let cfg = config::global();
        Self::new(Arc::new(UreqTransport::new()), cfg.http.clone(), cfg.lora.clone())
    }

    pub fn store(&self) -> &LoraStore {
        &self.store
    }

    /// Resolve a bare name against the configured LoRA directory.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        match &self.lora.lora_dir {
            Some(dir) if !direct.is_absolute() => dir.join(direct),
            _ => direct,
        }
    }

    fn site(&self) -> String {
        let base = self.lora.catalog_base_url.trim_end_matches('/');
        base.strip_suffix("/api/v1").unwrap_or(base).to_string()
    }

    fn fetch_catalog(&self, sha256: &str) -> Result<Json, ServiceError> {
        let url = format!(
            "{}/model-versions/by-hash/{}",
            self.lora.catalog_base_url.trim_end_matches('/'),
            sha256
        );
        self.transport
            .send(&HttpRequest::get(url, self.http.timeout()))?
            .json("catalog")
    }

    /// Cached record for `name`, fetching it on a miss. Only an unreadable
    /// LoRA file is an error; catalog failures produce a record whose output
    /// carries the error text and which is not cached.
    pub fn lookup(&self, name: &str) -> ExecutionResult<LoraRecord> {
        if let Some(record) = self.store.get(name) {
            log::debug!("LoRA cache hit for {}", name);
            return Ok(record);
        }
        log::info!("LoRA cache miss for {}, querying catalog", name);

        let path = self.resolve(name);
        let decode_err = |e: io::Error| KernelError::Decoder {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let hash = sha256_file(&path).map_err(decode_err)?;

        let metadata = read_safetensors_metadata(&path).unwrap_or_else(|e| {
            log::debug!("No embedded metadata in {}: {}", path.display(), e);
            Json::Null
        });
        let tags = tag_frequency(&metadata);
        let meta_info = json!({
            "sha256": hash,
            "metadata": metadata,
            "tagFrequency": tags,
        });

        match self.fetch_catalog(&hash) {
            Ok(info) => {
                let record = LoraRecord {
                    meta_info,
                    ..record_from_catalog(&info, &self.site())
                };
                if let Err(e) = self.store.insert(name, record.clone()) {
                    log::warn!("Could not update LoRA cache {}: {}", self.store.path().display(), e);
                }
                Ok(record)
            }
            Err(e) => {
                log::warn!("LoRA catalog lookup for {} failed: {}", name, e);
                Ok(LoraRecord {
                    output: format!("Error: {}", e),
                    meta_info,
                    ..Default::default()
                })
            }
        }
    }
}
