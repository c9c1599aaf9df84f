//! File-backed sources: dotenv, JSON, YAML and TOML.

use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, SystemTime};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::{ChangeMarker, RawSource, SourceIdentity, SourceProvider};
use crate::error::SourceError;

/// Content format of a source file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    DotEnv,
    Json,
    Yaml,
    Toml,
}

impl FileFormat {
    /// Detects the format from the file extension; anything unrecognized is dotenv.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => FileFormat::Json,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::DotEnv,
        }
    }

    /// Parses file content into flat key/value pairs.
    pub fn parse(self, content: &str) -> Result<BTreeMap<String, String>, String> {
        match self {
            FileFormat::DotEnv => parse_dotenv(content),
            FileFormat::Json => {
                let doc: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| e.to_string())?;
                flatten_document(doc)
            }
            FileFormat::Yaml => {
                if content.trim().is_empty() {
                    return Ok(BTreeMap::new());
                }
                let doc: serde_json::Value =
                    serde_yaml::from_str(content).map_err(|e| e.to_string())?;
                flatten_document(doc)
            }
            FileFormat::Toml => {
                let doc: serde_json::Value = toml::from_str(content).map_err(|e| e.to_string())?;
                flatten_document(doc)
            }
        }
    }
}

/// Files modified within this long of their last hash are hashed again even when their
/// size and modification time are unchanged.
const SETTLE_WINDOW: Duration = Duration::from_secs(2);

/// Digest of the content last read, with the metadata it was read under.
#[derive(Debug, Clone)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
    digest: String,
    hashed_at: SystemTime,
}

impl Fingerprint {
    fn matches(&self, modified: SystemTime, len: u64) -> bool {
        self.modified == modified
            && self.len == len
            && self
                .hashed_at
                .duration_since(modified)
                .is_ok_and(|age| age >= SETTLE_WINDOW)
    }
}

/// A source read from a file on every load.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
    required: bool,
    fingerprint: Arc<Mutex<Option<Fingerprint>>>,
}

impl FileSource {
    /// A file that may be absent; a missing file contributes nothing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self {
            path,
            format,
            required: false,
            fingerprint: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes a missing file a read error.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Overrides extension-based format detection.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Reads the file, returning `None` if it is absent and optional.
    fn read(&self) -> Result<Option<Vec<u8>>, SourceError> {
        self.absent_if_optional(fs::read(&self.path))
    }

    fn stat(&self) -> Result<Option<Metadata>, SourceError> {
        self.absent_if_optional(fs::metadata(&self.path))
    }

    fn absent_if_optional<T>(
        &self,
        result: std::io::Result<T>,
    ) -> Result<Option<T>, SourceError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound && !self.required => {
                trace!(path = ?self.path, "Optional source file absent");
                Ok(None)
            }
            Err(e) => Err(SourceError::ReadFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Marker from the last hash, if the file's metadata shows it cannot have changed since.
    fn settled_marker(&self, metadata: &Metadata) -> Option<ChangeMarker> {
        let modified = metadata.modified().ok()?;
        let cached = self
            .fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let fingerprint = cached.as_ref()?;
        fingerprint
            .matches(modified, metadata.len())
            .then(|| ChangeMarker {
                modified: Some(modified),
                len: fingerprint.len,
                digest: fingerprint.digest.clone(),
            })
    }

    fn marker_for(&self, bytes: &[u8]) -> ChangeMarker {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let marker = ChangeMarker {
            modified,
            len: bytes.len() as u64,
            digest: compute_digest(bytes),
        };

        let mut cached = self
            .fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cached = modified.map(|modified| Fingerprint {
            modified,
            len: marker.len,
            digest: marker.digest.clone(),
            hashed_at: SystemTime::now(),
        });
        marker
    }
}

impl SourceProvider for FileSource {
    fn identity(&self) -> SourceIdentity {
        SourceIdentity::File(self.path.clone())
    }

    /// Metadata only for files that have settled since they were last hashed; otherwise the
    /// content is read and hashed again.
    fn marker(&self) -> Result<Option<ChangeMarker>, SourceError> {
        let Some(metadata) = self.stat()? else {
            return Ok(None);
        };
        if let Some(marker) = self.settled_marker(&metadata) {
            return Ok(Some(marker));
        }
        Ok(self.read()?.map(|bytes| self.marker_for(&bytes)))
    }

    fn load(&self) -> Result<RawSource, SourceError> {
        let Some(bytes) = self.read()? else {
            return Ok(RawSource::new(self.identity(), std::iter::empty()));
        };

        let content = String::from_utf8(bytes).map_err(|e| SourceError::ParseFailed {
            path: self.path.clone(),
            message: format!("content is not valid UTF-8: {}", e),
        })?;

        let entries = self
            .format
            .parse(&content)
            .map_err(|message| SourceError::ParseFailed {
                path: self.path.clone(),
                message,
            })?;

        debug!(
            path = ?self.path,
            format = ?self.format,
            keys = entries.len(),
            "Loaded source file"
        );

        let marker = self.marker_for(content.as_bytes());
        Ok(RawSource::new(self.identity(), entries).with_marker(marker))
    }
}

/// Computes the SHA256 hash of the given content.
fn compute_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid key regex"))
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped, an `export `
/// prefix is allowed, one layer of matching quotes is stripped from values, and a `#`
/// preceded by whitespace outside quotes starts a trailing comment.
pub fn parse_dotenv(content: &str) -> Result<BTreeMap<String, String>, String> {
    let mut vars = BTreeMap::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: expected KEY=VALUE", index + 1));
        };

        let key = key.trim();
        if !key_pattern().is_match(key) {
            return Err(format!("line {}: invalid key '{}'", index + 1, key));
        }

        vars.insert(key.to_string(), parse_value(value.trim()).to_string());
    }

    Ok(vars)
}

fn parse_value(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                let tail = rest[end + 1..].trim_start();
                if tail.is_empty() || tail.starts_with('#') {
                    return &rest[..end];
                }
            }
        }
    }
    unquote(strip_comment(value))
}

fn strip_comment(value: &str) -> &str {
    for (i, c) in value.char_indices() {
        if c == '#' && (i == 0 || value[..i].ends_with(char::is_whitespace)) {
            return value[..i].trim_end();
        }
    }
    value
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Flattens a structured document: nested tables join keys with `_`, arrays join with `,`.
fn flatten_document(doc: serde_json::Value) -> Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    match doc {
        serde_json::Value::Null => {}
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&key, value, &mut out)?;
            }
        }
        other => {
            return Err(format!(
                "top-level document must be a mapping, found {}",
                json_kind(&other)
            ))
        }
    }
    Ok(out)
}

fn flatten_into(
    key: &str,
    value: serde_json::Value,
    out: &mut BTreeMap<String, String>,
) -> Result<(), String> {
    match value {
        serde_json::Value::Object(map) => {
            for (child, value) in map {
                flatten_into(&format!("{}_{}", key, child), value, out)?;
            }
        }
        serde_json::Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(|item| {
                    scalar_to_raw(&item)
                        .ok_or_else(|| format!("'{}' contains a non-scalar array element", key))
                })
                .collect::<Result<Vec<_>, _>>()?;
            out.insert(key.to_string(), parts.join(crate::cast::LIST_DELIMITER));
        }
        scalar => {
            out.insert(key.to_string(), scalar_to_raw(&scalar).unwrap_or_default());
        }
    }
    Ok(())
}

fn scalar_to_raw(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a mapping",
    }
}
