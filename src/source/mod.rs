//! Raw key/value sources and the ordered set a configuration is built from.

pub mod env;
pub mod file;
pub mod merge;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

pub use env::{Environment, MapEnv, ProcessEnv};
pub use file::{FileFormat, FileSource};
pub use merge::{merge, EffectiveRawMap};

use crate::error::SourceError;

/// Environment variable that selects the `.env.<mode>` profile file.
pub const DEFAULT_MODE_VAR: &str = "ENVSTACK_MODE";

/// Where a raw map came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceIdentity {
    File(PathBuf),
    Inline(String),
    Environment,
}

impl SourceIdentity {
    /// Only file-backed sources take part in change detection.
    pub fn is_file_backed(&self) -> bool {
        matches!(self, SourceIdentity::File(_))
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceIdentity::File(path) => write!(f, "{}", path.display()),
            SourceIdentity::Inline(name) => write!(f, "inline:{}", name),
            SourceIdentity::Environment => f.write_str("environment"),
        }
    }
}

/// Cheap fingerprint of a file's state, compared between watcher ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMarker {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub digest: String,
}

/// One source's raw string map.
#[derive(Debug, Clone)]
pub struct RawSource {
    pub identity: SourceIdentity,
    /// Marker of the exact content the entries were parsed from.
    pub marker: Option<ChangeMarker>,
    pub entries: BTreeMap<String, String>,
}

impl RawSource {
    pub fn new<I>(identity: SourceIdentity, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            identity,
            marker: None,
            entries: entries.into_iter().collect(),
        }
    }

    pub fn with_marker(mut self, marker: ChangeMarker) -> Self {
        self.marker = Some(marker);
        self
    }
}

/// Something that can produce a raw map and report whether it has changed.
pub trait SourceProvider: Send + Sync + fmt::Debug {
    fn identity(&self) -> SourceIdentity;

    /// Current change marker, or `None` when the source has nothing to fingerprint.
    fn marker(&self) -> Result<Option<ChangeMarker>, SourceError>;

    /// Reads and parses the source.
    fn load(&self) -> Result<RawSource, SourceError>;
}

/// A static map held in memory.
#[derive(Debug, Clone)]
pub struct InlineSource {
    name: String,
    entries: BTreeMap<String, String>,
}

impl InlineSource {
    pub fn new<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SourceProvider for InlineSource {
    fn identity(&self) -> SourceIdentity {
        SourceIdentity::Inline(self.name.clone())
    }

    fn marker(&self) -> Result<Option<ChangeMarker>, SourceError> {
        Ok(None)
    }

    fn load(&self) -> Result<RawSource, SourceError> {
        Ok(RawSource::new(self.identity(), self.entries.clone()))
    }
}

/// Ordered sources plus an optional environment overlay applied last.
#[derive(Clone)]
pub struct SourceSet {
    providers: Vec<Arc<dyn SourceProvider>>,
    environment: Option<Arc<dyn Environment>>,
}

impl Default for SourceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceSet {
    /// No file sources, with the process environment as the overlay.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            environment: Some(Arc::new(ProcessEnv)),
        }
    }

    /// No sources at all, not even the environment.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            environment: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds an optional file source.
    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.provider(Arc::new(FileSource::new(path)))
    }

    /// Adds a file source that must exist.
    pub fn required_file(self, path: impl Into<PathBuf>) -> Self {
        self.provider(Arc::new(FileSource::new(path).required()))
    }

    pub fn inline<I, K, V>(self, name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.provider(Arc::new(InlineSource::new(name, entries)))
    }

    /// Adds every file matching `pattern`, in sorted path order.
    pub fn glob(mut self, pattern: &str) -> Result<Self, SourceError> {
        let entries = glob::glob(pattern).map_err(|e| SourceError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SourceError::ReadFailed {
                path: e.path().to_path_buf(),
                source: e.into(),
            })?;
            paths.push(path);
        }
        paths.sort();

        debug!(pattern, matches = paths.len(), "Expanded source pattern");
        for path in paths {
            self = self.file(path);
        }
        Ok(self)
    }

    /// Adds `<dir>/.env` and, if [`DEFAULT_MODE_VAR`] is set, `<dir>/.env.<mode>`.
    pub fn profile(self, dir: impl AsRef<Path>) -> Self {
        self.profile_with_var(dir, DEFAULT_MODE_VAR)
    }

    /// Like [`SourceSet::profile`], reading the mode from `mode_var`.
    ///
    /// The mode is read once, from this set's environment (or the process environment
    /// if none is set).
    pub fn profile_with_var(self, dir: impl AsRef<Path>, mode_var: &str) -> Self {
        let dir = dir.as_ref();
        let mode = match &self.environment {
            Some(env) => env.vars().get(mode_var).cloned(),
            None => ProcessEnv.vars().get(mode_var).cloned(),
        };

        let set = self.file(dir.join(".env"));
        match mode.filter(|m| !m.is_empty()) {
            Some(mode) => {
                info!(mode = %mode, "Using configuration profile");
                set.file(dir.join(format!(".env.{}", mode)))
            }
            None => set,
        }
    }

    /// Replaces the environment overlay.
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn without_environment(mut self) -> Self {
        self.environment = None;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn SourceProvider>] {
        &self.providers
    }

    /// Reads every source in order, with the environment appended last.
    pub fn load(&self) -> Result<Vec<RawSource>, SourceError> {
        let mut loaded = self
            .providers
            .iter()
            .map(|p| p.load())
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(env) = &self.environment {
            loaded.push(RawSource::new(SourceIdentity::Environment, env.vars()));
        }
        Ok(loaded)
    }

    /// Current markers of the file-backed sources, in order.
    pub fn markers(&self) -> Result<Vec<Option<ChangeMarker>>, SourceError> {
        self.providers
            .iter()
            .filter(|p| p.identity().is_file_backed())
            .map(|p| p.marker())
            .collect()
    }

    /// Paths of the file-backed sources.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.providers
            .iter()
            .filter_map(|p| match p.identity() {
                SourceIdentity::File(path) => Some(path),
                _ => None,
            })
            .collect()
    }
}

/// Markers recorded from a completed load, aligned with [`SourceSet::markers`].
pub fn loaded_markers(sources: &[RawSource]) -> Vec<Option<ChangeMarker>> {
    sources
        .iter()
        .filter(|s| s.identity.is_file_backed())
        .map(|s| s.marker.clone())
        .collect()
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSet")
            .field("providers", &self.providers)
            .field("environment", &self.environment.is_some())
            .finish()
    }
}
