//! Folding ordered raw sources into one effective map.

use std::collections::HashMap;

use tracing::debug;

use super::RawSource;

/// Effective string values under a key prefix, after every source has been applied.
///
/// Keys are stored relative to `prefix`; [`EffectiveRawMap::qualified`] restores the
/// fully-qualified form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveRawMap {
    prefix: String,
    entries: HashMap<String, String>,
}

/// Merges `sources` in order, later sources winning per key, keeping only keys under `prefix`.
///
/// The environment, when included, is expected as the last source.
pub fn merge(sources: &[RawSource], prefix: &str) -> EffectiveRawMap {
    let mut entries = HashMap::new();
    for source in sources {
        for (key, value) in &source.entries {
            if let Some(rest) = key.strip_prefix(prefix) {
                entries.insert(rest.to_string(), value.clone());
            }
        }
    }

    debug!(prefix, sources = sources.len(), keys = entries.len(), "Sources merged");

    EffectiveRawMap {
        prefix: prefix.to_string(),
        entries,
    }
}

impl EffectiveRawMap {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Looks up a key relative to this map's prefix.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the fully-qualified form of a relative key.
    pub fn qualified(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Narrows the map to keys under an additional prefix.
    pub fn rebase(&self, sub_prefix: &str) -> EffectiveRawMap {
        let entries = self
            .entries
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(sub_prefix).map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();

        EffectiveRawMap {
            prefix: format!("{}{}", self.prefix, sub_prefix),
            entries,
        }
    }

    /// Relative keys present in the map.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
