//! Process environment access.

use std::collections::BTreeMap;

/// Current mapping of environment variable names to values.
#[cfg_attr(test, mockall::automock)]
pub trait Environment: Send + Sync {
    /// Returns the variables as they are at call time.
    fn vars(&self) -> BTreeMap<String, String>;
}

/// Reads the real process environment. Non-UTF-8 entries are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn vars(&self) -> BTreeMap<String, String> {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

/// A fixed environment, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: BTreeMap<String, String>,
}

impl MapEnv {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Environment for MapEnv {
    fn vars(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }
}
