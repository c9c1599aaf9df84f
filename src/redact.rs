//! Scrubbing secret values out of free-form text such as log lines.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::ConfigInstance;

/// Replacement text for a redacted secret.
pub const REDACTED: &str = "[REDACTED]";

/// Replaces known secret values with [`REDACTED`].
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    pattern: Option<Regex>,
}

impl Redactor {
    /// Matches any of `secrets` literally. Empty strings are ignored.
    pub fn new<I, S>(secrets: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut literals: Vec<String> = secrets
            .into_iter()
            .filter(|s| !s.as_ref().is_empty())
            .map(|s| regex::escape(s.as_ref()))
            .collect();

        if literals.is_empty() {
            return Ok(Self::default());
        }

        // Longer secrets first so a secret containing another is replaced whole.
        literals.sort_by(|a, b| b.len().cmp(&a.len()));
        literals.dedup();

        Ok(Self {
            pattern: Some(Regex::new(&literals.join("|"))?),
        })
    }

    /// Covers every secret field in `instance` and its nested sections.
    pub fn from_instance(instance: &ConfigInstance) -> Result<Self, regex::Error> {
        Self::new(instance.secret_values())
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, REDACTED),
            None => Cow::Borrowed(text),
        }
    }
}

/// A tracing writer that redacts each formatted event before it reaches stderr.
///
/// The redactor can be replaced at any time, e.g. after a reload changes the secrets.
#[derive(Debug, Clone, Default)]
pub struct RedactingMakeWriter {
    redactor: Arc<ArcSwap<Redactor>>,
}

impl RedactingMakeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new redactor for all subsequent log lines.
    pub fn update(&self, redactor: Redactor) {
        self.redactor.store(Arc::new(redactor));
    }
}

impl<'a> MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            redactor: self.redactor.load_full(),
        }
    }
}

/// Writer handed out per event by [`RedactingMakeWriter`].
pub struct RedactingWriter {
    redactor: Arc<Redactor>,
}

impl Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        io::stderr().write_all(self.redactor.redact(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_all_occurrences() {
        let redactor = Redactor::new(["SECRET_PASSWORD"]).unwrap();
        assert_eq!(
            redactor.redact("User login with SECRET_PASSWORD and SECRET_PASSWORD."),
            "User login with [REDACTED] and [REDACTED]."
        );
        assert_eq!(redactor.redact("Safe log message."), "Safe log message.");
    }

    #[test]
    fn test_secrets_are_matched_literally() {
        let redactor = Redactor::new(["a.b*c", ""]).unwrap();
        assert_eq!(redactor.redact("x a.b*c axbbc"), "x [REDACTED] axbbc");
    }

    #[test]
    fn test_longest_secret_wins() {
        let redactor = Redactor::new(["abc", "abcdef"]).unwrap();
        assert_eq!(redactor.redact("abcdef"), "[REDACTED]");
    }

    #[test]
    fn test_empty_redactor_borrows() {
        let redactor = Redactor::new(Vec::<String>::new()).unwrap();
        assert!(redactor.is_empty());
        assert!(matches!(redactor.redact("text"), Cow::Borrowed("text")));
    }
}
