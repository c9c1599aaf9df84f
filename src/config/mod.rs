//! Configuration building, publication, and live reload.

pub mod hot_reload;
pub mod instance;
pub mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub use hot_reload::{
    Callback, ErrorSink, FnSink, TickOutcome, TracingSink, WatchHandle, WatchOptions,
};
pub use instance::{ConfigInstance, Mapping, Rendered, MASK};
pub use loader::{build, build_initial};

use crate::error::BuildError;
use crate::schema::ConfigSchema;
use crate::source::SourceSet;
use hot_reload::Shared;

/// A configuration kept current as its file-backed sources change.
///
/// Readers call [`LiveConfig::current`] and always get a complete instance from the most
/// recent successful build. Cloning is cheap; clones share the same instance slot.
#[derive(Clone)]
pub struct LiveConfig {
    shared: Arc<Shared>,
}

impl LiveConfig {
    /// Builds the initial instance, reporting later reload failures through tracing.
    pub fn load(schema: Arc<ConfigSchema>, sources: SourceSet) -> Result<Self, BuildError> {
        Self::load_with_sink(schema, sources, TracingSink)
    }

    /// Builds the initial instance, reporting later reload failures to `sink`.
    pub fn load_with_sink(
        schema: Arc<ConfigSchema>,
        sources: SourceSet,
        sink: impl ErrorSink + 'static,
    ) -> Result<Self, BuildError> {
        let (instance, baseline) = loader::build_snapshot(&schema, &sources)?;
        info!(
            schema = schema.name(),
            watched = baseline.len(),
            "Configuration loaded"
        );

        Ok(Self {
            shared: Arc::new(Shared::new(
                schema,
                sources,
                Arc::new(sink),
                instance,
                baseline,
            )),
        })
    }

    /// The instance currently published to readers.
    pub fn current(&self) -> Arc<ConfigInstance> {
        self.shared.current.load_full()
    }

    /// Runs one change check now, on the calling thread.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    /// Registers `callback` and starts the background worker with default options.
    ///
    /// Must be called within a tokio runtime.
    pub fn watch<F>(&self, callback: F) -> WatchHandle
    where
        F: Fn(&Arc<ConfigInstance>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.watch_with(WatchOptions::default(), callback)
    }

    /// Like [`LiveConfig::watch`] with explicit options.
    ///
    /// Further calls while the worker runs only add callbacks; the first call's options win.
    pub fn watch_with<F>(&self, options: WatchOptions, callback: F) -> WatchHandle
    where
        F: Fn(&Arc<ConfigInstance>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.add_callback(Arc::new(callback));
        self.shared.ensure_worker(&options);
        WatchHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.shared.is_running()
    }

    /// Files whose change markers are polled.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.sources().watched_paths()
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("id", &self.shared.id)
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReloadFailure, WatcherReloadError};
    use crate::schema::Field;
    use crate::source::MapEnv;
    use hot_reload::MockErrorSink;
    use std::fs;
    use std::path::Path;

    fn schema() -> Arc<ConfigSchema> {
        ConfigSchema::builder("AppConfig")
            .field(Field::integer("PORT"))
            .field(Field::string("HOST").default("localhost"))
            .build()
            .unwrap()
    }

    fn sources(path: &Path) -> SourceSet {
        SourceSet::empty()
            .file(path)
            .with_environment(Arc::new(MapEnv::default()))
    }

    fn rewrite(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_unchanged_sources_do_not_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let mut sink = MockErrorSink::new();
        sink.expect_report().never();
        let live = LiveConfig::load_with_sink(schema(), sources(&path), sink).unwrap();

        assert_eq!(live.tick(), TickOutcome::Unchanged);
        assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);
    }

    #[test]
    fn test_successful_change_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let live = LiveConfig::load(schema(), sources(&path)).unwrap();
        let before = live.current();

        rewrite(&path, "PORT=9000\nHOST=example.org\n");
        assert_eq!(live.tick(), TickOutcome::Reloaded);

        let after = live.current();
        assert_eq!(after.value::<i64>("PORT").unwrap(), 9000);
        assert_eq!(after.value::<String>("HOST").unwrap(), "example.org");
        // The old instance is untouched.
        assert_eq!(before.value::<i64>("PORT").unwrap(), 8000);
    }

    #[test]
    fn test_failed_reload_keeps_current_and_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let mut sink = MockErrorSink::new();
        sink.expect_report()
            .withf(|e| {
                matches!(&e.cause, ReloadFailure::Build(b) if b.missing_keys() == vec!["PORT"])
            })
            .times(1)
            .return_const(());
        let live = LiveConfig::load_with_sink(schema(), sources(&path), sink).unwrap();

        rewrite(&path, "HOST=elsewhere\n");
        assert_eq!(live.tick(), TickOutcome::Rejected);
        assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);

        // Same broken content is not retried or re-reported.
        assert_eq!(live.tick(), TickOutcome::Unchanged);
        assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);
    }

    #[test]
    fn test_recovery_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let sink = FnSink(|_: WatcherReloadError| {});
        let live = LiveConfig::load_with_sink(schema(), sources(&path), sink).unwrap();

        rewrite(&path, "PORT=not-a-number\n");
        assert_eq!(live.tick(), TickOutcome::Rejected);

        rewrite(&path, "PORT=8100\n");
        assert_eq!(live.tick(), TickOutcome::Reloaded);
        assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8100);
    }

    #[test]
    fn test_environment_changes_are_not_watched() {
        let env = Arc::new(MapEnv::new([("PORT", "8000")]));
        let live = LiveConfig::load(schema(), SourceSet::empty().with_environment(env)).unwrap();
        assert!(live.watched_paths().is_empty());
        assert_eq!(live.tick(), TickOutcome::Unchanged);
    }

    #[test]
    fn test_callback_failure_is_reported_after_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let mut sink = MockErrorSink::new();
        sink.expect_report()
            .withf(|e| {
                matches!(&e.cause, ReloadFailure::Callback { message } if message == "rejected")
            })
            .times(1)
            .return_const(());
        let live = LiveConfig::load_with_sink(schema(), sources(&path), sink).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.block_on(async {
            live.watch_with(
                WatchOptions {
                    interval: std::time::Duration::from_secs(3600),
                },
                |_| Err(anyhow::anyhow!("rejected")),
            )
        });

        rewrite(&path, "PORT=8001\n");
        assert_eq!(live.tick(), TickOutcome::Reloaded);
        assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8001);

        runtime.block_on(handle.stop());
        assert!(!live.is_watching());
    }

    #[test]
    fn test_callback_can_tick_the_same_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        rewrite(&path, "PORT=8000\n");

        let live = LiveConfig::load(schema(), sources(&path)).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let inner = live.clone();
        let handle = runtime.block_on(async {
            live.watch_with(
                WatchOptions {
                    interval: std::time::Duration::from_secs(3600),
                },
                move |instance| {
                    let nested = inner.tick();
                    seen_tx.send((instance.value::<i64>("PORT")?, nested))?;
                    Ok(())
                },
            )
        });

        rewrite(&path, "PORT=8001\n");
        let outer = {
            let live = live.clone();
            std::thread::spawn(move || live.tick())
        };

        let (port, nested) = seen_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("callback finished without blocking");
        assert_eq!(port, 8001);
        assert_eq!(nested, TickOutcome::Unchanged);
        assert_eq!(outer.join().unwrap(), TickOutcome::Reloaded);

        runtime.block_on(handle.stop());
        assert!(!live.is_watching());
    }
}
