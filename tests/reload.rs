use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use envstack::config::{LiveConfig, WatchOptions};
use envstack::error::{ReloadFailure, WatcherReloadError};
use envstack::schema::{ConfigSchema, Field};
use envstack::source::{MapEnv, SourceSet};

const INTERVAL: Duration = Duration::from_millis(20);

fn options() -> WatchOptions {
    WatchOptions { interval: INTERVAL }
}

fn schema() -> Arc<ConfigSchema> {
    ConfigSchema::builder("ServerConfig")
        .field(Field::integer("PORT").min(1).max(65535))
        .field(Field::string("HOST").default("0.0.0.0"))
        .build()
        .unwrap()
}

fn sources(path: &Path) -> SourceSet {
    SourceSet::empty()
        .file(path)
        .with_environment(Arc::new(MapEnv::default()))
}

#[tokio::test]
async fn test_broken_source_rolls_back_and_reports_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "PORT=8000\n").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<WatcherReloadError>();
    let live = LiveConfig::load_with_sink(schema(), sources(&path), tx).unwrap();
    let handle = live.watch_with(options(), |_| Ok(()));

    fs::write(&path, "HOST=somewhere\n").unwrap();

    let error = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("reload error within timeout")
        .expect("sink open");
    match &error.cause {
        ReloadFailure::Build(aggregate) => assert_eq!(aggregate.missing_keys(), vec!["PORT"]),
        other => panic!("unexpected failure: {other}"),
    }
    assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);

    // Several more ticks over the same broken content report nothing further.
    sleep(INTERVAL * 10).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);

    handle.stop().await;
}

#[tokio::test]
async fn test_valid_change_is_swapped_in_before_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "PORT=8000\n").unwrap();

    let live = LiveConfig::load(schema(), sources(&path)).unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let reader = live.clone();
    let handle = live.watch_with(options(), move |instance| {
        // The published instance is already the one being announced.
        let published = Arc::ptr_eq(&reader.current(), instance);
        seen_tx.send((instance.value::<i64>("PORT")?, published))?;
        Ok(())
    });

    fs::write(&path, "PORT=9000\n").unwrap();

    let (port, published) = timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .expect("callback within timeout")
        .expect("callback channel open");
    assert_eq!(port, 9000);
    assert!(published);
    assert_eq!(live.current().value::<i64>("PORT").unwrap(), 9000);

    handle.stop().await;
}

#[tokio::test]
async fn test_no_callback_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "PORT=8000\n").unwrap();

    let live = LiveConfig::load(schema(), sources(&path)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handle = live.watch_with(options(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(handle.is_running());

    handle.stop().await;
    handle.stop().await;
    assert!(!live.is_watching());

    fs::write(&path, "PORT=8001\n").unwrap();
    sleep(INTERVAL * 10).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8000);
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_the_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "PORT=8000\n").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<WatcherReloadError>();
    let live = LiveConfig::load_with_sink(schema(), sources(&path), tx).unwrap();
    let handle = live.watch_with(options(), |instance| {
        if instance.value::<i64>("PORT")? == 8001 {
            panic!("cannot handle 8001");
        }
        Ok(())
    });

    fs::write(&path, "PORT=8001\n").unwrap();
    let error = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("callback failure within timeout")
        .expect("sink open");
    assert!(matches!(error.cause, ReloadFailure::Callback { .. }));
    // The swap happened before the callback ran.
    assert_eq!(live.current().value::<i64>("PORT").unwrap(), 8001);

    fs::write(&path, "PORT=8002\nHOST=next\n").unwrap();
    timeout(Duration::from_secs(5), async {
        while live.current().value::<i64>("PORT").unwrap() != 8002 {
            sleep(INTERVAL).await;
        }
    })
    .await
    .expect("watcher still reloading");

    handle.stop().await;
}

#[tokio::test]
async fn test_watch_twice_shares_one_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    fs::write(&path, "PORT=8000\n").unwrap();

    let live = LiveConfig::load(schema(), sources(&path)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let (a, b) = (calls.clone(), calls.clone());
    let first = live.watch_with(options(), move |_| {
        a.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let second = live.watch(move |_| {
        b.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(first.id(), second.id());

    fs::write(&path, "PORT=8100\n").unwrap();
    timeout(Duration::from_secs(5), async {
        while calls.load(Ordering::SeqCst) < 2 {
            sleep(INTERVAL).await;
        }
    })
    .await
    .expect("both callbacks ran");

    second.stop().await;
    assert!(!first.is_running());
}
