//! The watch loop: change source -> allow-list -> debouncer -> handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::allow_list::AllowList;
use super::debouncer::DebounceScheduler;
use super::handler::TriggerHandler;
use super::source::ChangeSource;
use super::WatchError;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Raw events received from the source.
    pub events: u64,
    /// Events for paths outside the allow-list.
    pub ignored: u64,
    /// Settled triggers handed to the handler.
    pub triggers: u64,
    /// Triggers that errored, panicked, or ended in a git failure.
    pub failures: u64,
}

/// Watches the allow-listed files and publishes them once they settle.
///
/// Each file is debounced independently. Publishes for different files
/// may run concurrently; publishes for the same file never overlap.
pub struct AutoPushWatcher {
    allow_list: AllowList,
    source: Box<dyn ChangeSource>,
    handler: Arc<dyn TriggerHandler>,
    quiet_period: Duration,
}

impl AutoPushWatcher {
    pub fn builder() -> AutoPushWatcherBuilder {
        AutoPushWatcherBuilder::new()
    }

    /// Run until `shutdown` resolves or the change source stops.
    ///
    /// On shutdown the source is cancelled and pending deferred checks are
    /// abandoned. Publishes already running are left to finish on their own.
    pub async fn watch(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<WatchSummary, WatchError> {
        let Self {
            allow_list,
            mut source,
            handler,
            quiet_period,
        } = self;

        let (event_tx, mut event_rx) = mpsc::channel(100);
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel();
        let scheduler = DebounceScheduler::new(quiet_period, fired_tx);
        let cancel = CancellationToken::new();

        let source_name = source.name();
        let mut source_task = tokio::spawn({
            let cancel = cancel.clone();
            async move { source.run(event_tx, cancel).await }
        });

        let mut publishes: JoinSet<bool> = JoinSet::new();
        let mut locks: HashMap<String, Arc<Mutex<()>>> = HashMap::new();
        let mut summary = WatchSummary::default();
        let mut source_finished = false;

        crate::log_event!(
            "watcher",
            "started",
            "{} files via {source_name}, quiet period {:.1}s",
            allow_list.len(),
            quiet_period.as_secs_f64()
        );

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    crate::log_event!("watcher", "shutdown requested");
                    break Ok(());
                }

                Some(event) = event_rx.recv() => {
                    // Our own writes, e.g. the log file
                    if allow_list.is_ignored(&event.path) {
                        continue;
                    }
                    summary.events += 1;
                    match allow_list.matches(&event.path) {
                        Some(name) => {
                            crate::debug_event!("watcher", "change", "{}", event.path.display());
                            scheduler.notify(name);
                        }
                        None => {
                            summary.ignored += 1;
                            crate::debug_event!("watcher", "unmatched", "{}", event.path.display());
                        }
                    }
                }

                Some(name) = fired_rx.recv() => {
                    summary.triggers += 1;
                    crate::log_event!("watcher", "settled", "{name}");

                    let lock = locks.entry(name.clone()).or_default().clone();
                    let path = allow_list.resolve(&name);
                    let handler = handler.clone();
                    publishes.spawn(async move {
                        // One publish per file at a time
                        let _guard = lock.lock().await;
                        match handler.on_settled(&name, &path).await {
                            Ok(outcome) => outcome.is_failure(),
                            Err(e) => {
                                tracing::error!("[{}] {name}: {e}", handler.name());
                                true
                            }
                        }
                    });
                }

                Some(joined) = publishes.join_next(), if !publishes.is_empty() => {
                    match joined {
                        Ok(false) => {}
                        Ok(true) => summary.failures += 1,
                        Err(e) => {
                            summary.failures += 1;
                            if e.is_panic() {
                                tracing::error!("[watcher] publish task panicked: {e}");
                            }
                        }
                    }
                }

                joined = &mut source_task => {
                    source_finished = true;
                    break match joined {
                        Ok(Ok(())) => Err(WatchError::SourceStopped {
                            source_name,
                            reason: "ended without a shutdown request".to_string(),
                        }),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(WatchError::SourceStopped {
                            source_name,
                            reason: e.to_string(),
                        }),
                    };
                }
            }
        };

        cancel.cancel();
        scheduler.shutdown();
        // Unblocks a source stuck on a full channel
        drop(event_rx);
        if !source_finished {
            if let Err(e) = source_task.await {
                tracing::warn!("[watcher] change source did not stop cleanly: {e}");
            }
        }

        if !publishes.is_empty() {
            crate::log_event!(
                "watcher",
                "leaving in-flight publishes to finish",
                "{}",
                publishes.len()
            );
            publishes.detach_all();
        }

        crate::log_event!(
            "watcher",
            "stopped",
            "{} events, {} triggers, {} failures",
            summary.events,
            summary.triggers,
            summary.failures
        );

        result.map(|()| summary)
    }
}

/// Builder for [`AutoPushWatcher`].
pub struct AutoPushWatcherBuilder {
    allow_list: Option<AllowList>,
    source: Option<Box<dyn ChangeSource>>,
    handler: Option<Arc<dyn TriggerHandler>>,
    quiet_period: Duration,
}

impl AutoPushWatcherBuilder {
    pub fn new() -> Self {
        Self {
            allow_list: None,
            source: None,
            handler: None,
            quiet_period: Duration::from_secs(5),
        }
    }

    pub fn allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = Some(allow_list);
        self
    }

    pub fn source(mut self, source: impl ChangeSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn handler(mut self, handler: Arc<dyn TriggerHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn build(self) -> Result<AutoPushWatcher, WatchError> {
        let allow_list = self
            .allow_list
            .filter(|list| !list.is_empty())
            .ok_or_else(|| WatchError::InitFailed {
                reason: "At least one watched file is required".to_string(),
            })?;

        let source = self.source.ok_or_else(|| WatchError::InitFailed {
            reason: "Change source is required".to_string(),
        })?;

        let handler = self.handler.ok_or_else(|| WatchError::InitFailed {
            reason: "Trigger handler is required".to_string(),
        })?;

        Ok(AutoPushWatcher {
            allow_list,
            source,
            handler,
            quiet_period: self.quiet_period,
        })
    }
}

impl Default for AutoPushWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::PushOutcome;
    use crate::watcher::source::ChangeEvent;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use tokio::sync::oneshot;
    use tokio::time::{Instant, sleep};

    /// Forwards events fed by the test.
    struct ChannelSource {
        rx: mpsc::Receiver<ChangeEvent>,
    }

    #[async_trait]
    impl ChangeSource for ChannelSource {
        fn name(&self) -> &'static str {
            "test"
        }

        async fn run(
            &mut self,
            events: mpsc::Sender<ChangeEvent>,
            shutdown: CancellationToken,
        ) -> Result<(), WatchError> {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    Some(event) = self.rx.recv() => {
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ChangeSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(
            &mut self,
            _events: mpsc::Sender<ChangeEvent>,
            _shutdown: CancellationToken,
        ) -> Result<(), WatchError> {
            Err(WatchError::InitFailed {
                reason: "inotify limit reached".to_string(),
            })
        }
    }

    /// Records (file, path, started, finished) per trigger.
    #[derive(Default)]
    struct RecordingHandler {
        busy_for: Duration,
        panic: bool,
        seen: parking_lot::Mutex<Vec<(String, PathBuf, Instant, Instant)>>,
    }

    #[async_trait]
    impl TriggerHandler for RecordingHandler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_settled(&self, file: &str, path: &Path) -> Result<PushOutcome, WatchError> {
            if self.panic {
                panic!("handler blew up");
            }
            let started = Instant::now();
            sleep(self.busy_for).await;
            self.seen
                .lock()
                .push((file.to_string(), path.to_path_buf(), started, Instant::now()));
            Ok(PushOutcome::Success)
        }
    }

    fn allow_list() -> AllowList {
        AllowList::new("/repo", &["plan-data.json".to_string()])
    }

    struct Harness {
        events: mpsc::Sender<ChangeEvent>,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<Result<WatchSummary, WatchError>>,
    }

    fn start(handler: Arc<RecordingHandler>) -> Harness {
        start_with(allow_list(), handler)
    }

    fn start_with(allow_list: AllowList, handler: Arc<RecordingHandler>) -> Harness {
        let (events, rx) = mpsc::channel(16);
        let (stop, stopped) = oneshot::channel::<()>();
        let watcher = AutoPushWatcher::builder()
            .allow_list(allow_list)
            .source(ChannelSource { rx })
            .handler(handler)
            .quiet_period(Duration::from_secs(5))
            .build()
            .unwrap();
        let task = tokio::spawn(watcher.watch(async move {
            let _ = stopped.await;
        }));
        Harness { events, stop, task }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_publishes_once_after_quiet_period() {
        let handler = Arc::new(RecordingHandler::default());
        let harness = start(handler.clone());
        let t0 = Instant::now();

        for _ in 0..3 {
            harness
                .events
                .send(ChangeEvent::new("/repo/plan-data.json"))
                .await
                .unwrap();
            sleep(Duration::from_secs(2)).await;
        }
        harness
            .events
            .send(ChangeEvent::new("/repo/unrelated.txt"))
            .await
            .unwrap();

        sleep(Duration::from_secs(20)).await;
        harness.stop.send(()).unwrap();
        let summary = harness.task.await.unwrap().unwrap();

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        let (file, path, started, _) = &seen[0];
        assert_eq!(file, "plan-data.json");
        assert_eq!(path, &PathBuf::from("/repo/plan-data.json"));
        let fired_at = started.duration_since(t0);
        assert!(fired_at >= Duration::from_secs(9) && fired_at < Duration::from_millis(9100));

        assert_eq!(
            summary,
            WatchSummary {
                events: 4,
                ignored: 1,
                triggers: 1,
                failures: 0,
            }
        );
    }

    /// Log output captured by a thread-local subscriber.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_file_events_are_dropped_silently() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer({
                let log = log.clone();
                move || log.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let handler = Arc::new(RecordingHandler::default());
        let harness = start_with(allow_list().ignore("/repo/auto_push.log"), handler.clone());

        for _ in 0..50 {
            harness
                .events
                .send(ChangeEvent::new("/repo/auto_push.log"))
                .await
                .unwrap();
        }
        sleep(Duration::from_secs(10)).await;
        harness.stop.send(()).unwrap();
        let summary = harness.task.await.unwrap().unwrap();

        assert_eq!(summary, WatchSummary::default());
        assert!(handler.seen.lock().is_empty());
        let output = String::from_utf8(log.0.lock().clone()).unwrap();
        assert!(output.contains("stopped"));
        assert!(!output.contains("auto_push.log"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_for_one_file_never_overlap() {
        let handler = Arc::new(RecordingHandler {
            busy_for: Duration::from_secs(10),
            ..RecordingHandler::default()
        });
        let harness = start(handler.clone());

        // Settles at 5s, publish busy until 15s
        harness
            .events
            .send(ChangeEvent::new("/repo/plan-data.json"))
            .await
            .unwrap();
        sleep(Duration::from_secs(6)).await;
        // Settles at 11s while the first publish is still running
        harness
            .events
            .send(ChangeEvent::new("/repo/plan-data.json"))
            .await
            .unwrap();

        sleep(Duration::from_secs(40)).await;
        harness.stop.send(()).unwrap();
        let summary = harness.task.await.unwrap().unwrap();

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].2 >= seen[0].3);
        assert_eq!(summary.triggers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_panic_is_contained() {
        let handler = Arc::new(RecordingHandler {
            panic: true,
            ..RecordingHandler::default()
        });
        let harness = start(handler);

        harness
            .events
            .send(ChangeEvent::new("/repo/plan-data.json"))
            .await
            .unwrap();
        sleep(Duration::from_secs(10)).await;
        harness.stop.send(()).unwrap();

        let summary = harness.task.await.unwrap().unwrap();
        assert_eq!(summary.triggers, 1);
        assert_eq!(summary.failures, 1);
    }

    #[tokio::test]
    async fn test_source_failure_stops_watch() {
        let watcher = AutoPushWatcher::builder()
            .allow_list(allow_list())
            .source(FailingSource)
            .handler(Arc::new(RecordingHandler::default()))
            .build()
            .unwrap();

        let err = watcher.watch(std::future::pending()).await.unwrap_err();
        assert!(err.to_string().contains("inotify limit reached"));
    }

    #[test]
    fn test_builder_requires_files_source_and_handler() {
        let empty = AllowList::new("/repo", &[]);
        let result = AutoPushWatcher::builder()
            .allow_list(empty)
            .source(FailingSource)
            .handler(Arc::new(RecordingHandler::default()))
            .build();
        assert!(matches!(result, Err(WatchError::InitFailed { .. })));

        let result = AutoPushWatcher::builder().allow_list(allow_list()).build();
        assert!(matches!(result, Err(WatchError::InitFailed { .. })));
    }
}
