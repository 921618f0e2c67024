//! Access log watch loop
//!
//! Reads appended lines from a `LineSource`, parses them, feeds records to the
//! `StreamAnalyzer`, and hands resulting alerts to the `AlertDispatcher`.
//! Everything runs on the calling task in arrival order. The only waits are
//! the startup wait for the file and the end-of-file poll, and both are raced
//! against the shutdown future.

use crate::config::WatcherConfig;
use crate::monitoring::alert::{AlertDispatcher, DispatchOutcome};
use crate::monitoring::analyzer::StreamAnalyzer;
use crate::monitoring::line_source::{LinePoll, LineSource, LineSourceSettings};
use crate::monitoring::record::{parse_line, ParsedLine};
use crate::utils::AppError;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Watcher result type
pub type WatcherResult<T> = Result<T, AppError>;

/// Line counters for the lifetime of a watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub lines: u64,
    pub records: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub alerts: u64,
}

/// Single-task pipeline from log lines to dispatched alerts
pub struct AccessLogWatcher {
    analyzer: StreamAnalyzer,
    dispatcher: AlertDispatcher,
    stats: WatchStats,
}

impl AccessLogWatcher {
    pub fn new(analyzer: StreamAnalyzer, dispatcher: AlertDispatcher) -> Self {
        Self {
            analyzer,
            dispatcher,
            stats: WatchStats::default(),
        }
    }

    /// Build the analyzer from configuration around an existing dispatcher
    pub fn from_config(config: &WatcherConfig, dispatcher: AlertDispatcher) -> Self {
        let analyzer = StreamAnalyzer::new(
            config.pool_table(),
            config.window_size,
            config.error_rate_threshold,
        );
        Self::new(analyzer, dispatcher)
    }

    /// Parse, analyze, and dispatch a single raw line
    ///
    /// Returns what happened to each alert the line raised. Malformed lines
    /// are logged and leave the analyzer untouched.
    pub fn process_line(&mut self, line: &str) -> Vec<DispatchOutcome> {
        self.stats.lines += 1;

        let record = match parse_line(line) {
            Ok(ParsedLine::Record(record)) => record,
            Ok(ParsedLine::Skip) => {
                self.stats.skipped += 1;
                return Vec::new();
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!(
                    error = %e,
                    error_code = e.error_code(),
                    line = %line,
                    "Skipping malformed log line"
                );
                return Vec::new();
            }
        };

        self.stats.records += 1;
        let analysis = self.analyzer.analyze(&record);

        debug!(
            method = %record.method,
            uri = %record.uri,
            status = %record.status,
            pool = %analysis.pool,
            upstream = %record.upstream,
            is_error = analysis.is_error,
            "Request observed"
        );

        if analysis.failover_attempted {
            info!(
                upstream = %record.upstream,
                upstream_status = %record.upstream_status,
                "Upstream retry across pools"
            );
        }

        let mut outcomes = Vec::with_capacity(analysis.alerts.len());
        for alert in &analysis.alerts {
            self.stats.alerts += 1;
            warn!(category = %alert.category(), time = %record.time, "Alert condition detected");
            outcomes.push(self.dispatcher.dispatch(alert.category(), alert.message()));
        }
        outcomes
    }

    /// Watch `path` until `shutdown` resolves or the source is lost
    ///
    /// Returns `Ok(())` on shutdown. `SourceLost` and `SourceUnavailable` are
    /// returned as errors. On exit the delivery queue is closed so a running
    /// sender can drain and stop.
    pub async fn run<F>(
        &mut self,
        path: impl Into<PathBuf>,
        settings: LineSourceSettings,
        shutdown: F,
    ) -> WatcherResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let path = path.into();

        info!(
            path = %path.display(),
            window_size = self.analyzer.window().capacity(),
            threshold = self.analyzer.threshold(),
            alerts_enabled = self.dispatcher.is_enabled(),
            "Starting access log watcher"
        );

        let opened = tokio::select! {
            _ = &mut shutdown => None,
            result = LineSource::open(&path, settings) => Some(result),
        };

        let result = match opened {
            Some(Ok(source)) => self.follow(source, &mut shutdown).await,
            Some(Err(e)) => Err(e),
            None => {
                info!("Shutdown requested while waiting for log file");
                Ok(())
            }
        };

        self.dispatcher.close();
        info!(
            lines = self.stats.lines,
            records = self.stats.records,
            malformed = self.stats.malformed,
            alerts = self.stats.alerts,
            "Access log watcher stopped"
        );
        result
    }

    async fn follow<F>(&mut self, mut source: LineSource, shutdown: &mut F) -> WatcherResult<()>
    where
        F: Future<Output = ()> + Unpin,
    {
        let read_poll = source.settings().read_poll;
        loop {
            match source.poll_line().await? {
                LinePoll::Line(line) => {
                    self.process_line(&line);
                    // A busy log never reaches the end-of-file wait
                    tokio::select! {
                        biased;
                        _ = &mut *shutdown => {
                            info!("Shutdown signal received");
                            return Ok(());
                        }
                        _ = std::future::ready(()) => {}
                    }
                }
                LinePoll::Pending => {
                    tokio::select! {
                        _ = &mut *shutdown => {
                            info!("Shutdown signal received");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(read_poll) => {}
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    pub fn analyzer(&self) -> &StreamAnalyzer {
        &self.analyzer
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alert::AlertSink;
    use crate::monitoring::pool::{Pool, PoolTable};
    use async_trait::async_trait;
    use std::env::temp_dir;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    struct NullSink;

    #[async_trait]
    impl AlertSink for NullSink {
        async fn deliver(&self, _message: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn pools() -> PoolTable {
        PoolTable::new()
            .with_entry("app_blue", Pool::Blue)
            .with_entry("app_green", Pool::Green)
    }

    fn local_watcher(window_size: usize) -> AccessLogWatcher {
        AccessLogWatcher::new(
            StreamAnalyzer::new(pools(), window_size, 2.0),
            AlertDispatcher::local_only(Duration::from_secs(300)),
        )
    }

    fn line(upstream: &str, upstream_status: &str) -> String {
        format!(
            r#"{{"time":"2025-10-30T12:00:00+00:00","method":"GET","uri":"/","status":"200","upstream_addr":"{}","upstream_status":"{}"}}"#,
            upstream, upstream_status
        )
    }

    fn fast_settings() -> LineSourceSettings {
        LineSourceSettings {
            open_poll: Duration::from_millis(10),
            read_poll: Duration::from_millis(5),
        }
    }

    fn test_log_path(name: &str) -> PathBuf {
        let dir = temp_dir().join(format!("{}_{}", name, Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("Failed to create test dir");
        dir.join("access.log")
    }

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .expect("Failed to open log file for append");
        file.write_all(content.as_bytes())
            .expect("Failed to append to log file");
    }

    #[tokio::test]
    async fn should_dispatch_failover_once_pool_changes() {
        // Arrange
        let mut watcher = local_watcher(200);

        // Act
        let first = watcher.process_line(&line("app_blue:3000", "200"));
        let second = watcher.process_line(&line("app_green:3000", "200"));

        // Assert
        assert!(first.is_empty());
        assert_eq!(second, vec![DispatchOutcome::LoggedOnly]);
        assert_eq!(watcher.analyzer().last_pool(), Some(Pool::Green));
    }

    #[tokio::test]
    async fn should_suppress_repeated_failover_within_cooldown() {
        // Arrange
        let (dispatcher, _sender) =
            AlertDispatcher::with_sink(NullSink, Duration::from_secs(300), 8);
        let mut watcher = AccessLogWatcher::new(StreamAnalyzer::new(pools(), 200, 2.0), dispatcher);

        // Act
        watcher.process_line(&line("app_blue", "200"));
        let switch = watcher.process_line(&line("app_green", "200"));
        let switch_back = watcher.process_line(&line("app_blue", "200"));

        // Assert
        assert_eq!(switch, vec![DispatchOutcome::Queued]);
        assert_eq!(switch_back, vec![DispatchOutcome::Suppressed]);
    }

    #[tokio::test]
    async fn should_log_every_failover_without_webhook() {
        let mut watcher = local_watcher(200);

        watcher.process_line(&line("app_blue", "200"));
        let switch = watcher.process_line(&line("app_green", "200"));
        let switch_back = watcher.process_line(&line("app_blue", "200"));

        assert_eq!(switch, vec![DispatchOutcome::LoggedOnly]);
        assert_eq!(switch_back, vec![DispatchOutcome::LoggedOnly]);
    }

    #[tokio::test]
    async fn should_stop_between_lines_when_shutdown_is_pending() {
        // Arrange
        let path = test_log_path("test_watcher_busy");
        append(&path, "");
        let source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");
        append(
            &path,
            &format!(
                "{}\n{}\n{}\n",
                line("app_blue", "200"),
                line("app_green", "200"),
                line("app_blue", "200")
            ),
        );
        let mut watcher = local_watcher(200);

        // Act - shutdown is already complete while lines are still unread
        let result = watcher.follow(source, &mut std::future::ready(())).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(watcher.stats().records, 1);
    }

    #[tokio::test]
    async fn should_count_skipped_and_malformed_lines() {
        // Arrange
        let mut watcher = local_watcher(200);

        // Act
        watcher.process_line("plain text line");
        watcher.process_line("");
        watcher.process_line(r#"{"method":"GET""#);
        watcher.process_line(&line("app_blue", "200"));

        // Assert
        let stats = watcher.stats();
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(watcher.analyzer().window().len(), 1);
    }

    #[tokio::test]
    async fn should_raise_error_rate_alert_when_window_fills() {
        // Arrange
        let mut watcher = local_watcher(4);

        // Act
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes = watcher.process_line(&line("app_blue", "502"));
        }

        // Assert
        assert_eq!(outcomes, vec![DispatchOutcome::LoggedOnly]);
        assert_eq!(watcher.stats().alerts, 1);
    }

    #[tokio::test]
    async fn should_return_ok_when_shutdown_before_file_exists() {
        // Arrange
        let path = test_log_path("test_watcher_no_file");
        let mut watcher = local_watcher(200);

        // Act
        let result = watcher
            .run(&path, fast_settings(), tokio::time::sleep(Duration::from_millis(30)))
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(watcher.stats().lines, 0);
    }

    #[tokio::test]
    async fn should_process_appended_lines_until_shutdown() {
        // Arrange
        let path = test_log_path("test_watcher_run");
        append(&path, &format!("{}\n", line("app_green", "200")));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run_path = path.clone();
        let handle = tokio::spawn(async move {
            let mut watcher = local_watcher(200);
            let result = watcher
                .run(run_path, fast_settings(), async {
                    let _ = stop_rx.await;
                })
                .await;
            (watcher, result)
        });

        // Act
        tokio::time::sleep(Duration::from_millis(50)).await;
        append(
            &path,
            &format!("{}\n{}\n", line("app_blue", "200"), line("app_green", "200")),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).expect("watcher stopped early");
        let (watcher, result) = handle.await.expect("watcher task panicked");

        // Assert - the pre-existing line was never read
        assert!(result.is_ok());
        assert_eq!(watcher.stats().records, 2);
        assert_eq!(watcher.stats().alerts, 1);
        assert!(!watcher.dispatcher().is_enabled());
    }

    #[tokio::test]
    async fn should_stop_with_source_lost_when_file_is_removed() {
        // Arrange
        let path = test_log_path("test_watcher_lost");
        append(&path, "");
        let run_path = path.clone();
        let handle = tokio::spawn(async move {
            let mut watcher = local_watcher(200);
            watcher
                .run(run_path, fast_settings(), std::future::pending::<()>())
                .await
        });

        // Act
        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::remove_file(&path).expect("Failed to remove log file");
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher should stop after the file disappears")
            .expect("watcher task panicked");

        // Assert
        assert!(matches!(result, Err(AppError::SourceLost(_))));
    }
}
