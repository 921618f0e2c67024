//! Tail-style reader for a growing log file
//!
//! - Waits for the file to appear, polling at `open_poll`
//! - Starts at the end of the file, so only lines appended after startup are seen
//! - Buffers partial lines until their newline arrives
//! - Reports the file disappearing as a lost source

use crate::utils::AppError;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::{debug, error, info};

/// Line source result type
pub type LineSourceResult<T> = Result<T, AppError>;

/// Polling intervals for the line source
#[derive(Debug, Clone, Copy)]
pub struct LineSourceSettings {
    /// Interval between existence checks while waiting for the file
    pub open_poll: Duration,
    /// Interval between reads while at end of file
    pub read_poll: Duration,
}

impl Default for LineSourceSettings {
    fn default() -> Self {
        Self {
            open_poll: Duration::from_secs(1),
            read_poll: Duration::from_millis(100),
        }
    }
}

/// Outcome of a single read attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePoll {
    /// A complete line without its terminator
    Line(String),
    /// No complete line available yet
    Pending,
}

/// Infinite, forward-only sequence of appended lines
pub struct LineSource {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
    settings: LineSourceSettings,
}

impl LineSource {
    /// Wait until `path` exists, open it, and position at the end
    ///
    /// A missing file is polled for; any other open failure is returned.
    pub async fn open(
        path: impl Into<PathBuf>,
        settings: LineSourceSettings,
    ) -> LineSourceResult<Self> {
        let path = path.into();
        let mut announced = false;

        let mut file = loop {
            match File::open(&path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if !announced {
                        info!(path = %path.display(), "Waiting for log file");
                        announced = true;
                    }
                    tokio::time::sleep(settings.open_poll).await;
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "Failed to open log file");
                    return Err(AppError::source_unavailable(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        };

        let offset = file.seek(SeekFrom::End(0)).await.map_err(|e| {
            error!(error = %e, path = %path.display(), "Failed to seek to end of log file");
            AppError::source_unavailable(format!("{}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), offset, "Log file found, tailing from end");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            partial: Vec::new(),
            settings,
        })
    }

    /// Try to read the next complete line without waiting
    pub async fn poll_line(&mut self) -> LineSourceResult<LinePoll> {
        let read = self
            .reader
            .read_until(b'\n', &mut self.partial)
            .await
            .map_err(|e| {
                error!(error = %e, path = %self.path.display(), "Failed to read log file");
                AppError::source_lost(format!("{}: {}", self.path.display(), e))
            })?;

        if self.partial.last() == Some(&b'\n') {
            let raw = std::mem::take(&mut self.partial);
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(|c: char| c == '\n' || c == '\r')
                .to_string();
            return Ok(LinePoll::Line(line));
        }

        if read == 0 {
            self.ensure_present().await?;
        } else {
            debug!(buffered = self.partial.len(), "Buffered partial line");
        }

        Ok(LinePoll::Pending)
    }

    /// Read the next complete line, sleeping `read_poll` between empty reads
    pub async fn next_line(&mut self) -> LineSourceResult<String> {
        loop {
            match self.poll_line().await? {
                LinePoll::Line(line) => return Ok(line),
                LinePoll::Pending => tokio::time::sleep(self.settings.read_poll).await,
            }
        }
    }

    async fn ensure_present(&self) -> LineSourceResult<()> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "Log file is no longer accessible");
                Err(AppError::source_lost(format!("{}: {}", self.path.display(), e)))
            }
        }
    }

    pub fn settings(&self) -> LineSourceSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::Path;
    use uuid::Uuid;

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
    async fn should_skip_existing_content() {
        // Arrange
        let path = test_log_path("test_line_source_existing");
        append(&path, "old line 1\nold line 2\n");

        // Act
        let mut source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");
        let first = source.poll_line().await.expect("poll failed");

        // Assert
        assert_eq!(first, LinePoll::Pending);
    }

    #[tokio::test]
    async fn should_yield_appended_lines_in_order() {
        // Arrange
        let path = test_log_path("test_line_source_append");
        append(&path, "before\n");
        let mut source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");

        // Act
        append(&path, "first\r\nsecond\n");

        // Assert
        assert_eq!(source.next_line().await.unwrap(), "first");
        assert_eq!(source.next_line().await.unwrap(), "second");
        assert_eq!(source.poll_line().await.unwrap(), LinePoll::Pending);
    }

    #[tokio::test]
    async fn should_buffer_partial_line_until_newline() {
        // Arrange
        let path = test_log_path("test_line_source_partial");
        append(&path, "");
        let mut source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");

        // Act
        append(&path, "{\"method\":");
        let partial = source.poll_line().await.unwrap();
        append(&path, "\"GET\"}\n");
        let complete = source.poll_line().await.unwrap();

        // Assert
        assert_eq!(partial, LinePoll::Pending);
        assert_eq!(complete, LinePoll::Line("{\"method\":\"GET\"}".to_string()));
    }

    #[tokio::test]
    async fn should_wait_for_file_to_exist() {
        // Arrange
        let path = test_log_path("test_line_source_wait");
        let creator_path = path.clone();
        let creator = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            append(&creator_path, "");
        });

        // Act
        let source = tokio::time::timeout(
            Duration::from_secs(5),
            LineSource::open(&path, fast_settings()),
        )
        .await
        .expect("open should finish once the file exists");

        // Assert
        creator.await.expect("creator task panicked");
        assert!(source.is_ok());
    }

    #[tokio::test]
    async fn should_keep_waiting_while_file_is_missing() {
        // Arrange
        let path = test_log_path("test_line_source_missing");

        // Act
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            LineSource::open(&path, fast_settings()),
        )
        .await;

        // Assert - still waiting when the timeout fires
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_report_source_unavailable_when_path_cannot_be_opened() {
        // Arrange - a regular file used as a parent directory
        let blocker = test_log_path("test_line_source_unavailable");
        append(&blocker, "");
        let path = blocker.join("access.log");

        // Act
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            LineSource::open(&path, fast_settings()),
        )
        .await
        .expect("open should fail instead of waiting");

        // Assert
        assert!(matches!(result, Err(AppError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn should_report_source_lost_when_file_is_removed() {
        // Arrange
        let path = test_log_path("test_line_source_removed");
        append(&path, "");
        let mut source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");

        // Act
        fs::remove_file(&path).expect("Failed to remove log file");
        let result = source.poll_line().await;

        // Assert
        assert!(matches!(result, Err(AppError::SourceLost(_))));
    }

    #[tokio::test]
    async fn should_replace_invalid_utf8() {
        // Arrange
        let path = test_log_path("test_line_source_utf8");
        append(&path, "");
        let mut source = LineSource::open(&path, fast_settings())
            .await
            .expect("Failed to open source");

        // Act
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"bad \xff byte\n").unwrap();
        let line = source.next_line().await.unwrap();

        // Assert
        assert_eq!(line, "bad \u{fffd} byte");
    }
}
