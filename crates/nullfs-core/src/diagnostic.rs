// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Diagnostic operation log
//!
//! Every dispatched operation appends one `<operation>: <message>` record.
//! The sink is opened once at startup; failing to open it is fatal, while
//! failing to write a record later is silently ignored.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, trace};

use crate::config::DiagnosticLogConfig;

#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("failed to open diagnostic log {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("diagnostic log already installed")]
    AlreadyInstalled,
}

/// Destination for diagnostic records.
///
/// `append` receives one complete record and must not interleave it with
/// records appended concurrently from other threads.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn append(&self, record: &[u8]) -> io::Result<()>;
}

/// Append-mode file sink; one `write_all` per record under a lock.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(config: &DiagnosticLogConfig) -> Result<Self, LogError> {
        let open_err = |source| LogError::Open {
            path: config.path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .map_err(open_err)?;
        if config.truncate {
            file.set_len(0).map_err(open_err)?;
        }

        Ok(Self {
            path: config.path.clone(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn append(&self, record: &[u8]) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "diagnostic log lock poisoned"))?;
        file.write_all(record)
    }
}

/// Handle to the diagnostic sink, threaded into each dispatch context.
///
/// A handle without a sink accepts records and drops them.
#[derive(Clone, Default)]
pub struct DiagnosticLog {
    sink: Option<Arc<dyn LogSink>>,
}

impl DiagnosticLog {
    /// Open the file sink described by `config`.
    pub fn open(config: &DiagnosticLogConfig) -> Result<Self, LogError> {
        let sink = FileSink::open(config)?;
        debug!(path = %sink.path().display(), "diagnostic log opened");
        Ok(Self::with_sink(Arc::new(sink)))
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append `"<operation>: <message>"`. No line terminator is added; call
    /// sites end their message with `\n`.
    pub fn write_log(&self, operation: &str, message: fmt::Arguments<'_>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut record = String::with_capacity(operation.len() + 64);
        if fmt::Write::write_fmt(&mut record, format_args!("{}: {}", operation, message)).is_err() {
            return;
        }

        debug!(target: "nullfs::diagnostic", operation, record = record.trim_end(), "dispatch");

        if let Err(err) = sink.append(record.as_bytes()) {
            trace!(operation, error = %err, "dropped diagnostic record");
        }
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

static INSTALLED: OnceLock<DiagnosticLog> = OnceLock::new();

/// Install the process-wide diagnostic log. Only the first call succeeds;
/// later calls leave the installed handle untouched.
pub fn install(log: DiagnosticLog) -> Result<&'static DiagnosticLog, LogError> {
    let mut fresh = false;
    let installed = INSTALLED.get_or_init(|| {
        fresh = true;
        log
    });
    if fresh {
        Ok(installed)
    } else {
        Err(LogError::AlreadyInstalled)
    }
}

/// The installed handle, or a disabled one before `install` has run.
pub fn installed() -> DiagnosticLog {
    INSTALLED.get().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySink;

    #[test]
    fn record_has_operation_prefix_and_no_added_newline() {
        let sink = Arc::new(MemorySink::default());
        let log = DiagnosticLog::with_sink(sink.clone());

        log.write_log("mkdir", format_args!("path={} mode={:o}", "/a", 0o755));
        log.write_log("rmdir", format_args!("path={}", "/a"));

        // Without a caller-supplied terminator the records run together.
        assert_eq!(sink.contents(), "mkdir: path=/a mode=755rmdir: path=/a");
    }

    #[test]
    fn caller_newline_separates_records() {
        let sink = Arc::new(MemorySink::default());
        let log = DiagnosticLog::with_sink(sink.clone());

        log.write_log("unlink", format_args!("path={}\n", "/x"));
        log.write_log("unlink", format_args!("path={}\n", "/y"));

        assert_eq!(sink.lines(), vec!["unlink: path=/x", "unlink: path=/y"]);
    }

    #[test]
    fn disabled_log_is_a_no_op() {
        let log = DiagnosticLog::disabled();
        assert!(!log.is_enabled());
        log.write_log("statfs", format_args!("path=/\n"));
    }

    #[test]
    fn sink_failure_is_swallowed() {
        let mut sink = MockLogSink::new();
        sink.expect_append()
            .times(1)
            .returning(|_| Err(io::Error::from_raw_os_error(libc::ENOSPC)));

        let log = DiagnosticLog::with_sink(Arc::new(sink));
        log.write_log("write", format_args!("path=/f size=1 offset=0\n"));
    }

    #[test]
    fn file_sink_truncates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nullfs.log");
        std::fs::write(&path, "stale record\n").unwrap();

        let config = DiagnosticLogConfig {
            path: path.clone(),
            truncate: true,
        };
        let log = DiagnosticLog::open(&config).unwrap();
        log.write_log("open", format_args!("path=/a flags=0\n"));
        log.write_log("release", format_args!("path=/a\n"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "open: path=/a flags=0\nrelease: path=/a\n");
    }

    #[test]
    fn file_sink_keeps_previous_records_without_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nullfs.log");
        std::fs::write(&path, "previous: run\n").unwrap();

        let config = DiagnosticLogConfig {
            path: path.clone(),
            truncate: false,
        };
        let log = DiagnosticLog::open(&config).unwrap();
        log.write_log("fsync", format_args!("path=/a isdatasync=0\n"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "previous: run\nfsync: path=/a isdatasync=0\n");
    }

    #[test]
    fn open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiagnosticLogConfig {
            path: dir.path().join("missing-dir").join("nullfs.log"),
            truncate: true,
        };
        match DiagnosticLog::open(&config) {
            Err(LogError::Open { path, source }) => {
                assert_eq!(path, config.path);
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn concurrent_records_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiagnosticLogConfig {
            path: dir.path().join("nullfs.log"),
            truncate: true,
        };
        let log = DiagnosticLog::open(&config).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        log.write_log(
                            "read",
                            format_args!("path=/w{} size={} offset=0\n", worker, i),
                        );
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let contents = std::fs::read_to_string(&config.path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 8 * 200);
        for line in lines {
            assert!(line.starts_with("read: path=/w"), "torn record: {}", line);
            assert!(line.ends_with(" offset=0"), "torn record: {}", line);
        }
    }

    #[test]
    fn install_is_once_only() {
        let first = install(DiagnosticLog::with_sink(Arc::new(MemorySink::default())));
        // Other tests in this binary never install, so the first call wins.
        assert!(first.is_ok());
        assert!(installed().is_enabled());

        let second = install(DiagnosticLog::disabled());
        assert!(matches!(second, Err(LogError::AlreadyInstalled)));
        assert!(installed().is_enabled());
    }
}
