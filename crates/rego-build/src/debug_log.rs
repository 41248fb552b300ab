// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory capture of debug diagnostics.
//!
//! While a capture is active, every `tracing` event on the current thread
//! (from the orchestrator, the compiler and the boundary layer alike) is
//! formatted as plain text into a shared buffer.

use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::{BuildEnvConfig, DEFAULT_LOG_FILTER};

/// A text sink for debug events.
#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

/// Writer handed out by [`DebugLog`] for each formatted event.
#[derive(Debug)]
pub struct DebugLogWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for DebugLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DebugLog {
    type Writer = DebugLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DebugLogWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl DebugLog {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this sink as the thread's subscriber.
    ///
    /// An unparseable `filter` falls back to `debug`.
    pub fn capture<T>(&self, filter: &str, f: impl FnOnce() -> T) -> T {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_env_filter(filter)
            .finish();

        tracing::subscriber::with_default(subscriber, f)
    }

    /// Everything captured so far.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Run `f`, capturing its debug events when `enabled`.
///
/// Returns the captured text, or `None` when capture was off.
pub fn with_debug_log<T>(enabled: bool, f: impl FnOnce() -> T) -> (T, Option<String>) {
    if !enabled {
        return (f(), None);
    }

    let log = DebugLog::new();
    let value = log.capture(&BuildEnvConfig::global().log_filter, f);
    (value, Some(log.contents()))
}
