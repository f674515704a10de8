// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test helpers

use std::io;
use std::sync::Mutex;

use crate::diagnostic::LogSink;

/// Diagnostic sink that keeps every record in memory.
#[derive(Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<u8>>,
}

impl MemorySink {
    /// Everything appended so far, verbatim.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Newline-separated records.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// First token (the operation name) of each record.
    pub fn operations(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.split(':').next().map(str::to_owned))
            .collect()
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }
}

impl LogSink for MemorySink {
    fn append(&self, record: &[u8]) -> io::Result<()> {
        self.buffer.lock().unwrap().extend_from_slice(record);
        Ok(())
    }
}
