// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for the passthrough driver

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the diagnostic operation log.
pub const DEFAULT_DIAGNOSTIC_LOG: &str = "/tmp/nullfs.log";

/// Top-level driver configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullFsConfig {
    /// Host directory every logical path is resolved against
    pub root: PathBuf,
    pub diagnostic_log: DiagnosticLogConfig,
    pub capabilities: CapabilityConfig,
    /// Attribute TTL handed to the kernel in replies (milliseconds)
    pub attr_ttl_ms: u64,
    /// Entry TTL handed to the kernel in replies (milliseconds)
    pub entry_ttl_ms: u64,
}

impl Default for NullFsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            diagnostic_log: DiagnosticLogConfig::default(),
            capabilities: CapabilityConfig::default(),
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}

/// Diagnostic log sink settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticLogConfig {
    pub path: PathBuf,
    /// Discard the previous run's records when the sink is opened
    pub truncate: bool,
}

impl Default for DiagnosticLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DIAGNOSTIC_LOG),
            truncate: true,
        }
    }
}

/// Optional capabilities the operator allows.
///
/// These can only narrow what the host supports; enabling a capability the
/// host lacks has no effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub utimens: bool,
    pub fallocate: bool,
    pub xattr: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            utimens: true,
            fallocate: true,
            xattr: true,
        }
    }
}
