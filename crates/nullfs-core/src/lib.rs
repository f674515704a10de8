// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! nullfs core
//!
//! Forwards filesystem protocol operations to a host directory, translating
//! host errno values back into protocol status codes and writing one
//! diagnostic record per operation.

#![cfg(unix)]

pub mod capability;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod format;
pub mod passthrough;
mod sys;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use capability::{Capability, CapabilitySet, Operation, OperationTable};
pub use config::{CapabilityConfig, DiagnosticLogConfig, NullFsConfig};
pub use diagnostic::{DiagnosticLog, LogError, LogSink};
pub use error::{FsError, FsResult, ProtocolStatus};
pub use format::render;
pub use passthrough::Passthrough;
pub use types::{Metadata, StatFs, TimeUpdate};
