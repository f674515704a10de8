// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the passthrough core

use libc::c_int;
use std::io;

/// Failure of a dispatched operation.
///
/// Host failures carry the errno verbatim so callers see exactly what the
/// host filesystem reported.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("host error: {}", describe_errno(.0))]
    Host(c_int),
    #[error("operation not supported")]
    NotSupported,
}

fn describe_errno(errno: &c_int) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

impl FsError {
    /// Capture the calling thread's current errno.
    pub fn last_os_error() -> Self {
        io::Error::last_os_error().into()
    }

    /// The positive errno value this error stands for.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::Host(errno) => *errno,
            FsError::NotSupported => libc::EOPNOTSUPP,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Host(err.raw_os_error().unwrap_or(libc::EIO))
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Conversion to the protocol's status convention: negated errno on
/// failure, zero or a non-negative count on success.
pub trait ProtocolStatus {
    fn protocol_status(&self) -> i64;
}

impl ProtocolStatus for FsResult<()> {
    fn protocol_status(&self) -> i64 {
        match self {
            Ok(()) => 0,
            Err(err) => -i64::from(err.errno()),
        }
    }
}

impl ProtocolStatus for FsResult<usize> {
    fn protocol_status(&self) -> i64 {
        match self {
            Ok(count) => *count as i64,
            Err(err) => -i64::from(err.errno()),
        }
    }
}
