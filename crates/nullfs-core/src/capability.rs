// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capability probing and operation table assembly
//!
//! A handler is registered when it is unconditional or when the host
//! provides the capability it needs. Unregistered operations are absent,
//! not present-but-failing; the transport answers them as unimplemented.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CapabilityConfig;

/// Host features that gate optional operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// `utimensat` with nanosecond precision
    NanosecondTimes,
    /// `posix_fallocate`
    Preallocate,
    /// `l{set,get,list,remove}xattr`
    ExtendedAttributes,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::NanosecondTimes,
        Capability::Preallocate,
        Capability::ExtendedAttributes,
    ];
}

/// Protocol operations, named as they appear in the diagnostic log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Getattr,
    Access,
    Readlink,
    Readdir,
    Mknod,
    Mkdir,
    Symlink,
    Unlink,
    Rmdir,
    Rename,
    Link,
    Chmod,
    Chown,
    Truncate,
    Utimens,
    Open,
    Read,
    Write,
    Statfs,
    Release,
    Fsync,
    Fallocate,
    Setxattr,
    Getxattr,
    Listxattr,
    Removexattr,
}

impl Operation {
    pub const ALL: [Operation; 26] = [
        Operation::Getattr,
        Operation::Access,
        Operation::Readlink,
        Operation::Readdir,
        Operation::Mknod,
        Operation::Mkdir,
        Operation::Symlink,
        Operation::Unlink,
        Operation::Rmdir,
        Operation::Rename,
        Operation::Link,
        Operation::Chmod,
        Operation::Chown,
        Operation::Truncate,
        Operation::Utimens,
        Operation::Open,
        Operation::Read,
        Operation::Write,
        Operation::Statfs,
        Operation::Release,
        Operation::Fsync,
        Operation::Fallocate,
        Operation::Setxattr,
        Operation::Getxattr,
        Operation::Listxattr,
        Operation::Removexattr,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Operation::Getattr => "getattr",
            Operation::Access => "access",
            Operation::Readlink => "readlink",
            Operation::Readdir => "readdir",
            Operation::Mknod => "mknod",
            Operation::Mkdir => "mkdir",
            Operation::Symlink => "symlink",
            Operation::Unlink => "unlink",
            Operation::Rmdir => "rmdir",
            Operation::Rename => "rename",
            Operation::Link => "link",
            Operation::Chmod => "chmod",
            Operation::Chown => "chown",
            Operation::Truncate => "truncate",
            Operation::Utimens => "utimens",
            Operation::Open => "open",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Statfs => "statfs",
            Operation::Release => "release",
            Operation::Fsync => "fsync",
            Operation::Fallocate => "fallocate",
            Operation::Setxattr => "setxattr",
            Operation::Getxattr => "getxattr",
            Operation::Listxattr => "listxattr",
            Operation::Removexattr => "removexattr",
        }
    }

    /// The capability this operation depends on, if any.
    pub const fn required_capability(self) -> Option<Capability> {
        match self {
            Operation::Utimens => Some(Capability::NanosecondTimes),
            Operation::Fallocate => Some(Capability::Preallocate),
            Operation::Setxattr
            | Operation::Getxattr
            | Operation::Listxattr
            | Operation::Removexattr => Some(Capability::ExtendedAttributes),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities available to this process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    nanosecond_times: bool,
    preallocate: bool,
    extended_attributes: bool,
}

impl CapabilitySet {
    /// No optional capability.
    pub const fn none() -> Self {
        Self {
            nanosecond_times: false,
            preallocate: false,
            extended_attributes: false,
        }
    }

    /// Capabilities whose handlers are compiled for the target.
    pub const fn compiled() -> Self {
        Self {
            nanosecond_times: true,
            preallocate: cfg!(any(target_os = "linux", target_os = "android")),
            extended_attributes: cfg!(any(target_os = "linux", target_os = "android")),
        }
    }

    /// Compile-time availability refined by a runtime probe of `root`.
    ///
    /// Extended attributes are dropped when the filesystem under `root`
    /// reports `ENOTSUP` for a listing.
    pub fn probe(root: &Path) -> Self {
        let mut caps = CapabilitySet::compiled();
        if caps.extended_attributes && !probe_xattr(root) {
            warn!(root = %root.display(), "extended attributes not supported by host filesystem");
            caps.extended_attributes = false;
        }
        debug!(?caps, "capabilities probed");
        caps
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::NanosecondTimes => self.nanosecond_times,
            Capability::Preallocate => self.preallocate,
            Capability::ExtendedAttributes => self.extended_attributes,
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::NanosecondTimes => self.nanosecond_times = true,
            Capability::Preallocate => self.preallocate = true,
            Capability::ExtendedAttributes => self.extended_attributes = true,
        }
        self
    }

    /// Drop anything the operator disabled. Never adds capabilities.
    pub fn restrict(self, config: &CapabilityConfig) -> Self {
        Self {
            nanosecond_times: self.nanosecond_times && config.utimens,
            preallocate: self.preallocate && config.fallocate,
            extended_attributes: self.extended_attributes && config.xattr,
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn probe_xattr(root: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = crate::sys::cstring(root.as_os_str().as_bytes()) else {
        return false;
    };
    match crate::sys::llistxattr(&path, &mut []) {
        Ok(_) => true,
        Err(err) => err.errno() != libc::ENOTSUP,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn probe_xattr(_root: &Path) -> bool {
    false
}

/// The handlers the transport may invoke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationTable {
    capabilities: CapabilitySet,
    operations: Vec<Operation>,
}

impl OperationTable {
    pub fn assemble(capabilities: CapabilitySet) -> Self {
        let operations: Vec<Operation> = Operation::ALL
            .iter()
            .copied()
            .filter(|op| match op.required_capability() {
                None => true,
                Some(capability) => capabilities.contains(capability),
            })
            .collect();

        let omitted: Vec<&str> = Operation::ALL
            .iter()
            .filter(|op| !operations.contains(op))
            .map(|op| op.name())
            .collect();
        info!(
            registered = operations.len(),
            omitted = ?omitted,
            "operation table assembled"
        );

        Self {
            capabilities,
            operations,
        }
    }

    pub fn contains(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        self.operations.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
