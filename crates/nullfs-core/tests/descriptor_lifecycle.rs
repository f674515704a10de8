// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-call descriptors must never outlive the call.
//!
//! Counting `/proc/self/fd` is process-wide, so everything lives in one
//! test to keep other tests in this binary from opening files concurrently.

#![cfg(target_os = "linux")]

use std::fs;
use std::path::Path;

use nullfs_core::{DiagnosticLog, FsError, Passthrough};

fn path(p: &str) -> &Path {
    Path::new(p)
}

fn open_descriptors() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn no_descriptor_survives_any_call() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("file"), b"contents").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let nullfs = Passthrough::new(dir.path(), DiagnosticLog::disabled());

    let baseline = open_descriptors();
    let mut buf = [0u8; 32];

    for _ in 0..16 {
        // Success paths
        nullfs.read(path("/file"), &mut buf, 0).unwrap();
        nullfs.write(path("/file"), b"x", 0).unwrap();
        nullfs.open(path("/file"), libc::O_RDONLY).unwrap();
        nullfs.readdir(path("/"), |_, _| false).unwrap();
        nullfs.readdir(path("/"), |_, _| true).unwrap();
        nullfs.fallocate(path("/file"), 0, 0, 64).unwrap();
        nullfs
            .mknod(path("/created"), libc::S_IFREG | 0o644, 0)
            .unwrap();
        nullfs.unlink(path("/created")).unwrap();

        // Failure after the descriptor was opened
        assert_eq!(
            nullfs.read(path("/sub"), &mut buf, 0),
            Err(FsError::Host(libc::EISDIR))
        );
        assert_eq!(
            nullfs.fallocate(path("/file"), 0, -1, 64),
            Err(FsError::Host(libc::EINVAL))
        );

        // Failure before any descriptor exists
        assert!(nullfs.read(path("/missing"), &mut buf, 0).is_err());
        assert!(nullfs.write(path("/sub"), b"x", 0).is_err());
        assert!(nullfs.readdir(path("/missing"), |_, _| false).is_err());
        assert!(nullfs
            .mknod(path("/file"), libc::S_IFREG | 0o644, 0)
            .is_err());
    }

    assert_eq!(open_descriptors(), baseline);
}
