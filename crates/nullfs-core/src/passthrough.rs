// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-operation handlers.
//!
//! Each handler writes one diagnostic record, delegates to the host
//! filesystem under `root`, and returns the host result with its errno
//! untouched. No handler keeps state between calls: read, write and
//! fallocate open their own descriptor and close it before returning.

use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use libc::{c_int, mode_t};

use crate::capability::Operation;
use crate::diagnostic::DiagnosticLog;
use crate::error::{FsError, FsResult};
use crate::format::render;
use crate::sys;
use crate::types::{Metadata, StatFs, TimeUpdate};

/// Passthrough dispatch context: the host root plus the diagnostic log
/// handle. Shared freely between transport threads.
#[derive(Clone, Debug)]
pub struct Passthrough {
    root: PathBuf,
    log: DiagnosticLog,
}

impl Passthrough {
    pub fn new(root: impl Into<PathBuf>, log: DiagnosticLog) -> Self {
        Self {
            root: root.into(),
            log,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path against the root by plain byte concatenation.
    fn host_path(&self, path: &Path) -> FsResult<CString> {
        let root = self.root.as_os_str().as_bytes();
        let rel = path.as_os_str().as_bytes();
        let rel = rel.strip_prefix(b"/").unwrap_or(rel);

        let mut full = Vec::with_capacity(root.len() + rel.len() + 1);
        full.extend_from_slice(root);
        if !rel.is_empty() {
            if !full.ends_with(b"/") {
                full.push(b'/');
            }
            full.extend_from_slice(rel);
        }
        sys::cstring(&full)
    }

    /// Attributes of the node itself (symlinks are not followed).
    ///
    /// The record is written after the query so it can carry the rendered
    /// attributes; a failed query renders an empty record.
    pub fn getattr(&self, path: &Path) -> FsResult<Metadata> {
        let result = self.host_path(path).and_then(|host| sys::lstat(&host));
        self.log.write_log(
            Operation::Getattr.name(),
            format_args!(
                "path={} stat={{{}}}\n",
                path.display(),
                render(result.as_ref().ok())
            ),
        );
        result
    }

    pub fn access(&self, path: &Path, mask: c_int) -> FsResult<()> {
        self.log.write_log(
            Operation::Access.name(),
            format_args!("path={} mask={}\n", path.display(), mask),
        );
        sys::access_nofollow(&self.host_path(path)?, mask)
    }

    /// Link target, truncated to `size - 1` bytes.
    pub fn readlink(&self, path: &Path, size: usize) -> FsResult<Vec<u8>> {
        self.log.write_log(
            Operation::Readlink.name(),
            format_args!("path={} size={}\n", path.display(), size),
        );
        let host = self.host_path(path)?;
        let mut buf = vec![0u8; size.saturating_sub(1)];
        let len = sys::readlink(&host, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// List a directory, handing each entry to `filler` until it reports
    /// saturation by returning `true`.
    ///
    /// Entries carry only the inode and the type bits; see
    /// [`Metadata::from_dir_entry`].
    pub fn readdir<F>(&self, path: &Path, mut filler: F) -> FsResult<()>
    where
        F: FnMut(&OsStr, &Metadata) -> bool,
    {
        self.log.write_log(
            Operation::Readdir.name(),
            format_args!("path={}\n", path.display()),
        );
        let mut stream = sys::DirStream::open(&self.host_path(path)?)?;
        while let Some(entry) = stream.next_entry() {
            let record = Metadata::from_dir_entry(entry.ino, entry.d_type);
            if filler(OsStr::from_bytes(entry.name.to_bytes()), &record) {
                break;
            }
        }
        Ok(())
    }

    /// Create a node. Regular files go through an exclusive create, FIFOs
    /// through `mkfifo`, everything else through `mknod`.
    pub fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> FsResult<()> {
        self.log.write_log(
            Operation::Mknod.name(),
            format_args!("path={} mode={:o} rdev={}\n", path.display(), mode, rdev),
        );
        let host = self.host_path(path)?;
        let file_type = mode & libc::S_IFMT as u32;
        if file_type == libc::S_IFREG as u32 {
            sys::create_exclusive(&host, mode as mode_t)
        } else if file_type == libc::S_IFIFO as u32 {
            sys::mkfifo(&host, mode as mode_t)
        } else {
            sys::mknod(&host, mode as mode_t, rdev as libc::dev_t)
        }
    }

    pub fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.log.write_log(
            Operation::Mkdir.name(),
            format_args!("path={} mode={:o}\n", path.display(), mode),
        );
        sys::mkdir(&self.host_path(path)?, mode as mode_t)
    }

    /// Create `link` pointing at `target`. The target is link content and
    /// is stored verbatim, not resolved against the root.
    pub fn symlink(&self, target: &Path, link: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Symlink.name(),
            format_args!("from={} to={}\n", target.display(), link.display()),
        );
        let target = sys::cstring(target.as_os_str().as_bytes())?;
        sys::symlink(&target, &self.host_path(link)?)
    }

    pub fn unlink(&self, path: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Unlink.name(),
            format_args!("path={}\n", path.display()),
        );
        sys::unlink(&self.host_path(path)?)
    }

    pub fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Rmdir.name(),
            format_args!("path={}\n", path.display()),
        );
        sys::rmdir(&self.host_path(path)?)
    }

    pub fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Rename.name(),
            format_args!("from={} to={}\n", from.display(), to.display()),
        );
        sys::rename(&self.host_path(from)?, &self.host_path(to)?)
    }

    pub fn link(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Link.name(),
            format_args!("from={} to={}\n", from.display(), to.display()),
        );
        sys::link(&self.host_path(from)?, &self.host_path(to)?)
    }

    pub fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.log.write_log(
            Operation::Chmod.name(),
            format_args!("path={} mode={:o}\n", path.display(), mode),
        );
        sys::chmod(&self.host_path(path)?, mode as mode_t)
    }

    /// Change ownership of the node itself; `u32::MAX` leaves an id as is.
    pub fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        self.log.write_log(
            Operation::Chown.name(),
            format_args!("path={} uid={} gid={}\n", path.display(), uid as i32, gid as i32),
        );
        sys::lchown(&self.host_path(path)?, uid, gid)
    }

    pub fn truncate(&self, path: &Path, size: i64) -> FsResult<()> {
        self.log.write_log(
            Operation::Truncate.name(),
            format_args!("path={} size={}\n", path.display(), size),
        );
        sys::truncate(&self.host_path(path)?, size)
    }

    /// Update timestamps of the node itself (symlinks are not followed).
    pub fn utimens(&self, path: &Path, atime: TimeUpdate, mtime: TimeUpdate) -> FsResult<()> {
        self.log.write_log(
            Operation::Utimens.name(),
            format_args!("path={} atime={} mtime={}\n", path.display(), atime, mtime),
        );
        sys::utimens_nofollow(&self.host_path(path)?, atime, mtime)
    }

    /// Validity check only: open with `flags` and close immediately. No
    /// handle outlives the call.
    pub fn open(&self, path: &Path, flags: c_int) -> FsResult<()> {
        self.log.write_log(
            Operation::Open.name(),
            format_args!("path={} flags={:#o}\n", path.display(), flags),
        );
        sys::open(&self.host_path(path)?, flags).map(drop)
    }

    /// Open read-only, one positioned read, close.
    pub fn read(&self, path: &Path, buf: &mut [u8], offset: i64) -> FsResult<usize> {
        self.log.write_log(
            Operation::Read.name(),
            format_args!("path={} size={} offset={}\n", path.display(), buf.len(), offset),
        );
        let fd = sys::open(&self.host_path(path)?, libc::O_RDONLY | libc::O_CLOEXEC)?;
        sys::pread(&fd, buf, offset)
    }

    /// Open write-only, one positioned write, close.
    pub fn write(&self, path: &Path, data: &[u8], offset: i64) -> FsResult<usize> {
        self.log.write_log(
            Operation::Write.name(),
            format_args!("path={} size={} offset={}\n", path.display(), data.len(), offset),
        );
        let fd = sys::open(&self.host_path(path)?, libc::O_WRONLY | libc::O_CLOEXEC)?;
        sys::pwrite(&fd, data, offset)
    }

    pub fn statfs(&self, path: &Path) -> FsResult<StatFs> {
        self.log.write_log(
            Operation::Statfs.name(),
            format_args!("path={}\n", path.display()),
        );
        sys::statvfs(&self.host_path(path)?)
    }

    /// Nothing is held per open file, so there is nothing to release.
    pub fn release(&self, path: &Path) -> FsResult<()> {
        self.log.write_log(
            Operation::Release.name(),
            format_args!("path={}\n", path.display()),
        );
        Ok(())
    }

    /// Writes go straight to the host; nothing is buffered here to flush.
    pub fn fsync(&self, path: &Path, datasync: bool) -> FsResult<()> {
        self.log.write_log(
            Operation::Fsync.name(),
            format_args!("path={} isdatasync={}\n", path.display(), i32::from(datasync)),
        );
        Ok(())
    }

    /// Preallocate `length` bytes at `offset`. Only the default mode (0) is
    /// supported; any other mode fails with `EOPNOTSUPP`.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn fallocate(&self, path: &Path, mode: c_int, offset: i64, length: i64) -> FsResult<()> {
        self.log.write_log(
            Operation::Fallocate.name(),
            format_args!(
                "path={} mode={:o} offset={} length={}\n",
                path.display(),
                mode,
                offset,
                length
            ),
        );
        if mode != 0 {
            return Err(FsError::NotSupported);
        }
        let fd = sys::open(&self.host_path(path)?, libc::O_WRONLY | libc::O_CLOEXEC)?;
        sys::posix_fallocate(&fd, offset, length)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn setxattr(&self, path: &Path, name: &OsStr, value: &[u8], flags: c_int) -> FsResult<()> {
        self.log.write_log(
            Operation::Setxattr.name(),
            format_args!(
                "path={} name={} value={} size={} flags={}\n",
                path.display(),
                name.to_string_lossy(),
                value.escape_ascii(),
                value.len(),
                flags
            ),
        );
        let name = sys::cstring(name.as_bytes())?;
        sys::lsetxattr(&self.host_path(path)?, &name, value, flags)
    }

    /// Read an attribute value into `buf`. An empty `buf` asks for the
    /// value's size instead.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn getxattr(&self, path: &Path, name: &OsStr, buf: &mut [u8]) -> FsResult<usize> {
        self.log.write_log(
            Operation::Getxattr.name(),
            format_args!(
                "path={} name={} size={}\n",
                path.display(),
                name.to_string_lossy(),
                buf.len()
            ),
        );
        let name = sys::cstring(name.as_bytes())?;
        sys::lgetxattr(&self.host_path(path)?, &name, buf)
    }

    /// NUL-separated attribute names into `buf`; an empty `buf` asks for
    /// the required size.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn listxattr(&self, path: &Path, buf: &mut [u8]) -> FsResult<usize> {
        self.log.write_log(
            Operation::Listxattr.name(),
            format_args!("path={} size={}\n", path.display(), buf.len()),
        );
        sys::llistxattr(&self.host_path(path)?, buf)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn removexattr(&self, path: &Path, name: &OsStr) -> FsResult<()> {
        self.log.write_log(
            Operation::Removexattr.name(),
            format_args!("path={} name={}\n", path.display(), name.to_string_lossy()),
        );
        let name = sys::cstring(name.as_bytes())?;
        sys::lremovexattr(&self.host_path(path)?, &name)
    }
}
