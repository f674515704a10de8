// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Thin wrappers over the host primitives.
//!
//! Each wrapper performs exactly one libc call (or an open/close pair) and
//! turns the `-1`/errno convention into `FsResult`. Descriptors and
//! directory streams are owned values closed on drop.

use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use libc::{c_int, mode_t};

use crate::error::{FsError, FsResult};
use crate::types::{Metadata, StatFs, TimeUpdate};

/// Host paths cannot carry interior NUL bytes; report what the kernel would.
pub(crate) fn cstring(bytes: &[u8]) -> FsResult<CString> {
    CString::new(bytes).map_err(|_| FsError::Host(libc::EINVAL))
}

fn cvt(ret: c_int) -> FsResult<c_int> {
    if ret == -1 {
        Err(FsError::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: libc::ssize_t) -> FsResult<usize> {
    if ret < 0 {
        Err(FsError::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

pub(crate) fn lstat(path: &CStr) -> FsResult<Metadata> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    cvt(unsafe { libc::lstat(path.as_ptr(), st.as_mut_ptr()) })?;
    let st = unsafe { st.assume_init() };
    Ok(Metadata::from(&st))
}

pub(crate) fn access_nofollow(path: &CStr, mask: c_int) -> FsResult<()> {
    cvt(unsafe {
        libc::faccessat(
            libc::AT_FDCWD,
            path.as_ptr(),
            mask,
            libc::AT_SYMLINK_NOFOLLOW,
        )
    })?;
    Ok(())
}

pub(crate) fn readlink(path: &CStr, buf: &mut [u8]) -> FsResult<usize> {
    cvt_size(unsafe { libc::readlink(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) })
}

/// `open(O_CREAT | O_EXCL | O_WRONLY)` followed by `close`; a failing close
/// is reported like any other host error.
pub(crate) fn create_exclusive(path: &CStr, mode: mode_t) -> FsResult<()> {
    let fd = cvt(unsafe {
        libc::open(
            path.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY,
            mode as libc::c_uint,
        )
    })?;
    cvt(unsafe { libc::close(fd) })?;
    Ok(())
}

pub(crate) fn mkfifo(path: &CStr, mode: mode_t) -> FsResult<()> {
    cvt(unsafe { libc::mkfifo(path.as_ptr(), mode) })?;
    Ok(())
}

pub(crate) fn mknod(path: &CStr, mode: mode_t, rdev: libc::dev_t) -> FsResult<()> {
    cvt(unsafe { libc::mknod(path.as_ptr(), mode, rdev) })?;
    Ok(())
}

pub(crate) fn mkdir(path: &CStr, mode: mode_t) -> FsResult<()> {
    cvt(unsafe { libc::mkdir(path.as_ptr(), mode) })?;
    Ok(())
}

pub(crate) fn unlink(path: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::unlink(path.as_ptr()) })?;
    Ok(())
}

pub(crate) fn rmdir(path: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::rmdir(path.as_ptr()) })?;
    Ok(())
}

pub(crate) fn symlink(target: &CStr, link: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) })?;
    Ok(())
}

pub(crate) fn rename(from: &CStr, to: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::rename(from.as_ptr(), to.as_ptr()) })?;
    Ok(())
}

pub(crate) fn link(from: &CStr, to: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::link(from.as_ptr(), to.as_ptr()) })?;
    Ok(())
}

pub(crate) fn chmod(path: &CStr, mode: mode_t) -> FsResult<()> {
    cvt(unsafe { libc::chmod(path.as_ptr(), mode) })?;
    Ok(())
}

pub(crate) fn lchown(path: &CStr, uid: libc::uid_t, gid: libc::gid_t) -> FsResult<()> {
    cvt(unsafe { libc::lchown(path.as_ptr(), uid, gid) })?;
    Ok(())
}

pub(crate) fn truncate(path: &CStr, size: i64) -> FsResult<()> {
    cvt(unsafe { libc::truncate(path.as_ptr(), size as libc::off_t) })?;
    Ok(())
}

pub(crate) fn utimens_nofollow(path: &CStr, atime: TimeUpdate, mtime: TimeUpdate) -> FsResult<()> {
    let times = [atime.to_timespec(), mtime.to_timespec()];
    cvt(unsafe {
        libc::utimensat(libc::AT_FDCWD, path.as_ptr(), times.as_ptr(), libc::AT_SYMLINK_NOFOLLOW)
    })?;
    Ok(())
}

pub(crate) fn statvfs(path: &CStr) -> FsResult<StatFs> {
    let mut sv = MaybeUninit::<libc::statvfs>::uninit();
    cvt(unsafe { libc::statvfs(path.as_ptr(), sv.as_mut_ptr()) })?;
    let sv = unsafe { sv.assume_init() };
    Ok(StatFs::from(&sv))
}

/// Open a per-call descriptor; it is closed when the returned value drops.
pub(crate) fn open(path: &CStr, flags: c_int) -> FsResult<OwnedFd> {
    let fd = cvt(unsafe { libc::open(path.as_ptr(), flags, 0 as libc::c_uint) })?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn pread(fd: &OwnedFd, buf: &mut [u8], offset: i64) -> FsResult<usize> {
    cvt_size(unsafe {
        libc::pread(
            fd.as_raw_fd(),
            buf.as_mut_ptr().cast(),
            buf.len(),
            offset as libc::off_t,
        )
    })
}

pub(crate) fn pwrite(fd: &OwnedFd, data: &[u8], offset: i64) -> FsResult<usize> {
    cvt_size(unsafe {
        libc::pwrite(
            fd.as_raw_fd(),
            data.as_ptr().cast(),
            data.len(),
            offset as libc::off_t,
        )
    })
}

/// `posix_fallocate` returns the error number instead of setting errno.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn posix_fallocate(fd: &OwnedFd, offset: i64, length: i64) -> FsResult<()> {
    match unsafe {
        libc::posix_fallocate(fd.as_raw_fd(), offset as libc::off_t, length as libc::off_t)
    } {
        0 => Ok(()),
        errno => Err(FsError::Host(errno)),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn lsetxattr(path: &CStr, name: &CStr, value: &[u8], flags: c_int) -> FsResult<()> {
    cvt(unsafe {
        libc::lsetxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            flags,
        )
    })?;
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn lgetxattr(path: &CStr, name: &CStr, buf: &mut [u8]) -> FsResult<usize> {
    cvt_size(unsafe {
        libc::lgetxattr(path.as_ptr(), name.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn llistxattr(path: &CStr, buf: &mut [u8]) -> FsResult<usize> {
    cvt_size(unsafe { libc::llistxattr(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn lremovexattr(path: &CStr, name: &CStr) -> FsResult<()> {
    cvt(unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) })?;
    Ok(())
}

/// One entry as returned by the host `readdir`.
pub(crate) struct RawDirEntry<'a> {
    pub ino: u64,
    pub d_type: u8,
    pub name: &'a CStr,
}

/// Open host directory stream, closed exactly once on drop.
pub(crate) struct DirStream {
    dir: NonNull<libc::DIR>,
}

impl DirStream {
    pub(crate) fn open(path: &CStr) -> FsResult<Self> {
        let dir = unsafe { libc::opendir(path.as_ptr()) };
        NonNull::new(dir)
            .map(|dir| Self { dir })
            .ok_or_else(FsError::last_os_error)
    }

    /// Next entry, or `None` once the stream is exhausted. The returned
    /// name borrows the stream's internal buffer.
    #[allow(clippy::unnecessary_cast)]
    pub(crate) fn next_entry(&mut self) -> Option<RawDirEntry<'_>> {
        let entry = unsafe { libc::readdir(self.dir.as_ptr()) };
        if entry.is_null() {
            return None;
        }
        let entry = unsafe { &*entry };
        Some(RawDirEntry {
            ino: entry.d_ino as u64,
            d_type: entry.d_type,
            name: unsafe { CStr::from_ptr(entry.d_name.as_ptr()) },
        })
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        unsafe {
            libc::closedir(self.dir.as_ptr());
        }
    }
}
