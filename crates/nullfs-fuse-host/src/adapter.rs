// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! nullfs FUSE adapter implementation
//!
//! Maps inode-based FUSE requests onto the path-based passthrough core.
//! Every request is answered synchronously on the session thread.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, ENOENT, ENOSYS};
use nullfs_core::{
    FsError, Metadata, NullFsConfig, Operation, OperationTable, Passthrough, TimeUpdate,
};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::inodes::InodeTable;

/// nullfs FUSE filesystem adapter
pub struct NullFsFuse {
    /// Passthrough dispatch core
    fs: Passthrough,
    /// Operations this host supports
    table: OperationTable,
    /// inode <-> path mapping
    inodes: InodeTable,
    /// TTL for attribute replies
    attr_ttl: Duration,
    /// TTL for directory entry replies
    entry_ttl: Duration,
}

fn errno(err: FsError) -> c_int {
    err.errno()
}

fn path_from_bytes(path: &[u8]) -> &Path {
    Path::new(OsStr::from_bytes(path))
}

impl NullFsFuse {
    pub fn new(fs: Passthrough, table: OperationTable, config: &NullFsConfig) -> Self {
        Self {
            fs,
            table,
            inodes: InodeTable::new(),
            attr_ttl: Duration::from_millis(config.attr_ttl_ms),
            entry_ttl: Duration::from_millis(config.entry_ttl_ms),
        }
    }

    /// Fail with `ENOSYS` unless the operation was registered.
    fn require(&self, operation: Operation) -> Result<(), c_int> {
        if self.table.contains(operation) {
            Ok(())
        } else {
            debug!(%operation, "unregistered operation requested");
            Err(ENOSYS)
        }
    }

    fn path_of(&self, ino: u64) -> Result<Vec<u8>, c_int> {
        self.inodes.path(ino).map(<[u8]>::to_vec).ok_or(ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<Vec<u8>, c_int> {
        self.inodes.child(parent, name.as_bytes()).ok_or(ENOENT)
    }

    /// Stat a freshly named node and hand its inode to the kernel.
    fn entry(&mut self, path: &[u8]) -> Result<FileAttr, c_int> {
        let meta = self.fs.getattr(path_from_bytes(path)).map_err(errno)?;
        let ino = self.inodes.lookup(path);
        Ok(file_attr(&meta, ino))
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr, c_int> {
        let path = self.child_of(parent, name)?;
        self.entry(&path)
    }

    fn do_getattr(&self, ino: u64) -> Result<FileAttr, c_int> {
        let path = self.path_of(ino)?;
        let meta = self.fs.getattr(path_from_bytes(&path)).map_err(errno)?;
        Ok(file_attr(&meta, ino))
    }

    #[allow(clippy::too_many_arguments)]
    fn do_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<FileAttr, c_int> {
        let path = self.path_of(ino)?;
        let path = path_from_bytes(&path);

        if let Some(mode) = mode {
            self.fs.chmod(path, mode).map_err(errno)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs
                .chown(path, uid.unwrap_or(u32::MAX), gid.unwrap_or(u32::MAX))
                .map_err(errno)?;
        }
        if let Some(size) = size {
            let size = i64::try_from(size).map_err(|_| EINVAL)?;
            self.fs.truncate(path, size).map_err(errno)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.require(Operation::Utimens)?;
            self.fs
                .utimens(path, time_update(atime), time_update(mtime))
                .map_err(errno)?;
        }

        let meta = self.fs.getattr(path).map_err(errno)?;
        Ok(file_attr(&meta, ino))
    }

    fn do_readlink(&self, ino: u64) -> Result<Vec<u8>, c_int> {
        let path = self.path_of(ino)?;
        // Room for a maximal target plus the terminator the host reserves.
        let size = libc::PATH_MAX as usize + 1;
        self.fs.readlink(path_from_bytes(&path), size).map_err(errno)
    }

    fn do_mknod(
        &mut self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        rdev: u32,
    ) -> Result<FileAttr, c_int> {
        let path = self.child_of(parent, name)?;
        self.fs
            .mknod(path_from_bytes(&path), mode, u64::from(rdev))
            .map_err(errno)?;
        self.entry(&path)
    }

    fn do_mkdir(&mut self, parent: u64, name: &OsStr, mode: u32) -> Result<FileAttr, c_int> {
        let path = self.child_of(parent, name)?;
        self.fs.mkdir(path_from_bytes(&path), mode).map_err(errno)?;
        self.entry(&path)
    }

    fn do_unlink(&mut self, parent: u64, name: &OsStr) -> Result<(), c_int> {
        let path = self.child_of(parent, name)?;
        self.fs.unlink(path_from_bytes(&path)).map_err(errno)?;
        self.inodes.unlinked(&path);
        Ok(())
    }

    fn do_rmdir(&mut self, parent: u64, name: &OsStr) -> Result<(), c_int> {
        let path = self.child_of(parent, name)?;
        self.fs.rmdir(path_from_bytes(&path)).map_err(errno)?;
        self.inodes.unlinked(&path);
        Ok(())
    }

    fn do_symlink(&mut self, parent: u64, name: &OsStr, target: &Path) -> Result<FileAttr, c_int> {
        let path = self.child_of(parent, name)?;
        self.fs.symlink(target, path_from_bytes(&path)).map_err(errno)?;
        self.entry(&path)
    }

    fn do_rename(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
    ) -> Result<(), c_int> {
        // RENAME_NOREPLACE / RENAME_EXCHANGE have no plain-rename equivalent.
        if flags != 0 {
            return Err(EINVAL);
        }
        let from = self.child_of(parent, name)?;
        let to = self.child_of(newparent, newname)?;
        self.fs
            .rename(path_from_bytes(&from), path_from_bytes(&to))
            .map_err(errno)?;
        self.inodes.renamed(&from, &to);
        Ok(())
    }

    fn do_link(&mut self, ino: u64, newparent: u64, newname: &OsStr) -> Result<FileAttr, c_int> {
        let from = self.path_of(ino)?;
        let to = self.child_of(newparent, newname)?;
        self.fs
            .link(path_from_bytes(&from), path_from_bytes(&to))
            .map_err(errno)?;
        let meta = self.fs.getattr(path_from_bytes(&to)).map_err(errno)?;
        self.inodes.link(ino, &to);
        Ok(file_attr(&meta, ino))
    }

    fn do_read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let path = self.path_of(ino)?;
        let mut buf = vec![0u8; size as usize];
        let len = self
            .fs
            .read(path_from_bytes(&path), &mut buf, offset)
            .map_err(errno)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn do_readdir(&self, ino: u64, offset: i64, reply: &mut ReplyDirectory) -> Result<(), c_int> {
        let path = self.path_of(ino)?;
        let mut index: i64 = 0;
        self.fs
            .readdir(path_from_bytes(&path), |name, record| {
                index += 1;
                if index <= offset {
                    return false;
                }
                reply.add(record.ino, index, file_type(record.mode), name)
            })
            .map_err(errno)
    }

    /// Reply to a size probe (`size == 0`) or with the data itself.
    fn xattr_reply(
        size: u32,
        fill: impl FnOnce(&mut [u8]) -> Result<usize, c_int>,
        reply: ReplyXattr,
    ) {
        let mut buf = vec![0u8; size as usize];
        match fill(buf.as_mut_slice()) {
            Ok(len) if size == 0 => reply.size(len as u32),
            Ok(len) => reply.data(&buf[..len]),
            Err(errno) => reply.error(errno),
        }
    }
}

/// Kernel file type for a mode; unknown types are reported as regular files.
fn file_type(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

fn file_attr(meta: &Metadata, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: meta.size.max(0) as u64,
        blocks: meta.blocks.max(0) as u64,
        atime: system_time(meta.atime, meta.atime_nsec),
        mtime: system_time(meta.mtime, meta.mtime_nsec),
        ctime: system_time(meta.ctime, meta.ctime_nsec),
        crtime: system_time(meta.ctime, meta.ctime_nsec),
        kind: file_type(meta.mode),
        perm: meta.permission_bits() as u16,
        nlink: u32::try_from(meta.nlink).unwrap_or(u32::MAX),
        uid: meta.uid,
        gid: meta.gid,
        rdev: meta.rdev as u32,
        blksize: u32::try_from(meta.blksize).unwrap_or(4096),
        flags: 0,
    }
}

fn time_update(time: Option<TimeOrNow>) -> TimeUpdate {
    match time {
        None => TimeUpdate::Omit,
        Some(TimeOrNow::Now) => TimeUpdate::Now,
        Some(TimeOrNow::SpecificTime(time)) => match time.duration_since(UNIX_EPOCH) {
            Ok(since) => TimeUpdate::At {
                secs: since.as_secs() as i64,
                nsecs: i64::from(since.subsec_nanos()),
            },
            Err(err) => {
                let before = err.duration();
                let mut secs = -i128::from(before.as_secs());
                let mut nsecs = 0;
                if before.subsec_nanos() != 0 {
                    secs -= 1;
                    nsecs = 1_000_000_000 - i64::from(before.subsec_nanos());
                }
                match i64::try_from(secs) {
                    Ok(secs) => TimeUpdate::At { secs, nsecs },
                    // Earlier than a timespec can hold.
                    Err(_) => TimeUpdate::At {
                        secs: i64::MIN,
                        nsecs: 0,
                    },
                }
            }
        },
    }
}

impl fuser::Filesystem for NullFsFuse {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        info!(
            root = %self.fs.root().display(),
            operations = self.table.len(),
            "nullfs FUSE adapter initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!("nullfs FUSE adapter destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.do_setattr(ino, mode, uid, gid, size, atime, mtime) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.access(path_from_bytes(&path), mask).map_err(errno));
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.do_readlink(ino) {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        match self.do_mknod(parent, name, mode, rdev) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        match self.do_mkdir(parent, name, mode) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        match self.do_symlink(parent, link_name, target) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.do_rename(parent, name, newparent, newname, flags) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        match self.do_link(ino, newparent, newname) {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.open(path_from_bytes(&path), flags).map_err(errno));
        match result {
            // No handle is kept; every read and write reopens by path.
            Ok(()) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.do_read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.write(path_from_bytes(&path), data, offset).map_err(errno));
        match result {
            Ok(written) => reply.written(written as u32),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.release(path_from_bytes(&path)).map_err(errno));
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn fsync(&mut self, _req: &Request, ino: u64, _fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.fsync(path_from_bytes(&path), datasync).map_err(errno));
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.do_readdir(ino, offset, &mut reply) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.statfs(path_from_bytes(&path)).map_err(errno));
        match result {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.bfree,
                stats.bavail,
                stats.files,
                stats.ffree,
                stats.bsize,
                stats.namemax,
                stats.frsize,
            ),
            Err(errno) => reply.error(errno),
        }
    }

    fn fallocate(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        let result = self.require(Operation::Fallocate).and_then(|()| {
            let path = self.path_of(ino)?;
            self.fs
                .fallocate(path_from_bytes(&path), mode, offset, length)
                .map_err(errno)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self.require(Operation::Setxattr).and_then(|()| {
            let path = self.path_of(ino)?;
            self.fs
                .setxattr(path_from_bytes(&path), name, value, flags)
                .map_err(errno)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let path = match self.require(Operation::Getxattr).and_then(|()| self.path_of(ino)) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let fs = &self.fs;
        Self::xattr_reply(
            size,
            |buf| fs.getxattr(path_from_bytes(&path), name, buf).map_err(errno),
            reply,
        );
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let path = match self.require(Operation::Listxattr).and_then(|()| self.path_of(ino)) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let fs = &self.fs;
        Self::xattr_reply(
            size,
            |buf| fs.listxattr(path_from_bytes(&path), buf).map_err(errno),
            reply,
        );
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.require(Operation::Removexattr).and_then(|()| {
            let path = self.path_of(ino)?;
            self.fs
                .removexattr(path_from_bytes(&path), name)
                .map_err(errno)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullfs_core::testing::MemorySink;
    use nullfs_core::{CapabilitySet, DiagnosticLog};
    use std::sync::Arc;

    fn adapter(caps: CapabilitySet) -> (tempfile::TempDir, NullFsFuse, Arc<MemorySink>) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let fs = Passthrough::new(dir.path(), DiagnosticLog::with_sink(sink.clone()));
        let config = NullFsConfig {
            attr_ttl_ms: 1500,
            entry_ttl_ms: 2500,
            ..Default::default()
        };
        let fuse = NullFsFuse::new(fs, OperationTable::assemble(caps), &config);
        (dir, fuse, sink)
    }

    #[test]
    fn ttls_follow_config() {
        let (_dir, fuse, _) = adapter(CapabilitySet::none());
        assert_eq!(fuse.attr_ttl, Duration::from_millis(1500));
        assert_eq!(fuse.entry_ttl, Duration::from_millis(2500));
    }

    #[test]
    fn unregistered_operations_are_enosys() {
        let (_dir, fuse, sink) = adapter(CapabilitySet::none());
        assert_eq!(fuse.require(Operation::Fallocate), Err(ENOSYS));
        assert_eq!(fuse.require(Operation::Getxattr), Err(ENOSYS));
        assert_eq!(fuse.require(Operation::Getattr), Ok(()));

        // Time updates need the utimens handler; nothing reaches the host.
        let result = fuse.do_setattr(
            fuser::FUSE_ROOT_ID,
            None,
            None,
            None,
            None,
            Some(TimeOrNow::Now),
            None,
        );
        assert_eq!(result.unwrap_err(), ENOSYS);
        assert!(sink.operations().is_empty());
    }

    #[test]
    fn lookup_then_create_then_rename() {
        let (dir, mut fuse, sink) = adapter(CapabilitySet::compiled());
        let root = fuser::FUSE_ROOT_ID;

        assert_eq!(fuse.do_lookup(root, OsStr::new("missing")).unwrap_err(), ENOENT);

        let dir_attr = fuse.do_mkdir(root, OsStr::new("sub"), 0o755).unwrap();
        assert_eq!(dir_attr.kind, FileType::Directory);
        let file_attr = fuse
            .do_mknod(dir_attr.ino, OsStr::new("file"), libc::S_IFREG | 0o644, 0)
            .unwrap();
        assert_eq!(file_attr.kind, FileType::RegularFile);
        assert!(dir.path().join("sub/file").is_file());

        fuse.do_rename(root, OsStr::new("sub"), root, OsStr::new("moved"), 0)
            .unwrap();
        assert!(dir.path().join("moved/file").is_file());
        // The inode still resolves after its parent moved.
        assert_eq!(fuse.do_getattr(file_attr.ino).unwrap().ino, file_attr.ino);

        let noreplace = fuse.do_rename(
            root,
            OsStr::new("moved"),
            root,
            OsStr::new("x"),
            libc::RENAME_NOREPLACE,
        );
        assert_eq!(noreplace, Err(EINVAL));

        assert_eq!(
            sink.operations(),
            vec!["getattr", "mkdir", "getattr", "mknod", "getattr", "rename", "getattr"]
        );
    }

    #[test]
    fn setattr_fans_out_in_order() {
        let (dir, mut fuse, sink) = adapter(CapabilitySet::compiled());
        std::fs::write(dir.path().join("file"), b"0123456789").unwrap();
        let ino = fuse.do_lookup(fuser::FUSE_ROOT_ID, OsStr::new("file")).unwrap().ino;
        sink.clear();

        let stamp = UNIX_EPOCH + Duration::new(1_000_000, 500);
        let attr = fuse
            .do_setattr(
                ino,
                Some(0o600),
                None,
                None,
                Some(3),
                Some(TimeOrNow::SpecificTime(stamp)),
                Some(TimeOrNow::SpecificTime(stamp)),
            )
            .unwrap();

        assert_eq!(attr.perm, 0o600);
        assert_eq!(attr.size, 3);
        assert_eq!(attr.mtime, stamp);
        assert_eq!(sink.operations(), vec!["chmod", "truncate", "utimens", "getattr"]);
    }

    #[test]
    fn host_listing_order_is_stable_across_offsets() {
        let (dir, fuse, _) = adapter(CapabilitySet::none());
        for name in ["a", "b", "c"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let mut all = Vec::new();
        fuse.fs
            .readdir(Path::new("/"), |name, _| {
                all.push(name.to_owned());
                false
            })
            .unwrap();
        assert_eq!(all.len(), 5);

        // Same walk resumed after two entries sees the remainder.
        let mut index = 0i64;
        let mut rest = Vec::new();
        fuse.fs
            .readdir(Path::new("/"), |name, _| {
                index += 1;
                if index > 2 {
                    rest.push(name.to_owned());
                }
                false
            })
            .unwrap();
        assert_eq!(rest, all[2..].to_vec());
    }

    #[test]
    fn file_types_map_from_mode() {
        assert_eq!(file_type(libc::S_IFDIR | 0o755), FileType::Directory);
        assert_eq!(file_type(libc::S_IFLNK), FileType::Symlink);
        assert_eq!(file_type(libc::S_IFIFO), FileType::NamedPipe);
        assert_eq!(file_type(libc::S_IFSOCK), FileType::Socket);
        assert_eq!(file_type(libc::S_IFREG | 0o644), FileType::RegularFile);
        // DT_UNKNOWN from a directory listing
        assert_eq!(file_type(0), FileType::RegularFile);
    }

    #[test]
    fn times_convert_both_ways() {
        let at = UNIX_EPOCH + Duration::new(42, 7);
        assert_eq!(
            time_update(Some(TimeOrNow::SpecificTime(at))),
            TimeUpdate::At { secs: 42, nsecs: 7 }
        );
        assert_eq!(system_time(42, 7), at);

        let before = UNIX_EPOCH - Duration::new(1, 250_000_000);
        assert_eq!(
            time_update(Some(TimeOrNow::SpecificTime(before))),
            TimeUpdate::At {
                secs: -2,
                nsecs: 750_000_000
            }
        );
        assert_eq!(system_time(-2, 750_000_000), before);

        let earliest = UNIX_EPOCH - Duration::from_secs(1 << 63);
        assert_eq!(
            time_update(Some(TimeOrNow::SpecificTime(earliest))),
            TimeUpdate::At {
                secs: i64::MIN,
                nsecs: 0
            }
        );

        assert_eq!(time_update(None), TimeUpdate::Omit);
        assert_eq!(time_update(Some(TimeOrNow::Now)), TimeUpdate::Now);
    }

    #[test]
    fn attributes_carry_the_kernel_inode() {
        let meta = Metadata {
            ino: 777,
            mode: libc::S_IFREG | 0o4755,
            nlink: 3,
            size: 10,
            blksize: 4096,
            ..Default::default()
        };
        let attr = file_attr(&meta, 9);
        assert_eq!(attr.ino, 9);
        assert_eq!(attr.perm, 0o4755);
        assert_eq!(attr.nlink, 3);
        assert_eq!(attr.blksize, 4096);
    }
}
