// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-call value types exchanged between the dispatch layer and the transport

use std::fmt;

/// Attributes of a filesystem node as reported by the host.
///
/// Built fresh from a host `stat` on every query; nothing here is cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

impl Metadata {
    /// Minimal record for a directory entry: only the inode and the type
    /// nibble (`d_type` shifted into the `S_IFMT` bits). Permission bits stay
    /// zero, so this must never be compared against a full host stat.
    pub fn from_dir_entry(ino: u64, d_type: u8) -> Self {
        Self {
            ino,
            mode: u32::from(d_type) << 12,
            ..Self::default()
        }
    }

    /// The `S_IFMT` portion of the mode.
    pub fn file_type_bits(&self) -> u32 {
        self.mode & libc::S_IFMT as u32
    }

    /// Permission and special bits (`07777`).
    pub fn permission_bits(&self) -> u32 {
        self.mode & 0o7777
    }
}

#[allow(clippy::unnecessary_cast)]
impl From<&libc::stat> for Metadata {
    fn from(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            uid: st.st_uid,
            gid: st.st_gid,
            rdev: st.st_rdev as u64,
            size: st.st_size as i64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime: st.st_atime as i64,
            atime_nsec: st.st_atime_nsec as i64,
            mtime: st.st_mtime as i64,
            mtime_nsec: st.st_mtime_nsec as i64,
            ctime: st.st_ctime as i64,
            ctime_nsec: st.st_ctime_nsec as i64,
        }
    }
}

/// Host filesystem statistics (`statvfs`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namemax: u32,
    pub frsize: u32,
}

#[allow(clippy::unnecessary_cast)]
impl From<&libc::statvfs> for StatFs {
    fn from(sv: &libc::statvfs) -> Self {
        Self {
            blocks: sv.f_blocks as u64,
            bfree: sv.f_bfree as u64,
            bavail: sv.f_bavail as u64,
            files: sv.f_files as u64,
            ffree: sv.f_ffree as u64,
            bsize: sv.f_bsize as u32,
            namemax: sv.f_namemax as u32,
            frsize: sv.f_frsize as u32,
        }
    }
}

/// One half of a `utimens` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUpdate {
    /// Set to the current time (`UTIME_NOW`).
    Now,
    /// Leave unchanged (`UTIME_OMIT`).
    Omit,
    /// Set to an explicit point, in seconds and nanoseconds since the epoch.
    At { secs: i64, nsecs: i64 },
}

impl TimeUpdate {
    #[allow(clippy::unnecessary_cast)]
    pub(crate) fn to_timespec(self) -> libc::timespec {
        let (tv_sec, tv_nsec) = match self {
            TimeUpdate::Now => (0, libc::UTIME_NOW as i64),
            TimeUpdate::Omit => (0, libc::UTIME_OMIT as i64),
            TimeUpdate::At { secs, nsecs } => (secs, nsecs),
        };
        libc::timespec {
            tv_sec: tv_sec as libc::time_t,
            tv_nsec: tv_nsec as _,
        }
    }
}

impl fmt::Display for TimeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUpdate::Now => f.write_str("now"),
            TimeUpdate::Omit => f.write_str("omit"),
            TimeUpdate::At { secs, nsecs } => write!(f, "{}.{:09}", secs, nsecs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_entry_record_carries_only_type_and_inode() {
        let meta = Metadata::from_dir_entry(77, libc::DT_DIR);
        assert_eq!(meta.ino, 77);
        assert_eq!(meta.file_type_bits(), libc::S_IFDIR as u32);
        assert_eq!(meta.permission_bits(), 0);
        assert_eq!(meta.size, 0);
        assert_eq!(meta.nlink, 0);
    }

    #[test]
    fn dir_entry_type_shift_matches_mode_bits() {
        let cases = [
            (libc::DT_REG, libc::S_IFREG),
            (libc::DT_DIR, libc::S_IFDIR),
            (libc::DT_LNK, libc::S_IFLNK),
            (libc::DT_FIFO, libc::S_IFIFO),
            (libc::DT_SOCK, libc::S_IFSOCK),
            (libc::DT_CHR, libc::S_IFCHR),
            (libc::DT_BLK, libc::S_IFBLK),
        ];
        for (d_type, mode) in cases {
            assert_eq!(
                Metadata::from_dir_entry(1, d_type).file_type_bits(),
                mode as u32,
                "d_type {}",
                d_type
            );
        }
        assert_eq!(Metadata::from_dir_entry(1, libc::DT_UNKNOWN).mode, 0);
    }

    #[test]
    fn time_update_timespec() {
        let now = TimeUpdate::Now.to_timespec();
        assert_eq!(now.tv_nsec as i64, libc::UTIME_NOW as i64);

        let omit = TimeUpdate::Omit.to_timespec();
        assert_eq!(omit.tv_nsec as i64, libc::UTIME_OMIT as i64);

        let at = TimeUpdate::At { secs: 1_700_000_000, nsecs: 5 }.to_timespec();
        assert_eq!(at.tv_sec as i64, 1_700_000_000);
        assert_eq!(at.tv_nsec as i64, 5);
    }

    #[test]
    fn time_update_display() {
        assert_eq!(TimeUpdate::Now.to_string(), "now");
        assert_eq!(TimeUpdate::Omit.to_string(), "omit");
        assert_eq!(TimeUpdate::At { secs: 10, nsecs: 42 }.to_string(), "10.000000042");
    }
}
