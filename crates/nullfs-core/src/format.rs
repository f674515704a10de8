// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Textual rendering of metadata records for the diagnostic log

use std::fmt::{self, Write};

use crate::types::Metadata;

/// Render a record as `dev=…,ino=…,mode=…,…,ctime=…`.
///
/// `None` contributes nothing. A formatting failure also degrades to the
/// empty string: a log record must never fail the operation it describes.
pub fn render(record: Option<&Metadata>) -> String {
    let Some(record) = record else {
        return String::new();
    };

    let mut out = String::with_capacity(160);
    match write_fields(&mut out, record) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

fn write_fields(out: &mut impl Write, st: &Metadata) -> fmt::Result {
    write!(
        out,
        "dev={},ino={},mode={:o},nlink={},uid={},gid={},rdev={},size={},blksize={},blocks={},atime={},mtime={},ctime={}",
        st.dev,
        st.ino,
        st.mode,
        st.nlink,
        st.uid,
        st.gid,
        st.rdev,
        st.size,
        st.blksize,
        st.blocks,
        st.atime,
        st.mtime,
        st.ctime
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            dev: 2049,
            ino: 131_074,
            mode: 0o100644,
            nlink: 1,
            uid: 1000,
            gid: 100,
            rdev: 0,
            size: 4096,
            blksize: 4096,
            blocks: 8,
            atime: 1_700_000_001,
            atime_nsec: 999,
            mtime: 1_700_000_002,
            mtime_nsec: 0,
            ctime: 1_700_000_003,
            ctime_nsec: 0,
        }
    }

    #[test]
    fn none_renders_empty() {
        assert_eq!(render(None), "");
    }

    #[test]
    fn fixed_field_order() {
        assert_eq!(
            render(Some(&sample())),
            "dev=2049,ino=131074,mode=100644,nlink=1,uid=1000,gid=100,rdev=0,\
             size=4096,blksize=4096,blocks=8,atime=1700000001,mtime=1700000002,ctime=1700000003"
        );
    }

    #[test]
    fn repeated_rendering_is_stable() {
        let record = sample();
        let first = render(Some(&record));
        for _ in 0..3 {
            assert_eq!(render(Some(&record)), first);
        }
    }

    #[test]
    fn failing_writer_is_reported_not_panicked() {
        struct Refuse;
        impl Write for Refuse {
            fn write_str(&mut self, _: &str) -> fmt::Result {
                Err(fmt::Error)
            }
        }
        assert!(write_fields(&mut Refuse, &sample()).is_err());
    }
}
