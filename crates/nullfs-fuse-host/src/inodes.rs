// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel inode numbers for logical paths
//!
//! The kernel addresses nodes by inode, the passthrough core by path. This
//! table only remembers which path an inode number stands for; it never
//! stores attributes.

use std::collections::HashMap;

use fuser::FUSE_ROOT_ID;

pub(crate) struct InodeTable {
    /// inode -> canonical path
    paths: HashMap<u64, Vec<u8>>,
    /// path (canonical or hard-link alias) -> inode
    inodes: HashMap<Vec<u8>, u64>,
    /// outstanding kernel lookups per inode
    lookups: HashMap<u64, u64>,
    next_inode: u64,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(FUSE_ROOT_ID, b"/".to_vec());
        inodes.insert(b"/".to_vec(), FUSE_ROOT_ID);

        Self {
            paths,
            inodes,
            lookups: HashMap::new(),
            next_inode: FUSE_ROOT_ID + 1,
        }
    }

    pub(crate) fn path(&self, ino: u64) -> Option<&[u8]> {
        self.paths.get(&ino).map(Vec::as_slice)
    }

    /// Path of `name` inside the directory `parent`.
    pub(crate) fn child(&self, parent: u64, name: &[u8]) -> Option<Vec<u8>> {
        let parent = self.path(parent)?;
        let mut path = Vec::with_capacity(parent.len() + name.len() + 1);
        path.extend_from_slice(parent);
        if !path.ends_with(b"/") {
            path.push(b'/');
        }
        path.extend_from_slice(name);
        Some(path)
    }

    /// Inode for `path`, allocated on first sight; counts one kernel lookup.
    pub(crate) fn lookup(&mut self, path: &[u8]) -> u64 {
        let ino = match self.inodes.get(path) {
            Some(&ino) => ino,
            None => {
                let ino = self.next_inode;
                self.next_inode += 1;
                self.inodes.insert(path.to_vec(), ino);
                self.paths.insert(ino, path.to_vec());
                ino
            }
        };
        *self.lookups.entry(ino).or_default() += 1;
        ino
    }

    /// Record `path` as a hard-link alias of `ino`; counts one kernel lookup.
    pub(crate) fn link(&mut self, ino: u64, path: &[u8]) {
        self.inodes.insert(path.to_vec(), ino);
        *self.lookups.entry(ino).or_default() += 1;
    }

    /// Drop `nlookup` references; the inode is released once none remain.
    pub(crate) fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        let remaining = match self.lookups.get_mut(&ino) {
            Some(count) => {
                *count = count.saturating_sub(nlookup);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.lookups.remove(&ino);
            self.paths.remove(&ino);
            self.inodes.retain(|_, mapped| *mapped != ino);
        }
    }

    /// `path` no longer names anything. The inode stays until forgotten,
    /// re-pointed at a surviving alias when there is one.
    pub(crate) fn unlinked(&mut self, path: &[u8]) {
        let Some(ino) = self.inodes.remove(path) else {
            return;
        };
        let was_canonical = self.paths.get(&ino).is_some_and(|p| p.as_slice() == path);
        if was_canonical {
            if let Some((alias, _)) = self.inodes.iter().find(|(_, mapped)| **mapped == ino) {
                self.paths.insert(ino, alias.clone());
            }
        }
    }

    /// Move `from` and everything below it to `to`. A node previously
    /// mapped at `to` is displaced.
    pub(crate) fn renamed(&mut self, from: &[u8], to: &[u8]) {
        self.unlinked(to);

        let moved: Vec<(Vec<u8>, u64)> = self
            .inodes
            .iter()
            .filter(|(path, _)| is_within(path, from))
            .map(|(path, ino)| (path.clone(), *ino))
            .collect();

        for (old, ino) in moved {
            let mut new = to.to_vec();
            new.extend_from_slice(&old[from.len()..]);
            self.inodes.remove(&old);
            if self.paths.get(&ino).is_some_and(|p| *p == old) {
                self.paths.insert(ino, new.clone());
            }
            self.inodes.insert(new, ino);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.paths.len()
    }
}

/// `path` is `dir` itself or lies below it.
fn is_within(path: &[u8], dir: &[u8]) -> bool {
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(b"/"))
}
