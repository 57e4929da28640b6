// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The entry tree.
//!
//! Every node of the tree is a [`MemoryEntry`] behind its own
//! `parking_lot::RwLock`; the [`EntryRef`] alias is the shared handle stored
//! in directory tables and held by open channels. All locking is performed by
//! the traversal code in [`walk`](super::walk) and by the operation facade;
//! the methods here expect to be called with the lock already held and never
//! take a lock themselves.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::path::MemoryPath;

use super::attributes::{
    AdditionalViews, EntryAttributes, GroupPrincipal, PosixPermissions, UserPrincipal,
};
use super::blocks::{FileContent, FileStoreState};
use super::errors::ResolveError;
use super::FileType;

pub(crate) type EntryRef = Arc<RwLock<MemoryEntry>>;

/// A timestamp that may be bumped while only a read lock is held.
///
/// Stored as nanoseconds since the epoch; updates use `fetch_max` so the
/// value never moves backwards through concurrent touches.
pub(crate) struct AtomicTime(AtomicU64);

impl AtomicTime {
    fn new(time: SystemTime) -> Self {
        Self(AtomicU64::new(Self::to_nanos(time)))
    }

    fn to_nanos(time: SystemTime) -> u64 {
        match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            // Pre-epoch times clamp to the epoch.
            Err(_) => 0,
        }
    }

    pub(crate) fn get(&self) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_nanos(self.0.load(SeqCst))
    }

    pub(crate) fn max_assign(&self, time: SystemTime) {
        self.0.fetch_max(Self::to_nanos(time), SeqCst);
    }

    pub(crate) fn set(&self, time: SystemTime) {
        self.0.store(Self::to_nanos(time), SeqCst);
    }
}

/// One node of the entry tree: the data guarded by the entry's lock.
pub(crate) struct MemoryEntry {
    id: u64,
    created: SystemTime,
    modified: SystemTime,
    accessed: AtomicTime,
    pub(crate) attributes: EntryAttributes,
    pub(crate) kind: EntryKind,
}

pub(crate) enum EntryKind {
    File(FileNode),
    Directory(DirectoryNode),
    Symlink(SymlinkNode),
}

pub(crate) struct FileNode {
    pub(crate) content: FileContent,
    pub(crate) open_count: u64,
    pub(crate) marked_for_deletion: bool,
}

pub(crate) struct DirectoryNode {
    // Keyed by the lookup-transformed name; preserves insertion order for
    // enumeration.
    children: IndexMap<String, DirectoryChild>,
}

pub(crate) struct DirectoryChild {
    /// The store-transformed name as it is listed and reported in real paths.
    pub(crate) display_name: String,
    pub(crate) entry: EntryRef,
}

pub(crate) struct SymlinkNode {
    pub(crate) target: MemoryPath,
}

impl MemoryEntry {
    fn new(context: &EntryCreationContext, kind: EntryKind) -> Self {
        let now = SystemTime::now();
        let file_type = match &kind {
            EntryKind::File(_) => FileType::RegularFile,
            EntryKind::Directory(_) => FileType::Directory,
            EntryKind::Symlink(_) => FileType::SymbolicLink,
        };
        Self {
            id: context.allocate_id(),
            created: now,
            modified: now,
            accessed: AtomicTime::new(now),
            attributes: EntryAttributes::initial(
                context.views,
                context.umask,
                &context.user,
                &context.group,
                file_type,
            ),
            kind,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn created(&self) -> SystemTime {
        self.created
    }

    pub(crate) fn modified(&self) -> SystemTime {
        self.modified
    }

    pub(crate) fn accessed(&self) -> SystemTime {
        self.accessed.get()
    }

    /// Bumps the modification and access times. Requires the write lock; the
    /// clamp keeps the timestamps non-decreasing even if the wall clock steps
    /// backwards.
    pub(crate) fn touch_modified(&mut self) {
        let now = SystemTime::now();
        if now > self.modified {
            self.modified = now;
        }
        self.accessed.max_assign(now);
    }

    /// Bumps the access time only. Safe under a read lock.
    pub(crate) fn touch_accessed(&self) {
        self.accessed.max_assign(SystemTime::now());
    }

    /// Sets all three timestamps at once.
    pub(crate) fn set_times(
        &mut self,
        modified: SystemTime,
        accessed: SystemTime,
        created: SystemTime,
    ) {
        self.modified = modified;
        self.accessed.set(accessed);
        self.created = created;
    }

    pub(crate) fn file_type(&self) -> FileType {
        match &self.kind {
            EntryKind::File(_) => FileType::RegularFile,
            EntryKind::Directory(_) => FileType::Directory,
            EntryKind::Symlink(_) => FileType::SymbolicLink,
        }
    }

    pub(crate) fn as_directory(&self) -> Option<&DirectoryNode> {
        match &self.kind {
            EntryKind::Directory(directory) => Some(directory),
            _ => None,
        }
    }

    pub(crate) fn as_file(&self) -> Option<&FileNode> {
        match &self.kind {
            EntryKind::File(file) => Some(file),
            _ => None,
        }
    }

    pub(crate) fn as_file_mut(&mut self) -> Option<&mut FileNode> {
        match &mut self.kind {
            EntryKind::File(file) => Some(file),
            _ => None,
        }
    }

    pub(crate) fn as_symlink(&self) -> Option<&SymlinkNode> {
        match &self.kind {
            EntryKind::Symlink(link) => Some(link),
            _ => None,
        }
    }

    fn directory(&self) -> &DirectoryNode {
        match &self.kind {
            EntryKind::Directory(directory) => directory,
            // Callers verify the entry kind before treating it as a directory.
            _ => unreachable!(),
        }
    }

    fn directory_mut(&mut self) -> &mut DirectoryNode {
        match &mut self.kind {
            EntryKind::Directory(directory) => directory,
            _ => unreachable!(),
        }
    }

    pub(crate) fn child(&self, key: &str) -> Option<&DirectoryChild> {
        self.directory().children.get(key)
    }

    pub(crate) fn child_or_not_found(
        &self,
        key: &str,
        path: &MemoryPath,
    ) -> Result<&DirectoryChild, ResolveError> {
        self.directory()
            .children
            .get(key)
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))
    }

    /// Inserts a child and bumps the directory's modification time. Returns
    /// `false` (leaving the directory untouched) if the key is taken.
    pub(crate) fn add_child(&mut self, key: String, display_name: String, entry: EntryRef) -> bool {
        let directory = self.directory_mut();
        if directory.children.contains_key(&key) {
            return false;
        }
        directory
            .children
            .insert(key, DirectoryChild { display_name, entry });
        self.touch_modified();
        true
    }

    /// Removes a child and bumps the directory's modification time.
    pub(crate) fn remove_child(&mut self, key: &str) -> Option<DirectoryChild> {
        let removed = self.directory_mut().children.shift_remove(key);
        if removed.is_some() {
            self.touch_modified();
        }
        removed
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.directory().children.is_empty()
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = &DirectoryChild> {
        self.directory().children.values()
    }
}

/// Everything needed to build a new entry: the configured view set, the
/// creation-time principals and umask, the store the content is charged to,
/// and the id well.
pub(crate) struct EntryCreationContext {
    pub(crate) views: AdditionalViews,
    pub(crate) umask: PosixPermissions,
    pub(crate) user: UserPrincipal,
    pub(crate) group: GroupPrincipal,
    pub(crate) store: Arc<FileStoreState>,
    pub(crate) ids: Arc<AtomicU64>,
}

impl EntryCreationContext {
    fn allocate_id(&self) -> u64 {
        self.ids.fetch_add(1, SeqCst)
    }

    pub(crate) fn new_file(&self) -> MemoryEntry {
        MemoryEntry::new(
            self,
            EntryKind::File(FileNode {
                content: FileContent::new(self.store.clone()),
                open_count: 0,
                marked_for_deletion: false,
            }),
        )
    }

    pub(crate) fn new_file_with_content(&self, content: FileContent) -> MemoryEntry {
        MemoryEntry::new(
            self,
            EntryKind::File(FileNode {
                content,
                open_count: 0,
                marked_for_deletion: false,
            }),
        )
    }

    pub(crate) fn new_directory(&self) -> MemoryEntry {
        MemoryEntry::new(
            self,
            EntryKind::Directory(DirectoryNode {
                children: IndexMap::new(),
            }),
        )
    }

    pub(crate) fn new_symlink(&self, target: MemoryPath) -> MemoryEntry {
        MemoryEntry::new(self, EntryKind::Symlink(SymlinkNode { target }))
    }
}
