// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The in-memory file system.
//!
//! [`MemoryFileSystem`] is the operation facade: it parses paths, walks the
//! entry tree under the locking protocol of [`walk`], and applies mutations.
//! Per-entry reader-writer locks are acquired strictly root to leaf, which
//! rules out lock cycles inside one walk. Operations touching two paths
//! (copy, rename) additionally serialize through a file-system-wide ordering
//! lock held in write mode; `delete` holds the same lock in read mode so it
//! cannot interleave with a two-path operation in a way that would change
//! the lock order mid-acquisition. Everything else proceeds with only the
//! per-entry locks, so operations on disjoint subtrees run concurrently.

use bitflags::bitflags;
use hashbrown::HashMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::path::{Arg, ArgSealed, MemoryPath};

pub mod attributes;
pub mod builder;
pub mod channel;
pub mod errors;
pub mod matcher;

mod blocks;
mod entry;
mod walk;

#[cfg(test)]
mod tests;

use attributes::{
    AttributeValue, BasicAttributeView, BasicFileAttributes, DosAttributeView, DosFileAttributes,
    FileAttribute, OwnerAttributeView, PosixAttributeView, PosixFileAttributes, UserAttributeView,
};
use blocks::FileStoreState;
use builder::{Collation, NameTransform};
use channel::{ByteChannel, ChannelFlags};
use entry::{EntryCreationContext, EntryKind, EntryRef, MemoryEntry};
use errors::{
    AccessError, AttributeError, ClosedError, CopyError, CreateError, DeleteError, LookupError,
    OpenError, PatternError, ReadLinkError, ResolveError,
};
use matcher::PathMatcher;
use walk::{LockKind, Locked, NameTrail, SeenLinks};

use attributes::AdditionalViews;

/// Kinds of entries in the tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum FileType {
    RegularFile,
    Directory,
    SymbolicLink,
}

bitflags! {
    /// Options for opening a byte channel.
    ///
    /// With no access option given the channel opens for reading.
    /// `CREATE_NEW` implies `CREATE`; `SYNC`, `DSYNC` and `SPARSE` are
    /// accepted no-ops for an in-memory store.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct OpenOptions: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Every write goes to the end of file; the cursor can not be moved
        /// explicitly.
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        /// Create, failing if the target already exists.
        const CREATE_NEW = 1 << 4;
        /// With write access, set the size to zero on open.
        const TRUNCATE_EXISTING = 1 << 5;
        /// Detach the file from its directory when the channel closes.
        const DELETE_ON_CLOSE = 1 << 6;
        const SPARSE = 1 << 7;
        const SYNC = 1 << 8;
        const DSYNC = 1 << 9;
    }
}

bitflags! {
    /// Access modes accepted by [`MemoryFileSystem::check_access`].
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct AccessModes: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

bitflags! {
    /// Options for [`MemoryFileSystem::copy`] and
    /// [`MemoryFileSystem::rename`].
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct CopyOptions: u32 {
        const REPLACE_EXISTING = 1 << 0;
        const COPY_ATTRIBUTES = 1 << 1;
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum TwoPathOperation {
    Move,
    Copy,
}

/// An in-process, in-memory file system.
///
/// Cloning is cheap and every clone addresses the same tree; the handle is
/// `Send + Sync` and meant to be shared between threads.
#[derive(Clone)]
pub struct MemoryFileSystem {
    pub(crate) state: Arc<FileSystemState>,
}

pub(crate) struct FileSystemState {
    pub(crate) key: String,
    pub(crate) separator: Arc<str>,
    /// Keyed by the lookup-transformed root key. Immutable after
    /// construction.
    pub(crate) roots: HashMap<String, RootDirectory>,
    /// Lookup keys in declared order, for enumeration.
    pub(crate) root_order: Vec<String>,
    pub(crate) cwd: MemoryPath,
    pub(crate) store_transform: Arc<dyn NameTransform>,
    pub(crate) lookup_transform: Arc<dyn NameTransform>,
    pub(crate) collation: Arc<dyn Collation>,
    pub(crate) views: AdditionalViews,
    pub(crate) supported_views: Vec<String>,
    pub(crate) umask: attributes::PosixPermissions,
    pub(crate) default_user: attributes::UserPrincipal,
    pub(crate) default_group: attributes::GroupPrincipal,
    pub(crate) store: Arc<FileStoreState>,
    /// Two-path operations hold this in write mode for their whole
    /// duration; `delete` holds it in read mode.
    pub(crate) ordering: RwLock<()>,
    pub(crate) open: AtomicBool,
    pub(crate) ids: Arc<AtomicU64>,
}

pub(crate) struct RootDirectory {
    pub(crate) display: Arc<str>,
    pub(crate) dir: EntryRef,
}

impl FileSystemState {
    pub(crate) fn check_open(&self) -> Result<(), ClosedError> {
        if self.open.load(SeqCst) {
            Ok(())
        } else {
            Err(ClosedError)
        }
    }

    /// Parses a path string against the configured roots and separator.
    /// Parsing is total: a string matching no root yields a relative path.
    pub(crate) fn parse_str(&self, path: &str) -> MemoryPath {
        for root in self.roots.values() {
            let root_len = root.display.len();
            if path.len() >= root_len
                && path.is_char_boundary(root_len)
                && self.lookup_transform.transform(&path[..root_len])
                    == self.lookup_transform.transform(&root.display)
            {
                let elements = split_elements(&path[root_len..], &self.separator);
                return MemoryPath::absolute(root.display.clone(), self.separator.clone(), elements)
                    .normalized();
            }
        }
        MemoryPath::relative(
            self.separator.clone(),
            split_elements(path, &self.separator),
        )
    }

    /// Resolves relative paths against the working directory and normalizes.
    pub(crate) fn absolute(&self, path: MemoryPath) -> MemoryPath {
        if path.is_absolute() {
            path.normalized()
        } else {
            self.cwd.join_path(&path).normalized()
        }
    }

    pub(crate) fn creation_context(&self) -> EntryCreationContext {
        EntryCreationContext {
            views: self.views,
            umask: self.umask,
            user: self.default_user.clone(),
            group: self.default_group.clone(),
            store: self.store.clone(),
            ids: self.ids.clone(),
        }
    }

    /// Orders two absolute paths with the configured collation: root, then
    /// element by element, with a proper prefix ordering first.
    pub(crate) fn compare_paths(&self, left: &MemoryPath, right: &MemoryPath) -> Ordering {
        let roots = self
            .collation
            .compare(left.root().unwrap_or(""), right.root().unwrap_or(""));
        if roots != Ordering::Equal {
            return roots;
        }
        for (a, b) in left.elements().iter().zip(right.elements()) {
            let ordering = self.collation.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.elements().len().cmp(&right.elements().len())
    }

    /// Whether `prefix` addresses an ancestor-or-self of `path`, comparing
    /// by lookup keys.
    fn is_key_prefix(&self, prefix: &MemoryPath, path: &MemoryPath) -> bool {
        let roots_match = match (prefix.root(), path.root()) {
            (Some(a), Some(b)) => {
                self.lookup_transform.transform(a) == self.lookup_transform.transform(b)
            }
            _ => false,
        };
        roots_match
            && prefix.elements().len() <= path.elements().len()
            && prefix
                .elements()
                .iter()
                .zip(path.elements())
                .all(|(a, b)| {
                    self.lookup_transform.transform(a) == self.lookup_transform.transform(b)
                })
    }
}

fn split_elements(path: &str, separator: &str) -> Vec<String> {
    path.split(separator)
        .filter(|element| !element.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parents of the two endpoints of a copy or rename, write locked. One
/// guard serves both roles when the endpoints share their parent.
enum Parents<'a> {
    Same(&'a mut MemoryEntry),
    Distinct {
        source: &'a mut MemoryEntry,
        target: &'a mut MemoryEntry,
    },
}

impl Parents<'_> {
    fn source(&mut self) -> &mut MemoryEntry {
        match self {
            Parents::Same(parent) => parent,
            Parents::Distinct { source, .. } => source,
        }
    }

    fn target(&mut self) -> &mut MemoryEntry {
        match self {
            Parents::Same(parent) => parent,
            Parents::Distinct { target, .. } => target,
        }
    }
}

impl MemoryFileSystem {
    fn arg_to_path(&self, path: impl Arg) -> MemoryPath {
        ArgSealed::to_path(&path, self)
    }

    pub(crate) fn parse_path(&self, path: &str) -> MemoryPath {
        self.state.parse_str(path)
    }

    /// The key identifying this file system; cross-file-system operations
    /// order their lock acquisition by it.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.state.key
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.state.separator
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.open.load(SeqCst)
    }

    /// Closes the file system; closing twice is explicitly allowed. Every
    /// other operation fails with [`ClosedError`] afterwards.
    pub fn close(&self) {
        self.state.open.store(false, SeqCst);
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.state.store.read_only
    }

    /// Joins the given strings with the separator and parses the result.
    #[must_use]
    pub fn get_path(&self, first: &str, more: &[&str]) -> MemoryPath {
        if more.is_empty() {
            return self.state.parse_str(first);
        }
        let mut joined = first.to_string();
        for element in more {
            joined.push_str(&self.state.separator);
            joined.push_str(element);
        }
        self.state.parse_str(&joined)
    }

    /// The root directories, in the order they were declared.
    #[must_use]
    pub fn get_root_directories(&self) -> Vec<MemoryPath> {
        self.state
            .root_order
            .iter()
            .map(|key| {
                let root = &self.state.roots[key];
                MemoryPath::absolute(root.display.clone(), self.state.separator.clone(), Vec::new())
            })
            .collect()
    }

    #[must_use]
    pub fn get_file_store(&self) -> MemoryFileStore {
        MemoryFileStore {
            state: self.state.store.clone(),
        }
    }

    /// The names of the configured attribute views; always contains
    /// `"basic"`.
    #[must_use]
    pub fn supported_file_attribute_views(&self) -> &[String] {
        &self.state.supported_views
    }

    // ------------------------------------------------------------------
    // creation

    pub fn create_directory(&self, path: impl Arg) -> Result<(), CreateError> {
        self.create_directory_with_attributes(path, &[])
    }

    pub fn create_directory_with_attributes(
        &self,
        path: impl Arg,
        attrs: &[FileAttribute],
    ) -> Result<(), CreateError> {
        let path = self.arg_to_path(path);
        self.create_entry(&path, attrs, EntryCreationContext::new_directory)
    }

    pub fn create_symbolic_link(
        &self,
        link: impl Arg,
        target: impl Arg,
    ) -> Result<(), CreateError> {
        self.create_symbolic_link_with_attributes(link, target, &[])
    }

    pub fn create_symbolic_link_with_attributes(
        &self,
        link: impl Arg,
        target: impl Arg,
        attrs: &[FileAttribute],
    ) -> Result<(), CreateError> {
        let link = self.arg_to_path(link);
        let target = self.arg_to_path(target);
        self.create_entry(&link, attrs, move |context| {
            context.new_symlink(target.clone())
        })
    }

    /// Creates an empty regular file, failing if the path already exists.
    pub fn create_file(&self, path: impl Arg) -> Result<(), OpenError> {
        let channel = self.new_byte_channel(path, OpenOptions::WRITE | OpenOptions::CREATE_NEW)?;
        drop(channel);
        Ok(())
    }

    fn create_entry(
        &self,
        path: &MemoryPath,
        attrs: &[FileAttribute],
        make: impl FnOnce(&EntryCreationContext) -> MemoryEntry,
    ) -> Result<(), CreateError> {
        self.state.check_open()?;
        if self.state.store.read_only {
            return Err(CreateError::ReadOnly);
        }
        let absolute = self.state.absolute(path.clone());
        if absolute.elements().is_empty() {
            // The roots always exist.
            return Err(CreateError::AlreadyExists(absolute.to_string()));
        }
        let context = self.state.creation_context();
        let mut make = Some(make);
        self.state.locked_parent(&absolute, |_, parent, raw_name| {
            let display = self.state.store_transform.transform(raw_name);
            let key = self.state.lookup_transform.transform(&display);
            if parent.child(&key).is_some() {
                return Err(CreateError::AlreadyExists(absolute.to_string()));
            }
            let make = make.take().expect("terminal callback runs once");
            let mut entry = make(&context);
            attributes::apply_initial_attributes(&mut entry, attrs)?;
            let inserted = parent.add_child(key, display, Arc::new(RwLock::new(entry)));
            debug_assert!(inserted);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // deletion

    /// Removes an entry. Non-empty directories and open files are refused;
    /// the whole operation holds the ordering lock in read mode so it can
    /// not interleave with a two-path operation.
    pub fn delete(&self, path: impl Arg) -> Result<(), DeleteError> {
        self.state.check_open()?;
        if self.state.store.read_only {
            return Err(DeleteError::ReadOnly);
        }
        let absolute = self.state.absolute(self.arg_to_path(path));
        let _ordering = self.state.ordering.read();
        if absolute.elements().is_empty() {
            return Err(DeleteError::Busy(absolute.to_string()));
        }
        self.state.locked_parent(&absolute, |_, parent, raw_name| {
            let key = self.state.lookup_transform.transform(raw_name);
            let child = parent.child_or_not_found(&key, &absolute)?.entry.clone();
            {
                let mut guard = child.write();
                if guard.as_directory().is_some() && guard.has_children() {
                    return Err(DeleteError::NotEmpty(absolute.to_string()));
                }
                if let Some(file) = guard.as_file_mut() {
                    if file.open_count > 0 {
                        return Err(DeleteError::Busy(absolute.to_string()));
                    }
                    file.marked_for_deletion = true;
                    file.content.reclaim();
                }
            }
            parent.remove_child(&key);
            Ok(())
        })
    }

    /// Best-effort removal for `DELETE_ON_CLOSE`: detaches the file if it is
    /// still reachable at its open path and marks it for reclamation.
    pub(crate) fn detach_on_close(&self, path: &MemoryPath, file: &EntryRef) {
        if self.state.check_open().is_err() {
            return;
        }
        let _ordering = self.state.ordering.read();
        let detached: Result<(), ResolveError> =
            self.state.locked_parent(path, |_, parent, raw_name| {
                let key = self.state.lookup_transform.transform(raw_name);
                let still_there = parent
                    .child(&key)
                    .is_some_and(|child| Arc::ptr_eq(&child.entry, file));
                if still_there {
                    let removed = parent.remove_child(&key).expect("checked above");
                    let mut guard = removed.entry.write();
                    if let Some(node) = guard.as_file_mut() {
                        node.marked_for_deletion = true;
                    }
                }
                Ok(())
            });
        // The path may have been deleted or moved since the channel opened;
        // nothing to detach then.
        drop(detached);
    }

    // ------------------------------------------------------------------
    // channels and streams

    pub fn new_byte_channel(
        &self,
        path: impl Arg,
        options: OpenOptions,
    ) -> Result<ByteChannel, OpenError> {
        self.new_byte_channel_with_attributes(path, options, &[])
    }

    pub fn new_byte_channel_with_attributes(
        &self,
        path: impl Arg,
        options: OpenOptions,
        attrs: &[FileAttribute],
    ) -> Result<ByteChannel, OpenError> {
        self.state.check_open()?;
        let unknown = options.bits() & !OpenOptions::all().bits();
        if unknown != 0 {
            return Err(OpenError::UnsupportedOption(unknown));
        }
        let writable = options.intersects(OpenOptions::WRITE | OpenOptions::APPEND);
        let readable = options.contains(OpenOptions::READ) || !writable;
        if options.contains(OpenOptions::APPEND) && options.contains(OpenOptions::READ) {
            return Err(OpenError::InvalidCombination("READ + APPEND"));
        }
        if options.contains(OpenOptions::APPEND)
            && options.contains(OpenOptions::TRUNCATE_EXISTING)
        {
            return Err(OpenError::InvalidCombination("APPEND + TRUNCATE_EXISTING"));
        }
        let create_new = options.contains(OpenOptions::CREATE_NEW);
        let create = create_new || options.contains(OpenOptions::CREATE);
        let delete_on_close = options.contains(OpenOptions::DELETE_ON_CLOSE);
        if self.state.store.read_only && (writable || create || delete_on_close) {
            return Err(OpenError::ReadOnly);
        }

        let absolute = self.state.absolute(self.arg_to_path(path));
        if absolute.elements().is_empty() {
            return Err(OpenError::IsDirectory(absolute.to_string()));
        }

        enum Opened {
            Ready(EntryRef),
            Chase(MemoryPath),
        }

        let mut current = absolute;
        let mut seen = SeenLinks::default();
        let file = loop {
            let resolved = self.state.locked_parent(&current, |_, parent, raw_name| {
                let lookup_key = self.state.lookup_transform.transform(raw_name);
                let existing = parent.child(&lookup_key).map(|child| child.entry.clone());
                match existing {
                    None => {
                        if !create {
                            return Err(OpenError::Resolve(ResolveError::NotFound(
                                current.to_string(),
                            )));
                        }
                        let context = self.state.creation_context();
                        let mut entry = context.new_file();
                        attributes::apply_initial_attributes(&mut entry, attrs)?;
                        let file = entry.as_file_mut().expect("created as a file");
                        file.open_count = 1;
                        let display = self.state.store_transform.transform(raw_name);
                        let key = self.state.lookup_transform.transform(&display);
                        let entry = Arc::new(RwLock::new(entry));
                        if !parent.add_child(key, display, entry.clone()) {
                            // The store transform mapped the name onto an
                            // existing sibling's key.
                            return Err(OpenError::AlreadyExists(current.to_string()));
                        }
                        Ok(Opened::Ready(entry))
                    }
                    Some(child) => {
                        if create_new {
                            return Err(OpenError::AlreadyExists(current.to_string()));
                        }
                        let mut guard = child.write();
                        if guard.as_symlink().is_some() {
                            if !seen.insert(guard.id()) {
                                return Err(OpenError::Resolve(ResolveError::Loop(
                                    current.to_string(),
                                )));
                            }
                            let link = guard.as_symlink().expect("checked above");
                            let depth = current.elements().len() - 1;
                            return Ok(Opened::Chase(current.rebase_link(depth, &link.target)));
                        }
                        if guard.as_directory().is_some() {
                            return Err(OpenError::IsDirectory(current.to_string()));
                        }
                        let file = guard.as_file_mut().expect("remaining kind");
                        let truncate = writable && options.contains(OpenOptions::TRUNCATE_EXISTING);
                        if truncate {
                            file.content.truncate(0);
                        }
                        file.open_count += 1;
                        if truncate {
                            guard.touch_modified();
                        }
                        drop(guard);
                        Ok(Opened::Ready(child))
                    }
                }
            })?;
            match resolved {
                Opened::Ready(file) => break file,
                Opened::Chase(next) => current = next,
            }
        };

        Ok(ByteChannel::new(
            self.clone(),
            file,
            current,
            ChannelFlags {
                readable,
                writable,
                append: options.contains(OpenOptions::APPEND),
                delete_on_close,
            },
        ))
    }

    /// A channel opened for reading; with [`std::io::Read`] this is the
    /// input stream over the file.
    pub fn new_input_stream(&self, path: impl Arg) -> Result<ByteChannel, OpenError> {
        self.new_byte_channel(path, OpenOptions::READ)
    }

    /// A channel opened with `WRITE | CREATE | TRUNCATE_EXISTING`; with
    /// [`std::io::Write`] this is the output stream over the file.
    pub fn new_output_stream(&self, path: impl Arg) -> Result<ByteChannel, OpenError> {
        self.new_byte_channel(
            path,
            OpenOptions::WRITE | OpenOptions::CREATE | OpenOptions::TRUNCATE_EXISTING,
        )
    }

    // ------------------------------------------------------------------
    // attributes

    /// Reads attributes by a `"view:attribute,..."` specification; the view
    /// defaults to `basic` and `*` selects every attribute of the view.
    pub fn read_attributes(
        &self,
        path: impl Arg,
        spec: &str,
        follow_links: bool,
    ) -> Result<HashMap<String, AttributeValue>, AttributeError> {
        self.state.check_open()?;
        let (view, names) = attributes::split_attribute_spec(spec);
        self.require_view(view)?;
        let absolute = self.state.absolute(self.arg_to_path(path));
        self.state.locked_entry(
            &absolute,
            follow_links,
            LockKind::Read,
            |_, locked| attributes::read_attributes(locked.entry(), view, names),
            None,
        )
    }

    /// Sets one attribute by its `"view:attribute"` name.
    pub fn set_attribute(
        &self,
        path: impl Arg,
        spec: &str,
        value: AttributeValue,
        follow_links: bool,
    ) -> Result<(), AttributeError> {
        self.state.check_open()?;
        if self.state.store.read_only {
            return Err(AttributeError::ReadOnly);
        }
        let (view, name) = attributes::split_attribute_spec(spec);
        self.require_view(view)?;
        let absolute = self.state.absolute(self.arg_to_path(path));
        self.state.locked_entry(
            &absolute,
            follow_links,
            LockKind::Write,
            |_, locked| {
                let Locked::Write(entry) = locked else {
                    unreachable!()
                };
                attributes::set_attribute(entry, view, name, value.clone())
            },
            None,
        )
    }

    pub fn read_basic_attributes(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<BasicFileAttributes, AttributeError> {
        let path = self.arg_to_path(path);
        self.with_entry_read(&path, follow_links, |entry| {
            Ok(attributes::basic_attributes(entry))
        })
    }

    pub fn read_dos_attributes(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<DosFileAttributes, AttributeError> {
        let path = self.arg_to_path(path);
        self.with_entry_read(&path, follow_links, attributes::dos_attributes)
    }

    pub fn read_posix_attributes(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<PosixFileAttributes, AttributeError> {
        let path = self.arg_to_path(path);
        self.with_entry_read(&path, follow_links, attributes::posix_attributes)
    }

    /// A handle on the *basic* view of `path`; always available.
    pub fn basic_view(&self, path: impl Arg, follow_links: bool) -> BasicAttributeView {
        BasicAttributeView {
            fs: self.clone(),
            path: self.arg_to_path(path),
            follow_links,
        }
    }

    pub fn dos_view(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<DosAttributeView, AttributeError> {
        self.require_view(attributes::DOS)?;
        Ok(DosAttributeView {
            fs: self.clone(),
            path: self.arg_to_path(path),
            follow_links,
        })
    }

    pub fn owner_view(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<OwnerAttributeView, AttributeError> {
        self.require_view(attributes::OWNER)?;
        Ok(OwnerAttributeView {
            fs: self.clone(),
            path: self.arg_to_path(path),
            follow_links,
        })
    }

    pub fn posix_view(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<PosixAttributeView, AttributeError> {
        self.require_view(attributes::POSIX)?;
        Ok(PosixAttributeView {
            fs: self.clone(),
            path: self.arg_to_path(path),
            follow_links,
        })
    }

    pub fn user_view(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<UserAttributeView, AttributeError> {
        self.require_view(attributes::USER)?;
        Ok(UserAttributeView {
            fs: self.clone(),
            path: self.arg_to_path(path),
            follow_links,
        })
    }

    fn require_view(&self, view: &str) -> Result<(), AttributeError> {
        if self.state.supported_views.iter().any(|name| name == view) {
            Ok(())
        } else {
            Err(AttributeError::ViewNotSupported(view.to_string()))
        }
    }

    pub(crate) fn with_entry_read<R>(
        &self,
        path: &MemoryPath,
        follow_links: bool,
        f: impl FnOnce(&MemoryEntry) -> Result<R, AttributeError>,
    ) -> Result<R, AttributeError> {
        self.state.check_open()?;
        let absolute = self.state.absolute(path.clone());
        let mut f = Some(f);
        self.state.locked_entry(
            &absolute,
            follow_links,
            LockKind::Read,
            move |_, locked| {
                let f = f.take().expect("terminal callback runs once");
                f(locked.entry())
            },
            None,
        )
    }

    pub(crate) fn with_entry_write<R>(
        &self,
        path: &MemoryPath,
        follow_links: bool,
        f: impl FnOnce(&mut MemoryEntry) -> Result<R, AttributeError>,
    ) -> Result<R, AttributeError> {
        self.state.check_open()?;
        if self.state.store.read_only {
            return Err(AttributeError::ReadOnly);
        }
        let absolute = self.state.absolute(path.clone());
        let mut f = Some(f);
        self.state.locked_entry(
            &absolute,
            follow_links,
            LockKind::Write,
            move |_, locked| {
                let Locked::Write(entry) = locked else {
                    unreachable!()
                };
                let f = f.take().expect("terminal callback runs once");
                f(entry)
            },
            None,
        )
    }

    // ------------------------------------------------------------------
    // lookups

    /// Checks that the entry exists and that the requested access modes are
    /// supported. Mode bits outside read, write and execute are rejected.
    pub fn check_access(&self, path: impl Arg, modes: AccessModes) -> Result<(), AccessError> {
        self.state.check_open()?;
        let unknown = modes.bits() & !AccessModes::all().bits();
        if unknown != 0 {
            return Err(AccessError::UnsupportedMode(unknown));
        }
        let absolute = self.state.absolute(self.arg_to_path(path));
        self.state.locked_entry(
            &absolute,
            true,
            LockKind::Read,
            |_, locked| {
                locked.entry().touch_accessed();
                Ok(())
            },
            None,
        )
    }

    /// Whether an entry exists at `path`, following symbolic links.
    #[must_use]
    pub fn exists(&self, path: impl Arg) -> bool {
        if self.state.check_open().is_err() {
            return false;
        }
        let absolute = self.state.absolute(self.arg_to_path(path));
        let resolved: Result<(), ResolveError> =
            self.state
                .locked_entry(&absolute, true, LockKind::Read, |_, _| Ok(()), None);
        resolved.is_ok()
    }

    /// The absolute, normalized path with every element replaced by its
    /// stored display name, expanding symbolic links when asked to.
    pub fn to_real_path(
        &self,
        path: impl Arg,
        follow_links: bool,
    ) -> Result<MemoryPath, LookupError> {
        self.state.check_open()?;
        let absolute = self.state.absolute(self.arg_to_path(path));
        let mut trail = NameTrail::default();
        let resolved: Result<(), LookupError> = self.state.locked_entry(
            &absolute,
            follow_links,
            LockKind::Read,
            |_, _| Ok(()),
            Some(&mut trail),
        );
        resolved?;
        let root = trail.root.expect("resolution recorded the root");
        Ok(MemoryPath::absolute(
            root,
            self.state.separator.clone(),
            trail.names,
        ))
    }

    /// The target recorded on a symbolic link, without following it.
    pub fn read_symbolic_link(&self, path: impl Arg) -> Result<MemoryPath, ReadLinkError> {
        self.state.check_open()?;
        let absolute = self.state.absolute(self.arg_to_path(path));
        if absolute.elements().is_empty() {
            return Err(ReadLinkError::NotALink(absolute.to_string()));
        }
        self.state.locked_parent(&absolute, |_, parent, raw_name| {
            let key = self.state.lookup_transform.transform(raw_name);
            let child = parent.child_or_not_found(&key, &absolute)?;
            let guard = child.entry.read();
            match guard.as_symlink() {
                Some(link) => Ok(link.target.clone()),
                None => Err(ReadLinkError::NotALink(absolute.to_string())),
            }
        })
    }

    /// On a posix file system a leading dot makes an entry hidden; on a dos
    /// one the hidden flag does.
    pub fn is_hidden(&self, path: impl Arg) -> Result<bool, LookupError> {
        self.state.check_open()?;
        let path = self.arg_to_path(path);
        if self.state.views.contains(AdditionalViews::POSIX) {
            let real = self.to_real_path(path, false)?;
            return Ok(real
                .file_name()
                .is_some_and(|name| name.starts_with('.')));
        }
        if self.state.views.contains(AdditionalViews::DOS) {
            let absolute = self.state.absolute(path);
            return self.state.locked_entry(
                &absolute,
                false,
                LockKind::Read,
                |_, locked| {
                    let hidden = locked
                        .entry()
                        .attributes
                        .dos
                        .is_some_and(|flags| flags.contains(attributes::DosFlags::HIDDEN));
                    Ok(hidden)
                },
                None,
            );
        }
        Ok(false)
    }

    /// A snapshot of the directory's child paths taken under its read lock;
    /// iteration holds no lock and applies `filter` lazily.
    pub fn new_directory_stream<F>(
        &self,
        path: impl Arg,
        filter: F,
    ) -> Result<DirectoryStream<F>, LookupError>
    where
        F: FnMut(&MemoryPath) -> bool,
    {
        self.state.check_open()?;
        let absolute = self.state.absolute(self.arg_to_path(path));
        let names = self.state.locked_entry(
            &absolute,
            true,
            LockKind::Read,
            |_, locked| {
                let entry = locked.entry();
                if entry.as_directory().is_none() {
                    return Err(LookupError::Resolve(ResolveError::NotADirectory(
                        absolute.to_string(),
                    )));
                }
                entry.touch_accessed();
                Ok(entry
                    .children()
                    .map(|child| child.display_name.clone())
                    .collect::<Vec<_>>())
            },
            None,
        )?;
        Ok(DirectoryStream {
            parent: absolute,
            names: names.into_iter(),
            filter,
        })
    }

    /// [`new_directory_stream`](Self::new_directory_stream) without a filter.
    pub fn read_dir(
        &self,
        path: impl Arg,
    ) -> Result<DirectoryStream<fn(&MemoryPath) -> bool>, LookupError> {
        fn accept_all(_: &MemoryPath) -> bool {
            true
        }
        self.new_directory_stream(path, accept_all as fn(&MemoryPath) -> bool)
    }

    /// Compiles a `"syntax:pattern"` matcher; `glob` and `regex` syntaxes
    /// are supported.
    pub fn get_path_matcher(&self, syntax_and_pattern: &str) -> Result<PathMatcher, PatternError> {
        self.state.check_open()?;
        matcher::parse(syntax_and_pattern, &self.state.separator)
    }

    // ------------------------------------------------------------------
    // two-path operations

    /// Copies `source` to `target`. Directories are copied empty; recursive
    /// copies are the caller's job. Symbolic links are copied as links.
    pub fn copy(
        &self,
        source: impl Arg,
        target: impl Arg,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        self.copy_or_move(source, target, TwoPathOperation::Copy, options)
    }

    /// Moves `source` to `target`. A rename is atomic: both parents are held
    /// for the removal and the insertion.
    pub fn rename(
        &self,
        source: impl Arg,
        target: impl Arg,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        self.copy_or_move(source, target, TwoPathOperation::Move, options)
    }

    /// Copies `source` in this file system to `target` in `target_fs`.
    pub fn copy_to(
        &self,
        source: impl Arg,
        target_fs: &MemoryFileSystem,
        target: impl Arg,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        self.copy_or_move_across(target_fs, source, target, TwoPathOperation::Copy, options)
    }

    /// Moves `source` in this file system to `target` in `target_fs`, as a
    /// deep copy (attributes preserved) followed by removal of the source.
    pub fn move_to(
        &self,
        source: impl Arg,
        target_fs: &MemoryFileSystem,
        target: impl Arg,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        self.copy_or_move_across(target_fs, source, target, TwoPathOperation::Move, options)
    }

    fn copy_or_move(
        &self,
        source: impl Arg,
        target: impl Arg,
        operation: TwoPathOperation,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        self.state.check_open()?;
        if self.state.store.read_only {
            return Err(CopyError::ReadOnly);
        }
        let source = self.state.absolute(self.arg_to_path(source));
        let target = self.state.absolute(self.arg_to_path(target));
        if source.elements().is_empty() || target.elements().is_empty() {
            return Err(CopyError::RootNotAllowed);
        }
        let source_parent = source.parent().expect("has a final element");
        let target_parent = target.parent().expect("has a final element");
        if operation == TwoPathOperation::Move && self.state.is_key_prefix(&source, &target_parent)
        {
            return Err(CopyError::IntoSelf);
        }

        // Freeze the ordering relation for the whole acquisition + mutation.
        let _ordering = self.state.ordering.write();

        let order = self
            .state
            .compare_paths(&source_parent, &target_parent)
            .then_with(|| {
                self.state.collation.compare(
                    source.file_name().expect("has a final element"),
                    target.file_name().expect("has a final element"),
                )
            });

        let source_parent_ref = self.state.resolve_directory(&source_parent)?;
        let target_parent_ref = self.state.resolve_directory(&target_parent)?;

        if Arc::ptr_eq(&source_parent_ref, &target_parent_ref) {
            let mut guard = source_parent_ref.write();
            self.apply_two_path(
                Parents::Same(&mut guard),
                &source,
                &target,
                operation,
                options,
            )
        } else if order == Ordering::Greater {
            let mut target_guard = target_parent_ref.write();
            let mut source_guard = source_parent_ref.write();
            self.apply_two_path(
                Parents::Distinct {
                    source: &mut source_guard,
                    target: &mut target_guard,
                },
                &source,
                &target,
                operation,
                options,
            )
        } else {
            let mut source_guard = source_parent_ref.write();
            let mut target_guard = target_parent_ref.write();
            self.apply_two_path(
                Parents::Distinct {
                    source: &mut source_guard,
                    target: &mut target_guard,
                },
                &source,
                &target,
                operation,
                options,
            )
        }
    }

    fn apply_two_path(
        &self,
        mut parents: Parents<'_>,
        source: &MemoryPath,
        target: &MemoryPath,
        operation: TwoPathOperation,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        let state = &self.state;
        let source_key = state
            .lookup_transform
            .transform(source.file_name().expect("has a final element"));
        let target_raw = target.file_name().expect("has a final element");
        let target_lookup_key = state.lookup_transform.transform(target_raw);
        let target_display = state.store_transform.transform(target_raw);
        let target_insert_key = state.lookup_transform.transform(&target_display);

        let source_entry = parents
            .source()
            .child_or_not_found(&source_key, source)?
            .entry
            .clone();
        let existing_target = parents
            .target()
            .child(&target_lookup_key)
            .map(|child| child.entry.clone());

        if let Some(existing) = existing_target {
            if Arc::ptr_eq(&source_entry, &existing) {
                // Source and target address the same entry.
                return Ok(());
            }
            if !options.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(CopyError::AlreadyExists(target.to_string()));
            }
            {
                let guard = existing.read();
                if guard.as_directory().is_some() && guard.has_children() {
                    return Err(CopyError::NotEmpty(target.to_string()));
                }
            }
            parents.target().remove_child(&target_lookup_key);
        }

        match operation {
            TwoPathOperation::Move => {
                let removed = parents
                    .source()
                    .remove_child(&source_key)
                    .expect("resolved under the parent's lock");
                let inserted =
                    parents
                        .target()
                        .add_child(target_insert_key, target_display, removed.entry);
                debug_assert!(inserted);
            }
            TwoPathOperation::Copy => {
                let context = state.creation_context();
                let copy = {
                    let guard = source_entry.read();
                    let mut copy = match &guard.kind {
                        EntryKind::File(file) => context
                            .new_file_with_content(file.content.duplicate(state.store.clone())?),
                        EntryKind::Directory(_) => context.new_directory(),
                        EntryKind::Symlink(link) => context.new_symlink(link.target.clone()),
                    };
                    if options.contains(CopyOptions::COPY_ATTRIBUTES) {
                        attributes::copy_attributes(&guard, &mut copy);
                    }
                    copy
                };
                let inserted = parents.target().add_child(
                    target_insert_key,
                    target_display,
                    Arc::new(RwLock::new(copy)),
                );
                debug_assert!(inserted);
            }
        }
        Ok(())
    }

    fn copy_or_move_across(
        &self,
        other: &MemoryFileSystem,
        source: impl Arg,
        target: impl Arg,
        operation: TwoPathOperation,
        options: CopyOptions,
    ) -> Result<(), CopyError> {
        if Arc::ptr_eq(&self.state, &other.state) {
            return self.copy_or_move(source, target, operation, options);
        }
        self.state.check_open()?;
        other.state.check_open()?;
        if other.state.store.read_only
            || (operation == TwoPathOperation::Move && self.state.store.read_only)
        {
            return Err(CopyError::ReadOnly);
        }
        let source = self.state.absolute(self.arg_to_path(source));
        let target = other.state.absolute(other.arg_to_path(target));
        if source.elements().is_empty() || target.elements().is_empty() {
            return Err(CopyError::RootNotAllowed);
        }
        let source_parent = source.parent().expect("has a final element");
        let target_parent = target.parent().expect("has a final element");

        // Across file systems the acquisition order is the key order; the
        // address breaks the (discouraged) tie of two instances sharing a
        // key.
        let self_first = (self.state.key.as_str(), Arc::as_ptr(&self.state))
            <= (other.state.key.as_str(), Arc::as_ptr(&other.state));
        let _orderings = if self_first {
            (self.state.ordering.write(), other.state.ordering.write())
        } else {
            (other.state.ordering.write(), self.state.ordering.write())
        };

        let source_parent_ref = self.state.resolve_directory(&source_parent)?;
        let target_parent_ref = other.state.resolve_directory(&target_parent)?;

        let (mut first_guard, mut second_guard) = if self_first {
            (source_parent_ref.write(), target_parent_ref.write())
        } else {
            (target_parent_ref.write(), source_parent_ref.write())
        };
        let (source_dir, target_dir) = if self_first {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        let source_key = self
            .state
            .lookup_transform
            .transform(source.file_name().expect("has a final element"));
        let target_raw = target.file_name().expect("has a final element");
        let target_lookup_key = other.state.lookup_transform.transform(target_raw);
        let target_display = other.state.store_transform.transform(target_raw);
        let target_insert_key = other.state.lookup_transform.transform(&target_display);

        let source_entry = source_dir
            .child_or_not_found(&source_key, &source)?
            .entry
            .clone();
        if let Some(existing) = target_dir
            .child(&target_lookup_key)
            .map(|child| child.entry.clone())
        {
            if !options.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(CopyError::AlreadyExists(target.to_string()));
            }
            {
                let guard = existing.read();
                if guard.as_directory().is_some() && guard.has_children() {
                    return Err(CopyError::NotEmpty(target.to_string()));
                }
            }
            target_dir.remove_child(&target_lookup_key);
        }

        let context = other.state.creation_context();
        let copy = {
            let guard = source_entry.read();
            if operation == TwoPathOperation::Move
                && guard.as_directory().is_some()
                && guard.has_children()
            {
                // A cross-file-system move can not carry children along.
                return Err(CopyError::NotEmpty(source.to_string()));
            }
            let mut copy = match &guard.kind {
                EntryKind::File(file) => context
                    .new_file_with_content(file.content.duplicate(other.state.store.clone())?),
                EntryKind::Directory(_) => context.new_directory(),
                EntryKind::Symlink(link) => context.new_symlink(link.target.clone()),
            };
            if operation == TwoPathOperation::Move || options.contains(CopyOptions::COPY_ATTRIBUTES)
            {
                attributes::copy_attributes(&guard, &mut copy);
            }
            copy
        };
        let inserted = target_dir.add_child(
            target_insert_key,
            target_display,
            Arc::new(RwLock::new(copy)),
        );
        debug_assert!(inserted);
        if operation == TwoPathOperation::Move {
            source_dir.remove_child(&source_key);
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryFileSystem[{}]", self.state.key)
    }
}

/// A lazily filtered snapshot of a directory's child paths.
///
/// The snapshot is taken at stream construction under the directory's read
/// lock; iteration holds no lock, so entries created or removed afterwards
/// may or may not be reflected. Re-creating the stream re-snapshots.
pub struct DirectoryStream<F> {
    parent: MemoryPath,
    names: std::vec::IntoIter<String>,
    filter: F,
}

impl<F: FnMut(&MemoryPath) -> bool> Iterator for DirectoryStream<F> {
    type Item = MemoryPath;

    fn next(&mut self) -> Option<MemoryPath> {
        loop {
            let name = self.names.next()?;
            let path = self.parent.join(name);
            if (self.filter)(&path) {
                return Some(path);
            }
        }
    }
}

/// The backing store of a file system: block size, read-only flag and space
/// accounting, including the optional byte ceiling.
pub struct MemoryFileStore {
    state: Arc<FileStoreState>,
}

impl MemoryFileStore {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.state.block_size
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.state.read_only
    }

    /// The configured byte ceiling, if any.
    #[must_use]
    pub fn total_space(&self) -> Option<u64> {
        self.state.capacity
    }

    #[must_use]
    pub fn used_space(&self) -> u64 {
        self.state.allocated()
    }

    #[must_use]
    pub fn available_space(&self) -> Option<u64> {
        self.state
            .capacity
            .map(|capacity| capacity.saturating_sub(self.state.allocated()))
    }
}
