// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Tree traversal and the locking protocol.
//!
//! A walk acquires the root's read lock and then one lock per path element,
//! strictly root to leaf: read locks on ancestors, and on the terminal entry
//! a read or write lock depending on what the operation asked for. The lock
//! mode is decided at acquisition time; there is no upgrading. Guards live
//! in the recursion frames, so an error (or a symlink restart) unwinds the
//! stack and releases every lock in reverse acquisition order.
//!
//! Symbolic links: intermediate links are always chased; a terminal link is
//! chased only when the caller asked to follow links. Chasing releases all
//! held locks first, then restarts the walk on the rebased target path. The
//! set of link ids seen so far survives restarts, which is what turns a
//! cycle into an error instead of an endless loop.
//!
//! Ancestor read locks use `read_recursive`: a thread that already holds a
//! read lock on an entry (e.g. the two nested walks of overlapping paths)
//! must not be blocked behind a queued writer, or it would deadlock with
//! that writer.

use hashbrown::HashSet;
use std::sync::Arc;

use crate::path::MemoryPath;

use super::entry::{EntryRef, MemoryEntry};
use super::errors::ResolveError;
use super::{FileSystemState, RootDirectory};

#[derive(Copy, Clone, Eq, PartialEq)]
pub(crate) enum LockKind {
    Read,
    Write,
}

/// The terminal entry of a walk, borrowed under the lock the caller asked
/// for.
pub(crate) enum Locked<'a> {
    Read(&'a MemoryEntry),
    Write(&'a mut MemoryEntry),
}

impl Locked<'_> {
    pub(crate) fn entry(&self) -> &MemoryEntry {
        match self {
            Locked::Read(entry) => entry,
            Locked::Write(entry) => entry,
        }
    }
}

/// Ids of the symbolic links already followed during one resolution.
pub(crate) type SeenLinks = HashSet<u64>;

/// Accumulates the stored display names of the walked elements, for
/// real-path construction.
#[derive(Default)]
pub(crate) struct NameTrail {
    pub(crate) root: Option<Arc<str>>,
    pub(crate) names: Vec<String>,
}

enum Walked<R> {
    Done(R),
    /// All locks have been released; resolution continues on this path.
    Restart(MemoryPath),
}

impl FileSystemState {
    /// Resolves `path` and invokes `terminal` on the terminal entry while it
    /// is locked according to `kind`. Ancestors are read locked for the
    /// duration of the call.
    pub(crate) fn locked_entry<R, E>(
        &self,
        path: &MemoryPath,
        follow_links: bool,
        kind: LockKind,
        mut terminal: impl FnMut(&EntryRef, Locked<'_>) -> Result<R, E>,
        mut trail: Option<&mut NameTrail>,
    ) -> Result<R, E>
    where
        E: From<ResolveError>,
    {
        debug_assert!(path.is_absolute());
        let mut current = path.clone();
        let mut seen = SeenLinks::default();
        loop {
            let root = self.root_directory(&current).map_err(E::from)?;
            if let Some(trail) = trail.as_deref_mut() {
                trail.root = Some(root.display.clone());
                trail.names.clear();
            }
            if current.elements().is_empty() {
                return match kind {
                    LockKind::Read => {
                        let guard = root.dir.read_recursive();
                        terminal(&root.dir, Locked::Read(&guard))
                    }
                    LockKind::Write => {
                        let mut guard = root.dir.write();
                        terminal(&root.dir, Locked::Write(&mut guard))
                    }
                };
            }
            let guard = root.dir.read_recursive();
            let walked = self.walk(
                &guard,
                &current,
                0,
                &mut seen,
                follow_links,
                kind,
                &mut terminal,
                trail.as_deref_mut(),
            )?;
            match walked {
                Walked::Done(result) => return Ok(result),
                Walked::Restart(next) => current = next,
            }
        }
    }

    /// One step of the walk. `parent` is a directory whose lock is held by
    /// the caller's frame.
    #[expect(clippy::too_many_arguments, reason = "internal recursion helper")]
    fn walk<R, E>(
        &self,
        parent: &MemoryEntry,
        path: &MemoryPath,
        depth: usize,
        seen: &mut SeenLinks,
        follow_links: bool,
        kind: LockKind,
        terminal: &mut dyn FnMut(&EntryRef, Locked<'_>) -> Result<R, E>,
        mut trail: Option<&mut NameTrail>,
    ) -> Result<Walked<R>, E>
    where
        E: From<ResolveError>,
    {
        let element = &path.elements()[depth];
        let key = self.lookup_transform.transform(element);
        let child = parent.child_or_not_found(&key, path).map_err(E::from)?;
        let display_name = child.display_name.clone();
        let child_ref = child.entry.clone();
        let last = depth + 1 == path.elements().len();

        if last && kind == LockKind::Write {
            let mut guard = child_ref.write();
            if follow_links && guard.as_symlink().is_some() {
                return restart_on_link(&guard, path, depth, seen).map_err(E::from);
            }
            if let Some(trail) = trail {
                trail.names.push(display_name);
            }
            return terminal(&child_ref, Locked::Write(&mut guard)).map(Walked::Done);
        }

        let guard = child_ref.read_recursive();
        if guard.as_symlink().is_some() && (follow_links || !last) {
            return restart_on_link(&guard, path, depth, seen).map_err(E::from);
        }
        if let Some(trail) = trail.as_deref_mut() {
            trail.names.push(display_name);
        }
        if last {
            terminal(&child_ref, Locked::Read(&guard)).map(Walked::Done)
        } else if guard.as_directory().is_some() {
            self.walk(
                &guard,
                path,
                depth + 1,
                seen,
                follow_links,
                kind,
                terminal,
                trail,
            )
        } else {
            Err(ResolveError::NotADirectory(path.to_string()).into())
        }
    }

    /// Write-locks the parent directory of `path` (resolving links along the
    /// way) and hands the callback the locked parent plus the final name
    /// element. The caller must have checked that `path` has a final
    /// element.
    pub(crate) fn locked_parent<R, E>(
        &self,
        path: &MemoryPath,
        mut f: impl FnMut(&EntryRef, &mut MemoryEntry, &str) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<ResolveError>,
    {
        let parent_path = path.parent().expect("path has a final element");
        let name = path.file_name().expect("path has a final element").to_string();
        let parent_display = parent_path.to_string();
        self.locked_entry(
            &parent_path,
            true,
            LockKind::Write,
            move |entry_ref, locked| {
                let Locked::Write(parent) = locked else {
                    unreachable!()
                };
                if parent.as_directory().is_none() {
                    return Err(E::from(ResolveError::NotADirectory(parent_display.clone())));
                }
                f(entry_ref, parent, &name)
            },
            None,
        )
    }

    /// Resolves `path` to a directory entry without keeping any lock. Used
    /// by the two-path operations, which afterwards lock the resolved
    /// parents in a globally agreed order.
    pub(crate) fn resolve_directory(&self, path: &MemoryPath) -> Result<EntryRef, ResolveError> {
        let display = path.to_string();
        self.locked_entry(
            path,
            true,
            LockKind::Read,
            move |entry_ref, locked| {
                if locked.entry().as_directory().is_none() {
                    return Err(ResolveError::NotADirectory(display.clone()));
                }
                Ok(entry_ref.clone())
            },
            None,
        )
    }

    fn root_directory(&self, path: &MemoryPath) -> Result<&RootDirectory, ResolveError> {
        let root = path
            .root()
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))?;
        let key = self.lookup_transform.transform(root);
        self.roots
            .get(&key)
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))
    }
}

fn restart_on_link<R>(
    link: &MemoryEntry,
    path: &MemoryPath,
    depth: usize,
    seen: &mut SeenLinks,
) -> Result<Walked<R>, ResolveError> {
    if !seen.insert(link.id()) {
        return Err(ResolveError::Loop(path.to_string()));
    }
    let Some(node) = link.as_symlink() else {
        unreachable!()
    };
    Ok(Walked::Restart(path.rebase_link(depth, &node.target)))
}
