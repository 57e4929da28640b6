// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! File-system paths
//!
//! A [`MemoryPath`] is a parsed path: an optional root (present on absolute
//! paths) plus a sequence of name elements. Paths are produced by
//! [`MemoryFileSystem::get_path`](crate::fs::MemoryFileSystem::get_path) (or
//! implicitly from strings via the [`Arg`] trait) and carry no reference to
//! the tree itself; resolving a path against the tree is the file system's
//! job.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A private module, to help support writing sealed traits. This module should _itself_ never be
/// made public.
mod private {
    use super::MemoryPath;
    use crate::fs::MemoryFileSystem;

    /// A trait to help seal the main `Arg` trait.
    ///
    /// This trait is explicitly public, but unnameable, thereby preventing code outside this crate
    /// from implementing this trait.
    pub trait Sealed {
        fn to_path(&self, fs: &MemoryFileSystem) -> MemoryPath;
    }

    impl Sealed for str {
        fn to_path(&self, fs: &MemoryFileSystem) -> MemoryPath {
            fs.parse_path(self)
        }
    }

    impl Sealed for String {
        fn to_path(&self, fs: &MemoryFileSystem) -> MemoryPath {
            fs.parse_path(self)
        }
    }

    impl Sealed for std::borrow::Cow<'_, str> {
        fn to_path(&self, fs: &MemoryFileSystem) -> MemoryPath {
            fs.parse_path(self)
        }
    }

    impl Sealed for MemoryPath {
        fn to_path(&self, _fs: &MemoryFileSystem) -> MemoryPath {
            self.clone()
        }
    }

    impl<T: Sealed + ?Sized> Sealed for &T {
        fn to_path(&self, fs: &MemoryFileSystem) -> MemoryPath {
            T::to_path(self, fs)
        }
    }
}

/// Trait for passing path arguments.
///
/// Implemented for string types (parsed against the file system's roots and
/// separator) and for [`MemoryPath`] itself (used as-is). The trait is sealed;
/// it cannot be implemented outside this crate.
pub trait Arg: private::Sealed {}

impl Arg for str {}
impl Arg for String {}
impl Arg for Cow<'_, str> {}
impl Arg for MemoryPath {}
impl<T: Arg + ?Sized> Arg for &T {}

pub(crate) use private::Sealed as ArgSealed;

/// A parsed, immutable path.
///
/// Absolute paths carry the display form of the root they were parsed
/// against (e.g. `"/"` or `"C:\"`); relative paths carry none. Equality and
/// hashing are textual; whether two differently-cased paths address the same
/// entry is decided by the file system's lookup transform, not by the path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoryPath {
    root: Option<Arc<str>>,
    separator: Arc<str>,
    elements: Vec<String>,
}

impl MemoryPath {
    pub(crate) fn absolute(root: Arc<str>, separator: Arc<str>, elements: Vec<String>) -> Self {
        Self {
            root: Some(root),
            separator,
            elements,
        }
    }

    pub(crate) fn relative(separator: Arc<str>, elements: Vec<String>) -> Self {
        Self {
            root: None,
            separator,
            elements,
        }
    }

    /// Whether this path starts at a root.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    /// The display form of the root this path was parsed against, if absolute.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// The name elements of this path, in order.
    #[must_use]
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// The final name element, or `None` for a root or empty path.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.elements.last().map(String::as_str)
    }

    /// The path without its final element.
    ///
    /// Returns `None` if there is no element to strip (a root or an empty
    /// relative path).
    #[must_use]
    pub fn parent(&self) -> Option<MemoryPath> {
        if self.elements.is_empty() {
            return None;
        }
        let mut elements = self.elements.clone();
        elements.pop();
        Some(Self {
            root: self.root.clone(),
            separator: self.separator.clone(),
            elements,
        })
    }

    /// Returns this path extended by one element.
    #[must_use]
    pub fn join(&self, element: impl Into<String>) -> MemoryPath {
        let mut elements = self.elements.clone();
        elements.push(element.into());
        Self {
            root: self.root.clone(),
            separator: self.separator.clone(),
            elements,
        }
    }

    /// The prefix of this path containing the first `len` elements.
    pub(crate) fn truncated(&self, len: usize) -> MemoryPath {
        Self {
            root: self.root.clone(),
            separator: self.separator.clone(),
            elements: self.elements[..len].to_vec(),
        }
    }

    /// Appends the elements of a relative path; the receiver keeps its root.
    pub(crate) fn join_path(&self, relative: &MemoryPath) -> MemoryPath {
        let mut elements = self.elements.clone();
        elements.extend(relative.elements.iter().cloned());
        Self {
            root: self.root.clone(),
            separator: self.separator.clone(),
            elements,
        }
    }

    /// Removes `.` elements and applies `..` elements.
    ///
    /// On an absolute path a leading `..` cannot climb above the root and is
    /// dropped. On a relative path leading `..` elements are preserved so the
    /// path can later be resolved against a working directory.
    #[must_use]
    pub fn normalized(&self) -> MemoryPath {
        let mut elements: Vec<String> = Vec::with_capacity(self.elements.len());
        let mut leading_parents = 0usize;
        for element in &self.elements {
            match element.as_str() {
                "" | "." => {}
                ".." => {
                    if elements.is_empty() {
                        if self.root.is_none() {
                            leading_parents += 1;
                        }
                    } else {
                        elements.pop();
                    }
                }
                _ => elements.push(element.clone()),
            }
        }
        let mut all = Vec::with_capacity(leading_parents + elements.len());
        all.extend(std::iter::repeat("..".to_string()).take(leading_parents));
        all.extend(elements);
        Self {
            root: self.root.clone(),
            separator: self.separator.clone(),
            elements: all,
        }
    }

    /// Builds the path a walk restarts on after encountering a symbolic link
    /// at element index `depth` of `self`.
    ///
    /// An absolute link target replaces the walked prefix wholesale; a
    /// relative target is resolved against the link's parent. The remaining
    /// elements of `self` are re-appended and the result normalized.
    pub(crate) fn rebase_link(&self, depth: usize, target: &MemoryPath) -> MemoryPath {
        let mut base = if target.is_absolute() {
            target.clone()
        } else {
            self.truncated(depth).join_path(target)
        };
        base.elements
            .extend(self.elements[depth + 1..].iter().cloned());
        base.normalized()
    }
}

impl fmt::Display for MemoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => {
                f.write_str(root)?;
                for (i, element) in self.elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(&self.separator)?;
                    }
                    f.write_str(element)?;
                }
                Ok(())
            }
            None => {
                for (i, element) in self.elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(&self.separator)?;
                    }
                    f.write_str(element)?;
                }
                Ok(())
            }
        }
    }
}
