// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Assembling a [`MemoryFileSystem`].
//!
//! The builder collects the configuration (roots, separator, working
//! directory, name transforms, collation, views, umask, block size,
//! read-only flag, capacity), validates it, and seeds the root
//! directories. The presets mirror the usual platform flavors.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::Arc;

use crate::path::MemoryPath;

use super::attributes::{
    AdditionalViews, GroupPrincipal, PosixPermissions, UserPrincipal, BASIC, DOS, OWNER, POSIX,
    USER,
};
use super::blocks::FileStoreState;
use super::entry::EntryCreationContext;
use super::errors::BuildError;
use super::{FileSystemState, MemoryFileSystem, RootDirectory};

/// A pure, element-wise name transform.
///
/// The *store* transform decides the name recorded on a new entry; the
/// *lookup* transform decides the key used inside directories. A case-folding
/// lookup transform is what makes a file system case-insensitive.
pub trait NameTransform: Send + Sync {
    fn transform(&self, name: &str) -> String;
}

/// Leaves names untouched.
pub struct IdentityTransform;

impl NameTransform for IdentityTransform {
    fn transform(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Folds names to lower case.
pub struct CaseFoldTransform;

impl NameTransform for CaseFoldTransform {
    fn transform(&self, name: &str) -> String {
        name.to_lowercase()
    }
}

/// Orders sibling names for the two-path locking protocol.
pub trait Collation: Send + Sync {
    fn compare(&self, left: &str, right: &str) -> Ordering;
}

/// Plain byte-wise ordering.
pub struct LexicographicCollation;

impl Collation for LexicographicCollation {
    fn compare(&self, left: &str, right: &str) -> Ordering {
        left.cmp(right)
    }
}

/// Case-insensitive ordering, with a byte-wise tie break so the order stays
/// total.
pub struct CaseInsensitiveCollation;

impl Collation for CaseInsensitiveCollation {
    fn compare(&self, left: &str, right: &str) -> Ordering {
        left.to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| left.cmp(right))
    }
}

static NEXT_FILE_SYSTEM_KEY: AtomicU64 = AtomicU64::new(0);

/// Builds [`MemoryFileSystem`] instances.
pub struct MemoryFileSystemBuilder {
    key: Option<String>,
    roots: Vec<String>,
    separator: String,
    current_working_directory: Option<String>,
    store_transform: Arc<dyn NameTransform>,
    lookup_transform: Arc<dyn NameTransform>,
    collation: Arc<dyn Collation>,
    views: AdditionalViews,
    umask: PosixPermissions,
    block_size: usize,
    read_only: bool,
    capacity: Option<u64>,
    default_user: UserPrincipal,
    default_group: Option<GroupPrincipal>,
}

impl MemoryFileSystemBuilder {
    /// A single `/` root, `/` separator, case-sensitive names, no additional
    /// views, umask `0o022`, 4 KiB blocks and no byte ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: None,
            roots: vec!["/".to_string()],
            separator: "/".to_string(),
            current_working_directory: None,
            store_transform: Arc::new(IdentityTransform),
            lookup_transform: Arc::new(IdentityTransform),
            collation: Arc::new(LexicographicCollation),
            views: AdditionalViews::empty(),
            umask: PosixPermissions::from_bits_truncate(0o022),
            block_size: 4096,
            read_only: false,
            capacity: None,
            default_user: UserPrincipal::named("user"),
            default_group: None,
        }
    }

    /// A Linux flavor: `/` root, posix and user-defined views.
    #[must_use]
    pub fn linux() -> Self {
        Self::new().additional_views(AdditionalViews::POSIX | AdditionalViews::USER)
    }

    /// A Windows flavor: `C:\` root, `\` separator, case-insensitive
    /// lookups, dos view.
    #[must_use]
    pub fn windows() -> Self {
        let mut builder = Self::new();
        builder.roots = vec!["C:\\".to_string()];
        builder.separator = "\\".to_string();
        builder
            .lookup_transform(CaseFoldTransform)
            .collation(CaseInsensitiveCollation)
            .additional_views(AdditionalViews::DOS | AdditionalViews::OWNER)
    }

    /// A macOS flavor: `/` root, case-insensitive lookups, posix view.
    #[must_use]
    pub fn macos() -> Self {
        Self::new()
            .lookup_transform(CaseFoldTransform)
            .collation(CaseInsensitiveCollation)
            .additional_views(AdditionalViews::POSIX)
    }

    /// Overrides the generated file system key. Keys order cross-file-system
    /// operations and should be unique per instance.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Replaces the root set.
    #[must_use]
    pub fn roots(mut self, roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one root.
    #[must_use]
    pub fn add_root(mut self, root: impl Into<String>) -> Self {
        self.roots.push(root.into());
        self
    }

    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// The absolute directory relative paths resolve against. Defaults to
    /// the first root.
    #[must_use]
    pub fn current_working_directory(mut self, path: impl Into<String>) -> Self {
        self.current_working_directory = Some(path.into());
        self
    }

    #[must_use]
    pub fn store_transform(mut self, transform: impl NameTransform + 'static) -> Self {
        self.store_transform = Arc::new(transform);
        self
    }

    #[must_use]
    pub fn lookup_transform(mut self, transform: impl NameTransform + 'static) -> Self {
        self.lookup_transform = Arc::new(transform);
        self
    }

    #[must_use]
    pub fn collation(mut self, collation: impl Collation + 'static) -> Self {
        self.collation = Arc::new(collation);
        self
    }

    #[must_use]
    pub fn additional_views(mut self, views: AdditionalViews) -> Self {
        self.views = views;
        self
    }

    #[must_use]
    pub fn umask(mut self, umask: PosixPermissions) -> Self {
        self.umask = umask;
        self
    }

    #[must_use]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// An optional ceiling on the bytes the store may allocate.
    #[must_use]
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn default_user(mut self, user: UserPrincipal) -> Self {
        self.default_user = user;
        self
    }

    #[must_use]
    pub fn default_group(mut self, group: GroupPrincipal) -> Self {
        self.default_group = Some(group);
        self
    }

    pub fn build(self) -> Result<MemoryFileSystem, BuildError> {
        if self.separator.is_empty() {
            return Err(BuildError::EmptySeparator);
        }
        if self.block_size == 0 {
            return Err(BuildError::ZeroBlockSize);
        }
        if self.roots.is_empty() {
            return Err(BuildError::NoRoots);
        }

        let key = self.key.unwrap_or_else(|| {
            format!("memory{}", NEXT_FILE_SYSTEM_KEY.fetch_add(1, SeqCst))
        });
        let separator: Arc<str> = Arc::from(self.separator.as_str());
        let store = Arc::new(FileStoreState::new(
            key.clone(),
            self.block_size,
            self.read_only,
            self.capacity,
        ));
        let ids = Arc::new(AtomicU64::new(1));
        let default_group = self
            .default_group
            .unwrap_or_else(|| GroupPrincipal::named(self.default_user.name()));

        let context = EntryCreationContext {
            views: self.views,
            umask: self.umask,
            user: self.default_user.clone(),
            group: default_group.clone(),
            store: store.clone(),
            ids: ids.clone(),
        };

        let mut roots = HashMap::new();
        let mut root_order = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            validate_root(root, &self.separator)?;
            let lookup_key = self.lookup_transform.transform(root);
            if roots.contains_key(&lookup_key) {
                return Err(BuildError::DuplicateRoot(root.clone()));
            }
            root_order.push(lookup_key.clone());
            roots.insert(
                lookup_key,
                RootDirectory {
                    display: Arc::from(root.as_str()),
                    dir: Arc::new(RwLock::new(context.new_directory())),
                },
            );
        }

        let mut supported_views = vec![BASIC.to_string()];
        if self
            .views
            .intersects(AdditionalViews::OWNER | AdditionalViews::POSIX)
        {
            supported_views.push(OWNER.to_string());
        }
        if self.views.contains(AdditionalViews::DOS) {
            supported_views.push(DOS.to_string());
        }
        if self.views.contains(AdditionalViews::POSIX) {
            supported_views.push(POSIX.to_string());
        }
        if self.views.contains(AdditionalViews::USER) {
            supported_views.push(USER.to_string());
        }

        let mut state = FileSystemState {
            key,
            separator: separator.clone(),
            roots,
            root_order,
            cwd: MemoryPath::relative(separator, Vec::new()),
            store_transform: self.store_transform,
            lookup_transform: self.lookup_transform,
            collation: self.collation,
            views: self.views,
            supported_views,
            umask: self.umask,
            default_user: self.default_user,
            default_group,
            store,
            ordering: RwLock::new(()),
            open: AtomicBool::new(true),
            ids,
        };

        let cwd = self
            .current_working_directory
            .unwrap_or_else(|| self.roots[0].clone());
        let parsed = state.parse_str(&cwd);
        if !parsed.is_absolute() {
            return Err(BuildError::RelativeWorkingDirectory(cwd));
        }
        state.cwd = parsed.normalized();

        Ok(MemoryFileSystem {
            state: Arc::new(state),
        })
    }
}

impl Default for MemoryFileSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A root is either the separator itself (`/`) or a non-empty prefix
/// followed by the separator (`C:\`).
fn validate_root(root: &str, separator: &str) -> Result<(), BuildError> {
    if root == separator {
        return Ok(());
    }
    let invalid = || BuildError::InvalidRoot(root.to_string(), separator.to_string());
    let prefix = root.strip_suffix(separator).ok_or_else(invalid)?;
    if prefix.is_empty() || prefix.contains(separator) {
        return Err(invalid());
    }
    Ok(())
}
