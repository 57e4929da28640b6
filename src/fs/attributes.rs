// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Attribute views over entries.
//!
//! Which views an entry carries is decided once, at file system construction
//! time, through [`AdditionalViews`]; the *basic* view always exists. View
//! data is plain state inside the entry, mutated under the entry's write
//! lock by the accessors here and read under its read lock.
//!
//! Attributes are addressable two ways: through typed view handles
//! ([`BasicAttributeView`], [`DosAttributeView`], ...) obtained from the file
//! system, and through `"view:attribute"` strings accepted by
//! [`MemoryFileSystem::read_attributes`] and
//! [`MemoryFileSystem::set_attribute`].

use bitflags::bitflags;
use hashbrown::HashMap;
use std::fmt;
use std::time::SystemTime;

use crate::path::MemoryPath;

use super::entry::{EntryKind, MemoryEntry};
use super::errors::{AttributeError, InitialAttributeError};
use super::{FileType, MemoryFileSystem};

pub(crate) const BASIC: &str = "basic";
pub(crate) const OWNER: &str = "owner";
pub(crate) const DOS: &str = "dos";
pub(crate) const POSIX: &str = "posix";
pub(crate) const USER: &str = "user";

/// The size reported for a directory.
pub(crate) const DEFAULT_DIRECTORY_SIZE: u64 = 4096;

/// A named user, treated as an opaque identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserPrincipal {
    name: String,
}

impl UserPrincipal {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for UserPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named group, treated as an opaque identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupPrincipal {
    name: String,
}

impl GroupPrincipal {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for GroupPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

bitflags! {
    /// POSIX permission bits, in the usual octal layout.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct PosixPermissions: u32 {
        /// Owner has read, write, and execute permission
        const OWNER_ALL = 0o700;
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXECUTE = 0o100;
        /// Group has read, write, and execute permission
        const GROUP_ALL = 0o070;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXECUTE = 0o010;
        /// Others have read, write, and execute permission
        const OTHERS_ALL = 0o007;
        const OTHERS_READ = 0o004;
        const OTHERS_WRITE = 0o002;
        const OTHERS_EXECUTE = 0o001;
    }
}

bitflags! {
    /// DOS attribute flags.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct DosFlags: u32 {
        const READ_ONLY = 1 << 0;
        const HIDDEN = 1 << 1;
        const SYSTEM = 1 << 2;
        const ARCHIVE = 1 << 3;
    }
}

bitflags! {
    /// The attribute views a file system supports beyond *basic*.
    ///
    /// `POSIX` implies the owner view.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct AdditionalViews: u32 {
        const DOS = 1 << 0;
        const POSIX = 1 << 1;
        const OWNER = 1 << 2;
        const USER = 1 << 3;
    }
}

/// Per-entry view state. A field is `Some` exactly when the corresponding
/// view was configured for the file system.
pub(crate) struct EntryAttributes {
    pub(crate) dos: Option<DosFlags>,
    pub(crate) owner: Option<UserPrincipal>,
    pub(crate) posix: Option<PosixData>,
    pub(crate) user_defined: Option<HashMap<String, Vec<u8>>>,
}

pub(crate) struct PosixData {
    pub(crate) group: GroupPrincipal,
    pub(crate) permissions: PosixPermissions,
}

impl EntryAttributes {
    pub(crate) fn initial(
        views: AdditionalViews,
        umask: PosixPermissions,
        user: &UserPrincipal,
        group: &GroupPrincipal,
        file_type: FileType,
    ) -> Self {
        let default_permissions = match file_type {
            FileType::RegularFile => {
                PosixPermissions::from_bits_truncate(0o666)
            }
            _ => PosixPermissions::from_bits_truncate(0o777),
        };
        Self {
            dos: views
                .contains(AdditionalViews::DOS)
                .then(DosFlags::empty),
            owner: views
                .intersects(AdditionalViews::OWNER | AdditionalViews::POSIX)
                .then(|| user.clone()),
            posix: views.contains(AdditionalViews::POSIX).then(|| PosixData {
                group: group.clone(),
                permissions: default_permissions - umask,
            }),
            user_defined: views.contains(AdditionalViews::USER).then(HashMap::new),
        }
    }
}

/// The *basic* attributes of an entry, read atomically under its lock.
#[derive(Clone, Debug)]
pub struct BasicFileAttributes {
    pub file_type: FileType,
    pub size: u64,
    pub last_modified_time: SystemTime,
    pub last_access_time: SystemTime,
    pub creation_time: SystemTime,
    /// A token unique to the entry within its file system.
    pub file_key: u64,
}

impl BasicFileAttributes {
    #[must_use]
    pub fn is_regular_file(&self) -> bool {
        matches!(self.file_type, FileType::RegularFile)
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    #[must_use]
    pub fn is_symbolic_link(&self) -> bool {
        matches!(self.file_type, FileType::SymbolicLink)
    }
}

/// Basic attributes plus the DOS flags.
#[derive(Clone, Debug)]
pub struct DosFileAttributes {
    pub basic: BasicFileAttributes,
    pub flags: DosFlags,
}

/// Basic attributes plus owner, group and permissions.
#[derive(Clone, Debug)]
pub struct PosixFileAttributes {
    pub basic: BasicFileAttributes,
    pub owner: UserPrincipal,
    pub group: GroupPrincipal,
    pub permissions: PosixPermissions,
}

/// A value carried by a named attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Size(u64),
    Time(SystemTime),
    User(UserPrincipal),
    Group(GroupPrincipal),
    Permissions(PosixPermissions),
    /// A user-defined attribute value.
    Bytes(Vec<u8>),
    FileKey(u64),
}

/// A named initial attribute supplied at entry creation.
#[derive(Clone, Debug)]
pub struct FileAttribute {
    name: String,
    value: AttributeValue,
}

impl FileAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub(crate) fn entry_size(entry: &MemoryEntry) -> u64 {
    match &entry.kind {
        EntryKind::File(file) => file.content.len(),
        EntryKind::Directory(_) => DEFAULT_DIRECTORY_SIZE,
        EntryKind::Symlink(link) => link.target.to_string().len() as u64,
    }
}

pub(crate) fn basic_attributes(entry: &MemoryEntry) -> BasicFileAttributes {
    entry.touch_accessed();
    BasicFileAttributes {
        file_type: entry.file_type(),
        size: entry_size(entry),
        last_modified_time: entry.modified(),
        last_access_time: entry.accessed(),
        creation_time: entry.created(),
        file_key: entry.id(),
    }
}

pub(crate) fn dos_attributes(entry: &MemoryEntry) -> Result<DosFileAttributes, AttributeError> {
    let flags = entry
        .attributes
        .dos
        .ok_or_else(|| AttributeError::ViewNotSupported(DOS.to_string()))?;
    Ok(DosFileAttributes {
        basic: basic_attributes(entry),
        flags,
    })
}

pub(crate) fn posix_attributes(entry: &MemoryEntry) -> Result<PosixFileAttributes, AttributeError> {
    let posix = entry
        .attributes
        .posix
        .as_ref()
        .ok_or_else(|| AttributeError::ViewNotSupported(POSIX.to_string()))?;
    let owner = entry
        .attributes
        .owner
        .clone()
        .ok_or_else(|| AttributeError::ViewNotSupported(OWNER.to_string()))?;
    Ok(PosixFileAttributes {
        basic: basic_attributes(entry),
        owner,
        group: posix.group.clone(),
        permissions: posix.permissions,
    })
}

/// Splits an attribute specification into its view and attribute parts;
/// the view defaults to *basic* when no colon is present.
pub(crate) fn split_attribute_spec(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((view, rest)) => (view, rest),
        None => (BASIC, spec),
    }
}

fn basic_attribute(entry: &MemoryEntry, attribute: &str) -> Option<AttributeValue> {
    let value = match attribute {
        "lastModifiedTime" => AttributeValue::Time(entry.modified()),
        "lastAccessTime" => AttributeValue::Time(entry.accessed()),
        "creationTime" => AttributeValue::Time(entry.created()),
        "size" => AttributeValue::Size(entry_size(entry)),
        "isRegularFile" => AttributeValue::Bool(matches!(entry.file_type(), FileType::RegularFile)),
        "isDirectory" => AttributeValue::Bool(matches!(entry.file_type(), FileType::Directory)),
        "isSymbolicLink" => {
            AttributeValue::Bool(matches!(entry.file_type(), FileType::SymbolicLink))
        }
        "isOther" => AttributeValue::Bool(false),
        "fileKey" => AttributeValue::FileKey(entry.id()),
        _ => return None,
    };
    Some(value)
}

const BASIC_ATTRIBUTES: &[&str] = &[
    "lastModifiedTime",
    "lastAccessTime",
    "creationTime",
    "size",
    "isRegularFile",
    "isDirectory",
    "isSymbolicLink",
    "isOther",
    "fileKey",
];
const DOS_ATTRIBUTES: &[&str] = &["readonly", "hidden", "system", "archive"];
const OWNER_ATTRIBUTES: &[&str] = &["owner"];
const POSIX_ATTRIBUTES: &[&str] = &["owner", "group", "permissions"];

fn view_attribute(
    entry: &MemoryEntry,
    view: &str,
    attribute: &str,
) -> Result<AttributeValue, AttributeError> {
    let unknown = || AttributeError::UnknownAttribute(format!("{view}:{attribute}"));
    match view {
        BASIC => basic_attribute(entry, attribute).ok_or_else(unknown),
        DOS => {
            let flags = dos_attributes(entry)?.flags;
            match attribute {
                "readonly" => Ok(AttributeValue::Bool(flags.contains(DosFlags::READ_ONLY))),
                "hidden" => Ok(AttributeValue::Bool(flags.contains(DosFlags::HIDDEN))),
                "system" => Ok(AttributeValue::Bool(flags.contains(DosFlags::SYSTEM))),
                "archive" => Ok(AttributeValue::Bool(flags.contains(DosFlags::ARCHIVE))),
                _ => basic_attribute(entry, attribute).ok_or_else(unknown),
            }
        }
        OWNER => match attribute {
            "owner" => {
                let owner = entry
                    .attributes
                    .owner
                    .clone()
                    .ok_or_else(|| AttributeError::ViewNotSupported(OWNER.to_string()))?;
                Ok(AttributeValue::User(owner))
            }
            _ => Err(unknown()),
        },
        POSIX => {
            let attributes = posix_attributes(entry)?;
            match attribute {
                "owner" => Ok(AttributeValue::User(attributes.owner)),
                "group" => Ok(AttributeValue::Group(attributes.group)),
                "permissions" => Ok(AttributeValue::Permissions(attributes.permissions)),
                _ => basic_attribute(entry, attribute).ok_or_else(unknown),
            }
        }
        _ => Err(AttributeError::ViewNotSupported(view.to_string())),
    }
}

fn view_attribute_names(view: &str) -> Result<Vec<&'static str>, AttributeError> {
    match view {
        BASIC => Ok(BASIC_ATTRIBUTES.to_vec()),
        DOS => {
            let mut names = BASIC_ATTRIBUTES.to_vec();
            names.extend_from_slice(DOS_ATTRIBUTES);
            Ok(names)
        }
        OWNER => Ok(OWNER_ATTRIBUTES.to_vec()),
        POSIX => {
            let mut names = BASIC_ATTRIBUTES.to_vec();
            names.extend_from_slice(POSIX_ATTRIBUTES);
            Ok(names)
        }
        _ => Err(AttributeError::ViewNotSupported(view.to_string())),
    }
}

/// Reads the attributes selected by `attributes` (`"*"` or a comma-separated
/// list) from `view`.
pub(crate) fn read_attributes(
    entry: &MemoryEntry,
    view: &str,
    attributes: &str,
) -> Result<HashMap<String, AttributeValue>, AttributeError> {
    entry.touch_accessed();
    if view == USER {
        // The user view has no fixed attribute names; it lists whatever was
        // written.
        let stored = entry
            .attributes
            .user_defined
            .as_ref()
            .ok_or_else(|| AttributeError::ViewNotSupported(USER.to_string()))?;
        let mut values = HashMap::new();
        if attributes == "*" {
            for (name, value) in stored {
                values.insert(name.clone(), AttributeValue::Bytes(value.clone()));
            }
        } else {
            for name in attributes.split(',') {
                let name = name.trim();
                if name == "*" {
                    return read_attributes(entry, view, "*");
                }
                let value = stored
                    .get(name)
                    .ok_or_else(|| AttributeError::NotPresent(name.to_string()))?;
                values.insert(name.to_string(), AttributeValue::Bytes(value.clone()));
            }
        }
        return Ok(values);
    }
    let mut values = HashMap::new();
    if attributes == "*" {
        for name in view_attribute_names(view)? {
            values.insert(name.to_string(), view_attribute(entry, view, name)?);
        }
    } else {
        for name in attributes.split(',') {
            let name = name.trim();
            if name == "*" {
                return read_attributes(entry, view, "*");
            }
            values.insert(name.to_string(), view_attribute(entry, view, name)?);
        }
    }
    Ok(values)
}

/// Sets one attribute. The caller holds the entry's write lock.
pub(crate) fn set_attribute(
    entry: &mut MemoryEntry,
    view: &str,
    attribute: &str,
    value: AttributeValue,
) -> Result<(), AttributeError> {
    let invalid = || AttributeError::InvalidValue(format!("{view}:{attribute}"));
    match (view, attribute) {
        (BASIC | DOS | POSIX, "lastModifiedTime") => {
            let AttributeValue::Time(time) = value else {
                return Err(invalid());
            };
            entry.set_times(time, entry.accessed(), entry.created());
            Ok(())
        }
        (BASIC | DOS | POSIX, "lastAccessTime") => {
            let AttributeValue::Time(time) = value else {
                return Err(invalid());
            };
            entry.set_times(entry.modified(), time, entry.created());
            Ok(())
        }
        (BASIC | DOS | POSIX, "creationTime") => {
            let AttributeValue::Time(time) = value else {
                return Err(invalid());
            };
            entry.set_times(entry.modified(), entry.accessed(), time);
            Ok(())
        }
        (DOS, "readonly" | "hidden" | "system" | "archive") => {
            let AttributeValue::Bool(enabled) = value else {
                return Err(invalid());
            };
            let flag = match attribute {
                "readonly" => DosFlags::READ_ONLY,
                "hidden" => DosFlags::HIDDEN,
                "system" => DosFlags::SYSTEM,
                "archive" => DosFlags::ARCHIVE,
                _ => unreachable!(),
            };
            let flags = entry
                .attributes
                .dos
                .as_mut()
                .ok_or_else(|| AttributeError::ViewNotSupported(DOS.to_string()))?;
            flags.set(flag, enabled);
            Ok(())
        }
        (OWNER | POSIX, "owner") => {
            let AttributeValue::User(user) = value else {
                return Err(invalid());
            };
            let owner = entry
                .attributes
                .owner
                .as_mut()
                .ok_or_else(|| AttributeError::ViewNotSupported(view.to_string()))?;
            *owner = user;
            Ok(())
        }
        (POSIX, "group") => {
            let AttributeValue::Group(group) = value else {
                return Err(invalid());
            };
            let posix = entry
                .attributes
                .posix
                .as_mut()
                .ok_or_else(|| AttributeError::ViewNotSupported(POSIX.to_string()))?;
            posix.group = group;
            Ok(())
        }
        (POSIX, "permissions") => {
            let AttributeValue::Permissions(permissions) = value else {
                return Err(invalid());
            };
            let posix = entry
                .attributes
                .posix
                .as_mut()
                .ok_or_else(|| AttributeError::ViewNotSupported(POSIX.to_string()))?;
            posix.permissions = permissions;
            Ok(())
        }
        (USER, _) => {
            let AttributeValue::Bytes(bytes) = value else {
                return Err(invalid());
            };
            let values = entry
                .attributes
                .user_defined
                .as_mut()
                .ok_or_else(|| AttributeError::ViewNotSupported(USER.to_string()))?;
            values.insert(attribute.to_string(), bytes);
            Ok(())
        }
        (BASIC | DOS | POSIX | OWNER, _) => {
            if view_attribute(entry, view, attribute).is_ok() {
                Err(AttributeError::NotSettable(format!("{view}:{attribute}")))
            } else {
                Err(AttributeError::UnknownAttribute(format!(
                    "{view}:{attribute}"
                )))
            }
        }
        _ => Err(AttributeError::ViewNotSupported(view.to_string())),
    }
}

/// Applies creation-time attributes to a not yet shared entry.
pub(crate) fn apply_initial_attributes(
    entry: &mut MemoryEntry,
    attributes: &[FileAttribute],
) -> Result<(), InitialAttributeError> {
    for attribute in attributes {
        let (view, name) = split_attribute_spec(&attribute.name);
        if matches!(
            name,
            "lastModifiedTime" | "lastAccessTime" | "creationTime"
        ) {
            return Err(InitialAttributeError::UnsupportedAttribute(
                attribute.name.clone(),
            ));
        }
        set_attribute(entry, view, name, attribute.value.clone()).map_err(|error| match error {
            AttributeError::ViewNotSupported(view) => {
                InitialAttributeError::ViewNotSupported(view)
            }
            AttributeError::UnknownAttribute(name) | AttributeError::NotSettable(name) => {
                InitialAttributeError::UnknownAttribute(name)
            }
            _ => InitialAttributeError::InvalidValue(attribute.name.clone()),
        })?;
    }
    Ok(())
}

/// Carries timestamps, owner, group and permissions from `source` onto
/// `target`, skipping whatever the target's configuration does not support.
pub(crate) fn copy_attributes(source: &MemoryEntry, target: &mut MemoryEntry) {
    target.set_times(source.modified(), source.accessed(), source.created());
    if let (Some(owner), Some(target_owner)) = (
        source.attributes.owner.as_ref(),
        target.attributes.owner.as_mut(),
    ) {
        *target_owner = owner.clone();
    }
    if let (Some(posix), Some(target_posix)) = (
        source.attributes.posix.as_ref(),
        target.attributes.posix.as_mut(),
    ) {
        target_posix.group = posix.group.clone();
        target_posix.permissions = posix.permissions;
    }
}

/// By-path handle on the *basic* view; every call resolves the path anew.
pub struct BasicAttributeView {
    pub(crate) fs: MemoryFileSystem,
    pub(crate) path: MemoryPath,
    pub(crate) follow_links: bool,
}

impl BasicAttributeView {
    pub fn read_attributes(&self) -> Result<BasicFileAttributes, AttributeError> {
        self.fs
            .with_entry_read(&self.path, self.follow_links, |entry| {
                Ok(basic_attributes(entry))
            })
    }

    /// Sets all three timestamps in one atomic step. Every argument is
    /// required; a `None` is rejected.
    pub fn set_times(
        &self,
        last_modified_time: Option<SystemTime>,
        last_access_time: Option<SystemTime>,
        creation_time: Option<SystemTime>,
    ) -> Result<(), AttributeError> {
        let modified = last_modified_time
            .ok_or_else(|| AttributeError::InvalidValue("lastModifiedTime must not be null".to_string()))?;
        let accessed = last_access_time
            .ok_or_else(|| AttributeError::InvalidValue("lastAccessTime must not be null".to_string()))?;
        let created = creation_time
            .ok_or_else(|| AttributeError::InvalidValue("creationTime must not be null".to_string()))?;
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                entry.set_times(modified, accessed, created);
                Ok(())
            })
    }
}

/// By-path handle on the *dos* view.
pub struct DosAttributeView {
    pub(crate) fs: MemoryFileSystem,
    pub(crate) path: MemoryPath,
    pub(crate) follow_links: bool,
}

impl DosAttributeView {
    pub fn read_attributes(&self) -> Result<DosFileAttributes, AttributeError> {
        self.fs
            .with_entry_read(&self.path, self.follow_links, |entry| dos_attributes(entry))
    }

    fn set_flag(&self, flag: DosFlags, enabled: bool) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                let flags = entry
                    .attributes
                    .dos
                    .as_mut()
                    .ok_or_else(|| AttributeError::ViewNotSupported(DOS.to_string()))?;
                flags.set(flag, enabled);
                Ok(())
            })
    }

    pub fn set_read_only(&self, value: bool) -> Result<(), AttributeError> {
        self.set_flag(DosFlags::READ_ONLY, value)
    }

    pub fn set_hidden(&self, value: bool) -> Result<(), AttributeError> {
        self.set_flag(DosFlags::HIDDEN, value)
    }

    pub fn set_system(&self, value: bool) -> Result<(), AttributeError> {
        self.set_flag(DosFlags::SYSTEM, value)
    }

    pub fn set_archive(&self, value: bool) -> Result<(), AttributeError> {
        self.set_flag(DosFlags::ARCHIVE, value)
    }
}

/// By-path handle on the *owner* view.
pub struct OwnerAttributeView {
    pub(crate) fs: MemoryFileSystem,
    pub(crate) path: MemoryPath,
    pub(crate) follow_links: bool,
}

impl OwnerAttributeView {
    pub fn owner(&self) -> Result<UserPrincipal, AttributeError> {
        self.fs
            .with_entry_read(&self.path, self.follow_links, |entry| {
                entry
                    .attributes
                    .owner
                    .clone()
                    .ok_or_else(|| AttributeError::ViewNotSupported(OWNER.to_string()))
            })
    }

    pub fn set_owner(&self, owner: UserPrincipal) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                set_attribute(entry, OWNER, "owner", AttributeValue::User(owner.clone()))
            })
    }
}

/// By-path handle on the *posix* view.
pub struct PosixAttributeView {
    pub(crate) fs: MemoryFileSystem,
    pub(crate) path: MemoryPath,
    pub(crate) follow_links: bool,
}

impl PosixAttributeView {
    pub fn read_attributes(&self) -> Result<PosixFileAttributes, AttributeError> {
        self.fs
            .with_entry_read(&self.path, self.follow_links, |entry| {
                posix_attributes(entry)
            })
    }

    pub fn owner(&self) -> Result<UserPrincipal, AttributeError> {
        Ok(self.read_attributes()?.owner)
    }

    pub fn set_owner(&self, owner: UserPrincipal) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                set_attribute(entry, POSIX, "owner", AttributeValue::User(owner.clone()))
            })
    }

    pub fn group(&self) -> Result<GroupPrincipal, AttributeError> {
        Ok(self.read_attributes()?.group)
    }

    pub fn set_group(&self, group: GroupPrincipal) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                set_attribute(entry, POSIX, "group", AttributeValue::Group(group.clone()))
            })
    }

    pub fn permissions(&self) -> Result<PosixPermissions, AttributeError> {
        Ok(self.read_attributes()?.permissions)
    }

    pub fn set_permissions(&self, permissions: PosixPermissions) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                set_attribute(
                    entry,
                    POSIX,
                    "permissions",
                    AttributeValue::Permissions(permissions),
                )
            })
    }
}

/// By-path handle on the *user* (user-defined attributes) view: a
/// string-to-bytes map with explicit sizes and caller-provided read buffers.
pub struct UserAttributeView {
    pub(crate) fs: MemoryFileSystem,
    pub(crate) path: MemoryPath,
    pub(crate) follow_links: bool,
}

impl UserAttributeView {
    fn with_values<R>(
        &self,
        f: impl FnOnce(&HashMap<String, Vec<u8>>) -> Result<R, AttributeError>,
    ) -> Result<R, AttributeError> {
        self.fs
            .with_entry_read(&self.path, self.follow_links, |entry| {
                let values = entry
                    .attributes
                    .user_defined
                    .as_ref()
                    .ok_or_else(|| AttributeError::ViewNotSupported(USER.to_string()))?;
                f(values)
            })
    }

    pub fn list(&self) -> Result<Vec<String>, AttributeError> {
        self.with_values(|values| Ok(values.keys().cloned().collect()))
    }

    pub fn size(&self, name: &str) -> Result<usize, AttributeError> {
        self.with_values(|values| {
            values
                .get(name)
                .map(Vec::len)
                .ok_or_else(|| AttributeError::NotPresent(name.to_string()))
        })
    }

    /// Copies the attribute value into `buffer`, failing if it does not fit.
    pub fn read(&self, name: &str, buffer: &mut [u8]) -> Result<usize, AttributeError> {
        self.with_values(|values| {
            let value = values
                .get(name)
                .ok_or_else(|| AttributeError::NotPresent(name.to_string()))?;
            if buffer.len() < value.len() {
                return Err(AttributeError::BufferTooSmall {
                    required: value.len(),
                    available: buffer.len(),
                });
            }
            buffer[..value.len()].copy_from_slice(value);
            Ok(value.len())
        })
    }

    pub fn write(&self, name: &str, value: &[u8]) -> Result<usize, AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                let values = entry
                    .attributes
                    .user_defined
                    .as_mut()
                    .ok_or_else(|| AttributeError::ViewNotSupported(USER.to_string()))?;
                values.insert(name.to_string(), value.to_vec());
                Ok(value.len())
            })
    }

    /// Removing an attribute that was never written is not an error.
    pub fn delete(&self, name: &str) -> Result<(), AttributeError> {
        self.fs
            .with_entry_write(&self.path, self.follow_links, |entry| {
                let values = entry
                    .attributes
                    .user_defined
                    .as_mut()
                    .ok_or_else(|| AttributeError::ViewNotSupported(USER.to_string()))?;
                values.remove(name);
                Ok(())
            })
    }
}
