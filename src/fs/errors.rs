// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Possible errors from [`MemoryFileSystem`] operations

#[expect(
    unused_imports,
    reason = "used for doc string links to work out, but not for code"
)]
use super::MemoryFileSystem;

use thiserror::Error;

/// The file system has been closed; every operation except `close` fails
/// with this error afterwards.
#[derive(Error, Debug)]
#[error("file system is closed")]
pub struct ClosedError;

/// The file store has reached its configured byte ceiling.
#[derive(Error, Debug)]
#[error("no space left in file store")]
pub struct StoreFullError;

/// Possible errors while resolving a path to an entry.
///
/// Every operation that takes a path can fail this way; the per-operation
/// error enums embed it transparently.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("too many levels of symbolic links: {0}")]
    Loop(String),
}

/// Possible errors while applying initial attributes to a freshly created
/// entry.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InitialAttributeError {
    /// The three timestamps can never be supplied at creation time.
    #[error("'{0}' not supported as initial attribute")]
    UnsupportedAttribute(String),
    #[error("view '{0}' is not configured for this file system")]
    ViewNotSupported(String),
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("invalid value for attribute '{0}'")]
    InvalidValue(String),
}

/// Possible errors from [`MemoryFileSystem::create_directory`] and the other
/// entry-creating operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CreateError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("read-only file system")]
    ReadOnly,
    #[error(transparent)]
    InitialAttribute(#[from] InitialAttributeError),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::new_byte_channel`] and the stream
/// constructors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OpenError {
    /// `CREATE_NEW` was requested and the target already exists.
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("invalid open option combination: {0}")]
    InvalidCombination(&'static str),
    #[error("unsupported open option bits: {0:#x}")]
    UnsupportedOption(u32),
    #[error("read-only file system")]
    ReadOnly,
    #[error(transparent)]
    InitialAttribute(#[from] InitialAttributeError),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::delete`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    /// The entry is an open file, or the root directory.
    #[error("busy: {0}")]
    Busy(String),
    #[error("read-only file system")]
    ReadOnly,
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::copy`] and
/// [`MemoryFileSystem::rename`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CopyError {
    /// The target exists and `REPLACE_EXISTING` was not requested.
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    /// The target is a non-empty directory.
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("the root directory can not be moved or replaced")]
    RootNotAllowed,
    #[error("can not move a directory into its own subtree")]
    IntoSelf,
    #[error("read-only file system")]
    ReadOnly,
    #[error(transparent)]
    StoreFull(#[from] StoreFullError),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from operations that only look an entry up
/// ([`MemoryFileSystem::to_real_path`],
/// [`MemoryFileSystem::new_directory_stream`], ...).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LookupError {
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from attribute reads and writes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AttributeError {
    #[error("view '{0}' is not configured for this file system")]
    ViewNotSupported(String),
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("attribute '{0}' can not be set")]
    NotSettable(String),
    /// A user-defined attribute was requested but never written.
    #[error("attribute '{0}' not present")]
    NotPresent(String),
    #[error("{required} bytes in buffer required but only {available} available")]
    BufferTooSmall { required: usize, available: usize },
    #[error("invalid value for attribute: {0}")]
    InvalidValue(String),
    #[error("read-only file system")]
    ReadOnly,
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::check_access`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("access mode bits {0:#x} are not supported")]
    UnsupportedMode(u32),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::read_symbolic_link`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReadLinkError {
    #[error("not a symbolic link: {0}")]
    NotALink(String),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Possible errors from [`MemoryFileSystem::get_path_matcher`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("pattern must have the form \"syntax:pattern\" but was \"{0}\"")]
    MissingSyntax(String),
    #[error("unsupported syntax \"{0}\"")]
    UnsupportedSyntax(String),
    #[error("invalid glob pattern \"{0}\"")]
    BadGlobPattern(String),
    #[error(transparent)]
    BadPattern(#[from] regex::Error),
    #[error(transparent)]
    Closed(#[from] ClosedError),
}

/// Possible errors from [`ByteChannel::read`](super::channel::ByteChannel::read)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("channel is not open for reading")]
    NotReadable,
    #[error("channel is closed")]
    ChannelClosed,
    #[error(transparent)]
    Closed(#[from] ClosedError),
}

/// Possible errors from [`ByteChannel::write`](super::channel::ByteChannel::write)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("channel is not open for writing")]
    NotWritable,
    #[error("channel is closed")]
    ChannelClosed,
    #[error(transparent)]
    StoreFull(#[from] StoreFullError),
    #[error(transparent)]
    Closed(#[from] ClosedError),
}

/// Possible errors from
/// [`ByteChannel::set_position`](super::channel::ByteChannel::set_position)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SeekError {
    #[error("position can not be set on a channel opened for appending")]
    Append,
    #[error("channel is closed")]
    ChannelClosed,
    #[error(transparent)]
    Closed(#[from] ClosedError),
}

/// Possible errors from
/// [`ByteChannel::truncate`](super::channel::ByteChannel::truncate)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TruncateError {
    #[error("channel is not open for writing")]
    NotWritable,
    #[error("channel is closed")]
    ChannelClosed,
    #[error(transparent)]
    Closed(#[from] ClosedError),
}

/// Possible errors from [`MemoryFileSystemBuilder::build`](super::builder::MemoryFileSystemBuilder::build)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("a file system root must be present")]
    NoRoots,
    #[error("invalid root \"{0}\" for separator \"{1}\"")]
    InvalidRoot(String, String),
    #[error("duplicate root \"{0}\"")]
    DuplicateRoot(String),
    #[error("the separator must not be empty")]
    EmptySeparator,
    #[error("the block size must not be zero")]
    ZeroBlockSize,
    #[error("current working directory \"{0}\" must be absolute")]
    RelativeWorkingDirectory(String),
}

impl From<ReadError> for std::io::Error {
    fn from(value: ReadError) -> Self {
        let kind = match &value {
            ReadError::NotReadable => std::io::ErrorKind::PermissionDenied,
            ReadError::ChannelClosed | ReadError::Closed(_) => std::io::ErrorKind::NotConnected,
        };
        std::io::Error::new(kind, value)
    }
}

impl From<WriteError> for std::io::Error {
    fn from(value: WriteError) -> Self {
        let kind = match &value {
            WriteError::NotWritable => std::io::ErrorKind::PermissionDenied,
            WriteError::StoreFull(_) => std::io::ErrorKind::StorageFull,
            WriteError::ChannelClosed | WriteError::Closed(_) => std::io::ErrorKind::NotConnected,
        };
        std::io::Error::new(kind, value)
    }
}

impl From<SeekError> for std::io::Error {
    fn from(value: SeekError) -> Self {
        let kind = match &value {
            SeekError::Append => std::io::ErrorKind::InvalidInput,
            SeekError::ChannelClosed | SeekError::Closed(_) => std::io::ErrorKind::NotConnected,
        };
        std::io::Error::new(kind, value)
    }
}
