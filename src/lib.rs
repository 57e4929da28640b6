// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! # memfs
//!
//! > An in-process, in-memory virtual file system.
//!
//! memfs keeps a hierarchical namespace of directories, regular files and
//! symbolic links entirely in memory. Every entry carries its own
//! reader-writer lock, so independent subtrees can be read and mutated
//! concurrently while a tree-walk locking protocol keeps overlapping
//! operations deadlock free.
//!
//! A file system is assembled with [`MemoryFileSystemBuilder`]; the resulting
//! [`MemoryFileSystem`] handle is cheap to clone and safe to share between
//! threads.
//!
//! ```
//! use memfs::{MemoryFileSystemBuilder, OpenOptions};
//! use std::io::{Read as _, Write as _};
//!
//! let fs = MemoryFileSystemBuilder::new().build().unwrap();
//! fs.create_directory("/tmp").unwrap();
//!
//! let mut channel = fs
//!     .new_byte_channel(
//!         "/tmp/greeting",
//!         OpenOptions::WRITE | OpenOptions::CREATE_NEW,
//!     )
//!     .unwrap();
//! channel.write_all(b"hello world").unwrap();
//! drop(channel);
//!
//! let mut text = String::new();
//! fs.new_input_stream("/tmp/greeting")
//!     .unwrap()
//!     .read_to_string(&mut text)
//!     .unwrap();
//! assert_eq!(text, "hello world");
//! ```

pub mod fs;
pub mod path;

pub use fs::builder::MemoryFileSystemBuilder;
pub use fs::{AccessModes, CopyOptions, FileType, MemoryFileSystem, OpenOptions};
pub use path::MemoryPath;
