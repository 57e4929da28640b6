// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Seekable byte channels over regular files.
//!
//! A channel owns a cursor; the file's bytes are shared. Reads take the
//! file's read lock, writes its write lock, and the cursor advances under
//! that lock, so writes through two channels serialize against each other
//! (in an otherwise unspecified order). The channel also implements
//! [`std::io::Read`], [`std::io::Write`] and [`std::io::Seek`], which is all
//! an input or output stream is here.
//!
//! A file's open count is incremented when a channel is constructed and
//! decremented on close; `close` is idempotent and also runs on drop. The
//! last close of a file marked for deletion reclaims its blocks.

use std::io;

use crate::path::MemoryPath;

use super::entry::EntryRef;
use super::errors::{ReadError, SeekError, TruncateError, WriteError};
use super::MemoryFileSystem;

#[derive(Copy, Clone)]
pub(crate) struct ChannelFlags {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) append: bool,
    pub(crate) delete_on_close: bool,
}

/// A seekable byte channel over one regular file.
pub struct ByteChannel {
    fs: MemoryFileSystem,
    file: EntryRef,
    path: MemoryPath,
    flags: ChannelFlags,
    position: u64,
    open: bool,
}

impl ByteChannel {
    /// The file's open count has already been incremented by the opening
    /// walk, while the parent directory was still locked.
    pub(crate) fn new(
        fs: MemoryFileSystem,
        file: EntryRef,
        path: MemoryPath,
        flags: ChannelFlags,
    ) -> Self {
        Self {
            fs,
            file,
            path,
            flags,
            position: 0,
            open: true,
        }
    }

    /// Reads at the cursor; returns `Ok(0)` at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if !self.open {
            return Err(ReadError::ChannelClosed);
        }
        self.fs.state.check_open()?;
        if !self.flags.readable {
            return Err(ReadError::NotReadable);
        }
        let read = {
            let guard = self.file.read();
            let Some(file) = guard.as_file() else {
                unreachable!()
            };
            let read = file.content.read_at(self.position, buf);
            guard.touch_accessed();
            read
        };
        self.position += read as u64;
        Ok(read)
    }

    /// Writes at the cursor, growing the file as needed. In append mode the
    /// cursor jumps to the end of file first, under the write lock.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, WriteError> {
        if !self.open {
            return Err(WriteError::ChannelClosed);
        }
        self.fs.state.check_open()?;
        if !self.flags.writable {
            return Err(WriteError::NotWritable);
        }
        let written = {
            let mut guard = self.file.write();
            let Some(file) = guard.as_file_mut() else {
                unreachable!()
            };
            if self.flags.append {
                self.position = file.content.len();
            }
            let written = file.content.write_at(self.position, buf)?;
            guard.touch_modified();
            written
        };
        self.position += written as u64;
        Ok(written)
    }

    /// The cursor position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the cursor. Fails on a channel opened for appending, where
    /// every write goes to the end of file.
    pub fn set_position(&mut self, position: u64) -> Result<(), SeekError> {
        if !self.open {
            return Err(SeekError::ChannelClosed);
        }
        self.fs.state.check_open()?;
        if self.flags.append {
            return Err(SeekError::Append);
        }
        self.position = position;
        Ok(())
    }

    /// The file's current logical size.
    pub fn size(&self) -> Result<u64, ReadError> {
        if !self.open {
            return Err(ReadError::ChannelClosed);
        }
        self.fs.state.check_open()?;
        let guard = self.file.read();
        let Some(file) = guard.as_file() else {
            unreachable!()
        };
        Ok(file.content.len())
    }

    /// Shrinks the file to `size` (growing is a no-op) and clamps the cursor
    /// to the new size.
    pub fn truncate(&mut self, size: u64) -> Result<(), TruncateError> {
        if !self.open {
            return Err(TruncateError::ChannelClosed);
        }
        self.fs.state.check_open()?;
        if !self.flags.writable {
            return Err(TruncateError::NotWritable);
        }
        {
            let mut guard = self.file.write();
            let Some(file) = guard.as_file_mut() else {
                unreachable!()
            };
            file.content.truncate(size);
            guard.touch_modified();
        }
        if self.position > size {
            self.position = size;
        }
        Ok(())
    }

    /// Closes the channel. Closing twice is allowed and does nothing.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if self.flags.delete_on_close {
            self.fs.detach_on_close(&self.path, &self.file);
        }
        let mut guard = self.file.write();
        let Some(file) = guard.as_file_mut() else {
            unreachable!()
        };
        file.open_count -= 1;
        if file.marked_for_deletion && file.open_count == 0 {
            file.content.reclaim();
        }
    }
}

impl Drop for ByteChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl io::Read for ByteChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ByteChannel::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for ByteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ByteChannel::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing is buffered.
        Ok(())
    }
}

impl io::Seek for ByteChannel {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => i128::from(offset),
            io::SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            io::SeekFrom::End(delta) => i128::from(self.size()?) + i128::from(delta),
        };
        let target = u64::try_from(target).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        self.set_position(target)?;
        Ok(self.position)
    }
}
