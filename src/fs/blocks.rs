// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Block-granular file content.
//!
//! File bytes live in a list of fixed-size heap blocks; the logical size is
//! tracked separately and is always covered by the allocated blocks. All
//! allocation is charged against the owning [`FileStoreState`], which
//! enforces the optional per-store byte ceiling.

use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::Arc;

use super::errors::StoreFullError;

/// Shared accounting state of a file store.
///
/// One per file system; every [`FileContent`] holds a reference so blocks
/// are released even when a detached file is dropped through its last open
/// channel.
pub(crate) struct FileStoreState {
    pub(crate) name: String,
    pub(crate) block_size: usize,
    pub(crate) read_only: bool,
    pub(crate) capacity: Option<u64>,
    allocated: AtomicU64,
}

impl FileStoreState {
    pub(crate) fn new(
        name: String,
        block_size: usize,
        read_only: bool,
        capacity: Option<u64>,
    ) -> Self {
        Self {
            name,
            block_size,
            read_only,
            capacity,
            allocated: AtomicU64::new(0),
        }
    }

    pub(crate) fn allocated(&self) -> u64 {
        self.allocated.load(SeqCst)
    }

    fn charge(&self, bytes: u64) -> Result<(), StoreFullError> {
        let mut current = self.allocated.load(SeqCst);
        loop {
            let next = current.saturating_add(bytes);
            if let Some(capacity) = self.capacity {
                if next > capacity {
                    return Err(StoreFullError);
                }
            }
            match self
                .allocated
                .compare_exchange_weak(current, next, SeqCst, SeqCst)
            {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self, bytes: u64) {
        let previous = self.allocated.fetch_sub(bytes, SeqCst);
        debug_assert!(previous >= bytes);
    }
}

/// The byte content of one regular file.
pub(crate) struct FileContent {
    store: Arc<FileStoreState>,
    blocks: Vec<Box<[u8]>>,
    size: u64,
}

impl FileContent {
    pub(crate) fn new(store: Arc<FileStoreState>) -> Self {
        Self {
            store,
            blocks: Vec::new(),
            size: 0,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.size
    }

    fn block_size(&self) -> u64 {
        self.store.block_size as u64
    }

    /// Reads at `position`, returning the number of bytes copied. A position
    /// at or past the logical size reads zero bytes.
    pub(crate) fn read_at(&self, position: u64, buf: &mut [u8]) -> usize {
        if position >= self.size || buf.is_empty() {
            return 0;
        }
        let available = usize::try_from(self.size - position).unwrap_or(usize::MAX);
        let total = buf.len().min(available);
        let block_size = self.block_size();
        let mut copied = 0usize;
        while copied < total {
            let at = position + copied as u64;
            let block = usize::try_from(at / block_size).unwrap();
            let offset = usize::try_from(at % block_size).unwrap();
            let take = (total - copied).min(self.store.block_size - offset);
            buf[copied..copied + take].copy_from_slice(&self.blocks[block][offset..offset + take]);
            copied += take;
        }
        total
    }

    /// Writes at `position`, growing the file if the write ends past the
    /// current size. The gap between the old size and `position` reads as
    /// zeros.
    pub(crate) fn write_at(&mut self, position: u64, buf: &[u8]) -> Result<usize, StoreFullError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = position + buf.len() as u64;
        self.ensure_covered(end)?;
        let block_size = self.block_size();
        let mut copied = 0usize;
        while copied < buf.len() {
            let at = position + copied as u64;
            let block = usize::try_from(at / block_size).unwrap();
            let offset = usize::try_from(at % block_size).unwrap();
            let take = (buf.len() - copied).min(self.store.block_size - offset);
            self.blocks[block][offset..offset + take].copy_from_slice(&buf[copied..copied + take]);
            copied += take;
        }
        if end > self.size {
            self.size = end;
        }
        Ok(buf.len())
    }

    /// Shrinks the logical size; growing is a no-op. Whole blocks past the
    /// new size are freed and the tail of the last kept block is zeroed, so
    /// the region between size and allocation always reads as zeros.
    pub(crate) fn truncate(&mut self, new_size: u64) {
        if new_size >= self.size {
            return;
        }
        let block_size = self.block_size();
        let keep = usize::try_from(new_size.div_ceil(block_size)).unwrap();
        if keep < self.blocks.len() {
            let freed = (self.blocks.len() - keep) as u64 * block_size;
            self.blocks.truncate(keep);
            self.store.release(freed);
        }
        if let Some(last) = self.blocks.last_mut() {
            let offset = usize::try_from(new_size % block_size).unwrap();
            if offset > 0 {
                last[offset..].fill(0);
            }
        }
        self.size = new_size;
    }

    /// Frees every block. Used when a file marked for deletion loses its
    /// last open channel.
    pub(crate) fn reclaim(&mut self) {
        self.truncate(0);
        self.blocks.shrink_to_fit();
    }

    /// A deep copy charged against `store` (the target file system's store,
    /// which may differ from the source's).
    pub(crate) fn duplicate(
        &self,
        store: Arc<FileStoreState>,
    ) -> Result<FileContent, StoreFullError> {
        store.charge(self.blocks.len() as u64 * self.block_size())?;
        Ok(FileContent {
            store,
            blocks: self.blocks.clone(),
            size: self.size,
        })
    }

    fn ensure_covered(&mut self, end: u64) -> Result<(), StoreFullError> {
        let block_size = self.block_size();
        let needed = usize::try_from(end.div_ceil(block_size)).unwrap();
        if needed <= self.blocks.len() {
            return Ok(());
        }
        let add = needed - self.blocks.len();
        self.store.charge(add as u64 * block_size)?;
        self.blocks
            .extend((0..add).map(|_| vec![0u8; self.store.block_size].into_boxed_slice()));
        Ok(())
    }
}

impl Drop for FileContent {
    fn drop(&mut self) {
        self.store
            .release(self.blocks.len() as u64 * self.block_size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(block_size: usize, capacity: Option<u64>) -> FileContent {
        FileContent::new(Arc::new(FileStoreState::new(
            "test".to_string(),
            block_size,
            false,
            capacity,
        )))
    }

    #[test]
    fn write_and_read_across_blocks() {
        let mut content = content(4, None);
        let written = content.write_at(0, b"hello world").expect("Failed to write");
        assert_eq!(written, 11);
        assert_eq!(content.len(), 11);

        let mut buf = [0u8; 16];
        let read = content.read_at(0, &mut buf);
        assert_eq!(&buf[..read], b"hello world");

        // Read starting inside a later block.
        let read = content.read_at(6, &mut buf);
        assert_eq!(&buf[..read], b"world");
    }

    #[test]
    fn read_at_end_is_empty() {
        let mut content = content(4, None);
        content.write_at(0, b"abc").expect("Failed to write");
        let mut buf = [0u8; 4];
        assert_eq!(content.read_at(3, &mut buf), 0);
        assert_eq!(content.read_at(100, &mut buf), 0);
    }

    #[test]
    fn write_past_end_zero_fills() {
        let mut content = content(4, None);
        content.write_at(10, b"x").expect("Failed to write");
        assert_eq!(content.len(), 11);
        let mut buf = [0u8; 11];
        assert_eq!(content.read_at(0, &mut buf), 11);
        assert_eq!(&buf[..10], &[0u8; 10]);
        assert_eq!(buf[10], b'x');
    }

    #[test]
    fn truncate_zeroes_reused_tail() {
        let mut content = content(8, None);
        content.write_at(0, b"abcdefgh").expect("Failed to write");
        content.truncate(3);
        assert_eq!(content.len(), 3);
        content.write_at(6, b"z").expect("Failed to write");
        let mut buf = [0u8; 7];
        assert_eq!(content.read_at(0, &mut buf), 7);
        assert_eq!(&buf, b"abc\0\0\0z");
    }

    #[test]
    fn capacity_ceiling() {
        let mut content = content(4, Some(8));
        content.write_at(0, b"12345678").expect("Failed to write");
        assert!(content.write_at(8, b"9").is_err());
        content.truncate(0);
        content.write_at(0, b"1234").expect("Failed to write after truncate");
    }
}
