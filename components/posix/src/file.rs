//! Open files - shared, reference-counted open instances of a vnode
//!
//! ## Design
//!
//! An [`OpenFile`] is only ever reachable through a [`FileRef`]. Cloning a
//! `FileRef` is the increment and dropping it is the decrement, so every
//! aliasing slot (dup2 within a table, fork across tables) owns exactly one
//! count and gives it back exactly once.
//!
//! Each count is mirrored by one hold on the backing vnode. When the count
//! reaches zero the last vnode hold is released and the object is gone.
//!
//! ## Locking
//!
//! The per-file lock guards the offset. Read and write hold it across the
//! whole storage transfer so aliased handles never interleave offset
//! updates. The count is atomic and never needs the file lock, so taking a
//! reference under the table lock cannot wait on a transfer in progress.

use core::fmt;
use std::sync::Arc;

use kaal_vfs::{OpenFlags, RefCount, VnodeRef};
use spin::{Mutex, MutexGuard};

/// State guarded by the per-file lock
#[derive(Debug)]
pub struct FileState {
    offset: u64,
}

impl FileState {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Move the offset forward by a completed transfer
    pub fn advance(&mut self, count: usize) {
        self.offset = self.offset.saturating_add(count as u64);
    }
}

/// One open instance of a backing object
pub struct OpenFile {
    vnode: VnodeRef,
    flags: OpenFlags,
    refcount: RefCount,
    state: Mutex<FileState>,
}

/// Outcome of dropping one reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other references remain
    Retained { remaining: usize },

    /// That was the last reference; the vnode hold is gone
    Destroyed,
}

impl OpenFile {
    /// Wrap a freshly opened vnode
    ///
    /// Takes over the single hold the storage layer registered on `vnode`
    /// when it was opened. The result starts with a count of one.
    pub fn create(vnode: VnodeRef, flags: OpenFlags, offset: u64) -> FileRef {
        let refcount = RefCount::new();
        refcount.incref();
        let file = Arc::new(OpenFile {
            vnode,
            flags,
            refcount,
            state: Mutex::new(FileState { offset }),
        });
        FileRef { file, live: true }
    }

    pub fn vnode(&self) -> &VnodeRef {
        &self.vnode
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn offset(&self) -> u64 {
        self.state.lock().offset
    }

    pub fn refcount(&self) -> usize {
        self.refcount.get()
    }

    /// Acquire the per-file lock
    pub fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock()
    }

    fn incref(&self) {
        self.refcount.incref();
        self.vnode.incref();
    }

    /// Give back one count and its vnode hold, returning the count left
    fn decref(&self) -> usize {
        let remaining = self.refcount.decref();
        self.vnode.decref();

        if remaining == 0 {
            log::debug!("file: last reference dropped, vnode released");
        }
        remaining
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("flags", &self.flags)
            .field("offset", &self.offset())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Counted reference to an [`OpenFile`]
///
/// `clone` is incref, `drop` is decref.
pub struct FileRef {
    file: Arc<OpenFile>,
    // cleared once this reference has given its count back
    live: bool,
}

impl FileRef {
    /// Drop this reference and report whether the file survived
    ///
    /// The outcome is that of this reference's own decrement.
    pub fn decref(mut self) -> Release {
        match self.release() {
            Some(0) | None => Release::Destroyed,
            Some(remaining) => Release::Retained { remaining },
        }
    }

    /// Whether two references name the same open file
    pub fn ptr_eq(a: &FileRef, b: &FileRef) -> bool {
        Arc::ptr_eq(&a.file, &b.file)
    }

    fn release(&mut self) -> Option<usize> {
        if !self.live {
            return None;
        }
        self.live = false;
        Some(self.file.decref())
    }
}

impl Clone for FileRef {
    fn clone(&self) -> Self {
        self.file.incref();
        FileRef {
            file: Arc::clone(&self.file),
            live: true,
        }
    }
}

impl Drop for FileRef {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::ops::Deref for FileRef {
    type Target = OpenFile;

    fn deref(&self) -> &OpenFile {
        &self.file
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.file, f)
    }
}
