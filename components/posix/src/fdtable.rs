//! File descriptor table
//!
//! Each process owns one table mapping small integer handles to shared
//! [`FileRef`]s.
//!
//! ## Design
//!
//! - The table has a fixed number of slots chosen at creation
//! - Slots are indexed 0 to (capacity - 1); the index is the handle
//! - Empty slots hold `None`
//! - Slots 0, 1 and 2 are bound to the console by [`FdTable::init`]; 1 and 2
//!   alias the same open file
//!
//! ```text
//! FdTable (process A)            FdTable (process B, forked)
//!   ├─[0] → stdin ──────────────────[0]
//!   ├─[1] → stdout (refcount 4) ────[1]
//!   ├─[2] ─┘                 └──────[2]
//!   ├─[3] → "notes" ────────────────[3]
//!   └─[5] ─┘ (dup2)           └─────[5]
//! ```
//!
//! ## Locking
//!
//! One table-wide lock serializes every structural change, independent of
//! the per-file locks. Taking a reference under the table lock only touches
//! atomic counts, so a transfer holding a file lock never stalls the table.
//! Displaced references are handed back to the caller so their final decref
//! runs after the table lock is released.

use core::fmt;

use kaal_vfs::{OpenFlags, Vfs};
use spin::Mutex;

use crate::config::{ConfigError, FileTableConfig, RESERVED_FDS};
use crate::file::{FileRef, OpenFile};
use crate::{PosixError, Result};

/// Process-visible file handle
pub type Fd = i32;

pub const STDIN_FILENO: Fd = 0;
pub const STDOUT_FILENO: Fd = 1;
pub const STDERR_FILENO: Fd = 2;

/// Per-process file descriptor table
pub struct FdTable {
    slots: Mutex<Vec<Option<FileRef>>>,
    capacity: usize,
}

impl FdTable {
    /// Allocate a table with `capacity` empty slots
    ///
    /// # Errors
    /// Returns `PosixError::OutOfMemory` if the slot array cannot be allocated
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let slots = empty_slots(capacity)?;
        Ok(Self {
            slots: Mutex::new(slots),
            capacity,
        })
    }

    /// Create a process's initial table with the console bound to 0, 1 and 2
    ///
    /// Handle 0 gets a read-only console file. Handles 1 and 2 share one
    /// write-only console file whose count is therefore 2.
    ///
    /// # Errors
    /// - `PosixError::CapacityTooSmall` if the capacity cannot hold the console slots
    /// - `PosixError::OutOfMemory` if the table cannot be allocated
    /// - `PosixError::Storage` if the console cannot be opened
    ///
    /// Any console file opened before the failure is released.
    pub fn init(vfs: &Vfs, config: &FileTableConfig) -> Result<Self> {
        if let Err(ConfigError::CapacityTooSmall { capacity }) = config.validate() {
            return Err(PosixError::CapacityTooSmall { capacity });
        }

        let table = Self::with_capacity(config.capacity)?;
        let stdin = open_console(vfs, &config.console, OpenFlags::RDONLY)?;
        let stdout = open_console(vfs, &config.console, OpenFlags::WRONLY)?;

        {
            let mut slots = table.slots.lock();
            slots[STDIN_FILENO as usize] = Some(stdin);
            slots[STDERR_FILENO as usize] = Some(stdout.clone());
            slots[STDOUT_FILENO as usize] = Some(stdout);
        }

        log::debug!(
            "fdtable: initialized {} slots, console {}",
            config.capacity,
            config.console
        );
        Ok(table)
    }

    /// Number of slots in this table
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Translate a handle into a slot index, checking the actual capacity
    #[inline]
    fn index(&self, fd: Fd) -> Result<usize> {
        usize::try_from(fd)
            .ok()
            .filter(|&index| index < self.capacity)
            .ok_or(PosixError::BadHandle { fd })
    }

    /// Install `file` in the lowest free slot at or above 3
    ///
    /// The count of `file` is not touched; the table takes over the caller's
    /// reference. If no slot is free the reference is released.
    ///
    /// # Errors
    /// Returns `PosixError::TableFull` if every user slot is occupied
    pub fn add(&self, file: FileRef) -> Result<Fd> {
        let mut slots = self.slots.lock();
        let free = (RESERVED_FDS..self.capacity)
            .find(|&index| slots[index].is_none())
            .and_then(|index| Fd::try_from(index).ok().map(|fd| (index, fd)));

        match free {
            Some((index, fd)) => {
                slots[index] = Some(file);
                Ok(fd)
            }
            None => {
                drop(slots);
                log::debug!("fdtable: no free slot among {}", self.capacity);
                drop(file);
                Err(PosixError::TableFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Look up the file at `fd`
    ///
    /// The returned reference is counted; it keeps the file alive for the
    /// duration of a syscall even if another thread closes `fd`.
    ///
    /// # Errors
    /// Returns `PosixError::BadHandle` if `fd` is out of range or empty
    pub fn get(&self, fd: Fd) -> Result<FileRef> {
        let index = self.index(fd)?;
        self.slots.lock()[index]
            .clone()
            .ok_or(PosixError::BadHandle { fd })
    }

    /// Whether `fd` is occupied, without touching any count
    ///
    /// # Errors
    /// Returns `PosixError::BadHandle` if `fd` is out of range
    pub fn contains(&self, fd: Fd) -> Result<bool> {
        let index = self.index(fd)?;
        Ok(self.slots.lock()[index].is_some())
    }

    /// Install `file` (or nothing) at `fd`, returning the previous occupant
    ///
    /// The caller decides what to do with the previous occupant; dropping it
    /// is the decref.
    ///
    /// # Errors
    /// Returns `PosixError::BadHandle` if `fd` is out of range
    pub fn set(&self, fd: Fd, file: Option<FileRef>) -> Result<Option<FileRef>> {
        let index = self.index(fd)?;
        let mut slots = self.slots.lock();
        Ok(core::mem::replace(&mut slots[index], file))
    }

    /// Empty the slot at `fd`, returning the previous occupant
    pub fn remove(&self, fd: Fd) -> Result<Option<FileRef>> {
        self.set(fd, None)
    }

    /// Copy this table for a forked process
    ///
    /// Every occupied slot is shared with the new table at the same index,
    /// each share taking one count. If the copy cannot be completed the
    /// partially built table is dropped, giving every count back.
    ///
    /// # Errors
    /// Returns `PosixError::OutOfMemory` if the new table cannot be allocated
    pub fn duplicate(&self) -> Result<Self> {
        let slots = self.slots.lock();
        let mut copy: Vec<Option<FileRef>> = Vec::new();
        copy.try_reserve_exact(self.capacity)
            .map_err(|_| PosixError::OutOfMemory {
                requested: self.capacity,
            })?;
        copy.extend(slots.iter().cloned());

        log::debug!(
            "fdtable: duplicated {} open handles",
            copy.iter().flatten().count()
        );
        Ok(Self {
            slots: Mutex::new(copy),
            capacity: self.capacity,
        })
    }

    /// Number of occupied slots
    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// Occupied handles in ascending order
    pub fn handles(&self) -> Vec<Fd> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(index, _)| Fd::try_from(index).ok())
            .collect()
    }
}

fn empty_slots(capacity: usize) -> Result<Vec<Option<FileRef>>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| PosixError::OutOfMemory {
            requested: capacity,
        })?;
    slots.resize_with(capacity, || None);
    Ok(slots)
}

fn open_console(vfs: &Vfs, path: &str, flags: OpenFlags) -> Result<FileRef> {
    let vnode = vfs.open(path, flags)?;
    Ok(OpenFile::create(vnode, flags, 0))
}

impl Drop for FdTable {
    fn drop(&mut self) {
        let slots = self.slots.get_mut();
        let open = slots.iter().flatten().count();
        if open > 0 {
            log::debug!("fdtable: closing {open} handles");
        }
        slots.clear();
    }
}

impl fmt::Debug for FdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdTable")
            .field("capacity", &self.capacity)
            .field("open", &self.handles())
            .finish()
    }
}
