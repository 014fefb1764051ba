//! Virtual File System (VFS) - Storage layer seen by the file syscalls
//!
//! # Purpose
//! Provides the storage-layer contract that the POSIX file layer is written
//! against: reference-counted vnodes, path operations, and a small front end
//! that routes names to either a device or the root file system.
//!
//! # Integration Points
//! - Depends on: nothing (in-memory backends only)
//! - Provides to: POSIX layer (`kaal-posix`)
//! - Capabilities required: none
//!
//! # Architecture
//! - `Vnode`: one backing object (file or device) with its own hold count
//! - `FileSystem`: path resolution for a tree of vnodes
//! - `Vfs`: one root file system plus named devices (`con:`)
//! - `RamFs` and `Console`: the in-memory backends
//!
//! # Testing Strategy
//! - Unit tests: path handling, open flags, hold counting
//! - Integration tests: concurrent hold counting from many threads

use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

pub mod console;
pub mod ramfs;

pub use console::Console;
pub use ramfs::RamFs;

/// VFS error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("File already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Is a directory: {path}")]
    IsADirectory { path: String },

    #[error("Directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("Invalid path: {path:?}")]
    InvalidPath { path: String },

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = core::result::Result<T, VfsError>;

bitflags! {
    /// File open flags
    ///
    /// The access mode lives in the low two bits; read-only is the absence
    /// of both `WRONLY` and `RDWR`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 1 << 0;
        const RDWR = 1 << 1;
        const CREAT = 1 << 2;
        const EXCL = 1 << 3;
        const TRUNC = 1 << 4;
        const APPEND = 1 << 5;
    }
}

/// Access-mode field of [`OpenFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    /// Read-only access (no mode bits set)
    pub const RDONLY: Self = Self::empty();

    /// Mask covering the access-mode field
    pub const ACCMODE: Self = Self::WRONLY.union(Self::RDWR);

    /// Decode the access mode
    ///
    /// Returns `None` when both mode bits are set, which names no mode.
    pub fn access_mode(self) -> Option<AccessMode> {
        match (self.contains(Self::WRONLY), self.contains(Self::RDWR)) {
            (false, false) => Some(AccessMode::ReadOnly),
            (true, false) => Some(AccessMode::WriteOnly),
            (false, true) => Some(AccessMode::ReadWrite),
            (true, true) => None,
        }
    }

    pub fn readable(self) -> bool {
        matches!(
            self.access_mode(),
            Some(AccessMode::ReadOnly | AccessMode::ReadWrite)
        )
    }

    pub fn writable(self) -> bool {
        matches!(
            self.access_mode(),
            Some(AccessMode::WriteOnly | AccessMode::ReadWrite)
        )
    }
}

/// Kind of object a vnode refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeKind {
    File,
    CharDevice,
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mode: u32,
    pub kind: VnodeKind,
}

/// Thread-safe hold counter embedded in every vnode
///
/// The storage layer tracks how many open instances still refer to a vnode.
/// Dropping below zero is a kernel defect and panics.
#[derive(Debug, Default)]
pub struct RefCount(AtomicUsize);

impl RefCount {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn incref(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn decref(&self) -> usize {
        let prev = self.0.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "vnode hold count underflow");
        prev - 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// A backing object: regular file or device
pub trait Vnode: Send + Sync {
    /// Read into `buf` starting at `offset`, returning the bytes transferred
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` starting at `offset`, returning the bytes transferred
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize>;

    /// Get file metadata
    fn stat(&self) -> Result<FileStat>;

    /// Cut or extend the object to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;

    /// The vnode's hold counter
    fn refs(&self) -> &RefCount;

    /// Register one more hold on this vnode
    fn incref(&self) {
        self.refs().incref();
    }

    /// Release one hold on this vnode
    fn decref(&self) {
        self.refs().decref();
    }

    /// Number of holds currently registered
    fn refcount(&self) -> usize {
        self.refs().get()
    }
}

/// Shared handle to a vnode
pub type VnodeRef = Arc<dyn Vnode>;

/// File system trait
///
/// `open` returns the vnode with one hold already registered for the caller.
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<VnodeRef>;

    fn remove(&self, path: &str) -> Result<()>;

    fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    fn rmdir(&self, path: &str) -> Result<()>;
}

/// Virtual File System
///
/// A name of the form `dev:` selects a device; every other path goes to the
/// root file system.
#[derive(Default)]
pub struct Vfs {
    root: Option<Box<dyn FileSystem>>,
    devices: BTreeMap<String, VnodeRef>,
}

enum Target<'a> {
    Device(&'a VnodeRef),
    Root(&'a dyn FileSystem, &'a str),
}

impl Vfs {
    /// Create a new VFS instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the root file system, replacing any previous one
    pub fn mount_root(&mut self, fs: Box<dyn FileSystem>) {
        log::debug!("vfs: root file system mounted");
        self.root = Some(fs);
    }

    /// Register a device under `name` (without the trailing colon)
    pub fn add_device(&mut self, name: &str, vnode: VnodeRef) -> Result<()> {
        if name.is_empty() || name.contains(':') || name.contains('/') {
            return Err(VfsError::InvalidPath {
                path: name.to_string(),
            });
        }
        if self.devices.contains_key(name) {
            return Err(VfsError::AlreadyExists {
                path: format!("{name}:"),
            });
        }
        log::debug!("vfs: device {name}: registered");
        self.devices.insert(name.to_string(), vnode);
        Ok(())
    }

    fn resolve<'a>(&'a self, path: &'a str) -> Result<Target<'a>> {
        if path.is_empty() {
            return Err(VfsError::InvalidPath {
                path: path.to_string(),
            });
        }

        if let Some((device, rest)) = path.split_once(':') {
            return match self.devices.get(device) {
                Some(vnode) if rest.is_empty() => Ok(Target::Device(vnode)),
                _ => Err(VfsError::NotFound {
                    path: path.to_string(),
                }),
            };
        }

        match self.root.as_deref() {
            Some(fs) => Ok(Target::Root(fs, path)),
            None => Err(VfsError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    /// Open a file, registering one hold on the returned vnode
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<VnodeRef> {
        match self.resolve(path)? {
            Target::Device(vnode) => {
                vnode.incref();
                Ok(Arc::clone(vnode))
            }
            Target::Root(fs, path) => fs.open(path, flags),
        }
    }

    /// Release the hold obtained from [`Vfs::open`]
    pub fn close(&self, vnode: VnodeRef) {
        vnode.decref();
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        match self.resolve(path)? {
            Target::Device(_) => Err(VfsError::Unsupported("remove on a device")),
            Target::Root(fs, path) => fs.remove(path),
        }
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        match self.resolve(path)? {
            Target::Device(_) => Err(VfsError::AlreadyExists {
                path: path.to_string(),
            }),
            Target::Root(fs, path) => fs.mkdir(path, mode),
        }
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        match self.resolve(path)? {
            Target::Device(_) => Err(VfsError::NotADirectory {
                path: path.to_string(),
            }),
            Target::Root(fs, path) => fs.rmdir(path),
        }
    }
}

impl core::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Vfs")
            .field("root", &self.root.is_some())
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs_with_console() -> (Vfs, Arc<Console>) {
        let console = Arc::new(Console::new());
        let mut vfs = Vfs::new();
        vfs.mount_root(Box::new(RamFs::new()));
        vfs.add_device("con", console.clone()).unwrap();
        (vfs, console)
    }

    #[test]
    fn test_vfs_creation() {
        let vfs = Vfs::new();
        assert!(matches!(
            vfs.open("a.txt", OpenFlags::RDONLY),
            Err(VfsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_access_modes() {
        assert_eq!(OpenFlags::RDONLY.access_mode(), Some(AccessMode::ReadOnly));
        assert_eq!(OpenFlags::WRONLY.access_mode(), Some(AccessMode::WriteOnly));
        assert_eq!(OpenFlags::RDWR.access_mode(), Some(AccessMode::ReadWrite));
        assert_eq!(OpenFlags::ACCMODE.access_mode(), None);

        assert!(OpenFlags::RDONLY.readable());
        assert!(!OpenFlags::RDONLY.writable());
        assert!(!OpenFlags::WRONLY.readable());
        assert!((OpenFlags::RDWR | OpenFlags::APPEND).writable());
    }

    #[test]
    fn test_device_open_takes_hold() {
        let (vfs, console) = vfs_with_console();

        let a = vfs.open("con:", OpenFlags::RDONLY).unwrap();
        let b = vfs.open("con:", OpenFlags::WRONLY).unwrap();
        assert_eq!(console.refcount(), 2);

        vfs.close(a);
        assert_eq!(console.refcount(), 1);
        vfs.close(b);
        assert_eq!(console.refcount(), 0);
    }

    #[test]
    fn test_unknown_device() {
        let (vfs, _console) = vfs_with_console();
        assert!(matches!(
            vfs.open("lpt:", OpenFlags::WRONLY),
            Err(VfsError::NotFound { .. })
        ));
        assert!(matches!(
            vfs.open("con:extra", OpenFlags::WRONLY),
            Err(VfsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let (mut vfs, console) = vfs_with_console();
        assert!(matches!(
            vfs.add_device("con", console),
            Err(VfsError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_path_ops_route_to_root() {
        let (vfs, _console) = vfs_with_console();

        vfs.mkdir("docs", 0o755).unwrap();
        let v = vfs
            .open("docs/readme", OpenFlags::WRONLY | OpenFlags::CREAT)
            .unwrap();
        vfs.close(v);

        assert!(matches!(vfs.rmdir("docs"), Err(VfsError::NotEmpty { .. })));
        vfs.remove("docs/readme").unwrap();
        vfs.rmdir("docs").unwrap();

        assert!(matches!(vfs.remove("con:"), Err(VfsError::Unsupported(_))));
        assert!(matches!(vfs.open("", OpenFlags::RDONLY), Err(VfsError::InvalidPath { .. })));
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_refcount_underflow_panics() {
        let count = RefCount::new();
        count.decref();
    }
}
