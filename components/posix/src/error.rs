//! Error kinds returned by the file syscalls

use kaal_vfs::VfsError;
use thiserror::Error;

use crate::Fd;

/// Error numbers reported to user space
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const ENOMEM: i32 = 12;
    pub const EEXIST: i32 = 17;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const ENOSYS: i32 = 38;
    pub const ENOTEMPTY: i32 = 39;
}

/// Error types for file syscalls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PosixError {
    #[error("Bad file handle {fd}")]
    BadHandle { fd: Fd },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Table capacity {capacity} leaves no room for the three console slots")]
    CapacityTooSmall { capacity: usize },

    #[error("File table full ({capacity} slots)")]
    TableFull { capacity: usize },

    #[error("Out of memory (requested: {requested} slots)")]
    OutOfMemory { requested: usize },

    #[error(transparent)]
    Storage(#[from] VfsError),
}

impl PosixError {
    /// Error number for the syscall return convention
    pub fn errno(&self) -> i32 {
        match self {
            PosixError::BadHandle { .. } => errno::EBADF,
            PosixError::InvalidArgument(_) | PosixError::CapacityTooSmall { .. } => errno::EINVAL,
            PosixError::TableFull { .. } => errno::EMFILE,
            PosixError::OutOfMemory { .. } => errno::ENOMEM,
            PosixError::Storage(err) => match err {
                VfsError::NotFound { .. } => errno::ENOENT,
                VfsError::AlreadyExists { .. } => errno::EEXIST,
                VfsError::NotADirectory { .. } => errno::ENOTDIR,
                VfsError::IsADirectory { .. } => errno::EISDIR,
                VfsError::NotEmpty { .. } => errno::ENOTEMPTY,
                VfsError::InvalidPath { .. } => errno::EINVAL,
                VfsError::Unsupported(_) => errno::ENOSYS,
                VfsError::IoError(_) => errno::EIO,
            },
        }
    }
}

pub type Result<T> = core::result::Result<T, PosixError>;
