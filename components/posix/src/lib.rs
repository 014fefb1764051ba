//! POSIX File Layer - Descriptor tables and file syscalls
//!
//! # Purpose
//! Maps the small integer handles a process uses to shared, reference-counted
//! open files, and implements open/read/write/lseek/close/dup2 plus the path
//! syscalls on top of the storage layer.
//!
//! # Integration Points
//! - Depends on: VFS (`kaal-vfs`) for vnodes and path operations
//! - Provides to: syscall entry (`Process::dispatch`), process creation and fork
//! - Capabilities required: none
//!
//! # Architecture
//! - `OpenFile` / `FileRef`: one open instance of a vnode with flags, offset and
//!   a reference count; `FileRef` clone/drop are the only incref/decref
//! - `FdTable`: per-process fixed-capacity slot array with one table lock
//! - `Process`: owns one table; `fork` duplicates it with shared ownership
//! - `syscall`: the file syscalls and the numbered dispatcher
//!
//! # Testing Strategy
//! - Unit tests: reference counting, slot management, flag and seek decoding
//! - Integration tests: syscall scenarios, fork, dup2 aliasing, exhaustion
//! - Concurrency tests: aliased writers, concurrent opens

mod error;

pub mod config;
pub mod fdtable;
pub mod file;
pub mod process;
pub mod syscall;

pub use config::{ConfigError, FileTableConfig, OPEN_MAX, RESERVED_FDS};
pub use error::{errno, PosixError, Result};
pub use fdtable::{FdTable, Fd, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
pub use file::{FileRef, FileState, OpenFile, Release};
pub use process::{Pid, Process};
pub use syscall::{Syscall, Whence, SEEK_CUR, SEEK_END, SEEK_SET};

/// Open flag bits as passed to `open`
pub mod fcntl {
    use kaal_vfs::OpenFlags;

    pub const O_RDONLY: u32 = OpenFlags::RDONLY.bits();
    pub const O_WRONLY: u32 = OpenFlags::WRONLY.bits();
    pub const O_RDWR: u32 = OpenFlags::RDWR.bits();
    pub const O_ACCMODE: u32 = OpenFlags::ACCMODE.bits();
    pub const O_CREAT: u32 = OpenFlags::CREAT.bits();
    pub const O_EXCL: u32 = OpenFlags::EXCL.bits();
    pub const O_TRUNC: u32 = OpenFlags::TRUNC.bits();
    pub const O_APPEND: u32 = OpenFlags::APPEND.bits();
}
