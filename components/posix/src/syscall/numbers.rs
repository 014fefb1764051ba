//! System call numbers
//!
//! File syscalls are in the 0x20+ range, process queries in the 0x40+ range.

/// Open a file by path (path, flags)
pub const SYS_OPEN: u64 = 0x20;

/// Read from a handle (fd, buf, len)
pub const SYS_READ: u64 = 0x21;

/// Write to a handle (fd, buf, len)
pub const SYS_WRITE: u64 = 0x22;

/// Reposition a handle's offset (fd, pos, whence)
pub const SYS_LSEEK: u64 = 0x23;

/// Close a handle (fd)
pub const SYS_CLOSE: u64 = 0x24;

/// Make a second handle name the same open file (old, new)
pub const SYS_DUP2: u64 = 0x25;

/// Remove a file by path (path)
pub const SYS_REMOVE: u64 = 0x26;

/// Create a directory (path, mode)
pub const SYS_MKDIR: u64 = 0x27;

/// Remove an empty directory (path)
pub const SYS_RMDIR: u64 = 0x28;

/// Get the calling process's id
pub const SYS_GETPID: u64 = 0x40;
