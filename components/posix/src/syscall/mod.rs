//! File system call interface
//!
//! Each syscall resolves the calling process's table, works on the open file
//! it names and talks to the storage layer. Calls are synchronous and leave
//! no state behind except offsets and reference counts.
//!
//! `Process::dispatch` is the numbered entry point; it folds the typed
//! results into the kernel return convention (value, or `-errno`).

pub mod numbers;

use kaal_vfs::OpenFlags;

use crate::fdtable::Fd;
use crate::file::{OpenFile, Release};
use crate::process::{Pid, Process};
use crate::{PosixError, Result};

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Origin for `lseek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = PosixError;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            SEEK_SET => Ok(Whence::Set),
            SEEK_CUR => Ok(Whence::Cur),
            SEEK_END => Ok(Whence::End),
            _ => Err(PosixError::InvalidArgument("unknown seek origin")),
        }
    }
}

/// A path copied in from user space; `None` stands for a null pointer.
fn user_path(path: Option<&str>) -> Result<&str> {
    match path {
        Some(path) if !path.is_empty() => Ok(path),
        Some(_) => Err(PosixError::InvalidArgument("empty path")),
        None => Err(PosixError::InvalidArgument("null path")),
    }
}

/// Decode raw open flags, rejecting unknown bits and the unused access mode
fn open_flags(raw: u32) -> Result<OpenFlags> {
    OpenFlags::from_bits(raw)
        .filter(|flags| flags.access_mode().is_some())
        .ok_or(PosixError::InvalidArgument("unrecognized open flags"))
}

/// `base + delta`, kept within `0..=i64::MAX`
fn seek_target(base: u64, delta: i64) -> Option<u64> {
    let target = if delta >= 0 {
        base.checked_add(delta as u64)
    } else {
        base.checked_sub(delta.unsigned_abs())
    };
    target.filter(|&offset| offset <= i64::MAX as u64)
}

impl Process {
    /// Open `path` and install the new file in the lowest free handle
    ///
    /// With `O_APPEND` the initial offset is the file's current size.
    ///
    /// # Errors
    /// - `InvalidArgument` for a null/empty path or unrecognized flags
    /// - `Storage` for anything the storage layer rejects (e.g. not found)
    /// - `TableFull` if no handle is free; the file is released again
    pub fn sys_open(&self, path: Option<&str>, flags: u32) -> Result<Fd> {
        let path = user_path(path)?;
        let flags = open_flags(flags)?;

        let vnode = self
            .vfs()
            .open(path, flags)
            .inspect_err(|err| log::debug!("open {path}: {err}"))?;
        let offset = if flags.contains(OpenFlags::APPEND) {
            match vnode.stat() {
                Ok(stat) => stat.size,
                Err(err) => {
                    self.vfs().close(vnode);
                    return Err(err.into());
                }
            }
        } else {
            0
        };

        let fd = self
            .files()
            .add(OpenFile::create(vnode, flags, offset))
            .inspect_err(|err| log::debug!("open {path}: {err}"))?;
        log::debug!("process {}: opened {path} as {fd}", self.pid());
        Ok(fd)
    }

    /// Read into `buf` at the file's offset, advancing it by the bytes read
    ///
    /// The file lock is held for the whole transfer.
    pub fn sys_read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let file = self.files().get(fd)?;
        if !file.flags().readable() {
            return Err(PosixError::BadHandle { fd });
        }

        let mut state = file.lock();
        let count = file.vnode().read_at(state.offset(), buf)?;
        state.advance(count);
        Ok(count)
    }

    /// Write `buf` at the file's offset, advancing it by the bytes written
    ///
    /// The file lock is held for the whole transfer.
    pub fn sys_write(&self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let file = self.files().get(fd)?;
        if !file.flags().writable() {
            return Err(PosixError::BadHandle { fd });
        }

        let mut state = file.lock();
        let count = file.vnode().write_at(state.offset(), buf)?;
        state.advance(count);
        Ok(count)
    }

    /// Reposition the offset of `fd`
    ///
    /// `SEEK_END` asks the storage layer for the current size under the file
    /// lock.
    pub fn sys_lseek(&self, fd: Fd, pos: i64, whence: i32) -> Result<u64> {
        let file = self.files().get(fd)?;
        let whence = Whence::try_from(whence)?;

        let mut state = file.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => state.offset(),
            Whence::End => file.vnode().stat()?.size,
        };
        let offset = seek_target(base, pos)
            .ok_or(PosixError::InvalidArgument("seek outside the file"))?;
        state.set_offset(offset);
        Ok(offset)
    }

    /// Close `fd`, dropping its reference to the open file
    ///
    /// Closing an already closed handle is `BadHandle`.
    pub fn sys_close(&self, fd: Fd) -> Result<()> {
        let file = self
            .files()
            .remove(fd)?
            .ok_or(PosixError::BadHandle { fd })?;

        match file.decref() {
            Release::Destroyed => log::debug!("process {}: closed {fd}, file released", self.pid()),
            Release::Retained { remaining } => {
                log::trace!("process {}: closed {fd}, {remaining} references left", self.pid())
            }
        }
        Ok(())
    }

    /// Make `new` name the same open file as `old`
    ///
    /// `dup2(fd, fd)` on an open handle changes nothing. Otherwise the new
    /// reference is installed before the previous occupant of `new` is
    /// released.
    pub fn sys_dup2(&self, old: Fd, new: Fd) -> Result<Fd> {
        let old_open = self.files().contains(old)?;
        self.files().contains(new)?;
        if !old_open {
            return Err(PosixError::BadHandle { fd: old });
        }
        if old == new {
            return Ok(new);
        }

        let file = self.files().get(old)?;
        if let Some(previous) = self.files().set(new, Some(file))? {
            if previous.decref() == Release::Destroyed {
                log::debug!("process {}: dup2 over {new} released its file", self.pid());
            }
        }
        Ok(new)
    }

    pub fn sys_remove(&self, path: Option<&str>) -> Result<()> {
        Ok(self.vfs().remove(user_path(path)?)?)
    }

    pub fn sys_mkdir(&self, path: Option<&str>, mode: u32) -> Result<()> {
        Ok(self.vfs().mkdir(user_path(path)?, mode)?)
    }

    pub fn sys_rmdir(&self, path: Option<&str>) -> Result<()> {
        Ok(self.vfs().rmdir(user_path(path)?)?)
    }

    pub fn sys_getpid(&self) -> Pid {
        self.pid()
    }

    /// Syscall dispatcher
    ///
    /// Runs `call` on behalf of this process and returns the value for the
    /// user's return register: the result on success, `-errno` on failure.
    pub fn dispatch(&self, call: Syscall<'_>) -> i64 {
        let number = call.number();

        let result = match call {
            Syscall::Open { path, flags } => self.sys_open(path, flags).map(i64::from),
            Syscall::Read { fd, buf } => self.sys_read(fd, buf).map(|n| n as i64),
            Syscall::Write { fd, buf } => self.sys_write(fd, buf).map(|n| n as i64),
            Syscall::Lseek { fd, pos, whence } => {
                self.sys_lseek(fd, pos, whence).map(|offset| offset as i64)
            }
            Syscall::Close { fd } => self.sys_close(fd).map(|()| 0),
            Syscall::Dup2 { old, new } => self.sys_dup2(old, new).map(i64::from),
            Syscall::Remove { path } => self.sys_remove(path).map(|()| 0),
            Syscall::Mkdir { path, mode } => self.sys_mkdir(path, mode).map(|()| 0),
            Syscall::Rmdir { path } => self.sys_rmdir(path).map(|()| 0),
            Syscall::Getpid => Ok(i64::from(self.sys_getpid())),
        };

        #[cfg(feature = "debug-syscall")]
        log::trace!("[syscall] pid {} #{number:#x} -> {result:?}", self.pid());

        match result {
            Ok(value) => value,
            Err(err) => {
                log::trace!("[syscall] #{number:#x} failed: {err}");
                -i64::from(err.errno())
            }
        }
    }
}

/// A decoded syscall with its arguments already copied in from user space
#[derive(Debug)]
pub enum Syscall<'a> {
    Open { path: Option<&'a str>, flags: u32 },
    Read { fd: Fd, buf: &'a mut [u8] },
    Write { fd: Fd, buf: &'a [u8] },
    Lseek { fd: Fd, pos: i64, whence: i32 },
    Close { fd: Fd },
    Dup2 { old: Fd, new: Fd },
    Remove { path: Option<&'a str> },
    Mkdir { path: Option<&'a str>, mode: u32 },
    Rmdir { path: Option<&'a str> },
    Getpid,
}

impl Syscall<'_> {
    pub fn number(&self) -> u64 {
        match self {
            Syscall::Open { .. } => numbers::SYS_OPEN,
            Syscall::Read { .. } => numbers::SYS_READ,
            Syscall::Write { .. } => numbers::SYS_WRITE,
            Syscall::Lseek { .. } => numbers::SYS_LSEEK,
            Syscall::Close { .. } => numbers::SYS_CLOSE,
            Syscall::Dup2 { .. } => numbers::SYS_DUP2,
            Syscall::Remove { .. } => numbers::SYS_REMOVE,
            Syscall::Mkdir { .. } => numbers::SYS_MKDIR,
            Syscall::Rmdir { .. } => numbers::SYS_RMDIR,
            Syscall::Getpid => numbers::SYS_GETPID,
        }
    }
}
