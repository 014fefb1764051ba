//! Console character device
//!
//! Reads drain bytes queued with [`Console::push_input`]; writes are appended
//! to an output log. Offsets are ignored and the size is always zero.

use std::collections::VecDeque;

use spin::Mutex;

use crate::{FileStat, RefCount, Result, VfsError, Vnode, VnodeKind};

pub struct Console {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
    refs: RefCount,
}

impl Console {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
            refs: RefCount::new(),
        }
    }

    /// Queue bytes to be returned by subsequent reads
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Take everything written so far
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut *self.output.lock())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Vnode for Console {
    fn read_at(&self, _offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut input = self.input.lock();
        let count = buf.len().min(input.len());
        for (dst, src) in buf.iter_mut().zip(input.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }

    fn write_at(&self, _offset: u64, buf: &[u8]) -> Result<usize> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Result<FileStat> {
        Ok(FileStat {
            size: 0,
            mode: 0o666,
            kind: VnodeKind::CharDevice,
        })
    }

    fn truncate(&self, _len: u64) -> Result<()> {
        Err(VfsError::Unsupported("truncate on a character device"))
    }

    fn refs(&self) -> &RefCount {
        &self.refs
    }
}
