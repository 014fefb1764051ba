//! RamFS - in-memory file system
//!
//! Entries are kept in a flat map keyed by normalized path. Directories carry
//! no data of their own; a directory is non-empty when some key lies beneath
//! it.

use std::collections::BTreeMap;
use std::sync::Arc;

use spin::Mutex;

use crate::{FileStat, FileSystem, OpenFlags, RefCount, Result, VfsError, Vnode, VnodeKind, VnodeRef};

/// Default mode for files created through `open(.., CREAT)`
const DEFAULT_FILE_MODE: u32 = 0o644;

enum Entry {
    File(Arc<RamFile>),
    Dir { _mode: u32 },
}

/// In-memory file system
pub struct RamFs {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize `path` into `a/b/c` form; the root is the empty string.
fn normalize(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(VfsError::InvalidPath {
                        path: path.to_string(),
                    });
                }
            }
            _ => parts.push(part),
        }
    }
    Ok(parts.join("/"))
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// The parent of `path` must exist and be a directory.
fn check_parent(entries: &BTreeMap<String, Entry>, path: &str) -> Result<()> {
    let parent = parent_of(path);
    if parent.is_empty() {
        return Ok(());
    }
    match entries.get(parent) {
        Some(Entry::Dir { .. }) => Ok(()),
        Some(Entry::File(_)) => Err(VfsError::NotADirectory {
            path: parent.to_string(),
        }),
        None => Err(VfsError::NotFound {
            path: parent.to_string(),
        }),
    }
}

fn has_children(entries: &BTreeMap<String, Entry>, dir: &str) -> bool {
    let prefix = format!("{dir}/");
    entries
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(key, _)| key.starts_with(&prefix))
}

impl FileSystem for RamFs {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<VnodeRef> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(VfsError::IsADirectory { path });
        }

        let mut entries = self.entries.lock();
        let file = match entries.get(&path) {
            Some(Entry::Dir { .. }) => return Err(VfsError::IsADirectory { path }),
            Some(Entry::File(file)) => {
                if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
                    return Err(VfsError::AlreadyExists { path });
                }
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    file.truncate(0)?;
                }
                Arc::clone(file)
            }
            None => {
                if !flags.contains(OpenFlags::CREAT) {
                    return Err(VfsError::NotFound { path });
                }
                check_parent(&entries, &path)?;
                let file = Arc::new(RamFile::new(DEFAULT_FILE_MODE));
                entries.insert(path.clone(), Entry::File(Arc::clone(&file)));
                log::trace!("ramfs: created {path}");
                file
            }
        };

        file.incref();
        let vnode: VnodeRef = file;
        Ok(vnode)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut entries = self.entries.lock();
        match entries.get(&path) {
            Some(Entry::File(_)) => {
                entries.remove(&path);
                Ok(())
            }
            Some(Entry::Dir { .. }) => Err(VfsError::IsADirectory { path }),
            None if path.is_empty() => Err(VfsError::IsADirectory { path }),
            None => Err(VfsError::NotFound { path }),
        }
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        let path = normalize(path)?;
        let mut entries = self.entries.lock();
        if path.is_empty() || entries.contains_key(&path) {
            return Err(VfsError::AlreadyExists { path });
        }
        check_parent(&entries, &path)?;
        entries.insert(path, Entry::Dir { _mode: mode });
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(VfsError::InvalidPath { path });
        }

        let mut entries = self.entries.lock();
        match entries.get(&path) {
            Some(Entry::Dir { .. }) if has_children(&entries, &path) => {
                Err(VfsError::NotEmpty { path })
            }
            Some(Entry::Dir { .. }) => {
                entries.remove(&path);
                Ok(())
            }
            Some(Entry::File(_)) => Err(VfsError::NotADirectory { path }),
            None => Err(VfsError::NotFound { path }),
        }
    }
}

/// Regular file stored in memory
///
/// A removed file stays readable through vnodes that still reference it.
pub struct RamFile {
    data: Mutex<Vec<u8>>,
    mode: u32,
    refs: RefCount,
}

impl RamFile {
    pub fn new(mode: u32) -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            mode,
            refs: RefCount::new(),
        }
    }
}

fn to_index(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| VfsError::IoError(format!("offset {offset} out of range")))
}

impl Vnode for RamFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = to_index(offset)?;
        let data = self.data.lock();
        if start >= data.len() {
            return Ok(0);
        }
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        let start = to_index(offset)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| VfsError::IoError("write past end of address space".to_string()))?;

        let mut data = self.data.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn stat(&self) -> Result<FileStat> {
        Ok(FileStat {
            size: self.data.lock().len() as u64,
            mode: self.mode,
            kind: VnodeKind::File,
        })
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let len = to_index(len)?;
        self.data.lock().resize(len, 0);
        Ok(())
    }

    fn refs(&self) -> &RefCount {
        &self.refs
    }
}
