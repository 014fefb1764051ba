//! Processes as seen by the file layer
//!
//! A process owns exactly one [`FdTable`] and shares the storage layer with
//! every other process. PID allocation happens elsewhere; callers pass the
//! id in.

use std::sync::Arc;

use kaal_vfs::Vfs;

use crate::config::FileTableConfig;
use crate::fdtable::FdTable;
use crate::Result;

/// Process identifier
pub type Pid = u32;

pub struct Process {
    pid: Pid,
    parent: Option<Pid>,
    vfs: Arc<Vfs>,
    files: FdTable,
}

impl Process {
    /// Create a process with a fresh console-bound table
    pub fn spawn(pid: Pid, vfs: Arc<Vfs>, config: &FileTableConfig) -> Result<Self> {
        let files = FdTable::init(&vfs, config)?;
        log::debug!("process {pid}: spawned");
        Ok(Self {
            pid,
            parent: None,
            vfs,
            files,
        })
    }

    /// Create a child whose table shares every open file with ours
    pub fn fork(&self, child: Pid) -> Result<Self> {
        let files = self.files.duplicate()?;
        log::debug!("process {}: forked child {child}", self.pid);
        Ok(Self {
            pid: child,
            parent: Some(self.pid),
            vfs: Arc::clone(&self.vfs),
            files,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn files(&self) -> &FdTable {
        &self.files
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        log::debug!(
            "process {}: exiting with {} open handles",
            self.pid,
            self.files.open_count()
        );
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("files", &self.files)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaal_vfs::{Console, RamFs, Vnode};

    fn boot() -> (Arc<Vfs>, Arc<Console>) {
        let console = Arc::new(Console::new());
        let mut vfs = Vfs::new();
        vfs.mount_root(Box::new(RamFs::new()));
        vfs.add_device("con", console.clone()).unwrap();
        (Arc::new(vfs), console)
    }

    #[test]
    fn test_spawn_and_fork() {
        let (vfs, console) = boot();
        let init = Process::spawn(1, vfs, &FileTableConfig::default()).unwrap();
        assert_eq!(init.pid(), 1);
        assert_eq!(init.parent(), None);

        let child = init.fork(2).unwrap();
        assert_eq!(child.pid(), 2);
        assert_eq!(child.parent(), Some(1));
        assert_eq!(child.files().handles(), vec![0, 1, 2]);
        assert_eq!(console.refcount(), 6);

        drop(init);
        assert_eq!(console.refcount(), 3);
        drop(child);
        assert_eq!(console.refcount(), 0);
    }
}
