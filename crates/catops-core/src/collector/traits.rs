//! Filesystem abstraction allowing every collector to run against either
//! the real `/proc` tree or an in-memory fixture ([`mock::MockFs`]).

use std::io;
use std::path::{Path, PathBuf};

/// Disk-space occupancy for one mountpoint, as reported by `statvfs(2)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VfsUsage {
    pub total_kb: u64,
    pub free_kb: u64,
    pub avail_kb: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
}

pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Space/inode occupancy for `mountpoint`. `None` when the call fails
    /// or (for [`mock::MockFs`](crate::collector::mock::MockFs)) is not
    /// configured for the test.
    fn statvfs(&self, _mountpoint: &Path) -> Option<VfsUsage> {
        None
    }
}

/// Thin pass-through to `std::fs`, used in production.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn statvfs(&self, mountpoint: &Path) -> Option<VfsUsage> {
        let stat = nix::sys::statvfs::statvfs(mountpoint).ok()?;
        let frsize_kb = stat.fragment_size() / 1024;
        Some(VfsUsage {
            total_kb: stat.blocks() * frsize_kb,
            free_kb: stat.blocks_free() * frsize_kb,
            avail_kb: stat.blocks_available() * frsize_kb,
            inodes_total: stat.files(),
            inodes_free: stat.files_free(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_fs_reads_existing_file() {
        let fs = RealFs;
        assert!(fs.exists(Path::new("/proc/self/status")) || !fs.exists(Path::new("/nonexistent-xyz")));
    }
}
