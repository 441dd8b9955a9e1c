// Mounted filesystem variants and their dispatch

use crate::families::fat::common::{EntryInfo, FatFile, FatVolume};
use crate::families::fat::fat16::Fat16Fs;
use crate::families::fat::fat32::Fat32Fs;
use crate::families::fat::FatType;
use fatvfs_core::{FsError, FsResult, SharedDevice};
use serde::Serialize;
use std::fmt;

/// Filesystem type recorded in the mount table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FsKind {
    Fat16,
    Fat32,
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsKind::Fat16 => f.write_str("fat16"),
            FsKind::Fat32 => f.write_str("fat32"),
        }
    }
}

/// A mounted volume
#[derive(Debug)]
pub enum Filesystem {
    Fat16(Fat16Fs),
    Fat32(Fat32Fs),
}

macro_rules! dispatch {
    ($self:expr, $fs:ident => $call:expr) => {
        match $self {
            Filesystem::Fat16($fs) => $call,
            Filesystem::Fat32($fs) => $call,
        }
    };
}

impl Filesystem {
    /// Mount the volume at `partition_lba` with the driver for `fat_type`
    pub fn mount(device: SharedDevice, partition_lba: u64, fat_type: FatType) -> FsResult<Self> {
        match fat_type {
            FatType::Fat16 => Ok(Filesystem::Fat16(Fat16Fs::mount(device, partition_lba)?)),
            FatType::Fat32 => Ok(Filesystem::Fat32(Fat32Fs::mount(device, partition_lba)?)),
            other => Err(FsError::NotSupported(format!("no driver for {} volumes", other))),
        }
    }

    pub fn kind(&self) -> FsKind {
        match self {
            Filesystem::Fat16(_) => FsKind::Fat16,
            Filesystem::Fat32(_) => FsKind::Fat32,
        }
    }

    pub fn volume_label(&self) -> String {
        dispatch!(self, fs => fs.volume_label())
    }

    pub fn root_cluster(&self) -> u32 {
        dispatch!(self, fs => fs.root_cluster())
    }

    pub fn stat(&mut self, path: &str) -> FsResult<EntryInfo> {
        dispatch!(self, fs => fs.stat(path))
    }

    pub fn list(&mut self, path: &str) -> FsResult<Vec<EntryInfo>> {
        dispatch!(self, fs => fs.list(path))
    }

    pub fn resolve_dir(&mut self, path: &str) -> FsResult<u32> {
        dispatch!(self, fs => fs.resolve_dir(path))
    }

    pub fn open(&mut self, path: &str) -> FsResult<FatFile> {
        dispatch!(self, fs => fs.open(path))
    }

    pub fn create(&mut self, path: &str) -> FsResult<FatFile> {
        dispatch!(self, fs => fs.create(path))
    }

    pub fn read(&mut self, file: &mut FatFile, buf: &mut [u8]) -> FsResult<usize> {
        dispatch!(self, fs => fs.read(file, buf))
    }

    pub fn write(&mut self, file: &mut FatFile, data: &[u8]) -> FsResult<usize> {
        dispatch!(self, fs => fs.write(file, data))
    }

    pub fn truncate_file(&mut self, file: &mut FatFile, size: u32) -> FsResult<()> {
        dispatch!(self, fs => fs.truncate_file(file, size))
    }

    pub fn truncate(&mut self, path: &str, size: u32) -> FsResult<()> {
        dispatch!(self, fs => fs.truncate(path, size))
    }

    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        dispatch!(self, fs => fs.mkdir(path))
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        dispatch!(self, fs => fs.rmdir(path))
    }

    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        dispatch!(self, fs => fs.unlink(path))
    }

    pub fn rm_recursive(&mut self, path: &str) -> FsResult<()> {
        dispatch!(self, fs => fs.rm_recursive(path))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        dispatch!(self, fs => fs.rename(from, to))
    }

    pub fn flush(&mut self) -> FsResult<()> {
        dispatch!(self, fs => fs.flush())
    }
}

pub type MountId = u64;

/// An open file and the mount it belongs to
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub(crate) mount: MountId,
    pub(crate) file: FatFile,
}

impl FileHandle {
    pub fn mount_id(&self) -> MountId {
        self.mount
    }

    pub fn name(&self) -> String {
        self.file.name()
    }

    pub fn size(&self) -> u32 {
        self.file.size()
    }

    pub fn position(&self) -> u32 {
        self.file.position()
    }
}
