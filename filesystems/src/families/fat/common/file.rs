// Open-file state shared by the FAT16 and FAT32 drivers

use super::cluster_chain::{append_cluster, next_cluster};
use super::directory::parse_83_name;
use super::fat_table::FatRegion;
use super::structures::ShortDirEntry;
use fatvfs_core::{FsError, FsResult};

/// An open regular file.
///
/// Holds a cached copy of the directory entry (written back by name into the
/// parent directory whenever size or first cluster change) and a cursor that
/// remembers the cluster under the current position, so sequential I/O does
/// not re-walk the chain from the start on every call.
#[derive(Debug, Clone)]
pub struct FatFile {
    pub(crate) entry: ShortDirEntry,
    pub(crate) parent: u32,
    pub(crate) position: u32,
    /// (cluster index within the file, cluster number)
    cursor: Option<(u32, u32)>,
}

impl FatFile {
    pub(crate) fn new(entry: ShortDirEntry, parent: u32) -> Self {
        Self {
            entry,
            parent,
            position: 0,
            cursor: None,
        }
    }

    pub fn name(&self) -> String {
        parse_83_name(&self.entry.name)
    }

    pub fn size(&self) -> u32 {
        self.entry.file_size
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn first_cluster(&self) -> u32 {
        self.entry.first_cluster()
    }

    pub fn entry(&self) -> &ShortDirEntry {
        &self.entry
    }

    /// Cluster of the directory holding this file's entry
    pub fn parent(&self) -> u32 {
        self.parent
    }

    /// Move the position. Seeking past the end of the file is not allowed.
    pub fn seek(&mut self, position: u32) -> FsResult<()> {
        if position > self.entry.file_size {
            return Err(FsError::InvalidArgument(format!(
                "seek to {} past end of {}-byte file",
                position, self.entry.file_size
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Forget the cached cluster (after the chain has been modified underneath)
    pub(crate) fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub(crate) fn set_first_cluster(&mut self, cluster: u32) {
        self.entry.set_first_cluster(cluster);
        self.cursor = if cluster == 0 { None } else { Some((0, cluster)) };
    }

    /// Cluster holding cluster index `index` of the file. With `extend`, missing
    /// clusters are allocated and linked; otherwise a short chain is `Corrupt`.
    pub(crate) fn cluster_at(&mut self, fat: &mut FatRegion, index: u32, extend: bool) -> FsResult<u32> {
        let first = self.entry.first_cluster();
        if first == 0 {
            return Err(FsError::Corrupt(format!(
                "{} has data but no cluster chain",
                self.name()
            )));
        }

        let (mut at, mut cluster) = match self.cursor {
            Some((at, cluster)) if at <= index => (at, cluster),
            _ => (0, first),
        };

        while at < index {
            cluster = match next_cluster(fat, cluster)? {
                Some(next) => next,
                None if extend => append_cluster(fat, cluster)?,
                None => {
                    return Err(FsError::Corrupt(format!(
                        "cluster chain of {} ends before its recorded size",
                        self.name()
                    )))
                }
            };
            at += 1;
        }

        self.cursor = Some((index, cluster));
        Ok(cluster)
    }
}
