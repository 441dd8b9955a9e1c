// Mount table and the path-level VFS surface

use super::filesystem::{FileHandle, Filesystem, FsKind, MountId};
use super::path::{direct_child_name, is_normalized, normalize_path, resolve_mount, strip_mount};
use crate::families::fat::common::EntryInfo;
use crate::partitioner::PartitionTable;
use chrono::NaiveDateTime;
use fatvfs_core::{FsError, FsResult};
use log::{debug, info, warn};
use serde::Serialize;

/// One row of the mount table
#[derive(Debug)]
pub struct MountEntry {
    pub id: MountId,
    pub mount_point: String,
    pub device_name: String,
    pub fs: Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub mount_point: String,
    pub device_name: String,
    pub fs_type: FsKind,
}

/// How `open_with` treats missing and existing files
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Create the file if it does not exist
    pub create: bool,
    /// Cut an existing file to zero length
    pub truncate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    MountPoint,
}

/// One `ls` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u32,
    pub modified: Option<NaiveDateTime>,
}

impl From<EntryInfo> for DirEntry {
    fn from(info: EntryInfo) -> Self {
        Self {
            kind: if info.is_directory {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            name: info.name,
            size: info.size,
            modified: info.modified,
        }
    }
}

/// Owns every mounted filesystem and the working directory.
///
/// The root mount `/` is created with the manager and can never be removed,
/// so every normalised path resolves to some mount.
#[derive(Debug)]
pub struct FilesystemManager {
    mounts: Vec<MountEntry>,
    next_id: MountId,
    cwd: String,
    cwd_cluster: u32,
}

impl FilesystemManager {
    pub fn new(root_device_name: &str, root: Filesystem) -> Self {
        info!(
            "Mounted {} ({}) at /",
            root_device_name,
            root.kind()
        );
        let cwd_cluster = root.root_cluster();
        Self {
            mounts: vec![MountEntry {
                id: 0,
                mount_point: "/".to_string(),
                device_name: root_device_name.to_string(),
                fs: root,
            }],
            next_id: 1,
            cwd: "/".to_string(),
            cwd_cluster,
        }
    }

    // ------------------------------------------------------------------
    // Mount table
    // ------------------------------------------------------------------

    pub fn mount(&mut self, mount_point: &str, device_name: &str, fs: Filesystem) -> FsResult<MountId> {
        if !is_normalized(mount_point) {
            return Err(FsError::InvalidArgument(format!(
                "mount point '{}' must be an absolute, normalised path",
                mount_point
            )));
        }
        if self.mounts.iter().any(|m| m.mount_point == mount_point) {
            return Err(FsError::AlreadyExists(mount_point.to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;
        info!("Mounted {} ({}) at {}", device_name, fs.kind(), mount_point);
        self.mounts.push(MountEntry {
            id,
            mount_point: mount_point.to_string(),
            device_name: device_name.to_string(),
            fs,
        });
        Ok(id)
    }

    /// Mount a discovered partition, picking the driver from its type guess
    pub fn mount_partition(
        &mut self,
        table: &PartitionTable,
        device_name: &str,
        mount_point: &str,
    ) -> FsResult<MountId> {
        let part = table
            .find(device_name)
            .ok_or_else(|| FsError::NotFound(format!("no partition named {}", device_name)))?;
        let device = table
            .device_of(part)
            .ok_or_else(|| FsError::NotFound(format!("disk for {} is gone", device_name)))?;
        let fs = Filesystem::mount(device, part.start_lba, part.fs_type)?;
        self.mount(mount_point, device_name, fs)
    }

    /// Flush and detach the filesystem mounted at `mount_point`
    pub fn umount(&mut self, mount_point: &str) -> FsResult<()> {
        let point = normalize_path(&self.cwd, mount_point);
        if point == "/" {
            warn!("Refusing to unmount the root filesystem");
            return Err(FsError::InvalidArgument("cannot unmount /".to_string()));
        }
        let index = self
            .mounts
            .iter()
            .position(|m| m.mount_point == point)
            .ok_or_else(|| FsError::NotFound(format!("nothing mounted at {}", point)))?;

        self.mounts[index].fs.flush()?;
        let entry = self.mounts.remove(index);
        info!("Unmounted {} from {}", entry.device_name, entry.mount_point);

        if strip_mount(&point, &self.cwd).is_some() {
            self.cwd = "/".to_string();
            self.cwd_cluster = self.mounts[0].fs.root_cluster();
        }
        Ok(())
    }

    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|m| MountInfo {
                mount_point: m.mount_point.clone(),
                device_name: m.device_name.clone(),
                fs_type: m.fs.kind(),
            })
            .collect()
    }

    pub fn getcwd(&self) -> &str {
        &self.cwd
    }

    /// Directory cluster of the working directory on its mount
    pub fn cwd_cluster(&self) -> u32 {
        self.cwd_cluster
    }

    /// Normalise `path` and find its mount: (normalised path, mount index, relative path)
    fn locate(&self, path: &str) -> FsResult<(String, usize, String)> {
        let norm = normalize_path(&self.cwd, path);
        let (index, rel) = resolve_mount(self.mounts.iter().map(|m| m.mount_point.as_str()), &norm)
            .ok_or_else(|| FsError::NotFound(format!("no mount covers {}", norm)))?;
        let rel = rel.to_string();
        debug!("{} -> mount {} path '{}'", norm, self.mounts[index].mount_point, rel);
        Ok((norm, index, rel))
    }

    fn fs_of(&mut self, id: MountId) -> FsResult<&mut Filesystem> {
        self.mounts
            .iter_mut()
            .find(|m| m.id == id)
            .map(|m| &mut m.fs)
            .ok_or_else(|| FsError::NotFound(format!("mount {} is no longer attached", id)))
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    pub fn open(&mut self, path: &str) -> FsResult<FileHandle> {
        self.open_with(path, OpenOptions::default())
    }

    pub fn open_with(&mut self, path: &str, options: OpenOptions) -> FsResult<FileHandle> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::IsADirectory(norm));
        }
        let mount = &mut self.mounts[index];

        let mut file = match mount.fs.open(&rel) {
            Ok(file) => file,
            Err(FsError::NotFound(_)) if options.create => mount.fs.create(&rel)?,
            Err(err) => return Err(err),
        };
        if options.truncate && file.size() > 0 {
            mount.fs.truncate_file(&mut file, 0)?;
        }
        Ok(FileHandle { mount: mount.id, file })
    }

    /// Create a new, empty file
    pub fn create(&mut self, path: &str) -> FsResult<FileHandle> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::AlreadyExists(norm));
        }
        let mount = &mut self.mounts[index];
        let file = mount.fs.create(&rel)?;
        Ok(FileHandle { mount: mount.id, file })
    }

    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        self.fs_of(handle.mount)?.read(&mut handle.file, buf)
    }

    pub fn write(&mut self, handle: &mut FileHandle, data: &[u8]) -> FsResult<usize> {
        self.fs_of(handle.mount)?.write(&mut handle.file, data)
    }

    pub fn seek(&mut self, handle: &mut FileHandle, position: u32) -> FsResult<()> {
        self.fs_of(handle.mount)?;
        handle.file.seek(position)
    }

    /// Release a handle, flushing its filesystem
    pub fn close(&mut self, handle: FileHandle) -> FsResult<()> {
        self.fs_of(handle.mount)?.flush()
    }

    pub fn truncate(&mut self, path: &str, size: u32) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::IsADirectory(norm));
        }
        self.mounts[index].fs.truncate(&rel, size)
    }

    pub fn stat(&mut self, path: &str) -> FsResult<EntryInfo> {
        let (_, index, rel) = self.locate(path)?;
        self.mounts[index].fs.stat(&rel)
    }

    // ------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------

    /// List a directory. Mounts sitting directly below it show up as
    /// `MountPoint` entries and hide same-named entries of the parent volume.
    pub fn ls(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let (norm, index, rel) = self.locate(path)?;

        let mut entries: Vec<DirEntry> = self
            .mounts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .filter_map(|(_, m)| direct_child_name(&norm, &m.mount_point))
            .map(|name| DirEntry {
                name: name.to_string(),
                kind: EntryKind::MountPoint,
                size: 0,
                modified: None,
            })
            .collect();

        let listed = self.mounts[index].fs.list(&rel)?;
        for info in listed {
            if entries
                .iter()
                .any(|e| e.kind == EntryKind::MountPoint && e.name.eq_ignore_ascii_case(&info.name))
            {
                continue;
            }
            entries.push(DirEntry::from(info));
        }
        Ok(entries)
    }

    /// Create a directory and any missing parents on the same mount
    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::AlreadyExists(norm));
        }
        let fs = &mut self.mounts[index].fs;

        let components: Vec<&str> = rel.split('/').collect();
        let mut prefix = String::new();
        for component in &components[..components.len() - 1] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            match fs.stat(&prefix) {
                Ok(info) if info.is_directory => {}
                Ok(_) => return Err(FsError::NotADirectory(prefix)),
                Err(FsError::NotFound(_)) => fs.mkdir(&prefix)?,
                Err(err) => return Err(err),
            }
        }
        fs.mkdir(&rel)
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::InvalidArgument(format!("{} is a mount point", norm)));
        }
        self.mounts[index].fs.rmdir(&rel)
    }

    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::IsADirectory(norm));
        }
        self.mounts[index].fs.unlink(&rel)
    }

    /// Remove a file, or an empty directory
    pub fn rm_recursive(&mut self, path: &str) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        if rel.is_empty() {
            return Err(FsError::InvalidArgument(format!("{} is a mount point", norm)));
        }
        self.mounts[index].fs.rm_recursive(&rel)
    }

    /// Rename within one mount
    pub fn mv(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let (src_norm, src_index, src_rel) = self.locate(src)?;
        let (dst_norm, dst_index, dst_rel) = self.locate(dst)?;
        if src_index != dst_index {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {} to {} across mounts",
                src_norm, dst_norm
            )));
        }
        if src_rel.is_empty() || dst_rel.is_empty() {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {} to {}: mount point",
                src_norm, dst_norm
            )));
        }
        self.mounts[src_index].fs.rename(&src_rel, &dst_rel)
    }

    /// Change the working directory; on failure nothing changes
    pub fn cd(&mut self, path: &str) -> FsResult<()> {
        let (norm, index, rel) = self.locate(path)?;
        let cluster = self.mounts[index].fs.resolve_dir(&rel)?;
        self.cwd = norm;
        self.cwd_cluster = cluster;
        Ok(())
    }

    /// Flush every mounted filesystem
    pub fn sync(&mut self) -> FsResult<()> {
        for mount in &mut self.mounts {
            mount.fs.flush()?;
        }
        Ok(())
    }
}
