// Path-level operations shared by the FAT16 and FAT32 drivers
//
// A driver supplies directory storage (how slots are found, read and written,
// which differs between the fixed FAT16 root region and cluster-chained
// directories); everything above that, from path lookup to rename and
// truncate, is written once here against the `FatVolume` trait.

use super::cluster_chain::{
    allocate_cluster, clusters_for_size, count_clusters, extend_chain, free_chain_from,
    free_cluster_chain, nth_cluster,
};
use super::directory::{
    format_name, split_parent, split_path, validate_name, EntryInfo, Lookup, SlotPos,
};
use super::fat_table::FatRegion;
use super::file::FatFile;
use super::structures::{FatAttributes, ShortDirEntry, SlotState};
use fatvfs_core::{FsError, FsResult, SECTOR_SIZE};
use log::debug;

pub trait FatVolume {
    fn fat(&mut self) -> &mut FatRegion;

    fn fat_ref(&self) -> &FatRegion;

    /// Directory cluster that stands for the volume root (0 on FAT16)
    fn root_cluster(&self) -> u32;

    /// Visit the slots of directory `dir` in order, stopping at the end marker
    /// or at the first slot for which `visit` returns `Some`.
    fn scan_dir<T, F>(&mut self, dir: u32, visit: F) -> FsResult<Option<T>>
    where
        F: FnMut(&ShortDirEntry, SlotPos) -> Option<T>;

    fn write_slot(&mut self, slot: SlotPos, entry: &ShortDirEntry) -> FsResult<()>;

    /// First unused (end or deleted) slot of `dir`, growing chained directories
    /// by one zeroed cluster when they are full.
    fn free_slot(&mut self, dir: u32) -> FsResult<SlotPos>;

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Directory cluster a directory entry refers to (`..` entries store 0 for the root)
    fn dir_cluster_of(&self, entry: &ShortDirEntry) -> u32 {
        match entry.first_cluster() {
            0 => self.root_cluster(),
            cluster => cluster,
        }
    }

    /// Value stored in a `..` entry whose parent is `parent`
    fn dotdot_value(&self, parent: u32) -> u32 {
        if parent == self.root_cluster() {
            0
        } else {
            parent
        }
    }

    /// Find `name` in directory `dir`. Both sides are compared in 8.3 form.
    fn find_in_dir(&mut self, dir: u32, name: &str) -> FsResult<Option<(ShortDirEntry, SlotPos)>> {
        let wanted = format_name(name);
        self.scan_dir(dir, |entry, slot| {
            (entry.state() == SlotState::Entry && entry.name == wanted).then_some((*entry, slot))
        })
    }

    fn resolve(&mut self, path: &str) -> FsResult<Lookup> {
        let mut dir = self.root_cluster();
        let mut found = Lookup::Root;

        for name in split_path(path) {
            if let Lookup::Entry { entry, .. } = &found {
                if !entry.is_directory() {
                    return Err(FsError::NotADirectory(path.to_string()));
                }
                dir = self.dir_cluster_of(entry);
            }
            found = match self.find_in_dir(dir, name)? {
                Some((entry, slot)) => Lookup::Entry { entry, slot, parent: dir },
                None => return Err(FsError::NotFound(path.to_string())),
            };
        }

        Ok(found)
    }

    /// Cluster of the directory at `path`
    fn resolve_dir(&mut self, path: &str) -> FsResult<u32> {
        match self.resolve(path)? {
            Lookup::Root => Ok(self.root_cluster()),
            Lookup::Entry { entry, .. } if entry.is_directory() => Ok(self.dir_cluster_of(&entry)),
            Lookup::Entry { .. } => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    fn stat(&mut self, path: &str) -> FsResult<EntryInfo> {
        match self.resolve(path)? {
            Lookup::Root => Ok(EntryInfo::root(self.root_cluster())),
            Lookup::Entry { entry, .. } => Ok(EntryInfo::from_entry(&entry)),
        }
    }

    /// Entries of a directory cluster, without `.`, `..`, volume labels and long-name fragments
    fn list_dir(&mut self, dir: u32) -> FsResult<Vec<EntryInfo>> {
        let mut entries = Vec::new();
        self.scan_dir(dir, |entry, _| {
            if entry.state() == SlotState::Entry && !entry.is_dot() {
                entries.push(EntryInfo::from_entry(entry));
            }
            None::<()>
        })?;
        Ok(entries)
    }

    fn list(&mut self, path: &str) -> FsResult<Vec<EntryInfo>> {
        let dir = self.resolve_dir(path)?;
        self.list_dir(dir)
    }

    fn is_dir_empty(&mut self, dir: u32) -> FsResult<bool> {
        let occupied = self.scan_dir(dir, |entry, _| {
            (entry.state() == SlotState::Entry && !entry.is_dot()).then_some(())
        })?;
        Ok(occupied.is_none())
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    fn create_entry(
        &mut self,
        dir: u32,
        name: &str,
        attributes: u8,
        first_cluster: u32,
    ) -> FsResult<(ShortDirEntry, SlotPos)> {
        validate_name(name)?;
        if self.find_in_dir(dir, name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        let slot = self.free_slot(dir)?;
        let entry = ShortDirEntry::new(format_name(name), attributes, first_cluster);
        self.write_slot(slot, &entry)?;
        Ok((entry, slot))
    }

    /// Overwrite the entry with the same 8.3 name in `dir`
    fn update_entry(&mut self, dir: u32, entry: &ShortDirEntry) -> FsResult<()> {
        let wanted = entry.name;
        let slot = self.scan_dir(dir, |e, slot| {
            (e.state() == SlotState::Entry && e.name == wanted).then_some(slot)
        })?;
        match slot {
            Some(slot) => self.write_slot(slot, entry),
            None => Err(FsError::NotFound(super::directory::parse_83_name(&wanted))),
        }
    }

    /// A handle opened on an empty file picks up the chain another handle gave it
    /// since, instead of allocating a second one
    fn refresh_empty_file(&mut self, file: &mut FatFile) -> FsResult<()> {
        if file.first_cluster() != 0 {
            return Ok(());
        }
        let name = file.name();
        if let Some((current, _)) = self.find_in_dir(file.parent, &name)? {
            if current.first_cluster() != 0 {
                debug!("{} gained cluster {} through another handle", name, current.first_cluster());
                file.set_first_cluster(current.first_cluster());
                file.entry.file_size = current.file_size;
            }
        }
        Ok(())
    }

    /// Mark an entry deleted and release its clusters
    fn remove_entry(&mut self, mut entry: ShortDirEntry, slot: SlotPos) -> FsResult<()> {
        let start = entry.first_cluster();
        entry.mark_deleted();
        self.write_slot(slot, &entry)?;
        if start != 0 {
            free_cluster_chain(self.fat(), start)?;
        }
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (parent_path, name) = split_parent(path)?;
        validate_name(name)?;
        let parent = self.resolve_dir(&parent_path)?;
        if self.find_in_dir(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let cluster = allocate_cluster(self.fat())?;
        let mut sector = [0u8; SECTOR_SIZE];
        ShortDirEntry::new(format_name("."), FatAttributes::DIRECTORY, cluster).write_slot(&mut sector, 0);
        ShortDirEntry::new(format_name(".."), FatAttributes::DIRECTORY, self.dotdot_value(parent))
            .write_slot(&mut sector, 1);
        let lba = self.fat_ref().cluster_lba(cluster);
        self.fat_ref().device().write_sector(lba, &sector)?;

        match self.create_entry(parent, name, FatAttributes::DIRECTORY, cluster) {
            Ok(_) => {
                debug!("Created directory {} at cluster {}", path, cluster);
                Ok(())
            }
            Err(err) => {
                free_cluster_chain(self.fat(), cluster)?;
                Err(err)
            }
        }
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        match self.resolve(path)? {
            Lookup::Root => Err(FsError::InvalidArgument("cannot unlink the root directory".to_string())),
            Lookup::Entry { entry, .. } if entry.is_dot() => {
                Err(FsError::InvalidArgument(format!("cannot unlink '{}'", path)))
            }
            Lookup::Entry { entry, .. } if entry.is_directory() => Err(FsError::IsADirectory(path.to_string())),
            Lookup::Entry { entry, slot, .. } => self.remove_entry(entry, slot),
        }
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (entry, slot) = match self.resolve(path)? {
            Lookup::Root => {
                return Err(FsError::InvalidArgument("cannot remove the root directory".to_string()))
            }
            Lookup::Entry { entry, .. } if entry.is_dot() => {
                return Err(FsError::InvalidArgument(format!("cannot remove '{}'", path)))
            }
            Lookup::Entry { entry, .. } if !entry.is_directory() => {
                return Err(FsError::NotADirectory(path.to_string()))
            }
            Lookup::Entry { entry, slot, .. } => (entry, slot),
        };

        let dir = self.dir_cluster_of(&entry);
        if dir == self.root_cluster() {
            return Err(FsError::Corrupt(format!("{} points at the root directory", path)));
        }
        if !self.is_dir_empty(dir)? {
            return Err(FsError::NotEmpty(path.to_string()));
        }
        self.remove_entry(entry, slot)
    }

    /// Remove a file, or a directory holding nothing but `.` and `..`
    fn rm_recursive(&mut self, path: &str) -> FsResult<()> {
        match self.resolve(path)? {
            Lookup::Entry { entry, .. } if entry.is_directory() => self.rmdir(path),
            _ => self.unlink(path),
        }
    }

    /// Move an entry to a new name and/or parent without touching its data
    fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        let (entry, slot, src_parent) = match self.resolve(from)? {
            Lookup::Root => {
                return Err(FsError::InvalidArgument("cannot move the root directory".to_string()))
            }
            Lookup::Entry { entry, .. } if entry.is_dot() => {
                return Err(FsError::InvalidArgument(format!("cannot move '{}'", from)))
            }
            Lookup::Entry { entry, slot, parent } => (entry, slot, parent),
        };

        let (dst_parent_path, dst_name) = split_parent(to)?;
        validate_name(dst_name)?;

        if entry.is_directory() {
            let src: Vec<[u8; 11]> = split_path(from).into_iter().map(format_name).collect();
            let dst: Vec<[u8; 11]> = split_path(&dst_parent_path).into_iter().map(format_name).collect();
            if dst.starts_with(&src) {
                return Err(FsError::InvalidArgument(format!(
                    "cannot move '{}' into itself",
                    from
                )));
            }
        }

        let dst_parent = self.resolve_dir(&dst_parent_path)?;
        let new_name = format_name(dst_name);
        if let Some((existing, _)) = self.find_in_dir(dst_parent, dst_name)? {
            if dst_parent == src_parent && existing.name == entry.name {
                // Same 8.3 name in the same directory
                return Ok(());
            }
            return Err(FsError::AlreadyExists(to.to_string()));
        }

        let new_slot = self.free_slot(dst_parent)?;
        let mut moved = entry;
        moved.name = new_name;
        self.write_slot(new_slot, &moved)?;

        let mut old = entry;
        old.mark_deleted();
        self.write_slot(slot, &old)?;

        if moved.is_directory() && dst_parent != src_parent {
            let dir = self.dir_cluster_of(&moved);
            if let Some((mut dotdot, dotdot_slot)) = self.find_in_dir(dir, "..")? {
                dotdot.set_first_cluster(self.dotdot_value(dst_parent));
                self.write_slot(dotdot_slot, &dotdot)?;
            }
        }

        debug!("Moved {} to {}", from, to);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    fn open(&mut self, path: &str) -> FsResult<FatFile> {
        match self.resolve(path)? {
            Lookup::Root => Err(FsError::IsADirectory(path.to_string())),
            Lookup::Entry { entry, .. } if entry.is_directory() => Err(FsError::IsADirectory(path.to_string())),
            Lookup::Entry { entry, parent, .. } => Ok(FatFile::new(entry, parent)),
        }
    }

    /// Create an empty file (first cluster 0) and open it
    fn create(&mut self, path: &str) -> FsResult<FatFile> {
        let (parent_path, name) = split_parent(path)?;
        let parent = self.resolve_dir(&parent_path)?;
        let (entry, _) = self.create_entry(parent, name, FatAttributes::ARCHIVE, 0)?;
        Ok(FatFile::new(entry, parent))
    }

    /// Read from the current position, clamped to the recorded file size
    fn read(&mut self, file: &mut FatFile, buf: &mut [u8]) -> FsResult<usize> {
        let size = file.size();
        if file.position >= size || buf.is_empty() {
            return Ok(0);
        }

        let total = buf.len().min((size - file.position) as usize);
        let cluster_bytes = self.fat_ref().bytes_per_cluster();
        let mut sector = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while done < total {
            let pos = file.position;
            let cluster = file.cluster_at(self.fat(), pos / cluster_bytes, false)?;
            let offset = pos % cluster_bytes;
            let lba = self.fat_ref().cluster_lba(cluster) + (offset as usize / SECTOR_SIZE) as u64;
            let in_sector = offset as usize % SECTOR_SIZE;
            let n = (SECTOR_SIZE - in_sector).min(total - done);

            self.fat_ref().device().read_sector(lba, &mut sector)?;
            buf[done..done + n].copy_from_slice(&sector[in_sector..in_sector + n]);
            done += n;
            file.position += n as u32;
        }

        Ok(done)
    }

    /// Write at the current position, allocating clusters as the file grows.
    ///
    /// Running out of space after some bytes were written is a short write; the
    /// entry is still updated for the bytes that made it.
    fn write(&mut self, file: &mut FatFile, data: &[u8]) -> FsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if file.position as u64 + data.len() as u64 > u32::MAX as u64 {
            return Err(FsError::NoSpace(format!(
                "{} would exceed the 4 GiB FAT file size limit",
                file.name()
            )));
        }

        self.refresh_empty_file(file)?;
        if file.first_cluster() == 0 {
            let cluster = allocate_cluster(self.fat())?;
            file.set_first_cluster(cluster);
        }

        let cluster_bytes = self.fat_ref().bytes_per_cluster();
        let mut sector = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while done < data.len() {
            let pos = file.position;
            let cluster = match file.cluster_at(self.fat(), pos / cluster_bytes, true) {
                Ok(cluster) => cluster,
                Err(FsError::NoSpace(_)) if done > 0 => break,
                Err(err) => return Err(err),
            };
            let offset = pos % cluster_bytes;
            let lba = self.fat_ref().cluster_lba(cluster) + (offset as usize / SECTOR_SIZE) as u64;
            let in_sector = offset as usize % SECTOR_SIZE;
            let n = (SECTOR_SIZE - in_sector).min(data.len() - done);

            if n < SECTOR_SIZE {
                self.fat_ref().device().read_sector(lba, &mut sector)?;
            }
            sector[in_sector..in_sector + n].copy_from_slice(&data[done..done + n]);
            self.fat_ref().device().write_sector(lba, &sector)?;
            done += n;
            file.position += n as u32;
        }

        if file.position > file.entry.file_size {
            file.entry.file_size = file.position;
        }
        file.entry.touch();
        let parent = file.parent;
        self.update_entry(parent, &file.entry)?;
        Ok(done)
    }

    /// Zero the bytes of `cluster` from `from` to its end
    fn zero_cluster_tail(&mut self, cluster: u32, from: u32) -> FsResult<()> {
        let fat = self.fat_ref();
        let base = fat.cluster_lba(cluster);
        let sectors = fat.layout().sectors_per_cluster;
        let device = fat.device().clone();

        let mut next = from / SECTOR_SIZE as u32;
        let in_sector = from as usize % SECTOR_SIZE;
        if in_sector != 0 {
            let mut sector = [0u8; SECTOR_SIZE];
            device.read_sector(base + next as u64, &mut sector)?;
            sector[in_sector..].fill(0);
            device.write_sector(base + next as u64, &sector)?;
            next += 1;
        }
        if next < sectors {
            device.zero_sectors(base + next as u64, (sectors - next) as u64)?;
        }
        Ok(())
    }

    /// Shrink or grow an open file. New bytes read as zeros.
    fn truncate_file(&mut self, file: &mut FatFile, new_size: u32) -> FsResult<()> {
        self.refresh_empty_file(file)?;
        let cluster_bytes = self.fat_ref().bytes_per_cluster();
        let old_size = file.size();
        let first = file.first_cluster();
        let have = count_clusters(self.fat(), first)?;
        let need = clusters_for_size(new_size as u64, cluster_bytes);

        if need < have {
            if need == 0 {
                free_cluster_chain(self.fat(), first)?;
                file.set_first_cluster(0);
            } else {
                free_chain_from(self.fat(), first, need)?;
            }
        } else if new_size > old_size {
            let tail = old_size % cluster_bytes;
            if have > 0 && old_size > 0 && tail != 0 {
                if let Some(last) = nth_cluster(self.fat(), first, (old_size - 1) / cluster_bytes)? {
                    self.zero_cluster_tail(last, tail)?;
                }
            }
            if need > have {
                if first == 0 {
                    let cluster = allocate_cluster(self.fat())?;
                    file.set_first_cluster(cluster);
                    extend_chain(self.fat(), cluster, need - 1)?;
                } else {
                    extend_chain(self.fat(), first, need - have)?;
                }
            }
        }

        file.entry.file_size = new_size;
        if file.position > new_size {
            file.position = new_size;
        }
        file.reset_cursor();
        file.entry.touch();
        let parent = file.parent;
        self.update_entry(parent, &file.entry)
    }

    fn truncate(&mut self, path: &str, new_size: u32) -> FsResult<()> {
        let mut file = self.open(path)?;
        self.truncate_file(&mut file, new_size)
    }

    fn flush(&mut self) -> FsResult<()> {
        self.fat_ref().device().flush()
    }
}
