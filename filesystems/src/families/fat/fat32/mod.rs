// FAT32 driver
// The root directory is an ordinary cluster chain starting at `root_cluster`.
// Directory clusters are read and written whole through a scratch buffer
// allocated once per mount.

pub mod formatter;


pub use formatter::format_fat32;

use super::common::cluster_chain::{append_cluster, read_cluster_chain};
use super::common::{
    has_boot_signature, ClusterValue, FatLayout, FatRegion, FatTable, FatVolume, FatWidth, Fat32Bpb,
    ShortDirEntry, SlotPos, SlotState, DIR_ENTRY_SIZE, FAT32_MIN_CLUSTERS, FIRST_DATA_CLUSTER,
    MAX_SECTORS_PER_CLUSTER, STANDARD_BYTES_PER_SECTOR,
};
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use log::{info, warn};

/// A mounted FAT32 volume
#[derive(Debug)]
pub struct Fat32Fs {
    bpb: Fat32Bpb,
    partition_lba: u64,
    fat_start: u64,
    data_start: u64,
    root_cluster: u32,
    fat: FatRegion,
    /// One cluster of directory entries
    scratch: Vec<u8>,
}

impl Fat32Fs {
    /// Mount the FAT32 volume whose boot sector is at `partition_lba`
    pub fn mount(device: SharedDevice, partition_lba: u64) -> FsResult<Self> {
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(partition_lba, &mut sector)?;
        if !has_boot_signature(&sector) {
            return Err(FsError::Corrupt(format!(
                "no boot signature at LBA {}",
                partition_lba
            )));
        }

        let bpb = Fat32Bpb::decode(&sector)?;
        let common = &bpb.common;

        if common.bytes_per_sector != STANDARD_BYTES_PER_SECTOR {
            return Err(FsError::NotSupported(format!(
                "{}-byte sectors",
                common.bytes_per_sector
            )));
        }
        let spc = common.sectors_per_cluster;
        if spc == 0 || !spc.is_power_of_two() {
            return Err(FsError::Corrupt(format!("sectors per cluster is {}", spc)));
        }
        if spc > MAX_SECTORS_PER_CLUSTER {
            return Err(FsError::NotSupported(format!("{}-sector clusters", spc)));
        }
        if common.root_entries != 0 || bpb.fat_size_32 == 0 {
            return Err(FsError::Corrupt(
                "BPB describes a fixed root directory, not FAT32".to_string(),
            ));
        }
        if common.num_fats == 0 || common.reserved_sectors == 0 {
            return Err(FsError::Corrupt("FAT32 BPB has an empty FAT region".to_string()));
        }

        let fat_start = partition_lba + common.reserved_sectors as u64;
        let data_start = fat_start + common.num_fats as u64 * bpb.fat_size_32 as u64;
        let total_sectors = common.total_sectors() as u64;
        let overhead = data_start - partition_lba;
        if total_sectors <= overhead {
            return Err(FsError::Corrupt(format!(
                "volume of {} sectors has no data area",
                total_sectors
            )));
        }

        let mut total_clusters = ((total_sectors - overhead) / spc as u64).min(u32::MAX as u64) as u32;
        let fat_capacity = (bpb.fat_size_32 as u64 * (SECTOR_SIZE as u64 / 4) - 2).min(u32::MAX as u64) as u32;
        if total_clusters > fat_capacity {
            warn!(
                "FAT32 FAT covers {} clusters but the data area holds {}; using the smaller",
                fat_capacity, total_clusters
            );
            total_clusters = fat_capacity;
        }
        if total_clusters < FAT32_MIN_CLUSTERS {
            warn!(
                "FAT32 volume at LBA {} has only {} clusters",
                partition_lba, total_clusters
            );
        }

        let root_cluster = bpb.root_cluster;
        if root_cluster < FIRST_DATA_CLUSTER || root_cluster >= total_clusters.saturating_add(FIRST_DATA_CLUSTER) {
            return Err(FsError::Corrupt(format!(
                "root cluster {} outside data area",
                root_cluster
            )));
        }

        let device_sectors = device.total_sectors()?;
        if partition_lba + total_sectors > device_sectors {
            warn!(
                "FAT32 volume at LBA {} claims {} sectors but the device ends at {}",
                partition_lba, total_sectors, device_sectors
            );
        }

        let layout = FatLayout {
            width: FatWidth::Fat32,
            fat_start,
            sectors_per_fat: bpb.fat_size_32,
            num_fats: common.num_fats,
            data_start,
            sectors_per_cluster: spc as u32,
            total_clusters,
        };

        info!(
            "Mounted FAT32 volume at LBA {}: {} clusters of {} bytes, root at cluster {}",
            partition_lba,
            total_clusters,
            spc as u32 * SECTOR_SIZE as u32,
            root_cluster
        );

        Ok(Self {
            bpb,
            partition_lba,
            fat_start,
            data_start,
            root_cluster,
            fat: FatRegion::new(device, layout),
            scratch: vec![0u8; spc as usize * SECTOR_SIZE],
        })
    }

    pub fn bpb(&self) -> &Fat32Bpb {
        &self.bpb
    }

    pub fn partition_lba(&self) -> u64 {
        self.partition_lba
    }

    pub fn fat_start(&self) -> u64 {
        self.fat_start
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    pub fn total_clusters(&self) -> u32 {
        self.fat.layout().total_clusters
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.fat.bytes_per_cluster()
    }

    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.bpb.volume_label).trim_end().to_string()
    }

    pub fn free_clusters(&mut self) -> FsResult<u32> {
        let mut free = 0;
        for cluster in FIRST_DATA_CLUSTER..self.total_clusters() + FIRST_DATA_CLUSTER {
            let value = self.fat.read_entry(cluster)?;
            if self.fat.classify(value) == ClusterValue::Free {
                free += 1;
            }
        }
        Ok(free)
    }

    fn entries_per_cluster(&self) -> usize {
        self.scratch.len() / DIR_ENTRY_SIZE
    }

    fn load_cluster(&mut self, cluster: u32) -> FsResult<u64> {
        self.fat.read_cluster(cluster, &mut self.scratch)?;
        Ok(self.fat.cluster_lba(cluster))
    }
}

impl FatVolume for Fat32Fs {
    fn fat(&mut self) -> &mut FatRegion {
        &mut self.fat
    }

    fn fat_ref(&self) -> &FatRegion {
        &self.fat
    }

    fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    fn scan_dir<T, F>(&mut self, dir: u32, mut visit: F) -> FsResult<Option<T>>
    where
        F: FnMut(&ShortDirEntry, SlotPos) -> Option<T>,
    {
        let per_cluster = self.entries_per_cluster();
        for cluster in read_cluster_chain(&mut self.fat, dir)? {
            let lba = self.load_cluster(cluster)?;
            for index in 0..per_cluster {
                let entry = ShortDirEntry::read_slot(&self.scratch, index);
                if entry.state() == SlotState::End {
                    return Ok(None);
                }
                if let Some(found) = visit(&entry, SlotPos { lba, index }) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn write_slot(&mut self, slot: SlotPos, entry: &ShortDirEntry) -> FsResult<()> {
        let sectors = self.fat.layout().sectors_per_cluster;
        self.fat.device().read_sectors(slot.lba, sectors, &mut self.scratch)?;
        entry.write_slot(&mut self.scratch, slot.index);
        self.fat.device().write_sectors(slot.lba, sectors, &self.scratch)
    }

    fn free_slot(&mut self, dir: u32) -> FsResult<SlotPos> {
        let per_cluster = self.entries_per_cluster();
        let chain = read_cluster_chain(&mut self.fat, dir)?;

        for &cluster in &chain {
            let lba = self.load_cluster(cluster)?;
            for index in 0..per_cluster {
                match ShortDirEntry::read_slot(&self.scratch, index).state() {
                    SlotState::End | SlotState::Deleted => return Ok(SlotPos { lba, index }),
                    _ => {}
                }
            }
        }

        let last = match chain.last() {
            Some(&last) => last,
            None => return Err(FsError::Corrupt(format!("directory cluster {} has no chain", dir))),
        };
        let cluster = append_cluster(&mut self.fat, last)?;
        Ok(SlotPos {
            lba: self.fat.cluster_lba(cluster),
            index: 0,
        })
    }
}
