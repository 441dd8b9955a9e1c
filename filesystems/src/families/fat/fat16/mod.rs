// FAT16 driver
// A fixed, non-chained root directory region followed by cluster-chained data.

pub mod formatter;


pub use formatter::format_fat16;

use super::common::cluster_chain::{append_cluster, last_cluster, read_cluster_chain};
use super::common::{
    has_boot_signature, FatLayout, FatRegion, FatTable, FatVolume, FatWidth, Fat16Bpb,
    ShortDirEntry, SlotPos, SlotState, ClusterValue, DIR_ENTRIES_PER_SECTOR, FAT16_MAX_CLUSTERS,
    FAT16_MIN_CLUSTERS, MAX_SECTORS_PER_CLUSTER, STANDARD_BYTES_PER_SECTOR,
};
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use log::{info, warn};

/// A mounted FAT16 volume
#[derive(Debug)]
pub struct Fat16Fs {
    bpb: Fat16Bpb,
    partition_lba: u64,
    fat_start: u64,
    root_dir_start: u64,
    root_dir_sectors: u32,
    data_start: u64,
    fat: FatRegion,
}

impl Fat16Fs {
    /// Mount the FAT16 volume whose boot sector is at `partition_lba`
    pub fn mount(device: SharedDevice, partition_lba: u64) -> FsResult<Self> {
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(partition_lba, &mut sector)?;
        if !has_boot_signature(&sector) {
            return Err(FsError::Corrupt(format!(
                "no boot signature at LBA {}",
                partition_lba
            )));
        }

        let bpb = Fat16Bpb::decode(&sector)?;
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
        if common.num_fats == 0 || common.sectors_per_fat_16 == 0 || common.reserved_sectors == 0 {
            return Err(FsError::Corrupt("FAT16 BPB has an empty FAT region".to_string()));
        }
        if common.root_entries == 0 {
            return Err(FsError::Corrupt(
                "no fixed root directory (FAT32 volume?)".to_string(),
            ));
        }

        // Derived absolute sectors
        let root_dir_sectors = common.root_dir_sectors();
        let sectors_per_fat = common.sectors_per_fat_16 as u32;
        let fat_start = partition_lba + common.reserved_sectors as u64;
        let root_dir_start = fat_start + common.num_fats as u64 * sectors_per_fat as u64;
        let data_start = root_dir_start + root_dir_sectors as u64;

        let total_sectors = common.total_sectors() as u64;
        let overhead = data_start - partition_lba;
        if total_sectors <= overhead {
            return Err(FsError::Corrupt(format!(
                "volume of {} sectors has no data area",
                total_sectors
            )));
        }

        let mut total_clusters = ((total_sectors - overhead) / spc as u64) as u32;
        let fat_capacity = sectors_per_fat * (SECTOR_SIZE as u32 / 2) - 2;
        if total_clusters > fat_capacity {
            warn!(
                "FAT16 FAT covers {} clusters but the data area holds {}; using the smaller",
                fat_capacity, total_clusters
            );
            total_clusters = fat_capacity;
        }
        if total_clusters < FAT16_MIN_CLUSTERS {
            return Err(FsError::NotSupported(format!(
                "{} clusters is a FAT12 volume",
                total_clusters
            )));
        }
        if total_clusters > FAT16_MAX_CLUSTERS {
            return Err(FsError::Corrupt(format!(
                "{} clusters is too many for FAT16",
                total_clusters
            )));
        }

        let device_sectors = device.total_sectors()?;
        if partition_lba + total_sectors > device_sectors {
            warn!(
                "FAT16 volume at LBA {} claims {} sectors but the device ends at {}",
                partition_lba, total_sectors, device_sectors
            );
        }

        let layout = FatLayout {
            width: FatWidth::Fat16,
            fat_start,
            sectors_per_fat,
            num_fats: common.num_fats,
            data_start,
            sectors_per_cluster: spc as u32,
            total_clusters,
        };

        info!(
            "Mounted FAT16 volume at LBA {}: {} clusters of {} bytes, {} root entries",
            partition_lba,
            total_clusters,
            spc as u32 * SECTOR_SIZE as u32,
            common.root_entries
        );

        Ok(Self {
            bpb,
            partition_lba,
            fat_start,
            root_dir_start,
            root_dir_sectors,
            data_start,
            fat: FatRegion::new(device, layout),
        })
    }

    pub fn bpb(&self) -> &Fat16Bpb {
        &self.bpb
    }

    pub fn partition_lba(&self) -> u64 {
        self.partition_lba
    }

    pub fn fat_start(&self) -> u64 {
        self.fat_start
    }

    pub fn root_dir_start(&self) -> u64 {
        self.root_dir_start
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
        for cluster in 2..self.total_clusters() + 2 {
            let value = self.fat.read_entry(cluster)?;
            if self.fat.classify(value) == ClusterValue::Free {
                free += 1;
            }
        }
        Ok(free)
    }

    /// Absolute sectors of a directory: the root region for 0, else its chain
    fn dir_sectors(&mut self, dir: u32) -> FsResult<Vec<u64>> {
        if dir == 0 {
            let start = self.root_dir_start;
            return Ok((start..start + self.root_dir_sectors as u64).collect());
        }
        let spc = self.fat.layout().sectors_per_cluster as u64;
        let chain = read_cluster_chain(&mut self.fat, dir)?;
        Ok(chain
            .into_iter()
            .flat_map(|cluster| {
                let base = self.fat.cluster_lba(cluster);
                base..base + spc
            })
            .collect())
    }
}

impl FatVolume for Fat16Fs {
    fn fat(&mut self) -> &mut FatRegion {
        &mut self.fat
    }

    fn fat_ref(&self) -> &FatRegion {
        &self.fat
    }

    fn root_cluster(&self) -> u32 {
        0
    }

    fn scan_dir<T, F>(&mut self, dir: u32, mut visit: F) -> FsResult<Option<T>>
    where
        F: FnMut(&ShortDirEntry, SlotPos) -> Option<T>,
    {
        let mut buf = [0u8; SECTOR_SIZE];
        for lba in self.dir_sectors(dir)? {
            self.fat.device().read_sector(lba, &mut buf)?;
            for index in 0..DIR_ENTRIES_PER_SECTOR {
                let entry = ShortDirEntry::read_slot(&buf, index);
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
        let mut buf = [0u8; SECTOR_SIZE];
        self.fat.device().read_sector(slot.lba, &mut buf)?;
        entry.write_slot(&mut buf, slot.index);
        self.fat.device().write_sector(slot.lba, &buf)
    }

    fn free_slot(&mut self, dir: u32) -> FsResult<SlotPos> {
        let mut buf = [0u8; SECTOR_SIZE];
        for lba in self.dir_sectors(dir)? {
            self.fat.device().read_sector(lba, &mut buf)?;
            for index in 0..DIR_ENTRIES_PER_SECTOR {
                match ShortDirEntry::read_slot(&buf, index).state() {
                    SlotState::End | SlotState::Deleted => return Ok(SlotPos { lba, index }),
                    _ => {}
                }
            }
        }

        if dir == 0 {
            return Err(FsError::NoSpace(format!(
                "root directory is full ({} entries)",
                self.bpb.common.root_entries
            )));
        }

        let last = last_cluster(&mut self.fat, dir)?;
        let cluster = append_cluster(&mut self.fat, last)?;
        Ok(SlotPos {
            lba: self.fat.cluster_lba(cluster),
            index: 0,
        })
    }
}
