// FAT Filesystem Family
// Includes the FAT16 and FAT32 drivers and the boot-sector classifier shared by
// partition discovery and the mount path.

pub mod common;
pub mod fat16;
pub mod fat32;

use common::constants::*;
use common::structures::{has_boot_signature, CommonBpb};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::fmt;

/// Filesystem type guessed from a boot sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
    Unknown,
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
            FatType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Settings for laying down a fresh FAT volume
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Volume label (at most 11 characters are kept)
    pub label: Option<String>,
    /// Override the size-based cluster size; must keep the cluster count valid
    pub sectors_per_cluster: Option<u8>,
}

/// Classify a FAT boot sector by its estimated data-cluster count.
///
/// Anything without the 0x55AA signature or with a zero sector/cluster size is
/// `Unknown`; that is a negative result, not an error.
pub fn detect_fat_type(boot_sector: &[u8]) -> FatType {
    if !has_boot_signature(boot_sector) {
        return FatType::Unknown;
    }
    let bpb = match CommonBpb::decode(boot_sector) {
        Ok(bpb) => bpb,
        Err(_) => return FatType::Unknown,
    };
    if bpb.bytes_per_sector == 0 || bpb.sectors_per_cluster == 0 {
        return FatType::Unknown;
    }

    if bpb.sectors_per_fat_16 != 0 && bpb.root_entries != 0 {
        let overhead = bpb.reserved_sectors as u64
            + bpb.num_fats as u64 * bpb.sectors_per_fat_16 as u64
            + bpb.root_dir_sectors() as u64;
        let data_sectors = (bpb.total_sectors() as u64).saturating_sub(overhead);
        let clusters = data_sectors / bpb.sectors_per_cluster as u64;

        return if clusters < FAT16_MIN_CLUSTERS as u64 {
            FatType::Fat12
        } else if clusters < FAT32_MIN_CLUSTERS as u64 {
            FatType::Fat16
        } else {
            FatType::Fat32
        };
    }

    if bpb.root_entries == 0 && LittleEndian::read_u32(&boot_sector[BPB_FAT_SZ32..]) != 0 {
        return FatType::Fat32;
    }

    FatType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::structures::{Fat16Bpb, Fat32Bpb};

    fn fat16_sector(total_sectors: u32, spc: u8, spf: u16) -> [u8; 512] {
        let mut sector = [0u8; 512];
        let mut bpb = Fat16Bpb::default();
        bpb.common.bytes_per_sector = 512;
        bpb.common.sectors_per_cluster = spc;
        bpb.common.reserved_sectors = 1;
        bpb.common.num_fats = 2;
        bpb.common.root_entries = 512;
        bpb.common.sectors_per_fat_16 = spf;
        bpb.common.total_sectors_32 = total_sectors;
        bpb.encode(&mut sector).unwrap();
        sector
    }

    #[test]
    fn test_detect_by_cluster_count() {
        assert_eq!(detect_fat_type(&fat16_sector(16384, 2, 32)), FatType::Fat16);
        assert_eq!(detect_fat_type(&fat16_sector(4096, 4, 4)), FatType::Fat12);
        assert_eq!(detect_fat_type(&fat16_sector(600_000, 1, 256)), FatType::Fat32);
    }

    #[test]
    fn test_detect_fat32_layout() {
        let mut sector = [0u8; 512];
        let mut bpb = Fat32Bpb::default();
        bpb.common.bytes_per_sector = 512;
        bpb.common.sectors_per_cluster = 1;
        bpb.common.reserved_sectors = 32;
        bpb.common.num_fats = 2;
        bpb.fat_size_32 = 547;
        bpb.root_cluster = 2;
        bpb.encode(&mut sector).unwrap();
        assert_eq!(detect_fat_type(&sector), FatType::Fat32);
    }

    #[test]
    fn test_detect_rejects_garbage() {
        assert_eq!(detect_fat_type(&[0u8; 512]), FatType::Unknown);

        let mut sector = fat16_sector(16384, 2, 32);
        sector[BPB_SEC_PER_CLUS] = 0;
        assert_eq!(detect_fat_type(&sector), FatType::Unknown);

        assert_eq!(detect_fat_type(&[0u8; 100]), FatType::Unknown);
    }
}
