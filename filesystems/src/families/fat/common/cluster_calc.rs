// Cluster size and FAT size calculation for FAT filesystems
// Ensures correct cluster counts for FAT16 vs FAT32

use super::constants::*;
use crate::families::fat::FatType;
use fatvfs_core::{FsError, FsResult};

/// Parameters calculated for FAT filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatParams {
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub sectors_per_fat: u32,
    pub root_entries: u16,  // 0 for FAT32
    pub total_clusters: u32,
    pub fat_type: FatType,
}

const FAT16_ROOT_ENTRIES: u16 = 512;
const FAT16_RESERVED_SECTORS: u16 = 1;
const FAT32_RESERVED_SECTORS: u16 = 32;
const NUM_FATS: u8 = 2;

fn check_override(spc: u8) -> FsResult<()> {
    if spc == 0 || !spc.is_power_of_two() || spc > MAX_SECTORS_PER_CLUSTER {
        return Err(FsError::InvalidArgument(format!(
            "sectors per cluster must be a power of two up to {}, got {}",
            MAX_SECTORS_PER_CLUSTER, spc
        )));
    }
    Ok(())
}

/// Microsoft's recommended FAT16 cluster sizes
fn default_fat16_spc(total_sectors: u64) -> FsResult<u8> {
    Ok(if total_sectors <= 32_680 {
        2   // 1KB clusters for <= 16MB
    } else if total_sectors <= 262_144 {
        4   // 2KB clusters for <= 128MB
    } else if total_sectors <= 524_288 {
        8   // 4KB clusters for <= 256MB
    } else if total_sectors <= 1_048_576 {
        16  // 8KB clusters for <= 512MB
    } else if total_sectors <= 2_097_152 {
        32  // 16KB clusters for <= 1GB
    } else if total_sectors <= 4_194_304 {
        64  // 32KB clusters for <= 2GB
    } else {
        return Err(FsError::InvalidArgument(
            "Volume too large for FAT16 (max 2GB with 32KB clusters)".to_string(),
        ));
    })
}

/// Calculate FAT16 parameters
/// Ensures cluster count is between 4085 and 65524
pub fn calculate_fat16_params(total_sectors: u64, spc_override: Option<u8>) -> FsResult<FatParams> {
    let sectors_per_cluster = match spc_override {
        Some(spc) => {
            check_override(spc)?;
            spc
        }
        None => default_fat16_spc(total_sectors)?,
    };

    let root_dir_sectors = (FAT16_ROOT_ENTRIES as u64 * DIR_ENTRY_SIZE as u64).div_ceil(512);

    // Initial estimate without FAT size
    let data_start_estimate = FAT16_RESERVED_SECTORS as u64 + root_dir_sectors;
    let usable_sectors = total_sectors.saturating_sub(data_start_estimate);
    let estimate = usable_sectors / sectors_per_cluster as u64;

    // FAT size (2 bytes per cluster, +2 reserved entries)
    let sectors_per_fat = ((estimate + 2) * 2).div_ceil(512);

    // Recalculate with actual FAT size
    let data_start = FAT16_RESERVED_SECTORS as u64 + NUM_FATS as u64 * sectors_per_fat + root_dir_sectors;
    let data_sectors = total_sectors.saturating_sub(data_start);
    let total_clusters = data_sectors / sectors_per_cluster as u64;

    if total_clusters < FAT16_MIN_CLUSTERS as u64 {
        return Err(FsError::InvalidArgument(format!(
            "Volume too small for FAT16 (only {} clusters, need at least {})",
            total_clusters, FAT16_MIN_CLUSTERS
        )));
    }
    if total_clusters > FAT16_MAX_CLUSTERS as u64 {
        return Err(FsError::InvalidArgument(format!(
            "Too many clusters for FAT16 ({}, max {})",
            total_clusters, FAT16_MAX_CLUSTERS
        )));
    }

    Ok(FatParams {
        sectors_per_cluster,
        reserved_sectors: FAT16_RESERVED_SECTORS,
        num_fats: NUM_FATS,
        sectors_per_fat: sectors_per_fat as u32,
        root_entries: FAT16_ROOT_ENTRIES,
        total_clusters: total_clusters as u32,
        fat_type: FatType::Fat16,
    })
}

/// Calculate FAT32 parameters
/// Ensures cluster count is >= 65525
pub fn calculate_fat32_params(total_sectors: u64, spc_override: Option<u8>) -> FsResult<FatParams> {
    let mut sectors_per_cluster = match spc_override {
        Some(spc) => {
            check_override(spc)?;
            spc
        }
        None if total_sectors <= 532_480 => 1,     // 512B clusters for <= 260MB
        None if total_sectors <= 16_777_216 => 8,  // 4KB clusters for <= 8GB
        None if total_sectors <= 33_554_432 => 16, // 8KB clusters for <= 16GB
        None if total_sectors <= 67_108_864 => 32, // 16KB clusters for <= 32GB
        None => 64,
    };

    let reserved_sectors = FAT32_RESERVED_SECTORS as u64;
    let mut estimate = total_sectors.saturating_sub(reserved_sectors) / sectors_per_cluster as u64;

    // Halve the cluster size while there are too few clusters, unless it was requested
    while spc_override.is_none() && estimate < FAT32_MIN_CLUSTERS as u64 && sectors_per_cluster > 1 {
        sectors_per_cluster /= 2;
        estimate = total_sectors.saturating_sub(reserved_sectors) / sectors_per_cluster as u64;
    }

    // FAT size (4 bytes per cluster, +2 reserved entries)
    let sectors_per_fat = ((estimate + 2) * 4).div_ceil(512);

    let data_start = reserved_sectors + NUM_FATS as u64 * sectors_per_fat;
    let data_sectors = total_sectors.saturating_sub(data_start);
    let total_clusters = data_sectors / sectors_per_cluster as u64;

    if total_clusters < FAT32_MIN_CLUSTERS as u64 {
        return Err(FsError::InvalidArgument(format!(
            "Volume too small for FAT32 ({} clusters, need at least {})",
            total_clusters, FAT32_MIN_CLUSTERS
        )));
    }
    // 2^28 - 16 usable cluster numbers
    if total_clusters > 0x0FFF_FFF5 {
        return Err(FsError::InvalidArgument(format!(
            "Too many clusters for FAT32: {}",
            total_clusters
        )));
    }

    Ok(FatParams {
        sectors_per_cluster,
        reserved_sectors: FAT32_RESERVED_SECTORS,
        num_fats: NUM_FATS,
        sectors_per_fat: sectors_per_fat as u32,
        root_entries: 0,
        total_clusters: total_clusters as u32,
        fat_type: FatType::Fat32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fat16_small_volume() {
        let params = calculate_fat16_params(16384, None).unwrap();
        assert_eq!(params.sectors_per_cluster, 2);
        assert_eq!(params.sectors_per_fat, 32);
        assert_eq!(params.total_clusters, 8143);
        assert_eq!(params.root_entries, 512);
    }

    #[test]
    fn test_fat16_range_enforced() {
        assert!(calculate_fat16_params(2048, None).is_err());
        // 1 sector per cluster on a 128MB volume overflows the FAT16 range
        assert!(calculate_fat16_params(262_144, Some(1)).is_err());
        assert!(calculate_fat16_params(16384, Some(3)).is_err());
    }

    #[test]
    fn test_fat16_override_honoured() {
        let params = calculate_fat16_params(204_800, Some(8)).unwrap();
        assert_eq!(params.sectors_per_cluster, 8);
        assert!(params.total_clusters >= FAT16_MIN_CLUSTERS);
    }

    #[test]
    fn test_fat32_minimum_volume() {
        let params = calculate_fat32_params(70_000, None).unwrap();
        assert_eq!(params.sectors_per_cluster, 1);
        assert_eq!(params.sectors_per_fat, 547);
        assert_eq!(params.total_clusters, 68_874);
        assert_eq!(params.root_entries, 0);
    }

    #[test]
    fn test_fat32_too_small() {
        assert!(calculate_fat32_params(16384, None).is_err());
        assert!(calculate_fat32_params(204_800, Some(8)).is_err());
    }
}
