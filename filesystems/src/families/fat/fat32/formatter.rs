// FAT32 formatter
// Reserved region (boot sector, FSInfo, backup copies), FAT copies and a
// single-cluster root directory.

use crate::families::fat::common::{
    calculate_fat32_params, format_volume_label, generate_volume_serial, write_fat32_tables,
    CommonBpb, FatAttributes, FatParams, Fat32Bpb, ShortDirEntry, EXTENDED_BOOT_SIGNATURE,
    FAT32_BACKUP_BOOT_SECTOR, FAT32_FS_INFO_SECTOR, FAT32_ROOT_CLUSTER, FSINFO_LEAD_SIG,
    FSINFO_STRUCT_SIG, FSINFO_TRAIL_SIG, MEDIA_FIXED, STANDARD_BYTES_PER_SECTOR,
};
use crate::families::fat::FormatOptions;
use byteorder::{ByteOrder, LittleEndian};
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use log::{debug, info};

/// Free count and next-free hint both "unknown"; the driver never maintains them
const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Build the FSInfo sector
fn fsinfo_sector() -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    LittleEndian::write_u32(&mut sector[0..], FSINFO_LEAD_SIG);
    LittleEndian::write_u32(&mut sector[484..], FSINFO_STRUCT_SIG);
    LittleEndian::write_u32(&mut sector[488..], FSINFO_UNKNOWN);
    LittleEndian::write_u32(&mut sector[492..], FSINFO_UNKNOWN);
    LittleEndian::write_u32(&mut sector[508..], FSINFO_TRAIL_SIG);
    sector
}

/// Format `sectors` sectors starting at `start_lba` as FAT32
pub fn format_fat32(
    device: &SharedDevice,
    start_lba: u64,
    sectors: u64,
    options: &FormatOptions,
) -> FsResult<FatParams> {
    let device_sectors = device.total_sectors()?;
    if start_lba + sectors > device_sectors {
        return Err(FsError::InvalidArgument(format!(
            "volume {}..{} extends past the device ({} sectors)",
            start_lba,
            start_lba + sectors,
            device_sectors
        )));
    }
    if sectors > u32::MAX as u64 {
        return Err(FsError::InvalidArgument(format!("{} sectors is too large for FAT32", sectors)));
    }

    let params = calculate_fat32_params(sectors, options.sectors_per_cluster)?;
    info!(
        "FAT32 parameters: {} sectors, {} sectors/cluster, {} sectors/FAT, {} clusters",
        sectors, params.sectors_per_cluster, params.sectors_per_fat, params.total_clusters
    );

    let label = format_volume_label(options.label.as_deref());
    let bpb = Fat32Bpb {
        common: CommonBpb {
            jump_boot: [0xEB, 0x58, 0x90],
            oem_name: *b"MSWIN4.1",
            bytes_per_sector: STANDARD_BYTES_PER_SECTOR,
            sectors_per_cluster: params.sectors_per_cluster,
            reserved_sectors: params.reserved_sectors,
            num_fats: params.num_fats,
            root_entries: 0,
            total_sectors_16: 0,
            media_descriptor: MEDIA_FIXED,
            sectors_per_fat_16: 0,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: start_lba as u32,
            total_sectors_32: sectors as u32,
        },
        fat_size_32: params.sectors_per_fat,
        ext_flags: 0,
        fs_version: 0,
        root_cluster: FAT32_ROOT_CLUSTER,
        fs_info: FAT32_FS_INFO_SECTOR,
        backup_boot_sector: FAT32_BACKUP_BOOT_SECTOR,
        drive_number: 0x80,
        boot_signature: EXTENDED_BOOT_SIGNATURE,
        volume_id: generate_volume_serial(),
        volume_label: label,
        fs_type: *b"FAT32   ",
    };

    device.zero_sectors(start_lba, params.reserved_sectors as u64)?;

    let mut boot = [0u8; SECTOR_SIZE];
    bpb.encode(&mut boot)?;
    let fsinfo = fsinfo_sector();
    let backup = FAT32_BACKUP_BOOT_SECTOR as u64;
    let fsinfo_lba = FAT32_FS_INFO_SECTOR as u64;

    device.write_sector(start_lba, &boot)?;
    device.write_sector(start_lba + fsinfo_lba, &fsinfo)?;
    device.write_sector(start_lba + backup, &boot)?;
    device.write_sector(start_lba + backup + fsinfo_lba, &fsinfo)?;
    debug!("Wrote boot sector, FSInfo and backups at LBA {}", start_lba);

    let fat_start = start_lba + params.reserved_sectors as u64;
    write_fat32_tables(
        device,
        fat_start,
        params.sectors_per_fat,
        params.num_fats,
        MEDIA_FIXED,
        FAT32_ROOT_CLUSTER,
    )?;

    // Root directory is the first data cluster
    let root_lba = fat_start + params.num_fats as u64 * params.sectors_per_fat as u64;
    device.zero_sectors(root_lba, params.sectors_per_cluster as u64)?;

    if options.label.as_deref().is_some_and(|l| !l.is_empty()) {
        let mut sector = [0u8; SECTOR_SIZE];
        ShortDirEntry::new(label, FatAttributes::VOLUME_ID, 0).write_slot(&mut sector, 0);
        device.write_sector(root_lba, &sector)?;
    }

    device.flush()?;
    info!(
        "FAT32 format completed at LBA {}: {} clusters",
        start_lba, params.total_clusters
    );
    Ok(params)
}
