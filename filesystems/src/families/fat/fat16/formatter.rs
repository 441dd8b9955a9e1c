// FAT16 formatter
// Lays down boot sector, FAT copies and an empty root directory region

use crate::families::fat::common::{
    calculate_fat16_params, format_volume_label, generate_volume_serial, write_fat16_tables,
    CommonBpb, FatAttributes, FatParams, Fat16Bpb, ShortDirEntry, DIR_ENTRY_SIZE,
    EXTENDED_BOOT_SIGNATURE, MEDIA_FIXED, STANDARD_BYTES_PER_SECTOR,
};
use crate::families::fat::FormatOptions;
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use log::info;

/// Format `sectors` sectors starting at `start_lba` as FAT16
pub fn format_fat16(
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
        return Err(FsError::InvalidArgument(format!("{} sectors is too large for FAT16", sectors)));
    }

    let params = calculate_fat16_params(sectors, options.sectors_per_cluster)?;
    info!(
        "FAT16 parameters: {} sectors, {} sectors/cluster, {} sectors/FAT, {} root entries",
        sectors, params.sectors_per_cluster, params.sectors_per_fat, params.root_entries
    );

    let label = format_volume_label(options.label.as_deref());
    let bpb = Fat16Bpb {
        common: CommonBpb {
            jump_boot: [0xEB, 0x3C, 0x90],
            // Set OEM name to Windows 4.1 for compatibility
            oem_name: *b"MSWIN4.1",
            bytes_per_sector: STANDARD_BYTES_PER_SECTOR,
            sectors_per_cluster: params.sectors_per_cluster,
            reserved_sectors: params.reserved_sectors,
            num_fats: params.num_fats,
            root_entries: params.root_entries,
            total_sectors_16: if sectors < 0x10000 { sectors as u16 } else { 0 },
            media_descriptor: MEDIA_FIXED,
            sectors_per_fat_16: params.sectors_per_fat as u16,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: start_lba as u32,
            total_sectors_32: if sectors < 0x10000 { 0 } else { sectors as u32 },
        },
        drive_number: 0x80,
        boot_signature: EXTENDED_BOOT_SIGNATURE,
        volume_id: generate_volume_serial(),
        volume_label: label,
        fs_type: *b"FAT16   ",
    };

    let mut boot = [0u8; SECTOR_SIZE];
    bpb.encode(&mut boot)?;
    device.write_sector(start_lba, &boot)?;

    let fat_start = start_lba + params.reserved_sectors as u64;
    write_fat16_tables(device, fat_start, params.sectors_per_fat, params.num_fats, MEDIA_FIXED)?;

    let root_start = fat_start + params.num_fats as u64 * params.sectors_per_fat as u64;
    let root_sectors = (params.root_entries as u64 * DIR_ENTRY_SIZE as u64).div_ceil(SECTOR_SIZE as u64);
    device.zero_sectors(root_start, root_sectors)?;

    if options.label.as_deref().is_some_and(|l| !l.is_empty()) {
        let mut sector = [0u8; SECTOR_SIZE];
        ShortDirEntry::new(label, FatAttributes::VOLUME_ID, 0).write_slot(&mut sector, 0);
        device.write_sector(root_start, &sector)?;
    }

    device.flush()?;
    info!(
        "FAT16 format completed at LBA {}: {} clusters",
        start_lba, params.total_clusters
    );
    Ok(params)
}
