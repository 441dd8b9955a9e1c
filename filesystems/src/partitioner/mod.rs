// Partition table management
// Discovery of MBR/GPT disks, plus builders that lay down fresh tables for
// disk images.

pub mod discovery;
pub mod gpt;
pub mod mbr;


pub use discovery::{format_size, DiskInfo, PartitionDescriptor, PartitionTable, MAX_DISKS};
pub use mbr::lba_to_chs;

use crate::families::fat::common::{PARTITION_TYPE_FAT12, PARTITION_TYPE_FAT16, PARTITION_TYPE_FAT32_LBA};
use crate::families::fat::FatType;
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use gpt::{GptEntry, GptHeader, BASIC_DATA_PARTITION, GPT_ENTRY_SIZE, GPT_HEADER_SIZE, GPT_MAX_ENTRIES, GPT_REVISION};
use log::info;
use mbr::{Mbr, MbrSlot, MBR_BOOT_FLAG, MBR_SLOT_COUNT, PARTITION_TYPE_GPT_PROTECTIVE};
use serde::Serialize;
use uuid::Uuid;

/// Type of partition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionScheme {
    Mbr,
    Gpt,
}

/// Standard 1 MiB alignment for the first partition
pub const FIRST_PARTITION_LBA: u64 = 2048;

/// One partition to create
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub start_lba: u64,
    pub sectors: u64,
    /// Type byte used in an MBR
    pub mbr_type: u8,
    /// Type GUID used in a GPT
    pub type_guid: Uuid,
    /// GPT partition name
    pub name: String,
    /// MBR boot flag; GPT marks bootability through the type GUID
    pub bootable: bool,
}

impl PartitionSpec {
    /// A data partition typed for the given FAT variant
    pub fn for_fat(fat_type: FatType, start_lba: u64, sectors: u64) -> Self {
        let mbr_type = match fat_type {
            FatType::Fat32 => PARTITION_TYPE_FAT32_LBA,
            FatType::Fat12 => PARTITION_TYPE_FAT12,
            _ => PARTITION_TYPE_FAT16,
        };
        Self {
            start_lba,
            sectors,
            mbr_type,
            type_guid: BASIC_DATA_PARTITION,
            name: format!("{} Volume", fat_type),
            bootable: false,
        }
    }

    fn end_lba(&self) -> u64 {
        self.start_lba + self.sectors
    }
}

/// Sectors to write for a partition table: `(lba, sector contents)` pairs
#[derive(Debug, Clone, Default)]
pub struct PartitionLayout {
    pub sectors: Vec<(u64, Vec<u8>)>,
}

impl PartitionLayout {
    fn push(&mut self, lba: u64, data: &[u8]) {
        self.sectors.push((lba, data.to_vec()));
    }
}

fn check_specs(specs: &[PartitionSpec], first: u64, last: u64) -> FsResult<()> {
    for (i, spec) in specs.iter().enumerate() {
        if spec.sectors == 0 {
            return Err(FsError::InvalidArgument(format!("partition {} is empty", i + 1)));
        }
        if spec.start_lba < first || spec.end_lba() > last + 1 {
            return Err(FsError::InvalidArgument(format!(
                "partition {} ({}..{}) is outside the usable range {}..={}",
                i + 1,
                spec.start_lba,
                spec.end_lba(),
                first,
                last
            )));
        }
        for (j, other) in specs.iter().enumerate().skip(i + 1) {
            if spec.start_lba < other.end_lba() && other.start_lba < spec.end_lba() {
                return Err(FsError::InvalidArgument(format!(
                    "partitions {} and {} overlap",
                    i + 1,
                    j + 1
                )));
            }
        }
    }
    Ok(())
}

fn disk_signature() -> u32 {
    // Windows ignores MBRs whose signature is zero
    match rand::random::<u32>() {
        0 => 0x1234_5678,
        sig => sig,
    }
}

/// Build an MBR with up to four primary partitions
pub fn build_mbr(disk_sectors: u64, specs: &[PartitionSpec]) -> FsResult<PartitionLayout> {
    if specs.len() > MBR_SLOT_COUNT {
        return Err(FsError::InvalidArgument(format!(
            "an MBR holds at most {} partitions, got {}",
            MBR_SLOT_COUNT,
            specs.len()
        )));
    }
    check_specs(specs, 1, disk_sectors.saturating_sub(1))?;

    let mut mbr = Mbr {
        disk_signature: disk_signature(),
        ..Mbr::default()
    };
    for (slot, spec) in mbr.slots.iter_mut().zip(specs) {
        if spec.end_lba() > u32::MAX as u64 {
            return Err(FsError::InvalidArgument(format!(
                "partition ending at LBA {} cannot be addressed by an MBR",
                spec.end_lba()
            )));
        }
        *slot = MbrSlot {
            boot_flag: if spec.bootable { MBR_BOOT_FLAG } else { 0 },
            start_chs: lba_to_chs(spec.start_lba),
            partition_type: spec.mbr_type,
            end_chs: lba_to_chs(spec.end_lba() - 1),
            lba_start: spec.start_lba as u32,
            num_sectors: spec.sectors as u32,
        };
    }

    let mut sector = [0u8; SECTOR_SIZE];
    mbr.encode(&mut sector);

    info!(
        "Built MBR with {} partition(s), disk signature 0x{:08X}",
        specs.len(),
        mbr.disk_signature
    );
    for spec in specs {
        info!(
            "  type 0x{:02X} at LBA {}, {} sectors ({} MB)",
            spec.mbr_type,
            spec.start_lba,
            spec.sectors,
            spec.sectors * SECTOR_SIZE as u64 / 1024 / 1024
        );
    }

    let mut layout = PartitionLayout::default();
    layout.push(0, &sector);
    Ok(layout)
}

/// Build a protective MBR, primary GPT and backup GPT
pub fn build_gpt(disk_sectors: u64, specs: &[PartitionSpec]) -> FsResult<PartitionLayout> {
    let entry_sectors = (GPT_MAX_ENTRIES as u64 * GPT_ENTRY_SIZE as u64) / SECTOR_SIZE as u64;
    // MBR, header and entries at the front; entries and header again at the back
    let min_sectors = 2 * (1 + entry_sectors) + 2;
    if disk_sectors < min_sectors {
        return Err(FsError::InvalidArgument(format!(
            "{} sectors is too small for a GPT disk",
            disk_sectors
        )));
    }
    if specs.len() > GPT_MAX_ENTRIES as usize {
        return Err(FsError::InvalidArgument(format!(
            "at most {} GPT partitions, got {}",
            GPT_MAX_ENTRIES,
            specs.len()
        )));
    }

    let backup_lba = disk_sectors - 1;
    let first_usable = 2 + entry_sectors;
    let last_usable = backup_lba - entry_sectors - 1;
    check_specs(specs, first_usable, last_usable)?;

    let protective = Mbr {
        disk_signature: 0,
        slots: [
            MbrSlot {
                boot_flag: 0,
                start_chs: [0x00, 0x02, 0x00],
                partition_type: PARTITION_TYPE_GPT_PROTECTIVE,
                end_chs: [0xFE, 0xFF, 0xFF],
                lba_start: 1,
                num_sectors: (disk_sectors - 1).min(u32::MAX as u64) as u32,
            },
            MbrSlot::default(),
            MbrSlot::default(),
            MbrSlot::default(),
        ],
    };
    let mut mbr_sector = [0u8; SECTOR_SIZE];
    protective.encode(&mut mbr_sector);

    let mut entries = vec![0u8; (entry_sectors as usize) * SECTOR_SIZE];
    for (i, spec) in specs.iter().enumerate() {
        let entry = GptEntry {
            type_guid: spec.type_guid,
            unique_guid: Uuid::new_v4(),
            first_lba: spec.start_lba,
            last_lba: spec.end_lba() - 1,
            attributes: 0,
            name: spec.name.clone(),
        };
        let offset = i * GPT_ENTRY_SIZE as usize;
        entry.encode(&mut entries[offset..offset + GPT_ENTRY_SIZE as usize]);
    }

    let mut primary = GptHeader {
        revision: GPT_REVISION,
        header_size: GPT_HEADER_SIZE,
        header_crc32: 0,
        current_lba: 1,
        backup_lba,
        first_usable_lba: first_usable,
        last_usable_lba: last_usable,
        disk_guid: Uuid::new_v4(),
        entries_lba: 2,
        num_entries: GPT_MAX_ENTRIES,
        entry_size: GPT_ENTRY_SIZE,
        entries_crc32: crc32fast::hash(&entries),
    };
    let mut backup = GptHeader {
        current_lba: backup_lba,
        backup_lba: 1,
        entries_lba: backup_lba - entry_sectors,
        ..primary
    };
    primary.seal();
    backup.seal();

    let mut primary_sector = [0u8; SECTOR_SIZE];
    primary.encode(&mut primary_sector);
    let mut backup_sector = [0u8; SECTOR_SIZE];
    backup.encode(&mut backup_sector);

    info!(
        "Built GPT with {} partition(s), disk GUID {}",
        specs.len(),
        primary.disk_guid
    );

    let mut layout = PartitionLayout::default();
    layout.push(0, &mbr_sector);
    layout.push(1, &primary_sector);
    layout.push(2, &entries);
    layout.push(backup.entries_lba, &entries);
    layout.push(backup_lba, &backup_sector);
    Ok(layout)
}

/// Build a table of the requested scheme
pub fn build_partition_table(
    scheme: PartitionScheme,
    disk_sectors: u64,
    specs: &[PartitionSpec],
) -> FsResult<PartitionLayout> {
    match scheme {
        PartitionScheme::Mbr => build_mbr(disk_sectors, specs),
        PartitionScheme::Gpt => build_gpt(disk_sectors, specs),
    }
}

/// Write a built table to the device
pub fn write_partition_table(device: &SharedDevice, layout: &PartitionLayout) -> FsResult<()> {
    for (lba, data) in &layout.sectors {
        let count = (data.len() / SECTOR_SIZE) as u32;
        device.write_sectors(*lba, count, data)?;
    }
    device.flush()?;
    info!("Wrote partition table ({} region(s))", layout.sectors.len());
    Ok(())
}
