// Partition discovery
// Probes disks for an MBR or GPT, records one descriptor per partition and
// classifies each partition's filesystem from its boot sector.

use super::gpt::{gpt_type_name, has_gpt_signature, GptEntry, GptHeader};
use super::mbr::{has_mbr_signature, partition_type_name, Mbr};
use super::PartitionScheme;
use crate::families::fat::{detect_fat_type, FatType};
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt::Write as _;
use uuid::Uuid;

/// Disks the table can hold
pub const MAX_DISKS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionDescriptor {
    /// `disk<N>p<M>`
    pub name: String,
    pub device_port: usize,
    /// 1-based slot (MBR) or entry (GPT) number
    pub index: usize,
    pub start_lba: u64,
    /// Last sector of the partition, inclusive
    pub end_lba: u64,
    pub sector_count: u64,
    pub bootable: bool,
    pub fs_type: FatType,
    /// MBR type name, or the GPT type GUID's name
    pub type_name: String,
    /// GPT partition name; empty for MBR
    pub partition_name: String,
    pub mbr_type: Option<u8>,
    pub type_guid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    /// `disk<N>`
    pub name: String,
    pub port: usize,
    pub sectors: u64,
    pub scheme: PartitionScheme,
    pub partitions: Vec<PartitionDescriptor>,
    #[serde(skip)]
    pub device: SharedDevice,
}

/// Render a sector count as `<n>G`, `<n>M`, `<n>K` or `<n>B`, truncating
pub fn format_size(sectors: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    let bytes = sectors * SECTOR_SIZE as u64;
    if bytes >= GIB {
        format!("{}G", bytes / GIB)
    } else if bytes >= MIB {
        format!("{}M", bytes / MIB)
    } else if bytes >= KIB {
        format!("{}K", bytes / KIB)
    } else {
        format!("{}B", bytes)
    }
}

/// Every disk probed so far, in registration order
#[derive(Debug, Default)]
pub struct PartitionTable {
    disks: Vec<DiskInfo>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disks(&self) -> &[DiskInfo] {
        &self.disks
    }

    pub fn partitions(&self) -> impl Iterator<Item = &PartitionDescriptor> {
        self.disks.iter().flat_map(|disk| disk.partitions.iter())
    }

    /// Look a partition up by its `disk<N>p<M>` name
    pub fn find(&self, name: &str) -> Option<&PartitionDescriptor> {
        self.partitions().find(|part| part.name == name)
    }

    pub fn disk(&self, port: usize) -> Option<&DiskInfo> {
        self.disks.iter().find(|disk| disk.port == port)
    }

    /// Device backing a partition
    pub fn device_of(&self, part: &PartitionDescriptor) -> Option<SharedDevice> {
        self.disk(part.device_port).map(|disk| disk.device.clone())
    }

    /// Probe `device` as disk `port`.
    ///
    /// Returns `Ok(None)` when sector 0 carries no boot signature. A port that
    /// was probed before keeps its `disk<N>` name and has its record replaced.
    pub fn probe(&mut self, port: usize, device: SharedDevice) -> FsResult<Option<&DiskInfo>> {
        let slot = self.disks.iter().position(|disk| disk.port == port);
        if slot.is_none() && self.disks.len() >= MAX_DISKS {
            return Err(FsError::NoSpace(format!("at most {} disks can be probed", MAX_DISKS)));
        }
        let disk_index = slot.unwrap_or(self.disks.len());
        let disk_name = format!("disk{}", disk_index);

        let sectors = device.total_sectors()?;
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut sector)?;
        if !has_mbr_signature(&sector) {
            info!("{}: no partition table signature", disk_name);
            return Ok(None);
        }

        let mbr = Mbr::decode(&sector);
        let (scheme, partitions) = if mbr.is_protective() {
            (PartitionScheme::Gpt, probe_gpt(&device, &disk_name, port)?)
        } else {
            for problem in mbr.check(sectors) {
                warn!("{}: {}", disk_name, problem);
            }
            (PartitionScheme::Mbr, probe_mbr(&device, &mbr, &disk_name, port)?)
        };

        info!(
            "{}: {} sectors, {:?} table with {} partition(s)",
            disk_name,
            sectors,
            scheme,
            partitions.len()
        );

        let disk = DiskInfo {
            name: disk_name,
            port,
            sectors,
            scheme,
            partitions,
            device,
        };
        match slot {
            Some(i) => {
                self.disks[i] = disk;
                Ok(self.disks.get(i))
            }
            None => {
                self.disks.push(disk);
                Ok(self.disks.last())
            }
        }
    }

    /// The disk/partition tree printed by `lsblk`
    pub fn render_lsblk(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<12}{:<9}TYPE", "NAME", "SIZE");
        for disk in &self.disks {
            let _ = writeln!(out, "{:<12}{:<9}disk", disk.name, format_size(disk.sectors));
            let count = disk.partitions.len();
            for (i, part) in disk.partitions.iter().enumerate() {
                let branch = if i + 1 == count { "└─" } else { "├─" };
                let _ = writeln!(
                    out,
                    "{}{:<10}{:<9}part",
                    branch,
                    part.name,
                    format_size(part.sector_count)
                );
            }
        }
        out
    }
}

fn classify(device: &SharedDevice, start_lba: u64) -> FsResult<FatType> {
    let mut boot = [0u8; SECTOR_SIZE];
    device.read_sector(start_lba, &mut boot)?;
    Ok(detect_fat_type(&boot))
}

fn probe_mbr(
    device: &SharedDevice,
    mbr: &Mbr,
    disk_name: &str,
    port: usize,
) -> FsResult<Vec<PartitionDescriptor>> {
    let mut partitions = Vec::new();
    for (index, slot) in mbr.used_slots() {
        let start_lba = slot.lba_start as u64;
        let sector_count = slot.num_sectors as u64;
        let fs_type = classify(device, start_lba)?;
        debug!(
            "{}: MBR slot {} type=0x{:02X} start={} sectors={} bootable={} fs={}",
            disk_name,
            index,
            slot.partition_type,
            start_lba,
            sector_count,
            slot.is_bootable(),
            fs_type
        );
        partitions.push(PartitionDescriptor {
            name: format!("{}p{}", disk_name, index),
            device_port: port,
            index,
            start_lba,
            end_lba: (start_lba + sector_count).saturating_sub(1),
            sector_count,
            bootable: slot.is_bootable(),
            fs_type,
            type_name: partition_type_name(slot.partition_type).to_string(),
            partition_name: String::new(),
            mbr_type: Some(slot.partition_type),
            type_guid: None,
        });
    }
    Ok(partitions)
}

fn probe_gpt(device: &SharedDevice, disk_name: &str, port: usize) -> FsResult<Vec<PartitionDescriptor>> {
    let mut sector = [0u8; SECTOR_SIZE];
    device.read_sector(1, &mut sector)?;
    if !has_gpt_signature(&sector) {
        return Err(FsError::Corrupt(format!(
            "{}: protective MBR without a GPT header",
            disk_name
        )));
    }

    let header = GptHeader::decode(&sector);
    header.validate()?;

    let total_sectors = device.total_sectors()?;
    let entry_sectors = header.entry_sectors();
    let entries_end = header.entries_lba.checked_add(entry_sectors);
    if header.entries_lba < 2 || entries_end.map_or(true, |end| end > total_sectors) {
        return Err(FsError::Corrupt(format!(
            "{}: GPT entry array at LBA {} ({} sectors) is outside the disk",
            disk_name, header.entries_lba, entry_sectors
        )));
    }
    let mut entries = vec![0u8; entry_sectors as usize * SECTOR_SIZE];
    device.read_sectors(header.entries_lba, entry_sectors as u32, &mut entries)?;

    let entry_size = header.entry_size as usize;
    let mut partitions = Vec::new();
    for i in 0..header.num_entries as usize {
        let entry = GptEntry::decode(&entries[i * entry_size..(i + 1) * entry_size]);
        if !entry.is_used() {
            continue;
        }
        let index = i + 1;
        let sector_count = match entry.sector_count() {
            Some(count) if entry.last_lba < total_sectors => count,
            _ => {
                return Err(FsError::Corrupt(format!(
                    "{}: GPT entry {} spans LBA {}..={} on a {}-sector disk",
                    disk_name, index, entry.first_lba, entry.last_lba, total_sectors
                )))
            }
        };
        let fs_type = classify(device, entry.first_lba)?;
        debug!(
            "{}: GPT entry {} type={} start={} end={} name={:?} fs={}",
            disk_name, index, entry.type_guid, entry.first_lba, entry.last_lba, entry.name, fs_type
        );
        partitions.push(PartitionDescriptor {
            name: format!("{}p{}", disk_name, index),
            device_port: port,
            index,
            start_lba: entry.first_lba,
            end_lba: entry.last_lba,
            sector_count,
            bootable: entry.is_esp(),
            fs_type,
            type_name: gpt_type_name(&entry.type_guid).to_string(),
            partition_name: entry.name.clone(),
            mbr_type: None,
            type_guid: Some(entry.type_guid),
        });
    }
    Ok(partitions)
}
