// MBR codec
// Four 16-byte partition slots at 446, disk signature at 440, 0x55AA at 510.

use byteorder::{ByteOrder, LittleEndian};
use fatvfs_core::SECTOR_SIZE;

pub const MBR_DISK_SIGNATURE_OFFSET: usize = 440;
pub const MBR_PARTITION_OFFSET: usize = 446;
pub const MBR_SLOT_SIZE: usize = 16;
pub const MBR_SLOT_COUNT: usize = 4;
pub const MBR_BOOT_FLAG: u8 = 0x80;
pub const PARTITION_TYPE_GPT_PROTECTIVE: u8 = 0xEE;

/// True when bytes 510-511 hold 0x55AA
pub fn has_mbr_signature(sector: &[u8]) -> bool {
    sector.len() >= SECTOR_SIZE && sector[510] == 0x55 && sector[511] == 0xAA
}

/// Human-readable name for an MBR partition type byte
pub fn partition_type_name(partition_type: u8) -> &'static str {
    match partition_type {
        0x00 => "Empty",
        0x01 => "FAT12",
        0x04 => "FAT16 (<32MB)",
        0x05 => "Extended",
        0x06 => "FAT16",
        0x07 => "NTFS/exFAT",
        0x0B => "FAT32 (CHS)",
        0x0C => "FAT32 (LBA)",
        0x0E => "FAT16 (LBA)",
        0x0F => "Extended (LBA)",
        0x82 => "Linux swap",
        0x83 => "Linux",
        0xEE => "GPT Protective",
        0xEF => "EFI System",
        _ => "Unknown",
    }
}

/// One partition slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MbrSlot {
    pub boot_flag: u8,
    pub start_chs: [u8; 3],
    pub partition_type: u8,
    pub end_chs: [u8; 3],
    pub lba_start: u32,
    pub num_sectors: u32,
}

impl MbrSlot {
    pub fn decode(raw: &[u8]) -> Self {
        Self {
            boot_flag: raw[0],
            start_chs: [raw[1], raw[2], raw[3]],
            partition_type: raw[4],
            end_chs: [raw[5], raw[6], raw[7]],
            lba_start: LittleEndian::read_u32(&raw[8..]),
            num_sectors: LittleEndian::read_u32(&raw[12..]),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0] = self.boot_flag;
        raw[1..4].copy_from_slice(&self.start_chs);
        raw[4] = self.partition_type;
        raw[5..8].copy_from_slice(&self.end_chs);
        LittleEndian::write_u32(&mut raw[8..], self.lba_start);
        LittleEndian::write_u32(&mut raw[12..], self.num_sectors);
    }

    /// A zero type byte marks an unused slot
    pub fn is_used(&self) -> bool {
        self.partition_type != 0
    }

    pub fn is_bootable(&self) -> bool {
        self.boot_flag == MBR_BOOT_FLAG
    }

    /// Decoded starting (cylinder, head, sector)
    pub fn start_chs_decoded(&self) -> (u32, u32, u32) {
        decode_chs(self.start_chs)
    }

    fn end_lba(&self) -> u64 {
        self.lba_start as u64 + self.num_sectors as u64
    }
}

fn decode_chs(chs: [u8; 3]) -> (u32, u32, u32) {
    let head = chs[0] as u32;
    let sector = (chs[1] & 0x3F) as u32;
    let cylinder = (((chs[1] & 0xC0) as u32) << 2) | chs[2] as u32;
    (cylinder, head, sector)
}

/// Encode an LBA as CHS with 255 heads and 63 sectors per track.
/// Addresses past cylinder 1023 saturate to FE FF FF.
pub fn lba_to_chs(lba: u64) -> [u8; 3] {
    const HEADS: u64 = 255;
    const SECTORS_PER_TRACK: u64 = 63;

    let cylinder = lba / (HEADS * SECTORS_PER_TRACK);
    if cylinder > 1023 {
        return [0xFE, 0xFF, 0xFF];
    }
    let temp = lba % (HEADS * SECTORS_PER_TRACK);
    let head = temp / SECTORS_PER_TRACK;
    let sector = temp % SECTORS_PER_TRACK + 1;
    [
        head as u8,
        ((sector & 0x3F) | ((cylinder >> 2) & 0xC0)) as u8,
        (cylinder & 0xFF) as u8,
    ]
}

/// Sector 0 of a partitioned disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mbr {
    pub disk_signature: u32,
    pub slots: [MbrSlot; MBR_SLOT_COUNT],
}

impl Mbr {
    pub fn decode(sector: &[u8; SECTOR_SIZE]) -> Self {
        let mut slots = [MbrSlot::default(); MBR_SLOT_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            let offset = MBR_PARTITION_OFFSET + i * MBR_SLOT_SIZE;
            *slot = MbrSlot::decode(&sector[offset..offset + MBR_SLOT_SIZE]);
        }
        Self {
            disk_signature: LittleEndian::read_u32(&sector[MBR_DISK_SIGNATURE_OFFSET..]),
            slots,
        }
    }

    /// Encode into a full sector, boot code area zeroed apart from a jump stub
    pub fn encode(&self, sector: &mut [u8; SECTOR_SIZE]) {
        sector.fill(0);
        sector[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        LittleEndian::write_u32(&mut sector[MBR_DISK_SIGNATURE_OFFSET..], self.disk_signature);
        for (i, slot) in self.slots.iter().enumerate() {
            let offset = MBR_PARTITION_OFFSET + i * MBR_SLOT_SIZE;
            slot.encode(&mut sector[offset..offset + MBR_SLOT_SIZE]);
        }
        sector[510] = 0x55;
        sector[511] = 0xAA;
    }

    /// Slot 0 carries the GPT protective type
    pub fn is_protective(&self) -> bool {
        self.slots[0].partition_type == PARTITION_TYPE_GPT_PROTECTIVE
    }

    /// Used slots with their 1-based slot number
    pub fn used_slots(&self) -> impl Iterator<Item = (usize, &MbrSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_used())
            .map(|(i, slot)| (i + 1, slot))
    }

    /// Problems worth reporting about the table: overlapping slots, slots
    /// running past the disk, boot flags other than 0x00/0x80, and CHS
    /// addresses that disagree with the LBA.
    pub fn check(&self, disk_sectors: u64) -> Vec<String> {
        let mut problems = Vec::new();
        let used: Vec<(usize, &MbrSlot)> = self.used_slots().collect();

        for (i, &(number, slot)) in used.iter().enumerate() {
            if slot.boot_flag != 0 && slot.boot_flag != MBR_BOOT_FLAG {
                problems.push(format!(
                    "partition {} has invalid boot flag 0x{:02X}",
                    number, slot.boot_flag
                ));
            }
            if slot.end_lba() > disk_sectors {
                problems.push(format!(
                    "partition {} ends at LBA {} past the end of the disk ({} sectors)",
                    number,
                    slot.end_lba(),
                    disk_sectors
                ));
            }
            let (cylinder, head, sector) = slot.start_chs_decoded();
            if cylinder < 1023 && sector > 0 {
                let chs_lba = cylinder * 255 * 63 + head * 63 + (sector - 1);
                if chs_lba != slot.lba_start {
                    problems.push(format!(
                        "partition {} CHS gives LBA {} but the slot says {}",
                        number, chs_lba, slot.lba_start
                    ));
                }
            }
            for &(other_number, other) in &used[i + 1..] {
                if (slot.lba_start as u64) < other.end_lba() && (other.lba_start as u64) < slot.end_lba() {
                    problems.push(format!("partitions {} and {} overlap", number, other_number));
                }
            }
        }

        problems
    }
}
