// GPT codec
// Header at LBA 1 (and a backup at the last LBA), followed by an array of
// 128-byte entries. GUIDs are stored in the mixed-endian on-disk form.

use byteorder::{ByteOrder, LittleEndian};
use fatvfs_core::{FsError, FsResult, SECTOR_SIZE};
use uuid::{uuid, Uuid};

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
pub const GPT_HEADER_SIZE: u32 = 92;
pub const GPT_ENTRY_SIZE: u32 = 128;
pub const GPT_MAX_ENTRIES: u32 = 128;
/// UTF-16 code units in an entry name
pub const GPT_NAME_UNITS: usize = 36;

pub const EFI_SYSTEM_PARTITION: Uuid = uuid!("C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
pub const BASIC_DATA_PARTITION: Uuid = uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7");
pub const LINUX_FILESYSTEM: Uuid = uuid!("0FC63DAF-8483-4772-8E79-3D69D8477DE4");

fn read_guid(raw: &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&raw[..16]);
    Uuid::from_bytes_le(bytes)
}

/// True when the sector starts with "EFI PART"
pub fn has_gpt_signature(sector: &[u8]) -> bool {
    sector.len() >= 8 && &sector[..8] == GPT_SIGNATURE
}

/// Known partition type GUIDs
pub fn gpt_type_name(type_guid: &Uuid) -> &'static str {
    match *type_guid {
        EFI_SYSTEM_PARTITION => "EFI System",
        BASIC_DATA_PARTITION => "Basic data",
        LINUX_FILESYSTEM => "Linux filesystem",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Uuid,
    pub entries_lba: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub entries_crc32: u32,
}

impl GptHeader {
    pub fn decode(sector: &[u8]) -> Self {
        Self {
            revision: LittleEndian::read_u32(&sector[8..]),
            header_size: LittleEndian::read_u32(&sector[12..]),
            header_crc32: LittleEndian::read_u32(&sector[16..]),
            current_lba: LittleEndian::read_u64(&sector[24..]),
            backup_lba: LittleEndian::read_u64(&sector[32..]),
            first_usable_lba: LittleEndian::read_u64(&sector[40..]),
            last_usable_lba: LittleEndian::read_u64(&sector[48..]),
            disk_guid: read_guid(&sector[56..]),
            entries_lba: LittleEndian::read_u64(&sector[72..]),
            num_entries: LittleEndian::read_u32(&sector[80..]),
            entry_size: LittleEndian::read_u32(&sector[84..]),
            entries_crc32: LittleEndian::read_u32(&sector[88..]),
        }
    }

    /// Encode into a full sector; bytes past the header are zeroed
    pub fn encode(&self, sector: &mut [u8; SECTOR_SIZE]) {
        sector.fill(0);
        sector[..8].copy_from_slice(GPT_SIGNATURE);
        LittleEndian::write_u32(&mut sector[8..], self.revision);
        LittleEndian::write_u32(&mut sector[12..], self.header_size);
        LittleEndian::write_u32(&mut sector[16..], self.header_crc32);
        LittleEndian::write_u64(&mut sector[24..], self.current_lba);
        LittleEndian::write_u64(&mut sector[32..], self.backup_lba);
        LittleEndian::write_u64(&mut sector[40..], self.first_usable_lba);
        LittleEndian::write_u64(&mut sector[48..], self.last_usable_lba);
        sector[56..72].copy_from_slice(&self.disk_guid.to_bytes_le());
        LittleEndian::write_u64(&mut sector[72..], self.entries_lba);
        LittleEndian::write_u32(&mut sector[80..], self.num_entries);
        LittleEndian::write_u32(&mut sector[84..], self.entry_size);
        LittleEndian::write_u32(&mut sector[88..], self.entries_crc32);
    }

    /// Recompute `header_crc32` over the first `header_size` bytes
    pub fn seal(&mut self) {
        self.header_crc32 = 0;
        let mut sector = [0u8; SECTOR_SIZE];
        self.encode(&mut sector);
        let len = (self.header_size as usize).min(SECTOR_SIZE);
        self.header_crc32 = crc32fast::hash(&sector[..len]);
    }

    /// Reject entry arrays this reader will not walk
    pub fn validate(&self) -> FsResult<()> {
        if self.entry_size < GPT_ENTRY_SIZE
            || self.entry_size > SECTOR_SIZE as u32
            || self.entry_size % GPT_ENTRY_SIZE != 0
        {
            return Err(FsError::Corrupt(format!(
                "GPT entry size {} is not a multiple of {} up to {}",
                self.entry_size, GPT_ENTRY_SIZE, SECTOR_SIZE
            )));
        }
        if self.num_entries > GPT_MAX_ENTRIES {
            return Err(FsError::Corrupt(format!(
                "GPT declares {} entries, at most {} are supported",
                self.num_entries, GPT_MAX_ENTRIES
            )));
        }
        Ok(())
    }

    /// Sectors occupied by the entry array
    pub fn entry_sectors(&self) -> u64 {
        (self.num_entries as u64 * self.entry_size as u64).div_ceil(SECTOR_SIZE as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub first_lba: u64,
    pub last_lba: u64,
    pub attributes: u64,
    pub name: String,
}

impl GptEntry {
    pub fn decode(raw: &[u8]) -> Self {
        let units: Vec<u16> = raw[56..56 + GPT_NAME_UNITS * 2]
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|&unit| unit != 0)
            .collect();

        Self {
            type_guid: read_guid(&raw[0..]),
            unique_guid: read_guid(&raw[16..]),
            first_lba: LittleEndian::read_u64(&raw[32..]),
            last_lba: LittleEndian::read_u64(&raw[40..]),
            attributes: LittleEndian::read_u64(&raw[48..]),
            name: String::from_utf16_lossy(&units),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..GPT_ENTRY_SIZE as usize].fill(0);
        raw[0..16].copy_from_slice(&self.type_guid.to_bytes_le());
        raw[16..32].copy_from_slice(&self.unique_guid.to_bytes_le());
        LittleEndian::write_u64(&mut raw[32..], self.first_lba);
        LittleEndian::write_u64(&mut raw[40..], self.last_lba);
        LittleEndian::write_u64(&mut raw[48..], self.attributes);
        for (i, unit) in self.name.encode_utf16().take(GPT_NAME_UNITS).enumerate() {
            LittleEndian::write_u16(&mut raw[56 + i * 2..], unit);
        }
    }

    /// An all-zero type GUID marks an unused entry
    pub fn is_used(&self) -> bool {
        !self.type_guid.is_nil()
    }

    pub fn is_esp(&self) -> bool {
        self.type_guid == EFI_SYSTEM_PARTITION
    }

    /// `None` when the range is inverted or ends past the last LBA
    pub fn sector_count(&self) -> Option<u64> {
        if self.last_lba < self.first_lba {
            return None;
        }
        (self.last_lba - self.first_lba).checked_add(1)
    }
}
