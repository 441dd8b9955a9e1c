// On-disk FAT structures shared by FAT16 and FAT32
// Each structure decodes from and encodes into a little-endian byte slice;
// no driver code touches raw offsets directly.

use super::constants::*;
use super::timestamps::current_fat_datetime;
use byteorder::{ByteOrder, LittleEndian};
use fatvfs_core::{FsError, FsResult, SECTOR_SIZE};

/// True when bytes 510..512 hold 0x55 0xAA
pub fn has_boot_signature(sector: &[u8]) -> bool {
    sector.len() >= SECTOR_SIZE
        && sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] == BOOT_SIGNATURE
}

fn check_sector(sector: &[u8]) -> FsResult<()> {
    if sector.len() < SECTOR_SIZE {
        return Err(FsError::InvalidArgument(format!(
            "boot sector buffer is {} bytes, need {}",
            sector.len(),
            SECTOR_SIZE
        )));
    }
    Ok(())
}

// ============================================================================
// BIOS Parameter Block
// ============================================================================

/// The first 36 bytes of every FAT boot sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommonBpb {
    pub jump_boot: [u8; 3],         // 0x00
    pub oem_name: [u8; 8],          // 0x03
    pub bytes_per_sector: u16,      // 0x0B
    pub sectors_per_cluster: u8,    // 0x0D
    pub reserved_sectors: u16,      // 0x0E
    pub num_fats: u8,               // 0x10
    pub root_entries: u16,          // 0x11, 0 for FAT32
    pub total_sectors_16: u16,      // 0x13
    pub media_descriptor: u8,       // 0x15
    pub sectors_per_fat_16: u16,    // 0x16, 0 for FAT32
    pub sectors_per_track: u16,     // 0x18
    pub num_heads: u16,             // 0x1A
    pub hidden_sectors: u32,        // 0x1C
    pub total_sectors_32: u32,      // 0x20
}

impl CommonBpb {
    pub fn decode(sector: &[u8]) -> FsResult<Self> {
        check_sector(sector)?;
        let mut jump_boot = [0u8; 3];
        jump_boot.copy_from_slice(&sector[BS_JMP_BOOT..BS_JMP_BOOT + 3]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&sector[BS_OEM_NAME..BS_OEM_NAME + 8]);

        Ok(Self {
            jump_boot,
            oem_name,
            bytes_per_sector: LittleEndian::read_u16(&sector[BPB_BYTES_PER_SEC..]),
            sectors_per_cluster: sector[BPB_SEC_PER_CLUS],
            reserved_sectors: LittleEndian::read_u16(&sector[BPB_RSVD_SEC_CNT..]),
            num_fats: sector[BPB_NUM_FATS],
            root_entries: LittleEndian::read_u16(&sector[BPB_ROOT_ENT_CNT..]),
            total_sectors_16: LittleEndian::read_u16(&sector[BPB_TOT_SEC16..]),
            media_descriptor: sector[BPB_MEDIA],
            sectors_per_fat_16: LittleEndian::read_u16(&sector[BPB_FAT_SZ16..]),
            sectors_per_track: LittleEndian::read_u16(&sector[BPB_SEC_PER_TRK..]),
            num_heads: LittleEndian::read_u16(&sector[BPB_NUM_HEADS..]),
            hidden_sectors: LittleEndian::read_u32(&sector[BPB_HIDD_SEC..]),
            total_sectors_32: LittleEndian::read_u32(&sector[BPB_TOT_SEC32..]),
        })
    }

    pub fn encode(&self, sector: &mut [u8]) -> FsResult<()> {
        check_sector(sector)?;
        sector[BS_JMP_BOOT..BS_JMP_BOOT + 3].copy_from_slice(&self.jump_boot);
        sector[BS_OEM_NAME..BS_OEM_NAME + 8].copy_from_slice(&self.oem_name);
        LittleEndian::write_u16(&mut sector[BPB_BYTES_PER_SEC..], self.bytes_per_sector);
        sector[BPB_SEC_PER_CLUS] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut sector[BPB_RSVD_SEC_CNT..], self.reserved_sectors);
        sector[BPB_NUM_FATS] = self.num_fats;
        LittleEndian::write_u16(&mut sector[BPB_ROOT_ENT_CNT..], self.root_entries);
        LittleEndian::write_u16(&mut sector[BPB_TOT_SEC16..], self.total_sectors_16);
        sector[BPB_MEDIA] = self.media_descriptor;
        LittleEndian::write_u16(&mut sector[BPB_FAT_SZ16..], self.sectors_per_fat_16);
        LittleEndian::write_u16(&mut sector[BPB_SEC_PER_TRK..], self.sectors_per_track);
        LittleEndian::write_u16(&mut sector[BPB_NUM_HEADS..], self.num_heads);
        LittleEndian::write_u32(&mut sector[BPB_HIDD_SEC..], self.hidden_sectors);
        LittleEndian::write_u32(&mut sector[BPB_TOT_SEC32..], self.total_sectors_32);
        Ok(())
    }

    /// Total sectors, taken from the 16-bit field when it is non-zero
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Sectors occupied by the fixed root directory region (0 on FAT32)
    pub fn root_dir_sectors(&self) -> u32 {
        if self.bytes_per_sector == 0 {
            return 0;
        }
        let bps = self.bytes_per_sector as u32;
        (self.root_entries as u32 * DIR_ENTRY_SIZE as u32 + bps - 1) / bps
    }
}

/// FAT16 boot sector: common BPB plus the extended boot record at 0x24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fat16Bpb {
    pub common: CommonBpb,
    pub drive_number: u8,          // 0x24
    pub boot_signature: u8,        // 0x26
    pub volume_id: u32,            // 0x27
    pub volume_label: [u8; 11],    // 0x2B
    pub fs_type: [u8; 8],          // 0x36
}

impl Fat16Bpb {
    pub fn decode(sector: &[u8]) -> FsResult<Self> {
        let common = CommonBpb::decode(sector)?;
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&sector[BS16_VOL_LAB..BS16_VOL_LAB + 11]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&sector[BS16_FIL_SYS_TYPE..BS16_FIL_SYS_TYPE + 8]);

        Ok(Self {
            common,
            drive_number: sector[BS16_DRV_NUM],
            boot_signature: sector[BS16_BOOT_SIG],
            volume_id: LittleEndian::read_u32(&sector[BS16_VOL_ID..]),
            volume_label,
            fs_type,
        })
    }

    /// Encode into a full boot sector, including the 0x55AA signature
    pub fn encode(&self, sector: &mut [u8]) -> FsResult<()> {
        self.common.encode(sector)?;
        sector[BS16_DRV_NUM] = self.drive_number;
        sector[BS16_BOOT_SIG] = self.boot_signature;
        LittleEndian::write_u32(&mut sector[BS16_VOL_ID..], self.volume_id);
        sector[BS16_VOL_LAB..BS16_VOL_LAB + 11].copy_from_slice(&self.volume_label);
        sector[BS16_FIL_SYS_TYPE..BS16_FIL_SYS_TYPE + 8].copy_from_slice(&self.fs_type);
        sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
        Ok(())
    }
}

/// FAT32 boot sector: common BPB plus the FAT32 extension at 0x24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fat32Bpb {
    pub common: CommonBpb,
    pub fat_size_32: u32,          // 0x24
    pub ext_flags: u16,            // 0x28
    pub fs_version: u16,           // 0x2A
    pub root_cluster: u32,         // 0x2C
    pub fs_info: u16,              // 0x30
    pub backup_boot_sector: u16,   // 0x32
    pub drive_number: u8,          // 0x40
    pub boot_signature: u8,        // 0x42
    pub volume_id: u32,            // 0x43
    pub volume_label: [u8; 11],    // 0x47
    pub fs_type: [u8; 8],          // 0x52
}

impl Fat32Bpb {
    pub fn decode(sector: &[u8]) -> FsResult<Self> {
        let common = CommonBpb::decode(sector)?;
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&sector[BS32_VOL_LAB..BS32_VOL_LAB + 11]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&sector[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8]);

        Ok(Self {
            common,
            fat_size_32: LittleEndian::read_u32(&sector[BPB_FAT_SZ32..]),
            ext_flags: LittleEndian::read_u16(&sector[BPB_EXT_FLAGS..]),
            fs_version: LittleEndian::read_u16(&sector[BPB_FS_VER..]),
            root_cluster: LittleEndian::read_u32(&sector[BPB_ROOT_CLUS..]),
            fs_info: LittleEndian::read_u16(&sector[BPB_FS_INFO..]),
            backup_boot_sector: LittleEndian::read_u16(&sector[BPB_BK_BOOT_SEC..]),
            drive_number: sector[BS32_DRV_NUM],
            boot_signature: sector[BS32_BOOT_SIG],
            volume_id: LittleEndian::read_u32(&sector[BS32_VOL_ID..]),
            volume_label,
            fs_type,
        })
    }

    /// Encode into a full boot sector, including the 0x55AA signature
    pub fn encode(&self, sector: &mut [u8]) -> FsResult<()> {
        self.common.encode(sector)?;
        LittleEndian::write_u32(&mut sector[BPB_FAT_SZ32..], self.fat_size_32);
        LittleEndian::write_u16(&mut sector[BPB_EXT_FLAGS..], self.ext_flags);
        LittleEndian::write_u16(&mut sector[BPB_FS_VER..], self.fs_version);
        LittleEndian::write_u32(&mut sector[BPB_ROOT_CLUS..], self.root_cluster);
        LittleEndian::write_u16(&mut sector[BPB_FS_INFO..], self.fs_info);
        LittleEndian::write_u16(&mut sector[BPB_BK_BOOT_SEC..], self.backup_boot_sector);
        sector[BS32_DRV_NUM] = self.drive_number;
        sector[BS32_BOOT_SIG] = self.boot_signature;
        LittleEndian::write_u32(&mut sector[BS32_VOL_ID..], self.volume_id);
        sector[BS32_VOL_LAB..BS32_VOL_LAB + 11].copy_from_slice(&self.volume_label);
        sector[BS32_FIL_SYS_TYPE..BS32_FIL_SYS_TYPE + 8].copy_from_slice(&self.fs_type);
        sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
        Ok(())
    }
}

// ============================================================================
// Short (8.3) directory entry
// ============================================================================

/// FAT directory entry attribute bits
pub struct FatAttributes;

impl FatAttributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LFN: u8 = 0x0F;
}

/// What a directory slot currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// First byte 0x00: this slot and every later one are unused
    End,
    /// First byte 0xE5: free for reuse
    Deleted,
    /// Attribute 0x0F: long-name fragment, skipped
    LongName,
    VolumeLabel,
    Entry,
}

/// 32-byte short-name directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortDirEntry {
    pub name: [u8; 11],            // 0x00: 8.3 name, space padded
    pub attributes: u8,            // 0x0B
    pub nt_reserved: u8,           // 0x0C
    pub creation_time_tenth: u8,   // 0x0D
    pub creation_time: u16,        // 0x0E
    pub creation_date: u16,        // 0x10
    pub last_access_date: u16,     // 0x12
    pub first_cluster_high: u16,   // 0x14, FAT32 only
    pub write_time: u16,           // 0x16
    pub write_date: u16,           // 0x18
    pub first_cluster_low: u16,    // 0x1A
    pub file_size: u32,            // 0x1C
}

impl ShortDirEntry {
    /// A fresh entry stamped with the current date and time
    pub fn new(name: [u8; 11], attributes: u8, first_cluster: u32) -> Self {
        let (date, time) = current_fat_datetime();
        let mut entry = Self {
            name,
            attributes,
            creation_time: time,
            creation_date: date,
            last_access_date: date,
            write_time: time,
            write_date: date,
            ..Self::default()
        };
        entry.set_first_cluster(first_cluster);
        entry
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        Self {
            name,
            attributes: raw[11],
            nt_reserved: raw[12],
            creation_time_tenth: raw[13],
            creation_time: LittleEndian::read_u16(&raw[14..]),
            creation_date: LittleEndian::read_u16(&raw[16..]),
            last_access_date: LittleEndian::read_u16(&raw[18..]),
            first_cluster_high: LittleEndian::read_u16(&raw[20..]),
            write_time: LittleEndian::read_u16(&raw[22..]),
            write_date: LittleEndian::read_u16(&raw[24..]),
            first_cluster_low: LittleEndian::read_u16(&raw[26..]),
            file_size: LittleEndian::read_u32(&raw[28..]),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attributes;
        raw[12] = self.nt_reserved;
        raw[13] = self.creation_time_tenth;
        LittleEndian::write_u16(&mut raw[14..], self.creation_time);
        LittleEndian::write_u16(&mut raw[16..], self.creation_date);
        LittleEndian::write_u16(&mut raw[18..], self.last_access_date);
        LittleEndian::write_u16(&mut raw[20..], self.first_cluster_high);
        LittleEndian::write_u16(&mut raw[22..], self.write_time);
        LittleEndian::write_u16(&mut raw[24..], self.write_date);
        LittleEndian::write_u16(&mut raw[26..], self.first_cluster_low);
        LittleEndian::write_u32(&mut raw[28..], self.file_size);
    }

    /// Decode slot `index` of a directory buffer
    pub fn read_slot(buf: &[u8], index: usize) -> Self {
        let off = index * DIR_ENTRY_SIZE;
        Self::decode(&buf[off..off + DIR_ENTRY_SIZE])
    }

    /// Encode into slot `index` of a directory buffer
    pub fn write_slot(&self, buf: &mut [u8], index: usize) {
        let off = index * DIR_ENTRY_SIZE;
        self.encode(&mut buf[off..off + DIR_ENTRY_SIZE]);
    }

    pub fn state(&self) -> SlotState {
        match self.name[0] {
            DIR_ENTRY_END => SlotState::End,
            DIR_ENTRY_DELETED => SlotState::Deleted,
            _ if self.attributes == FatAttributes::LFN => SlotState::LongName,
            _ if self.attributes & FatAttributes::VOLUME_ID != 0 => SlotState::VolumeLabel,
            _ => SlotState::Entry,
        }
    }

    /// Cluster number with the FAT32 high word folded in, top 4 bits dropped
    pub fn first_cluster(&self) -> u32 {
        (((self.first_cluster_high as u32) << 16) | self.first_cluster_low as u32) & FAT32_MASK
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_low = (cluster & 0xFFFF) as u16;
        self.first_cluster_high = ((cluster >> 16) & 0xFFFF) as u16;
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & FatAttributes::DIRECTORY != 0
    }

    /// "." or ".." entry
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn mark_deleted(&mut self) {
        self.name[0] = DIR_ENTRY_DELETED;
    }

    /// Refresh the write (and access) stamp
    pub fn touch(&mut self) {
        let (date, time) = current_fat_datetime();
        self.write_date = date;
        self.write_time = time;
        self.last_access_date = date;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fat16_sector() -> [u8; 512] {
        let mut sector = [0u8; 512];
        let bpb = Fat16Bpb {
            common: CommonBpb {
                jump_boot: [0xEB, 0x3C, 0x90],
                oem_name: *b"FATVFS  ",
                bytes_per_sector: 512,
                sectors_per_cluster: 4,
                reserved_sectors: 1,
                num_fats: 2,
                root_entries: 512,
                total_sectors_16: 0,
                media_descriptor: MEDIA_FIXED,
                sectors_per_fat_16: 64,
                sectors_per_track: 63,
                num_heads: 255,
                hidden_sectors: 2048,
                total_sectors_32: 65536,
            },
            drive_number: 0x80,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id: 0xDEADBEEF,
            volume_label: *b"NO NAME    ",
            fs_type: *b"FAT16   ",
        };
        bpb.encode(&mut sector).unwrap();
        sector
    }

    #[test]
    fn test_fat16_bpb_field_offsets() {
        let sector = sample_fat16_sector();
        assert_eq!(&sector[0x0B..0x0D], &512u16.to_le_bytes());
        assert_eq!(sector[0x0D], 4);
        assert_eq!(&sector[0x11..0x13], &512u16.to_le_bytes());
        assert_eq!(&sector[0x16..0x18], &64u16.to_le_bytes());
        assert_eq!(&sector[0x20..0x24], &65536u32.to_le_bytes());
        assert_eq!(&sector[0x36..0x3E], b"FAT16   ");
        assert!(has_boot_signature(&sector));

        let decoded = Fat16Bpb::decode(&sector).unwrap();
        assert_eq!(decoded.common.total_sectors(), 65536);
        assert_eq!(decoded.common.root_dir_sectors(), 32);
        assert_eq!(decoded.volume_id, 0xDEADBEEF);
    }

    #[test]
    fn test_fat32_bpb_field_offsets() {
        let mut sector = [0u8; 512];
        let mut bpb = Fat32Bpb::default();
        bpb.common.bytes_per_sector = 512;
        bpb.common.sectors_per_cluster = 8;
        bpb.common.reserved_sectors = 32;
        bpb.common.num_fats = 2;
        bpb.fat_size_32 = 1234;
        bpb.root_cluster = 2;
        bpb.fs_type = *b"FAT32   ";
        bpb.encode(&mut sector).unwrap();

        assert_eq!(&sector[0x24..0x28], &1234u32.to_le_bytes());
        assert_eq!(&sector[0x2C..0x30], &2u32.to_le_bytes());
        assert_eq!(&sector[0x52..0x5A], b"FAT32   ");
        assert_eq!(Fat32Bpb::decode(&sector).unwrap(), bpb);
    }

    #[test]
    fn test_short_bpb_buffer_rejected() {
        let err = CommonBpb::decode(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[test]
    fn test_dir_entry_split_cluster() {
        let mut entry = ShortDirEntry::new(*b"README  TXT", FatAttributes::ARCHIVE, 0x0012_3456);
        assert_eq!(entry.first_cluster_high, 0x0012);
        assert_eq!(entry.first_cluster_low, 0x3456);
        assert_eq!(entry.first_cluster(), 0x0012_3456);

        // Reserved top nibble is ignored
        entry.first_cluster_high = 0xF012;
        assert_eq!(entry.first_cluster(), 0x0012_3456);
    }

    #[test]
    fn test_dir_entry_layout() {
        let mut entry = ShortDirEntry::new(*b"HELLO   TXT", FatAttributes::ARCHIVE, 7);
        entry.file_size = 6;
        let mut raw = [0u8; 32];
        entry.encode(&mut raw);

        assert_eq!(&raw[0..11], b"HELLO   TXT");
        assert_eq!(raw[11], 0x20);
        assert_eq!(&raw[26..28], &7u16.to_le_bytes());
        assert_eq!(&raw[28..32], &6u32.to_le_bytes());
        assert_eq!(ShortDirEntry::decode(&raw), entry);
    }

    #[test]
    fn test_slot_states() {
        let mut entry = ShortDirEntry::new(*b"A          ", 0, 0);
        assert_eq!(entry.state(), SlotState::Entry);

        entry.mark_deleted();
        assert_eq!(entry.state(), SlotState::Deleted);

        let lfn = ShortDirEntry { name: *b"Ax\0y\0z\0\0\0\0\0", attributes: FatAttributes::LFN, ..Default::default() };
        assert_eq!(lfn.state(), SlotState::LongName);

        let label = ShortDirEntry { name: *b"MYDISK     ", attributes: FatAttributes::VOLUME_ID, ..Default::default() };
        assert_eq!(label.state(), SlotState::VolumeLabel);

        assert_eq!(ShortDirEntry::default().state(), SlotState::End);
    }
}
