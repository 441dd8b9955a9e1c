// FAT table access for FAT16 and FAT32
// Handles the differences in entry sizes and special values. Reads go through a
// one-sector cache; writes go straight to every FAT copy and reach the cache only
// once all copies are on the device. A failed write drops the cached sector.

use super::cluster_chain::{ClusterValue, FatTable};
use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use fatvfs_core::{FsError, FsResult, SharedDevice, SECTOR_SIZE};

/// Width of one FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatWidth {
    Fat16,
    Fat32,
}

impl FatWidth {
    pub fn entry_bytes(self) -> u64 {
        match self {
            FatWidth::Fat16 => 2,
            FatWidth::Fat32 => 4,
        }
    }
}

/// Geometry of a mounted volume's FAT and data regions, in absolute sectors
#[derive(Debug, Clone, Copy)]
pub struct FatLayout {
    pub width: FatWidth,
    pub fat_start: u64,
    pub sectors_per_fat: u32,
    pub num_fats: u8,
    pub data_start: u64,
    pub sectors_per_cluster: u32,
    pub total_clusters: u32,
}

/// The allocation table of one mounted volume
#[derive(Debug)]
pub struct FatRegion {
    device: SharedDevice,
    layout: FatLayout,
    cached: Option<(u64, [u8; SECTOR_SIZE])>,
}

impl FatRegion {
    pub fn new(device: SharedDevice, layout: FatLayout) -> Self {
        Self {
            device,
            layout,
            cached: None,
        }
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn layout(&self) -> &FatLayout {
        &self.layout
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.layout.sectors_per_cluster * SECTOR_SIZE as u32
    }

    /// First absolute sector of a data cluster
    pub fn cluster_lba(&self, cluster: u32) -> u64 {
        self.layout.data_start
            + (cluster.saturating_sub(FIRST_DATA_CLUSTER) as u64) * self.layout.sectors_per_cluster as u64
    }

    pub fn read_cluster(&self, cluster: u32, buf: &mut [u8]) -> FsResult<()> {
        self.device
            .read_sectors(self.cluster_lba(cluster), self.layout.sectors_per_cluster, buf)
    }

    /// Locate an entry: (sector index within one FAT copy, byte offset in that sector)
    fn locate(&self, cluster: u32) -> FsResult<(u64, usize)> {
        let byte = cluster as u64 * self.layout.width.entry_bytes();
        let sector = byte / SECTOR_SIZE as u64;
        if sector >= self.layout.sectors_per_fat as u64 {
            return Err(FsError::Corrupt(format!(
                "FAT entry for cluster {} lies beyond the {}-sector FAT",
                cluster, self.layout.sectors_per_fat
            )));
        }
        Ok((sector, (byte % SECTOR_SIZE as u64) as usize))
    }

    fn load(&mut self, sector: u64) -> FsResult<&mut [u8; SECTOR_SIZE]> {
        let hit = matches!(self.cached, Some((cached, _)) if cached == sector);
        if !hit {
            let mut buf = [0u8; SECTOR_SIZE];
            self.device.read_sector(self.layout.fat_start + sector, &mut buf)?;
            self.cached = Some((sector, buf));
        }
        match self.cached.as_mut() {
            Some((_, buf)) => Ok(buf),
            None => Err(FsError::Corrupt("FAT sector cache empty after load".to_string())),
        }
    }
}

impl FatTable for FatRegion {
    fn total_clusters(&self) -> u32 {
        self.layout.total_clusters
    }

    fn read_entry(&mut self, cluster: u32) -> FsResult<u32> {
        let (sector, offset) = self.locate(cluster)?;
        let width = self.layout.width;
        let buf = self.load(sector)?;
        Ok(match width {
            FatWidth::Fat16 => LittleEndian::read_u16(&buf[offset..]) as u32,
            FatWidth::Fat32 => LittleEndian::read_u32(&buf[offset..]) & FAT32_MASK,
        })
    }

    fn write_entry(&mut self, cluster: u32, value: u32) -> FsResult<()> {
        let (sector, offset) = self.locate(cluster)?;
        let width = self.layout.width;
        let mut data = *self.load(sector)?;
        match width {
            FatWidth::Fat16 => LittleEndian::write_u16(&mut data[offset..], value as u16),
            FatWidth::Fat32 => {
                // Preserve the reserved top nibble
                let old = LittleEndian::read_u32(&data[offset..]);
                LittleEndian::write_u32(&mut data[offset..], (old & !FAT32_MASK) | (value & FAT32_MASK));
            }
        }

        for copy in 0..self.layout.num_fats as u64 {
            let lba = self.layout.fat_start + copy * self.layout.sectors_per_fat as u64 + sector;
            if let Err(err) = self.device.write_sector(lba, &data) {
                // Earlier copies may already hold the new value; reread on next access
                self.cached = None;
                return Err(err);
            }
        }
        self.cached = Some((sector, data));
        Ok(())
    }

    fn classify(&self, value: u32) -> ClusterValue {
        match self.layout.width {
            FatWidth::Fat16 => {
                let value = value as u16;
                match value {
                    0 => ClusterValue::Free,
                    v if v >= FAT16_EOC => ClusterValue::EndOfChain,
                    FAT16_BAD => ClusterValue::Bad,
                    v if v >= 0xFFF0 || v == 1 => ClusterValue::Reserved(v as u32),
                    v => ClusterValue::Next(v as u32),
                }
            }
            FatWidth::Fat32 => {
                let value = value & FAT32_MASK;
                match value {
                    0 => ClusterValue::Free,
                    v if v >= FAT32_EOC => ClusterValue::EndOfChain,
                    FAT32_BAD => ClusterValue::Bad,
                    v if v >= 0x0FFFFFF0 || v == 1 => ClusterValue::Reserved(v),
                    v => ClusterValue::Next(v),
                }
            }
        }
    }

    fn end_of_chain(&self) -> u32 {
        match self.layout.width {
            FatWidth::Fat16 => FAT16_EOC_MARK as u32,
            FatWidth::Fat32 => FAT32_EOC_MARK,
        }
    }

    fn zero_cluster(&mut self, cluster: u32) -> FsResult<()> {
        self.device
            .zero_sectors(self.cluster_lba(cluster), self.layout.sectors_per_cluster as u64)
    }
}

/// Zero every FAT copy and write the two reserved FAT16 entries (`F8 FF FF FF`)
pub fn write_fat16_tables(
    device: &SharedDevice,
    fat_start: u64,
    sectors_per_fat: u32,
    num_fats: u8,
    media: u8,
) -> FsResult<()> {
    let mut first = [0u8; SECTOR_SIZE];
    LittleEndian::write_u16(&mut first[0..], 0xFF00 | media as u16);
    LittleEndian::write_u16(&mut first[2..], FAT16_EOC_MARK);
    write_tables(device, fat_start, sectors_per_fat, num_fats, &first)
}

/// Zero every FAT copy and write the reserved FAT32 entries plus the root cluster's EOC
pub fn write_fat32_tables(
    device: &SharedDevice,
    fat_start: u64,
    sectors_per_fat: u32,
    num_fats: u8,
    media: u8,
    root_cluster: u32,
) -> FsResult<()> {
    let mut first = [0u8; SECTOR_SIZE];
    LittleEndian::write_u32(&mut first[0..], 0x0FFFFF00 | media as u32);
    LittleEndian::write_u32(&mut first[4..], FAT32_EOC_MARK);

    let root_offset = root_cluster as usize * 4;
    if root_offset + 4 > SECTOR_SIZE {
        return Err(FsError::InvalidArgument(format!(
            "root cluster {} must fall in the first FAT sector",
            root_cluster
        )));
    }
    LittleEndian::write_u32(&mut first[root_offset..], FAT32_EOC_MARK);
    write_tables(device, fat_start, sectors_per_fat, num_fats, &first)
}

fn write_tables(
    device: &SharedDevice,
    fat_start: u64,
    sectors_per_fat: u32,
    num_fats: u8,
    first_sector: &[u8; SECTOR_SIZE],
) -> FsResult<()> {
    for copy in 0..num_fats as u64 {
        let start = fat_start + copy * sectors_per_fat as u64;
        device.zero_sectors(start, sectors_per_fat as u64)?;
        device.write_sector(start, first_sector)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::fat::common::cluster_chain::{allocate_cluster, append_cluster, read_cluster_chain};
    use fatvfs_core::{BlockDevice, MemoryDevice};

    /// Memory disk whose second FAT copy (sectors 18..26) rejects writes
    struct BrokenMirror(MemoryDevice);

    impl BlockDevice for BrokenMirror {
        fn total_sectors(&self) -> u64 {
            self.0.total_sectors()
        }

        fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> FsResult<()> {
            self.0.read_sectors(lba, count, buf)
        }

        fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> FsResult<()> {
            if (18..26).contains(&lba) {
                return Err(FsError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "mirror is write-protected",
                )));
            }
            self.0.write_sectors(lba, count, buf)
        }
    }

    fn region(width: FatWidth) -> (SharedDevice, FatRegion) {
        let device = SharedDevice::new(MemoryDevice::new(4096));
        let layout = FatLayout {
            width,
            fat_start: 10,
            sectors_per_fat: 8,
            num_fats: 2,
            data_start: 100,
            sectors_per_cluster: 4,
            total_clusters: 500,
        };
        (device.clone(), FatRegion::new(device, layout))
    }

    #[test]
    fn test_fat16_reserved_entries() {
        let (device, _) = region(FatWidth::Fat16);
        write_fat16_tables(&device, 10, 8, 2, MEDIA_FIXED).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(10, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &[0xF8, 0xFF, 0xFF, 0xFF]);
        device.read_sector(18, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &[0xF8, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_fat32_reserved_entries() {
        let (device, _) = region(FatWidth::Fat32);
        write_fat32_tables(&device, 10, 8, 2, MEDIA_FIXED, 2).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(10, &mut buf).unwrap();
        assert_eq!(&buf[0..12], &[0xF8, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_writes_reach_every_copy() {
        let (device, mut fat) = region(FatWidth::Fat16);
        fat.write_entry(300, 0x1234).unwrap();

        // Cluster 300 -> byte 600 -> sector 1, offset 88
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(11, &mut buf).unwrap();
        assert_eq!(LittleEndian::read_u16(&buf[88..]), 0x1234);
        device.read_sector(19, &mut buf).unwrap();
        assert_eq!(LittleEndian::read_u16(&buf[88..]), 0x1234);
        assert_eq!(fat.read_entry(300).unwrap(), 0x1234);
    }

    #[test]
    fn test_failed_mirror_write_keeps_cache_in_step_with_disk() {
        let device = SharedDevice::new(BrokenMirror(MemoryDevice::new(4096)));
        let (_, healthy) = region(FatWidth::Fat16);
        let mut fat = FatRegion::new(device.clone(), *healthy.layout());

        // Cluster 310 shares FAT sector 1 with cluster 300
        assert_eq!(fat.read_entry(310).unwrap(), 0);
        assert!(matches!(fat.write_entry(300, 0x1234), Err(FsError::IoError(_))));

        let mut primary = [0u8; SECTOR_SIZE];
        device.read_sector(11, &mut primary).unwrap();
        let on_disk = LittleEndian::read_u16(&primary[88..]) as u32;
        assert_eq!(fat.read_entry(300).unwrap(), on_disk);
        assert!(fat.cached.is_some());
    }

    #[test]
    fn test_fat32_preserves_reserved_bits() {
        let (device, mut fat) = region(FatWidth::Fat32);
        let mut sector = [0u8; SECTOR_SIZE];
        LittleEndian::write_u32(&mut sector[20..], 0xA000_0000);
        device.write_sector(10, &sector).unwrap();

        fat.write_entry(5, 9).unwrap();
        assert_eq!(fat.read_entry(5).unwrap(), 9);
        device.read_sector(10, &mut sector).unwrap();
        assert_eq!(LittleEndian::read_u32(&sector[20..]), 0xA000_0009);
    }

    #[test]
    fn test_classification() {
        let (_, fat16) = region(FatWidth::Fat16);
        assert_eq!(fat16.classify(0), ClusterValue::Free);
        assert_eq!(fat16.classify(0xFFF8), ClusterValue::EndOfChain);
        assert_eq!(fat16.classify(0xFFFF), ClusterValue::EndOfChain);
        assert_eq!(fat16.classify(0xFFF7), ClusterValue::Bad);
        assert_eq!(fat16.classify(42), ClusterValue::Next(42));

        let (_, fat32) = region(FatWidth::Fat32);
        assert_eq!(fat32.classify(0xFFFF_FFFF), ClusterValue::EndOfChain);
        assert_eq!(fat32.classify(0x0FFF_FFF7), ClusterValue::Bad);
        assert_eq!(fat32.classify(0xF000_0007), ClusterValue::Next(7));
    }

    #[test]
    fn test_allocation_zeroes_cluster_data() {
        let (device, mut fat) = region(FatWidth::Fat16);
        device.write_sector(fat.cluster_lba(2) + 3, &[0xAB; SECTOR_SIZE]).unwrap();

        let first = allocate_cluster(&mut fat).unwrap();
        assert_eq!(first, 2);
        let second = append_cluster(&mut fat, first).unwrap();
        assert_eq!(read_cluster_chain(&mut fat, first).unwrap(), vec![2, second]);

        let mut buf = vec![0u8; fat.bytes_per_cluster() as usize];
        fat.read_cluster(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
