// Block device layer
// Sector-granular access to disks and disk images

use crate::{FsError, FsResult};
use log::debug;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// All filesystem code addresses devices in 512-byte sectors
pub const SECTOR_SIZE: usize = 512;

/// A disk that can be read and written one sector run at a time
pub trait BlockDevice: Send {
    /// Total number of addressable sectors
    fn total_sectors(&self) -> u64;

    /// Read `count` sectors starting at `lba` into the front of `buf`
    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> FsResult<()>;

    /// Write `count` sectors starting at `lba` from the front of `buf`
    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> FsResult<()>;

    /// Push buffered writes to the backing store
    fn flush(&mut self) -> FsResult<()> {
        Ok(())
    }
}

fn check_request(total: u64, lba: u64, count: u32, buf_len: usize) -> FsResult<usize> {
    let bytes = count as usize * SECTOR_SIZE;
    if buf_len < bytes {
        return Err(FsError::InvalidArgument(format!(
            "buffer of {} bytes cannot hold {} sectors",
            buf_len, count
        )));
    }
    if lba.checked_add(count as u64).map_or(true, |end| end > total) {
        return Err(FsError::IoError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("sectors {}..{} beyond end of device ({} sectors)", lba, lba + count as u64, total),
        )));
    }
    Ok(bytes)
}

/// Sparse in-memory disk. Sectors never written (or written as zeros) read back as zeros.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    total_sectors: u64,
    sectors: BTreeMap<u64, Box<[u8; SECTOR_SIZE]>>,
}

impl MemoryDevice {
    pub fn new(total_sectors: u64) -> Self {
        Self {
            total_sectors,
            sectors: BTreeMap::new(),
        }
    }

    /// Build a device from a raw image. The length is rounded up to whole sectors.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let total = bytes.len().div_ceil(SECTOR_SIZE) as u64;
        let mut device = Self::new(total);
        for (lba, chunk) in bytes.chunks(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            sector[..chunk.len()].copy_from_slice(chunk);
            device.store(lba as u64, &sector);
        }
        device
    }

    /// Number of sectors currently holding non-zero data
    pub fn allocated_sectors(&self) -> usize {
        self.sectors.len()
    }

    fn store(&mut self, lba: u64, data: &[u8]) {
        if data.iter().all(|&b| b == 0) {
            self.sectors.remove(&lba);
        } else {
            let mut sector = Box::new([0u8; SECTOR_SIZE]);
            sector.copy_from_slice(&data[..SECTOR_SIZE]);
            self.sectors.insert(lba, sector);
        }
    }
}

impl BlockDevice for MemoryDevice {
    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> FsResult<()> {
        let bytes = check_request(self.total_sectors, lba, count, buf.len())?;
        for (i, out) in buf[..bytes].chunks_mut(SECTOR_SIZE).enumerate() {
            match self.sectors.get(&(lba + i as u64)) {
                Some(sector) => out.copy_from_slice(&sector[..]),
                None => out.fill(0),
            }
        }
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> FsResult<()> {
        let bytes = check_request(self.total_sectors, lba, count, buf.len())?;
        for (i, data) in buf[..bytes].chunks(SECTOR_SIZE).enumerate() {
            self.store(lba + i as u64, data);
        }
        Ok(())
    }
}

/// Disk image backed by a regular file
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: File,
    total_sectors: u64,
}

impl FileDevice {
    /// Open an existing image for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let total_sectors = file.metadata()?.len() / SECTOR_SIZE as u64;
        debug!("Opened image {} ({} sectors)", path.display(), total_sectors);
        Ok(Self {
            path,
            file,
            total_sectors,
        })
    }

    /// Create (or replace) an image of `total_sectors` zeroed sectors
    pub fn create<P: AsRef<Path>>(path: P, total_sectors: u64) -> FsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(total_sectors * SECTOR_SIZE as u64)?;
        debug!("Created image {} ({} sectors)", path.display(), total_sectors);
        Ok(Self {
            path,
            file,
            total_sectors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileDevice {
    fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> FsResult<()> {
        let bytes = check_request(self.total_sectors, lba, count, buf.len())?;
        self.file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))?;
        self.file.read_exact(&mut buf[..bytes])?;
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> FsResult<()> {
        let bytes = check_request(self.total_sectors, lba, count, buf.len())?;
        self.file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))?;
        self.file.write_all(&buf[..bytes])?;
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// Cloneable handle to a block device, shared by every partition mounted from it
#[derive(Clone)]
pub struct SharedDevice {
    inner: Arc<Mutex<Box<dyn BlockDevice>>>,
}

impl std::fmt::Debug for SharedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDevice")
            .field("total_sectors", &self.total_sectors().ok())
            .finish()
    }
}

impl SharedDevice {
    pub fn new<D: BlockDevice + 'static>(device: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(device))),
        }
    }

    fn lock(&self) -> FsResult<MutexGuard<'_, Box<dyn BlockDevice>>> {
        self.inner.lock().map_err(|_| {
            FsError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "block device lock poisoned",
            ))
        })
    }

    pub fn total_sectors(&self) -> FsResult<u64> {
        Ok(self.lock()?.total_sectors())
    }

    pub fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> FsResult<()> {
        self.lock()?.read_sectors(lba, count, buf)
    }

    pub fn write_sectors(&self, lba: u64, count: u32, buf: &[u8]) -> FsResult<()> {
        self.lock()?.write_sectors(lba, count, buf)
    }

    pub fn read_sector(&self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> FsResult<()> {
        self.read_sectors(lba, 1, buf)
    }

    pub fn write_sector(&self, lba: u64, buf: &[u8; SECTOR_SIZE]) -> FsResult<()> {
        self.write_sectors(lba, 1, buf)
    }

    /// Zero a run of sectors
    pub fn zero_sectors(&self, lba: u64, count: u64) -> FsResult<()> {
        const CHUNK: u64 = 64;
        let zeros = [0u8; SECTOR_SIZE * CHUNK as usize];
        let mut done = 0;
        while done < count {
            let n = (count - done).min(CHUNK) as u32;
            self.write_sectors(lba + done, n, &zeros)?;
            done += n as u64;
        }
        Ok(())
    }

    pub fn flush(&self) -> FsResult<()> {
        self.lock()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_device_reads_zero_until_written() {
        let mut dev = MemoryDevice::new(16);
        let mut buf = [0xAAu8; SECTOR_SIZE * 2];
        dev.read_sectors(3, 2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        let mut data = [0u8; SECTOR_SIZE];
        data[0] = 0x55;
        data[511] = 0xAA;
        dev.write_sectors(3, 1, &data).unwrap();
        dev.read_sectors(3, 1, &mut buf).unwrap();
        assert_eq!(buf[0], 0x55);
        assert_eq!(buf[511], 0xAA);
        assert_eq!(dev.allocated_sectors(), 1);
    }

    #[test]
    fn test_memory_device_zero_write_releases_sector() {
        let mut dev = MemoryDevice::new(4);
        dev.write_sectors(1, 1, &[1u8; SECTOR_SIZE]).unwrap();
        assert_eq!(dev.allocated_sectors(), 1);
        dev.write_sectors(1, 1, &[0u8; SECTOR_SIZE]).unwrap();
        assert_eq!(dev.allocated_sectors(), 0);
    }

    #[test]
    fn test_memory_device_from_partial_image() {
        let mut image = vec![0u8; SECTOR_SIZE + 10];
        image[SECTOR_SIZE + 9] = 0x7E;
        let mut dev = MemoryDevice::from_bytes(&image);
        assert_eq!(dev.total_sectors(), 2);

        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sectors(1, 1, &mut buf).unwrap();
        assert_eq!(buf[9], 0x7E);
        assert_eq!(dev.allocated_sectors(), 1);
    }

    #[test]
    fn test_out_of_range_access_fails() {
        let mut dev = MemoryDevice::new(4);
        let mut buf = [0u8; SECTOR_SIZE * 2];
        let err = dev.read_sectors(3, 2, &mut buf).unwrap_err();
        assert!(matches!(err, FsError::IoError(_)));

        let err = dev.read_sectors(0, 2, &mut buf[..100]).unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[test]
    fn test_file_device_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        {
            let mut dev = FileDevice::create(temp.path(), 8).unwrap();
            let mut sector = [0u8; SECTOR_SIZE];
            sector[..5].copy_from_slice(b"hello");
            dev.write_sectors(7, 1, &sector).unwrap();
            dev.flush().unwrap();
        }

        let mut dev = FileDevice::open(temp.path()).unwrap();
        assert_eq!(dev.total_sectors(), 8);
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sectors(7, 1, &mut buf).unwrap();
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn test_shared_device_clones_see_same_data() {
        let shared = SharedDevice::new(MemoryDevice::new(32));
        let other = shared.clone();
        let mut sector = [0u8; SECTOR_SIZE];
        sector[10] = 42;
        shared.write_sector(5, &sector).unwrap();

        let mut buf = [0u8; SECTOR_SIZE];
        other.read_sector(5, &mut buf).unwrap();
        assert_eq!(buf[10], 42);

        other.zero_sectors(0, 32).unwrap();
        shared.read_sector(5, &mut buf).unwrap();
        assert_eq!(buf[10], 0);
    }
}
