// End-to-end tests: partition table -> discovery -> mount -> VFS operations

use fatvfs_core::{FileDevice, FsError, MemoryDevice, SharedDevice};
use fatvfs_filesystems::partitioner::gpt::EFI_SYSTEM_PARTITION;
use fatvfs_filesystems::{
    build_gpt, build_mbr, format_fat16, format_fat32, write_partition_table, EntryKind, FatType,
    Filesystem, FilesystemManager, FormatOptions, FsKind, OpenOptions, PartitionScheme,
    PartitionSpec, PartitionTable,
};
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One bootable FAT16 partition of 204800 sectors at LBA 2048
fn mbr_fat16_disk(device: &SharedDevice) {
    let disk_sectors = device.total_sectors().unwrap();
    let mut spec = PartitionSpec::for_fat(FatType::Fat16, 2048, 204_800);
    spec.bootable = true;
    write_partition_table(device, &build_mbr(disk_sectors, &[spec]).unwrap()).unwrap();
    format_fat16(device, 2048, 204_800, &FormatOptions::default()).unwrap();
}

/// ESP (FAT32) plus a FAT16 data partition on a GPT disk
fn gpt_two_partition_disk() -> SharedDevice {
    let disk_sectors = 100_000;
    let device = SharedDevice::new(MemoryDevice::new(disk_sectors));
    let mut esp = PartitionSpec::for_fat(FatType::Fat32, 2048, 70_000);
    esp.type_guid = EFI_SYSTEM_PARTITION;
    esp.name = "EFI system partition".to_string();
    let data = PartitionSpec::for_fat(FatType::Fat16, 80_000, 16_384);
    write_partition_table(&device, &build_gpt(disk_sectors, &[esp, data]).unwrap()).unwrap();

    let label = FormatOptions {
        label: Some("ESP".to_string()),
        ..FormatOptions::default()
    };
    format_fat32(&device, 2048, 70_000, &label).unwrap();
    format_fat16(&device, 80_000, 16_384, &FormatOptions::default()).unwrap();
    device
}

fn mount_root(table: &PartitionTable, name: &str) -> FilesystemManager {
    let part = table.find(name).expect("partition");
    let device = table.device_of(part).expect("device");
    let fs = Filesystem::mount(device, part.start_lba, part.fs_type).expect("mount");
    FilesystemManager::new(name, fs)
}

fn write_file(vfs: &mut FilesystemManager, path: &str, data: &[u8]) {
    let mut handle = vfs
        .open_with(path, OpenOptions { create: true, truncate: true })
        .unwrap();
    assert_eq!(vfs.write(&mut handle, data).unwrap(), data.len());
    vfs.close(handle).unwrap();
}

fn read_file(vfs: &mut FilesystemManager, path: &str) -> Vec<u8> {
    let mut handle = vfs.open(path).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = vfs.read(&mut handle, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn test_fat16_image_survives_reopen() {
    init_logging();
    let temp_file = NamedTempFile::new().unwrap();
    temp_file.as_file().set_len(206_848 * 512).unwrap();

    {
        let device = SharedDevice::new(FileDevice::open(temp_file.path()).unwrap());
        mbr_fat16_disk(&device);

        let mut table = PartitionTable::new();
        table.probe(0, device).unwrap();
        let mut vfs = mount_root(&table, "disk0p1");
        vfs.mkdir("/docs").unwrap();
        write_file(&mut vfs, "/docs/readme.txt", b"hello\n");
        vfs.sync().unwrap();
    }

    let device = SharedDevice::new(FileDevice::open(temp_file.path()).unwrap());
    let mut table = PartitionTable::new();
    table.probe(0, device).unwrap();

    let part = table.find("disk0p1").unwrap();
    assert_eq!(part.start_lba, 2048);
    assert_eq!(part.sector_count, 204_800);
    assert!(part.bootable);

    let mut vfs = mount_root(&table, "disk0p1");
    let mut handle = vfs.open("/docs/readme.txt").unwrap();
    assert_eq!(handle.size(), 6);
    let mut buf = [0u8; 6];
    assert_eq!(vfs.read(&mut handle, &mut buf).unwrap(), 6);
    assert_eq!(&buf, b"hello\n");
}

#[test]
fn test_gpt_partitions_mount_side_by_side() {
    init_logging();
    let mut table = PartitionTable::new();
    table.probe(0, gpt_two_partition_disk()).unwrap();

    let disk = &table.disks()[0];
    assert_eq!(disk.scheme, PartitionScheme::Gpt);
    let esp = table.find("disk0p1").unwrap();
    assert!(esp.bootable);
    assert_eq!(esp.partition_name, "EFI system partition");

    let mut vfs = mount_root(&table, "disk0p1");
    vfs.mkdir("/data").unwrap();
    vfs.mount_partition(&table, "disk0p2", "/data").unwrap();

    let mounts = vfs.mounts();
    assert_eq!(mounts[0].fs_type, FsKind::Fat32);
    assert_eq!(mounts[1].fs_type, FsKind::Fat16);
    assert_eq!(mounts[1].mount_point, "/data");

    vfs.mkdir("/EFI/BOOT").unwrap();
    write_file(&mut vfs, "/EFI/BOOT/BOOTX64.EFI", &[0x4D, 0x5A, 0x90, 0x00]);
    write_file(&mut vfs, "/data/notes.txt", b"on the data partition");

    let root = vfs.ls("/").unwrap();
    let data = root.iter().find(|e| e.name == "data").unwrap();
    assert_eq!(data.kind, EntryKind::MountPoint);
    assert!(root.iter().any(|e| e.name == "EFI" && e.kind == EntryKind::Directory));
    assert_eq!(root.len(), 2);

    // The partitions share a device but not their contents
    vfs.umount("/data").unwrap();
    assert!(matches!(vfs.stat("/data/notes.txt"), Err(FsError::NotFound(_))));
    vfs.mount_partition(&table, "disk0p2", "/data").unwrap();
    assert_eq!(read_file(&mut vfs, "/data/notes.txt"), b"on the data partition");
    assert_eq!(read_file(&mut vfs, "/EFI/BOOT/BOOTX64.EFI"), [0x4D, 0x5A, 0x90, 0x00]);
}

#[test]
fn test_mount_partition_errors() {
    let disk_sectors = 206_848;
    let device = SharedDevice::new(MemoryDevice::new(disk_sectors));
    let specs = [
        PartitionSpec::for_fat(FatType::Fat16, 2048, 102_400),
        PartitionSpec::for_fat(FatType::Fat16, 104_448, 102_400),
    ];
    write_partition_table(&device, &build_mbr(disk_sectors, &specs).unwrap()).unwrap();
    format_fat16(&device, 2048, 102_400, &FormatOptions::default()).unwrap();

    let mut table = PartitionTable::new();
    table.probe(0, device).unwrap();
    let mut vfs = mount_root(&table, "disk0p1");

    // The second partition was never formatted
    assert!(matches!(
        vfs.mount_partition(&table, "disk0p2", "/mnt"),
        Err(FsError::NotSupported(_))
    ));
    assert!(matches!(
        vfs.mount_partition(&table, "disk7p1", "/mnt"),
        Err(FsError::NotFound(_))
    ));
    assert_eq!(vfs.mounts().len(), 1);
}

#[test]
fn test_large_file_on_fat32_root() {
    let mut table = PartitionTable::new();
    table.probe(0, gpt_two_partition_disk()).unwrap();
    let mut vfs = mount_root(&table, "disk0p1");

    let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
    write_file(&mut vfs, "/big.bin", &data);
    assert_eq!(vfs.stat("/big.bin").unwrap().size, 20_000);
    assert_eq!(read_file(&mut vfs, "/big.bin"), data);

    vfs.truncate("/big.bin", 1500).unwrap();
    assert_eq!(read_file(&mut vfs, "/big.bin"), &data[..1500]);

    vfs.mkdir("/archive").unwrap();
    vfs.mv("/big.bin", "/archive/big.bin").unwrap();
    assert_eq!(vfs.ls("/archive").unwrap().len(), 1);
    vfs.rm_recursive("/archive/big.bin").unwrap();
    vfs.rm_recursive("/archive").unwrap();
    assert!(vfs.ls("/").unwrap().is_empty());
}

#[test]
fn test_disk_listing_serializes() {
    let device = SharedDevice::new(MemoryDevice::new(206_848));
    mbr_fat16_disk(&device);
    let mut table = PartitionTable::new();
    table.probe(0, device).unwrap();

    let json = serde_json::to_value(table.disks()).unwrap();
    assert_eq!(json[0]["name"], "disk0");
    assert_eq!(json[0]["scheme"], "Mbr");
    assert_eq!(json[0]["partitions"][0]["name"], "disk0p1");
    assert_eq!(json[0]["partitions"][0]["fs_type"], "Fat16");
    assert_eq!(json[0]["partitions"][0]["start_lba"], 2048);
    assert!(json[0].get("device").is_none());
}
