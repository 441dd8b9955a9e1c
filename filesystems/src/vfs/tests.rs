// VFS manager tests
// Whole volumes live in MemoryDevices; nothing touches a partition table here.

use super::*;
use crate::families::fat::fat16::{format_fat16, Fat16Fs};
use crate::families::fat::fat32::{format_fat32, Fat32Fs};
use crate::families::fat::FormatOptions;
use fatvfs_core::{FsError, MemoryDevice, SharedDevice};

fn fat16_volume(label: &str) -> (SharedDevice, Filesystem) {
    let device = SharedDevice::new(MemoryDevice::new(16384));
    let options = FormatOptions {
        label: Some(label.to_string()),
        ..FormatOptions::default()
    };
    format_fat16(&device, 0, 16384, &options).expect("format fat16");
    let fs = Fat16Fs::mount(device.clone(), 0).expect("mount fat16");
    (device, Filesystem::Fat16(fs))
}

fn fat32_volume() -> Filesystem {
    let device = SharedDevice::new(MemoryDevice::new(70_000));
    format_fat32(&device, 0, 70_000, &FormatOptions::default()).expect("format fat32");
    Filesystem::Fat32(Fat32Fs::mount(device, 0).expect("mount fat32"))
}

fn manager() -> FilesystemManager {
    let (_, root) = fat16_volume("ROOT");
    FilesystemManager::new("disk0p1", root)
}

fn write_file(vfs: &mut FilesystemManager, path: &str, data: &[u8]) {
    let mut handle = vfs
        .open_with(path, OpenOptions { create: true, truncate: true })
        .expect("open for write");
    assert_eq!(vfs.write(&mut handle, data).expect("write"), data.len());
    vfs.close(handle).expect("close");
}

fn read_file(vfs: &mut FilesystemManager, path: &str) -> Vec<u8> {
    let mut handle = vfs.open(path).expect("open");
    let mut buf = vec![0u8; handle.size() as usize];
    let n = vfs.read(&mut handle, &mut buf).expect("read");
    buf.truncate(n);
    buf
}

fn names(entries: &[DirEntry]) -> Vec<&str> {
    let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[test]
fn test_round_trip_through_root_mount() {
    let mut vfs = manager();
    vfs.mkdir("/docs").unwrap();
    write_file(&mut vfs, "/docs/readme.txt", b"hello\n");

    assert_eq!(read_file(&mut vfs, "/docs/readme.txt"), b"hello\n");
    assert_eq!(vfs.stat("/docs/readme.txt").unwrap().size, 6);
}

#[test]
fn test_open_missing_without_create() {
    let mut vfs = manager();
    assert!(matches!(vfs.open("/nope.txt"), Err(FsError::NotFound(_))));
    assert!(matches!(vfs.open("/"), Err(FsError::IsADirectory(_))));
}

#[test]
fn test_open_truncate_discards_old_contents() {
    let mut vfs = manager();
    write_file(&mut vfs, "/log.txt", b"a much longer first version");
    write_file(&mut vfs, "/log.txt", b"short");
    assert_eq!(read_file(&mut vfs, "/log.txt"), b"short");

    // Without truncate, writes overwrite from offset 0 and keep the tail
    let mut handle = vfs.open("/log.txt").unwrap();
    vfs.write(&mut handle, b"S").unwrap();
    vfs.close(handle).unwrap();
    assert_eq!(read_file(&mut vfs, "/log.txt"), b"Short");
}

#[test]
fn test_seek_then_append() {
    let mut vfs = manager();
    write_file(&mut vfs, "/a.txt", b"abc");

    let mut handle = vfs.open("/a.txt").unwrap();
    vfs.seek(&mut handle, 3).unwrap();
    vfs.write(&mut handle, b"def").unwrap();
    assert_eq!(handle.position(), 6);
    assert!(vfs.seek(&mut handle, 100).is_err());
    vfs.close(handle).unwrap();

    assert_eq!(read_file(&mut vfs, "/a.txt"), b"abcdef");
}

#[test]
fn test_relative_paths_follow_cwd() {
    let mut vfs = manager();
    vfs.mkdir("/a/b").unwrap();
    vfs.cd("/a/b").unwrap();
    assert_eq!(vfs.getcwd(), "/a/b");
    assert_ne!(vfs.cwd_cluster(), 0);

    write_file(&mut vfs, "note.txt", b"x");
    assert!(vfs.stat("/a/b/note.txt").is_ok());

    vfs.cd("..").unwrap();
    assert_eq!(vfs.getcwd(), "/a");
    assert_eq!(names(&vfs.ls("").unwrap()), vec!["B"]);
}

#[test]
fn test_failed_cd_changes_nothing() {
    let mut vfs = manager();
    vfs.mkdir("/docs").unwrap();
    write_file(&mut vfs, "/file.txt", b"x");
    vfs.cd("/docs").unwrap();
    let cluster = vfs.cwd_cluster();

    assert!(matches!(vfs.cd("/missing"), Err(FsError::NotFound(_))));
    assert!(matches!(vfs.cd("/file.txt"), Err(FsError::NotADirectory(_))));
    assert_eq!(vfs.getcwd(), "/docs");
    assert_eq!(vfs.cwd_cluster(), cluster);
}

#[test]
fn test_mkdir_creates_parents() {
    let mut vfs = manager();
    vfs.mkdir("/x/y/z").unwrap();
    assert!(vfs.stat("/x/y").unwrap().is_directory);
    assert!(vfs.stat("/x/y/z").unwrap().is_directory);

    // Only the last component is a conflict
    assert!(matches!(vfs.mkdir("/x/y/z"), Err(FsError::AlreadyExists(_))));
    vfs.mkdir("/x/y/w").unwrap();

    write_file(&mut vfs, "/f", b"1");
    assert!(matches!(vfs.mkdir("/f/sub"), Err(FsError::NotADirectory(_))));
}

#[test]
fn test_nested_mounts_pick_longest_prefix() {
    let mut vfs = manager();
    vfs.mkdir("/mnt").unwrap();
    let (_, data) = fat16_volume("DATA");
    vfs.mount("/mnt", "disk1p1", fat32_volume()).unwrap();
    vfs.mount("/mnt/data", "disk2p1", data).unwrap();

    write_file(&mut vfs, "/mnt/data/x.txt", b"deep");
    write_file(&mut vfs, "/mnt/y.txt", b"mid");
    write_file(&mut vfs, "/other.txt", b"top");

    // Each file landed on its own volume
    assert_eq!(names(&vfs.ls("/mnt").unwrap()), vec!["Y.TXT", "data"]);
    assert_eq!(names(&vfs.ls("/mnt/data").unwrap()), vec!["X.TXT"]);
    assert_eq!(read_file(&mut vfs, "/mnt/data/x.txt"), b"deep");

    let mounts = vfs.mounts();
    assert_eq!(mounts.len(), 3);
    assert_eq!(mounts[1].fs_type, FsKind::Fat32);
    assert_eq!(mounts[2].device_name, "disk2p1");
}

#[test]
fn test_ls_shows_mount_points_once() {
    let mut vfs = manager();
    vfs.mkdir("/mnt").unwrap();
    write_file(&mut vfs, "/readme", b"r");
    vfs.mount("/mnt", "disk1p1", fat32_volume()).unwrap();

    let entries = vfs.ls("/").unwrap();
    assert_eq!(entries.len(), 2);
    let mnt = entries.iter().find(|e| e.name == "mnt").unwrap();
    assert_eq!(mnt.kind, EntryKind::MountPoint);
    let readme = entries.iter().find(|e| e.name == "README").unwrap();
    assert_eq!(readme.kind, EntryKind::File);
    assert_eq!(readme.size, 1);
    assert!(readme.modified.is_some());
}

#[test]
fn test_mount_rejects_bad_points() {
    let mut vfs = manager();
    assert!(matches!(
        vfs.mount("/", "disk9p1", fat32_volume()),
        Err(FsError::AlreadyExists(_))
    ));
    assert!(matches!(
        vfs.mount("mnt", "disk9p1", fat32_volume()),
        Err(FsError::InvalidArgument(_))
    ));
    assert!(matches!(
        vfs.mount("/mnt/", "disk9p1", fat32_volume()),
        Err(FsError::InvalidArgument(_))
    ));
}

#[test]
fn test_umount_flushes_and_resets_cwd() {
    let mut vfs = manager();
    let (device, data) = fat16_volume("DATA");
    vfs.mount("/mnt", "disk1p1", data).unwrap();
    vfs.mkdir("/mnt/inner").unwrap();
    write_file(&mut vfs, "/mnt/inner/kept.txt", b"persisted");
    vfs.cd("/mnt/inner").unwrap();

    vfs.umount("/mnt").unwrap();
    assert_eq!(vfs.getcwd(), "/");
    assert_eq!(vfs.mounts().len(), 1);
    assert!(matches!(vfs.umount("/mnt"), Err(FsError::NotFound(_))));

    // The data survives on the backing device
    vfs.mount("/again", "disk1p1", Filesystem::Fat16(Fat16Fs::mount(device, 0).unwrap()))
        .unwrap();
    assert_eq!(read_file(&mut vfs, "/again/inner/kept.txt"), b"persisted");
}

#[test]
fn test_root_cannot_be_unmounted() {
    let mut vfs = manager();
    assert!(matches!(vfs.umount("/"), Err(FsError::InvalidArgument(_))));
    assert_eq!(vfs.mounts().len(), 1);
}

#[test]
fn test_handle_outlives_mount() {
    let mut vfs = manager();
    vfs.mount("/mnt", "disk1p1", fat32_volume()).unwrap();
    write_file(&mut vfs, "/mnt/f.txt", b"data");
    let mut handle = vfs.open("/mnt/f.txt").unwrap();
    assert_eq!(handle.mount_id(), 1);
    vfs.umount("/mnt").unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(vfs.read(&mut handle, &mut buf), Err(FsError::NotFound(_))));
    assert!(matches!(vfs.write(&mut handle, b"x"), Err(FsError::NotFound(_))));
    assert!(matches!(vfs.close(handle), Err(FsError::NotFound(_))));
}

#[test]
fn test_mv_stays_on_one_mount() {
    let mut vfs = manager();
    vfs.mount("/mnt", "disk1p1", fat32_volume()).unwrap();
    write_file(&mut vfs, "/a.txt", b"a");

    assert!(matches!(vfs.mv("/a.txt", "/mnt/a.txt"), Err(FsError::InvalidArgument(_))));
    assert!(matches!(vfs.mv("/mnt", "/m2"), Err(FsError::InvalidArgument(_))));

    vfs.mkdir("/dir").unwrap();
    vfs.mv("/a.txt", "/dir/b.txt").unwrap();
    assert!(matches!(vfs.stat("/a.txt"), Err(FsError::NotFound(_))));
    assert_eq!(read_file(&mut vfs, "/dir/b.txt"), b"a");
}

#[test]
fn test_remove_operations() {
    let mut vfs = manager();
    vfs.mkdir("/d").unwrap();
    write_file(&mut vfs, "/d/f", b"1");

    assert!(matches!(vfs.rmdir("/d"), Err(FsError::NotEmpty(_))));
    assert!(matches!(vfs.unlink("/d"), Err(FsError::IsADirectory(_))));
    vfs.unlink("/d/f").unwrap();
    assert!(matches!(vfs.unlink("/d/f"), Err(FsError::NotFound(_))));
    vfs.rmdir("/d").unwrap();

    write_file(&mut vfs, "/g", b"2");
    vfs.rm_recursive("/g").unwrap();
    assert!(vfs.ls("/").unwrap().is_empty());

    assert!(matches!(vfs.rmdir("/"), Err(FsError::InvalidArgument(_))));
}

#[test]
fn test_truncate_by_path() {
    let mut vfs = manager();
    write_file(&mut vfs, "/t", b"0123456789");
    vfs.truncate("/t", 4).unwrap();
    assert_eq!(read_file(&mut vfs, "/t"), b"0123");
    vfs.truncate("/t", 6).unwrap();
    assert_eq!(read_file(&mut vfs, "/t"), b"0123\0\0");
    assert!(matches!(vfs.truncate("/", 0), Err(FsError::IsADirectory(_))));
}

#[test]
fn test_create_refuses_existing() {
    let mut vfs = manager();
    let handle = vfs.create("/new").unwrap();
    assert_eq!(handle.size(), 0);
    assert_eq!(handle.name(), "NEW");
    vfs.close(handle).unwrap();
    assert!(matches!(vfs.create("/new"), Err(FsError::AlreadyExists(_))));
}
