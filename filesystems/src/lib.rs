// FAT storage stack organization
pub mod families;

// MBR/GPT discovery and table builders
pub mod partitioner;

// Mount table and unified namespace
pub mod vfs;

// Re-export drivers and formatters
pub use families::fat::fat16::{format_fat16, Fat16Fs};
pub use families::fat::fat32::{format_fat32, Fat32Fs};
pub use families::fat::{detect_fat_type, FatType, FormatOptions};
pub use families::fat::common::{EntryInfo, FatFile, FatVolume};

// Re-export partition handling
pub use partitioner::{
    build_gpt, build_mbr, build_partition_table, write_partition_table, DiskInfo,
    PartitionDescriptor, PartitionLayout, PartitionScheme, PartitionSpec, PartitionTable,
    FIRST_PARTITION_LBA,
};

// Re-export the VFS surface
pub use vfs::{
    DirEntry, EntryKind, FileHandle, Filesystem, FilesystemManager, FsKind, MountInfo, OpenOptions,
};
