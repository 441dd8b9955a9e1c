// Virtual filesystem layer
// A mount table over FAT volumes with a single `/`-rooted namespace and a
// working directory.

pub mod filesystem;
pub mod manager;
pub mod path;

#[cfg(test)]
mod tests;

pub use filesystem::{FileHandle, Filesystem, FsKind, MountId};
pub use manager::{DirEntry, EntryKind, FilesystemManager, MountEntry, MountInfo, OpenOptions};
pub use path::normalize_path;
