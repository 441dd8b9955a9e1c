// Filesystem families
// Only the FAT family is implemented.

pub mod fat;
