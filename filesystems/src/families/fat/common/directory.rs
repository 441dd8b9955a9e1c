// 8.3 short-name handling and the driver-neutral view of a directory entry

use super::constants::{DIR_ENTRY_DELETED, DIR_ENTRY_KANJI_E5};
use super::structures::ShortDirEntry;
use super::timestamps::fat_datetime_to_naive;
use chrono::NaiveDateTime;
use fatvfs_core::{FsError, FsResult};

/// Normalize a name to the fixed-width 11-byte 8.3 form.
///
/// The base (up to the first `.`) is uppercased and truncated to 8 bytes, the
/// extension to 3; both are space padded. Over-long names are truncated rather
/// than rejected. `.` and `..` map to their literal directory-entry forms.
pub fn format_name(input: &str) -> [u8; 11] {
    let mut out = [b' '; 11];

    if input == "." || input == ".." {
        out[..input.len()].copy_from_slice(input.as_bytes());
        return out;
    }

    let bytes = input.as_bytes();
    let (base, ext) = match bytes.iter().position(|&b| b == b'.') {
        Some(dot) => (&bytes[..dot], &bytes[dot + 1..]),
        None => (bytes, &[][..]),
    };

    for (i, &b) in base.iter().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, &b) in ext.iter().take(3).enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }

    if out[0] == DIR_ENTRY_DELETED {
        out[0] = DIR_ENTRY_KANJI_E5;
    }

    out
}

/// Render an 11-byte short name as `NAME.EXT`
pub fn parse_83_name(name: &[u8; 11]) -> String {
    let mut result = String::new();

    for &byte in &name[0..8] {
        if byte == b' ' || byte == 0x00 {
            break;
        }
        if byte == DIR_ENTRY_KANJI_E5 {
            result.push(DIR_ENTRY_DELETED as char);
        } else {
            result.push(byte as char);
        }
    }

    let ext_start = result.len();
    for &byte in &name[8..11] {
        if byte != b' ' && byte != 0x00 {
            if result.len() == ext_start {
                result.push('.');
            }
            result.push(byte as char);
        }
    }

    result
}

/// Reject names that can never be stored as a short entry
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::NameInvalid(format!("'{}'", name)));
    }
    if name.starts_with('.') {
        return Err(FsError::NameInvalid(format!("'{}' has an empty base name", name)));
    }
    if let Some(c) = name.chars().find(|&c| !is_valid_83_char(c)) {
        return Err(FsError::NameInvalid(format!("'{}' contains '{}'", name, c.escape_default())));
    }
    Ok(())
}

fn is_valid_83_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '.' | ' ' | '!' | '#' | '$' | '%' | '&' | '\'' | '(' | ')' | '-' | '@' | '^' | '_'
                | '`' | '{' | '}' | '~'
        )
}

/// Driver-neutral description of one directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_directory: bool,
    pub size: u32,
    pub first_cluster: u32,
    pub attributes: u8,
    pub modified: Option<NaiveDateTime>,
}

impl EntryInfo {
    pub fn from_entry(entry: &ShortDirEntry) -> Self {
        Self {
            name: parse_83_name(&entry.name),
            is_directory: entry.is_directory(),
            size: entry.file_size,
            first_cluster: entry.first_cluster(),
            attributes: entry.attributes,
            modified: fat_datetime_to_naive(entry.write_date, entry.write_time),
        }
    }

    /// The volume root, which has no entry of its own
    pub fn root(root_cluster: u32) -> Self {
        Self {
            name: String::from("/"),
            is_directory: true,
            size: 0,
            first_cluster: root_cluster,
            attributes: super::structures::FatAttributes::DIRECTORY,
            modified: None,
        }
    }
}

/// Where a directory slot lives: the first sector of the buffer that holds it
/// (one sector on the FAT16 root, one cluster elsewhere) and its index in that buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPos {
    pub lba: u64,
    pub index: usize,
}

/// Result of resolving a volume-relative path
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The volume root, which has no directory entry
    Root,
    Entry {
        entry: ShortDirEntry,
        slot: SlotPos,
        /// Cluster of the containing directory (root encoding is driver specific)
        parent: u32,
    },
}

/// Split a volume-relative path into its non-empty components
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".").collect()
}

/// Split a volume-relative path into (parent path, final component)
pub fn split_parent(path: &str) -> FsResult<(String, &str)> {
    let components = split_path(path);
    match components.split_last() {
        Some((name, parents)) => Ok((parents.join("/"), name)),
        None => Err(FsError::InvalidArgument(format!("'{}' names the volume root", path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("docs/readme.txt").unwrap(), ("docs".to_string(), "readme.txt"));
        assert_eq!(split_parent("/a//b/c/").unwrap(), ("a/b".to_string(), "c"));
        assert_eq!(split_parent("top").unwrap(), (String::new(), "top"));
        assert!(matches!(split_parent(""), Err(FsError::InvalidArgument(_))));
        assert!(matches!(split_parent("/"), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_format_name_examples() {
        assert_eq!(&format_name("hello.txt"), b"HELLO   TXT");
        assert_eq!(&format_name("A"), b"A          ");
        assert_eq!(&format_name("readme.md"), b"README  MD ");
    }

    #[test]
    fn test_format_name_truncates() {
        assert_eq!(&format_name("verylongname.text"), b"VERYLONGTEX");
        assert_eq!(&format_name("archive.tar.gz"), b"ARCHIVE TAR");
    }

    #[test]
    fn test_format_name_dots() {
        assert_eq!(&format_name("."), b".          ");
        assert_eq!(&format_name(".."), b"..         ");
    }

    #[test]
    fn test_format_name_is_case_insensitive() {
        assert_eq!(format_name("Docs"), format_name("DOCS"));
        assert_eq!(format_name("ReadMe.Txt"), format_name("readme.TXT"));
    }

    #[test]
    fn test_parse_83_name() {
        assert_eq!(parse_83_name(b"README  TXT"), "README.TXT");
        assert_eq!(parse_83_name(b"DOCS       "), "DOCS");
        assert_eq!(parse_83_name(b"..         "), "..");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("hello.txt").is_ok());
        assert!(validate_name("my-file_1").is_ok());
        assert!(matches!(validate_name(""), Err(FsError::NameInvalid(_))));
        assert!(matches!(validate_name(".."), Err(FsError::NameInvalid(_))));
        assert!(matches!(validate_name(".hidden"), Err(FsError::NameInvalid(_))));
        assert!(matches!(validate_name("a*b"), Err(FsError::NameInvalid(_))));
        assert!(matches!(validate_name("a/b"), Err(FsError::NameInvalid(_))));
    }
}
