// Common FAT filesystem components shared between FAT16 and FAT32

pub mod cluster_calc;
pub mod cluster_chain;
pub mod constants;
pub mod directory;
pub mod fat_table;
pub mod file;
pub mod structures;
pub mod timestamps;
pub mod volume;

pub use cluster_calc::*;
pub use cluster_chain::{ClusterValue, FatTable};
pub use constants::*;
pub use directory::*;
pub use fat_table::*;
pub use file::FatFile;
pub use structures::*;
pub use timestamps::*;
pub use volume::FatVolume;

use std::time::SystemTime;

/// Generate a volume serial number based on current time
pub fn generate_volume_serial() -> u32 {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => (duration.as_secs() as u32).wrapping_add(duration.subsec_nanos()),
        Err(_) => 0x1234_5678,
    }
}

/// Convert a string to FAT volume label format (11 bytes, space-padded)
pub fn format_volume_label(label: Option<&str>) -> [u8; 11] {
    let mut result = *b"NO NAME    ";

    if let Some(label) = label.filter(|l| !l.is_empty()) {
        result = [b' '; 11];
        let label = label.to_ascii_uppercase();
        let bytes = label.as_bytes();
        let len = bytes.len().min(11);
        result[..len].copy_from_slice(&bytes[..len]);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_label() {
        assert_eq!(&format_volume_label(Some("data")), b"DATA       ");
        assert_eq!(&format_volume_label(None), b"NO NAME    ");
        assert_eq!(&format_volume_label(Some("a-very-long-label")), b"A-VERY-LONG");
    }
}
