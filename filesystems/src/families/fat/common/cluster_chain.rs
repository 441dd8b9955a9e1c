// FAT Cluster Chain Management
// Chain walking, allocation and release shared by the FAT16 and FAT32 drivers.
// Every walk is bounded by the volume's cluster count, so a corrupted FAT with a
// cycle surfaces as `FatLoop` instead of spinning forever.

use super::constants::{FAT_FREE, FIRST_DATA_CLUSTER};
use fatvfs_core::{FsError, FsResult};
use log::debug;

/// Meaning of a raw FAT entry value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterValue {
    Free,
    Next(u32),
    EndOfChain,
    Bad,
    /// Values 1 and the reserved range below BAD
    Reserved(u32),
}

/// Access to one volume's allocation table
pub trait FatTable {
    /// Number of data clusters. Valid cluster numbers are `2..total_clusters + 2`.
    fn total_clusters(&self) -> u32;

    /// Raw entry for `cluster` (masked to the variant's width)
    fn read_entry(&mut self, cluster: u32) -> FsResult<u32>;

    /// Store `value` for `cluster` in every FAT copy
    fn write_entry(&mut self, cluster: u32, value: u32) -> FsResult<()>;

    fn classify(&self, value: u32) -> ClusterValue;

    /// Value written to terminate a chain
    fn end_of_chain(&self) -> u32;

    /// Fill a data cluster with zeros
    fn zero_cluster(&mut self, cluster: u32) -> FsResult<()>;

    fn is_valid_cluster(&self, cluster: u32) -> bool {
        cluster >= FIRST_DATA_CLUSTER && cluster < self.total_clusters().saturating_add(FIRST_DATA_CLUSTER)
    }
}

fn check_cluster<F: FatTable + ?Sized>(fat: &F, cluster: u32) -> FsResult<()> {
    if fat.is_valid_cluster(cluster) {
        Ok(())
    } else {
        Err(FsError::Corrupt(format!(
            "cluster {} outside data area (2..{})",
            cluster,
            fat.total_clusters() as u64 + 2
        )))
    }
}

/// Follow one link. `None` means `cluster` ends its chain.
pub fn next_cluster<F: FatTable + ?Sized>(fat: &mut F, cluster: u32) -> FsResult<Option<u32>> {
    check_cluster(fat, cluster)?;
    let value = fat.read_entry(cluster)?;
    match fat.classify(value) {
        ClusterValue::Next(next) if fat.is_valid_cluster(next) => Ok(Some(next)),
        ClusterValue::Next(next) => Err(FsError::Corrupt(format!(
            "cluster {} links to out-of-range cluster {}",
            cluster, next
        ))),
        ClusterValue::EndOfChain => Ok(None),
        ClusterValue::Bad => Err(FsError::BadCluster(cluster)),
        ClusterValue::Free => Err(FsError::Corrupt(format!(
            "cluster {} is in a chain but marked free",
            cluster
        ))),
        ClusterValue::Reserved(v) => Err(FsError::Corrupt(format!(
            "cluster {} holds reserved FAT value 0x{:X}",
            cluster, v
        ))),
    }
}

/// Read a complete cluster chain. A start of 0 is the empty chain.
pub fn read_cluster_chain<F: FatTable + ?Sized>(fat: &mut F, start: u32) -> FsResult<Vec<u32>> {
    let mut chain = Vec::new();
    if start == 0 {
        return Ok(chain);
    }

    let limit = fat.total_clusters() as usize;
    let mut current = Some(start);
    while let Some(cluster) = current {
        if chain.len() >= limit {
            return Err(FsError::FatLoop(start));
        }
        chain.push(cluster);
        current = next_cluster(fat, cluster)?;
    }

    Ok(chain)
}

/// The `index`-th cluster (0-based) of the chain, or `None` if the chain is shorter
pub fn nth_cluster<F: FatTable + ?Sized>(fat: &mut F, start: u32, index: u32) -> FsResult<Option<u32>> {
    if start == 0 {
        return Ok(None);
    }
    if index >= fat.total_clusters() {
        return Err(FsError::FatLoop(start));
    }

    let mut cluster = start;
    check_cluster(fat, cluster)?;
    for _ in 0..index {
        match next_cluster(fat, cluster)? {
            Some(next) => cluster = next,
            None => return Ok(None),
        }
    }
    Ok(Some(cluster))
}

/// Last cluster of a non-empty chain
pub fn last_cluster<F: FatTable + ?Sized>(fat: &mut F, start: u32) -> FsResult<u32> {
    let limit = fat.total_clusters();
    let mut cluster = start;
    check_cluster(fat, cluster)?;
    for _ in 0..limit {
        match next_cluster(fat, cluster)? {
            Some(next) => cluster = next,
            None => return Ok(cluster),
        }
    }
    Err(FsError::FatLoop(start))
}

/// First free cluster by linear scan over the whole data area
pub fn find_free_cluster<F: FatTable + ?Sized>(fat: &mut F) -> FsResult<u32> {
    let end = fat.total_clusters().saturating_add(FIRST_DATA_CLUSTER);
    for cluster in FIRST_DATA_CLUSTER..end {
        let value = fat.read_entry(cluster)?;
        if fat.classify(value) == ClusterValue::Free {
            return Ok(cluster);
        }
    }
    Err(FsError::NoSpace("no free cluster".to_string()))
}

/// Claim a free cluster as a one-cluster chain with zeroed contents
pub fn allocate_cluster<F: FatTable + ?Sized>(fat: &mut F) -> FsResult<u32> {
    let cluster = find_free_cluster(fat)?;
    let eoc = fat.end_of_chain();
    fat.write_entry(cluster, eoc)?;
    fat.zero_cluster(cluster)?;
    debug!("Allocated cluster {}", cluster);
    Ok(cluster)
}

/// Allocate a cluster and link it after `last`
pub fn append_cluster<F: FatTable + ?Sized>(fat: &mut F, last: u32) -> FsResult<u32> {
    check_cluster(fat, last)?;
    let cluster = allocate_cluster(fat)?;
    fat.write_entry(last, cluster)?;
    Ok(cluster)
}

/// Grow the chain starting at `start` by `count` clusters; returns the new last cluster
pub fn extend_chain<F: FatTable + ?Sized>(fat: &mut F, start: u32, count: u32) -> FsResult<u32> {
    let mut last = last_cluster(fat, start)?;
    for _ in 0..count {
        last = append_cluster(fat, last)?;
    }
    Ok(last)
}

/// Free a chain, keeping its first `keep` clusters (the kept tail is re-terminated).
/// Returns the number of clusters released. The chain is walked before anything is
/// written, so a cycle leaves the FAT untouched.
pub fn free_chain_from<F: FatTable + ?Sized>(fat: &mut F, start: u32, keep: u32) -> FsResult<u32> {
    if start == 0 {
        return Ok(0);
    }

    let (tail, first) = if keep == 0 {
        (None, Some(start))
    } else {
        let tail = match nth_cluster(fat, start, keep - 1)? {
            Some(tail) => tail,
            None => return Ok(0),
        };
        (Some(tail), next_cluster(fat, tail)?)
    };

    let limit = fat.total_clusters() as usize - keep as usize;
    let mut released = Vec::new();
    let mut current = first;
    while let Some(cluster) = current {
        if released.len() >= limit {
            return Err(FsError::FatLoop(start));
        }
        check_cluster(fat, cluster)?;
        let value = fat.read_entry(cluster)?;
        current = match fat.classify(value) {
            ClusterValue::Next(next) if fat.is_valid_cluster(next) => Some(next),
            // Bad clusters stay marked and end the release
            ClusterValue::Bad => break,
            _ => None,
        };
        released.push(cluster);
    }

    if let Some(tail) = tail {
        let eoc = fat.end_of_chain();
        fat.write_entry(tail, eoc)?;
    }
    for &cluster in &released {
        fat.write_entry(cluster, FAT_FREE)?;
    }

    debug!("Freed {} clusters from chain at {}", released.len(), start);
    Ok(released.len() as u32)
}

/// Free a whole chain
pub fn free_cluster_chain<F: FatTable + ?Sized>(fat: &mut F, start: u32) -> FsResult<u32> {
    free_chain_from(fat, start, 0)
}

/// Count clusters in a chain
pub fn count_clusters<F: FatTable + ?Sized>(fat: &mut F, start: u32) -> FsResult<u32> {
    Ok(read_cluster_chain(fat, start)?.len() as u32)
}

/// Clusters needed to hold `size` bytes
pub fn clusters_for_size(size: u64, cluster_bytes: u32) -> u32 {
    if cluster_bytes == 0 {
        return 0;
    }
    size.div_ceil(cluster_bytes as u64) as u32
}
