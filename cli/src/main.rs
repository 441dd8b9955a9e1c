use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fatvfs_core::{FileDevice, SharedDevice};
use fatvfs_filesystems::{
    build_partition_table, format_fat16, format_fat32, write_partition_table, FatType,
    Filesystem, FilesystemManager, FormatOptions, PartitionScheme, PartitionSpec, PartitionTable,
    FIRST_PARTITION_LBA,
};
use std::path::PathBuf;

mod shell;

/// Sectors kept free at the end of a GPT disk for the backup entries and header
const GPT_BACKUP_SECTORS: u64 = 33;

#[derive(Parser)]
#[command(name = "fatvfs")]
#[command(about = "Partition, format and browse FAT disk images", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemeArg {
    Mbr,
    Gpt,
}

#[derive(Clone, Copy, ValueEnum)]
enum FsArg {
    Fat16,
    Fat32,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a disk image with one formatted partition at LBA 2048
    Mkimage {
        /// Image file to create (overwritten if present)
        image: PathBuf,
        /// Disk size in MiB
        #[arg(long)]
        size_mib: u64,
        /// Partition table type
        #[arg(long, value_enum, default_value = "mbr")]
        scheme: SchemeArg,
        /// Filesystem for the partition
        #[arg(long, value_enum, default_value = "fat16")]
        fs: FsArg,
        /// Volume label
        #[arg(long)]
        label: Option<String>,
    },
    /// List disks and partitions found in images
    Lsblk {
        /// Disk images, registered as disk0, disk1, ...
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Mount a partition at / and run shell commands
    Shell {
        /// Disk images, registered as disk0, disk1, ...
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Partition to mount at /
        #[arg(long, default_value = "disk0p1")]
        root: String,
        /// Commands separated by ';' (reads stdin when absent)
        #[arg(short = 'c', long = "command")]
        command: Option<String>,
    },
}

/// Probe every image in order and collect what was found
fn load_images(images: &[PathBuf]) -> anyhow::Result<PartitionTable> {
    let mut table = PartitionTable::new();
    for (port, path) in images.iter().enumerate() {
        let device = FileDevice::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let found = table
            .probe(port, SharedDevice::new(device))
            .with_context(|| format!("Failed to read partition table of {}", path.display()))?;
        if found.is_none() {
            eprintln!("{}: no partition table", path.display());
        }
    }
    Ok(table)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Mkimage {
            image,
            size_mib,
            scheme,
            fs,
            label,
        } => {
            let disk_sectors = size_mib * 2048;
            let scheme = match scheme {
                SchemeArg::Mbr => PartitionScheme::Mbr,
                SchemeArg::Gpt => PartitionScheme::Gpt,
            };
            let fat_type = match fs {
                FsArg::Fat16 => FatType::Fat16,
                FsArg::Fat32 => FatType::Fat32,
            };
            let reserved_tail = match scheme {
                PartitionScheme::Mbr => 0,
                PartitionScheme::Gpt => GPT_BACKUP_SECTORS,
            };
            let sectors = disk_sectors
                .checked_sub(FIRST_PARTITION_LBA + reserved_tail)
                .filter(|&s| s > 0)
                .ok_or_else(|| anyhow::anyhow!("{} MiB is too small for a partition", size_mib))?;

            let device = SharedDevice::new(
                FileDevice::create(&image, disk_sectors)
                    .with_context(|| format!("Failed to create {}", image.display()))?,
            );

            let mut spec = PartitionSpec::for_fat(fat_type, FIRST_PARTITION_LBA, sectors);
            spec.bootable = true;
            let layout = build_partition_table(scheme, disk_sectors, &[spec])?;
            write_partition_table(&device, &layout)?;

            let options = FormatOptions {
                label,
                ..FormatOptions::default()
            };
            let params = match fat_type {
                FatType::Fat32 => format_fat32(&device, FIRST_PARTITION_LBA, sectors, &options)?,
                _ => format_fat16(&device, FIRST_PARTITION_LBA, sectors, &options)?,
            };

            println!("Created {} ({} MiB, {:?})", image.display(), size_mib, scheme);
            println!(
                "  Partition 1: {} at LBA {}, {} sectors",
                fat_type, FIRST_PARTITION_LBA, sectors
            );
            println!(
                "  {} clusters of {} bytes",
                params.total_clusters,
                params.sectors_per_cluster as u32 * 512
            );
        }
        Commands::Lsblk { images, json } => {
            let table = load_images(&images)?;
            if json {
                println!("{}", serde_json::to_string_pretty(table.disks())?);
            } else {
                print!("{}", table.render_lsblk());
            }
        }
        Commands::Shell {
            images,
            root,
            command,
        } => {
            let table = load_images(&images)?;
            let part = table
                .find(&root)
                .ok_or_else(|| anyhow::anyhow!("Partition not found: {}. Use 'fatvfs lsblk' to list partitions.", root))?;
            let device = table
                .device_of(part)
                .ok_or_else(|| anyhow::anyhow!("Disk for {} is not attached", root))?;
            let fs = Filesystem::mount(device, part.start_lba, part.fs_type)
                .with_context(|| format!("Failed to mount {} at /", root))?;

            let vfs = FilesystemManager::new(&root, fs);
            let mut shell = shell::Shell::new(vfs, table);
            match command {
                Some(script) => shell.run_script(&script),
                None => shell.run_interactive()?,
            }
            shell.finish()?;
        }
    }

    Ok(())
}
