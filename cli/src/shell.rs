// Line-oriented shell over the VFS
// Each command prints its own output; failures print `<command>: <error>`.

use fatvfs_core::{FsError, FsResult};
use fatvfs_filesystems::vfs::normalize_path;
use fatvfs_filesystems::{EntryKind, FileHandle, FilesystemManager, OpenOptions, PartitionTable};
use std::io::{self, BufRead, Write};

const HELP: &str = "\
Commands:
  mount <partition> <dir>   mount a partition (see lsblk)
  umount <dir>              flush and detach a mount
  mounts                    list mounts
  ls [path]                 list a directory
  cd [path]                 change directory (default /)
  pwd                       print the working directory
  cat <file>                print a file
  write <file> <text>       replace a file's contents with text and a newline
  append <file> <text>      add text and a newline to the end of a file
  touch <file>              create an empty file if missing
  mkdir <dir>               create a directory and missing parents
  rmdir <dir>               remove an empty directory
  rm [-r] <path>            remove a file (-r: or an empty directory)
  mv <from> <to>            rename within one mount
  truncate <file> <size>    cut or extend a file
  stat <path>               show entry details
  lsblk                     list disks and partitions
  help                      show this text
  exit                      leave the shell";

pub struct Shell {
    vfs: FilesystemManager,
    table: PartitionTable,
    exited: bool,
}

fn usage(text: &str) -> FsError {
    FsError::InvalidArgument(format!("usage: {}", text))
}

impl Shell {
    pub fn new(vfs: FilesystemManager, table: PartitionTable) -> Self {
        Self {
            vfs,
            table,
            exited: false,
        }
    }

    /// Run `;`- or newline-separated commands
    pub fn run_script(&mut self, script: &str) {
        for line in script.split(|c| c == ';' || c == '\n') {
            if self.exited {
                break;
            }
            self.execute(line);
        }
    }

    pub fn run_interactive(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        while !self.exited {
            print!("{}> ", self.vfs.getcwd());
            io::stdout().flush()?;
            match lines.next() {
                Some(line) => self.execute(&line?),
                None => break,
            }
        }
        Ok(())
    }

    /// Flush every mount before the process exits
    pub fn finish(mut self) -> FsResult<()> {
        self.vfs.sync()
    }

    pub fn execute(&mut self, line: &str) {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(command) => command,
            None => return,
        };
        let args: Vec<&str> = words.collect();

        let result = match command {
            "mount" => self.mount(&args),
            "umount" => self.umount(&args),
            "mounts" => {
                for m in self.vfs.mounts() {
                    println!("{} on {} type {}", m.device_name, m.mount_point, m.fs_type);
                }
                Ok(())
            }
            "ls" => self.ls(&args),
            "cd" => self.vfs.cd(args.first().copied().unwrap_or("/")),
            "pwd" => {
                println!("{}", self.vfs.getcwd());
                Ok(())
            }
            "cat" => self.cat(&args),
            "write" => self.write(&args, false),
            "append" => self.write(&args, true),
            "touch" => self.touch(&args),
            "mkdir" => self.one_path(&args, "mkdir <dir>", FilesystemManager::mkdir),
            "rmdir" => self.one_path(&args, "rmdir <dir>", FilesystemManager::rmdir),
            "rm" => self.rm(&args),
            "mv" => match args.as_slice() {
                [from, to] => self.vfs.mv(from, to),
                _ => Err(usage("mv <from> <to>")),
            },
            "truncate" => self.truncate(&args),
            "stat" => self.stat(&args),
            "lsblk" => {
                print!("{}", self.table.render_lsblk());
                Ok(())
            }
            "help" => {
                println!("{}", HELP);
                Ok(())
            }
            "exit" | "quit" => {
                self.exited = true;
                Ok(())
            }
            _ => {
                eprintln!("{}: command not found", command);
                return;
            }
        };

        if let Err(err) = result {
            eprintln!("{}: {}", command, err);
        }
    }

    fn one_path(
        &mut self,
        args: &[&str],
        text: &str,
        op: fn(&mut FilesystemManager, &str) -> FsResult<()>,
    ) -> FsResult<()> {
        match args {
            [path] => op(&mut self.vfs, path),
            _ => Err(usage(text)),
        }
    }

    fn mount(&mut self, args: &[&str]) -> FsResult<()> {
        let (device, point) = match args {
            [device, point] => (*device, *point),
            _ => return Err(usage("mount <partition> <dir>")),
        };
        let point = normalize_path(self.vfs.getcwd(), point);
        self.vfs.mount_partition(&self.table, device, &point)?;
        Ok(())
    }

    fn umount(&mut self, args: &[&str]) -> FsResult<()> {
        match args {
            [point] => self.vfs.umount(point),
            _ => Err(usage("umount <dir>")),
        }
    }

    fn ls(&mut self, args: &[&str]) -> FsResult<()> {
        let path = args.first().copied().unwrap_or("");
        for entry in self.vfs.ls(path)? {
            let size = match entry.kind {
                EntryKind::Directory => "<DIR>".to_string(),
                EntryKind::MountPoint => "<MNT>".to_string(),
                EntryKind::File => entry.size.to_string(),
            };
            let modified = entry
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("{:>10}  {:<16}  {}", size, modified, entry.name);
        }
        Ok(())
    }

    fn cat(&mut self, args: &[&str]) -> FsResult<()> {
        let path = match args {
            [path] => *path,
            _ => return Err(usage("cat <file>")),
        };
        let mut handle = self.vfs.open(path)?;
        let mut contents = Vec::with_capacity(handle.size() as usize);
        let mut buf = [0u8; 4096];
        loop {
            let n = self.vfs.read(&mut handle, &mut buf)?;
            if n == 0 {
                break;
            }
            contents.extend_from_slice(&buf[..n]);
        }
        self.vfs.close(handle)?;

        let mut stdout = io::stdout();
        stdout.write_all(&contents)?;
        if !contents.ends_with(b"\n") && !contents.is_empty() {
            writeln!(stdout)?;
        }
        Ok(())
    }

    fn write(&mut self, args: &[&str], append: bool) -> FsResult<()> {
        let (path, words) = match args.split_first() {
            Some((path, words)) if !words.is_empty() => (*path, words),
            _ if append => return Err(usage("append <file> <text>")),
            _ => return Err(usage("write <file> <text>")),
        };
        let mut data = words.join(" ").into_bytes();
        data.push(b'\n');

        let options = OpenOptions {
            create: true,
            truncate: !append,
        };
        let mut handle = self.vfs.open_with(path, options)?;
        if append {
            let end = handle.size();
            self.vfs.seek(&mut handle, end)?;
        }
        let written = self.write_all(&mut handle, &data);
        let closed = self.vfs.close(handle);
        let written = written?;
        closed?;
        if written < data.len() {
            return Err(FsError::NoSpace(format!(
                "wrote {} of {} bytes",
                written,
                data.len()
            )));
        }
        Ok(())
    }

    fn write_all(&mut self, handle: &mut FileHandle, data: &[u8]) -> FsResult<usize> {
        let mut done = 0;
        while done < data.len() {
            let n = self.vfs.write(handle, &data[done..])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    fn touch(&mut self, args: &[&str]) -> FsResult<()> {
        let path = match args {
            [path] => *path,
            _ => return Err(usage("touch <file>")),
        };
        let options = OpenOptions {
            create: true,
            truncate: false,
        };
        let handle = self.vfs.open_with(path, options)?;
        self.vfs.close(handle)
    }

    fn rm(&mut self, args: &[&str]) -> FsResult<()> {
        match args {
            ["-r", path] => self.vfs.rm_recursive(path),
            [path] => self.vfs.unlink(path),
            _ => Err(usage("rm [-r] <path>")),
        }
    }

    fn truncate(&mut self, args: &[&str]) -> FsResult<()> {
        match args {
            [path, size] => {
                let size = size
                    .parse::<u32>()
                    .map_err(|_| FsError::InvalidArgument(format!("bad size '{}'", size)))?;
                self.vfs.truncate(path, size)
            }
            _ => Err(usage("truncate <file> <size>")),
        }
    }

    fn stat(&mut self, args: &[&str]) -> FsResult<()> {
        let path = match args {
            [path] => *path,
            _ => return Err(usage("stat <path>")),
        };
        let info = self.vfs.stat(path)?;
        println!("  Name: {}", info.name);
        println!("  Type: {}", if info.is_directory { "directory" } else { "file" });
        println!("  Size: {}", info.size);
        println!("  First cluster: {}", info.first_cluster);
        println!("  Attributes: 0x{:02X}", info.attributes);
        if let Some(modified) = info.modified {
            println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        Ok(())
    }
}
