use crate::fs::{Sector, SectorId, SECTOR_SIZE};
use crate::io::SectorStorage;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates a sector-addressed disk in userspace using a file as backing storage.
/// This is only meant to be used for file system development and testing.
pub struct FileSectorEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a sector.
    fd: File,
    /// The total number of sectors available in the file store.
    sector_count: usize,
}

impl FileSectorEmulator {
    /// Opens a disk image at the specified path. This method does not validate the
    /// sectors, it is up for clients to ensure disks are appropriately initialized.
    pub fn open_disk<P: AsRef<Path>>(dest: P, nsectors: usize) -> std::io::Result<Self> {
        // Return error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        Ok(FileSectorEmulator {
            fd: file,
            sector_count: nsectors,
        })
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, id: SectorId) -> std::io::Result<u64> {
        if id as usize >= self.sector_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("sector {} out of range", id),
            ));
        }
        Ok(id as u64 * SECTOR_SIZE as u64)
    }
}

impl SectorStorage for FileSectorEmulator {
    fn read_sector(&mut self, id: SectorId, buf: &mut Sector) -> std::io::Result<()> {
        let pos = self.check_range(id)?;
        trace!("disk read sector {}", id);
        self.fd.seek(SeekFrom::Start(pos))?;
        self.fd.read_exact(buf)
    }

    fn write_sector(&mut self, id: SectorId, buf: &Sector) -> std::io::Result<()> {
        let pos = self.check_range(id)?;
        trace!("disk write sector {}", id);
        self.fd.seek(SeekFrom::Start(pos))?;
        self.fd.write_all(buf)
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.sector_count
    }
}

pub struct FileSectorEmulatorBuilder {
    fd: File,
    sector_count: usize,
    clear_medium: bool,
}

impl From<File> for FileSectorEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileSectorEmulatorBuilder {
            fd,
            // A better default here might be the size of the file rounded down
            // to the nearest sector.
            sector_count: 0,
            clear_medium: true,
        }
    }
}

impl FileSectorEmulatorBuilder {
    /// Sets the number of desired sectors in the emulated disk.
    pub fn with_sector_count(mut self, sectors: usize) -> Self {
        self.sector_count = sectors;
        self
    }

    /// Whether to zero the medium on build. Turn off to reopen a disk image that
    /// already holds a file system.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumed ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transfered to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileSectorEmulator> {
        if self.sector_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "disk must have at least one sector",
            ));
        }
        if self.clear_medium {
            self.zero_medium()?;
        }
        Ok(FileSectorEmulator {
            fd: self.fd,
            sector_count: self.sector_count,
        })
    }

    fn zero_medium(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk", buffering each write to prevent excessive syscalls.
        for _ in 0..self.sector_count {
            bfd.write_all(&[0x00; SECTOR_SIZE])?;
        }
        bfd.flush()
    }
}
