use crate::fs::{Sector, SectorId, SECTOR_SIZE};
use crate::io::SectorStorage;
use std::io::ErrorKind;

/// A disk held entirely in memory. Counts transfers so callers can check how many
/// times an operation actually touched the device.
pub struct MemDisk {
    sectors: Vec<Sector>,
    reads: usize,
    writes: usize,
}

impl MemDisk {
    /// Creates a zeroed disk of `nsectors` sectors.
    pub fn new(nsectors: usize) -> Self {
        Self {
            sectors: vec![[0; SECTOR_SIZE]; nsectors],
            reads: 0,
            writes: 0,
        }
    }

    /// Sector reads performed so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Sector writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn slot(&self, id: SectorId) -> std::io::Result<usize> {
        let idx = id as usize;
        if idx >= self.sectors.len() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("sector {} out of range", id),
            ));
        }
        Ok(idx)
    }
}

impl SectorStorage for MemDisk {
    fn read_sector(&mut self, id: SectorId, buf: &mut Sector) -> std::io::Result<()> {
        let idx = self.slot(id)?;
        self.reads += 1;
        buf.copy_from_slice(&self.sectors[idx]);
        Ok(())
    }

    fn write_sector(&mut self, id: SectorId, buf: &Sector) -> std::io::Result<()> {
        let idx = self.slot(id)?;
        self.writes += 1;
        self.sectors[idx] = *buf;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.sectors.len()
    }
}
