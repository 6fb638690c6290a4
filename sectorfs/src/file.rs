use crate::alloc::FreeMap;
use crate::fs::{FsError, Result, SectorId, SECTOR_SIZE};
use crate::io::SectorStorage;
use crate::node::FileHeader;

use log::{debug, trace};

/// A file opened for reading and writing: the sector holding its header, the
/// header itself and a seek position for sequential access.
///
/// The header is written back whenever a write grows the file, so the on-disk copy
/// never describes fewer sectors than the free map has given the file.
#[derive(Debug)]
pub struct OpenFile {
    header_sector: SectorId,
    header: FileHeader,
    position: usize,
}

impl OpenFile {
    /// Creates a file of `size` bytes. One sector is taken for the header, the rest
    /// for data. On failure every claimed sector goes back to `freemap`.
    pub fn create<D: SectorStorage + ?Sized>(
        disk: &mut D,
        freemap: &mut FreeMap,
        size: usize,
    ) -> Result<Self> {
        let header_sector = freemap.find_and_mark().ok_or(FsError::InsufficientSpace {
            needed: 1,
            available: 0,
        })?;

        let mut header = FileHeader::new();
        let persisted = header
            .allocate(freemap, disk, size)
            .and_then(|_| header.write_back(disk, header_sector));
        if let Err(err) = persisted {
            if header.sector_count() > 0 {
                header.deallocate(freemap, disk)?;
            }
            freemap.mark_free(header_sector)?;
            return Err(err);
        }

        debug!("created file at sector {} ({} bytes)", header_sector, size);
        Ok(Self {
            header_sector,
            header,
            position: 0,
        })
    }

    /// Opens the file whose header is stored in `header_sector`.
    pub fn open<D: SectorStorage + ?Sized>(disk: &mut D, header_sector: SectorId) -> Result<Self> {
        let mut header = FileHeader::new();
        header.fetch_from(disk, header_sector)?;
        Ok(Self {
            header_sector,
            header,
            position: 0,
        })
    }

    pub fn header_sector(&self) -> SectorId {
        self.header_sector
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn length(&self) -> usize {
        self.header.file_length()
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Reads into `buf` starting at `offset`, stopping at the end of the file.
    /// Returns the number of bytes read, zero at or past the end.
    pub fn read_at<D: SectorStorage + ?Sized>(
        &self,
        disk: &mut D,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize> {
        if offset >= self.length() {
            return Ok(0);
        }
        let end = offset.saturating_add(buf.len()).min(self.length());

        let mut sector_buf = [0; SECTOR_SIZE];
        let mut start = offset;
        let mut read = 0;
        while start < end {
            let in_sector = start % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(end - start);
            let sector = self.header.byte_to_sector(disk, start)?;
            disk.read_sector(sector, &mut sector_buf)?;
            buf[read..read + chunk].copy_from_slice(&sector_buf[in_sector..in_sector + chunk]);
            read += chunk;
            start += chunk;
        }
        trace!("read {} bytes at offset {}", read, offset);
        Ok(read)
    }

    /// Writes `buf` at `offset`, growing the file first when the write runs past its
    /// end. Writes may start at most at the current end of the file.
    pub fn write_at<D: SectorStorage + ?Sized>(
        &mut self,
        disk: &mut D,
        freemap: &mut FreeMap,
        buf: &[u8],
        offset: usize,
    ) -> Result<usize> {
        if offset > self.length() {
            return Err(FsError::OutOfRange {
                offset,
                length: self.length(),
            });
        }
        let end = offset.saturating_add(buf.len());
        if end > self.length() {
            self.header.set_length(freemap, disk, end)?;
            self.header.write_back(disk, self.header_sector)?;
        }

        let mut sector_buf = [0; SECTOR_SIZE];
        let mut start = offset;
        let mut written = 0;
        while start < end {
            let in_sector = start % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(end - start);
            let sector = self.header.byte_to_sector(disk, start)?;
            // Partial sectors keep whatever else they hold.
            if chunk < SECTOR_SIZE {
                disk.read_sector(sector, &mut sector_buf)?;
            }
            sector_buf[in_sector..in_sector + chunk].copy_from_slice(&buf[written..written + chunk]);
            disk.write_sector(sector, &sector_buf)?;
            written += chunk;
            start += chunk;
        }
        trace!("wrote {} bytes at offset {}", written, offset);
        Ok(written)
    }

    /// Reads from the seek position and advances it.
    pub fn read<D: SectorStorage + ?Sized>(&mut self, disk: &mut D, buf: &mut [u8]) -> Result<usize> {
        let read = self.read_at(disk, buf, self.position)?;
        self.position += read;
        Ok(read)
    }

    /// Writes at the seek position and advances it.
    pub fn write<D: SectorStorage + ?Sized>(
        &mut self,
        disk: &mut D,
        freemap: &mut FreeMap,
        buf: &[u8],
    ) -> Result<usize> {
        let written = self.write_at(disk, freemap, buf, self.position)?;
        self.position += written;
        Ok(written)
    }

    /// Deletes the file, releasing its data sectors and its header sector.
    pub fn remove<D: SectorStorage + ?Sized>(
        mut self,
        disk: &mut D,
        freemap: &mut FreeMap,
    ) -> Result<()> {
        self.header.deallocate(freemap, disk)?;
        freemap.mark_free(self.header_sector)?;
        debug!("removed file at sector {}", self.header_sector);
        Ok(())
    }
}
