use crate::fs::{Sector, SectorId};

/// Tried to map as closely as possible to a plain synchronous disk: one sector in,
/// one sector out, every call blocking until the transfer is complete.
///
/// Implementations serialize requests themselves; callers never see two transfers
/// to the same sector overlap.
pub trait SectorStorage {
    /// Reads sector `id` into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a sector out of range will return an error.
    fn read_sector(&mut self, id: SectorId, buf: &mut Sector) -> std::io::Result<()>;
    /// Writes provided buffer into sector `id`.
    ///
    /// # Errors
    ///
    /// Attempting to write a sector out of range will return an error.
    fn write_sector(&mut self, id: SectorId, buf: &Sector) -> std::io::Result<()>;
    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
    /// The total number of sectors on the device.
    fn sector_count(&self) -> usize;
}

