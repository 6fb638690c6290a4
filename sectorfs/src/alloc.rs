use crate::fs::{FsError, Result, SectorId};
use log::warn;
use zerocopy::IntoBytes;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// Tracks which sectors of the disk hold data. One bit per sector, `1` marks the
/// sector as allocated. The bit is the only record of ownership, so a sector handed
/// out by [`FreeMap::find_and_mark`] belongs to exactly one file until it is given
/// back through [`FreeMap::mark_free`].
#[derive(Clone, Debug, PartialEq)]
pub struct FreeMap {
    /// Bit `i % 64` of word `i / 64` stands for sector `i`.
    bitmap: Vec<u64>,
    /// Total number of sectors tracked. Bits past this in the last word are never
    /// handed out.
    nsectors: usize,
}

impl FreeMap {
    /// Creates a map for `nsectors` sectors, all of them free.
    pub fn new(nsectors: usize) -> Self {
        Self {
            bitmap: vec![0; nsectors.div_ceil(64)],
            nsectors,
        }
    }

    /// Restores a map previously produced by [`FreeMap::to_bytes`].
    pub fn from_bytes(nsectors: usize, buf: &[u8]) -> Result<Self> {
        let mut map = Self::new(nsectors);
        let bytes = map.bitmap.as_mut_bytes();
        if buf.len() < bytes.len() {
            return Err(FsError::InvariantViolation(format!(
                "free map for {} sectors needs {} bytes, got {}",
                nsectors,
                bytes.len(),
                buf.len()
            )));
        }
        bytes.copy_from_slice(&buf[..bytes.len()]);
        map.clear_tail();
        Ok(map)
    }

    /// Packs the map into whole 64-bit words for storage.
    pub fn to_bytes(&self) -> &[u8] {
        self.bitmap.as_bytes()
    }

    /// Total number of sectors tracked.
    pub fn len(&self) -> usize {
        self.nsectors
    }

    pub fn is_empty(&self) -> bool {
        self.nsectors == 0
    }

    pub fn get(&self, sector: SectorId) -> State {
        let sector = sector as usize;
        if sector >= self.nsectors {
            // Nothing past the end of the disk can be handed out.
            return State::Used;
        }
        // Grab of the u64 containing the significant bit.
        let outer_offset = self.bitmap[sector / 64];

        let inner_offset = sector % 64;
        let mask = 0b01_u64 << inner_offset;
        match (outer_offset & mask) >> inner_offset {
            0 => State::Free,
            _ => State::Used,
        }
    }

    /// Whether `sector` is currently allocated.
    pub fn is_marked(&self, sector: SectorId) -> bool {
        self.get(sector) == State::Used
    }

    /// Number of sectors still available.
    pub fn count_free(&self) -> usize {
        let used: usize = self.bitmap.iter().map(|w| w.count_ones() as usize).sum();
        self.nsectors - used
    }

    /// Finds the lowest-numbered free sector and marks it allocated in the same step.
    /// Returns `None` once the disk is full.
    pub fn find_and_mark(&mut self) -> Option<SectorId> {
        let (word, bits) = self
            .bitmap
            .iter_mut()
            .enumerate()
            .find(|(_, bits)| **bits != u64::MAX)?;
        let inner_offset = bits.trailing_ones() as usize;
        let sector = word * 64 + inner_offset;
        if sector >= self.nsectors {
            return None;
        }
        *bits |= 0b01_u64 << inner_offset;
        Some(sector as SectorId)
    }

    /// Reserves a specific sector, such as a well-known header location.
    pub fn mark(&mut self, sector: SectorId) -> Result<()> {
        self.check_range(sector)?;
        if self.is_marked(sector) {
            warn!("sector {} is already allocated", sector);
            return Err(FsError::InvariantViolation(format!(
                "sector {} is already allocated",
                sector
            )));
        }
        let sector = sector as usize;
        self.bitmap[sector / 64] |= 0b01_u64 << (sector % 64);
        Ok(())
    }

    /// Returns `sector` to the pool. Freeing a sector that is not allocated means
    /// some file lost track of what it owns, so it is reported rather than ignored.
    pub fn mark_free(&mut self, sector: SectorId) -> Result<()> {
        self.check_range(sector)?;
        if !self.is_marked(sector) {
            warn!("double free of sector {}", sector);
            return Err(FsError::InvariantViolation(format!(
                "sector {} freed while not allocated",
                sector
            )));
        }
        let sector = sector as usize;
        self.bitmap[sector / 64] &= !(0b01_u64 << (sector % 64));
        Ok(())
    }

    fn check_range(&self, sector: SectorId) -> Result<()> {
        if sector as usize >= self.nsectors {
            return Err(FsError::InvariantViolation(format!(
                "sector {} is outside a disk of {} sectors",
                sector, self.nsectors
            )));
        }
        Ok(())
    }

    /// Padding bits of the last word stay zero, `count_free` relies on it.
    fn clear_tail(&mut self) {
        let tail = self.nsectors % 64;
        if let (Some(last), true) = (self.bitmap.last_mut(), tail != 0) {
            *last &= (1_u64 << tail) - 1;
        }
    }
}
