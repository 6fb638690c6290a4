//! File headers (inodes): the sector map of a single file.
//!
//! A header lives in exactly one sector. Small files keep all of their data sector
//! ids in the header itself; once a file needs `NUM_DIRECT` or more sectors, the
//! last header slot instead names an indirect block holding the remaining ids.
//!
//! ```text
//! | byte_length | sector_count | direct[0] ... direct[NUM_DIRECT - 2] | direct[NUM_DIRECT - 1] |
//!                                 \____ first data sectors ______/      \_ indirect block or -1 _/
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::alloc::FreeMap;
use crate::fs::{
    sectors_for, FsError, Result, Sector, SectorId, MAX_FILE_SECTORS, MAX_FILE_SIZE,
    NUM_DIRECT, NUM_INDIRECT, SECTOR_SIZE,
};
use crate::io::SectorStorage;

use log::{debug, trace, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Header slots that always hold data sector ids.
const DIRECT_SLOTS: usize = NUM_DIRECT - 1;

/// Stored in the last header slot when no indirect block is in use (-1 on disk).
const NO_INDIRECT: SectorId = SectorId::MAX;

type IndirectBlock = [SectorId; NUM_INDIRECT];

/// On-disk image of a header. Only ever produced by [`FileHeader::write_back`] and
/// consumed by [`FileHeader::fetch_from`].
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
struct RawHeader {
    byte_length: u32,
    sector_count: u32,
    direct: [SectorId; NUM_DIRECT],
}

const _: () = assert!(std::mem::size_of::<RawHeader>() <= SECTOR_SIZE);

/// Where a file's data sector ids are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
enum BlockMap {
    /// Every data sector id is in the header.
    Direct([SectorId; DIRECT_SLOTS]),
    /// The header slots are full, the remaining ids live in `indirect_block`.
    Indirect {
        direct: [SectorId; DIRECT_SLOTS],
        indirect_block: SectorId,
    },
}

/// In-memory copy of a file header. Changes are not persisted until
/// [`FileHeader::write_back`] is called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    byte_length: u32,
    sector_count: u32,
    map: BlockMap,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHeader {
    /// A header that owns no sectors yet.
    pub fn new() -> Self {
        Self {
            byte_length: 0,
            sector_count: 0,
            map: BlockMap::Direct([0; DIRECT_SLOTS]),
        }
    }

    /// Length of the file in bytes.
    pub fn file_length(&self) -> usize {
        self.byte_length as usize
    }

    /// Number of data sectors, not counting the indirect block.
    pub fn sector_count(&self) -> usize {
        self.sector_count as usize
    }

    /// Sector holding the indirect block, if the file is large enough to need one.
    pub fn indirect_block(&self) -> Option<SectorId> {
        match self.map {
            BlockMap::Direct(_) => None,
            BlockMap::Indirect { indirect_block, .. } => Some(indirect_block),
        }
    }

    /// Initializes a fresh header for a newly created file of `size` bytes, taking
    /// the data sectors out of `freemap`. Either every sector is allocated or none
    /// is. The header is not written to disk, see [`FileHeader::write_back`].
    pub fn allocate<D: SectorStorage + ?Sized>(
        &mut self,
        freemap: &mut FreeMap,
        disk: &mut D,
        size: usize,
    ) -> Result<()> {
        if self.sector_count != 0 {
            warn!("allocate called on a header owning {} sectors", self.sector_count);
            return Err(FsError::InvariantViolation(format!(
                "header already owns {} sectors",
                self.sector_count
            )));
        }
        check_size(size)?;

        let sector_count = sectors_for(size);
        let uses_indirect = sector_count >= NUM_DIRECT;
        let needed = sector_count + usize::from(uses_indirect);
        admit(freemap, needed)?;
        let claimed = claim(freemap, needed)?;

        let mut direct = [0; DIRECT_SLOTS];
        let map = if !uses_indirect {
            direct[..sector_count].copy_from_slice(&claimed);
            BlockMap::Direct(direct)
        } else {
            // Claim order is: direct data sectors, the indirect block, the rest of the data.
            direct.copy_from_slice(&claimed[..DIRECT_SLOTS]);
            let indirect_block = claimed[DIRECT_SLOTS];
            let tail = &claimed[NUM_DIRECT..];
            let mut entries = [0; NUM_INDIRECT];
            entries[..tail.len()].copy_from_slice(tail);
            if let Err(err) = write_indirect(disk, indirect_block, &entries) {
                release(freemap, &claimed)?;
                return Err(err);
            }
            BlockMap::Indirect {
                direct,
                indirect_block,
            }
        };

        self.byte_length = size as u32;
        self.sector_count = sector_count as u32;
        self.map = map;
        debug!(
            "allocated {} bytes over {} sectors (indirect block: {:?})",
            size,
            sector_count,
            self.indirect_block()
        );
        Ok(())
    }

    /// Returns every sector the header owns, the indirect block included, to
    /// `freemap`. Ownership is checked for all of them before any is freed; a sector
    /// that is already free, listed twice or past the end of the map means the map
    /// and the header disagree.
    /// On success the header is back to owning nothing.
    pub fn deallocate<D: SectorStorage + ?Sized>(
        &mut self,
        freemap: &mut FreeMap,
        disk: &mut D,
    ) -> Result<()> {
        let mut owned = self.data_sectors(disk)?;
        owned.extend(self.indirect_block());

        let mut seen = BTreeSet::new();
        for &sector in &owned {
            if !seen.insert(sector) {
                warn!("sector {} referenced twice by one header", sector);
                return Err(FsError::InvariantViolation(format!(
                    "sector {} referenced twice by one header",
                    sector
                )));
            }
            if sector as usize >= freemap.len() {
                warn!("header owns sector {} past the end of the map", sector);
                return Err(FsError::InvariantViolation(format!(
                    "header owns sector {} outside a disk of {} sectors",
                    sector,
                    freemap.len()
                )));
            }
            if !freemap.is_marked(sector) {
                warn!("header owns sector {} which is not allocated", sector);
                return Err(FsError::InvariantViolation(format!(
                    "header owns sector {} which is not allocated",
                    sector
                )));
            }
        }
        for &sector in &owned {
            freemap.mark_free(sector)?;
        }

        debug!("deallocated {} sectors", owned.len());
        *self = Self::new();
        Ok(())
    }

    /// Overwrites this header with the image stored in `sector`.
    pub fn fetch_from<D: SectorStorage + ?Sized>(
        &mut self,
        disk: &mut D,
        sector: SectorId,
    ) -> Result<()> {
        let mut buf = [0; SECTOR_SIZE];
        disk.read_sector(sector, &mut buf)?;
        let (raw, _) = RawHeader::read_from_prefix(&buf).map_err(|_| FsError::CorruptHeader {
            sector,
            reason: "sector too small for a header".to_string(),
        })?;
        *self = Self::decode(sector, &raw)?;
        debug!(
            "fetched header from sector {}: {} bytes",
            sector, self.byte_length
        );
        Ok(())
    }

    /// Writes this header verbatim to `sector`.
    pub fn write_back<D: SectorStorage + ?Sized>(
        &self,
        disk: &mut D,
        sector: SectorId,
    ) -> Result<()> {
        let mut buf = [0; SECTOR_SIZE];
        let raw = self.encode();
        buf[..std::mem::size_of::<RawHeader>()].copy_from_slice(raw.as_bytes());
        disk.write_sector(sector, &buf)?;
        debug!("wrote header to sector {}", sector);
        Ok(())
    }

    /// Translates a byte offset within the file to the sector holding that byte.
    /// Offsets in the first `NUM_DIRECT - 1` sectors are answered from the header,
    /// anything further costs one read of the indirect block.
    pub fn byte_to_sector<D: SectorStorage + ?Sized>(
        &self,
        disk: &mut D,
        offset: usize,
    ) -> Result<SectorId> {
        if offset >= self.file_length() {
            return Err(FsError::OutOfRange {
                offset,
                length: self.file_length(),
            });
        }
        let sec = offset / SECTOR_SIZE;
        let sector = match &self.map {
            BlockMap::Direct(direct) => direct[sec],
            BlockMap::Indirect { direct, .. } if sec < DIRECT_SLOTS => direct[sec],
            BlockMap::Indirect { indirect_block, .. } => {
                read_indirect(disk, *indirect_block)?[sec - DIRECT_SLOTS]
            }
        };
        trace!("offset {} -> sector {}", offset, sector);
        Ok(sector)
    }

    /// Grows the file to `size` bytes. New sectors are only allocated when `size`
    /// goes past the space already owned; the direct slots fill up first, then the
    /// indirect block, keeping whatever entries it already holds. Fails without
    /// touching the header or `freemap` when there is not enough room.
    ///
    /// A `size` below the current length leaves the file as it is.
    pub fn set_length<D: SectorStorage + ?Sized>(
        &mut self,
        freemap: &mut FreeMap,
        disk: &mut D,
        size: usize,
    ) -> Result<()> {
        check_size(size)?;
        let old = self.sector_count();
        if size <= old * SECTOR_SIZE {
            if size > self.file_length() {
                self.byte_length = size as u32;
            }
            return Ok(());
        }

        let new = sectors_for(size);
        let crosses_into_indirect = old < NUM_DIRECT && new >= NUM_DIRECT;
        let needed = (new - old) + usize::from(crosses_into_indirect);
        admit(freemap, needed)?;
        let claimed = claim(freemap, needed)?;

        let map = match self.grown_map(disk, old, new, &claimed) {
            Ok(map) => map,
            Err(err) => {
                release(freemap, &claimed)?;
                return Err(err);
            }
        };

        debug!(
            "grew file from {} to {} bytes ({} -> {} sectors)",
            self.byte_length, size, old, new
        );
        self.byte_length = size as u32;
        self.sector_count = new as u32;
        self.map = map;
        Ok(())
    }

    /// Every data sector of the file, in file order. Reads the indirect block once
    /// when there is one.
    pub fn data_sectors<D: SectorStorage + ?Sized>(&self, disk: &mut D) -> Result<Vec<SectorId>> {
        let mut sectors = self.direct()[..self.sector_count().min(DIRECT_SLOTS)].to_vec();
        if let BlockMap::Indirect { indirect_block, .. } = self.map {
            let entries = read_indirect(disk, indirect_block)?;
            sectors.extend_from_slice(&entries[..self.indirect_len()]);
        }
        Ok(sectors)
    }

    /// The [`Display`](fmt::Display) summary followed by the entries of the
    /// indirect block, which are only known after reading it from `disk`.
    pub fn describe<D: SectorStorage + ?Sized>(&self, disk: &mut D) -> Result<String> {
        let mut text = self.to_string();
        if let BlockMap::Indirect { indirect_block, .. } = self.map {
            let entries = read_indirect(disk, indirect_block)?;
            text.push(':');
            for sector in &entries[..self.indirect_len()] {
                text.push_str(&format!(" {}", sector));
            }
        }
        Ok(text)
    }

    fn direct(&self) -> &[SectorId; DIRECT_SLOTS] {
        match &self.map {
            BlockMap::Direct(direct) | BlockMap::Indirect { direct, .. } => direct,
        }
    }

    /// Entries in use within the indirect block.
    fn indirect_len(&self) -> usize {
        self.sector_count().saturating_sub(DIRECT_SLOTS)
    }

    /// Builds the block map for a file growing from `old` to `new` sectors using the
    /// freshly `claimed` sectors, writing the indirect block when one is involved.
    fn grown_map<D: SectorStorage + ?Sized>(
        &self,
        disk: &mut D,
        old: usize,
        new: usize,
        claimed: &[SectorId],
    ) -> Result<BlockMap> {
        let mut direct = *self.direct();
        let direct_end = new.min(DIRECT_SLOTS);
        let (for_direct, rest) = claimed.split_at(direct_end.saturating_sub(old));
        if old < direct_end {
            direct[old..direct_end].copy_from_slice(for_direct);
        }
        if new < NUM_DIRECT {
            return Ok(BlockMap::Direct(direct));
        }

        let (indirect_block, mut entries, for_entries) = match self.map {
            BlockMap::Indirect { indirect_block, .. } => {
                (indirect_block, read_indirect(disk, indirect_block)?, rest)
            }
            BlockMap::Direct(_) => {
                let (&indirect_block, rest) = rest.split_first().ok_or_else(|| {
                    FsError::InvariantViolation("no sector claimed for indirect block".to_string())
                })?;
                (indirect_block, [0; NUM_INDIRECT], rest)
            }
        };
        // Existing entries stay where they are, new ones go after them.
        let start = old.saturating_sub(DIRECT_SLOTS);
        entries[start..start + for_entries.len()].copy_from_slice(for_entries);
        write_indirect(disk, indirect_block, &entries)?;

        Ok(BlockMap::Indirect {
            direct,
            indirect_block,
        })
    }

    fn encode(&self) -> RawHeader {
        let mut slots = [0; NUM_DIRECT];
        slots[..DIRECT_SLOTS].copy_from_slice(self.direct());
        slots[DIRECT_SLOTS] = self.indirect_block().unwrap_or(NO_INDIRECT);
        RawHeader {
            byte_length: self.byte_length,
            sector_count: self.sector_count,
            direct: slots,
        }
    }

    fn decode(sector: SectorId, raw: &RawHeader) -> Result<Self> {
        let corrupt = |reason: String| {
            warn!("header at sector {} is malformed: {}", sector, reason);
            FsError::CorruptHeader { sector, reason }
        };

        let sector_count = raw.sector_count as usize;
        if sector_count > MAX_FILE_SECTORS {
            return Err(corrupt(format!(
                "{} sectors exceeds the {} a header can map",
                sector_count, MAX_FILE_SECTORS
            )));
        }
        if sectors_for(raw.byte_length as usize) != sector_count {
            return Err(corrupt(format!(
                "{} bytes cannot occupy {} sectors",
                raw.byte_length, sector_count
            )));
        }

        let mut direct = [0; DIRECT_SLOTS];
        let in_use = sector_count.min(DIRECT_SLOTS);
        direct[..in_use].copy_from_slice(&raw.direct[..in_use]);
        let map = if sector_count < NUM_DIRECT {
            BlockMap::Direct(direct)
        } else {
            let indirect_block = raw.direct[DIRECT_SLOTS];
            if indirect_block == NO_INDIRECT {
                return Err(corrupt(format!(
                    "{} sectors but no indirect block",
                    sector_count
                )));
            }
            BlockMap::Indirect {
                direct,
                indirect_block,
            }
        };

        Ok(Self {
            byte_length: raw.byte_length,
            sector_count: raw.sector_count,
            map,
        })
    }
}

/// Header fields and direct sectors. Listing the indirect entries needs the disk,
/// see [`FileHeader::describe`].
impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file length: {} bytes, {} sectors. direct:",
            self.byte_length, self.sector_count
        )?;
        for sector in &self.direct()[..self.sector_count().min(DIRECT_SLOTS)] {
            write!(f, " {}", sector)?;
        }
        if let Some(indirect_block) = self.indirect_block() {
            write!(
                f,
                ". indirect block: sector {} ({} entries)",
                indirect_block,
                self.indirect_len()
            )?;
        }
        Ok(())
    }
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge {
            requested: size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Refuses up front any request the free map cannot satisfy as a whole.
fn admit(freemap: &FreeMap, needed: usize) -> Result<()> {
    let available = freemap.count_free();
    if available < needed {
        debug!("need {} sectors, only {} free", needed, available);
        return Err(FsError::InsufficientSpace { needed, available });
    }
    Ok(())
}

/// Takes `count` sectors from `freemap`, giving them all back if it runs dry.
fn claim(freemap: &mut FreeMap, count: usize) -> Result<Vec<SectorId>> {
    let mut claimed = Vec::with_capacity(count);
    for _ in 0..count {
        match freemap.find_and_mark() {
            Some(sector) => claimed.push(sector),
            None => {
                let available = claimed.len();
                release(freemap, &claimed)?;
                return Err(FsError::InsufficientSpace {
                    needed: count,
                    available,
                });
            }
        }
    }
    Ok(claimed)
}

fn release(freemap: &mut FreeMap, sectors: &[SectorId]) -> Result<()> {
    for &sector in sectors {
        freemap.mark_free(sector)?;
    }
    Ok(())
}

fn read_indirect<D: SectorStorage + ?Sized>(
    disk: &mut D,
    sector: SectorId,
) -> Result<IndirectBlock> {
    let mut buf: Sector = [0; SECTOR_SIZE];
    disk.read_sector(sector, &mut buf)?;
    let mut entries: IndirectBlock = [0; NUM_INDIRECT];
    entries.as_mut_bytes().copy_from_slice(&buf);
    Ok(entries)
}

fn write_indirect<D: SectorStorage + ?Sized>(
    disk: &mut D,
    sector: SectorId,
    entries: &IndirectBlock,
) -> Result<()> {
    let mut buf: Sector = [0; SECTOR_SIZE];
    buf.copy_from_slice(entries.as_bytes());
    disk.write_sector(sector, &buf)?;
    Ok(())
}
