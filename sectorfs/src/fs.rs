use thiserror::Error;

/// Sectors are the unit of every disk transfer. Small on purpose: a file header
/// has to fit in exactly one of them.
pub const SECTOR_SIZE: usize = 128;

/// Slots in the header's sector table. The first `NUM_DIRECT - 1` always point at
/// data, the last one points at the indirect block once a file outgrows them.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * std::mem::size_of::<u32>()) / 4;

/// Sector ids held by one indirect block.
pub const NUM_INDIRECT: usize = SECTOR_SIZE / std::mem::size_of::<SectorId>();

/// Largest number of data sectors a single header can describe.
pub const MAX_FILE_SECTORS: usize = (NUM_DIRECT - 1) + NUM_INDIRECT;

/// Largest file in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// The sector number to access ranging from 0 (the first sector) to n - 1 (the last
/// sector) where n is number of sectors on the disk.
pub type SectorId = u32;

/// A whole sector worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("insufficient space: {needed} free sectors required, {available} available")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("offset {offset} out of range for file of {length} bytes")]
    OutOfRange { offset: usize, length: usize },
    #[error("file of {requested} bytes exceeds the {max} byte limit of a file header")]
    FileTooLarge { requested: usize, max: usize },
    #[error("malformed file header at sector {sector}: {reason}")]
    CorruptHeader { sector: SectorId, reason: String },
    #[error("disk device failure")]
    DeviceError(#[from] std::io::Error),
}

/// Number of sectors needed to hold `size` bytes.
pub(crate) fn sectors_for(size: usize) -> usize {
    size.div_ceil(SECTOR_SIZE)
}
