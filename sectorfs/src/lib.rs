//! Indexed sector allocation for a small teaching file system.
//!
//! Every file is described by a [`FileHeader`] occupying exactly one sector. The
//! header maps the file's bytes onto disk sectors through a table of direct
//! pointers and, for larger files, a single indirect block. Free sectors are
//! tracked by a [`FreeMap`] with one bit per sector.
//!
//! The disk itself is anything implementing [`io::SectorStorage`]; nothing here
//! holds on to a disk or a free map, both are passed to every operation that needs
//! them.

mod alloc;
mod file;
mod fs;
pub mod io;
mod node;

pub use crate::alloc::{FreeMap, State};
pub use crate::file::OpenFile;
pub use crate::fs::{
    FsError, Result, Sector, SectorId, MAX_FILE_SECTORS, MAX_FILE_SIZE, NUM_DIRECT, NUM_INDIRECT,
    SECTOR_SIZE,
};
pub use crate::node::FileHeader;
