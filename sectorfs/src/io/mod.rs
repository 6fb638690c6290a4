mod diskemu;
mod memdisk;
mod sector;

pub use diskemu::{FileSectorEmulator, FileSectorEmulatorBuilder};
pub use memdisk::MemDisk;
pub use sector::SectorStorage;
