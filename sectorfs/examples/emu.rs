use std::error::Error;

use log::info;
use sectorfs::io::{FileSectorEmulatorBuilder, SectorStorage};
use sectorfs::{FreeMap, OpenFile};

const DISK_SECTORS: usize = 1024;

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let image = tempfile::NamedTempFile::new()?;
    let mut disk = FileSectorEmulatorBuilder::from(image.reopen()?)
        .with_sector_count(DISK_SECTORS)
        .build()?;
    let mut freemap = FreeMap::new(DISK_SECTORS);

    // The free map is itself a file, its header pinned to the first sector.
    let map_size = freemap.to_bytes().len();
    let mut map_file = OpenFile::create(&mut disk, &mut freemap, map_size)?;

    // Written in small pieces, so the file grows one sector at a time and ends up
    // spilling into an indirect block.
    let mut file = OpenFile::create(&mut disk, &mut freemap, 0)?;
    for _ in 0..500 {
        file.write(&mut disk, &mut freemap, b"1234567890")?;
    }
    println!("{}", file.header().describe(&mut disk)?);
    println!(
        "data sectors: {:?}",
        file.header().data_sectors(&mut disk)?
    );

    let bytes = freemap.to_bytes().to_vec();
    map_file.write_at(&mut disk, &mut freemap, &bytes, 0)?;
    disk.sync_disk()?;
    info!("{} of {} sectors free", freemap.count_free(), freemap.len());

    // Reopen the image and read everything back.
    let mut disk = FileSectorEmulatorBuilder::from(image.reopen()?)
        .with_sector_count(DISK_SECTORS)
        .clear_medium(false)
        .build()?;
    let map_file = OpenFile::open(&mut disk, map_file.header_sector())?;
    let mut bytes = vec![0; map_file.length()];
    map_file.read_at(&mut disk, &mut bytes, 0)?;
    let restored = FreeMap::from_bytes(DISK_SECTORS, &bytes)?;

    let mut file = OpenFile::open(&mut disk, file.header_sector())?;
    let mut chunk = [0; 10];
    while file.read(&mut disk, &mut chunk)? > 0 {
        assert_eq!(&chunk, b"1234567890");
    }
    println!(
        "read back {} bytes, {} sectors free",
        file.length(),
        restored.count_free()
    );
    Ok(())
}
