use sectorfs::io::{FileSectorEmulator, FileSectorEmulatorBuilder, SectorStorage};
use sectorfs::{FileHeader, FreeMap, FsError, OpenFile, SectorId, SECTOR_SIZE};
use tempfile::NamedTempFile;

const DISK_SECTORS: usize = 256;
const FREE_MAP_SECTOR: SectorId = 0;

fn format(image: &NamedTempFile) -> (FileSectorEmulator, FreeMap) {
    let disk = FileSectorEmulatorBuilder::from(image.reopen().unwrap())
        .with_sector_count(DISK_SECTORS)
        .build()
        .unwrap();
    (disk, FreeMap::new(DISK_SECTORS))
}

fn reopen(image: &NamedTempFile) -> FileSectorEmulator {
    FileSectorEmulatorBuilder::from(image.reopen().unwrap())
        .with_sector_count(DISK_SECTORS)
        // Don't reset initialized disk.
        .clear_medium(false)
        .build()
        .unwrap()
}

/// Stores the free map as an ordinary file whose header sits in the first sector.
fn save_free_map(disk: &mut FileSectorEmulator, freemap: &mut FreeMap) -> OpenFile {
    let size = freemap.to_bytes().len();
    let mut file = OpenFile::create(disk, freemap, size).unwrap();
    assert_eq!(file.header_sector(), FREE_MAP_SECTOR);
    let bytes = freemap.to_bytes().to_vec();
    file.write_at(disk, freemap, &bytes, 0).unwrap();
    file
}

fn load_free_map(disk: &mut FileSectorEmulator) -> FreeMap {
    let file = OpenFile::open(disk, FREE_MAP_SECTOR).unwrap();
    let mut bytes = vec![0; file.length()];
    file.read_at(disk, &mut bytes, 0).unwrap();
    FreeMap::from_bytes(DISK_SECTORS, &bytes).unwrap()
}

#[test]
fn files_survive_reopening_the_disk() {
    let image = NamedTempFile::new().unwrap();
    let (mut disk, mut freemap) = format(&image);
    let mut map_file = save_free_map(&mut disk, &mut freemap);

    let mut file = OpenFile::create(&mut disk, &mut freemap, 0).unwrap();
    let contents: Vec<u8> = (0..6000).map(|i| (i % 97) as u8).collect();
    for chunk in contents.chunks(10) {
        file.write(&mut disk, &mut freemap, chunk).unwrap();
    }
    let data_header = file.header_sector();
    let bytes = freemap.to_bytes().to_vec();
    map_file.write_at(&mut disk, &mut freemap, &bytes, 0).unwrap();
    disk.sync_disk().unwrap();

    let mut disk = reopen(&image);
    let restored = load_free_map(&mut disk);
    assert_eq!(restored, freemap);

    let file = OpenFile::open(&mut disk, data_header).unwrap();
    assert_eq!(file.length(), 6000);
    let mut out = vec![0; 6000];
    assert_eq!(file.read_at(&mut disk, &mut out, 0).unwrap(), 6000);
    assert_eq!(out, contents);

    // Every data sector the header names is accounted for in the restored map.
    for sector in file.header().data_sectors(&mut disk).unwrap() {
        assert!(restored.is_marked(sector));
    }
}

#[test]
fn removing_files_returns_space() {
    let image = NamedTempFile::new().unwrap();
    let (mut disk, mut freemap) = format(&image);
    let initial = freemap.count_free();

    let files: Vec<OpenFile> = [100, 3000, 4500, 7000]
        .iter()
        .map(|&size| OpenFile::create(&mut disk, &mut freemap, size).unwrap())
        .collect();
    assert!(freemap.count_free() < initial);

    for file in files {
        file.remove(&mut disk, &mut freemap).unwrap();
    }
    assert_eq!(freemap.count_free(), initial);
}

#[test]
fn full_disk_refuses_new_files_without_side_effects() {
    let image = NamedTempFile::new().unwrap();
    let (mut disk, mut freemap) = format(&image);

    let mut created = 0;
    loop {
        match OpenFile::create(&mut disk, &mut freemap, 40 * SECTOR_SIZE) {
            Ok(_) => created += 1,
            Err(FsError::InsufficientSpace { .. }) => break,
            Err(err) => panic!("unexpected error: {}", err),
        }
    }
    // Header, 40 data sectors and an indirect block per file.
    assert_eq!(created, DISK_SECTORS / 42);
    assert_eq!(freemap.count_free(), DISK_SECTORS - created * 42);
}

#[test]
fn header_fetched_from_disk_translates_like_the_written_one() {
    let image = NamedTempFile::new().unwrap();
    let (mut disk, mut freemap) = format(&image);

    let mut hdr = FileHeader::new();
    hdr.allocate(&mut freemap, &mut disk, 4500).unwrap();
    hdr.write_back(&mut disk, 200).unwrap();

    let mut disk = reopen(&image);
    let mut fetched = FileHeader::new();
    fetched.fetch_from(&mut disk, 200).unwrap();
    for offset in (0..4500).step_by(SECTOR_SIZE / 2) {
        assert_eq!(
            fetched.byte_to_sector(&mut disk, offset).unwrap(),
            hdr.byte_to_sector(&mut disk, offset).unwrap()
        );
    }
}
