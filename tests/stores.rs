use std::fs;
use std::sync::Arc;

use tiffwindow::engine::{collect_spatial, collect_temporal, run};
use tiffwindow::io::{FileSystemStore, MemoryStore, PathReader};
use tiffwindow::{
    CellKind, CellType, ChunkedReader, Compression, Encoder, RasterOptions, RasterSource,
    ReadRange, Tile, TileBuffer, WindowError, WindowedTileReader,
};

fn raster(cols: u32, rows: u32, fill: u8) -> Tile {
    let values = (0..cols * rows).map(|i| (i as u8).wrapping_add(fill)).collect();
    Tile::new(cols, rows, CellType::raw(CellKind::U8), vec![TileBuffer::U8(values)])
}

fn encoded(cols: u32, rows: u32, fill: u8) -> Vec<u8> {
    Encoder::new(raster(cols, rows, fill))
        .with_tile_size(16, 16)
        .with_compression(Compression::Deflate)
        .with_datetime("2022:02:02 02:02:02")
        .encode_to_vec()
        .unwrap()
}

#[test]
fn file_system_listing_and_reads() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("a.tif"), encoded(40, 40, 0)).unwrap();
    fs::write(dir.path().join("nested/b.TIFF"), encoded(24, 24, 9)).unwrap();
    fs::write(dir.path().join("a.tif.aux.xml"), "<PAMDataset/>").unwrap();
    fs::write(dir.path().join("notes.txt"), "not a raster").unwrap();

    let options = RasterOptions::builder()
        .with_max_tile_size(16 * 16)
        .build()
        .unwrap();
    let source = RasterSource::new(Arc::new(FileSystemStore), options);
    let prefix = dir.path().to_str().unwrap();

    let inputs = source.list_inputs(prefix).unwrap();
    assert_eq!(inputs.len(), 2);
    assert!(inputs[0].uri().ends_with("a.tif"));
    assert!(inputs[1].uri().ends_with("b.TIFF"));

    let tiles = collect_spatial(&source, prefix).unwrap();
    assert_eq!(tiles.len(), 3 * 3 + 2 * 2);
    let pixels: u32 = tiles.iter().map(|(_, tile)| tile.cols * tile.rows).sum();
    assert_eq!(pixels, 40 * 40 + 24 * 24);
    assert!(tiles.iter().all(|(key, _)| key.crs.is_none()));

    let keyed = collect_temporal(&source, prefix).unwrap();
    assert!(keyed
        .iter()
        .all(|(key, _)| key.time.to_rfc3339() == "2022-02-02T02:02:02+00:00"));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = RasterSource::new(Arc::new(FileSystemStore), RasterOptions::default());
    let missing = dir.path().join("missing");
    assert!(matches!(
        source.list_inputs(missing.to_str().unwrap()),
        Err(WindowError::Io(_))
    ));
}

#[test]
fn path_reader_reads_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.tif");
    let bytes = encoded(33, 17, 3);
    fs::write(&path, &bytes).unwrap();

    let reader = PathReader::new(&path);
    assert_eq!(reader.total_length().unwrap(), bytes.len() as u64);
    assert_eq!(reader.read_range_to_vec(4, 8).unwrap(), bytes[4..8].to_vec());

    let tile = WindowedTileReader::open(reader).unwrap().read_all().unwrap();
    assert_eq!(tile, raster(33, 17, 3));
}

#[test]
fn chunked_reads_match_direct_reads() {
    let bytes = encoded(100, 70, 1);
    let direct = WindowedTileReader::open(bytes.clone()).unwrap();
    let chunked = WindowedTileReader::open(ChunkedReader::new(bytes, 128).with_capacity(4)).unwrap();
    assert_eq!(direct.metadata().layout, chunked.metadata().layout);
    assert_eq!(direct.read_all().unwrap(), chunked.read_all().unwrap());
}

#[test]
fn chunked_source_and_partitioned_run() {
    let store = MemoryStore::new();
    for i in 0..4u8 {
        store
            .insert(format!("mem://tiles/{i}.tif"), encoded(48, 32, i))
            .unwrap();
    }
    let plain = RasterSource::new(Arc::new(store.clone()), RasterOptions::default());
    let options = RasterOptions::builder()
        .with_chunk_size(256)
        .with_max_tile_size(16 * 16)
        .with_partition_bytes_target(16 * 16 * 3)
        .build()
        .unwrap();
    let chunked = RasterSource::new(Arc::new(store), options);

    let items = chunked.plan("mem://tiles/").unwrap();
    assert_eq!(items.len(), 4 * 3 * 2);
    let partitions = chunked.partition(items.clone());
    assert_eq!(partitions.len(), 8);
    assert!(partitions.iter().all(|p| p.len() == 3));

    let results = run(partitions, |item| chunked.read_window(item));
    for (item, result) in items.iter().zip(results) {
        assert_eq!(result.unwrap(), plain.read_window(item).unwrap());
    }
}
