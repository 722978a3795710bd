use std::env;
use std::sync::Arc;
use std::time::Instant;

use tiffwindow::engine;
use tiffwindow::io::FileSystemStore;
use tiffwindow::{RasterOptions, RasterSource};

const DEFAULT_BUDGET: u64 = 4 * 1024 * 1024;

fn main() {
    println!("Example: tiffwindow window statistics");

    // Logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = env::args().skip(1);
    let Some(prefix) = args.next() else {
        eprintln!("Usage: window_stats <file or directory> [max tile bytes]");
        return;
    };
    let budget = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_BUDGET);

    let options = RasterOptions::builder()
        .with_max_tile_size(budget)
        .with_num_partitions(8)
        .with_chunked_reads()
        .build()
        .unwrap();
    let source = RasterSource::new(Arc::new(FileSystemStore), options);

    let t0 = Instant::now();
    let items = source.plan(&prefix).unwrap();
    println!("Planned {} windows in {:.3}ms", items.len(), t0.elapsed().as_secs_f64() * 1e3);

    let t0 = Instant::now();
    let partitions = source.partition(items.clone());
    let results = engine::run_parallel(partitions, |item| {
        let tile = source.read_window(item)?;
        let mut valid = 0u64;
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for row in 0..tile.rows {
            for col in 0..tile.cols {
                match tile.get_double(0, col, row) {
                    Some(v) if !v.is_nan() => {
                        valid += 1;
                        min = min.min(v);
                        max = max.max(v);
                    }
                    _ => {}
                }
            }
        }
        Ok((item.to_string(), valid, min, max))
    });
    println!("Read in {:.3}ms", t0.elapsed().as_secs_f64() * 1e3);

    for result in results {
        match result {
            Ok((item, valid, min, max)) => println!("{item}: {valid} valid, [{min}, {max}]"),
            Err(e) => println!("Failed: {e}"),
        }
    }
}
