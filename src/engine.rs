use crate::error::WindowResult;
use crate::source::{ProjectedExtent, RasterSource, TemporalProjectedExtent, WorkItem};
use crate::tile::Tile;
use std::time::Instant;
use tracing::*;

/// Process every item, partition by partition, one result per item in
/// input order. A failed item does not stop the others.
pub fn run<T, F>(partitions: Vec<Vec<WorkItem>>, process: F) -> Vec<WindowResult<T>>
where
    F: Fn(&WorkItem) -> WindowResult<T>,
{
    let t0 = Instant::now();
    let results: Vec<WindowResult<T>> = partitions
        .iter()
        .flat_map(|partition| partition.iter().map(&process))
        .collect();
    log_results(&results, t0);
    results
}

/// `run` with partitions spread over the rayon thread pool. Items inside a
/// partition run in order on one thread.
#[cfg(feature = "parallel")]
pub fn run_parallel<T, F>(partitions: Vec<Vec<WorkItem>>, process: F) -> Vec<WindowResult<T>>
where
    T: Send,
    F: Fn(&WorkItem) -> WindowResult<T> + Sync + Send,
{
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let t0 = Instant::now();
    let results: Vec<WindowResult<T>> = partitions
        .into_par_iter()
        .map(|partition| partition.iter().map(&process).collect::<Vec<_>>())
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();
    log_results(&results, t0);
    results
}

fn log_results<T>(results: &[WindowResult<T>], t0: Instant) {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("{failed} of {} work items failed", results.len());
    }
    info!(
        "Processed {} work items in {:.3}ms",
        results.len(),
        t0.elapsed().as_secs_f64() * 1e3
    );
}

fn drive<T, F>(source: &RasterSource, prefix: &str, process: F) -> WindowResult<Vec<T>>
where
    T: Send,
    F: Fn(&WorkItem) -> WindowResult<T> + Sync + Send,
{
    let partitions = source.partition(source.plan(prefix)?);
    #[cfg(feature = "parallel")]
    let results = run_parallel(partitions, process);
    #[cfg(not(feature = "parallel"))]
    let results = run(partitions, process);
    results.into_iter().collect()
}

/// Plan, partition and read every raster under `prefix`, failing on the
/// first failed item.
pub fn collect_spatial(
    source: &RasterSource,
    prefix: &str,
) -> WindowResult<Vec<(ProjectedExtent, Tile)>> {
    drive(source, prefix, |item| source.read_spatial(item))
}

pub fn collect_temporal(
    source: &RasterSource,
    prefix: &str,
) -> WindowResult<Vec<(TemporalProjectedExtent, Tile)>> {
    drive(source, prefix, |item| source.read_temporal(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, CellType};
    use crate::encode::Encoder;
    use crate::error::WindowError;
    use crate::io::{MemoryStore, RasterLocator};
    use crate::options::RasterOptions;
    use crate::tile::TileBuffer;
    use std::sync::Arc;

    fn source(options: RasterOptions) -> RasterSource {
        let store = MemoryStore::new();
        for (name, cols) in [("a.tif", 40), ("b.tif", 24)] {
            let tile = Tile::new(
                cols,
                16,
                CellType::raw(CellKind::I16),
                vec![TileBuffer::I16(vec![cols as i16; cols as usize * 16])],
            );
            let encoder = Encoder::new(tile).with_datetime("2024:01:01 00:00:00");
            store
                .insert(format!("mem://{name}"), encoder.encode_to_vec().unwrap())
                .unwrap();
        }
        // truncated raster
        store.insert("mem://c.tif", b"II*\0".to_vec()).unwrap();
        RasterSource::new(Arc::new(store), options)
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let source = source(
            RasterOptions::builder()
                .with_max_tile_size(8 * 8 * 2)
                .with_num_partitions(3)
                .build()
                .unwrap(),
        );
        let mut items = source.plan_windows(&RasterLocator::new("mem://a.tif")).unwrap();
        items.extend(source.plan_windows(&RasterLocator::new("mem://b.tif")).unwrap());
        assert_eq!(items.len(), 5 * 2 + 3 * 2);

        let partitions = source.partition(items);
        let sequential = run(partitions.clone(), |item| source.read_window(item));
        assert!(sequential.iter().all(|r| r.is_ok()));
        #[cfg(feature = "parallel")]
        {
            let parallel = run_parallel(partitions, |item| source.read_window(item));
            let a: Vec<Tile> = sequential.into_iter().map(|r| r.unwrap()).collect();
            let b: Vec<Tile> = parallel.into_iter().map(|r| r.unwrap()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn a_bad_file_fails_the_job() {
        let source = source(RasterOptions::default());
        assert!(matches!(
            collect_spatial(&source, "mem://"),
            Err(WindowError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn collects_every_window() {
        let source = source(
            RasterOptions::builder()
                .with_extensions(["tif"])
                .with_max_tile_size(16 * 16 * 2)
                .build()
                .unwrap(),
        );
        let items = source.plan_windows(&RasterLocator::new("mem://a.tif")).unwrap();
        let results = run(vec![items], |item| source.read_temporal(item));
        assert_eq!(results.len(), 3);
        for result in results {
            let (key, tile) = result.unwrap();
            assert_eq!(key.time.to_string(), "2024-01-01 00:00:00 UTC");
            assert_eq!(tile.get_int(0, 0, 0), Some(40));
        }
    }
}
