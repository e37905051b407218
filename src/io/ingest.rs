use crate::io::metadata::MetadataTable;
use crate::io::store::ImageStore;
use crate::types::{FillError, FillResult, RasterImage, Timestamp, SCENE_BANDS};
use ndarray::{concatenate, Axis};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::path::Path;

/// Source of raw scenes: band stack with the mask bands appended
pub trait SceneReader: Sync {
    fn read_scene(&self, id: &str) -> FillResult<RasterImage>;
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Timestamps written to the store, ascending
    pub stored: Vec<Timestamp>,
    /// Scene identifiers that could not be ingested, with the reason
    pub failures: Vec<(String, String)>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Stack spectral bands and mask bands into one scene.
pub fn stack_scene(bands: RasterImage, mask: RasterImage) -> FillResult<RasterImage> {
    let (_, height, width) = bands.dim();
    let (_, mask_height, mask_width) = mask.dim();
    if (height, width) != (mask_height, mask_width) {
        return Err(FillError::InvalidImage(format!(
            "band raster {:?} and mask raster {:?} differ in size",
            bands.dim(),
            mask.dim()
        )));
    }
    let scene = concatenate(Axis(0), &[bands.view(), mask.view()])
        .map_err(|e| FillError::Processing(format!("Failed to stack scene: {}", e)))?;
    if scene.dim().0 < SCENE_BANDS {
        return Err(FillError::InvalidImage(format!(
            "scene has {} bands, need at least {}",
            scene.dim().0,
            SCENE_BANDS
        )));
    }
    Ok(scene)
}

/// Scene identifiers of the raster files in `dir` (file name up to the first '.')
pub fn list_scene_ids<P: AsRef<Path>>(dir: P) -> FillResult<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(id) = name.split('.').next().filter(|id| !id.is_empty()) {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Read each scene (on the worker pool in parallel builds) and write it into `store` under its
/// acquisition time.
///
/// Workers write pixel data straight to the store; the store serializes its
/// own index updates. A scene that fails does not stop the others.
pub fn ingest(
    ids: &[String],
    table: &MetadataTable,
    reader: &dyn SceneReader,
    store: &dyn ImageStore,
) -> IngestReport {
    log::info!("Ingesting {} scenes", ids.len());

    let ingest_one = |id: &String| {
        let outcome = table
            .timestamp_of(id)
            .ok_or_else(|| FillError::Metadata(format!("no acquisition time for scene '{}'", id)))
            .and_then(|timestamp| {
                let scene = reader.read_scene(id)?;
                store.create(timestamp, scene.view())?;
                log::debug!("Stored scene {} at {}", id, timestamp);
                Ok(timestamp)
            });
        (id.clone(), outcome)
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<(String, FillResult<Timestamp>)> = ids.par_iter().map(ingest_one).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<(String, FillResult<Timestamp>)> = ids.iter().map(ingest_one).collect();

    let mut report = IngestReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(timestamp) => report.stored.push(timestamp),
            Err(e) => {
                log::warn!("Failed to ingest scene {}: {}", id, e);
                report.failures.push((id, e.to_string()));
            }
        }
    }
    report.stored.sort_unstable();

    log::info!(
        "Ingested {} scenes, {} failed",
        report.stored.len(),
        report.failures.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::metadata::SceneEntry;
    use crate::io::store::MemoryStore;
    use ndarray::Array3;

    struct FakeReader;

    impl SceneReader for FakeReader {
        fn read_scene(&self, id: &str) -> FillResult<RasterImage> {
            match id {
                "broken" => Err(FillError::Processing("corrupt raster".to_string())),
                _ => {
                    let bands = Array3::from_elem((3, 2, 2), id.len() as i16);
                    let mask = Array3::zeros((2, 2, 2));
                    stack_scene(bands, mask)
                }
            }
        }
    }

    fn table() -> MetadataTable {
        MetadataTable::from_entries(vec![
            SceneEntry { id: "first".into(), timestamp: 200 },
            SceneEntry { id: "second".into(), timestamp: 100 },
            SceneEntry { id: "broken".into(), timestamp: 300 },
        ])
    }

    #[test]
    fn test_stack_scene() {
        let scene = stack_scene(Array3::ones((3, 4, 5)), Array3::zeros((2, 4, 5))).unwrap();
        assert_eq!(scene.dim(), (5, 4, 5));
        assert_eq!(scene[[2, 3, 4]], 1);
        assert_eq!(scene[[3, 3, 4]], 0);
    }

    #[test]
    fn test_stack_scene_size_mismatch() {
        let result = stack_scene(Array3::ones((3, 4, 5)), Array3::zeros((2, 4, 4)));
        assert!(matches!(result, Err(FillError::InvalidImage(_))));
    }

    #[test]
    fn test_ingest_collects_failures() {
        let store = MemoryStore::new();
        let ids: Vec<String> = ["first", "second", "broken", "unknown"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = ingest(&ids, &table(), &FakeReader, &store);

        assert_eq!(report.stored, vec![100, 200]);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.is_complete());
        assert_eq!(store.timestamps(), vec![100, 200]);
        assert_eq!(store.get(200).unwrap()[[0, 0, 0]], 5);
    }

    #[test]
    fn test_list_scene_ids() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("LC08_b.tif"), b"").unwrap();
        std::fs::write(dir.path().join("LC08_a.tif"), b"").unwrap();
        std::fs::write(dir.path().join("LC08_a.tif.aux.xml"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(list_scene_ids(dir.path()).unwrap(), vec!["LC08_a", "LC08_b"]);
    }
}
