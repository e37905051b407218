//! I/O modules for scene metadata, ingestion and image stores

pub mod store;
pub mod metadata;
pub mod ingest;
#[cfg(feature = "gdal")]
pub mod gdal_reader;

pub use store::{ImageStore, MemoryStore, MmapStore, RasterView};
pub use metadata::{shift_back_one_year, MetadataTable, SceneEntry};
pub use ingest::{ingest, list_scene_ids, stack_scene, IngestReport, SceneReader};
#[cfg(feature = "gdal")]
pub use gdal_reader::GdalSceneReader;
