//! Timestamp-keyed image stores
//!
//! Two backends share the [`ImageStore`] trait:
//! - [`MemoryStore`]: images held in memory, for small runs and tests
//! - [`MmapStore`]: one raw file per timestamp, read back through memory maps
//!
//! Disk layout of an [`MmapStore`] root:
//! - `maps/{timestamp}`: raw native-endian i16 samples in band-major order
//! - `index.json`: timestamp -> shape, the only metadata kept resident
//!
//! Stores are write-once: a timestamp can be created once and is never
//! updated afterwards. Every stored image shares the shape of the first one.

use crate::types::{FillError, FillResult, ImageShape, RasterImage, Timestamp};
use memmap2::Mmap;
use ndarray::{ArrayView3, CowArray, Ix3};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAPS_DIR: &str = "maps";
const INDEX_FILE: &str = "index.json";

/// Read-only handle on a stored image
#[derive(Debug)]
pub enum RasterView {
    /// Shared in-memory array
    Owned(Arc<RasterImage>),
    /// Memory-mapped backing file
    Mapped { map: Mmap, shape: ImageShape },
}

impl RasterView {
    pub fn shape(&self) -> ImageShape {
        match self {
            RasterView::Owned(image) => ImageShape::of(image),
            RasterView::Mapped { shape, .. } => *shape,
        }
    }

    /// Band-major view over the stored samples
    pub fn view(&self) -> ArrayView3<'_, i16> {
        match self {
            RasterView::Owned(image) => image.view(),
            RasterView::Mapped { map, shape } => {
                // Length and alignment were validated when the view was opened
                let samples: &[i16] = bytemuck::cast_slice(&map[..]);
                ArrayView3::from_shape(shape.as_tuple(), samples)
                    .unwrap_or_else(|_| unreachable!("mapped length checked at open"))
            }
        }
    }

    /// Copy the stored samples into an owned array
    pub fn to_owned(&self) -> RasterImage {
        self.view().to_owned()
    }
}

/// Timestamp-keyed, write-once store of equally shaped band stacks
pub trait ImageStore: Send + Sync {
    /// Persist `image` under `key`. Fails if `key` is already present or
    /// if the shape differs from the images already stored.
    fn create(&self, key: Timestamp, image: ArrayView3<'_, i16>) -> FillResult<()>;

    /// Open a read-only view of the image stored under `key`
    fn open(&self, key: Timestamp) -> FillResult<RasterView>;

    /// Shape lookup from resident metadata only
    fn shape_of(&self, key: Timestamp) -> FillResult<ImageShape>;

    /// Stored timestamps in ascending order
    fn timestamps(&self) -> Vec<Timestamp>;

    fn len(&self) -> usize {
        self.timestamps().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shape bookkeeping shared by both backends
#[derive(Debug, Default)]
struct ShapeIndex {
    shapes: BTreeMap<Timestamp, ImageShape>,
    /// Keys whose pixel bytes are being written
    reserved: BTreeSet<Timestamp>,
    expected: Option<ImageShape>,
}

impl ShapeIndex {
    fn from_shapes(shapes: BTreeMap<Timestamp, ImageShape>) -> Self {
        let expected = shapes.values().next().copied();
        Self {
            shapes,
            reserved: BTreeSet::new(),
            expected,
        }
    }

    /// Claim `key` for a new image of `shape`
    fn reserve(&mut self, key: Timestamp, shape: ImageShape) -> FillResult<()> {
        if self.shapes.contains_key(&key) || self.reserved.contains(&key) {
            return Err(FillError::DuplicateKey { key });
        }
        match self.expected {
            Some(expected) if expected != shape => {
                return Err(FillError::shape_mismatch(key, expected, shape));
            }
            Some(_) => {}
            None => self.expected = Some(shape),
        }
        self.reserved.insert(key);
        Ok(())
    }

    fn commit(&mut self, key: Timestamp, shape: ImageShape) {
        self.reserved.remove(&key);
        self.shapes.insert(key, shape);
    }

    fn release(&mut self, key: Timestamp) {
        self.reserved.remove(&key);
        if self.shapes.is_empty() && self.reserved.is_empty() {
            self.expected = None;
        }
    }

    fn shape_of(&self, key: Timestamp) -> FillResult<ImageShape> {
        self.shapes
            .get(&key)
            .copied()
            .ok_or(FillError::NotFound { key })
    }
}

fn validate_image(image: &ArrayView3<'_, i16>) -> FillResult<ImageShape> {
    let (bands, height, width) = image.dim();
    if bands == 0 || height == 0 || width == 0 {
        return Err(FillError::InvalidImage(format!(
            "image has an empty axis: ({}, {}, {})",
            bands, height, width
        )));
    }
    Ok(ImageShape::new(bands, height, width))
}

/// In-memory image store
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: Mutex<ShapeIndex>,
    images: RwLock<HashMap<Timestamp, Arc<RasterImage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle on a stored image
    pub fn get(&self, key: Timestamp) -> Option<Arc<RasterImage>> {
        self.images.read().get(&key).cloned()
    }
}

impl ImageStore for MemoryStore {
    fn create(&self, key: Timestamp, image: ArrayView3<'_, i16>) -> FillResult<()> {
        let shape = validate_image(&image)?;
        self.index.lock().reserve(key, shape)?;

        self.images.write().insert(key, Arc::new(image.to_owned()));
        self.index.lock().commit(key, shape);
        Ok(())
    }

    fn open(&self, key: Timestamp) -> FillResult<RasterView> {
        let expected = self.shape_of(key)?;
        let image = self.get(key).ok_or(FillError::NotFound { key })?;
        let actual = ImageShape::of(&image);
        if actual != expected {
            return Err(FillError::shape_mismatch(key, expected, actual));
        }
        Ok(RasterView::Owned(image))
    }

    fn shape_of(&self, key: Timestamp) -> FillResult<ImageShape> {
        self.index.lock().shape_of(key)
    }

    fn timestamps(&self) -> Vec<Timestamp> {
        self.index.lock().shapes.keys().copied().collect()
    }
}

/// On-disk form of the shape index
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    images: BTreeMap<Timestamp, ImageShape>,
}

/// File-backed image store read through memory maps
#[derive(Debug)]
pub struct MmapStore {
    root: PathBuf,
    index: Mutex<ShapeIndex>,
}

impl MmapStore {
    /// Start an empty store at `root`, discarding any previous store there
    pub fn init<P: AsRef<Path>>(root: P) -> FillResult<Self> {
        let root = root.as_ref().to_path_buf();
        log::info!("Initializing image store at {}", root.display());

        let maps_dir = root.join(MAPS_DIR);
        if maps_dir.exists() {
            log::debug!("Removing previous backing files in {}", maps_dir.display());
            fs::remove_dir_all(&maps_dir)?;
        }
        fs::create_dir_all(&maps_dir)?;

        let store = Self {
            root,
            index: Mutex::new(ShapeIndex::default()),
        };
        store.write_index(&BTreeMap::new())?;
        Ok(store)
    }

    /// Open an existing store at `root` from its index file
    pub fn load<P: AsRef<Path>>(root: P) -> FillResult<Self> {
        let root = root.as_ref().to_path_buf();
        let index_path = root.join(INDEX_FILE);
        let file = File::open(&index_path).map_err(|e| {
            FillError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open store index {}: {}", index_path.display(), e),
            ))
        })?;
        let index: IndexFile = serde_json::from_reader(std::io::BufReader::new(file))?;
        log::info!(
            "Loaded image store at {} with {} images",
            root.display(),
            index.images.len()
        );

        Ok(Self {
            root,
            index: Mutex::new(ShapeIndex::from_shapes(index.images)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the backing file for `key`
    pub fn image_path(&self, key: Timestamp) -> PathBuf {
        self.root.join(MAPS_DIR).join(key.to_string())
    }

    fn write_pixels(&self, key: Timestamp, image: &ArrayView3<'_, i16>) -> FillResult<()> {
        let standard: CowArray<'_, i16, Ix3> = image.as_standard_layout();
        let samples = standard.as_slice().ok_or_else(|| {
            FillError::Processing("standard layout array is not contiguous".to_string())
        })?;

        let path = self.image_path(key);
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(bytemuck::cast_slice(samples))?;
        writer.flush()?;
        log::debug!("Wrote {} bytes to {}", samples.len() * 2, path.display());
        Ok(())
    }

    /// Persist the index atomically through a temporary file and rename
    fn write_index(&self, shapes: &BTreeMap<Timestamp, ImageShape>) -> FillResult<()> {
        let index_path = self.root.join(INDEX_FILE);
        let tmp_path = self.root.join(format!("{}.tmp", INDEX_FILE));

        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer(
            &mut writer,
            &IndexFile {
                images: shapes.clone(),
            },
        )?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp_path, &index_path)?;
        Ok(())
    }
}

impl ImageStore for MmapStore {
    fn create(&self, key: Timestamp, image: ArrayView3<'_, i16>) -> FillResult<()> {
        let shape = validate_image(&image)?;
        self.index.lock().reserve(key, shape)?;

        // Pixel bytes go straight to the key's own file; only the index is serialized
        if let Err(e) = self.write_pixels(key, &image) {
            self.index.lock().release(key);
            let _ = fs::remove_file(self.image_path(key));
            return Err(e);
        }

        // The resident index only gains the key once index.json lists it
        let mut index = self.index.lock();
        let mut shapes = index.shapes.clone();
        shapes.insert(key, shape);
        if let Err(e) = self.write_index(&shapes) {
            index.release(key);
            drop(index);
            let _ = fs::remove_file(self.image_path(key));
            return Err(e);
        }
        index.commit(key, shape);
        Ok(())
    }

    fn open(&self, key: Timestamp) -> FillResult<RasterView> {
        let shape = self.shape_of(key)?;
        let path = self.image_path(key);

        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FillError::NotFound { key },
            _ => FillError::Io(e),
        })?;
        let actual_len = file.metadata()?.len() as usize;
        if actual_len != shape.byte_len() {
            return Err(FillError::shape_mismatch(
                key,
                format!("{} ({} bytes)", shape, shape.byte_len()),
                format!("{} bytes", actual_len),
            ));
        }

        // SAFETY: stored files are write-once and never modified while mapped
        let map = unsafe { Mmap::map(&file)? };
        if bytemuck::try_cast_slice::<u8, i16>(&map[..]).is_err() {
            return Err(FillError::Processing(format!(
                "backing file {} is not aligned for i16 samples",
                path.display()
            )));
        }

        Ok(RasterView::Mapped { map, shape })
    }

    fn shape_of(&self, key: Timestamp) -> FillResult<ImageShape> {
        self.index.lock().shape_of(key)
    }

    fn timestamps(&self) -> Vec<Timestamp> {
        self.index.lock().shapes.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn ramp(shape: (usize, usize, usize), offset: i16) -> RasterImage {
        Array3::from_shape_fn(shape, |(b, r, c)| offset + (b * 100 + r * 10 + c) as i16)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let image = ramp((5, 3, 4), 1);
        store.create(100, image.view()).unwrap();

        assert_eq!(store.shape_of(100).unwrap(), ImageShape::new(5, 3, 4));
        assert_eq!(store.open(100).unwrap().view(), image.view());
        assert_eq!(store.timestamps(), vec![100]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let store = MemoryStore::new();
        store.create(100, ramp((5, 2, 2), 0).view()).unwrap();
        let err = store.create(100, ramp((5, 2, 2), 7).view()).unwrap_err();
        assert!(matches!(err, FillError::DuplicateKey { key: 100 }));
    }

    #[test]
    fn test_shape_uniformity_enforced() {
        let store = MemoryStore::new();
        store.create(100, ramp((5, 2, 2), 0).view()).unwrap();
        let err = store.create(200, ramp((5, 3, 2), 0).view()).unwrap_err();
        assert!(matches!(err, FillError::ShapeMismatch { key: 200, .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let store = MemoryStore::new();
        assert!(matches!(store.open(5), Err(FillError::NotFound { key: 5 })));
        assert!(matches!(store.shape_of(5), Err(FillError::NotFound { key: 5 })));
    }

    #[test]
    fn test_empty_image_rejected() {
        let store = MemoryStore::new();
        let image = Array3::<i16>::zeros((5, 0, 3));
        assert!(matches!(
            store.create(1, image.view()),
            Err(FillError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_mmap_store_roundtrip_and_reload() {
        let dir = TempDir::new().unwrap();
        let image = ramp((5, 6, 7), -50);
        {
            let store = MmapStore::init(dir.path()).unwrap();
            store.create(1_000, image.view()).unwrap();
            store.create(2_000, ramp((5, 6, 7), 3).view()).unwrap();
            assert_eq!(store.open(1_000).unwrap().view(), image.view());
        }

        let store = MmapStore::load(dir.path()).unwrap();
        assert_eq!(store.timestamps(), vec![1_000, 2_000]);
        assert_eq!(store.shape_of(2_000).unwrap(), ImageShape::new(5, 6, 7));
        assert_eq!(store.open(1_000).unwrap().to_owned(), image);
    }

    #[test]
    fn test_mmap_store_writes_transposed_views_in_logical_order() {
        let dir = TempDir::new().unwrap();
        let store = MmapStore::init(dir.path()).unwrap();
        let source = ramp((5, 4, 3), 0);
        let permuted = source.view().permuted_axes([0, 2, 1]);

        store.create(1, permuted).unwrap();
        assert_eq!(store.open(1).unwrap().view(), permuted);
    }

    #[test]
    fn test_mmap_store_detects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let store = MmapStore::init(dir.path()).unwrap();
        store.create(10, ramp((5, 2, 2), 0).view()).unwrap();

        let path = store.image_path(10);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            store.open(10),
            Err(FillError::ShapeMismatch { key: 10, .. })
        ));
    }

    #[test]
    fn test_mmap_store_missing_backing_file() {
        let dir = TempDir::new().unwrap();
        let store = MmapStore::init(dir.path()).unwrap();
        store.create(10, ramp((5, 2, 2), 0).view()).unwrap();
        fs::remove_file(store.image_path(10)).unwrap();

        assert!(matches!(store.open(10), Err(FillError::NotFound { key: 10 })));
    }

    #[test]
    fn test_failed_index_write_leaves_key_free() {
        let dir = TempDir::new().unwrap();
        let store = MmapStore::init(dir.path()).unwrap();
        let blocker = dir.path().join(format!("{}.tmp", INDEX_FILE));
        fs::create_dir(&blocker).unwrap();

        assert!(matches!(
            store.create(1, ramp((5, 2, 2), 0).view()),
            Err(FillError::Io(_))
        ));
        assert!(store.timestamps().is_empty());
        assert!(!store.image_path(1).exists());
        assert!(MmapStore::load(dir.path()).unwrap().is_empty());

        fs::remove_dir(&blocker).unwrap();
        store.create(1, ramp((5, 2, 2), 0).view()).unwrap();
        assert_eq!(store.timestamps(), vec![1]);
        assert_eq!(MmapStore::load(dir.path()).unwrap().timestamps(), vec![1]);
    }

    #[test]
    fn test_init_discards_previous_store() {
        let dir = TempDir::new().unwrap();
        {
            let store = MmapStore::init(dir.path()).unwrap();
            store.create(10, ramp((5, 2, 2), 0).view()).unwrap();
        }
        let store = MmapStore::init(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(!store.image_path(10).exists());
        assert!(MmapStore::load(dir.path()).unwrap().is_empty());
    }
}
