use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Acquisition time in milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Band-major image stack (band x row x column)
pub type RasterImage = Array3<i16>;

/// Gap-filled output stack holding the three spectral bands
pub type InterpolatedImage = Array3<i16>;

/// Per-pixel flags marking pixels that no candidate has resolved yet
pub type UnfilledMask = Array2<bool>;

/// Marks a pixel no observation could resolve
pub const SENTINEL: i16 = -9999;

/// Number of spectral bands carried into the interpolated output
pub const SPECTRAL_BANDS: usize = 3;

/// Band holding the quality flag (0 or 1 is an acceptable source)
pub const QUALITY_BAND: usize = 3;

/// Band holding the cloud confidence level (lower is more confident)
pub const CONFIDENCE_BAND: usize = 4;

/// Minimum band count of an ingested scene: three spectral bands plus two mask bands
pub const SCENE_BANDS: usize = 5;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Shape of a stored image stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub bands: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub fn new(bands: usize, height: usize, width: usize) -> Self {
        Self { bands, height, width }
    }

    pub fn of(image: &RasterImage) -> Self {
        let (bands, height, width) = image.dim();
        Self { bands, height, width }
    }

    /// Spatial dimensions (height, width)
    pub fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of i16 samples in the stack
    pub fn len(&self) -> usize {
        self.bands * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the raw backing file in bytes
    pub fn byte_len(&self) -> usize {
        self.len() * std::mem::size_of::<i16>()
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.bands, self.height, self.width)
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.bands, self.height, self.width)
    }
}

/// Error types for gap filling
#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("No image stored for timestamp {key}")]
    NotFound { key: Timestamp },

    #[error("Timestamp {key} is already stored")]
    DuplicateKey { key: Timestamp },

    #[error("Shape mismatch for timestamp {key}: expected {expected}, got {actual}")]
    ShapeMismatch {
        key: Timestamp,
        expected: String,
        actual: String,
    },

    #[error("Store holds no images to interpolate from")]
    EmptyStore,

    #[error("{} of {} targets failed", .failures.len(), .failures.len() + .completed.len())]
    PartialBatchFailure {
        completed: Vec<Timestamp>,
        failures: Vec<(Timestamp, String)>,
    },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store index error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl FillError {
    pub(crate) fn shape_mismatch(
        key: Timestamp,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        FillError::ShapeMismatch {
            key,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type for gap filling operations
pub type FillResult<T> = Result<T, FillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_sizes() {
        let shape = ImageShape::new(5, 4, 3);
        assert_eq!(shape.len(), 60);
        assert_eq!(shape.byte_len(), 120);
        assert_eq!(shape.spatial(), (4, 3));
        assert_eq!(shape.to_string(), "(5, 4, 3)");
    }

    #[test]
    fn test_partial_failure_message() {
        let err = FillError::PartialBatchFailure {
            completed: vec![1, 2],
            failures: vec![(3, "boom".to_string())],
        };
        assert_eq!(err.to_string(), "1 of 3 targets failed");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = FillError::shape_mismatch(7, ImageShape::new(5, 2, 2), ImageShape::new(5, 3, 3));
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("(5, 2, 2)"));
        assert!(msg.contains("(5, 3, 3)"));
    }
}
