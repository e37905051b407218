//! gapfill: out-of-core temporal gap filling for cloud-masked satellite imagery
//!
//! Builds gap-free snapshots of a scene at arbitrary target times from a
//! time-indexed stack of partially clouded observations. Missing pixels are
//! linearly interpolated from the nearest usable pair of observations around
//! the target and, failing that, copied from the nearest usable observation.
//! Images live in memory-mapped stores and are processed block by block.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    FillError, FillResult, ImageShape, InterpolatedImage, RasterImage, Timestamp, UnfilledMask,
    SENTINEL,
};

pub use crate::core::{
    interpolate_many, BandMask, BatchInterpolator, BlockShape, InterpolationParams, Interpolator,
    TimeIndex, ZigzagPairs,
};
pub use io::{ImageStore, MemoryStore, MetadataTable, MmapStore};
