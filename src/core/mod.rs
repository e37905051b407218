//! Core gap-filling modules

pub mod band_mask;
pub mod partition;
pub mod time_index;
pub mod zigzag;
pub mod interpolate;
pub mod batch;

// Re-export main types
pub use band_mask::BandMask;
pub use partition::{partition, Block, BlockShape};
pub use time_index::{days_apart, within_window, TimeIndex};
pub use zigzag::ZigzagPairs;
pub use interpolate::{FillReport, FillSource, FillStep, InterpolationParams, Interpolator};
pub use batch::{batch_outcome, interpolate_many, BatchInterpolator, BatchSummary};
