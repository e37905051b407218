use crate::core::band_mask::BandMask;
use crate::core::partition::{axis_ranges, Block, BlockShape};
use crate::core::time_index::{days_apart, within_window, TimeIndex};
use crate::core::zigzag::ZigzagPairs;
use crate::io::store::{ImageStore, RasterView};
use crate::types::{
    FillError, FillResult, ImageShape, InterpolatedImage, Timestamp, UnfilledMask, SCENE_BANDS,
    SENTINEL, SPECTRAL_BANDS,
};
use ndarray::{s, Array2, Array3, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gap-filling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationParams {
    /// Maximum days between source observations (and from the target for
    /// direct fills) before a pixel is reported missing; `None` disables the window
    pub max_days_apart: Option<i64>,
    /// Tile size for block-wise processing
    pub block_shape: BlockShape,
    /// Highest accepted cloud confidence level
    pub confidence_level: i16,
    /// Worker threads for batch runs (rayon default pool when unset)
    pub workers: Option<usize>,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            max_days_apart: None,
            block_shape: BlockShape::default(),
            confidence_level: 1,
            workers: None,
        }
    }
}

impl InterpolationParams {
    /// Read parameters from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FillResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let params = serde_json::from_reader(std::io::BufReader::new(file))?;
        log::debug!("Loaded interpolation parameters: {:?}", params);
        Ok(params)
    }
}

/// Where the values written in one fill step came from
#[derive(Debug, Clone, PartialEq)]
pub enum FillSource {
    /// Linear blend of an earlier and a later observation
    Pair {
        before: Timestamp,
        after: Timestamp,
        alpha: f64,
    },
    /// Direct copy of the observation nearest in time
    Nearest { timestamp: Timestamp },
}

/// One candidate applied to the output
#[derive(Debug, Clone, PartialEq)]
pub struct FillStep {
    pub source: FillSource,
    /// Pixels resolved by this step
    pub filled: usize,
    /// Pixels still unresolved after this step
    pub remaining: usize,
}

/// Trace of one interpolation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillReport {
    pub target: Timestamp,
    pub steps: Vec<FillStep>,
    /// Candidate pairs skipped for the day window
    pub pairs_out_of_window: usize,
    /// Candidates skipped because their image could not be opened
    pub unreadable: Vec<Timestamp>,
    /// Pixels left at the sentinel value
    pub remaining: usize,
}

/// Output buffers for one target timestamp
struct FillState {
    unfilled: UnfilledMask,
    values: InterpolatedImage,
    remaining: usize,
}

impl FillState {
    fn new(height: usize, width: usize) -> Self {
        Self {
            unfilled: Array2::from_elem((height, width), true),
            values: Array3::from_elem((SPECTRAL_BANDS, height, width), SENTINEL),
            remaining: height * width,
        }
    }

    fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Exclusive write access to one block of the output buffers
struct BlockLease<'a> {
    block: Block,
    unfilled: ArrayViewMut2<'a, bool>,
    values: ArrayViewMut3<'a, i16>,
}

/// Split the output buffers into disjoint per-block views, row-major.
fn lease_blocks<'a>(
    unfilled: &'a mut UnfilledMask,
    values: &'a mut InterpolatedImage,
    shape: BlockShape,
) -> Vec<BlockLease<'a>> {
    let (height, width) = unfilled.dim();
    let col_ranges = axis_ranges(width, shape.cols);
    let mut leases = Vec::new();

    let mut rest_unfilled = unfilled.view_mut();
    let mut rest_values = values.view_mut();
    for rows in axis_ranges(height, shape.rows) {
        let (mut strip_unfilled, tail_unfilled) = rest_unfilled.split_at(Axis(0), rows.len());
        let (mut strip_values, tail_values) = rest_values.split_at(Axis(1), rows.len());
        rest_unfilled = tail_unfilled;
        rest_values = tail_values;

        for cols in &col_ranges {
            let (block_unfilled, tail_unfilled) = strip_unfilled.split_at(Axis(1), cols.len());
            let (block_values, tail_values) = strip_values.split_at(Axis(2), cols.len());
            strip_unfilled = tail_unfilled;
            strip_values = tail_values;

            leases.push(BlockLease {
                block: Block {
                    rows: rows.clone(),
                    cols: cols.clone(),
                },
                unfilled: block_unfilled,
                values: block_values,
            });
        }
    }

    leases
}

/// Blend two samples: `before * alpha + after * (1 - alpha)`, rounded
#[inline]
pub fn blend(before: i16, after: i16, alpha: f64) -> i16 {
    (before as f64 * alpha + after as f64 * (1.0 - alpha)).round() as i16
}

/// Interpolation weight of the earlier observation
pub fn pair_weight(target: Timestamp, before: Timestamp, after: Timestamp) -> f64 {
    (target - before) as f64 / (after - before) as f64
}

/// Per-target gap-filling engine
pub struct Interpolator {
    params: InterpolationParams,
    mask: BandMask,
}

impl Interpolator {
    pub fn new(params: InterpolationParams) -> Self {
        let mask = BandMask::new(params.confidence_level);
        Self { params, mask }
    }

    pub fn standard() -> Self {
        Self::new(InterpolationParams::default())
    }

    pub fn params(&self) -> &InterpolationParams {
        &self.params
    }

    /// Build the gap-filled image for `target`.
    ///
    /// Pixels no observation could resolve within the day window keep the
    /// sentinel value; that is a successful result, not an error.
    pub fn interpolate(
        &self,
        target: Timestamp,
        store: &dyn ImageStore,
    ) -> FillResult<InterpolatedImage> {
        self.interpolate_with_report(target, store)
            .map(|(image, _)| image)
    }

    /// Same as [`Interpolator::interpolate`], also returning the fill trace
    pub fn interpolate_with_report(
        &self,
        target: Timestamp,
        store: &dyn ImageStore,
    ) -> FillResult<(InterpolatedImage, FillReport)> {
        let index = TimeIndex::new(store.timestamps());
        let first = *index.sorted().first().ok_or(FillError::EmptyStore)?;
        let dims = store.shape_of(first)?;
        if dims.bands < SCENE_BANDS {
            return Err(FillError::InvalidImage(format!(
                "stored images have {} bands, need at least {}",
                dims.bands, SCENE_BANDS
            )));
        }

        let (height, width) = dims.spatial();
        log::info!(
            "Interpolating {}x{} image at {} from {} observations",
            height,
            width,
            target,
            index.len()
        );

        let mut state = FillState::new(height, width);
        let mut report = FillReport {
            target,
            ..FillReport::default()
        };

        self.fill_from_pairs(target, store, &index, dims, &mut state, &mut report)?;
        self.fill_from_nearest(target, store, &index, dims, &mut state, &mut report)?;

        report.remaining = state.remaining;
        if state.remaining > 0 {
            log::info!(
                "{} of {} pixels at {} have no observation within the window",
                state.remaining,
                height * width,
                target
            );
        }

        Ok((state.values, report))
    }

    fn fill_from_pairs(
        &self,
        target: Timestamp,
        store: &dyn ImageStore,
        index: &TimeIndex,
        dims: ImageShape,
        state: &mut FillState,
        report: &mut FillReport,
    ) -> FillResult<()> {
        let (before_times, after_times) = index.split_nearest_first(target);

        for (before_rank, after_rank) in ZigzagPairs::with_counts(before_times.len(), after_times.len()) {
            if state.is_complete() {
                break;
            }

            let before = before_times[before_rank];
            let after = after_times[after_rank];

            // Later pairs in the zigzag order may still fit, so keep scanning
            if !within_window(before, after, self.params.max_days_apart) {
                log::debug!(
                    "Skipping pair ({}, {}): {} days apart",
                    before,
                    after,
                    days_apart(before, after)
                );
                report.pairs_out_of_window += 1;
                continue;
            }

            let Some(before_image) = self.open_source(store, before, dims, report)? else {
                continue;
            };
            let Some(after_image) = self.open_source(store, after, dims, report)? else {
                continue;
            };

            let alpha = pair_weight(target, before, after);
            let filled = self.blend_pair(state, before_image.view(), after_image.view(), alpha);
            log::debug!(
                "Pair ({}, {}) alpha {:.4}: filled {} pixels, {} remaining",
                before,
                after,
                alpha,
                filled,
                state.remaining
            );

            report.steps.push(FillStep {
                source: FillSource::Pair { before, after, alpha },
                filled,
                remaining: state.remaining,
            });
        }

        Ok(())
    }

    fn fill_from_nearest(
        &self,
        target: Timestamp,
        store: &dyn ImageStore,
        index: &TimeIndex,
        dims: ImageShape,
        state: &mut FillState,
        report: &mut FillReport,
    ) -> FillResult<()> {
        for timestamp in index.by_distance(target) {
            if state.is_complete() {
                break;
            }

            // Distance-ordered: nothing after the first miss can be inside the window
            if !within_window(timestamp, target, self.params.max_days_apart) {
                break;
            }

            let Some(image) = self.open_source(store, timestamp, dims, report)? else {
                continue;
            };

            let filled = self.copy_nearest(state, image.view());
            log::debug!(
                "Nearest fill from {}: filled {} pixels, {} remaining",
                timestamp,
                filled,
                state.remaining
            );

            report.steps.push(FillStep {
                source: FillSource::Nearest { timestamp },
                filled,
                remaining: state.remaining,
            });
        }

        Ok(())
    }

    /// Open a source image, checking it against the run's dimensions.
    ///
    /// Shape disagreements abort the target; an image that cannot be read is
    /// skipped and recorded in the report.
    fn open_source(
        &self,
        store: &dyn ImageStore,
        key: Timestamp,
        dims: ImageShape,
        report: &mut FillReport,
    ) -> FillResult<Option<RasterView>> {
        let image = match store.open(key) {
            Ok(image) => image,
            Err(e @ FillError::ShapeMismatch { .. }) => return Err(e),
            Err(e) => {
                log::warn!("Skipping unreadable observation {}: {}", key, e);
                if !report.unreadable.contains(&key) {
                    report.unreadable.push(key);
                }
                return Ok(None);
            }
        };

        if image.shape() != dims {
            return Err(FillError::shape_mismatch(key, dims, image.shape()));
        }
        Ok(Some(image))
    }

    fn blend_pair(
        &self,
        state: &mut FillState,
        before: ArrayView3<'_, i16>,
        after: ArrayView3<'_, i16>,
        alpha: f64,
    ) -> usize {
        let mask = self.mask;
        let filled = self.for_each_block(state, |lease| {
            let rows = lease.block.rows.clone();
            let cols = lease.block.cols.clone();
            let before = before.slice(s![.., rows.clone(), cols.clone()]);
            let after = after.slice(s![.., rows, cols]);
            let valid_before = mask.validity(before);
            let valid_after = mask.validity(after);

            let values = &mut lease.values;
            let mut filled = 0;
            Zip::indexed(&mut lease.unfilled)
                .and(&valid_before)
                .and(&valid_after)
                .for_each(|(r, c), unfilled, &vb, &va| {
                    if *unfilled && vb && va {
                        for band in 0..SPECTRAL_BANDS {
                            values[[band, r, c]] =
                                blend(before[[band, r, c]], after[[band, r, c]], alpha);
                        }
                        *unfilled = false;
                        filled += 1;
                    }
                });
            filled
        });

        state.remaining -= filled;
        filled
    }

    fn copy_nearest(&self, state: &mut FillState, image: ArrayView3<'_, i16>) -> usize {
        let mask = self.mask;
        let filled = self.for_each_block(state, |lease| {
            let source = image.slice(s![.., lease.block.rows.clone(), lease.block.cols.clone()]);
            let valid = mask.validity(source);

            let values = &mut lease.values;
            let mut filled = 0;
            Zip::indexed(&mut lease.unfilled)
                .and(&valid)
                .for_each(|(r, c), unfilled, &v| {
                    if *unfilled && v {
                        for band in 0..SPECTRAL_BANDS {
                            values[[band, r, c]] = source[[band, r, c]];
                        }
                        *unfilled = false;
                        filled += 1;
                    }
                });
            filled
        });

        state.remaining -= filled;
        filled
    }

    /// Run `work` over every block lease, returning the summed pixel count
    #[cfg(feature = "parallel")]
    fn for_each_block<F>(&self, state: &mut FillState, work: F) -> usize
    where
        F: Fn(&mut BlockLease<'_>) -> usize + Sync + Send,
    {
        use rayon::prelude::*;

        lease_blocks(&mut state.unfilled, &mut state.values, self.params.block_shape)
            .into_par_iter()
            .map(|mut lease| work(&mut lease))
            .sum()
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_block<F>(&self, state: &mut FillState, work: F) -> usize
    where
        F: Fn(&mut BlockLease<'_>) -> usize + Sync + Send,
    {
        lease_blocks(&mut state.unfilled, &mut state.values, self.params.block_shape)
            .into_iter()
            .map(|mut lease| work(&mut lease))
            .sum()
    }
}
