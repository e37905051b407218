use crate::core::interpolate::{InterpolationParams, Interpolator};
use crate::io::store::ImageStore;
use crate::types::{FillError, FillResult, Timestamp};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Result of a batch run in which every target succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Targets written to the output store, ascending
    pub completed: Vec<Timestamp>,
}

/// Runs per-target interpolation across a worker pool
pub struct BatchInterpolator {
    interpolator: Interpolator,
}

impl BatchInterpolator {
    pub fn new(params: InterpolationParams) -> Self {
        Self {
            interpolator: Interpolator::new(params),
        }
    }

    /// Interpolate every target from `source` and write each result to `sink`.
    ///
    /// Targets run independently: a failed target never aborts its siblings.
    /// If any target fails the call returns [`FillError::PartialBatchFailure`]
    /// listing both the completed and the failed targets; completed images
    /// are already in `sink`.
    pub fn run(
        &self,
        targets: &[Timestamp],
        source: &dyn ImageStore,
        sink: &dyn ImageStore,
    ) -> FillResult<BatchSummary> {
        let mut targets = targets.to_vec();
        targets.sort_unstable();
        let before_dedup = targets.len();
        targets.dedup();
        if targets.len() < before_dedup {
            log::warn!(
                "Dropped {} duplicate target timestamps",
                before_dedup - targets.len()
            );
        }

        log::info!(
            "Interpolating {} targets from {} observations",
            targets.len(),
            source.len()
        );

        let outcomes = self.dispatch(&targets, source, sink)?;

        let mut completed = Vec::new();
        let mut failures = Vec::new();
        for (target, outcome) in outcomes {
            match outcome {
                Ok(()) => completed.push(target),
                Err(e) => {
                    log::warn!("Interpolation failed for target {}: {}", target, e);
                    failures.push((target, e.to_string()));
                }
            }
        }

        log::info!(
            "Batch finished: {} completed, {} failed",
            completed.len(),
            failures.len()
        );

        if failures.is_empty() {
            Ok(BatchSummary { completed })
        } else {
            Err(FillError::PartialBatchFailure {
                completed,
                failures,
            })
        }
    }

    /// Run every target, on a sized pool when `workers` is set
    #[cfg(feature = "parallel")]
    fn dispatch(
        &self,
        targets: &[Timestamp],
        source: &dyn ImageStore,
        sink: &dyn ImageStore,
    ) -> FillResult<Vec<(Timestamp, FillResult<()>)>> {
        let run = || -> Vec<(Timestamp, FillResult<()>)> {
            targets
                .par_iter()
                .map(|&target| (target, self.run_target(target, source, sink)))
                .collect()
        };
        match self.interpolator.params().workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| FillError::Processing(format!("Failed to build worker pool: {}", e)))?;
                Ok(pool.install(run))
            }
            None => Ok(run()),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch(
        &self,
        targets: &[Timestamp],
        source: &dyn ImageStore,
        sink: &dyn ImageStore,
    ) -> FillResult<Vec<(Timestamp, FillResult<()>)>> {
        if let Some(workers) = self.interpolator.params().workers {
            log::debug!("Ignoring workers = {} in a sequential build", workers);
        }
        Ok(targets
            .iter()
            .map(|&target| (target, self.run_target(target, source, sink)))
            .collect())
    }

    fn run_target(
        &self,
        target: Timestamp,
        source: &dyn ImageStore,
        sink: &dyn ImageStore,
    ) -> FillResult<()> {
        self.interpolator
            .interpolate(target, source)
            .and_then(|image| sink.create(target, image.view()))
    }
}

/// Interpolate `targets` from `source` into `sink` with the given parameters
pub fn interpolate_many(
    targets: &[Timestamp],
    source: &dyn ImageStore,
    sink: &dyn ImageStore,
    params: InterpolationParams,
) -> FillResult<BatchSummary> {
    BatchInterpolator::new(params).run(targets, source, sink)
}

/// Completed and failed targets of a batch run.
///
/// A [`FillError::PartialBatchFailure`] is unpacked; any other error is
/// passed through.
pub fn batch_outcome(
    result: FillResult<BatchSummary>,
) -> FillResult<(Vec<Timestamp>, Vec<(Timestamp, String)>)> {
    match result {
        Ok(summary) => Ok((summary.completed, Vec::new())),
        Err(FillError::PartialBatchFailure {
            completed,
            failures,
        }) => Ok((completed, failures)),
        Err(e) => Err(e),
    }
}
