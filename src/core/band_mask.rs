use crate::types::{CONFIDENCE_BAND, QUALITY_BAND};
use ndarray::{Array2, ArrayView3, Axis, Zip};

/// Cloud/quality validity test over a band stack
#[derive(Debug, Clone, Copy)]
pub struct BandMask {
    /// Highest accepted cloud confidence level (lower is stricter)
    pub confidence_level: i16,
}

impl Default for BandMask {
    fn default() -> Self {
        Self { confidence_level: 1 }
    }
}

impl BandMask {
    pub fn new(confidence_level: i16) -> Self {
        Self { confidence_level }
    }

    /// Compute the per-pixel validity grid of a band stack.
    ///
    /// A pixel is valid when band 0 carries signal (> 0), the quality flag is
    /// 0 or 1, and the confidence level does not exceed `confidence_level`.
    /// Works on any block-shaped sub-array as well as full scenes; the stack
    /// must hold at least five bands.
    pub fn validity(&self, image: ArrayView3<i16>) -> Array2<bool> {
        let level = self.confidence_level;
        let signal = image.index_axis(Axis(0), 0);
        let quality = image.index_axis(Axis(0), QUALITY_BAND);
        let confidence = image.index_axis(Axis(0), CONFIDENCE_BAND);

        Zip::from(&signal)
            .and(&quality)
            .and(&confidence)
            .map_collect(|&s, &q, &c| s > 0 && (q == 0 || q == 1) && c <= level)
    }
}
