use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Block size used to tile a pixel grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockShape {
    pub rows: usize,
    pub cols: usize,
}

impl BlockShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Square blocks of `size` x `size` pixels
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }
}

impl Default for BlockShape {
    fn default() -> Self {
        Self::square(3000)
    }
}

/// One rectangular tile of the pixel grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Block {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.cols.len()
    }
}

/// Split `0..len` into consecutive ranges of `step`, the last one clipped.
///
/// A zero `step` is treated as 1.
pub fn axis_ranges(len: usize, step: usize) -> Vec<Range<usize>> {
    let step = step.max(1);
    (0..len)
        .step_by(step)
        .map(|start| start..(start + step).min(len))
        .collect()
}

/// Tile a `height` x `width` grid into blocks in row-major order.
///
/// Blocks never overlap and cover every pixel exactly once; edge blocks
/// are clipped to the remaining extent.
pub fn partition(height: usize, width: usize, shape: BlockShape) -> Vec<Block> {
    let col_ranges = axis_ranges(width, shape.cols);
    axis_ranges(height, shape.rows)
        .into_iter()
        .flat_map(|rows| {
            col_ranges.iter().map(move |cols| Block {
                rows: rows.clone(),
                cols: cols.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_axis_ranges_clip_last() {
        assert_eq!(axis_ranges(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(axis_ranges(8, 4), vec![0..4, 4..8]);
        assert_eq!(axis_ranges(3, 5), vec![0..3]);
        assert!(axis_ranges(0, 5).is_empty());
    }

    #[test]
    fn test_partition_row_major_order() {
        let blocks = partition(5, 3, BlockShape::new(2, 2));
        let corners: Vec<(usize, usize)> = blocks
            .iter()
            .map(|b| (b.rows.start, b.cols.start))
            .collect();
        assert_eq!(corners, vec![(0, 0), (0, 2), (2, 0), (2, 2), (4, 0), (4, 2)]);
        assert_eq!(blocks[5], Block { rows: 4..5, cols: 2..3 });
    }

    #[test]
    fn test_partition_tiles_exactly_once() {
        for &(height, width) in &[(1, 1), (7, 5), (16, 16), (13, 29)] {
            for &(rows, cols) in &[(1, 1), (2, 3), (4, 4), (5, 7), (64, 64)] {
                let mut hits = Array2::<u32>::zeros((height, width));
                for block in partition(height, width, BlockShape::new(rows, cols)) {
                    assert!(block.height() > 0 && block.width() > 0);
                    for r in block.rows.clone() {
                        for c in block.cols.clone() {
                            hits[[r, c]] += 1;
                        }
                    }
                }
                assert!(
                    hits.iter().all(|&h| h == 1),
                    "grid {}x{} with blocks {}x{} not tiled exactly once",
                    height, width, rows, cols
                );
            }
        }
    }

    #[test]
    fn test_partition_is_repeatable() {
        let shape = BlockShape::new(3, 4);
        assert_eq!(partition(10, 11, shape), partition(10, 11, shape));
    }
}
