use crate::core::{batch_outcome, BatchInterpolator, BlockShape, InterpolationParams, Interpolator};
use crate::io::MmapStore;
use crate::types::FillError;
use numpy::ToPyArray;
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(err: FillError) -> PyErr {
    match err {
        FillError::NotFound { .. } => PyKeyError::new_err(err.to_string()),
        FillError::InvalidImage(_) | FillError::Metadata(_) => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn params(max_days_apart: Option<i64>, block_size: usize, processes: Option<usize>) -> PyResult<InterpolationParams> {
    if block_size == 0 {
        return Err(PyValueError::new_err("block_size must be positive"));
    }
    Ok(InterpolationParams {
        max_days_apart,
        block_shape: BlockShape::square(block_size),
        workers: processes,
        ..InterpolationParams::default()
    })
}

/// Interpolate the image at `timestamp` from the store at `store_dir`
#[pyfunction]
#[pyo3(signature = (store_dir, timestamp, max_days_apart=None, block_size=3000))]
fn interpolate(
    py: Python,
    store_dir: String,
    timestamp: i64,
    max_days_apart: Option<i64>,
    block_size: usize,
) -> PyResult<PyObject> {
    let params = params(max_days_apart, block_size, None)?;
    let store = MmapStore::load(&store_dir).map_err(to_py_err)?;

    let image = py
        .allow_threads(|| Interpolator::new(params).interpolate(timestamp, &store))
        .map_err(to_py_err)?;

    Ok(image.to_pyarray(py).into())
}

/// Interpolate every timestamp into a new store at `output_dir`.
///
/// Returns `(completed, failures)`: the timestamps written to the new store and
/// `(timestamp, reason)` for each target that failed.
#[pyfunction]
#[pyo3(signature = (store_dir, output_dir, timestamps, max_days_apart=None, block_size=3000, processes=None))]
fn interpolate_images(
    py: Python,
    store_dir: String,
    output_dir: String,
    timestamps: Vec<i64>,
    max_days_apart: Option<i64>,
    block_size: usize,
    processes: Option<usize>,
) -> PyResult<(Vec<i64>, Vec<(i64, String)>)> {
    let params = params(max_days_apart, block_size, processes)?;
    let source = MmapStore::load(&store_dir).map_err(to_py_err)?;
    let sink = MmapStore::init(&output_dir).map_err(to_py_err)?;

    let result = py.allow_threads(|| BatchInterpolator::new(params).run(&timestamps, &source, &sink));
    batch_outcome(result).map_err(to_py_err)
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(interpolate, m)?)?;
    m.add_function(wrap_pyfunction!(interpolate_images, m)?)?;
    m.add("SENTINEL", crate::types::SENTINEL)?;
    Ok(())
}
