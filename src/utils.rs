#[cfg(feature = "python-bindings")]
use ndarray::{Array1, Array2};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    mixtures::finite::GaussianComponent,
    statespace::{
        core::component::VariancePrior,
        core::regression::{RegressionPrior, StudentRegression},
        models::student_mvss::StudentMvssModel,
    },
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1, PyReadonlyArray2,
};

#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

#[cfg(feature = "python-bindings")]
pub fn extract_f64_matrix<'py>(raw_data: &Bound<'py, PyAny>) -> PyResult<Array2<f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray2<f64>>() {
        return Ok(arr_ro.as_array().to_owned());
    }

    // Row-wise fallback for plain nested sequences.
    let rows: Vec<Vec<f64>> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 2-D numpy.ndarray or sequence of float64 rows",
        )
    })?;
    if rows.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }
    let ncols = rows[0].len();
    if rows.iter().any(|row| row.len() != ncols) {
        return Err(PyValueError::new_err("matrix rows must all share one length"));
    }
    let mut out = Array2::zeros((rows.len(), ncols));
    for (i, row) in rows.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            out[(i, j)] = value;
        }
    }
    Ok(out)
}

#[cfg(feature = "python-bindings")]
pub fn extract_known_source<'py>(
    raw: Option<&Bound<'py, PyAny>>, data_length: usize,
) -> PyResult<Option<Vec<Option<usize>>>> {
    let Some(raw) = raw else { return Ok(None) };
    let pins: Vec<Option<usize>> = raw.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "known_source must be a sequence of ints or None, one entry per observation",
        )
    })?;
    if pins.len() != data_length {
        return Err(PyValueError::new_err(format!(
            "known_source has {} entries for {} observations",
            pins.len(),
            data_length
        )));
    }
    Ok(Some(pins))
}

#[cfg(feature = "python-bindings")]
pub fn build_gaussian_components<'py>(
    py: Python<'py>, means: &Bound<'py, PyAny>, variances: &Bound<'py, PyAny>,
    prior_mean: Option<f64>, prior_sd: Option<f64>, prior_df: Option<f64>,
    prior_guess: Option<f64>,
) -> PyResult<Vec<GaussianComponent>> {
    let means_ro = extract_f64_array(py, means)?;
    let variances_ro = extract_f64_array(py, variances)?;
    let means_arr: Array1<f64> = means_ro.as_array().to_owned();
    let variances_arr: Array1<f64> = variances_ro.as_array().to_owned();

    if means_arr.len() != variances_arr.len() {
        return Err(PyValueError::new_err(format!(
            "means has {} entries but variances has {}",
            means_arr.len(),
            variances_arr.len()
        )));
    }

    let prior_mean = prior_mean.unwrap_or(0.0);
    let prior_sd = prior_sd.unwrap_or(10.0);
    let prior_df = prior_df.unwrap_or(1.0);

    let mut components = Vec::with_capacity(means_arr.len());
    for (&mean, &sigsq) in means_arr.iter().zip(&variances_arr) {
        let guess = prior_guess.unwrap_or_else(|| sigsq.sqrt());
        let variance_prior = VariancePrior::new(prior_df, guess)?;
        components.push(GaussianComponent::new(mean, sigsq, prior_mean, prior_sd, variance_prior)?);
    }
    Ok(components)
}

#[cfg(feature = "python-bindings")]
pub fn build_student_mvss_model(
    nseries: usize, xdim: usize, nu: Option<f64>, coefficient_precision: Option<f64>,
    variance_df: Option<f64>, variance_guess: Option<f64>,
) -> PyResult<StudentMvssModel> {
    if nseries == 0 {
        return Err(PyValueError::new_err("nseries must be positive"));
    }
    if xdim == 0 {
        return Err(PyValueError::new_err("xdim must be positive"));
    }

    let nu = nu.unwrap_or(3.0);
    let precision = coefficient_precision.unwrap_or(1.0);
    let df = variance_df.unwrap_or(1.0);
    let guess = variance_guess.unwrap_or(1.0);

    let mut regressions = Vec::with_capacity(nseries);
    for _ in 0..nseries {
        let coefficient_prior = RegressionPrior::diffuse(xdim, precision)?;
        let variance_prior = VariancePrior::new(df, guess)?;
        regressions.push(StudentRegression::new(nu, coefficient_prior, variance_prior)?);
    }
    Ok(StudentMvssModel::new(regressions)?)
}
