//! Observation containers and the multivariate data policy.
//!
//! Purpose
//! -------
//! Store scalar (series, time)-indexed regression observations for the
//! multivariate state-space model, track which series were observed at each
//! time point, and maintain the adjusted-observation workspace each Gibbs
//! sub-step filters against.
//!
//! Key behaviors
//! -------------
//! - [`TimeSeriesRegressionData`] pairs a response with its predictors, its
//!   (series, time) identity, and the latent Student-t weight mutated in
//!   place by the weight-augmentation step.
//! - [`ObservedMask`] records, per time point, one bit per series.
//! - [`DataPolicy`] owns the observations, answers windowed queries, merges
//!   compatible data sets, and produces isolated residual views for the
//!   shared-state and series-specific imputation steps.
//!
//! Invariants & assumptions
//! ------------------------
//! - Observation identity is (series, time) and is unique; a duplicate add
//!   is a configuration error.
//! - For masks derived from `add_data`, `data_index(series, time).is_some()`
//!   iff the mask bit for that series is set at that time.
//!   `set_observed_status` deliberately overrides the derived status (e.g.
//!   for holdout experiments) and callers own the consequences.
//! - A missing (series, time) pair reads as `f64::NEG_INFINITY` through
//!   [`DataPolicy::response`]; callers never see an imputed value.
//!
//! Conventions
//! -----------
//! - Indices are 0-based; the time dimension grows monotonically as data is
//!   appended and shrinks only on [`DataPolicy::clear_data`].
//! - Predictor vectors share a common dimension fixed by the first
//!   observation added.
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::BTreeMap;

use crate::statespace::errors::{SsmError, SsmResult};

/// A scalar response paired with predictors at a given (series, time) point.
///
/// The `weight` field carries the latent Student-t scale factor (1.0 for
/// Gaussian errors); the weight-augmentation step overwrites it every
/// sampler iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRegressionData {
    response: f64,
    predictors: Array1<f64>,
    series: usize,
    timestamp: usize,
    weight: f64,
}

impl TimeSeriesRegressionData {
    /// Construct an observation with unit latent weight.
    ///
    /// # Errors
    /// [`SsmError::NonFiniteValue`] if the response is NaN or infinite.
    pub fn new(
        response: f64, predictors: Array1<f64>, series: usize, timestamp: usize,
    ) -> SsmResult<Self> {
        if !response.is_finite() {
            return Err(SsmError::NonFiniteValue { context: "observation response", value: response });
        }
        Ok(Self { response, predictors, series, timestamp, weight: 1.0 })
    }

    /// The observed response value.
    pub fn response(&self) -> f64 {
        self.response
    }

    /// The predictor vector.
    pub fn predictors(&self) -> ArrayView1<'_, f64> {
        self.predictors.view()
    }

    /// The 0-based index of the series this observation belongs to.
    pub fn series(&self) -> usize {
        self.series
    }

    /// The 0-based time index of this observation.
    pub fn timestamp(&self) -> usize {
        self.timestamp
    }

    /// The latent Student-t scale-mixture weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Overwrite the latent weight (called by the augmentation step).
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}

/// One bit per series recording which series were observed at a time point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMask {
    bits: Vec<bool>,
}

impl ObservedMask {
    /// A mask with every series marked observed.
    pub fn all_observed(nseries: usize) -> Self {
        Self { bits: vec![true; nseries] }
    }

    /// A mask with every series marked missing.
    pub fn none_observed(nseries: usize) -> Self {
        Self { bits: vec![false; nseries] }
    }

    /// Build a mask from explicit per-series bits.
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Number of series the mask covers.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the mask covers zero series.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether the given series is marked observed.
    pub fn is_observed(&self, series: usize) -> bool {
        self.bits[series]
    }

    /// Set the bit for one series.
    pub fn set(&mut self, series: usize, observed: bool) {
        self.bits[series] = observed;
    }

    /// Number of series marked observed.
    pub fn count_observed(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Indices of the observed series, in increasing order.
    pub fn observed_indices(&self) -> Vec<usize> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| if b { Some(i) } else { None })
            .collect()
    }
}

/// Which state contribution the adjusted-observation workspace has isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateIsolation {
    /// Workspace holds raw responses minus nothing.
    Raw,
    /// Residuals for the shared-state draw: response minus regression and
    /// series-specific contributions.
    SharedState,
    /// Residuals for the series-specific draws: response minus regression
    /// and shared-state contributions.
    SeriesSpecific,
}

/// Observation store for the multivariate state-space regression model.
///
/// Owns the raw observations, the per-time observed masks, the (series,
/// time) index, and the adjusted-observation workspace. Appending data
/// extends the time dimension; observations are never removed individually.
#[derive(Debug, Clone)]
pub struct DataPolicy {
    nseries: usize,
    xdim: Option<usize>,
    observations: Vec<TimeSeriesRegressionData>,
    data_indices: Vec<BTreeMap<usize, usize>>,
    observed: Vec<ObservedMask>,
    adjusted: Array2<f64>,
    isolation: StateIsolation,
}

impl DataPolicy {
    /// Create an empty policy for `nseries` series.
    ///
    /// # Errors
    /// [`SsmError::DimensionMismatch`] if `nseries == 0`.
    pub fn new(nseries: usize) -> SsmResult<Self> {
        if nseries == 0 {
            return Err(SsmError::DimensionMismatch { what: "nseries", expected: 1, actual: 0 });
        }
        Ok(Self {
            nseries,
            xdim: None,
            observations: Vec::new(),
            data_indices: vec![BTreeMap::new(); nseries],
            observed: Vec::new(),
            adjusted: Array2::zeros((nseries, 0)),
            isolation: StateIsolation::Raw,
        })
    }

    /// Number of series being modeled.
    pub fn nseries(&self) -> usize {
        self.nseries
    }

    /// Number of distinct time points observed so far.
    pub fn time_dimension(&self) -> usize {
        self.observed.len()
    }

    /// Predictor dimension, once the first observation has fixed it.
    pub fn xdim(&self) -> Option<usize> {
        self.xdim
    }

    /// Total number of stored observations.
    pub fn ndata(&self) -> usize {
        self.observations.len()
    }

    /// Append one observation, extending the time dimension if needed.
    ///
    /// Amortized O(1) plus the map insertion; a fresh time index extends the
    /// observed-status table with all-missing masks up to `timestamp`.
    ///
    /// # Errors
    /// - [`SsmError::SeriesIndexOutOfRange`] for a series outside
    ///   `[0, nseries)`.
    /// - [`SsmError::DuplicateObservation`] if (series, time) already exists.
    /// - [`SsmError::PredictorLengthMismatch`] if the predictor dimension
    ///   disagrees with previously added data.
    pub fn add_data(&mut self, observation: TimeSeriesRegressionData) -> SsmResult<()> {
        let series = observation.series();
        let time = observation.timestamp();
        if series >= self.nseries {
            return Err(SsmError::SeriesIndexOutOfRange { series, nseries: self.nseries });
        }
        match self.xdim {
            None => self.xdim = Some(observation.predictors().len()),
            Some(xdim) => {
                if observation.predictors().len() != xdim {
                    return Err(SsmError::PredictorLengthMismatch {
                        expected: xdim,
                        actual: observation.predictors().len(),
                    });
                }
            }
        }
        if self.data_indices[series].contains_key(&time) {
            return Err(SsmError::DuplicateObservation { series, time });
        }
        while self.observed.len() <= time {
            self.observed.push(ObservedMask::none_observed(self.nseries));
        }
        self.observed[time].set(series, true);
        self.data_indices[series].insert(time, self.observations.len());
        self.observations.push(observation);
        Ok(())
    }

    /// Index of the observation for (series, time), if present.
    pub fn data_index(&self, series: usize, time: usize) -> Option<usize> {
        self.data_indices.get(series).and_then(|m| m.get(&time).copied())
    }

    /// The stored observation at a raw index.
    pub fn data_point(&self, index: usize) -> &TimeSeriesRegressionData {
        &self.observations[index]
    }

    /// Mutable access to a stored observation (weight augmentation).
    pub fn data_point_mut(&mut self, index: usize) -> &mut TimeSeriesRegressionData {
        &mut self.observations[index]
    }

    /// Iterate over all stored observations.
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesRegressionData> {
        self.observations.iter()
    }

    /// Mutable iteration over all stored observations.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TimeSeriesRegressionData> {
        self.observations.iter_mut()
    }

    /// The response for (series, time), or negative infinity when missing.
    pub fn response(&self, series: usize, time: usize) -> f64 {
        match self.data_index(series, time) {
            Some(index) => self.observations[index].response(),
            None => f64::NEG_INFINITY,
        }
    }

    /// The latent weight for (series, time); 1.0 when missing.
    pub fn weight(&self, series: usize, time: usize) -> f64 {
        match self.data_index(series, time) {
            Some(index) => self.observations[index].weight(),
            None => 1.0,
        }
    }

    /// The observed-status mask at time `t`.
    ///
    /// Requires `t < time_dimension()`; an out-of-range index is a logic
    /// error and panics via slice indexing.
    pub fn observed(&self, t: usize) -> &ObservedMask {
        &self.observed[t]
    }

    /// Override the observed-status mask at time `t`.
    ///
    /// Used to hold out data without deleting it. This breaks the derived
    /// add-data invariant on purpose; the mask, not the index, is what the
    /// Kalman engine consults.
    ///
    /// # Errors
    /// - [`SsmError::TimeIndexOutOfRange`] if `t >= time_dimension()`.
    /// - [`SsmError::DimensionMismatch`] if the mask length is not nseries.
    pub fn set_observed_status(&mut self, t: usize, status: ObservedMask) -> SsmResult<()> {
        if t >= self.observed.len() {
            return Err(SsmError::TimeIndexOutOfRange { time: t, time_dimension: self.observed.len() });
        }
        if status.len() != self.nseries {
            return Err(SsmError::DimensionMismatch {
                what: "observed mask",
                expected: self.nseries,
                actual: status.len(),
            });
        }
        self.observed[t] = status;
        Ok(())
    }

    /// Merge all observations from `other` into `self`.
    ///
    /// Both policies must describe the same panel shape; Rust's type system
    /// already guarantees the concrete policy type matches, so the residual
    /// runtime check is shape compatibility.
    ///
    /// # Errors
    /// - [`SsmError::DataTypeMismatch`] if the series counts differ.
    /// - [`SsmError::PredictorLengthMismatch`] if predictor dimensions differ.
    /// - [`SsmError::DuplicateObservation`] if identities collide.
    pub fn combine_data(&mut self, other: &DataPolicy) -> SsmResult<()> {
        if other.nseries != self.nseries {
            return Err(SsmError::DataTypeMismatch {
                expected: "a data policy over the same number of series",
            });
        }
        for observation in &other.observations {
            self.add_data(observation.clone())?;
        }
        Ok(())
    }

    /// Drop all observations, masks, indices, and workspace state.
    pub fn clear_data(&mut self) {
        self.observations.clear();
        for map in &mut self.data_indices {
            map.clear();
        }
        self.observed.clear();
        self.xdim = None;
        self.adjusted = Array2::zeros((self.nseries, 0));
        self.isolation = StateIsolation::Raw;
    }

    /// Which contribution the adjusted workspace currently isolates.
    pub fn isolation(&self) -> StateIsolation {
        self.isolation
    }

    /// Rebuild the adjusted workspace for the **shared-state** draw.
    ///
    /// Subtracts the regression and series-specific contributions from each
    /// observed response; missing cells are set to negative infinity and the
    /// Kalman engine never reads them.
    ///
    /// # Errors
    /// [`SsmError::DimensionMismatch`] if either contribution matrix is not
    /// nseries x time_dimension.
    pub fn isolate_shared_state(
        &mut self, regression: &Array2<f64>, series_specific: &Array2<f64>,
    ) -> SsmResult<()> {
        self.rebuild_adjusted(regression, series_specific)?;
        self.isolation = StateIsolation::SharedState;
        Ok(())
    }

    /// Rebuild the adjusted workspace for the **series-specific** draws.
    ///
    /// Subtracts the regression and shared-state contributions from each
    /// observed response.
    ///
    /// # Errors
    /// [`SsmError::DimensionMismatch`] as for
    /// [`DataPolicy::isolate_shared_state`].
    pub fn isolate_series_specific_state(
        &mut self, regression: &Array2<f64>, shared: &Array2<f64>,
    ) -> SsmResult<()> {
        self.rebuild_adjusted(regression, shared)?;
        self.isolation = StateIsolation::SeriesSpecific;
        Ok(())
    }

    /// The adjusted responses across all series at time `t`.
    pub fn adjusted_observation(&self, t: usize) -> ArrayView1<'_, f64> {
        self.adjusted.column(t)
    }

    /// The adjusted response for one (series, time) cell.
    pub fn adjusted_value(&self, series: usize, time: usize) -> f64 {
        self.adjusted[(series, time)]
    }

    fn rebuild_adjusted(&mut self, a: &Array2<f64>, b: &Array2<f64>) -> SsmResult<()> {
        let time_dimension = self.time_dimension();
        for (name, m) in [("regression contribution", a), ("state contribution", b)] {
            if m.nrows() != self.nseries || m.ncols() != time_dimension {
                return Err(SsmError::DimensionMismatch {
                    what: name,
                    expected: self.nseries * time_dimension,
                    actual: m.nrows() * m.ncols(),
                });
            }
        }
        let mut adjusted = Array2::from_elem((self.nseries, time_dimension), f64::NEG_INFINITY);
        for t in 0..time_dimension {
            for s in 0..self.nseries {
                if self.observed[t].is_observed(s) {
                    if let Some(index) = self.data_index(s, t) {
                        adjusted[(s, t)] =
                            self.observations[index].response() - a[(s, t)] - b[(s, t)];
                    }
                }
            }
        }
        self.adjusted = adjusted;
        Ok(())
    }
}
