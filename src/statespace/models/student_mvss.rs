//! Multivariate Student-t state-space regression model.
//!
//! Purpose
//! -------
//! Compose the core pieces into the user-facing model: a panel of series
//! driven by shared state components (with per-series loadings), optional
//! series-specific state, a per-series Student-t regression effect, and the
//! Gibbs state-imputation cycle that alternates latent weights, the shared
//! state draw, and the series-specific state draws.
//!
//! Key behaviors
//! -------------
//! - `impute_state` runs one full sweep: resize workspaces, redraw the
//!   latent Student weights, draw the shared state conditional on the
//!   series-specific state, then draw each series' private state
//!   conditional on the shared state.
//! - Conditional observation variances are recomputed from the current
//!   weights on demand; there is no cached variance workspace to
//!   invalidate.
//! - `log_likelihood` is the Gaussian likelihood of the shared filter on
//!   the currently adjusted observations, conditional on the latent
//!   weights and the series-specific state.
//!
//! Invariants & assumptions
//! ------------------------
//! - The model owns its data and state and is deliberately not `Clone`:
//!   shared component handles are interior-mutable and a shallow copy
//!   would alias parameter state across models.
//! - Every series carries a regression model with the same predictor
//!   dimension; data points are validated against it on entry.
//!
//! Downstream usage
//! ----------------
//! - Assemble with [`StudentMvssModel::new`], add data and state
//!   components, then either drive `impute_state` / `draw_parameters`
//!   manually or hand the model to
//!   [`crate::statespace::sampler::PosteriorSampler`].
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rand::Rng;

use crate::params::Vectorize;
use crate::statespace::core::component::StateComponent;
use crate::statespace::core::data::{DataPolicy, ObservedMask, TimeSeriesRegressionData};
use crate::statespace::core::kalman::{self, StateSpace};
use crate::statespace::core::manager::{
    composite_initial_mean, composite_initial_variance, composite_state_error_variance,
    composite_transition, StateManager,
};
use crate::statespace::core::regression::StudentRegression;
use crate::statespace::core::weights::draw_student_weight;
use crate::statespace::errors::{SsmError, SsmResult};

/// The composite model. See the module docs for the moving parts.
#[derive(Debug)]
pub struct StudentMvssModel {
    data: DataPolicy,
    manager: StateManager,
    regressions: Vec<StudentRegression>,
    shared_state: Array2<f64>,
}

impl StudentMvssModel {
    /// Build a model from one regression observation model per series.
    ///
    /// # Errors
    /// - [`SsmError::InvalidOption`] if `regressions` is empty.
    /// - [`SsmError::DimensionMismatch`] if the regressions disagree on the
    ///   predictor dimension.
    pub fn new(regressions: Vec<StudentRegression>) -> SsmResult<Self> {
        if regressions.is_empty() {
            return Err(SsmError::InvalidOption {
                name: "regressions",
                reason: "at least one series is required".to_string(),
            });
        }
        let xdim = regressions[0].xdim();
        for regression in &regressions[1..] {
            if regression.xdim() != xdim {
                return Err(SsmError::DimensionMismatch {
                    what: "per-series predictor dimension",
                    expected: xdim,
                    actual: regression.xdim(),
                });
            }
        }
        let nseries = regressions.len();
        Ok(Self {
            data: DataPolicy::new(nseries)?,
            manager: StateManager::new(nseries),
            regressions,
            shared_state: Array2::zeros((0, 0)),
        })
    }

    /// Number of series in the panel.
    pub fn nseries(&self) -> usize {
        self.regressions.len()
    }

    /// Predictor dimension shared by every series.
    pub fn xdim(&self) -> usize {
        self.regressions[0].xdim()
    }

    /// Number of periods spanned by the data.
    pub fn time_dimension(&self) -> usize {
        self.data.time_dimension()
    }

    /// Number of data points.
    pub fn ndata(&self) -> usize {
        self.data.ndata()
    }

    /// Append one observation.
    ///
    /// # Errors
    /// Propagates the panel validation from [`DataPolicy::add_data`], plus
    /// [`SsmError::PredictorLengthMismatch`] if the predictor dimension
    /// disagrees with the regressions.
    pub fn add_data(&mut self, observation: TimeSeriesRegressionData) -> SsmResult<()> {
        if observation.predictors().len() != self.xdim() {
            return Err(SsmError::PredictorLengthMismatch {
                expected: self.xdim(),
                actual: observation.predictors().len(),
            });
        }
        self.data.add_data(observation)
    }

    /// Absorb another model's observations (same panel shape required).
    ///
    /// # Errors
    /// [`SsmError::DataTypeMismatch`] if the panels are incompatible.
    pub fn combine_data(&mut self, other: &StudentMvssModel) -> SsmResult<()> {
        self.data.combine_data(&other.data)
    }

    /// Register a shared state component.
    ///
    /// # Errors
    /// See [`StateManager::add_shared_state`].
    pub fn add_state(&mut self, component: StateComponent) -> SsmResult<()> {
        self.manager.add_shared_state(component)
    }

    /// Register a private state component for one series.
    ///
    /// # Errors
    /// See [`StateManager::add_series_specific_state`].
    pub fn add_series_specific_state(
        &mut self, component: StateComponent, series: usize,
    ) -> SsmResult<()> {
        self.manager.add_series_specific_state(component, series)
    }

    /// The state manager (registration order, offsets, handles).
    pub fn state_manager(&self) -> &StateManager {
        &self.manager
    }

    /// One series' regression observation model.
    pub fn regression(&self, series: usize) -> &StudentRegression {
        &self.regressions[series]
    }

    /// The panel data policy.
    pub fn data(&self) -> &DataPolicy {
        &self.data
    }

    /// Which series are observed at `t`.
    pub fn observed_status(&self, t: usize) -> &ObservedMask {
        self.data.observed(t)
    }

    /// Override the observed mask at `t` (holdout evaluation).
    ///
    /// # Errors
    /// See [`DataPolicy::set_observed_status`].
    pub fn set_observed_status(&mut self, t: usize, status: ObservedMask) -> SsmResult<()> {
        self.data.set_observed_status(t, status)
    }

    /// The currently imputed shared state path
    /// (`shared_state_dimension x time_dimension`).
    pub fn shared_state(&self) -> ArrayView2<'_, f64> {
        self.shared_state.view()
    }

    /// The currently imputed private state path for one series.
    pub fn series_state(&self, series: usize) -> ArrayView2<'_, f64> {
        self.manager.series_specific_model(series).state()
    }

    /// Marginal contribution of shared component `index`, replayed through
    /// the current shared state path (`nseries x time_dimension`).
    pub fn state_contributions(&self, index: usize) -> Array2<f64> {
        self.manager.state_contributions(index, self.shared_state.view())
    }

    /// The private-state contribution for one cell.
    pub fn series_specific_state_contribution(&self, series: usize, time: usize) -> f64 {
        self.manager.series_specific_state_contribution(series, time)
    }

    /// Diagonal conditional observation variance for the observed rows at
    /// `t`, rebuilt from the current weights: `sigsq_j / w_jt`.
    pub fn observation_variance(&self, t: usize, observed: &ObservedMask) -> Array2<f64> {
        let rows = observed.observed_indices();
        let mut out = Array2::<f64>::zeros((rows.len(), rows.len()));
        for (r, &series) in rows.iter().enumerate() {
            out[(r, r)] = self.regressions[series].conditional_variance(self.data.weight(series, t));
        }
        out
    }

    /// Regression contribution `x'beta` per cell (`nseries x time`), zero
    /// where unobserved.
    pub fn regression_contribution(&self) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((self.nseries(), self.time_dimension()));
        for point in self.data.iter() {
            out[(point.series(), point.timestamp())] =
                self.regressions[point.series()].predict(point.predictors());
        }
        out
    }

    /// Series-specific state contribution per cell (`nseries x time`).
    pub fn series_specific_contribution(&self) -> Array2<f64> {
        let time_dimension = self.time_dimension();
        let mut out = Array2::<f64>::zeros((self.nseries(), time_dimension));
        for series in 0..self.nseries() {
            for t in 0..time_dimension {
                out[(series, t)] = self.manager.series_specific_state_contribution(series, t);
            }
        }
        out
    }

    /// Shared state contribution per cell, replayed from the current path.
    pub fn shared_state_contribution(&self) -> Array2<f64> {
        self.manager.shared_state_contribution(self.shared_state.view())
    }

    /// One full state-imputation sweep: weights, shared state given the
    /// series-specific state, series-specific state given the shared state.
    ///
    /// # Errors
    /// - [`SsmError::NoStateComponents`] if no shared component was
    ///   registered.
    /// - Numerical failures from the embedded Kalman passes.
    pub fn impute_state<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        if self.manager.number_of_shared_components() == 0 {
            return Err(SsmError::NoStateComponents);
        }
        let time_dimension = self.time_dimension();
        self.manager.observe_time_dimension(time_dimension);
        self.resize_state(time_dimension);

        self.impute_student_weights(rng)?;
        self.impute_shared_state_given_series_state(rng)?;
        self.impute_series_state_given_shared_state(rng)?;
        Ok(())
    }

    /// One Gibbs sweep over every model parameter given the current states
    /// and weights.
    ///
    /// # Errors
    /// Propagates conjugate-draw failures.
    pub fn draw_parameters<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        for index in 0..self.manager.number_of_shared_components() {
            let offset = self.manager.shared_offset(index);
            let handle = self.manager.shared_state_model(index);
            let dim = handle.borrow().state_dimension();
            handle
                .borrow_mut()
                .draw_parameters(rng, self.shared_state.slice(s![offset..offset + dim, ..]))?;
        }
        for series in 0..self.nseries() {
            let proxy = self.manager.series_specific_model(series);
            let mut offset = 0;
            for handle in proxy.components().to_vec() {
                let dim = handle.borrow().state_dimension();
                let block = proxy.state().slice(s![offset..offset + dim, ..]).to_owned();
                handle.borrow_mut().draw_parameters(rng, block.view())?;
                offset += dim;
            }
        }
        self.draw_regression_parameters(rng)
    }

    /// Maximum likelihood estimation is not part of this model's sampling
    /// surface.
    ///
    /// # Errors
    /// Always [`SsmError::NotImplemented`].
    pub fn mle(&mut self) -> SsmResult<f64> {
        Err(SsmError::NotImplemented {
            what: "maximum likelihood estimation for the Student state-space model",
        })
    }

    /// Gaussian log likelihood of the shared filter on the adjusted
    /// observations, conditional on the current weights and
    /// series-specific state.
    ///
    /// # Errors
    /// Numerical failures from the filter pass.
    pub fn log_likelihood(&mut self) -> SsmResult<f64> {
        let regression = self.regression_contribution();
        let series_specific = self.series_specific_contribution();
        self.data.isolate_shared_state(&regression, &series_specific)?;
        let system = SharedSystem {
            data: &self.data,
            manager: &self.manager,
            regressions: &self.regressions,
        };
        kalman::log_likelihood(&system)
    }

    /// Simulate `horizon` periods ahead for every series.
    ///
    /// `predictors` holds `nseries * horizon` rows (time-major,
    /// series-minor) of width `xdim`. Returns an `nseries x horizon` panel
    /// of simulated responses.
    ///
    /// # Errors
    /// - [`SsmError::DimensionMismatch`] on a predictor shape mismatch.
    /// - Numerical failures from the forecast propagation.
    pub fn simulate_forecast<R: Rng>(
        &self, rng: &mut R, horizon: usize, predictors: ArrayView2<'_, f64>,
    ) -> SsmResult<Array2<f64>> {
        crate::statespace::forecast::simulate_forecast(rng, self, horizon, predictors)
    }

    fn resize_state(&mut self, time_dimension: usize) {
        let dim = self.manager.shared_state_dimension();
        if self.shared_state.nrows() != dim || self.shared_state.ncols() != time_dimension {
            self.shared_state = Array2::zeros((dim, time_dimension));
        }
        for series in 0..self.nseries() {
            self.manager.series_specific_model_mut(series).resize_state(time_dimension);
        }
    }

    fn impute_student_weights<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        let regression = self.regression_contribution();
        let shared = self.shared_state_contribution();
        let series_specific = self.series_specific_contribution();
        for index in 0..self.data.ndata() {
            let (series, time, response) = {
                let point = self.data.data_point(index);
                (point.series(), point.timestamp(), point.response())
            };
            if !self.data.observed(time).is_observed(series) {
                continue;
            }
            let residual = response
                - regression[(series, time)]
                - shared[(series, time)]
                - series_specific[(series, time)];
            let weight = draw_student_weight(
                rng,
                residual,
                self.regressions[series].sigsq(),
                self.regressions[series].nu(),
            )?;
            self.data.data_point_mut(index).set_weight(weight);
        }
        Ok(())
    }

    fn impute_shared_state_given_series_state<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        let regression = self.regression_contribution();
        let series_specific = self.series_specific_contribution();
        self.data.isolate_shared_state(&regression, &series_specific)?;
        let draw = {
            let system = SharedSystem {
                data: &self.data,
                manager: &self.manager,
                regressions: &self.regressions,
            };
            kalman::simulate_posterior_state(rng, &system)?
        };
        self.shared_state = draw;
        Ok(())
    }

    fn impute_series_state_given_shared_state<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        if !self.manager.has_series_specific_state() {
            return Ok(());
        }
        let regression = self.regression_contribution();
        let shared = self.shared_state_contribution();
        self.data.isolate_series_specific_state(&regression, &shared)?;
        for series in 0..self.nseries() {
            if !self.manager.series_specific_model(series).has_state() {
                continue;
            }
            let draw = {
                let system = SeriesSystem {
                    data: &self.data,
                    proxy: self.manager.series_specific_model(series),
                    regression: &self.regressions[series],
                    series,
                };
                kalman::simulate_posterior_state(rng, &system)?
            };
            self.manager.series_specific_model_mut(series).set_state(draw);
        }
        Ok(())
    }

    fn draw_regression_parameters<R: Rng>(&mut self, rng: &mut R) -> SsmResult<()> {
        let shared = self.shared_state_contribution();
        let series_specific = self.series_specific_contribution();
        let xdim = self.xdim();
        for series in 0..self.nseries() {
            let mut design_rows = Vec::new();
            let mut responses = Vec::new();
            let mut weights = Vec::new();
            for point in self.data.iter() {
                if point.series() != series
                    || !self.data.observed(point.timestamp()).is_observed(series)
                {
                    continue;
                }
                let t = point.timestamp();
                design_rows.extend(point.predictors().iter().copied());
                responses.push(point.response() - shared[(series, t)] - series_specific[(series, t)]);
                weights.push(point.weight());
            }
            let n = responses.len();
            let design = Array2::from_shape_vec((n, xdim), design_rows).map_err(|_| {
                SsmError::DimensionMismatch {
                    what: "regression design assembly",
                    expected: n * xdim,
                    actual: 0,
                }
            })?;
            self.regressions[series].draw_parameters(
                rng,
                design.view(),
                Array1::from_vec(responses).view(),
                Array1::from_vec(weights).view(),
            )?;
        }
        Ok(())
    }
}

/// The shared-state system: observed rows across all series per period.
struct SharedSystem<'a> {
    data: &'a DataPolicy,
    manager: &'a StateManager,
    regressions: &'a [StudentRegression],
}

impl StateSpace for SharedSystem<'_> {
    fn time_dimension(&self) -> usize {
        self.data.time_dimension()
    }
    fn state_dimension(&self) -> usize {
        self.manager.shared_state_dimension()
    }
    fn transition(&self, t: usize) -> Array2<f64> {
        self.manager.shared_transition(t)
    }
    fn state_error_variance(&self, t: usize) -> Array2<f64> {
        self.manager.shared_state_error_variance(t)
    }
    fn observation_matrix(&self, t: usize) -> Array2<f64> {
        self.manager.observation_coefficients(t, self.data.observed(t))
    }
    fn observation_variance(&self, t: usize) -> Array2<f64> {
        let rows = self.data.observed(t).observed_indices();
        let mut out = Array2::<f64>::zeros((rows.len(), rows.len()));
        for (r, &series) in rows.iter().enumerate() {
            out[(r, r)] =
                self.regressions[series].conditional_variance(self.data.weight(series, t));
        }
        out
    }
    fn observation(&self, t: usize) -> Array1<f64> {
        let adjusted = self.data.adjusted_observation(t);
        self.data
            .observed(t)
            .observed_indices()
            .into_iter()
            .map(|series| adjusted[series])
            .collect()
    }
    fn initial_mean(&self) -> Array1<f64> {
        self.manager.shared_initial_mean()
    }
    fn initial_variance(&self) -> Array2<f64> {
        self.manager.shared_initial_variance()
    }
}

/// One series' scalar system over its private components.
struct SeriesSystem<'a> {
    data: &'a DataPolicy,
    proxy: &'a crate::statespace::core::manager::SeriesProxy,
    regression: &'a StudentRegression,
    series: usize,
}

impl StateSpace for SeriesSystem<'_> {
    fn time_dimension(&self) -> usize {
        self.data.time_dimension()
    }
    fn state_dimension(&self) -> usize {
        self.proxy.state_dimension()
    }
    fn transition(&self, t: usize) -> Array2<f64> {
        composite_transition(self.proxy.components(), t)
    }
    fn state_error_variance(&self, t: usize) -> Array2<f64> {
        composite_state_error_variance(self.proxy.components(), t)
    }
    fn observation_matrix(&self, t: usize) -> Array2<f64> {
        if self.data.observed(t).is_observed(self.series) {
            self.proxy.observation_row(t).insert_axis(ndarray::Axis(0))
        } else {
            Array2::zeros((0, self.proxy.state_dimension()))
        }
    }
    fn observation_variance(&self, t: usize) -> Array2<f64> {
        if self.data.observed(t).is_observed(self.series) {
            let w = self.data.weight(self.series, t);
            Array2::from_elem((1, 1), self.regression.conditional_variance(w))
        } else {
            Array2::zeros((0, 0))
        }
    }
    fn observation(&self, t: usize) -> Array1<f64> {
        if self.data.observed(t).is_observed(self.series) {
            Array1::from_elem(1, self.data.adjusted_value(self.series, t))
        } else {
            Array1::zeros(0)
        }
    }
    fn initial_mean(&self) -> Array1<f64> {
        composite_initial_mean(self.proxy.components())
    }
    fn initial_variance(&self) -> Array2<f64> {
        composite_initial_variance(self.proxy.components())
    }
}

impl Vectorize for StudentMvssModel {
    fn parameter_count(&self, minimal: bool) -> usize {
        let mut count = 0;
        for index in 0..self.manager.number_of_shared_components() {
            count += self.manager.shared_state_model(index).borrow().parameter_count(minimal);
        }
        for series in 0..self.nseries() {
            for handle in self.manager.series_specific_model(series).components() {
                count += handle.borrow().parameter_count(minimal);
            }
            count += self.regressions[series].parameter_count(minimal);
        }
        count
    }

    fn vectorize(&self, minimal: bool) -> Array1<f64> {
        let mut out = Vec::with_capacity(self.parameter_count(minimal));
        for index in 0..self.manager.number_of_shared_components() {
            out.extend(
                self.manager
                    .shared_state_model(index)
                    .borrow()
                    .vectorize(minimal)
                    .iter()
                    .copied(),
            );
        }
        for series in 0..self.nseries() {
            for handle in self.manager.series_specific_model(series).components() {
                out.extend(handle.borrow().vectorize(minimal).iter().copied());
            }
            out.extend(self.regressions[series].vectorize(minimal).iter().copied());
        }
        Array1::from_vec(out)
    }

    fn unvectorize(&mut self, v: ArrayView1<'_, f64>, minimal: bool) -> SsmResult<()> {
        self.check_vector_length(v, minimal)?;
        let mut cursor = 0;
        for index in 0..self.manager.number_of_shared_components() {
            let handle = self.manager.shared_state_model(index);
            let count = handle.borrow().parameter_count(minimal);
            handle
                .borrow_mut()
                .unvectorize(v.slice(s![cursor..cursor + count]), minimal)?;
            cursor += count;
        }
        for series in 0..self.nseries() {
            let handles = self.manager.series_specific_model(series).components().to_vec();
            for handle in handles {
                let count = handle.borrow().parameter_count(minimal);
                handle
                    .borrow_mut()
                    .unvectorize(v.slice(s![cursor..cursor + count]), minimal)?;
                cursor += count;
            }
            let count = self.regressions[series].parameter_count(minimal);
            self.regressions[series]
                .unvectorize(v.slice(s![cursor..cursor + count]), minimal)?;
            cursor += count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_rng;
    use crate::statespace::core::component::{LocalLevelComponent, VariancePrior};
    use crate::statespace::core::regression::RegressionPrior;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Model assembly validation and data-entry checks.
    // - The impute_state sweep's structural effects: weights land on data
    //   points, state paths take the right shapes, missing cells stay at
    //   weight 1.
    // - Conditional observation variance arithmetic.
    // - Vectorize over the composite parameter set.
    //
    // They intentionally DO NOT cover:
    // - Posterior correctness over many sweeps (the integration test owns
    //   that).
    // -------------------------------------------------------------------------

    fn regression() -> StudentRegression {
        StudentRegression::new(
            4.0,
            RegressionPrior::diffuse(1, 1e-4).expect("valid prior"),
            VariancePrior::new(1.0, 1.0).expect("valid prior"),
        )
        .expect("valid regression")
    }

    fn level() -> StateComponent {
        StateComponent::LocalLevel(
            LocalLevelComponent::new(
                0.5,
                0.0,
                4.0,
                VariancePrior::new(1.0, 1.0).expect("valid prior"),
            )
            .expect("valid component"),
        )
    }

    fn two_series_model() -> StudentMvssModel {
        let mut model =
            StudentMvssModel::new(vec![regression(), regression()]).expect("valid assembly");
        let mut shared = level();
        shared.set_loadings(array![1.0, 0.8]).expect("finite loadings");
        model.add_state(shared).expect("valid registration");
        for t in 0..6 {
            for series in 0..2 {
                if series == 1 && t == 3 {
                    continue; // one missing cell
                }
                let y = t as f64 * 0.5 + series as f64;
                model
                    .add_data(
                        TimeSeriesRegressionData::new(y, array![1.0], series, t)
                            .expect("finite response should construct"),
                    )
                    .expect("valid observation");
            }
        }
        model
    }

    #[test]
    // Purpose
    // -------
    // Assembly validation catches empty panels, ragged predictor
    // dimensions, and predictor mismatches at data entry.
    //
    // Given
    // -----
    // - No regressions; regressions of widths 1 and 1 with a width-2 data
    //   point.
    //
    // Expect
    // ------
    // - InvalidOption, then PredictorLengthMismatch.
    fn assembly_validation() {
        assert!(matches!(
            StudentMvssModel::new(Vec::new()),
            Err(SsmError::InvalidOption { .. })
        ));
        let mut model = StudentMvssModel::new(vec![regression()]).expect("valid assembly");
        assert!(matches!(
            model.add_data(
                TimeSeriesRegressionData::new(1.0, array![1.0, 2.0], 0, 0)
                    .expect("finite response should construct")
            ),
            Err(SsmError::PredictorLengthMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    // Purpose
    // -------
    // impute_state without any shared component is an error, not a
    // silent no-op.
    //
    // Given
    // -----
    // - A model with data but no registered state.
    //
    // Expect
    // ------
    // - NoStateComponents.
    fn impute_requires_state() {
        let mut model = StudentMvssModel::new(vec![regression()]).expect("valid assembly");
        model
            .add_data(
                TimeSeriesRegressionData::new(1.0, array![1.0], 0, 0)
                    .expect("finite response should construct"),
            )
            .expect("valid observation");
        let mut rng = seed_rng(5);
        assert!(matches!(model.impute_state(&mut rng), Err(SsmError::NoStateComponents)));
    }

    #[test]
    // Purpose
    // -------
    // One sweep produces a shared state path of the right shape, redraws
    // observed weights, and leaves the missing cell's weight at 1.
    //
    // Given
    // -----
    // - The 2-series fixture with one missing cell at (1, 3).
    //
    // Expect
    // ------
    // - Shared state is 1 x 6; every observed weight is positive and at
    //   least one moved off 1; weight(1, 3) stays exactly 1.
    fn impute_state_sweep_structure() {
        let mut model = two_series_model();
        let mut rng = seed_rng(8);
        model.impute_state(&mut rng).expect("sweep succeeds");

        assert_eq!(model.shared_state().shape(), &[1, 6]);
        assert_eq!(model.data().weight(1, 3), 1.0);
        let mut moved = false;
        for point in model.data().iter() {
            assert!(point.weight() > 0.0);
            if (point.weight() - 1.0).abs() > 1e-12 {
                moved = true;
            }
        }
        assert!(moved, "no weight was redrawn");
    }

    #[test]
    // Purpose
    // -------
    // Conditional observation variance divides sigsq by the cell weight
    // and drops unobserved rows.
    //
    // Given
    // -----
    // - The fixture at t = 3 (series 1 missing), with a hand-set weight
    //   0.25 on the observed cell.
    //
    // Expect
    // ------
    // - A 1x1 matrix equal to sigsq / 0.25.
    fn observation_variance_uses_weights() {
        let mut model = two_series_model();
        let index = model.data().data_index(0, 3).expect("cell exists");
        model.data.data_point_mut(index).set_weight(0.25);
        let mask = model.observed_status(3).clone();
        assert_eq!(mask.count_observed(), 1);
        let variance = model.observation_variance(3, &mask);
        assert_eq!(variance.shape(), &[1, 1]);
        let sigsq = model.regression(0).sigsq();
        assert!((variance[(0, 0)] - sigsq / 0.25).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // The composite parameter vector concatenates shared components,
    // series components, and regressions in a stable order and round
    // trips.
    //
    // Given
    // -----
    // - The fixture (1 shared level, 2 regressions with 1 predictor).
    //
    // Expect
    // ------
    // - Minimal count 1 + 2 * 2 = 5; round trip reproduces the vector.
    fn vectorize_concatenates_composite() {
        let mut model = two_series_model();
        assert_eq!(model.parameter_count(true), 5);
        let v = model.vectorize(true);
        model.unvectorize(v.view(), true).expect("own vector is valid");
        assert_eq!(model.vectorize(true), v);
    }

    #[test]
    // Purpose
    // -------
    // The likelihood surface is usable after a sweep and unimplemented
    // estimation paths fail loudly.
    //
    // Given
    // -----
    // - The fixture after one impute_state sweep.
    //
    // Expect
    // ------
    // - log_likelihood returns a finite value; mle returns NotImplemented.
    fn likelihood_and_mle_surface() {
        let mut model = two_series_model();
        let mut rng = seed_rng(13);
        model.impute_state(&mut rng).expect("sweep succeeds");
        let loglik = model.log_likelihood().expect("filter succeeds");
        assert!(loglik.is_finite());
        assert!(matches!(model.mle(), Err(SsmError::NotImplemented { .. })));
    }
}
