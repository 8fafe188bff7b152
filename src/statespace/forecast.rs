//! Posterior-predictive simulation beyond the sample.
//!
//! Purpose
//! -------
//! Roll the model forward `horizon` periods from the final imputed state:
//! advance every shared and series-specific component with fresh innovation
//! noise, apply the regression effect for the supplied future predictors,
//! and add Student-t observation noise by drawing each cell's variance
//! weight from its prior.
//!
//! Conventions
//! -----------
//! - `predictors` is `(nseries * horizon) x xdim`, time-major and
//!   series-minor: row `h * nseries + s` belongs to series `s` at forecast
//!   step `h`.
//! - The returned panel is `nseries x horizon`.
//! - Forecasts condition on the current parameter and state draw; calling
//!   once per MCMC iteration yields posterior-predictive draws.
use ndarray::{Array1, Array2, ArrayView2, s};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::statespace::core::draws::draw_gamma;
use crate::statespace::core::manager::ComponentHandle;
use crate::statespace::errors::{SsmError, SsmResult};
use crate::statespace::models::student_mvss::StudentMvssModel;

/// Advance a composite state vector one period through its components.
fn advance_composite<R: Rng>(
    rng: &mut R, components: &[ComponentHandle], state: &Array1<f64>, t: usize,
) -> Array1<f64> {
    let mut next = Array1::<f64>::zeros(state.len());
    let mut offset = 0;
    for handle in components {
        let component = handle.borrow();
        let dim = component.state_dimension();
        let block = component.advance(rng, state.slice(s![offset..offset + dim]), t);
        next.slice_mut(s![offset..offset + dim]).assign(&block);
        offset += dim;
    }
    next
}

/// Simulate `horizon` future periods for every series. See the module docs
/// for the predictor layout.
///
/// # Errors
/// - [`SsmError::DimensionMismatch`] if `predictors` is not
///   `(nseries * horizon) x xdim`.
/// - Propagates draw failures from the Student weight prior.
pub fn simulate_forecast<R: Rng>(
    rng: &mut R, model: &StudentMvssModel, horizon: usize, predictors: ArrayView2<'_, f64>,
) -> SsmResult<Array2<f64>> {
    let nseries = model.nseries();
    let xdim = model.xdim();
    if predictors.nrows() != nseries * horizon {
        return Err(SsmError::DimensionMismatch {
            what: "forecast predictor rows",
            expected: nseries * horizon,
            actual: predictors.nrows(),
        });
    }
    if predictors.ncols() != xdim {
        return Err(SsmError::DimensionMismatch {
            what: "forecast predictor columns",
            expected: xdim,
            actual: predictors.ncols(),
        });
    }

    let manager = model.state_manager();
    let time_dimension = model.time_dimension();
    let shared = model.shared_state();

    // Starting points: the final imputed state, or the prior mean for an
    // empty sample.
    let mut shared_state = if time_dimension > 0 && shared.ncols() == time_dimension {
        shared.column(time_dimension - 1).to_owned()
    } else {
        manager.shared_initial_mean()
    };
    let mut series_states: Vec<Array1<f64>> = (0..nseries)
        .map(|series| {
            let proxy = manager.series_specific_model(series);
            let state = proxy.state();
            if time_dimension > 0 && state.ncols() == time_dimension {
                state.column(time_dimension - 1).to_owned()
            } else {
                Array1::zeros(proxy.state_dimension())
            }
        })
        .collect();

    let mut forecast = Array2::<f64>::zeros((nseries, horizon));
    for h in 0..horizon {
        let t = time_dimension + h;
        shared_state = advance_composite(rng, manager.shared_state_models(), &shared_state, t);
        for series in 0..nseries {
            let proxy = manager.series_specific_model(series);
            if proxy.has_state() {
                series_states[series] =
                    advance_composite(rng, proxy.components(), &series_states[series], t);
            }
        }

        for series in 0..nseries {
            let mut mean = 0.0;
            let mut offset = 0;
            for handle in manager.shared_state_models() {
                let component = handle.borrow();
                let dim = component.state_dimension();
                let z = component.observation_row(t);
                mean += component.loading(series)
                    * z.dot(&shared_state.slice(s![offset..offset + dim]));
                offset += dim;
            }
            let proxy = manager.series_specific_model(series);
            if proxy.has_state() {
                mean += proxy.observation_row(t).dot(&series_states[series]);
            }
            let regression = model.regression(series);
            mean += regression.predict(predictors.row(h * nseries + series));

            // Student-t noise as a scale mixture: w from its prior, then
            // Gaussian noise with variance sigsq / w.
            let nu = regression.nu();
            let weight = draw_gamma(rng, 0.5 * nu, 0.5 * nu)?;
            let noise: f64 = rng.sample(StandardNormal);
            forecast[(series, h)] = mean + noise * (regression.sigsq() / weight).sqrt();
        }
    }
    Ok(forecast)
}
