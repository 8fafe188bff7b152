//! Kalman filtering, disturbance smoothing, and posterior state simulation.
//!
//! Purpose
//! -------
//! The single recursion engine behind both the shared multivariate update
//! and the per-series scalar update: forward filter with row-dropping for
//! partially observed periods, the Durbin-Koopman backward `r`/`N`
//! recursions (smoothed state and disturbance moments), the fast state
//! smoother built on them, and the mean-correction simulation smoother
//! that turns the smoother into a posterior draw of the full state path.
//!
//! Key behaviors
//! -------------
//! - A period with no observed rows performs a pure prediction step and
//!   contributes nothing to the log likelihood.
//! - The simulation smoother is the Durbin-Koopman (2002) mean-correction
//!   scheme: simulate an unconditional path, smooth both the simulated and
//!   the actual observations, and correct.
//!
//! Invariants & assumptions
//! ------------------------
//! - The [`StateSpace`] provider returns, for each period, only the rows of
//!   `y`, `Z`, and `H` that are actually observed; row counts must agree
//!   within a period.
//! - Innovation-variance matrices may be singular (deterministic state
//!   blocks); forecast-variance matrices `F` must be strictly positive
//!   definite, and a failure there is a hard error, never papered over
//!   with jitter.
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::statespace::core::linalg::{
    cholesky, cholesky_log_det, cholesky_solve, cholesky_solve_mat, draw_mvn, psd_cholesky,
    symmetrize,
};
use crate::statespace::errors::SsmResult;

/// The time-varying system matrices one Kalman pass needs.
///
/// `observation`, `observation_matrix`, and `observation_variance` are
/// already restricted to the observed rows of period `t`; an empty period
/// returns zero-row structures.
pub trait StateSpace {
    /// Number of periods.
    fn time_dimension(&self) -> usize;
    /// State dimension.
    fn state_dimension(&self) -> usize;
    /// Transition matrix `T_t` (maps state at `t` to state at `t + 1`).
    fn transition(&self, t: usize) -> Array2<f64>;
    /// Innovation variance `R Q R'` at `t`.
    fn state_error_variance(&self, t: usize) -> Array2<f64>;
    /// Observed rows of the coefficient matrix `Z_t`.
    fn observation_matrix(&self, t: usize) -> Array2<f64>;
    /// Observed-row observation variance `H_t`.
    fn observation_variance(&self, t: usize) -> Array2<f64>;
    /// Observed entries of `y_t`.
    fn observation(&self, t: usize) -> Array1<f64>;
    /// Initial state mean `a_1`.
    fn initial_mean(&self) -> Array1<f64>;
    /// Initial state variance `P_1`.
    fn initial_variance(&self) -> Array2<f64>;
}

/// Per-period filter quantities the smoothers replay.
struct FilterStep {
    /// Predicted state mean `a_t`.
    predicted_mean: Array1<f64>,
    /// Predicted state variance `P_t`.
    predicted_variance: Array2<f64>,
    /// One-step prediction error `v_t` (observed rows).
    innovation: Array1<f64>,
    /// `F_t^{-1} v_t`.
    scaled_innovation: Array1<f64>,
    /// `Z_t' F_t^{-1}` (transposed for the backward pass).
    weighted_coefficients: Array2<f64>,
    /// `Z_t' F_t^{-1} Z_t`, the per-period information increment.
    information: Array2<f64>,
    /// `L_t = T_t - K_t Z_t`.
    l_matrix: Array2<f64>,
}

/// Output of one forward filter pass.
pub struct KalmanFilterOutput {
    steps: Vec<FilterStep>,
    loglik: f64,
    /// State mean after the final update, `a_{T+1}`.
    final_mean: Array1<f64>,
    /// State variance after the final update, `P_{T+1}`.
    final_variance: Array2<f64>,
}

impl KalmanFilterOutput {
    /// The accumulated Gaussian log likelihood.
    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    /// One-step-ahead state mean past the sample, `a_{T+1}`.
    pub fn final_state_mean(&self) -> &Array1<f64> {
        &self.final_mean
    }

    /// One-step-ahead state variance past the sample, `P_{T+1}`.
    pub fn final_state_variance(&self) -> &Array2<f64> {
        &self.final_variance
    }
}

/// Run the forward filter over the whole sample.
///
/// # Errors
/// [`crate::statespace::errors::SsmError::NotPositiveDefinite`] or
/// [`crate::statespace::errors::SsmError::CholeskyFailed`] when a forecast
/// variance `F_t` fails to factor.
pub fn filter<M: StateSpace>(model: &M) -> SsmResult<KalmanFilterOutput> {
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();
    let mut mean = model.initial_mean();
    let mut variance = model.initial_variance();
    let mut steps = Vec::with_capacity(time_dimension);
    let mut loglik = 0.0;

    for t in 0..time_dimension {
        let transition = model.transition(t);
        let z = model.observation_matrix(t);
        let nobs = z.nrows();

        if nobs == 0 {
            // Pure prediction when the period is entirely missing.
            let next_mean = transition.dot(&mean);
            let mut next_variance =
                transition.dot(&variance).dot(&transition.t()) + &model.state_error_variance(t);
            symmetrize(&mut next_variance);
            steps.push(FilterStep {
                predicted_mean: mean,
                predicted_variance: variance,
                innovation: Array1::zeros(0),
                scaled_innovation: Array1::zeros(0),
                weighted_coefficients: Array2::zeros((dim, 0)),
                information: Array2::zeros((dim, dim)),
                l_matrix: transition,
            });
            mean = next_mean;
            variance = next_variance;
            continue;
        }

        let y = model.observation(t);
        let h = model.observation_variance(t);
        let innovation = &y - &z.dot(&mean);

        let mut forecast_variance = z.dot(&variance).dot(&z.t()) + &h;
        symmetrize(&mut forecast_variance);
        let forecast_chol = cholesky(forecast_variance.view(), "kalman forecast variance")?;
        let scaled_innovation = cholesky_solve(forecast_chol.view(), innovation.view());
        // Z' F^{-1}, assembled as (F^{-1} Z)'.
        let weighted_coefficients = cholesky_solve_mat(forecast_chol.view(), z.view())
            .t()
            .to_owned();
        let information = weighted_coefficients.dot(&z);

        loglik -= 0.5
            * (nobs as f64 * (2.0 * PI).ln()
                + cholesky_log_det(forecast_chol.view())
                + innovation.dot(&scaled_innovation));

        // K = T P Z' F^{-1}; L = T - K Z.
        let gain = transition.dot(&variance).dot(&weighted_coefficients);
        let l_matrix = &transition - &gain.dot(&z);

        let next_mean = transition.dot(&mean) + gain.dot(&innovation);
        let mut next_variance =
            transition.dot(&variance).dot(&l_matrix.t()) + &model.state_error_variance(t);
        symmetrize(&mut next_variance);

        steps.push(FilterStep {
            predicted_mean: mean,
            predicted_variance: variance,
            innovation,
            scaled_innovation,
            weighted_coefficients,
            information,
            l_matrix,
        });
        mean = next_mean;
        variance = next_variance;
    }

    Ok(KalmanFilterOutput { steps, loglik, final_mean: mean, final_variance: variance })
}

/// The Gaussian log likelihood of the sample under the model.
pub fn log_likelihood<M: StateSpace>(model: &M) -> SsmResult<f64> {
    Ok(filter(model)?.loglik())
}

/// Backward `r` recursion feeding the fast state smoother: returns
/// `r_{t-1}` for each `t` (so slot `t` is the value entering period `t`).
fn backward_r<M: StateSpace>(model: &M, filtered: &KalmanFilterOutput) -> Vec<Array1<f64>> {
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();
    let mut r = Array1::<f64>::zeros(dim);
    let mut r_entering = vec![Array1::<f64>::zeros(dim); time_dimension];
    for t in (0..time_dimension).rev() {
        let step = &filtered.steps[t];
        r = if step.innovation.is_empty() {
            step.l_matrix.t().dot(&r)
        } else {
            step.weighted_coefficients.dot(&step.scaled_innovation) + step.l_matrix.t().dot(&r)
        };
        r_entering[t] = r.clone();
    }
    r_entering
}

/// Smoothed state means `E[alpha_t | y]`, one column per period, via the
/// Durbin-Koopman fast state smoother.
///
/// # Errors
/// Propagates filter failures.
pub fn smooth_states<M: StateSpace>(model: &M) -> SsmResult<Array2<f64>> {
    let filtered = filter(model)?;
    Ok(smooth_states_with(model, &filtered))
}

fn smooth_states_with<M: StateSpace>(model: &M, filtered: &KalmanFilterOutput) -> Array2<f64> {
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();
    let r_entering = backward_r(model, filtered);
    let mut smoothed = Array2::<f64>::zeros((dim, time_dimension));
    if time_dimension == 0 {
        return smoothed;
    }

    // alpha_1 = a_1 + P_1 r_0, then alpha_{t+1} = T alpha_t + RQR' r_t.
    let mut alpha = &filtered.steps[0].predicted_mean
        + &filtered.steps[0].predicted_variance.dot(&r_entering[0]);
    smoothed.column_mut(0).assign(&alpha);
    for t in 1..time_dimension {
        alpha = model.transition(t - 1).dot(&alpha)
            + model.state_error_variance(t - 1).dot(&r_entering[t]);
        smoothed.column_mut(t).assign(&alpha);
    }
    smoothed
}

/// Backward `N` recursion, the variance companion of [`backward_r`]:
/// returns `N_{t-1}` for each `t` (so slot `t` is the value entering
/// period `t`).
fn backward_n<M: StateSpace>(model: &M, filtered: &KalmanFilterOutput) -> Vec<Array2<f64>> {
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();
    let mut n = Array2::<f64>::zeros((dim, dim));
    let mut n_entering = vec![Array2::<f64>::zeros((dim, dim)); time_dimension];
    for t in (0..time_dimension).rev() {
        let step = &filtered.steps[t];
        let mut next = &step.information + &step.l_matrix.t().dot(&n).dot(&step.l_matrix);
        symmetrize(&mut next);
        n = next;
        n_entering[t] = n.clone();
    }
    n_entering
}

/// Smoothed state variances `Var[alpha_t | y]`, one matrix per period:
/// `V_t = P_t - P_t N_{t-1} P_t`.
///
/// # Errors
/// Propagates filter failures.
pub fn smooth_state_variances<M: StateSpace>(model: &M) -> SsmResult<Vec<Array2<f64>>> {
    let filtered = filter(model)?;
    let n_entering = backward_n(model, &filtered);
    let mut out = Vec::with_capacity(filtered.steps.len());
    for (step, n) in filtered.steps.iter().zip(&n_entering) {
        let p = &step.predicted_variance;
        let mut v = p - &p.dot(n).dot(p);
        symmetrize(&mut v);
        out.push(v);
    }
    Ok(out)
}

/// Smoothed state-disturbance moments: the mean `RQR' r_t` moving the
/// state from period `t` to `t + 1` (one column per period) and its
/// variance `RQR' - RQR' N_t RQR'`.
///
/// # Errors
/// Propagates filter failures.
pub fn smooth_disturbances<M: StateSpace>(
    model: &M,
) -> SsmResult<(Array2<f64>, Vec<Array2<f64>>)> {
    let filtered = filter(model)?;
    let r_entering = backward_r(model, &filtered);
    let n_entering = backward_n(model, &filtered);
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();

    let mut means = Array2::<f64>::zeros((dim, time_dimension));
    let mut variances = Vec::with_capacity(time_dimension);
    // r_T and N_T are zero: the final disturbance is unconditioned by data.
    let final_r = Array1::<f64>::zeros(dim);
    let final_n = Array2::<f64>::zeros((dim, dim));
    for t in 0..time_dimension {
        let r = if t + 1 < time_dimension { &r_entering[t + 1] } else { &final_r };
        let n = if t + 1 < time_dimension { &n_entering[t + 1] } else { &final_n };
        let q = model.state_error_variance(t);
        means.column_mut(t).assign(&q.dot(r));
        let mut variance = &q - &q.dot(n).dot(&q);
        symmetrize(&mut variance);
        variances.push(variance);
    }
    Ok((means, variances))
}

/// Adapter swapping the observation sequence of a base model; everything
/// else delegates. Used by the simulation smoother to smooth the simulated
/// sample with the same system matrices.
struct ReplacedObservations<'a, M: StateSpace> {
    base: &'a M,
    observations: Vec<Array1<f64>>,
}

impl<M: StateSpace> StateSpace for ReplacedObservations<'_, M> {
    fn time_dimension(&self) -> usize {
        self.base.time_dimension()
    }
    fn state_dimension(&self) -> usize {
        self.base.state_dimension()
    }
    fn transition(&self, t: usize) -> Array2<f64> {
        self.base.transition(t)
    }
    fn state_error_variance(&self, t: usize) -> Array2<f64> {
        self.base.state_error_variance(t)
    }
    fn observation_matrix(&self, t: usize) -> Array2<f64> {
        self.base.observation_matrix(t)
    }
    fn observation_variance(&self, t: usize) -> Array2<f64> {
        self.base.observation_variance(t)
    }
    fn observation(&self, t: usize) -> Array1<f64> {
        self.observations[t].clone()
    }
    fn initial_mean(&self) -> Array1<f64> {
        self.base.initial_mean()
    }
    fn initial_variance(&self) -> Array2<f64> {
        self.base.initial_variance()
    }
}

/// Draw one state path from `p(alpha | y)` by mean correction: simulate an
/// unconditional `(alpha+, y+)`, smooth both samples, and return
/// `alpha+ - E[alpha | y+] + E[alpha | y]`.
///
/// # Errors
/// Propagates Cholesky failures from the unconditional simulation and the
/// two embedded filter passes.
pub fn simulate_posterior_state<M: StateSpace, R: Rng>(
    rng: &mut R, model: &M,
) -> SsmResult<Array2<f64>> {
    let time_dimension = model.time_dimension();
    let dim = model.state_dimension();

    // Unconditional draw of the state path and matching observations.
    let initial_chol = psd_cholesky(model.initial_variance().view(), "initial state variance")?;
    let mut state = draw_mvn(rng, model.initial_mean().view(), initial_chol.view());
    let mut simulated_states = Array2::<f64>::zeros((dim, time_dimension));
    let mut simulated_observations = Vec::with_capacity(time_dimension);
    for t in 0..time_dimension {
        simulated_states.column_mut(t).assign(&state);

        let z = model.observation_matrix(t);
        let nobs = z.nrows();
        let y = if nobs == 0 {
            Array1::zeros(0)
        } else {
            let h_chol = psd_cholesky(model.observation_variance(t).view(), "observation variance")?;
            let noise: Array1<f64> = (0..nobs).map(|_| rng.sample(StandardNormal)).collect();
            z.dot(&state) + h_chol.dot(&noise)
        };
        simulated_observations.push(y);

        let innovation_chol =
            psd_cholesky(model.state_error_variance(t).view(), "state innovation variance")?;
        let noise: Array1<f64> = (0..dim).map(|_| rng.sample(StandardNormal)).collect();
        state = model.transition(t).dot(&state) + innovation_chol.dot(&noise);
    }

    let surrogate = ReplacedObservations { base: model, observations: simulated_observations };
    let smoothed_actual = smooth_states(model)?;
    let smoothed_simulated = smooth_states(&surrogate)?;
    Ok(simulated_states - smoothed_simulated + smoothed_actual)
}
