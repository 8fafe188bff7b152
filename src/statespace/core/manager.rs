//! Composite-state bookkeeping: shared components plus per-series proxies.
//!
//! Purpose
//! -------
//! Own the ordered collection of shared state components and, per observed
//! series, the private sub-collection driven by a scalar Kalman recursion.
//! Assemble the composite observation-coefficient operator for any subset of
//! observed series, expose block offsets, and reconstruct per-component
//! contributions to the fitted response.
//!
//! Key behaviors
//! -------------
//! - Registration is append-only; insertion order defines block offsets and
//!   is significant.
//! - `observation_coefficients(t, mask)` drops the rows of unobserved
//!   series; it never substitutes imputed rows.
//! - `observe_time_dimension` fans the (monotonic, idempotent) time signal
//!   out to every owned component.
//!
//! Invariants & assumptions
//! ------------------------
//! - The manager is the canonical owner of every component
//!   (`Rc<RefCell<…>>`); proxies own only their private component lists and
//!   never reach back into the manager.
//! - A shared component's loadings have length nseries (or 1, broadcast);
//!   series-specific components keep length-1 loadings.
use ndarray::{Array1, Array2, ArrayView2, s};
use std::cell::RefCell;
use std::rc::Rc;

use crate::statespace::core::component::StateComponent;
use crate::statespace::core::data::ObservedMask;
use crate::statespace::errors::{SsmError, SsmResult};

/// Shared handle to a state component; the manager holds the canonical copy.
pub type ComponentHandle = Rc<RefCell<StateComponent>>;

/// Block-diagonal transition matrix over an ordered component collection.
pub(crate) fn composite_transition(components: &[ComponentHandle], t: usize) -> Array2<f64> {
    let dim: usize = components.iter().map(|c| c.borrow().state_dimension()).sum();
    let mut out = Array2::<f64>::zeros((dim, dim));
    let mut offset = 0;
    for component in components {
        let component = component.borrow();
        let d = component.state_dimension();
        out.slice_mut(s![offset..offset + d, offset..offset + d])
            .assign(&component.transition(t));
        offset += d;
    }
    out
}

/// Block-diagonal innovation variance over an ordered component collection.
pub(crate) fn composite_state_error_variance(
    components: &[ComponentHandle], t: usize,
) -> Array2<f64> {
    let dim: usize = components.iter().map(|c| c.borrow().state_dimension()).sum();
    let mut out = Array2::<f64>::zeros((dim, dim));
    let mut offset = 0;
    for component in components {
        let component = component.borrow();
        let d = component.state_dimension();
        out.slice_mut(s![offset..offset + d, offset..offset + d])
            .assign(&component.state_error_variance(t));
        offset += d;
    }
    out
}

/// Concatenated initial-state mean over an ordered component collection.
pub(crate) fn composite_initial_mean(components: &[ComponentHandle]) -> Array1<f64> {
    let dim: usize = components.iter().map(|c| c.borrow().state_dimension()).sum();
    let mut out = Array1::<f64>::zeros(dim);
    let mut offset = 0;
    for component in components {
        let component = component.borrow();
        let d = component.state_dimension();
        out.slice_mut(s![offset..offset + d])
            .assign(&component.initial_state_mean());
        offset += d;
    }
    out
}

/// Block-diagonal initial-state variance over an ordered collection.
pub(crate) fn composite_initial_variance(components: &[ComponentHandle]) -> Array2<f64> {
    let dim: usize = components.iter().map(|c| c.borrow().state_dimension()).sum();
    let mut out = Array2::<f64>::zeros((dim, dim));
    let mut offset = 0;
    for component in components {
        let component = component.borrow();
        let d = component.state_dimension();
        out.slice_mut(s![offset..offset + d, offset..offset + d])
            .assign(&component.initial_state_variance());
        offset += d;
    }
    out
}

/// The private state of one observed series: its own component list and the
/// imputed state path the scalar Kalman recursion fills in.
#[derive(Debug, Clone)]
pub struct SeriesProxy {
    components: Vec<ComponentHandle>,
    state: Array2<f64>,
}

impl SeriesProxy {
    fn new() -> Self {
        Self { components: Vec::new(), state: Array2::zeros((0, 0)) }
    }

    /// Whether this series has any private state.
    pub fn has_state(&self) -> bool {
        !self.components.is_empty()
    }

    /// Total dimension of this series' private state.
    pub fn state_dimension(&self) -> usize {
        self.components.iter().map(|c| c.borrow().state_dimension()).sum()
    }

    /// The private components, in registration order.
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// The observation row mapping the private state to this series'
    /// response (loading 1 per the series-specific convention).
    pub fn observation_row(&self, t: usize) -> Array1<f64> {
        let mut row = Array1::<f64>::zeros(self.state_dimension());
        let mut offset = 0;
        for component in &self.components {
            let component = component.borrow();
            let d = component.state_dimension();
            let z = component.observation_row(t);
            for i in 0..d {
                row[offset + i] = component.loading(0) * z[i];
            }
            offset += d;
        }
        row
    }

    /// The imputed private state path (`state_dimension x time_dimension`).
    pub fn state(&self) -> ArrayView2<'_, f64> {
        self.state.view()
    }

    /// Replace the imputed private state path.
    pub fn set_state(&mut self, state: Array2<f64>) {
        self.state = state;
    }

    /// Grow (never shrink) the state buffer to the given time dimension.
    pub fn resize_state(&mut self, time_dimension: usize) {
        let dim = self.state_dimension();
        if self.state.nrows() != dim || self.state.ncols() < time_dimension {
            let mut fresh = Array2::<f64>::zeros((dim, time_dimension));
            let keep_cols = self.state.ncols().min(time_dimension);
            if self.state.nrows() == dim && keep_cols > 0 {
                fresh
                    .slice_mut(s![.., ..keep_cols])
                    .assign(&self.state.slice(s![.., ..keep_cols]));
            }
            self.state = fresh;
        }
    }

    /// This series' private-state contribution to its response at `time`.
    pub fn contribution(&self, time: usize) -> f64 {
        if !self.has_state() || time >= self.state.ncols() {
            return 0.0;
        }
        self.observation_row(time).dot(&self.state.column(time))
    }
}

/// Owner of the shared components and the per-series proxies.
#[derive(Debug, Clone)]
pub struct StateManager {
    nseries: usize,
    shared: Vec<ComponentHandle>,
    proxies: Vec<SeriesProxy>,
}

impl StateManager {
    /// Create a manager for `nseries` series with no components.
    pub fn new(nseries: usize) -> Self {
        Self { nseries, shared: Vec::new(), proxies: (0..nseries).map(|_| SeriesProxy::new()).collect() }
    }

    /// Append a shared component. Loadings of length 1 are broadcast to
    /// every series; otherwise they must have length nseries.
    ///
    /// # Errors
    /// [`SsmError::InvalidLoadingsLength`] on a loadings-length mismatch.
    pub fn add_shared_state(&mut self, component: StateComponent) -> SsmResult<()> {
        let nloadings = component.loadings().len();
        if nloadings != 1 && nloadings != self.nseries {
            return Err(SsmError::InvalidLoadingsLength {
                expected: self.nseries,
                actual: nloadings,
            });
        }
        self.shared.push(Rc::new(RefCell::new(component)));
        Ok(())
    }

    /// Append a private component to one series' proxy.
    ///
    /// # Errors
    /// - [`SsmError::SeriesIndexOutOfRange`] if `series >= nseries`.
    /// - [`SsmError::InvalidLoadingsLength`] if the component carries
    ///   multi-series loadings.
    pub fn add_series_specific_state(
        &mut self, component: StateComponent, series: usize,
    ) -> SsmResult<()> {
        if series >= self.nseries {
            return Err(SsmError::SeriesIndexOutOfRange { series, nseries: self.nseries });
        }
        if component.loadings().len() != 1 {
            return Err(SsmError::InvalidLoadingsLength {
                expected: 1,
                actual: component.loadings().len(),
            });
        }
        self.proxies[series].components.push(Rc::new(RefCell::new(component)));
        Ok(())
    }

    /// Number of series the manager was configured for.
    pub fn nseries(&self) -> usize {
        self.nseries
    }

    /// Number of shared components.
    pub fn number_of_shared_components(&self) -> usize {
        self.shared.len()
    }

    /// Total dimension of the shared state.
    pub fn shared_state_dimension(&self) -> usize {
        self.shared.iter().map(|c| c.borrow().state_dimension()).sum()
    }

    /// Dimension of one series' private state.
    pub fn series_state_dimension(&self, series: usize) -> usize {
        self.proxies[series].state_dimension()
    }

    /// Whether any proxy has private state.
    pub fn has_series_specific_state(&self) -> bool {
        self.proxies.iter().any(|p| p.has_state())
    }

    /// Handle to shared component `index` (registration order).
    pub fn shared_state_model(&self, index: usize) -> ComponentHandle {
        Rc::clone(&self.shared[index])
    }

    /// The shared component handles, in registration order.
    pub fn shared_state_models(&self) -> &[ComponentHandle] {
        &self.shared
    }

    /// The proxy for one series.
    pub fn series_specific_model(&self, series: usize) -> &SeriesProxy {
        &self.proxies[series]
    }

    /// Mutable proxy access (state imputation).
    pub fn series_specific_model_mut(&mut self, series: usize) -> &mut SeriesProxy {
        &mut self.proxies[series]
    }

    /// Offset of shared component `index` inside the composite state vector.
    pub fn shared_offset(&self, index: usize) -> usize {
        self.shared[..index].iter().map(|c| c.borrow().state_dimension()).sum()
    }

    /// The composite observation-coefficient operator at time `t` for the
    /// observed subset of series: one row per observed series (mask order),
    /// one column per shared state dimension. Series-specific contributions
    /// are deliberately left to the proxies.
    pub fn observation_coefficients(&self, t: usize, observed: &ObservedMask) -> Array2<f64> {
        let dim = self.shared_state_dimension();
        let rows = observed.observed_indices();
        let mut out = Array2::<f64>::zeros((rows.len(), dim));
        for (r, &series) in rows.iter().enumerate() {
            let mut offset = 0;
            for component in &self.shared {
                let component = component.borrow();
                let d = component.state_dimension();
                let z = component.observation_row(t);
                let loading = component.loading(series);
                for i in 0..d {
                    out[(r, offset + i)] = loading * z[i];
                }
                offset += d;
            }
        }
        out
    }

    /// Block-diagonal shared transition matrix at time `t`.
    pub fn shared_transition(&self, t: usize) -> Array2<f64> {
        composite_transition(&self.shared, t)
    }

    /// Block-diagonal shared innovation variance at time `t`.
    pub fn shared_state_error_variance(&self, t: usize) -> Array2<f64> {
        composite_state_error_variance(&self.shared, t)
    }

    /// Concatenated shared initial-state mean.
    pub fn shared_initial_mean(&self) -> Array1<f64> {
        composite_initial_mean(&self.shared)
    }

    /// Block-diagonal shared initial-state variance.
    pub fn shared_initial_variance(&self) -> Array2<f64> {
        composite_initial_variance(&self.shared)
    }

    /// Marginal contribution of shared component `index` to the fitted
    /// response: a `nseries x time` matrix replaying the imputed shared
    /// state through that component's own observation operator.
    pub fn state_contributions(
        &self, index: usize, shared_state: ArrayView2<'_, f64>,
    ) -> Array2<f64> {
        let time_dimension = shared_state.ncols();
        let offset = self.shared_offset(index);
        let component = self.shared[index].borrow();
        let d = component.state_dimension();
        let mut out = Array2::<f64>::zeros((self.nseries, time_dimension));
        for t in 0..time_dimension {
            let z = component.observation_row(t);
            let block = shared_state.slice(s![offset..offset + d, t]);
            let projected = z.dot(&block);
            for series in 0..self.nseries {
                out[(series, t)] = component.loading(series) * projected;
            }
        }
        out
    }

    /// The private-state contribution for one (series, time) cell.
    pub fn series_specific_state_contribution(&self, series: usize, time: usize) -> f64 {
        self.proxies[series].contribution(time)
    }

    /// All shared contributions summed: `nseries x time`.
    pub fn shared_state_contribution(&self, shared_state: ArrayView2<'_, f64>) -> Array2<f64> {
        let time_dimension = shared_state.ncols();
        let mut out = Array2::<f64>::zeros((self.nseries, time_dimension));
        for index in 0..self.shared.len() {
            out += &self.state_contributions(index, shared_state);
        }
        out
    }

    /// Propagate "at least `t` periods exist" to every owned component.
    pub fn observe_time_dimension(&mut self, t: usize) {
        for component in &self.shared {
            component.borrow_mut().observe_time_dimension(t);
        }
        for proxy in &mut self.proxies {
            for component in &proxy.components {
                component.borrow_mut().observe_time_dimension(t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statespace::core::component::{
        Ar1Component, CoefficientPrior, LocalLevelComponent, VariancePrior,
    };
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Registration validation (series bounds, loading lengths).
    // - Offset arithmetic and composite operator assembly under partial
    //   observation masks.
    // - Contribution reconstruction for a known state path.
    //
    // They intentionally DO NOT cover:
    // - Interplay with the Kalman engine (kalman/model tests).
    // -------------------------------------------------------------------------

    fn level_with_loadings(loadings: Array1<f64>) -> StateComponent {
        let mut c = StateComponent::LocalLevel(
            LocalLevelComponent::new(
                1.0,
                0.0,
                4.0,
                VariancePrior::new(1.0, 1.0).expect("valid prior"),
            )
            .expect("valid component"),
        );
        c.set_loadings(loadings).expect("finite loadings");
        c
    }

    fn ar1_component() -> StateComponent {
        StateComponent::Ar1(
            Ar1Component::new(
                0.5,
                1.0,
                VariancePrior::new(1.0, 1.0).expect("valid prior"),
                CoefficientPrior::new(0.0, 1.0).expect("valid prior"),
            )
            .expect("valid component"),
        )
    }

    #[test]
    // Purpose
    // -------
    // Registration rejects out-of-range series and bad loading lengths.
    //
    // Given
    // -----
    // - A 2-series manager; a shared component with 3 loadings; a private
    //   component aimed at series 5.
    //
    // Expect
    // ------
    // - InvalidLoadingsLength and SeriesIndexOutOfRange respectively.
    fn registration_validation() {
        let mut manager = StateManager::new(2);
        assert!(matches!(
            manager.add_shared_state(level_with_loadings(array![1.0, 1.0, 1.0])),
            Err(SsmError::InvalidLoadingsLength { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            manager.add_series_specific_state(ar1_component(), 5),
            Err(SsmError::SeriesIndexOutOfRange { series: 5, nseries: 2 })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Composite dimensions and offsets follow registration order.
    //
    // Given
    // -----
    // - Two shared scalar components and one private AR(1) on series 1.
    //
    // Expect
    // ------
    // - shared dimension 2, offsets 0 and 1, series dimensions 0 and 1.
    fn dimensions_and_offsets() {
        let mut manager = StateManager::new(2);
        manager
            .add_shared_state(level_with_loadings(array![1.0, 0.5]))
            .expect("valid registration");
        manager
            .add_shared_state(level_with_loadings(array![1.0]))
            .expect("broadcast loadings are valid");
        manager
            .add_series_specific_state(ar1_component(), 1)
            .expect("valid registration");

        assert_eq!(manager.shared_state_dimension(), 2);
        assert_eq!(manager.shared_offset(0), 0);
        assert_eq!(manager.shared_offset(1), 1);
        assert_eq!(manager.series_state_dimension(0), 0);
        assert_eq!(manager.series_state_dimension(1), 1);
        assert!(manager.has_series_specific_state());
    }

    #[test]
    // Purpose
    // -------
    // `observation_coefficients` drops unobserved rows and leaves observed
    // rows untouched (the partial-observation property at the operator
    // level).
    //
    // Given
    // -----
    // - A 2-series manager with one shared component, loadings [1.0, 0.5];
    //   a mask observing only series 1.
    //
    // Expect
    // ------
    // - Full mask: 2x1 operator [[1.0], [0.5]].
    // - Partial mask: 1x1 operator [[0.5]], identical to the full mask's
    //   surviving row.
    fn observation_coefficients_respect_mask() {
        let mut manager = StateManager::new(2);
        manager
            .add_shared_state(level_with_loadings(array![1.0, 0.5]))
            .expect("valid registration");

        let full = manager.observation_coefficients(0, &ObservedMask::all_observed(2));
        assert_eq!(full.shape(), &[2, 1]);
        assert_eq!(full[(0, 0)], 1.0);
        assert_eq!(full[(1, 0)], 0.5);

        let mut mask = ObservedMask::none_observed(2);
        mask.set(1, true);
        let partial = manager.observation_coefficients(0, &mask);
        assert_eq!(partial.shape(), &[1, 1]);
        assert_eq!(partial[(0, 0)], full[(1, 0)]);
    }

    #[test]
    // Purpose
    // -------
    // Contribution reconstruction replays a known state path through the
    // component's operator and loadings.
    //
    // Given
    // -----
    // - One shared level with loadings [1.0, 0.5] and a state path
    //   [[1, 2, 3]].
    //
    // Expect
    // ------
    // - Row 0 equals the path; row 1 equals half the path; the summed
    //   contribution matches since there is a single component.
    fn state_contributions_replay_path() {
        let mut manager = StateManager::new(2);
        manager
            .add_shared_state(level_with_loadings(array![1.0, 0.5]))
            .expect("valid registration");
        let path = array![[1.0, 2.0, 3.0]];

        let contribution = manager.state_contributions(0, path.view());
        assert_eq!(contribution.row(0).to_owned(), array![1.0, 2.0, 3.0]);
        assert_eq!(contribution.row(1).to_owned(), array![0.5, 1.0, 1.5]);
        assert_eq!(manager.shared_state_contribution(path.view()), contribution);
    }

    #[test]
    // Purpose
    // -------
    // The time-dimension signal reaches shared and private components and
    // stays monotonic.
    //
    // Given
    // -----
    // - A manager with one shared and one private component; observe 7 then
    //   4.
    //
    // Expect
    // ------
    // - Both components report 7 afterwards.
    fn observe_time_dimension_fans_out() {
        let mut manager = StateManager::new(1);
        manager
            .add_shared_state(level_with_loadings(array![1.0]))
            .expect("valid registration");
        manager
            .add_series_specific_state(ar1_component(), 0)
            .expect("valid registration");
        manager.observe_time_dimension(7);
        manager.observe_time_dimension(4);
        assert_eq!(manager.shared_state_model(0).borrow().time_dimension(), 7);
        assert_eq!(
            manager.series_specific_model(0).components()[0].borrow().time_dimension(),
            7
        );
    }
}
