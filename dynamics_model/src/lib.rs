// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

use prelude::*;

mod simple;
pub use simple::SimpleDrone;

mod drift;
pub use drift::DriftDrone;

mod inertia;
pub use inertia::InertiaDrone;

#[cfg(test)]
mod tests_util;

/// Continuous-time vehicle dynamics consumed by the estimation and control
/// problems. Dimensions are fixed at compile time; bounds are per-dimension.
pub trait DynamicsModel: Clone + Send + 'static
where
    DefaultAllocator: ModelDims<Self::NS, Self::NI, Self::NO, Self::NP>,
{
    type NS: DimName;
    type NI: DimName;
    type NO: DimName;
    type NP: DimName;

    fn new() -> Self
    where
        Self: Sized;

    fn name() -> &'static str
    where
        Self: Sized;

    /// Returns the state space derivative at a given operating point.
    ///
    /// Generic over the scalar type so the same equations can be evaluated
    /// under alternative numeric types used for derivatives.
    fn state_equation<T: RealField>(
        &self,
        x: &VectorOf<T, Self::NS>,
        u: &VectorOf<T, Self::NI>,
        p: &VectorOf<T, Self::NP>,
    ) -> VectorOf<T, Self::NS>;

    /// Maps a state to the quantities the tracking sensor reports.
    fn output_equation<T: RealField>(&self, x: &VectorOf<T, Self::NS>) -> VectorOf<T, Self::NO>;

    // Returns the jacobians of the state space system with respect to its
    // state and inputs
    fn linearise(
        &self,
        x0: &Vector<Self::NS>,
        u0: &Vector<Self::NI>,
        p0: &Vector<Self::NP>,
    ) -> (Matrix<Self::NS, Self::NS>, Matrix<Self::NS, Self::NI>);

    // Returns the jacobian of the state space system with respect to its
    // parameters
    fn linearise_parameters(
        &self,
        x0: &Vector<Self::NS>,
        u0: &Vector<Self::NI>,
        p0: &Vector<Self::NP>,
    ) -> Matrix<Self::NS, Self::NP>;

    /// Jacobian of the output map. All models here observe a prefix of the
    /// state directly, so this is a constant matrix.
    fn output_matrix(&self) -> Matrix<Self::NO, Self::NS>;

    /// Returns the minimum and maximum allowable parameter values.
    fn param_bounds(&self) -> (Vector<Self::NP>, Vector<Self::NP>);

    /// Returns the minimum and maximum allowable input values.
    fn input_bounds(&self) -> (Vector<Self::NI>, Vector<Self::NI>);

    /// One explicit Euler step. The estimation and control problems use the
    /// same discretisation as their dynamics residuals.
    fn step(
        &self,
        dt: float,
        x: &Vector<Self::NS>,
        u: &Vector<Self::NI>,
        p: &Vector<Self::NP>,
    ) -> Vector<Self::NS> {
        x + self.state_equation(x, u, p) * dt
    }

    /// Higher order integration for simulation plants.
    fn integrate(
        &self,
        dt: float,
        num_steps: u32,
        x: &Vector<Self::NS>,
        u: &Vector<Self::NI>,
        p: &Vector<Self::NP>,
    ) -> Vector<Self::NS> {
        rk4(dt, num_steps, x, |x| self.state_equation(x, u, p))
    }

    /// Rolls the state forward through a sequence of already-issued inputs,
    /// compensating for actuation delay before a control request is posted.
    fn predict_state<I>(
        &self,
        x0: &Vector<Self::NS>,
        inputs: I,
        p: &Vector<Self::NP>,
        dt: float,
    ) -> Vector<Self::NS>
    where
        I: IntoIterator<Item = Vector<Self::NI>>,
    {
        inputs
            .into_iter()
            .fold(x0.clone(), |x, u| self.step(dt, &x, &u, p))
    }
}

fn rk4<N: DimName, F>(dt: float, num_steps: u32, y_0: &Vector<N>, mut f: F) -> Vector<N>
where
    F: FnMut(&Vector<N>) -> Vector<N>,
    DefaultAllocator: Allocator<N>,
{
    let h = dt / float::from(num_steps);
    let mut y = y_0.clone();
    for _ in 0..num_steps {
        let k1 = f(&y) * h;
        let k2 = f(&(&y + 0.5 * &k1)) * h;
        let k3 = f(&(&y + 0.5 * &k2)) * h;
        let k4 = f(&(&y + &k3)) * h;
        y += (k1 + 2.0 * (k2 + k3) + k4) / 6.0;
    }
    y
}
