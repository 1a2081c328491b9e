// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

pub use nalgebra;

#[allow(non_camel_case_types)]
pub type float = f64;
pub const INFINITY: float = f64::INFINITY;
pub const NEG_INFINITY: float = f64::NEG_INFINITY;
pub use std::f64::consts::PI;

use std::cmp::Ordering;

pub fn min<T: Copy + PartialOrd>(a: T, b: T) -> T {
    match a.partial_cmp(&b).expect("NaN") {
        Ordering::Greater => b,
        _ => a,
    }
}

pub fn max<T: Copy + PartialOrd>(a: T, b: T) -> T {
    match a.partial_cmp(&b).expect("NaN") {
        Ordering::Less => b,
        _ => a,
    }
}

pub fn randn() -> float {
    use rand::Rng;
    rand::thread_rng().sample(rand_distr::StandardNormal)
}

pub type Vector<D> = nalgebra::OVector<float, D>;
pub type VectorOf<T, D> = nalgebra::OVector<T, D>;
pub type Matrix<R, C> = nalgebra::OMatrix<float, R, C>;

pub use nalgebra::allocator::Allocator;
pub use nalgebra::storage::Owned;
pub use nalgebra::{DMatrix, DVector, DefaultAllocator, Dim, DimName, RealField, U1};

/// Bundles every allocator bound needed when working with a model's
/// state/input/output/parameter dimensions.
pub trait ModelDims<S: Dim, I: Dim, O: Dim, P: Dim>:
    Allocator<S>
    + Allocator<I>
    + Allocator<O>
    + Allocator<P>
    + Allocator<S, S>
    + Allocator<S, I>
    + Allocator<S, P>
    + Allocator<O, S>
    + Allocator<S, O>
    + Allocator<I, S>
{
}

impl<S, I, O, P> ModelDims<S, I, O, P> for DefaultAllocator
where
    S: Dim,
    I: Dim,
    O: Dim,
    P: Dim,
    DefaultAllocator: Allocator<S>
        + Allocator<I>
        + Allocator<O>
        + Allocator<P>
        + Allocator<S, S>
        + Allocator<S, I>
        + Allocator<S, P>
        + Allocator<O, S>
        + Allocator<S, O>
        + Allocator<I, S>,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max() {
        assert_eq!(min(1.0, 2.0), 1.0);
        assert_eq!(max(1.0, 2.0), 2.0);
        assert_eq!(min(-3, 7), -3);
    }
}
