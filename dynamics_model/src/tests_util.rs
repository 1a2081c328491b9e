use prelude::*;

use crate::DynamicsModel;

/// Compares the analytic jacobians against central finite differences of the
/// state equation.
pub fn check_jacobians<M: DynamicsModel>(
    model: &M,
    x: &Vector<M::NS>,
    u: &Vector<M::NI>,
    p: &Vector<M::NP>,
) where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    let eps = 1e-6;
    let tol = 1e-6;

    let (A, B) = model.linearise(x, u, p);
    let P = model.linearise_parameters(x, u, p);

    for j in 0..M::NS::USIZE {
        let mut x_hi = x.clone();
        let mut x_lo = x.clone();
        x_hi[j] += eps;
        x_lo[j] -= eps;
        let fd = (model.state_equation(&x_hi, u, p) - model.state_equation(&x_lo, u, p))
            / (2.0 * eps);
        for i in 0..M::NS::USIZE {
            assert!(
                (A[(i, j)] - fd[i]).abs() < tol,
                "A[({}, {})]: analytic {} finite difference {}",
                i,
                j,
                A[(i, j)],
                fd[i]
            );
        }
    }

    for j in 0..M::NI::USIZE {
        let mut u_hi = u.clone();
        let mut u_lo = u.clone();
        u_hi[j] += eps;
        u_lo[j] -= eps;
        let fd = (model.state_equation(x, &u_hi, p) - model.state_equation(x, &u_lo, p))
            / (2.0 * eps);
        for i in 0..M::NS::USIZE {
            assert!(
                (B[(i, j)] - fd[i]).abs() < tol,
                "B[({}, {})]: analytic {} finite difference {}",
                i,
                j,
                B[(i, j)],
                fd[i]
            );
        }
    }

    for j in 0..M::NP::USIZE {
        let mut p_hi = p.clone();
        let mut p_lo = p.clone();
        p_hi[j] += eps;
        p_lo[j] -= eps;
        let fd = (model.state_equation(x, u, &p_hi) - model.state_equation(x, u, &p_lo))
            / (2.0 * eps);
        for i in 0..M::NS::USIZE {
            assert!(
                (P[(i, j)] - fd[i]).abs() < tol,
                "P[({}, {})]: analytic {} finite difference {}",
                i,
                j,
                P[(i, j)],
                fd[i]
            );
        }
    }
}
