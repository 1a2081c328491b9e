use prelude::nalgebra::{Matrix4, Vector4, U4, U6};
use prelude::*;

use crate::DynamicsModel;

/// First-order drone model with a constant horizontal drift, for flights in
/// still-air rooms with a slow draught or a miscalibrated trim.
///
/// s = (x, y, z, a)
/// u = (roll, pitch, yaw, throttle)
/// p = (c_h, c_v, c_a, e_a, v_x, v_y)
///
/// dx = c_h * (cos(a + e_a) * pitch - sin(a + e_a) * roll) + v_x
/// dy = c_h * (sin(a + e_a) * pitch + cos(a + e_a) * roll) + v_y
/// dz = c_v * throttle
/// da = c_a * yaw
#[derive(Clone, Copy)]
pub struct DriftDrone;

impl DynamicsModel for DriftDrone {
    type NS = U4;
    type NI = U4;
    type NO = U4;
    type NP = U6;

    fn new() -> Self {
        DriftDrone
    }

    fn name() -> &'static str {
        "drift"
    }

    fn state_equation<T: RealField>(
        &self,
        x: &VectorOf<T, U4>,
        u: &VectorOf<T, U4>,
        p: &VectorOf<T, U6>,
    ) -> VectorOf<T, U4> {
        let theta = x[3].clone() + p[3].clone();
        let sin_t = theta.clone().sin();
        let cos_t = theta.cos();

        Vector4::new(
            p[0].clone() * (cos_t.clone() * u[1].clone() - sin_t.clone() * u[0].clone())
                + p[4].clone(),
            p[0].clone() * (sin_t * u[1].clone() + cos_t * u[0].clone()) + p[5].clone(),
            p[1].clone() * u[3].clone(),
            p[2].clone() * u[2].clone(),
        )
    }

    fn output_equation<T: RealField>(&self, x: &VectorOf<T, U4>) -> VectorOf<T, U4> {
        x.clone()
    }

    fn linearise(
        &self,
        x0: &Vector<U4>,
        u0: &Vector<U4>,
        p0: &Vector<U6>,
    ) -> (Matrix<U4, U4>, Matrix<U4, U4>) {
        let (sin_t, cos_t) = (x0[3] + p0[3]).sin_cos();
        let c_h = p0[0];
        let roll = u0[0];
        let pitch = u0[1];

        #[cfg_attr(rustfmt, rustfmt_skip)]
        let A = Matrix4::new(
            0.0, 0.0, 0.0, c_h * (-sin_t * pitch - cos_t * roll),
            0.0, 0.0, 0.0, c_h * (cos_t * pitch - sin_t * roll),
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
        );

        #[cfg_attr(rustfmt, rustfmt_skip)]
        let B = Matrix4::new(
            -c_h * sin_t, c_h * cos_t, 0.0, 0.0,
            c_h * cos_t, c_h * sin_t, 0.0, 0.0,
            0.0, 0.0, 0.0, p0[1],
            0.0, 0.0, p0[2], 0.0,
        );

        (A, B)
    }

    fn linearise_parameters(
        &self,
        x0: &Vector<U4>,
        u0: &Vector<U4>,
        p0: &Vector<U6>,
    ) -> Matrix<U4, U6> {
        let (sin_t, cos_t) = (x0[3] + p0[3]).sin_cos();
        let c_h = p0[0];
        let roll = u0[0];
        let pitch = u0[1];

        let mut P = Matrix::<U4, U6>::zeros();
        P[(0, 0)] = cos_t * pitch - sin_t * roll;
        P[(0, 3)] = c_h * (-sin_t * pitch - cos_t * roll);
        P[(0, 4)] = 1.0;
        P[(1, 0)] = sin_t * pitch + cos_t * roll;
        P[(1, 3)] = c_h * (cos_t * pitch - sin_t * roll);
        P[(1, 5)] = 1.0;
        P[(2, 1)] = u0[3];
        P[(3, 2)] = u0[2];

        P
    }

    fn output_matrix(&self) -> Matrix<U4, U4> {
        Matrix4::identity()
    }

    fn param_bounds(&self) -> (Vector<U6>, Vector<U6>) {
        let mut min = Vector::<U6>::zeros();
        let mut max = Vector::<U6>::zeros();
        min[0] = 0.1;
        min[1] = 0.1;
        min[2] = 0.1;
        min[3] = -0.5 * PI;
        min[4] = -1.0;
        min[5] = -1.0;
        max[0] = 4.0;
        max[1] = 4.0;
        max[2] = 4.0;
        max[3] = 0.5 * PI;
        max[4] = 1.0;
        max[5] = 1.0;
        (min, max)
    }

    fn input_bounds(&self) -> (Vector<U4>, Vector<U4>) {
        let min = Vector4::new(-1.0, -1.0, -1.0, -1.0);
        let max = Vector4::new(1.0, 1.0, 1.0, 1.0);
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_util::check_jacobians;
    use prelude::nalgebra::Vector6;

    #[test]
    fn jacobians_match_finite_differences() {
        let model = DriftDrone::new();
        let x = Vector4::new(0.3, -0.2, 1.1, 0.7);
        let u = Vector4::new(0.2, -0.4, 0.1, 0.6);
        let p = Vector6::new(1.5, 0.8, 1.2, 0.1, 0.2, -0.3);

        check_jacobians(&model, &x, &u, &p);
    }

    #[test]
    fn drift_acts_with_zero_input() {
        let model = DriftDrone::new();
        let x = Vector4::zeros();
        let u = Vector4::zeros();
        let p = Vector6::new(1.5, 0.8, 1.2, 0.0, 0.2, -0.3);

        let ds = model.state_equation(&x, &u, &p);
        assert_eq!(ds, Vector4::new(0.2, -0.3, 0.0, 0.0));
    }
}
