use prelude::nalgebra::{Vector4, U4, U7, U8};
use prelude::*;

use crate::DynamicsModel;

/// Second-order drone model with velocity states and aerodynamic damping.
///
/// s = (x, y, z, a, vx, vy, vz, va)
/// u = (roll, pitch, yaw, throttle)
/// o = (x, y, z, a)
/// p = (c_h, c_v, c_a, e_a, b_h, b_v, b_a)
///
/// d(x, y, z, a) = (vx, vy, vz, va)
/// dvx = c_h * (cos(a + e_a) * pitch - sin(a + e_a) * roll) - b_h * vx
/// dvy = c_h * (sin(a + e_a) * pitch + cos(a + e_a) * roll) - b_h * vy
/// dvz = c_v * throttle - b_v * vz
/// dva = c_a * yaw - b_a * va
#[derive(Clone, Copy)]
pub struct InertiaDrone;

impl DynamicsModel for InertiaDrone {
    type NS = U8;
    type NI = U4;
    type NO = U4;
    type NP = U7;

    fn new() -> Self {
        InertiaDrone
    }

    fn name() -> &'static str {
        "inertia"
    }

    fn state_equation<T: RealField>(
        &self,
        x: &VectorOf<T, U8>,
        u: &VectorOf<T, U4>,
        p: &VectorOf<T, U7>,
    ) -> VectorOf<T, U8> {
        let theta = x[3].clone() + p[3].clone();
        let sin_t = theta.clone().sin();
        let cos_t = theta.cos();

        let mut ds = VectorOf::<T, U8>::zeros();
        ds[0] = x[4].clone();
        ds[1] = x[5].clone();
        ds[2] = x[6].clone();
        ds[3] = x[7].clone();
        ds[4] = p[0].clone() * (cos_t.clone() * u[1].clone() - sin_t.clone() * u[0].clone())
            - p[4].clone() * x[4].clone();
        ds[5] = p[0].clone() * (sin_t * u[1].clone() + cos_t * u[0].clone())
            - p[4].clone() * x[5].clone();
        ds[6] = p[1].clone() * u[3].clone() - p[5].clone() * x[6].clone();
        ds[7] = p[2].clone() * u[2].clone() - p[6].clone() * x[7].clone();
        ds
    }

    fn output_equation<T: RealField>(&self, x: &VectorOf<T, U8>) -> VectorOf<T, U4> {
        Vector4::new(
            x[0].clone(),
            x[1].clone(),
            x[2].clone(),
            x[3].clone(),
        )
    }

    fn linearise(
        &self,
        x0: &Vector<U8>,
        u0: &Vector<U4>,
        p0: &Vector<U7>,
    ) -> (Matrix<U8, U8>, Matrix<U8, U4>) {
        let (sin_t, cos_t) = (x0[3] + p0[3]).sin_cos();
        let c_h = p0[0];
        let roll = u0[0];
        let pitch = u0[1];

        let mut A = Matrix::<U8, U8>::zeros();
        for i in 0..4 {
            A[(i, i + 4)] = 1.0;
        }
        A[(4, 3)] = c_h * (-sin_t * pitch - cos_t * roll);
        A[(4, 4)] = -p0[4];
        A[(5, 3)] = c_h * (cos_t * pitch - sin_t * roll);
        A[(5, 5)] = -p0[4];
        A[(6, 6)] = -p0[5];
        A[(7, 7)] = -p0[6];

        let mut B = Matrix::<U8, U4>::zeros();
        B[(4, 0)] = -c_h * sin_t;
        B[(4, 1)] = c_h * cos_t;
        B[(5, 0)] = c_h * cos_t;
        B[(5, 1)] = c_h * sin_t;
        B[(6, 3)] = p0[1];
        B[(7, 2)] = p0[2];

        (A, B)
    }

    fn linearise_parameters(
        &self,
        x0: &Vector<U8>,
        u0: &Vector<U4>,
        p0: &Vector<U7>,
    ) -> Matrix<U8, U7> {
        let (sin_t, cos_t) = (x0[3] + p0[3]).sin_cos();
        let c_h = p0[0];
        let roll = u0[0];
        let pitch = u0[1];

        let mut P = Matrix::<U8, U7>::zeros();
        P[(4, 0)] = cos_t * pitch - sin_t * roll;
        P[(4, 3)] = c_h * (-sin_t * pitch - cos_t * roll);
        P[(4, 4)] = -x0[4];
        P[(5, 0)] = sin_t * pitch + cos_t * roll;
        P[(5, 3)] = c_h * (cos_t * pitch - sin_t * roll);
        P[(5, 4)] = -x0[5];
        P[(6, 1)] = u0[3];
        P[(6, 5)] = -x0[6];
        P[(7, 2)] = u0[2];
        P[(7, 6)] = -x0[7];

        P
    }

    fn output_matrix(&self) -> Matrix<U4, U8> {
        let mut G = Matrix::<U4, U8>::zeros();
        for i in 0..4 {
            G[(i, i)] = 1.0;
        }
        G
    }

    fn param_bounds(&self) -> (Vector<U7>, Vector<U7>) {
        let mut min = Vector::<U7>::zeros();
        let mut max = Vector::<U7>::zeros();
        for i in 0..3 {
            min[i] = 0.1;
            max[i] = 8.0;
        }
        min[3] = -0.5 * PI;
        max[3] = 0.5 * PI;
        for i in 4..7 {
            min[i] = 0.0;
            max[i] = 5.0;
        }
        (min, max)
    }

    fn input_bounds(&self) -> (Vector<U4>, Vector<U4>) {
        let min = Vector4::new(-1.0, -1.0, -1.0, -1.0);
        let max = Vector4::new(1.0, 1.0, 1.0, 1.0);
        (min, max)
    }
}
