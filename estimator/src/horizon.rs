use dynamics_model::DynamicsModel;
use prelude::*;

/// Sliding window of the last `h` samples: `h + 1` state slots and `h`
/// observation/input slots, with a per-slot validity weight marking which
/// observation slots hold real data.
///
/// Slot `t + 1` is constrained against slot `t` by the dynamics residual;
/// slot 0 is the evolving prior state and is never a free variable.
pub struct HorizonBuffer<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    h: usize,
    pub s: Vec<Vector<M::NS>>,
    pub o: Vec<Vector<M::NO>>,
    pub u: Vec<Vector<M::NI>>,
    pub w: Vec<float>,
}

impl<M: DynamicsModel> HorizonBuffer<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub fn new(h: usize) -> HorizonBuffer<M> {
        assert!(h >= 2, "horizon must be at least 2, got {}", h);
        HorizonBuffer {
            h,
            s: vec![Vector::<M::NS>::zeros(); h + 1],
            o: vec![Vector::<M::NO>::zeros(); h],
            u: vec![Vector::<M::NI>::zeros(); h],
            w: vec![0.0; h],
        }
    }

    pub fn h(&self) -> usize {
        self.h
    }

    /// Drops the oldest `k` samples, compacting the remainder towards slot 0
    /// and leaving the `k` tail slots for the caller to fill. `k` is clamped
    /// so slot 0 always survives as the anchor. Returns the applied shift.
    pub fn shift(&mut self, k: usize) -> usize {
        if k == 0 {
            return 0;
        }
        let k = min(k, self.h - 1);

        for t in 0..=(self.h - k) {
            self.s[t] = self.s[t + k].clone();
        }
        for t in 0..(self.h - k) {
            self.o[t] = self.o[t + k].clone();
            self.u[t] = self.u[t + k].clone();
            self.w[t] = self.w[t + k];
        }

        k
    }

    /// Resets every slot and validity weight; used on (re)start.
    pub fn zero(&mut self) {
        for s in &mut self.s {
            s.fill(0.0);
        }
        for o in &mut self.o {
            o.fill(0.0);
        }
        for u in &mut self.u {
            u.fill(0.0);
        }
        for w in &mut self.w {
            *w = 0.0;
        }
    }

    /// Initialises the `k` newly shifted-in state slots by explicit Euler
    /// steps from the last retained state, so the solver starts near a
    /// dynamically consistent point.
    pub fn warm_start(&mut self, model: &M, k: usize, dt: float, p: &Vector<M::NP>) {
        for t in (self.h - k + 1)..=self.h {
            self.s[t] = model.step(dt, &self.s[t - 1], &self.u[t - 1], p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamics_model::SimpleDrone;
    use prelude::nalgebra::Vector4;

    fn filled_buffer(h: usize) -> HorizonBuffer<SimpleDrone> {
        let mut buffer = HorizonBuffer::new(h);
        for t in 0..=h {
            buffer.s[t] = Vector4::from_element(t as float);
        }
        for t in 0..h {
            buffer.o[t] = Vector4::from_element(10.0 + t as float);
            buffer.u[t] = Vector4::from_element(20.0 + t as float);
            buffer.w[t] = 1.0;
        }
        buffer
    }

    #[test]
    fn shift_preserves_retained_slots() {
        let h = 6;
        for k in 1..h {
            let mut buffer = filled_buffer(h);
            let applied = buffer.shift(k);
            assert_eq!(applied, k);

            for t in 0..=(h - k) {
                assert_eq!(buffer.s[t], Vector4::from_element((t + k) as float));
            }
            for t in 0..(h - k) {
                assert_eq!(buffer.o[t], Vector4::from_element(10.0 + (t + k) as float));
                assert_eq!(buffer.u[t], Vector4::from_element(20.0 + (t + k) as float));
            }
        }
    }

    #[test]
    fn shift_is_clamped_to_keep_the_anchor() {
        let h = 5;
        let mut buffer = filled_buffer(h);
        let applied = buffer.shift(h + 3);
        assert_eq!(applied, h - 1);
        assert_eq!(buffer.s[0], Vector4::from_element((h - 1) as float));
        assert_eq!(buffer.s[1], Vector4::from_element(h as float));
    }

    #[test]
    fn shift_by_zero_is_a_no_op() {
        let h = 4;
        let mut buffer = filled_buffer(h);
        assert_eq!(buffer.shift(0), 0);
        assert_eq!(buffer.s[0], Vector4::zeros());
    }

    #[test]
    fn zero_clears_slots_and_weights() {
        let mut buffer = filled_buffer(3);
        buffer.zero();
        assert_eq!(buffer.s[3], Vector4::zeros());
        assert_eq!(buffer.o[2], Vector4::zeros());
        assert_eq!(buffer.w[0], 0.0);
    }

    #[test]
    fn warm_start_on_the_trivial_trajectory_stays_zero() {
        let model = SimpleDrone;
        let mut buffer = HorizonBuffer::<SimpleDrone>::new(4);
        buffer.shift(2);
        buffer.zero();
        buffer.warm_start(&model, 2, 0.02, &Vector4::zeros());

        for t in 0..=4 {
            assert_eq!(buffer.s[t], Vector4::zeros());
        }
    }
}
