//! Box (continuous) observation/action space

use super::Space;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use serde::{Deserialize, Serialize};

/// Box space for continuous values with per-element bounds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Box {
    /// Lower bound for each element
    pub low: ArrayD<f32>,
    /// Upper bound for each element
    pub high: ArrayD<f32>,
    shape: Vec<usize>,
}

impl Box {
    /// Create a new box space with given bounds
    pub fn new(low: ArrayD<f32>, high: ArrayD<f32>) -> Self {
        assert_eq!(low.shape(), high.shape(), "Low and high must have same shape");
        let shape = low.shape().to_vec();
        Self { low, high, shape }
    }

    /// Create a box space with the same bounds for every element
    pub fn uniform(shape: &[usize], low: f32, high: f32) -> Self {
        Self::new(
            ArrayD::from_elem(IxDyn(shape), low),
            ArrayD::from_elem(IxDyn(shape), high),
        )
    }

    /// Create a box space from -inf to +inf
    pub fn unbounded(shape: &[usize]) -> Self {
        Self::uniform(shape, f32::NEG_INFINITY, f32::INFINITY)
    }

    /// Create a symmetric box [-1, 1] for all elements
    pub fn symmetric(shape: &[usize]) -> Self {
        Self::uniform(shape, -1.0, 1.0)
    }

    /// Clip every element of `value` into the bounds, broadcasting the bounds
    /// over any leading agent axis.
    pub fn clip(&self, value: &mut [f32]) {
        let low = self.low.as_slice_memory_order().unwrap_or(&[]);
        let high = self.high.as_slice_memory_order().unwrap_or(&[]);
        if low.is_empty() {
            return;
        }
        for (i, v) in value.iter_mut().enumerate() {
            let j = i % low.len();
            *v = v.max(low[j]).min(high[j]);
        }
    }
}

impl Space for Box {
    type Sample = ArrayD<f32>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        let mut result = ArrayD::zeros(IxDyn(&self.shape));
        for ((&l, &h), r) in self.low.iter().zip(self.high.iter()).zip(result.iter_mut()) {
            *r = if l == h {
                l
            } else if l.is_finite() && h.is_finite() {
                Uniform::new_inclusive(l, h).sample(rng)
            } else {
                let z: f32 = StandardNormal.sample(rng);
                z.max(l).min(h)
            };
        }
        result
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        if value.shape() != self.low.shape() {
            return false;
        }
        value
            .iter()
            .zip(self.low.iter())
            .zip(self.high.iter())
            .all(|((&v, &l), &h)| v >= l && v <= h)
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_box_sample_stays_in_bounds() {
        let space = Box::uniform(&[2, 3], -0.5, 0.5);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let sample = space.sample(&mut rng);
            assert_eq!(sample.shape(), &[2, 3]);
            assert!(space.contains(&sample));
        }
    }

    #[test]
    fn test_unbounded_sample_is_finite() {
        let space = Box::unbounded(&[4]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(space.sample(&mut rng).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_clip_broadcasts_over_agents() {
        let space = Box::symmetric(&[2]);
        let mut actions = vec![3.0, -0.25, -9.0, 0.5];
        space.clip(&mut actions);
        assert_eq!(actions, vec![1.0, -0.25, -1.0, 0.5]);
    }
}
