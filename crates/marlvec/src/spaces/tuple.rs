//! Tuple (ordered fields) observation space

use super::{DynSpace, Space};
use ndarray::ArrayD;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tuple space containing an ordered list of sub-spaces
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Ordered sub-spaces
    pub spaces: Vec<DynSpace>,
    shape: Vec<usize>,
}

impl Tuple {
    /// Create a new tuple space
    pub fn new(spaces: Vec<DynSpace>) -> Self {
        let total: usize = spaces.iter().map(DynSpace::num_elements).sum();
        Self {
            spaces,
            shape: vec![total],
        }
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

impl Space for Tuple {
    type Sample = Vec<ArrayD<f32>>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        self.spaces.iter().map(|s| s.sample(rng)).collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.len() == self.spaces.len()
            && value.iter().zip(self.spaces.iter()).all(|(v, s)| s.contains(v))
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
