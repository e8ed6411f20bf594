//! Dict (named fields) observation space

use super::{DynSpace, Space};
use ndarray::ArrayD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dictionary space containing named sub-spaces.
///
/// Fields are kept in sorted key order, which is also the order batches are
/// flattened in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dict {
    /// Named sub-spaces
    pub spaces: BTreeMap<String, DynSpace>,
    shape: Vec<usize>,
}

impl Dict {
    /// Create a new dict space
    pub fn new(spaces: BTreeMap<String, DynSpace>) -> Self {
        let total: usize = spaces.values().map(DynSpace::num_elements).sum();
        Self {
            spaces,
            shape: vec![total],
        }
    }

    /// Create from a list of (name, space) pairs
    pub fn from_pairs(pairs: Vec<(&str, DynSpace)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Get a sub-space by name
    pub fn get(&self, name: &str) -> Option<&DynSpace> {
        self.spaces.get(name)
    }

    /// Field names in schema order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.spaces.keys()
    }
}

impl Space for Dict {
    type Sample = BTreeMap<String, ArrayD<f32>>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        self.spaces
            .iter()
            .map(|(k, v)| (k.clone(), v.sample(rng)))
            .collect()
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.len() == self.spaces.len()
            && self
                .spaces
                .iter()
                .all(|(k, s)| value.get(k).is_some_and(|v| s.contains(v)))
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
