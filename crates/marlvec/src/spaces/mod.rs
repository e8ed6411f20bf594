//! Observation and action space types.
//!
//! Spaces describe one slot: observation fields carry every agent of the slot
//! stacked along axis 0, action spaces describe a single agent's action.

mod r#box;
mod dict;
mod discrete;
mod schema;
mod tuple;

pub use dict::Dict;
pub use discrete::Discrete;
pub use r#box::Box;
pub use schema::ObsSchema;
pub use tuple::Tuple;

use ndarray::{Array1, ArrayD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trait for observation and action spaces
pub trait Space: Clone + Send + Sync {
    /// The type of samples from this space
    type Sample;

    /// Sample a random element from this space
    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample;

    /// Check if a value is contained in this space
    fn contains(&self, value: &Self::Sample) -> bool;

    /// Get the shape of samples from this space
    fn shape(&self) -> &[usize];

    /// Get the total number of elements in a sample
    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Enum for dynamic space types
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DynSpace {
    Discrete(Discrete),
    Box(Box),
    Dict(Dict),
    Tuple(Tuple),
}

impl DynSpace {
    /// Get the shape of this space
    pub fn shape(&self) -> Vec<usize> {
        match self {
            DynSpace::Discrete(s) => s.shape().to_vec(),
            DynSpace::Box(s) => s.shape().to_vec(),
            DynSpace::Dict(s) => s.shape().to_vec(),
            DynSpace::Tuple(s) => s.shape().to_vec(),
        }
    }

    /// Number of scalars in a flattened sample
    pub fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }

    /// Sample a flat array from this space.
    ///
    /// Composite spaces concatenate their children in schema order.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ArrayD<f32> {
        match self {
            DynSpace::Discrete(s) => ArrayD::from_elem(IxDyn(&[1]), s.sample(rng) as f32),
            DynSpace::Box(s) => s.sample(rng),
            DynSpace::Dict(s) => {
                let flat: Vec<f32> = s
                    .sample(rng)
                    .into_values()
                    .flat_map(|v| v.into_iter())
                    .collect();
                Array1::from(flat).into_dyn()
            }
            DynSpace::Tuple(s) => {
                let flat: Vec<f32> = s
                    .sample(rng)
                    .into_iter()
                    .flat_map(|v| v.into_iter())
                    .collect();
                Array1::from(flat).into_dyn()
            }
        }
    }

    /// Check if this leaf space contains the value
    pub fn contains(&self, value: &ArrayD<f32>) -> bool {
        match self {
            DynSpace::Discrete(s) => match value.iter().next() {
                Some(v) if value.len() == 1 => v.fract() == 0.0 && *v >= 0.0 && s.contains(&(*v as usize)),
                _ => false,
            },
            DynSpace::Box(s) => s.contains(value),
            DynSpace::Dict(_) | DynSpace::Tuple(_) => false,
        }
    }

    /// Observation schema used to flatten batches of this space
    pub fn schema(&self) -> ObsSchema {
        ObsSchema::from_space(self)
    }
}

impl std::fmt::Display for DynSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DynSpace::Discrete(d) => write!(f, "Discrete({})", d.n),
            DynSpace::Box(b) => write!(f, "Box{:?}", b.shape()),
            DynSpace::Dict(d) => {
                f.write_str("Dict(")?;
                for (i, (name, space)) in d.spaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, space)?;
                }
                f.write_str(")")
            }
            DynSpace::Tuple(t) => {
                f.write_str("Tuple(")?;
                for (i, space) in t.spaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", space)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_display_nests_fields() {
        let space = DynSpace::Dict(Dict::from_pairs(vec![
            ("pos", DynSpace::Box(Box::symmetric(&[6]))),
            (
                "pair",
                DynSpace::Tuple(Tuple::new(vec![
                    DynSpace::Discrete(Discrete::new(3)),
                    DynSpace::Box(Box::symmetric(&[2, 2])),
                ])),
            ),
        ]));
        assert_eq!(space.to_string(), "Dict(pair: Tuple(Discrete(3), Box[2, 2]), pos: Box[6])");
    }

    #[test]
    fn test_dict_sample_is_concatenated_in_key_order() {
        let space = DynSpace::Dict(Dict::from_pairs(vec![
            ("b", DynSpace::Box(Box::uniform(&[2], 5.0, 5.0))),
            ("a", DynSpace::Box(Box::uniform(&[1], -1.0, -1.0))),
        ]));
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let sample = space.sample(&mut rng);
        assert_eq!(sample.as_slice().unwrap(), &[-1.0, 5.0, 5.0]);
    }

    #[test]
    fn test_tuple_sample_is_one_flat_row() {
        let space = DynSpace::Tuple(Tuple::new(vec![
            DynSpace::Discrete(Discrete::new(3)),
            DynSpace::Box(Box::symmetric(&[2, 2])),
        ]));
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        let sample = space.sample(&mut rng);
        assert_eq!(sample.shape(), &[space.num_elements()]);
        assert!(sample[[0]] < 3.0);
        assert!(sample.iter().skip(1).all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_discrete_contains_rejects_fractions() {
        let space = DynSpace::Discrete(Discrete::new(3));
        assert!(space.contains(&ArrayD::from_elem(IxDyn(&[1]), 2.0)));
        assert!(!space.contains(&ArrayD::from_elem(IxDyn(&[1]), 1.5)));
        assert!(!space.contains(&ArrayD::from_elem(IxDyn(&[1]), 3.0)));
    }

    #[test]
    fn test_space_survives_bincode() {
        let space = DynSpace::Tuple(Tuple::new(vec![
            DynSpace::Discrete(Discrete::new(4)),
            DynSpace::Box(Box::symmetric(&[2, 3])),
        ]));
        let bytes = bincode::serialize(&space).unwrap();
        let restored: DynSpace = bincode::deserialize(&bytes).unwrap();
        assert_eq!(space, restored);
    }
}
