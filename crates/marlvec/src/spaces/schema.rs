//! Observation schema resolved once per pool.

use super::DynSpace;
use crate::env::Observation;
use crate::{MarlError, Result};

/// Structural shape of a slot observation.
///
/// Resolved from the observation space when a pool is built, so the
/// flattening routine is chosen once instead of on every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObsSchema {
    /// Bare array observation
    Scalar,
    /// Named fields, in schema order
    Mapping(Vec<String>),
    /// Positional fields
    Sequence(usize),
}

impl ObsSchema {
    /// Derive the schema from a declared observation space
    pub fn from_space(space: &DynSpace) -> Self {
        match space {
            DynSpace::Dict(d) => ObsSchema::Mapping(d.keys().cloned().collect()),
            DynSpace::Tuple(t) => ObsSchema::Sequence(t.len()),
            DynSpace::Discrete(_) | DynSpace::Box(_) => ObsSchema::Scalar,
        }
    }

    /// Check that an observation has exactly the structure this schema declares.
    pub fn validate(&self, obs: &Observation) -> Result<()> {
        match (self, obs) {
            (ObsSchema::Scalar, Observation::Array(_)) => Ok(()),
            (ObsSchema::Mapping(keys), Observation::Dict(fields)) => {
                let missing: Vec<&str> = keys
                    .iter()
                    .filter(|k| !fields.contains_key(*k))
                    .map(String::as_str)
                    .collect();
                let extra: Vec<&str> = fields
                    .keys()
                    .filter(|k| !keys.contains(*k))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() && extra.is_empty() {
                    Ok(())
                } else {
                    Err(MarlError::Schema(format!(
                        "observation fields differ from schema (missing {:?}, extra {:?})",
                        missing, extra
                    )))
                }
            }
            (ObsSchema::Sequence(len), Observation::Tuple(fields)) => {
                if fields.len() == *len {
                    Ok(())
                } else {
                    Err(MarlError::Schema(format!(
                        "expected a tuple of {} fields, got {}",
                        len,
                        fields.len()
                    )))
                }
            }
            (schema, obs) => Err(MarlError::Schema(format!(
                "{} observation for a {} observation space",
                obs.kind(),
                schema.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ObsSchema::Scalar => "array",
            ObsSchema::Mapping(_) => "dict",
            ObsSchema::Sequence(_) => "tuple",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::{Box as BoxSpace, Dict, Tuple};
    use ndarray::{ArrayD, IxDyn};
    use std::collections::BTreeMap;

    fn dict_obs(keys: &[&str]) -> Observation {
        Observation::Dict(
            keys.iter()
                .map(|k| (k.to_string(), ArrayD::zeros(IxDyn(&[2]))))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_schema_from_space() {
        let dict = DynSpace::Dict(Dict::from_pairs(vec![
            ("b", DynSpace::Box(BoxSpace::symmetric(&[1]))),
            ("a", DynSpace::Box(BoxSpace::symmetric(&[1]))),
        ]));
        assert_eq!(
            ObsSchema::from_space(&dict),
            ObsSchema::Mapping(vec!["a".into(), "b".into()])
        );

        let tuple = DynSpace::Tuple(Tuple::new(vec![DynSpace::Box(BoxSpace::symmetric(&[1]))]));
        assert_eq!(ObsSchema::from_space(&tuple), ObsSchema::Sequence(1));
        assert_eq!(
            ObsSchema::from_space(&DynSpace::Box(BoxSpace::symmetric(&[3]))),
            ObsSchema::Scalar
        );
    }

    #[test]
    fn test_mapping_rejects_missing_and_extra_fields() {
        let schema = ObsSchema::Mapping(vec!["a".into(), "b".into()]);
        assert!(schema.validate(&dict_obs(&["a", "b"])).is_ok());
        assert!(matches!(
            schema.validate(&dict_obs(&["a"])),
            Err(MarlError::Schema(_))
        ));
        assert!(matches!(
            schema.validate(&dict_obs(&["a", "b", "c"])),
            Err(MarlError::Schema(_))
        ));
    }

    #[test]
    fn test_variant_mismatch_is_schema_error() {
        let schema = ObsSchema::Sequence(2);
        let err = schema.validate(&dict_obs(&["a"])).unwrap_err();
        assert!(err.to_string().contains("dict observation for a tuple"));
    }
}
