use crate::dataset::sample::Sample;
use crate::dataset::schema::{Attribute, Schema};
use crate::prelude::{StageError, StageResult};
use std::collections::HashSet;

/// Source→destination attribute table between two schemas.
///
/// Built once per schema pair; attributes both schemas define map to
/// themselves unless an override redirects the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pairs: Vec<(Attribute, Attribute)>,
}

impl FieldMapping {
    pub fn new(
        source: &Schema,
        destination: &Schema,
        overrides: &[(Attribute, Attribute)],
    ) -> StageResult<Self> {
        let mut pairs: Vec<(Attribute, Attribute)> = Vec::new();
        let mut targeted = HashSet::new();

        for &(from, to) in overrides {
            if !source.defines(from) {
                return Err(schema_error(format!(
                    "override source {:?} not defined by {:?}",
                    from, source.variant
                )));
            }
            if !destination.defines(to) {
                return Err(schema_error(format!(
                    "override destination {:?} not defined by {:?}",
                    to, destination.variant
                )));
            }
            if from.kind() != to.kind() {
                return Err(schema_error(format!(
                    "cannot map {:?} onto {:?}",
                    from, to
                )));
            }
            if !targeted.insert(to) {
                return Err(schema_error(format!("{:?} targeted twice", to)));
            }
            pairs.push((from, to));
        }

        for attribute in destination.attributes() {
            if source.defines(attribute) && !targeted.contains(&attribute) {
                targeted.insert(attribute);
                pairs.push((attribute, attribute));
            }
        }

        let mapping = Self { pairs };
        mapping.check_total(source, destination)?;
        Ok(mapping)
    }

    /// Every attribute defined by both schemas must be reached by exactly
    /// one pair.
    fn check_total(&self, source: &Schema, destination: &Schema) -> StageResult<()> {
        for attribute in destination.attributes() {
            if !source.defines(attribute) {
                continue;
            }
            let hits = self.pairs.iter().filter(|(_, to)| *to == attribute).count();
            if hits != 1 {
                return Err(schema_error(format!(
                    "{:?} reached by {} mappings from {:?} to {:?}",
                    attribute, hits, source.variant, destination.variant
                )));
            }
        }
        Ok(())
    }

    pub fn pairs(&self) -> &[(Attribute, Attribute)] {
        &self.pairs
    }

    /// New sample holding only the mapped attributes of `source`.
    pub fn apply(&self, source: &Sample) -> StageResult<Sample> {
        let mut out = Sample::at(source.timestamp);
        self.apply_onto(source, &mut out)?;
        Ok(out)
    }

    /// Copies mapped attributes of `source` onto `target`, leaving the rest.
    pub fn apply_onto(&self, source: &Sample, target: &mut Sample) -> StageResult<()> {
        for &(from, to) in &self.pairs {
            target.set(to, source.get(from))?;
        }
        Ok(())
    }

    /// Like `apply_onto`, but a missing source value leaves the target as is.
    pub fn overlay(&self, source: &Sample, target: &mut Sample) -> StageResult<()> {
        for &(from, to) in &self.pairs {
            if let Some(value) = source.get(from) {
                target.set(to, Some(value))?;
            }
        }
        Ok(())
    }

    /// Keeps only pairs whose destination is listed.
    pub fn restricted_to(&self, destinations: &[Attribute]) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .copied()
                .filter(|(_, to)| destinations.contains(to))
                .collect(),
        }
    }
}

fn schema_error(detail: String) -> StageError {
    StageError::Schema(detail)
}
