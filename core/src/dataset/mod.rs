//! Labeled, ordered sample store plus the schema layer that names its
//! columns for each source/intermediate/final variant.

pub mod mapping;
pub mod sample;
pub mod schema;

pub use mapping::FieldMapping;
pub use sample::{Facing, Position, Sample, Value};
pub use schema::{Attribute, Columns, Schema, SchemaVariant, ValueKind};

use crate::math::stats::StatsHelper;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Ordered samples sharing one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub schema: Schema,
    pub samples: Vec<Sample>,
    /// Calendar date of the survey, once known.
    pub date: Option<NaiveDate>,
    /// File stem the data was loaded from; used to recover the survey date.
    pub source_name: Option<String>,
}

impl Dataset {
    pub fn from_samples(schema: Schema, samples: Vec<Sample>) -> Self {
        let mut dataset = Self {
            schema,
            samples,
            date: None,
            source_name: None,
        };
        dataset.date = dataset.first_gps_date();
        dataset
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_gps_date(&self) -> Option<NaiveDate> {
        self.samples.iter().find_map(|s| s.gps_date)
    }

    /// Distinct track ids in ascending order.
    pub fn track_ids(&self) -> Vec<u32> {
        self.samples
            .iter()
            .filter_map(|s| s.track_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct line ids in ascending order.
    pub fn line_ids(&self) -> Vec<u32> {
        self.samples
            .iter()
            .filter_map(|s| s.line_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sampling frequency (rounded Hz) of rows defining `attribute` among
    /// the first `prefix` rows, from the median raw-timestamp interval.
    pub fn column_frequency(&self, attribute: Attribute, prefix: usize) -> Option<u32> {
        let timestamps: Vec<f64> = self
            .samples
            .iter()
            .take(prefix)
            .filter(|s| s.get(attribute).is_some())
            .map(|s| s.timestamp as f64)
            .collect();

        let intervals: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        let median_ms = StatsHelper::median(&intervals)?;
        if median_ms <= 0.0 {
            return None;
        }
        let hz = (1000.0 / median_ms).round();
        if hz < 1.0 {
            return None;
        }
        Some(hz as u32)
    }

    /// Sorts samples by `(line_id, timestamp)`; rows without a line go last.
    pub fn sort_by_line(&mut self) {
        self.samples.sort_by_key(|s| (s.line_id.unwrap_or(u32::MAX), s.timestamp));
    }
}
