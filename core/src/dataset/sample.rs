use crate::dataset::schema::{Attribute, ValueKind};
use crate::prelude::{StageError, StageResult};
use chrono::NaiveDate;
use std::fmt;

/// Direction of travel relative to the body frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    Backward,
    Ambiguous,
    Forward,
}

impl Facing {
    pub fn as_i8(self) -> i8 {
        match self {
            Facing::Backward => -1,
            Facing::Ambiguous => 0,
            Facing::Forward => 1,
        }
    }
}

impl TryFrom<i64> for Facing {
    type Error = StageError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Facing::Backward),
            0 => Ok(Facing::Ambiguous),
            1 => Ok(Facing::Forward),
            other => Err(StageError::Geometry {
                index: 0,
                detail: format!("facing must be -1, 0 or 1, got {}", other),
            }),
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// Typed value of one attribute, as moved between schemas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Triad([f64; 3]),
    Date(NaiveDate),
    Facing(Facing),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Triad(_) => ValueKind::Triad,
            Value::Date(_) => ValueKind::Date,
            Value::Facing(_) => ValueKind::Facing,
        }
    }
}

/// Geographic fix; any coordinate may be missing between GPS updates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
}

impl Position {
    pub fn fix(lat: f64, lon: f64, alt: Option<f64>) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            alt,
        }
    }

    /// Latitude and longitude when both are present.
    pub fn lat_lon(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn has_fix(&self) -> bool {
        self.lat_lon().is_some()
    }

    pub fn clear(&mut self) {
        *self = Position::default();
    }
}

/// One survey sample. Stages fill attributes progressively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Raw device counter in milliseconds.
    pub timestamp: i64,
    pub utc_timestamp: Option<i64>,
    pub position: Position,
    pub gps_time: Option<f64>,
    pub gps_date: Option<NaiveDate>,
    pub temperature: Option<f64>,
    pub mag1: Option<[f64; 3]>,
    pub mag2: Option<[f64; 3]>,
    pub acc: Option<[f64; 3]>,
    pub track_id: Option<u32>,
    pub line_id: Option<u32>,
    pub sensor_id: Option<u8>,
    pub heading: Option<f64>,
    pub yaw: Option<f64>,
    pub facing: Option<Facing>,
    pub track_facing: Option<Facing>,
    pub total_field: Option<f64>,
    pub residual_field: Option<f64>,
}

impl Sample {
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn get(&self, attribute: Attribute) -> Option<Value> {
        match attribute {
            Attribute::Timestamp => Some(Value::Integer(self.timestamp)),
            Attribute::UtcTimestamp => self.utc_timestamp.map(Value::Integer),
            Attribute::Latitude => self.position.lat.map(Value::Real),
            Attribute::Longitude => self.position.lon.map(Value::Real),
            Attribute::Altitude => self.position.alt.map(Value::Real),
            Attribute::GpsTime => self.gps_time.map(Value::Real),
            Attribute::GpsDate => self.gps_date.map(Value::Date),
            Attribute::Temperature => self.temperature.map(Value::Real),
            Attribute::Mag1 => self.mag1.map(Value::Triad),
            Attribute::Mag2 => self.mag2.map(Value::Triad),
            Attribute::Acc => self.acc.map(Value::Triad),
            Attribute::TrackId => self.track_id.map(|v| Value::Integer(i64::from(v))),
            Attribute::LineId => self.line_id.map(|v| Value::Integer(i64::from(v))),
            Attribute::SensorId => self.sensor_id.map(|v| Value::Integer(i64::from(v))),
            Attribute::Heading => self.heading.map(Value::Real),
            Attribute::Yaw => self.yaw.map(Value::Real),
            Attribute::Facing => self.facing.map(Value::Facing),
            Attribute::TrackFacing => self.track_facing.map(Value::Facing),
            Attribute::TotalField => self.total_field.map(Value::Real),
            Attribute::ResidualField => self.residual_field.map(Value::Real),
        }
    }

    /// Stores `value` under `attribute`; `None` clears it.
    pub fn set(&mut self, attribute: Attribute, value: Option<Value>) -> StageResult<()> {
        if let Some(v) = &value {
            if v.kind() != attribute.kind() {
                return Err(StageError::Schema(format!(
                    "{:?} expects {:?}, got {:?}",
                    attribute,
                    attribute.kind(),
                    v.kind()
                )));
            }
        }

        match attribute {
            Attribute::Timestamp => {
                self.timestamp = integer(value).ok_or_else(|| {
                    StageError::Schema("raw timestamp cannot be cleared".to_string())
                })?
            }
            Attribute::UtcTimestamp => self.utc_timestamp = integer(value),
            Attribute::Latitude => self.position.lat = real(value),
            Attribute::Longitude => self.position.lon = real(value),
            Attribute::Altitude => self.position.alt = real(value),
            Attribute::GpsTime => self.gps_time = real(value),
            Attribute::GpsDate => {
                self.gps_date = match value {
                    Some(Value::Date(d)) => Some(d),
                    _ => None,
                }
            }
            Attribute::Temperature => self.temperature = real(value),
            Attribute::Mag1 => self.mag1 = triad(value),
            Attribute::Mag2 => self.mag2 = triad(value),
            Attribute::Acc => self.acc = triad(value),
            Attribute::TrackId => self.track_id = narrow(attribute, integer(value))?,
            Attribute::LineId => self.line_id = narrow(attribute, integer(value))?,
            Attribute::SensorId => self.sensor_id = narrow(attribute, integer(value))?,
            Attribute::Heading => self.heading = real(value),
            Attribute::Yaw => self.yaw = real(value),
            Attribute::Facing => self.facing = facing(value),
            Attribute::TrackFacing => self.track_facing = facing(value),
            Attribute::TotalField => self.total_field = real(value),
            Attribute::ResidualField => self.residual_field = real(value),
        }
        Ok(())
    }
}

fn integer(value: Option<Value>) -> Option<i64> {
    match value {
        Some(Value::Integer(v)) => Some(v),
        _ => None,
    }
}

fn real(value: Option<Value>) -> Option<f64> {
    match value {
        Some(Value::Real(v)) => Some(v),
        _ => None,
    }
}

fn triad(value: Option<Value>) -> Option<[f64; 3]> {
    match value {
        Some(Value::Triad(v)) => Some(v),
        _ => None,
    }
}

fn facing(value: Option<Value>) -> Option<Facing> {
    match value {
        Some(Value::Facing(v)) => Some(v),
        _ => None,
    }
}

fn narrow<T: TryFrom<i64>>(attribute: Attribute, value: Option<i64>) -> StageResult<Option<T>> {
    value
        .map(|v| {
            T::try_from(v).map_err(|_| {
                StageError::Schema(format!("{:?} value {} out of range", attribute, v))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_moves_values_between_attributes() {
        let mut sample = Sample::at(400);
        sample.mag2 = Some([1.0, 2.0, 3.0]);

        let mut other = Sample::default();
        other.set(Attribute::Mag1, sample.get(Attribute::Mag2)).unwrap();
        other.set(Attribute::Timestamp, sample.get(Attribute::Timestamp)).unwrap();

        assert_eq!(other.mag1, Some([1.0, 2.0, 3.0]));
        assert_eq!(other.timestamp, 400);
    }

    #[test]
    fn set_rejects_kind_mismatch() {
        let mut sample = Sample::default();
        let err = sample
            .set(Attribute::Latitude, Some(Value::Integer(3)))
            .unwrap_err();
        assert!(matches!(err, StageError::Schema(_)));
    }

    #[test]
    fn facing_rejects_values_outside_unit_range() {
        assert_eq!(Facing::try_from(-1).unwrap(), Facing::Backward);
        assert!(matches!(
            Facing::try_from(2),
            Err(StageError::Geometry { .. })
        ));
    }

    #[test]
    fn sensor_id_out_of_range_is_reported() {
        let mut sample = Sample::default();
        assert!(sample
            .set(Attribute::SensorId, Some(Value::Integer(300)))
            .is_err());
    }
}
