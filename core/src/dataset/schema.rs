use std::collections::HashSet;

/// Semantic attributes every schema variant names differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Timestamp,
    UtcTimestamp,
    Latitude,
    Longitude,
    Altitude,
    GpsTime,
    GpsDate,
    Temperature,
    Mag1,
    Mag2,
    Acc,
    TrackId,
    LineId,
    SensorId,
    Heading,
    Yaw,
    Facing,
    TrackFacing,
    TotalField,
    ResidualField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Real,
    Triad,
    Date,
    Facing,
}

impl Attribute {
    pub fn kind(self) -> ValueKind {
        match self {
            Attribute::Timestamp
            | Attribute::UtcTimestamp
            | Attribute::TrackId
            | Attribute::LineId
            | Attribute::SensorId => ValueKind::Integer,
            Attribute::Mag1 | Attribute::Mag2 | Attribute::Acc => ValueKind::Triad,
            Attribute::GpsDate => ValueKind::Date,
            Attribute::Facing | Attribute::TrackFacing => ValueKind::Facing,
            _ => ValueKind::Real,
        }
    }
}

/// Column name(s) an attribute occupies in a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    Single(&'static str),
    Triad([&'static str; 3]),
}

impl Columns {
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            Columns::Single(name) => vec![*name],
            Columns::Triad(names) => names.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    /// Combined device export (`*_RF.csv`).
    Raw,
    /// Higher-accuracy external position source.
    ExternalGnss,
    /// Intermediate ASCII export whose raw clock counts from midnight.
    Asc,
    /// Merged per-sensor output.
    Final,
}

/// Named-column layout shared by every sample of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub variant: SchemaVariant,
    pub delimiter: u8,
    columns: Vec<(Attribute, Columns)>,
}

impl Schema {
    pub fn new(variant: SchemaVariant, delimiter: u8, columns: Vec<(Attribute, Columns)>) -> Self {
        Self {
            variant,
            delimiter,
            columns,
        }
    }

    pub fn raw() -> Self {
        use Attribute::*;
        Self::new(
            SchemaVariant::Raw,
            b';',
            vec![
                (Timestamp, Columns::Single("Timestamp [ms]")),
                (UtcTimestamp, Columns::Single("UTC Timestamp [ms]")),
                (Mag1, Columns::Triad(["B1x [nT]", "B1y [nT]", "B1z [nT]"])),
                (Mag2, Columns::Triad(["B2x [nT]", "B2y [nT]", "B2z [nT]"])),
                (Acc, Columns::Triad(["AccX [g]", "AccY [g]", "AccZ [g]"])),
                (Temperature, Columns::Single("Temp [Deg]")),
                (Latitude, Columns::Single("Latitude [Decimal Degrees]")),
                (Longitude, Columns::Single("Longitude [Decimal Degrees]")),
                (Altitude, Columns::Single("Altitude [m]")),
                (GpsTime, Columns::Single("GPSTime")),
                (GpsDate, Columns::Single("GPSDate")),
                (Heading, Columns::Single("Heading [Deg]")),
                (TrackId, Columns::Single("Track ID")),
                (Yaw, Columns::Single("Yaw [deg]")),
                (Facing, Columns::Single("Facing")),
                (TrackFacing, Columns::Single("Track facing")),
            ],
        )
    }

    pub fn external_gnss() -> Self {
        use Attribute::*;
        Self::new(
            SchemaVariant::ExternalGnss,
            b',',
            vec![
                (UtcTimestamp, Columns::Single("timestamp")),
                (Latitude, Columns::Single("latitude")),
                (Longitude, Columns::Single("longitude")),
                (GpsTime, Columns::Single("GPS Time")),
            ],
        )
    }

    pub fn asc() -> Self {
        use Attribute::*;
        Self::new(
            SchemaVariant::Asc,
            b'\t',
            vec![
                (Timestamp, Columns::Single("Timestamp [ms]")),
                (UtcTimestamp, Columns::Single("UTC Timestamp [ms]")),
                (TrackId, Columns::Single("Track ID")),
                (SensorId, Columns::Single("Sensor ID")),
                (Latitude, Columns::Single("Latitude [°]")),
                (Longitude, Columns::Single("Longitude [°]")),
                (Altitude, Columns::Single("Altitude [m]")),
                (Mag1, Columns::Triad(["Mag-X [nT]", "Mag-Y [nT]", "Mag-Z [nT]"])),
                (Acc, Columns::Triad(["AccX [g]", "AccY [g]", "AccZ [g]"])),
                (TotalField, Columns::Single("Total field [nT]")),
                (Heading, Columns::Single("Heading [Deg]")),
                (Yaw, Columns::Single("Yaw [deg]")),
                (Facing, Columns::Single("Facing")),
                (TrackFacing, Columns::Single("Track facing")),
            ],
        )
    }

    pub fn final_output() -> Self {
        use Attribute::*;
        Self::new(
            SchemaVariant::Final,
            b';',
            vec![
                (UtcTimestamp, Columns::Single("UTC Timestamp [ms]")),
                (Timestamp, Columns::Single("Timestamp [ms]")),
                (TrackId, Columns::Single("Track ID")),
                (TrackFacing, Columns::Single("Track facing")),
                (SensorId, Columns::Single("Sensor ID")),
                (LineId, Columns::Single("Line ID")),
                (Latitude, Columns::Single("Latitude [Decimal Degrees]")),
                (Longitude, Columns::Single("Longitude [Decimal Degrees]")),
                (Altitude, Columns::Single("Altitude [m]")),
                (TotalField, Columns::Single("Total field [nT]")),
                (ResidualField, Columns::Single("Residual field [nT]")),
                (Mag1, Columns::Triad(["Mag-X [nT]", "Mag-Y [nT]", "Mag-Z [nT]"])),
                (Acc, Columns::Triad(["AccX [g]", "AccY [g]", "AccZ [g]"])),
            ],
        )
    }

    pub fn columns(&self) -> &[(Attribute, Columns)] {
        &self.columns
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.columns.iter().map(|(attribute, _)| *attribute)
    }

    pub fn defines(&self, attribute: Attribute) -> bool {
        self.columns.iter().any(|(a, _)| *a == attribute)
    }

    /// Header line in column order.
    pub fn header(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .flat_map(|(_, columns)| columns.names())
            .collect()
    }

    /// Raw clock counts milliseconds since midnight rather than since power-on.
    pub fn clock_is_time_of_day(&self) -> bool {
        self.variant == SchemaVariant::Asc
    }

    /// Checks that triads occupy three columns, scalars one, and that no
    /// attribute or column name repeats.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen_attributes = HashSet::new();
        let mut seen_names = HashSet::new();
        for (attribute, columns) in &self.columns {
            if !seen_attributes.insert(*attribute) {
                return Err(format!("{:?} declared twice", attribute));
            }
            let is_triad = matches!(columns, Columns::Triad(_));
            if is_triad != (attribute.kind() == ValueKind::Triad) {
                return Err(format!("{:?} has the wrong column arity", attribute));
            }
            for name in columns.names() {
                if !seen_names.insert(name) {
                    return Err(format!("column '{}' declared twice", name));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_are_consistent() {
        for schema in [
            Schema::raw(),
            Schema::external_gnss(),
            Schema::asc(),
            Schema::final_output(),
        ] {
            assert_eq!(schema.validate(), Ok(()), "{:?}", schema.variant);
        }
    }

    #[test]
    fn triad_attribute_with_single_column_is_rejected() {
        let schema = Schema::new(
            SchemaVariant::Raw,
            b';',
            vec![(Attribute::Mag1, Columns::Single("B"))],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn header_expands_triads() {
        let header = Schema::final_output().header();
        assert_eq!(header[0], "UTC Timestamp [ms]");
        assert!(header.contains(&"Mag-Y [nT]"));
        assert_eq!(header.len(), 11 + 3 + 3);
    }
}
