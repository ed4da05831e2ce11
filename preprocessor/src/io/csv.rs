use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use csv::StringRecord;
use magcore::dataset::{Attribute, Dataset, Facing, Sample, Schema, Value, ValueKind};
use std::path::Path;

const DATE_FORMATS: [&str; 3] = ["%Y/%m/%d", "%Y-%m-%d", "%d.%m.%Y"];

fn parse_real(cell: &str) -> anyhow::Result<Option<f64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .with_context(|| format!("'{}' is not a number", cell))?;
    Ok(value.is_finite().then_some(value))
}

fn parse_integer(cell: &str) -> anyhow::Result<Option<i64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(Some(value));
    }
    match parse_real(cell)? {
        Some(value) if value.fract() == 0.0 => Ok(Some(value as i64)),
        Some(_) => Err(anyhow!("'{}' is not an integer", cell)),
        None => Ok(None),
    }
}

fn parse_date(cell: &str) -> anyhow::Result<Option<NaiveDate>> {
    if cell.is_empty() {
        return Ok(None);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(cell, format).ok())
        .map(Some)
        .ok_or_else(|| anyhow!("'{}' is not a date", cell))
}

/// Parses the cell(s) of one attribute; empty cells give `None`.
fn parse_value(kind: ValueKind, cells: &[&str]) -> anyhow::Result<Option<Value>> {
    let value = match kind {
        ValueKind::Integer => parse_integer(cells[0])?.map(Value::Integer),
        ValueKind::Real => parse_real(cells[0])?.map(Value::Real),
        ValueKind::Date => parse_date(cells[0])?.map(Value::Date),
        ValueKind::Facing => match parse_integer(cells[0])? {
            Some(raw) => Some(Value::Facing(Facing::try_from(raw)?)),
            None => None,
        },
        ValueKind::Triad => {
            let x = parse_real(cells[0])?;
            let y = parse_real(cells[1])?;
            let z = parse_real(cells[2])?;
            match (x, y, z) {
                (Some(x), Some(y), Some(z)) => Some(Value::Triad([x, y, z])),
                _ => None,
            }
        }
    };
    Ok(value)
}

fn format_real(value: f64) -> String {
    format!("{}", value)
}

fn format_value(value: Option<Value>, width: usize) -> Vec<String> {
    match value {
        None => vec![String::new(); width],
        Some(Value::Integer(v)) => vec![v.to_string()],
        Some(Value::Real(v)) => vec![format_real(v)],
        Some(Value::Date(d)) => vec![d.format(DATE_FORMATS[0]).to_string()],
        Some(Value::Facing(f)) => vec![f.to_string()],
        Some(Value::Triad(t)) => t.iter().map(|v| format_real(*v)).collect(),
    }
}

/// Reads a delimited file by the column names `schema` declares. Columns the
/// file lacks leave their attribute empty; unknown columns are ignored.
pub fn read_dataset(path: &Path, schema: Schema, delimiter: Option<u8>) -> anyhow::Result<Dataset> {
    schema
        .validate()
        .map_err(|err| anyhow!("{:?} layout is invalid: {}", schema.variant, err))?;
    let delimiter = delimiter.unwrap_or(schema.delimiter);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let mut layout: Vec<(Attribute, Vec<usize>)> = Vec::new();
    for (attribute, columns) in schema.columns() {
        let indices: Option<Vec<usize>> = columns.names().iter().map(|n| position(*n)).collect();
        match indices {
            Some(indices) => layout.push((*attribute, indices)),
            None => log::debug!(
                "{}: no column for {:?}",
                path.display(),
                attribute
            ),
        }
    }
    if layout.is_empty() {
        return Err(anyhow!(
            "{} shares no column with the {:?} layout",
            path.display(),
            schema.variant
        ));
    }
    if schema.defines(Attribute::Timestamp) && !layout.iter().any(|(a, _)| *a == Attribute::Timestamp) {
        return Err(anyhow!("{} has no timestamp column", path.display()));
    }

    let mut samples = Vec::new();
    let mut record = StringRecord::new();
    let mut line = 1;
    let mut skipped = 0;
    'rows: while reader
        .read_record(&mut record)
        .with_context(|| format!("{}: reading line {}", path.display(), line + 1))?
    {
        line += 1;
        let mut sample = Sample::default();
        for (attribute, indices) in &layout {
            let cells: Vec<&str> = indices
                .iter()
                .map(|&i| record.get(i).unwrap_or(""))
                .collect();
            let value = parse_value(attribute.kind(), &cells)
                .with_context(|| format!("{}: line {}, {:?}", path.display(), line, attribute))?;
            if *attribute == Attribute::Timestamp && value.is_none() {
                log::warn!("{}: line {} has no timestamp, row skipped", path.display(), line);
                skipped += 1;
                continue 'rows;
            }
            sample.set(*attribute, value)?;
        }
        samples.push(sample);
    }

    let mut dataset = Dataset::from_samples(schema, samples);
    dataset.source_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned());
    log::info!(
        "read {} rows from {} ({} skipped)",
        dataset.len(),
        path.display(),
        skipped
    );
    Ok(dataset)
}

/// Writes every sample under the schema header.
pub fn write_dataset(path: &Path, dataset: &Dataset, delimiter: Option<u8>) -> anyhow::Result<()> {
    dataset
        .schema
        .validate()
        .map_err(|err| anyhow!("{:?} layout is invalid: {}", dataset.schema.variant, err))?;
    let delimiter = delimiter.unwrap_or(dataset.schema.delimiter);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writer.write_record(dataset.schema.header())?;
    for sample in &dataset.samples {
        let mut row: Vec<String> = Vec::new();
        for (attribute, columns) in dataset.schema.columns() {
            row.extend(format_value(sample.get(*attribute), columns.names().len()));
        }
        writer.write_record(&row)?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    log::info!("wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use magcore::dataset::Position;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_raw_export_with_extra_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Timestamp [ms]; B1x [nT]; B1y [nT]; B1z [nT]; B2x [nT]; B2y [nT]; B2z [nT]; Satellites; Latitude [Decimal Degrees]; Longitude [Decimal Degrees]; GPSTime; GPSDate"
        )
        .unwrap();
        writeln!(file, "0;1;2;3;4;5;6;9;50.5;30.25;120000.000;2025/03/25").unwrap();
        writeln!(file, "50.0;1;2;3;4;5;6;9;;;;").unwrap();

        let data = read_dataset(file.path(), Schema::raw(), None).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.samples[1].timestamp, 50);
        assert_eq!(data.samples[0].mag2, Some([4.0, 5.0, 6.0]));
        assert_eq!(data.samples[0].position.lat_lon(), Some((50.5, 30.25)));
        assert!(!data.samples[1].position.has_fix());
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2025, 3, 25));
    }

    #[test]
    fn rows_without_timestamp_are_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Timestamp [ms];B1x [nT];B1y [nT];B1z [nT]").unwrap();
        writeln!(file, "0;1;2;3").unwrap();
        writeln!(file, ";1;2;3").unwrap();
        writeln!(file, "50;1;2;3").unwrap();

        let data = read_dataset(file.path(), Schema::raw(), None).unwrap();
        let stamps: Vec<i64> = data.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0, 50]);
    }

    #[test]
    fn missing_timestamp_column_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "B1x [nT];B1y [nT];B1z [nT]").unwrap();
        writeln!(file, "1;2;3").unwrap();
        let err = read_dataset(file.path(), Schema::raw(), None).unwrap_err();
        assert!(err.to_string().contains("no timestamp column"));
    }

    #[test]
    fn inconsistent_layout_is_rejected() {
        use magcore::dataset::{Columns, SchemaVariant};
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Timestamp [ms]").unwrap();
        let schema = Schema::new(
            SchemaVariant::Raw,
            b';',
            vec![
                (Attribute::Timestamp, Columns::Single("Timestamp [ms]")),
                (Attribute::TotalField, Columns::Single("Timestamp [ms]")),
            ],
        );
        assert!(read_dataset(file.path(), schema.clone(), None).is_err());
        let data = Dataset::from_samples(schema, vec![Sample::at(0)]);
        assert!(write_dataset(file.path(), &data, None).is_err());
    }

    #[test]
    fn rejects_out_of_range_facing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Timestamp [ms];Facing").unwrap();
        writeln!(file, "0;2").unwrap();
        assert!(read_dataset(file.path(), Schema::raw(), None).is_err());
    }

    #[test]
    fn final_dataset_survives_write_and_read() {
        let mut sample = Sample::at(200);
        sample.utc_timestamp = Some(1_704_110_400_200);
        sample.position = Position::fix(50.000050001, 30.0, Some(100.5));
        sample.track_id = Some(0);
        sample.sensor_id = Some(2);
        sample.line_id = Some(1);
        sample.track_facing = Some(Facing::Backward);
        sample.mag1 = Some([100.0, 0.5, -3.25]);
        sample.total_field = Some(100.05);
        let data = Dataset::from_samples(Schema::final_output(), vec![sample.clone()]);

        let file = NamedTempFile::new().unwrap();
        write_dataset(file.path(), &data, None).unwrap();
        let back = read_dataset(file.path(), Schema::final_output(), None).unwrap();
        assert_eq!(back.samples[0], sample);
    }
}
