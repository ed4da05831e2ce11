use crate::math::angles::wrap_360;
use crate::prelude::{StageError, StageResult};
use chrono::{Datelike, NaiveDate};
use world_magnetic_model::time::Date;
use world_magnetic_model::uom::si::angle::degree;
use world_magnetic_model::uom::si::f32::{Angle, Length};
use world_magnetic_model::uom::si::length::meter;
use world_magnetic_model::GeomagneticField;

/// Source of the reference geomagnetic field at a date and location.
pub trait GeomagneticReference {
    /// Azimuth (degrees, `[0, 360)`) of the horizontal field vector.
    fn horizontal_azimuth(&self, date: NaiveDate, lat: f64, lon: f64) -> StageResult<f64>;
}

/// World Magnetic Model evaluated at ground level.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldMagneticModel;

impl GeomagneticReference for WorldMagneticModel {
    fn horizontal_azimuth(&self, date: NaiveDate, lat: f64, lon: f64) -> StageResult<f64> {
        let ordinal = u16::try_from(date.ordinal())
            .map_err(|_| StageError::ReferenceModel(format!("bad day of year in {}", date)))?;
        let model_date = Date::from_ordinal_date(date.year(), ordinal)
            .map_err(|e| StageError::ReferenceModel(format!("{}: {}", date, e)))?;

        let field = GeomagneticField::new(
            Length::new::<meter>(0.0),
            Angle::new::<degree>(lat as f32),
            Angle::new::<degree>(lon as f32),
            model_date,
        )
        .map_err(|e| {
            StageError::ReferenceModel(format!("{} at ({}, {}): {:?}", date, lat, lon, e))
        })?;

        let north = f64::from(field.x().value);
        let east = f64::from(field.y().value);
        Ok(wrap_360(east.atan2(north).to_degrees()))
    }
}

/// Reference field pointing along a fixed azimuth everywhere.
#[derive(Debug, Clone, Copy)]
pub struct FixedReference {
    pub azimuth: f64,
}

impl GeomagneticReference for FixedReference {
    fn horizontal_azimuth(&self, _date: NaiveDate, _lat: f64, _lon: f64) -> StageResult<f64> {
        Ok(wrap_360(self.azimuth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_europe_declination_is_small_and_east() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let az = WorldMagneticModel
            .horizontal_azimuth(date, 50.45, 30.52)
            .unwrap();
        // Kyiv declination is roughly +8°.
        assert!(az > 3.0 && az < 15.0, "{}", az);
    }

    #[test]
    fn fixed_reference_wraps() {
        let reference = FixedReference { azimuth: -10.0 };
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(reference.horizontal_azimuth(date, 0.0, 0.0).unwrap(), 350.0);
    }
}
