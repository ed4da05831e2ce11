use crate::generator::template::lawnmower;
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveTime, Timelike};
use magcore::device::record::{KIND_ACCELEROMETER, KIND_GPS, KIND_MAGNETOMETER};
use magcore::device::{RawRecord, RecordHeader};
use magcore::math::angles::wrap_360;
use magcore::math::geodesy;
use magcore::math::geomagnetic::{GeomagneticReference, WorldMagneticModel};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating a synthetic lawnmower survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub altitude: f64,
    pub bearing: f64,
    pub legs: usize,
    pub leg_length: f64,
    pub spacing: f64,
    /// Ground speed in m/s.
    pub speed: f64,
    pub mag_period_ms: u32,
    /// One GPS record every this many magnetometer ticks.
    pub gps_every: usize,
    /// `YYYYMMDD_HHMMSS.S` of the first tick.
    pub start: String,
    pub field_strength: f64,
    pub anomaly_amplitude: f64,
    pub noise: f64,
    /// Fly every second pass with the airframe turned around.
    pub reverse_odd_legs: bool,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            origin_lat: 50.45,
            origin_lon: 30.52,
            altitude: 120.0,
            bearing: 0.0,
            legs: 4,
            leg_length: 60.0,
            spacing: 10.0,
            speed: 5.0,
            mag_period_ms: 50,
            gps_every: 4,
            start: "20250601_120000.0".to_string(),
            field_strength: 50_000.0,
            anomaly_amplitude: 40.0,
            noise: 0.5,
            reverse_odd_legs: true,
            seed: 0,
        }
    }
}

/// Device records of a synthetic flight plus the reference date-time they
/// were generated for.
pub struct SyntheticSurvey {
    pub records: Vec<RawRecord>,
    pub datetime: String,
}

struct Leg {
    start: (f64, f64),
    azimuth: f64,
    length: f64,
    reversed: bool,
}

fn parse_start(text: &str) -> anyhow::Result<(NaiveDate, NaiveTime)> {
    let (date, time) = text
        .split_once('_')
        .ok_or_else(|| anyhow!("start '{}' is not YYYYMMDD_HHMMSS.S", text))?;
    let date = NaiveDate::parse_from_str(date, "%Y%m%d")
        .with_context(|| format!("parsing start date '{}'", date))?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S%.f")
        .with_context(|| format!("parsing start time '{}'", time))?;
    Ok((date, time))
}

/// GPS time of day encoded as the number `hhmmss.sss`.
fn encode_time_of_day(start: NaiveTime, elapsed_ms: i64) -> f32 {
    let time = start + chrono::Duration::milliseconds(elapsed_ms);
    let seconds = f64::from(time.second()) + f64::from(time.nanosecond() / 1_000_000) / 1000.0;
    (f64::from(time.hour()) * 10_000.0 + f64::from(time.minute()) * 100.0 + seconds) as f32
}

fn legs(config: &GeneratorConfig) -> Vec<Leg> {
    let corners = lawnmower(
        (config.origin_lat, config.origin_lon),
        config.bearing,
        config.legs,
        config.leg_length,
        config.spacing,
    );
    corners
        .windows(2)
        .enumerate()
        .map(|(k, pair)| {
            let (length, azimuth) = geodesy::inverse(pair[0].0, pair[0].1, pair[1].0, pair[1].1);
            // Corners alternate pass, cross, pass, ...; pass n sits at index 2n.
            let pass = k / 2;
            Leg {
                start: pair[0],
                azimuth,
                length,
                reversed: config.reverse_odd_legs && k % 2 == 0 && pass % 2 == 1,
            }
        })
        .collect()
}

fn header(kind: u8, channel: u8, timestamp: u32) -> RecordHeader {
    RecordHeader {
        index: 0,
        marker: 0xAA,
        kind,
        channel,
        subtype: 0,
        timestamp,
    }
}

pub fn build_survey(config: &GeneratorConfig) -> anyhow::Result<SyntheticSurvey> {
    if config.speed <= 0.0 || config.mag_period_ms == 0 || config.gps_every == 0 {
        return Err(anyhow!("speed, magnetometer period and GPS interval must be positive"));
    }
    let (date, start) = parse_start(&config.start)?;
    let legs = legs(config);
    let total: f64 = legs.iter().map(|l| l.length).sum();
    let ticks = (total / config.speed * 1000.0 / f64::from(config.mag_period_ms)).round() as usize;
    let centre = geodesy::direct(
        config.origin_lat,
        config.origin_lon,
        config.bearing,
        config.leg_length / 2.0,
    );

    let model = WorldMagneticModel;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut records = Vec::with_capacity(ticks * 4);
    let clock_offset: u32 = 10_000;

    let mut leg_index = 0;
    let mut leg_start_distance = 0.0;
    for tick in 0..ticks {
        let elapsed_ms = tick as i64 * i64::from(config.mag_period_ms);
        let travelled = config.speed * elapsed_ms as f64 / 1000.0;
        while leg_index + 1 < legs.len() && travelled > leg_start_distance + legs[leg_index].length {
            leg_start_distance += legs[leg_index].length;
            leg_index += 1;
        }
        let leg = &legs[leg_index];
        let (lat, lon) = geodesy::direct(leg.start.0, leg.start.1, leg.azimuth, travelled - leg_start_distance);
        let timestamp = clock_offset + u32::try_from(elapsed_ms).context("survey too long for device clock")?;

        let reference = model
            .horizontal_azimuth(date, lat, lon)
            .context("evaluating reference field")?;
        let facing_heading = if leg.reversed { leg.azimuth + 180.0 } else { leg.azimuth };
        let body = wrap_360(reference - facing_heading).to_radians();
        let distance = geodesy::distance(lat, lon, centre.0, centre.1);
        let strength = config.field_strength + config.anomaly_amplitude * (-(distance / 10.0).powi(2)).exp();

        if tick % config.gps_every == 0 {
            records.push(RawRecord::Gps {
                header: header(KIND_GPS, 0, timestamp),
                latitude: lat,
                longitude: lon,
                altitude: config.altitude,
                gps_time: encode_time_of_day(start, elapsed_ms),
            });
        }
        records.push(RawRecord::Accelerometer {
            header: header(KIND_ACCELEROMETER, 0, timestamp),
            acceleration: [0.0, 0.0, 1.0],
            temperature: 20.0,
        });
        for channel in [1u8, 2] {
            let mut jitter = || {
                if config.noise > 0.0 {
                    rng.gen_range(-config.noise..config.noise)
                } else {
                    0.0
                }
            };
            let horizontal = strength * 0.4;
            let field = [
                horizontal * body.cos() + jitter(),
                horizontal * body.sin() + jitter(),
                strength * 0.9 + jitter(),
            ];
            records.push(RawRecord::Magnetometer {
                header: header(KIND_MAGNETOMETER, channel, timestamp),
                field,
                temperature: 20.0,
            });
        }
    }

    log::info!(
        "generated {} records over {} legs ({:.0} m)",
        records.len(),
        legs.len(),
        total
    );
    Ok(SyntheticSurvey {
        records,
        datetime: config.start.clone(),
    })
}
