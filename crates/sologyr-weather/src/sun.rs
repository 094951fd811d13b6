//! Sunrise and sunset for a date and position.
//!
//! Low-precision sunrise equation (Almanac for Computers, 1990) with the
//! official zenith of 90°50'. Good to about a minute at mid latitudes.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const OFFICIAL_ZENITH_DEG: f64 = 90.833;

/// Local sunrise/sunset clock times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise_hour: u8,
    pub sunrise_minute: u8,
    pub sunset_hour: u8,
    pub sunset_minute: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Rise,
    Set,
}

/// Compute local sunrise and sunset.
///
/// `utc_offset_secs` is the local offset from UTC. Returns `None` when the
/// sun does not cross the horizon that day (polar day or night).
pub fn sun_times(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    utc_offset_secs: i32,
) -> Option<SunTimes> {
    let offset_hours = f64::from(utc_offset_secs) / 3600.0;
    let rise = event_hour(date, latitude, longitude, Event::Rise)?;
    let set = event_hour(date, latitude, longitude, Event::Set)?;
    let (sunrise_hour, sunrise_minute) = clock(rise + offset_hours);
    let (sunset_hour, sunset_minute) = clock(set + offset_hours);
    Some(SunTimes {
        sunrise_hour,
        sunrise_minute,
        sunset_hour,
        sunset_minute,
    })
}

/// UTC hour of the event, or None if the sun never reaches the zenith angle.
fn event_hour(date: NaiveDate, latitude: f64, longitude: f64, event: Event) -> Option<f64> {
    let day_of_year = f64::from(date.ordinal());
    let lng_hour = longitude / 15.0;
    let t = match event {
        Event::Rise => day_of_year + (6.0 - lng_hour) / 24.0,
        Event::Set => day_of_year + (18.0 - lng_hour) / 24.0,
    };

    // Sun's mean anomaly and true longitude
    let m = 0.9856 * t - 3.289;
    let l = normalize(
        m + 1.916 * sin_deg(m) + 0.020 * sin_deg(2.0 * m) + 282.634,
        360.0,
    );

    // Right ascension, moved into the same quadrant as L
    let mut ra = normalize(atan_deg(0.91764 * tan_deg(l)), 360.0);
    let l_quadrant = (l / 90.0).floor() * 90.0;
    let ra_quadrant = (ra / 90.0).floor() * 90.0;
    ra = (ra + l_quadrant - ra_quadrant) / 15.0;

    let sin_dec = 0.39782 * sin_deg(l);
    let cos_dec = sin_dec.asin().cos();

    let cos_h = (cos_deg(OFFICIAL_ZENITH_DEG) - sin_dec * sin_deg(latitude))
        / (cos_dec * cos_deg(latitude));
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }

    let h = match event {
        Event::Rise => 360.0 - cos_h.acos().to_degrees(),
        Event::Set => cos_h.acos().to_degrees(),
    } / 15.0;

    let local_mean = h + ra - 0.06571 * t - 6.622;
    Some(normalize(local_mean - lng_hour, 24.0))
}

fn clock(hours: f64) -> (u8, u8) {
    let hours = normalize(hours, 24.0);
    let mut hour = hours.floor() as u32;
    let mut minute = ((hours - hours.floor()) * 60.0).round() as u32;
    if minute == 60 {
        minute = 0;
        hour += 1;
    }
    ((hour % 24) as u8, minute as u8)
}

fn normalize(value: f64, range: f64) -> f64 {
    value.rem_euclid(range)
}

fn sin_deg(deg: f64) -> f64 {
    deg.to_radians().sin()
}

fn cos_deg(deg: f64) -> f64 {
    deg.to_radians().cos()
}

fn tan_deg(deg: f64) -> f64 {
    deg.to_radians().tan()
}

fn atan_deg(x: f64) -> f64 {
    x.atan().to_degrees()
}
