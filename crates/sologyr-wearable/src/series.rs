//! Series selection and scaling for the watch display.
//!
//! The watch graph is a fixed pixel width, so only entries that start inside
//! the display window are sent. Offsets are minutes from local midnight.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Offset, TimeZone, Utc};
use sologyr_core::WearableConfig;
use sologyr_weather::RawInterval;

/// "Now" plus the local day boundaries the offsets are measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesClock {
    pub now: DateTime<Utc>,
    pub start_of_day: DateTime<Utc>,
    pub utc_offset_secs: i32,
}

impl SeriesClock {
    /// Clock for the current instant in the system time zone
    pub fn local_now() -> Self {
        let now = Local::now();
        let offset = now.offset().fix();
        Self::at(now.with_timezone(&Utc), offset)
    }

    /// Clock for a given instant and fixed local offset
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local_midnight = now.with_timezone(&offset).date_naive().and_time(NaiveTime::MIN);
        let start_of_day = offset
            .from_local_datetime(&local_midnight)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        Self {
            now,
            start_of_day,
            utc_offset_secs: offset.local_minus_utc(),
        }
    }

    /// Minutes from local midnight, shifted by the UTC offset as the watch expects
    pub fn minutes_into_day(&self, time: DateTime<Utc>) -> i64 {
        let shifted = time - self.start_of_day + Duration::seconds(i64::from(self.utc_offset_secs));
        shifted.num_minutes()
    }

    pub fn minutes_from_now(&self, time: DateTime<Utc>) -> i64 {
        (time - self.now).num_minutes()
    }
}

/// Source of [`SeriesClock`] readings
pub trait Clock: Send + Sync {
    fn series_clock(&self) -> SeriesClock;
}

/// System clock and time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn series_clock(&self) -> SeriesClock {
        SeriesClock::local_now()
    }
}

/// Always reports the same reading
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SeriesClock);

impl Clock for FixedClock {
    fn series_clock(&self) -> SeriesClock {
        self.0
    }
}

/// Bounds on what is sent to the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLimits {
    pub window_minutes: i64,
    pub max_precipitation_items: usize,
    pub max_nowcast_items: usize,
}

impl SeriesLimits {
    pub fn from_config(config: &WearableConfig) -> Self {
        Self {
            window_minutes: config.display_window_minutes,
            max_precipitation_items: config.max_precipitation_items,
            max_nowcast_items: config.max_nowcast_items,
        }
    }
}

impl Default for SeriesLimits {
    fn default() -> Self {
        Self::from_config(&WearableConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecipitationItem {
    pub minutes: i16,
    pub amount: u8,
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureItem {
    pub minutes: i16,
    /// Tenths of a degree
    pub tenths: i16,
}

/// Nowcast as two parallel byte arrays, sent in one packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowcastSeries {
    pub minutes: Vec<u8>,
    pub amounts: Vec<u8>,
}

impl NowcastSeries {
    pub fn len(&self) -> usize {
        self.minutes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minutes.is_empty()
    }
}

/// Tenths of a unit in one byte. Amounts above 25.5 wrap modulo 256.
pub fn precipitation_tenths(amount: f64) -> u8 {
    ((amount * 10.0).round() as i64) as u8
}

/// Tenths of a degree, saturating at the i16 range
pub fn temperature_tenths(value: f64) -> i16 {
    (value * 10.0).round() as i16
}

fn window_offset(clock: &SeriesClock, limits: &SeriesLimits, start: DateTime<Utc>) -> Option<i16> {
    let minutes = clock.minutes_into_day(start);
    if minutes >= limits.window_minutes {
        return None;
    }
    i16::try_from(minutes).ok()
}

fn by_start<'a>(intervals: &'a [RawInterval], keep: impl Fn(&RawInterval) -> bool) -> Vec<&'a RawInterval> {
    let mut selected: Vec<&RawInterval> = intervals.iter().filter(|i| keep(i)).collect();
    selected.sort_by_key(|i| i.start_time);
    selected
}

/// Wet intervals inside the display window, earliest first, capped
pub fn precipitation_series(
    intervals: &[RawInterval],
    clock: &SeriesClock,
    limits: &SeriesLimits,
) -> Vec<PrecipitationItem> {
    by_start(intervals, |i| i.precipitation.is_some_and(|p| p.is_wet()))
        .into_iter()
        .filter_map(|i| {
            let precipitation = i.precipitation?;
            Some(PrecipitationItem {
                minutes: window_offset(clock, limits, i.start_time)?,
                amount: precipitation_tenths(precipitation.amount),
                min: precipitation_tenths(precipitation.min),
                max: precipitation_tenths(precipitation.max),
            })
        })
        .take(limits.max_precipitation_items)
        .collect()
}

/// Temperature snapshots inside the display window, earliest first
pub fn forecast_series(
    intervals: &[RawInterval],
    clock: &SeriesClock,
    limits: &SeriesLimits,
) -> Vec<TemperatureItem> {
    by_start(intervals, |i| i.precipitation.is_none() && i.temperature.is_some())
        .into_iter()
        .filter_map(|i| {
            Some(TemperatureItem {
                minutes: window_offset(clock, limits, i.start_time)?,
                tenths: temperature_tenths(i.temperature?.value),
            })
        })
        .collect()
}

/// Upcoming nowcast entries as minutes from now and precipitation tenths
pub fn nowcast_series(
    intervals: &[RawInterval],
    clock: &SeriesClock,
    limits: &SeriesLimits,
) -> NowcastSeries {
    let mut series = NowcastSeries::default();
    for interval in by_start(intervals, |i| i.precipitation.is_some()) {
        if series.len() >= limits.max_nowcast_items {
            break;
        }
        let Some(precipitation) = interval.precipitation else {
            continue;
        };
        let Ok(minutes) = u8::try_from(clock.minutes_from_now(interval.start_time)) else {
            continue;
        };
        series.minutes.push(minutes);
        series.amounts.push(precipitation_tenths(precipitation.amount));
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use sologyr_weather::{PrecipitationMeasurement, PrecipitationUnit, TemperatureMeasurement};

    fn clock() -> SeriesClock {
        // 08:00 UTC, local offset +01:00, so local midnight is 23:00 UTC the day before
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap();
        SeriesClock::at(now, FixedOffset::east_opt(3600).unwrap())
    }

    fn at(minutes_after_midnight_utc: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap() + Duration::minutes(minutes_after_midnight_utc)
    }

    fn wet(start: DateTime<Utc>, mm: f64) -> RawInterval {
        let mut i = RawInterval::empty(start, start + Duration::hours(1));
        i.precipitation = Some(PrecipitationMeasurement::millimeters(mm));
        i
    }

    fn warm(start: DateTime<Utc>, c: f64) -> RawInterval {
        let mut i = RawInterval::empty(start, start);
        i.temperature = Some(TemperatureMeasurement::celsius(c));
        i
    }

    #[test]
    fn test_clock_start_of_day() {
        let c = clock();
        assert_eq!(c.start_of_day, Utc.with_ymd_and_hms(2026, 3, 13, 23, 0, 0).unwrap());
        // 00:00 UTC is 60 min after local midnight, plus the 60 min offset
        assert_eq!(c.minutes_into_day(at(0)), 120);
    }

    #[test]
    fn test_precipitation_tenths_wraps() {
        assert_eq!(precipitation_tenths(0.04), 0);
        assert_eq!(precipitation_tenths(1.26), 13);
        assert_eq!(precipitation_tenths(25.5), 255);
        assert_eq!(precipitation_tenths(25.6), 0);
        assert_eq!(precipitation_tenths(30.0), 44);
    }

    #[test]
    fn test_temperature_tenths() {
        assert_eq!(temperature_tenths(3.0), 30);
        assert_eq!(temperature_tenths(-12.34), -123);
    }

    #[test]
    fn test_precipitation_series_filters_and_sorts() {
        let intervals = vec![
            wet(at(600), 0.5),
            wet(at(60), 1.0),
            wet(at(120), 0.0),
            warm(at(60), 2.0),
            // 5080 + 120 = 5200 minutes, outside the 4500 window
            wet(at(5080), 3.0),
        ];
        let items = precipitation_series(&intervals, &clock(), &SeriesLimits::default());
        assert_eq!(
            items,
            vec![
                PrecipitationItem { minutes: 180, amount: 10, min: 10, max: 10 },
                PrecipitationItem { minutes: 720, amount: 5, min: 5, max: 5 },
            ]
        );
    }

    #[test]
    fn test_precipitation_series_carries_bounds() {
        let mut interval = wet(at(0), 1.0);
        interval.precipitation = Some(PrecipitationMeasurement::with_bounds(
            1.0,
            Some(0.2),
            Some(1.0),
            PrecipitationUnit::Millimeter,
        ));
        let items = precipitation_series(&[interval], &clock(), &SeriesLimits::default());
        assert_eq!(items[0].min, 2);
        assert_eq!(items[0].max, 10);
    }

    #[test]
    fn test_precipitation_series_is_capped() {
        let intervals: Vec<RawInterval> = (0..200).map(|i| wet(at(i * 10), 0.1)).collect();
        let limits = SeriesLimits::default();
        let items = precipitation_series(&intervals, &clock(), &limits);
        assert_eq!(items.len(), limits.max_precipitation_items);
        assert_eq!(items[0].minutes, 120);
    }

    #[test]
    fn test_forecast_series_needs_temperature() {
        let intervals = vec![
            warm(at(4370), -1.5),
            warm(at(720), 3.0),
            RawInterval::empty(at(780), at(780)),
            wet(at(720), 1.0),
            warm(at(4380), 9.0),
        ];
        let items = forecast_series(&intervals, &clock(), &SeriesLimits::default());
        assert_eq!(
            items,
            vec![
                TemperatureItem { minutes: 840, tenths: 30 },
                TemperatureItem { minutes: 4490, tenths: -15 },
            ]
        );
    }

    #[test]
    fn test_nowcast_series_minutes_from_now() {
        let now = clock().now;
        let intervals = vec![
            wet(now - Duration::minutes(5), 0.2),
            wet(now + Duration::minutes(15), 0.7),
            wet(now, 0.0),
            RawInterval::empty(now, now),
        ];
        let series = nowcast_series(&intervals, &clock(), &SeriesLimits::default());
        assert_eq!(series.minutes, vec![0, 15]);
        assert_eq!(series.amounts, vec![0, 7]);
    }

    #[test]
    fn test_nowcast_series_is_capped() {
        let now = clock().now;
        let intervals: Vec<RawInterval> =
            (0..30).map(|i| wet(now + Duration::minutes(i * 5), 0.1)).collect();
        let series = nowcast_series(&intervals, &clock(), &SeriesLimits::default());
        assert_eq!(series.len(), 16);
        assert_eq!(series.minutes[15], 75);
    }
}
