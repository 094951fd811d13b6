use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sologyr_core::NetworkError;

/// Temperature unit as reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Map the feed's unit text. Anything but "fahrenheit" is Celsius.
    pub fn from_feed(unit: Option<&str>) -> Self {
        match unit {
            Some("fahrenheit") => Self::Fahrenheit,
            _ => Self::Celsius,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// Precipitation unit as reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrecipitationUnit {
    #[default]
    Millimeter,
    Inch,
}

impl PrecipitationUnit {
    /// Map the feed's unit text. Anything but "in" is millimeters.
    pub fn from_feed(unit: Option<&str>) -> Self {
        match unit {
            Some("in") => Self::Inch,
            _ => Self::Millimeter,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Millimeter => "mm",
            Self::Inch => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureMeasurement {
    pub value: f64,
    pub unit: TemperatureUnit,
}

impl TemperatureMeasurement {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }

    pub fn celsius(value: f64) -> Self {
        Self::new(value, TemperatureUnit::Celsius)
    }
}

impl std::fmt::Display for TemperatureMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit.symbol())
    }
}

/// Precipitation over an interval.
///
/// `amount` is the figure the rest of the system works with; `min` and `max`
/// are the feed's uncertainty bounds and default to `amount` when the feed
/// omits them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationMeasurement {
    pub amount: f64,
    pub min: f64,
    pub max: f64,
    pub unit: PrecipitationUnit,
}

impl PrecipitationMeasurement {
    pub fn new(amount: f64, unit: PrecipitationUnit) -> Self {
        Self {
            amount,
            min: amount,
            max: amount,
            unit,
        }
    }

    pub fn with_bounds(amount: f64, min: Option<f64>, max: Option<f64>, unit: PrecipitationUnit) -> Self {
        Self {
            amount,
            min: min.unwrap_or(amount),
            max: max.unwrap_or(amount),
            unit,
        }
    }

    pub fn millimeters(amount: f64) -> Self {
        Self::new(amount, PrecipitationUnit::Millimeter)
    }

    /// Same measurement with `extra` added to the amount.
    pub fn plus_amount(self, extra: f64) -> Self {
        Self {
            amount: self.amount + extra,
            ..self
        }
    }

    pub fn is_wet(&self) -> bool {
        self.amount > 0.0
    }
}

impl std::fmt::Display for PrecipitationMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{} {}",
            self.min,
            self.amount,
            self.max,
            self.unit.symbol()
        )
    }
}

/// One parsed feed entry: a measurement window and whatever the entry carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInterval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub temperature: Option<TemperatureMeasurement>,
    pub wind_speed: Option<f64>,
    pub precipitation: Option<PrecipitationMeasurement>,
    pub icon_code: Option<i32>,
}

impl RawInterval {
    /// An interval with no measurements
    pub fn empty(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            temperature: None,
            wind_speed: None,
            precipitation: None,
            icon_code: None,
        }
    }

    /// True for a point reading (start == end)
    pub fn is_instant(&self) -> bool {
        self.start_time == self.end_time
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_time.date_naive()
    }
}

/// One slot of the assembled forecast window.
///
/// Record 0 is "now"; record k is the noon snapshot of today + k days with
/// precipitation and icon taken from the surrounding sub-windows. Records are
/// built once through the `with_*` steps and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub temperature: Option<TemperatureMeasurement>,
    pub wind_speed: f64,
    pub precipitation: Option<PrecipitationMeasurement>,
    pub icon_code: Option<i32>,
    pub display_label: String,
}

impl ForecastRecord {
    pub fn from_interval(interval: &RawInterval) -> Self {
        Self {
            start_time: interval.start_time,
            end_time: interval.end_time,
            temperature: interval.temperature,
            wind_speed: interval.wind_speed.unwrap_or(0.0),
            precipitation: interval.precipitation,
            icon_code: interval.icon_code,
            display_label: String::new(),
        }
    }

    /// Take precipitation and icon from a companion interval covering the same window.
    pub fn with_companion(self, companion: &RawInterval) -> Self {
        Self {
            precipitation: companion.precipitation,
            icon_code: companion.icon_code,
            ..self
        }
    }

    /// Add a later sub-window's precipitation to this record's total.
    pub fn with_added_precipitation(self, later: &RawInterval) -> Self {
        let precipitation = match (self.precipitation, later.precipitation) {
            (Some(own), Some(extra)) => Some(own.plus_amount(extra.amount)),
            (None, extra) => extra,
            (own, None) => own,
        };
        Self {
            precipitation,
            ..self
        }
    }

    pub fn with_label(self, display_label: String) -> Self {
        Self {
            display_label,
            ..self
        }
    }

    /// Ordering by start time
    pub fn cmp_start(&self, other: &Self) -> std::cmp::Ordering {
        self.start_time.cmp(&other.start_time)
    }
}

/// Geographic location with an optional locality from the geocoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub locality: Option<String>,
    /// Distance from the locality's reference point, in meters
    pub locality_distance_m: Option<u32>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            locality: None,
            locality_distance_m: None,
        }
    }
}

/// Feed parsing errors. Any of these discards the whole fetch cycle.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed timestamp {value:?}")]
    Timestamp {
        value: String,
        #[source]
        source: Option<chrono::ParseError>,
    },
    #[error("Malformed number in {element}@{attribute}: {value:?}")]
    NumberFormat {
        element: &'static str,
        attribute: &'static str,
        value: Option<String>,
    },
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Unexpected document structure: {0}")]
    Structure(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Forecast window assembly errors. The previous window stays in effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("Not enough data: {0}")]
    InsufficientData(String),
    #[error("Inconsistent first entries: {first_end} vs {second_end}")]
    Consistency {
        first_end: DateTime<Utc>,
        second_end: DateTime<Utc>,
    },
    #[error("Incomplete label tables: {days} day names, {months} month names")]
    Resource { days: usize, months: usize },
    #[error("Noon snapshot for {date} appears again after it was assembled")]
    DuplicateDate { date: NaiveDate },
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_temperature_unit_defaults_to_celsius() {
        assert_eq!(TemperatureUnit::from_feed(Some("fahrenheit")), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::from_feed(Some("celsius")), TemperatureUnit::Celsius);
        assert_eq!(TemperatureUnit::from_feed(Some("Fahrenheit")), TemperatureUnit::Celsius);
        assert_eq!(TemperatureUnit::from_feed(None), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_precipitation_unit_defaults_to_millimeter() {
        assert_eq!(PrecipitationUnit::from_feed(Some("in")), PrecipitationUnit::Inch);
        assert_eq!(PrecipitationUnit::from_feed(Some("mm")), PrecipitationUnit::Millimeter);
        assert_eq!(PrecipitationUnit::from_feed(Some("cm")), PrecipitationUnit::Millimeter);
        assert_eq!(PrecipitationUnit::from_feed(None), PrecipitationUnit::Millimeter);
    }

    #[test]
    fn test_precipitation_bounds_default_to_amount() {
        let p = PrecipitationMeasurement::with_bounds(1.2, None, Some(2.0), PrecipitationUnit::Millimeter);
        assert_eq!(p.min, 1.2);
        assert_eq!(p.max, 2.0);
        assert_eq!(p.to_string(), "1.2/1.2/2 mm");
    }

    #[test]
    fn test_with_companion_replaces_precipitation_and_icon() {
        let mut noon = RawInterval::empty(at(12), at(12));
        noon.temperature = Some(TemperatureMeasurement::celsius(3.0));
        noon.precipitation = Some(PrecipitationMeasurement::millimeters(9.0));
        noon.icon_code = Some(1);

        let mut morning = RawInterval::empty(at(6), at(12));
        morning.precipitation = Some(PrecipitationMeasurement::millimeters(1.0));
        morning.icon_code = Some(10);

        let record = ForecastRecord::from_interval(&noon).with_companion(&morning);
        assert_eq!(record.precipitation.map(|p| p.amount), Some(1.0));
        assert_eq!(record.icon_code, Some(10));
        assert_eq!(record.temperature, noon.temperature);
    }

    #[test]
    fn test_with_added_precipitation_sums_amounts() {
        let mut noon = RawInterval::empty(at(12), at(12));
        noon.precipitation = Some(PrecipitationMeasurement::millimeters(1.0));
        let mut afternoon = RawInterval::empty(at(12), at(18));
        afternoon.precipitation = Some(PrecipitationMeasurement::millimeters(0.5));

        let record = ForecastRecord::from_interval(&noon).with_added_precipitation(&afternoon);
        assert_eq!(record.precipitation.map(|p| p.amount), Some(1.5));
    }

    #[test]
    fn test_with_added_precipitation_adopts_when_missing() {
        let noon = RawInterval::empty(at(12), at(12));
        let mut afternoon = RawInterval::empty(at(12), at(18));
        afternoon.precipitation = Some(PrecipitationMeasurement::millimeters(0.7));

        let record = ForecastRecord::from_interval(&noon).with_added_precipitation(&afternoon);
        assert_eq!(record.precipitation.map(|p| p.amount), Some(0.7));
    }

    #[test]
    fn test_missing_wind_speed_is_zero() {
        let record = ForecastRecord::from_interval(&RawInterval::empty(at(9), at(11)));
        assert_eq!(record.wind_speed, 0.0);
        assert!(record.display_label.is_empty());
    }
}
