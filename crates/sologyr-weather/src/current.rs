//! Current conditions from the secondary JSON source.

use serde::{Deserialize, Serialize};

use crate::types::TemperatureMeasurement;

/// Condition icon shared by the current-conditions source and the watch.
///
/// The discriminants are the byte values the watch face expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConditionIcon {
    #[default]
    Unknown,
    Sun,
    PartlyCloud,
    Cloud,
    Rain,
    Sleet,
    Snow,
    Fog,
    DarkSun,
    DarkPartlyCloud,
    Wind,
}

impl ConditionIcon {
    /// Match order matters: "partly-cloudy-day" must win over "cloudy".
    const KEY_PRIORITY: [(&'static str, ConditionIcon); 10] = [
        ("clear-day", ConditionIcon::Sun),
        ("clear-night", ConditionIcon::DarkSun),
        ("partly-cloudy-day", ConditionIcon::PartlyCloud),
        ("partly-cloudy-night", ConditionIcon::DarkPartlyCloud),
        ("rain", ConditionIcon::Rain),
        ("snow", ConditionIcon::Snow),
        ("sleet", ConditionIcon::Sleet),
        ("wind", ConditionIcon::Wind),
        ("fog", ConditionIcon::Fog),
        ("cloudy", ConditionIcon::Cloud),
    ];

    /// Map a textual icon key; the first substring match wins.
    pub fn from_icon_key(key: &str) -> Self {
        Self::KEY_PRIORITY
            .iter()
            .find(|(needle, _)| key.contains(needle))
            .map(|(_, icon)| *icon)
            .unwrap_or(ConditionIcon::Unknown)
    }

    /// Byte value sent to the watch
    pub fn code(&self) -> u8 {
        match self {
            ConditionIcon::Unknown => 0,
            ConditionIcon::Sun => 1,
            ConditionIcon::PartlyCloud => 3,
            ConditionIcon::Cloud => 4,
            ConditionIcon::Rain => 10,
            ConditionIcon::Sleet => 12,
            ConditionIcon::Snow => 13,
            ConditionIcon::Fog => 15,
            ConditionIcon::DarkSun => 101,
            ConditionIcon::DarkPartlyCloud => 103,
            ConditionIcon::Wind => 200,
        }
    }
}

/// Raw `currently` block of the response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CurrentlyBlock {
    temperature: Option<f64>,
    cloud_cover: Option<f64>,
    wind_speed: Option<f64>,
    wind_bearing: Option<f64>,
    humidity: Option<f64>,
    dew_point: Option<f64>,
    pressure: Option<f64>,
    ozone: Option<f64>,
    precip_intensity: Option<f64>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    currently: CurrentlyBlock,
}

/// Snapshot of current conditions. Requested in SI units, so Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: Option<TemperatureMeasurement>,
    /// Fraction 0.0 - 1.0
    pub cloud_cover: f64,
    pub wind_speed: f64,
    pub wind_bearing: f64,
    pub humidity: f64,
    pub dew_point: f64,
    pub pressure: f64,
    pub ozone: f64,
    pub precip_intensity: f64,
    pub icon: ConditionIcon,
}

impl CurrentConditions {
    /// Parse a `{"currently": {...}}` response body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let response: CurrentResponse = serde_json::from_slice(body)?;
        Ok(Self::from(response.currently))
    }

    /// Watch temperature text, rounded to whole degrees
    pub fn temperature_text(&self) -> Option<String> {
        self.temperature
            .map(|t| format!("{}°", t.value.round() as i64))
    }

    /// Cloud cover as a whole percentage
    pub fn cloud_cover_percent(&self) -> u8 {
        (self.cloud_cover.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

impl From<CurrentlyBlock> for CurrentConditions {
    fn from(block: CurrentlyBlock) -> Self {
        Self {
            temperature: block.temperature.map(TemperatureMeasurement::celsius),
            cloud_cover: block.cloud_cover.unwrap_or_default(),
            wind_speed: block.wind_speed.unwrap_or_default(),
            wind_bearing: block.wind_bearing.unwrap_or_default(),
            humidity: block.humidity.unwrap_or_default(),
            dew_point: block.dew_point.unwrap_or_default(),
            pressure: block.pressure.unwrap_or_default(),
            ozone: block.ozone.unwrap_or_default(),
            precip_intensity: block.precip_intensity.unwrap_or_default(),
            icon: block
                .icon
                .as_deref()
                .map(ConditionIcon::from_icon_key)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_key_priority() {
        assert_eq!(ConditionIcon::from_icon_key("clear-day"), ConditionIcon::Sun);
        assert_eq!(ConditionIcon::from_icon_key("clear-night"), ConditionIcon::DarkSun);
        assert_eq!(ConditionIcon::from_icon_key("partly-cloudy-day"), ConditionIcon::PartlyCloud);
        assert_eq!(
            ConditionIcon::from_icon_key("partly-cloudy-night"),
            ConditionIcon::DarkPartlyCloud
        );
        assert_eq!(ConditionIcon::from_icon_key("cloudy"), ConditionIcon::Cloud);
        assert_eq!(ConditionIcon::from_icon_key("freezing-rain"), ConditionIcon::Rain);
        assert_eq!(ConditionIcon::from_icon_key("windy-cloudy"), ConditionIcon::Wind);
        assert_eq!(ConditionIcon::from_icon_key("hail"), ConditionIcon::Unknown);
        assert_eq!(ConditionIcon::from_icon_key(""), ConditionIcon::Unknown);
    }

    #[test]
    fn test_icon_codes() {
        assert_eq!(ConditionIcon::Unknown.code(), 0);
        assert_eq!(ConditionIcon::PartlyCloud.code(), 3);
        assert_eq!(ConditionIcon::DarkPartlyCloud.code(), 103);
        assert_eq!(ConditionIcon::Wind.code(), 200);
    }

    #[test]
    fn test_from_json() {
        let body = br#"{
            "latitude": 59.91,
            "longitude": 10.74,
            "currently": {
                "time": 1773489600,
                "summary": "Light Rain",
                "icon": "rain",
                "precipIntensity": 0.35,
                "temperature": 3.6,
                "dewPoint": 1.2,
                "humidity": 0.84,
                "windSpeed": 4.1,
                "windBearing": 210,
                "cloudCover": 0.87,
                "pressure": 1003.4,
                "ozone": 312.5
            }
        }"#;
        let current = CurrentConditions::from_json(body).unwrap();
        assert_eq!(current.icon, ConditionIcon::Rain);
        assert_eq!(current.temperature, Some(TemperatureMeasurement::celsius(3.6)));
        assert_eq!(current.wind_bearing, 210.0);
        assert_eq!(current.temperature_text().as_deref(), Some("4°"));
        assert_eq!(current.cloud_cover_percent(), 87);
    }

    #[test]
    fn test_missing_fields_default() {
        let current = CurrentConditions::from_json(br#"{"currently": {}}"#).unwrap();
        assert!(current.temperature.is_none());
        assert_eq!(current.icon, ConditionIcon::Unknown);
        assert_eq!(current.cloud_cover_percent(), 0);
    }

    #[test]
    fn test_missing_block_is_error() {
        assert!(CurrentConditions::from_json(br#"{"daily": {}}"#).is_err());
    }
}
