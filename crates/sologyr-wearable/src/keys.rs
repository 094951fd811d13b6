//! Dictionary keys understood by the watch app.

// Inbound commands
pub const HELLO: u32 = 1;
pub const ACTIVE_INTERVAL: u32 = 2;
pub const TAP: u32 = 3;

// Location
pub const LAT: u32 = 10;
pub const LON: u32 = 11;
pub const SUNRISE_HOUR: u32 = 12;
pub const SUNRISE_MINUTE: u32 = 13;
pub const SUNSET_HOUR: u32 = 14;
pub const SUNSET_MINUTE: u32 = 15;
pub const LOCATION_NAME: u32 = 16;

// Current conditions
pub const TEMPERATURE: u32 = 20;
pub const WEATHER_ICON: u32 = 21;
pub const CLOUD_COVER: u32 = 22;

/// 1 opens a bulk transaction, 0 closes it
pub const FORECAST_TRANSACTION: u32 = 39;
pub const NOWCAST_MINUTES: u32 = 40;
pub const NOWCAST_PRECIPITATION: u32 = 41;
pub const PRECIPITATION_MINUTES: u32 = 42;
pub const FORECAST_PRECIPITATION: u32 = 43;
pub const FORECAST_PRECIPITATION_MIN: u32 = 44;
pub const FORECAST_PRECIPITATION_MAX: u32 = 45;
pub const FORECAST_MINUTES: u32 = 46;
/// Tenths of a degree
pub const FORECAST_TEMPERATURE: u32 = 47;

pub const PREF_UPDATE_FREQ: u32 = 100;

pub const TRANSACTION_BEGIN: u8 = 1;
pub const TRANSACTION_END: u8 = 0;
