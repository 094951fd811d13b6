//! Interval feed parser.
//!
//! Reads a `weatherdata` document and yields one [`RawInterval`] per
//! `<time from=".." to="..">` element, in document order. Order is never
//! changed here; the assembler relies on it.

use std::io::{self, BufRead, BufReader, Read};

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::types::{
    ParseError, PrecipitationMeasurement, PrecipitationUnit, RawInterval, TemperatureMeasurement,
    TemperatureUnit,
};

const ROOT_ELEMENT: &[u8] = b"weatherdata";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parse a feed timestamp (`yyyy-MM-ddTHH:mm:ssZ`, always UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ParseError::Timestamp {
            value: value.to_string(),
            source: Some(e),
        })
}

/// Parse a complete feed document.
///
/// Takes ownership of the stream and reads it to the end before returning,
/// whether parsing succeeded or not.
pub fn parse<R: Read>(source: R) -> Result<Vec<RawInterval>, ParseError> {
    let mut reader = Reader::from_reader(BufReader::new(source));
    reader.config_mut().trim_text(true);

    let result = read_intervals(&mut reader);
    if result.is_err() {
        // Leave the stream at EOF; a read error here changes nothing
        let _ = io::copy(reader.get_mut(), &mut io::sink());
    }
    result
}

fn read_intervals<B: BufRead>(reader: &mut Reader<B>) -> Result<Vec<RawInterval>, ParseError> {
    let mut buf = Vec::new();
    let mut intervals = Vec::new();
    let mut current: Option<RawInterval> = None;
    let mut seen_root = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.local_name();

                if !seen_root {
                    if name.as_ref() != ROOT_ELEMENT {
                        return Err(ParseError::Structure(format!(
                            "expected <weatherdata> root, found <{}>",
                            String::from_utf8_lossy(name.as_ref())
                        )));
                    }
                    seen_root = true;
                } else if name.as_ref() == b"time" {
                    let interval = start_interval(e)?;
                    if is_empty {
                        intervals.push(interval);
                    } else {
                        current = Some(interval);
                    }
                } else if let Some(interval) = current.as_mut() {
                    apply_measurement(interval, e)?;
                }
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"time" {
                    if let Some(interval) = current.take() {
                        intervals.push(interval);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseError::Structure("document has no root element".into()));
    }

    tracing::debug!("Parsed {} feed intervals", intervals.len());
    Ok(intervals)
}

fn start_interval(e: &BytesStart<'_>) -> Result<RawInterval, ParseError> {
    let from = required_timestamp(e, "from")?;
    let to = required_timestamp(e, "to")?;
    Ok(RawInterval::empty(from, to))
}

fn required_timestamp(e: &BytesStart<'_>, key: &str) -> Result<DateTime<Utc>, ParseError> {
    match attribute(e, key)? {
        Some(value) => parse_timestamp(&value),
        None => Err(ParseError::Timestamp {
            value: String::new(),
            source: None,
        }),
    }
}

fn apply_measurement(interval: &mut RawInterval, e: &BytesStart<'_>) -> Result<(), ParseError> {
    match e.local_name().as_ref() {
        b"temperature" => {
            let value = required_number(e, "temperature", "value")?;
            let unit = attribute(e, "unit")?;
            interval.temperature = Some(TemperatureMeasurement::new(
                value,
                TemperatureUnit::from_feed(unit.as_deref()),
            ));
        }
        b"windSpeed" => {
            interval.wind_speed = Some(required_number(e, "windSpeed", "mps")?);
        }
        b"precipitation" => {
            let value = required_number(e, "precipitation", "value")?;
            let min = optional_number(e, "precipitation", "minvalue")?;
            let max = optional_number(e, "precipitation", "maxvalue")?;
            let unit = attribute(e, "unit")?;
            // Optimistic reading: the upper bound is the amount when present
            interval.precipitation = Some(PrecipitationMeasurement::with_bounds(
                max.unwrap_or(value),
                min,
                max,
                PrecipitationUnit::from_feed(unit.as_deref()),
            ));
        }
        b"symbol" => {
            let number = required_number(e, "symbol", "number")?;
            interval.icon_code = Some(number as i32);
        }
        _ => {}
    }
    Ok(())
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn optional_number(
    e: &BytesStart<'_>,
    element: &'static str,
    key: &'static str,
) -> Result<Option<f64>, ParseError> {
    match attribute(e, key)? {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ParseError::NumberFormat {
                element,
                attribute: key,
                value: Some(raw),
            }),
        None => Ok(None),
    }
}

fn required_number(
    e: &BytesStart<'_>,
    element: &'static str,
    key: &'static str,
) -> Result<f64, ParseError> {
    optional_number(e, element, key)?.ok_or(ParseError::NumberFormat {
        element,
        attribute: key,
        value: None,
    })
}
