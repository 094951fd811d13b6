//! Forecast window assembly.
//!
//! Turns the parsed interval stream into a fixed number of per-day records:
//! record 0 is "now", record k is the noon snapshot of today + k with
//! precipitation gathered from the 06-12 and 12-18 sub-windows.
//!
//! The input is walked once with a forward-only index. The feed is expected
//! to be non-decreasing by start time within each day's block.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Timelike, Utc};
use sologyr_core::ForecastConfig;

use crate::types::{AssemblyError, ForecastRecord, RawInterval};

const DAYS_IN_LONGEST_MONTH: usize = 31;
const MONTHS_IN_YEAR: usize = 12;

/// Day-of-month and month names used to build record labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTables {
    pub day_names: Vec<String>,
    pub month_names: Vec<String>,
    pub separator: String,
}

impl LabelTables {
    fn check(&self) -> Result<(), AssemblyError> {
        if self.day_names.len() < DAYS_IN_LONGEST_MONTH || self.month_names.len() < MONTHS_IN_YEAR {
            return Err(AssemblyError::Resource {
                days: self.day_names.len(),
                months: self.month_names.len(),
            });
        }
        Ok(())
    }

    fn label_for(&self, time: DateTime<Utc>) -> Result<String, AssemblyError> {
        let resource = || AssemblyError::Resource {
            days: self.day_names.len(),
            months: self.month_names.len(),
        };
        let day = self.day_names.get(time.day0() as usize).ok_or_else(resource)?;
        let month = self.month_names.get(time.month0() as usize).ok_or_else(resource)?;
        Ok(format!("{}{}{}", day, self.separator, month))
    }
}

/// Builds the per-day forecast window out of raw intervals
#[derive(Debug, Clone)]
pub struct WindowAssembler {
    horizon: usize,
    labels: LabelTables,
}

impl WindowAssembler {
    pub fn new(horizon: usize, labels: LabelTables) -> Self {
        Self { horizon, labels }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(
            config.horizon_days,
            LabelTables {
                day_names: config.day_names.clone(),
                month_names: config.month_names.clone(),
                separator: config.label_separator.clone(),
            },
        )
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Assemble `horizon` records, with day k anchored at `today + k`.
    ///
    /// Either the full window is returned or an error; never a partial window.
    pub fn assemble(
        &self,
        raw: &[RawInterval],
        today: NaiveDate,
    ) -> Result<Vec<ForecastRecord>, AssemblyError> {
        if self.horizon == 0 {
            return Err(AssemblyError::InsufficientData(
                "window of zero days requested".to_string(),
            ));
        }
        let needed = 2 * self.horizon;
        if raw.len() < needed {
            return Err(AssemblyError::InsufficientData(format!(
                "{} intervals, need at least {}",
                raw.len(),
                needed
            )));
        }

        let now = assemble_now(&raw[0], &raw[1])?;
        self.labels.check()?;

        let mut records = Vec::with_capacity(self.horizon);
        records.push(now);

        let mut cursor = Cursor { raw, position: 2 };
        for k in 1..self.horizon {
            let date = today
                .checked_add_days(Days::new(k as u64))
                .ok_or_else(|| AssemblyError::InsufficientData(format!("day {} out of range", k)))?;
            let record = self.assemble_day(&mut cursor, today, date)?;
            tracing::debug!(
                "Assembled {}: temp={:?} precip={:?}",
                date,
                record.temperature.map(|t| t.value),
                record.precipitation.map(|p| p.amount)
            );
            records.push(record);
        }

        Ok(records)
    }

    fn assemble_day(
        &self,
        cursor: &mut Cursor<'_>,
        today: NaiveDate,
        date: NaiveDate,
    ) -> Result<ForecastRecord, AssemblyError> {
        let noon = at(date, 12);
        let noon_entry = cursor.find_noon(today, date, noon)?;
        let mut record = ForecastRecord::from_interval(noon_entry);

        let morning_start = at(date, 6);
        let noon_end = record.end_time;
        if let Some(morning) =
            cursor.scan_same_day(date, |e| e.start_time == morning_start && e.end_time == noon_end)
        {
            record = record.with_companion(morning);
        }

        let evening_end = at(date, 18);
        if let Some(afternoon) =
            cursor.scan_same_day(date, |e| e.start_time == noon_end && e.end_time == evening_end)
        {
            record = record.with_added_precipitation(afternoon);
        }

        let label = self.labels.label_for(record.end_time)?;
        Ok(record.with_label(label))
    }
}

/// Day 0: the first entry, with precipitation and icon from the second.
fn assemble_now(rep: &RawInterval, extra: &RawInterval) -> Result<ForecastRecord, AssemblyError> {
    if rep.end_time != extra.end_time {
        return Err(AssemblyError::Consistency {
            first_end: rep.end_time,
            second_end: extra.end_time,
        });
    }
    Ok(ForecastRecord::from_interval(rep).with_companion(extra))
}

fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) + chrono::Duration::hours(i64::from(hour))).and_utc()
}

struct Cursor<'a> {
    raw: &'a [RawInterval],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Advance to the instantaneous noon entry for `date`.
    fn find_noon(
        &mut self,
        today: NaiveDate,
        date: NaiveDate,
        noon: DateTime<Utc>,
    ) -> Result<&'a RawInterval, AssemblyError> {
        while let Some(entry) = self.raw.get(self.position) {
            self.position += 1;
            if entry.start_time == noon && entry.end_time == noon {
                return Ok(entry);
            }
            if is_noon_instant(entry) {
                let seen = entry.start_time.date_naive();
                if seen > today && seen < date {
                    return Err(AssemblyError::DuplicateDate { date: seen });
                }
            }
        }
        Err(AssemblyError::InsufficientData(format!(
            "no noon snapshot for {}",
            date
        )))
    }

    /// Advance until `wanted` matches or an entry ends on another date.
    ///
    /// The entry that ends on another date is left in place for the next search.
    fn scan_same_day(
        &mut self,
        date: NaiveDate,
        wanted: impl Fn(&RawInterval) -> bool,
    ) -> Option<&'a RawInterval> {
        while let Some(entry) = self.raw.get(self.position) {
            if entry.end_date() != date {
                return None;
            }
            self.position += 1;
            if wanted(entry) {
                return Some(entry);
            }
        }
        None
    }
}

fn is_noon_instant(entry: &RawInterval) -> bool {
    let t = entry.start_time;
    entry.is_instant() && t.hour() == 12 && t.minute() == 0 && t.second() == 0
}
