//! Таблица признаков для прогноза: колонки датасета плюс дата каждой строки.

use std::ops::RangeInclusive;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::constants::{COL_DATETIME, COL_DAY, COL_LOCATION, COL_MONTH, COL_YEAR, DATE_FORMAT};
use crate::error::ForecastError;
use crate::frame::{Frame, is_numeric, text_column};
use crate::location::Location;

const TIME_FORMAT_NAIVE: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S";
const MONTHS: RangeInclusive<f64> = 1.0..=12.0;
const DAYS: RangeInclusive<f64> = 1.0..=31.0;

#[derive(Clone, Copy, Debug)]
enum DateFormatHint {
    Date,
    Naive,
    Iso,
    Rfc3339,
}

impl DateFormatHint {
    const ALL: [Self; 4] = [Self::Date, Self::Naive, Self::Iso, Self::Rfc3339];

    fn parse(self, raw: &str) -> Option<NaiveDate> {
        match self {
            Self::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT).ok(),
            Self::Naive => NaiveDateTime::parse_from_str(raw, TIME_FORMAT_NAIVE)
                .ok()
                .map(|dt| dt.date()),
            Self::Iso => NaiveDateTime::parse_from_str(raw, TIME_FORMAT_ISO)
                .ok()
                .map(|dt| dt.date()),
            Self::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive()),
        }
    }
}

/// Признаки для предсказания; `dates[i]` — дата строки `i` фрейма.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    frame: Frame,
    dates: Vec<NaiveDate>,
}

impl FeatureTable {
    pub fn new(frame: Frame, dates: Vec<NaiveDate>) -> Result<Self, ForecastError> {
        if frame.height() != dates.len() && !frame.columns().is_empty() {
            return Err(ForecastError::data(format!(
                "feature table has {} rows but {} dates",
                frame.height(),
                dates.len()
            )));
        }
        Ok(Self { frame, dates })
    }

    /// Берёт даты из колонки `DateTime`, а если её нет — собирает из `Year`/`Month`/`Day`.
    pub fn from_frame(frame: Frame) -> Result<Self, ForecastError> {
        if let Some(column) = frame.column(COL_DATETIME) {
            if is_numeric(column) {
                return Err(ForecastError::schema(format!(
                    "column '{COL_DATETIME}' must contain dates"
                )));
            }
            let dates = parse_date_column(&frame.text(COL_DATETIME).unwrap_or_default())?;
            return Self::new(frame.without(COL_DATETIME)?, dates);
        }

        let dates = dates_from_calendar(&frame)?;
        Self::new(frame, dates)
    }

    pub fn load_csv(path: &Path) -> Result<Self, ForecastError> {
        Self::from_frame(Frame::read_csv(path)?)
    }

    /// Пишет признаки и дату строки последней колонкой.
    pub fn write_csv(&self, path: &Path) -> Result<(), ForecastError> {
        let dates = text_column(
            COL_DATETIME,
            self.dates
                .iter()
                .map(|date| Some(date.format(DATE_FORMAT).to_string()))
                .collect(),
        );
        self.frame.with_column(dates)?.write_csv(path)
    }

    pub const fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn height(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Локация каждой строки; неизвестные коды и пропуски дают `None`.
    pub fn locations(&self) -> Vec<Option<Location>> {
        self.frame.numeric(COL_LOCATION).map_or_else(
            || vec![None; self.height()],
            |codes| {
                codes
                    .iter()
                    .map(|code| code.and_then(Location::from_value))
                    .collect()
            },
        )
    }
}

fn parse_date_column(values: &[Option<&str>]) -> Result<Vec<NaiveDate>, ForecastError> {
    let mut hint = None;
    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            let raw = value.ok_or_else(|| ForecastError::data(format!("row {row}: empty {COL_DATETIME}")))?;
            parse_date_with_hint(raw, &mut hint).ok_or_else(|| {
                ForecastError::data(format!("row {row}: unrecognized date '{raw}'"))
            })
        })
        .collect()
}

/// Пробует сначала формат, сработавший на предыдущей строке.
fn parse_date_with_hint(raw: &str, hint: &mut Option<DateFormatHint>) -> Option<NaiveDate> {
    if let Some(known) = *hint
        && let Some(parsed) = known.parse(raw)
    {
        return Some(parsed);
    }
    DateFormatHint::ALL.into_iter().find_map(|candidate| {
        let parsed = candidate.parse(raw)?;
        *hint = Some(candidate);
        Some(parsed)
    })
}

fn dates_from_calendar(frame: &Frame) -> Result<Vec<NaiveDate>, ForecastError> {
    let part = |name: &str| {
        frame.numeric(name).ok_or_else(|| {
            ForecastError::schema(format!(
                "numeric column '{name}' is required to derive {COL_DATETIME}"
            ))
        })
    };
    let (years, months, days) = (part(COL_YEAR)?, part(COL_MONTH)?, part(COL_DAY)?);
    let years_range = f64::from(i32::MIN)..=f64::from(i32::MAX);

    (0..frame.height())
        .map(|row| {
            let year = calendar_field(years[row], &years_range);
            let month = calendar_field(months[row], &MONTHS);
            let day = calendar_field(days[row], &DAYS);
            let date = match (year, month, day) {
                (Some(y), Some(m), Some(d)) => {
                    NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
                }
                _ => None,
            };
            date.ok_or_else(|| {
                ForecastError::data(format!(
                    "row {row}: invalid calendar date {}-{}-{}",
                    display_cell(years[row]),
                    display_cell(months[row]),
                    display_cell(days[row])
                ))
            })
        })
        .collect()
}

/// Целое значение из допустимого диапазона; дробные значения не округляются.
fn calendar_field(value: Option<f64>, range: &RangeInclusive<f64>) -> Option<f64> {
    value.filter(|value| value.fract() == 0.0 && range.contains(value))
}

fn display_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |value| value.to_string())
}

/// Календарные поля даты в виде, в котором они лежат в датасете.
pub fn calendar_parts(date: NaiveDate) -> (f64, f64, f64) {
    (
        f64::from(date.year()),
        f64::from(date.month()),
        f64::from(date.day()),
    )
}
