//! Синтез будущих признаков, когда реального датасета на запрошенный год нет.
//!
//! Каждый день диапазона скрещивается со всеми локациями, календарные поля берутся
//! из даты, а остальные колонки заполняются модой (строковые) или средним (числовые)
//! по историческим данным. Колонка без единого значения в истории остаётся пустой.

use chrono::NaiveDate;
use polars::prelude::Column;
use tracing::{debug, warn};

use crate::constants::{
    COL_DAY, COL_HOUR, COL_LOCATION, COL_MONTH, COL_YEAR, HOUR_STEP, HOURS_PER_CYCLE,
};
use crate::error::ForecastError;
use crate::frame::{
    Frame, is_numeric, mean, null_column_like, numeric_column, numeric_mode, text_column, text_mode,
};
use crate::location::Location;
use crate::schema::{ColumnKind, Schema};
use crate::series::{FeatureTable, calendar_parts};

#[derive(Clone, Debug, PartialEq)]
enum FillValue {
    Number(f64),
    Label(String),
}

/// Строит синтетическую таблицу признаков на `[start, end]`.
///
/// `reference` — исторические признаки без целевой колонки; из них берутся порядок
/// колонок и значения для заполнения. `start > end` даёт пустую таблицу.
pub fn synthesize(
    reference: &Frame,
    schema: &Schema,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<FeatureTable, ForecastError> {
    if reference.is_empty() {
        return Err(ForecastError::data(
            "reference dataset is empty, cannot derive fill values",
        ));
    }

    let days: Vec<NaiveDate> = start.iter_days().take_while(|day| *day <= end).collect();
    let keys: Vec<(NaiveDate, Location)> = days
        .iter()
        .flat_map(|day| Location::ALL.map(|location| (*day, location)))
        .collect();

    let columns = reference
        .columns()
        .iter()
        .map(|column| synthesize_column(column, schema, &keys))
        .collect::<Result<Vec<_>, _>>()?;
    let dates = keys.iter().map(|(day, _)| *day).collect();

    debug!(
        days = days.len(),
        rows = keys.len(),
        columns = columns.len(),
        "Synthesized future feature rows"
    );
    FeatureTable::new(Frame::new(columns)?, dates)
}

fn synthesize_column(
    column: &Column,
    schema: &Schema,
    keys: &[(NaiveDate, Location)],
) -> Result<Column, ForecastError> {
    let name = column.name().as_str();
    let generated = |value: fn(usize, NaiveDate, Location) -> f64| {
        numeric_column(
            name,
            keys.iter()
                .enumerate()
                .map(|(idx, (day, location))| Some(value(idx, *day, *location)))
                .collect(),
        )
    };

    let column = match name {
        COL_YEAR => generated(|_, day, _| calendar_parts(day).0),
        COL_MONTH => generated(|_, day, _| calendar_parts(day).1),
        COL_DAY => generated(|_, day, _| calendar_parts(day).2),
        COL_LOCATION => generated(|_, _, location| f64::from(location.code())),
        COL_HOUR => generated(|idx, _, _| hour_marker(idx)),
        _ => match fill_value(column, schema)? {
            Some(FillValue::Number(value)) => numeric_column(name, vec![Some(value); keys.len()]),
            Some(FillValue::Label(label)) => text_column(name, vec![Some(label); keys.len()]),
            None => {
                warn!(column = name, "Column has no observed values, future rows stay empty");
                null_column_like(column, keys.len())
            }
        },
    };
    Ok(column)
}

/// Маркер часа по позиции строки: 0, 100, …, 2300, затем снова 0.
fn hour_marker(idx: usize) -> f64 {
    let slot = (idx % HOURS_PER_CYCLE as usize) as u32;
    f64::from(slot * HOUR_STEP)
}

/// Значение для заполнения; `None`, если в истории колонка пуста.
fn fill_value(column: &Column, schema: &Schema) -> Result<Option<FillValue>, ForecastError> {
    let kind = schema
        .kind_of(column.name().as_str())
        .unwrap_or(if is_numeric(column) {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        });
    let value = match (kind.is_textual(), is_numeric(column)) {
        (false, _) => mean(column).map(FillValue::Number),
        (true, true) => numeric_mode(column)?.map(FillValue::Number),
        (true, false) => text_mode(column)?.map(FillValue::Label),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DEFAULT_MAX_CATEGORIES;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Исторический год 2021: `rows` строк по трём локациям.
    fn history(rows: usize) -> Frame {
        let idx = 0..rows;
        Frame::new(vec![
            numeric_column("Year", idx.clone().map(|_| Some(2021.0)).collect()),
            numeric_column("Month", idx.clone().map(|i| Some((i % 12 + 1) as f64)).collect()),
            numeric_column("Day", idx.clone().map(|i| Some((i % 28 + 1) as f64)).collect()),
            numeric_column("Hour", idx.clone().map(|i| Some((i % 24 * 100) as f64)).collect()),
            numeric_column(
                "LocationInNum",
                idx.clone().map(|i| Some((i % 3 + 1) as f64)).collect(),
            ),
            numeric_column("Humidity", idx.clone().map(|i| Some((i % 2) as f64 * 10.0 + 70.0)).collect()),
            text_column(
                "Condition",
                idx.clone()
                    .map(|i| Some(if i % 3 == 0 { "Rain" } else { "Cloudy" }.to_string()))
                    .collect(),
            ),
            numeric_column("Temperature", idx.map(|i| Some(25.0 + (i % 10) as f64)).collect()),
        ])
        .unwrap()
    }

    fn synthesize_features(rows: usize, start: NaiveDate, end: NaiveDate) -> FeatureTable {
        let features = history(rows).without("Temperature").unwrap();
        let schema = Schema::infer(&features, DEFAULT_MAX_CATEGORIES).unwrap();
        synthesize(&features, &schema, start, end).unwrap()
    }

    #[test]
    fn two_days_yield_six_rows_with_leading_hours() {
        let table = synthesize_features(500, ymd(2025, 1, 1), ymd(2025, 1, 2));
        assert_eq!(table.height(), 6);
        assert_eq!(
            table.frame().numeric("Hour").unwrap(),
            &[Some(0.0), Some(100.0), Some(200.0), Some(300.0), Some(400.0), Some(500.0)]
        );
        assert_eq!(
            table.frame().numeric("LocationInNum").unwrap(),
            &[Some(1.0), Some(2.0), Some(3.0), Some(1.0), Some(2.0), Some(3.0)]
        );
        assert_eq!(
            table.dates(),
            &[
                ymd(2025, 1, 1),
                ymd(2025, 1, 1),
                ymd(2025, 1, 1),
                ymd(2025, 1, 2),
                ymd(2025, 1, 2),
                ymd(2025, 1, 2)
            ]
        );
    }

    #[test]
    fn row_count_is_days_times_locations() {
        for (start, end, days) in [
            (ymd(2025, 1, 1), ymd(2025, 1, 1), 1),
            (ymd(2024, 2, 27), ymd(2024, 3, 1), 4),
            (ymd(2025, 1, 1), ymd(2025, 12, 31), 365),
        ] {
            assert_eq!(synthesize_features(50, start, end).height(), days * 3);
        }
    }

    #[test]
    fn hours_wrap_every_twenty_four_rows() {
        let table = synthesize_features(50, ymd(2025, 1, 1), ymd(2025, 1, 10));
        let hours = table.frame().numeric("Hour").unwrap();
        for (idx, hour) in hours.iter().enumerate() {
            assert_eq!(*hour, Some(((idx % 24) * 100) as f64));
        }
    }

    #[test]
    fn columns_follow_history_order_and_are_filled() {
        let table = synthesize_features(500, ymd(2025, 6, 1), ymd(2025, 6, 3));
        let frame = table.frame();
        assert_eq!(
            frame.column_names().collect::<Vec<_>>(),
            vec!["Year", "Month", "Day", "Hour", "LocationInNum", "Humidity", "Condition"]
        );
        for column in frame.columns() {
            assert_eq!(column.null_count(), 0, "{}", column.name());
        }
        assert_eq!(frame.numeric("Humidity").unwrap()[0], Some(75.0));
        assert_eq!(
            frame.text("Condition").unwrap(),
            vec![Some("Cloudy"); 9]
        );
        assert_eq!(frame.numeric("Year").unwrap()[0], Some(2025.0));
    }

    #[test]
    fn columns_without_history_values_stay_empty() {
        let rows = 60;
        let features = history(rows)
            .without("Temperature")
            .unwrap()
            .with_column(text_column("Visibility", vec![None; rows]))
            .unwrap()
            .with_column(numeric_column("Pressure", vec![None; rows]))
            .unwrap();
        let schema = Schema::infer(&features, DEFAULT_MAX_CATEGORIES).unwrap();

        let table = synthesize(&features, &schema, ymd(2025, 1, 1), ymd(2025, 1, 2)).unwrap();
        let frame = table.frame();
        assert_eq!(table.height(), 6);
        assert_eq!(frame.column("Visibility").unwrap().null_count(), 6);
        assert_eq!(frame.column("Pressure").unwrap().null_count(), 6);
        assert!(is_numeric(frame.column("Pressure").unwrap()));
        assert_eq!(frame.numeric("Humidity").unwrap()[0], Some(75.0));
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let first = synthesize_features(120, ymd(2025, 1, 1), ymd(2025, 2, 1));
        let second = synthesize_features(120, ymd(2025, 1, 1), ymd(2025, 2, 1));
        assert_eq!(first, second);
    }

    #[test]
    fn reversed_range_is_empty() {
        let table = synthesize_features(10, ymd(2025, 1, 2), ymd(2025, 1, 1));
        assert!(table.is_empty());
    }

    #[test]
    fn empty_reference_is_a_data_error() {
        let features = history(0).without("Temperature").unwrap();
        let schema = Schema::infer(&features, DEFAULT_MAX_CATEGORIES).unwrap();
        let result = synthesize(&features, &schema, ymd(2025, 1, 1), ymd(2025, 1, 2));
        assert!(matches!(result, Err(ForecastError::Data(_))));
    }
}
