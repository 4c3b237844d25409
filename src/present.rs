//! Отбор прогнозов по диапазону дат и локации для таблицы и графика.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::constants::DATE_FORMAT;
use crate::error::ForecastError;
use crate::location::Location;
use crate::series::FeatureTable;

pub const NO_PREDICTIONS_MESSAGE: &str =
    "No predictions found for the selected location and date range";
pub const NO_PLOT_DATA_MESSAGE: &str = "No data available for plotting";

#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub location: Location,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionTable {
    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ForecastError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| ForecastError::io(parent, err))?;
        }

        let mut writer = csv::Writer::from_path(path).map_err(|err| ForecastError::csv(path, err))?;
        writer
            .write_record(["DateTime", "Location", "PredictedValue"])
            .map_err(|err| ForecastError::csv(path, err))?;
        for row in &self.rows {
            writer
                .write_record([
                    row.date.format(DATE_FORMAT).to_string(),
                    row.location.name().to_string(),
                    format!("{:.6}", row.value),
                ])
                .map_err(|err| ForecastError::csv(path, err))?;
        }
        writer.flush().map_err(|err| ForecastError::io(path, err))?;
        Ok(())
    }
}

/// Ряд для линейного графика, упорядоченный по дате.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionSeries {
    pub location: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl PredictionSeries {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Строки с `start <= DateTime <= end` и заданной локацией в исходном порядке.
/// Неизвестное имя локации даёт пустую таблицу.
pub fn filter_and_tabulate(
    table: &FeatureTable,
    predictions: &[f64],
    start: NaiveDate,
    end: NaiveDate,
    location: &str,
) -> Result<PredictionTable, ForecastError> {
    if predictions.len() != table.height() {
        return Err(ForecastError::data(format!(
            "{} predictions for {} feature rows",
            predictions.len(),
            table.height()
        )));
    }
    let Some(selected) = Location::from_name(location) else {
        return Ok(PredictionTable::default());
    };

    let rows = table
        .dates()
        .iter()
        .zip(table.locations())
        .zip(predictions)
        .filter(|((date, row_location), _)| {
            (start..=end).contains(*date) && *row_location == Some(selected)
        })
        .map(|((date, _), value)| PredictionRow {
            date: *date,
            location: selected,
            value: *value,
        })
        .collect();
    Ok(PredictionTable { rows })
}

/// Тот же отбор, что и для таблицы, в виде ряда по возрастанию даты.
pub fn filter_and_plot(
    table: &FeatureTable,
    predictions: &[f64],
    start: NaiveDate,
    end: NaiveDate,
    location: &str,
) -> Result<PredictionSeries, ForecastError> {
    let mut rows = filter_and_tabulate(table, predictions, start, end, location)?.rows;
    rows.sort_by_key(|row| row.date);
    let (dates, values) = rows.into_iter().map(|row| (row.date, row.value)).unzip();
    Ok(PredictionSeries {
        location: location.to_string(),
        dates,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, numeric_column};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Три дня по трём локациям, прогноз = номер строки.
    fn fixture() -> (FeatureTable, Vec<f64>) {
        let days = [ymd(2025, 1, 3), ymd(2025, 1, 1), ymd(2025, 1, 2)];
        let dates: Vec<NaiveDate> = days.iter().flat_map(|d| [*d; 3]).collect();
        let frame = Frame::new(vec![numeric_column(
            "LocationInNum",
            (0..9).map(|i| Some((i % 3 + 1) as f64)).collect(),
        )])
        .unwrap();
        let predictions = (0..9_u8).map(f64::from).collect();
        (FeatureTable::new(frame, dates).unwrap(), predictions)
    }

    #[test]
    fn table_keeps_range_and_location() {
        let (table, predictions) = fixture();
        let result = filter_and_tabulate(
            &table,
            &predictions,
            ymd(2025, 1, 2),
            ymd(2025, 1, 3),
            "Petaling Jaya",
        )
        .unwrap();
        assert_eq!(
            result.rows,
            vec![
                PredictionRow {
                    date: ymd(2025, 1, 3),
                    location: Location::PetalingJaya,
                    value: 1.0,
                },
                PredictionRow {
                    date: ymd(2025, 1, 2),
                    location: Location::PetalingJaya,
                    value: 7.0,
                },
            ]
        );
    }

    #[test]
    fn plot_series_is_sorted_by_date() {
        let (table, predictions) = fixture();
        let series = filter_and_plot(
            &table,
            &predictions,
            ymd(2025, 1, 1),
            ymd(2025, 1, 3),
            "Cheras",
        )
        .unwrap();
        assert_eq!(
            series.dates,
            vec![ymd(2025, 1, 1), ymd(2025, 1, 2), ymd(2025, 1, 3)]
        );
        assert_eq!(series.values, vec![5.0, 8.0, 2.0]);
    }

    #[test]
    fn unknown_location_is_empty_not_an_error() {
        let (table, predictions) = fixture();
        let start = ymd(2025, 1, 1);
        let end = ymd(2025, 1, 3);
        assert!(
            filter_and_tabulate(&table, &predictions, start, end, "Mars")
                .unwrap()
                .is_empty()
        );
        assert!(
            filter_and_plot(&table, &predictions, start, end, "Mars")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn range_outside_data_is_empty() {
        let (table, predictions) = fixture();
        let result = filter_and_tabulate(
            &table,
            &predictions,
            ymd(2026, 1, 1),
            ymd(2026, 1, 31),
            "Cheras",
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn inputs_are_left_untouched() {
        let (table, predictions) = fixture();
        let before = table.clone();
        filter_and_tabulate(&table, &predictions, ymd(2025, 1, 1), ymd(2025, 1, 3), "Cheras")
            .unwrap();
        assert_eq!(table, before);
        assert!(!table.frame().contains("Location"));
    }

    #[test]
    fn table_is_exported_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let (table, predictions) = fixture();
        let result =
            filter_and_tabulate(&table, &predictions, ymd(2025, 1, 1), ymd(2025, 1, 2), "Cheras")
                .unwrap();
        let path = dir.path().join("out/predictions.csv");
        result.write_csv(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "DateTime,Location,PredictedValue\n\
             2025-01-01,Cheras,5.000000\n\
             2025-01-02,Cheras,8.000000\n"
        );
    }

    #[test]
    fn mismatched_prediction_count_is_a_data_error() {
        let (table, _) = fixture();
        let result = filter_and_tabulate(&table, &[1.0], ymd(2025, 1, 1), ymd(2025, 1, 3), "Cheras");
        assert!(matches!(result, Err(ForecastError::Data(_))));
    }
}
