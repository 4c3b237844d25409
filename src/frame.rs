//! Табличные данные поверх polars: чтение CSV с выводом типов и статистики для
//! заполнения пропусков.
//!
//! Внутри кадра каждая колонка либо `Float64`, либо `String`: целые приводятся к
//! `f64`, всё остальное (в том числе колонки из одних пропусков) к строкам.

use std::collections::HashSet;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use polars::prelude::{
    Column, CsvParseOptions, CsvReadOptions, CsvWriter, DataFrame, DataType, IdxCa, IdxSize,
    NullValues, PolarsResult, SerReader, SerWriter, Series, SortOptions, mode,
};

use crate::error::ForecastError;

/// Значения ячеек, которые считаются пропуском.
const MISSING_TOKENS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

pub fn numeric_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

pub fn text_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(name.into(), values)
}

/// Колонка из `len` пропусков того же вида, что и `like`.
pub fn null_column_like(like: &Column, len: usize) -> Column {
    Column::full_null(like.name().clone(), len, like.dtype())
}

pub fn is_numeric(column: &Column) -> bool {
    column.dtype() == &DataType::Float64
}

/// Среднее по непустым значениям числовой колонки.
pub fn mean(column: &Column) -> Option<f64> {
    if !is_numeric(column) {
        return None;
    }
    column.as_materialized_series().mean()
}

/// Самое частое числовое значение; при равенстве частот берётся наименьшее.
pub fn numeric_mode(column: &Column) -> Result<Option<f64>, ForecastError> {
    if !is_numeric(column) {
        return Ok(None);
    }
    Ok(sorted_modes(column)?.f64()?.get(0))
}

/// Самое частое строковое значение; при равенстве частот лексикографически первое.
pub fn text_mode(column: &Column) -> Result<Option<String>, ForecastError> {
    if is_numeric(column) {
        return Ok(None);
    }
    Ok(sorted_modes(column)?.str()?.get(0).map(str::to_string))
}

/// Число различных непустых значений.
pub fn distinct_count(column: &Column) -> Result<usize, ForecastError> {
    Ok(column.drop_nulls().n_unique()?)
}

fn is_all_null(column: &Column) -> bool {
    column.null_count() == column.len()
}

fn sorted_modes(column: &Column) -> PolarsResult<Series> {
    let observed = column.drop_nulls().as_materialized_series().clone();
    if observed.is_empty() {
        return Ok(observed);
    }
    mode::mode(&observed, false)?.sort(SortOptions::default())
}

fn check_shape(columns: &[Column], height: usize) -> Result<(), ForecastError> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name().as_str()) {
            return Err(ForecastError::schema(format!(
                "duplicate column '{}'",
                column.name()
            )));
        }
        if column.len() != height {
            return Err(ForecastError::data(format!(
                "column '{}' has {} rows, expected {height}",
                column.name(),
                column.len()
            )));
        }
    }
    Ok(())
}

/// Набор именованных колонок одинаковой длины; порядок колонок сохраняется.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    df: DataFrame,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self, ForecastError> {
        let height = columns.first().map_or(0, Column::len);
        check_shape(&columns, height)?;
        Self::normalized(DataFrame::new(height, columns)?)
    }

    /// Читает CSV целиком; типы выводятся по всем строкам, а не по первой тысяче.
    pub fn read_csv(path: &Path) -> Result<Self, ForecastError> {
        let file = fs::File::open(path).map_err(|err| ForecastError::io(path, err))?;
        let null_values = MISSING_TOKENS.iter().map(|token| (*token).into()).collect();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_parse_options(
                CsvParseOptions::default()
                    .with_null_values(Some(NullValues::AllColumns(null_values)))
                    .with_missing_is_null(true),
            )
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|err| ForecastError::table_file(path, err))?;
        Self::normalized(df)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ForecastError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| ForecastError::io(parent, err))?;
        }
        let file = fs::File::create(path).map_err(|err| ForecastError::io(path, err))?;
        let mut df = self.df.clone();
        CsvWriter::new(BufWriter::new(file))
            .include_header(true)
            .finish(&mut df)
            .map_err(|err| ForecastError::table_file(path, err))
    }

    fn normalized(df: DataFrame) -> Result<Self, ForecastError> {
        let height = df.height();
        let columns = df
            .columns()
            .iter()
            .map(|column| match column.dtype() {
                DataType::Float64 | DataType::String => Ok(column.clone()),
                dtype if dtype.is_primitive_numeric() => column.cast(&DataType::Float64),
                _ => column.cast(&DataType::String),
            })
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(Self {
            df: DataFrame::new(height, columns)?,
        })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn columns(&self) -> &[Column] {
        self.df.columns()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.df.columns().iter().map(|column| column.name().as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.df.column(name).ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Значения числовой колонки; `None`, если колонки нет или она строковая.
    /// Колонка из одних пропусков подходит под любой тип.
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let column = self.column(name)?;
        if is_all_null(column) {
            return Some(vec![None; column.len()]);
        }
        Some(column.f64().ok()?.into_iter().collect())
    }

    pub fn text(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let column = self.column(name)?;
        if is_all_null(column) {
            return Some(vec![None; column.len()]);
        }
        Some(column.str().ok()?.into_iter().collect())
    }

    /// Копия без указанной колонки.
    pub fn without(&self, name: &str) -> Result<Self, ForecastError> {
        if !self.contains(name) {
            return Ok(self.clone());
        }
        Ok(Self {
            df: self.df.drop(name)?,
        })
    }

    /// Копия с добавленной (или заменённой) колонкой.
    pub fn with_column(&self, column: Column) -> Result<Self, ForecastError> {
        let mut df = self.df.clone();
        df.with_column(column)?;
        Ok(Self { df })
    }

    pub fn take_rows(&self, indices: &[usize]) -> Result<Self, ForecastError> {
        let indices = indices
            .iter()
            .map(|&idx| {
                IdxSize::try_from(idx)
                    .map_err(|_| ForecastError::data(format!("row index {idx} is out of range")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            df: self.df.take(&IdxCa::from_vec("rows".into(), indices))?,
        })
    }

    /// Строки, где в колонке `name` есть значение.
    pub fn drop_nulls(&self, name: &str) -> Result<Self, ForecastError> {
        let Some(column) = self.column(name) else {
            return Ok(self.clone());
        };
        Ok(Self {
            df: self.df.filter(&column.is_not_null())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn read_csv_infers_types_and_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "weather.csv",
            "Year,Temperature,Condition,Visibility\n2021,30.5,Rain,\n2021,,Clear,\n2021,28,NA,\n",
        );
        let frame = Frame::read_csv(&path).unwrap();

        assert_eq!(frame.height(), 3);
        assert_eq!(
            frame.column_names().collect::<Vec<_>>(),
            vec!["Year", "Temperature", "Condition", "Visibility"]
        );
        assert_eq!(
            frame.numeric("Year").unwrap(),
            vec![Some(2021.0), Some(2021.0), Some(2021.0)]
        );
        assert_eq!(
            frame.numeric("Temperature").unwrap(),
            vec![Some(30.5), None, Some(28.0)]
        );
        assert_eq!(
            frame.text("Condition").unwrap(),
            vec![Some("Rain"), Some("Clear"), None]
        );
        let visibility = frame.column("Visibility").unwrap();
        assert_eq!(visibility.null_count(), 3);
        assert!(!is_numeric(visibility));
        assert_eq!(frame.numeric("Visibility").unwrap(), vec![None; 3]);
        assert_eq!(frame.numeric("Condition"), None);
    }

    #[test]
    fn mode_prefers_smallest_on_ties() {
        let numbers = numeric_column("n", vec![Some(3.0), Some(1.0), Some(3.0), Some(1.0), None]);
        assert_eq!(numeric_mode(&numbers).unwrap(), Some(1.0));
        assert_eq!(mean(&numbers), Some(2.0));

        let words = text_column(
            "w",
            vec![Some("b".into()), Some("a".into()), Some("b".into()), Some("a".into()), None],
        );
        assert_eq!(text_mode(&words).unwrap().as_deref(), Some("a"));
        assert_eq!(distinct_count(&words).unwrap(), 2);

        let skewed = text_column("w", vec![Some("b".into()), Some("a".into()), Some("b".into())]);
        assert_eq!(text_mode(&skewed).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn empty_columns_have_no_statistics() {
        let empty = numeric_column("n", vec![None, None]);
        assert_eq!(mean(&empty), None);
        assert_eq!(numeric_mode(&empty).unwrap(), None);

        let blank = text_column("t", vec![None, None]);
        assert_eq!(text_mode(&blank).unwrap(), None);
        assert_eq!(distinct_count(&blank).unwrap(), 0);
    }

    #[test]
    fn new_rejects_ragged_and_duplicate_columns() {
        let ragged = Frame::new(vec![
            numeric_column("a", vec![Some(1.0)]),
            numeric_column("b", vec![]),
        ]);
        assert!(matches!(ragged, Err(ForecastError::Data(_))));

        let duplicate = Frame::new(vec![
            numeric_column("a", vec![Some(1.0)]),
            numeric_column("a", vec![Some(2.0)]),
        ]);
        assert!(matches!(duplicate, Err(ForecastError::Schema(_))));
    }

    #[test]
    fn drop_nulls_take_and_without_keep_order() {
        let frame = Frame::new(vec![
            numeric_column("x", vec![Some(1.0), Some(2.0), Some(3.0)]),
            numeric_column("y", vec![Some(10.0), None, Some(30.0)]),
        ])
        .unwrap();
        let kept = frame.drop_nulls("y").unwrap();
        assert_eq!(kept.height(), 2);
        assert_eq!(kept.numeric("x").unwrap(), vec![Some(1.0), Some(3.0)]);

        let features = kept.without("y").unwrap();
        assert_eq!(features.column_names().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(features.height(), 2);
        assert_eq!(features.without("absent").unwrap(), features);

        let picked = frame.take_rows(&[2, 0]).unwrap();
        assert_eq!(picked.numeric("y").unwrap(), vec![Some(30.0), Some(10.0)]);
    }

    #[test]
    fn write_then_read_preserves_cells() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::new(vec![
            numeric_column("Year", vec![Some(2025.0), None]),
            text_column("Condition", vec![Some("Rain".into()), Some("Clear".into())]),
        ])
        .unwrap();
        let path = dir.path().join("nested/out.csv");
        frame.write_csv(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("Year,Condition\n"), "{raw}");
        assert_eq!(Frame::read_csv(&path).unwrap(), frame);
    }
}
