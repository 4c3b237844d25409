//! Ошибки конвейера прогноза.

use std::fmt;
use std::path::PathBuf;

use polars::prelude::PolarsError;

#[derive(Debug)]
pub enum ForecastError {
    /// Нет нужной колонки либо таблица не совпадает со схемой конвейера.
    Schema(String),
    /// Пустые опорные данные или некорректные значения.
    Data(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv {
        path: PathBuf,
        source: csv::Error,
    },
    /// Ошибка операции над таблицей.
    Table(PolarsError),
    /// Не удалось прочитать или записать CSV через polars.
    TableFile {
        path: PathBuf,
        source: PolarsError,
    },
    Model(smartcore::error::Failed),
    Artifact {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ForecastError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn table_file(path: impl Into<PathBuf>, source: PolarsError) -> Self {
        Self::TableFile {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for ForecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(message) => write!(f, "schema error: {message}"),
            Self::Data(message) => write!(f, "data error: {message}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Csv { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Table(err) => write!(f, "table error: {err}"),
            Self::TableFile { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Model(err) => write!(f, "model error: {err}"),
            Self::Artifact { path, source } => {
                write!(f, "invalid model artifact {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ForecastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(_) | Self::Data(_) => None,
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Table(err) => Some(err),
            Self::TableFile { source, .. } => Some(source),
            Self::Model(err) => Some(err),
            Self::Artifact { source, .. } => Some(source),
        }
    }
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        Self::Table(err)
    }
}

impl From<smartcore::error::Failed> for ForecastError {
    fn from(err: smartcore::error::Failed) -> Self {
        Self::Model(err)
    }
}
