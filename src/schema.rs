//! Явное описание схемы датасета: какая колонка числовая, а какая категориальная.
//!
//! Схема вычисляется один раз из исторических данных и передаётся дальше —
//! в синтез будущих строк и в препроцессинг модели.

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::frame::{Frame, distinct_count, is_numeric};

/// Порог уникальных значений, ниже которого строковая колонка считается категориальной.
pub const DEFAULT_MAX_CATEGORIES: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    /// Строковая колонка с малым числом уникальных значений.
    Categorical,
    /// Строковая колонка, не используемая как признак.
    Text,
}

impl ColumnKind {
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::Categorical | Self::Text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn infer(frame: &Frame, max_categories: usize) -> Result<Self, ForecastError> {
        let columns = frame
            .columns()
            .iter()
            .map(|column| {
                let kind = if is_numeric(column) {
                    ColumnKind::Numeric
                } else if distinct_count(column)? < max_categories {
                    ColumnKind::Categorical
                } else {
                    ColumnKind::Text
                };
                Ok(ColumnSpec {
                    name: column.name().to_string(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, ForecastError>>()?;
        Ok(Self { columns })
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.kind)
    }

    pub fn numeric_features(&self) -> Vec<String> {
        self.names_of(ColumnKind::Numeric)
    }

    pub fn categorical_features(&self) -> Vec<String> {
        self.names_of(ColumnKind::Categorical)
    }

    fn names_of(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|spec| spec.kind == kind)
            .map(|spec| spec.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{numeric_column, text_column};

    #[test]
    fn infer_splits_text_by_cardinality() {
        let stations: Vec<Option<String>> = (0..25).map(|i| Some(format!("st-{i}"))).collect();
        let conditions: Vec<Option<String>> = (0..25)
            .map(|i| Some(if i % 2 == 0 { "Rain" } else { "Clear" }.to_string()))
            .collect();
        let frame = Frame::new(vec![
            numeric_column("Humidity", vec![Some(80.0); 25]),
            text_column("Condition", conditions),
            text_column("Station", stations),
        ])
        .unwrap();

        let schema = Schema::infer(&frame, DEFAULT_MAX_CATEGORIES).unwrap();
        assert_eq!(schema.kind_of("Humidity"), Some(ColumnKind::Numeric));
        assert_eq!(schema.kind_of("Condition"), Some(ColumnKind::Categorical));
        assert_eq!(schema.kind_of("Station"), Some(ColumnKind::Text));
        assert_eq!(schema.numeric_features(), vec!["Humidity"]);
        assert_eq!(schema.categorical_features(), vec!["Condition"]);
    }
}
