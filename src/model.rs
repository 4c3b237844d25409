//! Конвейер модели: импутация и one-hot кодирование признаков + случайный лес.

use polars::prelude::SortOptions;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::{mean_absolute_error, mean_squared_error};
use tracing::{debug, warn};

use crate::error::ForecastError;
use crate::frame::{Frame, is_numeric, numeric_mode, text_mode};
use crate::schema::{DEFAULT_MAX_CATEGORIES, Schema};

const DEFAULT_N_TREES: usize = 100;
const DEFAULT_SEED: u64 = 0;
const DEFAULT_TRAIN_FRACTION: f64 = 0.8;
const MIN_TRAINING_ROWS: usize = 2;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub n_trees: usize,
    pub seed: u64,
    pub train_fraction: f64,
    pub max_categories: usize,
    pub max_depth: Option<u16>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_N_TREES,
            seed: DEFAULT_SEED,
            train_fraction: DEFAULT_TRAIN_FRACTION,
            max_categories: DEFAULT_MAX_CATEGORIES,
            max_depth: None,
        }
    }
}

/// MAE/MSE/RMSE между двумя рядами.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
}

impl Metrics {
    pub fn between(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return None;
        }
        let actual = actual.to_vec();
        let predicted = predicted.to_vec();
        let mae = mean_absolute_error(&actual, &predicted);
        let mse = mean_squared_error(&actual, &predicted);
        Some(Self {
            mae,
            mse,
            rmse: mse.sqrt(),
        })
    }

    /// Отклонение прогноза от константы (среднего цели). Диагностика, а не оценка качества.
    pub fn against_baseline(predicted: &[f64], baseline: f64) -> Option<Self> {
        Self::between(&vec![baseline; predicted.len()], predicted)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct NumericImputer {
    column: String,
    fill: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct OneHotEncoder {
    column: String,
    fill: String,
    /// Отсортированы; неизвестная категория кодируется нулями.
    categories: Vec<String>,
}

impl OneHotEncoder {
    fn encode(&self, value: &str, out: &mut Vec<f64>) {
        let hit = self
            .categories
            .binary_search_by(|category| category.as_str().cmp(value))
            .ok();
        out.extend((0..self.categories.len()).map(|idx| if Some(idx) == hit { 1.0 } else { 0.0 }));
    }
}

/// Числовые колонки заполняются самым частым значением, категориальные — тоже,
/// после чего кодируются one-hot. Порядок выхода: сначала числовые, затем категориальные.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    numeric: Vec<NumericImputer>,
    categorical: Vec<OneHotEncoder>,
}

impl Preprocessor {
    pub fn fit(frame: &Frame, schema: &Schema) -> Result<Self, ForecastError> {
        let mut numeric = Vec::new();
        for name in schema.numeric_features() {
            let Some(column) = frame.column(&name) else {
                continue;
            };
            match numeric_mode(column)? {
                Some(fill) => numeric.push(NumericImputer { column: name, fill }),
                None => warn!(column = %name, "Skipping numeric feature without observed values"),
            }
        }

        let mut categorical = Vec::new();
        for name in schema.categorical_features() {
            let Some(column) = frame.column(&name).filter(|column| !is_numeric(column)) else {
                continue;
            };
            let Some(fill) = text_mode(column)? else {
                warn!(column = %name, "Skipping categorical feature without observed values");
                continue;
            };
            let categories = column
                .drop_nulls()
                .as_materialized_series()
                .unique()?
                .sort(SortOptions::default())?
                .str()?
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();
            categorical.push(OneHotEncoder {
                column: name,
                fill,
                categories,
            });
        }

        let preprocessor = Self {
            numeric,
            categorical,
        };
        if preprocessor.width() == 0 {
            return Err(ForecastError::data("no usable feature columns"));
        }
        Ok(preprocessor)
    }

    /// Ширина выходной матрицы признаков.
    pub fn width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|encoder| encoder.categories.len())
                .sum::<usize>()
    }

    pub fn input_columns(&self) -> impl Iterator<Item = &str> {
        self.numeric
            .iter()
            .map(|imputer| imputer.column.as_str())
            .chain(self.categorical.iter().map(|encoder| encoder.column.as_str()))
    }

    /// Строит матрицу признаков; лишние колонки таблицы игнорируются.
    pub fn transform(&self, frame: &Frame) -> Result<Vec<Vec<f64>>, ForecastError> {
        let numeric = self
            .numeric
            .iter()
            .map(|imputer| {
                frame
                    .numeric(&imputer.column)
                    .map(|values| (values, imputer.fill))
                    .ok_or_else(|| expected_column(frame, &imputer.column, "numeric"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let categorical = self
            .categorical
            .iter()
            .map(|encoder| {
                frame
                    .text(&encoder.column)
                    .map(|values| (values, encoder))
                    .ok_or_else(|| expected_column(frame, &encoder.column, "text"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let width = self.width();
        Ok((0..frame.height())
            .map(|row| {
                let mut out = Vec::with_capacity(width);
                out.extend(numeric.iter().map(|(values, fill)| values[row].unwrap_or(*fill)));
                for (values, encoder) in &categorical {
                    encoder.encode(values[row].unwrap_or(encoder.fill.as_str()), &mut out);
                }
                out
            })
            .collect())
    }
}

fn expected_column(frame: &Frame, name: &str, kind: &str) -> ForecastError {
    if frame.contains(name) {
        ForecastError::schema(format!("feature column '{name}' must be {kind}"))
    } else {
        ForecastError::schema(format!("feature column '{name}' is missing"))
    }
}

/// Обученный конвейер для одной целевой колонки.
#[derive(Serialize, Deserialize)]
pub struct ModelPipeline {
    target: String,
    schema: Schema,
    preprocessor: Preprocessor,
    forest: Forest,
    settings: TrainingSettings,
    target_mean: f64,
    validation: Option<Metrics>,
}

impl ModelPipeline {
    /// Обучает конвейер на исторических данных с детерминированным разбиением train/valid.
    pub fn train(
        field: &str,
        historical: &Frame,
        settings: &TrainingSettings,
    ) -> Result<Self, ForecastError> {
        if !historical.contains(field) {
            return Err(ForecastError::schema(format!(
                "field '{field}' not found in the dataset"
            )));
        }
        let data = historical.drop_nulls(field)?;
        let target: Vec<f64> = data
            .numeric(field)
            .ok_or_else(|| ForecastError::schema(format!("field '{field}' must be numeric")))?
            .into_iter()
            .flatten()
            .collect();
        if target.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::data(format!(
                "field '{field}' has {} observed rows, need at least {MIN_TRAINING_ROWS}",
                target.len()
            )));
        }
        let target_mean = target.iter().sum::<f64>() / target.len() as f64;

        let features = data.without(field)?;
        let (train_idx, valid_idx) =
            split_indices(target.len(), settings.train_fraction, settings.seed);
        let train_frame = features.take_rows(&train_idx)?;
        let schema = Schema::infer(&train_frame, settings.max_categories)?;
        let preprocessor = Preprocessor::fit(&train_frame, &schema)?;

        let x_train = DenseMatrix::from_2d_vec(&preprocessor.transform(&train_frame)?)?;
        let y_train: Vec<f64> = train_idx.iter().map(|&idx| target[idx]).collect();
        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(settings.n_trees)
            .with_seed(settings.seed);
        if let Some(max_depth) = settings.max_depth {
            params = params.with_max_depth(max_depth);
        }
        debug!(
            field,
            rows = train_idx.len(),
            width = preprocessor.width(),
            n_trees = settings.n_trees,
            "Fitting random forest"
        );
        let forest = Forest::fit(&x_train, &y_train, params)?;

        let mut pipeline = Self {
            target: field.to_string(),
            schema,
            preprocessor,
            forest,
            settings: *settings,
            target_mean,
            validation: None,
        };
        if !valid_idx.is_empty() {
            let predicted = pipeline.predict(&features.take_rows(&valid_idx)?)?;
            let actual: Vec<f64> = valid_idx.iter().map(|&idx| target[idx]).collect();
            pipeline.validation = Metrics::between(&actual, &predicted);
        }
        Ok(pipeline)
    }

    pub fn predict(&self, features: &Frame) -> Result<Vec<f64>, ForecastError> {
        let rows = self.preprocessor.transform(features)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = DenseMatrix::from_2d_vec(&rows)?;
        Ok(self.forest.predict(&x)?)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Схема признаков на момент обучения.
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    pub const fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    pub const fn target_mean(&self) -> f64 {
        self.target_mean
    }

    /// Метрики на отложенной выборке, если она была непустой.
    pub const fn validation(&self) -> Option<Metrics> {
        self.validation
    }

    pub fn input_columns(&self) -> impl Iterator<Item = &str> {
        self.preprocessor.input_columns()
    }
}

/// Перемешивает индексы с фиксированным seed: первые `n - floor(n * fraction)` уходят
/// в валидацию, остальные в обучение.
fn split_indices(len: usize, train_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let n_train = ((len as f64 * train_fraction).floor() as usize).clamp(1, len.max(1));
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(len - n_train.min(len));
    (train, indices)
}
