mod artifact;
mod constants;
mod error;
mod frame;
mod location;
mod model;
mod present;
mod report;
mod schema;
mod series;
mod status;
mod synth;

use chrono::{Datelike, NaiveDate};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactStore, PipelineOrigin, load_or_train};
use crate::constants::DATE_FORMAT;
use crate::error::ForecastError;
use crate::frame::Frame;
use crate::model::{Metrics, TrainingSettings};
use crate::present::{
    NO_PLOT_DATA_MESSAGE, NO_PREDICTIONS_MESSAGE, PredictionSeries, PredictionTable,
    filter_and_plot, filter_and_tabulate,
};
use crate::report::Dashboard;
use crate::schema::Schema;
use crate::series::FeatureTable;
use crate::status::StatusLog;
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

const APP_ABOUT: &str = "Cuaca - weather field forecasting with a random forest";
const DEFAULT_OUTPUT_HTML: &str = "dist/index.html";
const DEFAULT_SYNTHETIC_CSV: &str = "dist/future.csv";
const DEFAULT_CONFIG: &str = "config/forecast.toml";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_MODEL_DIR: &str = "saved_model";
const DEFAULT_TRAINING_YEAR: i32 = 2021;
const DEFAULT_LOCATION: &str = "Batu Muda";
const DATASET_PREFIX: &str = "weather_";
const SOURCE_SYNTHETIC: &str = "synthetic";

#[derive(Parser, Debug)]
#[command(name = "cuaca", about = APP_ABOUT)]
struct Args {
    /// TOML-файл с путями к данным и параметрами модели.
    #[arg(
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG,
        global = true
    )]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Полный режим: получить модель, построить прогноз и сохранить HTML-дашборд.
    Run {
        /// Прогнозируемая колонка датасета.
        #[arg(short = 'f', long = "field", value_name = "COLUMN")]
        field: String,
        /// Начало диапазона (YYYY-MM-DD, включительно).
        #[arg(long = "start", value_name = "DATE", value_parser = parse_date)]
        start: NaiveDate,
        /// Конец диапазона (YYYY-MM-DD, включительно).
        #[arg(long = "end", value_name = "DATE", value_parser = parse_date)]
        end: NaiveDate,
        /// Локация: Batu Muda, Petaling Jaya или Cheras.
        #[arg(
            short = 'l',
            long = "location",
            value_name = "NAME",
            default_value = DEFAULT_LOCATION
        )]
        location: String,
        /// Куда сохранить HTML.
        #[arg(
            short = 'o',
            long = "output-html",
            value_name = "PATH",
            default_value = DEFAULT_OUTPUT_HTML
        )]
        output_html: PathBuf,
        /// Не минифицировать HTML (по умолчанию минифицируется).
        #[arg(
            long = "no-minify-html",
            default_value_t = true,
            action = ArgAction::SetFalse
        )]
        minify_html: bool,
        /// Дополнительно сохранить отфильтрованную таблицу прогноза в CSV.
        #[arg(long = "output-csv", value_name = "PATH")]
        output_csv: Option<PathBuf>,
    },
    /// Загрузить модель из кэша или обучить и сохранить новую.
    Train {
        /// Прогнозируемая колонка датасета.
        #[arg(short = 'f', long = "field", value_name = "COLUMN")]
        field: String,
    },
    /// Сгенерировать синтетические признаки на диапазон дат и сохранить CSV.
    Synthesize {
        /// Начало диапазона (YYYY-MM-DD, включительно).
        #[arg(long = "start", value_name = "DATE", value_parser = parse_date)]
        start: NaiveDate,
        /// Конец диапазона (YYYY-MM-DD, включительно).
        #[arg(long = "end", value_name = "DATE", value_parser = parse_date)]
        end: NaiveDate,
        /// Целевая колонка, которую нужно исключить из признаков.
        #[arg(short = 'f', long = "field", value_name = "COLUMN")]
        field: Option<String>,
        /// Куда сохранить CSV.
        #[arg(
            short = 'o',
            long = "output-csv",
            value_name = "PATH",
            default_value = DEFAULT_SYNTHETIC_CSV
        )]
        output_csv: PathBuf,
    },
    /// Сгенерировать файлы автодополнения для shell.
    Completions {
        /// Целевой shell.
        #[arg(value_enum)]
        shell: Shell,
        /// Куда сохранить файл (если не указано — stdout).
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data: Option<DataSection>,
    model: Option<ModelSection>,
}

#[derive(Debug, Deserialize)]
struct DataSection {
    data_dir: Option<PathBuf>,
    training_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ModelSection {
    model_dir: Option<PathBuf>,
    #[serde(alias = "n_estimators")]
    n_trees: Option<usize>,
    #[serde(alias = "random_state")]
    seed: Option<u64>,
    train_fraction: Option<f64>,
    max_categories: Option<usize>,
    max_depth: Option<u16>,
}

#[derive(Debug, Clone)]
struct Settings {
    data_dir: PathBuf,
    training_year: i32,
    model_dir: PathBuf,
    training: TrainingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            training_year: DEFAULT_TRAINING_YEAR,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            training: TrainingSettings::default(),
        }
    }
}

impl Settings {
    fn dataset_csv(&self, year: i32) -> PathBuf {
        self.data_dir.join(format!("{DATASET_PREFIX}{year}.csv"))
    }

    fn historical_csv(&self) -> PathBuf {
        self.dataset_csv(self.training_year)
    }
}

/// Параметры одного запроса с дашборда.
struct ForecastRequest<'a> {
    field: &'a str,
    start: NaiveDate,
    end: NaiveDate,
    location: &'a str,
}

/// То, что успели получить до возможной ошибки; показывается на странице целиком.
#[derive(Default)]
struct ForecastOutcome {
    model: Option<String>,
    source: String,
    baseline: Option<Metrics>,
    validation: Option<Metrics>,
    table: PredictionTable,
    series: PredictionSeries,
}

fn resolve_settings(config: ConfigFile) -> Settings {
    let mut settings = Settings::default();
    if let Some(data) = config.data {
        if let Some(data_dir) = data.data_dir {
            settings.data_dir = data_dir;
        }
        if let Some(training_year) = data.training_year {
            settings.training_year = training_year;
        }
    }
    if let Some(model) = config.model {
        if let Some(model_dir) = model.model_dir {
            settings.model_dir = model_dir;
        }
        if let Some(n_trees) = model.n_trees {
            settings.training.n_trees = n_trees;
        }
        if let Some(seed) = model.seed {
            settings.training.seed = seed;
        }
        if let Some(train_fraction) = model.train_fraction {
            settings.training.train_fraction = train_fraction;
        }
        if let Some(max_categories) = model.max_categories {
            settings.training.max_categories = max_categories;
        }
        if model.max_depth.is_some() {
            settings.training.max_depth = model.max_depth;
        }
    }
    settings
}

fn validate_training_settings(cfg: &TrainingSettings) -> Result<(), String> {
    if cfg.n_trees == 0 {
        return Err("model.n_trees must be > 0".to_string());
    }
    if !cfg.train_fraction.is_finite() || cfg.train_fraction <= 0.0 || cfg.train_fraction >= 1.0
    {
        return Err("model.train_fraction must be within 0..1 (exclusive)".to_string());
    }
    if cfg.max_categories < 2 {
        return Err("model.max_categories must be >= 2".to_string());
    }
    if cfg.max_depth == Some(0) {
        return Err("model.max_depth must be > 0".to_string());
    }
    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings, String> {
    if !path.exists() {
        if path == Path::new(DEFAULT_CONFIG) {
            tracing::info!("Config {} not found, using built-in defaults", path.display());
            return Ok(Settings::default());
        }
        return Err(format!("Config {} does not exist", path.display()));
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {err}", path.display()))?;
    let config: ConfigFile = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config {}: {err}", path.display()))?;
    let settings = resolve_settings(config);
    validate_training_settings(&settings.training)
        .map_err(|err| format!("Invalid config {}: {err}", path.display()))?;
    Ok(settings)
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DD, got '{raw}': {err}"))
}

fn generate_completions(shell: Shell, output: Option<PathBuf>) -> Result<(), String> {
    let mut cmd = Args::command();
    let bin_name = cmd.get_name().to_string();
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
        }
        let mut file = File::create(&path)
            .map_err(|err| format!("Failed to create {}: {err}", path.display()))?;
        generate(shell, &mut cmd, bin_name, &mut file);
    } else {
        let mut stdout = std::io::stdout();
        generate(shell, &mut cmd, bin_name, &mut stdout);
    }
    Ok(())
}

fn format_metrics(label: &str, metrics: &Metrics) -> String {
    format!(
        "{label}: MAE {:.4}, MSE {:.4}, RMSE {:.4}",
        metrics.mae, metrics.mse, metrics.rmse
    )
}

/// Исторические признаки без целевой колонки и без строк, где она пропущена.
fn reference_features(historical: &Frame, field: &str) -> Result<Frame, ForecastError> {
    historical.drop_nulls(field)?.without(field)
}

fn load_historical(settings: &Settings, status: &mut StatusLog) -> Result<Frame, ForecastError> {
    let path = settings.historical_csv();
    let historical = Frame::read_csv(&path)?;
    status.info(format!(
        "Loaded {} training rows from {}",
        historical.height(),
        path.display()
    ));
    Ok(historical)
}

/// Реальный датасет на год конца диапазона, а если его нет — синтетика по истории.
fn load_or_synthesize_features(
    request: &ForecastRequest<'_>,
    settings: &Settings,
    historical: &Frame,
    status: &mut StatusLog,
) -> Result<(FeatureTable, String), ForecastError> {
    let year = request.end.year();
    let future_csv = settings.dataset_csv(year);
    if future_csv.is_file() {
        status.info(format!("Using prediction file {}", future_csv.display()));
        let features = FeatureTable::load_csv(&future_csv)?;
        return Ok((features, future_csv.display().to_string()));
    }

    status.warn(format!(
        "Prediction file for {year} not found. Generating future dataset..."
    ));
    let reference = reference_features(historical, request.field)?;
    let schema = Schema::infer(&reference, settings.training.max_categories)?;
    let features = synth::synthesize(&reference, &schema, request.start, request.end)?;
    Ok((features, SOURCE_SYNTHETIC.to_string()))
}

fn run_forecast(
    request: &ForecastRequest<'_>,
    settings: &Settings,
    status: &mut StatusLog,
    outcome: &mut ForecastOutcome,
) -> Result<(), ForecastError> {
    let historical = load_historical(settings, status)?;
    let store = ArtifactStore::new(&settings.model_dir);
    let obtained = load_or_train(
        &store,
        request.field,
        &historical,
        &settings.training,
        status,
    )?;
    outcome.model = Some(match obtained.origin {
        PipelineOrigin::Loaded => "Loaded from cache".to_string(),
        PipelineOrigin::Trained => "Trained".to_string(),
    });
    outcome.validation = obtained.pipeline.validation();
    tracing::debug!(artifact = %obtained.path.display(), "Model pipeline ready");

    let (features, source) = load_or_synthesize_features(request, settings, &historical, status)?;
    outcome.source = source;
    if features.is_empty() {
        status.warn("Selected date range contains no days");
    }
    let predictions = obtained.pipeline.predict(features.frame())?;

    outcome.baseline =
        Metrics::against_baseline(&predictions, obtained.pipeline.target_mean());
    if let Some(baseline) = &outcome.baseline {
        status.info(format_metrics("Model performance", baseline));
    }

    outcome.series = filter_and_plot(
        &features,
        &predictions,
        request.start,
        request.end,
        request.location,
    )?;
    if outcome.series.is_empty() {
        status.error(NO_PLOT_DATA_MESSAGE);
    }
    outcome.table = filter_and_tabulate(
        &features,
        &predictions,
        request.start,
        request.end,
        request.location,
    )?;
    if outcome.table.is_empty() {
        status.error(NO_PREDICTIONS_MESSAGE);
    }
    Ok(())
}

/// Итоговая строка лога: ошибка, если на странице есть статусы уровня error.
fn saved_summary(status: &StatusLog, output_html: &Path) -> Result<String, String> {
    if status.has_errors() {
        Err(format!(
            "Saved HTML with error statuses to {}",
            output_html.display()
        ))
    } else {
        Ok(format!("Saved HTML to {}", output_html.display()))
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cuaca=info"));
    let ansi = std::io::stdout().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .compact()
        .init();
}

fn headline(message: &str) {
    tracing::info!(status = "start", "{message}");
}

fn success(message: &str) {
    tracing::info!(status = "ok", "{message}");
}

fn error(message: &str) {
    tracing::error!(status = "err", "{message}");
}

fn main() {
    let args = Args::parse();
    let config_path = args.config;
    match args.command {
        Command::Completions { shell, output } => {
            if let Err(err) = generate_completions(shell, output) {
                eprintln!("{err}");
            }
        }
        Command::Run {
            field,
            start,
            end,
            location,
            output_html,
            minify_html,
            output_csv,
        } => {
            init_logging();
            headline(APP_ABOUT);
            let settings = match load_settings(&config_path) {
                Ok(settings) => settings,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            tracing::info!(
                mode = "run",
                field = %field,
                start = %start.format(DATE_FORMAT),
                end = %end.format(DATE_FORMAT),
                location = %location,
                data_dir = %settings.data_dir.display(),
                model_dir = %settings.model_dir.display(),
                output_html = %output_html.display(),
                minify_html,
                "Starting forecast"
            );

            let request = ForecastRequest {
                field: &field,
                start,
                end,
                location: &location,
            };
            let mut status = StatusLog::default();
            let mut outcome = ForecastOutcome::default();
            if let Err(err) = run_forecast(&request, &settings, &mut status, &mut outcome) {
                status.error(err.to_string());
            }
            if let Some(path) = output_csv
                && !outcome.table.is_empty()
            {
                match outcome.table.write_csv(&path) {
                    Ok(()) => status.success(format!("Saved predictions to {}", path.display())),
                    Err(err) => status.error(format!("Failed to write predictions CSV: {err}")),
                }
            }

            let dashboard = Dashboard {
                field: &field,
                location: &location,
                start,
                end,
                status: status.entries(),
                model: outcome.model,
                source: outcome.source,
                baseline: outcome.baseline,
                validation: outcome.validation,
                table: &outcome.table,
                series: &outcome.series,
            };
            if let Err(err) = report::render_dashboard(&dashboard, &output_html, minify_html) {
                error(&format!("Failed to render dashboard: {err}"));
                return;
            }
            match saved_summary(&status, &output_html) {
                Ok(message) => success(&message),
                Err(message) => error(&message),
            }
        }
        Command::Train { field } => {
            init_logging();
            headline(APP_ABOUT);
            let settings = match load_settings(&config_path) {
                Ok(settings) => settings,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            tracing::info!(
                mode = "train",
                field = %field,
                training_csv = %settings.historical_csv().display(),
                model_dir = %settings.model_dir.display(),
                n_trees = settings.training.n_trees,
                "Obtaining model"
            );
            let mut status = StatusLog::default();
            let historical = match load_historical(&settings, &mut status) {
                Ok(historical) => historical,
                Err(err) => {
                    error(&format!("Failed to read training data: {err}"));
                    return;
                }
            };
            let store = ArtifactStore::new(&settings.model_dir);
            match load_or_train(&store, &field, &historical, &settings.training, &mut status) {
                Ok(obtained) => match obtained.pipeline.validation() {
                    Some(metrics) => status.info(format_metrics("Validation", &metrics)),
                    None => status.info("No validation rows were held out"),
                },
                Err(err) => error(&err.to_string()),
            }
        }
        Command::Synthesize {
            start,
            end,
            field,
            output_csv,
        } => {
            init_logging();
            headline(APP_ABOUT);
            let settings = match load_settings(&config_path) {
                Ok(settings) => settings,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            tracing::info!(
                mode = "synthesize",
                start = %start.format(DATE_FORMAT),
                end = %end.format(DATE_FORMAT),
                training_csv = %settings.historical_csv().display(),
                output_csv = %output_csv.display(),
                "Synthesizing future features"
            );
            let mut status = StatusLog::default();
            let historical = match load_historical(&settings, &mut status) {
                Ok(historical) => historical,
                Err(err) => {
                    error(&format!("Failed to read training data: {err}"));
                    return;
                }
            };
            let reference = match field.as_deref() {
                Some(field) if !historical.contains(field) => {
                    error(&format!("Field '{field}' not found in the dataset"));
                    return;
                }
                Some(field) => reference_features(&historical, field),
                None => Ok(historical),
            };
            let features = reference.and_then(|reference| {
                let schema = Schema::infer(&reference, settings.training.max_categories)?;
                synth::synthesize(&reference, &schema, start, end)
            });
            let features = match features {
                Ok(features) => features,
                Err(err) => {
                    error(&err.to_string());
                    return;
                }
            };
            if let Err(err) = features.write_csv(&output_csv) {
                error(&format!("Failed to write CSV: {err}"));
                return;
            }
            success(&format!(
                "Saved {} synthetic rows to {}",
                features.height(),
                output_csv.display()
            ));
        }
    }
}
