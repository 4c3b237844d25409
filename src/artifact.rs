//! Дисковый кэш обученных конвейеров.
//!
//! Конвейер для поля `field` лежит в `<dir>/RF_<field>.json.gz`, где в имени поля всё,
//! кроме ASCII-букв, цифр и `-`, записано как `%XX` по байтам UTF-8. Наличие файла —
//! единственный признак попадания в кэш: содержимое не сверяется с текущими данными,
//! расхождение схемы только логируется.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::warn;

use crate::error::ForecastError;
use crate::frame::Frame;
use crate::model::{ModelPipeline, TrainingSettings};
use crate::schema::{ColumnKind, Schema};
use crate::status::StatusLog;

const ARTIFACT_PREFIX: &str = "RF_";
const ARTIFACT_EXTENSION: &str = "json.gz";

/// Жизненный цикл конвейера для одного поля.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uncached,
    Training,
    Persisted(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOrigin {
    Loaded,
    Trained,
}

pub struct ObtainedPipeline {
    pub pipeline: ModelPipeline,
    pub origin: PipelineOrigin,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Разные поля всегда дают разные файлы.
    pub fn path_for(&self, field: &str) -> PathBuf {
        let mut encoded = String::with_capacity(field.len());
        for byte in field.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                encoded.push(char::from(byte));
            } else {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
        self.dir
            .join(format!("{ARTIFACT_PREFIX}{encoded}.{ARTIFACT_EXTENSION}"))
    }

    pub fn state(&self, field: &str) -> PipelineState {
        let path = self.path_for(field);
        if path.is_file() {
            PipelineState::Persisted(path)
        } else {
            PipelineState::Uncached
        }
    }

    pub fn load(&self, path: &Path) -> Result<ModelPipeline, ForecastError> {
        let file = File::open(path).map_err(|err| ForecastError::io(path, err))?;
        serde_json::from_reader(BufReader::new(GzDecoder::new(file))).map_err(|source| {
            ForecastError::Artifact {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Пишет во временный файл и переименовывает: при гонке побеждает последний.
    /// При ошибке временный файл удаляется.
    pub fn save(&self, pipeline: &ModelPipeline) -> Result<PathBuf, ForecastError> {
        fs::create_dir_all(&self.dir).map_err(|err| ForecastError::io(&self.dir, err))?;
        let path = self.path_for(pipeline.target());
        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));

        let saved = write_compressed(&tmp, pipeline)
            .and_then(|()| fs::rename(&tmp, &path).map_err(|err| ForecastError::io(&path, err)));
        if let Err(err) = saved {
            if tmp.exists()
                && let Err(cleanup) = fs::remove_file(&tmp)
            {
                warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary artifact");
            }
            return Err(err);
        }
        Ok(path)
    }
}

fn write_compressed(tmp: &Path, pipeline: &ModelPipeline) -> Result<(), ForecastError> {
    let file = File::create(tmp).map_err(|err| ForecastError::io(tmp, err))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, pipeline).map_err(|source| ForecastError::Artifact {
        path: tmp.to_path_buf(),
        source,
    })?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|err| ForecastError::io(tmp, err))
}

/// Загружает конвейер из кэша или обучает и сразу сохраняет новый.
pub fn load_or_train(
    store: &ArtifactStore,
    field: &str,
    historical: &Frame,
    settings: &TrainingSettings,
    status: &mut StatusLog,
) -> Result<ObtainedPipeline, ForecastError> {
    if !historical.contains(field) {
        return Err(ForecastError::schema(format!(
            "field '{field}' not found in the dataset"
        )));
    }

    let mut state = store.state(field);
    loop {
        state = match state {
            PipelineState::Persisted(path) => {
                let pipeline = store.load(&path)?;
                if pipeline.target() != field {
                    return Err(ForecastError::schema(format!(
                        "artifact {} was trained for '{}'",
                        path.display(),
                        pipeline.target()
                    )));
                }
                report_schema_drift(&pipeline, historical, field, status)?;
                status.success(format!("Loaded pre-trained model from {}", path.display()));
                return Ok(ObtainedPipeline {
                    pipeline,
                    origin: PipelineOrigin::Loaded,
                    path,
                });
            }
            PipelineState::Uncached => {
                status.warn(format!("No saved model for '{field}', training a new one"));
                PipelineState::Training
            }
            PipelineState::Training => {
                let pipeline = ModelPipeline::train(field, historical, settings)?;
                let path = store.save(&pipeline)?;
                status.success(format!("Model trained and saved to {}", path.display()));
                return Ok(ObtainedPipeline {
                    pipeline,
                    origin: PipelineOrigin::Trained,
                    path,
                });
            }
        };
    }
}

/// Сообщает, если входные колонки сохранённого конвейера не совпадают с текущими данными.
fn report_schema_drift(
    pipeline: &ModelPipeline,
    historical: &Frame,
    field: &str,
    status: &mut StatusLog,
) -> Result<(), ForecastError> {
    let current = Schema::infer(&historical.without(field)?, pipeline.settings().max_categories)?;
    let drifted: Vec<&str> = pipeline
        .input_columns()
        .filter(|name| {
            let trained = pipeline.schema().kind_of(name);
            match (trained, current.kind_of(name)) {
                (_, None) => true,
                (Some(ColumnKind::Numeric), Some(kind)) => kind != ColumnKind::Numeric,
                (Some(_), Some(kind)) => !kind.is_textual(),
                (None, Some(_)) => false,
            }
        })
        .collect();
    if !drifted.is_empty() {
        status.warn(format!(
            "Saved model for '{field}' expects columns that changed in the dataset: {}",
            drifted.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::numeric_column;

    fn settings() -> TrainingSettings {
        TrainingSettings {
            n_trees: 5,
            ..TrainingSettings::default()
        }
    }

    fn history() -> Frame {
        let idx = 0..90;
        Frame::new(vec![
            numeric_column("Hour", idx.clone().map(|i| Some((i % 24 * 100) as f64)).collect()),
            numeric_column(
                "LocationInNum",
                idx.clone().map(|i| Some((i % 3 + 1) as f64)).collect(),
            ),
            numeric_column("Temperature", idx.map(|i| Some(24.0 + (i % 6) as f64)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn path_is_derived_from_field() {
        let store = ArtifactStore::new("saved_model");
        assert_eq!(
            store.path_for("Temperature"),
            PathBuf::from("saved_model/RF_Temperature.json.gz")
        );
        assert_eq!(
            store.path_for("Wind Speed/avg"),
            PathBuf::from("saved_model/RF_Wind%20Speed%2Favg.json.gz")
        );
        assert_eq!(
            store.path_for("Suhu °C"),
            PathBuf::from("saved_model/RF_Suhu%20%C2%B0C.json.gz")
        );
        let names = ["Wind Speed", "Wind_Speed", "Wind%20Speed", "Wind.Speed", "Wind-Speed"];
        let paths: std::collections::HashSet<_> =
            names.iter().map(|name| store.path_for(name)).collect();
        assert_eq!(paths.len(), names.len());
    }

    #[test]
    fn similar_field_names_get_separate_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let idx = 0..60;
        let historical = Frame::new(vec![
            numeric_column("Hour", idx.clone().map(|i| Some((i % 24 * 100) as f64)).collect()),
            numeric_column("Wind Speed", idx.clone().map(|i| Some((i % 7) as f64)).collect()),
            numeric_column("Wind_Speed", idx.map(|i| Some(10.0 + (i % 5) as f64)).collect()),
        ])
        .unwrap();
        let mut status = StatusLog::default();

        let spaced =
            load_or_train(&store, "Wind Speed", &historical, &settings(), &mut status).unwrap();
        let underscored =
            load_or_train(&store, "Wind_Speed", &historical, &settings(), &mut status).unwrap();
        assert_eq!(underscored.origin, PipelineOrigin::Trained);
        assert_eq!(underscored.pipeline.target(), "Wind_Speed");
        assert_ne!(spaced.path, underscored.path);
        assert!(spaced.path.is_file() && underscored.path.is_file());

        let again =
            load_or_train(&store, "Wind Speed", &historical, &settings(), &mut status).unwrap();
        assert_eq!(again.origin, PipelineOrigin::Loaded);
        assert_eq!(again.pipeline.target(), "Wind Speed");
    }

    #[test]
    fn failed_save_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pipeline = ModelPipeline::train("Temperature", &history(), &settings()).unwrap();
        // Каталог на месте артефакта: переименование не удастся.
        let target = store.path_for("Temperature");
        fs::create_dir_all(target.join("occupied")).unwrap();

        let result = store.save(&pipeline);
        assert!(matches!(result, Err(ForecastError::Io { .. })));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn second_call_hits_the_cache_with_equal_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let historical = history();
        let mut status = StatusLog::default();

        assert_eq!(store.state("Temperature"), PipelineState::Uncached);
        let first = load_or_train(&store, "Temperature", &historical, &settings(), &mut status)
            .unwrap();
        assert_eq!(first.origin, PipelineOrigin::Trained);
        assert_eq!(
            store.state("Temperature"),
            PipelineState::Persisted(first.path.clone())
        );

        let second = load_or_train(&store, "Temperature", &historical, &settings(), &mut status)
            .unwrap();
        assert_eq!(second.origin, PipelineOrigin::Loaded);

        let features = historical.without("Temperature").unwrap();
        assert_eq!(
            first.pipeline.predict(&features).unwrap(),
            second.pipeline.predict(&features).unwrap()
        );
        assert!(!status.has_errors());
    }

    #[test]
    fn unknown_field_fails_before_touching_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let mut status = StatusLog::default();
        let result = load_or_train(&store, "Pressure", &history(), &settings(), &mut status);
        assert!(matches!(result, Err(ForecastError::Schema(_))));
        assert!(!dir.path().join("models").exists());
    }

    #[test]
    fn corrupt_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(store.path_for("Temperature"), b"not gzip").unwrap();
        let mut status = StatusLog::default();
        let result = load_or_train(&store, "Temperature", &history(), &settings(), &mut status);
        assert!(matches!(result, Err(ForecastError::Artifact { .. })));
    }

    #[test]
    fn schema_drift_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let mut status = StatusLog::default();
        load_or_train(&store, "Temperature", &history(), &settings(), &mut status).unwrap();

        let mut status = StatusLog::default();
        let reduced = history().without("Hour").unwrap();
        let obtained =
            load_or_train(&store, "Temperature", &reduced, &settings(), &mut status).unwrap();
        assert_eq!(obtained.origin, PipelineOrigin::Loaded);
        assert!(
            status
                .entries()
                .iter()
                .any(|entry| entry.message.contains("Hour"))
        );
    }
}
