use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl std::str::FromStr for BusKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            _ => Err(()),
        }
    }
}

/// Daemon configuration: defaults, then a TOML file, then `FACEID_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite identity store.
    pub db_path: PathBuf,
    /// Cosine similarity at or above which a match is accepted.
    pub decision_threshold: f32,
    /// Minimum SCRFD score for a detection to count as a face.
    pub detector_confidence: f32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    pub bus: BusKind,
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    decision_threshold: Option<f32>,
    detector_confidence: Option<f32>,
    intra_threads: Option<usize>,
    bus: Option<BusKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: faceid_models::default_model_dir(),
            db_path: faceid_models::default_data_dir().join("identities.db"),
            decision_threshold: faceid_core::DEFAULT_DECISION_THRESHOLD,
            detector_confidence: faceid_models::DEFAULT_DETECTOR_CONFIDENCE,
            intra_threads: 2,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply `FACEID_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_file_path() {
            if path.exists() {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                config.apply_file(&path, &text)?;
                tracing::info!(path = %path.display(), "loaded config file");
            }
        }

        if let Some(dir) = env_var("FACEID_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_var("FACEID_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.decision_threshold = env_parse("FACEID_DECISION_THRESHOLD", config.decision_threshold)?;
        config.detector_confidence =
            env_parse("FACEID_DETECTOR_CONFIDENCE", config.detector_confidence)?;
        config.intra_threads = env_parse("FACEID_INTRA_THREADS", config.intra_threads)?;
        config.bus = env_parse("FACEID_BUS", config.bus)?;

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path, text: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.decision_threshold {
            self.decision_threshold = v;
        }
        if let Some(v) = file.detector_confidence {
            self.detector_confidence = v;
        }
        if let Some(v) = file.intra_threads {
            self.intra_threads = v;
        }
        if let Some(v) = file.bus {
            self.bus = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "decision_threshold",
                value: self.decision_threshold.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "detector_confidence",
                value: self.detector_confidence.to_string(),
            });
        }
        if self.intra_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "intra_threads",
                value: "0".into(),
            });
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(faceid_models::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(faceid_models::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

/// `$FACEID_CONFIG`, else `$XDG_CONFIG_HOME/faceid/config.toml`.
fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = env_var("FACEID_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let base = env_var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env_var("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("faceid").join("config.toml"))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str, current: T) -> Result<T, ConfigError> {
    match env_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(current),
    }
}
