use std::env;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use crate::config::config::{FaceDetectionConfig, FaceIDConfig, LandmarkConfig, LivenessConfig, StoreConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub environment: Option<String>,
    pub logger: Option<Logger>,
    pub face_detection: FaceDetectionConfig,
    pub landmark: LandmarkConfig,
    pub liveness: LivenessConfig,
    pub face_id: FaceIDConfig,
    pub store: StoreConfig,
}

impl Settings {
    /// new layers `conf/config.toml`, `conf/{RUN_MODE}`, `conf/local` and
    /// `FACEID__*` environment variables over the built-in defaults.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("conf/config.toml").format(FileFormat::Toml).required(false))
            .add_source(File::with_name(&format!("conf/{run_mode}")).required(false))
            .add_source(File::with_name("conf/local").required(false))
            .add_source(Environment::with_prefix("FACEID").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn log_level(&self) -> &str {
        self.logger.as_ref().map(|l| l.level.as_str()).unwrap_or("info")
    }
}
