use std::{env, path::PathBuf};

use directories::{BaseDirs, ProjectDirs};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::core::types::{CsvImportOptions, ImportSettings};
use crate::export::{ExportFormat, ExportOptions};

const CONFIG: &str = include_str!("../.config/config.json5");

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDefaults {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub options: ExportOptions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub preview_rows: usize,
    pub infer_schema_length: usize,
    #[serde(default)]
    pub csv: CsvImportOptions,
    #[serde(default)]
    pub export: ExportDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preview_rows: 5,
            infer_schema_length: 100_000,
            csv: CsvImportOptions::default(),
            export: ExportDefaults::default(),
        }
    }
}

impl Config {
    /// Embedded defaults, overlaid with the user file.
    ///
    /// An explicit `config_path` must exist; otherwise `config.json5` in the
    /// config directory is read when present.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let defaults: Config =
            json5::from_str(CONFIG).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        builder = match config_path {
            Some(p) => builder.add_source(
                config::File::from(expand_tilde(p))
                    .format(config::FileFormat::Json5)
                    .required(true),
            ),
            None => builder.add_source(
                config::File::from(get_config_dir().join("config.json5"))
                    .format(config::FileFormat::Json5)
                    .required(false),
            ),
        };

        builder.build()?.try_deserialize()
    }

    /// Import settings seeded with the configured csv defaults.
    pub fn import_settings(&self) -> ImportSettings {
        let mut settings = ImportSettings::new();
        settings.text_defaults = self.csv.clone();
        settings.infer_schema_length = self.infer_schema_length;
        settings
    }
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Some(s) = path.to_str()
        && s.starts_with('~')
        && let Some(base) = BaseDirs::new()
        && let Some(home) = base.home_dir().to_str()
    {
        return PathBuf::from(s.replacen('~', home, 1));
    }
    path.clone()
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}
