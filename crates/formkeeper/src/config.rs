//! Configuration management for formkeeper.
//!
//! Configuration is layered with figment: built-in defaults, then an optional
//! TOML file, then `FORMKEEPER_` environment variables.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "formkeeper";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "records.db";

/// Smallest and largest accepted export font sizes, in points.
const MIN_FONT_SIZE: f32 = 6.0;
const MAX_FONT_SIZE: f32 = 24.0;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (`FORMKEEPER_` prefix, `__` between table and key)
/// 2. TOML config file at `~/.config/formkeeper/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Schema configuration.
    pub schema: SchemaConfig,
    /// Document export configuration.
    pub export: ExportConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/formkeeper/records.db`
    pub database_path: Option<PathBuf>,
}

/// Schema-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// JSON template used when the store holds no schema yet.
    /// Defaults to the built-in customer schema.
    pub template_path: Option<PathBuf>,
}

/// Paper size for exported documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    /// US Letter, 612 x 792 points.
    #[default]
    Letter,
    /// ISO A4, 595 x 842 points.
    A4,
}

impl PageSize {
    /// Page dimensions in PDF points (width, height).
    #[must_use]
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            Self::Letter => (612.0, 792.0),
            Self::A4 => (595.0, 842.0),
        }
    }
}

/// Export-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Symbol prefixed to monetary values.
    pub currency_symbol: String,
    /// Paper size for PDF exports.
    pub page_size: PageSize,
    /// Body font size in points.
    pub font_size: f32,
    /// Directory exports are written to when no output file is given.
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "$".to_string(),
            page_size: PageSize::default(),
            font_size: 10.0,
            output_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FORMKEEPER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.export.currency_symbol.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "export.currency_symbol must not be empty".to_string(),
            });
        }

        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&self.export.font_size) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "export.font_size ({}) must be between {MIN_FONT_SIZE} and {MAX_FONT_SIZE}",
                    self.export.font_size
                ),
            });
        }

        if let Some(path) = &self.schema.template_path {
            if path.as_os_str().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "schema.template_path must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export output directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.schema.template_path.is_none());
        assert_eq!(config.export.currency_symbol, "$");
        assert_eq!(config.export.page_size, PageSize::Letter);
        assert!((config.export.font_size - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_currency_symbol() {
        let mut config = Config::default();
        config.export.currency_symbol = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("currency_symbol"));
    }

    #[test]
    fn test_validate_font_size_out_of_range() {
        let mut config = Config::default();
        config.export.font_size = 2.0;
        assert!(config.validate().is_err());

        config.export.font_size = 48.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("font_size"));
    }

    #[test]
    fn test_validate_empty_template_path() {
        let mut config = Config::default();
        config.schema.template_path = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_dimensions() {
        assert_eq!(PageSize::Letter.dimensions(), (612.0, 792.0));
        assert_eq!(PageSize::A4.dimensions(), (595.0, 842.0));
    }

    #[test]
    fn test_page_size_deserialize() {
        let size: PageSize = serde_json::from_str("\"a4\"").unwrap();
        assert_eq!(size, PageSize::A4);
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("records.db"));
        assert!(path.to_string_lossy().contains("formkeeper"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_output_dir_default() {
        assert_eq!(Config::default().output_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("formkeeper"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "formkeeper_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[export]\ncurrency_symbol = \"EUR \"\npage_size = \"a4\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.export.currency_symbol, "EUR ");
        assert_eq!(config.export.page_size, PageSize::A4);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_export_config_deserialize_partial() {
        let json = r#"{"font_size": 12.0}"#;
        let export: ExportConfig = serde_json::from_str(json).unwrap();
        assert!((export.font_size - 12.0).abs() < f32::EPSILON);
        assert_eq!(export.currency_symbol, "$");
    }
}
