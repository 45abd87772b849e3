//! Configuration for AIRR tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (airr.toml)
//! - Environment variables (AIRR__*)
//!
//! ## Example config file (airr.toml):
//! ```toml
//! [schema]
//! path = "specs/airr-schema.yaml"
//!
//! [validation]
//! strict = true
//! row_shape = "error"
//! warn_unknown_fields = true
//! allow_missing_optional = true
//!
//! [output]
//! format = "pretty"
//! hierarchical_format = "json"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::interface::DataFormat;
use crate::registry::SchemaRegistry;
use crate::tabular::{ReaderOptions, RowShapePolicy};
use crate::validator::ValidationOptions;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirrConfig {
    /// Schema source
    #[serde(default)]
    pub schema: SchemaSourceConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Schema source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSourceConfig {
    /// External schema file; the bundled schema is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Open tabular files in validating mode
    #[serde(default)]
    pub strict: bool,

    /// Row shape policy; follows `strict` when unset
    #[serde(default)]
    pub row_shape: Option<RowShapePolicy>,

    /// Warn about fields the schema does not define
    #[serde(default = "default_true")]
    pub warn_unknown_fields: bool,

    /// Accept objects without optional fields
    #[serde(default = "default_true")]
    pub allow_missing_optional: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON layout (pretty or compact)
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,

    /// Force YAML or JSON instead of detecting it from the file extension
    #[serde(default)]
    pub hierarchical_format: Option<DataFormat>,
}

/// Output layout for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_true() -> bool {
    true
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            row_shape: None,
            warn_unknown_fields: true,
            allow_missing_optional: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            hierarchical_format: None,
        }
    }
}

impl AirrConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["airr.toml", ".airr.toml", "config/airr.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("org", "airr-community", "airr") {
            let xdg_config = config_dir.config_dir().join("airr.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // AIRR__VALIDATION__STRICT=true and so on
        builder = builder.add_source(
            Environment::with_prefix("AIRR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Registry over the configured schema, or the bundled one
    pub fn registry(&self) -> Result<SchemaRegistry> {
        match &self.schema.path {
            Some(path) => SchemaRegistry::open(path),
            None => SchemaRegistry::embedded(),
        }
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            validate: self.validation.strict,
            row_shape: self.validation.row_shape,
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            allow_missing_optional: self.validation.allow_missing_optional,
            warn_unknown_fields: self.validation.warn_unknown_fields,
        }
    }

    pub fn pretty(&self) -> bool {
        self.output.format == OutputFormat::Pretty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AirrConfig::default();
        assert!(!config.validation.strict);
        assert!(config.pretty());
        assert_eq!(config.reader_options(), ReaderOptions::default());
        assert_eq!(config.validation_options(), ValidationOptions::default());
    }

    #[test]
    fn test_serialize_config() {
        let config = AirrConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[validation]"));
        assert!(toml_str.contains("[output]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[validation]\nstrict = true\nrow_shape = \"flag\"\nwarn_unknown_fields = false\n\n[output]\nformat = \"compact\"\nhierarchical_format = \"yaml\"\n",
        )
        .unwrap();

        let config = AirrConfig::load_from(path.to_str()).unwrap();
        assert!(config.validation.strict);
        assert_eq!(config.reader_options().row_shape_policy(), RowShapePolicy::Flag);
        assert!(!config.validation_options().warn_unknown_fields);
        assert!(config.validation_options().allow_missing_optional);
        assert!(!config.pretty());
        assert_eq!(config.output.hierarchical_format, Some(DataFormat::Yaml));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = AirrConfig::default();
        config.validation.strict = true;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = AirrConfig::load_from(path.to_str()).unwrap();
        assert!(loaded.validation.strict);
    }

    #[test]
    fn test_registry_defaults_to_bundled_schema() {
        let registry = AirrConfig::default().registry().unwrap();
        assert!(registry.contains("Rearrangement"));
    }
}
