//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Reject misspelled sections and fields
//! - Apply `NOTIFY_DISPATCHER__*` environment overrides
//! - Validate configuration legality
//! - Generate `NotifierBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("notifier.toml")).unwrap();
//! println!("Burst cap: {}", blueprint.dispatcher.burst.cap);
//! ```

mod overrides;
mod parser;
mod validator;

pub use contracts::NotifierBlueprint;
pub use overrides::ENV_PREFIX;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    /// `NOTIFY_DISPATCHER__*` variables from the process environment are
    /// applied on top of the file before validation.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Unknown override path
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<NotifierBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_with_overrides(&content, format, std::env::vars())
    }

    /// Load configuration from string, then apply overrides from `vars`
    ///
    /// Only keys starting with [`ENV_PREFIX`] are considered.
    pub fn load_with_overrides<I>(
        content: &str,
        format: ConfigFormat,
        vars: I,
    ) -> Result<NotifierBlueprint, ContractError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut doc = parser::parse_document(content, format)?;
        let template = parser::template()?;
        parser::check_known_keys(&doc, &template)?;
        overrides::apply(&mut doc, &template, vars)?;
        let blueprint = parser::into_blueprint(doc)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<NotifierBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize NotifierBlueprint to TOML string
    pub fn to_toml(blueprint: &NotifierBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize NotifierBlueprint to JSON string
    pub fn to_json(blueprint: &NotifierBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<NotifierBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
