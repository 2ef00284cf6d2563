//! Optional YAML config file supplying defaults for the `observe` options.
//!
//! ```yaml
//! input-file: /var/run/flowscope/flows.jsonl
//! output: table
//! time-format: RFC3339
//! color: never
//! print-node-name: true
//! ip-translation: false
//! ```

use crate::error::{ObserveError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub input_file: Option<String>,
    pub output: Option<String>,
    pub time_format: Option<String>,
    pub color: Option<String>,
    pub print_node_name: Option<bool>,
    pub ip_translation: Option<bool>,
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Self::parse(contents).map_err(|e| ObserveError::Config(e.to_string()))
    }

    fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Load `path`, or return an empty config when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ObserveError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
            .map_err(|e| ObserveError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let config = Config::from_yaml("output: table\nprint-node-name: true\n").unwrap();
        assert_eq!(config.output.as_deref(), Some("table"));
        assert_eq!(config.print_node_name, Some(true));
        assert_eq!(config.color, None);
    }

    #[test]
    fn test_empty_config() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = Config::from_yaml("colour: never\n").unwrap_err();
        assert!(matches!(err, ObserveError::Config(_)));
        assert!(err.is_usage());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time-format: RFC3339").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.time_format.as_deref(), Some("RFC3339"));

        let missing = Config::load(Some(Path::new("/nonexistent/flowscope.yaml")));
        assert!(matches!(missing, Err(ObserveError::Config(_))));
    }

    #[test]
    fn test_load_error_names_path_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "colour: never").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        let message = err.to_string();
        assert_eq!(message.matches("Configuration error").count(), 1, "{}", message);
        assert!(message.contains(&file.path().display().to_string()));
        assert!(message.contains("colour"));
    }
}
