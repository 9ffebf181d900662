//! File directory configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use idsync_core::error::{AdapterError, AdapterResult};

fn default_id_attribute() -> String {
    "id".to_string()
}

/// Settings for a [`FileDirectory`](crate::FileDirectory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDirectoryConfig {
    /// JSON store location. A missing file reads as an empty directory.
    pub path: PathBuf,

    /// Native attribute holding the user identifier.
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Native attribute through which memberships are read and written.
    ///
    /// Memberships are stored apart from user records; when this is set,
    /// reads expose them under this attribute and writes take them from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_attribute: Option<String>,

    /// Write the store with indentation.
    #[serde(default)]
    pub pretty: bool,
}

impl FileDirectoryConfig {
    /// Create a configuration for the store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_attribute: default_id_attribute(),
            group_attribute: None,
            pretty: false,
        }
    }

    /// Set the identifier attribute.
    #[must_use]
    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    /// Set the membership attribute.
    #[must_use]
    pub fn with_group_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.group_attribute = Some(attribute.into());
        self
    }

    /// Write indented JSON.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AdapterResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(AdapterError::invalid_configuration("path is required"));
        }
        if self.id_attribute.is_empty() {
            return Err(AdapterError::invalid_configuration(
                "id_attribute must not be empty",
            ));
        }
        if self.group_attribute.as_deref() == Some(self.id_attribute.as_str()) {
            return Err(AdapterError::invalid_configuration(
                "group_attribute must differ from id_attribute",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: FileDirectoryConfig = serde_json::from_str(r#"{"path": "dir.json"}"#).unwrap();
        assert_eq!(config.id_attribute, "id");
        assert!(config.group_attribute.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(FileDirectoryConfig::new("").validate().is_err());
        assert!(FileDirectoryConfig::new("d.json")
            .with_id_attribute("")
            .validate()
            .is_err());

        let err = FileDirectoryConfig::new("d.json")
            .with_id_attribute("uid")
            .with_group_attribute("uid")
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }
}
