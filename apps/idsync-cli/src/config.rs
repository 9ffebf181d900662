//! Sync configuration file.
//!
//! ```yaml
//! source:
//!   path: desired.json
//! targets:
//!   - name: staging
//!     kind: file
//!     path: directory.json
//!     sync:
//!       identity_key: id
//!       mapping: {id: userId, email: mail}
//!       group_field: groups
//! ```
//!
//! Relative paths resolve against the directory holding the configuration
//! file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use idsync_connector_file::{FileDirectory, FileDirectoryConfig};
use idsync_core::adapter::ProviderAdapter;
use idsync_core::config::SyncConfig;
use idsync_core::record::CanonicalRecord;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub source: SourceConfig,
    pub targets: Vec<TargetConfig>,
}

/// Where the desired population comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// JSON or YAML file holding a list of canonical records.
    pub path: PathBuf,
}

/// One target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: TargetKind,
    pub sync: SyncConfig,
}

/// Adapter selection and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    File {
        path: PathBuf,
        /// Defaults to the native name of the identity key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id_attribute: Option<String>,
        #[serde(default)]
        pretty: bool,
    },
}

impl TargetConfig {
    /// Build the adapter for this target.
    pub fn adapter(&self) -> CliResult<Arc<dyn ProviderAdapter>> {
        match &self.kind {
            TargetKind::File {
                path,
                id_attribute,
                pretty,
            } => {
                if !self.sync.group_filters.is_empty() {
                    return Err(CliError::Config(format!(
                        "target '{}': group_filters are not supported by file targets",
                        self.name
                    )));
                }

                let id_attribute = id_attribute
                    .clone()
                    .or_else(|| {
                        self.sync
                            .mapping
                            .native_name(&self.sync.identity_key)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| self.sync.identity_key.clone());

                let mut config = FileDirectoryConfig::new(path).with_id_attribute(id_attribute);
                if let Some(field) = &self.sync.group_field {
                    let attribute = self.sync.mapping.native_name(field).unwrap_or(field.as_str());
                    config = config.with_group_attribute(attribute);
                }
                if *pretty {
                    config = config.pretty();
                }

                let directory = FileDirectory::new(config)
                    .map_err(|e| CliError::Config(format!("target '{}': {e}", self.name)))?
                    .with_name(self.name.clone())
                    .with_ignore_rules(self.sync.ignore_rules());
                Ok(Arc::new(directory))
            }
        }
    }
}

impl CliConfig {
    /// Load, resolve and validate a configuration file.
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Io(format!("Failed to read file {}: {e}", path.display())))?;

        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without validating.
    pub fn parse(content: &str) -> CliResult<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            let location = if let Some(loc) = e.location() {
                format!(" at line {}, column {}", loc.line(), loc.column())
            } else {
                String::new()
            };
            CliError::Config(format!("Invalid YAML{location}: {e}"))
        })
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.source.path);
        for target in &mut self.targets {
            match &mut target.kind {
                TargetKind::File { path, .. } => resolve(path),
            }
        }
    }

    /// Check targets and their sync settings.
    pub fn validate(&self) -> CliResult<()> {
        if self.targets.is_empty() {
            return Err(CliError::Config("at least one target is required".to_string()));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(CliError::Config("target name must not be empty".to_string()));
            }
            if !names.insert(target.name.as_str()) {
                return Err(CliError::Config(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            target
                .sync
                .validate()
                .map_err(|e| CliError::Config(format!("target '{}': {e}", target.name)))?;
        }
        Ok(())
    }

    /// Targets to operate on: all, or the one named.
    pub fn select(&self, name: Option<&str>) -> CliResult<Vec<&TargetConfig>> {
        match name {
            None => Ok(self.targets.iter().collect()),
            Some(name) => self
                .targets
                .iter()
                .find(|t| t.name == name)
                .map(|t| vec![t])
                .ok_or_else(|| CliError::Validation(format!("no target named '{name}'"))),
        }
    }

    /// Read the desired population.
    pub fn load_desired(&self) -> CliResult<Vec<CanonicalRecord>> {
        let path = &self.source.path;
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Io(format!("Failed to read file {}: {e}", path.display())))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                CliError::Validation(format!("Invalid source {}: {e}", path.display()))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                CliError::Validation(format!(
                    "Invalid source {} at line {}, column {}: {e}",
                    path.display(),
                    e.line(),
                    e.column()
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
source:
  path: desired.json
targets:
  - name: staging
    kind: file
    path: dir/staging.json
    sync:
      identity_key: id
      mapping: {id: userId, email: mail, groups: memberOf}
      group_field: groups
      ignore_users: [svc]
"#;

    #[test]
    fn test_parse() {
        let config = CliConfig::parse(YAML).unwrap();
        assert_eq!(config.targets.len(), 1);
        let target = &config.targets[0];
        assert_eq!(target.name, "staging");
        assert!(matches!(
            &target.kind,
            TargetKind::File { id_attribute: None, pretty: false, .. }
        ));
        assert_eq!(target.sync.group_field.as_deref(), Some("groups"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = CliConfig::parse(YAML).unwrap();
        config.resolve_paths(Path::new("/etc/idsync"));

        assert_eq!(config.source.path, PathBuf::from("/etc/idsync/desired.json"));
        match &config.targets[0].kind {
            TargetKind::File { path, .. } => {
                assert_eq!(path, &PathBuf::from("/etc/idsync/dir/staging.json"))
            }
        }
    }

    #[test]
    fn test_invalid_yaml_reports_location() {
        let err = CliConfig::parse("source:\n  path: [unclosed\n").unwrap_err();
        assert!(err.to_string().contains("line"), "{err}");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_unknown_kind() {
        let yaml = YAML.replace("kind: file", "kind: ldap");
        assert!(CliConfig::parse(&yaml).is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let mut config = CliConfig::parse(YAML).unwrap();
        config.targets.push(config.targets[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate target name"));
    }

    #[test]
    fn test_validate_sync_config() {
        let yaml = YAML.replace("identity_key: id", "identity_key: login");
        let err = CliConfig::parse(&yaml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("target 'staging'"), "{err}");
    }

    #[test]
    fn test_select() {
        let config = CliConfig::parse(YAML).unwrap();
        assert_eq!(config.select(None).unwrap().len(), 1);
        assert_eq!(config.select(Some("staging")).unwrap()[0].name, "staging");
        assert!(config.select(Some("prod")).is_err());
    }

    #[test]
    fn test_group_filters_rejected_for_file_targets() {
        let mut config = CliConfig::parse(YAML).unwrap();
        config.targets[0].sync.group_filters = vec!["displayName sw \"eng\"".to_string()];
        assert!(config.targets[0].adapter().is_err());
    }
}
