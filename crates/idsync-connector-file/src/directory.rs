//! JSON file directory adapter.
//!
//! The store is a single JSON document:
//!
//! ```json
//! {
//!   "users": [{"id": "u1", "mail": "u1@example.com"}],
//!   "memberships": {"u1": ["admins"]}
//! }
//! ```
//!
//! Writes go to a sibling temp file that is then renamed over the store, and
//! are serialized through one lock per adapter instance.
//!
//! Membership reads are answered from the store as the last population read
//! saw it, so a sync parses the file once rather than once per user. Any
//! write through this instance drops that snapshot.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use idsync_core::adapter::{ListOptions, ProviderAdapter};
use idsync_core::error::{AdapterError, AdapterResult};
use idsync_core::ignore::IgnoreRules;
use idsync_core::record::NativeRecord;

use crate::config::FileDirectoryConfig;
use crate::filter::Filter;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    #[serde(default)]
    users: Vec<NativeRecord>,
    #[serde(default)]
    memberships: BTreeMap<String, Vec<String>>,
}

/// Directory backed by a JSON file.
pub struct FileDirectory {
    config: FileDirectoryConfig,
    display_name: String,
    ignore: IgnoreRules,
    write_lock: Mutex<()>,
    snapshot: RwLock<Option<Arc<Store>>>,
}

impl std::fmt::Debug for FileDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDirectory")
            .field("config", &self.config)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl FileDirectory {
    /// Create a directory over the configured store.
    pub fn new(config: FileDirectoryConfig) -> AdapterResult<Self> {
        config.validate()?;

        let display_name = format!("file: {}", config.path.display());

        Ok(Self {
            config,
            display_name,
            ignore: IgnoreRules::default(),
            write_lock: Mutex::new(()),
            snapshot: RwLock::new(None),
        })
    }

    /// Override the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Users and groups to leave alone.
    #[must_use]
    pub fn with_ignore_rules(mut self, rules: IgnoreRules) -> Self {
        self.ignore = rules;
        self
    }

    pub fn config(&self) -> &FileDirectoryConfig {
        &self.config
    }

    async fn load(&self) -> AdapterResult<Store> {
        let path = &self.config.path;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store does not exist yet");
                return Ok(Store::default());
            }
            Err(e) => {
                return Err(AdapterError::connection_failed_with_source(
                    format!("failed to read {}", path.display()),
                    e,
                ))
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Store::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| AdapterError::invalid_data(format!("{}: {e}", path.display())))
    }

    async fn save(&self, store: &Store) -> AdapterResult<()> {
        self.snapshot.write().await.take();

        let path = &self.config.path;
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(store)
        } else {
            serde_json::to_vec(store)
        }
        .map_err(|e| AdapterError::operation_failed_with_source("failed to encode store", e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AdapterError::operation_failed_with_source(
                    format!("failed to create {}", parent.display()),
                    e,
                )
            })?;
        }

        let mut temp = OsString::from(path.as_os_str());
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, bytes).await.map_err(|e| {
            AdapterError::operation_failed_with_source(
                format!("failed to write {}", temp.display()),
                e,
            )
        })?;
        tokio::fs::rename(&temp, path).await.map_err(|e| {
            AdapterError::operation_failed_with_source(
                format!("failed to replace {}", path.display()),
                e,
            )
        })
    }

    fn parse_filter(options: &ListOptions) -> AdapterResult<Option<Filter>> {
        options
            .filter
            .as_deref()
            .map(str::parse::<Filter>)
            .transpose()
            .map_err(|e| AdapterError::invalid_data(e.to_string()))
    }

    fn id_of<'a>(&self, record: &'a NativeRecord) -> AdapterResult<&'a str> {
        match record.get_str(&self.config.id_attribute) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(AdapterError::invalid_data(format!(
                "record has no '{}': {record}",
                self.config.id_attribute
            ))),
        }
    }

    fn position(&self, store: &Store, user_id: &str) -> Option<usize> {
        store
            .users
            .iter()
            .position(|u| u.get_str(&self.config.id_attribute) == Some(user_id))
    }

    fn visible_groups(&self, store: &Store, user_id: &str) -> Vec<String> {
        store
            .memberships
            .get(user_id)
            .map(|groups| self.ignore.retain_groups(groups.clone()))
            .unwrap_or_default()
    }

    /// The stored record as adapters present it, memberships included.
    fn expose(&self, store: &Store, record: &NativeRecord, user_id: &str) -> NativeRecord {
        let mut record = record.clone();
        if let Some(attribute) = &self.config.group_attribute {
            let groups = self.visible_groups(store, user_id);
            record.insert(
                attribute.as_str(),
                Value::Array(groups.into_iter().map(Value::String).collect()),
            );
        }
        record
    }

    /// Remove the membership attribute from an inbound payload.
    fn take_groups(&self, record: &mut NativeRecord) -> AdapterResult<Option<Vec<String>>> {
        let Some(attribute) = &self.config.group_attribute else {
            return Ok(None);
        };
        match record.remove(attribute) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(Vec::new())),
            Some(value) => serde_json::from_value::<Vec<String>>(value)
                .map(|groups| Some(self.ignore.retain_groups(groups)))
                .map_err(|_| {
                    AdapterError::invalid_data(format!(
                        "'{attribute}' must be a list of group identifiers"
                    ))
                }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FileDirectory {
    fn name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self), fields(adapter = %self.display_name))]
    async fn fetch_population(&self, options: &ListOptions) -> AdapterResult<Vec<NativeRecord>> {
        let filter = Self::parse_filter(options)?;

        let store = Arc::new(self.load().await?);

        let mut users = Vec::with_capacity(store.users.len());
        for record in &store.users {
            let user_id = self.id_of(record)?;
            if self.ignore.is_user_ignored(user_id) {
                continue;
            }
            let exposed = self.expose(&store, record, user_id);
            if filter.as_ref().map_or(true, |f| f.matches(&exposed)) {
                users.push(exposed);
            }
        }

        debug!(
            total = store.users.len(),
            returned = users.len(),
            "Read population"
        );
        *self.snapshot.write().await = Some(store);
        Ok(users)
    }

    async fn fetch_memberships(&self, user_id: &str) -> AdapterResult<Vec<String>> {
        if self.ignore.is_user_ignored(user_id) {
            return Err(AdapterError::not_found(user_id));
        }
        let snapshot = self.snapshot.read().await.clone();
        if let Some(store) = snapshot {
            if self.position(&store, user_id).is_some() {
                return Ok(self.visible_groups(&store, user_id));
            }
        }

        let store = self.load().await?;
        if self.position(&store, user_id).is_none() {
            return Err(AdapterError::not_found(user_id));
        }
        Ok(self.visible_groups(&store, user_id))
    }

    async fn fetch_one(&self, user_id: &str) -> AdapterResult<NativeRecord> {
        if self.ignore.is_user_ignored(user_id) {
            return Err(AdapterError::not_found(user_id));
        }
        let store = self.load().await?;
        let position = self
            .position(&store, user_id)
            .ok_or_else(|| AdapterError::not_found(user_id))?;
        Ok(self.expose(&store, &store.users[position], user_id))
    }

    #[instrument(skip(self, record), fields(adapter = %self.display_name))]
    async fn create_record(&self, mut record: NativeRecord) -> AdapterResult<()> {
        let user_id = self.id_of(&record)?.to_string();
        if self.ignore.is_user_ignored(&user_id) {
            debug!(id = %user_id, "Skipping ignored user");
            return Ok(());
        }
        let groups = self.take_groups(&mut record)?;

        let _guard = self.write_lock.lock().await;
        let mut store = self.load().await?;
        if self.position(&store, &user_id).is_some() {
            return Err(AdapterError::already_exists(user_id));
        }
        store.users.push(record);
        store
            .memberships
            .insert(user_id.clone(), groups.unwrap_or_default());
        self.save(&store).await?;

        info!(id = %user_id, "User created");
        Ok(())
    }

    #[instrument(skip(self, record), fields(adapter = %self.display_name))]
    async fn update_record(&self, user_id: &str, mut record: NativeRecord) -> AdapterResult<()> {
        if self.ignore.is_user_ignored(user_id) {
            debug!(id = %user_id, "Skipping ignored user");
            return Ok(());
        }
        match record.get(&self.config.id_attribute) {
            None => {
                record.insert(self.config.id_attribute.as_str(), Value::from(user_id));
            }
            Some(Value::String(id)) if id == user_id => {}
            Some(other) => {
                return Err(AdapterError::invalid_data(format!(
                    "cannot change '{}' of {user_id} to {other}",
                    self.config.id_attribute
                )))
            }
        }
        let groups = self.take_groups(&mut record)?;

        let _guard = self.write_lock.lock().await;
        let mut store = self.load().await?;
        let position = self
            .position(&store, user_id)
            .ok_or_else(|| AdapterError::not_found(user_id))?;
        store.users[position] = record;

        if let Some(groups) = groups {
            // Memberships in ignored groups are not ours to remove.
            let kept = store
                .memberships
                .get(user_id)
                .into_iter()
                .flatten()
                .filter(|g| self.ignore.is_group_ignored(g))
                .cloned();
            let merged = groups.into_iter().chain(kept).collect();
            store.memberships.insert(user_id.to_string(), merged);
        }
        self.save(&store).await?;

        info!(id = %user_id, "User updated");
        Ok(())
    }

    #[instrument(skip(self), fields(adapter = %self.display_name))]
    async fn delete_record(&self, user_id: &str) -> AdapterResult<()> {
        if self.ignore.is_user_ignored(user_id) {
            debug!(id = %user_id, "Skipping ignored user");
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut store = self.load().await?;
        let position = self
            .position(&store, user_id)
            .ok_or_else(|| AdapterError::not_found(user_id))?;
        store.users.remove(position);
        store.memberships.remove(user_id);
        self.save(&store).await?;

        info!(id = %user_id, "User deleted");
        Ok(())
    }

    fn in_scope(&self, record: &NativeRecord, options: &ListOptions) -> AdapterResult<bool> {
        let user_id = self.id_of(record)?;
        if self.ignore.is_user_ignored(user_id) {
            return Ok(false);
        }
        Ok(Self::parse_filter(options)?.map_or(true, |f| f.matches(record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn directory(dir: &TempDir) -> FileDirectory {
        FileDirectory::new(
            FileDirectoryConfig::new(dir.path().join("directory.json"))
                .with_id_attribute("userId")
                .with_group_attribute("groups"),
        )
        .unwrap()
    }

    fn record(value: Value) -> NativeRecord {
        NativeRecord::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let users = directory(&dir)
            .fetch_population(&ListOptions::default())
            .await
            .unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_create_splits_memberships() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);

        directory
            .create_record(record(json!({"userId": "u1", "mail": "a", "groups": ["g2", "g1"]})))
            .await
            .unwrap();

        let raw: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("directory.json")).unwrap())
                .unwrap();
        assert_eq!(raw["users"][0], json!({"userId": "u1", "mail": "a"}));
        assert_eq!(raw["memberships"]["u1"], json!(["g2", "g1"]));
        assert!(!dir.path().join("directory.json.tmp").exists());

        assert_eq!(
            directory.fetch_memberships("u1").await.unwrap(),
            vec!["g2", "g1"]
        );
        assert_eq!(
            directory.fetch_one("u1").await.unwrap().get("groups"),
            Some(&json!(["g2", "g1"]))
        );
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);
        let user = record(json!({"userId": "u1"}));

        directory.create_record(user.clone()).await.unwrap();
        let err = directory.create_record(user).await.unwrap_err();

        assert_eq!(err.error_code(), "OBJECT_EXISTS");
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_user() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);

        let err = directory
            .update_record("ghost", record(json!({"userId": "ghost"})))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "OBJECT_NOT_FOUND");

        let err = directory.delete_record("ghost").await.unwrap_err();
        assert_eq!(err.error_code(), "OBJECT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_cannot_change_id() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);
        directory
            .create_record(record(json!({"userId": "u1"})))
            .await
            .unwrap();

        let err = directory
            .update_record("u1", record(json!({"userId": "u2"})))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[tokio::test]
    async fn test_ignore_rules() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir).with_ignore_rules(IgnoreRules::new(["svc"], ["everyone"]));

        directory
            .create_record(record(json!({"userId": "svc"})))
            .await
            .unwrap();
        directory
            .create_record(record(json!({"userId": "u1", "groups": ["devs", "everyone"]})))
            .await
            .unwrap();

        let users = directory
            .fetch_population(&ListOptions::default())
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].get("groups"), Some(&json!(["devs"])));
        assert_eq!(
            directory.fetch_one("svc").await.unwrap_err().error_code(),
            "OBJECT_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_update_keeps_ignored_memberships() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("directory.json");
        std::fs::write(
            &path,
            json!({
                "users": [{"userId": "u1"}],
                "memberships": {"u1": ["everyone", "devs"]}
            })
            .to_string(),
        )
        .unwrap();
        let directory = directory(&dir).with_ignore_rules(IgnoreRules::new(
            Vec::<String>::new(),
            ["everyone"],
        ));

        directory
            .update_record("u1", record(json!({"userId": "u1", "groups": ["ops"]})))
            .await
            .unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["memberships"]["u1"], json!(["ops", "everyone"]));
        assert_eq!(directory.fetch_memberships("u1").await.unwrap(), vec!["ops"]);
    }

    #[tokio::test]
    async fn test_filtered_population() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);
        for (id, dept) in [("u1", "eng"), ("u2", "sales"), ("u3", "eng")] {
            directory
                .create_record(record(json!({"userId": id, "department": dept})))
                .await
                .unwrap();
        }

        let users = directory
            .fetch_population(&ListOptions::filtered(r#"department eq "eng""#))
            .await
            .unwrap();
        let ids: Vec<_> = users.iter().filter_map(|u| u.get_str("userId")).collect();
        assert_eq!(ids, vec!["u1", "u3"]);

        let err = directory
            .fetch_population(&ListOptions::filtered("department eq"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[tokio::test]
    async fn test_corrupt_store() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("directory.json"), "{not json").unwrap();

        let err = directory(&dir)
            .fetch_population(&ListOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_memberships_read_from_population_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("directory.json");
        let store = |group: &str| {
            json!({
                "users": [{"userId": "u1"}],
                "memberships": {"u1": [group]}
            })
            .to_string()
        };
        std::fs::write(&path, store("g1")).unwrap();
        let directory = directory(&dir);

        directory
            .fetch_population(&ListOptions::default())
            .await
            .unwrap();
        std::fs::write(&path, store("g2")).unwrap();

        assert_eq!(directory.fetch_memberships("u1").await.unwrap(), vec!["g1"]);

        // A write drops the snapshot.
        directory
            .create_record(record(json!({"userId": "u2"})))
            .await
            .unwrap();
        assert_eq!(directory.fetch_memberships("u1").await.unwrap(), vec!["g2"]);
        assert!(directory.fetch_memberships("u9").await.is_err());
    }

    #[tokio::test]
    async fn test_memberships_without_population_read() {
        let dir = TempDir::new().unwrap();
        let directory = directory(&dir);
        directory
            .create_record(record(json!({"userId": "u1", "groups": ["g1"]})))
            .await
            .unwrap();

        assert_eq!(directory.fetch_memberships("u1").await.unwrap(), vec!["g1"]);
    }

    #[test]
    fn test_in_scope() {
        let dir = TempDir::new().unwrap();
        let directory =
            directory(&dir).with_ignore_rules(IgnoreRules::new(["svc"], Vec::<String>::new()));
        let options = ListOptions::filtered("enabled eq true");

        let active = record(json!({"userId": "u1", "enabled": true}));
        let inactive = record(json!({"userId": "u2", "enabled": false}));
        let ignored = record(json!({"userId": "svc", "enabled": true}));

        assert!(directory.in_scope(&active, &options).unwrap());
        assert!(!directory.in_scope(&inactive, &options).unwrap());
        assert!(directory.in_scope(&inactive, &ListOptions::default()).unwrap());
        assert!(!directory.in_scope(&ignored, &ListOptions::default()).unwrap());
        assert!(directory
            .in_scope(&active, &ListOptions::filtered("enabled eq"))
            .is_err());
        assert!(directory
            .in_scope(&record(json!({"enabled": true})), &options)
            .is_err());
    }
}
