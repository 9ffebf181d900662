//! Attribute mapping between native and canonical records.
//!
//! A [`FieldMapping`] is a table from canonical attribute name to native
//! attribute name. The [`AttributeMapper`] applies it in either direction.
//! The table is treated as exhaustive over the fields that matter for
//! comparison, so a mapped attribute that is absent from a record is an
//! error rather than an implicit null.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::record::{AttributeValue, CanonicalRecord, NativeRecord};

/// Error during attribute mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A mapped attribute is absent from the record being converted.
    #[error("field '{attribute}' does not exist for record {record}")]
    MissingField { attribute: String, record: String },

    /// A native value has no canonical representation.
    #[error("field '{attribute}' holds an unsupported {kind} value")]
    UnsupportedValue {
        attribute: String,
        kind: &'static str,
    },

    /// Two canonical attributes map to the same native attribute.
    #[error("native attribute '{native}' is mapped from both '{first}' and '{second}'")]
    NonInvertible {
        native: String,
        first: String,
        second: String,
    },
}

impl MappingError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            MappingError::MissingField { .. } => "MISSING_FIELD",
            MappingError::UnsupportedValue { .. } => "UNSUPPORTED_VALUE",
            MappingError::NonInvertible { .. } => "NON_INVERTIBLE_MAPPING",
        }
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Canonical attribute name to native attribute name.
///
/// Loaded once per adapter instance and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    fields: BTreeMap<String, String>,
}

impl FieldMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair using builder pattern.
    #[must_use]
    pub fn with(mut self, canonical: impl Into<String>, native: impl Into<String>) -> Self {
        self.fields.insert(canonical.into(), native.into());
        self
    }

    /// Native attribute name for a canonical attribute.
    pub fn native_name(&self, canonical: &str) -> Option<&str> {
        self.fields.get(canonical).map(String::as_str)
    }

    /// Canonical attribute name for a native attribute.
    pub fn canonical_name(&self, native: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, n)| n.as_str() == native)
            .map(|(c, _)| c.as_str())
    }

    /// Check if a canonical attribute is mapped.
    pub fn maps(&self, canonical: &str) -> bool {
        self.fields.contains_key(canonical)
    }

    /// Iterate over (canonical, native) pairs in canonical-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(c, n)| (c.as_str(), n.as_str()))
    }

    /// Number of mapped attributes.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Verify the mapping can be applied in both directions.
    ///
    /// Canonical names are unique by construction; native names must be too,
    /// otherwise reverse mapping would merge two canonical attributes.
    pub fn validate(&self) -> MappingResult<()> {
        let mut seen: HashMap<&str, &str> = HashMap::with_capacity(self.fields.len());
        for (canonical, native) in &self.fields {
            if let Some(first) = seen.insert(native.as_str(), canonical.as_str()) {
                return Err(MappingError::NonInvertible {
                    native: native.clone(),
                    first: first.to_string(),
                    second: canonical.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<C: Into<String>, N: Into<String>> FromIterator<(C, N)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (C, N)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(c, n)| (c.into(), n.into()))
                .collect(),
        }
    }
}

/// Applies a [`FieldMapping`] to records. Pure; holds no state beyond the table.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    mapping: FieldMapping,
}

impl AttributeMapper {
    /// Create a mapper for the given table.
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    /// The mapping table.
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Convert a native record into canonical form.
    ///
    /// Native attributes that are not mapped are dropped.
    pub fn to_canonical(&self, native: &NativeRecord) -> MappingResult<CanonicalRecord> {
        self.mapping
            .iter()
            .map(|(canonical, native_name)| -> MappingResult<(String, AttributeValue)> {
                let value = native
                    .get(native_name)
                    .ok_or_else(|| MappingError::MissingField {
                        attribute: native_name.to_string(),
                        record: native.to_string(),
                    })?;
                let value = AttributeValue::from_json(value).map_err(|kind| {
                    MappingError::UnsupportedValue {
                        attribute: native_name.to_string(),
                        kind,
                    }
                })?;
                Ok((canonical.to_string(), value))
            })
            .collect()
    }

    /// Convert a canonical record into native form (the exact inverse).
    ///
    /// Canonical attributes that are not mapped are dropped.
    pub fn to_native(&self, canonical: &CanonicalRecord) -> MappingResult<NativeRecord> {
        let mut native = NativeRecord::new();
        for (canonical_name, native_name) in self.mapping.iter() {
            let value = canonical
                .get(canonical_name)
                .ok_or_else(|| MappingError::MissingField {
                    attribute: canonical_name.to_string(),
                    record: canonical.to_string(),
                })?;
            native.insert(native_name, value.to_json());
        }
        Ok(native)
    }

    /// Convert a whole population, failing on the first bad record.
    pub fn to_canonical_all(&self, natives: &[NativeRecord]) -> MappingResult<Vec<CanonicalRecord>> {
        natives.iter().map(|n| self.to_canonical(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> AttributeMapper {
        AttributeMapper::new(
            FieldMapping::new()
                .with("id", "userId")
                .with("email", "mail")
                .with("active", "enabled"),
        )
    }

    fn native(value: serde_json::Value) -> NativeRecord {
        NativeRecord::try_from(value).unwrap()
    }

    #[test]
    fn test_to_canonical_renames_and_drops_unmapped() {
        let record = mapper()
            .to_canonical(&native(json!({
                "userId": "u1",
                "mail": "u1@example.com",
                "enabled": true,
                "lastLogin": "2024-01-01"
            })))
            .unwrap();

        assert_eq!(
            record,
            CanonicalRecord::new()
                .with("id", "u1")
                .with("email", "u1@example.com")
                .with("active", true)
        );
        assert!(!record.contains("lastLogin"));
    }

    #[test]
    fn test_missing_native_field_is_error() {
        let mapper = AttributeMapper::new(FieldMapping::new().with("email", "mail"));
        let err = mapper
            .to_canonical(&native(json!({"name": "X"})))
            .unwrap_err();

        match &err {
            MappingError::MissingField { attribute, record } => {
                assert_eq!(attribute, "mail");
                assert!(record.contains("\"name\":\"X\""));
            }
            other => panic!("Expected MissingField, got {other:?}"),
        }
        assert_eq!(err.error_code(), "MISSING_FIELD");
    }

    #[test]
    fn test_null_is_not_missing() {
        let mapper = AttributeMapper::new(FieldMapping::new().with("email", "mail"));
        let record = mapper.to_canonical(&native(json!({"mail": null}))).unwrap();
        assert_eq!(record.get("email"), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_unsupported_native_value() {
        let mapper = AttributeMapper::new(FieldMapping::new().with("profile", "profile"));
        let err = mapper
            .to_canonical(&native(json!({"profile": {"title": "eng"}})))
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::UnsupportedValue {
                attribute: "profile".to_string(),
                kind: "object",
            }
        );
    }

    #[test]
    fn test_to_native_missing_canonical_field() {
        let err = mapper()
            .to_native(&CanonicalRecord::new().with("id", "u1"))
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingField { ref attribute, .. } if attribute == "active"
        ));
    }

    #[test]
    fn test_round_trip() {
        let records = vec![
            CanonicalRecord::new()
                .with("id", "u1")
                .with("email", "u1@example.com")
                .with("active", true),
            CanonicalRecord::new()
                .with("id", "u2")
                .with("email", AttributeValue::Null)
                .with("active", false),
            CanonicalRecord::new()
                .with("id", "u3")
                .with("email", vec!["a@example.com", "b@example.com"])
                .with("active", 1.5),
        ];

        let mapper = mapper();
        for record in records {
            let native = mapper.to_native(&record).unwrap();
            assert_eq!(mapper.to_canonical(&native).unwrap(), record);
        }
    }

    #[test]
    fn test_to_canonical_all_stops_at_first_error() {
        let natives = vec![
            native(json!({"userId": "u1", "mail": "a", "enabled": true})),
            native(json!({"userId": "u2"})),
        ];
        assert!(mapper().to_canonical_all(&natives).is_err());
        assert_eq!(mapper().to_canonical_all(&natives[..1]).unwrap().len(), 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_native_names() {
        let mapping = FieldMapping::new().with("email", "mail").with("login", "mail");
        assert_eq!(
            mapping.validate(),
            Err(MappingError::NonInvertible {
                native: "mail".to_string(),
                first: "email".to_string(),
                second: "login".to_string(),
            })
        );
        assert!(mapper().mapping().validate().is_ok());
    }

    #[test]
    fn test_mapping_lookup() {
        let mapper = mapper();
        assert_eq!(mapper.mapping().native_name("email"), Some("mail"));
        assert_eq!(mapper.mapping().canonical_name("enabled"), Some("active"));
        assert_eq!(mapper.mapping().native_name("missing"), None);
    }

    #[test]
    fn test_mapping_deserializes_from_yaml() {
        let mapping: FieldMapping = serde_yaml::from_str("id: userId\nemail: mail\n").unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.native_name("id"), Some("userId"));
    }
}
