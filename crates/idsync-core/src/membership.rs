//! Group membership overlay.

use serde_json::Value;

use crate::mapping::FieldMapping;
use crate::record::{AttributeValue, CanonicalRecord, NativeRecord};

/// Writes a user's group identifiers onto the configured Group Field.
///
/// The overlay is a plain assignment: group identifiers are stored in the
/// order the adapter returned them, duplicates included. Without a Group
/// Field every operation returns its input unchanged.
#[derive(Debug, Clone, Default)]
pub struct MembershipOverlay {
    group_field: Option<String>,
}

impl MembershipOverlay {
    /// Create an overlay for the given Group Field.
    pub fn new(group_field: Option<String>) -> Self {
        Self { group_field }
    }

    /// The configured Group Field.
    pub fn group_field(&self) -> Option<&str> {
        self.group_field.as_deref()
    }

    /// Whether memberships take part in reconciliation.
    pub fn is_enabled(&self) -> bool {
        self.group_field.is_some()
    }

    /// Set the Group Field on `record`, replacing any prior value.
    #[must_use]
    pub fn attach(&self, record: CanonicalRecord, group_ids: Vec<String>) -> CanonicalRecord {
        match &self.group_field {
            Some(field) => record.with(field.as_str(), AttributeValue::List(group_ids)),
            None => record,
        }
    }

    /// Group identifiers carried by a canonical record.
    pub fn groups<'a>(&self, record: &'a CanonicalRecord) -> Option<&'a [String]> {
        let field = self.group_field.as_deref()?;
        record.get(field).and_then(AttributeValue::as_list)
    }

    /// Carry the Group Field of `canonical` over onto an outbound native payload.
    ///
    /// Skipped when the mapping already produces the attribute or the record
    /// has no memberships.
    #[must_use]
    pub fn project(
        &self,
        canonical: &CanonicalRecord,
        mut native: NativeRecord,
        mapping: &FieldMapping,
    ) -> NativeRecord {
        let Some(field) = self.group_field.as_deref() else {
            return native;
        };
        if mapping.maps(field) {
            return native;
        }
        if let Some(groups) = self.groups(canonical) {
            native.insert(
                field,
                Value::Array(groups.iter().cloned().map(Value::String).collect()),
            );
        }
        native
    }
}
