//! Cached record model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::SystemTime;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// The cached projection of a remote patient record.
///
/// Only `id` is required. Extension fields are kept only when the store's
/// [`ExtraFields`] set names them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Remote identifier; primary key within a workspace.
    #[serde(rename = "oid")]
    pub id: String,
    /// Display name.
    #[serde(rename = "fln", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Phone number, matched literally.
    #[serde(rename = "mobile", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Handle / username.
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Epoch milliseconds of the last local write.
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
    /// Date of birth.
    #[serde(rename = "dob", default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Whether the date of birth was derived from an age.
    #[serde(rename = "isAge", default, skip_serializing_if = "Option::is_none")]
    pub age_derived: Option<bool>,
    /// External health identifier.
    #[serde(rename = "healthId", default, skip_serializing_if = "Option::is_none")]
    pub health_id: Option<String>,
}

impl LocalRecord {
    /// Creates a record with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Sets the handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Sets the update timestamp.
    #[must_use]
    pub fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Shallow-merges `update` over this record.
    ///
    /// Fields absent from the update are left alone. The identifier is not
    /// part of [`RecordUpdate`] and can never change here.
    pub fn apply(&mut self, update: &RecordUpdate) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        set(&mut self.display_name, &update.display_name);
        set(&mut self.phone, &update.phone);
        set(&mut self.handle, &update.handle);
        set(&mut self.date_of_birth, &update.date_of_birth);
        set(&mut self.gender, &update.gender);
        set(&mut self.age_derived, &update.age_derived);
        set(&mut self.health_id, &update.health_id);
        if let Some(ts) = update.updated_at {
            self.updated_at = ts;
        }
    }
}

/// A partial update to a cached record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New handle.
    pub handle: Option<String>,
    /// New update timestamp.
    pub updated_at: Option<i64>,
    /// New date of birth.
    pub date_of_birth: Option<String>,
    /// New gender.
    pub gender: Option<String>,
    /// New derived-age flag.
    pub age_derived: Option<bool>,
    /// New health identifier.
    pub health_id: Option<String>,
}

impl RecordUpdate {
    /// Returns true if the update carries no cache fields besides the timestamp.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.phone.is_none()
            && self.handle.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.age_derived.is_none()
            && self.health_id.is_none()
    }
}

/// Optional fields a deployment may choose to cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraField {
    /// Date of birth.
    DateOfBirth,
    /// Gender.
    Gender,
    /// Derived-age flag.
    IsAge,
    /// External health identifier.
    HealthId,
}

/// The configured set of extension fields kept in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtraFields(BTreeSet<ExtraField>);

impl ExtraFields {
    /// Caches no extension fields.
    pub fn none() -> Self {
        Self::default()
    }

    /// Caches every extension field.
    pub fn all() -> Self {
        [
            ExtraField::DateOfBirth,
            ExtraField::Gender,
            ExtraField::IsAge,
            ExtraField::HealthId,
        ]
        .into_iter()
        .collect()
    }

    /// Adds a field to the set.
    #[must_use]
    pub fn with(mut self, field: ExtraField) -> Self {
        self.0.insert(field);
        self
    }

    /// Returns true if `field` is cached.
    pub fn contains(&self, field: ExtraField) -> bool {
        self.0.contains(&field)
    }

    /// Drops every extension field that is not configured.
    pub fn project(&self, record: &mut LocalRecord) {
        if !self.contains(ExtraField::DateOfBirth) {
            record.date_of_birth = None;
        }
        if !self.contains(ExtraField::Gender) {
            record.gender = None;
        }
        if !self.contains(ExtraField::IsAge) {
            record.age_derived = None;
        }
        if !self.contains(ExtraField::HealthId) {
            record.health_id = None;
        }
    }
}

impl FromIterator<ExtraField> for ExtraFields {
    fn from_iter<I: IntoIterator<Item = ExtraField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut record = LocalRecord::new("p1")
            .with_display_name("A")
            .with_phone("1");
        record.apply(&RecordUpdate {
            display_name: Some("B".into()),
            ..RecordUpdate::default()
        });

        assert_eq!(record.id, "p1");
        assert_eq!(record.display_name.as_deref(), Some("B"));
        assert_eq!(record.phone.as_deref(), Some("1"));
    }

    #[test]
    fn projection_drops_unconfigured_extras() {
        let mut record = LocalRecord::new("p1");
        record.gender = Some("F".into());
        record.health_id = Some("91-1234".into());

        ExtraFields::none().with(ExtraField::Gender).project(&mut record);
        assert_eq!(record.gender.as_deref(), Some("F"));
        assert!(record.health_id.is_none());
    }

    #[test]
    fn empty_update() {
        assert!(RecordUpdate::default().is_empty());
        let stamped = RecordUpdate {
            updated_at: Some(5),
            ..RecordUpdate::default()
        };
        assert!(stamped.is_empty());
    }

    #[test]
    fn cbor_uses_compact_field_names() {
        let record = LocalRecord::new("p1").with_phone("98").with_updated_at(7);
        let mut buf = Vec::new();
        ciborium::into_writer(&record, &mut buf).unwrap();
        let value: ciborium::Value = ciborium::from_reader(buf.as_slice()).unwrap();
        let keys: Vec<String> = value
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_text().map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["oid", "mobile", "updatedAt"]);
    }
}
