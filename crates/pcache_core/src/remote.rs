//! Remote collaborator interfaces consumed by the cache.
//!
//! The HTTP client, retries and timeouts live behind these traits and are
//! not part of this crate.

use crate::error::CacheResult;
use crate::record::{ExtraFields, LocalRecord};
use serde::{Deserialize, Serialize};

/// A record as returned by the bulk page endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinifiedRecord {
    /// Remote identifier.
    pub uid: String,
    /// Full display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fln: Option<String>,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Derived-age flag.
    #[serde(rename = "isAge", default, skip_serializing_if = "Option::is_none")]
    pub is_age: Option<bool>,
    /// External health identifier.
    #[serde(rename = "healthId", default, skip_serializing_if = "Option::is_none")]
    pub health_id: Option<String>,
}

impl MinifiedRecord {
    /// Converts to a cache row stamped with `ingested_at`.
    ///
    /// The minified projection carries no modification time of its own.
    pub fn into_local(self, ingested_at: i64, extras: &ExtraFields) -> LocalRecord {
        let mut record = LocalRecord {
            id: self.uid,
            display_name: self.fln,
            phone: self.mobile,
            handle: self.username,
            updated_at: ingested_at,
            date_of_birth: self.dob,
            gender: self.gender,
            age_derived: self.is_age,
            health_id: self.health_id,
        };
        extras.project(&mut record);
        record
    }
}

/// A full or partial patient record on the remote side.
///
/// Used for remote search results, CRUD responses and CRUD request
/// payloads. Fields the cache does not know about are kept in `other`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientFields {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// First name.
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Middle name.
    #[serde(rename = "mn", default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    /// Last name.
    #[serde(rename = "ln", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Combined display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fln: Option<String>,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Derived-age flag.
    #[serde(rename = "isAge", default, skip_serializing_if = "Option::is_none")]
    pub is_age: Option<bool>,
    /// External health identifier.
    #[serde(rename = "healthId", default, skip_serializing_if = "Option::is_none")]
    pub health_id: Option<String>,
    /// Everything else the service returned.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl PatientFields {
    /// Returns the combined name, rebuilding it from name parts when needed.
    pub fn display_name(&self) -> Option<String> {
        if let Some(fln) = &self.fln {
            return Some(fln.clone());
        }

        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Paginated bulk fetch of minified records.
pub trait RemotePageFetcher: Send + Sync {
    /// Fetches the 1-based `page` of at most `limit` records.
    ///
    /// An empty page, or one shorter than `limit`, signals end of data.
    fn fetch_page(&self, page: u32, limit: u32) -> CacheResult<Vec<MinifiedRecord>>;
}

/// Server-side prefix search.
pub trait RemoteSearch: Send + Sync {
    /// Searches the remote service.
    ///
    /// `fields` optionally restricts which fields the service returns.
    fn query(
        &self,
        prefix: &str,
        limit: usize,
        fields: Option<&[String]>,
    ) -> CacheResult<Vec<PatientFields>>;
}
