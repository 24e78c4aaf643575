//! Directory record model and its remote document shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::build_search_blob;

/// A person entry in the local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    /// Stable external identifier, never reassigned
    pub record_id: String,
    pub name: String,
    /// Lowercase-normalized login key
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metal_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    /// Ordered, at most two entries
    #[serde(default)]
    pub mobile_numbers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
    pub is_admin: bool,
    pub is_approved: bool,
    pub is_hidden: bool,
    /// Identity-provider subject bound at login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_subject_id: Option<String>,
    #[serde(default)]
    pub search_blob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DirectoryRecord {
    /// Create a minimal record; the search blob is already populated.
    pub fn new(record_id: impl Into<String>, name: impl Into<String>, email: &str) -> Self {
        let mut record = Self {
            record_id: record_id.into(),
            name: name.into(),
            email: normalize_email(email),
            pin_hash: None,
            rank: None,
            metal_number: None,
            unit: None,
            district: None,
            station: None,
            blood_group: None,
            mobile_numbers: Vec::new(),
            photo_ref: None,
            is_admin: false,
            is_approved: true,
            is_hidden: false,
            auth_subject_id: None,
            search_blob: String::new(),
            created_at: None,
            updated_at: None,
        };
        record.refresh_search_blob();
        record
    }

    /// Recompute the denormalized search blob from the indexed fields.
    pub fn refresh_search_blob(&mut self) {
        let mobile1 = self.mobile_numbers.first().map(String::as_str);
        let mobile2 = self.mobile_numbers.get(1).map(String::as_str);
        self.search_blob = build_search_blob(&[
            Some(self.record_id.as_str()),
            Some(self.name.as_str()),
            mobile1,
            mobile2,
            self.rank.as_deref(),
            self.metal_number.as_deref(),
            self.district.as_deref(),
            self.station.as_deref(),
            self.unit.as_deref(),
            self.blood_group.as_deref(),
        ]);
    }

    /// Builder-style variant of [`refresh_search_blob`](Self::refresh_search_blob).
    pub fn with_fresh_search_blob(mut self) -> Self {
        self.refresh_search_blob();
        self
    }

    /// Convert a remote document into a local record.
    ///
    /// Returns `None` when neither the `recordId` field nor the document id
    /// yields a usable key.
    pub fn from_raw(raw: RawRecord) -> Option<Self> {
        let record_id = raw
            .record_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| raw.doc_id.trim())
            .to_string();
        if record_id.is_empty() {
            return None;
        }

        let mobile_numbers = [raw.mobile1, raw.mobile2]
            .into_iter()
            .flatten()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        let record = Self {
            record_id,
            name: raw.name.unwrap_or_default().trim().to_string(),
            email: normalize_email(raw.email.as_deref().unwrap_or_default()),
            pin_hash: non_blank(raw.pin_hash),
            rank: non_blank(raw.rank),
            metal_number: non_blank(raw.metal_number),
            unit: non_blank(raw.unit),
            district: non_blank(raw.district),
            station: non_blank(raw.station),
            blood_group: non_blank(raw.blood_group),
            mobile_numbers,
            photo_ref: non_blank(raw.photo_url),
            is_admin: raw.is_admin,
            is_approved: raw.is_approved.unwrap_or(true),
            is_hidden: raw.is_hidden,
            auth_subject_id: non_blank(raw.auth_subject_id),
            search_blob: String::new(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        };
        Some(record.with_fresh_search_blob())
    }

    /// Convert back into the remote document shape for a full write.
    pub fn to_raw(&self) -> RawRecord {
        RawRecord {
            doc_id: self.record_id.clone(),
            record_id: Some(self.record_id.clone()),
            name: Some(self.name.clone()),
            email: Some(self.email.clone()),
            pin_hash: self.pin_hash.clone(),
            mobile1: self.mobile_numbers.first().cloned(),
            mobile2: self.mobile_numbers.get(1).cloned(),
            rank: self.rank.clone(),
            metal_number: self.metal_number.clone(),
            unit: self.unit.clone(),
            district: self.district.clone(),
            station: self.station.clone(),
            blood_group: self.blood_group.clone(),
            photo_url: self.photo_ref.clone(),
            is_admin: self.is_admin,
            is_approved: Some(self.is_approved),
            is_hidden: self.is_hidden,
            is_deleted: false,
            auth_subject_id: self.auth_subject_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A directory document as delivered by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRecord {
    /// Document id in the remote collection
    pub doc_id: String,
    pub record_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "pin")]
    pub pin_hash: Option<String>,
    pub mobile1: Option<String>,
    pub mobile2: Option<String>,
    pub rank: Option<String>,
    pub metal_number: Option<String>,
    pub unit: Option<String>,
    pub district: Option<String>,
    pub station: Option<String>,
    pub blood_group: Option<String>,
    pub photo_url: Option<String>,
    pub is_admin: bool,
    pub is_approved: Option<bool>,
    pub is_hidden: bool,
    pub is_deleted: bool,
    pub auth_subject_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawRecord {
    /// Hidden and soft-deleted documents must not live in the local store.
    pub fn is_excluded(&self) -> bool {
        self.is_hidden || self.is_deleted
    }

    /// Key used for local deletion, mirroring [`DirectoryRecord::from_raw`].
    pub fn effective_key(&self) -> Option<String> {
        let key = self
            .record_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.doc_id.trim());
        (!key.is_empty()).then(|| key.to_string())
    }
}

/// Remote field names a client is allowed to write individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Name,
    Email,
    Rank,
    MetalNumber,
    Unit,
    District,
    Station,
    BloodGroup,
    MobileNumbers,
    PhotoRef,
    IsApproved,
    IsHidden,
    AuthSubjectId,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Name => "name",
            RecordField::Email => "email",
            RecordField::Rank => "rank",
            RecordField::MetalNumber => "metalNumber",
            RecordField::Unit => "unit",
            RecordField::District => "district",
            RecordField::Station => "station",
            RecordField::BloodGroup => "bloodGroup",
            RecordField::MobileNumbers => "mobileNumbers",
            RecordField::PhotoRef => "photoUrl",
            RecordField::IsApproved => "isApproved",
            RecordField::IsHidden => "isHidden",
            RecordField::AuthSubjectId => "authSubjectId",
        }
    }
}

/// Partial update restricted to the editable field allow-list.
///
/// `isAdmin`, `pinHash`, `authSubjectId` and `recordId` are intentionally
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub rank: Option<String>,
    pub metal_number: Option<String>,
    pub unit: Option<String>,
    pub district: Option<String>,
    pub station: Option<String>,
    pub blood_group: Option<String>,
    pub mobile_numbers: Option<Vec<String>>,
    pub photo_ref: Option<String>,
    pub is_approved: Option<bool>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Remote writes implied by this patch, in allow-list order. Values are
    /// normalized exactly as [`apply_to`](Self::apply_to) stores them; a
    /// blank optional field is written as null.
    pub fn remote_writes(&self) -> Vec<(RecordField, serde_json::Value)> {
        use serde_json::json;

        let mut writes = Vec::new();
        if let Some(v) = &self.name {
            writes.push((RecordField::Name, json!(v.trim())));
        }
        if let Some(v) = &self.email {
            writes.push((RecordField::Email, json!(normalize_email(v))));
        }
        if let Some(v) = &self.rank {
            writes.push((RecordField::Rank, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.metal_number {
            writes.push((RecordField::MetalNumber, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.unit {
            writes.push((RecordField::Unit, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.district {
            writes.push((RecordField::District, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.station {
            writes.push((RecordField::Station, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.blood_group {
            writes.push((RecordField::BloodGroup, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = &self.mobile_numbers {
            writes.push((RecordField::MobileNumbers, json!(clean_mobile_numbers(v))));
        }
        if let Some(v) = &self.photo_ref {
            writes.push((RecordField::PhotoRef, json!(non_blank(Some(v.clone())))));
        }
        if let Some(v) = self.is_approved {
            writes.push((RecordField::IsApproved, json!(v)));
        }
        writes
    }

    /// Merge into an existing record and rebuild its search blob.
    pub fn apply_to(&self, record: &mut DirectoryRecord) {
        if let Some(v) = &self.name {
            record.name = v.trim().to_string();
        }
        if let Some(v) = &self.email {
            record.email = normalize_email(v);
        }
        if let Some(v) = &self.rank {
            record.rank = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.metal_number {
            record.metal_number = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.unit {
            record.unit = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.district {
            record.district = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.station {
            record.station = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.blood_group {
            record.blood_group = non_blank(Some(v.clone()));
        }
        if let Some(v) = &self.mobile_numbers {
            record.mobile_numbers = clean_mobile_numbers(v);
        }
        if let Some(v) = &self.photo_ref {
            record.photo_ref = non_blank(Some(v.clone()));
        }
        if let Some(v) = self.is_approved {
            record.is_approved = v;
        }
        record.updated_at = Some(Utc::now());
        record.refresh_search_blob();
    }
}

/// Field selector for single-field search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchField {
    #[default]
    All,
    Name,
    RecordId,
    Mobile,
    Station,
    Rank,
    MetalNumber,
    BloodGroup,
    District,
    Unit,
}

/// Trim and lowercase an email for lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed, non-blank numbers; at most two.
fn clean_mobile_numbers(numbers: &[String]) -> Vec<String> {
    numbers
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .take(2)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
