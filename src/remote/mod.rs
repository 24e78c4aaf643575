//! Ports to the remote collaborators.
//!
//! The document store, the identity provider and the legacy spreadsheet
//! endpoint are implemented outside this crate. Timeouts and transport retries
//! belong to those implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RemoteError;
use crate::models::{
    merge_area_ids, LegacyConstants, MappingType, RawRecord, RecordField, Scope, UnitMapping,
};

/// Subject id issued by the identity provider.
pub type SubjectId = String;

/// The remote directory collection plus the administrators collection.
#[async_trait]
pub trait RemoteDirectoryPort: Send + Sync {
    /// Up to `page_size` documents ordered by key, strictly after `after_key`.
    async fn fetch_page(
        &self,
        after_key: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<RawRecord>, RemoteError>;

    /// Exact email match in the directory collection.
    async fn fetch_by_email(&self, email: &str) -> Result<Option<RawRecord>, RemoteError>;

    /// Exact email match in the administrators collection.
    async fn fetch_by_admin_email(&self, email: &str) -> Result<Option<RawRecord>, RemoteError>;

    /// Create or fully replace a document.
    async fn put_record(&self, record: &RawRecord) -> Result<(), RemoteError>;

    async fn write_field(
        &self,
        key: &str,
        field: RecordField,
        value: serde_json::Value,
    ) -> Result<(), RemoteError>;

    async fn write_pin(&self, key: &str, hash: &str) -> Result<(), RemoteError>;

    async fn delete(&self, key: &str) -> Result<(), RemoteError>;
}

/// Kinds of editable configuration areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    District,
    Station,
    Unit,
}

impl AreaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaKind::District => "district",
            AreaKind::Station => "station",
            AreaKind::Unit => "unit",
        }
    }
}

/// Remote configuration collections.
#[async_trait]
pub trait RemoteConfigPort: Send + Sync {
    async fn fetch_units(&self) -> Result<Vec<RemoteUnit>, RemoteError>;

    async fn fetch_ranks(&self) -> Result<Vec<RemoteRank>, RemoteError>;

    async fn fetch_districts(&self) -> Result<Vec<RemoteDistrict>, RemoteError>;

    async fn fetch_stations(&self) -> Result<Vec<RemoteStation>, RemoteError>;

    /// Create or replace the area document `key`.
    async fn add_area(
        &self,
        kind: AreaKind,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<(), RemoteError>;

    async fn delete_area(&self, kind: AreaKind, key: &str) -> Result<(), RemoteError>;
}

/// Legacy spreadsheet constants endpoint.
#[async_trait]
pub trait LegacyConfigPort: Send + Sync {
    async fn fetch_constants(&self) -> Result<LegacyConstants, RemoteError>;
}

/// Identity provider used to obtain a session for remote reads.
#[async_trait]
pub trait IdentityProviderPort: Send + Sync {
    /// Idempotent; may be called on every login.
    async fn bind_anonymous_session(&self) -> Result<SubjectId, RemoteError>;
}

/// A row of the remote `units` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteUnit {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub mapping_type: Option<String>,
    /// Older admin tooling wrote area lists here
    pub mapped_districts: Vec<String>,
    pub mapped_area_ids: Vec<String>,
    pub is_district_level: bool,
    pub is_hq_level: bool,
    pub scopes: Vec<String>,
    pub applicable_ranks: Vec<String>,
    pub station_keyword: Option<String>,
}

impl RemoteUnit {
    /// Active units with a name become mappings; everything else is dropped.
    pub fn into_mapping(self) -> Option<UnitMapping> {
        if self.is_active == Some(false) {
            return None;
        }
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;

        let mut mapping = UnitMapping::new(
            name,
            MappingType::parse(self.mapping_type.as_deref().unwrap_or("all")),
        );
        mapping.mapped_area_ids = merge_area_ids([
            self.mapped_districts.as_slice(),
            self.mapped_area_ids.as_slice(),
        ]);
        mapping.is_district_level = self.is_district_level;
        mapping.is_hq_level = self.is_hq_level;
        mapping.scopes = self.scopes.iter().filter_map(|s| Scope::parse(s)).collect();
        mapping.applicable_ranks = self
            .applicable_ranks
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        mapping.station_keyword_filter = self
            .station_keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Some(mapping)
    }
}

/// A row of the remote rank master collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteRank {
    pub rank_id: Option<String>,
    pub rank_label: Option<String>,
    pub seniority_order: Option<i64>,
    pub is_active: Option<bool>,
}

/// Seniority assumed for ranks without an explicit order.
pub const DEFAULT_SENIORITY: i64 = 999;

/// A row of the remote `districts` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteDistrict {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// A row of the remote `stations` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteStation {
    pub name: Option<String>,
    pub district: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unit_into_mapping() {
        let unit = RemoteUnit {
            name: Some(" CCB ".into()),
            is_active: Some(true),
            mapping_type: Some("subset".into()),
            mapped_districts: vec!["Mysuru City".into()],
            mapped_area_ids: vec!["Mysuru City".into(), "Bengaluru City".into()],
            scopes: vec!["commissionerate".into(), "galaxy".into()],
            station_keyword: Some("  ".into()),
            ..Default::default()
        };
        let mapping = unit.into_mapping().unwrap();
        assert_eq!(mapping.unit_name, "CCB");
        assert_eq!(mapping.mapping_type, MappingType::Subset);
        assert_eq!(mapping.mapped_area_ids, vec!["Mysuru City", "Bengaluru City"]);
        assert_eq!(mapping.scopes.len(), 1);
        assert!(mapping.station_keyword_filter.is_none());
    }

    #[test]
    fn test_inactive_or_nameless_units_are_dropped() {
        let inactive = RemoteUnit {
            name: Some("Old Unit".into()),
            is_active: Some(false),
            ..Default::default()
        };
        assert!(inactive.into_mapping().is_none());
        assert!(RemoteUnit::default().into_mapping().is_none());
    }
}
