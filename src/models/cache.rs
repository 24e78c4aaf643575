//! Typed configuration cache entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnitMapping;

/// Named slot in the configuration cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Districts,
    Ranks,
    StationsByDistrict,
    UnitMappings,
    Units,
    LegacyConstants,
}

impl CacheKey {
    /// Every key in the namespace.
    pub const ALL: [CacheKey; 6] = [
        CacheKey::Districts,
        CacheKey::Ranks,
        CacheKey::StationsByDistrict,
        CacheKey::UnitMappings,
        CacheKey::Units,
        CacheKey::LegacyConstants,
    ];

    /// Keys whose absence forces a refresh, even on installs that predate them.
    pub const MANDATORY: [CacheKey; 5] = [
        CacheKey::Districts,
        CacheKey::Ranks,
        CacheKey::StationsByDistrict,
        CacheKey::UnitMappings,
        CacheKey::Units,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Districts => "districts",
            CacheKey::Ranks => "ranks",
            CacheKey::StationsByDistrict => "stations-by-district",
            CacheKey::UnitMappings => "unit-mappings",
            CacheKey::Units => "units",
            CacheKey::LegacyConstants => "legacy-constants",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constants published by the legacy spreadsheet endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyConstants {
    pub districts: Vec<String>,
    pub ranks: Vec<String>,
    pub units: Vec<String>,
    pub stations_by_district: BTreeMap<String, Vec<String>>,
}

/// Payload stored under a [`CacheKey`], one variant per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum CachePayload {
    Districts(Vec<String>),
    /// Rank ids in seniority order
    Ranks(Vec<String>),
    StationsByDistrict(BTreeMap<String, Vec<String>>),
    UnitMappings(BTreeMap<String, UnitMapping>),
    /// Active unit names
    Units(Vec<String>),
    LegacyConstants(LegacyConstants),
}

impl CachePayload {
    /// The only key this payload may be stored under.
    pub fn key(&self) -> CacheKey {
        match self {
            CachePayload::Districts(_) => CacheKey::Districts,
            CachePayload::Ranks(_) => CacheKey::Ranks,
            CachePayload::StationsByDistrict(_) => CacheKey::StationsByDistrict,
            CachePayload::UnitMappings(_) => CacheKey::UnitMappings,
            CachePayload::Units(_) => CacheKey::Units,
            CachePayload::LegacyConstants(_) => CacheKey::LegacyConstants,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CachePayload::Districts(v) | CachePayload::Ranks(v) | CachePayload::Units(v) => {
                v.len()
            }
            CachePayload::StationsByDistrict(m) => m.len(),
            CachePayload::UnitMappings(m) => m.len(),
            CachePayload::LegacyConstants(c) => {
                c.districts.len() + c.ranks.len() + c.units.len() + c.stations_by_district.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cached configuration blob with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCacheEntry {
    pub key: CacheKey,
    pub payload: CachePayload,
    pub fetched_at: DateTime<Utc>,
    pub schema_version: i64,
}
