//! Unit routing rules used by the configuration resolver.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a unit's area list should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    #[default]
    All,
    Subset,
    Single,
    /// Older admin tooling wrote this for city units; behaves like `Subset`.
    Commissionerate,
    State,
    None,
    #[serde(other)]
    Unknown,
}

impl MappingType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => MappingType::All,
            "subset" => MappingType::Subset,
            "single" => MappingType::Single,
            "commissionerate" => MappingType::Commissionerate,
            "state" => MappingType::State,
            "none" => MappingType::None,
            _ => MappingType::Unknown,
        }
    }

    /// Whether the mapped area list is authoritative for this type.
    pub fn uses_mapped_areas(&self) -> bool {
        matches!(
            self,
            MappingType::Subset | MappingType::Single | MappingType::Commissionerate
        )
    }
}

/// Geographic granularity a unit's area list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    District,
    Battalion,
    Commissionerate,
    DistrictStations,
    State,
    Hq,
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "district" => Some(Scope::District),
            "battalion" => Some(Scope::Battalion),
            "commissionerate" => Some(Scope::Commissionerate),
            "district_stations" => Some(Scope::DistrictStations),
            "state" => Some(Scope::State),
            "hq" => Some(Scope::Hq),
            _ => None,
        }
    }

    /// Area scopes constrain a unit to a geographic subset.
    pub fn is_area_scope(&self) -> bool {
        matches!(
            self,
            Scope::District | Scope::Battalion | Scope::Commissionerate | Scope::DistrictStations
        )
    }
}

/// Resolved routing rule for one unit name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitMapping {
    pub unit_name: String,
    #[serde(default)]
    pub mapping_type: MappingType,
    /// Legacy and current area lists merged, first occurrence wins
    #[serde(default)]
    pub mapped_area_ids: Vec<String>,
    #[serde(default)]
    pub is_district_level: bool,
    #[serde(default)]
    pub is_hq_level: bool,
    #[serde(default)]
    pub scopes: BTreeSet<Scope>,
    #[serde(default)]
    pub applicable_ranks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_keyword_filter: Option<String>,
}

impl UnitMapping {
    pub fn new(unit_name: impl Into<String>, mapping_type: MappingType) -> Self {
        Self {
            unit_name: unit_name.into(),
            mapping_type,
            mapped_area_ids: Vec::new(),
            is_district_level: false,
            is_hq_level: false,
            scopes: BTreeSet::new(),
            applicable_ranks: Vec::new(),
            station_keyword_filter: None,
        }
    }

    pub fn has_area_scope(&self) -> bool {
        self.scopes.iter().any(Scope::is_area_scope)
    }

    /// HQ units without an area scope resolve to every area, whatever their
    /// stored area list says.
    pub fn is_hq_only(&self) -> bool {
        self.is_hq_level && !self.has_area_scope()
    }

    /// Whether the synthetic HQ entry joins this unit's district list.
    pub fn includes_hq(&self) -> bool {
        self.scopes.contains(&Scope::State) || self.scopes.contains(&Scope::Hq)
    }

    /// Station lists of district-scoped units are already narrowed upstream.
    pub fn bypasses_station_keyword(&self) -> bool {
        self.is_district_level || self.has_area_scope()
    }
}

/// Merge area id lists, dropping blanks and case-insensitive duplicates.
pub fn merge_area_ids<'a>(sources: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for source in sources {
        for id in source {
            let trimmed = id.trim();
            if !trimmed.is_empty() && seen.insert(trimmed.to_lowercase()) {
                merged.push(trimmed.to_string());
            }
        }
    }
    merged
}
