//! Layered configuration resolution.
//!
//! Every read goes remote tier, then legacy tier, then built-in defaults.
//! Reads never fail: a missing or unreadable cache degrades to the next tier.
//! Only [`ConfigResolver::refresh_all`] and the area writes touch the network.

mod defaults;

pub use defaults::*;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::db::ConfigCache;
use crate::errors::{codes, ConfigError};
use crate::models::{CacheKey, CachePayload, LegacyConstants, MappingType, UnitMapping};
use crate::remote::{
    AreaKind, LegacyConfigPort, RemoteConfigPort, RemoteDistrict, RemoteRank, RemoteStation,
    RemoteUnit, DEFAULT_SENIORITY,
};

/// Synthetic district entry for headquarters postings.
pub const HQ_ENTRY: &str = "HQ";

/// Sole district entry for units that are not tied to any district.
pub const NO_DISTRICT_REQUIRED: &str = "No District Required";

/// Independently refreshed slices of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Units,
    Ranks,
    Districts,
    Stations,
    Legacy,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Units => "units",
            Subsystem::Ranks => "ranks",
            Subsystem::Districts => "districts",
            Subsystem::Stations => "stations",
            Subsystem::Legacy => "legacy",
        }
    }

    /// Cache keys written by this subsystem.
    pub fn cache_keys(&self) -> &'static [CacheKey] {
        match self {
            Subsystem::Units => &[CacheKey::UnitMappings, CacheKey::Units],
            Subsystem::Ranks => &[CacheKey::Ranks],
            Subsystem::Districts => &[CacheKey::Districts],
            Subsystem::Stations => &[CacheKey::StationsByDistrict],
            Subsystem::Legacy => &[CacheKey::LegacyConstants],
        }
    }
}

/// One subsystem that could not be refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub subsystem: Subsystem,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl RefreshFailure {
    fn new(subsystem: Subsystem, error: &ConfigError) -> Self {
        Self {
            subsystem,
            code: error.code(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Outcome of [`ConfigResolver::refresh_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// The stored schema version differed and the namespace was wiped
    pub schema_reset: bool,
    /// Entries written per cache key
    pub refreshed: BTreeMap<CacheKey, usize>,
    pub failures: Vec<RefreshFailure>,
}

impl RefreshSummary {
    /// Nothing was stale, so nothing was fetched.
    pub fn is_noop(&self) -> bool {
        !self.schema_reset && self.refreshed.is_empty() && self.failures.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Error code for a refresh that left some subsystems stale.
    pub fn code(&self) -> Option<&'static str> {
        self.is_partial().then_some(codes::PARTIAL_SYNC_FAILURE)
    }
}

/// An editable configuration area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Area {
    District { name: String },
    Station { district: String, name: String },
    Unit { name: String },
}

impl Area {
    pub fn kind(&self) -> AreaKind {
        match self {
            Area::District { .. } => AreaKind::District,
            Area::Station { .. } => AreaKind::Station,
            Area::Unit { .. } => AreaKind::Unit,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Area::District { name } | Area::Station { name, .. } | Area::Unit { name } => name,
        }
    }

    /// Remote document key: the trimmed name, or `District_Station`.
    pub fn key(&self) -> Result<String, ConfigError> {
        let name = self.name().trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} name must not be blank",
                self.kind().as_str()
            )));
        }
        match self {
            Area::Station { district, .. } => {
                let district = district.trim();
                if district.is_empty() {
                    return Err(ConfigError::Validation(
                        "station district must not be blank".to_string(),
                    ));
                }
                Ok(format!("{}_{}", district, name))
            }
            _ => Ok(name.to_string()),
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            Area::District { name } => serde_json::json!({ "name": name.trim() }),
            Area::Station { district, name } => serde_json::json!({
                "name": name.trim(),
                "district": district.trim(),
            }),
            Area::Unit { name } => serde_json::json!({
                "name": name.trim(),
                "isActive": true,
                "mappingType": "all",
            }),
        }
    }

    fn renamed(&self, new_name: &str) -> Self {
        match self {
            Area::District { .. } => Area::District {
                name: new_name.to_string(),
            },
            Area::Station { district, .. } => Area::Station {
                district: district.clone(),
                name: new_name.to_string(),
            },
            Area::Unit { .. } => Area::Unit {
                name: new_name.to_string(),
            },
        }
    }

    /// Cache keys derived from this kind of area.
    fn cache_keys(&self) -> &'static [CacheKey] {
        match self {
            Area::District { .. } => Subsystem::Districts.cache_keys(),
            Area::Station { .. } => Subsystem::Stations.cache_keys(),
            Area::Unit { .. } => Subsystem::Units.cache_keys(),
        }
    }
}

/// Resolves units, districts, stations and ranks through the cache tiers.
pub struct ConfigResolver {
    cache: ConfigCache,
    remote: Arc<dyn RemoteConfigPort>,
    legacy: Option<Arc<dyn LegacyConfigPort>>,
    ttl: Duration,
}

impl ConfigResolver {
    pub fn new(
        cache: ConfigCache,
        remote: Arc<dyn RemoteConfigPort>,
        legacy: Option<Arc<dyn LegacyConfigPort>>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            remote,
            legacy,
            ttl,
        }
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    // ---- Refresh ----

    /// Refresh every stale subsystem.
    ///
    /// A schema version change wipes the whole namespace first. Stale keys are
    /// cleared, then each subsystem is fetched concurrently; a failing
    /// subsystem is recorded in the summary and does not affect the others.
    pub async fn refresh_all(&self) -> Result<RefreshSummary, ConfigError> {
        let mut summary = RefreshSummary {
            schema_reset: self.cache.ensure_schema().await?,
            ..Default::default()
        };

        let mut candidates = vec![
            Subsystem::Units,
            Subsystem::Ranks,
            Subsystem::Districts,
            Subsystem::Stations,
        ];
        if self.legacy.is_some() {
            candidates.push(Subsystem::Legacy);
        }

        let mut stale = HashSet::new();
        for subsystem in candidates {
            if summary.schema_reset || self.is_subsystem_stale(subsystem).await {
                stale.insert(subsystem);
            }
        }
        if stale.is_empty() {
            tracing::debug!("Config cache is fresh, skipping refresh");
            return Ok(summary);
        }

        let stale_keys: Vec<CacheKey> = stale
            .iter()
            .flat_map(|s| s.cache_keys().iter().copied())
            .collect();
        self.cache.invalidate(&stale_keys).await?;

        tracing::info!("Refreshing config subsystems: {:?}", stale);

        let (units, ranks, districts, stations, legacy) = tokio::join!(
            self.refresh_if(&stale, Subsystem::Units, self.refresh_units()),
            self.refresh_if(&stale, Subsystem::Ranks, self.refresh_ranks()),
            self.refresh_if(&stale, Subsystem::Districts, self.refresh_districts()),
            self.refresh_if(&stale, Subsystem::Stations, self.refresh_stations()),
            self.refresh_if(&stale, Subsystem::Legacy, self.refresh_legacy()),
        );

        for (subsystem, outcome) in [
            (Subsystem::Units, units),
            (Subsystem::Ranks, ranks),
            (Subsystem::Districts, districts),
            (Subsystem::Stations, stations),
            (Subsystem::Legacy, legacy),
        ] {
            match outcome {
                None => {}
                Some(Ok(counts)) => summary.refreshed.extend(counts),
                Some(Err(e)) => {
                    tracing::warn!("Refresh of {} failed: {}", subsystem.as_str(), e);
                    summary.failures.push(RefreshFailure::new(subsystem, &e));
                }
            }
        }

        tracing::info!(
            "Config refresh done: {} keys written, {} subsystems failed",
            summary.refreshed.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    async fn is_subsystem_stale(&self, subsystem: Subsystem) -> bool {
        for key in subsystem.cache_keys() {
            if self.cache.is_stale(*key, self.ttl).await {
                return true;
            }
        }
        false
    }

    async fn refresh_if<F>(
        &self,
        stale: &HashSet<Subsystem>,
        subsystem: Subsystem,
        refresh: F,
    ) -> Option<Result<Vec<(CacheKey, usize)>, ConfigError>>
    where
        F: std::future::Future<Output = Result<Vec<(CacheKey, usize)>, ConfigError>>,
    {
        if stale.contains(&subsystem) {
            Some(refresh.await)
        } else {
            None
        }
    }

    async fn refresh_units(&self) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let rows = self.remote.fetch_units().await?;
        let (mappings, names) = build_unit_payloads(rows);
        tracing::debug!("Fetched {} active units", mappings.len());
        self.store(vec![
            CachePayload::UnitMappings(mappings),
            CachePayload::Units(names),
        ])
        .await
    }

    async fn refresh_ranks(&self) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let rows = self.remote.fetch_ranks().await?;
        self.store(vec![CachePayload::Ranks(build_rank_list(rows))])
            .await
    }

    async fn refresh_districts(&self) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let rows = self.remote.fetch_districts().await?;
        self.store(vec![CachePayload::Districts(build_district_list(rows))])
            .await
    }

    async fn refresh_stations(&self) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let rows = self.remote.fetch_stations().await?;
        self.store(vec![CachePayload::StationsByDistrict(build_station_map(
            rows,
        ))])
        .await
    }

    async fn refresh_legacy(&self) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let Some(legacy) = &self.legacy else {
            return Ok(Vec::new());
        };
        let constants = legacy.fetch_constants().await?;
        self.store(vec![CachePayload::LegacyConstants(constants)])
            .await
    }

    async fn store(
        &self,
        payloads: Vec<CachePayload>,
    ) -> Result<Vec<(CacheKey, usize)>, ConfigError> {
        let mut written = Vec::with_capacity(payloads.len());
        for payload in payloads {
            self.cache.put(&payload).await?;
            written.push((payload.key(), payload.len()));
        }
        Ok(written)
    }

    // ---- Reads ----

    /// Districts selectable for a unit, HQ entries first.
    pub async fn districts_for_unit(&self, unit_name: &str) -> Vec<String> {
        let Some(mapping) = self.unit_mapping(unit_name).await else {
            return self.district_list().await;
        };

        if mapping.is_hq_only() {
            return self.district_list().await;
        }

        let mut districts = match mapping.mapping_type {
            t if t.uses_mapped_areas() && !mapping.mapped_area_ids.is_empty() => {
                mapping.mapped_area_ids.clone()
            }
            MappingType::None => vec![NO_DISTRICT_REQUIRED.to_string()],
            _ => self.base_districts().await,
        };

        if mapping.includes_hq() {
            districts.push(HQ_ENTRY.to_string());
        }
        sort_districts(dedup_case_insensitive(districts))
    }

    /// Every district plus the HQ entry, HQ first.
    pub async fn district_list(&self) -> Vec<String> {
        let mut districts = self.base_districts().await;
        districts.push(HQ_ENTRY.to_string());
        sort_districts(dedup_case_insensitive(districts))
    }

    /// Ranks selectable for a unit; all ranks unless the unit restricts them.
    pub async fn ranks_for_unit(&self, unit_name: &str) -> Vec<String> {
        match self.unit_mapping(unit_name).await {
            Some(mapping) if !mapping.applicable_ranks.is_empty() => mapping.applicable_ranks,
            _ => self.rank_list().await,
        }
    }

    /// Narrow candidate stations by the unit's keyword filter, a
    /// comma-separated list where any keyword may match.
    ///
    /// Units with an area scope, or flagged district-level, keep the full
    /// candidate list.
    pub async fn stations_for_unit(&self, unit_name: &str, candidates: &[String]) -> Vec<String> {
        let Some(mapping) = self.unit_mapping(unit_name).await else {
            return candidates.to_vec();
        };
        if mapping.bypasses_station_keyword() {
            return candidates.to_vec();
        }
        let keywords: Vec<String> = mapping
            .station_keyword_filter
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return candidates.to_vec();
        }

        candidates
            .iter()
            .filter(|s| {
                let station = s.to_lowercase();
                keywords.iter().any(|k| station.contains(k))
            })
            .cloned()
            .collect()
    }

    /// Ranks in seniority order.
    pub async fn rank_list(&self) -> Vec<String> {
        if let Some(CachePayload::Ranks(ranks)) = self.payload(CacheKey::Ranks).await {
            if !ranks.is_empty() {
                return ranks;
            }
        }
        if let Some(legacy) = self.legacy_constants().await {
            if !legacy.ranks.is_empty() {
                return legacy.ranks;
            }
        }
        default_ranks()
    }

    pub async fn unit_names(&self) -> Vec<String> {
        if let Some(CachePayload::Units(units)) = self.payload(CacheKey::Units).await {
            if !units.is_empty() {
                return units;
            }
        }
        if let Some(legacy) = self.legacy_constants().await {
            if !legacy.units.is_empty() {
                return legacy.units;
            }
        }
        default_units()
    }

    /// Stations per district. Each district takes the highest tier that has a
    /// non-empty list for it.
    pub async fn stations_by_district(&self) -> BTreeMap<String, Vec<String>> {
        let mut merged = default_stations_by_district();

        if let Some(legacy) = self.legacy_constants().await {
            for (district, stations) in legacy.stations_by_district {
                if !stations.is_empty() {
                    merged.insert(district, stations);
                }
            }
        }

        if let Some(CachePayload::StationsByDistrict(remote)) =
            self.payload(CacheKey::StationsByDistrict).await
        {
            for (district, stations) in remote {
                if !stations.is_empty() {
                    merged.insert(district, stations);
                }
            }
        }

        merged
    }

    pub async fn is_district_level_unit(&self, unit_name: &str) -> bool {
        self.unit_mapping(unit_name)
            .await
            .is_some_and(|m| m.is_district_level)
    }

    /// Age of the oldest mandatory cache entry.
    pub async fn cache_age(&self) -> Option<chrono::Duration> {
        self.cache.age().await
    }

    async fn base_districts(&self) -> Vec<String> {
        if let Some(CachePayload::Districts(districts)) = self.payload(CacheKey::Districts).await {
            if !districts.is_empty() {
                return districts;
            }
        }
        if let Some(legacy) = self.legacy_constants().await {
            if !legacy.districts.is_empty() {
                return legacy.districts;
            }
        }
        default_districts()
    }

    async fn unit_mapping(&self, unit_name: &str) -> Option<UnitMapping> {
        let Some(CachePayload::UnitMappings(mut mappings)) =
            self.payload(CacheKey::UnitMappings).await
        else {
            return None;
        };

        let name = unit_name.trim();
        if let Some(mapping) = mappings.remove(name) {
            return Some(mapping);
        }
        mappings
            .into_values()
            .find(|m| m.unit_name.eq_ignore_ascii_case(name))
    }

    async fn legacy_constants(&self) -> Option<LegacyConstants> {
        match self.payload(CacheKey::LegacyConstants).await {
            Some(CachePayload::LegacyConstants(constants)) => Some(constants),
            _ => None,
        }
    }

    async fn payload(&self, key: CacheKey) -> Option<CachePayload> {
        self.cache.get(key).await.map(|entry| entry.payload)
    }

    // ---- Area writes ----

    /// Create or replace an area remotely, then drop the derived cache keys.
    pub async fn add_area(&self, area: &Area) -> Result<(), ConfigError> {
        let key = area.key()?;
        let result = self
            .remote
            .add_area(area.kind(), &key, area.payload())
            .await;
        self.invalidate_for(area).await;
        result?;

        tracing::info!("Added {} {}", area.kind().as_str(), key);
        Ok(())
    }

    /// Delete an area remotely, then drop the derived cache keys.
    pub async fn remove_area(&self, area: &Area) -> Result<(), ConfigError> {
        let key = area.key()?;
        let result = self.remote.delete_area(area.kind(), &key).await;
        self.invalidate_for(area).await;
        result?;

        tracing::info!("Removed {} {}", area.kind().as_str(), key);
        Ok(())
    }

    /// Rename as add-new then delete-old.
    ///
    /// Not atomic: if deleting the old area fails, both remain and the error
    /// is returned.
    pub async fn rename_area(&self, area: &Area, new_name: &str) -> Result<(), ConfigError> {
        let renamed = area.renamed(new_name);
        if renamed.key()? == area.key()? {
            return Ok(());
        }

        self.add_area(&renamed).await?;
        if let Err(e) = self.remove_area(area).await {
            tracing::warn!(
                "Rename of {} to {} left both entries: {}",
                area.name(),
                new_name,
                e
            );
            return Err(e);
        }
        Ok(())
    }

    async fn invalidate_for(&self, area: &Area) {
        if let Err(e) = self.cache.invalidate(area.cache_keys()).await {
            tracing::warn!("Failed to invalidate config cache: {}", e);
        }
    }
}

/// HQ entries first, then the rest alphabetically, both case-insensitive.
pub fn sort_districts(mut districts: Vec<String>) -> Vec<String> {
    districts.sort_by_cached_key(|d| (!is_hq_entry(d), d.to_lowercase()));
    districts
}

fn is_hq_entry(name: &str) -> bool {
    let name = name.trim();
    name.eq_ignore_ascii_case(HQ_ENTRY) || name.eq_ignore_ascii_case("UNIT_HQ")
}

fn dedup_case_insensitive(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.trim().to_lowercase()))
        .collect()
}

fn build_unit_payloads(rows: Vec<RemoteUnit>) -> (BTreeMap<String, UnitMapping>, Vec<String>) {
    let mappings: BTreeMap<String, UnitMapping> = rows
        .into_iter()
        .filter_map(RemoteUnit::into_mapping)
        .map(|m| (m.unit_name.clone(), m))
        .collect();

    let mut names: Vec<String> = mappings.keys().cloned().collect();
    names.sort_by_key(|n| n.to_lowercase());
    (mappings, names)
}

fn build_rank_list(rows: Vec<RemoteRank>) -> Vec<String> {
    let mut ranks: Vec<(i64, String)> = rows
        .into_iter()
        .filter(|r| r.is_active != Some(false))
        .filter_map(|r| {
            let id = r
                .rank_id
                .or(r.rank_label)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())?;
            Some((r.seniority_order.unwrap_or(DEFAULT_SENIORITY), id))
        })
        .collect();
    // stable: equal seniority keeps remote order
    ranks.sort_by_key(|(order, _)| *order);

    let mut seen = HashSet::new();
    ranks
        .into_iter()
        .map(|(_, id)| id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn build_district_list(rows: Vec<RemoteDistrict>) -> Vec<String> {
    let mut names: Vec<String> = rows
        .into_iter()
        .filter(|d| d.is_active != Some(false))
        .filter_map(|d| d.name)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn build_station_map(rows: Vec<RemoteStation>) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let (Some(name), Some(district)) = (row.name, row.district) else {
            continue;
        };
        let (name, district) = (name.trim(), district.trim());
        if name.is_empty() || district.is_empty() {
            continue;
        }
        map.entry(district.to_string())
            .or_default()
            .push(name.to_string());
    }
    for stations in map.values_mut() {
        stations.sort();
        stations.dedup();
    }
    map
}
