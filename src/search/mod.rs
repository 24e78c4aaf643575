//! Directory search over the local store.
//!
//! Matching is plain substring containment against lowercase text; ranking is
//! a composite sort key. Nothing here touches the network.

use std::sync::Arc;

use crate::db::DirectoryStore;
use crate::errors::StoreError;
use crate::models::{DirectoryRecord, SearchField};

/// District name fragments mapped to their administrative range.
///
/// Order matters: the first matching fragment wins.
const RANGE_TABLE: &[(&str, &str)] = &[
    // Southern Range (Mysuru)
    ("mysuru", "Southern Range"),
    ("kodagu", "Southern Range"),
    ("mandya", "Southern Range"),
    ("hassan", "Southern Range"),
    ("chamarajanagar", "Southern Range"),
    // Western Range (Mangaluru)
    ("dakshina kannada", "Western Range"),
    ("mangaluru", "Western Range"),
    ("udupi", "Western Range"),
    ("chikkamagaluru", "Western Range"),
    ("uttara kannada", "Western Range"),
    // Eastern Range (Davanagere)
    ("chitradurga", "Eastern Range"),
    ("davanagere", "Eastern Range"),
    ("davangere", "Eastern Range"),
    ("haveri", "Eastern Range"),
    ("shivamogga", "Eastern Range"),
    // Central Range (Bengaluru)
    ("bengaluru", "Central Range"),
    ("chikkaballapura", "Central Range"),
    ("kolar", "Central Range"),
    ("ramanagara", "Central Range"),
    ("tumakuru", "Central Range"),
    // Northern Range (Belagavi)
    ("bagalkot", "Northern Range"),
    ("belagavi", "Northern Range"),
    ("belgaum", "Northern Range"),
    ("dharwad", "Northern Range"),
    ("gadag", "Northern Range"),
    ("vijayapura", "Northern Range"),
    ("bijapur", "Northern Range"),
    // North Eastern Range (Kalaburagi)
    ("bidar", "North Eastern Range"),
    ("kalaburagi", "North Eastern Range"),
    ("gulbarga", "North Eastern Range"),
    ("yadgir", "North Eastern Range"),
    // Ballari Range
    ("ballari", "Ballari Range"),
    ("bellary", "Ballari Range"),
    ("koppal", "Ballari Range"),
    ("raichur", "Ballari Range"),
    ("vijayanagara", "Ballari Range"),
];

/// Administrative range of a district, by case-insensitive substring match.
///
/// A name that already mentions "range" is its own range.
pub fn range_for_district(district: &str) -> Option<String> {
    let lower = district.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("range") {
        return Some(district.trim().to_string());
    }
    RANGE_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, range)| range.to_string())
}

/// Build the denormalized search blob for a set of field values.
///
/// Each non-blank value contributes its lowercase form, the same without
/// spaces, without dots, and reduced to ASCII alphanumerics. Values carrying a
/// `+91` prefix also contribute the bare number.
pub fn build_search_blob(fields: &[Option<&str>]) -> String {
    let values: Vec<&str> = fields
        .iter()
        .flatten()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    let mut parts: Vec<String> = Vec::with_capacity(values.len() * 4);
    for value in &values {
        let clean = value.to_lowercase();
        let no_spaces = clean.replace(' ', "");
        let no_dots = clean.replace('.', "");
        let alnum: String = clean
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        parts.extend([clean, no_spaces, no_dots, alnum]);
    }
    for value in &values {
        if value.contains("+91") {
            parts.push(value.replace("+91", "").trim().to_lowercase());
        }
    }

    let mut seen = std::collections::HashSet::new();
    parts.retain(|p| !p.is_empty() && seen.insert(p.clone()));
    parts.join(" ")
}

/// Search over the local directory.
pub struct SearchRanker {
    store: Arc<dyn DirectoryStore>,
    limit: usize,
}

impl SearchRanker {
    pub fn new(store: Arc<dyn DirectoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Load the local directory and run [`rank`] over it.
    pub async fn search(
        &self,
        query: &str,
        field: SearchField,
        context_district: Option<&str>,
    ) -> Result<Vec<DirectoryRecord>, StoreError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records = self.store.get_all().await?;
        let results = rank(records, query, field, context_district, self.limit);
        tracing::debug!(
            "Search {:?} over {:?} returned {} records",
            query,
            field,
            results.len()
        );
        Ok(results)
    }
}

/// Filter and order already-loaded records.
///
/// Single-field filters keep the input order. `All` requires every
/// whitespace-separated token to occur in the search blob and then orders by
/// name match, same district, same range, then name.
pub fn rank(
    records: Vec<DirectoryRecord>,
    query: &str,
    field: SearchField,
    context_district: Option<&str>,
    limit: usize,
) -> Vec<DirectoryRecord> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    if field != SearchField::All {
        return records
            .into_iter()
            .filter(|r| field_matches(r, field, &query))
            .take(limit)
            .collect();
    }

    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut matched: Vec<DirectoryRecord> = records
        .into_iter()
        .filter(|r| {
            let blob = r.search_blob.to_lowercase();
            tokens.iter().all(|t| blob.contains(t))
        })
        .collect();

    let context = context_district
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| (d.to_lowercase(), range_for_district(d)));

    let mut keyed: Vec<(RankKey, DirectoryRecord)> = matched
        .drain(..)
        .map(|r| (RankKey::new(&r, &query, context.as_ref()), r))
        .collect();
    keyed.sort_by(|(a, ra), (b, rb)| a.cmp(b).then_with(|| ra.record_id.cmp(&rb.record_id)));

    keyed.into_iter().take(limit).map(|(_, r)| r).collect()
}

/// Composite sort key; lower sorts first.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    name_tier: u8,
    district_tier: u8,
    range_tier: u8,
    name: String,
}

impl RankKey {
    fn new(record: &DirectoryRecord, query: &str, context: Option<&(String, Option<String>)>) -> Self {
        let name = record.name.to_lowercase();
        let name_tier = if name == query {
            0
        } else if name.starts_with(query) {
            1
        } else {
            2
        };

        let (district_tier, range_tier) = match context {
            Some((ctx_district, ctx_range)) => {
                let district = record.district.as_deref().unwrap_or_default();
                let same_district = district.trim().to_lowercase() == *ctx_district;
                let same_range = ctx_range.is_some() && *ctx_range == range_for_district(district);
                (u8::from(!same_district), u8::from(!same_range))
            }
            None => (1, 1),
        };

        Self {
            name_tier,
            district_tier,
            range_tier,
            name,
        }
    }
}

fn field_matches(record: &DirectoryRecord, field: SearchField, query: &str) -> bool {
    let contains = |value: Option<&str>| {
        value
            .map(|v| v.to_lowercase().contains(query))
            .unwrap_or(false)
    };

    match field {
        SearchField::All => record.search_blob.to_lowercase().contains(query),
        SearchField::Name => contains(Some(&record.name)),
        SearchField::RecordId => contains(Some(&record.record_id)),
        SearchField::Mobile => record.mobile_numbers.iter().any(|m| contains(Some(m))),
        SearchField::Station => contains(record.station.as_deref()),
        SearchField::Rank => contains(record.rank.as_deref()),
        SearchField::MetalNumber => contains(record.metal_number.as_deref()),
        SearchField::BloodGroup => contains(record.blood_group.as_deref()),
        SearchField::District => contains(record.district.as_deref()),
        SearchField::Unit => contains(record.unit.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str, district: Option<&str>) -> DirectoryRecord {
        let mut r = DirectoryRecord::new(id, name, &format!("{}@example.com", id));
        r.district = district.map(String::from);
        r.with_fresh_search_blob()
    }

    fn names(results: &[DirectoryRecord]) -> Vec<&str> {
        results.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_search_blob_variants() {
        let blob = build_search_blob(&[Some("B.M. Ravi"), None, Some("  "), Some("+91 98450")]);
        assert!(blob.contains("b.m. ravi"));
        assert!(blob.contains("b.m.ravi"));
        assert!(blob.contains("bm ravi"));
        assert!(blob.contains("bmravi"));
        assert!(blob.contains("9198450"));
        assert!(blob.split(' ').any(|p| p == "98450"));
    }

    #[test]
    fn test_search_blob_deduplicates() {
        let blob = build_search_blob(&[Some("hc"), Some("HC")]);
        assert_eq!(blob, "hc");
    }

    #[test]
    fn test_range_lookup() {
        assert_eq!(range_for_district("Mysuru City").as_deref(), Some("Southern Range"));
        assert_eq!(range_for_district("bengaluru dist").as_deref(), Some("Central Range"));
        assert_eq!(range_for_district("Raichuru").as_deref(), Some("Ballari Range"));
        assert_eq!(range_for_district("Eastern Range").as_deref(), Some("Eastern Range"));
        assert_eq!(range_for_district("Atlantis"), None);
        assert_eq!(range_for_district(""), None);
    }

    #[test]
    fn test_multi_token_search_is_and() {
        let records = vec![
            person("1", "John Doe", Some("Mysuru City")),
            person("2", "John Smith", Some("Udupi")),
            person("3", "Ravi", Some("Mysuru Dist")),
        ];
        let results = rank(records, "john mysuru", SearchField::All, None, 100);
        assert_eq!(names(&results), vec!["John Doe"]);
    }

    #[test]
    fn test_ranking_tiers() {
        let records = vec![
            person("1", "Arun Prakash", Some("Kolar")),
            person("2", "Prakash", Some("Udupi")),
            person("3", "Prakash Rao", Some("Udupi")),
            person("4", "Om Prakash", Some("Mandya")),
            person("5", "Jai Prakash", Some("Mysuru City")),
            person("6", "Ved Prakash", Some("Bidar")),
        ];
        let results = rank(records, "prakash", SearchField::All, Some("Mysuru City"), 100);
        assert_eq!(
            names(&results),
            vec![
                // exact name, then prefix
                "Prakash",
                "Prakash Rao",
                // same district
                "Jai Prakash",
                // same range
                "Om Prakash",
                // everyone else alphabetically
                "Arun Prakash",
                "Ved Prakash",
            ]
        );
    }

    #[test]
    fn test_single_field_filter_keeps_store_order() {
        let mut a = person("1", "Zed", None);
        a.station = Some("Kaup PS".into());
        let mut b = person("2", "Abe", None);
        b.station = Some("KAUP Traffic PS".into());
        let c = person("3", "Kaup Person", None);

        let results = rank(vec![a, b, c], "kaup", SearchField::Station, None, 100);
        assert_eq!(names(&results), vec!["Zed", "Abe"]);
    }

    #[test]
    fn test_mobile_filter_checks_both_numbers() {
        let mut r = person("1", "Two Phones", None);
        r.mobile_numbers = vec!["111".into(), "9845012345".into()];
        let results = rank(vec![r], "45012", SearchField::Mobile, None, 100);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_results_are_capped() {
        let records: Vec<DirectoryRecord> = (0..150)
            .map(|i| person(&format!("K{:03}", i), &format!("Officer {:03}", i), None))
            .collect();
        let results = rank(records, "officer", SearchField::All, None, 100);
        assert_eq!(results.len(), 100);
        assert_eq!(results[0].name, "Officer 000");
    }

    #[test]
    fn test_blank_query_returns_nothing() {
        let results = rank(vec![person("1", "A", None)], "   ", SearchField::All, None, 100);
        assert!(results.is_empty());
    }
}
