//! Filter criteria and the pure pipelines deriving display lists from them.

mod person;
mod property;

pub use person::filter_persons;
pub use property::filter_properties;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{PersonRole, PropertyType};

/// Closed numeric interval `[min, max]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `[lower, upper]` shares at least one point with this range
    pub fn overlaps(&self, lower: f64, upper: f64) -> bool {
        lower <= self.max && upper >= self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Full span of the radius slider; a range equal to it filters nothing
pub const DEFAULT_RADIUS_RANGE: Range = Range::new(0.0, 5000.0);

/// Display order of filtered properties
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    PriceAsc,
    PriceDesc,
    SizeAsc,
    SizeDesc,
    RatingDesc,
    Oldest,
    #[default]
    Newest,
}

impl SortBy {
    pub const ALL: [SortBy; 7] = [
        SortBy::PriceAsc,
        SortBy::PriceDesc,
        SortBy::SizeAsc,
        SortBy::SizeDesc,
        SortBy::RatingDesc,
        SortBy::Oldest,
        SortBy::Newest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::PriceAsc => "price_asc",
            SortBy::PriceDesc => "price_desc",
            SortBy::SizeAsc => "size_asc",
            SortBy::SizeDesc => "size_desc",
            SortBy::RatingDesc => "rating_desc",
            SortBy::Oldest => "oldest",
            SortBy::Newest => "newest",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sort| sort.as_str() == s)
            .ok_or_else(|| format!("unknown sort order '{s}'"))
    }
}

/// Criteria for the property list. Every configured criterion must pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertyFilters {
    /// Case-insensitive, matched across the property, its connections and connected persons
    pub search_query: String,
    /// Exact zone match
    pub zone: Option<String>,
    /// Case-insensitive substring of the area
    pub area: String,
    pub property_types: Vec<PropertyType>,
    pub price_ranges: Vec<Range>,
    pub size_ranges: Vec<Range>,
    /// Minimum rating, 0 disables
    pub rating: u8,
    pub tags: Vec<String>,
    pub excluded_tags: Vec<String>,
    pub has_location: Option<bool>,
    pub radius_range: Range,
    pub sort_by: SortBy,
}

impl Default for PropertyFilters {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            zone: None,
            area: String::new(),
            property_types: Vec::new(),
            price_ranges: Vec::new(),
            size_ranges: Vec::new(),
            rating: 0,
            tags: Vec::new(),
            excluded_tags: Vec::new(),
            has_location: None,
            radius_range: DEFAULT_RADIUS_RANGE,
            sort_by: SortBy::default(),
        }
    }
}

/// Partial update merged into [`PropertyFilters`]; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct PropertyFilterPatch {
    pub search_query: Option<String>,
    pub zone: Option<Option<String>>,
    pub area: Option<String>,
    pub property_types: Option<Vec<PropertyType>>,
    pub price_ranges: Option<Vec<Range>>,
    pub size_ranges: Option<Vec<Range>>,
    pub rating: Option<u8>,
    pub tags: Option<Vec<String>>,
    pub excluded_tags: Option<Vec<String>>,
    pub has_location: Option<Option<bool>>,
    pub radius_range: Option<Range>,
    pub sort_by: Option<SortBy>,
}

impl PropertyFilterPatch {
    pub fn apply(self, filters: &mut PropertyFilters) {
        if let Some(v) = self.search_query {
            filters.search_query = v;
        }
        if let Some(v) = self.zone {
            filters.zone = v;
        }
        if let Some(v) = self.area {
            filters.area = v;
        }
        if let Some(v) = self.property_types {
            filters.property_types = v;
        }
        if let Some(v) = self.price_ranges {
            filters.price_ranges = v;
        }
        if let Some(v) = self.size_ranges {
            filters.size_ranges = v;
        }
        if let Some(v) = self.rating {
            filters.rating = v;
        }
        if let Some(v) = self.tags {
            filters.tags = v;
        }
        if let Some(v) = self.excluded_tags {
            filters.excluded_tags = v;
        }
        if let Some(v) = self.has_location {
            filters.has_location = v;
        }
        if let Some(v) = self.radius_range {
            filters.radius_range = v;
        }
        if let Some(v) = self.sort_by {
            filters.sort_by = v;
        }
    }
}

/// Criteria for the person list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersonFilters {
    pub search_query: String,
    pub roles: Vec<PersonRole>,
    /// `Some(true)` keeps only persons with at least one connection
    pub has_properties: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PersonFilterPatch {
    pub search_query: Option<String>,
    pub roles: Option<Vec<PersonRole>>,
    pub has_properties: Option<Option<bool>>,
}

impl PersonFilterPatch {
    pub fn apply(self, filters: &mut PersonFilters) {
        if let Some(v) = self.search_query {
            filters.search_query = v;
        }
        if let Some(v) = self.roles {
            filters.roles = v;
        }
        if let Some(v) = self.has_properties {
            filters.has_properties = v;
        }
    }
}

/// Lowercased, trimmed query, or `None` when there is nothing to search for
pub(crate) fn normalized_query(query: &str) -> Option<String> {
    let query = query.trim();
    (!query.is_empty()).then(|| query.to_lowercase())
}

pub(crate) fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_touches_given_fields() {
        let mut filters = PropertyFilters {
            area: "Katarina".into(),
            rating: 3,
            has_location: Some(true),
            ..PropertyFilters::default()
        };

        PropertyFilterPatch {
            rating: Some(4),
            has_location: Some(None),
            ..PropertyFilterPatch::default()
        }
        .apply(&mut filters);

        assert_eq!(filters.area, "Katarina");
        assert_eq!(filters.rating, 4);
        assert_eq!(filters.has_location, None);
    }

    #[test]
    fn sort_parses_from_wire_name() {
        assert_eq!("rating_desc".parse::<SortBy>(), Ok(SortBy::RatingDesc));
        assert!("cheapest".parse::<SortBy>().is_err());
    }

    #[test]
    fn saved_filters_missing_fields_use_defaults() {
        let filters: PropertyFilters = serde_json::from_str(r#"{"zone":"Söder"}"#).unwrap();
        assert_eq!(filters.zone.as_deref(), Some("Söder"));
        assert_eq!(filters.radius_range, DEFAULT_RADIUS_RANGE);
        assert_eq!(filters.sort_by, SortBy::Newest);
    }
}
