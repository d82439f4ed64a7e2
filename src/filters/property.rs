use std::collections::HashMap;

use super::{contains_ci, normalized_query, PropertyFilters, SortBy, DEFAULT_RADIUS_RANGE};
use crate::models::{Connection, EntityId, Person, Property};

/// Apply every configured criterion, then order the survivors.
///
/// Canonical inputs are untouched; the sort is stable so equal keys keep
/// their canonical order.
pub fn filter_properties(
    properties: &[Property],
    persons: &[Person],
    connections: &[Connection],
    filters: &PropertyFilters,
) -> Vec<Property> {
    let search = normalized_query(&filters.search_query).map(|query| SearchIndex {
        query,
        persons: persons.iter().map(|p| (p.id, p)).collect(),
        connections: connections.iter().fold(HashMap::new(), |mut acc, c| {
            acc.entry(c.property_id).or_insert_with(Vec::new).push(c);
            acc
        }),
    });
    let area = normalized_query(&filters.area);

    let mut filtered: Vec<Property> = properties
        .iter()
        .filter(|p| search.as_ref().map_or(true, |index| index.matches(p)))
        .filter(|p| filters.zone.as_ref().map_or(true, |zone| &p.zone == zone))
        .filter(|p| area.as_ref().map_or(true, |area| contains_ci(&p.area, area)))
        .filter(|p| filters.property_types.is_empty() || filters.property_types.contains(&p.property_type))
        .filter(|p| {
            filters.price_ranges.is_empty()
                || filters.price_ranges.iter().any(|r| r.overlaps(p.price_min, p.price_max))
        })
        .filter(|p| {
            filters.size_ranges.is_empty()
                || filters.size_ranges.iter().any(|r| r.overlaps(p.size_min, p.size_max))
        })
        .filter(|p| filters.rating == 0 || p.rating >= filters.rating)
        .filter(|p| filters.tags.is_empty() || p.tags.iter().any(|t| filters.tags.contains(t)))
        .filter(|p| !p.tags.iter().any(|t| filters.excluded_tags.contains(t)))
        .filter(|p| filters.has_location.map_or(true, |wanted| p.location.is_set() == wanted))
        .filter(|p| filters.radius_range == DEFAULT_RADIUS_RANGE || filters.radius_range.contains(p.radius))
        .cloned()
        .collect();

    sort_properties(&mut filtered, filters.sort_by);
    filtered
}

fn sort_properties(properties: &mut [Property], sort_by: SortBy) {
    match sort_by {
        SortBy::PriceAsc => properties.sort_by(|a, b| a.price_min.total_cmp(&b.price_min)),
        SortBy::PriceDesc => properties.sort_by(|a, b| b.price_min.total_cmp(&a.price_min)),
        SortBy::SizeAsc => properties.sort_by(|a, b| a.size_min.total_cmp(&b.size_min)),
        SortBy::SizeDesc => properties.sort_by(|a, b| b.size_min.total_cmp(&a.size_min)),
        SortBy::RatingDesc => properties.sort_by(|a, b| b.rating.cmp(&a.rating)),
        SortBy::Oldest => properties.sort_by_key(|p| p.id),
        SortBy::Newest => properties.sort_by(|a, b| b.id.cmp(&a.id)),
    }
}

/// Lookups for the cross-entity text search
struct SearchIndex<'a> {
    query: String,
    persons: HashMap<EntityId, &'a Person>,
    connections: HashMap<EntityId, Vec<&'a Connection>>,
}

impl SearchIndex<'_> {
    fn matches(&self, property: &Property) -> bool {
        let q = self.query.as_str();
        if [
            property.area.as_str(),
            property.zone.as_str(),
            property.property_type.as_str(),
            property.description.as_str(),
            property.note.as_str(),
        ]
        .iter()
        .any(|field| contains_ci(field, q))
            || property.tags.iter().any(|tag| contains_ci(tag, q))
        {
            return true;
        }

        let Some(edges) = self.connections.get(&property.id) else {
            return false;
        };
        edges.iter().any(|edge| {
            contains_ci(&edge.role, q)
                || contains_ci(&edge.remark, q)
                || self.persons.get(&edge.person_id).is_some_and(|person| {
                    [
                        person.name.as_str(),
                        person.phone.as_str(),
                        person.alternative_contact_details.as_str(),
                        person.role.as_str(),
                        person.about.as_str(),
                    ]
                    .iter()
                    .any(|field| contains_ci(field, q))
                })
        })
    }
}
