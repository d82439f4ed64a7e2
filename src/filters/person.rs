use std::collections::HashSet;

use super::{contains_ci, normalized_query, PersonFilters};
use crate::models::{Connection, EntityId, Person};

/// Persons passing every configured criterion, in canonical order
pub fn filter_persons(persons: &[Person], connections: &[Connection], filters: &PersonFilters) -> Vec<Person> {
    let query = normalized_query(&filters.search_query);
    let connected: Option<HashSet<EntityId>> = filters
        .has_properties
        .map(|_| connections.iter().map(|c| c.person_id).collect());

    persons
        .iter()
        .filter(|person| {
            query.as_ref().map_or(true, |q| {
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
        .filter(|person| filters.roles.is_empty() || filters.roles.contains(&person.role))
        .filter(|person| match (filters.has_properties, &connected) {
            (Some(wanted), Some(connected)) => connected.contains(&person.id) == wanted,
            _ => true,
        })
        .cloned()
        .collect()
}
