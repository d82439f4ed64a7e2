//! Rules for folding detail bundles into canonical collections.

use std::collections::HashSet;

use crate::models::{Entity, EntityId, PersonDetails, Property, PropertyDetails};

/// Replace the row with the same id, or append it
pub(crate) fn upsert<E: Entity>(rows: &mut Vec<E>, entity: E) {
    match rows.iter_mut().find(|row| row.id() == entity.id()) {
        Some(row) => *row = entity,
        None => rows.push(entity),
    }
}

/// Replace the row with the same id in place. Returns false when no row matched.
pub(crate) fn replace<E: Entity>(rows: &mut [E], entity: E) -> bool {
    match rows.iter_mut().find(|row| row.id() == entity.id()) {
        Some(row) => {
            *row = entity;
            true
        }
        None => false,
    }
}

/// Append rows whose id is not present yet. Existing rows win.
pub(crate) fn union<E: Entity>(rows: &mut Vec<E>, incoming: impl IntoIterator<Item = E>) {
    let mut seen: HashSet<EntityId> = rows.iter().map(Entity::id).collect();
    for entity in incoming {
        if seen.insert(entity.id()) {
            rows.push(entity);
        }
    }
}

/// Drop every row `owned` selects, then splice in `incoming` wholesale.
///
/// Rows elsewhere in the collection sharing an incoming id are dropped too,
/// so an edge that moved owner is not duplicated.
pub(crate) fn replace_owned<E: Entity>(rows: &mut Vec<E>, owned: impl Fn(&E) -> bool, incoming: Vec<E>) {
    let mut incoming_ids = HashSet::new();
    let incoming: Vec<E> = incoming
        .into_iter()
        .filter(|entity| incoming_ids.insert(entity.id()))
        .collect();
    rows.retain(|row| !owned(row) && !incoming_ids.contains(&row.id()));
    rows.extend(incoming);
}

impl PropertyDetails {
    pub fn sanitized(mut self) -> Self {
        self.property = self.property.sanitized();
        self.links = self.links.into_iter().map(|l| l.normalized()).collect();
        self
    }
}

impl PersonDetails {
    pub fn sanitized(mut self) -> Self {
        self.properties = self.properties.into_iter().map(Property::sanitized).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Person};

    fn person(id: EntityId, name: &str) -> Person {
        Person {
            id,
            name: name.into(),
            ..Person::default()
        }
    }

    fn edge(id: EntityId, property_id: EntityId, person_id: EntityId) -> Connection {
        Connection {
            id,
            property_id,
            person_id,
            ..Connection::default()
        }
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut rows = vec![person(1, "a"), person(2, "b")];
        upsert(&mut rows, person(1, "z"));
        upsert(&mut rows, person(3, "c"));

        let names: Vec<_> = rows.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["z", "b", "c"]);
    }

    #[test]
    fn replace_never_appends() {
        let mut rows = vec![person(1, "a"), person(2, "b")];

        assert!(replace(&mut rows, person(2, "z")));
        assert!(!replace(&mut rows, person(3, "c")));

        let names: Vec<_> = rows.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);
    }

    #[test]
    fn union_keeps_existing_rows() {
        let mut rows = vec![person(1, "local")];
        union(&mut rows, vec![person(1, "remote"), person(2, "new"), person(2, "dup")]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "local");
        assert_eq!(rows[1].name, "new");
    }

    #[test]
    fn replace_owned_is_full_replacement() {
        let mut rows = vec![edge(1, 10, 100), edge(2, 10, 101), edge(3, 11, 100), edge(4, 12, 102)];
        // edge 4 moved from property 12 to 10
        replace_owned(&mut rows, |c| c.property_id == 10, vec![edge(2, 10, 101), edge(4, 10, 102)]);

        let ids: Vec<_> = rows.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 4]);
    }
}
