use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::collections::Canonical;
use super::merge::replace;
use super::{Flag, Store, StoreState};
use crate::cache::CacheKey;
use crate::error::{ApiError, StoreResult};
use crate::models::{Connection, Entity, EntityId, Link, Person, Property};

impl Store {
    pub async fn create_property(&self, draft: Property) -> StoreResult<Property> {
        self.create(draft).await
    }

    pub async fn create_person(&self, draft: Person) -> StoreResult<Person> {
        self.create(draft).await
    }

    pub async fn create_connection(&self, draft: Connection) -> StoreResult<Connection> {
        self.create(draft).await
    }

    pub async fn create_link(&self, draft: Link) -> StoreResult<Link> {
        self.create(draft).await
    }

    pub async fn update_property(&self, property: Property) -> StoreResult<Property> {
        self.update(property).await
    }

    pub async fn update_person(&self, person: Person) -> StoreResult<Person> {
        self.update(person).await
    }

    pub async fn update_connection(&self, connection: Connection) -> StoreResult<Connection> {
        self.update(connection).await
    }

    pub async fn update_link(&self, link: Link) -> StoreResult<Link> {
        self.update(link).await
    }

    pub async fn delete_connection(&self, id: EntityId) -> StoreResult<()> {
        self.delete_edge::<Connection>(id).await
    }

    pub async fn delete_link(&self, id: EntityId) -> StoreResult<()> {
        self.delete_edge::<Link>(id).await
    }

    /// Create on the backend, then append the local copy carrying the server id.
    ///
    /// A reconciling refresh follows after the configured delay to pick up
    /// anything the server derived that the local copy lacks.
    async fn create<E: Canonical>(&self, draft: E) -> StoreResult<E> {
        let _creating = self.raise(&[Flag::Creating]);
        let draft = draft.prepare();

        let id = E::api(self.backend())
            .create(&draft)
            .await
            .and_then(|created| created.into_id(E::RESOURCE));
        let id = match id {
            Ok(id) => id,
            Err(err) => return Err(self.write_failed(&format!("create {}", E::RESOURCE), err.into())),
        };

        let entity = draft.with_id(id).prepare();
        {
            let mut state = self.state();
            let mut rows = E::rows(&state).clone();
            rows.push(entity.clone());
            E::store_rows(self, &mut state, rows);
            state.error = None;
        }
        entity.evict_details(&self.inner.cache);
        info!(resource = E::RESOURCE, id, "Created");

        self.schedule_refresh();
        Ok(entity)
    }

    /// Send the full entity; the local copy changes only after the backend acknowledges
    async fn update<E: Canonical>(&self, entity: E) -> StoreResult<E> {
        let _updating = self.raise(&[Flag::Updating]);
        let entity = entity.prepare();

        let acknowledged = E::api(self.backend())
            .update(&entity)
            .await
            .and_then(|ack| ack.into_result(E::RESOURCE, "update"));
        if let Err(err) = acknowledged {
            return Err(self.write_failed(&format!("update {}", E::RESOURCE), err.into()));
        }

        let previous = {
            let mut state = self.state();
            let previous = E::rows(&state).iter().find(|row| row.id() == entity.id()).cloned();
            let mut rows = E::rows(&state).clone();
            if replace(&mut rows, entity.clone()) {
                E::store_rows(self, &mut state, rows);
                entity.refresh_selection(&mut state.selection);
            } else {
                debug!(resource = E::RESOURCE, id = entity.id(), "Updated entity is not loaded locally");
            }
            state.error = None;
            previous
        };
        if let Some(previous) = previous {
            previous.evict_details(&self.inner.cache);
        }
        entity.evict_details(&self.inner.cache);
        info!(resource = E::RESOURCE, id = entity.id(), "Updated");
        Ok(entity)
    }

    /// Delete a connection or link, which own nothing themselves
    async fn delete_edge<E: Canonical>(&self, id: EntityId) -> StoreResult<()> {
        let _deleting = self.raise(&[Flag::Deleting]);

        let acknowledged = E::api(self.backend())
            .delete(id)
            .await
            .and_then(|ack| ack.into_result(E::RESOURCE, "delete"));
        if let Err(err) = acknowledged {
            return Err(self.write_failed(&format!("delete {}", E::RESOURCE), err.into()));
        }

        let removed = {
            let mut state = self.state();
            let removed = E::rows(&state).iter().find(|row| row.id() == id).cloned();
            let rows = E::rows(&state).iter().filter(|row| row.id() != id).cloned().collect();
            E::store_rows(self, &mut state, rows);
            state.error = None;
            removed
        };
        if let Some(removed) = removed {
            removed.evict_details(&self.inner.cache);
        }
        info!(resource = E::RESOURCE, id, "Deleted");
        Ok(())
    }

    /// Delete a property after its connections and links.
    ///
    /// If the property itself cannot be deleted once its dependents are gone,
    /// the dependents are dropped locally too and a reconciling refresh is
    /// scheduled; the error still reaches the caller.
    pub async fn delete_property(&self, id: EntityId) -> StoreResult<()> {
        let _deleting = self.raise(&[Flag::Deleting]);
        let backend = self.backend();

        let connections_gone: Result<(), ApiError> = backend
            .connections()
            .delete_by_property_id(id)
            .await
            .and_then(|ack| ack.into_result(Connection::RESOURCE, "delete_by_property_id"));
        let connections_deleted = connections_gone.is_ok();
        let cascade = match connections_gone {
            Ok(()) => backend
                .links()
                .delete_by_property_id(id)
                .await
                .and_then(|ack| ack.into_result(Link::RESOURCE, "delete_by_property_id")),
            Err(err) => Err(err),
        };
        if let Err(err) = cascade {
            if connections_deleted {
                self.schedule_refresh();
            }
            return Err(self.write_failed("delete property dependents", err.into()));
        }

        let primary = backend
            .properties()
            .delete(id)
            .await
            .and_then(|ack| ack.into_result(Property::RESOURCE, "delete"));

        match primary {
            Ok(()) => {
                self.remove_property_locally(id, true);
                info!(id, "Deleted property with its connections and links");
                Ok(())
            }
            Err(err) => {
                warn!(id, "Property still present after its dependents were deleted, reconciling");
                self.remove_property_locally(id, false);
                self.schedule_refresh();
                Err(self.write_failed("delete property", err.into()))
            }
        }
    }

    /// Delete a person after their connections. Properties are untouched.
    pub async fn delete_person(&self, id: EntityId) -> StoreResult<()> {
        let _deleting = self.raise(&[Flag::Deleting]);
        let backend = self.backend();

        let cascade: Result<(), ApiError> = backend
            .connections()
            .delete_by_person_id(id)
            .await
            .and_then(|ack| ack.into_result(Connection::RESOURCE, "delete_by_person_id"));
        if let Err(err) = cascade {
            return Err(self.write_failed("delete person connections", err.into()));
        }

        let primary = backend
            .persons()
            .delete(id)
            .await
            .and_then(|ack| ack.into_result(Person::RESOURCE, "delete"));

        match primary {
            Ok(()) => {
                self.remove_person_locally(id, true);
                info!(id, "Deleted person with their connections");
                Ok(())
            }
            Err(err) => {
                warn!(id, "Person still present after their connections were deleted, reconciling");
                self.remove_person_locally(id, false);
                self.schedule_refresh();
                Err(self.write_failed("delete person", err.into()))
            }
        }
    }

    /// Drop a property's dependents, and the property itself when `primary`, in one transition
    fn remove_property_locally(&self, id: EntityId, primary: bool) {
        let affected_persons: HashSet<EntityId> = {
            let mut state = self.state();
            let affected = state
                .connections
                .iter()
                .filter(|c| c.property_id == id)
                .map(|c| c.person_id)
                .collect();

            let connections = state.connections.iter().filter(|c| c.property_id != id).cloned().collect();
            let links = state.links.iter().filter(|l| l.property_id != id).cloned().collect();
            Connection::store_rows(self, &mut state, connections);
            Link::store_rows(self, &mut state, links);

            if primary {
                let properties = state.properties.iter().filter(|p| p.id != id).cloned().collect();
                Property::store_rows(self, &mut state, properties);
                clear_property_selection(&mut state, id);
                state.error = None;
            }
            affected
        };

        let cache = &self.inner.cache;
        cache.forget_detail(CacheKey::PropertyDetails, id);
        for person_id in affected_persons {
            cache.forget_detail(CacheKey::PersonDetails, person_id);
        }
    }

    /// Drop a person's connections, and the person itself when `primary`, in one transition
    fn remove_person_locally(&self, id: EntityId, primary: bool) {
        let affected_properties: HashSet<EntityId> = {
            let mut state = self.state();
            let affected = state
                .connections
                .iter()
                .filter(|c| c.person_id == id)
                .map(|c| c.property_id)
                .collect();

            let connections = state.connections.iter().filter(|c| c.person_id != id).cloned().collect();
            Connection::store_rows(self, &mut state, connections);

            if primary {
                let persons = state.persons.iter().filter(|p| p.id != id).cloned().collect();
                Person::store_rows(self, &mut state, persons);
                clear_person_selection(&mut state, id);
                state.error = None;
            }
            affected
        };

        let cache = &self.inner.cache;
        cache.forget_detail(CacheKey::PersonDetails, id);
        for property_id in affected_properties {
            cache.forget_detail(CacheKey::PropertyDetails, property_id);
        }
    }
}

fn clear_property_selection(state: &mut StoreState, id: EntityId) {
    if state.selection.property.as_ref().is_some_and(|p| p.id == id) {
        state.selection.property = None;
        state.selection.property_panel_open = false;
    }
}

fn clear_person_selection(state: &mut StoreState, id: EntityId) {
    if state.selection.person.as_ref().is_some_and(|p| p.id == id) {
        state.selection.person = None;
        state.selection.person_panel_open = false;
    }
}
