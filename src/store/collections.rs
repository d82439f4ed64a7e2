use super::derive::Pipelines;
use super::{Selection, Store, StoreState};
use crate::api::{Backend, ResourceApi};
use crate::cache::{CacheKey, PersistentCache};
use crate::models::{Connection, Entity, Link, Person, Property};

impl Store {
    /// Replace the canonical properties, persist them and queue re-derivation
    pub fn set_properties(&self, properties: Vec<Property>) {
        let mut state = self.state();
        Property::store_rows(self, &mut state, properties);
    }

    pub fn set_persons(&self, persons: Vec<Person>) {
        let mut state = self.state();
        Person::store_rows(self, &mut state, persons);
    }

    pub fn set_connections(&self, connections: Vec<Connection>) {
        let mut state = self.state();
        Connection::store_rows(self, &mut state, connections);
    }

    pub fn set_links(&self, links: Vec<Link>) {
        let mut state = self.state();
        Link::store_rows(self, &mut state, links);
    }
}

/// Per-kind wiring between a canonical collection, its cache key, its
/// backend accessor and the pipelines that read it.
pub(crate) trait Canonical: Entity {
    const CACHE_KEY: CacheKey;

    /// Pipelines whose output depends on this collection
    const PIPELINES: Pipelines;

    fn api(backend: &dyn Backend) -> &dyn ResourceApi<Self>;

    fn rows(state: &StoreState) -> &Vec<Self>;

    fn rows_mut(state: &mut StoreState) -> &mut Vec<Self>;

    /// Restore local invariants before the entity is sent or stored
    fn prepare(self) -> Self {
        self
    }

    /// Drop cached detail bundles that embed this entity
    fn evict_details(&self, _cache: &PersistentCache) {}

    /// Point the selection at the fresh copy if it shows this entity
    fn refresh_selection(&self, _selection: &mut Selection) {}

    /// Persist, then install, then queue re-derivation
    fn store_rows(store: &Store, state: &mut StoreState, rows: Vec<Self>) {
        let rows: Vec<Self> = rows.into_iter().map(Self::prepare).collect();
        store.inner.cache.set(Self::CACHE_KEY, &rows);
        *Self::rows_mut(state) = rows;
        store.schedule(state, Self::PIPELINES);
    }
}

impl Canonical for Property {
    const CACHE_KEY: CacheKey = CacheKey::Properties;
    const PIPELINES: Pipelines = Pipelines::PROPERTIES;

    fn api(backend: &dyn Backend) -> &dyn ResourceApi<Self> {
        backend.properties()
    }

    fn rows(state: &StoreState) -> &Vec<Self> {
        &state.properties
    }

    fn rows_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.properties
    }

    fn prepare(self) -> Self {
        self.sanitized()
    }

    fn evict_details(&self, cache: &PersistentCache) {
        cache.forget_detail(CacheKey::PropertyDetails, self.id);
    }

    fn refresh_selection(&self, selection: &mut Selection) {
        if selection.property.as_ref().is_some_and(|p| p.id == self.id) {
            selection.property = Some(self.clone());
        }
    }
}

impl Canonical for Person {
    const CACHE_KEY: CacheKey = CacheKey::Persons;
    // The property search reads connected persons
    const PIPELINES: Pipelines = Pipelines::ALL;

    fn api(backend: &dyn Backend) -> &dyn ResourceApi<Self> {
        backend.persons()
    }

    fn rows(state: &StoreState) -> &Vec<Self> {
        &state.persons
    }

    fn rows_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.persons
    }

    fn evict_details(&self, cache: &PersistentCache) {
        cache.forget_detail(CacheKey::PersonDetails, self.id);
    }

    fn refresh_selection(&self, selection: &mut Selection) {
        if selection.person.as_ref().is_some_and(|p| p.id == self.id) {
            selection.person = Some(self.clone());
        }
    }
}

impl Canonical for Connection {
    const CACHE_KEY: CacheKey = CacheKey::Connections;
    const PIPELINES: Pipelines = Pipelines::ALL;

    fn api(backend: &dyn Backend) -> &dyn ResourceApi<Self> {
        backend.connections()
    }

    fn rows(state: &StoreState) -> &Vec<Self> {
        &state.connections
    }

    fn rows_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.connections
    }

    fn evict_details(&self, cache: &PersistentCache) {
        cache.forget_detail(CacheKey::PropertyDetails, self.property_id);
        cache.forget_detail(CacheKey::PersonDetails, self.person_id);
    }
}

impl Canonical for Link {
    const CACHE_KEY: CacheKey = CacheKey::Links;
    const PIPELINES: Pipelines = Pipelines::NONE;

    fn api(backend: &dyn Backend) -> &dyn ResourceApi<Self> {
        backend.links()
    }

    fn rows(state: &StoreState) -> &Vec<Self> {
        &state.links
    }

    fn rows_mut(state: &mut StoreState) -> &mut Vec<Self> {
        &mut state.links
    }

    fn prepare(self) -> Self {
        self.normalized()
    }

    fn evict_details(&self, cache: &PersistentCache) {
        cache.forget_detail(CacheKey::PropertyDetails, self.property_id);
    }
}
