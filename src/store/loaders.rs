use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::collections::Canonical;
use super::derive::{derive, Pipelines};
use super::merge::{replace_owned, union, upsert};
use super::{Flag, Store, StoreState};
use crate::cache::CacheKey;
use crate::error::{ApiError, StoreError, StoreResult};
use crate::filters::{PersonFilters, PropertyFilters};
use crate::ledger::LedgerKey;
use crate::models::{Connection, Entity, EntityId, Link, Person, PersonDetails, Property, PropertyDetails};

/// Outcome of a read-path load. Failures are reported through the error slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Collection already resident, nothing fetched
    Skipped,
    Loaded,
    Failed,
}

impl Store {
    /// Populate canonical state from the persistent cache without touching the network
    pub fn load_from_cache(&self) {
        let cache = &self.inner.cache;
        let properties = cache.get::<Vec<Property>>(CacheKey::Properties);
        let persons = cache.get::<Vec<Person>>(CacheKey::Persons);
        let connections = cache.get::<Vec<Connection>>(CacheKey::Connections);
        let links = cache.get::<Vec<Link>>(CacheKey::Links);
        let filters = cache.get::<PropertyFilters>(CacheKey::Filters);
        let person_filters = cache.get::<PersonFilters>(CacheKey::PersonFilters);
        let last_sync = cache.get::<DateTime<Utc>>(CacheKey::LastSync);

        let mut state = self.state();
        if let Some(properties) = properties {
            state.properties = properties.into_iter().map(Property::sanitized).collect();
        }
        if let Some(persons) = persons {
            state.persons = persons;
        }
        if let Some(connections) = connections {
            state.connections = connections;
        }
        if let Some(links) = links {
            state.links = links;
        }
        if let Some(filters) = filters {
            state.filters = filters;
        }
        if let Some(person_filters) = person_filters {
            state.person_filters = person_filters;
        }
        if last_sync.is_some() {
            state.last_sync = last_sync;
        }
        derive(&mut state, Pipelines::ALL);

        info!(
            properties = state.properties.len(),
            persons = state.persons.len(),
            connections = state.connections.len(),
            links = state.links.len(),
            "Loaded state from cache"
        );
    }

    /// Cache first, then a full fetch
    pub async fn bootstrap(&self) -> LoadStatus {
        self.load_from_cache();
        self.load_all_data().await
    }

    /// Cache first, then a full fetch running in the background
    pub fn start(&self) -> JoinHandle<LoadStatus> {
        self.load_from_cache();
        let store = self.clone();
        tokio::spawn(async move { store.load_all_data().await })
    }

    /// Fetch every collection in one round trip and overwrite canonical state
    pub async fn load_all_data(&self) -> LoadStatus {
        let store = self.clone();
        let work = async move {
            let _loading = store.raise(&[Flag::Properties, Flag::Persons, Flag::Connections, Flag::Links]);
            let data = store.backend().extract_all().await?;
            store.apply_all_data(data);
            Ok::<(), StoreError>(())
        };
        let outcome = self.inner.collections.begin(LedgerKey::AllData, work).await;
        self.settle("all data", outcome)
    }

    /// Forget every in-flight registration, then fetch everything again
    pub async fn refresh(&self) -> LoadStatus {
        self.inner.collections.clear();
        self.inner.property_details.clear();
        self.inner.person_details.clear();
        self.load_all_data().await
    }

    pub(super) fn schedule_refresh(&self) {
        let store = self.clone();
        let delay = self.inner.config.refresh_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Running reconciling refresh");
            store.refresh().await
        });
    }

    pub async fn load_properties(&self) -> LoadStatus {
        self.load_collection::<Property>(LedgerKey::Properties, Flag::Properties).await
    }

    pub async fn load_persons(&self) -> LoadStatus {
        self.load_collection::<Person>(LedgerKey::Persons, Flag::Persons).await
    }

    pub async fn load_connections(&self) -> LoadStatus {
        self.load_collection::<Connection>(LedgerKey::Connections, Flag::Connections).await
    }

    pub async fn load_links(&self) -> LoadStatus {
        self.load_collection::<Link>(LedgerKey::Links, Flag::Links).await
    }

    /// Load-once: skip when resident and idle, otherwise fetch or join the fetch in flight
    async fn load_collection<E: Canonical>(&self, key: LedgerKey, flag: Flag) -> LoadStatus {
        {
            let state = self.state();
            if !E::rows(&state).is_empty() && !state.loading.is_set(flag) {
                debug!(key = %key, "Already loaded, skipping fetch");
                return LoadStatus::Skipped;
            }
        }

        let store = self.clone();
        let work = async move {
            let _loading = store.raise(&[flag]);
            let rows = E::api(store.backend()).get_all().await?;
            info!(resource = E::RESOURCE, count = rows.len(), "Loaded collection");
            store.apply_rows::<E>(rows);
            Ok::<(), StoreError>(())
        };
        let outcome = self.inner.collections.begin(key, work).await;
        self.settle(E::RESOURCE, outcome)
    }

    /// Detail bundle for a property: join in-flight fetch, else cache, else network
    pub async fn load_property_details(&self, id: EntityId) -> Option<PropertyDetails> {
        let key = LedgerKey::PropertyDetails(id);
        if !self.inner.property_details.is_pending(&key) {
            if let Some(details) = self.inner.cache.property_details(id) {
                debug!(id, "Property details served from cache");
                let details = details.sanitized();
                self.apply_property_details(&details);
                return Some(details);
            }
        }

        let store = self.clone();
        let work = async move {
            let details = store
                .backend()
                .properties()
                .get_by_id(id)
                .await
                .map_err(missing(Property::RESOURCE, id))?
                .sanitized();
            store.inner.cache.set_property_details(id, &details);
            store.apply_property_details(&details);
            Ok::<_, StoreError>(details)
        };
        let outcome = self.inner.property_details.begin(key, work).await;
        self.settle_detail("load property details", outcome)
    }

    /// Detail bundle for a person: join in-flight fetch, else cache, else network
    pub async fn load_person_details(&self, id: EntityId) -> Option<PersonDetails> {
        let key = LedgerKey::PersonDetails(id);
        if !self.inner.person_details.is_pending(&key) {
            if let Some(details) = self.inner.cache.person_details(id) {
                debug!(id, "Person details served from cache");
                let details = details.sanitized();
                self.apply_person_details(&details);
                return Some(details);
            }
        }

        let store = self.clone();
        let work = async move {
            let details = store
                .backend()
                .persons()
                .get_by_id(id)
                .await
                .map_err(missing(Person::RESOURCE, id))?
                .sanitized();
            store.inner.cache.set_person_details(id, &details);
            store.apply_person_details(&details);
            Ok::<_, StoreError>(details)
        };
        let outcome = self.inner.person_details.begin(key, work).await;
        self.settle_detail("load person details", outcome)
    }

    fn apply_all_data(&self, data: crate::models::AllData) {
        let now = self.inner.clock.now();
        let mut state = self.state();
        Property::store_rows(self, &mut state, data.properties);
        Person::store_rows(self, &mut state, data.persons);
        Connection::store_rows(self, &mut state, data.connections);
        Link::store_rows(self, &mut state, data.links);
        self.inner.cache.set(CacheKey::LastSync, &now);
        state.last_sync = Some(now);
        state.error = None;
        info!(
            properties = state.properties.len(),
            persons = state.persons.len(),
            connections = state.connections.len(),
            links = state.links.len(),
            "Synchronized all collections"
        );
    }

    fn apply_rows<E: Canonical>(&self, rows: Vec<E>) {
        let mut state = self.state();
        E::store_rows(self, &mut state, rows);
        state.error = None;
    }

    /// Primary replaces by id, persons union, owned edges replaced wholesale
    fn apply_property_details(&self, details: &PropertyDetails) {
        let id = details.property.id;
        let mut state = self.state();

        let mut properties = state.properties.clone();
        upsert(&mut properties, details.property.clone());
        let mut persons = state.persons.clone();
        union(&mut persons, details.persons.iter().cloned());
        let mut connections = state.connections.clone();
        replace_owned(&mut connections, |c| c.property_id == id, details.connections.clone());
        let mut links = state.links.clone();
        replace_owned(&mut links, |l| l.property_id == id, details.links.clone());

        store_all(self, &mut state, properties, persons, connections, links);
        state.error = None;
    }

    /// Primary replaces by id, properties union, owned edges replaced wholesale
    fn apply_person_details(&self, details: &PersonDetails) {
        let id = details.person.id;
        let mut state = self.state();

        let mut persons = state.persons.clone();
        upsert(&mut persons, details.person.clone());
        let mut properties = state.properties.clone();
        union(&mut properties, details.properties.iter().cloned());
        let mut connections = state.connections.clone();
        replace_owned(&mut connections, |c| c.person_id == id, details.connections.clone());

        Property::store_rows(self, &mut state, properties);
        Person::store_rows(self, &mut state, persons);
        Connection::store_rows(self, &mut state, connections);
        state.error = None;
    }

    fn settle(&self, what: &str, outcome: StoreResult<()>) -> LoadStatus {
        match outcome {
            Ok(()) => LoadStatus::Loaded,
            Err(err) => {
                warn!(what, error = %err, "Load failed, keeping current state");
                self.record_error(format!("Failed to load {what}: {err}"));
                LoadStatus::Failed
            }
        }
    }

    fn settle_detail<T>(&self, what: &str, outcome: StoreResult<T>) -> Option<T> {
        match outcome {
            Ok(details) => Some(details),
            Err(err) => {
                warn!(what, error = %err, "Detail load failed");
                self.record_error(format!("Failed to {what}: {err}"));
                None
            }
        }
    }
}

/// A 404 from a detail endpoint means the entity is gone
fn missing(resource: &'static str, id: EntityId) -> impl FnOnce(ApiError) -> StoreError {
    move |err| match err {
        ApiError::Status { status: 404, .. } => StoreError::NotFound { resource, id },
        other => other.into(),
    }
}

fn store_all(
    store: &Store,
    state: &mut StoreState,
    properties: Vec<Property>,
    persons: Vec<Person>,
    connections: Vec<Connection>,
    links: Vec<Link>,
) {
    Property::store_rows(store, state, properties);
    Person::store_rows(store, state, persons);
    Connection::store_rows(store, state, connections);
    Link::store_rows(store, state, links);
}
