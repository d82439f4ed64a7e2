//! Central state store.
//!
//! Owns the canonical collections, populates them cache-first, runs CRUD
//! mutations against the backend and keeps the filtered views derived.
//! Canonical state sits behind one lock that is never held across an
//! `.await`, so every step between two network calls is atomic to other tasks.

mod collections;
mod derive;
mod loaders;
mod merge;
mod mutations;

pub use derive::DerivationCounts;
pub use loaders::LoadStatus;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::api::Backend;
use crate::cache::{CacheKey, PersistentCache};
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::filters::{PersonFilterPatch, PersonFilters, PropertyFilterPatch, PropertyFilters};
use crate::ledger::Ledger;
use crate::models::{Connection, EntityId, Link, Location, Person, PersonDetails, Property, PropertyDetails};

use derive::Pipelines;

/// Per-resource activity flags shown by the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub properties: bool,
    pub persons: bool,
    pub connections: bool,
    pub links: bool,
    pub creating: bool,
    pub updating: bool,
    pub deleting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flag {
    Properties,
    Persons,
    Connections,
    Links,
    Creating,
    Updating,
    Deleting,
}

impl LoadingState {
    fn slot(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::Properties => &mut self.properties,
            Flag::Persons => &mut self.persons,
            Flag::Connections => &mut self.connections,
            Flag::Links => &mut self.links,
            Flag::Creating => &mut self.creating,
            Flag::Updating => &mut self.updating,
            Flag::Deleting => &mut self.deleting,
        }
    }

    pub(crate) fn is_set(&self, flag: Flag) -> bool {
        match flag {
            Flag::Properties => self.properties,
            Flag::Persons => self.persons,
            Flag::Connections => self.connections,
            Flag::Links => self.links,
            Flag::Creating => self.creating,
            Flag::Updating => self.updating,
            Flag::Deleting => self.deleting,
        }
    }
}

/// Map viewport reported by the map surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: Location,
    pub zoom: f64,
}

/// What the user currently has open. Last write wins, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub property: Option<Property>,
    pub person: Option<Person>,
    pub property_panel_open: bool,
    pub person_panel_open: bool,
    pub viewport: Option<Viewport>,
}

/// Everything the store holds, as seen by readers
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub properties: Vec<Property>,
    pub persons: Vec<Person>,
    pub connections: Vec<Connection>,
    pub links: Vec<Link>,
    pub filtered_properties: Vec<Property>,
    pub filtered_persons: Vec<Person>,
    pub filters: PropertyFilters,
    pub person_filters: PersonFilters,
    pub selection: Selection,
    pub loading: LoadingState,
    /// Last error message, cleared by the next successful operation
    pub error: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub derivations: DerivationCounts,
    scheduled: Pipelines,
}

struct Inner {
    backend: Arc<dyn Backend>,
    cache: PersistentCache,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    state: Mutex<StoreState>,
    collections: Ledger<()>,
    property_details: Ledger<PropertyDetails>,
    person_details: Ledger<PersonDetails>,
}

/// Cheaply clonable handle to the application state
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: PersistentCache,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        let timeout = config.request_timeout();
        Self {
            inner: Arc::new(Inner {
                backend,
                cache,
                clock,
                config,
                state: Mutex::new(StoreState::default()),
                collections: Ledger::new(timeout),
                property_details: Ledger::new(timeout),
                person_details: Ledger::new(timeout),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock()
    }

    fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.inner.cache
    }

    /// Copy of the full state
    pub fn snapshot(&self) -> StoreState {
        self.state().clone()
    }

    pub fn properties(&self) -> Vec<Property> {
        self.state().properties.clone()
    }

    pub fn persons(&self) -> Vec<Person> {
        self.state().persons.clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.state().connections.clone()
    }

    pub fn links(&self) -> Vec<Link> {
        self.state().links.clone()
    }

    pub fn filtered_properties(&self) -> Vec<Property> {
        self.state().filtered_properties.clone()
    }

    pub fn filtered_persons(&self) -> Vec<Person> {
        self.state().filtered_persons.clone()
    }

    pub fn filters(&self) -> PropertyFilters {
        self.state().filters.clone()
    }

    pub fn person_filters(&self) -> PersonFilters {
        self.state().person_filters.clone()
    }

    pub fn selection(&self) -> Selection {
        self.state().selection.clone()
    }

    pub fn loading(&self) -> LoadingState {
        self.state().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync
    }

    pub fn derivation_counts(&self) -> DerivationCounts {
        self.state().derivations
    }

    pub fn property(&self, id: EntityId) -> Option<Property> {
        self.state().properties.iter().find(|p| p.id == id).cloned()
    }

    pub fn person(&self, id: EntityId) -> Option<Person> {
        self.state().persons.iter().find(|p| p.id == id).cloned()
    }

    /// Persons connected to a property, in canonical person order
    pub fn persons_for_property(&self, property_id: EntityId) -> Vec<Person> {
        let state = self.state();
        state
            .persons
            .iter()
            .filter(|person| {
                state
                    .connections
                    .iter()
                    .any(|c| c.property_id == property_id && c.person_id == person.id)
            })
            .cloned()
            .collect()
    }

    /// Properties a person is connected to, in canonical property order
    pub fn properties_for_person(&self, person_id: EntityId) -> Vec<Property> {
        let state = self.state();
        state
            .properties
            .iter()
            .filter(|property| {
                state
                    .connections
                    .iter()
                    .any(|c| c.person_id == person_id && c.property_id == property.id)
            })
            .cloned()
            .collect()
    }

    pub fn connections_for_property(&self, property_id: EntityId) -> Vec<Connection> {
        self.state()
            .connections
            .iter()
            .filter(|c| c.property_id == property_id)
            .cloned()
            .collect()
    }

    pub fn links_for_property(&self, property_id: EntityId) -> Vec<Link> {
        self.state()
            .links
            .iter()
            .filter(|l| l.property_id == property_id)
            .cloned()
            .collect()
    }

    /// Select a property (or clear with `None`) and open its panel
    pub fn select_property(&self, id: Option<EntityId>) {
        let mut state = self.state();
        let property = id.and_then(|id| state.properties.iter().find(|p| p.id == id).cloned());
        state.selection.property_panel_open = property.is_some();
        state.selection.property = property;
    }

    /// Select a person (or clear with `None`) and open its panel
    pub fn select_person(&self, id: Option<EntityId>) {
        let mut state = self.state();
        let person = id.and_then(|id| state.persons.iter().find(|p| p.id == id).cloned());
        state.selection.person_panel_open = person.is_some();
        state.selection.person = person;
    }

    pub fn close_panels(&self) {
        let mut state = self.state();
        state.selection.property_panel_open = false;
        state.selection.person_panel_open = false;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state().selection.viewport = Some(viewport);
    }

    /// Merge partial property criteria, persist them and re-derive
    pub fn update_filters(&self, patch: PropertyFilterPatch) {
        let mut state = self.state();
        let mut filters = state.filters.clone();
        patch.apply(&mut filters);
        self.inner.cache.set(CacheKey::Filters, &filters);
        state.filters = filters;
        self.schedule(&mut state, Pipelines::PROPERTIES);
    }

    pub fn reset_filters(&self) {
        let mut state = self.state();
        let filters = PropertyFilters::default();
        self.inner.cache.set(CacheKey::Filters, &filters);
        state.filters = filters;
        self.schedule(&mut state, Pipelines::PROPERTIES);
    }

    /// Merge partial person criteria, persist them and re-derive
    pub fn update_person_filters(&self, patch: PersonFilterPatch) {
        let mut state = self.state();
        let mut filters = state.person_filters.clone();
        patch.apply(&mut filters);
        self.inner.cache.set(CacheKey::PersonFilters, &filters);
        state.person_filters = filters;
        self.schedule(&mut state, Pipelines::PERSONS);
    }

    pub fn reset_person_filters(&self) {
        let mut state = self.state();
        let filters = PersonFilters::default();
        self.inner.cache.set(CacheKey::PersonFilters, &filters);
        state.person_filters = filters;
        self.schedule(&mut state, Pipelines::PERSONS);
    }

    fn record_error(&self, message: String) {
        debug!(error = %message, "Recording store error");
        self.state().error = Some(message);
    }

    /// Log a failed write action, expose it in the error slot and hand it back
    fn write_failed(&self, action: &str, err: StoreError) -> StoreError {
        error!(action, error = %err, "Write failed");
        self.record_error(format!("Failed to {action}: {err}"));
        err
    }

    /// Set `flags` until the returned guard drops
    fn raise(&self, flags: &[Flag]) -> FlagGuard {
        let mut state = self.state();
        for flag in flags {
            *state.loading.slot(*flag) = true;
        }
        FlagGuard {
            store: self.clone(),
            flags: flags.to_vec(),
        }
    }
}

/// Resets loading flags on completion, failure or cancellation
struct FlagGuard {
    store: Store,
    flags: Vec<Flag>,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        let mut state = self.store.state();
        for flag in &self.flags {
            *state.loading.slot(*flag) = false;
        }
    }
}
