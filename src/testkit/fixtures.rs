//! Builders for entities and a store wired to in-memory collaborators.

use std::sync::Arc;

use crate::cache::{CachePolicy, MemoryStorage, PersistentCache, Storage};
use crate::clock::ManualClock;
use crate::config::StoreConfig;
use crate::models::{
    AllData, Connection, EntityId, Link, LinkType, Location, Person, PersonRole, Property,
    PropertyType,
};
use crate::store::Store;

use super::backend::MockBackend;

pub fn property(id: EntityId, zone: &str) -> Property {
    Property {
        id,
        property_type: PropertyType::Apartment,
        zone: zone.to_string(),
        area: format!("{zone} centre"),
        price_min: 100_000.0,
        price_max: 200_000.0,
        size_min: 40.0,
        size_max: 60.0,
        location: Location::new(59.33, 18.06),
        ..Property::default()
    }
}

pub fn person(id: EntityId, name: &str) -> Person {
    Person {
        id,
        name: name.to_string(),
        role: PersonRole::Agent,
        ..Person::default()
    }
}

pub fn connection(id: EntityId, property_id: EntityId, person_id: EntityId) -> Connection {
    Connection {
        id,
        property_id,
        person_id,
        role: "agent".to_string(),
        ..Connection::default()
    }
}

pub fn link(id: EntityId, property_id: EntityId, url: &str) -> Link {
    Link {
        id,
        property_id,
        link: url.to_string(),
        link_type: LinkType::Listing,
        anchor: None,
    }
}

/// Three properties, two persons and the edges between them.
///
/// Property 1 has persons 10 and 11 and two links, property 2 has person 10
/// and one link, property 3 stands alone.
pub fn sample_data() -> AllData {
    AllData {
        properties: vec![
            property(1, "Södermalm"),
            property(2, "Vasastan"),
            property(3, "Kungsholmen"),
        ],
        persons: vec![person(10, "Anna Berg"), person(11, "Erik Lund")],
        connections: vec![connection(100, 1, 10), connection(101, 1, 11), connection(102, 2, 10)],
        links: vec![
            link(200, 1, "https://example.com/listing/1"),
            link(201, 1, "https://example.com/photos/1"),
            link(202, 2, "https://example.com/listing/2"),
        ],
    }
}

/// Store config with a short reconciling delay
pub fn store_config() -> StoreConfig {
    StoreConfig {
        refresh_delay_ms: 10,
        request_timeout_secs: 5,
    }
}

/// A store over a mock backend and in-memory storage, plus handles to both
pub struct Harness {
    pub store: Store,
    pub backend: Arc<MockBackend>,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(backend: MockBackend) -> Self {
        Self::with_storage(backend, Arc::new(MemoryStorage::new()))
    }

    /// Seeded with [`sample_data`]
    pub fn sample() -> Self {
        Self::new(MockBackend::with_data(sample_data()))
    }

    pub fn with_storage(backend: MockBackend, storage: Arc<MemoryStorage>) -> Self {
        Self::with_config(backend, storage, store_config())
    }

    pub fn with_config(backend: MockBackend, storage: Arc<MemoryStorage>, config: StoreConfig) -> Self {
        let backend = Arc::new(backend);
        let clock = Arc::new(ManualClock::default());
        let store = build_store(backend.clone(), storage.clone(), clock.clone(), config);
        Self {
            store,
            backend,
            storage,
            clock,
        }
    }

    /// A second store over the same backend, storage and clock, as after a restart
    pub fn reopen(&self) -> Store {
        build_store(
            self.backend.clone(),
            self.storage.clone(),
            self.clock.clone(),
            store_config(),
        )
    }
}

fn build_store(
    backend: Arc<MockBackend>,
    storage: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
    config: StoreConfig,
) -> Store {
    let storage: Arc<dyn Storage> = storage;
    let cache = PersistentCache::new(storage, clock.clone(), CachePolicy::default());
    Store::new(backend, cache, clock, config)
}

/// Give spawned tasks, such as deferred derivation, a chance to run
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` until it holds, panicking after about a second
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
