//! In-memory [`Backend`] with call counting and fault injection.
//!
//! Every request is recorded under an operation name such as
//! `properties.get_all`, `connections.delete_by_property_id` or
//! `extract_all`, which is also the name used to inject latency, failures
//! or hangs. Bulk deletes are explicit: deleting a property never removes
//! its connections or links on its own.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::{Ack, Backend, Created, ResourceApi};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AllData, Connection, Entity, EntityId, Link, Person, PersonDetails, Property, PropertyDetails,
};

#[derive(Default)]
struct MockDb {
    tables: Mutex<AllData>,
    next_id: AtomicI64,
    calls: Mutex<HashMap<String, usize>>,
    latency: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    rejecting: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
}

impl MockDb {
    /// Record the call, apply latency, then hang or fail if told to
    async fn enter(&self, op: &str) -> ApiResult<()> {
        *self.calls.lock().entry(op.to_string()).or_default() += 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.hanging.lock().contains(op) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(op) {
            return Err(ApiError::Status {
                status: 500,
                message: format!("injected failure in {op}"),
            });
        }
        Ok(())
    }

    fn rejects(&self, op: &str) -> bool {
        self.rejecting.lock().contains(op)
    }

    fn allocate_id(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Per-kind table access for the mock
pub trait MockRow: Entity {
    fn table(data: &AllData) -> &Vec<Self>;

    fn table_mut(data: &mut AllData) -> &mut Vec<Self>;

    fn detail(data: &AllData, id: EntityId) -> Option<Self::Detail>;

    /// Owning property, for kinds that support the bulk delete by property
    fn property_owner(&self) -> Option<EntityId> {
        None
    }

    /// Owning person, for kinds that support the bulk delete by person
    fn person_owner(&self) -> Option<EntityId> {
        None
    }

    const BY_PROPERTY: bool = false;
    const BY_PERSON: bool = false;
}

impl MockRow for Property {
    fn table(data: &AllData) -> &Vec<Self> {
        &data.properties
    }

    fn table_mut(data: &mut AllData) -> &mut Vec<Self> {
        &mut data.properties
    }

    fn detail(data: &AllData, id: EntityId) -> Option<PropertyDetails> {
        let property = data.properties.iter().find(|p| p.id == id)?.clone();
        let connections: Vec<Connection> = data
            .connections
            .iter()
            .filter(|c| c.property_id == id)
            .cloned()
            .collect();
        let persons = data
            .persons
            .iter()
            .filter(|p| connections.iter().any(|c| c.person_id == p.id))
            .cloned()
            .collect();
        let links = data.links.iter().filter(|l| l.property_id == id).cloned().collect();
        Some(PropertyDetails {
            property,
            persons,
            connections,
            links,
        })
    }
}

impl MockRow for Person {
    fn table(data: &AllData) -> &Vec<Self> {
        &data.persons
    }

    fn table_mut(data: &mut AllData) -> &mut Vec<Self> {
        &mut data.persons
    }

    fn detail(data: &AllData, id: EntityId) -> Option<PersonDetails> {
        let person = data.persons.iter().find(|p| p.id == id)?.clone();
        let connections: Vec<Connection> = data
            .connections
            .iter()
            .filter(|c| c.person_id == id)
            .cloned()
            .collect();
        let properties = data
            .properties
            .iter()
            .filter(|p| connections.iter().any(|c| c.property_id == p.id))
            .cloned()
            .collect();
        Some(PersonDetails {
            person,
            properties,
            connections,
        })
    }
}

impl MockRow for Connection {
    const BY_PROPERTY: bool = true;
    const BY_PERSON: bool = true;

    fn table(data: &AllData) -> &Vec<Self> {
        &data.connections
    }

    fn table_mut(data: &mut AllData) -> &mut Vec<Self> {
        &mut data.connections
    }

    fn detail(data: &AllData, id: EntityId) -> Option<Connection> {
        data.connections.iter().find(|c| c.id == id).cloned()
    }

    fn property_owner(&self) -> Option<EntityId> {
        Some(self.property_id)
    }

    fn person_owner(&self) -> Option<EntityId> {
        Some(self.person_id)
    }
}

impl MockRow for Link {
    const BY_PROPERTY: bool = true;

    fn table(data: &AllData) -> &Vec<Self> {
        &data.links
    }

    fn table_mut(data: &mut AllData) -> &mut Vec<Self> {
        &mut data.links
    }

    fn detail(data: &AllData, id: EntityId) -> Option<Link> {
        data.links.iter().find(|l| l.id == id).cloned()
    }

    fn property_owner(&self) -> Option<EntityId> {
        Some(self.property_id)
    }
}

/// One resource of the mock, sharing the database with the others
pub struct MockResource<E> {
    db: Arc<MockDb>,
    kind: PhantomData<fn() -> E>,
}

impl<E: MockRow> MockResource<E> {
    fn new(db: Arc<MockDb>) -> Self {
        Self {
            db,
            kind: PhantomData,
        }
    }

    fn op(action: &str) -> String {
        format!("{}.{action}", E::RESOURCE)
    }

    async fn enter(&self, action: &str) -> ApiResult<String> {
        let op = Self::op(action);
        self.db.enter(&op).await?;
        Ok(op)
    }

    fn remove_where(&self, doomed: impl Fn(&E) -> bool) {
        let mut tables = self.db.tables.lock();
        E::table_mut(&mut tables).retain(|row| !doomed(row));
    }
}

#[async_trait]
impl<E: MockRow> ResourceApi<E> for MockResource<E> {
    async fn get_all(&self) -> ApiResult<Vec<E>> {
        self.enter("get_all").await?;
        Ok(E::table(&self.db.tables.lock()).clone())
    }

    async fn get_by_id(&self, id: EntityId) -> ApiResult<E::Detail> {
        self.enter("get_by_id").await?;
        E::detail(&self.db.tables.lock(), id).ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("{} {id} not found", E::RESOURCE),
        })
    }

    async fn create(&self, entity: &E) -> ApiResult<Created> {
        let op = self.enter("create").await?;
        if self.db.rejects(&op) {
            return Ok(Created {
                success: false,
                id: None,
            });
        }
        let id = self.db.allocate_id();
        E::table_mut(&mut self.db.tables.lock()).push(entity.clone().with_id(id));
        Ok(Created {
            success: true,
            id: Some(id),
        })
    }

    async fn update(&self, entity: &E) -> ApiResult<Ack> {
        let op = self.enter("update").await?;
        if self.db.rejects(&op) {
            return Ok(Ack { success: false });
        }
        let mut tables = self.db.tables.lock();
        match E::table_mut(&mut tables).iter_mut().find(|row| row.id() == entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(Ack::ok())
            }
            None => Ok(Ack { success: false }),
        }
    }

    async fn delete(&self, id: EntityId) -> ApiResult<Ack> {
        let op = self.enter("delete").await?;
        if self.db.rejects(&op) {
            return Ok(Ack { success: false });
        }
        let mut tables = self.db.tables.lock();
        let rows = E::table_mut(&mut tables);
        let before = rows.len();
        rows.retain(|row| row.id() != id);
        Ok(Ack {
            success: rows.len() < before,
        })
    }

    async fn delete_by_property_id(&self, property_id: EntityId) -> ApiResult<Ack> {
        if !E::BY_PROPERTY {
            return Err(ApiError::Unsupported {
                resource: E::RESOURCE,
                action: "delete_by_property_id",
            });
        }
        let op = self.enter("delete_by_property_id").await?;
        if self.db.rejects(&op) {
            return Ok(Ack { success: false });
        }
        self.remove_where(|row| row.property_owner() == Some(property_id));
        Ok(Ack::ok())
    }

    async fn delete_by_person_id(&self, person_id: EntityId) -> ApiResult<Ack> {
        if !E::BY_PERSON {
            return Err(ApiError::Unsupported {
                resource: E::RESOURCE,
                action: "delete_by_person_id",
            });
        }
        let op = self.enter("delete_by_person_id").await?;
        if self.db.rejects(&op) {
            return Ok(Ack { success: false });
        }
        self.remove_where(|row| row.person_owner() == Some(person_id));
        Ok(Ack::ok())
    }
}

/// Backend double holding all four tables in memory
pub struct MockBackend {
    db: Arc<MockDb>,
    properties: MockResource<Property>,
    persons: MockResource<Person>,
    connections: MockResource<Connection>,
    links: MockResource<Link>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_data(AllData::default())
    }

    /// Start from `data`; new ids are allocated above the highest seeded id
    pub fn with_data(data: AllData) -> Self {
        let highest = data
            .properties
            .iter()
            .map(|p| p.id)
            .chain(data.persons.iter().map(|p| p.id))
            .chain(data.connections.iter().map(|c| c.id))
            .chain(data.links.iter().map(|l| l.id))
            .max()
            .unwrap_or(0);

        let db = Arc::new(MockDb {
            tables: Mutex::new(data),
            next_id: AtomicI64::new(highest + 1),
            ..MockDb::default()
        });
        Self {
            properties: MockResource::new(db.clone()),
            persons: MockResource::new(db.clone()),
            connections: MockResource::new(db.clone()),
            links: MockResource::new(db.clone()),
            db,
        }
    }

    /// Current server-side contents
    pub fn data(&self) -> AllData {
        self.db.tables.lock().clone()
    }

    /// Mutate server-side contents without counting a call
    pub fn edit(&self, f: impl FnOnce(&mut AllData)) {
        f(&mut self.db.tables.lock());
    }

    /// How many times `op` was called
    pub fn calls(&self, op: &str) -> usize {
        self.db.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.db.calls.lock().values().sum()
    }

    pub fn reset_calls(&self) {
        self.db.calls.lock().clear();
    }

    /// Delay every call by `latency` before it takes effect
    pub fn set_latency(&self, latency: Duration) {
        *self.db.latency.lock() = latency;
    }

    /// Make `op` fail with a 500 until [`MockBackend::recover`]
    pub fn fail(&self, op: &str) {
        self.db.failing.lock().insert(op.to_string());
    }

    /// Make `op` answer with `success: false`
    pub fn reject(&self, op: &str) {
        self.db.rejecting.lock().insert(op.to_string());
    }

    /// Make `op` never answer
    pub fn hang(&self, op: &str) {
        self.db.hanging.lock().insert(op.to_string());
    }

    /// Clear every fault injected for `op`
    pub fn recover(&self, op: &str) {
        self.db.failing.lock().remove(op);
        self.db.rejecting.lock().remove(op);
        self.db.hanging.lock().remove(op);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn properties(&self) -> &dyn ResourceApi<Property> {
        &self.properties
    }

    fn persons(&self) -> &dyn ResourceApi<Person> {
        &self.persons
    }

    fn connections(&self) -> &dyn ResourceApi<Connection> {
        &self.connections
    }

    fn links(&self) -> &dyn ResourceApi<Link> {
        &self.links
    }

    async fn extract_all(&self) -> ApiResult<AllData> {
        self.db.enter("extract_all").await?;
        Ok(self.data())
    }
}
