use async_trait::async_trait;

use super::types::{Ack, Created};
use crate::error::{ApiError, ApiResult};
use crate::models::{AllData, Connection, Entity, EntityId, Link, Person, Property};

/// Uniform accessor set for one entity kind.
///
/// `create` takes the entity with its id ignored; the caller attaches the
/// returned id locally instead of re-fetching.
#[async_trait]
pub trait ResourceApi<E: Entity>: Send + Sync {
    async fn get_all(&self) -> ApiResult<Vec<E>>;

    async fn get_by_id(&self, id: EntityId) -> ApiResult<E::Detail>;

    async fn create(&self, entity: &E) -> ApiResult<Created>;

    async fn update(&self, entity: &E) -> ApiResult<Ack>;

    async fn delete(&self, id: EntityId) -> ApiResult<Ack>;

    /// Bulk delete of every row owned by a property
    async fn delete_by_property_id(&self, _property_id: EntityId) -> ApiResult<Ack> {
        Err(ApiError::Unsupported {
            resource: E::RESOURCE,
            action: "delete_by_property_id",
        })
    }

    /// Bulk delete of every row owned by a person
    async fn delete_by_person_id(&self, _person_id: EntityId) -> ApiResult<Ack> {
        Err(ApiError::Unsupported {
            resource: E::RESOURCE,
            action: "delete_by_person_id",
        })
    }
}

/// The whole remote surface the store depends on
#[async_trait]
pub trait Backend: Send + Sync {
    fn properties(&self) -> &dyn ResourceApi<Property>;

    fn persons(&self) -> &dyn ResourceApi<Person>;

    fn connections(&self) -> &dyn ResourceApi<Connection>;

    fn links(&self) -> &dyn ResourceApi<Link>;

    /// All four collections in one round trip
    async fn extract_all(&self) -> ApiResult<AllData>;
}
