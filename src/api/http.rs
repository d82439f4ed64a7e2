use std::marker::PhantomData;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::traits::{Backend, ResourceApi};
use super::types::{Ack, Created};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{AllData, Connection, Entity, EntityId, Link, Person, Property};

/// REST accessor for one entity kind under `{base_url}/{resource}`
pub struct RestResource<E> {
    client: Client,
    base_url: String,
    by_property: bool,
    by_person: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> RestResource<E> {
    fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            by_property: false,
            by_person: false,
            _entity: PhantomData,
        }
    }

    fn with_property_cascade(mut self) -> Self {
        self.by_property = true;
        self
    }

    fn with_person_cascade(mut self) -> Self {
        self.by_person = true;
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, E::RESOURCE)
    }

    fn item_url(&self, id: EntityId) -> String {
        format!("{}/{}/{}", self.base_url, E::RESOURCE, id)
    }

    async fn delete_owned(&self, owner: &str, owner_id: EntityId) -> ApiResult<Ack> {
        let url = format!("{}/{}/{}/{}", self.base_url, E::RESOURCE, owner, owner_id);
        debug!(url = %url, "Cascade delete");
        decode(self.client.delete(&url).send().await?).await
    }
}

#[async_trait]
impl<E: Entity> ResourceApi<E> for RestResource<E> {
    async fn get_all(&self) -> ApiResult<Vec<E>> {
        let url = self.collection_url();
        debug!(url = %url, "Fetching collection");
        decode(self.client.get(&url).send().await?).await
    }

    async fn get_by_id(&self, id: EntityId) -> ApiResult<E::Detail> {
        let url = self.item_url(id);
        debug!(url = %url, "Fetching detail");
        decode(self.client.get(&url).send().await?).await
    }

    async fn create(&self, entity: &E) -> ApiResult<Created> {
        let mut body = serde_json::to_value(entity)?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("id");
        }
        decode(self.client.post(self.collection_url()).json(&body).send().await?).await
    }

    async fn update(&self, entity: &E) -> ApiResult<Ack> {
        let url = self.item_url(entity.id());
        decode(self.client.put(&url).json(entity).send().await?).await
    }

    async fn delete(&self, id: EntityId) -> ApiResult<Ack> {
        decode(self.client.delete(self.item_url(id)).send().await?).await
    }

    async fn delete_by_property_id(&self, property_id: EntityId) -> ApiResult<Ack> {
        if !self.by_property {
            return Err(ApiError::Unsupported {
                resource: E::RESOURCE,
                action: "delete_by_property_id",
            });
        }
        self.delete_owned("property", property_id).await
    }

    async fn delete_by_person_id(&self, person_id: EntityId) -> ApiResult<Ack> {
        if !self.by_person {
            return Err(ApiError::Unsupported {
                resource: E::RESOURCE,
                action: "delete_by_person_id",
            });
        }
        self.delete_owned("person", person_id).await
    }
}

/// Backend reached over HTTP with JSON payloads
pub struct HttpBackend {
    client: Client,
    base_url: String,
    properties: RestResource<Property>,
    persons: RestResource<Person>,
    connections: RestResource<Connection>,
    links: RestResource<Link>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("housing-desk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            properties: RestResource::new(client.clone(), &base_url),
            persons: RestResource::new(client.clone(), &base_url),
            connections: RestResource::new(client.clone(), &base_url)
                .with_property_cascade()
                .with_person_cascade(),
            links: RestResource::new(client.clone(), &base_url).with_property_cascade(),
            client,
            base_url,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
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
        let url = format!("{}/extract-all", self.base_url);
        debug!(url = %url, "Fetching all collections");
        decode(self.client.get(&url).send().await?).await
    }
}

/// Check the status, then parse the body as `T`
async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        warn!(status = %status, "Backend returned error status");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: body,
        });
    }

    debug!(bytes = body.len(), "Downloaded response");
    serde_json::from_str(&body).map_err(ApiError::from)
}
