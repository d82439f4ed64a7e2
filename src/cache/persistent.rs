use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::storage::Storage;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::models::{EntityId, PersonDetails, PropertyDetails};

/// Fixed logical names of every cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Properties,
    Persons,
    Connections,
    Links,
    PropertyDetails,
    PersonDetails,
    Filters,
    PersonFilters,
    LastSync,
    SchemaVersion,
}

impl CacheKey {
    pub const ALL: [CacheKey; 10] = [
        CacheKey::Properties,
        CacheKey::Persons,
        CacheKey::Connections,
        CacheKey::Links,
        CacheKey::PropertyDetails,
        CacheKey::PersonDetails,
        CacheKey::Filters,
        CacheKey::PersonFilters,
        CacheKey::LastSync,
        CacheKey::SchemaVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Properties => "properties",
            CacheKey::Persons => "persons",
            CacheKey::Connections => "connections",
            CacheKey::Links => "links",
            CacheKey::PropertyDetails => "property-details-map",
            CacheKey::PersonDetails => "person-details-map",
            CacheKey::Filters => "filters",
            CacheKey::PersonFilters => "person-filters",
            CacheKey::LastSync => "last-sync-timestamp",
            CacheKey::SchemaVersion => "schema-version",
        }
    }

    fn lifetime(&self) -> Lifetime {
        match self {
            CacheKey::Filters | CacheKey::PersonFilters => Lifetime::Preference,
            _ => Lifetime::Entity,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Lifetime {
    Entity,
    Preference,
}

/// Versioning and freshness rules applied on every read
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub schema_version: u32,
    pub entity_max_age: Duration,
    pub preference_max_age: Duration,
}

impl CachePolicy {
    fn max_age(&self, key: CacheKey) -> Duration {
        match key.lifetime() {
            Lifetime::Entity => self.entity_max_age,
            Lifetime::Preference => self.preference_max_age,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            schema_version: 1,
            entity_max_age: Duration::hours(24),
            preference_max_age: Duration::days(7),
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            schema_version: config.schema_version,
            entity_max_age: Duration::hours(config.entity_max_age_hours),
            preference_max_age: Duration::days(config.preference_max_age_days),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    written_at: DateTime<Utc>,
    schema_version: u32,
}

#[derive(Serialize, Deserialize)]
struct DetailEntry {
    written_at: DateTime<Utc>,
    bundle: Value,
}

type DetailMap = BTreeMap<EntityId, DetailEntry>;

/// Versioned, time-stamped key/value cache.
///
/// Advisory only: reads that are stale, from another schema version or
/// undecodable are evicted and reported as absent, and write failures are
/// logged and dropped.
pub struct PersistentCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
}

impl PersistentCache {
    /// Open the cache, wiping every known key if it was written by another schema version
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, policy: CachePolicy) -> Self {
        let cache = Self {
            storage,
            clock,
            policy,
        };
        cache.check_schema_version();
        cache
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Value stored under `key`, if fresh, current-version and decodable
    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let raw = match self.storage.read(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed");
                return None;
            }
        };

        let envelope: Envelope<Value> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(key = %key, error = %err, "Evicting undecodable cache entry");
                self.remove(key);
                return None;
            }
        };

        if envelope.schema_version != self.policy.schema_version {
            debug!(
                key = %key,
                stored = envelope.schema_version,
                running = self.policy.schema_version,
                "Evicting cache entry from another schema version"
            );
            self.remove(key);
            return None;
        }

        let age = self.clock.now() - envelope.written_at;
        if age > self.policy.max_age(key) {
            debug!(key = %key, age_secs = age.num_seconds(), "Evicting stale cache entry");
            self.remove(key);
            return None;
        }

        match serde_json::from_value(envelope.value) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key = %key, error = %err, "Evicting cache entry with unexpected shape");
                self.remove(key);
                None
            }
        }
    }

    /// Stamp and store `value`. Failures are logged, never returned.
    pub fn set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) {
        if let Err(err) = self.try_set(key, value) {
            warn!(key = %key, error = %err, "Cache write failed, continuing without it");
        }
    }

    fn try_set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<(), StorageError> {
        let envelope = Envelope {
            value,
            written_at: self.clock.now(),
            schema_version: self.policy.schema_version,
        };
        let raw = serde_json::to_string(&envelope)?;
        self.storage.write(key.as_str(), &raw)
    }

    pub fn remove(&self, key: CacheKey) {
        if let Err(err) = self.storage.remove(key.as_str()) {
            warn!(key = %key, error = %err, "Cache eviction failed");
        }
    }

    /// Remove every known key
    pub fn clear(&self) {
        for key in CacheKey::ALL {
            self.remove(key);
        }
    }

    /// One bundle from a detail map, if it is younger than the entity max age
    pub fn detail<T: DeserializeOwned>(&self, key: CacheKey, id: EntityId) -> Option<T> {
        let mut map = self.get::<DetailMap>(key)?;
        let entry = map.remove(&id)?;

        let age = self.clock.now() - entry.written_at;
        if age > self.policy.entity_max_age {
            debug!(key = %key, id, age_secs = age.num_seconds(), "Evicting stale detail bundle");
            self.forget_detail(key, id);
            return None;
        }

        match serde_json::from_value(entry.bundle) {
            Ok(detail) => Some(detail),
            Err(err) => {
                debug!(key = %key, id, error = %err, "Dropping malformed detail bundle");
                self.forget_detail(key, id);
                None
            }
        }
    }

    /// Stamp and store one bundle, rewriting the whole map.
    ///
    /// Other bundles keep their own stamps; expired ones are pruned on the way.
    pub fn put_detail<T: Serialize>(&self, key: CacheKey, id: EntityId, detail: &T) {
        let bundle = match serde_json::to_value(detail) {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(key = %key, id, error = %err, "Failed to serialize detail bundle");
                return;
            }
        };
        let now = self.clock.now();
        let mut map = self.get::<DetailMap>(key).unwrap_or_default();
        map.retain(|_, entry| now - entry.written_at <= self.policy.entity_max_age);
        map.insert(
            id,
            DetailEntry {
                written_at: now,
                bundle,
            },
        );
        self.set(key, &map);
    }

    pub fn forget_detail(&self, key: CacheKey, id: EntityId) {
        let Some(mut map) = self.get::<DetailMap>(key) else {
            return;
        };
        if map.remove(&id).is_some() {
            self.set(key, &map);
        }
    }

    pub fn property_details(&self, id: EntityId) -> Option<PropertyDetails> {
        self.detail(CacheKey::PropertyDetails, id)
    }

    pub fn set_property_details(&self, id: EntityId, details: &PropertyDetails) {
        self.put_detail(CacheKey::PropertyDetails, id, details);
    }

    pub fn person_details(&self, id: EntityId) -> Option<PersonDetails> {
        self.detail(CacheKey::PersonDetails, id)
    }

    pub fn set_person_details(&self, id: EntityId, details: &PersonDetails) {
        self.put_detail(CacheKey::PersonDetails, id, details);
    }

    fn check_schema_version(&self) {
        let key = CacheKey::SchemaVersion.as_str();
        let stored = match self.storage.read(key) {
            Ok(raw) => raw.and_then(|raw| raw.trim().parse::<u32>().ok()),
            Err(err) => {
                warn!(error = %err, "Failed to read cache schema version");
                None
            }
        };

        if stored == Some(self.policy.schema_version) {
            return;
        }
        if let Some(stored) = stored {
            warn!(
                stored,
                running = self.policy.schema_version,
                "Cache schema changed, clearing cached data"
            );
        }
        self.clear();
        if let Err(err) = self
            .storage
            .write(key, &self.policy.schema_version.to_string())
        {
            warn!(error = %err, "Failed to record cache schema version");
        }
    }
}
