mod bundle;
mod location;

pub use bundle::{AllData, PersonDetails, PropertyDetails};
pub use location::{Location, FALLBACK_LOCATION};

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned identifier shared by every entity kind
pub type EntityId = i64;

/// Common surface of the four entity kinds the backend serves
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Payload returned by `get_by_id` for this kind
    type Detail: DeserializeOwned + Send + 'static;

    /// Resource path segment and ledger name, e.g. `properties`
    const RESOURCE: &'static str;

    fn id(&self) -> EntityId;

    /// Attach the id the backend assigned on creation
    fn with_id(self, id: EntityId) -> Self;
}

/// Category of a property listing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Villa,
    Land,
    Commercial,
    Office,
    #[default]
    #[serde(other)]
    Other,
}

impl PropertyType {
    pub const ALL: [PropertyType; 7] = [
        PropertyType::Apartment,
        PropertyType::House,
        PropertyType::Villa,
        PropertyType::Land,
        PropertyType::Commercial,
        PropertyType::Office,
        PropertyType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Villa => "villa",
            PropertyType::Land => "land",
            PropertyType::Commercial => "commercial",
            PropertyType::Office => "office",
            PropertyType::Other => "other",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown property type '{s}'"))
    }
}

/// Role a person plays in the contact book
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Owner,
    Agent,
    Broker,
    Tenant,
    Buyer,
    #[default]
    #[serde(other)]
    Other,
}

impl PersonRole {
    pub const ALL: [PersonRole; 6] = [
        PersonRole::Owner,
        PersonRole::Agent,
        PersonRole::Broker,
        PersonRole::Tenant,
        PersonRole::Buyer,
        PersonRole::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonRole::Owner => "owner",
            PersonRole::Agent => "agent",
            PersonRole::Broker => "broker",
            PersonRole::Tenant => "tenant",
            PersonRole::Buyer => "buyer",
            PersonRole::Other => "other",
        }
    }
}

impl fmt::Display for PersonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| format!("unknown person role '{s}'"))
    }
}

/// Kind of resource a link points at
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Listing,
    Photos,
    Document,
    Video,
    Map,
    #[default]
    #[serde(other)]
    Other,
}

/// Core property data model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Property {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: EntityId,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub property_type: PropertyType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub area: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// 0 means unrated
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price_min: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price_max: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size_min: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size_max: f64,
    /// Coverage radius in meters, 0 when unset
    #[serde(default, deserialize_with = "null_as_default")]
    pub radius: f64,
    #[serde(default)]
    pub location: Location,
}

impl Property {
    /// Restore the local invariants on a property of unknown provenance.
    ///
    /// Non-finite coordinates fall back, rating is capped at 5, a negative
    /// or non-finite radius becomes 0 and reversed bounds are swapped.
    pub fn sanitized(mut self) -> Self {
        self.location = self.location.sanitized();
        self.rating = self.rating.min(5);
        if !self.radius.is_finite() || self.radius < 0.0 {
            self.radius = 0.0;
        }
        if self.price_min > self.price_max {
            std::mem::swap(&mut self.price_min, &mut self.price_max);
        }
        if self.size_min > self.size_max {
            std::mem::swap(&mut self.size_min, &mut self.size_max);
        }
        self
    }
}

impl Entity for Property {
    type Detail = PropertyDetails;
    const RESOURCE: &'static str = "properties";

    fn id(&self) -> EntityId {
        self.id
    }

    fn with_id(self, id: EntityId) -> Self {
        Self { id, ..self }
    }
}

/// A contact connected to one or more properties
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Person {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alternative_contact_details: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: PersonRole,
    #[serde(default, deserialize_with = "null_as_default")]
    pub about: String,
}

impl Entity for Person {
    type Detail = PersonDetails;
    const RESOURCE: &'static str = "persons";

    fn id(&self) -> EntityId {
        self.id
    }

    fn with_id(self, id: EntityId) -> Self {
        Self { id, ..self }
    }
}

/// Edge between one property and one person
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: EntityId,
    pub property_id: EntityId,
    pub person_id: EntityId,
    /// Role the person plays for this particular property
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remark: String,
}

impl Entity for Connection {
    type Detail = Connection;
    const RESOURCE: &'static str = "connections";

    fn id(&self) -> EntityId {
        self.id
    }

    fn with_id(self, id: EntityId) -> Self {
        Self { id, ..self }
    }
}

/// External resource attached to a property
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Link {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: EntityId,
    pub property_id: EntityId,
    pub link: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub link_type: LinkType,
    #[serde(default)]
    pub anchor: Option<String>,
}

impl Link {
    /// Give the URL an explicit scheme, defaulting to https
    pub fn normalized(mut self) -> Self {
        self.link = normalize_url(&self.link);
        self
    }
}

impl Entity for Link {
    type Detail = Link;
    const RESOURCE: &'static str = "links";

    fn id(&self) -> EntityId {
        self.id
    }

    fn with_id(self, id: EntityId) -> Self {
        Self { id, ..self }
    }
}

/// Prepend `https://` unless the input already parses as a base URL
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) if !parsed.cannot_be_a_base() => trimmed.to_string(),
        _ => format!("https://{}", trimmed.trim_start_matches('/')),
    }
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_tolerates_nulls_and_missing_location() {
        let property: Property = serde_json::from_value(json!({
            "id": 7,
            "type": "apartment",
            "zone": null,
            "tags": null,
            "rating": null,
            "price_min": 10.0,
            "price_max": 20.0
        }))
        .unwrap();

        assert_eq!(property.id, 7);
        assert_eq!(property.property_type, PropertyType::Apartment);
        assert_eq!(property.zone, "");
        assert!(property.tags.is_empty());
        assert_eq!(property.location, FALLBACK_LOCATION);
    }

    #[test]
    fn unknown_enum_values_decode_as_other() {
        let person: Person = serde_json::from_value(json!({"id": 1, "role": "landlord"})).unwrap();
        assert_eq!(person.role, PersonRole::Other);
    }

    #[test]
    fn sanitized_restores_invariants() {
        let property = Property {
            rating: 9,
            radius: -3.0,
            price_min: 90.0,
            price_max: 10.0,
            location: Location {
                latitude: f64::NAN,
                longitude: 1.0,
            },
            ..Property::default()
        }
        .sanitized();

        assert_eq!(property.rating, 5);
        assert_eq!(property.radius, 0.0);
        assert_eq!((property.price_min, property.price_max), (10.0, 90.0));
        assert_eq!(property.location, FALLBACK_LOCATION);
    }

    #[test]
    fn normalize_url_adds_missing_scheme() {
        assert_eq!(normalize_url("example.com/listing"), "https://example.com/listing");
        assert_eq!(normalize_url("localhost:3000/x"), "https://localhost:3000/x");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("  https://booli.se/annons/1 "), "https://booli.se/annons/1");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn enums_parse_from_cli_input() {
        assert_eq!("Villa".parse::<PropertyType>(), Ok(PropertyType::Villa));
        assert_eq!(" agent ".parse::<PersonRole>(), Ok(PersonRole::Agent));
        assert!("castle".parse::<PropertyType>().is_err());
    }

    #[test]
    fn with_id_keeps_other_fields() {
        let link = Link {
            property_id: 3,
            link: "https://example.com".into(),
            ..Link::default()
        }
        .with_id(11);
        assert_eq!(link.id, 11);
        assert_eq!(link.property_id, 3);
    }
}
