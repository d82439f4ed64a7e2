use serde::{Deserialize, Serialize};

use super::{Connection, Link, Person, Property};

/// A property together with everything attached to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyDetails {
    pub property: Property,
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// A person together with the properties they are connected to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonDetails {
    pub person: Person,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// Every collection in a single round trip
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllData {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub links: Vec<Link>,
}
