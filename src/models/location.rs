use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Coordinate substituted whenever a property has no usable location (Södermalm)
pub const FALLBACK_LOCATION: Location = Location {
    latitude: 59.3145,
    longitude: 18.0736,
};

/// Geographic position of a property.
///
/// A `Location` is never absent: unknown or malformed input collapses to
/// [`FALLBACK_LOCATION`], and "has a location" is answered by [`Location::is_set`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Build a location, substituting the fallback for non-finite coordinates
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
        .sanitized()
    }

    /// Returns the fallback when either axis is NaN or infinite
    pub fn sanitized(self) -> Self {
        if self.latitude.is_finite() && self.longitude.is_finite() {
            self
        } else {
            FALLBACK_LOCATION
        }
    }

    /// Whether this location differs from the fallback coordinate in either axis
    pub fn is_set(&self) -> bool {
        self.latitude != FALLBACK_LOCATION.latitude || self.longitude != FALLBACK_LOCATION.longitude
    }

    /// Decode a location from whatever shape the backend or cache produced.
    ///
    /// Accepts `{latitude, longitude}` / `{lat, lng}` objects, `[lat, lng]`
    /// arrays and `"lat,lng"` strings, with numbers or numeric strings per axis.
    pub fn from_value(value: &Value) -> Self {
        let pair = match value {
            Value::Object(map) => {
                let lat = map.get("latitude").or_else(|| map.get("lat"));
                let lng = map
                    .get("longitude")
                    .or_else(|| map.get("lng"))
                    .or_else(|| map.get("lon"));
                lat.and_then(coordinate).zip(lng.and_then(coordinate))
            }
            Value::Array(items) if items.len() == 2 => coordinate(&items[0]).zip(coordinate(&items[1])),
            Value::String(text) => {
                let mut parts = text.split(',').map(str::trim);
                let lat = parts.next().and_then(|s| s.parse::<f64>().ok());
                let lng = parts.next().and_then(|s| s.parse::<f64>().ok());
                if parts.next().is_some() {
                    None
                } else {
                    lat.zip(lng)
                }
            }
            _ => None,
        };

        match pair {
            Some((latitude, longitude)) => Self::new(latitude, longitude),
            None => FALLBACK_LOCATION,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        FALLBACK_LOCATION
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
