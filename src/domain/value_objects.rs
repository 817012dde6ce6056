//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A place identified by administrative attributes (no street).
///
/// Fields are normalized on construction (trimmed, lower-cased). After
/// that, equality is exact string equality on all four fields. An empty
/// field acts as a wildcard when the key is used as a query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationKey {
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl LocationKey {
    /// Build a normalized location key.
    pub fn new(
        city: impl AsRef<str>,
        state: impl AsRef<str>,
        postal_code: impl AsRef<str>,
        country: impl AsRef<str>,
    ) -> Self {
        Self {
            city: normalize(city.as_ref()),
            state: normalize(state.as_ref()),
            postal_code: normalize(postal_code.as_ref()),
            country: normalize(country.as_ref()),
        }
    }

    /// Key with only the city set.
    pub fn city(city: impl AsRef<str>) -> Self {
        Self::new(city, "", "", "")
    }

    /// Re-apply normalization to a key built field by field (e.g. deserialized).
    pub fn normalized(&self) -> Self {
        Self::new(&self.city, &self.state, &self.postal_code, &self.country)
    }

    /// True when every attribute is empty; such a key cannot be looked up.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| f.is_empty())
    }

    /// Render the non-empty attributes as a free-form geocoding query.
    ///
    /// # Examples
    /// ```
    /// use timevault::LocationKey;
    ///
    /// let key = LocationKey::new("New York", "", "", "USA");
    /// assert_eq!(key.to_query_string(), "new york, usa");
    /// ```
    pub fn to_query_string(&self) -> String {
        self.fields()
            .iter()
            .filter(|f| !f.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Conjunctive filter match: every non-empty field of `self` must equal
    /// the corresponding field of `candidate`. Empty fields are wildcards.
    pub fn matches(&self, candidate: &LocationKey) -> bool {
        self.fields()
            .iter()
            .zip(candidate.fields().iter())
            .all(|(filter, value)| filter.is_empty() || filter == value)
    }

    fn fields(&self) -> [&str; 4] {
        [&self.city, &self.state, &self.postal_code, &self.country]
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<empty location>")
        } else {
            write!(f, "{}", self.to_query_string())
        }
    }
}

/// Rejected coordinate values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidCoordinate {
    #[error("coordinate components must be finite (lat={latitude}, lon={longitude})")]
    NotFinite { latitude: f64, longitude: f64 },
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A point on Earth.
///
/// Only finite, in-range values can be constructed, which is what makes the
/// `Eq`/`Hash` implementations below sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct GeoCoordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for GeoCoordinate {
    type Error = InvalidCoordinate;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl GeoCoordinate {
    /// Validate and build a coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinate> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(InvalidCoordinate::NotFinite {
                latitude,
                longitude,
            });
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidCoordinate::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidCoordinate::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// `lat,lon` as expected by coordinate query parameters.
    pub fn to_query_string(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl Eq for GeoCoordinate {}

impl Hash for GeoCoordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // -0.0 == 0.0 under PartialEq, so they must hash alike.
        fn bits(v: f64) -> u64 {
            if v == 0.0 {
                0.0f64.to_bits()
            } else {
                v.to_bits()
            }
        }
        bits(self.latitude).hash(state);
        bits(self.longitude).hash(state);
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}
