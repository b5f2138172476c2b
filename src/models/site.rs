//! Charging site data structure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Point;

/// A charging location and the points installed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Site {
    /// Stable external key, never changes across refreshes
    pub guid: String,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, rename = "lat", alias = "latitude")]
    pub latitude: Option<String>,
    #[serde(default, rename = "lng", alias = "longitude")]
    pub longitude: Option<String>,

    /// Points keyed by point guid
    #[serde(default)]
    pub points: BTreeMap<String, Point>,
}

impl Site {
    /// Create a site with no metadata and no points.
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }

    /// Name for display, falling back to the guid.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.guid)
    }

    /// Return a copy of this site carrying a freshly fetched point set.
    pub fn with_points(&self, points: BTreeMap<String, Point>) -> Self {
        Self {
            points,
            ..self.clone()
        }
    }

    /// Insert a point keyed by its own guid.
    pub fn insert_point(&mut self, point: Point) {
        self.points.insert(point.guid.clone(), point);
    }

    /// Value of a metadata attribute.
    pub fn field(&self, field: SiteField) -> Option<&str> {
        match field {
            SiteField::Name => self.name.as_deref(),
            SiteField::Address => self.address.as_deref(),
            SiteField::Town => self.town.as_deref(),
            SiteField::County => self.county.as_deref(),
            SiteField::Postcode => self.postcode.as_deref(),
            SiteField::Country => self.country.as_deref(),
            SiteField::Latitude => self.latitude.as_deref(),
            SiteField::Longitude => self.longitude.as_deref(),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.guid)
    }
}

/// Site-level attributes tracked by the diff engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteField {
    Name,
    Address,
    Town,
    County,
    Postcode,
    Country,
    Latitude,
    Longitude,
}

impl SiteField {
    pub const ALL: [SiteField; 8] = [
        SiteField::Name,
        SiteField::Address,
        SiteField::Town,
        SiteField::County,
        SiteField::Postcode,
        SiteField::Country,
        SiteField::Latitude,
        SiteField::Longitude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::Town => "town",
            Self::County => "county",
            Self::Postcode => "postcode",
            Self::Country => "country",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

impl fmt::Display for SiteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
