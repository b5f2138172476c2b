//! Charge point data structure.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Operational state of a charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointState {
    Available,
    Charging,
    Offline,
    /// Anything the source reported that we could not recognise
    #[default]
    #[serde(other)]
    Unknown,
}

impl PointState {
    /// Wire value, as stored and as reported by the site.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Charging => "CHARGING",
            Self::Offline => "OFFLINE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Charging => "Charging",
            Self::Offline => "Offline",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse text from the source, falling back to `Unknown`.
    pub fn from_text_lossy(text: &str) -> Self {
        text.parse().unwrap_or_default()
    }
}

impl FromStr for PointState {
    type Err = UnrecognisedValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(Self::Available),
            "CHARGING" => Ok(Self::Charging),
            "OFFLINE" => Ok(Self::Offline),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(UnrecognisedValue(s.to_string())),
        }
    }
}

impl fmt::Display for PointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical connector fitted to a charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectorType {
    #[serde(rename = "UK_3_PIN")]
    Uk3Pin,
    #[serde(rename = "CCS")]
    Ccs,
    #[serde(rename = "CHADEMO")]
    Chademo,
    #[serde(rename = "TYPE_1")]
    Type1,
    #[serde(rename = "TYPE_2")]
    Type2,
    #[default]
    #[serde(rename = "UNKNOWN", other)]
    Unknown,
}

impl ConnectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uk3Pin => "UK_3_PIN",
            Self::Ccs => "CCS",
            Self::Chademo => "CHADEMO",
            Self::Type1 => "TYPE_1",
            Self::Type2 => "TYPE_2",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Uk3Pin => "UK 3-pin plug",
            Self::Ccs => "CCS",
            Self::Chademo => "CHAdeMO",
            Self::Type1 => "Type 1",
            Self::Type2 => "Type 2",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse text from the source, falling back to `Unknown`.
    pub fn from_text_lossy(text: &str) -> Self {
        text.parse().unwrap_or_default()
    }
}

impl FromStr for ConnectorType {
    type Err = UnrecognisedValue;

    /// Accepts the numeric codes used by the source, the wire names, and the
    /// display names.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();

        match normalised.as_str() {
            "1" | "UK3PIN" | "UK3PINPLUG" => Ok(Self::Uk3Pin),
            "2" | "CCS" => Ok(Self::Ccs),
            "3" | "CHADEMO" => Ok(Self::Chademo),
            "4" | "TYPE1" => Ok(Self::Type1),
            "5" | "TYPE2" => Ok(Self::Type2),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(UnrecognisedValue(s.to_string())),
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text that does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognisedValue(pub String);

impl fmt::Display for UnrecognisedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised value '{}'", self.0)
    }
}

impl std::error::Error for UnrecognisedValue {}

/// An individual charger at a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Stable external key, unique within a site
    pub guid: String,

    /// Identifier shown to drivers (e.g. `UKEV1381`)
    pub point_id: String,

    #[serde(default)]
    pub state: PointState,

    /// Price per kWh
    pub price: Decimal,

    /// Power rating in kW
    pub max_power: f64,

    #[serde(default)]
    pub connector_type: ConnectorType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Point {
    pub fn new(
        guid: impl Into<String>,
        point_id: impl Into<String>,
        state: PointState,
        price: Decimal,
        max_power: f64,
    ) -> Self {
        Self {
            guid: guid.into(),
            point_id: point_id.into(),
            state,
            price,
            max_power,
            connector_type: ConnectorType::Unknown,
            image_url: None,
        }
    }

    pub fn with_connector(mut self, connector_type: ConnectorType) -> Self {
        self.connector_type = connector_type;
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}
