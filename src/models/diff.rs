//! Attribute-level difference between two snapshots of one site.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::{ConnectorType, Point, PointState, Site, SiteField};

/// An `(old, new)` pair for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    pub old: T,
    pub new: T,
}

impl<T> Change<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    /// The same change seen from the other direction.
    pub fn reversed(self) -> Self {
        Self {
            old: self.new,
            new: self.old,
        }
    }
}

/// Point-level attributes tracked by the diff engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointField {
    Price,
    ConnectorType,
    PointId,
    State,
    MaxPower,
}

impl PointField {
    pub const ALL: [PointField; 5] = [
        PointField::Price,
        PointField::ConnectorType,
        PointField::PointId,
        PointField::State,
        PointField::MaxPower,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::ConnectorType => "connector_type",
            Self::PointId => "point_id",
            Self::State => "state",
            Self::MaxPower => "max_power",
        }
    }

    /// Read this attribute from a point, `Absent` when there is no point.
    pub fn value_of(&self, point: Option<&Point>) -> PointValue {
        let Some(point) = point else {
            return PointValue::Absent;
        };
        match self {
            Self::Price => PointValue::Price(point.price),
            Self::ConnectorType => PointValue::Connector(point.connector_type),
            Self::PointId => PointValue::PointId(point.point_id.clone()),
            Self::State => PointValue::State(point.state),
            Self::MaxPower => PointValue::MaxPower(point.max_power),
        }
    }
}

impl fmt::Display for PointField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point attribute value, or `Absent` when the point does not exist on
/// that side of the comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Absent,
    Price(Decimal),
    Connector(ConnectorType),
    PointId(String),
    State(PointState),
    MaxPower(f64),
}

impl PointValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("-"),
            Self::Price(price) => write!(f, "{price}"),
            Self::Connector(connector) => f.write_str(connector.display_name()),
            Self::PointId(id) => f.write_str(id),
            Self::State(state) => f.write_str(state.display_name()),
            Self::MaxPower(power) => write!(f, "{power}"),
        }
    }
}

/// How a point's presence changed between the two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointChangeKind {
    /// Only present in the new snapshot
    Added,
    /// Only present in the old snapshot
    Removed,
    /// Present in both with at least one changed attribute
    Modified,
}

/// Changed attributes of a single point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointDiff {
    pub kind: PointChangeKind,
    pub changes: BTreeMap<PointField, Change<PointValue>>,
}

impl PointDiff {
    pub fn get(&self, field: PointField) -> Option<&Change<PointValue>> {
        self.changes.get(&field)
    }
}

/// Result of comparing two snapshots of the same site.
///
/// Built by [`crate::pipeline::compare`]. An empty diff means nothing
/// tracked changed; callers branch on [`SiteDiff::is_empty`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteDiff {
    guid: String,
    #[serde(skip)]
    old: Site,
    #[serde(skip)]
    new: Site,
    attributes: BTreeMap<SiteField, Change<Option<String>>>,
    points: BTreeMap<String, PointDiff>,
}

impl SiteDiff {
    pub(crate) fn new(
        old: Site,
        new: Site,
        attributes: BTreeMap<SiteField, Change<Option<String>>>,
        points: BTreeMap<String, PointDiff>,
    ) -> Self {
        Self {
            guid: old.guid.clone(),
            old,
            new,
            attributes,
            points,
        }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Snapshot before the refresh.
    pub fn old(&self) -> &Site {
        &self.old
    }

    /// Snapshot after the refresh.
    pub fn new_site(&self) -> &Site {
        &self.new
    }

    /// Changed site-level attributes.
    pub fn attributes(&self) -> &BTreeMap<SiteField, Change<Option<String>>> {
        &self.attributes
    }

    /// Changed points keyed by point guid.
    pub fn points(&self) -> &BTreeMap<String, PointDiff> {
        &self.points
    }

    pub fn point(&self, guid: &str) -> Option<&PointDiff> {
        self.points.get(guid)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.points.is_empty()
    }

    /// Number of changed attributes across the site and its points.
    pub fn change_count(&self) -> usize {
        self.attributes.len() + self.points.values().map(|p| p.changes.len()).sum::<usize>()
    }

    /// Human-facing id of a changed point, looked up on whichever side has it.
    pub fn point_id(&self, guid: &str) -> Option<&str> {
        self.old
            .points
            .get(guid)
            .or_else(|| self.new.points.get(guid))
            .map(|p| p.point_id.as_str())
    }
}
