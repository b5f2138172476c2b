//! Diff calculation between two snapshots of a site.
//!
//! Compares the tracked site attributes and every point present on either
//! side. A point that exists on only one side is reported with each tracked
//! attribute moving to or from [`PointValue::Absent`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AppError, Result};
use crate::models::{
    Change, PointChangeKind, PointDiff, PointField, PointValue, Site, SiteDiff, SiteField,
};

/// Compare two snapshots of the same site.
///
/// Returns [`AppError::GuidMismatch`] when the snapshots belong to different
/// sites; that is a caller bug, not a data condition.
pub fn compare(old: &Site, new: &Site) -> Result<SiteDiff> {
    if old.guid != new.guid {
        return Err(AppError::GuidMismatch {
            old: old.guid.clone(),
            new: new.guid.clone(),
        });
    }

    let attributes = SiteField::ALL
        .iter()
        .filter_map(|&field| {
            let before = old.field(field);
            let after = new.field(field);
            (before != after).then(|| {
                (
                    field,
                    Change::new(before.map(str::to_string), after.map(str::to_string)),
                )
            })
        })
        .collect();

    let guids: BTreeSet<&String> = old.points.keys().chain(new.points.keys()).collect();
    let mut points = BTreeMap::new();

    for guid in guids {
        let before = old.points.get(guid);
        let after = new.points.get(guid);

        let changes: BTreeMap<PointField, Change<PointValue>> = PointField::ALL
            .iter()
            .filter_map(|&field| {
                let a = field.value_of(before);
                let b = field.value_of(after);
                (a != b).then(|| (field, Change::new(a, b)))
            })
            .collect();

        if changes.is_empty() {
            continue;
        }

        let kind = match (before, after) {
            (Some(_), None) => PointChangeKind::Removed,
            (None, Some(_)) => PointChangeKind::Added,
            _ => PointChangeKind::Modified,
        };
        points.insert(guid.clone(), PointDiff { kind, changes });
    }

    Ok(SiteDiff::new(old.clone(), new.clone(), attributes, points))
}
