//! Revision markers and last-write-wins comparison
//!
//! Every entity that passes through the engine carries `updatedAt`, the
//! wall-clock millis of the device that last edited it. Conflicts are
//! resolved by comparing markers only; fields are never merged.
//!
//! Ties go to the incoming record. Two devices applying the same pair of
//! edits in either order therefore converge on the remote's copy.

use serde_json::Value;

use crate::types::{now_millis, Entity, Record};

/// JSON field holding the revision marker
pub const REVISION_FIELD: &str = "updatedAt";

/// Stamp `entity` with the current time unless it already has a marker.
pub fn with_version<E: Entity>(entity: E) -> E {
    with_version_at(entity, now_millis())
}

/// [`with_version`] with an explicit clock reading
pub fn with_version_at<E: Entity>(mut entity: E, now: i64) -> E {
    if entity.updated_at().is_none() {
        entity.set_updated_at(now);
    }
    entity
}

/// Stamp a local edit. The marker never moves backwards, even if the
/// device clock is behind the previous editor's.
pub fn touch<E: Entity>(entity: E) -> E {
    touch_at(entity, now_millis())
}

/// [`touch`] with an explicit clock reading
pub fn touch_at<E: Entity>(mut entity: E, now: i64) -> E {
    let next = entity.updated_at().map_or(now, |prev| prev.max(now));
    entity.set_updated_at(next);
    entity
}

/// [`with_version`] for a record of any collection
pub fn with_version_record(mut record: Record) -> Record {
    if record.updated_at().is_none() {
        record.set_updated_at(now_millis());
    }
    record
}

/// [`touch`] for a record of any collection
pub fn touch_record(mut record: Record) -> Record {
    let now = now_millis();
    let next = record.updated_at().map_or(now, |prev| prev.max(now));
    record.set_updated_at(next);
    record
}

/// Whether `incoming` should replace `existing`.
///
/// Absent markers count as revision 0. Equal markers favour `incoming`.
pub fn is_newer<E: Entity>(incoming: &E, existing: &E) -> bool {
    revision_wins(incoming.updated_at(), existing.updated_at())
}

/// [`is_newer`] over raw JSON records
pub fn is_newer_value(incoming: &Value, existing: &Value) -> bool {
    revision_wins(revision_of(incoming), revision_of(existing))
}

/// Read the revision marker out of a raw JSON record. Float markers
/// (`1000.0`, as some stores write numbers) are truncated.
pub fn revision_of(value: &Value) -> Option<i64> {
    let marker = value.get(REVISION_FIELD)?;
    marker.as_i64().or_else(|| marker.as_f64().map(|f| f as i64))
}

fn revision_wins(incoming: Option<i64>, existing: Option<i64>) -> bool {
    incoming.unwrap_or(0) >= existing.unwrap_or(0)
}
