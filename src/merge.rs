//! Merge rules applied when a local entity and a server record share a server id.
//!
//! The server is authoritative for the fields it carries. These functions are
//! pure: they take the local value and the record and return the merged value,
//! leaving persistence to the caller.

use crate::models::{CoverImage, EventLocal, EventRecord, TripLocal, TripRecord};
use crate::store::{NewEvent, NewTrip};

/// Overwrites id, name and image reference with the server's values. Dates are
/// not carried by the record and stay untouched.
///
/// A binary cover image has no wire representation, so a record without an
/// image URL keeps it; any other local image follows the record.
pub fn merge_trip(local: &TripLocal, remote: &TripRecord) -> TripLocal {
    let mut merged = local.clone();
    if let Some(id) = remote.server_id {
        merged.id = Some(id);
    }
    merged.name = remote.name.clone();
    merged.cover_image = match (&remote.image_url, &local.cover_image) {
        (Some(url), _) => Some(CoverImage::Url(url.clone())),
        (None, Some(CoverImage::Data(data))) => Some(CoverImage::Data(data.clone())),
        (None, _) => None,
    };
    merged
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMerge {
    pub event: EventLocal,
    /// The coordinate moved, so address and location name must be derived again.
    pub coordinate_changed: bool,
}

/// Overwrites id, name, notes, image URL and start date with the server's
/// values. The coordinate is replaced only when the record's parsed value
/// differs from the stored one. An absent or unparseable record date leaves the
/// local start date alone.
pub fn merge_event(local: &EventLocal, remote: &EventRecord) -> EventMerge {
    let mut merged = local.clone();
    if let Some(id) = remote.server_id {
        merged.id = Some(id);
    }
    merged.name = remote.name.clone().unwrap_or_default();
    merged.notes = remote.notes.clone();
    merged.image_url = remote.image_url.clone();
    if let Some(start) = remote.start_date() {
        merged.start_date = Some(start);
    }

    let coordinate_changed = match remote.coordinate() {
        Some(coordinate) if local.coordinate != Some(coordinate) => {
            merged.coordinate = Some(coordinate);
            true
        }
        _ => false,
    };

    EventMerge {
        event: merged,
        coordinate_changed,
    }
}

impl From<&TripRecord> for NewTrip {
    fn from(record: &TripRecord) -> Self {
        Self {
            name: record.name.clone(),
            cover_image: record.image_url.clone().map(CoverImage::Url),
            start_date: None,
            end_date: None,
            id: record.server_id,
        }
    }
}

impl From<&EventRecord> for NewEvent {
    fn from(record: &EventRecord) -> Self {
        Self {
            name: record.name.clone().unwrap_or_default(),
            coordinate: record.coordinate(),
            start_date: record.start_date(),
            notes: record.notes.clone(),
            image_url: record.image_url.clone(),
            id: record.server_id,
            ..Default::default()
        }
    }
}
