pub mod dates;
pub mod records;
pub mod serde_helpers;
pub mod v1;
pub mod v2;

// ===== VERSIONED MODELS FOLLOWING NATIVE_DB PATTERN =====
// Following the pattern from the native_db documentation:
// https://docs.rs/native_db/latest/native_db/

pub mod data {
    // Type aliases pointing to the latest versions
    pub type EventLocal = super::v2::EventLocal; // Event v2 with category and end date

    // Models that haven't changed stay at v1
    pub type TripLocal = super::v1::TripLocal;

    // Re-export versioned modules for direct access
    pub use super::{v1, v2};
}

pub use data::*;

pub use records::{EventRecord, TripRecord, TripRecordWithEvents};
pub use v1::{AncestorLocal, Coordinate, CoverImage, SyncStatus, Syncable};
pub use v2::EventCategory;

/// A trip together with its events, ordered by start date.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TripSnapshot {
    pub trip: TripLocal,
    pub events: Vec<EventLocal>,
}
