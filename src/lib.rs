//! Offline-first trips and events, reconciled with a trips REST backend.

pub mod client;
pub mod config;
pub mod error;
pub mod geocode;
pub mod merge;
pub mod models;
pub mod store;
pub mod sync;

pub use client::{RemoteClient, TripsApiClient};
pub use config::SyncConfig;
pub use error::{RemoteError, SyncError, SyncResult};
pub use geocode::{Geocoder, NoopGeocoder, Placemark};
pub use store::{LocalStore, NativeStore, NewEvent, NewTrip};
pub use sync::{CancelToken, DeleteOutcome, DeletePolicy, RemoteDelete, SyncEngine, SyncOptions, SyncReport};
