use chrono::{DateTime, Utc};
use native_db::{native_db, ToKey};
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

// ===== TRAITS =====

/// Server/local identity shared by local models and wire records.
pub trait Syncable {
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    fn id_local(&self) -> Option<String>;
    fn set_id_local(&mut self, id_local: String);

    fn sync_status(&self) -> SyncStatus {
        match self.id() {
            Some(_) => SyncStatus::Synced,
            None => SyncStatus::LocalOnly,
        }
    }
}

pub trait AncestorLocal {
    fn ancestor_id_local(&self) -> Option<String>;
    fn set_ancestor_id_local(&mut self, ancestor_id_local: String);
}

// ===== ENUMS =====

/// Where an entity stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No server id yet; offered to the server on every cycle until a create succeeds.
    LocalOnly,
    Synced,
}

/// Cover image of a trip. Only one representation is authoritative at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverImage {
    Data(Vec<u8>),
    Url(String),
}

impl CoverImage {
    pub fn url(&self) -> Option<&str> {
        match self {
            CoverImage::Url(url) => Some(url),
            CoverImage::Data(_) => None,
        }
    }
}

/// A latitude/longitude pair. Both halves are always set together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parses the string pair used on the wire. Returns `None` unless both halves parse.
    pub fn parse(latitude: &str, longitude: &str) -> Option<Self> {
        let latitude = latitude.trim().parse::<f64>().ok()?;
        let longitude = longitude.trim().parse::<f64>().ok()?;
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        Some(Self::new(latitude, longitude))
    }
}

// ===== DATA STRUCTURES =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct TripLocal {
    pub id: Option<i64>,
    #[primary_key]
    pub id_local: String,
    pub name: String,
    pub cover_image: Option<CoverImage>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for TripLocal {
    fn default() -> Self {
        Self {
            id: None,
            id_local: String::new(),
            name: String::new(),
            cover_image: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl Syncable for TripLocal {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn id_local(&self) -> Option<String> {
        Some(self.id_local.clone())
    }

    fn set_id_local(&mut self, id_local: String) {
        self.id_local = id_local;
    }
}

// First event layout, before categories and end dates were tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct EventLocal {
    pub id: Option<i64>,
    #[primary_key]
    pub id_local: String,
    #[secondary_key]
    pub trip_id_local: String,
    pub name: String,
    pub coordinate: Option<Coordinate>,
    pub address: Option<String>,
    pub location_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
}

impl Syncable for EventLocal {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn id_local(&self) -> Option<String> {
        Some(self.id_local.clone())
    }

    fn set_id_local(&mut self, id_local: String) {
        self.id_local = id_local;
    }
}

impl AncestorLocal for EventLocal {
    fn ancestor_id_local(&self) -> Option<String> {
        Some(self.trip_id_local.clone())
    }

    fn set_ancestor_id_local(&mut self, ancestor_id_local: String) {
        self.trip_id_local = ancestor_id_local;
    }
}
