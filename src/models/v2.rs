use chrono::{DateTime, Utc};
use native_db::{native_db, ToKey};
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

// Re-export all unchanged models from v1
pub use super::v1::{AncestorLocal, Coordinate, CoverImage, SyncStatus, Syncable, TripLocal};

/// Kind of place an event happens at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    #[default]
    NotSpecified,
    Accommodation,
    Restaurant,
    Cafe,
    Bar,
    Museum,
    Landmark,
    Park,
    Beach,
    Shopping,
    Nightlife,
    Entertainment,
    Airport,
    TrainStation,
    Transit,
    Other,
}

impl From<&str> for EventCategory {
    fn from(s: &str) -> Self {
        match s {
            "accommodation" | "hotel" => EventCategory::Accommodation,
            "restaurant" => EventCategory::Restaurant,
            "cafe" => EventCategory::Cafe,
            "bar" => EventCategory::Bar,
            "museum" => EventCategory::Museum,
            "landmark" => EventCategory::Landmark,
            "park" => EventCategory::Park,
            "beach" => EventCategory::Beach,
            "shopping" => EventCategory::Shopping,
            "nightlife" => EventCategory::Nightlife,
            "entertainment" => EventCategory::Entertainment,
            "airport" => EventCategory::Airport,
            "train_station" => EventCategory::TrainStation,
            "transit" => EventCategory::Transit,
            "other" => EventCategory::Other,
            _ => EventCategory::NotSpecified,
        }
    }
}

// ===== EVENT V2 WITH CATEGORY AND END DATE =====
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 2, from = super::v1::EventLocal)]
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
    // NEW FIELDS IN V2
    pub category: EventCategory,
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for EventLocal {
    fn default() -> Self {
        Self {
            id: None,
            id_local: String::new(),
            trip_id_local: String::new(),
            name: String::new(),
            coordinate: None,
            address: None,
            location_name: None,
            start_date: None,
            notes: None,
            image_url: None,
            category: EventCategory::NotSpecified,
            end_date: None,
        }
    }
}

impl EventLocal {
    /// The name shown for the event: its own name, or the resolved location name when blank.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.location_name.as_deref().unwrap_or("")
        } else {
            &self.name
        }
    }
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

impl From<super::v1::EventLocal> for EventLocal {
    fn from(v1: super::v1::EventLocal) -> Self {
        Self {
            id: v1.id,
            id_local: v1.id_local,
            trip_id_local: v1.trip_id_local,
            name: v1.name,
            coordinate: v1.coordinate,
            address: v1.address,
            location_name: v1.location_name,
            start_date: v1.start_date,
            notes: v1.notes,
            image_url: v1.image_url,
            category: EventCategory::NotSpecified,
            end_date: None,
        }
    }
}

impl From<EventLocal> for super::v1::EventLocal {
    fn from(v2: EventLocal) -> Self {
        Self {
            id: v2.id,
            id_local: v2.id_local,
            trip_id_local: v2.trip_id_local,
            name: v2.name,
            coordinate: v2.coordinate,
            address: v2.address,
            location_name: v2.location_name,
            start_date: v2.start_date,
            notes: v2.notes,
            image_url: v2.image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_location_name() {
        let mut event = EventLocal {
            name: "  ".to_string(),
            location_name: Some("Louvre".to_string()),
            ..Default::default()
        };
        assert_eq!(event.display_name(), "Louvre");

        event.name = "Mona Lisa".to_string();
        assert_eq!(event.display_name(), "Mona Lisa");
    }

    #[test]
    fn v1_events_upgrade_with_unspecified_category() {
        let v1 = super::super::v1::EventLocal {
            id: Some(7),
            id_local: "e1".to_string(),
            trip_id_local: "t1".to_string(),
            name: "Dinner".to_string(),
            coordinate: Some(Coordinate::new(1.0, 2.0)),
            address: None,
            location_name: None,
            start_date: None,
            notes: Some("window seat".to_string()),
            image_url: None,
        };

        let v2 = EventLocal::from(v1.clone());
        assert_eq!(v2.category, EventCategory::NotSpecified);
        assert_eq!(v2.end_date, None);
        assert_eq!(v2.notes.as_deref(), Some("window seat"));

        let back: super::super::v1::EventLocal = v2.into();
        assert_eq!(back, v1);
    }

    #[test]
    fn unknown_category_strings_are_not_specified() {
        assert_eq!(EventCategory::from("museum"), EventCategory::Museum);
        assert_eq!(EventCategory::from("hotel"), EventCategory::Accommodation);
        assert_eq!(EventCategory::from("volcano"), EventCategory::NotSpecified);
    }
}
