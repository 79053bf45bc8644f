// Wire records exchanged with the trips backend.
//
// The backend echoes a record's own id back as `id` but expects it as
// `trip_id` / `item_id` in request bodies, hence the split renames.

use serde::{Deserialize, Serialize};

use super::dates::{format_wire_date, parse_wire_date};
use super::serde_helpers::deserialize_number_string;
use super::v1::{Coordinate, Syncable};
use super::v2::{EventLocal, TripLocal};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(
        rename(serialize = "trip_id", deserialize = "id"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "trip_name", default)]
    pub name: String,
    #[serde(rename = "img_url", default)]
    pub image_url: Option<String>,
}

impl TripRecord {
    /// Body for `POST /trips/`: no server id yet, owned by `user_id`.
    pub fn for_create(trip: &TripLocal, user_id: &str) -> Self {
        Self {
            server_id: None,
            user_id: Some(user_id.to_string()),
            name: trip.name.clone(),
            image_url: trip.cover_image.as_ref().and_then(|c| c.url()).map(str::to_string),
        }
    }

    /// Body for `PUT /trips/`.
    pub fn for_update(trip: &TripLocal, user_id: &str) -> Self {
        Self {
            server_id: trip.id,
            ..Self::for_create(trip, user_id)
        }
    }

    /// Body for `DELETE /trips/`.
    pub fn for_delete(server_id: i64) -> Self {
        Self {
            server_id: Some(server_id),
            ..Default::default()
        }
    }
}

/// A trip as returned by the `all` endpoint, with its events nested under `items`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TripRecordWithEvents {
    #[serde(flatten)]
    pub trip: TripRecord,
    #[serde(rename = "items", default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventRecord>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(
        rename(serialize = "item_id", deserialize = "id"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(rename = "item_name", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(rename = "img_url", default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number_string")]
    pub lat: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number_string")]
    pub lon: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl EventRecord {
    /// Body for `POST /items/` under the trip with server id `trip_id`.
    pub fn for_create(event: &EventLocal, trip_id: i64) -> Self {
        Self {
            server_id: None,
            trip_id: Some(trip_id),
            name: Some(event.name.clone()),
            notes: event.notes.clone(),
            image_url: event.image_url.clone(),
            lat: event.coordinate.map(|c| c.latitude.to_string()),
            lon: event.coordinate.map(|c| c.longitude.to_string()),
            date: event.start_date.as_ref().map(format_wire_date),
        }
    }

    /// Body for `PUT /items/`.
    pub fn for_update(event: &EventLocal, trip_id: i64) -> Self {
        Self {
            server_id: event.id,
            ..Self::for_create(event, trip_id)
        }
    }

    /// Body for `DELETE /items/`.
    pub fn for_delete(server_id: i64) -> Self {
        Self {
            server_id: Some(server_id),
            ..Default::default()
        }
    }

    /// The record's coordinate, when both halves are present and numeric.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (&self.lat, &self.lon) {
            (Some(lat), Some(lon)) => Coordinate::parse(lat, lon),
            _ => None,
        }
    }

    /// True when the record carries coordinate data that cannot form a coordinate.
    pub fn has_partial_coordinate(&self) -> bool {
        (self.lat.is_some() || self.lon.is_some()) && self.coordinate().is_none()
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(parse_wire_date)
    }
}

impl Syncable for TripRecord {
    fn id(&self) -> Option<i64> {
        self.server_id
    }

    fn set_id(&mut self, id: i64) {
        self.server_id = Some(id);
    }

    fn id_local(&self) -> Option<String> {
        None
    }

    fn set_id_local(&mut self, _id_local: String) {}
}

impl Syncable for EventRecord {
    fn id(&self) -> Option<i64> {
        self.server_id
    }

    fn set_id(&mut self, id: i64) {
        self.server_id = Some(id);
    }

    fn id_local(&self) -> Option<String> {
        None
    }

    fn set_id_local(&mut self, _id_local: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CoverImage;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn trip_record_decodes_id_and_encodes_trip_id() {
        let record: TripRecord = serde_json::from_value(json!({
            "id": 42,
            "trip_name": "Paris",
            "img_url": "https://img.example/paris.jpg"
        }))
        .unwrap();
        assert_eq!(record.server_id, Some(42));
        assert_eq!(record.name, "Paris");

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["trip_id"], json!(42));
        assert!(encoded.get("id").is_none());
        assert_eq!(encoded["trip_name"], json!("Paris"));
        assert_eq!(encoded["img_url"], json!("https://img.example/paris.jpg"));
    }

    #[test]
    fn event_record_decodes_id_and_encodes_item_id() {
        let record: EventRecord = serde_json::from_value(json!({
            "id": 9,
            "trip_id": 42,
            "item_name": "Louvre",
            "lat": 48.8606,
            "lon": "2.3376",
            "date": "2024-05-01T10:30:00.000+00:00"
        }))
        .unwrap();
        assert_eq!(record.server_id, Some(9));
        assert_eq!(record.coordinate(), Some(Coordinate::new(48.8606, 2.3376)));
        assert_eq!(
            record.start_date(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())
        );

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["item_id"], json!(9));
        assert!(encoded.get("id").is_none());
        assert_eq!(encoded["item_name"], json!("Louvre"));
        assert_eq!(encoded["lat"], json!("48.8606"));
    }

    #[test]
    fn nested_events_decode_under_items() {
        let record: TripRecordWithEvents = serde_json::from_value(json!({
            "id": 1,
            "trip_name": "Rome",
            "img_url": null,
            "items": [{ "id": 2, "item_name": "Colosseum" }]
        }))
        .unwrap();
        assert_eq!(record.trip.server_id, Some(1));
        assert_eq!(record.events.as_ref().map(Vec::len), Some(1));

        let bare: TripRecordWithEvents =
            serde_json::from_value(json!({ "id": 3, "trip_name": "Oslo" })).unwrap();
        assert_eq!(bare.events, None);
    }

    #[test]
    fn create_bodies_carry_owner_and_omit_server_id() {
        let trip = TripLocal {
            id_local: "t1".to_string(),
            name: "Paris".to_string(),
            cover_image: Some(CoverImage::Data(vec![1, 2, 3])),
            ..Default::default()
        };
        let encoded = serde_json::to_value(TripRecord::for_create(&trip, "user-7")).unwrap();
        assert_eq!(encoded["user_id"], json!("user-7"));
        assert!(encoded.get("trip_id").is_none());
        assert_eq!(encoded["img_url"], json!(null));

        let event = EventLocal {
            name: "Dinner".to_string(),
            coordinate: Some(Coordinate::new(48.5, 2.25)),
            start_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap()),
            ..Default::default()
        };
        let encoded = serde_json::to_value(EventRecord::for_create(&event, 42)).unwrap();
        assert_eq!(encoded["trip_id"], json!(42));
        assert!(encoded.get("item_id").is_none());
        assert_eq!(encoded["lon"], json!("2.25"));
        assert_eq!(encoded["date"], json!("2024-05-01T19:00:00.000+00:00"));
    }

    #[test]
    fn half_coordinates_are_flagged() {
        let record = EventRecord {
            lat: Some("48.1".to_string()),
            ..Default::default()
        };
        assert!(record.has_partial_coordinate());
        assert_eq!(record.coordinate(), None);
    }
}
