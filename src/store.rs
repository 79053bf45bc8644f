//! Local store for trips and events, backed by native_db.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use native_db::{Builder, Database, Models};
use once_cell::sync::Lazy;
use tracing::debug;
use uuid::Uuid;

use crate::models::dates::to_wire_precision;
use crate::models::v2::EventLocalKey;
use crate::models::{v1, v2, Coordinate, CoverImage, EventCategory, EventLocal, TripLocal};

static MODELS: Lazy<Models> = Lazy::new(|| {
    let mut models = Models::new();
    models
        .define::<v1::TripLocal>()
        .expect("TripLocal v1 model definition");
    models
        .define::<v1::EventLocal>()
        .expect("EventLocal v1 model definition");
    models
        .define::<v2::EventLocal>()
        .expect("EventLocal v2 model definition");
    models
});

/// Fields of a trip about to be created. `id` is the server id when the trip
/// is materialized from a remote record.
#[derive(Debug, Clone, Default)]
pub struct NewTrip {
    pub name: String,
    pub cover_image: Option<CoverImage>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub name: String,
    pub location_name: Option<String>,
    pub category: EventCategory,
    pub coordinate: Option<Coordinate>,
    pub address: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub id: Option<i64>,
}

/// CRUD over the user's trips and events.
///
/// Implementations must keep a server id stable once assigned and cascade trip
/// deletion to the trip's events.
pub trait LocalStore: Send + Sync {
    fn create_trip(&self, new: NewTrip) -> Result<TripLocal>;
    fn create_event(&self, trip: &TripLocal, new: NewEvent) -> Result<EventLocal>;

    /// Persists the in-memory state of an existing trip.
    fn update_trip(&self, trip: &TripLocal) -> Result<TripLocal>;
    fn update_event(&self, event: &EventLocal) -> Result<EventLocal>;

    fn delete_trip(&self, trip: &TripLocal) -> Result<()>;
    fn delete_event(&self, event: &EventLocal) -> Result<()>;

    fn get_trip(&self, id_local: &str) -> Result<Option<TripLocal>>;
    fn get_event(&self, id_local: &str) -> Result<Option<EventLocal>>;

    /// All trips, newest start date first, then by name. Undated trips sort last.
    fn fetch_trips(&self) -> Result<Vec<TripLocal>>;
    /// Events of one trip, earliest start date first, then by name. Undated events sort last.
    fn fetch_events(&self, trip: &TripLocal) -> Result<Vec<EventLocal>>;

    fn set_trip_server_id(&self, trip: &TripLocal, id: i64) -> Result<TripLocal>;
    fn set_event_server_id(&self, event: &EventLocal, id: i64) -> Result<EventLocal>;
}

pub fn sort_trips(trips: &mut [TripLocal]) {
    trips.sort_by(|a, b| {
        match (&a.start_date, &b.start_date) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.name.cmp(&b.name))
    });
}

pub fn sort_events(events: &mut [EventLocal]) {
    events.sort_by(|a, b| {
        match (&a.start_date, &b.start_date) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.name.cmp(&b.name))
    });
}

fn check_server_id(kind: &str, id_local: &str, stored: Option<i64>, next: Option<i64>) -> Result<()> {
    match (stored, next) {
        (Some(stored), Some(next)) if stored != next => bail!(
            "{} {} already has server id {}, refusing to change it to {}",
            kind,
            id_local,
            stored,
            next
        ),
        (Some(stored), None) => bail!(
            "{} {} already has server id {}, refusing to clear it",
            kind,
            id_local,
            stored
        ),
        _ => Ok(()),
    }
}

// Stored dates are kept at wire precision so a pushed entity reads back unchanged.
fn trip_at_wire_precision(mut trip: TripLocal) -> TripLocal {
    trip.start_date = trip.start_date.map(to_wire_precision);
    trip.end_date = trip.end_date.map(to_wire_precision);
    trip
}

fn event_at_wire_precision(mut event: EventLocal) -> EventLocal {
    event.start_date = event.start_date.map(to_wire_precision);
    event.end_date = event.end_date.map(to_wire_precision);
    event
}

pub struct NativeStore {
    database: Database<'static>,
}

impl NativeStore {
    /// Opens (or creates) a store file and migrates older model versions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let database = Builder::new().create(&MODELS, path.as_ref())?;
        let store = Self { database };
        store.migrate()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let database = Builder::new().create_in_memory(&MODELS)?;
        Ok(Self { database })
    }

    fn migrate(&self) -> Result<()> {
        let rw = self.database.rw_transaction()?;
        rw.migrate::<EventLocal>()?;
        rw.commit()?;
        Ok(())
    }

    fn events_of(&self, trip_id_local: &str) -> Result<Vec<EventLocal>> {
        let r = self.database.r_transaction()?;
        let key = trip_id_local.to_string();
        let events = r
            .scan()
            .secondary::<EventLocal>(EventLocalKey::trip_id_local)?
            .range(key.clone()..=key)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl LocalStore for NativeStore {
    fn create_trip(&self, new: NewTrip) -> Result<TripLocal> {
        let trip = trip_at_wire_precision(TripLocal {
            id: new.id,
            id_local: Uuid::new_v4().to_string(),
            name: new.name,
            cover_image: new.cover_image,
            start_date: new.start_date,
            end_date: new.end_date,
        });

        let rw = self.database.rw_transaction()?;
        rw.insert(trip.clone())?;
        rw.commit()?;

        debug!("Created trip {} ({:?})", trip.id_local, trip.id);
        Ok(trip)
    }

    fn create_event(&self, trip: &TripLocal, new: NewEvent) -> Result<EventLocal> {
        let event = event_at_wire_precision(EventLocal {
            id: new.id,
            id_local: Uuid::new_v4().to_string(),
            trip_id_local: trip.id_local.clone(),
            name: new.name,
            coordinate: new.coordinate,
            address: new.address,
            location_name: new.location_name,
            start_date: new.start_date,
            notes: new.notes,
            image_url: new.image_url,
            category: new.category,
            end_date: new.end_date,
        });

        let rw = self.database.rw_transaction()?;
        if rw.get().primary::<TripLocal>(trip.id_local.clone())?.is_none() {
            bail!("Cannot add event to unknown trip {}", trip.id_local);
        }
        rw.insert(event.clone())?;
        rw.commit()?;

        debug!(
            "Created event {} ({:?}) in trip {}",
            event.id_local, event.id, event.trip_id_local
        );
        Ok(event)
    }

    fn update_trip(&self, trip: &TripLocal) -> Result<TripLocal> {
        let rw = self.database.rw_transaction()?;
        let stored = rw
            .get()
            .primary::<TripLocal>(trip.id_local.clone())?
            .ok_or_else(|| anyhow!("Trip {} not found", trip.id_local))?;
        check_server_id("Trip", &trip.id_local, stored.id, trip.id)?;
        let trip = trip_at_wire_precision(trip.clone());
        rw.upsert(trip.clone())?;
        rw.commit()?;
        Ok(trip)
    }

    fn update_event(&self, event: &EventLocal) -> Result<EventLocal> {
        let rw = self.database.rw_transaction()?;
        let stored = rw
            .get()
            .primary::<EventLocal>(event.id_local.clone())?
            .ok_or_else(|| anyhow!("Event {} not found", event.id_local))?;
        check_server_id("Event", &event.id_local, stored.id, event.id)?;
        if stored.trip_id_local != event.trip_id_local {
            bail!(
                "Event {} belongs to trip {}, not {}",
                event.id_local,
                stored.trip_id_local,
                event.trip_id_local
            );
        }
        let event = event_at_wire_precision(event.clone());
        rw.upsert(event.clone())?;
        rw.commit()?;
        Ok(event)
    }

    fn delete_trip(&self, trip: &TripLocal) -> Result<()> {
        let rw = self.database.rw_transaction()?;
        let stored = rw.get().primary::<TripLocal>(trip.id_local.clone())?;
        let key = trip.id_local.clone();
        let events = rw
            .scan()
            .secondary::<EventLocal>(EventLocalKey::trip_id_local)?
            .range(key.clone()..=key)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed_events = 0;
        for event in events {
            rw.remove(event)?;
            removed_events += 1;
        }
        if let Some(stored) = stored {
            rw.remove(stored)?;
        }
        rw.commit()?;

        debug!(
            "Deleted trip {} and {} event(s)",
            trip.id_local, removed_events
        );
        Ok(())
    }

    fn delete_event(&self, event: &EventLocal) -> Result<()> {
        let rw = self.database.rw_transaction()?;
        if let Some(stored) = rw.get().primary::<EventLocal>(event.id_local.clone())? {
            rw.remove(stored)?;
        }
        rw.commit()?;
        Ok(())
    }

    fn get_trip(&self, id_local: &str) -> Result<Option<TripLocal>> {
        let r = self.database.r_transaction()?;
        Ok(r.get().primary::<TripLocal>(id_local.to_string())?)
    }

    fn get_event(&self, id_local: &str) -> Result<Option<EventLocal>> {
        let r = self.database.r_transaction()?;
        Ok(r.get().primary::<EventLocal>(id_local.to_string())?)
    }

    fn fetch_trips(&self) -> Result<Vec<TripLocal>> {
        let r = self.database.r_transaction()?;
        let mut trips = r
            .scan()
            .primary::<TripLocal>()?
            .all()?
            .collect::<Result<Vec<_>, _>>()?;
        sort_trips(&mut trips);
        Ok(trips)
    }

    fn fetch_events(&self, trip: &TripLocal) -> Result<Vec<EventLocal>> {
        let mut events = self.events_of(&trip.id_local)?;
        sort_events(&mut events);
        Ok(events)
    }

    fn set_trip_server_id(&self, trip: &TripLocal, id: i64) -> Result<TripLocal> {
        let rw = self.database.rw_transaction()?;
        let mut stored = rw
            .get()
            .primary::<TripLocal>(trip.id_local.clone())?
            .ok_or_else(|| anyhow!("Trip {} not found", trip.id_local))?;
        check_server_id("Trip", &trip.id_local, stored.id, Some(id))?;
        stored.id = Some(id);
        rw.upsert(stored.clone())?;
        rw.commit()?;
        Ok(stored)
    }

    fn set_event_server_id(&self, event: &EventLocal, id: i64) -> Result<EventLocal> {
        let rw = self.database.rw_transaction()?;
        let mut stored = rw
            .get()
            .primary::<EventLocal>(event.id_local.clone())?
            .ok_or_else(|| anyhow!("Event {} not found", event.id_local))?;
        check_server_id("Event", &event.id_local, stored.id, Some(id))?;
        stored.id = Some(id);
        rw.upsert(stored.clone())?;
        rw.commit()?;
        Ok(stored)
    }
}
