//! Reconciliation between the local store and the trips backend.
//!
//! A cycle fetches the user's whole remote graph and the whole local graph,
//! joins them strictly by server id, and then:
//!
//! - updates local trips/events that exist on both sides (server wins),
//! - materializes server-only trips/events locally,
//! - offers local-only trips/events to the server.
//!
//! Entities without a server id are never matched by content. A failed create
//! leaves the entity without a server id, so the next cycle offers it again.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::client::RemoteClient;
use crate::error::{SyncError, SyncResult};
use crate::geocode::Geocoder;
use crate::merge::{merge_event, merge_trip};
use crate::models::{
    EventLocal, EventRecord, TripLocal, TripRecord, TripRecordWithEvents, TripSnapshot,
};
use crate::store::{LocalStore, NewEvent, NewTrip};

/// What to do locally when deleting something that exists on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete locally only after the server confirmed the delete.
    RemoteConfirmed,
    /// Delete locally whatever the server answered.
    Unconditional,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub trip_delete: DeletePolicy,
    pub event_delete: DeletePolicy,
}

impl Default for SyncOptions {
    // Trips and events historically disagree here; both are kept configurable.
    fn default() -> Self {
        Self {
            trip_delete: DeletePolicy::RemoteConfirmed,
            event_delete: DeletePolicy::Unconditional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDelete {
    /// The entity was never synced, nothing to delete remotely.
    Skipped,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_locally: bool,
    pub remote: RemoteDelete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub trips_materialized: usize,
    pub trips_updated: usize,
    pub trips_created_remote: usize,
    pub events_materialized: usize,
    pub events_updated: usize,
    pub events_created_remote: usize,
    pub locations_resolved: usize,
    /// Malformed remote data that was skipped
    pub anomalies: Vec<String>,
    /// Non-fatal failures; affected entities are retried next cycle
    pub failures: Vec<String>,
    pub duration_ms: u128,
}

impl SyncReport {
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "trips ↓{} ~{} ↑{} | events ↓{} ~{} ↑{} | ⚠{} ✗{}",
            self.trips_materialized,
            self.trips_updated,
            self.trips_created_remote,
            self.events_materialized,
            self.events_updated,
            self.events_created_remote,
            self.anomalies.len(),
            self.failures.len()
        )
    }

    /// Number of local writes the cycle performed.
    #[must_use]
    pub fn local_writes(&self) -> usize {
        self.trips_materialized
            + self.trips_updated
            + self.trips_created_remote
            + self.events_materialized
            + self.events_updated
            + self.events_created_remote
            + self.locations_resolved
    }

    fn absorb(&mut self, other: SyncReport) {
        self.trips_materialized += other.trips_materialized;
        self.trips_updated += other.trips_updated;
        self.trips_created_remote += other.trips_created_remote;
        self.events_materialized += other.events_materialized;
        self.events_updated += other.events_updated;
        self.events_created_remote += other.events_created_remote;
        self.locations_resolved += other.locations_resolved;
        self.anomalies.extend(other.anomalies);
        self.failures.extend(other.failures);
    }

    fn anomaly(&mut self, message: String) {
        warn!("Skipping remote data: {}", message);
        self.anomalies.push(message);
    }

    fn fail(&mut self, message: String) {
        warn!("{}", message);
        self.failures.push(message);
    }
}

/// Records a non-fatal failure in the report. Only cancellation propagates.
fn absorb_failure(report: &mut SyncReport, context: String, result: SyncResult<()>) -> SyncResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
        Err(e) => {
            report.fail(format!("{}: {}", context, e));
            Ok(())
        }
    }
}

/// Cooperative cancellation for a sync cycle. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

pub struct SyncEngine {
    store: Mutex<Box<dyn LocalStore>>,
    remote: Arc<dyn RemoteClient>,
    geocoder: Arc<dyn Geocoder>,
    user_id: String,
    options: SyncOptions,
    running: Mutex<()>,
    trips_tx: watch::Sender<Vec<TripSnapshot>>,
}

impl SyncEngine {
    pub fn new(
        store: Box<dyn LocalStore>,
        remote: Arc<dyn RemoteClient>,
        geocoder: Arc<dyn Geocoder>,
        user_id: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        let (trips_tx, _rx) = watch::channel(Vec::new());
        Self {
            store: Mutex::new(store),
            remote,
            geocoder,
            user_id: user_id.into(),
            options,
            running: Mutex::new(()),
            trips_tx,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Receives the merged local graph after every cycle and local edit.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TripSnapshot>> {
        self.trips_tx.subscribe()
    }

    /// Runs `f` against the store while holding the writer lock.
    pub async fn with_store<T>(&self, f: impl FnOnce(&dyn LocalStore) -> T) -> T {
        let store = self.store.lock().await;
        f(&**store)
    }

    /// The local graph: trips newest first, each with its events in date order.
    pub async fn snapshot(&self) -> SyncResult<Vec<TripSnapshot>> {
        let store = self.store.lock().await;
        let trips = store.fetch_trips()?;
        let mut snapshot = Vec::with_capacity(trips.len());
        for trip in trips {
            let events = store.fetch_events(&trip)?;
            snapshot.push(TripSnapshot { trip, events });
        }
        Ok(snapshot)
    }

    async fn publish(&self) -> SyncResult<()> {
        let snapshot = self.snapshot().await?;
        self.trips_tx.send_replace(snapshot);
        Ok(())
    }

    async fn guarded<T>(&self, cancel: &CancelToken, call: impl Future<Output = T>) -> SyncResult<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = call => Ok(result),
        }
    }

    // ===== SYNC CYCLE =====

    /// Runs one reconciliation cycle.
    ///
    /// Fails fast with [`SyncError::AlreadyRunning`] if another cycle is in
    /// flight. Per-entity failures do not fail the cycle; they are collected in
    /// the report.
    pub async fn load_and_sync(&self, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let start = Instant::now();
        let remote_trips = self
            .guarded(cancel, self.remote.fetch_all(&self.user_id))
            .await??;
        let local_trips = self.store.lock().await.fetch_trips()?;
        debug!(
            "Reconciling {} remote and {} local trip(s)",
            remote_trips.len(),
            local_trips.len()
        );

        let mut report = SyncReport::default();
        let (mut by_server_id, unsynced): (HashMap<i64, TripLocal>, Vec<TripLocal>) = {
            let mut by_server_id = HashMap::new();
            let mut unsynced = Vec::new();
            for trip in local_trips {
                match trip.id {
                    Some(id) => {
                        by_server_id.insert(id, trip);
                    }
                    None => unsynced.push(trip),
                }
            }
            (by_server_id, unsynced)
        };

        let mut seen = HashSet::new();
        let mut remote_work = Vec::new();
        for record in remote_trips {
            let Some(server_id) = record.trip.server_id else {
                report.anomaly(format!("trip \"{}\" has no server id", record.trip.name));
                continue;
            };
            if !seen.insert(server_id) {
                report.anomaly(format!("trip {} listed more than once", server_id));
                continue;
            }
            let local = by_server_id.remove(&server_id);
            remote_work.push(self.reconcile_remote_trip(server_id, local, record, cancel));
        }
        let push_work = unsynced
            .into_iter()
            .map(|trip| self.offer_local_trip(trip, cancel));

        let (remote_results, push_results) =
            futures::join!(join_all(remote_work), join_all(push_work));
        for result in remote_results.into_iter().chain(push_results) {
            report.absorb(result?);
        }

        self.publish().await?;
        report.duration_ms = start.elapsed().as_millis();
        info!("Sync finished in {}ms: {}", report.duration_ms, report.summary_line());
        Ok(report)
    }

    async fn reconcile_remote_trip(
        &self,
        server_id: i64,
        local: Option<TripLocal>,
        record: TripRecordWithEvents,
        cancel: &CancelToken,
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let result = self
            .sync_remote_trip(server_id, local, record, cancel, &mut report)
            .await;
        absorb_failure(&mut report, format!("trip {}", server_id), result)?;
        Ok(report)
    }

    async fn sync_remote_trip(
        &self,
        server_id: i64,
        local: Option<TripLocal>,
        record: TripRecordWithEvents,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let trip = match local {
            Some(local) => {
                let merged = merge_trip(&local, &record.trip);
                if merged != local {
                    self.store.lock().await.update_trip(&merged)?;
                    report.trips_updated += 1;
                    debug!("Updated trip {} from server", server_id);
                }
                merged
            }
            None => {
                let trip = self
                    .store
                    .lock()
                    .await
                    .create_trip(NewTrip::from(&record.trip))?;
                report.trips_materialized += 1;
                debug!("Materialized trip {} as {}", server_id, trip.id_local);
                trip
            }
        };

        let remote_events = match record.events {
            Some(events) => events,
            None => match self
                .guarded(cancel, self.remote.fetch_events(&self.user_id, server_id))
                .await?
            {
                Ok(events) => events,
                Err(e) => {
                    report.fail(format!("fetch events of trip {}: {}", server_id, e));
                    return Ok(());
                }
            },
        };

        self.sync_events(&trip, server_id, remote_events, cancel, report)
            .await
    }

    async fn offer_local_trip(&self, trip: TripLocal, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let context = format!("trip {}", trip.id_local);
        let result = self.push_trip(trip, cancel, &mut report).await;
        absorb_failure(&mut report, context, result)?;
        Ok(report)
    }

    async fn push_trip(
        &self,
        trip: TripLocal,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let record = TripRecord::for_create(&trip, &self.user_id);
        let created = match self.guarded(cancel, self.remote.create_trip(&record)).await? {
            Ok(created) => created,
            Err(e) => {
                report.fail(format!("create trip {} on server: {}", trip.id_local, e));
                return Ok(());
            }
        };
        let Some(server_id) = created.server_id else {
            report.fail(format!(
                "create trip {} on server: response carried no id",
                trip.id_local
            ));
            return Ok(());
        };

        let trip = self
            .store
            .lock()
            .await
            .set_trip_server_id(&trip, server_id)?;
        report.trips_created_remote += 1;
        info!("Created trip {} on server as {}", trip.id_local, server_id);

        let events = self.store.lock().await.fetch_events(&trip)?;
        for event in events.into_iter().filter(|e| e.id.is_none()) {
            let context = format!("event {}", event.id_local);
            let result = self.push_event(&event, server_id, cancel, report).await;
            absorb_failure(report, context, result)?;
        }
        Ok(())
    }

    async fn sync_events(
        &self,
        trip: &TripLocal,
        trip_server_id: i64,
        remote_events: Vec<EventRecord>,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let local_events = self.store.lock().await.fetch_events(trip)?;
        let mut by_server_id = HashMap::new();
        let mut unsynced = Vec::new();
        for event in local_events {
            match event.id {
                Some(id) => {
                    by_server_id.insert(id, event);
                }
                None => unsynced.push(event),
            }
        }

        let mut seen = HashSet::new();
        for record in remote_events {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(server_id) = record.server_id else {
                report.anomaly(format!("event in trip {} has no server id", trip_server_id));
                continue;
            };
            if !seen.insert(server_id) {
                report.anomaly(format!(
                    "event {} listed more than once in trip {}",
                    server_id, trip_server_id
                ));
                continue;
            }
            if record.has_partial_coordinate() {
                report.anomaly(format!(
                    "event {} has an incomplete coordinate, ignoring it",
                    server_id
                ));
            }

            let result = match by_server_id.remove(&server_id) {
                Some(local) => self.update_local_event(local, &record, cancel, report).await,
                None => self.materialize_event(trip, &record, cancel, report).await,
            };
            absorb_failure(report, format!("event {}", server_id), result)?;
        }

        for event in unsynced {
            let context = format!("event {}", event.id_local);
            let result = self.push_event(&event, trip_server_id, cancel, report).await;
            absorb_failure(report, context, result)?;
        }
        Ok(())
    }

    async fn update_local_event(
        &self,
        local: EventLocal,
        record: &EventRecord,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let merge = merge_event(&local, record);
        let event = merge.event;
        if event != local {
            self.store.lock().await.update_event(&event)?;
            report.events_updated += 1;
            debug!("Updated event {} from server", event.id_local);
        }
        if merge.coordinate_changed {
            self.resolve_location(event, cancel, report).await?;
        }
        Ok(())
    }

    async fn materialize_event(
        &self,
        trip: &TripLocal,
        record: &EventRecord,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let event = self
            .store
            .lock()
            .await
            .create_event(trip, NewEvent::from(record))?;
        report.events_materialized += 1;
        debug!("Materialized event {:?} as {}", record.server_id, event.id_local);
        self.resolve_location(event, cancel, report).await?;
        Ok(())
    }

    async fn push_event(
        &self,
        event: &EventLocal,
        trip_server_id: i64,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let record = EventRecord::for_create(event, trip_server_id);
        let created = match self.guarded(cancel, self.remote.create_event(&record)).await? {
            Ok(created) => created,
            Err(e) => {
                report.fail(format!("create event {} on server: {}", event.id_local, e));
                return Ok(());
            }
        };
        let Some(server_id) = created.server_id else {
            report.fail(format!(
                "create event {} on server: response carried no id",
                event.id_local
            ));
            return Ok(());
        };

        self.store
            .lock()
            .await
            .set_event_server_id(event, server_id)?;
        report.events_created_remote += 1;
        debug!("Created event {} on server as {}", event.id_local, server_id);
        Ok(())
    }

    /// Re-derives address and location name from the event's coordinate and
    /// persists them. Geocoding failures leave the previous values in place.
    async fn resolve_location(
        &self,
        mut event: EventLocal,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<EventLocal> {
        let Some(coordinate) = event.coordinate else {
            return Ok(event);
        };

        match self
            .guarded(cancel, self.geocoder.reverse_geocode(coordinate))
            .await?
        {
            Ok(Some(place)) => {
                if event.address != place.address || event.location_name != place.location_name {
                    event.address = place.address;
                    event.location_name = place.location_name;
                    event = self.store.lock().await.update_event(&event)?;
                    report.locations_resolved += 1;
                }
            }
            Ok(None) => debug!("No place found for event {}", event.id_local),
            Err(e) => warn!(
                "Reverse geocoding failed for event {}: {}",
                event.id_local, e
            ),
        }
        Ok(event)
    }

    // ===== LOCAL EDITS =====

    /// Creates a trip locally. It reaches the server on the next cycle.
    pub async fn create_trip(&self, new: NewTrip) -> SyncResult<TripLocal> {
        let trip = self.store.lock().await.create_trip(new)?;
        self.publish().await?;
        Ok(trip)
    }

    /// Creates an event locally and resolves its address when it has a coordinate.
    pub async fn create_event(&self, trip: &TripLocal, new: NewEvent) -> SyncResult<EventLocal> {
        let event = self.store.lock().await.create_event(trip, new)?;
        let event = self
            .resolve_location(event, &CancelToken::new(), &mut SyncReport::default())
            .await?;
        self.publish().await?;
        Ok(event)
    }

    /// Persists a user edit and pushes it when the trip is already synced.
    /// A failed push is only logged; the next cycle restores the server's values.
    pub async fn save_trip(&self, trip: &TripLocal) -> SyncResult<TripLocal> {
        let saved = self.store.lock().await.update_trip(trip)?;
        if saved.id.is_some() {
            let record = TripRecord::for_update(&saved, &self.user_id);
            if let Err(e) = self.remote.update_trip(&record).await {
                warn!("Failed to push trip {} to server: {}", saved.id_local, e);
            }
        }
        self.publish().await?;
        Ok(saved)
    }

    /// Persists a user edit, re-derives the address when the coordinate moved,
    /// and pushes the event when it is already synced.
    pub async fn save_event(&self, event: &EventLocal) -> SyncResult<EventLocal> {
        let (previous, trip) = {
            let store = self.store.lock().await;
            (
                store.get_event(&event.id_local)?,
                store.get_trip(&event.trip_id_local)?,
            )
        };
        let mut saved = self.store.lock().await.update_event(event)?;

        let moved = previous.map(|p| p.coordinate) != Some(saved.coordinate);
        if moved {
            saved = self
                .resolve_location(saved, &CancelToken::new(), &mut SyncReport::default())
                .await?;
        }

        if let (Some(_), Some(trip_server_id)) = (saved.id, trip.and_then(|t| t.id)) {
            let record = EventRecord::for_update(&saved, trip_server_id);
            if let Err(e) = self.remote.update_event(&record).await {
                warn!("Failed to push event {} to server: {}", saved.id_local, e);
            }
        }
        self.publish().await?;
        Ok(saved)
    }

    // ===== DELETION =====

    /// Deletes a trip and its events.
    ///
    /// Synced events are deleted remotely first (best effort, all attempted),
    /// then the trip itself. Whether the local delete waits for the server is
    /// governed by [`SyncOptions::trip_delete`].
    ///
    /// The stored trip decides the path, so a caller's copy taken before a
    /// cycle assigned the server id still deletes remotely.
    pub async fn delete_trip(&self, trip: &TripLocal) -> SyncResult<DeleteOutcome> {
        let Some(trip) = self.store.lock().await.get_trip(&trip.id_local)? else {
            debug!("Trip {} is already gone locally", trip.id_local);
            return Ok(DeleteOutcome {
                deleted_locally: false,
                remote: RemoteDelete::Skipped,
            });
        };
        let trip = &trip;

        let Some(server_id) = trip.id else {
            self.store.lock().await.delete_trip(trip)?;
            self.publish().await?;
            return Ok(DeleteOutcome {
                deleted_locally: true,
                remote: RemoteDelete::Skipped,
            });
        };

        let events = self.store.lock().await.fetch_events(trip)?;
        let event_deletes = events.iter().filter_map(|e| e.id).map(|id| async move {
            (id, self.remote.delete_event(id).await)
        });
        for (id, result) in join_all(event_deletes).await {
            if let Err(e) = result {
                warn!(
                    "Failed to delete event {} of trip {} on server: {}",
                    id, server_id, e
                );
            }
        }

        let remote = match self.remote.delete_trip(server_id).await {
            Ok(()) => RemoteDelete::Confirmed,
            Err(e) => {
                warn!("Failed to delete trip {} on server: {}", server_id, e);
                RemoteDelete::Failed(e.to_string())
            }
        };

        let deleted_locally = remote == RemoteDelete::Confirmed
            || self.options.trip_delete == DeletePolicy::Unconditional;
        if deleted_locally {
            self.store.lock().await.delete_trip(trip)?;
            self.publish().await?;
        } else {
            info!("Keeping trip {} locally until the server delete succeeds", trip.id_local);
        }

        Ok(DeleteOutcome {
            deleted_locally,
            remote,
        })
    }

    /// Deletes an event. With the default [`DeletePolicy::Unconditional`] the
    /// local delete happens even when the server delete fails.
    pub async fn delete_event(&self, event: &EventLocal) -> SyncResult<DeleteOutcome> {
        let Some(event) = self.store.lock().await.get_event(&event.id_local)? else {
            debug!("Event {} is already gone locally", event.id_local);
            return Ok(DeleteOutcome {
                deleted_locally: false,
                remote: RemoteDelete::Skipped,
            });
        };
        let event = &event;

        let remote = match event.id {
            None => RemoteDelete::Skipped,
            Some(server_id) => match self.remote.delete_event(server_id).await {
                Ok(()) => RemoteDelete::Confirmed,
                Err(e) => {
                    warn!("Failed to delete event {} on server: {}", server_id, e);
                    RemoteDelete::Failed(e.to_string())
                }
            },
        };

        let deleted_locally = !matches!(remote, RemoteDelete::Failed(_))
            || self.options.event_delete == DeletePolicy::Unconditional;
        if deleted_locally {
            self.store.lock().await.delete_event(event)?;
            self.publish().await?;
        }

        Ok(DeleteOutcome {
            deleted_locally,
            remote,
        })
    }
}
