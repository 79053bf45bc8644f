use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tripsync::models::{Coordinate, EventLocal, TripLocal};
use tripsync::{RemoteClient, RemoteError, TripsApiClient};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// # Trips API Client Integration Tests
///
/// Runs the HTTP client against a local mock backend and checks paths,
/// verbs, auth header and body keys, plus the error taxonomy.
///
/// ```bash
/// cargo test --test client_integration_test
/// ```

const TOKEN: &str = "test-token";

fn client_for(server: &MockServer, token: Option<&str>) -> TripsApiClient {
    TripsApiClient::with_base_url(
        Url::parse(&server.uri()).unwrap(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn paris() -> TripLocal {
    TripLocal {
        id_local: "t1".to_string(),
        name: "Paris".to_string(),
        ..Default::default()
    }
}

fn louvre() -> EventLocal {
    EventLocal {
        id_local: "e1".to_string(),
        trip_id_local: "t1".to_string(),
        name: "Louvre".to_string(),
        coordinate: Some(Coordinate::new(48.8606, 2.3376)),
        start_date: Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_fetch_all_decodes_nested_events() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trips/u1/all/"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 42,
                "trip_name": "Paris",
                "img_url": "https://img/paris.jpg",
                "items": [
                    {
                        "id": 9,
                        "trip_id": 42,
                        "item_name": "Louvre",
                        "lat": 48.8606,
                        "lon": "2.3376",
                        "date": "2024-05-02T09:00:00.000+00:00"
                    }
                ]
            },
            { "id": 43, "trip_name": "Rome" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let trips = client_for(&server, Some(TOKEN)).fetch_all("u1").await.unwrap();

    assert_eq!(trips.len(), 2);
    assert_eq!(trips[0].trip.server_id, Some(42));
    assert_eq!(trips[0].trip.image_url.as_deref(), Some("https://img/paris.jpg"));
    let events = trips[0].events.as_ref().unwrap();
    assert_eq!(events[0].server_id, Some(9));
    assert_eq!(events[0].coordinate(), Some(Coordinate::new(48.8606, 2.3376)));
    assert_eq!(
        events[0].start_date(),
        Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap())
    );
    // No nested list means the events must be fetched per trip
    assert_eq!(trips[1].events, None);
}

#[tokio::test]
async fn test_fetch_events_uses_trip_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trips/u1/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 9, "trip_id": 42, "item_name": "Louvre" },
            { "id": 10, "trip_id": 42, "item_name": null }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let events = client_for(&server, Some(TOKEN))
        .fetch_events("u1", 42)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].name, None);
}

#[tokio::test]
async fn test_create_trip_sends_request_keys_and_reads_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/trips/"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({ "user_id": "u1", "trip_name": "Paris" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": 42, "trip_name": "Paris" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = tripsync::models::TripRecord::for_create(&paris(), "u1");
    let created = client_for(&server, Some(TOKEN))
        .create_trip(&record)
        .await
        .unwrap();
    assert_eq!(created.server_id, Some(42));
}

#[tokio::test]
async fn test_create_event_accepts_list_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items/"))
        .and(body_partial_json(json!({
            "trip_id": 42,
            "item_name": "Louvre",
            "lat": "48.8606",
            "lon": "2.3376",
            "date": "2024-05-02T09:00:00.000+00:00"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 9, "item_name": "Louvre" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = tripsync::models::EventRecord::for_create(&louvre(), 42);
    let created = client_for(&server, Some(TOKEN))
        .create_event(&record)
        .await
        .unwrap();
    assert_eq!(created.server_id, Some(9));
}

#[tokio::test]
async fn test_updates_and_deletes_carry_server_id_in_body() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/items/"))
        .and(body_partial_json(json!({ "item_id": 9, "trip_id": 42 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/trips/"))
        .and(body_partial_json(json!({ "trip_id": 42 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/items/"))
        .and(body_partial_json(json!({ "item_id": 9 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(TOKEN));
    let mut event = louvre();
    event.id = Some(9);
    let record = tripsync::models::EventRecord::for_update(&event, 42);

    client.update_event(&record).await.unwrap();
    client.delete_trip(42).await.unwrap();
    client.delete_event(9).await.unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trips/u1/all/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    match client_for(&server, Some(TOKEN)).fetch_all("u1").await {
        Err(RemoteError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_create_response_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/trips/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let record = tripsync::models::TripRecord::for_create(&paris(), "u1");
    let result = client_for(&server, Some(TOKEN)).create_trip(&record).await;
    assert!(matches!(result, Err(RemoteError::EmptyBody)));
}

#[tokio::test]
async fn test_missing_token_fails_before_sending() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = client_for(&server, None).fetch_all("u1").await;
    assert!(matches!(result, Err(RemoteError::AuthenticationMissing)));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_network_error() {
    let client = TripsApiClient::with_base_url(
        Url::parse("http://127.0.0.1:1/").unwrap(),
        Some(TOKEN.to_string()),
        Duration::from_secs(2),
    )
    .unwrap();

    let result = client.fetch_all("u1").await;
    assert!(matches!(result, Err(RemoteError::Network(_))));
}
