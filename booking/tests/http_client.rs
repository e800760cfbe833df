//! `BackendClient` against a mock REST backend

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::NaiveDate;
use marquee_booking::catalog::ShowCatalog;
use marquee_booking::inventory::SeatInventory;
use marquee_booking::payment::{PaymentBackend, PaymentProof, TicketEntry, TicketUpdate};
use marquee_booking::{
    BackendClient, CatalogError, FoodItemId, InventoryError, LockDenied, LockError, Money, MovieId,
    OrderId, PaymentError, SeatId, SeatLabel, ShowId, TheaterId, TicketId, TicketUpdateError,
    UserId,
};
use reqwest::Url;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Fixtures
// ============================================================================

async fn backend() -> (MockServer, BackendClient) {
    let server = MockServer::start().await;
    let client = BackendClient::new(
        Url::parse(&server.uri()).unwrap(),
        Some("token-1".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    (server, client)
}

fn me() -> UserId {
    UserId::new("user-1")
}

fn seat(label: &str) -> SeatLabel {
    SeatLabel::parse(label).unwrap()
}

// ============================================================================
// Seat inventory
// ============================================================================

#[tokio::test]
async fn lock_posts_seat_and_user_with_the_bearer_token() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/seats/lockSeat"))
        .and(header("authorization", "Bearer token-1"))
        .and(body_json(json!({ "seatId": "s-1", "userId": "user-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "locked" })))
        .expect(1)
        .mount(&server)
        .await;

    client.lock_seat(SeatId::new("s-1"), me()).await.unwrap();
}

#[tokio::test]
async fn lock_conflict_reports_the_denial_reason() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/seats/lockSeat"))
        .and(body_json(json!({ "seatId": "s-sold", "userId": "user-1" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "reason": "ALREADY_SOLD" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/seats/lockSeat"))
        .and(body_json(json!({ "seatId": "s-held", "userId": "user-1" })))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Seat is locked by another user" })),
        )
        .mount(&server)
        .await;

    let sold = client.lock_seat(SeatId::new("s-sold"), me()).await.unwrap_err();
    let held = client.lock_seat(SeatId::new("s-held"), me()).await.unwrap_err();

    assert_eq!(sold, LockError::Denied(LockDenied::AlreadySold));
    assert_eq!(held, LockError::Denied(LockDenied::AlreadyLocked));
}

#[tokio::test]
async fn lock_server_error_is_not_a_denial() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/seats/lockSeat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let error = client.lock_seat(SeatId::new("s-1"), me()).await.unwrap_err();

    assert_eq!(
        error,
        LockError::Inventory(InventoryError::UnexpectedStatus {
            status: 500,
            message: "boom".to_string(),
        })
    );
}

#[tokio::test]
async fn unlock_posts_to_its_own_endpoint() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/seats/unlockSeat"))
        .and(body_json(json!({ "seatId": "s-1", "userId": "user-1" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.unlock_seat(SeatId::new("s-1"), me()).await.unwrap();
}

#[tokio::test]
async fn seat_map_reads_backend_records() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/seats/show/sh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "s-1", "seatNo": "A1", "isAvailable": true },
            { "_id": "s-2", "seatNo": "A2", "isAvailable": false, "lockedByUserId": "user-9" },
        ])))
        .mount(&server)
        .await;

    let seats = client.fetch_seat_map(ShowId::new("sh-1")).await.unwrap();

    assert_eq!(seats.len(), 2);
    assert_eq!(seats[0].seat_id, SeatId::new("s-1"));
    assert_eq!(seats[0].seat_no, seat("A1"));
    assert!(seats[0].is_available);
    assert_eq!(seats[1].locked_by, Some(UserId::new("user-9")));
}

#[tokio::test]
async fn malformed_seat_map_is_an_invalid_response() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/seats/show/sh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "_id": "s-1", "seatNo": "1A" }])))
        .mount(&server)
        .await;

    let error = client.fetch_seat_map(ShowId::new("sh-1")).await.unwrap_err();

    assert!(matches!(error, InventoryError::InvalidResponse(_)), "{error:?}");
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn search_sends_the_query_as_name() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/movies/search"))
        .and(query_param("name", "inter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "m-2", "movieName": "Interstellar", "genre": "Sci-Fi" },
        ])))
        .mount(&server)
        .await;

    let movies = client.search_movies("inter".to_string()).await.unwrap();

    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].id, MovieId::new("m-2"));
    assert_eq!(movies[0].title, "Interstellar");
    assert_eq!(movies[0].language, None);
}

#[tokio::test]
async fn showtimes_flatten_the_theater_listing() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/shows/theaterAndShowTimingsByMovie"))
        .and(query_param("movieId", "m-1"))
        .and(query_param("city", "Pune"))
        .and(query_param("date", "2025-03-15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "th-1": { "sh-1": "18:30", "sh-2": "21:45" },
            "th-2": { "sh-3": "10:00" },
        })))
        .mount(&server)
        .await;

    let mut showtimes = client
        .showtimes(
            MovieId::new("m-1"),
            "Pune".to_string(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        )
        .await
        .unwrap();
    showtimes.sort_by(|a, b| a.show_id.cmp(&b.show_id));

    let flat: Vec<_> = showtimes
        .iter()
        .map(|s| (s.theater_id.as_str(), s.show_id.as_str(), s.time.as_str()))
        .collect();
    assert_eq!(
        flat,
        vec![("th-1", "sh-1", "18:30"), ("th-1", "sh-2", "21:45"), ("th-2", "sh-3", "10:00")]
    );
}

#[tokio::test]
async fn layout_prices_and_menu_come_from_their_endpoints() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/theater-seats/theater/th-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "rowLabel": "A", "seatCount": 10, "seatType": "CLASSIC" },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shows/seat/prices/sh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "CLASSIC": 200, "PREMIUM": 350 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/show-food/show/sh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "popcorn", "name": "Popcorn", "price": 120 },
        ])))
        .mount(&server)
        .await;

    let layout = client.seat_layout(TheaterId::new("th-1")).await.unwrap();
    let prices = client.seat_prices(ShowId::new("sh-1")).await.unwrap();
    let food = client.food_menu(ShowId::new("sh-1")).await.unwrap();

    assert_eq!(layout[0].row_label, "A");
    assert_eq!(layout[0].seat_count, 10);
    assert_eq!(prices.len(), 2);
    assert_eq!(food[0].id, FoodItemId::new("popcorn"));
    assert_eq!(food[0].price, Money::new(120));
}

#[tokio::test]
async fn catalog_errors_carry_the_status() {
    let (server, client) = backend().await;
    Mock::given(method("GET"))
        .and(path("/theaters/city/Pune"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let error = client.theaters_in_city("Pune".to_string()).await.unwrap_err();

    assert_eq!(
        error,
        CatalogError::UnexpectedStatus {
            status: 503,
            message: "maintenance".to_string(),
        }
    );
}

// ============================================================================
// Payments
// ============================================================================

#[tokio::test]
async fn create_order_posts_the_amount() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/payment/create-order"))
        .and(body_json(json!({ "amount": 520 })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "order_1", "amount": 52000 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let order = client.create_order(Money::new(520)).await.unwrap();

    assert_eq!(order.order_id, OrderId::new("order_1"));
    assert_eq!(order.amount, 52000);
    assert_eq!(order.currency, "INR");
}

#[tokio::test]
async fn create_order_failure_keeps_the_backend_message() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/payment/create-order"))
        .respond_with(ResponseTemplate::new(500).set_body_string("gateway down"))
        .mount(&server)
        .await;

    let error = client.create_order(Money::new(520)).await.unwrap_err();

    assert_eq!(error, PaymentError::OrderCreationFailed("gateway down".to_string()));
}

#[tokio::test]
async fn verification_sends_proof_and_ticket_entry() {
    let (server, client) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/payment/verify-payment"))
        .and(body_json(json!({
            "razorpay_payment_id": "pay_1",
            "razorpay_order_id": "order_1",
            "razorpay_signature": "sig",
            "ticketEntryDto": {
                "showId": "sh-1",
                "userId": "user-1",
                "requestSeats": ["A1", "A2"],
                "requestedFoodIds": ["popcorn"],
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ticketId": "t-77" })))
        .expect(1)
        .mount(&server)
        .await;

    let ticket = client
        .verify_and_book(
            PaymentProof {
                payment_id: "pay_1".to_string(),
                order_id: OrderId::new("order_1"),
                signature: "sig".to_string(),
            },
            TicketEntry {
                show_id: ShowId::new("sh-1"),
                user_id: me(),
                requested_seats: vec![seat("A1"), seat("A2")],
                requested_food_ids: vec![FoodItemId::new("popcorn")],
            },
        )
        .await
        .unwrap();

    assert_eq!(ticket, TicketId::new("t-77"));
}

#[tokio::test]
async fn ticket_update_is_a_put_and_conflicts_are_named() {
    let (server, client) = backend().await;
    Mock::given(method("PUT"))
        .and(path("/ticket/update"))
        .and(body_json(json!({
            "originalTicketId": "ticket-old",
            "newShowId": "sh-1",
            "newSeatNo": "B3",
            "userId": "user-1",
        })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "message": "Seat B3 is taken" })))
        .expect(1)
        .mount(&server)
        .await;

    let error = client
        .update_ticket(TicketUpdate {
            original_ticket_id: TicketId::new("ticket-old"),
            new_show_id: ShowId::new("sh-1"),
            new_seat_no: seat("B3"),
            user_id: me(),
        })
        .await
        .unwrap_err();

    assert!(matches!(error, TicketUpdateError::Conflict(_)), "{error:?}");
}
