//! REST client for the booking backend.
//!
//! One [`BackendClient`] implements every collaborator trait. Each call is a
//! single request with no retries; the returned futures are lazy, so nothing
//! is sent until the runtime polls them.

use crate::ServiceFuture;
use crate::catalog::ShowCatalog;
use crate::config::{Config, ConfigError};
use crate::error::{
    CatalogError, InventoryError, LockDenied, LockError, PaymentError, TicketUpdateError,
};
use crate::inventory::{LockGranted, SeatInventory, Unlocked};
use crate::payment::{OrderRef, PaymentBackend, PaymentProof, TicketEntry, TicketUpdate};
use crate::types::{
    FoodItem, LayoutRow, Money, Movie, MovieId, OrderId, SeatId, SeatLabel, SeatStatus, SeatType,
    ShowId, Showtime, Theater, TheaterId, TicketId, UserId,
};
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Backend REST client
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be initialised.
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Create a client from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is invalid or the client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.api.url).map_err(|e| ConfigError::InvalidApiUrl {
            url: config.api.url.clone(),
            reason: e.to_string(),
        })?;
        Self::new(base_url, config.api.token.clone(), config.api.timeout())
    }

    /// Base URL every endpoint is resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Failure> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Failure::Transport(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, Failure> {
        builder
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, Failure> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "GET");

        let response = self
            .send(self.request(Method::GET, url).query(query))
            .await?;
        let response = expect_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Failure::Decode(e.to_string()))
    }
}

/// Why a request did not produce the expected body
#[derive(Debug)]
enum Failure {
    Transport(String),
    Status { status: u16, body: String },
    Decode(String),
}

impl From<Failure> for InventoryError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport(message) => Self::Transport(message),
            Failure::Status { status, body } => Self::UnexpectedStatus {
                status,
                message: body,
            },
            Failure::Decode(message) => Self::InvalidResponse(message),
        }
    }
}

impl From<Failure> for CatalogError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport(message) => Self::Transport(message),
            Failure::Status { status, body } => Self::UnexpectedStatus {
                status,
                message: body,
            },
            Failure::Decode(message) => Self::InvalidResponse(message),
        }
    }
}

impl Failure {
    fn describe(self) -> String {
        match self {
            Self::Transport(message) | Self::Decode(message) => message,
            Self::Status { status, body } if body.trim().is_empty() => {
                format!("backend returned {status}")
            },
            Self::Status { body, .. } => body,
        }
    }
}

async fn expect_success(response: Response) -> Result<Response, Failure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Failure::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeatRecord {
    #[serde(rename = "_id", alias = "id")]
    id: SeatId,
    seat_no: SeatLabel,
    is_available: bool,
    #[serde(default)]
    locked_by_user_id: Option<UserId>,
}

impl From<SeatRecord> for SeatStatus {
    fn from(record: SeatRecord) -> Self {
        Self {
            seat_id: record.id,
            seat_no: record.seat_no,
            is_available: record.is_available,
            locked_by: record.locked_by_user_id,
        }
    }
}

#[derive(Deserialize)]
struct DenialBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Read the denial reason out of a lock conflict body
///
/// Prefers the machine-readable `reason` field and falls back to the wording
/// of the message.
fn parse_denial(body: &str) -> LockDenied {
    let (reason, message) = match serde_json::from_str::<DenialBody>(body) {
        Ok(denial) => (denial.reason, denial.message.unwrap_or_default()),
        Err(_) => (None, body.to_string()),
    };

    match reason.as_deref() {
        Some("ALREADY_SOLD") => LockDenied::AlreadySold,
        Some("ALREADY_LOCKED") => LockDenied::AlreadyLocked,
        _ => {
            let message = message.to_ascii_lowercase();
            if message.contains("sold") || message.contains("booked") {
                LockDenied::AlreadySold
            } else {
                LockDenied::AlreadyLocked
            }
        },
    }
}

#[derive(Deserialize)]
struct OrderBody {
    id: OrderId,
    amount: u64,
    #[serde(default)]
    currency: Option<String>,
}

/// Pull the ticket id out of a verification response
///
/// The backend has answered with a JSON ticket, a JSON envelope and plain
/// text over time; anything unrecognisable falls back to the order id.
fn parse_ticket_id(body: &str, order_id: &OrderId) -> TicketId {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["ticketId", "_id", "id"] {
            match map.get(key) {
                Some(serde_json::Value::String(id)) if !id.is_empty() => return TicketId::new(id.as_str()),
                Some(serde_json::Value::Number(id)) => return TicketId::new(id.to_string()),
                _ => {},
            }
        }
    }

    let text = body.trim().trim_matches('"');
    if !text.is_empty() && !text.starts_with('{') {
        return TicketId::new(text);
    }

    tracing::warn!(%order_id, "Verification response carried no ticket id, using the order id");
    TicketId::new(order_id.as_str())
}

fn update_error(status: StatusCode, body: String) -> TicketUpdateError {
    let or = |fallback: &str| {
        if body.trim().is_empty() {
            fallback.to_string()
        } else {
            body.clone()
        }
    };
    match status {
        StatusCode::CONFLICT => TicketUpdateError::Conflict(or(
            "Conflict: The ticket cannot be updated. This might be because the selected seat is no longer available.",
        )),
        StatusCode::NOT_FOUND => TicketUpdateError::NotFound(
            "Original ticket not found. Please refresh and try again.".to_string(),
        ),
        StatusCode::BAD_REQUEST => TicketUpdateError::Invalid(
            serde_json::from_str::<DenialBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "Invalid request. Please check your selection.".to_string()),
        ),
        StatusCode::FORBIDDEN => TicketUpdateError::Forbidden(
            "You don't have permission to update this ticket.".to_string(),
        ),
        _ => TicketUpdateError::Failed(or("Failed to update ticket. Please try again.")),
    }
}

// ============================================================================
// Seat inventory
// ============================================================================

impl SeatInventory for BackendClient {
    fn lock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<LockGranted, LockError>> {
        let this = self.clone();
        Box::pin(async move {
            let url = this.endpoint(&["seats", "lockSeat"]).map_err(InventoryError::from)?;
            let body = serde_json::json!({ "seatId": seat_id, "userId": user_id });
            let response = this
                .send(this.request(Method::POST, url).json(&body))
                .await
                .map_err(InventoryError::from)?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(%seat_id, "Seat locked");
                return Ok(LockGranted);
            }

            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::CONFLICT {
                let denied = parse_denial(&body);
                tracing::info!(%seat_id, reason = %denied, "Seat lock denied");
                return Err(LockError::Denied(denied));
            }

            Err(InventoryError::UnexpectedStatus {
                status: status.as_u16(),
                message: body,
            }
            .into())
        })
    }

    fn unlock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<Unlocked, InventoryError>> {
        let this = self.clone();
        Box::pin(async move {
            let url = this.endpoint(&["seats", "unlockSeat"])?;
            let body = serde_json::json!({ "seatId": seat_id, "userId": user_id });
            let response = this.send(this.request(Method::POST, url).json(&body)).await?;
            expect_success(response).await?;
            tracing::debug!(%seat_id, "Seat unlocked");
            Ok(Unlocked)
        })
    }

    fn fetch_seat_map(&self, show_id: ShowId) -> ServiceFuture<Result<Vec<SeatStatus>, InventoryError>> {
        let this = self.clone();
        Box::pin(async move {
            let records: Vec<SeatRecord> = this.get_json(&["seats", "show", show_id.as_str()], &[]).await?;
            Ok(records.into_iter().map(SeatStatus::from).collect())
        })
    }
}

// ============================================================================
// Catalog
// ============================================================================

impl ShowCatalog for BackendClient {
    fn search_movies(&self, query: String) -> ServiceFuture<Result<Vec<Movie>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .get_json(&["movies", "search"], &[("name", query)])
                .await?)
        })
    }

    fn theaters_in_city(&self, city: String) -> ServiceFuture<Result<Vec<Theater>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move { Ok(this.get_json(&["theaters", "city", city.as_str()], &[]).await?) })
    }

    fn showtimes(
        &self,
        movie_id: MovieId,
        city: String,
        date: NaiveDate,
    ) -> ServiceFuture<Result<Vec<Showtime>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move {
            let query = [
                ("movieId", movie_id.to_string()),
                ("city", city),
                ("date", date.format("%Y-%m-%d").to_string()),
            ];
            // { theaterId: { showId: "18:30" } }
            let listing: HashMap<TheaterId, HashMap<ShowId, String>> = this
                .get_json(&["shows", "theaterAndShowTimingsByMovie"], &query)
                .await?;

            Ok(listing
                .into_iter()
                .flat_map(|(theater_id, shows)| {
                    shows.into_iter().map(move |(show_id, time)| Showtime {
                        show_id,
                        theater_id: theater_id.clone(),
                        time,
                    })
                })
                .collect())
        })
    }

    fn seat_layout(&self, theater_id: TheaterId) -> ServiceFuture<Result<Vec<LayoutRow>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .get_json(&["theater-seats", "theater", theater_id.as_str()], &[])
                .await?)
        })
    }

    fn seat_prices(&self, show_id: ShowId) -> ServiceFuture<Result<HashMap<SeatType, Money>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .get_json(&["shows", "seat", "prices", show_id.as_str()], &[])
                .await?)
        })
    }

    fn food_menu(&self, show_id: ShowId) -> ServiceFuture<Result<Vec<FoodItem>, CatalogError>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .get_json(&["show-food", "show", show_id.as_str()], &[])
                .await?)
        })
    }
}

// ============================================================================
// Payments
// ============================================================================

impl PaymentBackend for BackendClient {
    fn create_order(&self, amount: Money) -> ServiceFuture<Result<OrderRef, PaymentError>> {
        let this = self.clone();
        Box::pin(async move {
            let fail = |failure: Failure| PaymentError::OrderCreationFailed(failure.describe());

            let url = this.endpoint(&["api", "payment", "create-order"]).map_err(fail)?;
            let body = serde_json::json!({ "amount": amount });
            let response = this
                .send(this.request(Method::POST, url).json(&body))
                .await
                .map_err(fail)?;
            let order: OrderBody = expect_success(response)
                .await
                .map_err(fail)?
                .json()
                .await
                .map_err(|e| fail(Failure::Decode(e.to_string())))?;

            tracing::info!(order_id = %order.id, %amount, "Payment order created");
            Ok(OrderRef {
                order_id: order.id,
                amount: order.amount,
                currency: order.currency.unwrap_or_else(|| "INR".to_string()),
            })
        })
    }

    fn verify_and_book(
        &self,
        proof: PaymentProof,
        entry: TicketEntry,
    ) -> ServiceFuture<Result<TicketId, PaymentError>> {
        let this = self.clone();
        Box::pin(async move {
            let fail = |failure: Failure| PaymentError::VerificationFailed(failure.describe());

            let url = this.endpoint(&["api", "payment", "verify-payment"]).map_err(fail)?;
            let body = serde_json::json!({
                "razorpay_payment_id": proof.payment_id,
                "razorpay_order_id": proof.order_id,
                "razorpay_signature": proof.signature,
                "ticketEntryDto": entry,
            });
            let response = this
                .send(this.request(Method::POST, url).json(&body))
                .await
                .map_err(fail)?;
            let text = expect_success(response)
                .await
                .map_err(fail)?
                .text()
                .await
                .map_err(|e| fail(Failure::Decode(e.to_string())))?;

            Ok(parse_ticket_id(&text, &proof.order_id))
        })
    }

    fn update_ticket(&self, update: TicketUpdate) -> ServiceFuture<Result<(), TicketUpdateError>> {
        let this = self.clone();
        Box::pin(async move {
            let url = this
                .endpoint(&["ticket", "update"])
                .map_err(|f| TicketUpdateError::Failed(f.describe()))?;
            let response = this
                .send(this.request(Method::PUT, url).json(&update))
                .await
                .map_err(|f| TicketUpdateError::Failed(f.describe()))?;

            let status = response.status();
            if status.is_success() {
                tracing::info!(ticket_id = %update.original_ticket_id, "Ticket updated");
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(update_error(status, body))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::new(Url::parse(base).unwrap(), None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn endpoints_resolve_under_the_base_path() {
        let with_slash = client("http://localhost:8080/api-root/");
        let without_slash = client("http://localhost:8080/api-root");

        for c in [with_slash, without_slash] {
            let url = c.endpoint(&["theaters", "city", "New Delhi"]).unwrap();
            assert_eq!(url.as_str(), "http://localhost:8080/api-root/theaters/city/New%20Delhi");
        }
    }

    #[test]
    fn denial_reason_prefers_the_reason_field() {
        assert_eq!(
            parse_denial(r#"{"reason":"ALREADY_SOLD","message":"locked"}"#),
            LockDenied::AlreadySold
        );
        assert_eq!(
            parse_denial(r#"{"reason":"ALREADY_LOCKED"}"#),
            LockDenied::AlreadyLocked
        );
    }

    #[test]
    fn denial_reason_falls_back_to_message_text() {
        assert_eq!(parse_denial(r#"{"message":"Seat already booked"}"#), LockDenied::AlreadySold);
        assert_eq!(parse_denial("Seat is locked by another user"), LockDenied::AlreadyLocked);
    }

    #[test]
    fn ticket_id_is_read_from_any_known_shape() {
        let order = OrderId::new("order_9");
        assert_eq!(parse_ticket_id(r#"{"ticketId":"t-1"}"#, &order), TicketId::new("t-1"));
        assert_eq!(parse_ticket_id(r#"{"_id":"t-2","seats":[]}"#, &order), TicketId::new("t-2"));
        assert_eq!(parse_ticket_id(r#"{"id":42}"#, &order), TicketId::new("42"));
        assert_eq!(parse_ticket_id("t-3\n", &order), TicketId::new("t-3"));
        assert_eq!(parse_ticket_id(r#"{"status":"ok"}"#, &order), TicketId::new("order_9"));
    }

    #[test]
    fn update_refusals_map_to_their_status() {
        assert_eq!(
            update_error(StatusCode::CONFLICT, "Seat B3 is taken".to_string()),
            TicketUpdateError::Conflict("Seat B3 is taken".to_string())
        );
        assert!(matches!(
            update_error(StatusCode::NOT_FOUND, String::new()),
            TicketUpdateError::NotFound(_)
        ));
        assert_eq!(
            update_error(StatusCode::BAD_REQUEST, r#"{"message":"bad seat"}"#.to_string()),
            TicketUpdateError::Invalid("bad seat".to_string())
        );
        assert!(matches!(
            update_error(StatusCode::FORBIDDEN, String::new()),
            TicketUpdateError::Forbidden(_)
        ));
        assert!(matches!(
            update_error(StatusCode::BAD_GATEWAY, String::new()),
            TicketUpdateError::Failed(_)
        ));
    }
}
