//! Payment handoff seams.
//!
//! The backend creates orders, verifies payments and moves tickets; the
//! external checkout UI takes the money. [`MockCheckoutProvider`] stands in for
//! the browser checkout widget in the terminal client and in tests.

use crate::ServiceFuture;
use crate::error::{PaymentError, TicketUpdateError};
use crate::types::{FoodItemId, Money, OrderId, SeatLabel, ShowId, TicketId, UserId};
use marquee_testing::CallLog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A payment order created by the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRef {
    /// Provider order id
    pub order_id: OrderId,
    /// Amount as echoed by the backend, in the provider's units
    pub amount: u64,
    /// Currency code
    pub currency: String,
}

/// Proof of payment handed back by the checkout provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Provider payment id
    pub payment_id: String,
    /// Order the payment settles
    pub order_id: OrderId,
    /// Provider signature over the payment
    pub signature: String,
}

/// Ticket to create once a payment is verified
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketEntry {
    /// Show being booked
    pub show_id: ShowId,
    /// Booking user
    pub user_id: UserId,
    /// Seats, in selection order
    #[serde(rename = "requestSeats")]
    pub requested_seats: Vec<SeatLabel>,
    /// One entry per unit of food ordered
    pub requested_food_ids: Vec<FoodItemId>,
}

/// Request to move an existing ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    /// Ticket being moved
    pub original_ticket_id: TicketId,
    /// Destination show
    pub new_show_id: ShowId,
    /// Destination seat
    pub new_seat_no: SeatLabel,
    /// Ticket owner
    pub user_id: UserId,
}

/// Backend payment and ticketing endpoints
pub trait PaymentBackend: Send + Sync {
    /// Create a payment order for `amount`
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::OrderCreationFailed`].
    fn create_order(&self, amount: Money) -> ServiceFuture<Result<OrderRef, PaymentError>>;

    /// Verify a payment and create the ticket it paid for
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::VerificationFailed`].
    fn verify_and_book(
        &self,
        proof: PaymentProof,
        entry: TicketEntry,
    ) -> ServiceFuture<Result<TicketId, PaymentError>>;

    /// Move a ticket to another seat or show
    ///
    /// # Errors
    ///
    /// Returns the [`TicketUpdateError`] matching the backend's refusal.
    fn update_ticket(&self, update: TicketUpdate) -> ServiceFuture<Result<(), TicketUpdateError>>;
}

/// What the client asks the checkout provider to collect
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Amount, as echoed on the order
    pub amount: u64,
    /// Currency code
    pub currency: String,
    /// Order to settle
    pub order_id: OrderId,
    /// Line shown in the checkout UI
    pub description: String,
}

/// Callback delivered by the checkout provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// `onSuccess`
    Succeeded(PaymentProof),
    /// `onFailure`
    Failed {
        /// Provider's description
        reason: String,
    },
}

/// External checkout UI
pub trait CheckoutProvider: Send + Sync {
    /// Open the checkout and wait for its callback
    ///
    /// Resolves to `None` when the user walks away without a callback; the
    /// client must not assume any outcome in that case.
    fn open(&self, request: CheckoutRequest) -> ServiceFuture<Option<CheckoutOutcome>>;
}

/// How [`MockCheckoutProvider`] answers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutBehavior {
    /// Pay successfully
    Approve,
    /// Report a failed payment
    Decline(String),
    /// Never call back
    Abandon,
}

/// Checkout provider that answers immediately with a configured outcome
#[derive(Clone, Debug)]
pub struct MockCheckoutProvider {
    behavior: CheckoutBehavior,
    opened: CallLog<CheckoutRequest>,
}

impl MockCheckoutProvider {
    /// Provider with the given behavior
    #[must_use]
    pub fn new(behavior: CheckoutBehavior) -> Self {
        Self {
            behavior,
            opened: CallLog::new(),
        }
    }

    /// Provider that approves every payment
    #[must_use]
    pub fn approving() -> Self {
        Self::new(CheckoutBehavior::Approve)
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn CheckoutProvider> {
        Arc::new(self)
    }

    /// Every checkout opened so far
    #[must_use]
    pub fn opened(&self) -> Vec<CheckoutRequest> {
        self.opened.calls()
    }
}

impl CheckoutProvider for MockCheckoutProvider {
    fn open(&self, request: CheckoutRequest) -> ServiceFuture<Option<CheckoutOutcome>> {
        self.opened.record(request.clone());
        let behavior = self.behavior.clone();

        Box::pin(async move {
            match behavior {
                CheckoutBehavior::Approve => {
                    let payment_id = format!("pay_mock_{}", uuid::Uuid::new_v4().simple());
                    tracing::info!(
                        order_id = %request.order_id,
                        amount = request.amount,
                        payment_id = %payment_id,
                        "Mock checkout approved"
                    );
                    Some(CheckoutOutcome::Succeeded(PaymentProof {
                        payment_id,
                        order_id: request.order_id,
                        signature: "mock_signature".to_string(),
                    }))
                },
                CheckoutBehavior::Decline(reason) => {
                    tracing::info!(order_id = %request.order_id, %reason, "Mock checkout declined");
                    Some(CheckoutOutcome::Failed { reason })
                },
                CheckoutBehavior::Abandon => None,
            }
        })
    }
}
