//! Error taxonomy of the booking flow.
//!
//! Every error here is `Clone` because errors travel inside actions and stay
//! attached to the session as its last error.

use crate::types::{FoodItemId, OrderId};
use thiserror::Error;

/// Failure talking to the seat inventory service
///
/// Recoverable: the user retries the same action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The request never got an answer
    #[error("seat service unreachable: {0}")]
    Transport(String),

    /// The service answered with a status the client does not expect
    #[error("seat service returned {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The response body could not be understood
    #[error("invalid seat service response: {0}")]
    InvalidResponse(String),
}

/// Why the inventory refused a lock
///
/// Recoverable: the user picks another seat.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDenied {
    /// Another user holds the seat
    #[error("seat is currently locked by another user")]
    AlreadyLocked,

    /// The seat has been sold
    #[error("seat is already sold")]
    AlreadySold,
}

/// Outcome of a failed lock request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The inventory answered and said no
    #[error(transparent)]
    Denied(#[from] LockDenied),

    /// The inventory could not be asked
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

/// Failure loading movies, theaters, showtimes, seat layouts, prices or menus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The request never got an answer
    #[error("catalog unreachable: {0}")]
    Transport(String),

    /// The service answered with a status the client does not expect
    #[error("catalog returned {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The response body could not be understood
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// Failure in the payment step
///
/// Terminal for the attempt, not for the session: seats stay held.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The backend would not create a payment order
    #[error("could not create payment order: {0}")]
    OrderCreationFailed(String),

    /// The payment provider reported a failed payment
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// Payment was taken but the backend did not confirm the booking
    #[error("payment verification failed: {0}")]
    VerificationFailed(String),

    /// The provider took a payment for an order the session had moved on from
    #[error("payment {payment_id} for order {order_id} was taken but no ticket was issued")]
    UnclaimedPayment {
        /// Order the payment settled
        order_id: OrderId,
        /// Provider payment id
        payment_id: String,
    },
}

/// Why the backend refused to move a ticket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketUpdateError {
    /// 409: the new seat is not available
    #[error("{0}")]
    Conflict(String),

    /// 404: the original ticket or show does not exist
    #[error("{0}")]
    NotFound(String),

    /// 400: the request was rejected as malformed
    #[error("{0}")]
    Invalid(String),

    /// 403: the ticket belongs to someone else
    #[error("{0}")]
    Forbidden(String),

    /// Anything else, including transport failures
    #[error("{0}")]
    Failed(String),
}

/// Failure computing a price
///
/// Only stale or inconsistent input can cause these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// A selected seat's row is not in the seat-type table
    #[error("no seat-type row for {0}")]
    UnknownRow(String),

    /// A selected food item is not on the menu
    #[error("food item {0} is not on the menu")]
    UnknownFoodItem(FoodItemId),

    /// The total does not fit the money type
    #[error("amount overflow")]
    Overflow,
}

/// Any error surfaced to the user by the booking flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Seat service failure
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Lock refused
    #[error(transparent)]
    LockDenied(#[from] LockDenied),

    /// Catalog failure
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Payment failure
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Ticket update refused
    #[error("ticket update failed: {0}")]
    TicketUpdate(#[from] TicketUpdateError),

    /// Price computation failed
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

impl From<LockError> for BookingError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Denied(denied) => Self::LockDenied(denied),
            LockError::Inventory(inventory) => Self::Inventory(inventory),
        }
    }
}
