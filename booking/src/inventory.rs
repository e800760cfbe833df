//! Inventory client seam.
//!
//! Translates seat actions into inventory requests. Each call is one round
//! trip with no retries; the authoritative lock state (and its expiry) lives
//! on the server.

use crate::ServiceFuture;
use crate::error::{InventoryError, LockError};
use crate::types::{SeatId, SeatStatus, ShowId, UserId};

/// A lock was granted to the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockGranted;

/// A seat was released
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unlocked;

/// Seat inventory service
///
/// Implementations must not retry on their own: a retry is always a fresh
/// user action.
pub trait SeatInventory: Send + Sync {
    /// Ask the server to lock `seat_id` for `user_id`
    ///
    /// # Errors
    ///
    /// - [`LockError::Denied`] with the reason when the server refuses
    /// - [`LockError::Inventory`] when the server could not be asked
    fn lock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<LockGranted, LockError>>;

    /// Release a lock held by `user_id`
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] on transport failure or an unexpected status.
    fn unlock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<Unlocked, InventoryError>>;

    /// Current availability of every seat of a show
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError`] on transport failure or an unexpected status.
    fn fetch_seat_map(&self, show_id: ShowId) -> ServiceFuture<Result<Vec<SeatStatus>, InventoryError>>;
}
