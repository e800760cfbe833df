//! Inputs to the booking reducer.
//!
//! User intents and collaborator responses share one type so the whole flow is
//! a single transition function. Every response carries the [`SessionId`] of
//! the attempt that asked for it.

use crate::error::{BookingError, CatalogError, InventoryError, LockError, PaymentError, TicketUpdateError};
use crate::inventory::{LockGranted, Unlocked};
use crate::payment::{CheckoutOutcome, OrderRef};
use crate::types::{
    FoodItemId, Money, Movie, OrderId, SeatId, SeatLabel, SeatPlan, SeatStatus, SessionId, ShowId,
    Showtime, Theater, TheaterId, TheaterShowtimes, TicketId,
};
use chrono::NaiveDate;

/// Everything that can happen to a booking session
#[derive(Clone, Debug)]
pub enum BookingAction {
    // ========== User intents ==========
    /// Pick a movie, restarting any session in progress
    SelectMovie {
        /// The movie
        movie: Movie,
    },

    /// Start moving an existing ticket to another seat of the same show
    StartUpdate {
        /// Ticket being moved
        original_ticket_id: TicketId,
        /// What the user paid for it
        original_fare: Money,
        /// Its movie
        movie: Movie,
        /// Its date
        date: NaiveDate,
        /// Its theater
        theater: Theater,
        /// Its showtime
        showtime: Showtime,
    },

    /// Pick one of the offered dates
    SelectDate {
        /// The date
        date: NaiveDate,
    },

    /// Pick one of the listed theaters
    SelectTheater {
        /// The theater
        theater_id: TheaterId,
    },

    /// Pick one of the theater's showtimes
    SelectShowtime {
        /// The show
        show_id: ShowId,
    },

    /// Set how many seats to book
    ChooseSeatCount {
        /// Between 1 and 10
        count: u32,
    },

    /// Select or release a seat
    ToggleSeat {
        /// The seat
        seat: SeatLabel,
    },

    /// Finish seat selection
    ConfirmSeats,

    /// Add one unit of a food item
    AddFood {
        /// Menu item
        food_id: FoodItemId,
    },

    /// Remove one unit of a food item
    RemoveFood {
        /// Menu item
        food_id: FoodItemId,
    },

    /// Finish food selection
    ProceedToPayment,

    /// Create a payment order and open the checkout
    StartPayment,

    /// Re-read seat availability from the server
    RefreshSeatMap,

    /// Go back one step
    Back,

    /// Abandon the session, releasing held seats
    Cancel,

    // ========== Collaborator responses ==========
    /// Theaters and showtimes for a date arrived
    TheatersLoaded {
        /// Requesting session
        session: SessionId,
        /// Date asked about
        date: NaiveDate,
        /// Listing or failure
        result: Result<Vec<TheaterShowtimes>, CatalogError>,
    },

    /// Layout, prices, seats and menu of a show arrived
    SeatPlanLoaded {
        /// Requesting session
        session: SessionId,
        /// Show asked about
        show_id: ShowId,
        /// Plan or failure
        result: Result<SeatPlan, BookingError>,
    },

    /// A fresh seat map arrived
    SeatMapRefreshed {
        /// Requesting session
        session: SessionId,
        /// Show asked about
        show_id: ShowId,
        /// Snapshot or failure
        result: Result<Vec<SeatStatus>, InventoryError>,
    },

    /// A lock request finished
    LockSettled {
        /// Requesting session
        session: SessionId,
        /// Seat asked about
        seat: SeatLabel,
        /// Its id
        seat_id: SeatId,
        /// Request sequence number
        seq: u64,
        /// Grant or refusal
        result: Result<LockGranted, LockError>,
    },

    /// An unlock request finished
    UnlockSettled {
        /// Requesting session
        session: SessionId,
        /// Seat asked about
        seat: SeatLabel,
        /// Request sequence number
        seq: u64,
        /// Release or failure
        result: Result<Unlocked, InventoryError>,
    },

    /// The backend answered a ticket move
    TicketUpdateSettled {
        /// Requesting session
        session: SessionId,
        /// Outcome
        result: Result<(), TicketUpdateError>,
    },

    /// The backend answered an order request
    OrderSettled {
        /// Requesting session
        session: SessionId,
        /// Order or failure
        result: Result<OrderRef, PaymentError>,
    },

    /// The checkout provider called back
    CheckoutResolved {
        /// Requesting session
        session: SessionId,
        /// Order the checkout was opened for
        order_id: OrderId,
        /// Success or failure
        outcome: CheckoutOutcome,
    },

    /// The backend answered a payment verification
    VerificationSettled {
        /// Requesting session
        session: SessionId,
        /// Order that was verified
        order_id: OrderId,
        /// Ticket or failure
        result: Result<TicketId, PaymentError>,
    },
}

impl BookingAction {
    /// The session a collaborator response belongs to; `None` for user intents
    #[must_use]
    pub const fn session(&self) -> Option<SessionId> {
        match self {
            Self::TheatersLoaded { session, .. }
            | Self::SeatPlanLoaded { session, .. }
            | Self::SeatMapRefreshed { session, .. }
            | Self::LockSettled { session, .. }
            | Self::UnlockSettled { session, .. }
            | Self::TicketUpdateSettled { session, .. }
            | Self::OrderSettled { session, .. }
            | Self::CheckoutResolved { session, .. }
            | Self::VerificationSettled { session, .. } => Some(*session),
            _ => None,
        }
    }

    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectMovie { .. } => "SelectMovie",
            Self::StartUpdate { .. } => "StartUpdate",
            Self::SelectDate { .. } => "SelectDate",
            Self::SelectTheater { .. } => "SelectTheater",
            Self::SelectShowtime { .. } => "SelectShowtime",
            Self::ChooseSeatCount { .. } => "ChooseSeatCount",
            Self::ToggleSeat { .. } => "ToggleSeat",
            Self::ConfirmSeats => "ConfirmSeats",
            Self::AddFood { .. } => "AddFood",
            Self::RemoveFood { .. } => "RemoveFood",
            Self::ProceedToPayment => "ProceedToPayment",
            Self::StartPayment => "StartPayment",
            Self::RefreshSeatMap => "RefreshSeatMap",
            Self::Back => "Back",
            Self::Cancel => "Cancel",
            Self::TheatersLoaded { .. } => "TheatersLoaded",
            Self::SeatPlanLoaded { .. } => "SeatPlanLoaded",
            Self::SeatMapRefreshed { .. } => "SeatMapRefreshed",
            Self::LockSettled { .. } => "LockSettled",
            Self::UnlockSettled { .. } => "UnlockSettled",
            Self::TicketUpdateSettled { .. } => "TicketUpdateSettled",
            Self::OrderSettled { .. } => "OrderSettled",
            Self::CheckoutResolved { .. } => "CheckoutResolved",
            Self::VerificationSettled { .. } => "VerificationSettled",
        }
    }
}
