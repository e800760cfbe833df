//! # Marquee Booking
//!
//! Client-side controller for booking movie tickets against a REST backend.
//!
//! The flow is one reducer, [`BookingReducer`], over one piece of state,
//! [`BookingSession`]. User intents and collaborator responses are both
//! [`BookingAction`]s; every side effect (seat locks, catalog lookups, payment
//! calls) is returned as an effect description and executed by the
//! `marquee-runtime` store, which feeds the responses back in.
//!
//! ## Modules
//!
//! - [`inventory`]: seat lock, unlock and availability
//! - [`catalog`]: movies, theaters, showtimes, layouts, prices, menus
//! - [`pricing`]: amount due, recomputed from the selection
//! - [`payment`]: order creation, checkout handoff, verification, ticket moves
//! - [`reducer`]: the booking state machine
//! - [`chat`]: conversational front-end over the same reducer
//! - [`http`]: the REST implementation of every collaborator
//! - [`mocks`]: in-memory collaborators for tests and demos
//!
//! ## Example
//!
//! ```ignore
//! use marquee_booking::{BookingAction, BookingReducer, BookingSession};
//! use marquee_runtime::Store;
//!
//! let store = Store::new(BookingSession::default(), BookingReducer::new(), env);
//! store.send(BookingAction::SelectMovie { movie }).await?;
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod actions;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod environment;
pub mod error;
pub mod http;
pub mod inventory;
pub mod mocks;
pub mod payment;
pub mod pricing;
pub mod reducer;
pub mod session;
pub mod types;

/// Boxed future returned by collaborator traits
///
/// Owned and `'static` so a reducer can hand it straight to an effect.
pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub use actions::BookingAction;
pub use chat::{ChatAction, ChatPick, ChatReducer, ChatState};
pub use config::Config;
pub use environment::{BookingEnvironment, SessionContext};
pub use error::{
    BookingError, CatalogError, InventoryError, LockDenied, LockError, PaymentError, PricingError,
    TicketUpdateError,
};
pub use http::BackendClient;
pub use reducer::BookingReducer;
pub use session::{
    BookingSession, BookingStatus, Notice, NoticeLevel, PaymentPhase, SeatMap, SupersededOrder,
};
pub use types::{
    BookingMode, FoodItem, FoodItemId, Money, Movie, MovieId, OrderId, SeatId, SeatLabel,
    SeatLockState, SessionId, ShowId, Showtime, Theater, TheaterId, TicketId, UserId,
};
