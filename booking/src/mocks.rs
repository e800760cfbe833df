//! In-memory collaborators.
//!
//! These behave like the backend (a lock on a sold seat is refused, an unlock
//! by someone other than the holder is a no-op) and record every call they
//! receive so tests can assert on traffic. Calls are recorded when the
//! returned future runs, not when it is created.

use crate::ServiceFuture;
use crate::catalog::ShowCatalog;
use crate::error::{
    CatalogError, InventoryError, LockDenied, LockError, PaymentError, TicketUpdateError,
};
use crate::inventory::{LockGranted, SeatInventory, Unlocked};
use crate::payment::{OrderRef, PaymentBackend, PaymentProof, TicketEntry, TicketUpdate};
use crate::types::{
    FoodItem, FoodItemId, LayoutRow, Money, Movie, MovieId, OrderId, SeatId, SeatLabel, SeatStatus,
    SeatType, ShowId, Showtime, Theater, TheaterId, TicketId, UserId,
};
use chrono::NaiveDate;
use marquee_testing::CallLog;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Seat id the mocks assign to `label` in `show_id`
#[must_use]
pub fn seat_id(show_id: &ShowId, label: &str) -> SeatId {
    SeatId::new(format!("{show_id}-{label}"))
}

/// An all-available seat map for the given rows
#[must_use]
pub fn seat_grid(show_id: &ShowId, rows: &[(&str, u32)]) -> Vec<SeatStatus> {
    rows.iter()
        .flat_map(|(row, count)| (1..=*count).map(move |n| (*row, n)))
        .filter_map(|(row, n)| SeatLabel::from_parts(row, n).ok())
        .map(|label| SeatStatus {
            seat_id: seat_id(show_id, label.as_str()),
            seat_no: label,
            is_available: true,
            locked_by: None,
        })
        .collect()
}

// ============================================================================
// Inventory
// ============================================================================

/// A call received by [`MockInventory`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InventoryCall {
    /// `lock_seat`
    Lock(SeatId),
    /// `unlock_seat`
    Unlock(SeatId),
    /// `fetch_seat_map`
    FetchSeatMap(ShowId),
}

/// Seat inventory backed by an in-memory seat map
#[derive(Clone, Debug)]
pub struct MockInventory {
    seats: Arc<Mutex<Vec<SeatStatus>>>,
    offline: Arc<AtomicBool>,
    calls: CallLog<InventoryCall>,
}

impl MockInventory {
    /// Inventory holding `seats`
    #[must_use]
    pub fn new(seats: Vec<SeatStatus>) -> Self {
        Self {
            seats: Arc::new(Mutex::new(seats)),
            offline: Arc::new(AtomicBool::new(false)),
            calls: CallLog::new(),
        }
    }

    /// Mark a seat as sold
    #[must_use]
    pub fn with_sold(self, label: &str) -> Self {
        self.update(label, |seat| {
            seat.is_available = false;
            seat.locked_by = None;
        });
        self
    }

    /// Mark a seat as locked by `user`
    #[must_use]
    pub fn with_locked_by(self, label: &str, user: &UserId) -> Self {
        self.update(label, |seat| {
            seat.is_available = false;
            seat.locked_by = Some(user.clone());
        });
        self
    }

    /// Make every request fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<InventoryCall> {
        self.calls.calls()
    }

    /// Number of lock calls for a seat
    #[must_use]
    pub fn lock_calls(&self, seat_id: &SeatId) -> usize {
        self.calls
            .count_where(|call| matches!(call, InventoryCall::Lock(id) if id == seat_id))
    }

    /// Number of unlock calls for a seat
    #[must_use]
    pub fn unlock_calls(&self, seat_id: &SeatId) -> usize {
        self.calls
            .count_where(|call| matches!(call, InventoryCall::Unlock(id) if id == seat_id))
    }

    /// Current server-side status of a seat
    #[must_use]
    pub fn seat(&self, label: &str) -> Option<SeatStatus> {
        self.seats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|seat| seat.seat_no.as_str() == label)
            .cloned()
    }

    /// Labels of seats currently locked by `user`
    #[must_use]
    pub fn locked_by(&self, user: &UserId) -> Vec<SeatLabel> {
        self.seats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|seat| seat.locked_by.as_ref() == Some(user))
            .map(|seat| seat.seat_no.clone())
            .collect()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn SeatInventory> {
        Arc::new(self)
    }

    fn update(&self, label: &str, f: impl FnOnce(&mut SeatStatus)) {
        let mut seats = self.seats.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(seat) = seats.iter_mut().find(|seat| seat.seat_no.as_str() == label) {
            f(seat);
        }
    }

    fn check_online(&self) -> Result<(), InventoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(InventoryError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SeatInventory for MockInventory {
    fn lock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<LockGranted, LockError>> {
        let this = self.clone();
        Box::pin(async move {
            this.calls.record(InventoryCall::Lock(seat_id.clone()));
            this.check_online()?;

            let mut seats = this.seats.lock().unwrap_or_else(PoisonError::into_inner);
            let seat = seats
                .iter_mut()
                .find(|seat| seat.seat_id == seat_id)
                .ok_or_else(|| InventoryError::UnexpectedStatus {
                    status: 404,
                    message: format!("seat {seat_id} not found"),
                })?;

            match seat.locked_by.clone() {
                Some(holder) if holder == user_id => Ok(LockGranted),
                Some(_) => Err(LockDenied::AlreadyLocked.into()),
                None if !seat.is_available => Err(LockDenied::AlreadySold.into()),
                None => {
                    seat.is_available = false;
                    seat.locked_by = Some(user_id);
                    Ok(LockGranted)
                },
            }
        })
    }

    fn unlock_seat(&self, seat_id: SeatId, user_id: UserId) -> ServiceFuture<Result<Unlocked, InventoryError>> {
        let this = self.clone();
        Box::pin(async move {
            this.calls.record(InventoryCall::Unlock(seat_id.clone()));
            this.check_online()?;

            let mut seats = this.seats.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(seat) = seats
                .iter_mut()
                .find(|seat| seat.seat_id == seat_id && seat.locked_by.as_ref() == Some(&user_id))
            {
                seat.is_available = true;
                seat.locked_by = None;
            }
            Ok(Unlocked)
        })
    }

    fn fetch_seat_map(&self, show_id: ShowId) -> ServiceFuture<Result<Vec<SeatStatus>, InventoryError>> {
        let this = self.clone();
        Box::pin(async move {
            this.calls.record(InventoryCall::FetchSeatMap(show_id));
            this.check_online()?;
            Ok(this.seats.lock().unwrap_or_else(PoisonError::into_inner).clone())
        })
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog serving a fixed data set
#[derive(Clone, Debug, Default)]
pub struct MockCatalog {
    /// Searchable movies
    pub movies: Vec<Movie>,
    /// Theaters in every city
    pub theaters: Vec<Theater>,
    /// Showtimes on every date
    pub showtimes: Vec<Showtime>,
    /// Layout shared by every theater
    pub layout: Vec<LayoutRow>,
    /// Prices shared by every show
    pub prices: HashMap<SeatType, Money>,
    /// Menu shared by every show
    pub food: Vec<FoodItem>,
    /// Fail every request when set
    pub failure: Option<CatalogError>,
}

impl MockCatalog {
    /// A small cinema: one theater, two showtimes, rows A (Classic, 200),
    /// B (Classic Plus, 250) and C (Premium, 350), popcorn at 120 and cola at 80
    #[must_use]
    pub fn demo() -> Self {
        let theater = Theater {
            id: TheaterId::new("th-1"),
            name: "Marquee Central".to_string(),
            address: Some("FC Road, Pune".to_string()),
        };
        Self {
            movies: vec![
                movie("mv-1", "Inception", "Sci-Fi"),
                movie("mv-2", "Interstellar", "Sci-Fi"),
                movie("mv-3", "The Grand Budapest Hotel", "Comedy"),
            ],
            showtimes: vec![
                Showtime {
                    show_id: ShowId::new("sh-2"),
                    theater_id: theater.id.clone(),
                    time: "21:45".to_string(),
                },
                Showtime {
                    show_id: ShowId::new("sh-1"),
                    theater_id: theater.id.clone(),
                    time: "18:30".to_string(),
                },
            ],
            theaters: vec![theater],
            layout: vec![
                layout_row("A", 10, SeatType::Classic),
                layout_row("B", 10, SeatType::ClassicPlus),
                layout_row("C", 8, SeatType::Premium),
            ],
            prices: HashMap::from([
                (SeatType::Classic, Money::new(200)),
                (SeatType::ClassicPlus, Money::new(250)),
                (SeatType::Premium, Money::new(350)),
            ]),
            food: vec![
                FoodItem {
                    id: FoodItemId::new("popcorn"),
                    name: "Popcorn".to_string(),
                    price: Money::new(120),
                },
                FoodItem {
                    id: FoodItemId::new("cola"),
                    name: "Cola".to_string(),
                    price: Money::new(80),
                },
            ],
            failure: None,
        }
    }

    /// Seat map matching this catalog's layout for `show_id`
    #[must_use]
    pub fn seat_grid(&self, show_id: &ShowId) -> Vec<SeatStatus> {
        let rows: Vec<(&str, u32)> = self
            .layout
            .iter()
            .map(|row| (row.row_label.as_str(), row.seat_count))
            .collect();
        seat_grid(show_id, &rows)
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn ShowCatalog> {
        Arc::new(self)
    }

    fn respond<T: Send + 'static>(&self, value: T) -> ServiceFuture<Result<T, CatalogError>> {
        let failure = self.failure.clone();
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(value),
            }
        })
    }
}

fn movie(id: &str, title: &str, genre: &str) -> Movie {
    Movie {
        id: MovieId::new(id),
        title: title.to_string(),
        language: Some("English".to_string()),
        genre: Some(genre.to_string()),
    }
}

fn layout_row(label: &str, seat_count: u32, seat_type: SeatType) -> LayoutRow {
    LayoutRow {
        row_label: label.to_string(),
        seat_count,
        seat_type,
    }
}

impl ShowCatalog for MockCatalog {
    fn search_movies(&self, query: String) -> ServiceFuture<Result<Vec<Movie>, CatalogError>> {
        let query = query.to_lowercase();
        let found = self
            .movies
            .iter()
            .filter(|movie| {
                movie.title.to_lowercase().contains(&query)
                    || movie
                        .genre
                        .as_ref()
                        .is_some_and(|genre| genre.to_lowercase().contains(&query))
            })
            .cloned()
            .collect();
        self.respond(found)
    }

    fn theaters_in_city(&self, _city: String) -> ServiceFuture<Result<Vec<Theater>, CatalogError>> {
        self.respond(self.theaters.clone())
    }

    fn showtimes(
        &self,
        _movie_id: MovieId,
        _city: String,
        _date: NaiveDate,
    ) -> ServiceFuture<Result<Vec<Showtime>, CatalogError>> {
        self.respond(self.showtimes.clone())
    }

    fn seat_layout(&self, _theater_id: TheaterId) -> ServiceFuture<Result<Vec<LayoutRow>, CatalogError>> {
        self.respond(self.layout.clone())
    }

    fn seat_prices(&self, _show_id: ShowId) -> ServiceFuture<Result<HashMap<SeatType, Money>, CatalogError>> {
        self.respond(self.prices.clone())
    }

    fn food_menu(&self, _show_id: ShowId) -> ServiceFuture<Result<Vec<FoodItem>, CatalogError>> {
        self.respond(self.food.clone())
    }
}

// ============================================================================
// Payments
// ============================================================================

/// A call received by [`MockPaymentBackend`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentCall {
    /// `create_order`
    CreateOrder(Money),
    /// `verify_and_book`
    VerifyAndBook {
        /// Proof presented
        proof: PaymentProof,
        /// Ticket requested
        entry: TicketEntry,
    },
    /// `update_ticket`
    UpdateTicket(TicketUpdate),
}

/// Payment backend that creates numbered orders and tickets
#[derive(Clone, Debug, Default)]
pub struct MockPaymentBackend {
    order_failure: Option<String>,
    verification_failure: Option<String>,
    update_failure: Option<TicketUpdateError>,
    counter: Arc<AtomicU64>,
    calls: CallLog<PaymentCall>,
}

impl MockPaymentBackend {
    /// Backend that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to create orders
    #[must_use]
    pub fn failing_orders(mut self, message: &str) -> Self {
        self.order_failure = Some(message.to_string());
        self
    }

    /// Refuse to verify payments
    #[must_use]
    pub fn failing_verification(mut self, message: &str) -> Self {
        self.verification_failure = Some(message.to_string());
        self
    }

    /// Refuse ticket updates with `error`
    #[must_use]
    pub fn failing_updates(mut self, error: TicketUpdateError) -> Self {
        self.update_failure = Some(error);
        self
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<PaymentCall> {
        self.calls.calls()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn PaymentBackend> {
        Arc::new(self)
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl PaymentBackend for MockPaymentBackend {
    fn create_order(&self, amount: Money) -> ServiceFuture<Result<OrderRef, PaymentError>> {
        let this = self.clone();
        Box::pin(async move {
            this.calls.record(PaymentCall::CreateOrder(amount));
            if let Some(message) = this.order_failure.clone() {
                return Err(PaymentError::OrderCreationFailed(message));
            }
            Ok(OrderRef {
                order_id: OrderId::new(format!("order_{}", this.next())),
                // The provider works in the currency's minor unit.
                amount: amount.amount() * 100,
                currency: "INR".to_string(),
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
            this.calls.record(PaymentCall::VerifyAndBook { proof, entry });
            if let Some(message) = this.verification_failure.clone() {
                return Err(PaymentError::VerificationFailed(message));
            }
            Ok(TicketId::new(format!("ticket_{}", this.next())))
        })
    }

    fn update_ticket(&self, update: TicketUpdate) -> ServiceFuture<Result<(), TicketUpdateError>> {
        let this = self.clone();
        Box::pin(async move {
            this.calls.record(PaymentCall::UpdateTicket(update));
            match this.update_failure.clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}
