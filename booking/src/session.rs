//! Booking session state.
//!
//! One [`BookingSession`] describes one ticket purchase or update. It is only
//! ever mutated by the booking reducer.

use crate::error::{BookingError, PricingError};
use crate::payment::{OrderRef, TicketEntry};
use crate::pricing::{PricingPolicy, Quote, QuoteInput, quote};
use crate::types::{
    BookingMode, FoodItemId, Movie, OrderId, SeatId, SeatLabel, SeatLockState, SeatPlan,
    SeatStatus, SessionId, ShowId, Showtime, Theater, TheaterShowtimes, TicketId, UserId,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Stage of the booking flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    /// Nothing chosen yet
    #[default]
    Idle,
    /// A movie is chosen; pick a date
    MovieSelected,
    /// A date is chosen; pick a theater
    DateSelected,
    /// A theater is chosen; pick a showtime
    TheaterSelected,
    /// A showtime is chosen; pick how many seats
    ShowtimeSelected,
    /// Seat count is set; pick seats
    SeatCountChosen,
    /// At least one seat is held
    SeatsSelected,
    /// Seats are confirmed; add food
    FoodChosen,
    /// Ready to pay
    PaymentPending,
    /// Paid and ticketed
    Completed,
}

impl BookingStatus {
    /// Whether seats are being picked
    #[must_use]
    pub const fn is_selecting_seats(self) -> bool {
        matches!(self, Self::SeatCountChosen | Self::SeatsSelected)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::MovieSelected => "movie selected",
            Self::DateSelected => "date selected",
            Self::TheaterSelected => "theater selected",
            Self::ShowtimeSelected => "showtime selected",
            Self::SeatCountChosen => "seat count chosen",
            Self::SeatsSelected => "seats selected",
            Self::FoodChosen => "food chosen",
            Self::PaymentPending => "payment pending",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Seat map
// ============================================================================

/// Which request is in flight for a seat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// `lock_seat`
    Lock,
    /// `unlock_seat`
    Unlock,
}

/// The one outstanding inventory request for a seat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Sequence number the response must echo
    pub seq: u64,
    /// Lock or unlock
    pub kind: RequestKind,
    /// The user toggled the seat off while its lock was in flight
    pub withdrawn: bool,
}

/// Cached state of one seat
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatEntry {
    /// Identifier used for lock and unlock
    pub seat_id: SeatId,
    /// Last known lock state
    pub lock: SeatLockState,
    /// Outstanding request, at most one
    pub pending: Option<PendingRequest>,
}

impl SeatEntry {
    fn from_status(status: &SeatStatus, me: &UserId) -> Self {
        Self {
            seat_id: status.seat_id.clone(),
            lock: lock_state(status, me),
            pending: None,
        }
    }
}

/// Translate a server seat record into the client's view of it
///
/// A seat held by this user shows as `LockedByMe` but is not selected until
/// the user toggles it again, which re-confirms the lock.
#[must_use]
pub fn lock_state(status: &SeatStatus, me: &UserId) -> SeatLockState {
    match &status.locked_by {
        Some(holder) if holder == me => SeatLockState::LockedByMe,
        Some(_) => SeatLockState::LockedByOther,
        None if !status.is_available => SeatLockState::Sold,
        None => SeatLockState::Unlocked,
    }
}

/// Eventually-consistent cache of seat availability for the chosen show
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatMap {
    entries: BTreeMap<SeatLabel, SeatEntry>,
}

impl SeatMap {
    /// Build the cache from a server snapshot
    #[must_use]
    pub fn from_statuses(statuses: &[SeatStatus], me: &UserId) -> Self {
        Self {
            entries: statuses
                .iter()
                .map(|status| (status.seat_no.clone(), SeatEntry::from_status(status, me)))
                .collect(),
        }
    }

    /// Cached entry for a seat
    #[must_use]
    pub fn get(&self, seat: &SeatLabel) -> Option<&SeatEntry> {
        self.entries.get(seat)
    }

    /// Mutable cached entry for a seat
    pub fn get_mut(&mut self, seat: &SeatLabel) -> Option<&mut SeatEntry> {
        self.entries.get_mut(seat)
    }

    /// Last known lock state of a seat
    #[must_use]
    pub fn lock_state(&self, seat: &SeatLabel) -> Option<SeatLockState> {
        self.entries.get(seat).map(|entry| entry.lock)
    }

    /// Whether a request is in flight for a seat
    #[must_use]
    pub fn is_pending(&self, seat: &SeatLabel) -> bool {
        self.entries.get(seat).is_some_and(|entry| entry.pending.is_some())
    }

    /// Lock requests in flight that still count toward the seat quota
    #[must_use]
    pub fn pending_locks(&self) -> usize {
        self.entries
            .values()
            .filter_map(|entry| entry.pending)
            .filter(|pending| pending.kind == RequestKind::Lock && !pending.withdrawn)
            .count()
    }

    /// Whether `seat_id` has a request in flight
    #[must_use]
    pub fn has_pending_for(&self, seat_id: &SeatId) -> bool {
        self.entries
            .values()
            .any(|entry| &entry.seat_id == seat_id && entry.pending.is_some())
    }

    /// Label of the seat with id `seat_id`
    #[must_use]
    pub fn label_of(&self, seat_id: &SeatId) -> Option<&SeatLabel> {
        self.entries
            .iter()
            .find(|(_, entry)| &entry.seat_id == seat_id)
            .map(|(label, _)| label)
    }

    /// Every cached seat, ordered by label
    pub fn iter(&self) -> impl Iterator<Item = (&SeatLabel, &SeatEntry)> {
        self.entries.iter()
    }

    /// Labels of seats whose lock state is `state`
    #[must_use]
    pub fn labels_in(&self, state: SeatLockState) -> Vec<SeatLabel> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.lock == state)
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Number of cached seats
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a fresh server snapshot into the cache
    ///
    /// Seats with a request in flight, and seats in `selected`, keep their
    /// local state: their truth arrives with the pending response.
    pub fn merge(&mut self, statuses: &[SeatStatus], me: &UserId, selected: &[SeatLabel]) {
        for status in statuses {
            if selected.contains(&status.seat_no) {
                continue;
            }
            match self.entries.get_mut(&status.seat_no) {
                Some(entry) if entry.pending.is_some() => {},
                Some(entry) => entry.lock = lock_state(status, me),
                None => {
                    self.entries
                        .insert(status.seat_no.clone(), SeatEntry::from_status(status, me));
                },
            }
        }
    }
}

// ============================================================================
// Notices and payment
// ============================================================================

/// Severity of a [`Notice`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Progress or confirmation
    Info,
    /// The action was refused; pick something else
    Warning,
    /// A collaborator failed
    Error,
}

/// Latest message for the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Text to show
    pub text: String,
}

impl Notice {
    /// Informational notice
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    /// Warning notice
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    /// Error notice
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Progress of the payment handoff
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PaymentPhase {
    /// No payment step running
    #[default]
    Idle,
    /// Waiting for the backend to create an order
    CreatingOrder,
    /// The checkout is open
    AwaitingProvider {
        /// Order being paid
        order: OrderRef,
    },
    /// Waiting for the backend to verify the payment
    Verifying {
        /// Order that was paid
        order_id: OrderId,
    },
}

impl PaymentPhase {
    /// Whether a backend call for the payment is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::CreatingOrder | Self::Verifying { .. })
    }
}

/// A checkout the user walked away from while it was still open
///
/// The provider may still settle it, so it is kept until the session restarts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupersededOrder {
    /// Order the checkout was opened for
    pub order: OrderRef,
    /// Ticket the order was priced for
    pub entry: Option<TicketEntry>,
}

/// Choices offered at the current step
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepOptions {
    /// Bookable dates
    pub dates: Vec<NaiveDate>,
    /// Theaters showing the movie on the chosen date
    pub theaters: Vec<TheaterShowtimes>,
    /// Rows, seats and menu of the chosen show
    pub plan: Option<SeatPlan>,
    /// A lookup for this step is in flight
    pub loading: bool,
}

// ============================================================================
// Session
// ============================================================================

/// One ticket purchase or update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookingSession {
    /// Tag echoed by every collaborator response
    pub id: SessionId,
    /// Flow stage
    pub status: BookingStatus,
    /// New booking or ticket move
    pub mode: BookingMode,
    /// Chosen movie
    pub movie: Option<Movie>,
    /// Chosen date
    pub date: Option<NaiveDate>,
    /// Chosen theater
    pub theater: Option<Theater>,
    /// Chosen showtime
    pub showtime: Option<Showtime>,
    /// Target number of seats
    pub seat_count: Option<u32>,
    /// Seats locked for this user, in selection order
    pub selected_seats: Vec<SeatLabel>,
    /// Seat availability cache
    pub seats: SeatMap,
    /// Food and quantities
    pub selected_food: BTreeMap<FoodItemId, u32>,
    /// What the user can pick next
    pub options: StepOptions,
    /// Payment handoff progress
    pub payment: PaymentPhase,
    /// Checkouts left open by a reopen or a step back
    pub superseded_orders: Vec<SupersededOrder>,
    /// A ticket move is in flight
    pub ticket_update_pending: bool,
    /// Issued ticket, once completed
    pub ticket_id: Option<TicketId>,
    /// Latest message for the user
    pub notice: Option<Notice>,
    /// Latest collaborator error
    pub last_error: Option<BookingError>,
    next_seq: u64,
}

impl BookingSession {
    /// Chosen show
    #[must_use]
    pub fn show_id(&self) -> Option<&ShowId> {
        self.showtime.as_ref().map(|showtime| &showtime.show_id)
    }

    /// Selected seats plus lock requests that will count once granted
    #[must_use]
    pub fn quota_used(&self) -> usize {
        self.selected_seats.len() + self.seats.pending_locks()
    }

    /// Whether `seat` is selected
    #[must_use]
    pub fn is_selected(&self, seat: &SeatLabel) -> bool {
        self.selected_seats.contains(seat)
    }

    /// Amount due for the current selection
    ///
    /// # Errors
    ///
    /// Returns [`PricingError`] if the selection references rows or food the
    /// loaded plan does not know.
    pub fn quote(&self, policy: &PricingPolicy) -> Result<Quote, PricingError> {
        let (rows, menu) = self
            .options
            .plan
            .as_ref()
            .map_or((&[][..], &[][..]), |plan| (&plan.rows[..], &plan.food[..]));
        quote(
            &QuoteInput {
                seats: &self.selected_seats,
                rows,
                food: &self.selected_food,
                menu,
                mode: &self.mode,
            },
            policy,
        )
    }

    /// The ticket a verified payment should create
    ///
    /// Food ids repeat once per unit ordered. `None` before a show is chosen.
    #[must_use]
    pub fn ticket_entry(&self, user_id: &UserId) -> Option<TicketEntry> {
        Some(TicketEntry {
            show_id: self.show_id()?.clone(),
            user_id: user_id.clone(),
            requested_seats: self.selected_seats.clone(),
            requested_food_ids: self
                .selected_food
                .iter()
                .flat_map(|(id, quantity)| {
                    std::iter::repeat_n(id.clone(), usize::try_from(*quantity).unwrap_or(0))
                })
                .collect(),
        })
    }

    /// Next request sequence number
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Drop a finished or abandoned attempt and start fresh under a new id
    pub fn restart(&mut self) {
        *self = Self::default();
    }

    /// Set the user-facing notice
    pub fn notify(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    /// Record a collaborator error and surface it
    pub fn fail(&mut self, error: impl Into<BookingError>, text: impl Into<String>) {
        self.last_error = Some(error.into());
        self.notice = Some(Notice::error(text));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::Money;

    fn status(label: &str, available: bool, holder: Option<&str>) -> SeatStatus {
        SeatStatus {
            seat_id: SeatId::new(format!("id-{label}")),
            seat_no: SeatLabel::parse(label).unwrap(),
            is_available: available,
            locked_by: holder.map(UserId::new),
        }
    }

    fn label(raw: &str) -> SeatLabel {
        SeatLabel::parse(raw).unwrap()
    }

    #[test]
    fn server_records_translate_to_lock_states() {
        let me = UserId::new("me");
        let map = SeatMap::from_statuses(
            &[
                status("A1", true, None),
                status("A2", false, None),
                status("A3", false, Some("other")),
                status("A4", false, Some("me")),
            ],
            &me,
        );

        assert_eq!(map.lock_state(&label("A1")), Some(SeatLockState::Unlocked));
        assert_eq!(map.lock_state(&label("A2")), Some(SeatLockState::Sold));
        assert_eq!(map.lock_state(&label("A3")), Some(SeatLockState::LockedByOther));
        assert_eq!(map.lock_state(&label("A4")), Some(SeatLockState::LockedByMe));
    }

    #[test]
    fn merge_keeps_pending_and_selected_seats() {
        let me = UserId::new("me");
        let mut map = SeatMap::from_statuses(
            &[status("A1", true, None), status("A2", true, None), status("A3", true, None)],
            &me,
        );
        map.get_mut(&label("A2")).unwrap().pending = Some(PendingRequest {
            seq: 1,
            kind: RequestKind::Lock,
            withdrawn: false,
        });

        map.merge(
            &[status("A1", false, None), status("A2", false, Some("x")), status("A3", false, Some("me"))],
            &me,
            &[label("A3")],
        );

        assert_eq!(map.lock_state(&label("A1")), Some(SeatLockState::Sold));
        assert_eq!(map.lock_state(&label("A2")), Some(SeatLockState::Unlocked));
        assert_eq!(map.lock_state(&label("A3")), Some(SeatLockState::Unlocked));
        assert_eq!(map.pending_locks(), 1);
    }

    #[test]
    fn ticket_entry_repeats_food_per_unit() {
        let mut session = BookingSession {
            showtime: Some(Showtime {
                show_id: ShowId::new("sh-1"),
                theater_id: "th-1".into(),
                time: "18:30".to_string(),
            }),
            selected_seats: vec![label("A1"), label("A2")],
            ..BookingSession::default()
        };
        session.selected_food.insert(FoodItemId::new("popcorn"), 2);
        session.selected_food.insert(FoodItemId::new("cola"), 1);

        let entry = session.ticket_entry(&UserId::new("u1")).unwrap();
        assert_eq!(
            entry.requested_food_ids,
            vec![FoodItemId::new("cola"), FoodItemId::new("popcorn"), FoodItemId::new("popcorn")]
        );
        assert_eq!(entry.requested_seats.len(), 2);
    }

    #[test]
    fn restart_mints_a_new_session_id() {
        let mut session = BookingSession::default();
        let before = session.id;
        session.seat_count = Some(2);

        session.restart();

        assert_ne!(session.id, before);
        assert_eq!(session.seat_count, None);
    }

    #[test]
    fn quote_without_a_plan_only_prices_an_empty_selection() {
        let session = BookingSession::default();
        assert_eq!(session.quote(&PricingPolicy::default()).unwrap().total, Money::ZERO);
    }
}
