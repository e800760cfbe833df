//! Booking state machine.
//!
//! Navigation between stages lives here; seat locking is in [`seats`] and
//! the ticket update and payment handoff in [`checkout`]. Every collaborator
//! call is returned as an [`Effect`] whose result comes back as a response
//! action tagged with the session that asked for it.

mod checkout;
mod seats;


use crate::actions::BookingAction;
use crate::catalog::{load_seat_plan, load_theater_showtimes};
use crate::environment::BookingEnvironment;
use crate::error::{BookingError, CatalogError, InventoryError};
use crate::payment::CheckoutOutcome;
use crate::session::{BookingSession, BookingStatus, Notice, PaymentPhase, SeatMap};
use crate::types::{
    BookingMode, FoodItemId, Money, Movie, SeatLockState, SeatPlan, SeatStatus, ShowId, Showtime,
    Theater, TheaterId, TheaterShowtimes, TicketId,
};
use chrono::{Days, NaiveDate};
use marquee_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::sync::Arc;

/// Number of bookable days, starting today
pub const BOOKABLE_DAYS: u64 = 7;

/// Most seats one booking may hold
pub const MAX_SEATS: u32 = 10;

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Reducer for a booking session
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Refuse an intent, leaving state untouched apart from the notice
    fn reject(state: &mut BookingSession, text: impl Into<String>) -> Effects {
        let notice = Notice::warning(text);
        tracing::debug!(session = %state.id, status = %state.status, reason = %notice.text, "Intent rejected");
        state.notify(notice);
        SmallVec::new()
    }

    fn transition(state: &mut BookingSession, to: BookingStatus) {
        tracing::debug!(session = %state.id, from = %state.status, %to, "Booking transition");
        state.status = to;
    }

    fn discard(state: &BookingSession, action: &'static str, why: &'static str) -> Effects {
        tracing::warn!(session = %state.id, status = %state.status, action, why, "Discarding response");
        metrics::counter!("booking.responses.discarded", "action" => action).increment(1);
        SmallVec::new()
    }

    /// Dates from `today` through the end of the booking window
    #[must_use]
    pub fn bookable_dates(today: NaiveDate) -> Vec<NaiveDate> {
        (0..BOOKABLE_DAYS)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .collect()
    }

    /// Release everything this session holds and start a fresh one
    fn abandon(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        let releases = Self::release_all(state, env);
        if state.status != BookingStatus::Idle {
            tracing::info!(session = %state.id, status = %state.status, released = releases.len(), "Abandoning booking session");
        }
        state.restart();
        releases
    }

    // ========== Navigation ==========

    fn select_movie(state: &mut BookingSession, movie: Movie, env: &BookingEnvironment) -> Effects {
        if state.payment.is_busy() || state.ticket_update_pending {
            return Self::reject(state, "A payment step is in progress. Please wait for it to finish.");
        }

        let effects = Self::abandon(state, env);
        state.options.dates = Self::bookable_dates(env.clock.now().date_naive());
        state.notify(Notice::info(format!("Which date would you like to watch {}?", movie.title)));
        state.movie = Some(movie);
        Self::transition(state, BookingStatus::MovieSelected);
        effects
    }

    fn start_update(state: &mut BookingSession, update: UpdateTarget, env: &BookingEnvironment) -> Effects {
        if state.payment.is_busy() || state.ticket_update_pending {
            return Self::reject(state, "A payment step is in progress. Please wait for it to finish.");
        }

        let mut effects = Self::abandon(state, env);
        tracing::info!(session = %state.id, ticket_id = %update.original_ticket_id, "Updating an existing ticket");

        state.mode = BookingMode::UpdateExisting {
            original_ticket_id: update.original_ticket_id,
            original_fare: update.original_fare,
        };
        state.options.dates = vec![update.date];
        state.movie = Some(update.movie);
        state.date = Some(update.date);
        state.theater = Some(update.theater);
        state.showtime = Some(update.showtime);
        state.seat_count = Some(1);
        Self::transition(state, BookingStatus::ShowtimeSelected);
        effects.extend(Self::load_plan(state, env));
        effects
    }

    fn select_date(state: &mut BookingSession, date: NaiveDate, env: &BookingEnvironment) -> Effects {
        if !matches!(state.status, BookingStatus::MovieSelected | BookingStatus::DateSelected) {
            return Self::reject(state, "Pick a movie before choosing a date.");
        }
        if !state.options.dates.contains(&date) {
            return Self::reject(state, "Please pick one of the offered dates.");
        }
        let Some(movie_id) = state.movie.as_ref().map(|movie| movie.id.clone()) else {
            return Self::reject(state, "Pick a movie before choosing a date.");
        };

        state.date = Some(date);
        state.theater = None;
        state.options.theaters.clear();
        state.options.loading = true;
        state.notify(Notice::info(format!("Finding theaters for {date}...")));
        Self::transition(state, BookingStatus::DateSelected);

        let catalog = Arc::clone(&env.catalog);
        let city = env.context.city.clone();
        let session = state.id;
        smallvec![Effect::Future(Box::pin(async move {
            let result = load_theater_showtimes(catalog.as_ref(), movie_id, city, date).await;
            Some(BookingAction::TheatersLoaded {
                session,
                date,
                result,
            })
        }))]
    }

    fn theaters_loaded(
        state: &mut BookingSession,
        date: NaiveDate,
        result: Result<Vec<TheaterShowtimes>, CatalogError>,
    ) -> Effects {
        if state.status != BookingStatus::DateSelected || state.date != Some(date) {
            return Self::discard(state, "TheatersLoaded", "date no longer selected");
        }
        state.options.loading = false;

        let title = state.movie.as_ref().map_or_else(String::new, |m| m.title.clone());
        match result {
            Ok(theaters) if theaters.is_empty() => {
                state.notify(Notice::warning(format!(
                    "No theaters are showing {title} on {date}. Try another date."
                )));
            },
            Ok(theaters) => {
                tracing::debug!(session = %state.id, theaters = theaters.len(), "Theaters loaded");
                state.options.theaters = theaters;
                state.notify(Notice::info(format!("Select a theater for {title} on {date}.")));
            },
            Err(error) => {
                let text = format!("Could not load theaters: {error}");
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }

    fn select_theater(state: &mut BookingSession, theater_id: &TheaterId) -> Effects {
        if !matches!(state.status, BookingStatus::DateSelected | BookingStatus::TheaterSelected) {
            return Self::reject(state, "Pick a date before choosing a theater.");
        }
        let Some(theater) = state
            .options
            .theaters
            .iter()
            .find(|listing| &listing.theater.id == theater_id)
            .map(|listing| listing.theater.clone())
        else {
            return Self::reject(state, "Invalid theater selection.");
        };

        state.theater = Some(theater);
        state.showtime = None;
        state.notify(Notice::info("Select a showtime."));
        Self::transition(state, BookingStatus::TheaterSelected);
        SmallVec::new()
    }

    fn select_showtime(state: &mut BookingSession, show_id: &ShowId, env: &BookingEnvironment) -> Effects {
        if state.status != BookingStatus::TheaterSelected {
            return Self::reject(state, "Pick a theater before choosing a showtime.");
        }
        let showtime = state.theater.as_ref().and_then(|theater| {
            state
                .options
                .theaters
                .iter()
                .find(|listing| listing.theater.id == theater.id)
                .and_then(|listing| listing.showtimes.iter().find(|s| &s.show_id == show_id))
                .cloned()
        });
        let Some(showtime) = showtime else {
            return Self::reject(state, "Invalid showtime selection.");
        };

        state.showtime = Some(showtime);
        Self::transition(state, BookingStatus::ShowtimeSelected);
        Self::load_plan(state, env)
    }

    fn load_plan(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        let (Some(theater), Some(show_id)) = (state.theater.as_ref(), state.show_id()) else {
            return SmallVec::new();
        };
        let theater_id = theater.id.clone();
        let show_id = show_id.clone();

        state.options.plan = None;
        state.seats = SeatMap::default();
        state.options.loading = true;
        state.notify(Notice::info("Loading seats..."));

        let catalog = Arc::clone(&env.catalog);
        let inventory = Arc::clone(&env.inventory);
        let session = state.id;
        smallvec![Effect::Future(Box::pin(async move {
            let result =
                load_seat_plan(catalog.as_ref(), inventory.as_ref(), theater_id, show_id.clone()).await;
            Some(BookingAction::SeatPlanLoaded {
                session,
                show_id,
                result,
            })
        }))]
    }

    fn seat_plan_loaded(
        state: &mut BookingSession,
        show_id: &ShowId,
        result: Result<SeatPlan, BookingError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if state.status != BookingStatus::ShowtimeSelected || state.show_id() != Some(show_id) {
            return Self::discard(state, "SeatPlanLoaded", "show no longer selected");
        }
        state.options.loading = false;

        match result {
            Ok(plan) => {
                state.seats = SeatMap::from_statuses(&plan.seats, &env.context.user_id);
                tracing::debug!(session = %state.id, %show_id, seats = state.seats.len(), "Seat plan loaded");
                state.options.plan = Some(plan);
                if state.mode.is_update() {
                    state.notify(Notice::info("Select your new seat."));
                    Self::transition(state, BookingStatus::SeatCountChosen);
                } else {
                    state.notify(Notice::info("How many seats would you like to book?"));
                }
            },
            Err(error) => {
                let text = format!("Could not load seats: {error}");
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }

    fn choose_seat_count(state: &mut BookingSession, count: u32) -> Effects {
        if state.mode.is_update() {
            return Self::reject(state, "A ticket update moves exactly one seat.");
        }
        if !matches!(
            state.status,
            BookingStatus::ShowtimeSelected | BookingStatus::SeatCountChosen | BookingStatus::SeatsSelected
        ) {
            return Self::reject(state, "Pick a showtime before choosing how many seats.");
        }
        if state.options.plan.is_none() {
            return Self::reject(state, "Seats are still loading.");
        }
        if !(1..=MAX_SEATS).contains(&count) {
            return Self::reject(state, format!("Please choose between 1 and {MAX_SEATS} seats."));
        }
        let held = state.quota_used();
        if usize::try_from(count).is_ok_and(|count| count < held) {
            return Self::reject(
                state,
                format!("You already hold {held} seat(s). Release some before lowering the count."),
            );
        }

        state.seat_count = Some(count);
        state.notify(Notice::info("Select your seats."));
        if state.status == BookingStatus::ShowtimeSelected {
            Self::transition(state, BookingStatus::SeatCountChosen);
        }
        Self::sync_selection_status(state);
        SmallVec::new()
    }

    fn confirm_seats(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        if state.status != BookingStatus::SeatsSelected {
            return Self::reject(state, "Select your seats first.");
        }
        let count = state.seat_count.unwrap_or(0);
        if state.selected_seats.len() != usize::try_from(count).unwrap_or(usize::MAX)
            || state.seats.pending_locks() > 0
        {
            return Self::reject(state, format!("Please select exactly {count} seat(s)."));
        }

        if state.mode.is_update() {
            return Self::request_ticket_update(state, env);
        }

        state.notify(Notice::info("Add food if you like, then continue to payment."));
        Self::transition(state, BookingStatus::FoodChosen);
        SmallVec::new()
    }

    fn add_food(state: &mut BookingSession, food_id: FoodItemId) -> Effects {
        if state.status != BookingStatus::FoodChosen {
            return Self::reject(state, "Food can be added once your seats are confirmed.");
        }
        let Some(name) = Self::menu_name(state, &food_id) else {
            return Self::reject(state, "That item is not on the menu.");
        };

        let quantity = state.selected_food.entry(food_id).or_insert(0);
        *quantity += 1;
        let text = format!("{name} x{quantity}");
        state.notify(Notice::info(text));
        SmallVec::new()
    }

    fn remove_food(state: &mut BookingSession, food_id: &FoodItemId) -> Effects {
        if state.status != BookingStatus::FoodChosen {
            return Self::reject(state, "Food can be changed once your seats are confirmed.");
        }
        if let Some(quantity) = state.selected_food.get_mut(food_id) {
            *quantity = quantity.saturating_sub(1);
            if *quantity == 0 {
                state.selected_food.remove(food_id);
            }
        }
        SmallVec::new()
    }

    fn menu_name(state: &BookingSession, food_id: &FoodItemId) -> Option<String> {
        state
            .options
            .plan
            .as_ref()?
            .food
            .iter()
            .find(|item| &item.id == food_id)
            .map(|item| item.name.clone())
    }

    fn proceed_to_payment(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        if state.status != BookingStatus::FoodChosen {
            return Self::reject(state, "Confirm your seats before paying.");
        }
        match state.quote(&env.pricing) {
            Ok(quote) => {
                state.notify(Notice::info(format!(
                    "Please review your booking and proceed to payment. Amount due: {} {}",
                    quote.total, env.context.currency
                )));
                Self::transition(state, BookingStatus::PaymentPending);
            },
            Err(error) => {
                let text = format!("Could not price this booking: {error}");
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }

    fn back(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        match state.status {
            BookingStatus::Idle | BookingStatus::Completed => {
                Self::reject(state, "There is no step to go back to.")
            },
            BookingStatus::MovieSelected => Self::abandon(state, env),
            BookingStatus::DateSelected => {
                state.date = None;
                state.options.theaters.clear();
                state.options.loading = false;
                Self::transition(state, BookingStatus::MovieSelected);
                SmallVec::new()
            },
            BookingStatus::TheaterSelected => {
                state.theater = None;
                Self::transition(state, BookingStatus::DateSelected);
                SmallVec::new()
            },
            BookingStatus::ShowtimeSelected | BookingStatus::SeatCountChosen | BookingStatus::SeatsSelected
                if state.mode.is_update() =>
            {
                if state.ticket_update_pending {
                    return Self::reject(state, "Your ticket update is in progress.");
                }
                Self::abandon(state, env)
            },
            BookingStatus::ShowtimeSelected => {
                state.showtime = None;
                state.options.plan = None;
                state.options.loading = false;
                state.seats = SeatMap::default();
                Self::transition(state, BookingStatus::TheaterSelected);
                SmallVec::new()
            },
            BookingStatus::SeatCountChosen | BookingStatus::SeatsSelected => {
                let effects = Self::release_selection(state, env);
                state.seat_count = None;
                Self::transition(state, BookingStatus::ShowtimeSelected);
                effects
            },
            BookingStatus::FoodChosen => {
                Self::transition(state, BookingStatus::SeatsSelected);
                SmallVec::new()
            },
            BookingStatus::PaymentPending => {
                if state.mode.is_update() {
                    return Self::reject(
                        state,
                        "Your ticket has already been moved. Complete the payment or cancel.",
                    );
                }
                if state.payment.is_busy() {
                    return Self::reject(state, "A payment step is in progress. Please wait for it to finish.");
                }
                Self::supersede_checkout(state, env);
                state.payment = PaymentPhase::Idle;
                Self::transition(state, BookingStatus::FoodChosen);
                SmallVec::new()
            },
        }
    }

    fn cancel(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        match state.status {
            BookingStatus::Idle => SmallVec::new(),
            BookingStatus::Completed => {
                state.restart();
                SmallVec::new()
            },
            _ => {
                if state.payment.is_busy() {
                    tracing::warn!(session = %state.id, payment = ?state.payment, "Cancelling while a payment call is in flight");
                }
                let effects = Self::abandon(state, env);
                state.notify(Notice::info(
                    "Ticket Booking cancelled. You can start a new request anytime.",
                ));
                effects
            },
        }
    }

    fn refresh_seat_map(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        match state.show_id().cloned() {
            Some(show_id) if state.options.plan.is_some() && state.status != BookingStatus::Completed => {
                smallvec![Self::fetch_seat_map(state.id, show_id, env)]
            },
            _ => Self::reject(state, "No show is selected."),
        }
    }

    fn seat_map_refreshed(
        state: &mut BookingSession,
        show_id: &ShowId,
        result: Result<Vec<SeatStatus>, InventoryError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if state.show_id() != Some(show_id) || state.options.plan.is_none() {
            return Self::discard(state, "SeatMapRefreshed", "show no longer selected");
        }
        match result {
            Ok(statuses) => {
                let selected = state.selected_seats.clone();
                state.seats.merge(&statuses, &env.context.user_id, &selected);
                tracing::debug!(session = %state.id, seats = statuses.len(), "Seat map resynchronised");
            },
            Err(error) => {
                tracing::warn!(session = %state.id, %error, "Seat map refresh failed");
            },
        }
        SmallVec::new()
    }

    fn complete(state: &mut BookingSession, ticket_id: TicketId) {
        for seat in state.selected_seats.clone() {
            if let Some(entry) = state.seats.get_mut(&seat) {
                entry.lock = SeatLockState::Sold;
            }
        }
        tracing::info!(session = %state.id, %ticket_id, seats = state.selected_seats.len(), "Booking completed");
        state.ticket_id = Some(ticket_id);
        state.payment = PaymentPhase::Idle;
        Self::transition(state, BookingStatus::Completed);
    }
}

/// The existing ticket a [`BookingAction::StartUpdate`] moves
struct UpdateTarget {
    original_ticket_id: TicketId,
    original_fare: Money,
    movie: Movie,
    date: NaiveDate,
    theater: Theater,
    showtime: Showtime,
}

impl Reducer for BookingReducer {
    type State = BookingSession;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.session().is_some_and(|session| session != state.id) {
            return match action {
                // A grant for an abandoned session still holds a server lock.
                BookingAction::LockSettled { seat_id, result, .. } => {
                    Self::settle_orphaned_lock(state, &seat_id, &result, env)
                },
                BookingAction::CheckoutResolved {
                    order_id,
                    outcome: CheckoutOutcome::Succeeded(proof),
                    ..
                } => Self::unclaimed_payment(state, order_id, proof),
                BookingAction::VerificationSettled { order_id, result, .. } => {
                    Self::orphaned_verification(state, &order_id, result)
                },
                other => Self::discard(state, other.name(), "session no longer current"),
            };
        }

        match action {
            // ========== User intents ==========
            BookingAction::SelectMovie { movie } => Self::select_movie(state, movie, env),
            BookingAction::StartUpdate {
                original_ticket_id,
                original_fare,
                movie,
                date,
                theater,
                showtime,
            } => Self::start_update(
                state,
                UpdateTarget {
                    original_ticket_id,
                    original_fare,
                    movie,
                    date,
                    theater,
                    showtime,
                },
                env,
            ),
            BookingAction::SelectDate { date } => Self::select_date(state, date, env),
            BookingAction::SelectTheater { theater_id } => Self::select_theater(state, &theater_id),
            BookingAction::SelectShowtime { show_id } => Self::select_showtime(state, &show_id, env),
            BookingAction::ChooseSeatCount { count } => Self::choose_seat_count(state, count),
            BookingAction::ToggleSeat { seat } => Self::toggle_seat(state, seat, env),
            BookingAction::ConfirmSeats => Self::confirm_seats(state, env),
            BookingAction::AddFood { food_id } => Self::add_food(state, food_id),
            BookingAction::RemoveFood { food_id } => Self::remove_food(state, &food_id),
            BookingAction::ProceedToPayment => Self::proceed_to_payment(state, env),
            BookingAction::StartPayment => Self::start_payment(state, env),
            BookingAction::RefreshSeatMap => Self::refresh_seat_map(state, env),
            BookingAction::Back => Self::back(state, env),
            BookingAction::Cancel => Self::cancel(state, env),

            // ========== Collaborator responses ==========
            BookingAction::TheatersLoaded { date, result, .. } => {
                Self::theaters_loaded(state, date, result)
            },
            BookingAction::SeatPlanLoaded { show_id, result, .. } => {
                Self::seat_plan_loaded(state, &show_id, result, env)
            },
            BookingAction::SeatMapRefreshed { show_id, result, .. } => {
                Self::seat_map_refreshed(state, &show_id, result, env)
            },
            BookingAction::LockSettled {
                seat,
                seat_id,
                seq,
                result,
                ..
            } => Self::lock_settled(state, seat, seat_id, seq, result, env),
            BookingAction::UnlockSettled {
                seat, seq, result, ..
            } => Self::unlock_settled(state, &seat, seq, result),
            BookingAction::TicketUpdateSettled { result, .. } => {
                Self::ticket_update_settled(state, result, env)
            },
            BookingAction::OrderSettled { result, .. } => Self::order_settled(state, result, env),
            BookingAction::CheckoutResolved {
                order_id, outcome, ..
            } => Self::checkout_resolved(state, order_id, outcome, env),
            BookingAction::VerificationSettled {
                order_id, result, ..
            } => Self::verification_settled(state, &order_id, result),
        }
    }
}
