//! Conversational front-end.
//!
//! [`ChatReducer`] turns chat input into [`BookingAction`]s and narrates the
//! booking session back as assistant messages. Booking rules live in the
//! booking reducer only: this module translates and describes, nothing else.

use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::error::CatalogError;
use crate::reducer::BookingReducer;
use crate::session::{BookingSession, BookingStatus, Notice};
use crate::types::{FoodItemId, Movie, SeatLabel, SeatLockState};
use marquee_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::fmt::Write as _;
use std::sync::Arc;

type Effects = SmallVec<[Effect<ChatAction>; 4]>;

/// Who said something
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    /// The person booking
    User,
    /// The booking assistant
    Assistant,
}

/// One line of the conversation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author
    pub speaker: Speaker,
    /// Text
    pub text: String,
}

/// Conversation plus the booking it drives
#[derive(Clone, Debug, Default)]
pub struct ChatState {
    /// Everything said so far
    pub transcript: Vec<ChatMessage>,
    /// Movies from the last search, for picking by number or title
    pub search_results: Vec<Movie>,
    /// The booking session
    pub booking: BookingSession,
    last_notice: Option<Notice>,
    last_menu: Option<String>,
}

impl ChatState {
    fn say(&mut self, text: impl Into<String>) {
        self.transcript.push(ChatMessage {
            speaker: Speaker::Assistant,
            text: text.into(),
        });
    }

    /// Assistant messages from index `from` on
    pub fn assistant_messages_since(&self, from: usize) -> impl Iterator<Item = &str> {
        self.transcript
            .iter()
            .skip(from)
            .filter(|message| message.speaker == Speaker::Assistant)
            .map(|message| message.text.as_str())
    }
}

/// A button press
///
/// Date, theater and showtime buttons carry the 1-based position of the
/// choice in the list the assistant last showed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatPick {
    /// A movie from the search results
    Movie(usize),
    /// A bookable date
    Date(usize),
    /// A listed theater
    Theater(usize),
    /// A showtime of the chosen theater
    Showtime(usize),
    /// How many seats
    SeatCount(u32),
    /// Select or release a seat
    Seat(SeatLabel),
    /// Finish the current step
    Done,
    /// Add one unit of food
    Food(FoodItemId),
    /// Take back one unit of food
    RemoveFood(FoodItemId),
    /// Pay
    Pay,
}

/// Input to the chat
#[derive(Clone, Debug)]
pub enum ChatAction {
    /// Free text
    UserSaid(String),
    /// A button
    Picked(ChatPick),
    /// Movie search results arrived
    SearchSettled {
        /// What was searched for
        query: String,
        /// Matches or failure
        result: Result<Vec<Movie>, CatalogError>,
    },
    /// Anything for the embedded booking flow, including its responses
    Booking(BookingAction),
}

/// Chat reducer embedding [`BookingReducer`]
#[derive(Clone, Debug, Default)]
pub struct ChatReducer {
    booking: BookingReducer,
}

impl ChatReducer {
    /// Creates a new `ChatReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            booking: BookingReducer::new(),
        }
    }

    fn delegate(&self, state: &mut ChatState, action: BookingAction, env: &BookingEnvironment) -> Effects {
        let effects = self
            .booking
            .reduce(&mut state.booking, action, env)
            .into_iter()
            .map(|effect| effect.map(ChatAction::Booking))
            .collect();
        Self::narrate(state);
        effects
    }

    /// Describe whatever changed in the booking session
    fn narrate(state: &mut ChatState) {
        if state.booking.notice != state.last_notice {
            state.last_notice.clone_from(&state.booking.notice);
            if let Some(notice) = state.last_notice.clone() {
                state.say(notice.text);
            }
        }
        let menu = menu(&state.booking);
        if menu != state.last_menu {
            state.last_menu.clone_from(&menu);
            if let Some(menu) = menu {
                state.say(menu);
            }
        }
    }

    fn user_said(&self, state: &mut ChatState, text: String, env: &BookingEnvironment) -> Effects {
        let trimmed = text.trim().to_string();
        state.transcript.push(ChatMessage {
            speaker: Speaker::User,
            text,
        });
        if trimmed.is_empty() {
            return SmallVec::new();
        }

        let idle = matches!(state.booking.status, BookingStatus::Idle | BookingStatus::Completed);
        let keyword = trimmed.to_lowercase();
        if !idle && (keyword == "cancel" || keyword == "back") {
            return self.delegate(state, BookingAction::Cancel, env);
        }
        if !idle {
            state.say("Use the buttons to continue, or type cancel to start over.");
            return SmallVec::new();
        }

        if let Some(movie) = pick_by_title_or_number(&state.search_results, &trimmed) {
            state.search_results.clear();
            return self.delegate(state, BookingAction::SelectMovie { movie }, env);
        }

        state.say("Searching for movies...");
        let catalog = Arc::clone(&env.catalog);
        smallvec![Effect::Future(Box::pin(async move {
            let result = catalog.search_movies(trimmed.clone()).await;
            Some(ChatAction::SearchSettled {
                query: trimmed,
                result,
            })
        }))]
    }

    fn search_settled(
        &self,
        state: &mut ChatState,
        query: &str,
        result: Result<Vec<Movie>, CatalogError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if !matches!(state.booking.status, BookingStatus::Idle | BookingStatus::Completed) {
            tracing::debug!(%query, "Search results arrived after a movie was chosen");
            return SmallVec::new();
        }

        match result {
            Ok(mut movies) if movies.len() == 1 => {
                state.search_results.clear();
                match movies.pop() {
                    Some(movie) => self.delegate(state, BookingAction::SelectMovie { movie }, env),
                    None => SmallVec::new(),
                }
            },
            Ok(movies) if movies.is_empty() => {
                state.search_results.clear();
                state.say("No movies found. Try another name or genre.");
                SmallVec::new()
            },
            Ok(movies) => {
                let mut text = String::from("Select a movie:");
                for (n, movie) in movies.iter().enumerate() {
                    let _ = write!(text, "\n{}. {}", n + 1, movie.title);
                    if let Some(genre) = &movie.genre {
                        let _ = write!(text, " ({genre})");
                    }
                }
                state.search_results = movies;
                state.say(text);
                SmallVec::new()
            },
            Err(error) => {
                tracing::warn!(%query, %error, "Movie search failed");
                state.say(format!("Could not search movies: {error}"));
                SmallVec::new()
            },
        }
    }

    fn picked(&self, state: &mut ChatState, pick: ChatPick, env: &BookingEnvironment) -> Effects {
        let booking = &state.booking;
        let action = match pick {
            ChatPick::Movie(n) => nth(&state.search_results, n)
                .cloned()
                .map(|movie| BookingAction::SelectMovie { movie })
                .ok_or("Invalid movie selection."),
            ChatPick::Date(n) => nth(&booking.options.dates, n)
                .map(|date| BookingAction::SelectDate { date: *date })
                .ok_or("Invalid date selection."),
            ChatPick::Theater(n) => nth(&booking.options.theaters, n)
                .map(|listing| BookingAction::SelectTheater {
                    theater_id: listing.theater.id.clone(),
                })
                .ok_or("Invalid theater selection."),
            ChatPick::Showtime(n) => nth(chosen_showtimes(booking), n)
                .map(|showtime| BookingAction::SelectShowtime {
                    show_id: showtime.show_id.clone(),
                })
                .ok_or("Invalid showtime selection."),
            ChatPick::SeatCount(count) => Ok(BookingAction::ChooseSeatCount { count }),
            ChatPick::Seat(seat) => Ok(BookingAction::ToggleSeat { seat }),
            ChatPick::Done if booking.status == BookingStatus::FoodChosen => Ok(BookingAction::ProceedToPayment),
            ChatPick::Done => Ok(BookingAction::ConfirmSeats),
            ChatPick::Food(food_id) => Ok(BookingAction::AddFood { food_id }),
            ChatPick::RemoveFood(food_id) => Ok(BookingAction::RemoveFood { food_id }),
            ChatPick::Pay => Ok(BookingAction::StartPayment),
        };

        match action {
            Ok(action) => {
                if matches!(action, BookingAction::SelectMovie { .. }) {
                    state.search_results.clear();
                }
                self.delegate(state, action, env)
            },
            Err(text) => {
                state.say(text);
                SmallVec::new()
            },
        }
    }
}

impl Reducer for ChatReducer {
    type State = ChatState;
    type Action = ChatAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ChatAction::UserSaid(text) => self.user_said(state, text, env),
            ChatAction::Picked(pick) => self.picked(state, pick, env),
            ChatAction::SearchSettled { query, result } => self.search_settled(state, &query, result, env),
            ChatAction::Booking(action) => self.delegate(state, action, env),
        }
    }
}

/// 1-based lookup
fn nth<T>(items: &[T], n: usize) -> Option<&T> {
    n.checked_sub(1).and_then(|index| items.get(index))
}

fn pick_by_title_or_number(results: &[Movie], input: &str) -> Option<Movie> {
    if results.is_empty() {
        return None;
    }
    if let Ok(n) = input.parse::<usize>() {
        return nth(results, n).cloned();
    }
    results
        .iter()
        .find(|movie| movie.title.eq_ignore_ascii_case(input))
        .cloned()
}

fn chosen_showtimes(booking: &BookingSession) -> &[crate::types::Showtime] {
    booking
        .theater
        .as_ref()
        .and_then(|theater| {
            booking
                .options
                .theaters
                .iter()
                .find(|listing| listing.theater.id == theater.id)
        })
        .map_or(&[][..], |listing| listing.showtimes.as_slice())
}

/// Choices for the current step, as the assistant lists them
fn menu(booking: &BookingSession) -> Option<String> {
    let mut text = String::new();
    match booking.status {
        BookingStatus::MovieSelected => {
            text.push_str("Dates:");
            for (n, date) in booking.options.dates.iter().enumerate() {
                let _ = write!(text, "\n{}. {}", n + 1, date.format("%a %d %b"));
            }
        },
        BookingStatus::DateSelected if !booking.options.theaters.is_empty() => {
            text.push_str("Theaters:");
            for (n, listing) in booking.options.theaters.iter().enumerate() {
                let _ = write!(text, "\n{}. {}", n + 1, listing.theater.name);
                if let Some(address) = &listing.theater.address {
                    let _ = write!(text, ", {address}");
                }
            }
        },
        BookingStatus::TheaterSelected => {
            text.push_str("Showtimes:");
            for (n, showtime) in chosen_showtimes(booking).iter().enumerate() {
                let _ = write!(text, "\n{}. {}", n + 1, showtime.time);
            }
        },
        BookingStatus::SeatCountChosen | BookingStatus::SeatsSelected => {
            text = seat_chart(booking)?;
        },
        BookingStatus::FoodChosen => {
            let plan = booking.options.plan.as_ref()?;
            text.push_str("Food (/food ID, /unfood ID, then /done):");
            for item in &plan.food {
                let quantity = booking.selected_food.get(&item.id).copied().unwrap_or(0);
                let _ = write!(text, "\n{} - {} {}", item.id, item.name, item.price);
                if quantity > 0 {
                    let _ = write!(text, " x{quantity}");
                }
            }
        },
        BookingStatus::Completed => {
            let ticket_id = booking.ticket_id.as_ref()?;
            let _ = write!(text, "Ticket: {ticket_id}");
        },
        _ => return None,
    }
    Some(text)
}

/// One line per row: free seats by label, held seats in brackets,
/// seats on their way in or out with a tilde, taken seats as dashes
fn seat_chart(booking: &BookingSession) -> Option<String> {
    let plan = booking.options.plan.as_ref()?;
    let mut text = String::from("Seats:");
    for row in &plan.rows {
        let _ = write!(text, "\n{} ({}, {}):", row.label, row.seat_type, row.price);
        for number in 1..=row.seat_count {
            let Ok(label) = SeatLabel::from_parts(&row.label, number) else {
                continue;
            };
            let Some(entry) = booking.seats.get(&label) else {
                continue;
            };
            let cell = if booking.is_selected(&label) {
                format!("[{label}]")
            } else if entry.pending.is_some() {
                format!("~{label}")
            } else {
                match entry.lock {
                    SeatLockState::Unlocked | SeatLockState::LockedByMe => label.to_string(),
                    SeatLockState::LockedByOther | SeatLockState::Sold => "--".to_string(),
                }
            };
            let _ = write!(text, " {cell}");
        }
    }
    Some(text)
}
