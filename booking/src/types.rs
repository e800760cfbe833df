//! Domain types for the booking flow.
//!
//! Identifiers issued by the backend are opaque strings; the only identifier
//! minted locally is [`SessionId`], which tags every collaborator response with
//! the booking attempt that asked for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a backend-issued identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

backend_id!(
    /// Identifier of a movie
    MovieId
);
backend_id!(
    /// Identifier of a theater
    TheaterId
);
backend_id!(
    /// Identifier of one screening of a movie in a theater
    ShowId
);
backend_id!(
    /// Identifier of the signed-in user
    UserId
);
backend_id!(
    /// Identifier of a physical seat within a show, used by lock/unlock calls
    SeatId
);
backend_id!(
    /// Identifier of a food item on a show's menu
    FoodItemId
);
backend_id!(
    /// Identifier of an issued ticket
    TicketId
);
backend_id!(
    /// Identifier of a payment order created by the backend
    OrderId
);

/// Identifier of one booking attempt
///
/// A new one is minted whenever a session starts, so responses addressed to
/// an abandoned attempt can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random `SessionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Seat labels
// ============================================================================

/// Error returned when a string is not a seat label
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid seat label {0:?}: expected row letters followed by a seat number, like \"A12\"")]
pub struct InvalidSeatLabel(pub String);

/// A seat label such as `A5` or `AA12`
///
/// Always upper-case row letters followed by a positive number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatLabel(String);

impl SeatLabel {
    /// Parse a label, normalising the row to upper case
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSeatLabel`] if the label has no row letters, no
    /// number, anything after the number, or a zero seat number.
    pub fn parse(raw: &str) -> Result<Self, InvalidSeatLabel> {
        let label = raw.trim().to_ascii_uppercase();
        let row_len = label.chars().take_while(char::is_ascii_uppercase).count();
        let number = &label[row_len..];

        let valid = row_len > 0
            && !number.is_empty()
            && number.chars().all(|c| c.is_ascii_digit())
            && number.parse::<u32>().is_ok_and(|n| n > 0);

        if valid {
            Ok(Self(label))
        } else {
            Err(InvalidSeatLabel(raw.to_string()))
        }
    }

    /// Build the label for seat `number` in `row`
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSeatLabel`] if the pieces do not form a valid label.
    pub fn from_parts(row: &str, number: u32) -> Result<Self, InvalidSeatLabel> {
        Self::parse(&format!("{row}{number}"))
    }

    /// The leading alphabetic prefix: `"A12"` → `"A"`
    #[must_use]
    pub fn row(&self) -> &str {
        let end = self
            .0
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// The label as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SeatLabel {
    type Err = InvalidSeatLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SeatLabel {
    type Error = InvalidSeatLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SeatLabel> for String {
    fn from(label: SeatLabel) -> Self {
        label.0
    }
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// An amount in whole units of the booking currency, as the backend quotes prices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Create an amount
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// The raw amount
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Checked addition
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Checked multiplication by a quantity
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(u64::from(quantity)).map(Self)
    }

    /// Subtraction that floors at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Catalog records
// ============================================================================

/// Seat category of a row, which determines its price for a show
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeatType {
    /// Standard seating
    Classic,
    /// Standard seating with extra legroom
    ClassicPlus,
    /// Recliners and similar
    Premium,
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "Classic"),
            Self::ClassicPlus => write!(f, "Classic Plus"),
            Self::Premium => write!(f, "Premium"),
        }
    }
}

/// One row of a theater's seat layout, as configured for the theater
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRow {
    /// Row label, e.g. `"A"`
    pub row_label: String,
    /// Number of seats in the row
    pub seat_count: u32,
    /// Seat category
    pub seat_type: SeatType,
}

/// A layout row priced for a particular show
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatRow {
    /// Row label, e.g. `"A"`
    pub label: String,
    /// Seat category
    pub seat_type: SeatType,
    /// Price of every seat in the row for this show
    pub price: Money,
    /// Number of seats in the row
    pub seat_count: u32,
}

/// Availability of one seat as reported by the inventory service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatStatus {
    /// Identifier used for lock/unlock
    pub seat_id: SeatId,
    /// Label shown to the user
    pub seat_no: SeatLabel,
    /// `false` once the seat is sold or locked
    pub is_available: bool,
    /// Holder of the current lock, if any
    pub locked_by: Option<UserId>,
}

/// A food item on a show's menu
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Menu identifier
    #[serde(rename = "_id")]
    pub id: FoodItemId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: Money,
}

/// A movie returned by search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    /// Movie identifier
    #[serde(alias = "_id")]
    pub id: MovieId,
    /// Title
    #[serde(rename = "movieName")]
    pub title: String,
    /// Spoken language
    #[serde(default)]
    pub language: Option<String>,
    /// Genre
    #[serde(default)]
    pub genre: Option<String>,
}

/// A theater in the user's city
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theater {
    /// Theater identifier
    #[serde(alias = "_id")]
    pub id: TheaterId,
    /// Display name
    pub name: String,
    /// Street address
    #[serde(default)]
    pub address: Option<String>,
}

/// One screening slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Showtime {
    /// Show identifier
    pub show_id: ShowId,
    /// Theater running the show
    pub theater_id: TheaterId,
    /// Start time as the backend renders it, e.g. `"18:30"`
    pub time: String,
}

/// A theater together with the showtimes it runs on the chosen date
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TheaterShowtimes {
    /// The theater
    pub theater: Theater,
    /// Its showtimes, sorted by start time
    pub showtimes: Vec<Showtime>,
}

/// Everything needed to select seats and food for one show
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatPlan {
    /// Priced rows, in layout order
    pub rows: Vec<SeatRow>,
    /// Per-seat availability
    pub seats: Vec<SeatStatus>,
    /// Food menu
    pub food: Vec<FoodItem>,
}

// ============================================================================
// Session enums
// ============================================================================

/// Whether a session books new seats or moves an existing ticket
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BookingMode {
    /// Buy a new ticket
    #[default]
    NewBooking,
    /// Move an existing ticket to another seat or show
    UpdateExisting {
        /// Ticket being moved
        original_ticket_id: TicketId,
        /// What the user already paid for it
        original_fare: Money,
    },
}

impl BookingMode {
    /// Whether this is an update of an existing ticket
    #[must_use]
    pub const fn is_update(&self) -> bool {
        matches!(self, Self::UpdateExisting { .. })
    }
}

/// Client-side view of a seat's lock, an eventually-consistent cache of the server's
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SeatLockState {
    /// Free to lock
    #[default]
    Unlocked,
    /// Locked for this user
    LockedByMe,
    /// Locked by another user
    LockedByOther,
    /// Sold
    Sold,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn seat_label_row_is_leading_letters() {
        assert_eq!(SeatLabel::parse("A12").unwrap().row(), "A");
        assert_eq!(SeatLabel::parse("aa3").unwrap().row(), "AA");
        assert_eq!(SeatLabel::parse(" b5 ").unwrap().as_str(), "B5");
    }

    #[test]
    fn seat_label_rejects_malformed_input() {
        for raw in ["", "12", "A", "A0", "A1B", "1A"] {
            assert!(SeatLabel::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn seat_type_uses_backend_spelling() {
        let parsed: SeatType = serde_json::from_str("\"CLASSICPLUS\"").unwrap();
        assert_eq!(parsed, SeatType::ClassicPlus);
    }

    #[test]
    fn money_arithmetic() {
        assert_eq!(Money::new(150).saturating_sub(Money::new(200)), Money::ZERO);
        assert_eq!(Money::new(120).checked_mul(3), Some(Money::new(360)));
        assert_eq!(Money::new(u64::MAX).checked_add(Money::new(1)), None);
    }
}
