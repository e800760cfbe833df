//! Pricing calculator.
//!
//! Pure functions, no I/O. The amount due is always recomputed from the
//! session's selections; it is never stored on its own.

use crate::error::PricingError;
use crate::types::{BookingMode, FoodItem, FoodItemId, Money, SeatLabel, SeatRow};
use std::collections::BTreeMap;

/// Fee policy applied on top of seat and food prices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Flat fee charged when an existing ticket is moved
    pub update_fee: Money,
}

impl PricingPolicy {
    /// Policy with the given update fee
    #[must_use]
    pub const fn new(update_fee: Money) -> Self {
        Self { update_fee }
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::new(Money::new(20))
    }
}

/// Everything a price depends on
#[derive(Clone, Copy, Debug)]
pub struct QuoteInput<'a> {
    /// Selected seat labels
    pub seats: &'a [SeatLabel],
    /// Priced rows of the show
    pub rows: &'a [SeatRow],
    /// Selected food and quantities
    pub food: &'a BTreeMap<FoodItemId, u32>,
    /// The show's menu
    pub menu: &'a [FoodItem],
    /// Booking mode
    pub mode: &'a BookingMode,
}

/// A computed price and its parts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quote {
    /// Sum of seat prices
    pub seat_subtotal: Money,
    /// Sum of food prices (always zero for updates)
    pub food_subtotal: Money,
    /// Update fee, when moving a ticket
    pub update_fee: Money,
    /// Credit for the fare already paid, when moving a ticket
    pub credit: Money,
    /// Amount due
    pub total: Money,
}

/// Price a selection
///
/// - New booking: seats + food.
/// - Update: `max(0, seats + fee - original fare)`, with food ignored.
///
/// # Errors
///
/// - [`PricingError::UnknownRow`] if a seat's row is not among `rows`
/// - [`PricingError::UnknownFoodItem`] if selected food is not on the menu
/// - [`PricingError::Overflow`] if a sum does not fit
pub fn quote(input: &QuoteInput<'_>, policy: &PricingPolicy) -> Result<Quote, PricingError> {
    let seat_subtotal = seat_subtotal(input.seats, input.rows)?;

    match input.mode {
        BookingMode::NewBooking => {
            let food_subtotal = food_subtotal(input.food, input.menu)?;
            let total = seat_subtotal
                .checked_add(food_subtotal)
                .ok_or(PricingError::Overflow)?;
            Ok(Quote {
                seat_subtotal,
                food_subtotal,
                total,
                ..Quote::default()
            })
        },
        BookingMode::UpdateExisting { original_fare, .. } => {
            let gross = seat_subtotal
                .checked_add(policy.update_fee)
                .ok_or(PricingError::Overflow)?;
            Ok(Quote {
                seat_subtotal,
                food_subtotal: Money::ZERO,
                update_fee: policy.update_fee,
                credit: *original_fare,
                total: gross.saturating_sub(*original_fare),
            })
        },
    }
}

/// Sum of `rows[row_of(seat)].price` over `seats`
///
/// # Errors
///
/// Returns [`PricingError::UnknownRow`] for a seat whose row is not in `rows`.
pub fn seat_subtotal(seats: &[SeatLabel], rows: &[SeatRow]) -> Result<Money, PricingError> {
    seats.iter().try_fold(Money::ZERO, |sum, seat| {
        let row = rows
            .iter()
            .find(|row| row.label == seat.row())
            .ok_or_else(|| PricingError::UnknownRow(seat.to_string()))?;
        sum.checked_add(row.price).ok_or(PricingError::Overflow)
    })
}

/// Sum of `menu[id].price * qty` over `food`
///
/// # Errors
///
/// Returns [`PricingError::UnknownFoodItem`] for an id missing from `menu`.
pub fn food_subtotal(
    food: &BTreeMap<FoodItemId, u32>,
    menu: &[FoodItem],
) -> Result<Money, PricingError> {
    food.iter().try_fold(Money::ZERO, |sum, (id, quantity)| {
        let item = menu
            .iter()
            .find(|item| &item.id == id)
            .ok_or_else(|| PricingError::UnknownFoodItem(id.clone()))?;
        let line = item
            .price
            .checked_mul(*quantity)
            .ok_or(PricingError::Overflow)?;
        sum.checked_add(line).ok_or(PricingError::Overflow)
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{SeatType, TicketId};
    use proptest::prelude::*;

    fn rows() -> Vec<SeatRow> {
        vec![
            SeatRow {
                label: "A".to_string(),
                seat_type: SeatType::Classic,
                price: Money::new(200),
                seat_count: 10,
            },
            SeatRow {
                label: "B".to_string(),
                seat_type: SeatType::Premium,
                price: Money::new(150),
                seat_count: 10,
            },
        ]
    }

    fn menu() -> Vec<FoodItem> {
        vec![FoodItem {
            id: FoodItemId::new("popcorn"),
            name: "Popcorn".to_string(),
            price: Money::new(120),
        }]
    }

    fn seats(labels: &[&str]) -> Vec<SeatLabel> {
        labels.iter().map(|l| SeatLabel::parse(l).unwrap()).collect()
    }

    #[test]
    fn two_seats_without_food() {
        let seats = seats(&["A1", "A2"]);
        let (rows, menu, food) = (rows(), menu(), BTreeMap::new());
        let input = QuoteInput {
            seats: &seats,
            rows: &rows,
            food: &food,
            menu: &menu,
            mode: &BookingMode::NewBooking,
        };

        let quote = quote(&input, &PricingPolicy::default()).unwrap();
        assert_eq!(quote.total, Money::new(400));
        assert_eq!(quote.food_subtotal, Money::ZERO);
    }

    #[test]
    fn two_seats_and_popcorn() {
        let seats = seats(&["A1", "A2"]);
        let (rows, menu) = (rows(), menu());
        let food = BTreeMap::from([(FoodItemId::new("popcorn"), 1)]);
        let input = QuoteInput {
            seats: &seats,
            rows: &rows,
            food: &food,
            menu: &menu,
            mode: &BookingMode::NewBooking,
        };

        assert_eq!(quote(&input, &PricingPolicy::default()).unwrap().total, Money::new(520));
    }

    #[test]
    fn update_floors_at_zero() {
        let seats = seats(&["B3"]);
        let (rows, menu) = (rows(), menu());
        // Food is ignored on update even if present.
        let food = BTreeMap::from([(FoodItemId::new("popcorn"), 2)]);
        let mode = BookingMode::UpdateExisting {
            original_ticket_id: TicketId::new("t-1"),
            original_fare: Money::new(200),
        };
        let input = QuoteInput {
            seats: &seats,
            rows: &rows,
            food: &food,
            menu: &menu,
            mode: &mode,
        };

        let quote = quote(&input, &PricingPolicy::new(Money::new(20))).unwrap();
        assert_eq!(quote.seat_subtotal, Money::new(150));
        assert_eq!(quote.food_subtotal, Money::ZERO);
        assert_eq!(quote.total, Money::ZERO);
    }

    #[test]
    fn update_charges_the_difference_plus_fee() {
        let seats = seats(&["A4"]);
        let (rows, menu, food) = (rows(), menu(), BTreeMap::new());
        let mode = BookingMode::UpdateExisting {
            original_ticket_id: TicketId::new("t-1"),
            original_fare: Money::new(150),
        };
        let input = QuoteInput {
            seats: &seats,
            rows: &rows,
            food: &food,
            menu: &menu,
            mode: &mode,
        };

        assert_eq!(quote(&input, &PricingPolicy::default()).unwrap().total, Money::new(70));
    }

    #[test]
    fn unknown_row_is_reported() {
        let seats = seats(&["Z9"]);
        assert_eq!(
            seat_subtotal(&seats, &rows()),
            Err(PricingError::UnknownRow("Z9".to_string()))
        );
    }

    #[test]
    fn unknown_food_is_reported() {
        let food = BTreeMap::from([(FoodItemId::new("nachos"), 1)]);
        assert_eq!(
            food_subtotal(&food, &menu()),
            Err(PricingError::UnknownFoodItem(FoodItemId::new("nachos")))
        );
    }

    proptest! {
        #[test]
        fn update_total_is_never_negative_and_matches_formula(
            seat_price in 0u64..10_000,
            fee in 0u64..500,
            fare in 0u64..20_000,
        ) {
            let rows = vec![SeatRow {
                label: "C".to_string(),
                seat_type: SeatType::ClassicPlus,
                price: Money::new(seat_price),
                seat_count: 5,
            }];
            let seats = seats(&["C2"]);
            let food = BTreeMap::new();
            let mode = BookingMode::UpdateExisting {
                original_ticket_id: TicketId::new("t"),
                original_fare: Money::new(fare),
            };
            let input = QuoteInput { seats: &seats, rows: &rows, food: &food, menu: &[], mode: &mode };

            let total = quote(&input, &PricingPolicy::new(Money::new(fee))).unwrap().total;
            prop_assert_eq!(total.amount(), (seat_price + fee).saturating_sub(fare));
        }
    }
}
