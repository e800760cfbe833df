//! Read-only catalog of movies, theaters, shows, seat layouts and menus.

use crate::ServiceFuture;
use crate::error::{BookingError, CatalogError};
use crate::inventory::SeatInventory;
use crate::types::{
    FoodItem, LayoutRow, Money, Movie, MovieId, SeatPlan, SeatRow, SeatType, ShowId, Showtime,
    Theater, TheaterId, TheaterShowtimes,
};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Catalog service
pub trait ShowCatalog: Send + Sync {
    /// Movies whose name matches `query`
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn search_movies(&self, query: String) -> ServiceFuture<Result<Vec<Movie>, CatalogError>>;

    /// Theaters in `city`
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn theaters_in_city(&self, city: String) -> ServiceFuture<Result<Vec<Theater>, CatalogError>>;

    /// Showtimes of a movie in a city on a date, across all theaters
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn showtimes(
        &self,
        movie_id: MovieId,
        city: String,
        date: NaiveDate,
    ) -> ServiceFuture<Result<Vec<Showtime>, CatalogError>>;

    /// Row layout of a theater's screen
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn seat_layout(&self, theater_id: TheaterId) -> ServiceFuture<Result<Vec<LayoutRow>, CatalogError>>;

    /// Price of each seat type for a show
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn seat_prices(&self, show_id: ShowId) -> ServiceFuture<Result<HashMap<SeatType, Money>, CatalogError>>;

    /// Food menu of a show
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the catalog cannot be read.
    fn food_menu(&self, show_id: ShowId) -> ServiceFuture<Result<Vec<FoodItem>, CatalogError>>;
}

/// Price each layout row for a show
///
/// A seat type with no listed price is priced at zero, matching what the
/// backend's own booking page shows.
#[must_use]
pub fn price_rows(layout: &[LayoutRow], prices: &HashMap<SeatType, Money>) -> Vec<SeatRow> {
    layout
        .iter()
        .map(|row| {
            let price = prices.get(&row.seat_type).copied().unwrap_or_else(|| {
                tracing::warn!(row = %row.row_label, seat_type = %row.seat_type, "No price for seat type");
                Money::ZERO
            });
            SeatRow {
                label: row.row_label.clone(),
                seat_type: row.seat_type.clone(),
                price,
                seat_count: row.seat_count,
            }
        })
        .collect()
}

/// Theaters in `city` showing `movie_id` on `date`, each with its showtimes
///
/// Theaters without a showtime that day are left out.
///
/// # Errors
///
/// Returns [`CatalogError`] if either lookup fails.
pub async fn load_theater_showtimes(
    catalog: &dyn ShowCatalog,
    movie_id: MovieId,
    city: String,
    date: NaiveDate,
) -> Result<Vec<TheaterShowtimes>, CatalogError> {
    let (theaters, showtimes) = futures::try_join!(
        catalog.theaters_in_city(city.clone()),
        catalog.showtimes(movie_id, city, date),
    )?;

    let mut by_theater: HashMap<TheaterId, Vec<Showtime>> = HashMap::new();
    for showtime in showtimes {
        by_theater
            .entry(showtime.theater_id.clone())
            .or_default()
            .push(showtime);
    }

    let listed = theaters
        .into_iter()
        .filter_map(|theater| {
            let mut showtimes = by_theater.remove(&theater.id)?;
            showtimes.sort_by(|a, b| a.time.cmp(&b.time));
            Some(TheaterShowtimes { theater, showtimes })
        })
        .collect();

    if !by_theater.is_empty() {
        tracing::warn!(
            theaters = by_theater.len(),
            "Showtimes reference theaters outside the city listing"
        );
    }

    Ok(listed)
}

/// Layout, prices, seat availability and menu for one show, fetched concurrently
///
/// # Errors
///
/// Returns the first [`BookingError`] from any of the four lookups.
pub async fn load_seat_plan(
    catalog: &dyn ShowCatalog,
    inventory: &dyn SeatInventory,
    theater_id: TheaterId,
    show_id: ShowId,
) -> Result<SeatPlan, BookingError> {
    let (layout, prices, seats, food) = futures::try_join!(
        async { catalog.seat_layout(theater_id).await.map_err(BookingError::from) },
        async { catalog.seat_prices(show_id.clone()).await.map_err(BookingError::from) },
        async { inventory.fetch_seat_map(show_id.clone()).await.map_err(BookingError::from) },
        async { catalog.food_menu(show_id.clone()).await.map_err(BookingError::from) },
    )?;

    Ok(SeatPlan {
        rows: price_rows(&layout, &prices),
        seats,
        food,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_price_is_zero() {
        let layout = vec![
            LayoutRow {
                row_label: "A".to_string(),
                seat_count: 12,
                seat_type: SeatType::Classic,
            },
            LayoutRow {
                row_label: "H".to_string(),
                seat_count: 8,
                seat_type: SeatType::Premium,
            },
        ];
        let prices = HashMap::from([(SeatType::Classic, Money::new(180))]);

        let rows = price_rows(&layout, &prices);
        assert_eq!(rows[0].price, Money::new(180));
        assert_eq!(rows[1].price, Money::ZERO);
        assert_eq!(rows[1].seat_count, 8);
    }
}
