//! Injected dependencies of the booking reducer.

use crate::catalog::ShowCatalog;
use crate::config::{Config, ConfigError};
use crate::inventory::SeatInventory;
use crate::payment::{CheckoutProvider, PaymentBackend};
use crate::pricing::PricingPolicy;
use crate::types::{Money, UserId};
use marquee_core::environment::Clock;
use std::sync::Arc;

/// Who is booking, and where
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    /// Signed-in user
    pub user_id: UserId,
    /// City theaters are listed for
    pub city: String,
    /// Currency handed to the checkout
    pub currency: String,
}

impl SessionContext {
    /// Context from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingUserId`] when no user is configured.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let user_id = config
            .session
            .user_id
            .as_deref()
            .ok_or(ConfigError::MissingUserId)?;
        Ok(Self {
            user_id: UserId::new(user_id),
            city: config.session.city.clone(),
            currency: config.pricing.currency.clone(),
        })
    }
}

/// Environment for the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for the bookable date window
    pub clock: Arc<dyn Clock>,
    /// Seat locks and availability
    pub inventory: Arc<dyn SeatInventory>,
    /// Movies, theaters, shows and menus
    pub catalog: Arc<dyn ShowCatalog>,
    /// Orders, verification and ticket moves
    pub payments: Arc<dyn PaymentBackend>,
    /// External checkout UI
    pub checkout: Arc<dyn CheckoutProvider>,
    /// Booking user and locale
    pub context: SessionContext,
    /// Fee policy
    pub pricing: PricingPolicy,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment` with the default fee policy
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        inventory: Arc<dyn SeatInventory>,
        catalog: Arc<dyn ShowCatalog>,
        payments: Arc<dyn PaymentBackend>,
        checkout: Arc<dyn CheckoutProvider>,
        context: SessionContext,
    ) -> Self {
        Self {
            clock,
            inventory,
            catalog,
            payments,
            checkout,
            context,
            pricing: PricingPolicy::default(),
        }
    }

    /// Replace the fee policy
    #[must_use]
    pub fn with_update_fee(mut self, fee: Money) -> Self {
        self.pricing = PricingPolicy::new(fee);
        self
    }
}

impl std::fmt::Debug for BookingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEnvironment")
            .field("context", &self.context)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}
