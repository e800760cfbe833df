//! # Marquee Testing
//!
//! Testing utilities and helpers for the Marquee booking architecture.
//!
//! This crate provides:
//! - A deterministic [`FixedClock`]
//! - [`CallLog`], a recorder mock collaborators use to capture the calls they receive
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Helpers that drive effect descriptions without a `Store`
//!
//! ## Example
//!
//! ```ignore
//! use marquee_testing::{ReducerTest, assertions};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(session_in_seat_selection())
//!     .when_action(BookingAction::ToggleSeat { seat: label("A1") })
//!     .then_state(|s| assert!(s.seats.is_pending(&label("A1"))))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use marquee_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use marquee_testing::mocks::FixedClock;
    /// use marquee_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-03-14 09:30:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-03-14T09:30:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Shared, ordered record of calls made to a mock collaborator
    ///
    /// Clones share the same log, so a test can keep one handle while the
    /// mock (moved into an environment) records into another.
    ///
    /// ```
    /// use marquee_testing::CallLog;
    ///
    /// let log = CallLog::new();
    /// let recorder = log.clone();
    /// recorder.record("lock A1");
    /// assert_eq!(log.calls(), vec!["lock A1"]);
    /// ```
    #[derive(Debug)]
    pub struct CallLog<T> {
        calls: Arc<Mutex<Vec<T>>>,
    }

    impl<T> CallLog<T> {
        /// Create an empty log
        #[must_use]
        pub fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Append a call
        pub fn record(&self, call: T) {
            // A poisoned log only means another test thread panicked mid-push.
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }

        /// Number of recorded calls
        #[must_use]
        pub fn len(&self) -> usize {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Count calls matching a predicate
        #[must_use]
        pub fn count_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|call| predicate(call))
                .count()
        }
    }

    impl<T: Clone> CallLog<T> {
        /// Snapshot of every call in the order received
        #[must_use]
        pub fn calls(&self) -> Vec<T> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl<T> Clone for CallLog<T> {
        fn clone(&self) -> Self {
            Self {
                calls: Arc::clone(&self.calls),
            }
        }
    }

    impl<T> Default for CallLog<T> {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Helpers for driving effects by hand
pub mod helpers {
    use futures::future::BoxFuture;
    use marquee_core::effect::Effect;

    /// Execute effect descriptions and collect the actions they produce
    ///
    /// Nothing is fed back into a reducer, which lets a test inspect each
    /// collaborator response before deciding when (or whether) to deliver it.
    /// Parallel branches are driven in order, so the result is deterministic.
    pub async fn collect_actions<A, I>(effects: I) -> Vec<A>
    where
        A: Send + 'static,
        I: IntoIterator<Item = Effect<A>>,
    {
        let mut actions = Vec::new();
        for effect in effects {
            drive(effect, &mut actions).await;
        }
        actions
    }

    fn drive<'a, A: Send + 'static>(
        effect: Effect<A>,
        out: &'a mut Vec<A>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => out.extend(fut.await),
                Effect::Delay { action, .. } => out.push(*action),
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    for effect in effects {
                        drive(effect, out).await;
                    }
                },
            }
        })
    }
}

// Re-export commonly used items
pub use helpers::collect_actions;
pub use mocks::{CallLog, FixedClock, test_clock};
