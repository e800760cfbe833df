//! Ticket updates and the payment handoff.
//!
//! New bookings pay first and are ticketed on verification. Ticket moves are
//! applied by the backend first and then charged the difference, with no
//! verification step: the ticket already exists.
//!
//! A checkout the user walks away from stays open at the provider. Its order
//! is remembered so a late payment is either booked or surfaced, never lost.

use super::{BookingReducer, Effects};
use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::error::{PaymentError, TicketUpdateError};
use crate::payment::{CheckoutOutcome, CheckoutRequest, OrderRef, PaymentProof, TicketUpdate};
use crate::session::{BookingSession, BookingStatus, Notice, PaymentPhase, SupersededOrder};
use crate::types::{BookingMode, Money, OrderId, TicketId};
use marquee_core::{SmallVec, effect::Effect, smallvec};
use std::sync::Arc;

impl BookingReducer {
    pub(super) fn request_ticket_update(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        if state.ticket_update_pending {
            return Self::reject(state, "Your ticket update is in progress.");
        }
        let BookingMode::UpdateExisting { original_ticket_id, .. } = &state.mode else {
            return SmallVec::new();
        };
        let (Some(new_show_id), Some(new_seat_no)) = (state.show_id(), state.selected_seats.first()) else {
            return Self::reject(state, "Select your new seat first.");
        };
        let update = TicketUpdate {
            original_ticket_id: original_ticket_id.clone(),
            new_show_id: new_show_id.clone(),
            new_seat_no: new_seat_no.clone(),
            user_id: env.context.user_id.clone(),
        };

        tracing::info!(
            session = %state.id,
            ticket_id = %update.original_ticket_id,
            seat = %update.new_seat_no,
            "Requesting ticket update"
        );
        state.ticket_update_pending = true;
        state.notify(Notice::info("Updating your ticket..."));

        let request = env.payments.update_ticket(update);
        let session = state.id;
        smallvec![Effect::Future(Box::pin(async move {
            let result = request.await;
            Some(BookingAction::TicketUpdateSettled { session, result })
        }))]
    }

    pub(super) fn ticket_update_settled(
        state: &mut BookingSession,
        result: Result<(), TicketUpdateError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if !state.ticket_update_pending {
            return Self::discard(state, "TicketUpdateSettled", "no ticket update in flight");
        }
        state.ticket_update_pending = false;

        match result {
            Ok(()) => {
                Self::transition(state, BookingStatus::PaymentPending);
                match state.quote(&env.pricing) {
                    Ok(quote) => state.notify(Notice::info(format!(
                        "Your ticket has been moved. Amount due: {} {}",
                        quote.total, env.context.currency
                    ))),
                    Err(error) => {
                        tracing::warn!(session = %state.id, %error, "Moved ticket cannot be priced");
                        let text = format!(
                            "Your ticket has been moved, but the amount due could not be computed: {error}"
                        );
                        state.fail(error, text);
                    },
                }
            },
            Err(error) => {
                tracing::warn!(session = %state.id, %error, "Ticket update refused");
                let text = error.to_string();
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }

    // ========== Payment ==========

    pub(super) fn start_payment(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        if state.status != BookingStatus::PaymentPending {
            return Self::reject(state, "There is nothing to pay for yet.");
        }
        if state.payment.is_busy() {
            return Self::reject(state, "A payment step is in progress. Please wait for it to finish.");
        }

        let total = match state.quote(&env.pricing) {
            Ok(quote) => quote.total,
            Err(error) => {
                let text = format!("Could not price this booking: {error}");
                state.fail(error, text);
                return SmallVec::new();
            },
        };

        if let BookingMode::UpdateExisting { original_ticket_id, .. } = &state.mode {
            if total == Money::ZERO {
                let ticket_id = original_ticket_id.clone();
                Self::complete(state, ticket_id);
                state.notify(Notice::info("Ticket updated successfully!"));
                return SmallVec::new();
            }
        }

        tracing::info!(session = %state.id, %total, "Creating payment order");
        Self::supersede_checkout(state, env);
        state.payment = PaymentPhase::CreatingOrder;
        state.last_error = None;
        state.notify(Notice::info("Initiating payment..."));

        let request = env.payments.create_order(total);
        let session = state.id;
        smallvec![Effect::Future(Box::pin(async move {
            let result = request.await;
            Some(BookingAction::OrderSettled { session, result })
        }))]
    }

    pub(super) fn order_settled(
        state: &mut BookingSession,
        result: Result<OrderRef, PaymentError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if state.payment != PaymentPhase::CreatingOrder {
            return Self::discard(state, "OrderSettled", "no order requested");
        }

        let order = match result {
            Ok(order) => order,
            Err(error) => {
                tracing::warn!(session = %state.id, %error, "Order creation failed");
                state.payment = PaymentPhase::Idle;
                let text = format!("{error}. Please try again.");
                state.fail(error, text);
                return SmallVec::new();
            },
        };

        let title = state.movie.as_ref().map_or("your movie", |movie| movie.title.as_str());
        let request = CheckoutRequest {
            amount: order.amount,
            currency: if order.currency.is_empty() {
                env.context.currency.clone()
            } else {
                order.currency.clone()
            },
            order_id: order.order_id.clone(),
            description: format!("Payment for {title}"),
        };
        tracing::info!(session = %state.id, order_id = %order.order_id, amount = order.amount, "Opening checkout");
        state.notify(Notice::info("Complete the payment in the checkout window."));
        state.payment = PaymentPhase::AwaitingProvider { order };

        let checkout = Arc::clone(&env.checkout);
        let session = state.id;
        let order_id = request.order_id.clone();
        smallvec![Effect::Future(Box::pin(async move {
            // No callback means the user walked away; the session stays as is.
            let outcome = checkout.open(request).await?;
            Some(BookingAction::CheckoutResolved {
                session,
                order_id,
                outcome,
            })
        }))]
    }

    pub(super) fn checkout_resolved(
        state: &mut BookingSession,
        order_id: OrderId,
        outcome: CheckoutOutcome,
        env: &BookingEnvironment,
    ) -> Effects {
        let awaited = matches!(&state.payment, PaymentPhase::AwaitingProvider { order } if order.order_id == order_id);
        if !awaited {
            return Self::late_checkout(state, order_id, outcome, env);
        }

        match outcome {
            CheckoutOutcome::Succeeded(proof) => {
                if let BookingMode::UpdateExisting { original_ticket_id, .. } = &state.mode {
                    let ticket_id = original_ticket_id.clone();
                    Self::complete(state, ticket_id);
                    state.notify(Notice::info("Ticket updated successfully!"));
                    return SmallVec::new();
                }
                let Some(entry) = state.ticket_entry(&env.context.user_id) else {
                    return Self::discard(state, "CheckoutResolved", "no show selected");
                };

                tracing::info!(session = %state.id, %order_id, payment_id = %proof.payment_id, "Verifying payment");
                state.payment = PaymentPhase::Verifying {
                    order_id: order_id.clone(),
                };
                state.notify(Notice::info("Verifying payment..."));

                let request = env.payments.verify_and_book(proof, entry);
                let session = state.id;
                smallvec![Effect::Future(Box::pin(async move {
                    let result = request.await;
                    Some(BookingAction::VerificationSettled {
                        session,
                        order_id,
                        result,
                    })
                }))]
            },
            CheckoutOutcome::Failed { reason } => {
                tracing::warn!(session = %state.id, %order_id, %reason, "Payment failed at checkout");
                state.payment = PaymentPhase::Idle;
                let text = format!("Payment Failed: {reason}");
                state.fail(PaymentError::PaymentFailed(reason), text);
                SmallVec::new()
            },
        }
    }

    /// Remember the open checkout, if any, before the session moves past it
    pub(super) fn supersede_checkout(state: &mut BookingSession, env: &BookingEnvironment) {
        if let PaymentPhase::AwaitingProvider { order } = &state.payment {
            tracing::info!(session = %state.id, order_id = %order.order_id, "Checkout superseded while open");
            let superseded = SupersededOrder {
                order: order.clone(),
                entry: state.ticket_entry(&env.context.user_id),
            };
            state.superseded_orders.push(superseded);
        }
    }

    fn late_checkout(
        state: &mut BookingSession,
        order_id: OrderId,
        outcome: CheckoutOutcome,
        env: &BookingEnvironment,
    ) -> Effects {
        let CheckoutOutcome::Succeeded(proof) = outcome else {
            return Self::discard(state, "CheckoutResolved", "checkout not open for this order");
        };
        let Some(order) = Self::resumable_order(state, &order_id, env) else {
            return Self::unclaimed_payment(state, order_id, proof);
        };

        tracing::warn!(
            session = %state.id,
            %order_id,
            payment_id = %proof.payment_id,
            "Superseded checkout was paid; booking it"
        );
        Self::supersede_checkout(state, env);
        state.payment = PaymentPhase::AwaitingProvider { order };
        Self::transition(state, BookingStatus::PaymentPending);
        Self::checkout_resolved(state, order_id, CheckoutOutcome::Succeeded(proof), env)
    }

    /// The superseded order `order_id`, if it still pays for the current selection
    fn resumable_order(
        state: &mut BookingSession,
        order_id: &OrderId,
        env: &BookingEnvironment,
    ) -> Option<OrderRef> {
        let paying_stage = matches!(state.status, BookingStatus::FoodChosen | BookingStatus::PaymentPending);
        if !paying_stage || state.ticket_update_pending || matches!(state.payment, PaymentPhase::Verifying { .. }) {
            return None;
        }
        let current = state.ticket_entry(&env.context.user_id)?;
        let index = state.superseded_orders.iter().position(|superseded| {
            superseded.order.order_id == *order_id && superseded.entry.as_ref() == Some(&current)
        })?;
        Some(state.superseded_orders.remove(index).order)
    }

    /// A payment this session cannot turn into a ticket
    pub(super) fn unclaimed_payment(state: &mut BookingSession, order_id: OrderId, proof: PaymentProof) -> Effects {
        tracing::error!(
            session = %state.id,
            status = %state.status,
            %order_id,
            payment_id = %proof.payment_id,
            "Payment taken for a superseded checkout"
        );
        metrics::counter!("booking.payments.unclaimed").increment(1);
        let error = PaymentError::UnclaimedPayment {
            order_id,
            payment_id: proof.payment_id,
        };
        let text = format!("{error}. Please contact support with this reference.");
        state.fail(error, text);
        SmallVec::new()
    }

    /// Verification answer for a session that was cancelled while it ran
    pub(super) fn orphaned_verification(
        state: &mut BookingSession,
        order_id: &OrderId,
        result: Result<TicketId, PaymentError>,
    ) -> Effects {
        match result {
            Ok(ticket_id) => {
                tracing::warn!(session = %state.id, %order_id, %ticket_id, "Ticket issued for a cancelled booking");
                state.notify(Notice::warning(format!(
                    "Ticket {ticket_id} was issued for order {order_id} before the cancellation took effect."
                )));
            },
            Err(error) => {
                tracing::error!(session = %state.id, %order_id, %error, "Payment taken for a cancelled booking");
                let text = format!("{error}. Please contact support with order {order_id}.");
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }

    pub(super) fn verification_settled(
        state: &mut BookingSession,
        order_id: &OrderId,
        result: Result<TicketId, PaymentError>,
    ) -> Effects {
        let verifying = matches!(&state.payment, PaymentPhase::Verifying { order_id: current } if current == order_id);
        if !verifying {
            return Self::discard(state, "VerificationSettled", "no verification in flight for this order");
        }

        match result {
            Ok(ticket_id) => {
                Self::complete(state, ticket_id);
                state.notify(Notice::info("Booking successful! Here is your ticket."));
            },
            Err(error) => {
                // The money has been taken; this needs a human.
                tracing::error!(session = %state.id, %order_id, %error, "Payment taken but booking not confirmed");
                state.payment = PaymentPhase::Idle;
                let text = format!("{error}. Please contact support or retry.");
                state.fail(error, text);
            },
        }
        SmallVec::new()
    }
}
