//! Seat selection.
//!
//! A seat has at most one inventory request in flight. Responses echo the
//! request's sequence number; anything that does not match the seat's
//! outstanding request is stale.

use super::{BookingReducer, Effects};
use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::error::{InventoryError, LockDenied, LockError};
use crate::inventory::{LockGranted, Unlocked};
use crate::session::{BookingSession, BookingStatus, Notice, PendingRequest, RequestKind};
use crate::types::{SeatId, SeatLabel, SeatLockState, SessionId, ShowId};
use marquee_core::{SmallVec, effect::Effect, smallvec};

const LOCKED_BY_OTHER: &str = "This seat is currently locked by another user. Please try a different seat.";
const ALREADY_SOLD: &str = "This seat is already sold. Please select an available seat.";

impl BookingReducer {
    pub(super) fn toggle_seat(state: &mut BookingSession, seat: SeatLabel, env: &BookingEnvironment) -> Effects {
        if !state.status.is_selecting_seats() {
            return Self::reject(state, "Choose how many seats you need first.");
        }
        if state.ticket_update_pending {
            return Self::reject(state, "Your ticket update is in progress.");
        }
        let Some(entry) = state.seats.get(&seat) else {
            return Self::reject(state, format!("Seat {seat} is not part of this show."));
        };
        let (seat_id, lock, pending) = (entry.seat_id.clone(), entry.lock, entry.pending);
        let count = state.seat_count.map_or(0, |count| usize::try_from(count).unwrap_or(usize::MAX));

        if let Some(pending) = pending {
            return Self::toggle_pending(state, &seat, pending, count);
        }

        if state.is_selected(&seat) {
            state.selected_seats.retain(|selected| selected != &seat);
            let seq = Self::mark_pending(state, &seat, RequestKind::Unlock);
            Self::sync_selection_status(state);
            state.notify(Notice::info(format!("Releasing seat {seat}.")));
            return smallvec![Self::unlock_effect(state.id, seat, seat_id, seq, env)];
        }

        match lock {
            SeatLockState::LockedByOther => return Self::reject(state, LOCKED_BY_OTHER),
            SeatLockState::Sold => return Self::reject(state, ALREADY_SOLD),
            SeatLockState::Unlocked | SeatLockState::LockedByMe => {},
        }
        if state.quota_used() >= count {
            return Self::reject(state, format!("You can only select {count} seat(s)."));
        }

        let seq = Self::mark_pending(state, &seat, RequestKind::Lock);
        state.notify(Notice::info(format!("Selecting seat {seat}...")));
        smallvec![Self::lock_effect(state.id, seat, seat_id, seq, env)]
    }

    /// Toggle on a seat whose request has not come back yet
    fn toggle_pending(
        state: &mut BookingSession,
        seat: &SeatLabel,
        pending: PendingRequest,
        count: usize,
    ) -> Effects {
        match pending.kind {
            RequestKind::Unlock => {
                Self::reject(state, format!("Seat {seat} is still being released. Try again in a moment."))
            },
            RequestKind::Lock if !pending.withdrawn => {
                Self::set_withdrawn(state, seat, true);
                tracing::debug!(session = %state.id, %seat, seq = pending.seq, "Lock withdrawn while in flight");
                state.notify(Notice::info(format!("Releasing seat {seat}.")));
                SmallVec::new()
            },
            RequestKind::Lock => {
                if state.quota_used() >= count {
                    return Self::reject(state, format!("You can only select {count} seat(s)."));
                }
                Self::set_withdrawn(state, seat, false);
                state.notify(Notice::info(format!("Selecting seat {seat}...")));
                SmallVec::new()
            },
        }
    }

    pub(super) fn lock_settled(
        state: &mut BookingSession,
        seat: SeatLabel,
        seat_id: SeatId,
        seq: u64,
        result: Result<LockGranted, LockError>,
        env: &BookingEnvironment,
    ) -> Effects {
        let pending = state
            .seats
            .get(&seat)
            .and_then(|entry| entry.pending)
            .filter(|pending| pending.kind == RequestKind::Lock && pending.seq == seq);
        let Some(pending) = pending else {
            return Self::settle_orphaned_lock(state, &seat_id, &result, env);
        };
        Self::clear_pending(state, &seat);

        match result {
            Ok(LockGranted) if pending.withdrawn => {
                tracing::debug!(session = %state.id, %seat, "Releasing a lock the user already withdrew");
                Self::set_lock(state, &seat, SeatLockState::Unlocked);
                let seq = Self::mark_pending(state, &seat, RequestKind::Unlock);
                smallvec![Self::unlock_effect(state.id, seat, seat_id, seq, env)]
            },
            Ok(LockGranted) => {
                Self::set_lock(state, &seat, SeatLockState::LockedByMe);
                if !state.is_selected(&seat) {
                    state.selected_seats.push(seat.clone());
                }
                Self::sync_selection_status(state);
                state.notify(Notice::info(format!("Seat {seat} selected.")));
                SmallVec::new()
            },
            Err(LockError::Denied(reason)) => {
                Self::lock_denied(state, &seat, reason, pending.withdrawn, env)
            },
            Err(LockError::Inventory(error)) => {
                tracing::warn!(session = %state.id, %seat, %error, "Seat lock request failed");
                if !pending.withdrawn {
                    let text = format!("Could not lock seat {seat}: {error}. Please try again.");
                    state.fail(error, text);
                }
                SmallVec::new()
            },
        }
    }

    fn lock_denied(
        state: &mut BookingSession,
        seat: &SeatLabel,
        reason: LockDenied,
        withdrawn: bool,
        env: &BookingEnvironment,
    ) -> Effects {
        metrics::counter!("booking.locks.denied", "reason" => match reason {
            LockDenied::AlreadySold => "sold",
            LockDenied::AlreadyLocked => "locked",
        })
        .increment(1);
        tracing::info!(session = %state.id, %seat, %reason, "Seat lock denied");

        let (lock, text) = match reason {
            LockDenied::AlreadySold => (SeatLockState::Sold, format!("Seat {seat} is already sold. Please select an available seat.")),
            LockDenied::AlreadyLocked => (
                SeatLockState::LockedByOther,
                format!("Seat {seat} is currently locked by another user. Please try a different seat."),
            ),
        };
        Self::set_lock(state, seat, lock);
        if !withdrawn {
            state.last_error = Some(reason.into());
            state.notify(Notice::warning(text));
        }

        // Someone else got there first; the rest of the cache may be stale too.
        match state.show_id().cloned() {
            Some(show_id) => smallvec![Self::fetch_seat_map(state.id, show_id, env)],
            None => SmallVec::new(),
        }
    }

    pub(super) fn unlock_settled(
        state: &mut BookingSession,
        seat: &SeatLabel,
        seq: u64,
        result: Result<Unlocked, InventoryError>,
    ) -> Effects {
        let current = state
            .seats
            .get(seat)
            .and_then(|entry| entry.pending)
            .is_some_and(|pending| pending.kind == RequestKind::Unlock && pending.seq == seq);
        if !current {
            return Self::discard(state, "UnlockSettled", "superseded request");
        }

        Self::clear_pending(state, seat);
        Self::set_lock(state, seat, SeatLockState::Unlocked);
        match result {
            Ok(Unlocked) => tracing::debug!(session = %state.id, %seat, "Seat released"),
            Err(error) => {
                tracing::warn!(session = %state.id, %seat, %error, "Unlock failed, the server lock will lapse on its own");
            },
        }
        SmallVec::new()
    }

    /// A lock grant that no outstanding request is waiting for
    ///
    /// The server holds the lock for this user either way, so unless the
    /// current session has claimed the same seat it is released right away.
    pub(super) fn settle_orphaned_lock(
        state: &BookingSession,
        seat_id: &SeatId,
        result: &Result<LockGranted, LockError>,
        env: &BookingEnvironment,
    ) -> Effects {
        if result.is_err() {
            return Self::discard(state, "LockSettled", "superseded request");
        }
        let claimed = state.seats.has_pending_for(seat_id)
            || state
                .seats
                .label_of(seat_id)
                .is_some_and(|label| state.is_selected(label));
        if claimed {
            return Self::discard(state, "LockSettled", "seat claimed by the current session");
        }

        tracing::warn!(session = %state.id, %seat_id, "Releasing a lock granted to an abandoned request");
        smallvec![Self::release_effect(seat_id.clone(), env)]
    }

    /// Best-effort unlock of every seat this session holds, without waiting
    ///
    /// Locks still in flight are released when their grant arrives for a
    /// session that no longer exists.
    pub(super) fn release_all(state: &BookingSession, env: &BookingEnvironment) -> Effects {
        state
            .seats
            .iter()
            .filter(|(_, entry)| entry.lock == SeatLockState::LockedByMe && entry.pending.is_none())
            .map(|(_, entry)| Self::release_effect(entry.seat_id.clone(), env))
            .collect()
    }

    /// Give back the current selection while staying in the session
    pub(super) fn release_selection(state: &mut BookingSession, env: &BookingEnvironment) -> Effects {
        let mut effects = SmallVec::new();

        for seat in std::mem::take(&mut state.selected_seats) {
            let Some(seat_id) = state.seats.get(&seat).map(|entry| entry.seat_id.clone()) else {
                continue;
            };
            let seq = Self::mark_pending(state, &seat, RequestKind::Unlock);
            effects.push(Self::unlock_effect(state.id, seat, seat_id, seq, env));
        }

        let in_flight: Vec<SeatLabel> = state
            .seats
            .iter()
            .filter(|(_, entry)| entry.pending.is_some_and(|p| p.kind == RequestKind::Lock))
            .map(|(label, _)| label.clone())
            .collect();
        for seat in &in_flight {
            Self::set_withdrawn(state, seat, true);
        }

        effects
    }

    pub(super) fn sync_selection_status(state: &mut BookingSession) {
        if !state.status.is_selecting_seats() {
            return;
        }
        let target = if state.selected_seats.is_empty() {
            BookingStatus::SeatCountChosen
        } else {
            BookingStatus::SeatsSelected
        };
        if state.status != target {
            Self::transition(state, target);
        }
    }

    // ========== Effects ==========

    fn lock_effect(
        session: SessionId,
        seat: SeatLabel,
        seat_id: SeatId,
        seq: u64,
        env: &BookingEnvironment,
    ) -> Effect<BookingAction> {
        let request = env.inventory.lock_seat(seat_id.clone(), env.context.user_id.clone());
        Effect::Future(Box::pin(async move {
            let result = request.await;
            Some(BookingAction::LockSettled {
                session,
                seat,
                seat_id,
                seq,
                result,
            })
        }))
    }

    fn unlock_effect(
        session: SessionId,
        seat: SeatLabel,
        seat_id: SeatId,
        seq: u64,
        env: &BookingEnvironment,
    ) -> Effect<BookingAction> {
        let request = env.inventory.unlock_seat(seat_id, env.context.user_id.clone());
        Effect::Future(Box::pin(async move {
            let result = request.await;
            Some(BookingAction::UnlockSettled {
                session,
                seat,
                seq,
                result,
            })
        }))
    }

    fn release_effect(seat_id: SeatId, env: &BookingEnvironment) -> Effect<BookingAction> {
        let request = env.inventory.unlock_seat(seat_id.clone(), env.context.user_id.clone());
        Effect::Future(Box::pin(async move {
            if let Err(error) = request.await {
                tracing::warn!(%seat_id, %error, "Best-effort unlock failed, the server lock will lapse on its own");
            }
            None
        }))
    }

    pub(super) fn fetch_seat_map(
        session: SessionId,
        show_id: ShowId,
        env: &BookingEnvironment,
    ) -> Effect<BookingAction> {
        let request = env.inventory.fetch_seat_map(show_id.clone());
        Effect::Future(Box::pin(async move {
            let result = request.await;
            Some(BookingAction::SeatMapRefreshed {
                session,
                show_id,
                result,
            })
        }))
    }

    // ========== Seat map bookkeeping ==========

    fn mark_pending(state: &mut BookingSession, seat: &SeatLabel, kind: RequestKind) -> u64 {
        let seq = state.next_seq();
        if let Some(entry) = state.seats.get_mut(seat) {
            entry.pending = Some(PendingRequest {
                seq,
                kind,
                withdrawn: false,
            });
        }
        seq
    }

    fn clear_pending(state: &mut BookingSession, seat: &SeatLabel) {
        if let Some(entry) = state.seats.get_mut(seat) {
            entry.pending = None;
        }
    }

    fn set_withdrawn(state: &mut BookingSession, seat: &SeatLabel, withdrawn: bool) {
        if let Some(pending) = state.seats.get_mut(seat).and_then(|entry| entry.pending.as_mut()) {
            pending.withdrawn = withdrawn;
        }
    }

    fn set_lock(state: &mut BookingSession, seat: &SeatLabel, lock: SeatLockState) {
        if let Some(entry) = state.seats.get_mut(seat) {
            entry.lock = lock;
        }
    }
}
