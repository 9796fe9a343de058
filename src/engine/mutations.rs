use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::catalogue::ServiceCatalogue;
use crate::limits::*;
use crate::model::*;
use crate::observability::RESERVATIONS_TOTAL;

use super::conflict::{find_conflict, now_ms, validate_candidate};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Atomically re-check and insert a pending booking.
    ///
    /// A conflict is an expected outcome, returned as `Reservation::Conflict`
    /// rather than an error.
    pub async fn reserve(&self, candidate: CandidateRequest) -> Result<Reservation, EngineError> {
        let key = candidate.key();
        let catalogue = self.catalogue(candidate.service);
        let slot_label = validate_candidate(catalogue, &candidate)?;
        if self.booking_to_day.contains_key(&candidate.id) {
            return Err(EngineError::AlreadyExists(candidate.id));
        }

        let _gate = self.wal_gate.read().await;
        let mut guard = self.lock_day_write(key).await;

        // The id is claimed before the WAL append so the same id racing on
        // another day sees it taken.
        let id = candidate.id;
        match self.booking_to_day.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(key);
            }
        }
        let outcome = self
            .reserve_claimed(&mut guard, catalogue, candidate, slot_label)
            .await;
        if !matches!(outcome, Ok(Reservation::Inserted(_))) {
            self.booking_to_day.remove(&id);
        }
        outcome
    }

    async fn reserve_claimed(
        &self,
        day: &mut DayState,
        catalogue: &ServiceCatalogue,
        candidate: CandidateRequest,
        slot_label: String,
    ) -> Result<Reservation, EngineError> {
        let key = day.key;
        if day.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this day"));
        }

        let tier_or_package = candidate.tier_or_package.trim().to_string();
        if let Some(conflicting) =
            find_conflict(catalogue, key.date, &slot_label, &tier_or_package, &day.bookings)?
        {
            metrics::counter!(RESERVATIONS_TOTAL, "service" => key.service.as_str(), "outcome" => "conflict")
                .increment(1);
            warn!(day = %key, slot = %slot_label, %conflicting, "reservation rejected: slot no longer available");
            return Ok(Reservation::Conflict { conflicting });
        }

        let record = BookingRecord {
            id: candidate.id,
            service: key.service,
            date: key.date,
            slot_label,
            tier_or_package,
            label: candidate.label,
            status: BookingStatus::Pending,
            created_at: now_ms(),
        };
        self.persist_and_apply(day, &Event::reserved(&record)).await?;
        metrics::counter!(RESERVATIONS_TOTAL, "service" => key.service.as_str(), "outcome" => "inserted")
            .increment(1);
        debug!(day = %key, id = %record.id, slot = %record.slot_label, "booking reserved");
        Ok(Reservation::Inserted(record))
    }

    /// `reserve`, with a conflict surfaced as `SlotNoLongerAvailable`.
    pub async fn reserve_or_reject(
        &self,
        candidate: CandidateRequest,
    ) -> Result<BookingRecord, EngineError> {
        match self.reserve(candidate).await? {
            Reservation::Inserted(record) => Ok(record),
            Reservation::Conflict { conflicting } => {
                Err(EngineError::SlotNoLongerAvailable { conflicting })
            }
        }
    }

    /// Promote a booking once payment lands. Setting the current status
    /// again is a no-op; paid bookings never go back to pending.
    pub async fn update_status(
        &self,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<BookingRecord, EngineError> {
        let _gate = self.wal_gate.read().await;
        let (_, mut guard) = self.resolve_booking_write(id).await?;
        let current = guard.get(id).ok_or(EngineError::NotFound(id))?.clone();
        if current.status == status {
            return Ok(current);
        }
        if current.status == BookingStatus::Paid {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let event = Event::BookingStatusChanged {
            id,
            service: current.service,
            date: current.date,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(BookingRecord { status, ..current })
    }

    /// Remove a booking; its window stops blocking immediately. A day left
    /// with no bookings is dropped from memory.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<BookingRecord, EngineError> {
        let _gate = self.wal_gate.read().await;
        let (day, mut guard) = self.resolve_booking_write(id).await?;
        let record = guard.get(id).ok_or(EngineError::NotFound(id))?.clone();
        let event = Event::BookingCancelled {
            id,
            service: record.service,
            date: record.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.forget_if_empty(&day, &guard);
        Ok(record)
    }

    /// Rewrite the WAL as one `BookingReserved` per live booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.wal_gate.write().await;
        let mut days: Vec<(DayKey, super::SharedDayState)> = self
            .days
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by_key(|(key, _)| *key);

        let mut events = Vec::new();
        for (_, day) in days {
            let guard = day.read().await;
            events.extend(guard.bookings.iter().map(Event::reserved));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::Compact { events, response: tx }, rx)
            .await?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::AppendsSinceCompact { response: tx }, rx)
            .await
            .unwrap_or(0)
    }
}
