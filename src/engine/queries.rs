use chrono::NaiveDate;
use ulid::Ulid;

use crate::interval::parse_slot_label;
use crate::limits::*;
use crate::model::*;

use super::availability::{self, is_fully_booked};
use super::{Engine, EngineError};

impl Engine {
    /// Live bookings for one service on one day, by start time then creation.
    pub async fn bookings_on(&self, service: ServiceKind, date: NaiveDate) -> Vec<BookingRecord> {
        let Some(day) = self.get_day(&DayKey::new(service, date)) else {
            return Vec::new();
        };
        let mut bookings = day.read().await.bookings.clone();
        bookings.sort_by_key(|b| (parse_slot_label(&b.slot_label).ok(), b.created_at));
        bookings
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<BookingRecord> {
        let key = *self.booking_to_day.get(&id)?.value();
        let day = self.get_day(&key)?;
        let guard = day.read().await;
        guard.get(id).cloned()
    }

    pub async fn unavailable_slots(
        &self,
        service: ServiceKind,
        date: NaiveDate,
    ) -> Result<Vec<String>, EngineError> {
        let bookings = self.bookings_on(service, date).await;
        Ok(availability::blocked_slots(self.catalogue(service), date, &bookings)?)
    }

    pub async fn slot_grid(
        &self,
        service: ServiceKind,
        date: NaiveDate,
    ) -> Result<Vec<SlotState>, EngineError> {
        let bookings = self.bookings_on(service, date).await;
        Ok(availability::slot_grid(self.catalogue(service), date, &bookings)?)
    }

    /// Would a session of `length` starting at `slot_label` fit right now?
    pub async fn check_slot(
        &self,
        service: ServiceKind,
        date: NaiveDate,
        slot_label: &str,
        length: &SessionLength,
    ) -> Result<bool, EngineError> {
        let catalogue = self.catalogue(service);
        let minutes = match length {
            SessionLength::Tier(tier) => catalogue.duration_minutes(tier),
            SessionLength::Minutes(m) => *m,
        };
        let bookings = self.bookings_on(service, date).await;
        availability::is_available(catalogue, date, slot_label, minutes, &bookings)
    }

    /// Days in `[from, to]` on which every catalogue slot is blocked.
    pub async fn fully_booked_dates(
        &self,
        service: ServiceKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        if to < from {
            return Ok(Vec::new());
        }
        if (to - from).num_days() + 1 > MAX_DATE_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let catalogue = self.catalogue(service);
        let mut days: Vec<NaiveDate> = self
            .days
            .iter()
            .map(|e| *e.key())
            .filter(|k| k.service == service && k.date >= from && k.date <= to)
            .map(|k| k.date)
            .collect();
        days.sort();

        let mut full = Vec::new();
        for date in days {
            let bookings = self.bookings_on(service, date).await;
            let blocked = availability::blocked_slots(catalogue, date, &bookings)?;
            if is_fully_booked(catalogue, &blocked) {
                full.push(date);
            }
        }
        Ok(full)
    }
}
