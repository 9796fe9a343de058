//! Read path for presentation layers that see bookings through some store
//! other than this engine.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::catalogue::ServiceCatalogue;
use crate::interval::SlotLabelError;
use crate::model::{BookingProjection, ServiceKind};
use crate::observability::AVAILABILITY_FAIL_OPEN_TOTAL;

use super::{Engine, EngineError};
use super::availability::{blocked_slots, is_available, is_fully_booked};

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Read projection of a booking store: what is booked on one day.
#[async_trait]
pub trait BookingSource: Send + Sync {
    async fn fetch_day(
        &self,
        service: ServiceKind,
        date: NaiveDate,
    ) -> Result<Vec<BookingProjection>, SourceError>;
}

#[async_trait]
impl BookingSource for Engine {
    async fn fetch_day(
        &self,
        service: ServiceKind,
        date: NaiveDate,
    ) -> Result<Vec<BookingProjection>, SourceError> {
        Ok(self
            .bookings_on(service, date)
            .await
            .into_iter()
            .map(|b| BookingProjection::new(b.slot_label, b.tier_or_package))
            .collect())
    }
}

/// What a calendar widget needs for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub date: NaiveDate,
    pub blocked: Vec<String>,
    pub fully_booked: bool,
    /// Bookings could not be read; `blocked` is empty rather than everything.
    pub read_failed: bool,
}

async fn fetch_or_open(
    source: &dyn BookingSource,
    service: ServiceKind,
    date: NaiveDate,
) -> (Vec<BookingProjection>, bool) {
    match source.fetch_day(service, date).await {
        Ok(bookings) => (bookings, false),
        Err(e) => {
            metrics::counter!(AVAILABILITY_FAIL_OPEN_TOTAL, "service" => service.as_str())
                .increment(1);
            warn!(%service, %date, error = %e, "booking read failed; showing day as open");
            (Vec::new(), true)
        }
    }
}

/// Blocked slots for `date`. A failed read shows the day as open; the
/// atomic reservation still re-checks before anything is written.
pub async fn day_view(
    source: &dyn BookingSource,
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
) -> Result<DayView, SlotLabelError> {
    let (bookings, read_failed) = fetch_or_open(source, catalogue.service, date).await;
    let blocked = blocked_slots(catalogue, date, &bookings)?;
    Ok(DayView {
        date,
        fully_booked: is_fully_booked(catalogue, &blocked),
        blocked,
        read_failed,
    })
}

/// Point check immediately before submission, failing open like `day_view`.
pub async fn is_slot_available(
    source: &dyn BookingSource,
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    slot_label: &str,
    duration_minutes: u32,
) -> Result<bool, EngineError> {
    let (bookings, _) = fetch_or_open(source, catalogue.service, date).await;
    is_available(catalogue, date, slot_label, duration_minutes, &bookings)
}
