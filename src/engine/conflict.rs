use chrono::NaiveDate;
use ulid::Ulid;

use crate::catalogue::ServiceCatalogue;
use crate::interval::to_interval;
use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::availability::first_conflict;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Check sizes and resolve the requested slot to the catalogue's spelling.
pub(crate) fn validate_candidate(
    catalogue: &ServiceCatalogue,
    candidate: &CandidateRequest,
) -> Result<String, EngineError> {
    if candidate.slot_label.len() > MAX_SLOT_LABEL_LEN {
        return Err(EngineError::LimitExceeded("slot label too long"));
    }
    if candidate.tier_or_package.len() > MAX_TIER_LEN {
        return Err(EngineError::LimitExceeded("tier too long"));
    }
    if let Some(ref l) = candidate.label
        && l.len() > MAX_LABEL_LEN
    {
        return Err(EngineError::LimitExceeded("label too long"));
    }
    Ok(catalogue.find_slot(&candidate.slot_label)?.to_string())
}

pub(crate) fn validate_session_minutes(minutes: u32) -> Result<(), EngineError> {
    if minutes == 0 {
        return Err(EngineError::LimitExceeded("session duration must be positive"));
    }
    if minutes > MAX_SESSION_MINUTES {
        return Err(EngineError::LimitExceeded("session duration too long"));
    }
    Ok(())
}

/// Write-time re-check of a candidate against the committed bookings of its day.
///
/// Uses the same rule as the read-side point check. With `strict_buffer`
/// the candidate's own gap must also stay clear of later bookings.
pub(crate) fn find_conflict(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    slot_label: &str,
    tier_or_package: &str,
    bookings: &[BookingRecord],
) -> Result<Option<Ulid>, EngineError> {
    let minutes = catalogue.duration_minutes(tier_or_package);
    let mut candidate = to_interval(date, slot_label, minutes)?;
    if catalogue.strict_buffer {
        candidate = candidate.extended_by_minutes(catalogue.cleaning_gap_minutes);
    }
    Ok(first_conflict(catalogue, date, &candidate, bookings)?.map(|i| bookings[i].id))
}
