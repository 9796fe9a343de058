use chrono::NaiveDate;

use crate::catalogue::ServiceCatalogue;
use crate::interval::{SlotLabelError, overlaps, slot_window, to_interval};
use crate::model::*;

use super::EngineError;
use super::conflict::validate_session_minutes;

// ── Slot evaluator ───────────────────────────────────────────────
//
// Pure functions over one (service, date). Every booking passed in is
// assumed to sit on `date`; nothing here looks at neighbouring days.

/// A booking's session interval pushed out by the catalogue's cleaning gap.
pub fn blocked_window<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    booking: &B,
) -> Result<Span, SlotLabelError> {
    let minutes = catalogue.duration_minutes(booking.tier_or_package());
    let session = to_interval(date, booking.slot_label(), minutes)?;
    Ok(session.extended_by_minutes(catalogue.cleaning_gap_minutes))
}

fn blocked_windows<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    bookings: &[B],
) -> Result<Vec<Span>, SlotLabelError> {
    bookings
        .iter()
        .map(|b| blocked_window(catalogue, date, b))
        .collect()
}

/// Catalogue slots whose one-hour window overlaps any booking's blocked
/// window, in catalogue order.
pub fn blocked_slots<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    bookings: &[B],
) -> Result<Vec<String>, SlotLabelError> {
    Ok(slot_grid(catalogue, date, bookings)?
        .into_iter()
        .filter(|s| !s.available)
        .map(|s| s.slot_label)
        .collect())
}

/// Every catalogue slot with its window and whether a booking blocks it.
pub fn slot_grid<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    bookings: &[B],
) -> Result<Vec<SlotState>, SlotLabelError> {
    let windows = blocked_windows(catalogue, date, bookings)?;
    catalogue
        .slot_labels
        .iter()
        .map(|label| {
            let window = slot_window(date, label)?;
            let available = !windows.iter().any(|w| overlaps(&window, w));
            Ok(SlotState {
                slot_label: label.clone(),
                window,
                available,
            })
        })
        .collect()
}

/// An empty catalogue is never fully booked.
pub fn is_fully_booked(catalogue: &ServiceCatalogue, blocked: &[String]) -> bool {
    !catalogue.slot_labels.is_empty() && blocked.len() >= catalogue.slot_labels.len()
}

/// Index of the first booking whose blocked window overlaps `candidate`.
///
/// The candidate is compared as given. Callers pass the raw session for the
/// usual check, or a buffered one to enforce the gap in both directions.
pub fn first_conflict<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    candidate: &Span,
    bookings: &[B],
) -> Result<Option<usize>, SlotLabelError> {
    for (i, booking) in bookings.iter().enumerate() {
        if overlaps(candidate, &blocked_window(catalogue, date, booking)?) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Point check before submission. The candidate's own interval is not
/// buffered; only existing bookings carry the cleaning gap.
///
/// Fails with `InvalidSlotLabel` for a slot outside the catalogue and with
/// `LimitExceeded` for a zero or over-long duration.
pub fn is_available<B: Booked>(
    catalogue: &ServiceCatalogue,
    date: NaiveDate,
    candidate_slot: &str,
    duration_minutes: u32,
    bookings: &[B],
) -> Result<bool, EngineError> {
    validate_session_minutes(duration_minutes)?;
    let slot = catalogue.find_slot(candidate_slot)?;
    let candidate = to_interval(date, slot, duration_minutes)?;
    Ok(first_conflict(catalogue, date, &candidate, bookings)?.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::ServiceCatalogue;
    use crate::limits::MAX_SESSION_MINUTES;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn b(slot: &str, tier: &str) -> BookingProjection {
        BookingProjection::new(slot, tier)
    }

    #[test]
    fn premium_at_ten_blocks_ten_and_eleven() {
        let spa = ServiceCatalogue::spa();
        let bookings = [b("10:00 AM", "premium")];
        let blocked = blocked_slots(&spa, date(), &bookings).unwrap();
        assert_eq!(blocked, vec!["10:00 AM".to_string(), "11:00 AM".to_string()]);
        assert!(is_available(&spa, date(), "12:00 PM", 60, &bookings).unwrap());
        assert!(!is_available(&spa, date(), "11:00 AM", 60, &bookings).unwrap());
        // Raw candidate 09:00-10:00 ends as the booking starts.
        assert!(is_available(&spa, date(), "09:00 AM", 60, &bookings).unwrap());
    }

    #[test]
    fn off_catalogue_candidate_is_rejected() {
        let spa = ServiceCatalogue::spa();
        let bookings = [b("10:00 AM", "premium")];
        assert!(matches!(
            is_available(&spa, date(), "11:30 AM", 60, &bookings),
            Err(EngineError::InvalidSlotLabel(SlotLabelError::NotInCatalogue(label))) if label == "11:30 AM"
        ));
    }

    #[test]
    fn session_length_must_be_positive_and_bounded() {
        let spa = ServiceCatalogue::spa();
        let none: [BookingProjection; 0] = [];
        assert!(matches!(
            is_available(&spa, date(), "10:00 AM", 0, &none),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(matches!(
            is_available(&spa, date(), "10:00 AM", MAX_SESSION_MINUTES + 1, &none),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(is_available(&spa, date(), "10:00 AM", 1, &none).unwrap());
    }

    #[test]
    fn empty_day_blocks_nothing() {
        for catalogue in [ServiceCatalogue::spa(), ServiceCatalogue::cinema()] {
            let none: [BookingProjection; 0] = [];
            let blocked = blocked_slots(&catalogue, date(), &none).unwrap();
            assert!(blocked.is_empty());
            assert!(!is_fully_booked(&catalogue, &blocked));
            for label in &catalogue.slot_labels {
                assert!(is_available(&catalogue, date(), label, 60, &none).unwrap());
            }
        }
    }

    #[test]
    fn booking_blocks_itself() {
        let spa = ServiceCatalogue::spa();
        let none: [BookingProjection; 0] = [];
        for (slot, tier) in [("09:00 AM", "standard"), ("02:00 PM", "deluxe"), ("08:00 PM", "premium")] {
            let minutes = spa.duration_minutes(tier);
            assert!(is_available(&spa, date(), slot, minutes, &none).unwrap());
            assert!(!is_available(&spa, date(), slot, minutes, &[b(slot, tier)]).unwrap());
        }
    }

    #[test]
    fn cleaning_gap_enforced_after_raw_end() {
        let spa = ServiceCatalogue::spa();
        // Standard at 10:00 ends 11:00, blocked until 11:30.
        let bookings = [b("10:00 AM", "standard")];
        assert!(!is_available(&spa, date(), "11:00 AM", 60, &bookings).unwrap());
        assert!(is_available(&spa, date(), "12:00 PM", 60, &bookings).unwrap());

        let mut no_gap = ServiceCatalogue::spa();
        no_gap.cleaning_gap_minutes = 0;
        assert!(is_available(&no_gap, date(), "11:00 AM", 60, &bookings).unwrap());
    }

    #[test]
    fn candidate_is_not_blocked_by_its_own_buffer() {
        let spa = ServiceCatalogue::spa();
        // A 60-minute candidate at 09:00 plus gap would reach 10:30, but
        // only existing bookings carry the gap.
        let bookings = [b("10:00 AM", "standard")];
        assert!(is_available(&spa, date(), "09:00 AM", 60, &bookings).unwrap());
        let buffered = to_interval(date(), "09:00 AM", 60).unwrap().extended_by_minutes(30);
        assert_eq!(first_conflict(&spa, date(), &buffered, &bookings).unwrap(), Some(0));
    }

    #[test]
    fn full_day_flips_when_unique_blocker_removed() {
        let spa = ServiceCatalogue::spa();
        // Deluxe blocks 150 minutes, so one every two hours covers the day.
        let mut bookings = vec![
            b("09:00 AM", "deluxe"),
            b("11:00 AM", "deluxe"),
            b("01:00 PM", "deluxe"),
            b("03:00 PM", "deluxe"),
            b("05:00 PM", "deluxe"),
            b("07:00 PM", "deluxe"),
        ];
        let blocked = blocked_slots(&spa, date(), &bookings).unwrap();
        assert_eq!(blocked.len(), spa.slot_labels.len());
        assert!(is_fully_booked(&spa, &blocked));

        // 07:00 PM deluxe is the only one covering 08:00 PM.
        bookings.pop();
        let blocked = blocked_slots(&spa, date(), &bookings).unwrap();
        assert!(!is_fully_booked(&spa, &blocked));
        assert!(!blocked.contains(&"08:00 PM".to_string()));
    }

    #[test]
    fn unknown_package_uses_default_duration() {
        let spa = ServiceCatalogue::spa();
        let bookings = [b("10:00 AM", "Mystery Package")];
        let window = blocked_window(&spa, date(), &bookings[0]).unwrap();
        assert_eq!(window.duration_ms(), 90 * MINUTE_MS);
        let blocked = blocked_slots(&spa, date(), &bookings).unwrap();
        assert_eq!(blocked, vec!["10:00 AM".to_string(), "11:00 AM".to_string()]);
    }

    #[test]
    fn legacy_package_names_block_like_tiers() {
        let spa = ServiceCatalogue::spa();
        let by_tier = blocked_slots(&spa, date(), &[b("01:00 PM", "deluxe")]).unwrap();
        let by_name =
            blocked_slots(&spa, date(), &[b("01:00 PM", "2 Hour Premium Session")]).unwrap();
        assert_eq!(by_tier, by_name);
    }

    #[test]
    fn cinema_session_past_midnight_is_computed() {
        let cinema = ServiceCatalogue::cinema();
        let bookings = [b("09:00 PM", "deluxe")];
        let window = blocked_window(&cinema, date(), &bookings[0]).unwrap();
        assert_eq!(window.duration_ms(), (720 + 30) * MINUTE_MS);
        let blocked = blocked_slots(&cinema, date(), &bookings).unwrap();
        assert_eq!(blocked, vec!["09:00 PM".to_string()]);
    }

    #[test]
    fn cinema_standard_blocks_four_slots() {
        let cinema = ServiceCatalogue::cinema();
        // 12:00-15:00, blocked until 15:30.
        let blocked = blocked_slots(&cinema, date(), &[b("12:00 PM", "standard")]).unwrap();
        assert_eq!(blocked, vec!["12:00 PM", "01:00 PM", "02:00 PM", "03:00 PM"]);
    }

    #[test]
    fn malformed_existing_label_is_reported() {
        let spa = ServiceCatalogue::spa();
        let err = blocked_slots(&spa, date(), &[b("sometime", "standard")]).unwrap_err();
        assert!(matches!(err, SlotLabelError::Malformed(_)));
    }

    #[test]
    fn empty_catalogue_never_fully_booked() {
        let mut spa = ServiceCatalogue::spa();
        spa.slot_labels.clear();
        let blocked = blocked_slots(&spa, date(), &[b("10:00 AM", "deluxe")]).unwrap();
        assert!(blocked.is_empty());
        assert!(!is_fully_booked(&spa, &blocked));
    }

    #[test]
    fn grid_reports_each_slot_once() {
        let spa = ServiceCatalogue::spa();
        let grid = slot_grid(&spa, date(), &[b("10:00 AM", "premium"), b("10:00 AM", "deluxe")]).unwrap();
        assert_eq!(grid.len(), spa.slot_labels.len());
        let unavailable: Vec<_> = grid.iter().filter(|s| !s.available).map(|s| s.slot_label.as_str()).collect();
        assert_eq!(unavailable, vec!["10:00 AM", "11:00 AM", "12:00 PM"]);
        assert!(grid.iter().all(|s| s.window.duration_ms() == 60 * MINUTE_MS));
    }
}
