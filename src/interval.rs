//! Slot-label arithmetic: turning `"10:00 AM"` on a calendar day into a
//! concrete `[start, end)` span.
//!
//! All instants are naive local wall-clock time for a single venue. No
//! timezone conversion happens anywhere, so a date's midnight is simply its
//! day count since the epoch times 24 hours.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::model::{MINUTE_MS, Ms, Span};

/// Every catalogue slot is exactly this wide when compared against bookings.
pub const SLOT_WIDTH_MINUTES: u32 = 60;

/// Time of day parsed from a 12-hour slot label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime {
    pub hour: u32,
    pub minute: u32,
}

impl SlotTime {
    pub fn minutes_from_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl fmt::Display for SlotTime {
    /// Canonical 12-hour form, e.g. `09:00 AM`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = if self.hour < 12 { "AM" } else { "PM" };
        let hour12 = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{hour12:02}:{:02} {period}", self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLabelError {
    Malformed(String),
    NotInCatalogue(String),
}

impl fmt::Display for SlotLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotLabelError::Malformed(label) => {
                write!(f, "invalid slot label '{label}': expected HH:MM AM|PM")
            }
            SlotLabelError::NotInCatalogue(label) => {
                write!(f, "invalid slot label '{label}': not a bookable slot")
            }
        }
    }
}

impl std::error::Error for SlotLabelError {}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse `"HH:MM AM"` / `"H:MM PM"`.
///
/// 12 AM is hour 0, 12 PM stays 12, any other PM hour adds 12. Minutes pass
/// through unchanged.
pub fn parse_slot_label(label: &str) -> Result<SlotTime, SlotLabelError> {
    let malformed = || SlotLabelError::Malformed(label.to_string());

    let (clock, period) = label.trim().split_once(' ').ok_or_else(malformed)?;
    let (h, m) = clock.split_once(':').ok_or_else(malformed)?;
    if !all_digits(h) || h.len() > 2 || !all_digits(m) || m.len() != 2 {
        return Err(malformed());
    }
    let hour: u32 = h.parse().map_err(|_| malformed())?;
    let minute: u32 = m.parse().map_err(|_| malformed())?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(malformed());
    }

    let hour = match period.trim().to_ascii_uppercase().as_str() {
        "AM" if hour == 12 => 0,
        "AM" => hour,
        "PM" if hour == 12 => 12,
        "PM" => hour + 12,
        _ => return Err(malformed()),
    };
    Ok(SlotTime { hour, minute })
}

pub fn local_midnight_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Start instant of `label` on `date`.
pub fn slot_start(date: NaiveDate, label: &str) -> Result<Ms, SlotLabelError> {
    let t = parse_slot_label(label)?;
    Ok(local_midnight_ms(date) + Ms::from(t.minutes_from_midnight()) * MINUTE_MS)
}

/// `[start(date, label), start + duration)`.
///
/// The end is a full instant, so a session running past midnight simply
/// lands on the next day's clock without special handling.
pub fn to_interval(
    date: NaiveDate,
    label: &str,
    duration_minutes: u32,
) -> Result<Span, SlotLabelError> {
    let start = slot_start(date, label)?;
    Ok(Span::new(start, start + Ms::from(duration_minutes) * MINUTE_MS))
}

/// The fixed one-hour window a catalogue slot occupies in the grid.
pub fn slot_window(date: NaiveDate, label: &str) -> Result<Span, SlotLabelError> {
    to_interval(date, label, SLOT_WIDTH_MINUTES)
}

/// Half-open overlap: touching endpoints do not overlap.
pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.overlaps(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 60 * MINUTE_MS;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn parses_morning_and_afternoon() {
        assert_eq!(parse_slot_label("09:00 AM").unwrap(), SlotTime { hour: 9, minute: 0 });
        assert_eq!(parse_slot_label("01:30 PM").unwrap(), SlotTime { hour: 13, minute: 30 });
        assert_eq!(parse_slot_label("8:00 PM").unwrap(), SlotTime { hour: 20, minute: 0 });
    }

    #[test]
    fn twelve_oclock_edges() {
        assert_eq!(parse_slot_label("12:00 AM").unwrap().hour, 0);
        assert_eq!(parse_slot_label("12:00 PM").unwrap().hour, 12);
        assert_eq!(parse_slot_label("12:45 PM").unwrap().minutes_from_midnight(), 12 * 60 + 45);
    }

    #[test]
    fn period_is_case_insensitive_and_trimmed() {
        assert_eq!(parse_slot_label(" 10:00 am ").unwrap().hour, 10);
        assert_eq!(parse_slot_label("10:00 pm").unwrap().hour, 22);
    }

    #[test]
    fn rejects_malformed_labels() {
        for bad in [
            "", "10:00", "10 AM", "10:0 AM", "13:00 PM", "00:30 AM", "10:60 AM", "10:00 XM",
            "+1:00 AM", "ten:00 AM", "10:00AM",
        ] {
            assert!(
                matches!(parse_slot_label(bad), Err(SlotLabelError::Malformed(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn canonical_display_round_trips() {
        for label in ["09:00 AM", "12:00 PM", "12:00 AM", "08:00 PM"] {
            assert_eq!(parse_slot_label(label).unwrap().to_string(), label);
        }
        assert_eq!(parse_slot_label("9:00 am").unwrap().to_string(), "09:00 AM");
    }

    #[test]
    fn interval_from_label_and_duration() {
        let base = local_midnight_ms(day());
        let span = to_interval(day(), "10:00 AM", 90).unwrap();
        assert_eq!(span.start, base + 10 * H);
        assert_eq!(span.end, base + 11 * H + 30 * MINUTE_MS);
    }

    #[test]
    fn consecutive_days_are_a_day_apart() {
        let next = day().succ_opt().unwrap();
        assert_eq!(local_midnight_ms(next) - local_midnight_ms(day()), 24 * H);
    }

    #[test]
    fn session_past_midnight_ends_next_day() {
        let span = to_interval(day(), "08:00 PM", 720).unwrap();
        let next_midnight = local_midnight_ms(day().succ_opt().unwrap());
        assert_eq!(span.end, next_midnight + 8 * H);
    }

    #[test]
    fn slot_window_is_one_hour() {
        let w = slot_window(day(), "12:00 PM").unwrap();
        assert_eq!(w.duration_ms(), H);
    }

    #[test]
    fn overlap_is_symmetric_and_touching_is_free() {
        let spans = [
            Span::new(0, 10),
            Span::new(5, 15),
            Span::new(10, 20),
            Span::new(0, 30),
            Span::new(25, 26),
        ];
        for a in &spans {
            for b in &spans {
                assert_eq!(overlaps(a, b), overlaps(b, a));
            }
        }
        assert!(!overlaps(&Span::new(0, 10), &Span::new(10, 20)));
        assert!(overlaps(&Span::new(0, 11), &Span::new(10, 20)));
    }
}
