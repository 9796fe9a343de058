use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Naive local milliseconds since the Unix epoch. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Same start, end pushed out by `minutes` (the cleaning gap).
    pub fn extended_by_minutes(&self, minutes: u32) -> Span {
        Span::new(self.start, self.end + Ms::from(minutes) * MINUTE_MS)
    }
}

/// Which bookable venue a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Spa,
    Cinema,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Spa, ServiceKind::Cinema];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Spa => "spa",
            ServiceKind::Cinema => "cinema",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spa" => Some(ServiceKind::Spa),
            "cinema" => Some(ServiceKind::Cinema),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a booking. Both states block the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Paid,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "paid" | "confirmed" => Some(BookingStatus::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of serialization for writes: one service on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey {
    pub service: ServiceKind,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(service: ServiceKind, date: NaiveDate) -> Self {
        Self { service, date }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.date.format("%Y-%m-%d"))
    }
}

/// Read projection of a reservation: the only two fields blocking depends on.
pub trait Booked {
    fn slot_label(&self) -> &str;
    fn tier_or_package(&self) -> &str;
}

/// A persisted reservation. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Ulid,
    pub service: ServiceKind,
    pub date: NaiveDate,
    pub slot_label: String,
    pub tier_or_package: String,
    pub label: Option<String>,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl BookingRecord {
    pub fn key(&self) -> DayKey {
        DayKey::new(self.service, self.date)
    }
}

impl Booked for BookingRecord {
    fn slot_label(&self) -> &str {
        &self.slot_label
    }

    fn tier_or_package(&self) -> &str {
        &self.tier_or_package
    }
}

/// Minimal slot + tier pair, as read from an external booking store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingProjection {
    pub slot_label: String,
    pub tier_or_package: String,
}

impl BookingProjection {
    pub fn new(slot_label: impl Into<String>, tier_or_package: impl Into<String>) -> Self {
        Self {
            slot_label: slot_label.into(),
            tier_or_package: tier_or_package.into(),
        }
    }
}

impl Booked for BookingProjection {
    fn slot_label(&self) -> &str {
        &self.slot_label
    }

    fn tier_or_package(&self) -> &str {
        &self.tier_or_package
    }
}

/// A slot a customer wants to reserve, shaped like a record before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRequest {
    pub id: Ulid,
    pub service: ServiceKind,
    pub date: NaiveDate,
    pub slot_label: String,
    pub tier_or_package: String,
    pub label: Option<String>,
}

impl CandidateRequest {
    pub fn key(&self) -> DayKey {
        DayKey::new(self.service, self.date)
    }
}

/// Outcome of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Inserted(BookingRecord),
    /// Another booking's blocked window covers the candidate.
    Conflict { conflicting: Ulid },
}

/// How long a candidate session runs, for point availability checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLength {
    Tier(String),
    Minutes(u32),
}

/// The per-day reservation list. All bookings here share one `DayKey`.
#[derive(Debug, Clone)]
pub struct DayState {
    pub key: DayKey,
    pub bookings: Vec<BookingRecord>,
}

impl DayState {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            bookings: Vec::new(),
        }
    }

    pub fn insert(&mut self, record: BookingRecord) {
        self.bookings.push(record);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<BookingRecord> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut BookingRecord> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingReserved {
        id: Ulid,
        service: ServiceKind,
        date: NaiveDate,
        slot_label: String,
        tier_or_package: String,
        label: Option<String>,
        status: BookingStatus,
        created_at: Ms,
    },
    BookingStatusChanged {
        id: Ulid,
        service: ServiceKind,
        date: NaiveDate,
        status: BookingStatus,
    },
    BookingCancelled {
        id: Ulid,
        service: ServiceKind,
        date: NaiveDate,
    },
}

impl Event {
    pub fn key(&self) -> DayKey {
        match self {
            Event::BookingReserved { service, date, .. }
            | Event::BookingStatusChanged { service, date, .. }
            | Event::BookingCancelled { service, date, .. } => DayKey::new(*service, *date),
        }
    }

    pub fn booking_id(&self) -> Ulid {
        match self {
            Event::BookingReserved { id, .. }
            | Event::BookingStatusChanged { id, .. }
            | Event::BookingCancelled { id, .. } => *id,
        }
    }

    pub fn reserved(record: &BookingRecord) -> Self {
        Event::BookingReserved {
            id: record.id,
            service: record.service,
            date: record.date,
            slot_label: record.slot_label.clone(),
            tier_or_package: record.tier_or_package.clone(),
            label: record.label.clone(),
            status: record.status,
            created_at: record.created_at,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One button in the time grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub slot_label: String,
    pub window: Span,
    pub available: bool,
}
