//! Hard caps on caller-controlled sizes.

pub const MAX_LABEL_LEN: usize = 256;
pub const MAX_TIER_LEN: usize = 64;
pub const MAX_SLOT_LABEL_LEN: usize = 16;

/// Far above any real catalogue; bounds the per-day scan on writes.
pub const MAX_BOOKINGS_PER_DAY: usize = 1_000;

/// Widest `fully_booked_dates` range, inclusive of both ends.
pub const MAX_DATE_RANGE_DAYS: i64 = 366;

/// Longest session a `duration = n` availability check may ask about.
pub const MAX_SESSION_MINUTES: u32 = 24 * 60;

pub const MAX_TENANTS: usize = 64;

/// Postgres' own identifier limit.
pub const MAX_TENANT_NAME_LEN: usize = 63;

pub const MAX_SQL_LEN: usize = 16 * 1024;

/// Largest WAL payload. Events are a few hundred bytes; a longer length
/// prefix on replay is treated as corruption.
pub const MAX_WAL_FRAME_LEN: usize = 64 * 1024;
