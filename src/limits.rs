use crate::model::Ms;

// ── Per-venue caps ───────────────────────────────────────────────

pub const MAX_BOOKINGS_PER_VENUE: usize = 100_000;
pub const MAX_EMPLOYEES_PER_VENUE: usize = 10_000;
pub const MAX_SHIFTS_PER_VENUE: usize = 100_000;

// ── Field sizes ──────────────────────────────────────────────────

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_LEN: usize = 320;
pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_PARTY_SIZE: u32 = 10_000;

// ── Time ─────────────────────────────────────────────────────────

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// 31 days.
pub const MAX_SPAN_DURATION_MS: Ms = 31 * 24 * 3_600_000;

// ── Venues ───────────────────────────────────────────────────────

pub const MAX_VENUES: usize = 1024;
pub const MAX_VENUE_NAME_LEN: usize = 128;
