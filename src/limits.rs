//! Hard caps on client-suppliable dimensions. Every limit here is enforced
//! before a WAL append so a misbehaving client cannot grow state or the log
//! without bound.

/// Distinct merchants a single process will host.
pub const MAX_MERCHANTS: usize = 1024;

/// Merchant names come from the connection's `database` field.
pub const MAX_MERCHANT_NAME_LEN: usize = 64;

/// Staff-day entries per merchant (staff count × configured days).
pub const MAX_DAYS_PER_MERCHANT: usize = 50_000;

/// Published business days per merchant.
pub const MAX_BUSINESS_DAYS: usize = 4_000;

/// Checkout session identifiers are opaque client strings.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Holiday reasons are display strings.
pub const MAX_REASON_LEN: usize = 256;

/// Service tags carried on a booking.
pub const MAX_SERVICE_IDS: usize = 16;
pub const MAX_SERVICE_ID_LEN: usize = 64;

/// Longest bookable appointment, in minutes.
pub const MAX_DURATION_MIN: i32 = 480;

/// Slot granularity must divide an hour evenly and stay in this range.
pub const MIN_GRANULARITY_MIN: i32 = 5;
pub const MAX_GRANULARITY_MIN: i32 = 60;

/// Calendar dates outside this window are rejected as typos.
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2099;
