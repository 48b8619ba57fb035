use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::Minute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Day cannot be booked at all: no published hours, shop holiday, or
    /// staff holiday. Carries the reason.
    Closed(&'static str),
    /// A slot in the requested window already carries a live claim. Carries
    /// the first conflicting slot's start minute.
    Conflict(Minute),
    /// A slot in the requested window is blocked by the merchant.
    Blocked(Minute),
    /// Requested start does not sit on the slot lattice.
    Misaligned(Minute),
    /// Window starts before open or its end crosses the close boundary.
    OutsideHours(Minute),
    AlreadyExists(Ulid),
    /// Business days are immutable once published.
    AlreadyPublished(NaiveDate),
    LockNotFound(Ulid),
    LockExpired(Ulid),
    BookingNotFound(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Closed(reason) => write!(f, "day closed: {reason}"),
            EngineError::Conflict(m) => {
                write!(f, "slot no longer available: {}", crate::model::fmt_minute(*m))
            }
            EngineError::Blocked(m) => {
                write!(f, "slot blocked: {}", crate::model::fmt_minute(*m))
            }
            EngineError::Misaligned(m) => {
                write!(f, "start not on slot boundary: {}", crate::model::fmt_minute(*m))
            }
            EngineError::OutsideHours(m) => {
                write!(f, "window outside business hours: {}", crate::model::fmt_minute(*m))
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::AlreadyPublished(date) => {
                write!(f, "business day already published: {date}")
            }
            EngineError::LockNotFound(id) => write!(f, "lock not found: {id}"),
            EngineError::LockExpired(id) => write!(f, "lock expired: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
