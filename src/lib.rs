//! Slot availability and reservation engine for appointment booking.
//!
//! Each merchant gets an isolated in-memory engine backed by an append-only
//! WAL. Clients speak the PostgreSQL v3 protocol: a small SQL dialect covers
//! schedule publishing, availability queries, reservation locks, finalization
//! and cancellation, and LISTEN delivers slot-change notifications per
//! staff-day. Time is a 15-minute grid of minutes-of-day; a lock holds its
//! slots for a TTL and expires in place if never finalized.

pub mod engine;
pub mod limits;
pub mod merchant;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
