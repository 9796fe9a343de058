//! Slot availability and overlap-safe reservations for a venue's spa and
//! cinema rooms, served over the Postgres wire protocol.

pub mod auth;
pub mod catalogue;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod interval;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
