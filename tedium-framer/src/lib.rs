//! Bridge between a T1/E1 trunk and a frame-quantized packet transport.
//!
//! The trunk side is clocked one bit at a time by [`bridge::TrunkLoop`], the
//! packet side one poll at a time by [`bridge::TransportLoop`]. The only state
//! the two share is a pair of [`fifo`] page rings.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod fifo;
pub mod report;
pub mod rx;
pub mod timeslot;
pub mod timing;
pub mod tx;

pub use config::{BusTiming, FramerConfig};
pub use error::{Error, Result};
