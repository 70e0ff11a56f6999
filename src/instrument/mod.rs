//! Instrument communication layer.
//!
//! [`transport`] defines the one-query-at-a-time channel abstraction and the
//! VISA-backed implementation, [`mock`] provides an in-process simulated
//! analyzer for tests and offline operation, and [`aq6315`] implements the
//! validated command set and sweep protocol on top of either.

pub mod aq6315;
pub mod mock;
pub mod transport;
