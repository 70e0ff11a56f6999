//! Core library for the osa-daq application.
//!
//! This library contains the instrument session, acquisition coordinator and
//! unit-tagged quantity types used to drive an ANDO AQ6315-series optical
//! spectrum analyzer over a GPIB/VISA link. It is used by the command-line
//! binary and by integration tests running against a simulated instrument.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod instrument;
pub mod quantity;
pub mod spectrum;
pub mod worker;
