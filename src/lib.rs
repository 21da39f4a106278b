//! Bookings data layer
//!
//! This crate exposes the booking data model, the simulated booking API, the
//! persistent cache and the coordinator that ties them together, for use by
//! the terminal UI and by integration tests.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod coordinator;
pub mod data;
pub mod provider;
pub mod refresh;
