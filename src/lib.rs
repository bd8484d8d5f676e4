//! Load generator for the SimpleDb SQL service.
//!
//! Every virtual user repeatedly runs the registered tasks against the target.
//! The bundled scenario ([`scenario::SelectFlightThenAccount`]) issues
//! `GET /sql/test/select/flight` followed by `GET /sql/test/select/account`.
//! Timing and status of each request are collected in [`stats::Stats`].

pub mod client;
pub mod config;
pub mod error;
pub mod runner;
pub mod scenario;
pub mod sig_down;
pub mod stats;
pub mod task;
pub mod telemetry;
pub mod user;
