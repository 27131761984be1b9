//! turnero-core: turn dispatch for public-office counters.
//!
//! A citizen is issued a turn for a procedure; operators call, attend and
//! close turns from their counters. All shared state lives in SQLite and
//! every actor holds its own connection.

pub mod admission;
pub mod clock;
pub mod config;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod event;
pub mod expiry;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod priority;
pub mod queue;
pub mod store;
pub mod types;

pub use admission::{IssueRequest, Issued};
pub use engine::DeskEngine;
pub use error::{DeskError, DeskResult};
pub use lifecycle::FinishRequest;
