//! Generation orchestration core for a chat-based image-generation service.
//!
//! Five cooperating pieces, matching the component breakdown this crate is
//! built against: [`gateway`] (submission admission), [`poller`] (long-lived
//! per-request status polling), [`ledger`] (append-only credit accounting),
//! [`broadcast`] (admin fan-out messaging), and [`provider_gate`] /
//! [`reaper`] (upstream health gating and abandoned-job cleanup). [`models`]
//! holds the shared data types and [`store`] the SQLite persistence layer
//! underneath all of them.

pub mod broadcast;
pub mod cache;
pub mod chat;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod money;
pub mod poller;
pub mod pricing;
pub mod provider;
pub mod provider_gate;
pub mod reaper;
pub mod store;

pub use error::CoreError;
pub use money::Credits;
