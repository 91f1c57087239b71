//! Dashboard state for weatherdash: two weather panels and the poller that
//! keeps them fresh.
//!
//! "When to refresh" (the [`poller`]) and "how to refresh" (the render loop in
//! [`dashboard`] plus a fetch service) meet only at a panel's dirty flag.

pub mod dashboard;
mod error_mapping;
pub mod panel;
pub mod poller;
pub mod services;

pub use dashboard::{cities_from_config, Dashboard, Fetchers};
pub use panel::{FetchTicket, PanelKind, PanelSnapshot, PanelState};
pub use poller::{Generation, PollController};
