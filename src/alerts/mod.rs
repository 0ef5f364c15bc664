//! Alerting: state-transition events and the webhook dispatcher.

pub mod dispatcher;
pub mod events;

pub use dispatcher::{AlertDispatcher, AlertSender};
pub use events::{AlertEvent, AlertKind};
