pub mod api;
pub mod models;
pub mod reconciliation;
pub mod service;

pub use models::{Plan, PortalUser, Transaction};
pub use reconciliation::{process_callback, CallbackOutcome};
pub use service::BillingService;
