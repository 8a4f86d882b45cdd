pub mod api;
pub mod directory;
pub mod engine;
pub mod models;
pub mod service;

pub use directory::{PgDirectory, SubscriberDirectory};
pub use engine::{compute_billing_report, lookback_window, LOOKBACK_DAYS};
pub use models::{BillingCycle, BillingReport, Money, PlanTerms, UsageObservation};
pub use service::{BillingError, BillingService};
