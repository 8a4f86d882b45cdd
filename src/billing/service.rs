use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::directory::{PgDirectory, SubscriberDirectory};
use super::engine::{compute_billing_report, lookback_window};
use super::models::BillingReport;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::SubscriberNotFound(phone) => AppError::SubscriberNotFound(phone),
            BillingError::Source(e) => AppError::Message(e.to_string()),
        }
    }
}

/// key: billing-service -> report orchestration
///
/// Resolves plan terms and windowed usage through the injected directory,
/// surfaces the unknown-subscriber case, then hands the values to the pure
/// engine. The engine itself never sees a missing subscriber.
#[derive(Clone)]
pub struct BillingService {
    directory: Arc<dyn SubscriberDirectory>,
}

impl BillingService {
    pub fn new(directory: Arc<dyn SubscriberDirectory>) -> Self {
        Self { directory }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::new(Arc::new(PgDirectory::new(pool)))
    }

    /// Computes the billing report for a subscriber as of the given instant.
    /// `as_of` is threaded through explicitly — callers snapshot "now" once
    /// per request so a report is internally consistent.
    pub async fn report(
        &self,
        phone_number: &str,
        as_of: DateTime<Utc>,
    ) -> Result<BillingReport, BillingError> {
        let terms = self
            .directory
            .resolve_plan_terms(phone_number)
            .await?
            .ok_or_else(|| BillingError::SubscriberNotFound(phone_number.to_string()))?;

        let (window_start, window_end) = lookback_window(as_of);
        let observations = self
            .directory
            .fetch_usage_in_range(phone_number, window_start, window_end)
            .await?
            .ok_or_else(|| BillingError::SubscriberNotFound(phone_number.to_string()))?;

        Ok(compute_billing_report(
            phone_number,
            &terms,
            &observations,
            as_of,
        ))
    }
}
