use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::models::{PlanTerms, UsageObservation};

/// Data-fetch capabilities the billing service depends on: resolving a
/// subscriber's current plan terms and reading their dated usage. Injected
/// by constructor so reports stay reproducible and tests can run against an
/// in-memory directory.
///
/// Both operations return `None` for an unknown subscriber — distinct from
/// `Some(vec![])`, a known subscriber with no recorded usage.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn resolve_plan_terms(&self, phone_number: &str) -> Result<Option<PlanTerms>>;

    async fn fetch_usage_in_range(
        &self,
        phone_number: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Vec<UsageObservation>>>;
}

/// key: billing-directory -> subscribers,data_plans,usage_records
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn subscriber_id(&self, phone_number: &str) -> Result<Option<i32>> {
        let id = sqlx::query_scalar("SELECT id FROM subscribers WHERE phone_number = $1")
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl SubscriberDirectory for PgDirectory {
    async fn resolve_plan_terms(&self, phone_number: &str) -> Result<Option<PlanTerms>> {
        let row = sqlx::query(
            r#"
            SELECT p.price, p.data_free_in_gb, p.billing_cycle_in_days, p.excess_charge_per_mb
            FROM subscribers s
            JOIN data_plans p ON p.id = s.plan_id
            WHERE s.phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cycle_length: i32 = row.get("billing_cycle_in_days");
        Ok(Some(PlanTerms::new(
            row.get("price"),
            row.get("data_free_in_gb"),
            cycle_length as i64,
            row.get("excess_charge_per_mb"),
        )))
    }

    async fn fetch_usage_in_range(
        &self,
        phone_number: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Vec<UsageObservation>>> {
        let Some(subscriber_id) = self.subscriber_id(phone_number).await? else {
            return Ok(None);
        };
        let rows = sqlx::query(
            r#"
            SELECT date, usage_in_mb FROM usage_records
            WHERE subscriber_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date ASC
            "#,
        )
        .bind(subscriber_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        let observations = rows
            .into_iter()
            .map(|row| UsageObservation {
                date: row.get("date"),
                usage_in_mb: row.get("usage_in_mb"),
            })
            .collect();
        Ok(Some(observations))
    }
}
