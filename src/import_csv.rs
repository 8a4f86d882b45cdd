use crate::billing::engine::start_of_day;
use crate::error::{AppError, AppResult};
use crate::extractor::AdminUser;
use crate::subscribers::valid_phone_number;
use axum::extract::{Extension, Multipart};
use axum::{routing::post, Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;

pub fn routes() -> Router {
    Router::new().route("/api/import", post(import_csv))
}

/// Raw CSV columns: `phone_number,plan_id,date,usage_in_mb`, with `date` as
/// epoch milliseconds.
#[derive(Debug, Deserialize)]
pub struct CsvRow {
    pub phone_number: String,
    pub plan_id: String,
    pub date: String,
    pub usage_in_mb: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ValidRow {
    pub phone_number: String,
    pub plan_code: String,
    pub date: DateTime<Utc>,
    pub usage_in_mb: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RowError {
    InvalidPhoneNumber,
    InvalidDate,
    InvalidUsage,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidCounts {
    pub invalid_phone_number: u32,
    pub invalid_plan_id: u32,
    pub invalid_date: u32,
    pub invalid_usage: u32,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCounts {
    pub duplicates: u32,
    pub invalid: InvalidCounts,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_processed: u32,
    pub imported: u32,
    pub skipped: SkippedCounts,
    pub new_subscribers: u32,
}

/// Field-level validation mirrors the manual usage endpoint: digits-only
/// phone, non-negative integer usage, integer epoch-millisecond date. Plan
/// existence is checked against the database in `apply_row`.
pub fn validate_row(row: &CsvRow) -> Result<ValidRow, RowError> {
    if !valid_phone_number(&row.phone_number) {
        return Err(RowError::InvalidPhoneNumber);
    }
    let usage_in_mb: i64 = row
        .usage_in_mb
        .trim()
        .parse()
        .map_err(|_| RowError::InvalidUsage)?;
    if usage_in_mb < 0 {
        return Err(RowError::InvalidUsage);
    }
    let millis: i64 = row.date.trim().parse().map_err(|_| RowError::InvalidDate)?;
    let date = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or(RowError::InvalidDate)?;
    Ok(ValidRow {
        phone_number: row.phone_number.clone(),
        plan_code: row.plan_id.clone(),
        date: start_of_day(date),
        usage_in_mb,
    })
}

/// Applies one validated row inside its own transaction: resolve the plan,
/// find-or-create the subscriber (reassigning the plan on mismatch), and
/// insert the usage record unless one already exists for that day.
pub async fn apply_row(pool: &PgPool, row: ValidRow, summary: &mut ImportSummary) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let plan_id: Option<i32> = sqlx::query_scalar("SELECT id FROM data_plans WHERE plan_code = $1")
        .bind(&row.plan_code)
        .fetch_optional(&mut tx)
        .await?;
    let Some(plan_id) = plan_id else {
        summary.skipped.invalid.invalid_plan_id += 1;
        return Ok(());
    };

    let subscriber =
        sqlx::query("SELECT id, plan_id FROM subscribers WHERE phone_number = $1")
            .bind(&row.phone_number)
            .fetch_optional(&mut tx)
            .await?;
    let subscriber_id: i32 = match subscriber {
        Some(existing) => {
            let id: i32 = existing.get("id");
            let current_plan: i32 = existing.get("plan_id");
            if current_plan != plan_id {
                sqlx::query("UPDATE subscribers SET plan_id = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(plan_id)
                    .execute(&mut tx)
                    .await?;
            }
            id
        }
        None => {
            let id: i32 = sqlx::query_scalar(
                "INSERT INTO subscribers (phone_number, plan_id) VALUES ($1, $2) RETURNING id",
            )
            .bind(&row.phone_number)
            .bind(plan_id)
            .fetch_one(&mut tx)
            .await?;
            summary.new_subscribers += 1;
            id
        }
    };

    let existing_usage: Option<i32> = sqlx::query_scalar(
        "SELECT id FROM usage_records WHERE subscriber_id = $1 AND date = $2",
    )
    .bind(subscriber_id)
    .bind(row.date)
    .fetch_optional(&mut tx)
    .await?;
    if existing_usage.is_some() {
        summary.skipped.duplicates += 1;
        tx.commit().await?;
        return Ok(());
    }

    sqlx::query("INSERT INTO usage_records (subscriber_id, date, usage_in_mb) VALUES ($1, $2, $3)")
        .bind(subscriber_id)
        .bind(row.date)
        .bind(row.usage_in_mb)
        .execute(&mut tx)
        .await?;
    summary.imported += 1;

    tx.commit().await?;
    Ok(())
}

pub async fn import_csv(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    mut multipart: Multipart,
) -> AppResult<Json<ImportSummary>> {
    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    else {
        return Err(AppError::BadRequest("No file provided".into()));
    };
    let data = field.bytes().await.map_err(|e| {
        error!(?e, "Failed reading upload field");
        AppError::BadRequest("Read error".into())
    })?;

    let mut summary = ImportSummary::default();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_ref());

    for record in reader.deserialize::<CsvRow>() {
        summary.total_processed += 1;
        let Ok(row) = record else {
            // Rows that do not even parse to the expected columns carry no
            // usable subscriber identity.
            summary.skipped.invalid.invalid_phone_number += 1;
            continue;
        };
        match validate_row(&row) {
            Ok(valid) => apply_row(&pool, valid, &mut summary).await?,
            Err(RowError::InvalidPhoneNumber) => {
                summary.skipped.invalid.invalid_phone_number += 1
            }
            Err(RowError::InvalidDate) => summary.skipped.invalid.invalid_date += 1,
            Err(RowError::InvalidUsage) => summary.skipped.invalid.invalid_usage += 1,
        }
    }

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(phone: &str, plan: &str, date: &str, usage: &str) -> CsvRow {
        CsvRow {
            phone_number: phone.into(),
            plan_id: plan.into(),
            date: date.into(),
            usage_in_mb: usage.into(),
        }
    }

    #[test]
    fn valid_row_normalizes_date_to_midnight() {
        // 2025-07-19T14:31:07Z in epoch millis.
        let valid = validate_row(&row("61412345678", "PLAN_A", "1752935467000", "512")).unwrap();
        assert_eq!(valid.date, Utc.with_ymd_and_hms(2025, 7, 19, 0, 0, 0).unwrap());
        assert_eq!(valid.usage_in_mb, 512);
        assert_eq!(valid.plan_code, "PLAN_A");
    }

    #[test]
    fn bad_phone_number_rejected() {
        assert_eq!(
            validate_row(&row("+614", "P", "0", "1")),
            Err(RowError::InvalidPhoneNumber)
        );
    }

    #[test]
    fn negative_or_non_numeric_usage_rejected() {
        assert_eq!(
            validate_row(&row("614", "P", "0", "-5")),
            Err(RowError::InvalidUsage)
        );
        assert_eq!(
            validate_row(&row("614", "P", "0", "lots")),
            Err(RowError::InvalidUsage)
        );
    }

    #[test]
    fn non_numeric_date_rejected() {
        assert_eq!(
            validate_row(&row("614", "P", "2025-07-19", "1")),
            Err(RowError::InvalidDate)
        );
    }

    #[test]
    fn summary_serializes_with_wire_field_names() {
        let summary = ImportSummary {
            total_processed: 3,
            imported: 1,
            skipped: SkippedCounts {
                duplicates: 1,
                invalid: InvalidCounts {
                    invalid_phone_number: 1,
                    ..Default::default()
                },
            },
            new_subscribers: 1,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalProcessed"], 3);
        assert_eq!(json["skipped"]["duplicates"], 1);
        assert_eq!(json["skipped"]["invalid"]["invalidPhoneNumber"], 1);
        assert_eq!(json["newSubscribers"], 1);
    }
}
