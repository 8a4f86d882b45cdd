use crate::billing::engine::start_of_day;
use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser};
use crate::subscribers::valid_phone_number;
use axum::extract::{Path, Query};
use axum::{http::StatusCode, routing::get, routing::post, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: i32,
    pub phone_number: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "usageInMB")]
    pub usage_in_mb: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUsage {
    pub phone_number: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "usageInMB")]
    pub usage_in_mb: i64,
}

#[derive(Deserialize)]
pub struct RangeParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn routes() -> Router {
    Router::new()
        .route("/api/usage", post(create_usage))
        .route("/api/usage/:phone_number", get(usage_by_phone))
        .route("/api/usage/:phone_number/range", get(usage_in_range))
}

async fn subscriber_id_for(pool: &PgPool, phone_number: &str) -> AppResult<Option<i32>> {
    let id = sqlx::query_scalar("SELECT id FROM subscribers WHERE phone_number = $1")
        .bind(phone_number)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error resolving subscriber");
            AppError::Db(e)
        })?;
    Ok(id)
}

fn usage_from_row(phone_number: &str, row: &sqlx::postgres::PgRow) -> UsageRecord {
    UsageRecord {
        id: row.get("id"),
        phone_number: phone_number.to_string(),
        date: row.get("date"),
        usage_in_mb: row.get("usage_in_mb"),
    }
}

pub async fn usage_by_phone(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Path(phone_number): Path<String>,
) -> AppResult<Json<Vec<UsageRecord>>> {
    if !valid_phone_number(&phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {phone_number}"
        )));
    }
    // Unknown subscriber is a 404; a known subscriber with no records is [].
    let Some(subscriber_id) = subscriber_id_for(&pool, &phone_number).await? else {
        return Err(AppError::SubscriberNotFound(phone_number));
    };
    let rows = sqlx::query(
        "SELECT id, date, usage_in_mb FROM usage_records WHERE subscriber_id = $1 ORDER BY date ASC",
    )
    .bind(subscriber_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error listing usage");
        AppError::Db(e)
    })?;
    Ok(Json(
        rows.iter().map(|r| usage_from_row(&phone_number, r)).collect(),
    ))
}

pub async fn usage_in_range(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Path(phone_number): Path<String>,
    Query(range): Query<RangeParams>,
) -> AppResult<Json<Vec<UsageRecord>>> {
    if !valid_phone_number(&phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {phone_number}"
        )));
    }
    if range.start > range.end {
        return Err(AppError::BadRequest(
            "Start date must be before or equal to end date".into(),
        ));
    }
    let Some(subscriber_id) = subscriber_id_for(&pool, &phone_number).await? else {
        return Err(AppError::SubscriberNotFound(phone_number));
    };
    let rows = sqlx::query(
        r#"
        SELECT id, date, usage_in_mb FROM usage_records
        WHERE subscriber_id = $1 AND date >= $2 AND date <= $3
        ORDER BY date ASC
        "#,
    )
    .bind(subscriber_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error listing usage in range");
        AppError::Db(e)
    })?;
    Ok(Json(
        rows.iter().map(|r| usage_from_row(&phone_number, r)).collect(),
    ))
}

pub async fn create_usage(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    Json(payload): Json<NewUsage>,
) -> AppResult<(StatusCode, Json<UsageRecord>)> {
    if !valid_phone_number(&payload.phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {}",
            payload.phone_number
        )));
    }
    if payload.usage_in_mb < 0 {
        return Err(AppError::BadRequest(
            "Usage must be a non-negative number".into(),
        ));
    }
    let Some(subscriber_id) = subscriber_id_for(&pool, &payload.phone_number).await? else {
        return Err(AppError::SubscriberNotFound(payload.phone_number));
    };
    // Observations are keyed by calendar day; clamp to midnight on write so
    // range queries behave as day filters.
    let date = start_of_day(payload.date);
    let row = sqlx::query(
        r#"
        INSERT INTO usage_records (subscriber_id, date, usage_in_mb)
        VALUES ($1, $2, $3)
        RETURNING id, date, usage_in_mb
        "#,
    )
    .bind(subscriber_id)
    .bind(date)
    .bind(payload.usage_in_mb)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error recording usage");
        AppError::Db(e)
    })?;
    Ok((
        StatusCode::CREATED,
        Json(usage_from_row(&payload.phone_number, &row)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn observation_dates_clamp_to_midnight() {
        let at = Utc.with_ymd_and_hms(2025, 7, 19, 14, 31, 7).unwrap();
        let normalized = start_of_day(at);
        assert_eq!(normalized, Utc.with_ymd_and_hms(2025, 7, 19, 0, 0, 0).unwrap());
        assert_eq!(start_of_day(normalized), normalized);
    }
}
