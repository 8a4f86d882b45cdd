use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser};
use crate::plans::DataPlan;
use axum::extract::Path;
use axum::{
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Subscriber identifiers are bare digit strings (MSISDN without formatting).
pub fn valid_phone_number(raw: &str) -> bool {
    PHONE_NUMBER.is_match(raw)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberInfo {
    pub id: i32,
    pub phone_number: String,
    pub plan: DataPlan,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriber {
    pub phone_number: String,
    pub plan_id: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriber {
    pub phone_number: Option<String>,
    pub plan_id: Option<i32>,
}

pub fn routes() -> Router {
    Router::new()
        .route(
            "/api/subscribers",
            get(list_subscribers).post(create_subscriber),
        )
        .route(
            "/api/subscribers/:id",
            get(get_subscriber).put(update_subscriber),
        )
        .route(
            "/api/subscribers/phone/:phone_number",
            get(get_subscriber_by_phone),
        )
}

fn subscriber_from_row(row: &sqlx::postgres::PgRow) -> SubscriberInfo {
    SubscriberInfo {
        id: row.get("id"),
        phone_number: row.get("phone_number"),
        plan: DataPlan {
            id: row.get("plan_id"),
            plan_code: row.get("plan_code"),
            provider: row.get("provider"),
            name: row.get("name"),
            data_free_in_gb: row.get("data_free_in_gb"),
            billing_cycle_in_days: row.get("billing_cycle_in_days"),
            price: row.get("price"),
            excess_charge_per_mb: row.get("excess_charge_per_mb"),
        },
    }
}

const SUBSCRIBER_WITH_PLAN: &str = r#"
    SELECT
        s.id, s.phone_number, s.plan_id,
        p.plan_code, p.provider, p.name, p.data_free_in_gb,
        p.billing_cycle_in_days, p.price, p.excess_charge_per_mb
    FROM subscribers s
    JOIN data_plans p ON p.id = s.plan_id
"#;

pub async fn list_subscribers(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
) -> AppResult<Json<Vec<SubscriberInfo>>> {
    let rows = sqlx::query(&format!("{SUBSCRIBER_WITH_PLAN} ORDER BY s.phone_number ASC"))
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error listing subscribers");
            AppError::Db(e)
        })?;
    Ok(Json(rows.iter().map(subscriber_from_row).collect()))
}

pub async fn get_subscriber(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Json<SubscriberInfo>> {
    let row = sqlx::query(&format!("{SUBSCRIBER_WITH_PLAN} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error fetching subscriber");
            AppError::Db(e)
        })?;
    let Some(row) = row else {
        return Err(AppError::NotFound);
    };
    Ok(Json(subscriber_from_row(&row)))
}

pub async fn get_subscriber_by_phone(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Path(phone_number): Path<String>,
) -> AppResult<Json<SubscriberInfo>> {
    if !valid_phone_number(&phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {phone_number}"
        )));
    }
    let row = sqlx::query(&format!("{SUBSCRIBER_WITH_PLAN} WHERE s.phone_number = $1"))
        .bind(&phone_number)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error fetching subscriber");
            AppError::Db(e)
        })?;
    let Some(row) = row else {
        return Err(AppError::SubscriberNotFound(phone_number));
    };
    Ok(Json(subscriber_from_row(&row)))
}

pub async fn create_subscriber(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    Json(payload): Json<NewSubscriber>,
) -> AppResult<(StatusCode, Json<SubscriberInfo>)> {
    if !valid_phone_number(&payload.phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {}",
            payload.phone_number
        )));
    }
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO subscribers (phone_number, plan_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(&payload.phone_number)
    .bind(payload.plan_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.constraint() == Some("subscribers_phone_number_key") {
                return AppError::BadRequest("Subscriber already exists".into());
            }
            if db_err.constraint() == Some("subscribers_plan_id_fkey") {
                return AppError::BadRequest("Unknown plan".into());
            }
        }
        tracing::error!(?e, "DB error creating subscriber");
        AppError::Db(e)
    })?;
    let row = sqlx::query(&format!("{SUBSCRIBER_WITH_PLAN} WHERE s.id = $1"))
        .bind(id)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error fetching created subscriber");
            AppError::Db(e)
        })?;
    Ok((StatusCode::CREATED, Json(subscriber_from_row(&row))))
}

pub async fn update_subscriber(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateSubscriber>,
) -> AppResult<Json<SubscriberInfo>> {
    if let Some(phone) = &payload.phone_number {
        if !valid_phone_number(phone) {
            return Err(AppError::BadRequest(format!(
                "Invalid phone number format: {phone}"
            )));
        }
    }
    let updated = sqlx::query(
        r#"
        UPDATE subscribers SET
            phone_number = COALESCE($2, phone_number),
            plan_id = COALESCE($3, plan_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.phone_number)
    .bind(payload.plan_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error updating subscriber");
        AppError::Db(e)
    })?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    let row = sqlx::query(&format!("{SUBSCRIBER_WITH_PLAN} WHERE s.id = $1"))
        .bind(id)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error fetching updated subscriber");
            AppError::Db(e)
        })?;
    Ok(Json(subscriber_from_row(&row)))
}
