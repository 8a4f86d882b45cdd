use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser};
use axum::extract::{Path, Query};
use axum::{
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlan {
    pub id: i32,
    pub plan_code: String,
    pub provider: String,
    pub name: String,
    #[serde(rename = "dataFreeInGB")]
    pub data_free_in_gb: f64,
    pub billing_cycle_in_days: i32,
    pub price: f64,
    #[serde(rename = "excessChargePerMB")]
    pub excess_charge_per_mb: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub plan_code: String,
    pub provider: String,
    pub name: String,
    #[serde(rename = "dataFreeInGB")]
    pub data_free_in_gb: f64,
    pub billing_cycle_in_days: i32,
    pub price: f64,
    #[serde(rename = "excessChargePerMB")]
    pub excess_charge_per_mb: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub plan_code: Option<String>,
    pub provider: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "dataFreeInGB")]
    pub data_free_in_gb: Option<f64>,
    pub billing_cycle_in_days: Option<i32>,
    pub price: Option<f64>,
    #[serde(rename = "excessChargePerMB")]
    pub excess_charge_per_mb: Option<f64>,
}

#[derive(Deserialize)]
pub struct PlanFilter {
    pub provider: Option<String>,
}

pub fn routes() -> Router {
    Router::new()
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/:id", put(update_plan))
}

/// Billing preconditions are enforced here, at plan creation time, so the
/// billing engine never sees a zero-length cycle or a negative rate.
fn validate_terms(
    data_free_in_gb: f64,
    billing_cycle_in_days: i32,
    price: f64,
    excess_charge_per_mb: f64,
) -> AppResult<()> {
    if billing_cycle_in_days < 1 {
        return Err(AppError::BadRequest(
            "Billing cycle must be at least one day".into(),
        ));
    }
    if data_free_in_gb < 0.0 || price < 0.0 || excess_charge_per_mb < 0.0 {
        return Err(AppError::BadRequest(
            "Plan amounts must be non-negative".into(),
        ));
    }
    Ok(())
}

// Provider filters are matched in `Capitalized` form regardless of input case.
fn normalize_provider(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => lower,
    }
}

pub async fn list_plans(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Query(filter): Query<PlanFilter>,
) -> AppResult<Json<Vec<DataPlan>>> {
    let plans = match filter.provider {
        Some(provider) => {
            sqlx::query_as::<_, DataPlan>(
                "SELECT * FROM data_plans WHERE provider = $1 ORDER BY plan_code ASC",
            )
            .bind(normalize_provider(&provider))
            .fetch_all(&pool)
            .await
        }
        None => {
            sqlx::query_as::<_, DataPlan>("SELECT * FROM data_plans ORDER BY plan_code ASC")
                .fetch_all(&pool)
                .await
        }
    }
    .map_err(|e| {
        tracing::error!(?e, "DB error listing plans");
        AppError::Db(e)
    })?;
    Ok(Json(plans))
}

pub async fn create_plan(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    Json(payload): Json<NewPlan>,
) -> AppResult<(StatusCode, Json<DataPlan>)> {
    validate_terms(
        payload.data_free_in_gb,
        payload.billing_cycle_in_days,
        payload.price,
        payload.excess_charge_per_mb,
    )?;
    let plan = sqlx::query_as::<_, DataPlan>(
        r#"
        INSERT INTO data_plans (
            plan_code, provider, name, data_free_in_gb,
            billing_cycle_in_days, price, excess_charge_per_mb
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&payload.plan_code)
    .bind(&payload.provider)
    .bind(&payload.name)
    .bind(payload.data_free_in_gb)
    .bind(payload.billing_cycle_in_days)
    .bind(payload.price)
    .bind(payload.excess_charge_per_mb)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.constraint() == Some("data_plans_plan_code_key") {
                return AppError::BadRequest("Plan code already exists".into());
            }
        }
        tracing::error!(?e, "DB error creating plan");
        AppError::Db(e)
    })?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    Extension(pool): Extension<PgPool>,
    AdminUser(_): AdminUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePlan>,
) -> AppResult<Json<DataPlan>> {
    let existing = sqlx::query_as::<_, DataPlan>("SELECT * FROM data_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!(?e, "DB error fetching plan");
            AppError::Db(e)
        })?;
    let Some(existing) = existing else {
        return Err(AppError::NotFound);
    };

    let data_free_in_gb = payload.data_free_in_gb.unwrap_or(existing.data_free_in_gb);
    let billing_cycle_in_days = payload
        .billing_cycle_in_days
        .unwrap_or(existing.billing_cycle_in_days);
    let price = payload.price.unwrap_or(existing.price);
    let excess_charge_per_mb = payload
        .excess_charge_per_mb
        .unwrap_or(existing.excess_charge_per_mb);
    validate_terms(
        data_free_in_gb,
        billing_cycle_in_days,
        price,
        excess_charge_per_mb,
    )?;

    let plan = sqlx::query_as::<_, DataPlan>(
        r#"
        UPDATE data_plans SET
            plan_code = $2,
            provider = $3,
            name = $4,
            data_free_in_gb = $5,
            billing_cycle_in_days = $6,
            price = $7,
            excess_charge_per_mb = $8,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.plan_code.unwrap_or(existing.plan_code))
    .bind(payload.provider.unwrap_or(existing.provider))
    .bind(payload.name.unwrap_or(existing.name))
    .bind(data_free_in_gb)
    .bind(billing_cycle_in_days)
    .bind(price)
    .bind(excess_charge_per_mb)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error updating plan");
        AppError::Db(e)
    })?;
    Ok(Json(plan))
}
