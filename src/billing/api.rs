use axum::extract::{Extension, Path};
use axum::{routing::get, Json, Router};
use chrono::Utc;
use sqlx::PgPool;

use super::models::BillingReport;
use super::service::BillingService;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::subscribers::valid_phone_number;

pub fn routes() -> Router {
    Router::new().route("/api/billing/:phone_number", get(get_billing_report))
}

/// key: billing-api -> report endpoint
pub async fn get_billing_report(
    Extension(pool): Extension<PgPool>,
    AuthUser { .. }: AuthUser,
    Path(phone_number): Path<String>,
) -> AppResult<Json<BillingReport>> {
    if !valid_phone_number(&phone_number) {
        return Err(AppError::BadRequest(format!(
            "Invalid phone number format: {phone_number}"
        )));
    }
    let service = BillingService::postgres(pool);
    // Snapshot "now" once; the engine never reads a clock.
    let report = service.report(&phone_number, Utc::now()).await?;
    Ok(Json(report))
}
