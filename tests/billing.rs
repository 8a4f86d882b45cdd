use chrono::{Duration, TimeZone, Utc};
use dataplan_backend::billing::{BillingError, BillingService, Money};
use sqlx::PgPool;

// key: billing-tests -> postgres directory end to end

async fn seed_plan(pool: &PgPool, code: &str, cycle_days: i32) -> i32 {
    sqlx::query_scalar(
        r#"
        INSERT INTO data_plans (
            plan_code, provider, name, data_free_in_gb,
            billing_cycle_in_days, price, excess_charge_per_mb
        ) VALUES ($1, 'Vodafone', 'Test Plan', 5.0, $2, 50.0, 0.01)
        RETURNING id
        "#,
    )
    .bind(code)
    .bind(cycle_days)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_subscriber(pool: &PgPool, phone: &str, plan_id: i32) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO subscribers (phone_number, plan_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(phone)
    .bind(plan_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn report_over_postgres_sums_windowed_usage(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let plan_id = seed_plan(&pool, "VF-5GB-30D", 30).await;
    let subscriber_id = seed_subscriber(&pool, "61400000001", plan_id).await;

    let as_of = Utc.with_ymd_and_hms(2025, 7, 19, 12, 0, 0).unwrap();
    let in_window = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    let stale = as_of - Duration::days(90);
    for (date, mb) in [(in_window, 5100_i64), (stale, 40_000)] {
        sqlx::query(
            "INSERT INTO usage_records (subscriber_id, date, usage_in_mb) VALUES ($1, $2, $3)",
        )
        .bind(subscriber_id)
        .bind(date)
        .bind(mb)
        .execute(&pool)
        .await
        .unwrap();
    }

    let service = BillingService::postgres(pool.clone());
    let report = service.report("61400000001", as_of).await.unwrap();

    assert_eq!(report.billing_cycles.len(), 1);
    let cycle = &report.billing_cycles[0];
    assert_eq!(
        cycle.total_usage_in_mb, 5100,
        "usage outside the lookback window must be excluded"
    );
    assert_eq!(cycle.excess_data_in_mb, 100);
    assert_eq!(report.total_cost, Money::from_major(51.0));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_subscriber_is_distinct_from_zero_usage(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let plan_id = seed_plan(&pool, "VF-5GB-30D", 30).await;
    seed_subscriber(&pool, "61400000002", plan_id).await;

    let as_of = Utc.with_ymd_and_hms(2025, 7, 19, 12, 0, 0).unwrap();
    let service = BillingService::postgres(pool.clone());

    let report = service.report("61400000002", as_of).await.unwrap();
    assert_eq!(report.billing_cycles.len(), 1);
    assert_eq!(report.billing_cycles[0].total_usage_in_mb, 0);
    assert_eq!(report.total_cost, Money::from_major(50.0));

    let err = service.report("61499999999", as_of).await.unwrap_err();
    assert!(matches!(err, BillingError::SubscriberNotFound(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn quarterly_plan_yields_empty_report_not_an_error(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let plan_id = seed_plan(&pool, "VF-50GB-90D", 90).await;
    seed_subscriber(&pool, "61400000003", plan_id).await;

    let as_of = Utc.with_ymd_and_hms(2025, 7, 19, 12, 0, 0).unwrap();
    let service = BillingService::postgres(pool.clone());
    let report = service.report("61400000003", as_of).await.unwrap();
    assert!(report.billing_cycles.is_empty());
    assert_eq!(report.total_cost, Money::ZERO);
}
