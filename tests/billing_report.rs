use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dataplan_backend::billing::{
    BillingError, BillingService, Money, PlanTerms, SubscriberDirectory, UsageObservation,
};
use std::sync::{Arc, Mutex};

// key: billing-tests -> service orchestration over an in-memory directory

struct InMemoryDirectory {
    subscriber: Option<(String, PlanTerms)>,
    observations: Vec<UsageObservation>,
    requested_ranges: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl InMemoryDirectory {
    fn with_subscriber(phone: &str, terms: PlanTerms, observations: Vec<UsageObservation>) -> Self {
        Self {
            subscriber: Some((phone.to_string(), terms)),
            observations,
            requested_ranges: Mutex::new(Vec::new()),
        }
    }

    fn empty() -> Self {
        Self {
            subscriber: None,
            observations: Vec::new(),
            requested_ranges: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SubscriberDirectory for InMemoryDirectory {
    async fn resolve_plan_terms(&self, phone_number: &str) -> Result<Option<PlanTerms>> {
        Ok(self
            .subscriber
            .as_ref()
            .filter(|(phone, _)| phone == phone_number)
            .map(|(_, terms)| terms.clone()))
    }

    async fn fetch_usage_in_range(
        &self,
        phone_number: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Vec<UsageObservation>>> {
        self.requested_ranges.lock().unwrap().push((start, end));
        match &self.subscriber {
            Some((phone, _)) if phone == phone_number => Ok(Some(
                self.observations
                    .iter()
                    .filter(|obs| obs.date >= start && obs.date <= end)
                    .cloned()
                    .collect(),
            )),
            _ => Ok(None),
        }
    }
}

const PHONE: &str = "61412345678";

fn plan() -> PlanTerms {
    PlanTerms::new(50.0, 5.0, 30, 0.01)
}

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 19, 12, 0, 0).unwrap()
}

fn obs(y: i32, m: u32, d: u32, mb: i64) -> UsageObservation {
    UsageObservation {
        date: Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
        usage_in_mb: mb,
    }
}

#[tokio::test]
async fn unknown_subscriber_surfaces_not_found_before_the_engine_runs() {
    let service = BillingService::new(Arc::new(InMemoryDirectory::empty()));
    let err = service.report(PHONE, as_of()).await.unwrap_err();
    assert!(matches!(err, BillingError::SubscriberNotFound(ref p) if p == PHONE));
}

#[tokio::test]
async fn known_subscriber_with_no_usage_is_billed_base_price() {
    let directory = InMemoryDirectory::with_subscriber(PHONE, plan(), vec![]);
    let service = BillingService::new(Arc::new(directory));
    let report = service.report(PHONE, as_of()).await.unwrap();
    assert_eq!(report.phone_number, PHONE);
    assert_eq!(report.billing_cycles.len(), 1);
    assert_eq!(report.total_cost, Money::from_major(50.0));
}

#[tokio::test]
async fn usage_is_fetched_for_the_thirty_day_lookback_window() {
    let directory = Arc::new(InMemoryDirectory::with_subscriber(PHONE, plan(), vec![]));
    let service = BillingService::new(directory.clone());
    service.report(PHONE, as_of()).await.unwrap();

    let ranges = directory.requested_ranges.lock().unwrap();
    assert_eq!(ranges.len(), 1);
    let (start, end) = ranges[0];
    assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap());
    assert_eq!(end.date_naive(), as_of().date_naive());
    assert!(end > as_of(), "window end must cover the whole as-of day");
}

#[tokio::test]
async fn overage_report_prices_excess_linearly() {
    let directory =
        InMemoryDirectory::with_subscriber(PHONE, plan(), vec![obs(2025, 7, 1, 5100)]);
    let service = BillingService::new(Arc::new(directory));
    let report = service.report(PHONE, as_of()).await.unwrap();
    let cycle = &report.billing_cycles[0];
    assert_eq!(cycle.total_usage_in_mb, 5100);
    assert_eq!(cycle.excess_data_in_mb, 100);
    assert_eq!(cycle.excess_cost, Money::from_major(1.0));
    assert_eq!(report.total_cost, Money::from_major(51.0));
}

#[tokio::test]
async fn prior_complete_cycle_billed_in_progress_cycle_excluded() {
    // Weekly plan: one observation in an already-closed cycle, one on the
    // as-of day inside the in-progress cycle.
    let weekly = PlanTerms::new(10.0, 1.0, 7, 0.01);
    let directory = InMemoryDirectory::with_subscriber(
        PHONE,
        weekly,
        vec![obs(2025, 6, 21, 700), obs(2025, 7, 19, 9999)],
    );
    let service = BillingService::new(Arc::new(directory));
    let report = service.report(PHONE, as_of()).await.unwrap();

    let billed_usage: i64 = report
        .billing_cycles
        .iter()
        .map(|c| c.total_usage_in_mb)
        .sum();
    assert_eq!(billed_usage, 700, "in-progress usage must not be billed");
    assert_eq!(report.billing_cycles.len(), 4);
}

#[tokio::test]
async fn identical_inputs_produce_identical_reports() {
    let directory =
        InMemoryDirectory::with_subscriber(PHONE, plan(), vec![obs(2025, 7, 2, 4900)]);
    let service = BillingService::new(Arc::new(directory));
    let first = service.report(PHONE, as_of()).await.unwrap();
    let second = service.report(PHONE, as_of()).await.unwrap();
    assert_eq!(first, second);
}
