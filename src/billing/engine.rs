use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use super::models::{BillingCycle, BillingReport, Money, PlanTerms, UsageObservation};

/// Billing always evaluates a rolling lookback of this many days ending at
/// the as-of instant, regardless of the plan's cycle length. Cycle starts are
/// anchored to the window start, not the subscriber's enrollment date.
pub const LOOKBACK_DAYS: i64 = 30;

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let midnight: NaiveDateTime = at
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    Utc.from_utc_datetime(&midnight)
}

pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let last_instant: NaiveDateTime = at
        .date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("valid end-of-day time");
    Utc.from_utc_datetime(&last_instant)
}

/// Inclusive bounds of the lookback window for a given as-of instant:
/// `[start_of_day(as_of - 29d), end_of_day(as_of)]`.
pub fn lookback_window(as_of: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let window_end = end_of_day(as_of);
    let window_start = start_of_day(as_of - Duration::days(LOOKBACK_DAYS - 1));
    (window_start, window_end)
}

/// Partitions the lookback window into successive fixed-length billing
/// cycles, aggregates usage per cycle, and prices each cycle including
/// overage.
///
/// Pure and deterministic: `as_of` is an explicit input, never a clock read,
/// so identical inputs always produce identical reports. Observations may
/// arrive unsorted; same-date observations are summed, not deduplicated.
/// Only cycles whose end has already passed `as_of` are emitted — an
/// in-progress cycle is never billed, and a cycle length beyond the lookback
/// window legitimately yields an empty report with a zero total.
pub fn compute_billing_report(
    phone_number: &str,
    terms: &PlanTerms,
    observations: &[UsageObservation],
    as_of: DateTime<Utc>,
) -> BillingReport {
    let (window_start, window_end) = lookback_window(as_of);

    let mut billing_cycles = Vec::new();
    let mut cycle_start = window_start;
    while cycle_start <= window_end {
        let cycle_end = end_of_day(cycle_start + Duration::days(terms.cycle_length_in_days - 1));

        if cycle_end <= window_end {
            let total_usage_in_mb: i64 = observations
                .iter()
                .filter(|obs| obs.date >= cycle_start && obs.date <= cycle_end)
                .map(|obs| obs.usage_in_mb)
                .sum();
            let excess_data_in_mb = (total_usage_in_mb - terms.included_data_in_mb).max(0);
            let excess_cost = terms.excess_charge_per_mb.times(excess_data_in_mb);
            let total_cost = terms.base_price + excess_cost;

            billing_cycles.push(BillingCycle {
                start_date: cycle_start,
                end_date: cycle_end,
                base_price: terms.base_price,
                total_usage_in_mb,
                included_data_in_mb: terms.included_data_in_mb,
                excess_data_in_mb,
                excess_cost,
                total_cost,
            });
        }

        cycle_start = cycle_start + Duration::days(terms.cycle_length_in_days);
    }

    let total_cost: Money = billing_cycles.iter().map(|cycle| cycle.total_cost).sum();

    BillingReport {
        phone_number: phone_number.to_string(),
        total_cost,
        billing_cycles,
    }
}
