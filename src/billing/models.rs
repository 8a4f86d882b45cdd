use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::iter::Sum;
use std::ops::Add;

/// Decimal gigabyte-to-megabyte conversion. The system of record uses the
/// 1000x convention, not 1024x.
pub const GB_TO_MB: i64 = 1000;

/// Monetary amount held as integer micro-units of the account currency.
///
/// All billing arithmetic happens on the integer representation so summing
/// cycles and multiplying overage never accumulates binary floating-point
/// drift. The wire format stays a plain JSON number for compatibility with
/// existing consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    const MICROS_PER_UNIT: f64 = 1_000_000.0;

    /// Converts a floating-point currency amount, rounding to the nearest
    /// micro-unit. This is the only lossy step and it happens once, at the
    /// boundary where plan terms enter the engine.
    pub fn from_major(amount: f64) -> Self {
        Money((amount * Self::MICROS_PER_UNIT).round() as i64)
    }

    pub fn from_micros(micros: i64) -> Self {
        Money(micros)
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / Self::MICROS_PER_UNIT
    }

    /// Applies this amount as a per-unit rate: `rate x quantity`.
    pub fn times(self, quantity: i64) -> Money {
        Money(self.0 * quantity)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Ok(Money::from_major(amount))
    }
}

/// Read-only plan parameters the engine bills against. Owned by the
/// subscriber directory; callers validate them at plan-creation time, the
/// engine does not re-check.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTerms {
    pub base_price: Money,
    pub included_data_in_mb: i64,
    pub cycle_length_in_days: i64,
    pub excess_charge_per_mb: Money,
}

impl PlanTerms {
    /// Builds terms from raw plan columns, applying the decimal GB->MB
    /// conversion to the free-data allowance.
    pub fn new(
        price: f64,
        data_free_in_gb: f64,
        cycle_length_in_days: i64,
        excess_charge_per_mb: f64,
    ) -> Self {
        PlanTerms {
            base_price: Money::from_major(price),
            included_data_in_mb: (data_free_in_gb * GB_TO_MB as f64).round() as i64,
            cycle_length_in_days,
            excess_charge_per_mb: Money::from_major(excess_charge_per_mb),
        }
    }
}

/// One dated usage observation. Dates are day-normalized by the usage store;
/// the engine treats them as opaque instants inside inclusive cycle bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageObservation {
    pub date: DateTime<Utc>,
    #[serde(rename = "usageInMB")]
    pub usage_in_mb: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingCycle {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub base_price: Money,
    #[serde(rename = "totalUsageInMB")]
    pub total_usage_in_mb: i64,
    #[serde(rename = "includedDataInMB")]
    pub included_data_in_mb: i64,
    #[serde(rename = "excessDataInMB")]
    pub excess_data_in_mb: i64,
    pub excess_cost: Money,
    pub total_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingReport {
    pub phone_number: String,
    pub total_cost: Money,
    pub billing_cycles: Vec<BillingCycle>,
}
