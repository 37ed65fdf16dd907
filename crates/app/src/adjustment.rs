use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use staffdb_core::adjustment::{apply_raise, next_period, raise_factor, AdjustmentPolicy, AmountRange};
use staffdb_core::types::{NewPayroll, PayrollRecord, ValidationError};
use staffdb_storage::{Database, PayrollError};

/// Service applying a percentage raise to every payroll row whose amount
/// falls inside an inclusive range, under the configured policy.
#[derive(Clone)]
pub struct AdjustmentService {
    database: Database,
    policy: AdjustmentPolicy,
}

impl AdjustmentService {
    pub fn new(database: Database, policy: AdjustmentPolicy) -> Self {
        Self { database, policy }
    }

    pub fn policy(&self) -> AdjustmentPolicy {
        self.policy
    }

    /// Raises all payroll amounts in `[min, max]` by `percent` (3.2 means
    /// +3.2%). Requires `0 <= min < max` and `percent >= -100`.
    ///
    /// Under [`AdjustmentPolicy::InPlace`] matching rows are overwritten and
    /// the count of touched rows is returned. Under
    /// [`AdjustmentPolicy::NewPeriod`] one forward-dated row is appended per
    /// affected employee, derived from that employee's latest in-range row,
    /// and the count of created rows is returned.
    pub async fn increase_in_range(
        &self,
        min: Decimal,
        max: Decimal,
        percent: Decimal,
    ) -> Result<u64, AdjustmentError> {
        let range = AmountRange::new(min, max)?;
        let factor = raise_factor(percent)?;
        match self.policy {
            AdjustmentPolicy::InPlace => self.raise_in_place(&range, factor).await,
            AdjustmentPolicy::NewPeriod => self.append_new_periods(&range, factor).await,
        }
    }

    /// Overwrites each in-range amount with `amount * factor`. The prior
    /// amount is lost; arithmetic stays in [`Decimal`] so no row ever passes
    /// through floating point.
    async fn raise_in_place(
        &self,
        range: &AmountRange,
        factor: Decimal,
    ) -> Result<u64, AdjustmentError> {
        let rows = self.database.payroll().list_in_range(range).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let payroll = self.database.payroll();
        let mut tx = self.database.begin().await?;
        let mut touched = 0u64;
        for row in &rows {
            payroll
                .update_amount(&mut tx, row.payroll_id, apply_raise(row.amount, factor))
                .await?;
            touched += 1;
        }
        tx.commit().await?;

        info!(touched, policy = self.policy.as_str(), "salary raise applied");
        Ok(touched)
    }

    /// Appends one forward-dated payroll row per employee with an in-range
    /// row: the new period starts the day after the employee's latest
    /// in-range period ends and spans the same inclusive day count.
    async fn append_new_periods(
        &self,
        range: &AmountRange,
        factor: Decimal,
    ) -> Result<u64, AdjustmentError> {
        let rows = self.database.payroll().list_in_range(range).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut latest: BTreeMap<i64, &PayrollRecord> = BTreeMap::new();
        for row in &rows {
            match latest.get(&row.employee_id) {
                Some(existing) if row.period_start <= existing.period_start => {}
                _ => {
                    latest.insert(row.employee_id, row);
                }
            }
        }

        let payroll = self.database.payroll();
        let mut tx = self.database.begin().await?;
        let mut created = 0u64;
        for row in latest.values() {
            let (start, end) = next_period(row.period_start, row.period_end);
            let record =
                NewPayroll::new(row.employee_id, apply_raise(row.amount, factor), start, end)?;
            payroll.insert(&mut tx, &record).await?;
            created += 1;
        }
        tx.commit().await?;

        info!(created, policy = self.policy.as_str(), "salary raise applied");
        Ok(created)
    }
}

/// Errors surfaced by the payroll adjustment operation.
#[derive(Debug, Error)]
pub enum AdjustmentError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("payroll storage error: {0}")]
    Payroll(#[from] PayrollError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
