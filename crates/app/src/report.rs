use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use staffdb_core::types::{Employee, PayrollRecord, SortOrder};
use staffdb_storage::{Database, EmployeeError, PayrollError};

/// Read-only reporting over employees, assignments and payroll history.
#[derive(Clone)]
pub struct ReportService {
    database: Database,
}

/// An employee together with its current division/job-title names and the
/// full payroll history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeWithHistory {
    pub employee: Employee,
    pub division: Option<String>,
    pub job_title: Option<String>,
    pub records: Vec<PayrollRecord>,
}

impl ReportService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// All payroll rows for an employee, ordered by period start in the
    /// requested direction.
    pub async fn pay_history(
        &self,
        employee_id: i64,
        order: SortOrder,
    ) -> Result<Vec<PayrollRecord>, ReportError> {
        Ok(self
            .database
            .payroll()
            .list_for_employee(employee_id, order)
            .await?)
    }

    /// Loads an employee with its assignment names and ascending pay history.
    /// Returns `None` when no employee with that id exists.
    pub async fn employee_with_history(
        &self,
        employee_id: i64,
    ) -> Result<Option<EmployeeWithHistory>, ReportError> {
        let Some(employee) = self.database.employees().find_by_id(employee_id).await? else {
            return Ok(None);
        };

        let division = match employee.division_id {
            Some(id) => self
                .database
                .divisions()
                .find_by_id(id)
                .await?
                .map(|d| d.name),
            None => None,
        };
        let job_title = match employee.job_title_id {
            Some(id) => self
                .database
                .job_titles()
                .find_by_id(id)
                .await?
                .map(|t| t.title),
            None => None,
        };
        let records = self
            .database
            .payroll()
            .list_for_employee(employee_id, SortOrder::Ascending)
            .await?;

        Ok(Some(EmployeeWithHistory {
            employee,
            division,
            job_title,
            records,
        }))
    }

    /// Sums pay per division for payroll rows whose period end falls in the
    /// given month, grouped by each employee's *current* division at call
    /// time. Employees with no current division are silently excluded.
    pub async fn total_pay_by_division(
        &self,
        year: i32,
        month: u32,
    ) -> Result<BTreeMap<String, Decimal>, ReportError> {
        let (first, last) = month_bounds(year, month)?;
        let totals = self
            .database
            .payroll()
            .totals_by_division(first, last)
            .await?;
        Ok(totals.into_iter().map(|t| (t.name, t.total)).collect())
    }

    /// Sums pay per job title for payroll rows whose period end falls in the
    /// given month, grouped by each employee's *current* job title.
    pub async fn total_pay_by_job_title(
        &self,
        year: i32,
        month: u32,
    ) -> Result<BTreeMap<String, Decimal>, ReportError> {
        let (first, last) = month_bounds(year, month)?;
        let totals = self
            .database
            .payroll()
            .totals_by_job_title(first, last)
            .await?;
        Ok(totals.into_iter().map(|t| (t.name, t.total)).collect())
    }
}

/// First and last day of the given month.
fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), ReportError> {
    let first =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(ReportError::InvalidPeriod { year, month })?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(ReportError::InvalidPeriod { year, month })?;
    Ok((first, next_month - Duration::days(1)))
}

/// Errors surfaced by the reporting operations.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{year}-{month} is not a valid reporting month")]
    InvalidPeriod { year: i32, month: u32 },
    #[error("payroll storage error: {0}")]
    Payroll(#[from] PayrollError),
    #[error("employee storage error: {0}")]
    Employee(#[from] EmployeeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
