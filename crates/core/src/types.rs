use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits carried by pay amounts.
pub const AMOUNT_SCALE: u32 = 2;

const SSN_DIGITS: usize = 9;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern compiles")
});

/// Field-level validation failures, rejected before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("ssn must be exactly {SSN_DIGITS} digits")]
    Ssn,
    #[error("email address is not valid: {0}")]
    Email(String),
    #[error("pay amount must be non-negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("pay period start {start} is after end {end}")]
    PeriodOrder { start: NaiveDate, end: NaiveDate },
    #[error("amount range requires 0 <= min < max, got {min} and {max}")]
    AmountRange { min: Decimal, max: Decimal },
    #[error("percentage must not fall below -100, got {0}")]
    Percent(Decimal),
}

/// An employee loaded from the store, together with its current
/// division/job-title assignment ids when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub ssn: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title_id: Option<i64>,
}

/// Candidate employee fields, validated at construction.
///
/// The ssn and email invariants hold for every value of this type, so the
/// lifecycle service can persist it without re-checking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmployee {
    first_name: String,
    last_name: String,
    ssn: String,
    email: String,
}

impl NewEmployee {
    /// Validates the candidate fields: the ssn must be exactly nine ASCII
    /// digits, the email must match the address pattern.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        ssn: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let ssn = ssn.into();
        if ssn.len() != SSN_DIGITS || !ssn.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::Ssn);
        }
        let email = email.into();
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(ValidationError::Email(email));
        }
        Ok(Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ssn,
            email,
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn ssn(&self) -> &str {
        &self.ssn
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Attaches the generated id and assignment ids once the row is persisted.
    pub fn into_employee(self, employee_id: i64, division_id: i64, job_title_id: i64) -> Employee {
        Employee {
            employee_id,
            first_name: self.first_name,
            last_name: self.last_name,
            ssn: self.ssn,
            email: self.email,
            division_id: Some(division_id),
            job_title_id: Some(job_title_id),
        }
    }
}

/// Reference row: a division an employee can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub division_id: i64,
    pub name: String,
}

/// Reference row: a job title an employee can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTitle {
    pub job_title_id: i64,
    pub title: String,
}

/// A payroll row: the amount paid to an employee over one inclusive pay period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRecord {
    pub payroll_id: i64,
    pub employee_id: i64,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// A payroll row to be inserted, validated at construction.
///
/// The amount is normalized to [`AMOUNT_SCALE`] fractional digits (half-up)
/// and must be non-negative; the period start must not fall after the end.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayroll {
    employee_id: i64,
    amount: Decimal,
    period_start: NaiveDate,
    period_end: NaiveDate,
}

impl NewPayroll {
    pub fn new(
        employee_id: i64,
        amount: Decimal,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount(amount));
        }
        if period_start > period_end {
            return Err(ValidationError::PeriodOrder {
                start: period_start,
                end: period_end,
            });
        }
        Ok(Self {
            employee_id,
            amount: amount
                .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero),
            period_start,
            period_end,
        })
    }

    pub fn employee_id(&self) -> i64 {
        self.employee_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn period_start(&self) -> NaiveDate {
        self.period_start
    }

    pub fn period_end(&self) -> NaiveDate {
        self.period_end
    }
}

/// Direction for ordered pay-history reads; callers must pick one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}
