use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;
use tracing::warn;

use staffdb_core::adjustment::AmountRange;
use staffdb_core::types::{
    Division, Employee, JobTitle, NewEmployee, NewPayroll, PayrollRecord, SortOrder,
};

/// SQLite extended error code for a UNIQUE constraint violation.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Bounded connection-establishment retry policy: up to `max_attempts`
/// tries with a linear `attempt * backoff` delay between them.
#[derive(Debug, Clone)]
pub struct ConnectRetry {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes the SQLite connection pool, retrying connection failures
    /// under the provided bounded policy.
    pub async fn connect(database_url: &str, retry: &ConnectRetry) -> Result<Self, StorageError> {
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match SqlitePoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    apply_pragmas(&pool).await?;
                    return Ok(Self { pool });
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, max_attempts = attempts, error = %err, "database connection failed, retrying");
                    tokio::time::sleep(retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(StorageError::Connect {
                        attempts,
                        source: err,
                    })
                }
            }
        }
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Begins a transaction covering a multi-statement write. Dropping the
    /// transaction without committing rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Returns a handle for the employees table.
    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the division reference table.
    pub fn divisions(&self) -> DivisionRepository {
        DivisionRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the job-title reference table.
    pub fn job_titles(&self) -> JobTitleRepository {
        JobTitleRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the employee -> division association table.
    pub fn division_assignments(&self) -> DivisionAssignmentRepository {
        DivisionAssignmentRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the employee -> job-title association table.
    pub fn title_assignments(&self) -> TitleAssignmentRepository {
        TitleAssignmentRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the payroll table.
    pub fn payroll(&self) -> PayrollRepository {
        PayrollRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite after {attempts} attempts: {source}")]
    Connect { attempts: u32, source: sqlx::Error },
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for the employees table.
#[derive(Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

const EMPLOYEE_SELECT: &str = "e.employee_id, e.first_name, e.last_name, e.ssn, e.email, \
     ed.division_id, ej.job_title_id \
     FROM employees AS e \
     LEFT JOIN employee_division AS ed ON ed.employee_id = e.employee_id \
     LEFT JOIN employee_job_titles AS ej ON ej.employee_id = e.employee_id";

impl EmployeeRepository {
    /// Inserts the employee row and returns its generated id. A ssn that
    /// already exists surfaces as [`EmployeeError::DuplicateSsn`].
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        employee: &NewEmployee,
    ) -> Result<i64, EmployeeError> {
        let row = sqlx::query(
            "INSERT INTO employees (first_name, last_name, ssn, email) \
             VALUES (?, ?, ?, ?) \
             RETURNING employee_id",
        )
        .bind(employee.first_name())
        .bind(employee.last_name())
        .bind(employee.ssn())
        .bind(employee.email())
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
            {
                EmployeeError::DuplicateSsn
            }
            other => EmployeeError::Database(other),
        })?;

        Ok(row.get("employee_id"))
    }

    /// Updates the scalar fields of an existing employee, returning whether a
    /// row was affected. Association rows are untouched.
    pub async fn update_scalars(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        employee_id: i64,
        fields: &NewEmployee,
    ) -> Result<bool, EmployeeError> {
        let result = sqlx::query(
            "UPDATE employees \
             SET first_name = ?, last_name = ?, ssn = ?, email = ? \
             WHERE employee_id = ?",
        )
        .bind(fields.first_name())
        .bind(fields.last_name())
        .bind(fields.ssn())
        .bind(fields.email())
        .bind(employee_id)
        .execute(&mut **tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
            {
                EmployeeError::DuplicateSsn
            }
            other => EmployeeError::Database(other),
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the employee row only. Association and payroll rows survive;
    /// cleaning them up is the caller's responsibility.
    pub async fn delete(&self, employee_id: i64) -> Result<bool, EmployeeError> {
        let result = sqlx::query("DELETE FROM employees WHERE employee_id = ?")
            .bind(employee_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(&self, employee_id: i64) -> Result<Option<Employee>, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_SELECT} WHERE e.employee_id = ?"
        ))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EmployeeRow::into_domain))
    }

    pub async fn find_by_ssn(&self, ssn: &str) -> Result<Option<Employee>, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_SELECT} WHERE e.ssn = ?"
        ))
        .bind(ssn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EmployeeRow::into_domain))
    }

    /// Substring search against first or last name, ordered by last name then
    /// first name. `%`, `_` and `\` in the fragment are escaped so they match
    /// literally instead of acting as LIKE wildcards.
    pub async fn search_by_name(&self, fragment: &str) -> Result<Vec<Employee>, EmployeeError> {
        let like = format!("%{}%", escape_like(fragment));
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_SELECT} \
             WHERE e.first_name LIKE ? ESCAPE '\\' OR e.last_name LIKE ? ESCAPE '\\' \
             ORDER BY e.last_name, e.first_name"
        ))
        .bind(&like)
        .bind(&like)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EmployeeRow::into_domain).collect())
    }
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Errors from the employees repository.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error("an employee with the same ssn already exists")]
    DuplicateSsn,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for EmployeeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    employee_id: i64,
    first_name: String,
    last_name: String,
    ssn: String,
    email: String,
    division_id: Option<i64>,
    job_title_id: Option<i64>,
}

impl EmployeeRow {
    fn into_domain(self) -> Employee {
        Employee {
            employee_id: self.employee_id,
            first_name: self.first_name,
            last_name: self.last_name,
            ssn: self.ssn,
            email: self.email,
            division_id: self.division_id,
            job_title_id: self.job_title_id,
        }
    }
}

/// Repository for the division reference table.
#[derive(Clone)]
pub struct DivisionRepository {
    pool: SqlitePool,
}

impl DivisionRepository {
    pub async fn insert(&self, name: &str) -> Result<Division, sqlx::Error> {
        let row = sqlx::query("INSERT INTO division (name) VALUES (?) RETURNING division_id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(Division {
            division_id: row.get("division_id"),
            name: name.to_string(),
        })
    }

    pub async fn find_by_id(&self, division_id: i64) -> Result<Option<Division>, sqlx::Error> {
        let row = sqlx::query_as::<_, DivisionRow>(
            "SELECT division_id, name FROM division WHERE division_id = ?",
        )
        .bind(division_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Division {
            division_id: r.division_id,
            name: r.name,
        }))
    }

    pub async fn list_all(&self) -> Result<Vec<Division>, sqlx::Error> {
        let rows = sqlx::query_as::<_, DivisionRow>(
            "SELECT division_id, name FROM division ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Division {
                division_id: r.division_id,
                name: r.name,
            })
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DivisionRow {
    division_id: i64,
    name: String,
}

/// Repository for the job-title reference table.
#[derive(Clone)]
pub struct JobTitleRepository {
    pool: SqlitePool,
}

impl JobTitleRepository {
    pub async fn insert(&self, title: &str) -> Result<JobTitle, sqlx::Error> {
        let row = sqlx::query("INSERT INTO job_titles (title) VALUES (?) RETURNING job_title_id")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(JobTitle {
            job_title_id: row.get("job_title_id"),
            title: title.to_string(),
        })
    }

    pub async fn find_by_id(&self, job_title_id: i64) -> Result<Option<JobTitle>, sqlx::Error> {
        let row = sqlx::query_as::<_, JobTitleRow>(
            "SELECT job_title_id, title FROM job_titles WHERE job_title_id = ?",
        )
        .bind(job_title_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| JobTitle {
            job_title_id: r.job_title_id,
            title: r.title,
        }))
    }

    pub async fn list_all(&self) -> Result<Vec<JobTitle>, sqlx::Error> {
        let rows = sqlx::query_as::<_, JobTitleRow>(
            "SELECT job_title_id, title FROM job_titles ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| JobTitle {
                job_title_id: r.job_title_id,
                title: r.title,
            })
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobTitleRow {
    job_title_id: i64,
    title: String,
}

/// Repository for the employee -> division association table. The UNIQUE
/// constraint on employee_id makes the upsert a true "replace current".
#[derive(Clone)]
pub struct DivisionAssignmentRepository {
    pool: SqlitePool,
}

impl DivisionAssignmentRepository {
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        employee_id: i64,
        division_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO employee_division (employee_id, division_id) VALUES (?, ?) \
             ON CONFLICT(employee_id) DO UPDATE SET division_id = excluded.division_id",
        )
        .bind(employee_id)
        .bind(division_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_for_employee(&self, employee_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row =
            sqlx::query("SELECT division_id FROM employee_division WHERE employee_id = ?")
                .bind(employee_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.get("division_id")))
    }
}

/// Repository for the employee -> job-title association table.
#[derive(Clone)]
pub struct TitleAssignmentRepository {
    pool: SqlitePool,
}

impl TitleAssignmentRepository {
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        employee_id: i64,
        job_title_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO employee_job_titles (employee_id, job_title_id) VALUES (?, ?) \
             ON CONFLICT(employee_id) DO UPDATE SET job_title_id = excluded.job_title_id",
        )
        .bind(employee_id)
        .bind(job_title_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_for_employee(&self, employee_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row =
            sqlx::query("SELECT job_title_id FROM employee_job_titles WHERE employee_id = ?")
                .bind(employee_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.get("job_title_id")))
    }
}

/// Repository for the payroll table. Amounts cross this boundary as
/// [`Decimal`] and are stored as integer cents, so range scans and SQL
/// aggregation never pass through floating point.
#[derive(Clone)]
pub struct PayrollRepository {
    pool: SqlitePool,
}

impl PayrollRepository {
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record: &NewPayroll,
    ) -> Result<i64, PayrollError> {
        let cents = amount_to_cents(record.amount())?;
        let row = sqlx::query(
            "INSERT INTO payroll (employee_id, amount, pay_period_start, pay_period_end) \
             VALUES (?, ?, ?, ?) \
             RETURNING payroll_id",
        )
        .bind(record.employee_id())
        .bind(cents)
        .bind(record.period_start())
        .bind(record.period_end())
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get("payroll_id"))
    }

    /// All payroll rows for an employee, ordered by period start in the
    /// requested direction.
    pub async fn list_for_employee(
        &self,
        employee_id: i64,
        order: SortOrder,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        let sql = match order {
            SortOrder::Ascending => {
                "SELECT payroll_id, employee_id, amount, pay_period_start, pay_period_end \
                 FROM payroll WHERE employee_id = ? ORDER BY pay_period_start ASC"
            }
            SortOrder::Descending => {
                "SELECT payroll_id, employee_id, amount, pay_period_start, pay_period_end \
                 FROM payroll WHERE employee_id = ? ORDER BY pay_period_start DESC"
            }
        };
        let rows = sqlx::query_as::<_, PayrollRow>(sql)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PayrollRow::into_domain).collect())
    }

    /// Payroll rows whose amount falls inside the inclusive range.
    pub async fn list_in_range(
        &self,
        range: &AmountRange,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        let rows = sqlx::query_as::<_, PayrollRow>(
            "SELECT payroll_id, employee_id, amount, pay_period_start, pay_period_end \
             FROM payroll WHERE amount BETWEEN ? AND ? ORDER BY payroll_id",
        )
        .bind(amount_to_cents(range.min())?)
        .bind(amount_to_cents(range.max())?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PayrollRow::into_domain).collect())
    }

    /// Overwrites the amount of a single payroll row.
    pub async fn update_amount(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        payroll_id: i64,
        amount: Decimal,
    ) -> Result<(), PayrollError> {
        sqlx::query("UPDATE payroll SET amount = ? WHERE payroll_id = ?")
            .bind(amount_to_cents(amount)?)
            .bind(payroll_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Sums payroll amounts whose period end falls in `[first, last]`,
    /// grouped by the owning employee's current division. Employees with no
    /// current division drop out of the join.
    pub async fn totals_by_division(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<GroupTotal>, PayrollError> {
        let rows = sqlx::query_as::<_, GroupTotalRow>(
            "SELECT d.name AS name, SUM(p.amount) AS total \
             FROM payroll AS p \
             JOIN employee_division AS ed ON ed.employee_id = p.employee_id \
             JOIN division AS d ON d.division_id = ed.division_id \
             WHERE p.pay_period_end BETWEEN ? AND ? \
             GROUP BY d.name \
             ORDER BY d.name",
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GroupTotalRow::into_domain).collect())
    }

    /// Same as [`totals_by_division`](Self::totals_by_division), grouped by
    /// the employee's current job title.
    pub async fn totals_by_job_title(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<GroupTotal>, PayrollError> {
        let rows = sqlx::query_as::<_, GroupTotalRow>(
            "SELECT jt.title AS name, SUM(p.amount) AS total \
             FROM payroll AS p \
             JOIN employee_job_titles AS ej ON ej.employee_id = p.employee_id \
             JOIN job_titles AS jt ON jt.job_title_id = ej.job_title_id \
             WHERE p.pay_period_end BETWEEN ? AND ? \
             GROUP BY jt.title \
             ORDER BY jt.title",
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GroupTotalRow::into_domain).collect())
    }
}

/// Errors from the payroll repository.
#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("pay amount {0} is outside the storable range")]
    Amount(Decimal),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for PayrollError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayrollRow {
    payroll_id: i64,
    employee_id: i64,
    amount: i64,
    pay_period_start: NaiveDate,
    pay_period_end: NaiveDate,
}

impl PayrollRow {
    fn into_domain(self) -> PayrollRecord {
        PayrollRecord {
            payroll_id: self.payroll_id,
            employee_id: self.employee_id,
            amount: cents_to_amount(self.amount),
            period_start: self.pay_period_start,
            period_end: self.pay_period_end,
        }
    }
}

/// One aggregated report line: group name and summed pay.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub name: String,
    pub total: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct GroupTotalRow {
    name: String,
    total: i64,
}

impl GroupTotalRow {
    fn into_domain(self) -> GroupTotal {
        GroupTotal {
            name: self.name,
            total: cents_to_amount(self.total),
        }
    }
}

/// Converts a cents value loaded from the store into a two-decimal amount.
pub fn cents_to_amount(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Converts a two-decimal amount into cents for storage.
fn amount_to_cents(amount: Decimal) -> Result<i64, PayrollError> {
    (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or(PayrollError::Amount(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn memory_db(name: &str) -> Database {
        let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let db = Database::connect(&url, &ConnectRetry::default())
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn employee(ssn: &str) -> NewEmployee {
        NewEmployee::new("Grace", "Hopper", ssn, "grace@example.com").unwrap()
    }

    async fn insert_employee(db: &Database, ssn: &str) -> i64 {
        let mut tx = db.begin().await.expect("begin");
        let id = db
            .employees()
            .insert(&mut tx, &employee(ssn))
            .await
            .expect("insert employee");
        tx.commit().await.expect("commit");
        id
    }

    async fn insert_payroll(db: &Database, employee_id: i64, amount: &str, start: NaiveDate) {
        let record =
            NewPayroll::new(employee_id, dec(amount), start, start + chrono::Duration::days(14))
                .unwrap();
        let mut tx = db.begin().await.expect("begin");
        db.payroll()
            .insert(&mut tx, &record)
            .await
            .expect("insert payroll");
        tx.commit().await.expect("commit");
    }

    #[tokio::test]
    async fn migrations_apply() {
        let db = memory_db("storage-migrations").await;
        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert!(tables.0 >= 6, "expected schema tables to be created");
    }

    #[tokio::test]
    async fn connect_gives_up_after_configured_attempts() {
        let retry = ConnectRetry {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        };
        let err = Database::connect("sqlite:file:/nonexistent-dir/db.sqlite3?mode=ro", &retry)
            .await
            .expect_err("connection should fail");
        assert!(matches!(err, StorageError::Connect { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let db = memory_db("storage-roundtrip").await;
        let id = insert_employee(&db, "123456789").await;

        let found = db
            .employees()
            .find_by_id(id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.first_name, "Grace");
        assert_eq!(found.ssn, "123456789");
        assert_eq!(found.division_id, None);
        assert_eq!(found.job_title_id, None);

        let by_ssn = db
            .employees()
            .find_by_ssn("123456789")
            .await
            .expect("find by ssn")
            .expect("present");
        assert_eq!(by_ssn.employee_id, id);
    }

    #[tokio::test]
    async fn duplicate_ssn_is_a_typed_error() {
        let db = memory_db("storage-duplicate-ssn").await;
        insert_employee(&db, "123456789").await;

        let mut tx = db.begin().await.expect("begin");
        let err = db
            .employees()
            .insert(&mut tx, &employee("123456789"))
            .await
            .expect_err("duplicate ssn should fail");
        assert!(matches!(err, EmployeeError::DuplicateSsn));
    }

    #[tokio::test]
    async fn search_escapes_like_wildcards() {
        let db = memory_db("storage-search-escape").await;
        let mut tx = db.begin().await.expect("begin");
        let repo = db.employees();
        repo.insert(
            &mut tx,
            &NewEmployee::new("Percy", "50%Off", "111111111", "percy@example.com").unwrap(),
        )
        .await
        .expect("insert");
        repo.insert(
            &mut tx,
            &NewEmployee::new("Sally", "5000ff", "222222222", "sally@example.com").unwrap(),
        )
        .await
        .expect("insert");
        tx.commit().await.expect("commit");

        // "50%" must match the literal substring, not "50<anything>".
        let hits = repo.search_by_name("50%").await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].last_name, "50%Off");

        let underscore = repo.search_by_name("5_0").await.expect("search");
        assert!(underscore.is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_last_then_first_name() {
        let db = memory_db("storage-search-order").await;
        let repo = db.employees();
        let mut tx = db.begin().await.expect("begin");
        for (first, last, ssn) in [
            ("Zoe", "Adams", "333333333"),
            ("Amy", "Baker", "444444444"),
            ("Bea", "Adams", "555555555"),
        ] {
            repo.insert(
                &mut tx,
                &NewEmployee::new(first, last, ssn, "person@example.com").unwrap(),
            )
            .await
            .expect("insert");
        }
        tx.commit().await.expect("commit");

        let hits = repo.search_by_name("a").await.expect("search");
        let names: Vec<_> = hits
            .iter()
            .map(|e| format!("{} {}", e.first_name, e.last_name))
            .collect();
        assert_eq!(names, ["Bea Adams", "Zoe Adams", "Amy Baker"]);
    }

    #[tokio::test]
    async fn assignment_upsert_keeps_a_single_row() {
        let db = memory_db("storage-assignment-upsert").await;
        let id = insert_employee(&db, "123456789").await;
        let division = db.divisions().insert("Engineering").await.expect("insert");
        let other = db.divisions().insert("Operations").await.expect("insert");

        let repo = db.division_assignments();
        let mut tx = db.begin().await.expect("begin");
        repo.upsert(&mut tx, id, division.division_id)
            .await
            .expect("upsert");
        repo.upsert(&mut tx, id, other.division_id)
            .await
            .expect("upsert again");
        tx.commit().await.expect("commit");

        let rows: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM employee_division WHERE employee_id = ?")
                .bind(id)
                .fetch_one(db.pool())
                .await
                .expect("count");
        assert_eq!(rows.0, 1);
        assert_eq!(
            repo.find_for_employee(id).await.expect("find"),
            Some(other.division_id)
        );
    }

    #[tokio::test]
    async fn payroll_round_trips_amounts_exactly() {
        let db = memory_db("storage-payroll-roundtrip").await;
        let id = insert_employee(&db, "123456789").await;
        insert_payroll(&db, id, "1234.56", date(2025, 1, 1)).await;

        let rows = db
            .payroll()
            .list_for_employee(id, SortOrder::Ascending)
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec("1234.56"));
        assert_eq!(rows[0].period_start, date(2025, 1, 1));
        assert_eq!(rows[0].period_end, date(2025, 1, 15));
    }

    #[tokio::test]
    async fn pay_history_respects_sort_order() {
        let db = memory_db("storage-payroll-order").await;
        let id = insert_employee(&db, "123456789").await;
        insert_payroll(&db, id, "1000", date(2025, 2, 1)).await;
        insert_payroll(&db, id, "1100", date(2025, 1, 1)).await;

        let asc = db
            .payroll()
            .list_for_employee(id, SortOrder::Ascending)
            .await
            .expect("asc");
        assert_eq!(asc[0].period_start, date(2025, 1, 1));

        let desc = db
            .payroll()
            .list_for_employee(id, SortOrder::Descending)
            .await
            .expect("desc");
        assert_eq!(desc[0].period_start, date(2025, 2, 1));
    }

    #[tokio::test]
    async fn range_scan_is_inclusive_on_both_bounds() {
        let db = memory_db("storage-range-scan").await;
        let id = insert_employee(&db, "123456789").await;
        for (amount, start) in [
            ("999.99", date(2025, 1, 1)),
            ("1000.00", date(2025, 2, 1)),
            ("1500.00", date(2025, 3, 1)),
            ("2000.00", date(2025, 4, 1)),
            ("2000.01", date(2025, 5, 1)),
        ] {
            insert_payroll(&db, id, amount, start).await;
        }

        let range = AmountRange::new(dec("1000"), dec("2000")).unwrap();
        let rows = db.payroll().list_in_range(&range).await.expect("scan");
        let amounts: Vec<_> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, [dec("1000.00"), dec("1500.00"), dec("2000.00")]);
    }

    #[tokio::test]
    async fn totals_group_by_current_division() {
        let db = memory_db("storage-totals").await;
        let eng = db.divisions().insert("Engineering").await.expect("insert");
        let ops = db.divisions().insert("Operations").await.expect("insert");

        let a = insert_employee(&db, "111111111").await;
        let b = insert_employee(&db, "222222222").await;
        let unassigned = insert_employee(&db, "333333333").await;

        let assignments = db.division_assignments();
        let mut tx = db.begin().await.expect("begin");
        assignments.upsert(&mut tx, a, eng.division_id).await.expect("upsert");
        assignments.upsert(&mut tx, b, ops.division_id).await.expect("upsert");
        tx.commit().await.expect("commit");

        insert_payroll(&db, a, "1000.00", date(2025, 6, 1)).await;
        insert_payroll(&db, a, "250.50", date(2025, 6, 16)).await;
        insert_payroll(&db, b, "2000.00", date(2025, 6, 1)).await;
        // Unassigned employees are silently excluded from the report.
        insert_payroll(&db, unassigned, "9999.00", date(2025, 6, 1)).await;
        // Period ends in July, outside the queried month.
        insert_payroll(&db, a, "5000.00", date(2025, 6, 30)).await;

        let totals = db
            .payroll()
            .totals_by_division(date(2025, 6, 1), date(2025, 6, 30))
            .await
            .expect("totals");
        assert_eq!(
            totals,
            [
                GroupTotal {
                    name: "Engineering".into(),
                    total: dec("1250.50"),
                },
                GroupTotal {
                    name: "Operations".into(),
                    total: dec("2000.00"),
                },
            ]
        );
    }
}
