use thiserror::Error;
use tracing::info;

use staffdb_core::types::{Division, Employee, JobTitle, NewEmployee};
use staffdb_storage::{Database, EmployeeError};

/// Service owning the employee lifecycle: creation, update, deletion and the
/// search paths, together with each employee's current division and job-title
/// assignment. Every multi-table write runs inside a single transaction, so a
/// failure part-way leaves nothing behind.
#[derive(Clone)]
pub struct LifecycleService {
    database: Database,
}

impl LifecycleService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Inserts a new employee along with exactly one division assignment and
    /// one job-title assignment. Both reference ids must exist; the three
    /// writes commit together or not at all. Returns the employee populated
    /// with its generated id and both assignment ids.
    pub async fn add(
        &self,
        employee: NewEmployee,
        division_id: i64,
        job_title_id: i64,
    ) -> Result<Employee, LifecycleError> {
        self.require_references(division_id, job_title_id).await?;

        let mut tx = self.database.begin().await?;
        let employee_id = self.database.employees().insert(&mut tx, &employee).await?;
        self.database
            .division_assignments()
            .upsert(&mut tx, employee_id, division_id)
            .await?;
        self.database
            .title_assignments()
            .upsert(&mut tx, employee_id, job_title_id)
            .await?;
        tx.commit().await?;

        info!(employee_id, division_id, job_title_id, "employee added");
        Ok(employee.into_employee(employee_id, division_id, job_title_id))
    }

    /// Updates an employee's scalar fields and replaces both current
    /// assignments, all in one transaction. `employee_id` must be assigned.
    ///
    /// Returns whether the scalar update affected a row; `false` means no
    /// employee with that id exists and no assignment was touched. Any
    /// failure after the scalar update rolls the whole operation back.
    pub async fn update(
        &self,
        employee_id: Option<i64>,
        fields: &NewEmployee,
        division_id: i64,
        job_title_id: i64,
    ) -> Result<bool, LifecycleError> {
        let employee_id = employee_id.ok_or(LifecycleError::MissingEmployeeId)?;

        let mut tx = self.database.begin().await?;
        let updated = self
            .database
            .employees()
            .update_scalars(&mut tx, employee_id, fields)
            .await?;
        if !updated {
            return Ok(false);
        }

        self.require_references(division_id, job_title_id).await?;
        self.database
            .division_assignments()
            .upsert(&mut tx, employee_id, division_id)
            .await?;
        self.database
            .title_assignments()
            .upsert(&mut tx, employee_id, job_title_id)
            .await?;
        tx.commit().await?;

        info!(employee_id, division_id, job_title_id, "employee updated");
        Ok(true)
    }

    /// Deletes the employee row only. Assignment and payroll rows are left
    /// in place; cleaning them up is a separate, explicit decision.
    pub async fn delete(&self, employee_id: i64) -> Result<bool, LifecycleError> {
        let deleted = self.database.employees().delete(employee_id).await?;
        if deleted {
            info!(employee_id, "employee deleted");
        }
        Ok(deleted)
    }

    pub async fn find_by_id(&self, employee_id: i64) -> Result<Option<Employee>, LifecycleError> {
        Ok(self.database.employees().find_by_id(employee_id).await?)
    }

    pub async fn find_by_ssn(&self, ssn: &str) -> Result<Option<Employee>, LifecycleError> {
        Ok(self.database.employees().find_by_ssn(ssn).await?)
    }

    /// Substring search on first or last name; LIKE wildcards in the fragment
    /// are matched literally. Results are ordered by last name, first name.
    pub async fn search_by_name(&self, fragment: &str) -> Result<Vec<Employee>, LifecycleError> {
        Ok(self.database.employees().search_by_name(fragment).await?)
    }

    pub async fn divisions(&self) -> Result<Vec<Division>, LifecycleError> {
        Ok(self.database.divisions().list_all().await?)
    }

    pub async fn job_titles(&self) -> Result<Vec<JobTitle>, LifecycleError> {
        Ok(self.database.job_titles().list_all().await?)
    }

    pub async fn add_division(&self, name: &str) -> Result<Division, LifecycleError> {
        Ok(self.database.divisions().insert(name).await?)
    }

    pub async fn add_job_title(&self, title: &str) -> Result<JobTitle, LifecycleError> {
        Ok(self.database.job_titles().insert(title).await?)
    }

    async fn require_references(
        &self,
        division_id: i64,
        job_title_id: i64,
    ) -> Result<(), LifecycleError> {
        if self
            .database
            .divisions()
            .find_by_id(division_id)
            .await?
            .is_none()
        {
            return Err(LifecycleError::UnknownDivision(division_id));
        }
        if self
            .database
            .job_titles()
            .find_by_id(job_title_id)
            .await?
            .is_none()
        {
            return Err(LifecycleError::UnknownJobTitle(job_title_id));
        }
        Ok(())
    }
}

/// Errors surfaced by the employee lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("employee id is required for update")]
    MissingEmployeeId,
    #[error("division {0} does not exist")]
    UnknownDivision(i64),
    #[error("job title {0} does not exist")]
    UnknownJobTitle(i64),
    #[error("an employee with the same ssn already exists")]
    DuplicateSsn,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<EmployeeError> for LifecycleError {
    fn from(err: EmployeeError) -> Self {
        match err {
            EmployeeError::DuplicateSsn => Self::DuplicateSsn,
            EmployeeError::Database(inner) => Self::Database(inner),
        }
    }
}
