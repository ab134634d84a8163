//! Background job queue
//!
//! Jobs are rows in the `job` table. `iw job run` drains pending jobs
//! oldest first; each job executes in its own transaction and ends up
//! `succeeded` or `failed`. Failed jobs stay failed until retried.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::core::db::{
    apply_permission_changes, expire_overdue, not_found_if_none, parse_ts, ts, Database, DbError,
};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::permissions::Permission;
use crate::core::realtime::{record_change, Operation};

/// Work a job performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Grant and revoke permissions for many users of one company
    UpdatePermissions {
        user_ids: Vec<EntityId>,
        #[serde(default)]
        add: Vec<Permission>,
        #[serde(default)]
        remove: Vec<Permission>,
    },
    /// Expire sent quotes whose expiration date is before `as_of`
    ExpireQuotes { as_of: NaiveDate },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::UpdatePermissions { .. } => "update_permissions",
            JobKind::ExpireQuotes { .. } => "expire_quotes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// A queued unit of background work
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: EntityId,
    pub company_id: EntityId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_by: EntityId,
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(company_id: EntityId, kind: JobKind, created_by: EntityId) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Job),
            company_id,
            kind,
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
            created_by,
            created: Utc::now(),
            finished: None,
        }
    }
}

impl Entity for Job {
    const PREFIX: EntityPrefix = EntityPrefix::Job;
    const TABLE: &'static str = "job";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        self.kind.name()
    }
}

/// Outcome of one `run_pending` pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub succeeded: Vec<EntityId>,
    pub failed: Vec<EntityId>,
}

const COLUMNS: &str =
    "id, company_id, payload, status, attempts, error, created_by, created, finished";

fn map_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let payload: String = row.get(2)?;
    let kind = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let finished: Option<String> = row.get(8)?;
    Ok(Job {
        id: row.get(0)?,
        company_id: row.get(1)?,
        kind,
        status: parse_column(3, row.get(3)?)?,
        attempts: row.get(4)?,
        error: row.get(5)?,
        created_by: row.get(6)?,
        created: parse_ts(7, row.get(7)?)?,
        finished: finished.map(|f| parse_ts(8, f)).transpose()?,
    })
}

fn load_job(conn: &Connection, company_id: &EntityId, id: &str) -> Result<Job, DbError> {
    let job = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM job WHERE company_id = ?1 AND id = ?2"),
            params![company_id, id.to_uppercase()],
            map_job,
        )
        .optional()?;
    not_found_if_none(job, "job", id)
}

fn set_status(
    conn: &Connection,
    job: &Job,
    status: JobStatus,
    error: Option<&str>,
) -> Result<(), DbError> {
    let finished = matches!(status, JobStatus::Succeeded | JobStatus::Failed).then(|| ts(&Utc::now()));
    let bump = i32::from(status == JobStatus::Running);
    conn.execute(
        "UPDATE job SET status = ?2, error = ?3, finished = ?4, attempts = attempts + ?5
         WHERE id = ?1",
        params![job.id, status.to_string(), error, finished, bump],
    )?;
    record_change(conn, &job.company_id, Job::TABLE, Operation::Update, &job.id.to_string())
}

/// Run a job's work against an open transaction
fn execute(conn: &Connection, job: &Job) -> Result<(), DbError> {
    match &job.kind {
        JobKind::UpdatePermissions {
            user_ids,
            add,
            remove,
        } => {
            for user_id in user_ids {
                let employed: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM employee WHERE user_id = ?1 AND company_id = ?2",
                        params![user_id, job.company_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if employed.is_none() {
                    return Err(DbError::not_found("employee", user_id.to_string()));
                }
                apply_permission_changes(conn, user_id, &job.company_id, add, remove)?;
            }
            Ok(())
        }
        JobKind::ExpireQuotes { as_of } => {
            expire_overdue(conn, &job.company_id, *as_of)?;
            Ok(())
        }
    }
}

impl Database {
    /// Queue a job for later execution
    pub fn enqueue_job(&mut self, job: &Job) -> Result<(), DbError> {
        let payload = serde_json::to_string(&job.kind)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO job (id, company_id, kind, payload, status, attempts, created_by, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    job.id,
                    job.company_id,
                    job.kind.name(),
                    payload,
                    job.status.to_string(),
                    job.created_by,
                    ts(&job.created)
                ],
            )?;
            record_change(tx, &job.company_id, Job::TABLE, Operation::Insert, &job.id.to_string())
        })?;
        tracing::info!(job = %job.id, kind = job.kind.name(), "job queued");
        Ok(())
    }

    pub fn get_job(&self, company_id: &EntityId, id: &str) -> Result<Job, DbError> {
        load_job(self.conn(), company_id, id)
    }

    /// Jobs of a company, newest first
    pub fn list_jobs(
        &self,
        company_id: &EntityId,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, DbError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM job
             WHERE company_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created DESC, id DESC"
        ))?;
        let jobs = stmt
            .query_map(params![company_id, status.map(|s| s.to_string())], map_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Claim and run up to `limit` pending jobs of a company, oldest first
    ///
    /// Each job is claimed, executed and marked succeeded in one
    /// transaction, so an interrupted run leaves it pending. A failed job
    /// is recorded in a follow-up transaction after its work rolls back.
    pub fn run_pending(
        &mut self,
        company_id: &EntityId,
        limit: usize,
    ) -> Result<RunSummary, DbError> {
        let mut summary = RunSummary::default();
        for _ in 0..limit {
            let Some(job) = self.next_pending_job(company_id)? else {
                break;
            };
            match self.write(|tx| {
                set_status(tx, &job, JobStatus::Running, None)?;
                execute(tx, &job)?;
                set_status(tx, &job, JobStatus::Succeeded, None)
            }) {
                Ok(()) => {
                    tracing::info!(job = %job.id, kind = job.kind.name(), "job succeeded");
                    summary.succeeded.push(job.id);
                }
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(job = %job.id, kind = job.kind.name(), error = %message, "job failed");
                    self.write(|tx| {
                        set_status(tx, &job, JobStatus::Running, None)?;
                        set_status(tx, &job, JobStatus::Failed, Some(&message))
                    })?;
                    summary.failed.push(job.id);
                }
            }
        }
        Ok(summary)
    }

    fn next_pending_job(&self, company_id: &EntityId) -> Result<Option<Job>, DbError> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM job WHERE company_id = ?1 AND status = 'pending'
                     ORDER BY created, id LIMIT 1"
                ),
                params![company_id],
                map_job,
            )
            .optional()?)
    }

    /// Put a failed job back in the queue
    ///
    /// A job left `running` by an interrupted run is requeued the same way.
    pub fn retry_job(&mut self, company_id: &EntityId, id: &str) -> Result<Job, DbError> {
        let job = self.write(|tx| {
            let job = load_job(tx, company_id, id)?;
            if !matches!(job.status, JobStatus::Failed | JobStatus::Running) {
                return Err(DbError::InvalidState(format!(
                    "job {} is {}; only failed or interrupted jobs can be retried",
                    job.id, job.status
                )));
            }
            tx.execute(
                "UPDATE job SET status = 'pending', error = NULL, finished = NULL WHERE id = ?1",
                params![job.id],
            )?;
            record_change(tx, &job.company_id, Job::TABLE, Operation::Update, &job.id.to_string())?;
            load_job(tx, company_id, id)
        })?;
        tracing::info!(job = %job.id, "job requeued");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::{fixture, sales_fixture};
    use crate::core::db::QuoteTransition;
    use crate::core::permissions::{Action, Module, PermissionSet};
    use crate::entities::{EmployeeType, QuoteStatus, User, UserType};

    fn perm(s: &str) -> Permission {
        s.parse().unwrap()
    }

    #[test]
    fn test_job_kind_payload_is_tagged() {
        let kind = JobKind::ExpireQuotes {
            as_of: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"expire_quotes","as_of":"2026-05-01"}"#);
    }

    #[test]
    fn test_update_permissions_job() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let clerk_type = EmployeeType::new(company.clone(), "Clerk".to_string(), PermissionSet::default());
        fx.db.create_employee_type(&clerk_type).unwrap();
        let clerk = User::new(
            "clerk@acme.test",
            "Cal".to_string(),
            "Clerk".to_string(),
            UserType::Employee,
        );
        fx.db.add_employee(&clerk, &company, "Clerk").unwrap();

        let job = Job::new(
            company.clone(),
            JobKind::UpdatePermissions {
                user_ids: vec![clerk.id.clone()],
                add: vec![perm("parts_view"), perm("parts_create")],
                remove: vec![],
            },
            fx.admin.id.clone(),
        );
        fx.db.enqueue_job(&job).unwrap();
        assert_eq!(fx.db.list_jobs(&company, Some(JobStatus::Pending)).unwrap().len(), 1);

        let summary = fx.db.run_pending(&company, 10).unwrap();
        assert_eq!(summary.succeeded, vec![job.id.clone()]);

        let set = fx.db.get_permissions(&clerk.id).unwrap();
        assert!(set.allows(Permission::new(Module::Parts, Action::Create), &company));

        let done = fx.db.get_job(&company, &job.id.to_string()).unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempts, 1);
        assert!(done.finished.is_some());
    }

    #[test]
    fn test_failed_job_records_error_and_retries() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let stranger = EntityId::new(EntityPrefix::User);
        let job = Job::new(
            company.clone(),
            JobKind::UpdatePermissions {
                user_ids: vec![stranger],
                add: vec![perm("sales_view")],
                remove: vec![],
            },
            fx.admin.id.clone(),
        );
        fx.db.enqueue_job(&job).unwrap();

        let summary = fx.db.run_pending(&company, 10).unwrap();
        assert_eq!(summary.failed.len(), 1);
        let failed = fx.db.get_job(&company, &job.id.to_string()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("employee"));

        // nothing left to run until retried
        assert!(fx.db.run_pending(&company, 10).unwrap().failed.is_empty());

        let retried = fx.db.retry_job(&company, &job.id.to_string()).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(retried.error.is_none());
        assert!(fx.db.retry_job(&company, &job.id.to_string()).is_err());
    }

    fn expire_job(fx: &crate::core::db::testing::Fixture) -> Job {
        Job::new(
            fx.company_id().clone(),
            JobKind::ExpireQuotes {
                as_of: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            },
            fx.admin.id.clone(),
        )
    }

    #[test]
    fn test_interrupted_job_can_be_requeued() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let job = expire_job(&fx);
        fx.db.enqueue_job(&job).unwrap();
        // a run that died after claiming the job
        fx.db
            .conn()
            .execute("UPDATE job SET status = 'running' WHERE id = ?1", params![job.id])
            .unwrap();

        let summary = fx.db.run_pending(&company, 10).unwrap();
        assert!(summary.succeeded.is_empty() && summary.failed.is_empty());

        let requeued = fx.db.retry_job(&company, &job.id.to_string()).unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        let summary = fx.db.run_pending(&company, 10).unwrap();
        assert_eq!(summary.succeeded, vec![job.id.clone()]);
        assert_eq!(
            fx.db.get_job(&company, &job.id.to_string()).unwrap().status,
            JobStatus::Succeeded
        );
    }

    #[test]
    fn test_run_pending_respects_limit() {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let first = expire_job(&fx);
        let second = expire_job(&fx);
        fx.db.enqueue_job(&first).unwrap();
        fx.db.enqueue_job(&second).unwrap();

        assert_eq!(fx.db.run_pending(&company, 1).unwrap().succeeded.len(), 1);
        let pending = fx.db.list_jobs(&company, Some(JobStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(fx.db.run_pending(&company, 5).unwrap().succeeded.len(), 1);
        assert!(fx.db.list_jobs(&company, Some(JobStatus::Running)).unwrap().is_empty());
    }

    #[test]
    fn test_expire_quotes_job() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let expiry = NaiveDate::from_ymd_opt(2026, 1, 31);
        let quote = fx
            .db
            .create_quote(&company, &customer.id, "Old offer", expiry, &user)
            .unwrap();
        fx.db
            .add_quote_line(&company, &quote.quote_number, "BRK-100", 1.0, None, None)
            .unwrap();
        fx.db
            .transition_quote(&company, &quote.quote_number, QuoteTransition::Send)
            .unwrap();

        let job = Job::new(
            company.clone(),
            JobKind::ExpireQuotes {
                as_of: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            },
            user,
        );
        fx.db.enqueue_job(&job).unwrap();
        fx.db.run_pending(&company, 1).unwrap();

        let quote = fx.db.get_quote(&company, &quote.quote_number).unwrap();
        assert_eq!(quote.status, QuoteStatus::Expired);
    }
}
