/*!
Database interaction module.

Everything the views read or write goes through the `DataStore` trait.
`Store` implements it against Postgres; `MemStore` keeps the same three
relations in memory.

The Postgres database to which `Store` connects is meant to have the
following tables.

```sql
CREATE TABLE admins (
    id          BIGSERIAL PRIMARY KEY,
    reg_no      TEXT UNIQUE NOT NULL,
    password    TEXT NOT NULL,      /* plaintext or Argon2 PHC string */
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE students (
    id              BIGSERIAL PRIMARY KEY,
    name            TEXT NOT NULL,
    reg_no          TEXT UNIQUE NOT NULL,
    dob             DATE NOT NULL,
    year_of_study   TEXT NOT NULL,
    branch          TEXT NOT NULL,
    phone           TEXT NOT NULL,
    email           TEXT UNIQUE NOT NULL,
    hostel_room_no  TEXT NOT NULL,
    parent_name     TEXT NOT NULL,
    parent_phone    TEXT NOT NULL,
    parent_address  TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE leaves (
    id          BIGSERIAL PRIMARY KEY,
    student_id  BIGINT NOT NULL REFERENCES students(id),
    leave_type  TEXT NOT NULL,
    start_date  DATE NOT NULL,
    end_date    DATE NOT NULL,
    reason      TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    applied_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK (status IN ('pending', 'accepted', 'rejected')),
    CHECK (end_date >= start_date)
);
```
*/
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_postgres::{Client, NoTls, error::SqlState};

use crate::leave::{Leave, LeaveWithStudent, NewLeave, ReviewOutcome, Status, Verdict};
use crate::user::{AdminRecord, NewStudent, Student};

mod admins;
mod leaves;
pub mod mem;
mod students;

pub use mem::MemStore;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'admins'",
        "CREATE TABLE admins (
            id          BIGSERIAL PRIMARY KEY,
            reg_no      TEXT UNIQUE NOT NULL,
            password    TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE admins",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id              BIGSERIAL PRIMARY KEY,
            name            TEXT NOT NULL,
            reg_no          TEXT UNIQUE NOT NULL,
            dob             DATE NOT NULL,
            year_of_study   TEXT NOT NULL,
            branch          TEXT NOT NULL,
            phone           TEXT NOT NULL,
            email           TEXT UNIQUE NOT NULL,
            hostel_room_no  TEXT NOT NULL,
            parent_name     TEXT NOT NULL,
            parent_phone    TEXT NOT NULL,
            parent_address  TEXT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'leaves'",
        "CREATE TABLE leaves (
            id          BIGSERIAL PRIMARY KEY,
            student_id  BIGINT NOT NULL REFERENCES students(id),
            leave_type  TEXT NOT NULL,
            start_date  DATE NOT NULL,
            end_date    DATE NOT NULL,
            reason      TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            applied_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            CHECK (status IN ('pending', 'accepted', 'rejected')),
            CHECK (end_date >= start_date)
        )",
        "DROP TABLE leaves",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// A uniqueness constraint refused the write.
    #[error("uniqueness violation: {0}")]
    Unique(String),
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        match self {
            DbError::Unique(s) => DbError::Unique(format!("{}: {}", annotation, &s)),
            DbError::Other(s) => DbError::Other(format!("{}: {}", annotation, &s)),
        }
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            s.push_str("; ");
            s.push_str(dbe.message());
            if let Some(c) = dbe.constraint() {
                s.push_str(" (");
                s.push_str(c);
                s.push(')');
            }
        }

        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            DbError::Unique(s)
        } else {
            DbError::Other(s)
        }
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError::Other(s) }
}

/**
The data store the application runs against.

Filters are exact matches; lists come back newest first.
*/
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn admin_by_reg_no(&self, reg_no: &str) -> Result<Option<AdminRecord>, DbError>;

    /// Admins are provisioned by operators, never through the views.
    async fn insert_admin(&self, reg_no: &str, password: &str) -> Result<(), DbError>;

    async fn student_by_reg_no(&self, reg_no: &str) -> Result<Option<Student>, DbError>;

    async fn insert_student(&self, s: &NewStudent) -> Result<Student, DbError>;

    async fn students(&self) -> Result<Vec<Student>, DbError>;

    async fn count_students(&self) -> Result<i64, DbError>;

    /// Inserts `l` as `Pending`, stamping both timestamps with `at`.
    async fn insert_leave(
        &self,
        student_id: i64,
        l: &NewLeave,
        at: OffsetDateTime,
    ) -> Result<Leave, DbError>;

    async fn leaves_by_student(&self, student_id: i64) -> Result<Vec<Leave>, DbError>;

    async fn leaves_with_students(&self) -> Result<Vec<LeaveWithStudent>, DbError>;

    async fn count_leaves(&self, status: Option<Status>) -> Result<i64, DbError>;

    /**
    Set leave `id` to the status named by `verdict` and its `updated_at`
    to `at`, as one single-row update.

    Only pending leaves are updated; a leave already accepted or rejected
    comes back as `AlreadyReviewed`, and an unknown `id` as `NotFound`.
    */
    async fn review_leave(
        &self,
        id: i64,
        verdict: Verdict,
        at: OffsetDateTime,
    ) -> Result<ReviewOutcome, DbError>;
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( [ connection string ] ) called.");

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!("Store::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(*test_stmt, &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(*create_stmt, &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err);
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[async_trait]
impl DataStore for Store {
    async fn admin_by_reg_no(&self, reg_no: &str) -> Result<Option<AdminRecord>, DbError> {
        self.get_admin_by_reg_no(reg_no).await
    }

    async fn insert_admin(&self, reg_no: &str, password: &str) -> Result<(), DbError> {
        Store::insert_admin(self, reg_no, password).await
    }

    async fn student_by_reg_no(&self, reg_no: &str) -> Result<Option<Student>, DbError> {
        self.get_student_by_reg_no(reg_no).await
    }

    async fn insert_student(&self, s: &NewStudent) -> Result<Student, DbError> {
        Store::insert_student(self, s).await
    }

    async fn students(&self) -> Result<Vec<Student>, DbError> {
        self.get_students().await
    }

    async fn count_students(&self) -> Result<i64, DbError> {
        Store::count_students(self).await
    }

    async fn insert_leave(
        &self,
        student_id: i64,
        l: &NewLeave,
        at: OffsetDateTime,
    ) -> Result<Leave, DbError> {
        Store::insert_leave(self, student_id, l, at).await
    }

    async fn leaves_by_student(&self, student_id: i64) -> Result<Vec<Leave>, DbError> {
        self.get_leaves_by_student(student_id).await
    }

    async fn leaves_with_students(&self) -> Result<Vec<LeaveWithStudent>, DbError> {
        self.get_leaves_with_students().await
    }

    async fn count_leaves(&self, status: Option<Status>) -> Result<i64, DbError> {
        Store::count_leaves(self, status).await
    }

    async fn review_leave(
        &self,
        id: i64,
        verdict: Verdict,
        at: OffsetDateTime,
    ) -> Result<ReviewOutcome, DbError> {
        Store::review_leave(self, id, verdict, at).await
    }
}
