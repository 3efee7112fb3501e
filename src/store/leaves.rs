/*!
`Store` methods for the `leaves` table.
*/
use std::fmt::Write;

use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{Store, DbError};
use super::students::{student_from_row, STUDENT_COLUMNS};
use crate::leave::{Leave, LeaveWithStudent, NewLeave, ReviewOutcome, Status, Verdict};

fn leave_from_row(row: &Row) -> Result<Leave, DbError> {
    let status_str: &str = row.try_get("status")?;

    Ok(Leave {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        leave_type: row.try_get("leave_type")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        reason: row.try_get("reason")?,
        status: status_str.parse::<Status>()?,
        applied_at: row.try_get("applied_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Every leave with its student's columns alongside, as `s_<column>`.
fn join_query() -> String {
    let mut q = String::from("SELECT l.*");
    for c in STUDENT_COLUMNS.iter() {
        // Writing to a String can't fail.
        let _ = write!(&mut q, ", s.{} AS s_{}", c, c);
    }
    q.push_str(
        " FROM leaves l JOIN students s ON s.id = l.student_id
            ORDER BY l.applied_at DESC, l.id DESC"
    );
    q
}

impl Store {
    pub async fn insert_leave(
        &self,
        student_id: i64,
        l: &NewLeave,
        at: OffsetDateTime,
    ) -> Result<Leave, DbError> {
        log::trace!(
            "Store::insert_leave( {}, {:?}, {} ) called.",
            student_id, l, &at
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO leaves (
                student_id, leave_type, start_date, end_date, reason,
                status, applied_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *",
            &[
                &student_id, &l.leave_type, &l.start_date, &l.end_date,
                &l.reason, &Status::Pending.as_str(), &at,
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting leave"))?;

        leave_from_row(&row)
    }

    pub async fn get_leaves_by_student(
        &self,
        student_id: i64
    ) -> Result<Vec<Leave>, DbError> {
        log::trace!("Store::get_leaves_by_student( {} ) called.", student_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM leaves WHERE student_id = $1
                ORDER BY applied_at DESC, id DESC",
            &[&student_id]
        ).await?;

        let mut leaves: Vec<Leave> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            leaves.push(leave_from_row(row)?);
        }

        Ok(leaves)
    }

    pub async fn get_leaves_with_students(&self) -> Result<Vec<LeaveWithStudent>, DbError> {
        log::trace!("Store::get_leaves_with_students() called.");

        let client = self.connect().await?;
        let rows = client.query(join_query().as_str(), &[]).await?;

        let mut leaves: Vec<LeaveWithStudent> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let leave = leave_from_row(row)?;
            let student = student_from_row(row, "s_")
                .map_err(|e| e.annotate("Unable to read joined student"))?;
            leaves.push(LeaveWithStudent { leave, student });
        }

        Ok(leaves)
    }

    pub async fn count_leaves(&self, status: Option<Status>) -> Result<i64, DbError> {
        log::trace!("Store::count_leaves( {:?} ) called.", &status);

        let client = self.connect().await?;
        let row = match status {
            None => client.query_one(
                "SELECT COUNT(*) AS n FROM leaves", &[]
            ).await?,
            Some(status) => client.query_one(
                "SELECT COUNT(*) AS n FROM leaves WHERE status = $1",
                &[&status.as_str()]
            ).await?,
        };

        Ok(row.try_get("n")?)
    }

    pub async fn review_leave(
        &self,
        id: i64,
        verdict: Verdict,
        at: OffsetDateTime,
    ) -> Result<ReviewOutcome, DbError> {
        log::trace!("Store::review_leave( {}, {:?}, {} ) called.", id, &verdict, &at);

        let status: Status = verdict.into();
        let client = self.connect().await?;
        let row = client.query_one(
            "WITH updated AS (
                UPDATE leaves SET status = $1, updated_at = $2
                    WHERE id = $3 AND status = 'pending'
                    RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM updated) AS updated,
                (SELECT COUNT(*) FROM leaves WHERE id = $3) AS found",
            &[&status.as_str(), &at, &id]
        ).await?;
        let updated: i64 = row.try_get("updated")?;
        let found: i64 = row.try_get("found")?;

        match (updated, found) {
            (0, 0) => Ok(ReviewOutcome::NotFound),
            (0, _) => Ok(ReviewOutcome::AlreadyReviewed),
            (1, _) => Ok(ReviewOutcome::Applied),
            (n, _) => {
                log::warn!("Reviewing single leave {} affected {} rows.", id, &n);
                Ok(ReviewOutcome::Applied)
            },
        }
    }
}
