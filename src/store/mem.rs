/*!
An in-process `DataStore`.

Keeps the three relations in `Vec`s behind a lock and enforces the same
uniqueness rules as the Postgres schema. Used by the tests, and by the
server when configured with `store = "memory"`.
*/
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{DataStore, DbError};
use crate::leave::{Leave, LeaveWithStudent, NewLeave, ReviewOutcome, Status, Verdict};
use crate::user::{Admin, AdminRecord, NewStudent, Student};

#[derive(Default)]
struct Tables {
    admins: Vec<AdminRecord>,
    students: Vec<Student>,
    leaves: Vec<Leave>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    /// While `offline` is set, every operation fails as if the backend
    /// were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), DbError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(DbError::Other("Data store unreachable.".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for MemStore {
    async fn admin_by_reg_no(&self, reg_no: &str) -> Result<Option<AdminRecord>, DbError> {
        log::trace!("MemStore::admin_by_reg_no( {:?} ) called.", reg_no);
        self.check_online()?;

        let t = self.tables.read().await;
        Ok(t.admins.iter().find(|a| a.admin.reg_no == reg_no).cloned())
    }

    async fn insert_admin(&self, reg_no: &str, password: &str) -> Result<(), DbError> {
        log::trace!("MemStore::insert_admin( {:?}, [ password ] ) called.", reg_no);
        self.check_online()?;

        let mut t = self.tables.write().await;
        if t.admins.iter().any(|a| a.admin.reg_no == reg_no) {
            return Err(DbError::Unique(format!(
                "Admin with reg_no {:?} already exists.", reg_no
            )));
        }
        let id = t.next_id();
        t.admins.push(AdminRecord {
            admin: Admin {
                id,
                reg_no: reg_no.to_owned(),
                created_at: crate::now(),
            },
            password: password.to_owned(),
        });
        Ok(())
    }

    async fn student_by_reg_no(&self, reg_no: &str) -> Result<Option<Student>, DbError> {
        log::trace!("MemStore::student_by_reg_no( {:?} ) called.", reg_no);
        self.check_online()?;

        let t = self.tables.read().await;
        Ok(t.students.iter().find(|s| s.reg_no == reg_no).cloned())
    }

    async fn insert_student(&self, s: &NewStudent) -> Result<Student, DbError> {
        log::trace!("MemStore::insert_student( {:?} ) called.", &s.reg_no);
        self.check_online()?;

        let mut t = self.tables.write().await;
        if let Some(x) = t.students.iter().find(|x| x.reg_no == s.reg_no || x.email == s.email) {
            return Err(DbError::Unique(format!(
                "Student {:?} already uses reg_no {:?} or email {:?}.",
                &x.name, &s.reg_no, &s.email
            )));
        }

        let id = t.next_id();
        let stud = Student {
            id,
            name: s.name.clone(),
            reg_no: s.reg_no.clone(),
            dob: s.dob,
            year_of_study: s.year_of_study.clone(),
            branch: s.branch.clone(),
            phone: s.phone.clone(),
            email: s.email.clone(),
            hostel_room_no: s.hostel_room_no.clone(),
            parent_name: s.parent_name.clone(),
            parent_phone: s.parent_phone.clone(),
            parent_address: s.parent_address.clone(),
            created_at: crate::now(),
        };
        t.students.push(stud.clone());
        Ok(stud)
    }

    async fn students(&self) -> Result<Vec<Student>, DbError> {
        log::trace!("MemStore::students() called.");
        self.check_online()?;

        let t = self.tables.read().await;
        let mut v = t.students.clone();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn count_students(&self) -> Result<i64, DbError> {
        self.check_online()?;
        Ok(self.tables.read().await.students.len() as i64)
    }

    async fn insert_leave(
        &self,
        student_id: i64,
        l: &NewLeave,
        at: OffsetDateTime,
    ) -> Result<Leave, DbError> {
        log::trace!("MemStore::insert_leave( {}, {:?}, {} ) called.", student_id, l, &at);
        self.check_online()?;

        let mut t = self.tables.write().await;
        if !t.students.iter().any(|s| s.id == student_id) {
            return Err(DbError::Other(format!(
                "No student with id {} to own this leave.", student_id
            )));
        }
        if l.end_date < l.start_date {
            return Err(DbError::Other("Leave ends before it starts.".to_owned()));
        }

        let id = t.next_id();
        let leave = Leave {
            id,
            student_id,
            leave_type: l.leave_type.clone(),
            start_date: l.start_date,
            end_date: l.end_date,
            reason: l.reason.clone(),
            status: Status::Pending,
            applied_at: at,
            updated_at: at,
        };
        t.leaves.push(leave.clone());
        Ok(leave)
    }

    async fn leaves_by_student(&self, student_id: i64) -> Result<Vec<Leave>, DbError> {
        log::trace!("MemStore::leaves_by_student( {} ) called.", student_id);
        self.check_online()?;

        let t = self.tables.read().await;
        let mut v: Vec<Leave> = t.leaves.iter()
            .filter(|l| l.student_id == student_id)
            .cloned()
            .collect();
        v.sort_by(|a, b| b.applied_at.cmp(&a.applied_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn leaves_with_students(&self) -> Result<Vec<LeaveWithStudent>, DbError> {
        log::trace!("MemStore::leaves_with_students() called.");
        self.check_online()?;

        let t = self.tables.read().await;
        let mut v: Vec<LeaveWithStudent> = Vec::with_capacity(t.leaves.len());
        for l in t.leaves.iter() {
            match t.students.iter().find(|s| s.id == l.student_id) {
                Some(s) => v.push(LeaveWithStudent { leave: l.clone(), student: s.clone() }),
                None => {
                    log::warn!("Leave {} has no student {}; skipping.", l.id, l.student_id);
                },
            }
        }
        v.sort_by(|a, b| b.leave.applied_at.cmp(&a.leave.applied_at)
            .then(b.leave.id.cmp(&a.leave.id)));
        Ok(v)
    }

    async fn count_leaves(&self, status: Option<Status>) -> Result<i64, DbError> {
        self.check_online()?;

        let t = self.tables.read().await;
        let n = t.leaves.iter()
            .filter(|l| status.map(|s| l.status == s).unwrap_or(true))
            .count();
        Ok(n as i64)
    }

    async fn review_leave(
        &self,
        id: i64,
        verdict: Verdict,
        at: OffsetDateTime,
    ) -> Result<ReviewOutcome, DbError> {
        log::trace!("MemStore::review_leave( {}, {:?}, {} ) called.", id, &verdict, &at);
        self.check_online()?;

        let mut t = self.tables.write().await;
        match t.leaves.iter_mut().find(|l| l.id == id) {
            None => Ok(ReviewOutcome::NotFound),
            Some(l) => if l.review(verdict, at) {
                Ok(ReviewOutcome::Applied)
            } else {
                Ok(ReviewOutcome::AlreadyReviewed)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    use crate::tests::ensure_logging;
    use crate::user::tests::sample_form;

    fn medical() -> NewLeave {
        NewLeave {
            leave_type: "Medical Leave".to_owned(),
            start_date: date!(2025 - 01 - 10),
            end_date: date!(2025 - 01 - 12),
            reason: "fever".to_owned(),
        }
    }

    #[tokio::test]
    async fn uniqueness() {
        ensure_logging();
        let db = MemStore::new();

        db.insert_admin("ADMIN001", "pw").await.unwrap();
        assert!(matches!(db.insert_admin("ADMIN001", "pw").await.unwrap_err(), DbError::Unique(_)));

        let ns = sample_form("CS2024001", "2005-03-15").validate().unwrap();
        db.insert_student(&ns).await.unwrap();
        assert!(matches!(db.insert_student(&ns).await.unwrap_err(), DbError::Unique(_)));

        let mut same_email = sample_form("CS2024002", "2005-03-15").validate().unwrap();
        same_email.email = ns.email.clone();
        assert!(matches!(db.insert_student(&same_email).await.unwrap_err(), DbError::Unique(_)));

        assert_eq!(db.count_students().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn leaves_come_back_newest_first() {
        ensure_logging();
        let db = MemStore::new();
        let s = db.insert_student(
            &sample_form("CS2024001", "2005-03-15").validate().unwrap()
        ).await.unwrap();

        let first = db.insert_leave(s.id, &medical(), datetime!(2025-01-05 08:00 UTC)).await.unwrap();
        let second = db.insert_leave(s.id, &medical(), datetime!(2025-01-06 08:00 UTC)).await.unwrap();

        let mine = db.leaves_by_student(s.id).await.unwrap();
        assert_eq!(mine.iter().map(|l| l.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let all = db.leaves_with_students().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].student.id, s.id);

        assert!(db.leaves_by_student(s.id + 100).await.unwrap().is_empty());
        assert!(db.insert_leave(s.id + 100, &medical(), crate::now()).await.is_err());
    }

    #[tokio::test]
    async fn review_sets_terminal_status_once() {
        ensure_logging();
        let db = MemStore::new();
        let s = db.insert_student(
            &sample_form("CS2024001", "2005-03-15").validate().unwrap()
        ).await.unwrap();
        let applied = datetime!(2025-01-05 08:00 UTC);
        let l = db.insert_leave(s.id, &medical(), applied).await.unwrap();

        let reviewed = datetime!(2025-01-06 09:00 UTC);
        assert_eq!(
            db.review_leave(l.id, Verdict::Accepted, reviewed).await.unwrap(),
            ReviewOutcome::Applied
        );
        assert_eq!(
            db.review_leave(l.id, Verdict::Rejected, datetime!(2025-01-07 09:00 UTC)).await.unwrap(),
            ReviewOutcome::AlreadyReviewed
        );
        assert_eq!(
            db.review_leave(9999, Verdict::Rejected, reviewed).await.unwrap(),
            ReviewOutcome::NotFound
        );

        let l = &db.leaves_by_student(s.id).await.unwrap()[0];
        assert_eq!(l.status, Status::Accepted);
        assert_eq!(l.updated_at, reviewed);
        assert_eq!(l.applied_at, applied);

        assert_eq!(db.count_leaves(Some(Status::Accepted)).await.unwrap(), 1);
        assert_eq!(db.count_leaves(Some(Status::Pending)).await.unwrap(), 0);
        assert_eq!(db.count_leaves(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn offline_fails_everything() {
        let db = MemStore::new();
        db.set_offline(true);
        assert!(matches!(db.count_students().await, Err(DbError::Other(_))));
        assert!(db.admin_by_reg_no("ADMIN001").await.is_err());
        db.set_offline(false);
        assert_eq!(db.count_students().await.unwrap(), 0);
    }
}
