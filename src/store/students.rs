/*!
`Store` methods for the `students` table.
*/
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::user::{NewStudent, Student};

/// Columns of `students`, in the order `student_from_row()` expects when
/// they're selected with a prefix (as in the leave/student join).
pub(super) static STUDENT_COLUMNS: &[&str] = &[
    "id", "name", "reg_no", "dob", "year_of_study", "branch", "phone",
    "email", "hostel_room_no", "parent_name", "parent_phone",
    "parent_address", "created_at",
];

/// Build a `Student` from `row`, whose student columns are named with
/// `prefix` prepended (`""` for a plain `SELECT * FROM students`).
pub(super) fn student_from_row(row: &Row, prefix: &str) -> Result<Student, DbError> {
    let col = |name: &str| format!("{}{}", prefix, name);

    Ok(Student {
        id: row.try_get(col("id").as_str())?,
        name: row.try_get(col("name").as_str())?,
        reg_no: row.try_get(col("reg_no").as_str())?,
        dob: row.try_get(col("dob").as_str())?,
        year_of_study: row.try_get(col("year_of_study").as_str())?,
        branch: row.try_get(col("branch").as_str())?,
        phone: row.try_get(col("phone").as_str())?,
        email: row.try_get(col("email").as_str())?,
        hostel_room_no: row.try_get(col("hostel_room_no").as_str())?,
        parent_name: row.try_get(col("parent_name").as_str())?,
        parent_phone: row.try_get(col("parent_phone").as_str())?,
        parent_address: row.try_get(col("parent_address").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
    })
}

impl Store {
    pub async fn get_student_by_reg_no(
        &self,
        reg_no: &str
    ) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student_by_reg_no( {:?} ) called.", reg_no);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE reg_no = $1",
            &[&reg_no]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row, "")?)),
        }
    }

    pub async fn insert_student(&self, s: &NewStudent) -> Result<Student, DbError> {
        log::trace!("Store::insert_student( {:?} ) called.", &s.reg_no);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO students (
                name, reg_no, dob, year_of_study, branch, phone, email,
                hostel_room_no, parent_name, parent_phone, parent_address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *",
            &[
                &s.name, &s.reg_no, &s.dob, &s.year_of_study, &s.branch,
                &s.phone, &s.email, &s.hostel_room_no, &s.parent_name,
                &s.parent_phone, &s.parent_address,
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting student"))?;

        let stud = student_from_row(&row, "")?;
        log::trace!("Inserted Student {:?} (id {}).", &stud.reg_no, stud.id);
        Ok(stud)
    }

    pub async fn get_students(&self) -> Result<Vec<Student>, DbError> {
        log::trace!("Store::get_students() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM students ORDER BY created_at DESC, id DESC",
            &[]
        ).await?;

        let mut students: Vec<Student> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            students.push(student_from_row(row, "")?);
        }

        Ok(students)
    }

    pub async fn count_students(&self) -> Result<i64, DbError> {
        log::trace!("Store::count_students() called.");

        let client = self.connect().await?;
        let row = client.query_one("SELECT COUNT(*) AS n FROM students", &[]).await?;
        Ok(row.try_get("n")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;
    use crate::user::tests::sample_form;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_students() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let ns = sample_form("CS2024001", "2005-03-15").validate().unwrap();
        let s = db.insert_student(&ns).await.unwrap();
        assert_eq!(s.dob, date!(2005 - 03 - 15));
        assert_eq!(s.login_secret(), "20050315");

        let err = db.insert_student(&ns).await.unwrap_err();
        assert!(matches!(err, DbError::Unique(_)));

        let ns2 = sample_form("CS2024002", "2004-11-02").validate().unwrap();
        db.insert_student(&ns2).await.unwrap();

        assert_eq!(db.count_students().await.unwrap(), 2);
        let all = db.get_students().await.unwrap();
        assert_eq!(all[0].reg_no, "CS2024002");
        assert_eq!(
            db.get_student_by_reg_no("CS2024001").await.unwrap().unwrap().id,
            s.id
        );

        db.nuke_database().await.unwrap();
    }
}
