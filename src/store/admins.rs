/*!
`Store` methods for the `admins` table.

Admin rows are provisioned out-of-band; the only insert here exists for
`config::load_configuration()` to create the configured default admin.
*/
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::user::{Admin, AdminRecord};

fn admin_from_row(row: &Row) -> Result<AdminRecord, DbError> {
    let admin = Admin {
        id: row.try_get("id")?,
        reg_no: row.try_get("reg_no")?,
        created_at: row.try_get("created_at")?,
    };

    Ok(AdminRecord {
        admin,
        password: row.try_get("password")?,
    })
}

impl Store {
    pub async fn get_admin_by_reg_no(
        &self,
        reg_no: &str
    ) -> Result<Option<AdminRecord>, DbError> {
        log::trace!("Store::get_admin_by_reg_no( {:?} ) called.", reg_no);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM admins WHERE reg_no = $1",
            &[&reg_no]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(admin_from_row(&row)?)),
        }
    }

    pub async fn insert_admin(
        &self,
        reg_no: &str,
        password: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::insert_admin( {:?}, [ password ] ) called.", reg_no);

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO admins (reg_no, password) VALUES ($1, $2)",
            &[&reg_no, &password]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting admin"))?;

        log::trace!("Inserted Admin {:?}.", reg_no);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_and_find_admin() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_admin("ADMIN001", "hostel@123").await.unwrap();
        let rec = db.get_admin_by_reg_no("ADMIN001").await.unwrap().unwrap();
        assert_eq!(rec.admin.reg_no, "ADMIN001");
        assert_eq!(rec.password, "hostel@123");

        assert!(matches!(db.insert_admin("ADMIN001", "other").await.unwrap_err(), DbError::Unique(_)));
        assert!(db.get_admin_by_reg_no("ADMIN002").await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
