/*!
The two kinds of people who can log in, and the identity a session holds.
*/
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::ValidationError;

/// Choices offered for `year_of_study` on the Add Student form.
pub static YEAR_OPTIONS: &[&str] = &[
    "1st Year",
    "2nd Year",
    "3rd Year",
    "4th Year",
    "Final Year",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin   => "admin",
            Role::Student => "student",
        };

        write!(f, "{}", token)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub reg_no: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An `Admin` together with its stored credential, as read from the
/// `admins` table. Only the `Admin` part ever makes it into a session.
#[derive(Clone, Debug)]
pub struct AdminRecord {
    pub admin: Admin,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub reg_no: String,
    #[serde(with = "crate::iso_date")]
    pub dob: Date,
    pub year_of_study: String,
    pub branch: String,
    pub phone: String,
    pub email: String,
    pub hostel_room_no: String,
    pub parent_name: String,
    pub parent_phone: String,
    pub parent_address: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Student {
    /// The only secret this student can log in with.
    pub fn login_secret(&self) -> String { student_secret(self.dob) }

    /// Case-insensitive substring match against the fields the student
    /// list can be searched by. An empty `term` matches everyone.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        [&self.name, &self.reg_no, &self.branch, &self.hostel_room_no]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// A student's login secret is their date of birth as `YYYYMMDD`.
pub fn student_secret(dob: Date) -> String {
    format!("{:04}{:02}{:02}", dob.year(), u8::from(dob.month()), dob.day())
}

/// Add Student form contents, before validation. Everything arrives as
/// text; `validate()` turns it into a `NewStudent`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StudentForm {
    #[serde(default)] pub name: String,
    #[serde(default)] pub reg_no: String,
    #[serde(default)] pub dob: String,
    #[serde(default)] pub year_of_study: String,
    #[serde(default)] pub branch: String,
    #[serde(default)] pub phone: String,
    #[serde(default)] pub email: String,
    #[serde(default)] pub hostel_room_no: String,
    #[serde(default)] pub parent_name: String,
    #[serde(default)] pub parent_phone: String,
    #[serde(default)] pub parent_address: String,
}

/// A student row about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub reg_no: String,
    pub dob: Date,
    pub year_of_study: String,
    pub branch: String,
    pub phone: String,
    pub email: String,
    pub hostel_room_no: String,
    pub parent_name: String,
    pub parent_phone: String,
    pub parent_address: String,
}

/// Longest accepted profile field, in bytes. The whole profile rides in
/// the session cookie, so these keep it well under 4 KiB.
pub const MAX_FIELD_BYTES: usize = 100;
pub const MAX_ADDRESS_BYTES: usize = 255;

fn capped(value: &str, label: &str, max: usize) -> Result<String, ValidationError> {
    match value.trim() {
        "" => Err(ValidationError::Missing(label.to_owned())),
        x if x.len() > max => Err(ValidationError::Invalid(format!(
            "{} must be at most {} characters.", label, max
        ))),
        x => Ok(x.to_owned()),
    }
}

fn required(value: &str, label: &str) -> Result<String, ValidationError> {
    capped(value, label, MAX_FIELD_BYTES)
}

impl StudentForm {
    pub fn validate(&self) -> Result<NewStudent, ValidationError> {
        log::trace!("StudentForm::validate( {:?} ) called.", &self.reg_no);

        if self.year_of_study.trim().is_empty() || self.branch.trim().is_empty() {
            return Err(ValidationError::YearAndBranch);
        }
        let year_of_study = self.year_of_study.trim().to_owned();
        if !YEAR_OPTIONS.contains(&year_of_study.as_str()) {
            return Err(ValidationError::Invalid(format!(
                "{:?} is not a year of study.", &year_of_study
            )));
        }

        let dob_str = required(&self.dob, "Date of birth")?;
        let dob = Date::parse(&dob_str, crate::DATE_FMT)
            .map_err(|_| ValidationError::Invalid(format!(
                "{:?} is not a date (expected YYYY-MM-DD).", &dob_str
            )))?;

        let email = required(&self.email, "Email")?;
        if !email.contains('@') {
            return Err(ValidationError::Invalid(format!(
                "{:?} is not an email address.", &email
            )));
        }

        Ok(NewStudent {
            name: required(&self.name, "Name")?,
            reg_no: required(&self.reg_no, "Registration number")?,
            dob,
            year_of_study,
            branch: required(&self.branch, "Branch")?,
            phone: required(&self.phone, "Phone")?,
            email,
            hostel_room_no: required(&self.hostel_room_no, "Hostel room number")?,
            parent_name: required(&self.parent_name, "Parent name")?,
            parent_phone: required(&self.parent_phone, "Parent phone")?,
            parent_address: capped(&self.parent_address, "Parent address", MAX_ADDRESS_BYTES)?,
        })
    }
}

/**
Who is logged in.

Serializes as the student or admin fields with a `userType` tag
alongside them:

```json
{ "id": 3, "reg_no": "CS2024001", ..., "userType": "student" }
```
*/
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "userType", rename_all = "lowercase")]
pub enum Identity {
    Admin(Admin),
    Student(Student),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Admin(_) => Role::Admin,
            Identity::Student(_) => Role::Student,
        }
    }

    pub fn reg_no(&self) -> &str {
        match self {
            Identity::Admin(a) => &a.reg_no,
            Identity::Student(s) => &s.reg_no,
        }
    }

    /// Display name for the navigation bar.
    pub fn display_name(&self) -> &str {
        match self {
            Identity::Admin(a) => &a.reg_no,
            Identity::Student(s) => &s.name,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::{date, datetime};

    pub fn sample_student(id: i64, reg_no: &str, dob: Date) -> Student {
        Student {
            id,
            name: "Asha Rao".to_owned(),
            reg_no: reg_no.to_owned(),
            dob,
            year_of_study: "1st Year".to_owned(),
            branch: "Computer Science".to_owned(),
            phone: "9876543210".to_owned(),
            email: format!("{}@hostel.example", reg_no.to_lowercase()),
            hostel_room_no: "B-214".to_owned(),
            parent_name: "Ravi Rao".to_owned(),
            parent_phone: "9876500000".to_owned(),
            parent_address: "12 Lake Road".to_owned(),
            created_at: datetime!(2024-08-01 09:30 UTC),
        }
    }

    pub fn sample_form(reg_no: &str, dob: &str) -> StudentForm {
        StudentForm {
            name: "Asha Rao".to_owned(),
            reg_no: reg_no.to_owned(),
            dob: dob.to_owned(),
            year_of_study: "1st Year".to_owned(),
            branch: "Computer Science".to_owned(),
            phone: "9876543210".to_owned(),
            email: format!("{}@hostel.example", reg_no.to_lowercase()),
            hostel_room_no: "B-214".to_owned(),
            parent_name: "Ravi Rao".to_owned(),
            parent_phone: "9876500000".to_owned(),
            parent_address: "12 Lake Road".to_owned(),
        }
    }

    #[test]
    fn secret_is_zero_padded_dob() {
        assert_eq!(student_secret(date!(1990 - 05 - 07)), "19900507");
        assert_eq!(student_secret(date!(2005 - 03 - 15)), "20050315");
        assert_eq!(student_secret(date!(2001 - 12 - 01)), "20011201");
    }

    #[test]
    fn identity_carries_user_type_tag() {
        let s = sample_student(3, "CS2024001", date!(2005 - 03 - 15));
        let v = serde_json::to_value(&Identity::Student(s.clone())).unwrap();
        assert_eq!(v["userType"], "student");
        assert_eq!(v["reg_no"], "CS2024001");
        assert_eq!(v["dob"], "2005-03-15");

        let back: Identity = serde_json::from_value(v).unwrap();
        assert_eq!(back, Identity::Student(s));

        let a = Admin {
            id: 1,
            reg_no: "ADMIN001".to_owned(),
            created_at: datetime!(2024-01-01 00:00 UTC),
        };
        let v = serde_json::to_value(&Identity::Admin(a)).unwrap();
        assert_eq!(v["userType"], "admin");
        assert!(v.get("password").is_none());
    }

    #[test]
    fn role_strings() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Student.to_string(), "student");
    }

    #[test]
    fn student_form_validation() {
        let good = sample_form("CS2024001", "2005-03-15").validate().unwrap();
        assert_eq!(good.dob, date!(2005 - 03 - 15));

        let mut f = sample_form("CS2024001", "2005-03-15");
        f.branch = "  ".to_owned();
        assert_eq!(f.validate(), Err(ValidationError::YearAndBranch));

        let mut f = sample_form("CS2024001", "2005-03-15");
        f.year_of_study = "7th Year".to_owned();
        assert!(matches!(f.validate(), Err(ValidationError::Invalid(_))));

        let f = sample_form("CS2024001", "15/03/2005");
        assert!(matches!(f.validate(), Err(ValidationError::Invalid(_))));

        let mut f = sample_form("CS2024001", "2005-03-15");
        f.parent_address = String::new();
        assert_eq!(
            f.validate(),
            Err(ValidationError::Missing("Parent address".to_owned()))
        );
    }

    #[test]
    fn long_fields_are_refused() {
        let mut f = sample_form("CS2024001", "2005-03-15");
        f.parent_address = "x".repeat(3200);
        assert_eq!(
            f.validate(),
            Err(ValidationError::Invalid(
                "Parent address must be at most 255 characters.".to_owned()
            ))
        );

        f.parent_address = "x".repeat(MAX_ADDRESS_BYTES);
        assert!(f.validate().is_ok());

        f.name = "n".repeat(MAX_FIELD_BYTES + 1);
        assert!(matches!(f.validate(), Err(ValidationError::Invalid(_))));
    }

    #[test]
    fn largest_valid_profile_fits_a_session() {
        use crate::session::{MemStorage, SessionCodec, SessionStore};

        let mut f = sample_form("CS2024001", "2005-03-15");
        for field in [
            &mut f.name, &mut f.reg_no, &mut f.branch, &mut f.phone,
            &mut f.hostel_room_no, &mut f.parent_name, &mut f.parent_phone,
        ] {
            *field = "\"".repeat(MAX_FIELD_BYTES);
        }
        f.email = format!("{}@x", "\"".repeat(MAX_FIELD_BYTES - 2));
        f.parent_address = "\"".repeat(MAX_ADDRESS_BYTES);
        let ns = f.validate().unwrap();

        let mut s = sample_student(i64::MAX, "X", date!(2005 - 03 - 15));
        s.name = ns.name;
        s.reg_no = ns.reg_no;
        s.branch = ns.branch;
        s.phone = ns.phone;
        s.email = ns.email;
        s.hostel_room_no = ns.hostel_room_no;
        s.parent_name = ns.parent_name;
        s.parent_phone = ns.parent_phone;
        s.parent_address = ns.parent_address;

        let mut sess = SessionStore::new(MemStorage::default(), SessionCodec::new(b"k"));
        assert!(sess.save(&Identity::Student(s)).is_ok());
    }

    #[test]
    fn student_search() {
        let s = sample_student(1, "CS2024001", date!(2005 - 03 - 15));
        assert!(s.matches(""));
        assert!(s.matches("asha"));
        assert!(s.matches("cs2024"));
        assert!(s.matches("b-214"));
        assert!(!s.matches("mechanical"));
    }
}
