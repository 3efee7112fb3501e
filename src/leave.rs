/*!
Leave applications and their review workflow.

A leave starts `Pending` and an admin moves it to `Accepted` or
`Rejected`; both are final.
*/
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::ValidationError;
use crate::user::Student;

/// Choices offered for `leave_type` on the Apply Leave form.
pub static LEAVE_TYPES: &[&str] = &[
    "Medical Leave",
    "Emergency Leave",
    "Personal Leave",
    "Family Leave",
    "Academic Leave",
    "Other",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending  => "pending",
            Status::Accepted => "accepted",
            Status::Rejected => "rejected",
        }
    }

    pub fn is_final(&self) -> bool { !matches!(self, Status::Pending) }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(Status::Pending),
            "accepted" => Ok(Status::Accepted),
            "rejected" => Ok(Status::Rejected),
            _ => Err(format!("{:?} is not a valid leave status.", s)),
        }
    }
}

/// What became of a request to review one leave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewOutcome {
    Applied,
    AlreadyReviewed,
    NotFound,
}

/// The outcome of a review. These are the only statuses an admin can set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl From<Verdict> for Status {
    fn from(v: Verdict) -> Status {
        match v {
            Verdict::Accepted => Status::Accepted,
            Verdict::Rejected => Status::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub id: i64,
    pub student_id: i64,
    pub leave_type: String,
    #[serde(with = "crate::iso_date")]
    pub start_date: Date,
    #[serde(with = "crate::iso_date")]
    pub end_date: Date,
    pub reason: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Leave {
    pub fn duration_days(&self) -> i64 { duration_days(self.start_date, self.end_date) }

    /**
    Apply a review to this leave in place.

    Returns `false` and leaves the record untouched if it has already been
    reviewed.
    */
    pub fn review(&mut self, verdict: Verdict, at: OffsetDateTime) -> bool {
        if self.status.is_final() {
            return false;
        }
        self.status = verdict.into();
        self.updated_at = at;
        true
    }
}

/// A leave joined with the student who applied for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaveWithStudent {
    #[serde(flatten)]
    pub leave: Leave,
    pub student: Student,
}

impl LeaveWithStudent {
    /// Case-insensitive match on student name, registration number, or
    /// leave type.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        self.student.name.to_lowercase().contains(&term)
            || self.student.reg_no.to_lowercase().contains(&term)
            || self.leave.leave_type.to_lowercase().contains(&term)
    }
}

/// Whole days between two dates, regardless of order.
pub fn duration_days(start: Date, end: Date) -> i64 {
    (end - start).whole_days().abs()
}

/// Apply Leave form contents, before validation.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LeaveForm {
    #[serde(default)] pub leave_type: String,
    #[serde(default)] pub start_date: String,
    #[serde(default)] pub end_date: String,
    #[serde(default)] pub reason: String,
}

/// A leave about to be inserted; always inserted as `Pending`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLeave {
    pub leave_type: String,
    pub start_date: Date,
    pub end_date: Date,
    pub reason: String,
}

fn parse_date(s: &str, label: &str) -> Result<Date, ValidationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ValidationError::Missing(label.to_owned()));
    }
    Date::parse(s, crate::DATE_FMT).map_err(|_| ValidationError::Invalid(
        format!("{:?} is not a date (expected YYYY-MM-DD).", s)
    ))
}

impl LeaveForm {
    /**
    Check the form against the date rules, given the date it is being
    submitted on.

    The start date has to be at least `today + 1`, and the end date can't
    come before the start date.
    */
    pub fn validate(&self, today: Date) -> Result<NewLeave, ValidationError> {
        log::trace!("LeaveForm::validate( {:?}, {} ) called.", self, &today);

        let leave_type = self.leave_type.trim();
        if leave_type.is_empty() {
            return Err(ValidationError::Missing("Leave type".to_owned()));
        }
        if !LEAVE_TYPES.contains(&leave_type) {
            return Err(ValidationError::Invalid(format!(
                "{:?} is not a leave type.", leave_type
            )));
        }

        let start_date = parse_date(&self.start_date, "Start date")?;
        let end_date = parse_date(&self.end_date, "End date")?;

        let earliest = today.next_day().unwrap_or(today);
        if start_date < earliest {
            return Err(ValidationError::StartInPast);
        }
        if end_date < start_date {
            return Err(ValidationError::EndBeforeStart);
        }

        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::Missing("Reason".to_owned()));
        }

        Ok(NewLeave {
            leave_type: leave_type.to_owned(),
            start_date,
            end_date,
            reason: reason.to_owned(),
        })
    }
}

/// Per-status tallies shown on the dashboards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl Tally {
    pub fn of<'a, I: IntoIterator<Item = &'a Leave>>(leaves: I) -> Tally {
        let mut t = Tally::default();
        for l in leaves {
            t.total += 1;
            match l.status {
                Status::Pending => { t.pending += 1; },
                Status::Accepted => { t.accepted += 1; },
                Status::Rejected => { t.rejected += 1; },
            }
        }
        t
    }
}
