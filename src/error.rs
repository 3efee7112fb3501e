/*!
What can go wrong when a form is submitted or a view is fetched.

Every failure is caught where the operation starts and turned into an
inline message; nothing here is fatal to the server.
*/
use thiserror::Error;

use crate::store::DbError;

/// Caught before anything is sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required.")]
    Missing(String),
    #[error("Year of study and branch are required fields")]
    YearAndBranch,
    #[error("Start date cannot be in the past")]
    StartInPast,
    #[error("End date cannot be before start date")]
    EndBeforeStart,
    #[error("Only students can apply for leave")]
    NotAStudent,
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store refused a duplicate registration number or email.
    #[error("already exists: {0}")]
    Uniqueness(String),
    #[error("backend failure: {0}")]
    Transient(String),
}

impl From<DbError> for OpError {
    fn from(e: DbError) -> OpError {
        match e {
            DbError::Unique(s) => OpError::Uniqueness(s),
            DbError::Other(s) => OpError::Transient(s),
        }
    }
}

impl OpError {
    /// Text to show next to the form. `what` names the thing being
    /// created, for the uniqueness and retry messages.
    pub fn user_message(&self, what: &str) -> String {
        match self {
            OpError::Validation(e) => e.to_string(),
            OpError::Uniqueness(_) => format!(
                "A {} with this registration number or email already exists", what
            ),
            OpError::Transient(_) => format!(
                "Failed to submit {}. Please try again.", what
            ),
        }
    }
}
