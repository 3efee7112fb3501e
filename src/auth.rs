/*!
Turning a registration number and a secret into an `Identity`.

Admins are checked first, against the credential stored in their row.
Students are checked second, against the secret derived from their date
of birth. How a stored admin credential is compared is up to the
`Verifier` the `Authenticator` is built with.
*/
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

use crate::session::{SessionStore, Storage};
use crate::store::DataStore;
use crate::user::{student_secret, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No such user, or wrong secret. Deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The store couldn't be asked.
    #[error("Login failed. Please try again.")]
    Failed,
    /// Credentials were fine but the identity couldn't be kept.
    #[error("Login failed: this account's details are too long to stay logged in. Ask an administrator to shorten them.")]
    Unpersistable,
}

/// Compares an offered secret to what's on record.
pub trait Verifier: Send + Sync {
    fn verify(&self, stored: &str, offered: &str) -> bool;

    /// Short name for logging and configuration.
    fn name(&self) -> &'static str;
}

/// Byte-for-byte comparison against a stored plaintext secret.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl Verifier for Plaintext {
    fn verify(&self, stored: &str, offered: &str) -> bool {
        stored.as_bytes() == offered.as_bytes()
    }

    fn name(&self) -> &'static str { "plain" }
}

/// Verification against a stored Argon2 PHC string.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Phc;

impl Verifier for Argon2Phc {
    fn verify(&self, stored: &str, offered: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(offered.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::error!("Stored admin credential is not a PHC string: {}", &e);
                false
            },
        }
    }

    fn name(&self) -> &'static str { "argon2" }
}

/// Look up a `Verifier` by its configuration name.
pub fn verifier_by_name(name: &str) -> Result<Box<dyn Verifier>, String> {
    match name {
        "plain" => Ok(Box::new(Plaintext)),
        "argon2" => Ok(Box::new(Argon2Phc)),
        x => Err(format!("{:?} is not a known password scheme (plain, argon2).", x)),
    }
}

/// Hash `password` into a PHC string `Argon2Phc` can verify.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| format!("Error hashing password: {}", &e))
}

pub struct Authenticator<'a> {
    store: &'a dyn DataStore,
    verifier: &'a dyn Verifier,
}

impl<'a> Authenticator<'a> {
    pub fn new(store: &'a dyn DataStore, verifier: &'a dyn Verifier) -> Self {
        Self { store, verifier }
    }

    /**
    Resolve `reg_no`/`secret` to exactly one identity.

    An admin row whose credential verifies wins; only then are students
    consulted. A student's secret is their date of birth as `YYYYMMDD`.
    */
    pub async fn authenticate(
        &self,
        reg_no: &str,
        secret: &str,
    ) -> Result<Identity, AuthError> {
        log::trace!(
            "Authenticator::authenticate( {:?}, [ secret ] ) called w/ {} verifier.",
            reg_no, self.verifier.name()
        );

        match self.store.admin_by_reg_no(reg_no).await {
            Err(e) => {
                log::error!("Error looking up admin {:?}: {}", reg_no, &e);
                return Err(AuthError::Failed);
            },
            Ok(Some(rec)) => {
                if self.verifier.verify(&rec.password, secret) {
                    log::info!("Admin {:?} authenticated.", reg_no);
                    return Ok(Identity::Admin(rec.admin));
                }
                log::trace!("    ...admin {:?} credential mismatch; trying students.", reg_no);
            },
            Ok(None) => { /* Not an admin; try students. */ },
        }

        let student = match self.store.student_by_reg_no(reg_no).await {
            Err(e) => {
                log::error!("Error looking up student {:?}: {}", reg_no, &e);
                return Err(AuthError::Failed);
            },
            Ok(None) => {
                log::info!("Failed login for unknown reg_no {:?}.", reg_no);
                return Err(AuthError::InvalidCredentials);
            },
            Ok(Some(s)) => s,
        };

        if Plaintext.verify(&student_secret(student.dob), secret) {
            log::info!("Student {:?} authenticated.", reg_no);
            Ok(Identity::Student(student))
        } else {
            log::info!("Failed login for student {:?}.", reg_no);
            Err(AuthError::InvalidCredentials)
        }
    }

    /// `authenticate()`, then replace whatever `session` held with the
    /// resulting identity. A failed attempt leaves `session` alone.
    pub async fn login<S: Storage>(
        &self,
        reg_no: &str,
        secret: &str,
        session: &mut SessionStore<S>,
    ) -> Result<Identity, AuthError> {
        let id = self.authenticate(reg_no, secret).await?;
        if let Err(e) = session.save(&id) {
            log::error!("Unable to keep session for {:?}: {}", reg_no, &e);
            return Err(AuthError::Unpersistable);
        }
        Ok(id)
    }
}
