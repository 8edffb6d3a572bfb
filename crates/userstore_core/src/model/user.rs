//! User domain model.
//!
//! # Responsibility
//! - Define the canonical user record and its identifier.
//! - Provide validation shared by every repository backend.
//!
//! # Invariants
//! - `UserId` is the only identifier space; textual ids parse into it.
//! - `id` is strictly positive for persisted users.
//! - `name` is non-blank; `email`, when set, has one `@` with both parts.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

pub const MAX_NAME_CHARS: usize = 128;
pub const MAX_EMAIL_CHARS: usize = 254;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email pattern must compile"));

/// Stable identifier of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

/// Reasons a user record is rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    NonPositiveId(UserId),
    BlankName,
    NameTooLong { chars: usize },
    InvalidEmail,
    EmailTooLong { chars: usize },
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => write!(f, "user id must be positive, got {id}"),
            Self::BlankName => write!(f, "user name cannot be blank"),
            Self::NameTooLong { chars } => write!(
                f,
                "user name has {chars} characters; at most {MAX_NAME_CHARS} allowed"
            ),
            Self::InvalidEmail => write!(f, "user email must look like `local@domain`"),
            Self::EmailTooLong { chars } => write!(
                f,
                "user email has {chars} characters; at most {MAX_EMAIL_CHARS} allowed"
            ),
        }
    }
}

impl Error for UserValidationError {}

/// Canonical user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    /// Creates a user without email.
    ///
    /// This constructor does not validate; repositories call
    /// [`User::validate`] on every write.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    /// Returns a copy with `email` set.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns the part of `email` after `@`, if any.
    pub fn email_domain(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|email| email.rsplit_once('@'))
            .map(|(_, domain)| domain)
    }

    /// Checks the record invariants enforced on every write path.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        if self.id.get() <= 0 {
            return Err(UserValidationError::NonPositiveId(self.id));
        }

        if self.name.trim().is_empty() {
            return Err(UserValidationError::BlankName);
        }
        let name_chars = self.name.chars().count();
        if name_chars > MAX_NAME_CHARS {
            return Err(UserValidationError::NameTooLong { chars: name_chars });
        }

        if let Some(email) = self.email.as_deref() {
            let email_chars = email.chars().count();
            if email_chars > MAX_EMAIL_CHARS {
                return Err(UserValidationError::EmailTooLong { chars: email_chars });
            }
            if !EMAIL_PATTERN.is_match(email) {
                return Err(UserValidationError::InvalidEmail);
            }
        }

        Ok(())
    }
}
