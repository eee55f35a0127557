//! Users and their login audit trail

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::bounded_text;
use super::{decode_label, LoginId, UserId, ValidationError};

const MAX_NAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 15;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid email regex")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]*$").expect("invalid phone regex"));

text_enum!(
    /// What a user may do across farms
    UserRole, "role" {
        Farmer => "farmer",
        Admin => "admin",
    }
);

text_enum!(
    /// Account lifecycle state
    UserStatus, "user status" {
        Active => "active",
        Inactive => "inactive",
        Deleted => "deleted",
    }
);

/// Lowercased, syntactically valid email address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    /// # Example
    /// ```
    /// use akaris_store::models::Email;
    ///
    /// assert_eq!(Email::new(" Siti@Example.MY ").unwrap().as_str(), "siti@example.my");
    /// assert!(Email::new("no-at-sign").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let value = bounded_text("email", s, MAX_EMAIL_LEN)?.to_lowercase();

        if !EMAIL_RE.is_match(&value) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@domain.tld",
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Phone number: digits with optional leading `+`, spaces and dashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let value = bounded_text("phone number", s, MAX_PHONE_LEN)?;

        if !PHONE_RE.is_match(&value) {
            return Err(ValidationError::InvalidFormat {
                field: "phone number",
                reason: "may only contain digits, spaces, dashes and a leading +",
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stored user row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Opaque credential produced by the auth layer (e.g. a password hash).
    #[serde(skip_serializing)]
    pub credential_ref: String,
    pub phone_number: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub registered_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            credential_ref: row.try_get("credential_ref")?,
            phone_number: row.try_get("phone_number")?,
            role: decode_label(row.try_get("role")?)?,
            status: decode_label(row.try_get("status")?)?,
            registered_at: row.try_get("registered_at")?,
            last_login_at: row.try_get("last_login_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

/// Validated input for registering a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub credential_ref: String,
    pub phone_number: PhoneNumber,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(
        first_name: &str,
        last_name: &str,
        email: &str,
        credential_ref: &str,
        phone_number: &str,
        role: UserRole,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            first_name: bounded_text("first name", first_name, MAX_NAME_LEN)?,
            last_name: bounded_text("last name", last_name, MAX_NAME_LEN)?,
            email: Email::new(email)?,
            credential_ref: credential(credential_ref)?,
            phone_number: PhoneNumber::new(phone_number)?,
            role,
        })
    }
}

fn credential(s: &str) -> Result<String, ValidationError> {
    if s.is_empty() {
        return Err(ValidationError::Empty {
            field: "credential",
        });
    }
    Ok(s.to_owned())
}

/// Partial profile update; unset fields keep their stored value
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub(crate) first_name: Option<String>,
    pub(crate) last_name: Option<String>,
    pub(crate) email: Option<Email>,
    pub(crate) credential_ref: Option<String>,
    pub(crate) phone_number: Option<PhoneNumber>,
    pub(crate) role: Option<UserRole>,
    pub(crate) status: Option<UserStatus>,
}

impl UserPatch {
    pub fn first_name(mut self, v: &str) -> Result<Self, ValidationError> {
        self.first_name = Some(bounded_text("first name", v, MAX_NAME_LEN)?);
        Ok(self)
    }

    pub fn last_name(mut self, v: &str) -> Result<Self, ValidationError> {
        self.last_name = Some(bounded_text("last name", v, MAX_NAME_LEN)?);
        Ok(self)
    }

    pub fn email(mut self, v: &str) -> Result<Self, ValidationError> {
        self.email = Some(Email::new(v)?);
        Ok(self)
    }

    pub fn credential_ref(mut self, v: &str) -> Result<Self, ValidationError> {
        self.credential_ref = Some(credential(v)?);
        Ok(self)
    }

    pub fn phone_number(mut self, v: &str) -> Result<Self, ValidationError> {
        self.phone_number = Some(PhoneNumber::new(v)?);
        Ok(self)
    }

    pub fn role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.credential_ref.is_none()
            && self.phone_number.is_none()
            && self.role.is_none()
            && self.status.is_none()
    }
}

/// One successful sign-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Login {
    pub id: LoginId,
    pub user_id: UserId,
    pub logged_in_at: DateTime<Utc>,
    pub ip_address: String,
}

/// Normalise a client address for the login audit table.
pub(crate) fn parse_ip(s: &str) -> Result<String, ValidationError> {
    s.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ValidationError::InvalidFormat {
            field: "ip address",
            reason: "must be an IPv4 or IPv6 address",
        })
}
