//! Fleet identifiers.
//!
//! Vehicles, routes and users are keyed by short human-assigned strings (bus
//! numbers, route codes, usernames). Notifications use generated opaque ids and
//! deviations use database-assigned integers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest identifier accepted for vehicles, routes and users.
pub const ID_MAX_LEN: usize = 50;

/// Validation errors for string identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValidationError {
    Empty { kind: &'static str },
    TooLong { kind: &'static str, max: usize },
    SurroundingWhitespace { kind: &'static str },
}

impl fmt::Display for IdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { kind } => write!(f, "{kind} must not be empty"),
            Self::TooLong { kind, max } => write!(f, "{kind} must be at most {max} characters"),
            Self::SurroundingWhitespace { kind } => {
                write!(f, "{kind} must not start or end with whitespace")
            }
        }
    }
}

impl std::error::Error for IdValidationError {}

fn validate(kind: &'static str, raw: &str) -> Result<(), IdValidationError> {
    if raw.is_empty() {
        return Err(IdValidationError::Empty { kind });
    }
    if raw.trim() != raw {
        return Err(IdValidationError::SurroundingWhitespace { kind });
    }
    if raw.chars().count() > ID_MAX_LEN {
        return Err(IdValidationError::TooLong {
            kind,
            max: ID_MAX_LEN,
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap the raw identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, IdValidationError> {
                let raw = raw.into();
                validate($kind, &raw)?;
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Bus number or other vehicle key.
    VehicleId,
    "vehicle_id"
);
string_id!(
    /// Route code.
    RouteId,
    "route_id"
);
string_id!(
    /// Username of a manager, driver or other fleet user.
    UserId,
    "user_id"
);

/// Opaque notification identifier.
///
/// Producers may supply their own id; otherwise [`NotificationId::generate`]
/// yields `notif-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(format!("notif-{}", Uuid::new_v4()))
    }

    /// Wrap a caller-supplied id, returning `None` when it is blank.
    pub fn from_raw(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Database-assigned deviation identifier.
pub type DeviationId = i64;
