//! Database error type and Postgres error-code classification

use std::borrow::Cow;

/// Postgres SQLSTATE codes the API reports as client errors
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
}

/// Columns whose unique constraints get a field-specific message
const UNIQUE_FIELDS: &[&str] = &["username", "email"];

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    /// Constraint or business-rule conflict (409)
    #[error("conflict: {message}")]
    Conflict {
        field: Option<String>,
        message: String,
    },

    /// Input the database refused (value too long, failed CHECK)
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Caller is not allowed to perform the operation (403)
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            field: None,
            message: message.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Replace the message of a conflict that has no field-specific wording.
    pub fn on_conflict(self, message: &str) -> Self {
        match self {
            Self::Conflict { field: None, .. } => Self::conflict(message),
            other => other,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        classify(e)
    }
}

/// Map constraint violations to client-facing errors; everything else stays
/// an opaque `Sqlx` error.
pub fn classify(e: sqlx::Error) -> DbError {
    let sqlx::Error::Database(db_err) = &e else {
        return DbError::Sqlx(e);
    };

    let code = db_err.code().unwrap_or(Cow::Borrowed(""));
    match code.as_ref() {
        sqlstate::UNIQUE_VIOLATION => {
            let field = db_err.constraint().and_then(field_from_constraint);
            let message = match field {
                Some("username") => "username already taken".to_owned(),
                Some("email") => "email already registered".to_owned(),
                Some(other) => format!("{} already exists", other),
                None => "record already exists".to_owned(),
            };
            DbError::Conflict {
                field: field.map(str::to_owned),
                message,
            }
        }
        sqlstate::FOREIGN_KEY_VIOLATION => DbError::Conflict {
            field: None,
            message: "referenced record does not exist or is still in use".to_owned(),
        },
        sqlstate::STRING_DATA_RIGHT_TRUNCATION => DbError::InvalidInput {
            message: "value too long for field".to_owned(),
        },
        sqlstate::CHECK_VIOLATION | sqlstate::NUMERIC_VALUE_OUT_OF_RANGE => {
            DbError::InvalidInput {
                message: match db_err.constraint() {
                    Some(c) => format!("value violates rule '{}'", c),
                    None => "value out of range".to_owned(),
                },
            }
        }
        _ => DbError::Sqlx(e),
    }
}

/// `users_email_key` -> `email`, `staff_users_username_key` -> `username`.
fn field_from_constraint(constraint: &str) -> Option<&'static str> {
    let stem = constraint.strip_suffix("_key")?;
    UNIQUE_FIELDS
        .iter()
        .copied()
        .find(|field| stem.ends_with(&format!("_{}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(field_from_constraint("users_username_key"), Some("username"));
        assert_eq!(field_from_constraint("staff_users_email_key"), Some("email"));
        assert_eq!(field_from_constraint("admin_users_email_key"), Some("email"));
        assert_eq!(field_from_constraint("event_participants_pkey"), None);
        assert_eq!(field_from_constraint("report_cards_scholar_id_key"), None);
    }

    #[test]
    fn non_database_errors_stay_opaque() {
        let err = classify(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Sqlx(_)));
    }

    #[test]
    fn on_conflict_rewrites_generic_message() {
        let err = DbError::conflict("record already exists").on_conflict("already joined");
        assert_eq!(err.to_string(), "conflict: already joined");

        let field_specific = DbError::Conflict {
            field: Some("email".into()),
            message: "email already registered".into(),
        }
        .on_conflict("ignored");
        assert_eq!(field_specific.to_string(), "conflict: email already registered");
    }
}
